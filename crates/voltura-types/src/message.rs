//! Message log and inbound transport message types.
//!
//! `MessageLog` is the append-only audit trail of every chat message seen or
//! sent. Only the `processed` flag is ever updated after insertion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Content recorded for messages that carry no text.
pub const NON_TEXT_PLACEHOLDER: &str = "[non-text message]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "INBOUND"),
            Direction::Outbound => write!(f, "OUTBOUND"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INBOUND" => Ok(Direction::Inbound),
            "OUTBOUND" => Ok(Direction::Outbound),
            other => Err(format!("invalid direction: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageLog {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub session_id: String,
    pub job_id: Option<Uuid>,
    pub direction: Direction,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MessageLog {
    pub fn new(
        customer_id: Uuid,
        session_id: impl Into<String>,
        job_id: Option<Uuid>,
        direction: Direction,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            customer_id,
            session_id: session_id.into(),
            job_id,
            direction,
            content: content.into(),
            media_url: None,
            processed: false,
            processed_at: None,
            created_at: now,
        }
    }
}

/// A message event delivered by the chat transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Counterpart identifier as the transport reports it (e.g. `6012...@s.whatsapp.net`).
    pub remote_jid: String,
    /// True when the message was sent from this session's own account.
    #[serde(default)]
    pub from_me: bool,
    /// Text body; `None` for media, stickers, reactions and the like.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
}

impl InboundMessage {
    pub fn direction(&self) -> Direction {
        if self.from_me {
            Direction::Outbound
        } else {
            Direction::Inbound
        }
    }

    /// Text to record in the message log.
    pub fn log_content(&self) -> &str {
        match self.text.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => NON_TEXT_PLACEHOLDER,
        }
    }
}

/// Manual intake submitted through the HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualIntake {
    pub session_id: String,
    pub phone: String,
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Records produced by ingesting one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub customer_id: Uuid,
    pub job_id: Option<Uuid>,
    pub message_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_text_uses_placeholder() {
        let msg = InboundMessage {
            remote_jid: "60123@s.whatsapp.net".into(),
            from_me: false,
            text: None,
            media_url: Some("https://cdn.example/img.jpg".into()),
        };
        assert_eq!(msg.log_content(), NON_TEXT_PLACEHOLDER);
        assert_eq!(msg.direction(), Direction::Inbound);
    }

    #[test]
    fn test_from_me_is_outbound() {
        let msg = InboundMessage {
            remote_jid: "60123@s.whatsapp.net".into(),
            from_me: true,
            text: Some("On my way".into()),
            media_url: None,
        };
        assert_eq!(msg.direction(), Direction::Outbound);
        assert_eq!(msg.log_content(), "On my way");
    }

    #[test]
    fn test_direction_roundtrip() {
        assert_eq!("INBOUND".parse::<Direction>().unwrap(), Direction::Inbound);
        assert_eq!(Direction::Outbound.to_string(), "OUTBOUND");
    }
}
