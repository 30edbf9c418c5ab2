//! Chat-transport session types.
//!
//! A session is one tenant connection to the chat transport. `SessionRecord`
//! is the durable projection of the in-memory state machine owned by the
//! session registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Lifecycle states of a transport session.
///
/// `Uninitialized -> AwaitingPairing -> Connected`, then either
/// `Disconnected` (transient) or `LoggedOut` (terminal for the stored credentials).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Uninitialized,
    AwaitingPairing,
    Connected,
    Disconnected,
    LoggedOut,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Uninitialized => write!(f, "uninitialized"),
            SessionStatus::AwaitingPairing => write!(f, "awaiting_pairing"),
            SessionStatus::Connected => write!(f, "connected"),
            SessionStatus::Disconnected => write!(f, "disconnected"),
            SessionStatus::LoggedOut => write!(f, "logged_out"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uninitialized" => Ok(SessionStatus::Uninitialized),
            "awaiting_pairing" => Ok(SessionStatus::AwaitingPairing),
            "connected" => Ok(SessionStatus::Connected),
            "disconnected" => Ok(SessionStatus::Disconnected),
            "logged_out" => Ok(SessionStatus::LoggedOut),
            other => Err(format!("invalid session status: '{other}'")),
        }
    }
}

/// Persisted session row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub status: SessionStatus,
    /// Latest pairing payload (QR code data). Cleared once the session opens.
    pub pairing_payload: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>, status: SessionStatus, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            status,
            pairing_payload: None,
            last_synced_at: None,
            updated_at: now,
        }
    }
}

/// Answer to a status query: the persisted projection merged with the live handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub status: SessionStatus,
    pub pairing_payload: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Whether a live transport handle is currently registered.
    pub live: bool,
}

/// Opaque transport credentials, stored per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(pub serde_json::Value);
