//! Workflow task types: queue names, per-queue payload contracts, and the
//! durable task record.
//!
//! Each queue has one serde-tagged payload enum. Handlers deserialize the
//! stored JSON into that enum; an unknown `type` tag fails to deserialize and
//! is treated as a permanent failure.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

pub const CONCIERGE_QUEUE: &str = "concierge-messages";
pub const QUOTATION_QUEUE: &str = "quotation-followups";
pub const NOTIFICATION_QUEUE: &str = "notification-outbox";

/// A payload bound to exactly one named queue.
pub trait TaskPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    const QUEUE: &'static str;
}

/// Payloads on the `concierge-messages` queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ConciergeTask {
    /// Acknowledge an inbound customer message.
    Intake {
        message_id: Uuid,
        session_id: String,
        phone: String,
        job_id: Uuid,
    },
}

impl TaskPayload for ConciergeTask {
    const QUEUE: &'static str = CONCIERGE_QUEUE;
}

/// Payloads on the `quotation-followups` queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QuotationTask {
    /// Send the quotation summary to the customer.
    QuotationSent {
        quotation_id: Uuid,
        customer_id: Uuid,
        #[serde(default)]
        job_id: Option<Uuid>,
        #[serde(default)]
        session_id: Option<String>,
    },
}

impl TaskPayload for QuotationTask {
    const QUEUE: &'static str = QUOTATION_QUEUE;
}

/// Payloads on the `notification-outbox` queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NotificationTask {
    Reminder {
        reminder_id: Uuid,
        job_id: Uuid,
        #[serde(default)]
        session_id: Option<String>,
    },
    QuotationAccepted {
        quotation_id: Uuid,
        invoice_id: Uuid,
        #[serde(default)]
        session_id: Option<String>,
    },
    QuotationRejected {
        quotation_id: Uuid,
        #[serde(default)]
        session_id: Option<String>,
    },
    PosSale {
        invoice_id: Uuid,
        customer_id: Uuid,
        #[serde(default)]
        session_id: Option<String>,
    },
}

impl NotificationTask {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            NotificationTask::Reminder { session_id, .. }
            | NotificationTask::QuotationAccepted { session_id, .. }
            | NotificationTask::QuotationRejected { session_id, .. }
            | NotificationTask::PosSale { session_id, .. } => session_id.as_deref(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NotificationTask::Reminder { .. } => "reminder",
            NotificationTask::QuotationAccepted { .. } => "quotation-accepted",
            NotificationTask::QuotationRejected { .. } => "quotation-rejected",
            NotificationTask::PosSale { .. } => "pos-sale",
        }
    }
}

impl TaskPayload for NotificationTask {
    const QUEUE: &'static str = NOTIFICATION_QUEUE;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "succeeded" => Ok(TaskStatus::Succeeded),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!("invalid task status: '{other}'")),
        }
    }
}

/// Durable projection of a dispatcher task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub queue: String,
    pub payload: serde_json::Value,
    pub status: TaskStatus,
    /// Attempts started so far (incremented on claim).
    pub attempts: u32,
    pub max_attempts: u32,
    /// Earliest time the task may be claimed.
    pub available_at: DateTime<Utc>,
    /// Claim lease; a running task past its lease is considered abandoned.
    pub lease_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(
        queue: impl Into<String>,
        payload: serde_json::Value,
        available_at: DateTime<Utc>,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            queue: queue.into(),
            payload,
            status: TaskStatus::Pending,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            available_at,
            lease_until: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// A task that failed permanently, published on the dispatcher's failure stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task_id: Uuid,
    pub queue: String,
    pub attempts: u32,
    pub error: String,
    /// True when the handler classified the error as permanent before attempts ran out.
    pub permanent: bool,
    pub payload: serde_json::Value,
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_tag_is_kebab_case() {
        let task = NotificationTask::QuotationAccepted {
            quotation_id: Uuid::now_v7(),
            invoice_id: Uuid::now_v7(),
            session_id: None,
        };
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["type"], "quotation-accepted");
        assert_eq!(task.kind(), "quotation-accepted");
    }

    #[test]
    fn test_missing_session_id_defaults_to_none() {
        let task: NotificationTask = serde_json::from_value(json!({
            "type": "pos-sale",
            "invoice_id": Uuid::now_v7(),
            "customer_id": Uuid::now_v7(),
        }))
        .unwrap();
        assert_eq!(task.session_id(), None);
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let result: Result<NotificationTask, _> =
            serde_json::from_value(json!({ "type": "birthday-greeting", "customer_id": Uuid::now_v7() }));
        assert!(result.is_err());
    }

    #[test]
    fn test_task_record_clamps_max_attempts() {
        let now = Utc::now();
        let record = TaskRecord::new(CONCIERGE_QUEUE, json!({}), now, 0, now);
        assert_eq!(record.max_attempts, 1);
        assert!(!record.attempts_exhausted());
    }

    #[test]
    fn test_queue_binding() {
        assert_eq!(ConciergeTask::QUEUE, "concierge-messages");
        assert_eq!(QuotationTask::QUEUE, "quotation-followups");
        assert_eq!(NotificationTask::QUEUE, "notification-outbox");
    }
}
