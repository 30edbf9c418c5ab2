//! Domain events for the realtime feed.
//!
//! `DomainEvent` is broadcast on the event bus whenever a session changes
//! state, a message is ingested, or a business record changes. All variants
//! are Clone + Send + Sync for use with tokio broadcast channels.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::invoice::Invoice;
use crate::job::JobStatus;
use crate::message::MessageLog;
use crate::quotation::Quotation;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A new pairing payload (QR) supersedes any earlier one.
    SessionPairing { session_id: String, payload: String },

    SessionConnected { session_id: String },

    SessionDisconnected {
        session_id: String,
        reason: String,
        /// The transport reported the credentials as logged out.
        logged_out: bool,
    },

    /// A chat message was ingested into the message log.
    MessageReceived {
        session_id: String,
        customer_id: Uuid,
        job_id: Option<Uuid>,
        message: MessageLog,
    },

    QuotationCreated { quotation: Quotation },

    QuotationAccepted { quotation_id: Uuid, invoice_id: Uuid },

    QuotationRejected { quotation_id: Uuid },

    JobUpdated { job_id: Uuid, status: JobStatus },

    InvoiceUpdated {
        invoice: Invoice,
        /// Sum of payments recorded by the action that triggered the event.
        paid: Decimal,
    },

    InventoryUpdated { item_id: Uuid, quantity: i64 },

    /// A workflow task exhausted its retries or failed permanently.
    TaskFailed {
        task_id: Uuid,
        queue: String,
        error: String,
    },
}

impl DomainEvent {
    /// Stable event name for realtime consumers.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::SessionPairing { .. } => "session.pairing",
            DomainEvent::SessionConnected { .. } => "session.connected",
            DomainEvent::SessionDisconnected { .. } => "session.disconnected",
            DomainEvent::MessageReceived { .. } => "session.message",
            DomainEvent::QuotationCreated { .. } => "quotation.created",
            DomainEvent::QuotationAccepted { .. } => "quotation.accepted",
            DomainEvent::QuotationRejected { .. } => "quotation.rejected",
            DomainEvent::JobUpdated { .. } => "job.updated",
            DomainEvent::InvoiceUpdated { .. } => "invoice.updated",
            DomainEvent::InventoryUpdated { .. } => "inventory.updated",
            DomainEvent::TaskFailed { .. } => "task.failed",
        }
    }
}
