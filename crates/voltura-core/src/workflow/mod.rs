//! Task handlers for the business queues.
//!
//! Each handler decodes its queue's payload enum, loads the referenced
//! records, and sends customer-facing text through the session registry.
//! Handlers guard on persisted state (processed flags, `sent_at`) so that a
//! redelivered task does not message the customer twice.

pub mod concierge;
pub mod notification;
pub mod quotation;
pub mod templates;

pub use concierge::ConciergeHandler;
pub use notification::NotificationHandler;
pub use quotation::QuotationFollowupHandler;

use std::sync::Arc;

use chrono::Utc;
use tracing::error;
use uuid::Uuid;
use voltura_types::customer::Customer;
use voltura_types::error::TaskError;
use voltura_types::message::{Direction, MessageLog};

use crate::repository::message::MessageLogRepository;
use crate::session::OutboundMessenger;

/// Sends a text to a customer and records it in the message log.
pub struct Notifier<S: OutboundMessenger, L: MessageLogRepository> {
    messenger: Arc<S>,
    messages: Arc<L>,
    default_session: String,
}

impl<S: OutboundMessenger, L: MessageLogRepository> Clone for Notifier<S, L> {
    fn clone(&self) -> Self {
        Self {
            messenger: self.messenger.clone(),
            messages: self.messages.clone(),
            default_session: self.default_session.clone(),
        }
    }
}

impl<S: OutboundMessenger, L: MessageLogRepository> Notifier<S, L> {
    pub fn new(messenger: Arc<S>, messages: Arc<L>, default_session: impl Into<String>) -> Self {
        Self {
            messenger,
            messages,
            default_session: default_session.into(),
        }
    }

    pub fn messages(&self) -> &L {
        &self.messages
    }

    /// The task's session, or the configured default.
    pub fn session<'a>(&'a self, session_id: Option<&'a str>) -> &'a str {
        session_id
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.default_session)
    }

    /// Send `text` to `customer`. A failed send is transient; a failure to log
    /// an already delivered message is not retried (that would resend it).
    pub async fn send(
        &self,
        session_id: Option<&str>,
        customer: &Customer,
        job_id: Option<Uuid>,
        text: &str,
    ) -> Result<(), TaskError> {
        let session = self.session(session_id);
        self.messenger
            .send_text(session, &customer.phone, text)
            .await?;

        let now = Utc::now();
        let mut log = MessageLog::new(customer.id, session, job_id, Direction::Outbound, text, now);
        log.processed = true;
        log.processed_at = Some(now);
        if let Err(e) = self.messages.append(&log).await {
            error!(customer_id = %customer.id, error = %e, "failed to log outbound message");
        }
        Ok(())
    }
}
