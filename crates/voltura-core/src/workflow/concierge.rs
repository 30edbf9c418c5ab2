//! `concierge-messages` handler: acknowledge inbound customer messages.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use voltura_types::error::TaskError;
use voltura_types::task::{ConciergeTask, TaskRecord};

use super::{Notifier, templates};
use crate::dispatch::{TaskHandler, decode_payload};
use crate::repository::crm::CrmRepository;
use crate::repository::message::MessageLogRepository;
use crate::session::OutboundMessenger;

pub struct ConciergeHandler<C: CrmRepository, L: MessageLogRepository, S: OutboundMessenger> {
    crm: Arc<C>,
    notifier: Notifier<S, L>,
}

impl<C: CrmRepository, L: MessageLogRepository, S: OutboundMessenger> ConciergeHandler<C, L, S> {
    pub fn new(crm: Arc<C>, notifier: Notifier<S, L>) -> Self {
        Self { crm, notifier }
    }
}

impl<C: CrmRepository, L: MessageLogRepository, S: OutboundMessenger> TaskHandler
    for ConciergeHandler<C, L, S>
{
    async fn handle(&self, task: &TaskRecord) -> Result<(), TaskError> {
        let ConciergeTask::Intake {
            message_id,
            session_id,
            phone,
            job_id,
        } = decode_payload::<ConciergeTask>(task)?;

        let Some(message) = self.notifier.messages().get(&message_id).await? else {
            warn!(%message_id, "intake message no longer exists, skipping");
            return Ok(());
        };
        if message.processed {
            debug!(%message_id, "intake already acknowledged");
            return Ok(());
        }

        let Some(customer) = self.crm.get_customer(&message.customer_id).await? else {
            warn!(%message_id, %phone, "customer for intake message missing, skipping");
            return Ok(());
        };

        let text = templates::acknowledgement(&customer.name);
        self.notifier
            .send(Some(&session_id), &customer, Some(job_id), &text)
            .await?;
        self.notifier
            .messages()
            .mark_processed(&message_id, Utc::now())
            .await?;

        info!(%message_id, customer_id = %customer.id, "intake acknowledged");
        Ok(())
    }
}
