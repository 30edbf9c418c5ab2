//! `quotation-followups` handler: send the quotation summary to the customer.

use std::sync::Arc;

use tracing::{info, warn};
use voltura_types::error::TaskError;
use voltura_types::quotation::QuotationStatus;
use voltura_types::task::{QuotationTask, TaskRecord};

use super::{Notifier, templates};
use crate::dispatch::{TaskHandler, decode_payload};
use crate::repository::crm::CrmRepository;
use crate::repository::message::MessageLogRepository;
use crate::repository::quotation::QuotationRepository;
use crate::session::OutboundMessenger;

pub struct QuotationFollowupHandler<
    C: CrmRepository,
    Qr: QuotationRepository,
    L: MessageLogRepository,
    S: OutboundMessenger,
> {
    crm: Arc<C>,
    quotations: Arc<Qr>,
    notifier: Notifier<S, L>,
}

impl<C: CrmRepository, Qr: QuotationRepository, L: MessageLogRepository, S: OutboundMessenger>
    QuotationFollowupHandler<C, Qr, L, S>
{
    pub fn new(crm: Arc<C>, quotations: Arc<Qr>, notifier: Notifier<S, L>) -> Self {
        Self {
            crm,
            quotations,
            notifier,
        }
    }
}

impl<C: CrmRepository, Qr: QuotationRepository, L: MessageLogRepository, S: OutboundMessenger>
    TaskHandler for QuotationFollowupHandler<C, Qr, L, S>
{
    async fn handle(&self, task: &TaskRecord) -> Result<(), TaskError> {
        let QuotationTask::QuotationSent {
            quotation_id,
            customer_id,
            job_id,
            session_id,
        } = decode_payload::<QuotationTask>(task)?;

        let Some(quotation) = self.quotations.get(&quotation_id).await? else {
            warn!(%quotation_id, "quotation missing, skipping follow-up");
            return Ok(());
        };
        if quotation.status != QuotationStatus::Sent {
            info!(%quotation_id, status = %quotation.status, "quotation already decided, skipping follow-up");
            return Ok(());
        }
        let Some(customer) = self.crm.get_customer(&customer_id).await? else {
            warn!(%quotation_id, %customer_id, "customer missing, skipping follow-up");
            return Ok(());
        };

        let text = templates::quotation_summary(&quotation.number, quotation.total);
        self.notifier
            .send(session_id.as_deref(), &customer, job_id.or(quotation.job_id), &text)
            .await?;
        info!(%quotation_id, number = %quotation.number, "quotation summary sent");
        Ok(())
    }
}
