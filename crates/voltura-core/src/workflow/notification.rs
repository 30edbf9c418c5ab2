//! `notification-outbox` handler: reminders, quotation decisions and POS receipts.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use voltura_types::error::TaskError;
use voltura_types::task::{NotificationTask, TaskRecord};

use super::{Notifier, templates};
use crate::dispatch::{TaskHandler, decode_payload};
use crate::repository::crm::CrmRepository;
use crate::repository::invoice::InvoiceRepository;
use crate::repository::message::MessageLogRepository;
use crate::repository::quotation::QuotationRepository;
use crate::repository::reminder::ReminderRepository;
use crate::session::OutboundMessenger;

pub struct NotificationHandler<C, Qr, I, R, L, S>
where
    C: CrmRepository,
    Qr: QuotationRepository,
    I: InvoiceRepository,
    R: ReminderRepository,
    L: MessageLogRepository,
    S: OutboundMessenger,
{
    crm: Arc<C>,
    quotations: Arc<Qr>,
    invoices: Arc<I>,
    reminders: Arc<R>,
    notifier: Notifier<S, L>,
}

impl<C, Qr, I, R, L, S> NotificationHandler<C, Qr, I, R, L, S>
where
    C: CrmRepository,
    Qr: QuotationRepository,
    I: InvoiceRepository,
    R: ReminderRepository,
    L: MessageLogRepository,
    S: OutboundMessenger,
{
    pub fn new(
        crm: Arc<C>,
        quotations: Arc<Qr>,
        invoices: Arc<I>,
        reminders: Arc<R>,
        notifier: Notifier<S, L>,
    ) -> Self {
        Self {
            crm,
            quotations,
            invoices,
            reminders,
            notifier,
        }
    }

    async fn reminder(
        &self,
        reminder_id: Uuid,
        job_id: Uuid,
        session_id: Option<&str>,
    ) -> Result<(), TaskError> {
        let Some(reminder) = self.reminders.get(&reminder_id).await? else {
            warn!(%reminder_id, "reminder missing, skipping");
            return Ok(());
        };
        if reminder.is_sent() {
            debug!(%reminder_id, "reminder already sent");
            return Ok(());
        }
        let Some(job) = self.crm.get_job(&job_id).await? else {
            warn!(%reminder_id, %job_id, "job for reminder missing, skipping");
            return Ok(());
        };
        let Some(customer) = self.crm.get_customer(&job.customer_id).await? else {
            warn!(%reminder_id, %job_id, "customer for reminder missing, skipping");
            return Ok(());
        };

        let text = templates::reminder(Some(&customer.name), &job.ticket_number, reminder.cadence);
        self.notifier
            .send(session_id, &customer, Some(job.id), &text)
            .await?;

        if !self.reminders.mark_sent(&reminder_id, Utc::now()).await? {
            warn!(%reminder_id, "reminder was marked sent concurrently");
        }
        info!(%reminder_id, cadence = %reminder.cadence, ticket = %job.ticket_number, "reminder sent");
        Ok(())
    }

    async fn quotation_decided(
        &self,
        quotation_id: Uuid,
        accepted: bool,
        session_id: Option<&str>,
    ) -> Result<(), TaskError> {
        let Some(quotation) = self.quotations.get(&quotation_id).await? else {
            warn!(%quotation_id, "quotation missing, skipping notification");
            return Ok(());
        };
        let Some(customer) = self.crm.get_customer(&quotation.customer_id).await? else {
            warn!(%quotation_id, "customer missing, skipping notification");
            return Ok(());
        };

        let text = if accepted {
            templates::quotation_accepted(&quotation.number)
        } else {
            templates::quotation_rejected(&quotation.number)
        };
        self.notifier
            .send(session_id, &customer, quotation.job_id, &text)
            .await?;
        info!(%quotation_id, accepted, "quotation decision notified");
        Ok(())
    }

    async fn pos_receipt(
        &self,
        invoice_id: Uuid,
        customer_id: Uuid,
        session_id: Option<&str>,
    ) -> Result<(), TaskError> {
        let Some(invoice) = self.invoices.get(&invoice_id).await? else {
            warn!(%invoice_id, "invoice missing, skipping receipt");
            return Ok(());
        };
        let Some(customer) = self.crm.get_customer(&customer_id).await? else {
            warn!(%invoice_id, %customer_id, "customer missing, skipping receipt");
            return Ok(());
        };

        let text = templates::pos_receipt(&invoice.number, invoice.total);
        self.notifier
            .send(session_id, &customer, invoice.job_id, &text)
            .await?;
        info!(%invoice_id, number = %invoice.number, "POS receipt sent");
        Ok(())
    }
}

impl<C, Qr, I, R, L, S> TaskHandler for NotificationHandler<C, Qr, I, R, L, S>
where
    C: CrmRepository,
    Qr: QuotationRepository,
    I: InvoiceRepository,
    R: ReminderRepository,
    L: MessageLogRepository,
    S: OutboundMessenger,
{
    async fn handle(&self, task: &TaskRecord) -> Result<(), TaskError> {
        let payload = decode_payload::<NotificationTask>(task)?;
        debug!(kind = payload.kind(), "handling notification");
        let session_id = payload.session_id();

        match &payload {
            NotificationTask::Reminder {
                reminder_id,
                job_id,
                ..
            } => self.reminder(*reminder_id, *job_id, session_id).await,
            NotificationTask::QuotationAccepted { quotation_id, .. } => {
                self.quotation_decided(*quotation_id, true, session_id).await
            }
            NotificationTask::QuotationRejected { quotation_id, .. } => {
                self.quotation_decided(*quotation_id, false, session_id).await
            }
            NotificationTask::PosSale {
                invoice_id,
                customer_id,
                ..
            } => self.pos_receipt(*invoice_id, *customer_id, session_id).await,
        }
    }
}
