//! Quotation lifecycle: create, accept (materializing exactly one invoice), reject.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use voltura_types::error::ServiceError;
use voltura_types::event::DomainEvent;
use voltura_types::invoice::Invoice;
use voltura_types::numbering::document_number;
use voltura_types::quotation::{
    AcceptedQuotation, NewQuotation, Quotation, QuotationStatus, line_total, validate_line_items,
};
use voltura_types::task::{NotificationTask, QuotationTask};

use super::resolve_customer;
use crate::dispatch::TaskScheduler;
use crate::event::EventBus;
use crate::repository::crm::CrmRepository;
use crate::repository::quotation::QuotationRepository;
use crate::repository::task::TaskQueue;

const DEFAULT_JOB_SUMMARY: &str = "Quotation request";

pub struct QuotationService<Qr: QuotationRepository, C: CrmRepository, Q: TaskQueue> {
    quotations: Arc<Qr>,
    crm: Arc<C>,
    scheduler: TaskScheduler<Q>,
    events: EventBus,
}

impl<Qr: QuotationRepository, C: CrmRepository, Q: TaskQueue> QuotationService<Qr, C, Q> {
    pub fn new(quotations: Arc<Qr>, crm: Arc<C>, scheduler: TaskScheduler<Q>, events: EventBus) -> Self {
        Self {
            quotations,
            crm,
            scheduler,
            events,
        }
    }

    /// Create a quotation and queue its summary for the customer.
    ///
    /// The quotation attaches to `job_id` when given, otherwise to the
    /// customer's open job (opened if none exists). The job's estimated cost
    /// is set to the quotation total.
    pub async fn create(
        &self,
        request: NewQuotation,
        session_id: Option<String>,
    ) -> Result<Quotation, ServiceError> {
        validate_line_items(&request.line_items).map_err(ServiceError::Validation)?;
        request.customer.validate().map_err(ServiceError::Validation)?;

        let now = Utc::now();
        let customer = resolve_customer(self.crm.as_ref(), &request.customer, now).await?;

        let job = match request.job_id {
            Some(job_id) => {
                let job = self
                    .crm
                    .get_job(&job_id)
                    .await?
                    .ok_or(ServiceError::NotFound("job"))?;
                if job.customer_id != customer.id {
                    return Err(ServiceError::Validation(format!(
                        "job {} belongs to another customer",
                        job.ticket_number
                    )));
                }
                job
            }
            None => {
                let summary = request
                    .notes
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .unwrap_or(DEFAULT_JOB_SUMMARY);
                self.crm
                    .find_or_create_open_job(&customer.id, summary, now)
                    .await?
                    .0
            }
        };

        let total = line_total(&request.line_items);
        let quotation = Quotation {
            id: Uuid::now_v7(),
            number: document_number("QT", now),
            customer_id: customer.id,
            job_id: Some(job.id),
            status: QuotationStatus::Sent,
            total,
            line_items: request.line_items,
            notes: request.notes,
            valid_until: request.valid_until,
            decided_at: None,
            created_at: now,
            updated_at: now,
        };
        let followup = self.scheduler.prepare(
            &QuotationTask::QuotationSent {
                quotation_id: quotation.id,
                customer_id: customer.id,
                job_id: Some(job.id),
                session_id,
            },
            now,
        )?;
        self.quotations.create(&quotation, &followup).await?;
        self.scheduler.announce(&followup);
        info!(quotation_id = %quotation.id, number = %quotation.number, %total, "quotation created");

        self.events.publish(DomainEvent::QuotationCreated {
            quotation: quotation.clone(),
        });
        Ok(quotation)
    }

    /// Accept a quotation. Accepting again refreshes the same invoice and
    /// does not notify the customer a second time.
    pub async fn accept(
        &self,
        quotation_id: &Uuid,
        session_id: Option<String>,
    ) -> Result<AcceptedQuotation, ServiceError> {
        let quotation = self.get(quotation_id).await?;
        if quotation.status == QuotationStatus::Rejected {
            return Err(ServiceError::Validation(format!(
                "quotation {} was already rejected",
                quotation.number
            )));
        }

        let now = Utc::now();
        let draft = Invoice {
            id: Uuid::now_v7(),
            number: document_number("INV", now),
            customer_id: quotation.customer_id,
            job_id: quotation.job_id,
            quotation_id: Some(quotation.id),
            total: quotation.total,
            balance: quotation.total,
            line_items: quotation.line_items.clone(),
            created_at: now,
            updated_at: now,
        };
        let notification = self.scheduler.prepare(
            &NotificationTask::QuotationAccepted {
                quotation_id: *quotation_id,
                invoice_id: draft.id,
                session_id,
            },
            now,
        )?;
        let accepted = self
            .quotations
            .accept(quotation_id, &draft, &notification, now)
            .await
            .map_err(|e| match ServiceError::from(e) {
                ServiceError::Conflict(msg) => ServiceError::Validation(msg),
                other => other,
            })?;

        info!(
            quotation_id = %quotation_id,
            invoice_id = %accepted.invoice.id,
            newly_accepted = accepted.newly_accepted,
            "quotation accepted"
        );

        if accepted.newly_accepted {
            self.scheduler.announce(&notification);
            self.events.publish(DomainEvent::QuotationAccepted {
                quotation_id: *quotation_id,
                invoice_id: accepted.invoice.id,
            });
        }
        self.events.publish(DomainEvent::InvoiceUpdated {
            invoice: accepted.invoice.clone(),
            paid: rust_decimal::Decimal::ZERO,
        });
        Ok(accepted)
    }

    /// Reject a quotation. Rejecting twice is a no-op.
    pub async fn reject(
        &self,
        quotation_id: &Uuid,
        session_id: Option<String>,
    ) -> Result<Quotation, ServiceError> {
        let quotation = self.get(quotation_id).await?;
        match quotation.status {
            QuotationStatus::Accepted => {
                return Err(ServiceError::Validation(format!(
                    "quotation {} was already accepted",
                    quotation.number
                )));
            }
            QuotationStatus::Rejected => return Ok(quotation),
            QuotationStatus::Sent => {}
        }

        let now = Utc::now();
        let notification = self.scheduler.prepare(
            &NotificationTask::QuotationRejected {
                quotation_id: *quotation_id,
                session_id,
            },
            now,
        )?;
        let (rejected, newly_rejected) = self
            .quotations
            .reject(quotation_id, &notification, now)
            .await
            .map_err(|e| match ServiceError::from(e) {
                ServiceError::Conflict(msg) => ServiceError::Validation(msg),
                other => other,
            })?;
        if newly_rejected {
            info!(quotation_id = %quotation_id, "quotation rejected");
            self.scheduler.announce(&notification);
            self.events.publish(DomainEvent::QuotationRejected {
                quotation_id: *quotation_id,
            });
        }
        Ok(rejected)
    }

    pub async fn get(&self, quotation_id: &Uuid) -> Result<Quotation, ServiceError> {
        self.quotations
            .get(quotation_id)
            .await?
            .ok_or(ServiceError::NotFound("quotation"))
    }
}
