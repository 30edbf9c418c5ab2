//! Inbound message ingestion.
//!
//! Turns a transport message (or a manual intake from the HTTP layer) into a
//! customer, an open job, a message log row, a realtime event and, for
//! customer-originated messages, a concierge intake task.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};
use voltura_types::customer::{MIN_PHONE_LEN, normalize_phone};
use voltura_types::error::ServiceError;
use voltura_types::event::DomainEvent;
use voltura_types::job::CONCIERGE_INTAKE_SUMMARY;
use voltura_types::message::{Direction, InboundMessage, IngestOutcome, ManualIntake, MessageLog};
use voltura_types::task::ConciergeTask;

use crate::dispatch::TaskScheduler;
use crate::event::EventBus;
use crate::repository::crm::{CrmRepository, CustomerPatch};
use crate::repository::message::MessageLogRepository;
use crate::repository::task::TaskQueue;
use crate::session::InboundSink;

pub struct Ingestor<C: CrmRepository, M: MessageLogRepository, Q: TaskQueue> {
    crm: Arc<C>,
    messages: Arc<M>,
    scheduler: TaskScheduler<Q>,
    events: EventBus,
}

impl<C: CrmRepository, M: MessageLogRepository, Q: TaskQueue> Clone for Ingestor<C, M, Q> {
    fn clone(&self) -> Self {
        Self {
            crm: self.crm.clone(),
            messages: self.messages.clone(),
            scheduler: self.scheduler.clone(),
            events: self.events.clone(),
        }
    }
}

impl<C: CrmRepository, M: MessageLogRepository, Q: TaskQueue> Ingestor<C, M, Q> {
    pub fn new(crm: Arc<C>, messages: Arc<M>, scheduler: TaskScheduler<Q>, events: EventBus) -> Self {
        Self {
            crm,
            messages,
            scheduler,
            events,
        }
    }

    /// Ingest one transport message for `session_id`.
    pub async fn ingest(
        &self,
        session_id: &str,
        message: &InboundMessage,
    ) -> Result<IngestOutcome, ServiceError> {
        let phone = normalize_phone(&message.remote_jid).ok_or_else(|| {
            ServiceError::Validation(format!("cannot derive a phone from '{}'", message.remote_jid))
        })?;
        let now = Utc::now();

        let customer = self
            .crm
            .upsert_customer(&phone, CustomerPatch::default(), now)
            .await?;

        let direction = message.direction();
        let job = match direction {
            Direction::Inbound => {
                let (job, created) = self
                    .crm
                    .find_or_create_open_job(&customer.id, CONCIERGE_INTAKE_SUMMARY, now)
                    .await?;
                if created {
                    info!(customer_id = %customer.id, ticket = %job.ticket_number, "opened job from inbound message");
                }
                Some(job)
            }
            // Our own messages echoed back attach to an open job but never create one
            Direction::Outbound => self.crm.find_open_job(&customer.id).await?,
        };
        let job_id = job.map(|j| j.id);

        let mut log = MessageLog::new(
            customer.id,
            session_id,
            job_id,
            direction,
            message.log_content(),
            now,
        );
        log.media_url = message.media_url.clone();

        // Inbound messages on a job are logged together with their intake task.
        let intake = match (direction, job_id) {
            (Direction::Inbound, Some(job_id)) => Some(self.scheduler.prepare(
                &ConciergeTask::Intake {
                    message_id: log.id,
                    session_id: session_id.to_string(),
                    phone: phone.clone(),
                    job_id,
                },
                now,
            )?),
            _ => None,
        };
        match &intake {
            Some(task) => self.messages.append_with_task(&log, task).await?,
            None => self.messages.append(&log).await?,
        }

        debug!(session_id, customer_id = %customer.id, message_id = %log.id, %direction, "message logged");
        let message_id = log.id;
        self.events.publish(DomainEvent::MessageReceived {
            session_id: session_id.to_string(),
            customer_id: customer.id,
            job_id,
            message: log,
        });

        if let Some(task) = &intake {
            self.scheduler.announce(task);
        }

        Ok(IngestOutcome {
            customer_id: customer.id,
            job_id,
            message_id,
        })
    }

    /// Ingest a message entered by staff through the HTTP layer.
    pub async fn ingest_manual(&self, intake: &ManualIntake) -> Result<IngestOutcome, ServiceError> {
        if intake.session_id.trim().is_empty() {
            return Err(ServiceError::Validation("session id is required".into()));
        }
        if intake.phone.trim().len() < MIN_PHONE_LEN {
            return Err(ServiceError::Validation(format!(
                "phone must have at least {MIN_PHONE_LEN} characters"
            )));
        }
        if intake.message.trim().is_empty() {
            return Err(ServiceError::Validation("message is required".into()));
        }

        let message = InboundMessage {
            remote_jid: intake.phone.trim().to_string(),
            from_me: false,
            text: Some(intake.message.clone()),
            media_url: intake.attachments.first().cloned(),
        };
        self.ingest(&intake.session_id, &message).await
    }
}

impl<C: CrmRepository, M: MessageLogRepository, Q: TaskQueue> InboundSink for Ingestor<C, M, Q> {
    async fn accept(&self, session_id: &str, message: InboundMessage) {
        if let Err(e) = self.ingest(session_id, &message).await {
            error!(session_id, remote_jid = %message.remote_jid, error = %e, "failed to ingest inbound message");
        }
    }
}
