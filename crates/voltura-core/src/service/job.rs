//! Job status transitions.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use voltura_types::error::ServiceError;
use voltura_types::event::DomainEvent;
use voltura_types::job::{Job, JobStatus};

use crate::event::EventBus;
use crate::repository::crm::CrmRepository;

pub struct JobService<C: CrmRepository> {
    crm: Arc<C>,
    events: EventBus,
}

impl<C: CrmRepository> JobService<C> {
    pub fn new(crm: Arc<C>, events: EventBus) -> Self {
        Self { crm, events }
    }

    /// Move a job one step along `PENDING -> IN_PROGRESS -> COMPLETED -> DELIVERED`.
    ///
    /// Skipping a step or moving backwards is a validation error.
    pub async fn advance(&self, job_id: &Uuid, target: JobStatus) -> Result<Job, ServiceError> {
        let mut job = self
            .crm
            .get_job(job_id)
            .await?
            .ok_or(ServiceError::NotFound("job"))?;

        if !job.status.can_advance_to(target) {
            return Err(ServiceError::Validation(format!(
                "job {} cannot move from {} to {target}",
                job.ticket_number, job.status
            )));
        }

        let now = Utc::now();
        if !self.crm.transition_job(job_id, job.status, target, now).await? {
            return Err(ServiceError::Conflict(format!(
                "job {} changed status concurrently",
                job.ticket_number
            )));
        }

        info!(job_id = %job.id, from = %job.status, to = %target, "job advanced");
        job.status = target;
        job.updated_at = now;
        self.events.publish(DomainEvent::JobUpdated {
            job_id: job.id,
            status: target,
        });
        Ok(job)
    }

    pub async fn get(&self, job_id: &Uuid) -> Result<Job, ServiceError> {
        self.crm
            .get_job(job_id)
            .await?
            .ok_or(ServiceError::NotFound("job"))
    }
}
