//! Reminder scheduling on the notification queue.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;
use voltura_types::error::ServiceError;
use voltura_types::reminder::{Cadence, Reminder};
use voltura_types::task::NotificationTask;

use crate::dispatch::TaskScheduler;
use crate::repository::crm::CrmRepository;
use crate::repository::reminder::ReminderRepository;
use crate::repository::task::TaskQueue;

pub struct ReminderService<R: ReminderRepository, C: CrmRepository, Q: TaskQueue> {
    reminders: Arc<R>,
    crm: Arc<C>,
    scheduler: TaskScheduler<Q>,
}

impl<R: ReminderRepository, C: CrmRepository, Q: TaskQueue> ReminderService<R, C, Q> {
    pub fn new(reminders: Arc<R>, crm: Arc<C>, scheduler: TaskScheduler<Q>) -> Self {
        Self {
            reminders,
            crm,
            scheduler,
        }
    }

    pub async fn schedule(
        &self,
        job_id: &Uuid,
        cadence: Cadence,
        session_id: Option<String>,
    ) -> Result<Reminder, ServiceError> {
        self.schedule_at(job_id, cadence, session_id, Utc::now()).await
    }

    /// Schedule a reminder `cadence` days after `now`. The reminder and its
    /// delayed delivery task are stored together.
    pub async fn schedule_at(
        &self,
        job_id: &Uuid,
        cadence: Cadence,
        session_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Reminder, ServiceError> {
        self.crm
            .get_job(job_id)
            .await?
            .ok_or(ServiceError::NotFound("job"))?;

        let reminder = Reminder::schedule(*job_id, cadence, now);
        let delivery = self.scheduler.prepare(
            &NotificationTask::Reminder {
                reminder_id: reminder.id,
                job_id: *job_id,
                session_id,
            },
            reminder.send_at,
        )?;
        self.reminders.create(&reminder, &delivery).await?;
        self.scheduler.announce(&delivery);

        info!(reminder_id = %reminder.id, %job_id, %cadence, send_at = %reminder.send_at, "reminder scheduled");
        Ok(reminder)
    }

    pub async fn list_for_job(&self, job_id: &Uuid) -> Result<Vec<Reminder>, ServiceError> {
        Ok(self.reminders.list_for_job(job_id).await?)
    }
}
