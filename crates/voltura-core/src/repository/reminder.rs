//! Reminder repository trait definition.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use voltura_types::error::RepositoryError;
use voltura_types::reminder::Reminder;
use voltura_types::task::TaskRecord;

pub trait ReminderRepository: Send + Sync + 'static {
    /// Insert a reminder together with its delayed delivery task.
    fn create(
        &self,
        reminder: &Reminder,
        delivery: &TaskRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Reminder>, RepositoryError>> + Send;

    /// Set `sent_at` if it is still unset. Returns `false` when it was already set.
    fn mark_sent(
        &self,
        id: &Uuid,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    fn list_for_job(
        &self,
        job_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<Reminder>, RepositoryError>> + Send;
}
