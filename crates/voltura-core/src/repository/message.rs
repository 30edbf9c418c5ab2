//! Message log repository trait definition.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use voltura_types::error::RepositoryError;
use voltura_types::message::MessageLog;
use voltura_types::task::TaskRecord;

/// Append-only audit trail of chat messages.
///
/// The only mutation after insertion is flipping the `processed` flag.
pub trait MessageLogRepository: Send + Sync + 'static {
    fn append(
        &self,
        message: &MessageLog,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Append a message and the task that will process it, in one transaction.
    fn append_with_task(
        &self,
        message: &MessageLog,
        task: &TaskRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<MessageLog>, RepositoryError>> + Send;

    /// Mark a message processed. Returns `false` if it already was.
    fn mark_processed(
        &self,
        id: &Uuid,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Messages for one customer, newest first.
    fn list_for_customer(
        &self,
        customer_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<MessageLog>, RepositoryError>> + Send;
}
