//! Session repository trait definition.

use voltura_types::error::RepositoryError;
use voltura_types::session::SessionRecord;

/// Persistence for the durable projection of transport sessions.
///
/// Rows are never hard-deleted; a logged-out session keeps its row.
pub trait SessionRepository: Send + Sync + 'static {
    fn get(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<SessionRecord>, RepositoryError>> + Send;

    /// Insert or fully replace the row for `record.id`.
    fn upsert(
        &self,
        record: &SessionRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn list(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<SessionRecord>, RepositoryError>> + Send;
}
