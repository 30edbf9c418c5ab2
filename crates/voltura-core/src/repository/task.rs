//! Task queue trait definition (the queue backend port).

use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;
use voltura_types::error::RepositoryError;
use voltura_types::task::TaskRecord;

/// Durable named FIFO queues with delayed eligibility and leases.
///
/// Delivery is at-least-once: a task whose lease expires while `running`
/// is handed out again after `recover_stale`.
pub trait TaskQueue: Send + Sync + 'static {
    fn enqueue(
        &self,
        task: &TaskRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Claim the oldest eligible pending task of `queue` (by `available_at`,
    /// then creation order), marking it `running`, incrementing `attempts`
    /// and setting a lease of `lease` from `now`.
    fn claim(
        &self,
        queue: &str,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> impl std::future::Future<Output = Result<Option<TaskRecord>, RepositoryError>> + Send;

    fn complete(
        &self,
        id: &Uuid,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Extend the lease of a task that is still `running`. Returns `false`
    /// when the task is no longer running (recovered, completed or failed).
    fn renew_lease(
        &self,
        id: &Uuid,
        lease_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Return a running task to `pending`, eligible again at `available_at`.
    fn retry(
        &self,
        id: &Uuid,
        available_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Mark a task permanently failed.
    fn fail(
        &self,
        id: &Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Return running tasks whose lease expired before `now` to `pending`.
    /// Returns how many were recovered.
    fn recover_stale(
        &self,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    fn get(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<TaskRecord>, RepositoryError>> + Send;

    /// Permanently failed tasks, most recent first.
    fn list_failed(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<TaskRecord>, RepositoryError>> + Send;
}
