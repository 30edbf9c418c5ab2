//! In-process `TaskQueue` for tests and single-process deployments without
//! durable queues.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use voltura_types::error::RepositoryError;
use voltura_types::task::{TaskRecord, TaskStatus};

use crate::repository::task::TaskQueue;

/// Mutex-guarded map of tasks. Creation order is tracked with a sequence
/// number so FIFO ties on `available_at` break the same way as the SQL queue.
#[derive(Default)]
pub struct MemoryTaskQueue {
    tasks: Mutex<HashMap<Uuid, (u64, TaskRecord)>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, (u64, TaskRecord)>>, RepositoryError> {
        self.tasks
            .lock()
            .map_err(|_| RepositoryError::Query("task queue lock poisoned".into()))
    }

    fn update<F: FnOnce(&mut TaskRecord)>(&self, id: &Uuid, f: F) -> Result<(), RepositoryError> {
        let mut tasks = self.lock()?;
        let (_, task) = tasks.get_mut(id).ok_or(RepositoryError::NotFound)?;
        f(task);
        Ok(())
    }
}

impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task: &TaskRecord) -> Result<(), RepositoryError> {
        let mut tasks = self.lock()?;
        let seq = tasks.len() as u64;
        tasks.insert(task.id, (seq, task.clone()));
        Ok(())
    }

    async fn claim(
        &self,
        queue: &str,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<TaskRecord>, RepositoryError> {
        let mut tasks = self.lock()?;
        let next = tasks
            .values()
            .filter(|(_, t)| t.queue == queue && t.status == TaskStatus::Pending && t.available_at <= now)
            .min_by_key(|(seq, t)| (t.available_at, *seq))
            .map(|(_, t)| t.id);

        let Some(id) = next else {
            return Ok(None);
        };
        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let Some((_, task)) = tasks.get_mut(&id) else {
            return Ok(None);
        };
        task.status = TaskStatus::Running;
        task.attempts += 1;
        task.lease_until = Some(now + lease);
        task.updated_at = now;
        Ok(Some(task.clone()))
    }

    async fn complete(&self, id: &Uuid, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.update(id, |task| {
            task.status = TaskStatus::Succeeded;
            task.lease_until = None;
            task.updated_at = now;
        })
    }

    async fn renew_lease(
        &self,
        id: &Uuid,
        lease_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut tasks = self.lock()?;
        let Some((_, task)) = tasks.get_mut(id) else {
            return Err(RepositoryError::NotFound);
        };
        if task.status != TaskStatus::Running {
            return Ok(false);
        }
        task.lease_until = Some(lease_until);
        task.updated_at = now;
        Ok(true)
    }

    async fn retry(
        &self,
        id: &Uuid,
        available_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.update(id, |task| {
            task.status = TaskStatus::Pending;
            task.available_at = available_at;
            task.lease_until = None;
            task.last_error = Some(error.to_string());
            task.updated_at = now;
        })
    }

    async fn fail(&self, id: &Uuid, error: &str, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.update(id, |task| {
            task.status = TaskStatus::Failed;
            task.lease_until = None;
            task.last_error = Some(error.to_string());
            task.updated_at = now;
        })
    }

    async fn recover_stale(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut tasks = self.lock()?;
        let mut recovered = 0;
        for (_, task) in tasks.values_mut() {
            let expired = task.lease_until.is_some_and(|lease| lease < now);
            if task.status == TaskStatus::Running && expired {
                task.status = TaskStatus::Pending;
                task.lease_until = None;
                task.updated_at = now;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn get(&self, id: &Uuid) -> Result<Option<TaskRecord>, RepositoryError> {
        Ok(self.lock()?.get(id).map(|(_, t)| t.clone()))
    }

    async fn list_failed(&self, limit: u32) -> Result<Vec<TaskRecord>, RepositoryError> {
        let tasks = self.lock()?;
        let mut failed: Vec<TaskRecord> = tasks
            .values()
            .filter(|(_, t)| t.status == TaskStatus::Failed)
            .map(|(_, t)| t.clone())
            .collect();
        failed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        failed.truncate(limit as usize);
        Ok(failed)
    }
}
