//! Producer side of the dispatcher: typed enqueueing with per-queue policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Notify;
use uuid::Uuid;
use voltura_types::config::{QueuePolicy, QueuesConfig};
use voltura_types::error::ServiceError;
use voltura_types::task::{
    CONCIERGE_QUEUE, NOTIFICATION_QUEUE, QUOTATION_QUEUE, TaskPayload, TaskRecord,
};

use crate::repository::task::TaskQueue;

/// Enqueues tasks onto named queues.
///
/// Cheap to clone; shared by services, the ingestor and the dispatcher.
/// Enqueueing wakes the matching dispatcher loop in this process so
/// immediately-eligible tasks don't wait for the next poll.
pub struct TaskScheduler<Q: TaskQueue> {
    queue: Arc<Q>,
    policies: Arc<HashMap<String, QueuePolicy>>,
    wake: Arc<DashMap<String, Arc<Notify>>>,
}

impl<Q: TaskQueue> Clone for TaskScheduler<Q> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            policies: self.policies.clone(),
            wake: self.wake.clone(),
        }
    }
}

impl<Q: TaskQueue> TaskScheduler<Q> {
    pub fn new(queue: Q, queues: &QueuesConfig) -> Self {
        let mut policies = HashMap::new();
        policies.insert(CONCIERGE_QUEUE.to_string(), queues.concierge.clone());
        policies.insert(QUOTATION_QUEUE.to_string(), queues.quotation.clone());
        policies.insert(NOTIFICATION_QUEUE.to_string(), queues.notifications.clone());
        Self {
            queue: Arc::new(queue),
            policies: Arc::new(policies),
            wake: Arc::new(DashMap::new()),
        }
    }

    /// Override (or add) the policy of one queue. Call before cloning.
    pub fn with_policy(mut self, queue: &str, policy: QueuePolicy) -> Self {
        Arc::make_mut(&mut self.policies).insert(queue.to_string(), policy);
        self
    }

    /// Policy of `queue`; unknown queues get the default policy.
    pub fn policy(&self, queue: &str) -> QueuePolicy {
        self.policies.get(queue).cloned().unwrap_or_default()
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Enqueue a typed payload on its queue, optionally delayed.
    pub async fn enqueue<P: TaskPayload>(
        &self,
        payload: &P,
        delay: Option<Duration>,
    ) -> Result<Uuid, ServiceError> {
        let now = Utc::now();
        let available_at = match delay {
            Some(delay) => {
                now + chrono::Duration::from_std(delay)
                    .map_err(|e| ServiceError::Queue(format!("invalid delay: {e}")))?
            }
            None => now,
        };
        self.enqueue_at(payload, available_at).await
    }

    /// Enqueue a typed payload that becomes eligible at `available_at`.
    pub async fn enqueue_at<P: TaskPayload>(
        &self,
        payload: &P,
        available_at: DateTime<Utc>,
    ) -> Result<Uuid, ServiceError> {
        let task = self.prepare(payload, available_at)?;
        self.queue
            .enqueue(&task)
            .await
            .map_err(|e| ServiceError::Queue(e.to_string()))?;
        self.announce(&task);
        Ok(task.id)
    }

    /// Enqueue an already-encoded payload.
    pub async fn enqueue_raw(
        &self,
        queue: &str,
        payload: serde_json::Value,
        available_at: DateTime<Utc>,
    ) -> Result<Uuid, ServiceError> {
        let task = self.record(queue, payload, available_at);
        self.queue
            .enqueue(&task)
            .await
            .map_err(|e| ServiceError::Queue(e.to_string()))?;
        self.announce(&task);
        Ok(task.id)
    }

    /// Build the task for a typed payload without writing it.
    ///
    /// Repositories insert prepared tasks in the same transaction as the
    /// business rows they follow up on, so both commit or neither does.
    /// Call [`announce`](Self::announce) once that transaction has committed.
    pub fn prepare<P: TaskPayload>(
        &self,
        payload: &P,
        available_at: DateTime<Utc>,
    ) -> Result<TaskRecord, ServiceError> {
        let value = serde_json::to_value(payload)
            .map_err(|e| ServiceError::Queue(format!("failed to encode payload: {e}")))?;
        Ok(self.record(P::QUEUE, value, available_at))
    }

    /// Note a committed task and wake its queue's loop if it is already eligible.
    pub fn announce(&self, task: &TaskRecord) {
        tracing::debug!(task_id = %task.id, queue = %task.queue, available_at = %task.available_at, "task enqueued");
        if task.available_at <= Utc::now() {
            self.notifier(&task.queue).notify_one();
        }
    }

    fn record(&self, queue: &str, payload: serde_json::Value, available_at: DateTime<Utc>) -> TaskRecord {
        let policy = self.policy(queue);
        TaskRecord::new(queue, payload, available_at, policy.max_attempts, Utc::now())
    }

    /// Wake-up handle for one queue's consumer loop.
    pub(crate) fn notifier(&self, queue: &str) -> Arc<Notify> {
        self.wake
            .entry(queue.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }
}
