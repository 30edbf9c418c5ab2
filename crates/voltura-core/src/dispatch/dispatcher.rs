//! Consumer side of the dispatcher: per-queue worker loops.
//!
//! One loop per registered queue claims tasks in FIFO order and runs them on
//! a `JoinSet`, with a semaphore bounding the queue's concurrency. Each task
//! runs under a lease that its worker renews while the handler runs; a
//! supervisor returns tasks with expired leases to `pending` at startup and
//! once per lease period, which is what makes delivery at-least-once across
//! crashes.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;
use voltura_types::config::{DispatcherConfig, QueuePolicy};
use voltura_types::error::{RepositoryError, TaskError};
use voltura_types::event::DomainEvent;
use voltura_types::task::{TaskFailure, TaskRecord};

use super::handler::{BoxTaskHandler, TaskHandler};
use super::scheduler::TaskScheduler;
use crate::event::EventBus;
use crate::repository::task::TaskQueue;

const FAILURE_CHANNEL_CAPACITY: usize = 256;

pub struct Dispatcher<Q: TaskQueue> {
    scheduler: TaskScheduler<Q>,
    handlers: HashMap<String, Arc<BoxTaskHandler>>,
    poll_interval: Duration,
    lease: Duration,
    failures: broadcast::Sender<TaskFailure>,
    events: Option<EventBus>,
}

impl<Q: TaskQueue> Dispatcher<Q> {
    pub fn new(scheduler: TaskScheduler<Q>, config: &DispatcherConfig) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            scheduler,
            handlers: HashMap::new(),
            poll_interval: config.poll_interval(),
            lease: config.lease(),
            failures,
            events: None,
        }
    }

    /// Also publish `TaskFailed` domain events for permanent failures.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Register the handler for one queue, replacing any previous one.
    pub fn register<H: TaskHandler>(&mut self, queue: &str, handler: H) {
        self.handlers
            .insert(queue.to_string(), Arc::new(BoxTaskHandler::new(handler)));
    }

    pub fn queues(&self) -> Vec<String> {
        let mut queues: Vec<String> = self.handlers.keys().cloned().collect();
        queues.sort();
        queues
    }

    /// Stream of tasks that failed permanently.
    pub fn failures(&self) -> broadcast::Receiver<TaskFailure> {
        self.failures.subscribe()
    }

    pub async fn task(&self, id: &Uuid) -> Result<Option<TaskRecord>, RepositoryError> {
        self.scheduler.queue().get(id).await
    }

    /// Spawn the worker loops. They run until `cancel` fires, then stop
    /// claiming and wait for in-flight tasks to finish.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        let this = Arc::new(self);
        tokio::spawn(async move {
            this.recover_stale().await;

            let mut loops = JoinSet::new();
            for (queue, handler) in &this.handlers {
                let policy = this.scheduler.policy(queue);
                info!(queue = %queue, concurrency = policy.concurrency, max_attempts = policy.max_attempts, "starting queue worker");
                loops.spawn(this.clone().run_queue(
                    queue.clone(),
                    handler.clone(),
                    policy,
                    cancel.clone(),
                ));
            }

            let mut sweep = tokio::time::interval(this.lease);
            sweep.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sweep.tick() => this.recover_stale().await,
                }
            }

            while let Some(result) = loops.join_next().await {
                if let Err(e) = result {
                    error!(error = %e, "queue worker aborted");
                }
            }
            info!("dispatcher stopped");
        })
    }

    async fn recover_stale(&self) {
        match self.scheduler.queue().recover_stale(Utc::now()).await {
            Ok(0) => {}
            Ok(n) => warn!(recovered = n, "returned tasks with expired leases to pending"),
            Err(e) => error!(error = %e, "failed to recover stale tasks"),
        }
    }

    async fn run_queue(
        self: Arc<Self>,
        queue: String,
        handler: Arc<BoxTaskHandler>,
        policy: QueuePolicy,
        cancel: CancellationToken,
    ) {
        let permits = Arc::new(Semaphore::new(policy.concurrency.max(1)));
        let wake = self.scheduler.notifier(&queue);
        let mut in_flight = JoinSet::new();

        loop {
            while let Some(result) = in_flight.try_join_next() {
                if let Err(e) = result {
                    error!(queue = %queue, error = %e, "task execution aborted");
                }
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let claimed = self
                .scheduler
                .queue()
                .claim(&queue, Utc::now(), self.lease)
                .await;

            match claimed {
                Ok(Some(task)) => {
                    let this = self.clone();
                    let handler = handler.clone();
                    let policy = policy.clone();
                    let span = info_span!("task", task_id = %task.id, queue = %task.queue, attempt = task.attempts);
                    in_flight.spawn(
                        async move {
                            this.execute(&handler, task, &policy).await;
                            drop(permit);
                        }
                        .instrument(span),
                    );
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = wake.notified() => {}
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Err(e) => {
                    drop(permit);
                    error!(queue = %queue, error = %e, "failed to claim task");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }

        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                error!(queue = %queue, error = %e, "task execution aborted");
            }
        }
        debug!(queue = %queue, "queue worker stopped");
    }

    async fn execute(&self, handler: &BoxTaskHandler, task: TaskRecord, policy: &QueuePolicy) {
        // Recovered tasks can come back with their budget already spent
        if task.attempts > task.max_attempts {
            self.fail(&task, "attempts exhausted", false).await;
            return;
        }

        let run = AssertUnwindSafe(handler.handle(&task)).catch_unwind();
        let mut run = std::pin::pin!(run);
        // Renew the lease while the handler runs so the stale sweep never
        // hands a live task to a second worker
        let mut heartbeat = tokio::time::interval(self.lease / 3);
        heartbeat.tick().await;
        let result = loop {
            tokio::select! {
                result = &mut run => {
                    break result.unwrap_or_else(|_| Err(TaskError::Transient("handler panicked".into())));
                }
                _ = heartbeat.tick() => self.renew_lease(&task).await,
            }
        };

        let now = Utc::now();
        match result {
            Ok(()) => {
                if let Err(e) = self.scheduler.queue().complete(&task.id, now).await {
                    error!(error = %e, "failed to mark task complete");
                } else {
                    debug!("task completed");
                }
            }
            Err(err) if err.is_permanent() || task.attempts_exhausted() => {
                self.fail(&task, &err.to_string(), err.is_permanent()).await;
            }
            Err(err) => {
                let delay = policy.backoff.delay_for(task.attempts);
                let available_at = now
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                warn!(error = %err, retry_in_ms = delay.as_millis() as u64, "task failed, will retry");
                if let Err(e) = self
                    .scheduler
                    .queue()
                    .retry(&task.id, available_at, &err.to_string(), now)
                    .await
                {
                    error!(error = %e, "failed to reschedule task");
                }
            }
        }
    }

    async fn renew_lease(&self, task: &TaskRecord) {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(self.lease).unwrap_or_else(|_| chrono::Duration::zero());
        match self.scheduler.queue().renew_lease(&task.id, now + lease, now).await {
            Ok(true) => debug!("lease renewed"),
            Ok(false) => warn!("task is no longer running, lease not renewed"),
            Err(e) => error!(error = %e, "failed to renew lease"),
        }
    }

    async fn fail(&self, task: &TaskRecord, error: &str, permanent: bool) {
        let now = Utc::now();
        if let Err(e) = self.scheduler.queue().fail(&task.id, error, now).await {
            error!(error = %e, "failed to mark task failed");
        }
        error!(attempts = task.attempts, permanent, error, "task failed permanently");

        let _ = self.failures.send(TaskFailure {
            task_id: task.id,
            queue: task.queue.clone(),
            attempts: task.attempts,
            error: error.to_string(),
            permanent,
            payload: task.payload.clone(),
            failed_at: now,
        });
        if let Some(events) = &self.events {
            events.publish(DomainEvent::TaskFailed {
                task_id: task.id,
                queue: task.queue.clone(),
                error: error.to_string(),
            });
        }
    }
}
