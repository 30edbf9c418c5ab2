//! Task handler trait and its boxed, object-safe wrapper.
//!
//! The dyn-safe wrapper follows a blanket-impl pattern:
//! 1. `TaskHandlerDyn` is object-safe with a boxed future
//! 2. Blanket-impl `TaskHandlerDyn` for all `T: TaskHandler`
//! 3. `BoxTaskHandler` wraps `Box<dyn TaskHandlerDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use voltura_types::error::TaskError;
use voltura_types::task::{TaskPayload, TaskRecord};

/// Processes tasks claimed from one named queue.
///
/// Handlers must be idempotent: delivery is at-least-once.
pub trait TaskHandler: Send + Sync + 'static {
    fn handle(&self, task: &TaskRecord) -> impl Future<Output = Result<(), TaskError>> + Send;
}

/// Object-safe version of [`TaskHandler`].
pub trait TaskHandlerDyn: Send + Sync {
    fn handle_boxed<'a>(
        &'a self,
        task: &'a TaskRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'a>>;
}

impl<T: TaskHandler> TaskHandlerDyn for T {
    fn handle_boxed<'a>(
        &'a self,
        task: &'a TaskRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'a>> {
        Box::pin(self.handle(task))
    }
}

/// Type-erased task handler, so one dispatcher can hold handlers of
/// different concrete types.
pub struct BoxTaskHandler {
    inner: Box<dyn TaskHandlerDyn + Send + Sync>,
}

impl BoxTaskHandler {
    pub fn new<T: TaskHandler>(handler: T) -> Self {
        Self {
            inner: Box::new(handler),
        }
    }
}

impl TaskHandler for BoxTaskHandler {
    async fn handle(&self, task: &TaskRecord) -> Result<(), TaskError> {
        self.inner.handle_boxed(task).await
    }
}

/// Decode a task's JSON payload into its queue's payload type.
///
/// A payload that does not decode (unknown `type` tag, missing fields) can
/// never succeed, so it is a permanent failure.
pub fn decode_payload<P: TaskPayload>(task: &TaskRecord) -> Result<P, TaskError> {
    serde_json::from_value(task.payload.clone()).map_err(|e| {
        TaskError::Permanent(format!(
            "invalid payload for queue '{}': {e}",
            task.queue
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;
    use voltura_types::task::{CONCIERGE_QUEUE, ConciergeTask, NOTIFICATION_QUEUE};

    struct Echo;

    impl TaskHandler for Echo {
        async fn handle(&self, task: &TaskRecord) -> Result<(), TaskError> {
            if task.payload["fail"] == json!(true) {
                Err(TaskError::Transient("asked to fail".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_box_handler_delegates() {
        let handler = BoxTaskHandler::new(Echo);
        let now = Utc::now();
        let ok = TaskRecord::new(CONCIERGE_QUEUE, json!({}), now, 3, now);
        let bad = TaskRecord::new(CONCIERGE_QUEUE, json!({ "fail": true }), now, 3, now);
        assert!(handler.handle(&ok).await.is_ok());
        assert!(handler.handle(&bad).await.is_err());
    }

    #[test]
    fn test_decode_payload() {
        let now = Utc::now();
        let message_id = Uuid::now_v7();
        let job_id = Uuid::now_v7();
        let task = TaskRecord::new(
            CONCIERGE_QUEUE,
            json!({
                "type": "intake",
                "message_id": message_id,
                "session_id": "primary",
                "phone": "60123456789",
                "job_id": job_id,
            }),
            now,
            3,
            now,
        );
        let decoded: ConciergeTask = decode_payload(&task).unwrap();
        assert_eq!(
            decoded,
            ConciergeTask::Intake {
                message_id,
                session_id: "primary".into(),
                phone: "60123456789".into(),
                job_id,
            }
        );
    }

    #[test]
    fn test_decode_unknown_tag_is_permanent() {
        let now = Utc::now();
        let task = TaskRecord::new(NOTIFICATION_QUEUE, json!({ "type": "birthday" }), now, 3, now);
        let err = decode_payload::<ConciergeTask>(&task).unwrap_err();
        assert!(err.is_permanent());
    }
}
