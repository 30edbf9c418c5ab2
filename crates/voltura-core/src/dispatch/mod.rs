//! Workflow dispatcher: named durable queues with per-queue concurrency,
//! retry policy and delayed eligibility.
//!
//! - [`TaskScheduler`] is the producer side, used by services and the ingestor.
//! - [`Dispatcher`] runs one worker loop per registered queue.
//! - [`MemoryTaskQueue`] is an in-process queue backend; the SQLite backend
//!   lives in voltura-infra.

pub mod dispatcher;
pub mod handler;
pub mod memory;
pub mod scheduler;

pub use dispatcher::Dispatcher;
pub use handler::{BoxTaskHandler, TaskHandler, decode_payload};
pub use memory::MemoryTaskQueue;
pub use scheduler::TaskScheduler;
