//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod crm;
pub mod invoice;
pub mod message;
pub mod pool;
pub mod quotation;
pub mod reminder;
pub(crate) mod row;
pub mod session;
pub mod task;
