//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (voltura-infra) implements. The core crate never depends on any
//! specific storage technology.

pub mod crm;
pub mod invoice;
pub mod message;
pub mod quotation;
pub mod reminder;
pub mod session;
pub mod task;
