//! Shared domain types for Voltura Service Hub.
//!
//! This crate contains the domain types used across the platform: chat
//! sessions, customers, jobs, quotations, invoices, inventory, reminders,
//! the message log, workflow task payloads, domain events, configuration,
//! and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, rust_decimal, thiserror.

pub mod config;
pub mod customer;
pub mod dashboard;
pub mod error;
pub mod event;
pub mod inventory;
pub mod invoice;
pub mod job;
pub mod message;
pub mod numbering;
pub mod quotation;
pub mod reminder;
pub mod session;
pub mod task;
