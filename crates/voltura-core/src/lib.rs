//! Session registry, workflow dispatcher and business logic for Voltura Service Hub.
//!
//! This crate defines the "ports" (repository, transport and queue traits)
//! that the infrastructure layer implements. It depends only on
//! `voltura-types` -- never on `voltura-infra` or any database/IO crate.

pub mod dispatch;
pub mod event;
pub mod ingest;
pub mod repository;
pub mod service;
pub mod session;
pub mod transport;
pub mod workflow;
