//! Infrastructure layer for Voltura Service Hub.
//!
//! Implements the ports defined in `voltura-core`: SQLite repositories and
//! the durable task queue, the file-backed credential store, the HTTP bridge
//! to the chat-transport sidecar, and configuration loading.

pub mod bridge;
pub mod config;
pub mod filesystem;
pub mod sqlite;
