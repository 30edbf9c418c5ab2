//! HTTP bridge to the chat-transport sidecar.
//!
//! The multi-device wire protocol runs in a sidecar process. Voltura talks
//! to it over a small HTTP API:
//!
//! - `POST /sessions/{id}/connect` with `{"credentials": ...}` starts a connection
//! - `GET /sessions/{id}/events` streams connection events as Server-Sent Events
//! - `POST /sessions/{id}/messages` with `{"jid": ..., "text": ...}` sends text
//! - `POST /sessions/{id}/close` closes the connection
//!
//! The optional API key is sent as a bearer token.

pub mod client;
pub mod events;

pub use client::{BridgeHandle, BridgeTransport};
