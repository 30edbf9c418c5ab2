//! HTTP/REST API layer for Voltura Service Hub.
//!
//! Axum-based REST API under `/api/`, envelope response format, SSE event
//! feed and CORS support. Handlers stay thin: they parse, call one service
//! and wrap the result.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
