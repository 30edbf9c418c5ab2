//! Session registry and lifecycle controller.
//!
//! Owns one transport connection per session id, drives each session's state
//! machine from its transport events, and exposes outbound sending to the
//! workflow handlers.

pub mod registry;

pub use registry::{LiveSession, SessionRegistry};

use voltura_types::error::SessionError;
use voltura_types::message::InboundMessage;

/// Consumer of inbound transport messages.
///
/// Called from the session's event loop, one message at a time, so
/// messages of one session are handled in arrival order.
pub trait InboundSink: Send + Sync + 'static {
    fn accept(
        &self,
        session_id: &str,
        message: InboundMessage,
    ) -> impl std::future::Future<Output = ()> + Send;
}

/// Outbound text delivery through a session.
pub trait OutboundMessenger: Send + Sync + 'static {
    fn send_text(
        &self,
        session_id: &str,
        phone: &str,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), SessionError>> + Send;
}

impl<T: OutboundMessenger> OutboundMessenger for std::sync::Arc<T> {
    async fn send_text(&self, session_id: &str, phone: &str, text: &str) -> Result<(), SessionError> {
        (**self).send_text(session_id, phone, text).await
    }
}

impl<T: InboundSink> InboundSink for std::sync::Arc<T> {
    async fn accept(&self, session_id: &str, message: InboundMessage) {
        (**self).accept(session_id, message).await
    }
}
