//! Chat transport port.
//!
//! A `Transport` establishes one connection per session and hands back a
//! `TransportHandle` for outbound sends plus an ordered stream of
//! `TransportEvent`s. The wire protocol lives behind this trait, in
//! voltura-infra or an external sidecar.

use tokio::sync::mpsc;
use voltura_types::error::{CredentialError, TransportError};
use voltura_types::message::InboundMessage;
use voltura_types::session::Credentials;

/// Why a transport connection closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The account logged this device out; stored credentials are no longer valid.
    LoggedOut,
    Other(String),
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::LoggedOut => write!(f, "logged out"),
            CloseReason::Other(reason) => write!(f, "{reason}"),
        }
    }
}

/// Events emitted by a live connection, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A pairing payload (QR data) to present to the account owner.
    Pairing(String),
    Open,
    Close(CloseReason),
    Message(InboundMessage),
    /// The transport rotated its credentials; they should be persisted.
    CredentialsUpdated(Credentials),
}

/// An established connection: the handle plus its event stream.
pub struct Connection<H> {
    pub handle: H,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Outbound side of a live connection.
pub trait TransportHandle: Send + Sync + 'static {
    /// Send a text message to a transport address (`{phone}@s.whatsapp.net`).
    fn send_text(
        &self,
        jid: &str,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Close the connection. Must be safe to call more than once.
    fn close(&self) -> impl std::future::Future<Output = ()> + Send;
}

/// Connection factory for one chat transport.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait Transport: Send + Sync + 'static {
    type Handle: TransportHandle;

    fn connect(
        &self,
        session_id: &str,
        credentials: Option<Credentials>,
    ) -> impl std::future::Future<Output = Result<Connection<Self::Handle>, TransportError>> + Send;
}

/// Per-session credential persistence.
pub trait CredentialStore: Send + Sync + 'static {
    fn load(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Credentials>, CredentialError>> + Send;

    fn save(
        &self,
        session_id: &str,
        credentials: &Credentials,
    ) -> impl std::future::Future<Output = Result<(), CredentialError>> + Send;

    /// Forget stored credentials so the next connect starts a fresh pairing flow.
    fn invalidate(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<(), CredentialError>> + Send;
}

/// Transport address for a phone key.
pub fn phone_to_jid(phone: &str) -> String {
    format!("{}@s.whatsapp.net", phone.trim_start_matches('+'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_to_jid() {
        assert_eq!(phone_to_jid("60123456789"), "60123456789@s.whatsapp.net");
        assert_eq!(phone_to_jid("+60123456789"), "60123456789@s.whatsapp.net");
    }

    #[test]
    fn test_close_reason_display() {
        assert_eq!(CloseReason::LoggedOut.to_string(), "logged out");
        assert_eq!(CloseReason::Other("stream errored".into()).to_string(), "stream errored");
    }
}
