//! Mapping of bridge SSE events to [`TransportEvent`]s.

use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use voltura_core::transport::{CloseReason, TransportEvent};
use voltura_types::error::TransportError;
use voltura_types::message::InboundMessage;
use voltura_types::session::Credentials;

#[derive(Debug, Deserialize)]
struct PairingData {
    qr: String,
}

#[derive(Debug, Deserialize)]
struct CloseData {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    logged_out: bool,
}

/// Decode one SSE event. Unknown event names yield `Ok(None)` so the sidecar
/// can add events without breaking older hubs.
pub fn parse_event(event: &str, data: &str) -> Result<Option<TransportEvent>, TransportError> {
    let decoded = match event {
        "pairing" => {
            let pairing: PairingData = decode(event, data)?;
            TransportEvent::Pairing(pairing.qr)
        }
        "open" => TransportEvent::Open,
        "close" => {
            let close: CloseData = if data.trim().is_empty() {
                CloseData {
                    reason: None,
                    logged_out: false,
                }
            } else {
                decode(event, data)?
            };
            if close.logged_out {
                TransportEvent::Close(CloseReason::LoggedOut)
            } else {
                TransportEvent::Close(CloseReason::Other(
                    close.reason.unwrap_or_else(|| "closed by bridge".to_string()),
                ))
            }
        }
        "message" => TransportEvent::Message(decode::<InboundMessage>(event, data)?),
        "credentials" => TransportEvent::CredentialsUpdated(Credentials(decode(event, data)?)),
        other => {
            tracing::debug!(event = other, "ignoring unknown bridge event");
            return Ok(None);
        }
    };
    Ok(Some(decoded))
}

fn decode<T: serde::de::DeserializeOwned>(event: &str, data: &str) -> Result<T, TransportError> {
    serde_json::from_str(data)
        .map_err(|e| TransportError::Protocol(format!("bad '{event}' event: {e}")))
}

/// Forward decoded events into `tx` until the stream ends, a close event is
/// seen, the receiver goes away, or `cancel` fires.
///
/// A stream that ends or errors without a close event is reported as a
/// transient close so the registry drops the session.
pub async fn pump<S>(stream: S, tx: mpsc::Sender<TransportEvent>, cancel: CancellationToken)
where
    S: Stream<Item = Result<(String, String), TransportError>> + Send,
{
    let mut stream = std::pin::pin!(stream);

    let reason = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = stream.next() => next,
        };

        let (event, data) = match next {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => break e.to_string(),
            None => break "event stream ended".to_string(),
        };

        match parse_event(&event, &data) {
            Ok(Some(event)) => {
                let closing = matches!(event, TransportEvent::Close(_));
                if tx.send(event).await.is_err() || closing {
                    return;
                }
            }
            Ok(None) => {}
            // A single malformed event is not fatal
            Err(e) => tracing::warn!(error = %e, "dropping malformed bridge event"),
        }
    };

    let _ = tx
        .send(TransportEvent::Close(CloseReason::Other(reason)))
        .await;
}
