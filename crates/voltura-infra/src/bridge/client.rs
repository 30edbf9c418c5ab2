//! `BridgeTransport`: a [`Transport`] that drives the sidecar over HTTP.
//!
//! The API key is wrapped in [`SecretString`] and only exposed when the
//! authorization header is built.

use std::sync::Arc;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use voltura_core::transport::{Connection, Transport, TransportHandle};
use voltura_types::config::BridgeConfig;
use voltura_types::error::TransportError;
use voltura_types::session::Credentials;

use super::events::pump;

/// Events buffered between the SSE reader and the session registry.
const EVENT_BUFFER: usize = 256;

/// Limit for one-shot requests (send, close); the event stream has none.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

struct BridgeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl BridgeClient {
    fn url(&self, session_id: &str, action: &str) -> String {
        format!("{}/sessions/{session_id}/{action}", self.base_url)
    }

    fn post(&self, session_id: &str, action: &str) -> reqwest::RequestBuilder {
        self.authorize(self.http.post(self.url(session_id, action)))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }
}

/// Map a non-success response to an error carrying the body.
async fn check(
    response: reqwest::Response,
    err: fn(String) -> TransportError,
) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(%status, body = %body, "bridge returned an error");
    Err(err(format!("HTTP {status}: {body}")))
}

pub struct BridgeTransport {
    client: Arc<BridgeClient>,
}

impl BridgeTransport {
    pub fn new(config: &BridgeConfig) -> Result<Self, TransportError> {
        // No overall timeout: the event stream is long-lived.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Connect(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client: Arc::new(BridgeClient {
                http,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                api_key: config.api_key.clone().map(SecretString::from),
            }),
        })
    }
}

impl Transport for BridgeTransport {
    type Handle = BridgeHandle;

    async fn connect(
        &self,
        session_id: &str,
        credentials: Option<Credentials>,
    ) -> Result<Connection<BridgeHandle>, TransportError> {
        let response = self
            .client
            .post(session_id, "connect")
            .json(&json!({ "credentials": credentials.map(|c| c.0) }))
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        check(response, TransportError::Connect).await?;

        let response = self
            .client
            .authorize(self.client.http.get(self.client.url(session_id, "events")))
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let response = check(response, TransportError::Connect).await?;

        let events = response.bytes_stream().eventsource().map(|result| {
            result
                .map(|event| (event.event, event.data))
                .map_err(|e| TransportError::Protocol(format!("SSE stream error: {e}")))
        });

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        tokio::spawn(pump(events, tx, cancel.clone()));

        tracing::info!(session_id, "bridge connection established");
        Ok(Connection {
            handle: BridgeHandle {
                client: self.client.clone(),
                session_id: session_id.to_string(),
                cancel,
            },
            events: rx,
        })
    }
}

pub struct BridgeHandle {
    client: Arc<BridgeClient>,
    session_id: String,
    cancel: CancellationToken,
}

impl TransportHandle for BridgeHandle {
    async fn send_text(&self, jid: &str, text: &str) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let response = self
            .client
            .post(&self.session_id, "messages")
            .json(&json!({ "jid": jid, "text": text }))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        check(response, TransportError::Send).await?;
        Ok(())
    }

    async fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();

        let result = self
            .client
            .post(&self.session_id, "close")
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(session_id = %self.session_id, status = %response.status(), "bridge close rejected");
            }
            Ok(_) => tracing::debug!(session_id = %self.session_id, "bridge connection closed"),
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "bridge close failed");
            }
        }
    }
}
