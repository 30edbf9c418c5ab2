//! `SessionRegistry`: single-flight connection management per session id.
//!
//! Each session id maps to a slot that is either `Connecting` (a shared,
//! spawned connection attempt) or `Live`. Concurrent `get_or_create` calls
//! for the same id await the same attempt. Once connected, a single event
//! loop task per session consumes transport events in order, applies state
//! transitions under the session's state lock, persists them, and forwards
//! inbound messages to the `InboundSink`.
//!
//! Reconnection is lazy: a disconnected session is dropped from the registry
//! and re-established on the next `get_or_create`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use voltura_types::error::{SessionError, TransportError};
use voltura_types::event::DomainEvent;
use voltura_types::session::{SessionRecord, SessionSnapshot, SessionStatus};

use super::{InboundSink, OutboundMessenger};
use crate::event::EventBus;
use crate::repository::session::SessionRepository;
use crate::transport::{
    CloseReason, CredentialStore, Transport, TransportEvent, TransportHandle, phone_to_jid,
};

/// A registered transport connection.
pub struct LiveSession<H> {
    id: String,
    generation: u64,
    handle: H,
    state: RwLock<LiveState>,
    cancel: CancellationToken,
}

#[derive(Debug, Clone)]
struct LiveState {
    status: SessionStatus,
    pairing_payload: Option<String>,
    last_synced_at: Option<DateTime<Utc>>,
}

impl<H: TransportHandle> LiveSession<H> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.read().await.status
    }

    /// Whether the session has been terminated or its connection closed.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn send_text(&self, jid: &str, text: &str) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.handle.send_text(jid, text).await
    }
}

impl<H> std::fmt::Debug for LiveSession<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("closed", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

type Attempt<H> = Shared<BoxFuture<'static, Result<Arc<LiveSession<H>>, SessionError>>>;

enum Slot<H> {
    Connecting {
        generation: u64,
        cancel: CancellationToken,
        attempt: Attempt<H>,
    },
    Live(Arc<LiveSession<H>>),
}

impl<H> Slot<H> {
    fn generation(&self) -> u64 {
        match self {
            Slot::Connecting { generation, .. } => *generation,
            Slot::Live(live) => live.generation,
        }
    }
}

/// First lifecycle signal of a fresh connection.
enum Ready {
    Pairing,
    Open,
    Closed(String),
}

/// Registry of transport sessions.
///
/// Generic over the transport, session persistence, credential store, and
/// inbound consumer so the core never depends on infrastructure crates.
pub struct SessionRegistry<T: Transport, S: SessionRepository, C: CredentialStore, I: InboundSink>
{
    inner: Arc<Inner<T, S, C, I>>,
}

impl<T: Transport, S: SessionRepository, C: CredentialStore, I: InboundSink> Clone
    for SessionRegistry<T, S, C, I>
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<T: Transport, S, C, I> {
    transport: T,
    sessions: S,
    credentials: C,
    inbound: I,
    events: EventBus,
    connect_timeout: Duration,
    slots: DashMap<String, Slot<T::Handle>>,
    next_generation: AtomicU64,
}

impl<T: Transport, S: SessionRepository, C: CredentialStore, I: InboundSink>
    SessionRegistry<T, S, C, I>
{
    pub fn new(
        transport: T,
        sessions: S,
        credentials: C,
        inbound: I,
        events: EventBus,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                sessions,
                credentials,
                inbound,
                events,
                connect_timeout,
                slots: DashMap::new(),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Return the live session for `session_id`, connecting it if necessary.
    ///
    /// Concurrent callers share one connection attempt. The attempt runs on
    /// its own task, so dropping this future does not abort it.
    pub async fn get_or_create(
        &self,
        session_id: &str,
    ) -> Result<Arc<LiveSession<T::Handle>>, SessionError> {
        let attempt = match self.inner.slots.entry(session_id.to_string()) {
            Entry::Occupied(slot) => match slot.get() {
                Slot::Live(live) => return Ok(live.clone()),
                Slot::Connecting { attempt, .. } => attempt.clone(),
            },
            Entry::Vacant(slot) => {
                let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                let cancel = CancellationToken::new();
                let task = tokio::spawn(Inner::establish(
                    self.inner.clone(),
                    session_id.to_string(),
                    generation,
                    cancel.clone(),
                ));
                let attempt: Attempt<T::Handle> = async move {
                    task.await.unwrap_or_else(|e| {
                        Err(SessionError::Transport(TransportError::Connect(format!(
                            "connect task aborted: {e}"
                        ))))
                    })
                }
                .boxed()
                .shared();
                slot.insert(Slot::Connecting {
                    generation,
                    cancel,
                    attempt: attempt.clone(),
                });
                attempt
            }
        };

        attempt.await
    }

    /// Current status of a session, merging the live handle (if any) with the
    /// persisted projection. Answers even when nothing is registered.
    pub async fn status(&self, session_id: &str) -> Result<SessionSnapshot, SessionError> {
        let record = self
            .inner
            .sessions
            .get(session_id)
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;

        if let Some(live) = self.live(session_id) {
            let state = live.state.read().await;
            let persisted_pairing = record.as_ref().and_then(|r| r.pairing_payload.clone());
            let persisted_sync = record.as_ref().and_then(|r| r.last_synced_at);
            return Ok(SessionSnapshot {
                id: session_id.to_string(),
                status: state.status,
                pairing_payload: state.pairing_payload.clone().or(persisted_pairing),
                last_synced_at: state.last_synced_at.or(persisted_sync),
                live: true,
            });
        }

        Ok(match record {
            Some(record) => SessionSnapshot {
                id: record.id,
                status: record.status,
                pairing_payload: record.pairing_payload,
                last_synced_at: record.last_synced_at,
                live: false,
            },
            None => SessionSnapshot {
                id: session_id.to_string(),
                status: SessionStatus::Uninitialized,
                pairing_payload: None,
                last_synced_at: None,
                live: false,
            },
        })
    }

    /// Close and unregister a session, marking it disconnected. Idempotent.
    pub async fn terminate(&self, session_id: &str) -> Result<(), SessionError> {
        let removed = self.inner.slots.remove(session_id).map(|(_, slot)| slot);
        let was_registered = removed.is_some();

        match removed {
            Some(Slot::Live(live)) => {
                live.cancel.cancel();
                // Wait out any in-progress transition so nothing is persisted after us
                let mut state = live.state.write().await;
                state.status = SessionStatus::Disconnected;
                state.pairing_payload = None;
                drop(state);
                live.handle.close().await;
            }
            Some(Slot::Connecting { cancel, .. }) => cancel.cancel(),
            None => {}
        }

        let existing = self
            .inner
            .sessions
            .get(session_id)
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        if let Some(mut record) = existing {
            record.status = SessionStatus::Disconnected;
            record.pairing_payload = None;
            record.updated_at = Utc::now();
            self.inner
                .sessions
                .upsert(&record)
                .await
                .map_err(|e| SessionError::Storage(e.to_string()))?;
        }

        if was_registered {
            info!(session_id, "session terminated");
            self.inner.events.publish(DomainEvent::SessionDisconnected {
                session_id: session_id.to_string(),
                reason: "terminated".to_string(),
                logged_out: false,
            });
        }
        Ok(())
    }

    /// Ids of sessions with a live connection.
    pub fn live_sessions(&self) -> Vec<String> {
        self.inner
            .slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Live(_)))
            .map(|slot| slot.key().clone())
            .collect()
    }

    /// Terminate every registered session.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.inner.slots.iter().map(|s| s.key().clone()).collect();
        for id in ids {
            if let Err(e) = self.terminate(&id).await {
                warn!(session_id = %id, error = %e, "failed to terminate session on shutdown");
            }
        }
    }

    fn live(&self, session_id: &str) -> Option<Arc<LiveSession<T::Handle>>> {
        self.inner.slots.get(session_id).and_then(|slot| match slot.value() {
            Slot::Live(live) => Some(live.clone()),
            Slot::Connecting { .. } => None,
        })
    }
}

impl<T: Transport, S: SessionRepository, C: CredentialStore, I: InboundSink> OutboundMessenger
    for SessionRegistry<T, S, C, I>
{
    async fn send_text(&self, session_id: &str, phone: &str, text: &str) -> Result<(), SessionError> {
        let live = self.get_or_create(session_id).await?;
        live.send_text(&phone_to_jid(phone), text).await?;
        debug!(session_id, "outbound message sent");
        Ok(())
    }
}

impl<T: Transport, S: SessionRepository, C: CredentialStore, I: InboundSink> Inner<T, S, C, I> {
    async fn establish(
        self: Arc<Self>,
        session_id: String,
        generation: u64,
        cancel: CancellationToken,
    ) -> Result<Arc<LiveSession<T::Handle>>, SessionError> {
        let result = self.connect(&session_id, generation, cancel).await;
        if let Err(err) = &result {
            self.slots
                .remove_if(&session_id, |_, slot| slot.generation() == generation);
            warn!(session_id, error = %err, "session connect failed");
        }
        result
    }

    async fn connect(
        self: &Arc<Self>,
        session_id: &str,
        generation: u64,
        cancel: CancellationToken,
    ) -> Result<Arc<LiveSession<T::Handle>>, SessionError> {
        let existing = self
            .sessions
            .get(session_id)
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        let last_synced_at = match &existing {
            Some(record) => record.last_synced_at,
            None => {
                let record = SessionRecord::new(session_id, SessionStatus::Uninitialized, Utc::now());
                self.sessions
                    .upsert(&record)
                    .await
                    .map_err(|e| SessionError::Storage(e.to_string()))?;
                None
            }
        };

        let credentials = self
            .credentials
            .load(session_id)
            .await
            .map_err(|e| SessionError::Credentials(e.to_string()))?;
        info!(
            session_id,
            has_credentials = credentials.is_some(),
            "connecting session"
        );

        // One deadline covers the transport connect and the first lifecycle event
        let deadline = tokio::time::Instant::now() + self.connect_timeout;
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Terminated(session_id.to_string())),
            result = tokio::time::timeout_at(deadline, self.transport.connect(session_id, credentials)) => result,
        };
        let connection = match connected {
            Ok(Ok(connection)) => connection,
            Ok(Err(err)) => {
                self.record_disconnect(session_id, &err.to_string()).await;
                return Err(err.into());
            }
            Err(_) => {
                self.record_disconnect(session_id, "connect timeout").await;
                return Err(self.timeout_error(session_id));
            }
        };

        let live = Arc::new(LiveSession {
            id: session_id.to_string(),
            generation,
            handle: connection.handle,
            state: RwLock::new(LiveState {
                status: SessionStatus::Uninitialized,
                pairing_payload: None,
                last_synced_at,
            }),
            cancel,
        });

        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(self.clone().run(live.clone(), connection.events, ready_tx));

        let outcome = match tokio::time::timeout_at(deadline, ready_rx).await {
            Ok(Ok(Ready::Pairing)) | Ok(Ok(Ready::Open)) => Ok(()),
            Ok(Ok(Ready::Closed(reason))) => Err(SessionError::ClosedDuringConnect {
                session_id: session_id.to_string(),
                reason,
            }),
            // The event loop exits without signalling only when cancelled
            Ok(Err(_)) => Err(SessionError::Terminated(session_id.to_string())),
            Err(_) => Err(self.timeout_error(session_id)),
        };

        match outcome {
            Ok(()) => Ok(live),
            Err(err) => {
                live.cancel.cancel();
                if matches!(err, SessionError::Timeout { .. }) {
                    let mut state = live.state.write().await;
                    state.status = SessionStatus::Disconnected;
                    state.pairing_payload = None;
                    drop(state);
                    self.record_disconnect(session_id, "connect timeout").await;
                }
                live.handle.close().await;
                Err(err)
            }
        }
    }

    /// Per-session event loop: the only consumer of this connection's events.
    async fn run(
        self: Arc<Self>,
        live: Arc<LiveSession<T::Handle>>,
        mut events: mpsc::Receiver<TransportEvent>,
        ready: oneshot::Sender<Ready>,
    ) {
        let mut ready = Some(ready);
        loop {
            let event = tokio::select! {
                biased;
                _ = live.cancel.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Some(TransportEvent::Pairing(payload)) => {
                    if !self.on_pairing(&live, payload).await {
                        break;
                    }
                    signal(&mut ready, Ready::Pairing);
                }
                Some(TransportEvent::Open) => {
                    if !self.on_open(&live).await {
                        break;
                    }
                    signal(&mut ready, Ready::Open);
                }
                Some(TransportEvent::Close(reason)) => {
                    self.on_close(&live, reason, &mut ready).await;
                    break;
                }
                Some(TransportEvent::Message(message)) => {
                    self.inbound.accept(&live.id, message).await;
                }
                Some(TransportEvent::CredentialsUpdated(credentials)) => {
                    if let Err(e) = self.credentials.save(&live.id, &credentials).await {
                        warn!(session_id = %live.id, error = %e, "failed to save credentials");
                    }
                }
                None => {
                    let reason = CloseReason::Other("event stream ended".to_string());
                    self.on_close(&live, reason, &mut ready).await;
                    break;
                }
            }
        }
        debug!(session_id = %live.id, generation = live.generation, "session event loop stopped");
    }

    async fn on_pairing(&self, live: &Arc<LiveSession<T::Handle>>, payload: String) -> bool {
        let mut state = live.state.write().await;
        if live.cancel.is_cancelled() || !self.promote(live) {
            return false;
        }
        state.status = SessionStatus::AwaitingPairing;
        state.pairing_payload = Some(payload.clone());
        self.persist(&live.id, &state).await;
        drop(state);

        info!(session_id = %live.id, "pairing payload received");
        self.events.publish(DomainEvent::SessionPairing {
            session_id: live.id.clone(),
            payload,
        });
        true
    }

    async fn on_open(&self, live: &Arc<LiveSession<T::Handle>>) -> bool {
        let mut state = live.state.write().await;
        if live.cancel.is_cancelled() || !self.promote(live) {
            return false;
        }
        state.status = SessionStatus::Connected;
        state.pairing_payload = None;
        state.last_synced_at = Some(Utc::now());
        self.persist(&live.id, &state).await;
        drop(state);

        info!(session_id = %live.id, "session connected");
        self.events.publish(DomainEvent::SessionConnected {
            session_id: live.id.clone(),
        });
        true
    }

    async fn on_close(
        &self,
        live: &Arc<LiveSession<T::Handle>>,
        reason: CloseReason,
        ready: &mut Option<oneshot::Sender<Ready>>,
    ) {
        let logged_out = reason == CloseReason::LoggedOut;
        let mut state = live.state.write().await;
        if live.cancel.is_cancelled() {
            // Terminated concurrently; terminate() owns the final state
            return;
        }
        state.status = if logged_out {
            SessionStatus::LoggedOut
        } else {
            SessionStatus::Disconnected
        };
        state.pairing_payload = None;
        self.persist(&live.id, &state).await;
        drop(state);

        if logged_out {
            if let Err(e) = self.credentials.invalidate(&live.id).await {
                error!(session_id = %live.id, error = %e, "failed to invalidate credentials");
            }
        }

        self.slots
            .remove_if(&live.id, |_, slot| slot.generation() == live.generation);
        signal(ready, Ready::Closed(reason.to_string()));
        live.cancel.cancel();
        live.handle.close().await;

        warn!(session_id = %live.id, %reason, logged_out, "session closed");
        self.events.publish(DomainEvent::SessionDisconnected {
            session_id: live.id.clone(),
            reason: reason.to_string(),
            logged_out,
        });
    }

    /// Swap this attempt's `Connecting` slot for `Live`. Returns `false` if the
    /// slot now belongs to someone else (terminated or superseded).
    fn promote(&self, live: &Arc<LiveSession<T::Handle>>) -> bool {
        let Some(mut slot) = self.slots.get_mut(&live.id) else {
            return false;
        };
        let promote = match &*slot {
            Slot::Connecting { generation, .. } => *generation == live.generation,
            Slot::Live(current) => return current.generation == live.generation,
        };
        if promote {
            *slot = Slot::Live(live.clone());
        }
        promote
    }

    async fn persist(&self, session_id: &str, state: &LiveState) {
        let record = SessionRecord {
            id: session_id.to_string(),
            status: state.status,
            pairing_payload: state.pairing_payload.clone(),
            last_synced_at: state.last_synced_at,
            updated_at: Utc::now(),
        };
        if let Err(e) = self.sessions.upsert(&record).await {
            error!(session_id, error = %e, "failed to persist session state");
        }
    }

    fn timeout_error(&self, session_id: &str) -> SessionError {
        SessionError::Timeout {
            session_id: session_id.to_string(),
            secs: self.connect_timeout.as_secs(),
        }
    }

    /// Record a failed or timed-out connection attempt.
    async fn record_disconnect(&self, session_id: &str, reason: &str) {
        let now = Utc::now();
        let mut record = match self.sessions.get(session_id).await {
            Ok(Some(record)) => record,
            Ok(None) => SessionRecord::new(session_id, SessionStatus::Disconnected, now),
            Err(e) => {
                error!(session_id, error = %e, "failed to load session state");
                return;
            }
        };
        record.status = SessionStatus::Disconnected;
        record.pairing_payload = None;
        record.updated_at = now;
        if let Err(e) = self.sessions.upsert(&record).await {
            error!(session_id, error = %e, "failed to persist session state");
        }
        self.events.publish(DomainEvent::SessionDisconnected {
            session_id: session_id.to_string(),
            reason: reason.to_string(),
            logged_out: false,
        });
    }
}

fn signal(ready: &mut Option<oneshot::Sender<Ready>>, value: Ready) {
    if let Some(tx) = ready.take() {
        let _ = tx.send(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use voltura_types::error::{CredentialError, RepositoryError};
    use voltura_types::message::InboundMessage;
    use voltura_types::session::Credentials;

    use crate::transport::Connection;

    // -----------------------------------------------------------------------
    // Fakes
    // -----------------------------------------------------------------------

    #[derive(Clone, Default)]
    struct FakeHandle {
        sent: Arc<Mutex<Vec<(String, String)>>>,
        closed: Arc<AtomicBool>,
        send_delay: Duration,
    }

    impl TransportHandle for FakeHandle {
        async fn send_text(&self, jid: &str, text: &str) -> Result<(), TransportError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            if !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
                if self.closed.load(Ordering::SeqCst) {
                    return Err(TransportError::Closed);
                }
            }
            self.sent.lock().unwrap().push((jid.to_string(), text.to_string()));
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Transport that replays `initial` events on every connect and keeps the
    /// sender so tests can inject more.
    #[derive(Clone, Default)]
    struct FakeTransport {
        connects: Arc<AtomicUsize>,
        initial: Vec<TransportEvent>,
        connect_delay: Duration,
        send_delay: Duration,
        senders: Arc<Mutex<Vec<mpsc::Sender<TransportEvent>>>>,
        handles: Arc<Mutex<Vec<FakeHandle>>>,
        credentials_seen: Arc<Mutex<Vec<Option<Credentials>>>>,
    }

    impl FakeTransport {
        fn with_events(initial: Vec<TransportEvent>) -> Self {
            Self {
                initial,
                ..Default::default()
            }
        }

        fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        async fn inject(&self, event: TransportEvent) {
            let tx = self.senders.lock().unwrap().last().cloned().unwrap();
            tx.send(event).await.unwrap();
        }
    }

    impl Transport for FakeTransport {
        type Handle = FakeHandle;

        async fn connect(
            &self,
            _session_id: &str,
            credentials: Option<Credentials>,
        ) -> Result<Connection<FakeHandle>, TransportError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.credentials_seen.lock().unwrap().push(credentials);
            if !self.connect_delay.is_zero() {
                tokio::time::sleep(self.connect_delay).await;
            }
            let (tx, rx) = mpsc::channel(64);
            for event in &self.initial {
                tx.send(event.clone()).await.unwrap();
            }
            self.senders.lock().unwrap().push(tx);
            let handle = FakeHandle {
                send_delay: self.send_delay,
                ..Default::default()
            };
            self.handles.lock().unwrap().push(handle.clone());
            Ok(Connection { handle, events: rx })
        }
    }

    #[derive(Clone, Default)]
    struct MemorySessions {
        rows: Arc<Mutex<HashMap<String, SessionRecord>>>,
    }

    impl SessionRepository for MemorySessions {
        async fn get(&self, id: &str) -> Result<Option<SessionRecord>, RepositoryError> {
            Ok(self.rows.lock().unwrap().get(id).cloned())
        }

        async fn upsert(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
            self.rows.lock().unwrap().insert(record.id.clone(), record.clone());
            Ok(())
        }

        async fn list(&self) -> Result<Vec<SessionRecord>, RepositoryError> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
    }

    #[derive(Clone, Default)]
    struct MemoryCredentials {
        stored: Arc<Mutex<HashMap<String, Credentials>>>,
    }

    impl CredentialStore for MemoryCredentials {
        async fn load(&self, session_id: &str) -> Result<Option<Credentials>, CredentialError> {
            Ok(self.stored.lock().unwrap().get(session_id).cloned())
        }

        async fn save(&self, session_id: &str, credentials: &Credentials) -> Result<(), CredentialError> {
            self.stored
                .lock()
                .unwrap()
                .insert(session_id.to_string(), credentials.clone());
            Ok(())
        }

        async fn invalidate(&self, session_id: &str) -> Result<(), CredentialError> {
            self.stored.lock().unwrap().remove(session_id);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        received: Arc<Mutex<Vec<(String, InboundMessage)>>>,
    }

    impl InboundSink for RecordingSink {
        async fn accept(&self, session_id: &str, message: InboundMessage) {
            self.received
                .lock()
                .unwrap()
                .push((session_id.to_string(), message));
        }
    }

    type TestRegistry = SessionRegistry<FakeTransport, MemorySessions, MemoryCredentials, RecordingSink>;

    struct Harness {
        registry: TestRegistry,
        transport: FakeTransport,
        sessions: MemorySessions,
        credentials: MemoryCredentials,
        sink: RecordingSink,
        events: EventBus,
    }

    fn harness(transport: FakeTransport, timeout: Duration) -> Harness {
        let sessions = MemorySessions::default();
        let credentials = MemoryCredentials::default();
        let sink = RecordingSink::default();
        let events = EventBus::new(64);
        let registry = SessionRegistry::new(
            transport.clone(),
            sessions.clone(),
            credentials.clone(),
            sink.clone(),
            events.clone(),
            timeout,
        );
        Harness {
            registry,
            transport,
            sessions,
            credentials,
            sink,
            events,
        }
    }

    async fn wait_for<F: Fn(&DomainEvent) -> bool>(
        rx: &mut tokio::sync::broadcast::Receiver<DomainEvent>,
        pred: F,
    ) -> DomainEvent {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = rx.recv().await.unwrap();
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event not received in time")
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn concurrent_get_or_create_connects_once() {
        let transport = FakeTransport {
            initial: vec![TransportEvent::Open],
            connect_delay: Duration::from_millis(50),
            ..Default::default()
        };
        let h = harness(transport, Duration::from_secs(2));

        let calls = (0..16).map(|_| {
            let registry = h.registry.clone();
            async move { registry.get_or_create("primary").await }
        });
        let results = futures_util::future::join_all(calls).await;

        assert_eq!(h.transport.connects(), 1);
        let first = results[0].as_ref().unwrap().clone();
        for result in &results {
            assert!(Arc::ptr_eq(result.as_ref().unwrap(), &first));
        }
        assert_eq!(h.registry.live_sessions(), vec!["primary".to_string()]);
    }

    #[tokio::test]
    async fn cancelled_caller_does_not_abort_attempt() {
        let transport = FakeTransport {
            initial: vec![TransportEvent::Open],
            connect_delay: Duration::from_millis(50),
            ..Default::default()
        };
        let h = harness(transport, Duration::from_secs(2));

        let registry = h.registry.clone();
        let caller = tokio::spawn(async move { registry.get_or_create("primary").await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        caller.abort();

        let live = h.registry.get_or_create("primary").await.unwrap();
        assert_eq!(live.status().await, SessionStatus::Connected);
        assert_eq!(h.transport.connects(), 1);
    }

    #[tokio::test]
    async fn pairing_then_open_updates_status() {
        let transport = FakeTransport::with_events(vec![TransportEvent::Pairing("qr-1".into())]);
        let h = harness(transport, Duration::from_secs(2));
        let mut rx = h.events.subscribe();

        h.registry.get_or_create("primary").await.unwrap();
        let snapshot = h.registry.status("primary").await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::AwaitingPairing);
        assert_eq!(snapshot.pairing_payload.as_deref(), Some("qr-1"));
        assert!(snapshot.live);

        // A newer pairing payload supersedes the previous one
        h.transport.inject(TransportEvent::Pairing("qr-2".into())).await;
        wait_for(&mut rx, |e| matches!(e, DomainEvent::SessionPairing { payload, .. } if payload == "qr-2")).await;
        let snapshot = h.registry.status("primary").await.unwrap();
        assert_eq!(snapshot.pairing_payload.as_deref(), Some("qr-2"));

        h.transport.inject(TransportEvent::Open).await;
        wait_for(&mut rx, |e| matches!(e, DomainEvent::SessionConnected { .. })).await;

        let snapshot = h.registry.status("primary").await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Connected);
        assert!(snapshot.pairing_payload.is_none());
        assert!(snapshot.last_synced_at.is_some());

        let row = h.sessions.rows.lock().unwrap().get("primary").cloned().unwrap();
        assert_eq!(row.status, SessionStatus::Connected);
    }

    #[tokio::test]
    async fn connect_timeout_marks_disconnected() {
        let transport = FakeTransport::with_events(vec![]);
        let h = harness(transport, Duration::from_millis(50));

        let err = h.registry.get_or_create("primary").await.unwrap_err();
        assert!(matches!(err, SessionError::Timeout { .. }));

        let snapshot = h.registry.status("primary").await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Disconnected);
        assert!(!snapshot.live);
        assert!(h.registry.live_sessions().is_empty());
        assert!(h.transport.handles.lock().unwrap()[0].closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn hung_transport_connect_times_out() {
        let transport = FakeTransport {
            initial: vec![TransportEvent::Open],
            connect_delay: Duration::from_secs(5),
            ..Default::default()
        };
        let h = harness(transport, Duration::from_millis(100));
        let mut rx = h.events.subscribe();

        let result = tokio::time::timeout(Duration::from_secs(1), h.registry.get_or_create("primary"))
            .await
            .expect("registry did not enforce its connect timeout");
        assert!(matches!(result, Err(SessionError::Timeout { .. })));

        wait_for(&mut rx, |e| matches!(e, DomainEvent::SessionDisconnected { .. })).await;
        let snapshot = h.registry.status("primary").await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Disconnected);
        assert!(!snapshot.live);
        assert!(h.registry.live_sessions().is_empty());
        assert_eq!(h.transport.connects(), 1);
    }

    #[tokio::test]
    async fn logged_out_invalidates_credentials() {
        let transport = FakeTransport::with_events(vec![TransportEvent::Open]);
        let h = harness(transport, Duration::from_secs(2));
        h.credentials
            .stored
            .lock()
            .unwrap()
            .insert("primary".into(), Credentials(serde_json::json!({ "token": "abc" })));
        let mut rx = h.events.subscribe();

        h.registry.get_or_create("primary").await.unwrap();
        h.transport
            .inject(TransportEvent::Close(CloseReason::LoggedOut))
            .await;
        wait_for(&mut rx, |e| matches!(e, DomainEvent::SessionDisconnected { logged_out: true, .. })).await;

        assert!(h.credentials.stored.lock().unwrap().get("primary").is_none());
        let snapshot = h.registry.status("primary").await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::LoggedOut);
        assert!(!snapshot.live);

        // Next connect starts a fresh pairing flow without credentials
        h.registry.get_or_create("primary").await.unwrap();
        assert_eq!(h.transport.connects(), 2);
        let seen = h.transport.credentials_seen.lock().unwrap().clone();
        assert!(seen[0].is_some());
        assert!(seen[1].is_none());
    }

    #[tokio::test]
    async fn transient_close_drops_handle_and_reconnects_lazily() {
        let transport = FakeTransport::with_events(vec![TransportEvent::Open]);
        let h = harness(transport, Duration::from_secs(2));
        let mut rx = h.events.subscribe();

        h.registry.get_or_create("primary").await.unwrap();
        h.transport
            .inject(TransportEvent::Close(CloseReason::Other("stream errored".into())))
            .await;
        wait_for(&mut rx, |e| matches!(e, DomainEvent::SessionDisconnected { logged_out: false, .. })).await;

        let snapshot = h.registry.status("primary").await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Disconnected);
        assert!(h.registry.live_sessions().is_empty());
        assert_eq!(h.transport.connects(), 1);

        h.registry.get_or_create("primary").await.unwrap();
        assert_eq!(h.transport.connects(), 2);
    }

    #[tokio::test]
    async fn close_before_ready_fails_attempt() {
        let transport = FakeTransport::with_events(vec![TransportEvent::Close(CloseReason::Other(
            "rejected".into(),
        ))]);
        let h = harness(transport, Duration::from_secs(2));

        let err = h.registry.get_or_create("primary").await.unwrap_err();
        assert!(matches!(err, SessionError::ClosedDuringConnect { ref reason, .. } if reason == "rejected"));
        assert!(h.registry.live_sessions().is_empty());
    }

    #[tokio::test]
    async fn terminate_then_get_or_create_reconnects() {
        let transport = FakeTransport::with_events(vec![TransportEvent::Open]);
        let h = harness(transport, Duration::from_secs(2));

        let first = h.registry.get_or_create("primary").await.unwrap();
        h.registry.terminate("primary").await.unwrap();

        assert!(first.is_closed());
        assert!(h.transport.handles.lock().unwrap()[0].closed.load(Ordering::SeqCst));
        assert!(first.send_text("6012@s.whatsapp.net", "hi").await.is_err());

        let snapshot = h.registry.status("primary").await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Disconnected);
        assert!(!snapshot.live);

        let second = h.registry.get_or_create("primary").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(h.transport.connects(), 2);
    }

    #[tokio::test]
    async fn terminate_during_send_reconnects_on_next_use() {
        let transport = FakeTransport {
            initial: vec![TransportEvent::Open],
            send_delay: Duration::from_millis(200),
            ..Default::default()
        };
        let h = harness(transport, Duration::from_secs(2));
        let first = h.registry.get_or_create("primary").await.unwrap();

        let registry = h.registry.clone();
        let send = tokio::spawn(async move {
            registry.send_text("primary", "60123456789", "Hai").await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.registry.terminate("primary").await.unwrap();

        let sent = tokio::time::timeout(Duration::from_secs(2), send)
            .await
            .expect("in-flight send did not resolve")
            .unwrap();
        assert!(sent.is_err());
        assert!(first.is_closed());
        assert!(h.registry.live_sessions().is_empty());

        let second = h.registry.get_or_create("primary").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(h.transport.connects(), 2);
    }

    #[tokio::test]
    async fn terminate_during_connect_fails_waiters() {
        let transport = FakeTransport {
            initial: vec![TransportEvent::Open],
            connect_delay: Duration::from_millis(100),
            ..Default::default()
        };
        let h = harness(transport, Duration::from_secs(2));

        let registry = h.registry.clone();
        let waiter = tokio::spawn(async move { registry.get_or_create("primary").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.registry.terminate("primary").await.unwrap();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(SessionError::Terminated(_))));
        assert!(h.registry.live_sessions().is_empty());
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let h = harness(FakeTransport::default(), Duration::from_secs(1));
        h.registry.terminate("ghost").await.unwrap();
        h.registry.terminate("ghost").await.unwrap();
        // No row is invented for a session that never connected
        assert!(h.sessions.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn status_without_row_is_uninitialized() {
        let h = harness(FakeTransport::default(), Duration::from_secs(1));
        let snapshot = h.registry.status("never-seen").await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Uninitialized);
        assert!(snapshot.pairing_payload.is_none());
        assert!(!snapshot.live);
    }

    #[tokio::test]
    async fn inbound_messages_forwarded_in_order() {
        let transport = FakeTransport::with_events(vec![TransportEvent::Open]);
        let h = harness(transport, Duration::from_secs(2));
        let mut rx = h.events.subscribe();

        h.registry.get_or_create("primary").await.unwrap();
        for i in 0..5 {
            h.transport
                .inject(TransportEvent::Message(InboundMessage {
                    remote_jid: "60123456789@s.whatsapp.net".into(),
                    from_me: false,
                    text: Some(format!("message {i}")),
                    media_url: None,
                }))
                .await;
        }
        h.transport
            .inject(TransportEvent::Close(CloseReason::Other("done".into())))
            .await;
        wait_for(&mut rx, |e| matches!(e, DomainEvent::SessionDisconnected { .. })).await;

        let received = h.sink.received.lock().unwrap().clone();
        let texts: Vec<String> = received.iter().map(|(_, m)| m.text.clone().unwrap()).collect();
        assert_eq!(
            texts,
            (0..5).map(|i| format!("message {i}")).collect::<Vec<_>>()
        );
        assert!(received.iter().all(|(sid, _)| sid == "primary"));
    }

    #[tokio::test]
    async fn credentials_updates_are_saved() {
        let transport = FakeTransport::with_events(vec![TransportEvent::Open]);
        let h = harness(transport, Duration::from_secs(2));

        h.registry.get_or_create("primary").await.unwrap();
        h.transport
            .inject(TransportEvent::CredentialsUpdated(Credentials(
                serde_json::json!({ "token": "rotated" }),
            )))
            .await;

        tokio::time::timeout(Duration::from_secs(2), async {
            while h.credentials.stored.lock().unwrap().get("primary").is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn send_text_uses_phone_jid() {
        let transport = FakeTransport::with_events(vec![TransportEvent::Open]);
        let h = harness(transport, Duration::from_secs(2));

        h.registry
            .send_text("primary", "60123456789", "Hai")
            .await
            .unwrap();

        let handle = h.transport.handles.lock().unwrap()[0].clone();
        let sent = handle.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![("60123456789@s.whatsapp.net".to_string(), "Hai".to_string())]
        );
    }
}
