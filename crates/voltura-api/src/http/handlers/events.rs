//! Realtime feed of domain events over Server-Sent Events.
//!
//! GET /api/events
//!
//! Each event's SSE name is the domain event name (`session.pairing`,
//! `quotation.accepted`, ...) and its data the JSON-encoded event. A client
//! that falls behind receives a `lagged` event with the number of events it
//! missed.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::state::AppState;

pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.events.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(data) => yield Ok::<_, Infallible>(Event::default().event(event.name()).data(data)),
                    Err(e) => warn!(event = event.name(), error = %e, "failed to encode event"),
                },
                Err(RecvError::Lagged(missed)) => {
                    yield Ok(Event::default().event("lagged").data(missed.to_string()));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
