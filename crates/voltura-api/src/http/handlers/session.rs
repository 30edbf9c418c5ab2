//! Chat session handlers: status, connect, terminate.

use std::time::Instant;

use axum::extract::{Path, State};

use voltura_types::session::SessionSnapshot;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// GET /api/concierge/sessions/{id} - Current status, live or persisted.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<SessionSnapshot>, AppError> {
    let start = Instant::now();
    let snapshot = state.registry.status(&id).await?;
    Ok(ApiResponse::success(snapshot, start).with_link("self", format!("/api/concierge/sessions/{id}")))
}

/// POST /api/concierge/sessions/{id}/connect - Connect (or reuse) the session.
///
/// Answers once the session either presents a pairing code or opens.
pub async fn connect_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<SessionSnapshot>, AppError> {
    let start = Instant::now();
    state.registry.get_or_create(&id).await?;
    let snapshot = state.registry.status(&id).await?;
    Ok(ApiResponse::success(snapshot, start).with_link("self", format!("/api/concierge/sessions/{id}")))
}

/// POST /api/concierge/sessions/{id}/terminate - Close and mark disconnected.
pub async fn terminate_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<SessionSnapshot>, AppError> {
    let start = Instant::now();
    state.registry.terminate(&id).await?;
    let snapshot = state.registry.status(&id).await?;
    Ok(ApiResponse::success(snapshot, start))
}
