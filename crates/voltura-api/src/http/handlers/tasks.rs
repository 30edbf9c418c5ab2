//! Workflow task inspection.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use voltura_core::repository::task::TaskQueue;
use voltura_types::error::ServiceError;
use voltura_types::task::TaskRecord;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

const DEFAULT_FAILED_LIMIT: u32 = 50;
const MAX_FAILED_LIMIT: u32 = 500;

#[derive(Debug, Default, Deserialize)]
pub struct FailedQuery {
    pub limit: Option<u32>,
}

/// GET /api/tasks/failed - Tasks that exhausted retries or failed permanently.
pub async fn list_failed(
    State(state): State<AppState>,
    Query(query): Query<FailedQuery>,
) -> Result<ApiResponse<Vec<TaskRecord>>, AppError> {
    let start = Instant::now();
    let limit = query.limit.unwrap_or(DEFAULT_FAILED_LIMIT).clamp(1, MAX_FAILED_LIMIT);
    let tasks = state.scheduler.queue().list_failed(limit).await?;
    Ok(ApiResponse::success(tasks, start))
}

/// GET /api/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<TaskRecord>, AppError> {
    let start = Instant::now();
    let task = state
        .scheduler
        .queue()
        .get(&id)
        .await?
        .ok_or(ServiceError::NotFound("task"))?;
    Ok(ApiResponse::success(task, start))
}
