//! Concierge intake: manual messages and reminder scheduling.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

use voltura_types::message::{IngestOutcome, ManualIntake};
use voltura_types::reminder::{Cadence, Reminder};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// POST /api/concierge/messages - Log a customer message entered by staff.
pub async fn create_message(
    State(state): State<AppState>,
    Json(body): Json<ManualIntake>,
) -> Result<ApiResponse<IngestOutcome>, AppError> {
    let start = Instant::now();
    let outcome = state.ingestor.ingest_manual(&body).await?;
    let customer_link = format!("/api/crm/customers/{}", outcome.customer_id);
    Ok(ApiResponse::created(outcome, start).with_link("customer", customer_link))
}

#[derive(Debug, Deserialize)]
pub struct ReminderRequest {
    pub job_id: Uuid,
    pub cadence: Cadence,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// POST /api/concierge/reminders - Schedule a follow-up reminder for a job.
pub async fn create_reminder(
    State(state): State<AppState>,
    Json(body): Json<ReminderRequest>,
) -> Result<ApiResponse<Reminder>, AppError> {
    let start = Instant::now();
    let reminder = state
        .reminder_service
        .schedule(&body.job_id, body.cadence, body.session_id)
        .await?;
    Ok(ApiResponse::created(reminder, start))
}

/// GET /api/crm/jobs/{id}/reminders - Reminders of a job, soonest first.
pub async fn list_job_reminders(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<ApiResponse<Vec<Reminder>>, AppError> {
    let start = Instant::now();
    let reminders = state.reminder_service.list_for_job(&job_id).await?;
    Ok(ApiResponse::success(reminders, start))
}
