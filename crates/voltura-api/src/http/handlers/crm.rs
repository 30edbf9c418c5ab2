//! CRM reads, job status and the dashboard summary.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

use voltura_types::customer::{CustomerDetail, CustomerSummary};
use voltura_types::dashboard::DashboardSummary;
use voltura_types::job::{Job, JobOverview, JobStatus};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// GET /api/crm/customers - Newest first, with job and invoice counts.
pub async fn list_customers(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<CustomerSummary>>, AppError> {
    let start = Instant::now();
    let customers = state.crm_service.list_customers().await?;
    Ok(ApiResponse::success(customers, start))
}

/// GET /api/crm/customers/{id}
pub async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<CustomerDetail>, AppError> {
    let start = Instant::now();
    let detail = state.crm_service.customer_detail(&id).await?;
    Ok(ApiResponse::success(detail, start))
}

/// GET /api/crm/jobs
pub async fn list_jobs(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<JobOverview>>, AppError> {
    let start = Instant::now();
    let jobs = state.crm_service.list_jobs().await?;
    Ok(ApiResponse::success(jobs, start))
}

/// GET /api/crm/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<Job>, AppError> {
    let start = Instant::now();
    let job = state.job_service.get(&id).await?;
    Ok(ApiResponse::success(job, start).with_link("reminders", format!("/api/crm/jobs/{id}/reminders")))
}

#[derive(Debug, Deserialize)]
pub struct JobStatusRequest {
    pub status: JobStatus,
}

/// PATCH /api/crm/jobs/{id}/status - Advance the job one step.
pub async fn update_job_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<JobStatusRequest>,
) -> Result<ApiResponse<Job>, AppError> {
    let start = Instant::now();
    let job = state.job_service.advance(&id, body.status).await?;
    Ok(ApiResponse::success(job, start))
}

/// GET /api/dashboard/summary - Today's figures (UTC day).
pub async fn dashboard_summary(
    State(state): State<AppState>,
) -> Result<ApiResponse<DashboardSummary>, AppError> {
    let start = Instant::now();
    let summary = state.crm_service.dashboard(chrono::Utc::now()).await?;
    Ok(ApiResponse::success(summary, start))
}
