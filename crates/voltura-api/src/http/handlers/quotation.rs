//! Quotation handlers: create, get, accept, reject.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

use voltura_types::quotation::{AcceptedQuotation, NewQuotation, Quotation};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Optional body of the decision endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct DecisionRequest {
    /// Session to notify the customer through; defaults to the configured one.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateQuotationRequest {
    #[serde(flatten)]
    pub quotation: NewQuotation,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// POST /api/quotations - Create a quotation and send its summary.
pub async fn create_quotation(
    State(state): State<AppState>,
    Json(body): Json<CreateQuotationRequest>,
) -> Result<ApiResponse<Quotation>, AppError> {
    let start = Instant::now();
    let quotation = state
        .quotation_service
        .create(body.quotation, body.session_id)
        .await?;
    let id = quotation.id;
    Ok(ApiResponse::created(quotation, start)
        .with_link("self", format!("/api/quotations/{id}"))
        .with_link("accept", format!("/api/quotations/{id}/accept")))
}

/// GET /api/quotations/{id}
pub async fn get_quotation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<Quotation>, AppError> {
    let start = Instant::now();
    let quotation = state.quotation_service.get(&id).await?;
    Ok(ApiResponse::success(quotation, start))
}

/// POST /api/quotations/{id}/accept - Accept; repeat calls return the same invoice.
pub async fn accept_quotation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionRequest>>,
) -> Result<ApiResponse<AcceptedQuotation>, AppError> {
    let start = Instant::now();
    let Json(body) = body.unwrap_or_default();
    let accepted = state.quotation_service.accept(&id, body.session_id).await?;
    let invoice_link = format!("/api/invoices/{}", accepted.invoice.id);
    Ok(ApiResponse::success(accepted, start).with_link("invoice", invoice_link))
}

/// POST /api/quotations/{id}/reject
pub async fn reject_quotation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionRequest>>,
) -> Result<ApiResponse<Quotation>, AppError> {
    let start = Instant::now();
    let Json(body) = body.unwrap_or_default();
    let quotation = state.quotation_service.reject(&id, body.session_id).await?;
    Ok(ApiResponse::success(quotation, start))
}
