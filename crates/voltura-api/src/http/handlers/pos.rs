//! Point of sale: inventory, sales, invoices and payments.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

use voltura_types::inventory::{InventoryItem, NewInventoryItem, StockAdjustment};
use voltura_types::invoice::{InvoiceWithPayments, NewPayment, NewSale};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// GET /api/inventory/items - All items ordered by name.
pub async fn list_items(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<InventoryItem>>, AppError> {
    let start = Instant::now();
    let items = state.sales_service.list_items().await?;
    Ok(ApiResponse::success(items, start))
}

/// POST /api/inventory/items
pub async fn create_item(
    State(state): State<AppState>,
    Json(body): Json<NewInventoryItem>,
) -> Result<ApiResponse<InventoryItem>, AppError> {
    let start = Instant::now();
    let item = state.sales_service.create_item(body).await?;
    Ok(ApiResponse::created(item, start))
}

/// PATCH /api/inventory/items/{id}/stock - Signed stock adjustment.
pub async fn adjust_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<StockAdjustment>,
) -> Result<ApiResponse<InventoryItem>, AppError> {
    let start = Instant::now();
    let item = state.sales_service.adjust_stock(&id, body).await?;
    Ok(ApiResponse::success(item, start))
}

#[derive(Debug, Deserialize)]
pub struct SaleRequest {
    #[serde(flatten)]
    pub sale: NewSale,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// POST /api/pos/sales - Record a sale, decrement stock, take payments.
pub async fn create_sale(
    State(state): State<AppState>,
    Json(body): Json<SaleRequest>,
) -> Result<ApiResponse<InvoiceWithPayments>, AppError> {
    let start = Instant::now();
    let sale = state.sales_service.record_sale(body.sale, body.session_id).await?;
    let link = format!("/api/invoices/{}", sale.invoice.id);
    Ok(ApiResponse::created(sale, start).with_link("invoice", link))
}

/// GET /api/invoices/{id} - Invoice with its payment ledger.
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<InvoiceWithPayments>, AppError> {
    let start = Instant::now();
    let invoice = state.sales_service.get_invoice(&id).await?;
    Ok(ApiResponse::success(invoice, start))
}

/// POST /api/invoices/{id}/payments
pub async fn record_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<NewPayment>,
) -> Result<ApiResponse<InvoiceWithPayments>, AppError> {
    let start = Instant::now();
    let invoice = state.sales_service.record_payment(&id, body).await?;
    Ok(ApiResponse::created(invoice, start))
}
