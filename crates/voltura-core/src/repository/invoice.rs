//! Invoice, payment ledger and inventory repository trait definition.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use voltura_types::error::RepositoryError;
use voltura_types::inventory::InventoryItem;
use voltura_types::invoice::{Invoice, Payment};
use voltura_types::task::TaskRecord;

/// Repository trait for invoices, their payment ledgers, and stock.
///
/// Every write that touches a ledger recomputes `balance` from the full set
/// of payments inside the same transaction.
pub trait InvoiceRepository: Send + Sync + 'static {
    // -----------------------------------------------------------------------
    // Invoices & payments
    // -----------------------------------------------------------------------

    fn get(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Invoice>, RepositoryError>> + Send;

    /// Ledger rows for an invoice, oldest first.
    fn payments(
        &self,
        invoice_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<Payment>, RepositoryError>> + Send;

    /// Append a payment and recompute the invoice balance.
    fn record_payment(
        &self,
        payment: &Payment,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Invoice, RepositoryError>> + Send;

    /// Persist a point-of-sale invoice atomically: insert the invoice, decrement
    /// stock for every inventory-backed line, append payments, recompute balance
    /// and insert the `receipt` task.
    ///
    /// A line that would overdraw stock yields `Conflict` and nothing is written.
    fn record_sale(
        &self,
        invoice: &Invoice,
        payments: &[Payment],
        receipt: &TaskRecord,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Invoice, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Inventory
    // -----------------------------------------------------------------------

    /// Create an item. Returns `Conflict` if the SKU already exists.
    fn create_item(
        &self,
        item: &InventoryItem,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_item(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<InventoryItem>, RepositoryError>> + Send;

    /// Apply a signed stock delta. `NotFound` for unknown items, `Conflict`
    /// when the result would be negative.
    fn adjust_stock(
        &self,
        id: &Uuid,
        delta: i64,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<InventoryItem, RepositoryError>> + Send;

    /// All items ordered by name.
    fn list_items(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<InventoryItem>, RepositoryError>> + Send;
}
