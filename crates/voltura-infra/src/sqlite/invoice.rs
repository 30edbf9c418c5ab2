//! SQLite invoice, payment ledger and inventory repository.
//!
//! An invoice's `balance` column is a cache of `total - sum(payments)` and is
//! recomputed from the ledger inside every transaction that appends to it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::sqlite::SqliteConnection;
use uuid::Uuid;
use voltura_core::repository::invoice::InvoiceRepository;
use voltura_types::error::RepositoryError;
use voltura_types::inventory::InventoryItem;
use voltura_types::invoice::{Invoice, Payment};
use voltura_types::task::TaskRecord;

use super::pool::DatabasePool;
use super::quotation::{line_items_from_json, line_items_to_json};
use super::row::{
    conflict_or_query, format_datetime, parse_datetime, parse_decimal, parse_uuid, query_err,
};
use super::task::insert_task;

pub struct SqliteInvoiceRepository {
    pool: DatabasePool,
}

impl SqliteInvoiceRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

pub(crate) fn invoice_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Invoice, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let customer_id: String = row.try_get("customer_id").map_err(query_err)?;
    let job_id: Option<String> = row.try_get("job_id").map_err(query_err)?;
    let quotation_id: Option<String> = row.try_get("quotation_id").map_err(query_err)?;
    let total: String = row.try_get("total").map_err(query_err)?;
    let balance: String = row.try_get("balance").map_err(query_err)?;
    let line_items: String = row.try_get("line_items").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(query_err)?;

    Ok(Invoice {
        id: parse_uuid(&id)?,
        number: row.try_get("number").map_err(query_err)?,
        customer_id: parse_uuid(&customer_id)?,
        job_id: job_id.as_deref().map(parse_uuid).transpose()?,
        quotation_id: quotation_id.as_deref().map(parse_uuid).transpose()?,
        total: parse_decimal(&total)?,
        balance: parse_decimal(&balance)?,
        line_items: line_items_from_json(&line_items)?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

fn payment_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Payment, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let invoice_id: String = row.try_get("invoice_id").map_err(query_err)?;
    let amount: String = row.try_get("amount").map_err(query_err)?;
    let received_at: String = row.try_get("received_at").map_err(query_err)?;

    Ok(Payment {
        id: parse_uuid(&id)?,
        invoice_id: parse_uuid(&invoice_id)?,
        amount: parse_decimal(&amount)?,
        method: row.try_get("method").map_err(query_err)?,
        reference: row.try_get("reference").map_err(query_err)?,
        received_at: parse_datetime(&received_at)?,
    })
}

fn item_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<InventoryItem, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let cost_price: Option<String> = row.try_get("cost_price").map_err(query_err)?;
    let sell_price: Option<String> = row.try_get("sell_price").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(query_err)?;

    Ok(InventoryItem {
        id: parse_uuid(&id)?,
        sku: row.try_get("sku").map_err(query_err)?,
        name: row.try_get("name").map_err(query_err)?,
        description: row.try_get("description").map_err(query_err)?,
        quantity: row.try_get("quantity").map_err(query_err)?,
        reorder_level: row.try_get("reorder_level").map_err(query_err)?,
        cost_price: cost_price.as_deref().map(parse_decimal).transpose()?,
        sell_price: sell_price.as_deref().map(parse_decimal).transpose()?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

// ---------------------------------------------------------------------------
// Ledger helpers (run inside the caller's transaction)
// ---------------------------------------------------------------------------

/// Sum of every payment recorded against `invoice_id`.
pub(crate) async fn paid_total(
    conn: &mut SqliteConnection,
    invoice_id: &str,
) -> Result<Decimal, RepositoryError> {
    let amounts: Vec<(String,)> = sqlx::query_as("SELECT amount FROM payments WHERE invoice_id = ?")
        .bind(invoice_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(query_err)?;

    let mut paid = Decimal::ZERO;
    for (amount,) in &amounts {
        paid += parse_decimal(amount)?;
    }
    Ok(paid)
}

async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO payments (id, invoice_id, amount, method, reference, received_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(payment.id.to_string())
    .bind(payment.invoice_id.to_string())
    .bind(payment.amount.to_string())
    .bind(&payment.method)
    .bind(&payment.reference)
    .bind(format_datetime(&payment.received_at))
    .execute(&mut *conn)
    .await
    .map_err(query_err)?;

    Ok(())
}

/// Recompute `balance` from the ledger and return the refreshed invoice.
async fn rebalance(
    conn: &mut SqliteConnection,
    invoice_id: &str,
    now: DateTime<Utc>,
) -> Result<Invoice, RepositoryError> {
    let (total,): (String,) = sqlx::query_as("SELECT total FROM invoices WHERE id = ?")
        .bind(invoice_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(query_err)?
        .ok_or(RepositoryError::NotFound)?;
    let paid = paid_total(conn, invoice_id).await?;
    let balance = (parse_decimal(&total)? - paid).round_dp(2);

    let row = sqlx::query("UPDATE invoices SET balance = ?, updated_at = ? WHERE id = ? RETURNING *")
        .bind(balance.to_string())
        .bind(format_datetime(&now))
        .bind(invoice_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(query_err)?;

    invoice_from_row(&row)
}

impl InvoiceRepository for SqliteInvoiceRepository {
    // -----------------------------------------------------------------------
    // Invoices & payments
    // -----------------------------------------------------------------------

    async fn get(&self, id: &Uuid) -> Result<Option<Invoice>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM invoices WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(invoice_from_row).transpose()
    }

    async fn payments(&self, invoice_id: &Uuid) -> Result<Vec<Payment>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM payments WHERE invoice_id = ? ORDER BY received_at, id")
            .bind(invoice_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter().map(payment_from_row).collect()
    }

    async fn record_payment(
        &self,
        payment: &Payment,
        now: DateTime<Utc>,
    ) -> Result<Invoice, RepositoryError> {
        let invoice_id = payment.invoice_id.to_string();
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM invoices WHERE id = ?")
            .bind(&invoice_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_err)?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound);
        }

        insert_payment(&mut *tx, payment).await?;
        let invoice = rebalance(&mut *tx, &invoice_id, now).await?;

        tx.commit().await.map_err(query_err)?;
        Ok(invoice)
    }

    async fn record_sale(
        &self,
        invoice: &Invoice,
        payments: &[Payment],
        receipt: &TaskRecord,
        now: DateTime<Utc>,
    ) -> Result<Invoice, RepositoryError> {
        let invoice_id = invoice.id.to_string();
        let now_str = format_datetime(&now);
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query(
            "INSERT INTO invoices (id, number, customer_id, job_id, quotation_id, total, balance, line_items, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&invoice_id)
        .bind(&invoice.number)
        .bind(invoice.customer_id.to_string())
        .bind(invoice.job_id.map(|id| id.to_string()))
        .bind(invoice.quotation_id.map(|id| id.to_string()))
        .bind(invoice.total.to_string())
        .bind(invoice.total.to_string())
        .bind(line_items_to_json(&invoice.line_items)?)
        .bind(format_datetime(&invoice.created_at))
        .bind(format_datetime(&invoice.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or_query(e, || format!("invoice number '{}' already exists", invoice.number)))?;

        for line in &invoice.line_items {
            let Some(item_id) = line.item_id else {
                continue;
            };
            // Guarded decrement; dropping `tx` rolls the whole sale back.
            let result = sqlx::query(
                "UPDATE inventory_items SET quantity = quantity - ?, updated_at = ?
                 WHERE id = ? AND quantity >= ?",
            )
            .bind(i64::from(line.quantity))
            .bind(&now_str)
            .bind(item_id.to_string())
            .bind(i64::from(line.quantity))
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::Conflict(format!(
                    "insufficient stock for '{}'",
                    line.description
                )));
            }
        }

        for payment in payments {
            insert_payment(&mut *tx, payment).await?;
        }
        let invoice = rebalance(&mut *tx, &invoice_id, now).await?;
        insert_task(&mut *tx, receipt).await?;

        tx.commit().await.map_err(query_err)?;
        Ok(invoice)
    }

    // -----------------------------------------------------------------------
    // Inventory
    // -----------------------------------------------------------------------

    async fn create_item(&self, item: &InventoryItem) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO inventory_items (id, sku, name, description, quantity, reorder_level, cost_price, sell_price, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item.id.to_string())
        .bind(&item.sku)
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.reorder_level)
        .bind(item.cost_price.map(|p| p.to_string()))
        .bind(item.sell_price.map(|p| p.to_string()))
        .bind(format_datetime(&item.created_at))
        .bind(format_datetime(&item.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| conflict_or_query(e, || format!("sku '{}' already exists", item.sku)))?;

        Ok(())
    }

    async fn get_item(&self, id: &Uuid) -> Result<Option<InventoryItem>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM inventory_items WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn adjust_stock(
        &self,
        id: &Uuid,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<InventoryItem, RepositoryError> {
        let id_str = id.to_string();
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let row = sqlx::query(
            "UPDATE inventory_items SET quantity = quantity + ?, updated_at = ?
             WHERE id = ? AND quantity + ? >= 0
             RETURNING *",
        )
        .bind(delta)
        .bind(format_datetime(&now))
        .bind(&id_str)
        .bind(delta)
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_err)?;

        let Some(row) = row else {
            let current: Option<(String, i64)> =
                sqlx::query_as("SELECT sku, quantity FROM inventory_items WHERE id = ?")
                    .bind(&id_str)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(query_err)?;
            return Err(match current {
                None => RepositoryError::NotFound,
                Some((sku, quantity)) => RepositoryError::Conflict(format!(
                    "adjustment of {delta} would leave {sku} at {}",
                    quantity + delta
                )),
            });
        };
        let item = item_from_row(&row)?;

        tx.commit().await.map_err(query_err)?;
        Ok(item)
    }

    async fn list_items(&self) -> Result<Vec<InventoryItem>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM inventory_items ORDER BY name, sku")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter().map(item_from_row).collect()
    }
}
