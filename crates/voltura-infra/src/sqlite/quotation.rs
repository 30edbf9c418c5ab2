//! SQLite quotation repository.
//!
//! Acceptance runs in a single writer transaction: the status change, the
//! job moving into work, and the invoice upsert keyed by `quotation_id`
//! either all land or none do.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;
use voltura_core::repository::quotation::QuotationRepository;
use voltura_types::error::RepositoryError;
use voltura_types::invoice::Invoice;
use voltura_types::quotation::{AcceptedQuotation, LineItem, Quotation, QuotationStatus};
use voltura_types::task::TaskRecord;

use super::invoice::{invoice_from_row, paid_total};
use super::pool::DatabasePool;
use super::row::{
    conflict_or_query, format_datetime, parse_datetime, parse_decimal, parse_enum, parse_uuid,
    query_err,
};
use super::task::insert_task;

pub struct SqliteQuotationRepository {
    pool: DatabasePool,
}

impl SqliteQuotationRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

pub(crate) fn line_items_from_json(json: &str) -> Result<Vec<LineItem>, RepositoryError> {
    serde_json::from_str(json)
        .map_err(|e| RepositoryError::Query(format!("invalid line items: {e}")))
}

pub(crate) fn line_items_to_json(items: &[LineItem]) -> Result<String, RepositoryError> {
    serde_json::to_string(items)
        .map_err(|e| RepositoryError::Query(format!("failed to encode line items: {e}")))
}

pub(crate) fn quotation_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Quotation, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let customer_id: String = row.try_get("customer_id").map_err(query_err)?;
    let job_id: Option<String> = row.try_get("job_id").map_err(query_err)?;
    let status: String = row.try_get("status").map_err(query_err)?;
    let total: String = row.try_get("total").map_err(query_err)?;
    let line_items: String = row.try_get("line_items").map_err(query_err)?;
    let valid_until: Option<String> = row.try_get("valid_until").map_err(query_err)?;
    let decided_at: Option<String> = row.try_get("decided_at").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(query_err)?;

    Ok(Quotation {
        id: parse_uuid(&id)?,
        number: row.try_get("number").map_err(query_err)?,
        customer_id: parse_uuid(&customer_id)?,
        job_id: job_id.as_deref().map(parse_uuid).transpose()?,
        status: parse_enum::<QuotationStatus>(&status)?,
        total: parse_decimal(&total)?,
        line_items: line_items_from_json(&line_items)?,
        notes: row.try_get("notes").map_err(query_err)?,
        valid_until: valid_until.as_deref().map(parse_datetime).transpose()?,
        decided_at: decided_at.as_deref().map(parse_datetime).transpose()?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

impl QuotationRepository for SqliteQuotationRepository {
    async fn create(&self, quotation: &Quotation, followup: &TaskRecord) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query(
            "INSERT INTO quotations (id, number, customer_id, job_id, status, total, line_items, notes, valid_until, decided_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(quotation.id.to_string())
        .bind(&quotation.number)
        .bind(quotation.customer_id.to_string())
        .bind(quotation.job_id.map(|id| id.to_string()))
        .bind(quotation.status.to_string())
        .bind(quotation.total.to_string())
        .bind(line_items_to_json(&quotation.line_items)?)
        .bind(&quotation.notes)
        .bind(quotation.valid_until.as_ref().map(format_datetime))
        .bind(quotation.decided_at.as_ref().map(format_datetime))
        .bind(format_datetime(&quotation.created_at))
        .bind(format_datetime(&quotation.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or_query(e, || format!("quotation number '{}' already exists", quotation.number)))?;

        if let Some(job_id) = quotation.job_id {
            let result = sqlx::query("UPDATE jobs SET estimated_cost = ?, updated_at = ? WHERE id = ?")
                .bind(quotation.total.to_string())
                .bind(format_datetime(&quotation.created_at))
                .bind(job_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;
            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound);
            }
        }

        insert_task(&mut *tx, followup).await?;
        tx.commit().await.map_err(query_err)?;

        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Quotation>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM quotations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(quotation_from_row).transpose()
    }

    async fn accept(
        &self,
        id: &Uuid,
        draft: &Invoice,
        notification: &TaskRecord,
        now: DateTime<Utc>,
    ) -> Result<AcceptedQuotation, RepositoryError> {
        let id_str = id.to_string();
        let now_str = format_datetime(&now);
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let row = sqlx::query("SELECT * FROM quotations WHERE id = ?")
            .bind(&id_str)
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_err)?
            .ok_or(RepositoryError::NotFound)?;
        let current = quotation_from_row(&row)?;

        let newly_accepted = match current.status {
            QuotationStatus::Rejected => {
                return Err(RepositoryError::Conflict(format!(
                    "quotation {} was already rejected",
                    current.number
                )));
            }
            QuotationStatus::Accepted => false,
            QuotationStatus::Sent => {
                sqlx::query(
                    "UPDATE quotations SET status = 'ACCEPTED', decided_at = ?, updated_at = ? WHERE id = ?",
                )
                .bind(&now_str)
                .bind(&now_str)
                .bind(&id_str)
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;

                if let Some(job_id) = current.job_id {
                    sqlx::query(
                        "UPDATE jobs SET status = 'IN_PROGRESS', updated_at = ? WHERE id = ? AND status = 'PENDING'",
                    )
                    .bind(&now_str)
                    .bind(job_id.to_string())
                    .execute(&mut *tx)
                    .await
                    .map_err(query_err)?;
                }
                insert_task(&mut *tx, notification).await?;
                true
            }
        };

        let line_items = line_items_to_json(&current.line_items)?;
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT id FROM invoices WHERE quotation_id = ?")
                .bind(&id_str)
                .fetch_optional(&mut *tx)
                .await
                .map_err(query_err)?;

        let invoice_id = match existing {
            Some((invoice_id,)) => {
                // Refresh in place; the ledger keeps its payments.
                let paid = paid_total(&mut *tx, &invoice_id).await?;
                let balance = (current.total - paid).round_dp(2);
                sqlx::query(
                    "UPDATE invoices SET total = ?, balance = ?, line_items = ?, updated_at = ? WHERE id = ?",
                )
                .bind(current.total.to_string())
                .bind(balance.to_string())
                .bind(&line_items)
                .bind(&now_str)
                .bind(&invoice_id)
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;
                invoice_id
            }
            None => {
                sqlx::query(
                    "INSERT INTO invoices (id, number, customer_id, job_id, quotation_id, total, balance, line_items, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(draft.id.to_string())
                .bind(&draft.number)
                .bind(current.customer_id.to_string())
                .bind(current.job_id.map(|j| j.to_string()))
                .bind(&id_str)
                .bind(current.total.to_string())
                .bind(current.total.to_string())
                .bind(&line_items)
                .bind(&now_str)
                .bind(&now_str)
                .execute(&mut *tx)
                .await
                .map_err(|e| conflict_or_query(e, || format!("invoice for quotation {} already exists", current.number)))?;
                draft.id.to_string()
            }
        };

        let quotation = sqlx::query("SELECT * FROM quotations WHERE id = ?")
            .bind(&id_str)
            .fetch_one(&mut *tx)
            .await
            .map_err(query_err)?;
        let invoice = sqlx::query("SELECT * FROM invoices WHERE id = ?")
            .bind(&invoice_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(query_err)?;
        let accepted = AcceptedQuotation {
            quotation: quotation_from_row(&quotation)?,
            invoice: invoice_from_row(&invoice)?,
            newly_accepted,
        };

        tx.commit().await.map_err(query_err)?;
        Ok(accepted)
    }

    async fn reject(
        &self,
        id: &Uuid,
        notification: &TaskRecord,
        now: DateTime<Utc>,
    ) -> Result<(Quotation, bool), RepositoryError> {
        let id_str = id.to_string();
        let now_str = format_datetime(&now);
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let row = sqlx::query("SELECT * FROM quotations WHERE id = ?")
            .bind(&id_str)
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_err)?
            .ok_or(RepositoryError::NotFound)?;
        let current = quotation_from_row(&row)?;

        match current.status {
            QuotationStatus::Accepted => {
                return Err(RepositoryError::Conflict(format!(
                    "quotation {} was already accepted",
                    current.number
                )));
            }
            QuotationStatus::Rejected => {
                tx.commit().await.map_err(query_err)?;
                return Ok((current, false));
            }
            QuotationStatus::Sent => {}
        }

        let row = sqlx::query(
            "UPDATE quotations SET status = 'REJECTED', decided_at = ?, updated_at = ? WHERE id = ? RETURNING *",
        )
        .bind(&now_str)
        .bind(&now_str)
        .bind(&id_str)
        .fetch_one(&mut *tx)
        .await
        .map_err(query_err)?;
        let rejected = quotation_from_row(&row)?;
        insert_task(&mut *tx, notification).await?;

        tx.commit().await.map_err(query_err)?;
        Ok((rejected, true))
    }
}
