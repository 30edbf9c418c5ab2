//! SQLite reminder repository.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;
use voltura_core::repository::reminder::ReminderRepository;
use voltura_types::error::RepositoryError;
use voltura_types::reminder::Reminder;
use voltura_types::task::TaskRecord;

use super::pool::DatabasePool;
use super::row::{format_datetime, parse_datetime, parse_enum, parse_uuid, query_err};
use super::task::insert_task;

pub struct SqliteReminderRepository {
    pool: DatabasePool,
}

impl SqliteReminderRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn reminder_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Reminder, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let job_id: String = row.try_get("job_id").map_err(query_err)?;
    let cadence: String = row.try_get("cadence").map_err(query_err)?;
    let send_at: String = row.try_get("send_at").map_err(query_err)?;
    let sent_at: Option<String> = row.try_get("sent_at").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;

    Ok(Reminder {
        id: parse_uuid(&id)?,
        job_id: parse_uuid(&job_id)?,
        cadence: parse_enum(&cadence)?,
        send_at: parse_datetime(&send_at)?,
        sent_at: sent_at.as_deref().map(parse_datetime).transpose()?,
        created_at: parse_datetime(&created_at)?,
    })
}

impl ReminderRepository for SqliteReminderRepository {
    async fn create(&self, reminder: &Reminder, delivery: &TaskRecord) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query(
            "INSERT INTO reminders (id, job_id, cadence, send_at, sent_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(reminder.id.to_string())
        .bind(reminder.job_id.to_string())
        .bind(reminder.cadence.to_string())
        .bind(format_datetime(&reminder.send_at))
        .bind(reminder.sent_at.as_ref().map(format_datetime))
        .bind(format_datetime(&reminder.created_at))
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        insert_task(&mut *tx, delivery).await?;
        tx.commit().await.map_err(query_err)?;

        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Reminder>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM reminders WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(reminder_from_row).transpose()
    }

    /// Write-once: only the first call stamps `sent_at`.
    async fn mark_sent(&self, id: &Uuid, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE reminders SET sent_at = ? WHERE id = ? AND sent_at IS NULL")
            .bind(format_datetime(&at))
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_job(&self, job_id: &Uuid) -> Result<Vec<Reminder>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM reminders WHERE job_id = ? ORDER BY send_at")
            .bind(job_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter().map(reminder_from_row).collect()
    }
}
