//! SQLite message log repository. Rows are append-only apart from the
//! `processed` flag.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteConnection;
use uuid::Uuid;
use voltura_core::repository::message::MessageLogRepository;
use voltura_types::error::RepositoryError;
use voltura_types::message::MessageLog;
use voltura_types::task::TaskRecord;

use super::pool::DatabasePool;
use super::row::{format_datetime, parse_datetime, parse_enum, parse_uuid, query_err};
use super::task::insert_task;

pub struct SqliteMessageLogRepository {
    pool: DatabasePool,
}

impl SqliteMessageLogRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<MessageLog, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let customer_id: String = row.try_get("customer_id").map_err(query_err)?;
    let job_id: Option<String> = row.try_get("job_id").map_err(query_err)?;
    let direction: String = row.try_get("direction").map_err(query_err)?;
    let processed: i64 = row.try_get("processed").map_err(query_err)?;
    let processed_at: Option<String> = row.try_get("processed_at").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;

    Ok(MessageLog {
        id: parse_uuid(&id)?,
        customer_id: parse_uuid(&customer_id)?,
        session_id: row.try_get("session_id").map_err(query_err)?,
        job_id: job_id.as_deref().map(parse_uuid).transpose()?,
        direction: parse_enum(&direction)?,
        content: row.try_get("content").map_err(query_err)?,
        media_url: row.try_get("media_url").map_err(query_err)?,
        processed: processed != 0,
        processed_at: processed_at.as_deref().map(parse_datetime).transpose()?,
        created_at: parse_datetime(&created_at)?,
    })
}

async fn insert_message(conn: &mut SqliteConnection, message: &MessageLog) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO message_logs (id, customer_id, session_id, job_id, direction, content, media_url, processed, processed_at, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(message.id.to_string())
    .bind(message.customer_id.to_string())
    .bind(&message.session_id)
    .bind(message.job_id.map(|id| id.to_string()))
    .bind(message.direction.to_string())
    .bind(&message.content)
    .bind(&message.media_url)
    .bind(message.processed as i64)
    .bind(message.processed_at.as_ref().map(format_datetime))
    .bind(format_datetime(&message.created_at))
    .execute(conn)
    .await
    .map_err(query_err)?;

    Ok(())
}

impl MessageLogRepository for SqliteMessageLogRepository {
    async fn append(&self, message: &MessageLog) -> Result<(), RepositoryError> {
        let mut conn = self.pool.writer.acquire().await.map_err(query_err)?;
        insert_message(&mut conn, message).await
    }

    async fn append_with_task(&self, message: &MessageLog, task: &TaskRecord) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        insert_message(&mut *tx, message).await?;
        insert_task(&mut *tx, task).await?;
        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<MessageLog>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM message_logs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(message_from_row).transpose()
    }

    async fn mark_processed(&self, id: &Uuid, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE message_logs SET processed = 1, processed_at = ? WHERE id = ? AND processed = 0",
        )
        .bind(format_datetime(&at))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_customer(
        &self,
        customer_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<MessageLog>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM message_logs WHERE customer_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(customer_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter().map(message_from_row).collect()
    }
}
