//! SQLite-backed durable task queue.
//!
//! Claiming runs in a writer transaction so two workers never take the same
//! task. A claimed task carries a lease; `recover_stale` returns tasks whose
//! lease expired (the worker died mid-attempt) to the pending state, which
//! gives at-least-once delivery.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteConnection;
use uuid::Uuid;
use voltura_core::repository::task::TaskQueue;
use voltura_types::error::RepositoryError;
use voltura_types::task::{TaskRecord, TaskStatus};

use super::pool::DatabasePool;
use super::row::{format_datetime, parse_datetime, parse_enum, parse_uuid, query_err};

pub struct SqliteTaskQueue {
    pool: DatabasePool,
}

impl SqliteTaskQueue {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn task_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<TaskRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let payload: String = row.try_get("payload").map_err(query_err)?;
    let status: String = row.try_get("status").map_err(query_err)?;
    let attempts: i64 = row.try_get("attempts").map_err(query_err)?;
    let max_attempts: i64 = row.try_get("max_attempts").map_err(query_err)?;
    let available_at: String = row.try_get("available_at").map_err(query_err)?;
    let lease_until: Option<String> = row.try_get("lease_until").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(query_err)?;

    Ok(TaskRecord {
        id: parse_uuid(&id)?,
        queue: row.try_get("queue").map_err(query_err)?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| RepositoryError::Query(format!("invalid task payload: {e}")))?,
        status: parse_enum::<TaskStatus>(&status)?,
        attempts: attempts as u32,
        max_attempts: max_attempts as u32,
        available_at: parse_datetime(&available_at)?,
        lease_until: lease_until.as_deref().map(parse_datetime).transpose()?,
        last_error: row.try_get("last_error").map_err(query_err)?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

/// Insert a task row on an existing connection, so repositories can write a
/// follow-up task in the same transaction as the rows it refers to.
pub(crate) async fn insert_task(
    conn: &mut SqliteConnection,
    task: &TaskRecord,
) -> Result<(), RepositoryError> {
    let payload = serde_json::to_string(&task.payload)
        .map_err(|e| RepositoryError::Query(format!("failed to encode task payload: {e}")))?;

    sqlx::query(
        "INSERT INTO tasks (id, queue, payload, status, attempts, max_attempts, available_at, lease_until, last_error, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(task.id.to_string())
    .bind(&task.queue)
    .bind(payload)
    .bind(task.status.to_string())
    .bind(task.attempts as i64)
    .bind(task.max_attempts as i64)
    .bind(format_datetime(&task.available_at))
    .bind(task.lease_until.as_ref().map(format_datetime))
    .bind(&task.last_error)
    .bind(format_datetime(&task.created_at))
    .bind(format_datetime(&task.updated_at))
    .execute(conn)
    .await
    .map_err(query_err)?;

    Ok(())
}

impl TaskQueue for SqliteTaskQueue {
    async fn enqueue(&self, task: &TaskRecord) -> Result<(), RepositoryError> {
        let mut conn = self.pool.writer.acquire().await.map_err(query_err)?;
        insert_task(&mut conn, task).await
    }

    async fn claim(
        &self,
        queue: &str,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<TaskRecord>, RepositoryError> {
        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let now_str = format_datetime(&now);
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        // FIFO: earliest eligible first, insertion order breaks ties
        let next: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM tasks
             WHERE queue = ? AND status = 'pending' AND available_at <= ?
             ORDER BY available_at, rowid
             LIMIT 1",
        )
        .bind(queue)
        .bind(&now_str)
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_err)?;

        let Some((id,)) = next else {
            tx.commit().await.map_err(query_err)?;
            return Ok(None);
        };

        let row = sqlx::query(
            "UPDATE tasks
             SET status = 'running', attempts = attempts + 1, lease_until = ?, updated_at = ?
             WHERE id = ?
             RETURNING *",
        )
        .bind(format_datetime(&(now + lease)))
        .bind(&now_str)
        .bind(&id)
        .fetch_one(&mut *tx)
        .await
        .map_err(query_err)?;
        let task = task_from_row(&row)?;

        tx.commit().await.map_err(query_err)?;
        Ok(Some(task))
    }

    async fn complete(&self, id: &Uuid, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'succeeded', lease_until = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(format_datetime(&now))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn renew_lease(
        &self,
        id: &Uuid,
        lease_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE tasks SET lease_until = ?, updated_at = ? WHERE id = ? AND status = 'running'",
        )
        .bind(format_datetime(&lease_until))
        .bind(format_datetime(&now))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn retry(
        &self,
        id: &Uuid,
        available_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE tasks
             SET status = 'pending', available_at = ?, lease_until = NULL, last_error = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(format_datetime(&available_at))
        .bind(error)
        .bind(format_datetime(&now))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn fail(&self, id: &Uuid, error: &str, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'failed', lease_until = NULL, last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(format_datetime(&now))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn recover_stale(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let now_str = format_datetime(&now);
        let result = sqlx::query(
            "UPDATE tasks SET status = 'pending', lease_until = NULL, updated_at = ?
             WHERE status = 'running' AND lease_until < ?",
        )
        .bind(&now_str)
        .bind(&now_str)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(result.rows_affected())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<TaskRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(task_from_row).transpose()
    }

    async fn list_failed(&self, limit: u32) -> Result<Vec<TaskRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM tasks WHERE status = 'failed' ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter().map(task_from_row).collect()
    }
}
