//! SQLite session repository implementation.

use sqlx::Row;
use voltura_core::repository::session::SessionRepository;
use voltura_types::error::RepositoryError;
use voltura_types::session::SessionRecord;

use super::pool::DatabasePool;
use super::row::{format_datetime, parse_datetime, parse_enum, query_err};

/// SQLite-backed implementation of `SessionRepository`.
#[derive(Clone)]
pub struct SqliteSessionRepository {
    pool: DatabasePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionRecord, RepositoryError> {
    let status: String = row.try_get("status").map_err(query_err)?;
    let last_synced_at: Option<String> = row.try_get("last_synced_at").map_err(query_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(query_err)?;

    Ok(SessionRecord {
        id: row.try_get("id").map_err(query_err)?,
        status: parse_enum(&status)?,
        pairing_payload: row.try_get("pairing_payload").map_err(query_err)?,
        last_synced_at: last_synced_at.as_deref().map(parse_datetime).transpose()?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

impl SessionRepository for SqliteSessionRepository {
    async fn get(&self, id: &str) -> Result<Option<SessionRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn upsert(&self, record: &SessionRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO sessions (id, status, pairing_payload, last_synced_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                pairing_payload = excluded.pairing_payload,
                last_synced_at = excluded.last_synced_at,
                updated_at = excluded.updated_at",
        )
        .bind(&record.id)
        .bind(record.status.to_string())
        .bind(&record.pairing_payload)
        .bind(record.last_synced_at.as_ref().map(format_datetime))
        .bind(format_datetime(&record.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionRecord>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM sessions ORDER BY id")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter().map(session_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use voltura_types::session::SessionStatus;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let repo = SqliteSessionRepository::new(test_pool().await);
        let now = Utc::now();

        let mut record = SessionRecord::new("primary", SessionStatus::AwaitingPairing, now);
        record.pairing_payload = Some("2@qr".into());
        repo.upsert(&record).await.unwrap();
        assert_eq!(repo.get("primary").await.unwrap().unwrap(), record);

        record.status = SessionStatus::Connected;
        record.pairing_payload = None;
        record.last_synced_at = Some(now);
        repo.upsert(&record).await.unwrap();

        let loaded = repo.get("primary").await.unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Connected);
        assert!(loaded.pairing_payload.is_none());
        assert_eq!(loaded.last_synced_at, Some(now));
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let repo = SqliteSessionRepository::new(test_pool().await);
        assert!(repo.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_sorted_by_id() {
        let repo = SqliteSessionRepository::new(test_pool().await);
        let now = Utc::now();
        for id in ["shop-b", "shop-a"] {
            repo.upsert(&SessionRecord::new(id, SessionStatus::Disconnected, now))
                .await
                .unwrap();
        }
        let ids: Vec<String> = repo.list().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["shop-a", "shop-b"]);
    }
}
