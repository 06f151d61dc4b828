//! SQLite storage backend for lobby records.

use super::LobbyStorage;
use crate::error::StorageError;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use sync_core::LobbyRecord;
use sync_types::LobbyCode;

/// SQLite-based lobby storage.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage").finish_non_exhaustive()
    }
}

impl SqliteStorage {
    /// Create a new SQLite storage from a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> Result<Self, StorageError> {
        let path_str = path.to_str().ok_or_else(|| StorageError::InvalidPath {
            path: path.to_path_buf(),
        })?;
        let options = SqliteConnectOptions::from_str(path_str)
            .map_err(StorageError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite storage (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StorageError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lobbies (
                code TEXT PRIMARY KEY,
                host_subject TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                suspended INTEGER NOT NULL DEFAULT 0,
                suspended_at INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_lobbies_suspended ON lobbies(suspended, suspended_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }
}

#[async_trait]
impl LobbyStorage for SqliteStorage {
    async fn put_lobby(&self, record: &LobbyRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO lobbies (code, host_subject, created_at, suspended, suspended_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(code) DO UPDATE SET
                host_subject = ?2,
                created_at = ?3,
                suspended = ?4,
                suspended_at = ?5
            "#,
        )
        .bind(record.code.as_str())
        .bind(&record.host_subject)
        .bind(record.created_at as i64)
        .bind(record.suspended)
        .bind(record.suspended_at.map(|t| t as i64))
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn get_lobby(&self, code: &LobbyCode) -> Result<Option<LobbyRecord>, StorageError> {
        let row = sqlx::query_as::<_, LobbyRow>(
            r#"
            SELECT code, host_subject, created_at, suspended, suspended_at
            FROM lobbies
            WHERE code = ?1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(LobbyRecord::try_from).transpose()
    }

    async fn delete_lobby(&self, code: &LobbyCode) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM lobbies WHERE code = ?1")
            .bind(code.as_str())
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;
        Ok(())
    }

    async fn list_lobbies(&self) -> Result<Vec<LobbyRecord>, StorageError> {
        let rows = sqlx::query_as::<_, LobbyRow>(
            r#"
            SELECT code, host_subject, created_at, suspended, suspended_at
            FROM lobbies
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        rows.into_iter().map(LobbyRecord::try_from).collect()
    }

    async fn delete_suspended_before(&self, cutoff: u64) -> Result<u64, StorageError> {
        let result = sqlx::query(
            r#"
            DELETE FROM lobbies
            WHERE suspended = 1 AND suspended_at IS NOT NULL AND suspended_at <= ?1
            "#,
        )
        .bind(cutoff as i64)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(result.rows_affected())
    }

    async fn count_lobbies(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lobbies")
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Database)?;
        Ok(count as u64)
    }
}

/// Internal row type for SQLite queries.
#[derive(sqlx::FromRow)]
struct LobbyRow {
    code: String,
    host_subject: String,
    created_at: i64,
    suspended: bool,
    suspended_at: Option<i64>,
}

impl TryFrom<LobbyRow> for LobbyRecord {
    type Error = StorageError;

    fn try_from(row: LobbyRow) -> Result<Self, Self::Error> {
        let code = LobbyCode::parse(&row.code).map_err(|e| StorageError::Corrupt {
            code: row.code.clone(),
            reason: e.to_string(),
        })?;
        Ok(LobbyRecord {
            code,
            host_subject: row.host_subject,
            created_at: row.created_at.max(0) as u64,
            suspended: row.suspended,
            suspended_at: row.suspended_at.map(|t| t.max(0) as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str, created_at: u64) -> LobbyRecord {
        LobbyRecord::new(LobbyCode::parse(code).unwrap(), "host", created_at)
    }

    #[tokio::test]
    async fn put_and_get_roundtrip() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let rec = record("ABC234", 100);
        storage.put_lobby(&rec).await.unwrap();

        let loaded = storage.get_lobby(&rec.code).await.unwrap();
        assert_eq!(loaded, Some(rec));
    }

    #[tokio::test]
    async fn put_replaces_existing() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let mut rec = record("ABC234", 100);
        storage.put_lobby(&rec).await.unwrap();

        rec.suspended = true;
        rec.suspended_at = Some(150);
        storage.put_lobby(&rec).await.unwrap();

        let loaded = storage.get_lobby(&rec.code).await.unwrap().unwrap();
        assert!(loaded.suspended);
        assert_eq!(loaded.suspended_at, Some(150));
        assert_eq!(loaded.created_at, 100);
        assert_eq!(storage.count_lobbies().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_lobby_is_none() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let code = LobbyCode::parse("ZZZ999").unwrap();
        assert!(storage.get_lobby(&code).await.unwrap().is_none());
        storage.delete_lobby(&code).await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let rec = record("ABC234", 100);
        storage.put_lobby(&rec).await.unwrap();
        storage.delete_lobby(&rec.code).await.unwrap();
        assert!(storage.get_lobby(&rec.code).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_only_touches_old_suspended_records() {
        let storage = SqliteStorage::in_memory().await.unwrap();

        let live = record("AAA222", 10);
        let mut old = record("BBB333", 10);
        old.suspended = true;
        old.suspended_at = Some(50);
        let mut recent = record("CCC444", 10);
        recent.suspended = true;
        recent.suspended_at = Some(500);

        for r in [&live, &old, &recent] {
            storage.put_lobby(r).await.unwrap();
        }

        let deleted = storage.delete_suspended_before(100).await.unwrap();
        assert_eq!(deleted, 1);

        let remaining: Vec<String> = storage
            .list_lobbies()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.code.to_string())
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains(&"AAA222".to_string()));
        assert!(remaining.contains(&"CCC444".to_string()));
    }

    #[tokio::test]
    async fn file_storage_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lobbies.db");

        let rec = record("DEF567", 42);
        {
            let storage = SqliteStorage::new(&path).await.unwrap();
            storage.put_lobby(&rec).await.unwrap();
        }

        let storage = SqliteStorage::new(&path).await.unwrap();
        assert_eq!(storage.get_lobby(&rec.code).await.unwrap(), Some(rec));
    }
}
