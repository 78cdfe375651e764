//! # Store File
//!
//! Opens the SQLite file that holds the persisted inventory, ledger and
//! settings documents. One pool per node; the background writer and the
//! startup load share it.
//!
//! The file runs in WAL mode so a second node process pointed at the same
//! file can read its startup state while the first one is writing.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::kv::KvRepository;
use crate::repository::state::StateRepository;

/// Where the document store lives and how many connections it may hold.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
}

impl DbConfig {
    /// File-backed store, created on first open.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 2,
        }
    }

    /// Private in-memory store. A single connection, since every SQLite
    /// memory connection sees its own empty database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    fn is_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }
}

/// Handle to the opened store.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (or creates) the store and brings its schema up to date.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        let base = SqliteConnectOptions::new()
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));
        let options = if config.is_memory() {
            base.in_memory(true)
        } else {
            base.filename(&config.database_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        };

        let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
        if config.is_memory() {
            // dropping the last connection drops the database
            pool_options = pool_options.min_connections(1).idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        migrations::run_migrations(&pool).await?;

        info!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            "Document store open"
        );

        Ok(Database { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Raw key-value access.
    pub fn kv(&self) -> KvRepository {
        KvRepository::new(self.pool.clone())
    }

    /// Typed access to the persisted documents.
    pub fn state(&self) -> StateRepository {
        StateRepository::new(self.kv())
    }

    /// Closes the pool. Repository calls fail afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);
        assert!(total >= 1);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apotheca.db");

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        db.kv().put("k", "\"v\"").await.unwrap();
        db.close().await;

        let reopened = Database::new(DbConfig::new(&path).max_connections(0)).await.unwrap();
        assert_eq!(reopened.kv().get("k").await.unwrap().as_deref(), Some("\"v\""));
    }

    #[tokio::test]
    async fn test_closed_store_rejects_reads() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;
        assert!(db.kv().get("k").await.is_err());
    }
}
