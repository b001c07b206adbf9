// Database handle
//
// All writes serialize through a single-connection writer pool, which is what
// gives the orchestrator its linearizable-write guarantee. Reads run on a
// companion pool and see committed state only.

use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

use crate::error::StoreError;
use crate::migrations;

/// Current wall-clock time as epoch milliseconds, the storage timestamp unit
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Handle to the single SQLite database file
#[derive(Clone)]
pub struct Database {
    writer: SqlitePool,
    reader: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database file at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Migration(format!(
                        "failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&path.to_string_lossy())
            .map_err(StoreError::Database)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;
        let reader = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Ok(Self { writer, reader })
    }

    /// In-memory database for tests. A single shared connection backs both
    /// the writer and reader handles (each new :memory: connection would
    /// otherwise see its own empty database).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(StoreError::Database)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self {
            writer: pool.clone(),
            reader: pool,
        })
    }

    /// Apply all pending built-in migrations
    pub async fn migrate(&self) -> Result<usize, StoreError> {
        migrations::run(&self.writer).await
    }

    /// The serializing write pool
    pub fn writer(&self) -> &SqlitePool {
        &self.writer
    }

    /// The concurrent read pool
    pub fn reader(&self) -> &SqlitePool {
        &self.reader
    }

    /// Begin a write transaction
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(self.writer.begin().await?)
    }

    /// Close both pools; outstanding acquires drain first
    pub async fn close(&self) {
        self.writer.close().await;
        self.reader.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_migrates_and_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        let applied = db.migrate().await.unwrap();
        assert_eq!(applied, migrations::migrations().len());

        // Second run applies nothing
        let applied = db.migrate().await.unwrap();
        assert_eq!(applied, 0);
    }

    #[tokio::test]
    async fn open_creates_file_and_recovers_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("baton.db");

        {
            let db = Database::open(&path).await.unwrap();
            db.migrate().await.unwrap();
            sqlx::query(
                "INSERT INTO workflow_executions (execution_id, workflow_name, started_at, updated_at) VALUES ('e1', 'demo', 1, 1)",
            )
            .execute(db.writer())
            .await
            .unwrap();
            db.close().await;
        }

        // Reopen: the file is the durable boundary
        let db = Database::open(&path).await.unwrap();
        db.migrate().await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workflow_executions")
            .fetch_one(db.reader())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
