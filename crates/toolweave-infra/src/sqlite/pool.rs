//! Database pool with split reader/writer connections in WAL mode.
//!
//! SQLite allows only one writer at a time, so `DatabasePool` pairs a
//! multi-connection reader pool with a single-connection writer pool.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Split read/write pool for SQLite with WAL mode.
///
/// - `reader`: up to 8 connections for concurrent SELECT queries.
/// - `writer`: one connection for serialized INSERT/UPDATE/DELETE.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open both pools and run migrations on the writer before the reader
    /// pool connects.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let base_opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(base_opts.clone())
            .await?;

        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(base_opts.read_only(true))
            .await?;

        tracing::debug!(url = database_url, "database pool ready");
        Ok(Self { reader, writer })
    }
}

/// `sqlite://{data_dir}/toolweave.db`
pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}", data_dir.join("toolweave.db").display())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_pool(dir: &tempfile::TempDir) -> DatabasePool {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        DatabasePool::new(&url).await.unwrap()
    }

    #[tokio::test]
    async fn test_pool_creates_tables() {
        let dir = tempfile::tempdir().unwrap();
        let pool = temp_pool(&dir).await;

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations' ORDER BY name",
        )
        .fetch_all(&pool.reader)
        .await
        .unwrap();

        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(names, vec!["executions", "workflows"]);
    }

    #[tokio::test]
    async fn test_pool_wal_and_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let pool = temp_pool(&dir).await;

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool.writer)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        let (fk,): (i32,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool.writer)
            .await
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[tokio::test]
    async fn test_reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let first = temp_pool(&dir).await;
        first.writer.close().await;
        first.reader.close().await;
        temp_pool(&dir).await;
    }

    #[test]
    fn test_database_url() {
        let url = database_url(Path::new("/tmp/tw"));
        assert_eq!(url, "sqlite:///tmp/tw/toolweave.db");
    }
}
