use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_message, DatabaseError};

const MEMORY_PATH: &str = ":memory:";

// ============================================================================
// Database
// ============================================================================

/// SQLite-backed feed store. Cloning is cheap: clones share one pool.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations.
    ///
    /// Passing `":memory:"` opens a private in-memory database backed by a
    /// single pooled connection, so every query sees the same data.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process has the
    /// database locked (SQLITE_BUSY, SQLITE_LOCKED).
    /// Returns `DatabaseError::CannotOpen` if the file cannot be opened at
    /// all, e.g. its directory does not exist (SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Migration` if the schema could not be applied.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let in_memory = path == MEMORY_PATH;
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        // busy_timeout=5000: concurrent feed tasks wait up to 5 seconds for the
        // write lock instead of failing with SQLITE_BUSY.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");

        let pool_options = if in_memory {
            // Each in-memory connection is its own database; never recycle the only one.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            if is_lock_message(&e.to_string()) {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;

        tracing::debug!(path = %path, "Database opened");
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All migrations use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                api_key TEXT UNIQUE NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT UNIQUE NOT NULL,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                last_fetched_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // UNIQUE(feed_id, url) is the only deduplication mechanism for entries.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                feed_id TEXT NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                description TEXT NOT NULL,
                published_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(feed_id, url)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Due-feed selection orders by the watermark on every cycle
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_feeds_last_fetched ON feeds(last_fetched_at, created_at)",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_entries_feed_published ON entries(feed_id, published_at DESC)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
