use uuid::Uuid;

use super::schema::Database;
use super::types::{
    entry_from_row, to_millis, DatabaseError, Entry, EntryRow, NewEntry, RecordOutcome,
};

/// Maximum number of entries to return from any single query (OOM protection)
const MAX_ENTRIES: i64 = 2000;

impl Database {
    // ========================================================================
    // Entry Operations
    // ========================================================================

    /// Insert one entry.
    ///
    /// A collision on `UNIQUE(feed_id, url)` is reported as
    /// [`RecordOutcome::Duplicate`]. The constraint is the only guard, so
    /// concurrent writers racing on the same link are resolved by SQLite.
    pub async fn record_entry(&self, entry: NewEntry) -> Result<RecordOutcome, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO entries
                (id, feed_id, title, url, description, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.feed_id.to_string())
        .bind(&entry.title)
        .bind(&entry.url)
        .bind(&entry.description)
        .bind(to_millis(entry.published_at))
        .bind(to_millis(entry.created_at))
        .bind(to_millis(entry.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(RecordOutcome::Stored(entry.into_entry())),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Ok(RecordOutcome::Duplicate)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                Err(DatabaseError::NotFound(format!("feed {}", entry.feed_id)))
            }
            Err(e) => Err(DatabaseError::from_sqlx(e)),
        }
    }

    // ========================================================================
    // Entry Queries
    // ========================================================================

    /// Entries of one feed, newest published first.
    ///
    /// The limit defaults to and is capped at 2000 rows.
    pub async fn get_entries_for_feed(
        &self,
        feed_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Entry>, DatabaseError> {
        let limit = limit.unwrap_or(MAX_ENTRIES).clamp(0, MAX_ENTRIES);
        let rows: Vec<EntryRow> = sqlx::query_as(
            r#"
            SELECT id, feed_id, title, url, description, published_at, created_at, updated_at
            FROM entries
            WHERE feed_id = ?
            ORDER BY published_at DESC, created_at DESC
            LIMIT ?
        "#,
        )
        .bind(feed_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(entry_from_row).collect()
    }

    /// Number of stored entries for one feed.
    pub async fn count_entries(&self, feed_id: Uuid) -> Result<i64, DatabaseError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entries WHERE feed_id = ?")
            .bind(feed_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
