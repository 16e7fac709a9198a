use chrono::Utc;
use uuid::Uuid;

use super::schema::Database;
use super::types::{feed_from_row, to_millis, DatabaseError, Feed, FeedRow, User};

const FEED_COLUMNS: &str =
    "id, name, url, user_id, last_fetched_at, created_at, updated_at";

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user with a freshly generated API key.
    pub async fn create_user(&self, name: &str) -> Result<User, DatabaseError> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            api_key: Uuid::new_v4().simple().to_string(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO users (id, name, api_key, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.name)
        .bind(&user.api_key)
        .bind(to_millis(now))
        .bind(to_millis(now))
        .execute(&self.pool)
        .await?;

        Ok(user)
    }

    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a new feed owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::NotFound`] if the user does not exist, and
    /// [`DatabaseError::Other`] if the URL is already registered.
    pub async fn create_feed(
        &self,
        user_id: Uuid,
        name: &str,
        url: &str,
    ) -> Result<Feed, DatabaseError> {
        let now = Utc::now();
        let feed = Feed {
            id: Uuid::new_v4(),
            name: name.to_string(),
            url: url.to_string(),
            user_id,
            last_fetched_at: None,
            created_at: now,
            updated_at: now,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO feeds (id, name, url, user_id, last_fetched_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, NULL, ?, ?)
        "#,
        )
        .bind(feed.id.to_string())
        .bind(&feed.name)
        .bind(&feed.url)
        .bind(user_id.to_string())
        .bind(to_millis(now))
        .bind(to_millis(now))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(feed),
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                Err(DatabaseError::NotFound(format!("user {user_id}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up one feed by id.
    pub async fn get_feed(&self, feed_id: Uuid) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"))
                .bind(feed_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(feed_from_row).transpose()
    }

    /// All feeds, oldest `created_at` first.
    pub async fn list_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let rows: Vec<FeedRow> = sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(feed_from_row).collect()
    }

    /// Up to `limit` feeds, least recently fetched first.
    ///
    /// Never-fetched feeds (NULL watermark) sort ahead of everything else.
    /// Ties fall back to `created_at`, then to `id`. Timestamps have
    /// millisecond resolution, so feeds created within the same millisecond
    /// are ordered by their random id rather than by insertion.
    pub async fn select_feeds_due_for_fetch(
        &self,
        limit: usize,
    ) -> Result<Vec<Feed>, DatabaseError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<FeedRow> = sqlx::query_as(&format!(
            r#"
            SELECT {FEED_COLUMNS} FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, created_at ASC, id ASC
            LIMIT ?
        "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(feed_from_row).collect()
    }

    /// Advance the fetch watermark of a feed to now.
    pub async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<(), DatabaseError> {
        let now = to_millis(Utc::now());
        let result =
            sqlx::query("UPDATE feeds SET last_fetched_at = ?, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(now)
                .bind(feed_id.to_string())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("feed {feed_id}")));
        }
        Ok(())
    }
}
