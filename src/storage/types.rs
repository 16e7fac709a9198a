use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("Database is locked by another process. Please close it and try again.")]
    InstanceLocked,

    /// The database file could not be opened (missing directory, permissions)
    #[error("Cannot open database file: {0}")]
    CannotOpen(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A referenced row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored value could not be decoded into its domain type
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error, separating lock contention from open failures.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let message = err.to_string();
        if is_lock_message(&message) {
            return DatabaseError::InstanceLocked;
        }
        if message.to_lowercase().contains("unable to open database file") {
            return DatabaseError::CannotOpen(message);
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6) mean somebody else owns the file.
/// SQLITE_CANTOPEN (14) is not a lock and is classified separately.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
}

// ============================================================================
// Timestamp Helpers
// ============================================================================

/// Timestamps are stored as Unix epoch milliseconds so ORDER BY is numeric.
pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| DatabaseError::Corrupt(format!("timestamp out of range: {millis}")))
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::Corrupt(format!("bad id {raw:?}: {e}")))
}

// ============================================================================
// Row Types
// ============================================================================

/// Raw feeds row: (id, name, url, user_id, last_fetched_at, created_at, updated_at)
pub(crate) type FeedRow = (String, String, String, String, Option<i64>, i64, i64);

/// Raw entries row: (id, feed_id, title, url, description, published_at, created_at, updated_at)
pub(crate) type EntryRow = (String, String, String, String, String, i64, i64, i64);

pub(crate) fn feed_from_row(row: FeedRow) -> Result<Feed, DatabaseError> {
    let (id, name, url, user_id, last_fetched_at, created_at, updated_at) = row;
    Ok(Feed {
        id: parse_id(&id)?,
        name,
        url,
        user_id: parse_id(&user_id)?,
        last_fetched_at: last_fetched_at.map(from_millis).transpose()?,
        created_at: from_millis(created_at)?,
        updated_at: from_millis(updated_at)?,
    })
}

pub(crate) fn entry_from_row(row: EntryRow) -> Result<Entry, DatabaseError> {
    let (id, feed_id, title, url, description, published_at, created_at, updated_at) = row;
    Ok(Entry {
        id: parse_id(&id)?,
        feed_id: parse_id(&feed_id)?,
        title,
        url,
        description,
        published_at: from_millis(published_at)?,
        created_at: from_millis(created_at)?,
        updated_at: from_millis(updated_at)?,
    })
}

// ============================================================================
// Data Structures
// ============================================================================

/// Owner of one or more feeds.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A subscribed remote source.
///
/// `last_fetched_at` is the fetch watermark: `None` means the feed has never
/// been fetched successfully and sorts ahead of every fetched feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub user_id: Uuid,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored item ("post"). Unique per `(feed_id, url)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert request for [`Entry`]; every field is chosen by the caller.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewEntry {
    pub(crate) fn into_entry(self) -> Entry {
        Entry {
            id: self.id,
            feed_id: self.feed_id,
            title: self.title,
            url: self.url,
            description: self.description,
            published_at: self.published_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Successful outcomes of recording an entry.
///
/// A unique-key collision on `(feed_id, url)` is an expected outcome, not an
/// error, so it lives here rather than in [`DatabaseError`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// The entry was inserted.
    Stored(Entry),
    /// An entry with the same link already exists for this feed.
    Duplicate,
}

impl RecordOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, RecordOutcome::Duplicate)
    }
}
