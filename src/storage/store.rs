//! Persistence interface consumed by the ingestion worker.
//!
//! The worker only needs three operations. Keeping them behind a trait lets
//! the scheduler be exercised against failure-injecting stores in tests
//! while production uses [`Database`].

use async_trait::async_trait;
use uuid::Uuid;

use super::schema::Database;
use super::types::{DatabaseError, Feed, NewEntry, RecordOutcome};

#[async_trait]
pub trait FeedStore: Send + Sync + 'static {
    /// Up to `limit` feeds ordered by ascending watermark, never-fetched first.
    async fn select_feeds_due_for_fetch(&self, limit: usize) -> Result<Vec<Feed>, DatabaseError>;

    /// Insert an entry, distinguishing a `(feed, link)` collision from failure.
    async fn record_entry(&self, entry: NewEntry) -> Result<RecordOutcome, DatabaseError>;

    /// Set the feed's watermark to now.
    async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<(), DatabaseError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn select_feeds_due_for_fetch(&self, limit: usize) -> Result<Vec<Feed>, DatabaseError> {
        Database::select_feeds_due_for_fetch(self, limit).await
    }

    async fn record_entry(&self, entry: NewEntry) -> Result<RecordOutcome, DatabaseError> {
        Database::record_entry(self, entry).await
    }

    async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<(), DatabaseError> {
        Database::mark_feed_fetched(self, feed_id).await
    }
}
