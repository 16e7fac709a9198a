//! In-process [`FeedStore`] for unit tests.
//!
//! Enforces the same `(feed, link)` uniqueness rule as the SQLite schema,
//! inside the store under its own lock, and can be told to fail selection
//! or inserts so error paths of the worker can be exercised.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use super::store::FeedStore;
use super::types::{DatabaseError, Entry, Feed, NewEntry, RecordOutcome};

#[derive(Default)]
struct Inner {
    /// Insertion order doubles as creation order.
    feeds: Vec<Feed>,
    entries: HashMap<Uuid, Vec<Entry>>,
    links: HashSet<(Uuid, String)>,
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    inner: Mutex<Inner>,
    selections: AtomicUsize,
    fail_selection: AtomicBool,
    failing_links: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a never-fetched feed and return it.
    pub fn add_feed(&self, name: &str, url: &str) -> Feed {
        let now = Utc::now();
        let feed = Feed {
            id: Uuid::new_v4(),
            name: name.to_string(),
            url: url.to_string(),
            user_id: Uuid::nil(),
            last_fetched_at: None,
            created_at: now,
            updated_at: now,
        };
        self.lock().feeds.push(feed.clone());
        feed
    }

    pub fn feed(&self, feed_id: Uuid) -> Option<Feed> {
        self.lock().feeds.iter().find(|f| f.id == feed_id).cloned()
    }

    pub fn entries(&self, feed_id: Uuid) -> Vec<Entry> {
        self.lock().entries.get(&feed_id).cloned().unwrap_or_default()
    }

    /// Number of `select_feeds_due_for_fetch` calls so far.
    pub fn selections(&self) -> usize {
        self.selections.load(Ordering::SeqCst)
    }

    /// Make every following selection fail until reset.
    pub fn set_fail_selection(&self, fail: bool) {
        self.fail_selection.store(fail, Ordering::SeqCst);
    }

    /// Make inserts of this link fail with a non-duplicate error.
    pub fn fail_inserts_for(&self, link: &str) {
        self.failing_links
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(link.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn select_feeds_due_for_fetch(&self, limit: usize) -> Result<Vec<Feed>, DatabaseError> {
        self.selections.fetch_add(1, Ordering::SeqCst);
        if self.fail_selection.load(Ordering::SeqCst) {
            return Err(DatabaseError::Other(sqlx::Error::PoolTimedOut));
        }

        let mut feeds = self.lock().feeds.clone();
        // Stable sort keeps creation order among equal watermarks; None < Some.
        feeds.sort_by_key(|f| f.last_fetched_at);
        feeds.truncate(limit);
        Ok(feeds)
    }

    async fn record_entry(&self, entry: NewEntry) -> Result<RecordOutcome, DatabaseError> {
        let failing = self
            .failing_links
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&entry.url);
        if failing {
            return Err(DatabaseError::Other(sqlx::Error::PoolTimedOut));
        }

        let mut inner = self.lock();
        if !inner.feeds.iter().any(|f| f.id == entry.feed_id) {
            return Err(DatabaseError::NotFound(format!("feed {}", entry.feed_id)));
        }
        if !inner.links.insert((entry.feed_id, entry.url.clone())) {
            return Ok(RecordOutcome::Duplicate);
        }

        let entry = entry.into_entry();
        inner
            .entries
            .entry(entry.feed_id)
            .or_default()
            .push(entry.clone());
        Ok(RecordOutcome::Stored(entry))
    }

    async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<(), DatabaseError> {
        let mut inner = self.lock();
        let feed = inner
            .feeds
            .iter_mut()
            .find(|f| f.id == feed_id)
            .ok_or_else(|| DatabaseError::NotFound(format!("feed {feed_id}")))?;
        let now = Utc::now();
        feed.last_fetched_at = Some(now);
        feed.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_entry(feed_id: Uuid, url: &str) -> NewEntry {
        let now = Utc::now();
        NewEntry {
            id: Uuid::new_v4(),
            feed_id,
            title: "t".into(),
            url: url.into(),
            description: String::new(),
            published_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_duplicate_link_rejected() {
        let store = MemoryStore::new();
        let feed = store.add_feed("F", "https://f.example.com/rss");

        let first = store.record_entry(new_entry(feed.id, "https://x/1")).await.unwrap();
        let second = store.record_entry(new_entry(feed.id, "https://x/1")).await.unwrap();
        assert!(!first.is_duplicate());
        assert!(second.is_duplicate());
        assert_eq!(store.entries(feed.id).len(), 1);
    }

    #[tokio::test]
    async fn test_selection_orders_never_fetched_first() {
        let store = MemoryStore::new();
        let a = store.add_feed("A", "https://a.example.com/rss");
        let b = store.add_feed("B", "https://b.example.com/rss");
        store.mark_feed_fetched(a.id).await.unwrap();

        let due = store.select_feeds_due_for_fetch(2).await.unwrap();
        assert_eq!(due[0].id, b.id);
        assert_eq!(due[1].id, a.id);
        assert_eq!(store.selections(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new();
        let feed = store.add_feed("F", "https://f.example.com/rss");

        store.set_fail_selection(true);
        assert!(store.select_feeds_due_for_fetch(1).await.is_err());

        store.fail_inserts_for("https://x/bad");
        assert!(store
            .record_entry(new_entry(feed.id, "https://x/bad"))
            .await
            .is_err());
    }
}
