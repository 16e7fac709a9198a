//! Per-feed pipeline: fetch one feed, record its items, advance its watermark.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::clock::Clock;
use crate::feed::{FetchError, FetchFeed, RawFeed, RawItem};
use crate::storage::{Feed, FeedStore, NewEntry, RecordOutcome};

/// Counts for one ingest pass over a fetched document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Entries inserted.
    pub stored: usize,
    /// Items whose link was already stored for this feed.
    pub duplicates: usize,
    /// Items dropped for an empty title or link.
    pub skipped: usize,
    /// Items whose insert failed for another reason.
    pub failed: usize,
    /// Whether the watermark update succeeded.
    pub marked_fetched: bool,
}

/// What happened to one feed in one cycle.
#[derive(Debug)]
pub enum FeedOutcome {
    /// Fetched and ingested; the watermark was (attempted to be) advanced.
    Ingested(IngestReport),
    /// The fetch failed; the watermark was left alone.
    FetchFailed(FetchError),
    /// The feed's task panicked.
    Panicked(String),
}

impl FeedOutcome {
    pub fn report(&self) -> Option<&IngestReport> {
        match self {
            FeedOutcome::Ingested(report) => Some(report),
            _ => None,
        }
    }

    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, FeedOutcome::FetchFailed(_))
    }
}

/// Parse an RSS `pubDate` (RFC 2822, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`).
///
/// A day-of-week that disagrees with the date is ignored rather than
/// rejected. Falls back to `now` when the string cannot be read; the item
/// is kept.
pub fn resolve_published_at(pub_date: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let pub_date = pub_date.trim();
    DateTime::parse_from_rfc2822(pub_date)
        .or_else(|e| match strip_weekday(pub_date) {
            Some(rest) => DateTime::parse_from_rfc2822(rest),
            None => Err(e),
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now)
}

/// `"Tue, 02 Jan 2006 ..."` -> `"02 Jan 2006 ..."`, if it starts with a weekday.
fn strip_weekday(pub_date: &str) -> Option<&str> {
    const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    let (day, rest) = pub_date.split_once(',')?;
    WEEKDAYS
        .iter()
        .any(|w| day.trim().eq_ignore_ascii_case(w))
        .then(|| rest.trim_start())
}

/// Trimmed `(title, link)` of an item, or `None` if either is empty.
fn normalize(item: &RawItem) -> Option<(&str, &str)> {
    let title = item.title.trim();
    let link = item.link.trim();
    if title.is_empty() || link.is_empty() {
        return None;
    }
    Some((title, link))
}

/// Fetch `feed` and, if that succeeds, ingest the document.
///
/// A failed fetch is logged and returned; the feed's watermark is not
/// touched so the feed stays at the front of the queue.
pub async fn process_feed<S, F>(store: &S, fetcher: &F, clock: &dyn Clock, feed: &Feed) -> FeedOutcome
where
    S: FeedStore + ?Sized,
    F: FetchFeed + ?Sized,
{
    tracing::info!(feed_id = %feed.id, feed = %feed.name, url = %feed.url, "Fetching feed");

    match fetcher.fetch(&feed.url).await {
        Ok(raw) => FeedOutcome::Ingested(ingest_feed(store, clock, feed, raw).await),
        Err(e) => {
            tracing::warn!(
                feed_id = %feed.id,
                url = %feed.url,
                error = %e,
                "Failed to fetch feed"
            );
            FeedOutcome::FetchFailed(e)
        }
    }
}

/// Record every usable item of `raw` for `feed`, then mark the feed fetched.
///
/// Items are handled in document order. No single item can abort the pass:
/// empty fields are skipped, duplicates are counted, and other storage
/// errors are logged. The watermark is advanced once all items have been
/// tried, however many were new.
pub async fn ingest_feed<S>(store: &S, clock: &dyn Clock, feed: &Feed, raw: RawFeed) -> IngestReport
where
    S: FeedStore + ?Sized,
{
    let mut report = IngestReport::default();

    for item in &raw.items {
        let Some((title, link)) = normalize(item) else {
            report.skipped += 1;
            continue;
        };

        let now = clock.now();
        let published_at = resolve_published_at(&item.pub_date, now);

        let entry = NewEntry {
            id: Uuid::new_v4(),
            feed_id: feed.id,
            title: title.to_string(),
            url: link.to_string(),
            description: item.description.clone(),
            published_at,
            created_at: now,
            updated_at: now,
        };

        match store.record_entry(entry).await {
            Ok(RecordOutcome::Stored(entry)) => {
                report.stored += 1;
                tracing::info!(feed = %feed.name, title = %entry.title, "Stored entry");
            }
            Ok(RecordOutcome::Duplicate) => {
                report.duplicates += 1;
                tracing::info!(feed_id = %feed.id, url = %link, "Duplicate entry, skipping");
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(
                    feed_id = %feed.id,
                    url = %link,
                    error = %e,
                    "Failed to store entry"
                );
            }
        }
    }

    match store.mark_feed_fetched(feed.id).await {
        Ok(()) => {
            report.marked_fetched = true;
            tracing::info!(
                feed = %feed.name,
                stored = report.stored,
                duplicates = report.duplicates,
                skipped = report.skipped,
                failed = report.failed,
                "Marked feed fetched"
            );
        }
        Err(e) => {
            tracing::error!(feed_id = %feed.id, error = %e, "Failed to mark feed fetched");
        }
    }

    report
}
