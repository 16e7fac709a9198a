//! The periodic ingestion loop.
//!
//! Each cycle selects up to `batch_size` feeds by oldest watermark, runs one
//! task per feed, and waits for every task before sleeping. Cycles never
//! overlap, and no failure inside a cycle ends the loop.

use futures::FutureExt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::ingest::{process_feed, FeedOutcome};
use crate::feed::FetchFeed;
use crate::storage::FeedStore;

/// Default pause between the end of one cycle and the start of the next.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of feeds fetched per cycle.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(10) {
    Some(n) => n,
    None => unreachable!(),
};

/// Loop parameters, injected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub batch_size: NonZeroUsize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Outcome of one feed's task within a cycle.
#[derive(Debug)]
pub struct FeedResult {
    pub feed_id: Uuid,
    pub outcome: FeedOutcome,
}

/// Summary of one cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Feeds returned by selection.
    pub selected: usize,
    /// Selection itself failed; nothing was fetched.
    pub selection_failed: bool,
    /// One result per selected feed, in completion order.
    pub results: Vec<FeedResult>,
}

impl CycleReport {
    fn selection_failed() -> Self {
        Self {
            selection_failed: true,
            ..Self::default()
        }
    }

    /// Feeds whose fetch failed or whose task panicked.
    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| !matches!(r.outcome, FeedOutcome::Ingested(_)))
            .count()
    }

    /// Total entries stored across all feeds in the cycle.
    pub fn stored(&self) -> usize {
        self.results
            .iter()
            .filter_map(|r| r.outcome.report())
            .map(|report| report.stored)
            .sum()
    }

    pub fn result_for(&self, feed_id: Uuid) -> Option<&FeedOutcome> {
        self.results
            .iter()
            .find(|r| r.feed_id == feed_id)
            .map(|r| &r.outcome)
    }
}

/// Drives ingestion cycles against a store and a fetcher.
pub struct Scheduler<S, F> {
    store: Arc<S>,
    fetcher: Arc<F>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
}

impl<S, F> Scheduler<S, F>
where
    S: FeedStore,
    F: FetchFeed,
{
    pub fn new(store: Arc<S>, fetcher: Arc<F>, config: WorkerConfig) -> Self {
        Self::with_clock(store, fetcher, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        store: Arc<S>,
        fetcher: Arc<F>,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            clock,
            config,
        }
    }

    /// Run cycles forever, sleeping `poll_interval` after each one.
    pub async fn run(&self) {
        tracing::info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size.get(),
            "Starting feed worker"
        );
        loop {
            self.run_cycle().await;
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Run cycles until `shutdown` resolves.
    ///
    /// Feeds still in flight when shutdown fires are aborted; their
    /// watermarks are left as they were.
    pub async fn run_until<Fut>(&self, shutdown: Fut)
    where
        Fut: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown requested, stopping feed worker");
            }
            _ = self.run() => {}
        }
    }

    /// Run exactly one cycle: select, fan out, wait for every feed.
    pub async fn run_cycle(&self) -> CycleReport {
        let batch_size = self.config.batch_size.get();
        tracing::info!(batch_size, "Starting fetch cycle");

        let feeds = match self.store.select_feeds_due_for_fetch(batch_size).await {
            Ok(feeds) => feeds,
            Err(e) => {
                tracing::error!(error = %e, "Failed to select feeds for fetch");
                return CycleReport::selection_failed();
            }
        };

        if feeds.is_empty() {
            tracing::info!("No feeds due for fetch");
            return CycleReport::default();
        }

        let selected = feeds.len();
        let mut tasks = JoinSet::new();
        for feed in feeds {
            let store = Arc::clone(&self.store);
            let fetcher = Arc::clone(&self.fetcher);
            let clock = Arc::clone(&self.clock);
            tasks.spawn(async move {
                let outcome =
                    match catch_task_panic(process_feed(&*store, &*fetcher, &*clock, &feed)).await {
                        Ok(outcome) => outcome,
                        Err(panic) => {
                            tracing::error!(feed_id = %feed.id, panic = %panic, "Feed task panicked");
                            FeedOutcome::Panicked(panic)
                        }
                    };
                FeedResult {
                    feed_id: feed.id,
                    outcome,
                }
            });
        }

        // Barrier: the cycle ends only after every feed has finished
        let mut results = Vec::with_capacity(selected);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(error = %e, "Feed task did not complete"),
            }
        }

        let report = CycleReport {
            selected,
            selection_failed: false,
            results,
        };
        tracing::info!(
            feeds = report.selected,
            failed = report.failed(),
            stored = report.stored(),
            "Completed fetch cycle"
        );
        report
    }
}

/// Run `future`, turning a panic into its message.
async fn catch_task_panic<Fut, T>(future: Fut) -> Result<T, String>
where
    Fut: Future<Output = T>,
{
    AssertUnwindSafe(future).catch_unwind().await.map_err(|panic| {
        if let Some(s) = panic.downcast_ref::<&'static str>() {
            s.to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        }
    })
}
