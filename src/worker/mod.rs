//! Periodic ingestion: the scheduling loop and the per-feed pipeline it runs.

mod clock;
mod ingest;
mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ingest::{ingest_feed, process_feed, resolve_published_at, FeedOutcome, IngestReport};
pub use scheduler::{
    CycleReport, FeedResult, Scheduler, WorkerConfig, DEFAULT_BATCH_SIZE, DEFAULT_POLL_INTERVAL,
};
