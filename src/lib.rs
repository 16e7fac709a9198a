//! Background RSS ingestion worker.
//!
//! A [`worker::Scheduler`] periodically selects the least recently fetched
//! feeds from a [`storage::FeedStore`], fetches them in parallel through a
//! [`feed::FetchFeed`], and records each new item once per feed.

pub mod config;
pub mod feed;
pub mod storage;
pub mod util;
pub mod worker;
