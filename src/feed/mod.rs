//! Remote feed fetching and RSS parsing.
//!
//! - [`parser`] - decodes an RSS 2.0 body into a [`RawFeed`]
//! - [`fetcher`] - one HTTP GET per call, bounded by a timeout and size cap
//!
//! # Example
//!
//! ```ignore
//! use feedworker::feed::RemoteFetcher;
//!
//! let fetcher = RemoteFetcher::new("feedworker/0.1", timeout, max_bytes)?;
//! let raw = fetcher.fetch("https://blog.boot.dev/index.xml").await?;
//! ```

mod fetcher;
mod parser;

pub use fetcher::{
    FetchError, FetchFeed, RemoteFetcher, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_FEED_BYTES,
};
pub use parser::{parse_rss, ParseError, RawFeed, RawItem};
