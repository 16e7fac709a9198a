mod entries;
mod feeds;
#[cfg(test)]
mod memory;
mod schema;
mod store;
mod types;

#[cfg(test)]
pub(crate) use memory::MemoryStore;
pub use schema::Database;
pub use store::FeedStore;
pub use types::{DatabaseError, Entry, Feed, NewEntry, RecordOutcome, User};
