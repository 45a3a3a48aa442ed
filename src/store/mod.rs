//! Event persistence
//!
//! - [`backend`]: the key-value storage port and its in-memory and file backends
//! - [`event_store`]: the ordered, retention-bounded event log built on top

pub mod backend;
pub mod event_store;

pub use backend::{FileStore, KeyValueStore, MemoryStore};
pub use event_store::{events_key, EventStore, DEFAULT_MAX_EVENTS, DEFAULT_RETENTION_DAYS};
