//! Conversation history persistence.
//!
//! Conversations are stored as JSON arrays under `chat_history_{id}` keys in a
//! pluggable string key-value backend.

/// Error types.
pub mod error;
/// Process-local backend.
pub mod memory;
/// `SQLite` backend.
pub mod sqlite;
/// Store traits and the JSON history store.
pub mod store;

pub use error::{HistoryError, HistoryResult};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
pub use store::{
    HistoryStore, KeyValueBackend, KeyValueHistory, StoreFuture, retain_recent, storage_key,
};
