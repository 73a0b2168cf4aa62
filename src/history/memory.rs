//! Process-local key-value backend.

use dashmap::DashMap;

use crate::history::error::HistoryResult;
use crate::history::store::{KeyValueBackend, StoreFuture};

/// In-memory backend; contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, String>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, HistoryResult<Option<String>>> {
        let value = self.entries.get(key).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(value) })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, HistoryResult<()>> {
        self.entries.insert(key.to_string(), value);
        Box::pin(async { Ok(()) })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, HistoryResult<()>> {
        self.entries.remove(key);
        Box::pin(async { Ok(()) })
    }
}
