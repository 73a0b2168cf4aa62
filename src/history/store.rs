//! Conversation history store over a string key-value backend.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, warn};

use crate::chat::types::{ConversationId, Message};
use crate::history::error::HistoryResult;

/// Boxed future type for history store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Key prefix for stored conversations.
const KEY_PREFIX: &str = "chat_history_";

/// Per-conversation message history.
pub trait HistoryStore: Send + Sync {
    /// Load the stored messages of a conversation, oldest first.
    ///
    /// Missing or unreadable history yields an empty list.
    fn load<'a>(&'a self, conversation_id: &'a ConversationId) -> StoreFuture<'a, Vec<Message>>;
    /// Replace the stored messages of a conversation.
    ///
    /// # Errors
    /// Returns an error if encoding or storage access fails.
    fn save<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        messages: &'a [Message],
    ) -> StoreFuture<'a, HistoryResult<()>>;
    /// Remove the stored messages of a conversation.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn clear<'a>(&'a self, conversation_id: &'a ConversationId) -> StoreFuture<'a, HistoryResult<()>>;
}

/// String key-value storage.
pub trait KeyValueBackend: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, HistoryResult<Option<String>>>;
    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, HistoryResult<()>>;
    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, HistoryResult<()>>;
}

/// Storage key of a conversation.
#[must_use]
pub fn storage_key(conversation_id: &ConversationId) -> String {
    format!("{KEY_PREFIX}{conversation_id}")
}

/// Keep only the `limit` most recent messages, preserving order.
#[must_use]
pub fn retain_recent(mut messages: Vec<Message>, limit: usize) -> Vec<Message> {
    if messages.len() > limit {
        messages.drain(..messages.len() - limit);
    }
    messages
}

/// [`HistoryStore`] keeping each conversation as one JSON array.
pub struct KeyValueHistory<B> {
    backend: B,
}

impl<B: KeyValueBackend> KeyValueHistory<B> {
    /// Wrap a backend.
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Underlying backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: KeyValueBackend> HistoryStore for KeyValueHistory<B> {
    fn load<'a>(&'a self, conversation_id: &'a ConversationId) -> StoreFuture<'a, Vec<Message>> {
        Box::pin(async move {
            let key = storage_key(conversation_id);
            let raw = match self.backend.get(&key).await {
                Ok(Some(raw)) => raw,
                Ok(None) => return Vec::new(),
                Err(err) => {
                    warn!(key = %key, error = %err, "Failed to read chat history");
                    return Vec::new();
                }
            };

            serde_json::from_str::<Vec<Message>>(&raw).map_or_else(
                |err| {
                    warn!(key = %key, error = %err, "Discarding unreadable chat history");
                    Vec::new()
                },
                |messages| {
                    debug!(key = %key, messages = messages.len(), "Loaded chat history");
                    messages
                },
            )
        })
    }

    fn save<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        messages: &'a [Message],
    ) -> StoreFuture<'a, HistoryResult<()>> {
        Box::pin(async move {
            let key = storage_key(conversation_id);
            let raw = serde_json::to_string(messages)?;
            self.backend.set(&key, raw).await?;
            debug!(key = %key, messages = messages.len(), "Saved chat history");
            Ok(())
        })
    }

    fn clear<'a>(&'a self, conversation_id: &'a ConversationId) -> StoreFuture<'a, HistoryResult<()>> {
        Box::pin(async move {
            let key = storage_key(conversation_id);
            self.backend.remove(&key).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::types::Role;
    use crate::history::error::HistoryError;
    use crate::history::memory::MemoryBackend;

    /// Backend whose reads always fail.
    struct BrokenBackend;

    impl KeyValueBackend for BrokenBackend {
        fn get<'a>(&'a self, _key: &'a str) -> StoreFuture<'a, HistoryResult<Option<String>>> {
            Box::pin(async { Err(HistoryError::Io(std::io::Error::other("unreadable"))) })
        }

        fn set<'a>(&'a self, _key: &'a str, _value: String) -> StoreFuture<'a, HistoryResult<()>> {
            Box::pin(async { Err(HistoryError::Io(std::io::Error::other("read-only"))) })
        }

        fn remove<'a>(&'a self, _key: &'a str) -> StoreFuture<'a, HistoryResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn numbered(count: usize) -> Vec<Message> {
        (0..count).map(|n| Message::user(n.to_string())).collect()
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(storage_key(&ConversationId::default()), "chat_history_default");
        assert_eq!(storage_key(&ConversationId::from("plot-7")), "chat_history_plot-7");
    }

    #[test]
    fn test_retain_recent() {
        let kept = retain_recent(numbered(55), 50);
        assert_eq!(kept.len(), 50);
        assert_eq!(kept[0].content, "5");
        assert_eq!(kept[49].content, "54");

        let short = retain_recent(numbered(3), 50);
        assert_eq!(short.len(), 3);
        assert_eq!(short[0].content, "0");
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = KeyValueHistory::new(MemoryBackend::new());
        let id = ConversationId::from("greenhouse");
        let messages = vec![Message::user("yellow spots"), Message::assistant("Check for blight.")];

        store.save(&id, &messages).await.unwrap();
        let loaded = store.load(&id).await;
        assert_eq!(loaded, messages);
        assert_eq!(loaded[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_missing_history_is_empty() {
        let store = KeyValueHistory::new(MemoryBackend::new());
        assert!(store.load(&ConversationId::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_history_is_empty() {
        let backend = MemoryBackend::new();
        backend.set("chat_history_default", "{not json".to_string()).await.unwrap();
        let store = KeyValueHistory::new(backend);
        assert!(store.load(&ConversationId::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_backend_is_empty() {
        let store = KeyValueHistory::new(BrokenBackend);
        let id = ConversationId::default();
        assert!(store.load(&id).await.is_empty());
        assert!(store.save(&id, &numbered(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = KeyValueHistory::new(MemoryBackend::new());
        let id = ConversationId::default();
        store.save(&id, &numbered(2)).await.unwrap();
        store.clear(&id).await.unwrap();
        assert!(store.load(&id).await.is_empty());
        assert!(store.backend().is_empty());
        store.clear(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_reads_legacy_field_names() {
        let backend = MemoryBackend::new();
        backend
            .set(
                "chat_history_default",
                r#"[{"id":"1","sender":"user","content":"hi","timestamp":"2024-05-01T10:00:00Z"},{"id":"2","sender":"bot","content":"hello","timestamp":"2024-05-01T10:00:01Z"}]"#
                    .to_string(),
            )
            .await
            .unwrap();
        let store = KeyValueHistory::new(backend);

        let loaded = store.load(&ConversationId::default()).await;
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].role, Role::User);
        assert_eq!(loaded[1].role, Role::Assistant);
    }
}
