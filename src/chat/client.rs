//! Conversational request client: one user turn end-to-end.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chat::config::ChatConfig;
use crate::chat::error::ChatResult;
use crate::chat::queue::RequestQueue;
use crate::chat::retry::RetryPolicy;
use crate::chat::transport::{ChatTransport, HttpTransport};
use crate::chat::types::{ChatCompletionRequest, ConversationId, Message};
use crate::history::{HistoryStore, retain_recent};

/// Prompt prefix used when the user sends an image instead of text.
const IMAGE_PROMPT_PREFIX: &str = "Please analyze this image: ";

/// Chat client owning its request queue and retry policy.
///
/// Outbound requests of one client never overlap: every attempt, including
/// retries, passes through the same serial queue.
pub struct ChatClient {
    config: ChatConfig,
    transport: Arc<dyn ChatTransport>,
    history: Arc<dyn HistoryStore>,
    queue: RequestQueue,
    retry: RetryPolicy,
}

impl ChatClient {
    /// Create a client that talks HTTP to the configured endpoint.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the HTTP client cannot be built.
    pub fn new(config: ChatConfig, history: Arc<dyn HistoryStore>) -> ChatResult<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::with_transport(config, transport, history)
    }

    /// Create a client over an arbitrary transport.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or no runtime is available.
    pub fn with_transport(
        config: ChatConfig,
        transport: Arc<dyn ChatTransport>,
        history: Arc<dyn HistoryStore>,
    ) -> ChatResult<Self> {
        config.validate()?;
        let queue = RequestQueue::spawn(config.rate_limit_delay)?;
        let retry = RetryPolicy::from_config(&config);
        info!(model = %config.model, base_url = %config.base_url, "Chat client ready");

        Ok(Self {
            config,
            transport,
            history,
            queue,
            retry,
        })
    }

    /// Client configuration.
    #[must_use]
    pub const fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Send a text message and return the assistant reply.
    ///
    /// Uses the default conversation when `conversation_id` is `None`.
    ///
    /// # Errors
    /// Returns a classified error whose `Display` is suitable for end users.
    /// History is left untouched when the send fails.
    pub async fn send_message(
        &self,
        text: &str,
        conversation_id: Option<&ConversationId>,
    ) -> ChatResult<String> {
        self.send_turn(text.to_string(), conversation_id).await
    }

    /// Ask the model to analyze an image, identified by URL or local reference.
    ///
    /// Same queueing, retry and history behaviour as [`Self::send_message`].
    ///
    /// # Errors
    /// Returns a classified error whose `Display` is suitable for end users.
    pub async fn send_image(
        &self,
        image_ref: &str,
        conversation_id: Option<&ConversationId>,
    ) -> ChatResult<String> {
        self.send_turn(format!("{IMAGE_PROMPT_PREFIX}{image_ref}"), conversation_id)
            .await
    }

    /// Stored history of a conversation.
    pub async fn history(&self, conversation_id: Option<&ConversationId>) -> Vec<Message> {
        let conversation = conversation_id.cloned().unwrap_or_default();
        self.history.load(&conversation).await
    }

    /// Drop the stored history of a conversation. Failures are logged only.
    pub async fn clear_history(&self, conversation_id: Option<&ConversationId>) {
        let conversation = conversation_id.cloned().unwrap_or_default();
        if let Err(err) = self.history.clear(&conversation).await {
            warn!(conversation = %conversation, error = %err, "Failed to clear chat history");
        }
    }

    async fn send_turn(
        &self,
        content: String,
        conversation_id: Option<&ConversationId>,
    ) -> ChatResult<String> {
        let conversation = conversation_id.cloned().unwrap_or_default();
        let stored = self.history.load(&conversation).await;
        let request = ChatCompletionRequest::new(&self.config.model, &stored, &content);
        debug!(
            conversation = %conversation,
            history = stored.len(),
            "Prepared chat request"
        );

        let queue = &self.queue;
        let transport = &self.transport;
        let request = &request;
        let response = self
            .retry
            .run(move || {
                let transport = Arc::clone(transport);
                let request = request.clone();
                queue.enqueue(move || async move { transport.complete(&request).await })
            })
            .await
            .map_err(|err| {
                warn!(conversation = %conversation, error = ?err, "Chat request failed");
                err
            })?;

        let reply = response
            .reply_text()
            .map_or_else(|| self.config.fallback_reply.clone(), str::to_string);

        let mut updated = stored;
        updated.push(Message::user(content));
        updated.push(Message::assistant(reply.clone()));
        let updated = retain_recent(updated, self.config.history_limit);
        if let Err(err) = self.history.save(&conversation, &updated).await {
            warn!(conversation = %conversation, error = %err, "Failed to save chat history");
        }

        Ok(reply)
    }
}
