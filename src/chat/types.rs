//! Conversation and wire types for the chat client.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Conversation id used when the caller does not supply one.
pub const DEFAULT_CONVERSATION_ID: &str = "default";

/// Opaque key partitioning history into independent threads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wrap a conversation key.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self(DEFAULT_CONVERSATION_ID.to_string())
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ConversationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Author of a stored message.
///
/// Any stored role other than `user` reads back as [`Role::Assistant`], which
/// keeps records written with `bot` as the sender readable.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// Message typed by the user.
    User,
    /// Reply produced by the model.
    Assistant,
}

impl Role {
    /// Role name sent to the completion endpoint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        if value == "user" {
            Self::User
        } else {
            Self::Assistant
        }
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// Opaque message identifier, time-ordered when generated locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a new time-ordered identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Borrow as `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One stored conversation turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Author.
    #[serde(alias = "sender")]
    pub role: Role,
    /// Text content.
    pub content: String,
    /// Creation time.
    #[serde(alias = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Fields written by other clients (for example `type` or `imageUrl`), saved back unchanged.
    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Build a message with a fresh id and the current time.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            extra: Map::new(),
        }
    }

    /// Build a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Build an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// `{role, content}` pair as sent to the completion endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// `user` or `assistant`.
    pub role: String,
    /// Text content.
    pub content: String,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

/// Body of `POST /chat/completions`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model name.
    pub model: String,
    /// Prior turns in stored order, then the new user turn.
    pub messages: Vec<WireMessage>,
}

impl ChatCompletionRequest {
    /// Assemble the prompt from stored history plus the new user content.
    #[must_use]
    pub fn new(model: impl Into<String>, history: &[Message], user_content: &str) -> Self {
        let mut messages: Vec<WireMessage> = history.iter().map(WireMessage::from).collect();
        messages.push(WireMessage {
            role: Role::User.as_str().to_string(),
            content: user_content.to_string(),
        });
        Self {
            model: model.into(),
            messages,
        }
    }
}

/// Successful completion body. Every field is optional so sparse bodies still decode.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ChatCompletionResponse {
    /// Completion id assigned by the server.
    #[serde(default)]
    pub id: String,
    /// Generated choices.
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
    /// Token accounting.
    #[serde(default)]
    pub usage: Option<CompletionUsage>,
}

impl ChatCompletionResponse {
    /// Build a single-choice response.
    #[must_use]
    pub fn with_reply(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            choices: vec![CompletionChoice {
                message: Some(ChoiceMessage {
                    content: Some(content.into()),
                }),
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        }
    }

    /// Text of the first choice, if present and non-empty.
    #[must_use]
    pub fn reply_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.as_ref())
            .and_then(|message| message.content.as_deref())
            .filter(|content| !content.is_empty())
    }
}

/// One generated choice.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CompletionChoice {
    /// Generated message.
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
    /// Why generation stopped.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Message inside a choice.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ChoiceMessage {
    /// Generated text.
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage reported by the server.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct CompletionUsage {
    /// Prompt tokens.
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Completion tokens.
    #[serde(default)]
    pub completion_tokens: u32,
    /// Sum of both.
    #[serde(default)]
    pub total_tokens: u32,
}
