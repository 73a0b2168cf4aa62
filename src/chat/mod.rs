//! Chat client for an `OpenAI`-compatible completion endpoint.
//!
//! Every outbound request goes through a serial, rate-limited queue and is
//! retried with exponential backoff on transient failures. Failures surface as
//! a [`ChatError`] whose `Display` is a message fit for end users.

/// Client facade.
pub mod client;
/// Client configuration.
pub mod config;
/// Error classification.
pub mod error;
/// Serial request queue.
pub mod queue;
/// Backoff policy.
pub mod retry;
/// HTTP transport.
pub mod transport;
/// Messages and wire types.
pub mod types;

pub use client::ChatClient;
pub use config::ChatConfig;
pub use error::{ChatError, ChatResult, NetworkFailure};
pub use queue::RequestQueue;
pub use retry::RetryPolicy;
pub use transport::{ChatTransport, HttpTransport, TransportFuture};
pub use types::{
    ChatCompletionRequest, ChatCompletionResponse, ConversationId, Message, MessageId, Role,
};
