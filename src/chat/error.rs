//! Error types for the chat client.
//!
//! The `Display` output of [`ChatError`] is the message shown to the end user,
//! so callers can surface `err.to_string()` directly.

use thiserror::Error;

/// Kind of failure when no HTTP response was received.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NetworkFailure {
    /// The request exceeded the configured timeout.
    Timeout,
    /// DNS resolution or the TCP/TLS connection failed.
    Connect,
    /// The queued request was dropped before it produced a result.
    Cancelled,
    /// Any other transport-level failure.
    Other,
}

impl NetworkFailure {
    /// User-facing message for this failure.
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::Timeout => "Connection timeout. Please try again.",
            Self::Connect => "Network error. Please check your internet connection.",
            Self::Cancelled => "Request was cancelled.",
            Self::Other => {
                "Unable to connect to the server. Please check your internet connection."
            }
        }
    }
}

/// Errors returned by the chat client.
#[derive(Debug, Error)]
pub enum ChatError {
    /// No response was received from the server.
    #[error("{}", .kind.user_message())]
    Network {
        /// What went wrong.
        kind: NetworkFailure,
        /// Transport detail, for logs only.
        detail: String,
    },

    /// HTTP 429.
    #[error("Too many requests. Please try again later.")]
    RateLimited,

    /// HTTP 5xx.
    #[error("Server error. Please try again later.")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Error message reported by the API, if any.
        detail: Option<String>,
    },

    /// HTTP 4xx other than 429.
    #[error("{}", client_message(*.status, .detail.as_deref()))]
    Client {
        /// HTTP status code.
        status: u16,
        /// Error message reported by the API, if any.
        detail: Option<String>,
    },

    /// A success status carried a body that could not be decoded.
    #[error("Received an invalid response from the server.")]
    InvalidResponse(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl ChatError {
    /// Classify a non-success HTTP status.
    #[must_use]
    pub fn from_status(status: u16, detail: Option<String>) -> Self {
        match status {
            429 => Self::RateLimited,
            500..=599 => Self::Server { status, detail },
            _ => Self::Client { status, detail },
        }
    }

    /// Build a network failure.
    #[must_use]
    pub fn network(kind: NetworkFailure, detail: impl Into<String>) -> Self {
        Self::Network {
            kind,
            detail: detail.into(),
        }
    }

    /// Build a cancellation failure.
    #[must_use]
    pub fn cancelled(detail: impl Into<String>) -> Self {
        Self::network(NetworkFailure::Cancelled, detail)
    }

    /// Check if this error is transient and worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network { kind, .. } => !matches!(kind, NetworkFailure::Cancelled),
            Self::RateLimited | Self::Server { .. } => true,
            _ => false,
        }
    }

    /// HTTP status associated with this error, if a response was received.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited => Some(429),
            Self::Server { status, .. } | Self::Client { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), None);
        }
        let kind = if err.is_timeout() {
            NetworkFailure::Timeout
        } else if err.is_connect() {
            NetworkFailure::Connect
        } else if err.is_builder() {
            return Self::HttpClient(err.to_string());
        } else {
            NetworkFailure::Other
        };
        Self::network(kind, err.to_string())
    }
}

fn client_message(status: u16, detail: Option<&str>) -> String {
    match status {
        401 => "Authentication failed. Please check your API key.".to_string(),
        403 => "Access forbidden. Please check your API permissions.".to_string(),
        404 => "API endpoint not found. Please check the API configuration.".to_string(),
        _ => format!(
            "Error: {}",
            detail.unwrap_or("Unknown error occurred")
        ),
    }
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;
