//! Configuration for the chat client.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::chat::error::{ChatError, ChatResult};

/// Default completion API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";
/// Default model name.
pub const DEFAULT_MODEL: &str = "deepseek-chat";
/// Reply used when the server returns no usable content.
pub const DEFAULT_FALLBACK_REPLY: &str = "I apologize, but I was unable to generate a response.";
/// Number of messages kept per conversation.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Environment variable prefix read by [`ChatConfig::from_env`].
const ENV_PREFIX: &str = "CROPSCAN_";

/// Configuration for the chat client.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatConfig {
    /// API base URL; `/chat/completions` is appended.
    pub base_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Model name sent with every request.
    pub model: String,
    /// Per-request connection and response timeout.
    #[serde(rename = "timeoutMs", with = "duration_ms")]
    pub timeout: Duration,
    /// Minimum spacing between outbound requests.
    #[serde(rename = "rateLimitDelayMs", with = "duration_ms")]
    pub rate_limit_delay: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled after each one.
    #[serde(rename = "retryBaseDelayMs", with = "duration_ms")]
    pub retry_base_delay: Duration,
    /// Messages kept per conversation.
    pub history_limit: usize,
    /// Reply used when the completion carries no text.
    pub fallback_reply: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(10),
            rate_limit_delay: Duration::from_millis(1000),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            history_limit: DEFAULT_HISTORY_LIMIT,
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let api_key = if self.api_key.is_empty() {
            "<unset>"
        } else {
            "[REDACTED]"
        };
        f.debug_struct("ChatConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &api_key)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("rate_limit_delay", &self.rate_limit_delay)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("history_limit", &self.history_limit)
            .finish_non_exhaustive()
    }
}

impl ChatConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object of recognized options; missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed.
    pub fn from_json(raw: &str) -> ChatResult<Self> {
        serde_json::from_str(raw).map_err(|e| ChatError::Config(e.to_string()))
    }

    /// Build a config from `CROPSCAN_*` environment variables over the defaults.
    ///
    /// # Errors
    /// Returns an error if a numeric variable cannot be parsed.
    pub fn from_env() -> ChatResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup over the defaults.
    ///
    /// # Errors
    /// Returns an error if a numeric variable cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> ChatResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(base_url) = var("BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(api_key) = var("API_KEY") {
            config.api_key = api_key;
        }
        if let Some(model) = var("MODEL") {
            config.model = model;
        }
        if let Some(ms) = var("TIMEOUT_MS") {
            config.timeout = Duration::from_millis(parse_number("TIMEOUT_MS", &ms)?);
        }
        if let Some(ms) = var("RATE_LIMIT_DELAY_MS") {
            config.rate_limit_delay =
                Duration::from_millis(parse_number("RATE_LIMIT_DELAY_MS", &ms)?);
        }
        if let Some(retries) = var("MAX_RETRIES") {
            config.max_retries = parse_number("MAX_RETRIES", &retries)?;
        }
        if let Some(limit) = var("HISTORY_LIMIT") {
            config.history_limit = parse_number("HISTORY_LIMIT", &limit)?;
        }

        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid, including a zero timeout.
    pub fn validate(&self) -> ChatResult<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| ChatError::Config(format!("invalid baseUrl {}: {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ChatError::Config(format!(
                "baseUrl must use http or https, got {}",
                url.scheme()
            )));
        }

        if self.model.trim().is_empty() {
            return Err(ChatError::Config("model must not be empty".to_string()));
        }

        if self.timeout.is_zero() {
            return Err(ChatError::Config("timeoutMs must be > 0".to_string()));
        }

        if self.history_limit == 0 {
            return Err(ChatError::Config("historyLimit must be > 0".to_string()));
        }

        Ok(())
    }

    /// Full URL of the completion endpoint.
    #[must_use]
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Set the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Set the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the minimum spacing between requests.
    #[must_use]
    pub const fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    /// Set the number of retries after the first attempt.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay before the first retry.
    #[must_use]
    pub const fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Set the number of messages kept per conversation.
    #[must_use]
    pub const fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> ChatResult<T> {
    raw.parse::<T>()
        .map_err(|_| ChatError::Config(format!("{ENV_PREFIX}{name} must be a number, got {raw:?}")))
}

/// Serde module for millisecond `Duration` fields.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
