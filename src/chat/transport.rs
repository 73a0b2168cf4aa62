//! Transport seam between the chat client and the completion endpoint.

use std::future::Future;
use std::pin::Pin;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, info, warn};

use crate::chat::config::ChatConfig;
use crate::chat::error::{ChatError, ChatResult};
use crate::chat::types::{ChatCompletionRequest, ChatCompletionResponse};

/// Boxed future type for transport operations.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Sends one completion request and returns the decoded response.
pub trait ChatTransport: Send + Sync {
    /// Perform a single request with no retrying.
    ///
    /// # Errors
    /// Returns a classified [`ChatError`] for transport failures and non-success statuses.
    fn complete<'a>(
        &'a self,
        request: &'a ChatCompletionRequest,
    ) -> TransportFuture<'a, ChatResult<ChatCompletionResponse>>;
}

/// `reqwest`-backed transport for `POST {base_url}/chat/completions`.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Build the transport from client configuration.
    ///
    /// # Errors
    /// Returns an error if the API key is missing or the HTTP client cannot be created.
    pub fn new(config: &ChatConfig) -> ChatResult<Self> {
        config.validate()?;
        let client = Self::build_client(config)?;
        Ok(Self {
            client,
            endpoint: config.completions_url(),
        })
    }

    /// Endpoint every request is posted to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build an HTTP client with auth headers and the configured timeout.
    fn build_client(config: &ChatConfig) -> ChatResult<reqwest::Client> {
        if config.api_key.trim().is_empty() {
            return Err(ChatError::Config("apiKey is not configured".to_string()));
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key.trim()))
            .map_err(|_| ChatError::Config("apiKey contains invalid characters".to_string()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| ChatError::HttpClient(e.to_string()))
    }

    async fn post(&self, request: &ChatCompletionRequest) -> ChatResult<ChatCompletionResponse> {
        debug!(
            url = %self.endpoint,
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|err| {
                let err = ChatError::from(err);
                warn!(error = ?err, "Chat completion request failed");
                err
            })?;

        let status = response.status();
        info!(status = status.as_u16(), "Chat completion response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = api_error_message(&body);
            warn!(status = status.as_u16(), detail = ?detail, "Chat completion rejected");
            return Err(ChatError::from_status(status.as_u16(), detail));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ChatError::InvalidResponse(e.to_string()))
    }
}

impl ChatTransport for HttpTransport {
    fn complete<'a>(
        &'a self,
        request: &'a ChatCompletionRequest,
    ) -> TransportFuture<'a, ChatResult<ChatCompletionResponse>> {
        Box::pin(self.post(request))
    }
}

/// Pull `error.message` out of an API error body.
fn api_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|error| error.get("message").or(Some(error)))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .filter(|message| !message.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::error::NetworkFailure;
    use crate::chat::types::Message;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let raw = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            raw
        });
        (format!("http://{addr}/v1"), handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        if name.eq_ignore_ascii_case("content-length") {
                            value.trim().parse::<usize>().ok()
                        } else {
                            None
                        }
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest::new("deepseek-chat", &[Message::user("hi")], "my tomato leaves curl")
    }

    fn transport(base_url: &str) -> HttpTransport {
        HttpTransport::new(
            &ChatConfig::new()
                .with_base_url(base_url)
                .with_api_key("sk-test")
                .with_timeout(Duration::from_secs(5)),
        )
        .unwrap()
    }

    #[test]
    fn test_requires_api_key() {
        let result = HttpTransport::new(&ChatConfig::default());
        assert!(matches!(result, Err(ChatError::Config(_))));
    }

    #[test]
    fn test_rejects_invalid_api_key() {
        let result = HttpTransport::new(&ChatConfig::new().with_api_key("sk\nbad"));
        assert!(matches!(result, Err(ChatError::Config(_))));
    }

    #[test]
    fn test_endpoint() {
        let transport = transport("https://api.example.com/v1/");
        assert_eq!(transport.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn test_api_error_message() {
        assert_eq!(
            api_error_message(r#"{"error":{"message":"Model Not Exist","type":"invalid_request_error"}}"#),
            Some("Model Not Exist".to_string())
        );
        assert_eq!(
            api_error_message(r#"{"error":"quota exceeded"}"#),
            Some("quota exceeded".to_string())
        );
        assert_eq!(api_error_message("<html>bad gateway</html>"), None);
        assert_eq!(api_error_message(r#"{"detail":"x"}"#), None);
    }

    #[tokio::test]
    async fn test_success_round_trip() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"id":"c1","choices":[{"message":{"content":"Water less often."},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":4,"total_tokens":7}}"#,
        )
        .await;

        let response = transport(&base_url).complete(&request()).await.unwrap();
        assert_eq!(response.reply_text(), Some("Water less often."));

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /v1/chat/completions HTTP/1.1"));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer sk-test"));
        assert!(raw.contains(r#""model":"deepseek-chat""#));
        assert!(raw.contains("my tomato leaves curl"));
    }

    #[tokio::test]
    async fn test_unauthorized_is_client_error() {
        let (base_url, server) =
            serve_once("401 Unauthorized", r#"{"error":{"message":"bad key"}}"#).await;

        let err = transport(&base_url).complete(&request()).await.unwrap_err();
        assert!(matches!(err, ChatError::Client { status: 401, .. }));
        assert!(!err.is_retryable());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_rate_limited_and_server_errors() {
        let (limited_url, limited_server) = serve_once("429 Too Many Requests", "{}").await;
        let limited = transport(&limited_url).complete(&request()).await.unwrap_err();
        assert!(matches!(limited, ChatError::RateLimited));
        limited_server.await.unwrap();

        let (failing_url, failing_server) = serve_once("503 Service Unavailable", "").await;
        let failing = transport(&failing_url).complete(&request()).await.unwrap_err();
        assert!(matches!(failing, ChatError::Server { status: 503, .. }));
        failing_server.await.unwrap();
    }

    #[tokio::test]
    async fn test_undecodable_body() {
        let (base_url, server) = serve_once("200 OK", "not json").await;
        let err = transport(&base_url).complete(&request()).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidResponse(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(socket);
        });

        let transport = HttpTransport::new(
            &ChatConfig::new()
                .with_base_url(format!("http://{addr}/v1"))
                .with_api_key("sk-test")
                .with_timeout(Duration::from_millis(300)),
        )
        .unwrap();

        let err = transport.complete(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            ChatError::Network {
                kind: NetworkFailure::Timeout,
                ..
            }
        ));
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Connection timeout. Please try again.");
        server.abort();
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = transport(&format!("http://{addr}"))
            .complete(&request())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChatError::Network {
                kind: NetworkFailure::Connect,
                ..
            }
        ));
        assert!(err.is_retryable());
    }
}
