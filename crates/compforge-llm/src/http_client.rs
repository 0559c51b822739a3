//! Shared HTTP client for the provider adapters
//!
//! One `reqwest::Client` is built per gateway and reused for every call; it
//! carries the connection pool and nothing else. Each call is a single
//! attempt. Non-2xx responses are classified here so every adapter reports
//! failures the same way.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, RequestBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use compforge_error_redaction::{redact_with_secrets, truncate_chars};
use compforge_utils::error::LlmError;
use compforge_utils::types::ProviderId;

/// Default maximum HTTP timeout (5 minutes)
const DEFAULT_MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on the upstream message kept in an error.
const MAX_UPSTREAM_MESSAGE_CHARS: usize = 300;

static AUTH_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(api[ _-]?key not valid|invalid[ _-]?x-api-key|invalid_api_key|incorrect api key|invalid api key|api_key_invalid|authentication[ _]error|authentication failed|unauthenticated|permission[ _]denied)\b",
    )
    .unwrap()
});

static MODALITY_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(does not support (image|vision)|image input|unsupported modality|modality is not supported|vision is not supported|image_url|multimodal input)\b",
    )
    .unwrap()
});

/// Shared HTTP client for provider adapters
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Arc<Client>,
    max_timeout: Duration,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the client cannot be constructed
    pub fn new() -> Result<Self, LlmError> {
        Self::with_max_timeout(DEFAULT_MAX_HTTP_TIMEOUT)
    }

    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the client cannot be constructed
    pub fn with_max_timeout(max_timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| {
                LlmError::Misconfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client: Arc::new(client),
            max_timeout,
        })
    }

    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Send one request and return the body of a 2xx response.
    ///
    /// The effective timeout is `min(request_timeout, max_timeout)`. `secret`
    /// is scrubbed from every message placed in the returned error.
    ///
    /// # Errors
    ///
    /// - `LlmError::Timeout` when the request exceeds the effective timeout
    /// - `LlmError::Transport { status: None }` for connection failures
    /// - a classified error (see [`classify_error`]) for non-2xx statuses
    pub async fn execute(
        &self,
        request_builder: RequestBuilder,
        request_timeout: Duration,
        provider: ProviderId,
        secret: &str,
    ) -> Result<String, LlmError> {
        let effective_timeout = request_timeout.min(self.max_timeout);

        let request = request_builder
            .timeout(effective_timeout)
            .build()
            .map_err(|e| LlmError::Transport {
                provider,
                status: None,
                message: redact_with_secrets(&format!("Failed to build request: {e}"), &[secret]),
            })?;

        debug!(
            provider = %provider,
            timeout_secs = effective_timeout.as_secs(),
            "Executing HTTP request"
        );

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| map_send_error(&e, provider, effective_timeout, secret))?;

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => {
                return Err(LlmError::Timeout {
                    provider,
                    duration: effective_timeout,
                });
            }
            Err(e) => {
                return Err(LlmError::Transport {
                    provider,
                    status: Some(status.as_u16()),
                    message: redact_with_secrets(
                        &format!("Failed to read response body: {e}"),
                        &[secret],
                    ),
                });
            }
        };

        if status.is_success() {
            debug!(provider = %provider, status = status.as_u16(), bytes = body.len(), "HTTP request succeeded");
            return Ok(body);
        }

        debug!(provider = %provider, status = status.as_u16(), "HTTP request failed");
        Err(classify_error(provider, status.as_u16(), &body, secret))
    }
}

fn map_send_error(
    error: &reqwest::Error,
    provider: ProviderId,
    timeout: Duration,
    secret: &str,
) -> LlmError {
    if error.is_timeout() {
        return LlmError::Timeout {
            provider,
            duration: timeout,
        };
    }
    // reqwest errors include the URL, which carries the Gemini key.
    LlmError::Transport {
        provider,
        status: None,
        message: redact_with_secrets(&format!("request failed: {error}"), &[secret]),
    }
}

/// Classify a non-2xx response.
///
/// 401 and 403 are always auth failures. Body markers are only consulted for
/// other 4xx statuses, auth before modality. Anything else, including every
/// 5xx, is a transport failure carrying the status.
#[must_use]
pub fn classify_error(provider: ProviderId, status: u16, body: &str, secret: &str) -> LlmError {
    let message = upstream_message(body, status, secret);

    if status == 401 || status == 403 {
        return LlmError::AuthenticationFailure { provider, message };
    }

    // Markers only count on client errors; a 5xx stays retryable.
    if (400..500).contains(&status) {
        if AUTH_MARKERS.is_match(body) {
            return LlmError::AuthenticationFailure { provider, message };
        }
        if MODALITY_MARKERS.is_match(body) {
            return LlmError::UnsupportedModality { provider, message };
        }
    }

    LlmError::Transport {
        provider,
        status: Some(status),
        message,
    }
}

/// Best human-readable message in an error body, redacted and bounded.
///
/// All three providers put it at `error.message`; some relays return a bare
/// string or plain text instead.
fn upstream_message(body: &str, status: u16, secret: &str) -> String {
    let extracted = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            let error = json.get("error")?;
            error
                .get("message")
                .and_then(|m| m.as_str())
                .or_else(|| error.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    let message = if extracted.is_empty() {
        format!("HTTP {status}")
    } else {
        extracted
    };

    truncate_chars(
        &redact_with_secrets(&message, &[secret]),
        MAX_UPSTREAM_MESSAGE_CHARS,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use compforge_utils::test_support;

    #[test]
    fn test_http_client_construction() {
        assert!(HttpClient::new().is_ok());
        let client = HttpClient::with_max_timeout(Duration::from_secs(60)).unwrap();
        assert_eq!(client.max_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_status_401_and_403_are_auth_failures() {
        for status in [401, 403] {
            match classify_error(ProviderId::Claude, status, "{}", "") {
                LlmError::AuthenticationFailure { provider, .. } => {
                    assert_eq!(provider, ProviderId::Claude);
                }
                other => panic!("expected AuthenticationFailure, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_gemini_400_with_key_marker_is_auth_failure() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        match classify_error(ProviderId::Gemini, 400, body, "") {
            LlmError::AuthenticationFailure { message, .. } => {
                assert!(message.starts_with("API key not valid"));
            }
            other => panic!("expected AuthenticationFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_auth_wins_over_modality() {
        let body = r#"{"error":{"message":"invalid x-api-key for vision model"}}"#;
        assert!(matches!(
            classify_error(ProviderId::Claude, 400, body, ""),
            LlmError::AuthenticationFailure { .. }
        ));
    }

    #[test]
    fn test_modality_markers() {
        for body in [
            r#"{"error":{"message":"This model does not support image input"}}"#,
            r#"{"error":{"message":"Invalid content type. image_url is only supported by certain models."}}"#,
            "unsupported modality",
        ] {
            match classify_error(ProviderId::OpenAi, 400, body, "") {
                LlmError::UnsupportedModality { provider, .. } => {
                    assert_eq!(provider, ProviderId::OpenAi);
                }
                other => panic!("expected UnsupportedModality for {body}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_other_statuses_are_transport_with_status() {
        for status in [400, 404, 429, 500, 502, 503] {
            match classify_error(ProviderId::Gemini, status, "upstream exploded", "") {
                LlmError::Transport {
                    status: Some(s),
                    message,
                    ..
                } => {
                    assert_eq!(s, status);
                    assert_eq!(message, "upstream exploded");
                }
                other => panic!("expected Transport, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_server_errors_stay_transport_despite_markers() {
        for (status, body) in [
            (503, r#"{"error":{"message":"Service unavailable while provisioning capacity"}}"#),
            (500, r#"{"error":{"message":"Internal error in authentication service"}}"#),
            (502, "upstream image input pipeline restarting"),
            (500, r#"{"error":{"message":"invalid api key cache unavailable"}}"#),
        ] {
            match classify_error(ProviderId::Gemini, status, body, "") {
                LlmError::Transport { status: Some(s), .. } => assert_eq!(s, status),
                other => panic!("expected Transport for {status} {body}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_markers_match_whole_words_only() {
        for body in [
            r#"{"error":{"message":"Request rejected by model revision policy"}}"#,
            r#"{"error":{"message":"Quota exceeded for division of this project"}}"#,
            r#"{"error":{"message":"Supervision of this request failed authentication_errors_total"}}"#,
        ] {
            assert!(
                matches!(
                    classify_error(ProviderId::Claude, 400, body, ""),
                    LlmError::Transport { status: Some(400), .. }
                ),
                "misclassified {body}"
            );
        }
    }

    #[test]
    fn test_empty_body_message_falls_back_to_status() {
        match classify_error(ProviderId::Gemini, 504, "   ", "") {
            LlmError::Transport { message, .. } => assert_eq!(message, "HTTP 504"),
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[test]
    fn test_upstream_message_scrubs_secret() {
        let secret = test_support::short_opaque_key();
        let body = format!(r#"{{"error":{{"message":"key {secret} is revoked"}}}}"#);
        let err = classify_error(ProviderId::OpenAi, 500, &body, &secret);
        assert!(!err.to_string().contains(&secret));
    }

    #[test]
    fn test_upstream_message_is_bounded() {
        let body = "x ".repeat(1000);
        match classify_error(ProviderId::Gemini, 500, &body, "") {
            LlmError::Transport { message, .. } => {
                assert!(message.chars().count() <= MAX_UPSTREAM_MESSAGE_CHARS + 1);
            }
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_without_status() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let secret = test_support::gemini_api_key();
        let client = HttpClient::new().unwrap();
        let url = format!("http://{addr}/v1beta/models/x:generateContent?key={secret}");
        let err = client
            .execute(
                client.inner().post(&url),
                Duration::from_secs(5),
                ProviderId::Gemini,
                &secret,
            )
            .await
            .unwrap_err();

        match &err {
            LlmError::Transport { status: None, .. } => {}
            other => panic!("expected Transport without status, got {other:?}"),
        }
        assert!(!err.to_string().contains(&secret));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = HttpClient::new().unwrap();
        let err = client
            .execute(
                client.inner().post(format!("http://{addr}/")),
                Duration::from_millis(200),
                ProviderId::Claude,
                "",
            )
            .await
            .unwrap_err();
        server.abort();

        match err {
            LlmError::Timeout { provider, duration } => {
                assert_eq!(provider, ProviderId::Claude);
                assert_eq!(duration, Duration::from_millis(200));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }
}
