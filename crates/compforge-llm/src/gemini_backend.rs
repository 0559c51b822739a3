//! Gemini adapter for the `generateContent` API
//!
//! Gemini is the default provider. The key travels as the `key` query
//! parameter, so the request URL is itself a secret: it is never logged and
//! every error message is scrubbed before it leaves the adapter.

use crate::credentials::ApiKey;
use crate::http_client::HttpClient;
use crate::types::{HttpParams, LlmBackend, LlmInvocation, LlmResult, Role};
use async_trait::async_trait;
use compforge_utils::error::LlmError;
use compforge_utils::types::ProviderId;
use reqwest::Url;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct GeminiBackend {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: ApiKey,
    default_params: HttpParams,
}

impl GeminiBackend {
    #[must_use]
    pub fn new(
        client: Arc<HttpClient>,
        api_key: ApiKey,
        base_url: impl Into<String>,
        default_params: HttpParams,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            default_params,
        }
    }

    fn endpoint(&self, model: &str) -> Result<Url, LlmError> {
        let raw = format!("{}/v1beta/models/{model}:generateContent", self.base_url);
        Url::parse_with_params(&raw, &[("key", self.api_key.expose())]).map_err(|e| {
            LlmError::Misconfiguration(format!("invalid Gemini endpoint '{raw}': {e}"))
        })
    }

    fn request_body(inv: &LlmInvocation, params: &HttpParams) -> Value {
        let contents: Vec<Value> = inv
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = if m.role == Role::Assistant { "model" } else { "user" };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": params.max_tokens,
                "temperature": params.temperature,
            },
        });
        if let Some(system) = inv.system_instruction() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }

    fn extract_text(body: &str) -> Result<(String, Option<u64>, Option<u64>), LlmError> {
        let malformed = |message: &str| LlmError::MalformedResponse {
            provider: ProviderId::Gemini,
            message: message.to_string(),
        };

        let json: Value = serde_json::from_str(body)
            .map_err(|_| malformed("response body is not JSON"))?;

        let text = json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| {
                match json["candidates"][0]["finishReason"].as_str() {
                    Some(reason) => LlmError::MalformedResponse {
                        provider: ProviderId::Gemini,
                        message: format!("no text in candidates[0] (finishReason {reason})"),
                    },
                    None => malformed("no text in candidates[0]"),
                }
            })?
            .to_string();

        let usage = &json["usageMetadata"];
        Ok((
            text,
            usage["promptTokenCount"].as_u64(),
            usage["candidatesTokenCount"].as_u64(),
        ))
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        inv.validate_for(ProviderId::Gemini)?;
        let params = self.default_params.resolve(&inv);
        let url = self.endpoint(&inv.model)?;

        debug!(
            provider = "gemini",
            stage = %inv.stage,
            model = %inv.model,
            max_tokens = params.max_tokens,
            temperature = params.temperature,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking Gemini backend"
        );

        let request = self
            .client
            .inner()
            .post(url)
            .header("Content-Type", "application/json")
            .json(&Self::request_body(&inv, &params));

        let body = self
            .client
            .execute(request, inv.timeout, ProviderId::Gemini, self.api_key.expose())
            .await?;

        let (text, tokens_input, tokens_output) = Self::extract_text(&body)?;
        let result = LlmResult::new(text, ProviderId::Gemini, inv.model.clone())
            .with_tokens(tokens_input, tokens_output);

        debug!(
            provider = "gemini",
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "Gemini invocation completed"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use compforge_utils::test_support;
    use compforge_utils::types::StageId;
    use mockito::Matcher;
    use std::time::Duration;

    const PATH: &str = "/v1beta/models/gemini-2.5-pro:generateContent";

    fn backend(base_url: &str, key: &str) -> GeminiBackend {
        GeminiBackend::new(
            Arc::new(HttpClient::new().unwrap()),
            ApiKey::new(key),
            base_url,
            HttpParams {
                max_tokens: 4096,
                temperature: 0.2,
            },
        )
    }

    fn invocation(model: &str) -> LlmInvocation {
        LlmInvocation::new(
            StageId::SpecDraft,
            model,
            Duration::from_secs(10),
            vec![Message::system("return json"), Message::user("a login form")],
        )
    }

    #[test]
    fn test_request_body_shape() {
        let body = GeminiBackend::request_body(&invocation("gemini-2.5-pro"), &HttpParams::default());
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "a login form");
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "return json");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[test]
    fn test_endpoint_encodes_key_as_query() {
        let b = backend("http://relay.local/api/gemini/", "abc+/=");
        let url = b.endpoint("gemini-2.5-flash").unwrap();
        assert_eq!(url.path(), "/api/gemini/v1beta/models/gemini-2.5-flash:generateContent");
        assert_eq!(url.query(), Some("key=abc%2B%2F%3D"));
    }

    #[test]
    fn test_extract_text_reports_finish_reason() {
        let body = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        match GeminiBackend::extract_text(body) {
            Err(LlmError::MalformedResponse { message, .. }) => assert!(message.contains("SAFETY")),
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
        assert!(GeminiBackend::extract_text(r#"{"candidates":[{"content":{"parts":[{"text":7}]}}]}"#).is_err());
    }

    #[tokio::test]
    async fn test_invoke_happy_path() {
        let mut server = mockito::Server::new_async().await;
        let key = test_support::gemini_api_key();
        let mock = server
            .mock("POST", PATH)
            .match_query(Matcher::UrlEncoded("key".into(), key.clone()))
            .match_body(Matcher::PartialJson(json!({
                "systemInstruction": {"parts": [{"text": "return json"}]},
                "generationConfig": {"maxOutputTokens": 4096}
            })))
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"{\"component\":\"LoginForm\"}"}],"role":"model"},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":10,"candidatesTokenCount":4}}"#)
            .create_async()
            .await;

        let result = backend(&server.url(), &key)
            .invoke(invocation("gemini-2.5-pro"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.text, r#"{"component":"LoginForm"}"#);
        assert_eq!(result.model_used, "gemini-2.5-pro");
        assert_eq!(result.tokens_input, Some(10));
        assert_eq!(result.tokens_output, Some(4));
    }

    #[tokio::test]
    async fn test_invoke_invalid_key_is_authentication_failure() {
        let mut server = mockito::Server::new_async().await;
        let key = test_support::gemini_api_key();
        let _mock = server
            .mock("POST", PATH)
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#)
            .create_async()
            .await;

        let err = backend(&server.url(), &key)
            .invoke(invocation("gemini-2.5-pro"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LlmError::AuthenticationFailure {
                provider: ProviderId::Gemini,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_invoke_error_echoing_url_never_leaks_key() {
        let mut server = mockito::Server::new_async().await;
        let key = test_support::short_opaque_key();
        let echoed = format!("bad gateway for {PATH}?key={key}");
        let _mock = server
            .mock("POST", PATH)
            .match_query(Matcher::Any)
            .with_status(502)
            .with_body(echoed)
            .create_async()
            .await;

        let err = backend(&server.url(), &key)
            .invoke(invocation("gemini-2.5-pro"))
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::Transport { status: Some(502), .. }));
        assert!(!err.to_string().contains(&key));
        assert!(!format!("{err:?}").contains(&key));
    }

    #[tokio::test]
    async fn test_invoke_non_json_success_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>relay login</html>")
            .create_async()
            .await;

        let err = backend(&server.url(), "k-test")
            .invoke(invocation("gemini-2.5-pro"))
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::MalformedResponse { .. }));
    }
}
