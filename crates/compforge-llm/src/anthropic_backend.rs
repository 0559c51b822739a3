//! Claude adapter for Anthropic's Messages API

use crate::credentials::ApiKey;
use crate::http_client::HttpClient;
use crate::types::{HttpParams, LlmBackend, LlmInvocation, LlmResult, Message, Role};
use async_trait::async_trait;
use compforge_utils::error::LlmError;
use compforge_utils::types::ProviderId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone, Debug)]
pub struct AnthropicBackend {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: ApiKey,
    default_params: HttpParams,
}

impl AnthropicBackend {
    /// `base_url` is the provider root (public host, relay prefix or override);
    /// `/v1/messages` is appended per call.
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

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    /// Split system messages into the top-level `system` field.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system_prompt: Option<String> = None;
        let mut anthropic_messages = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => {
                    if let Some(existing) = system_prompt.as_mut() {
                        existing.push_str("\n\n");
                        existing.push_str(&msg.content);
                    } else {
                        system_prompt = Some(msg.content.clone());
                    }
                }
                Role::User => anthropic_messages.push(AnthropicMessage {
                    role: "user",
                    content: msg.content.clone(),
                }),
                Role::Assistant => anthropic_messages.push(AnthropicMessage {
                    role: "assistant",
                    content: msg.content.clone(),
                }),
            }
        }

        (system_prompt, anthropic_messages)
    }

    fn extract_text(body: &str) -> Result<(String, Option<Usage>), LlmError> {
        let response: AnthropicResponse =
            serde_json::from_str(body).map_err(|e| LlmError::MalformedResponse {
                provider: ProviderId::Claude,
                message: format!("response is not a Messages API body: {e}"),
            })?;

        let text = response
            .content
            .into_iter()
            .find(|block| block.content_type == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| LlmError::MalformedResponse {
                provider: ProviderId::Claude,
                message: "response has no text content block".to_string(),
            })?;

        Ok((text, response.usage))
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    fn provider(&self) -> ProviderId {
        ProviderId::Claude
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        inv.validate_for(ProviderId::Claude)?;
        let params = self.default_params.resolve(&inv);

        debug!(
            provider = "claude",
            stage = %inv.stage,
            model = %inv.model,
            max_tokens = params.max_tokens,
            temperature = params.temperature,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking Claude backend"
        );

        let (system, messages) = Self::convert_messages(&inv.messages);
        let request_body = AnthropicRequest {
            model: &inv.model,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            system,
            messages,
        };

        let request = self
            .client
            .inner()
            .post(self.endpoint())
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body);

        let body = self
            .client
            .execute(request, inv.timeout, ProviderId::Claude, self.api_key.expose())
            .await?;

        let (text, usage) = Self::extract_text(&body)?;
        let result = LlmResult::new(text, ProviderId::Claude, inv.model.clone()).with_tokens(
            usage.as_ref().map(|u| u.input_tokens),
            usage.as_ref().map(|u| u.output_tokens),
        );

        debug!(
            provider = "claude",
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "Claude invocation completed"
        );

        Ok(result)
    }
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}
