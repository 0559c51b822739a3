//! OpenAI adapter for the Chat Completions API

use crate::credentials::ApiKey;
use crate::http_client::HttpClient;
use crate::types::{HttpParams, LlmBackend, LlmInvocation, LlmResult, Message, Role};
use async_trait::async_trait;
use compforge_utils::error::LlmError;
use compforge_utils::types::ProviderId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct OpenAiBackend {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: ApiKey,
    default_params: HttpParams,
}

impl OpenAiBackend {
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
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn convert_messages(messages: &[Message]) -> Vec<OpenAiMessage<'_>> {
        messages
            .iter()
            .map(|msg| OpenAiMessage {
                role: match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &msg.content,
            })
            .collect()
    }

    fn extract_text(body: &str) -> Result<(String, Option<Usage>), LlmError> {
        let malformed = |message: String| LlmError::MalformedResponse {
            provider: ProviderId::OpenAi,
            message,
        };

        let response: ChatResponse = serde_json::from_str(body)
            .map_err(|e| malformed(format!("response is not a chat completion: {e}")))?;

        let text = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| malformed("response missing choices[0]".to_string()))?
            .message
            .content
            .ok_or_else(|| malformed("response missing content in choices[0]".to_string()))?;

        Ok((text, response.usage))
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn provider(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        inv.validate_for(ProviderId::OpenAi)?;
        let params = self.default_params.resolve(&inv);

        debug!(
            provider = "openai",
            stage = %inv.stage,
            model = %inv.model,
            max_tokens = params.max_tokens,
            temperature = params.temperature,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking OpenAI backend"
        );

        let request_body = ChatRequest {
            model: &inv.model,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            messages: Self::convert_messages(&inv.messages),
        };

        let request = self
            .client
            .inner()
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose())
            .header("Content-Type", "application/json")
            .json(&request_body);

        let body = self
            .client
            .execute(request, inv.timeout, ProviderId::OpenAi, self.api_key.expose())
            .await?;

        let (text, usage) = Self::extract_text(&body)?;
        let result = LlmResult::new(text, ProviderId::OpenAi, inv.model.clone()).with_tokens(
            usage.as_ref().map(|u| u.prompt_tokens),
            usage.as_ref().map(|u| u.completion_tokens),
        );

        debug!(
            provider = "openai",
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "OpenAI invocation completed"
        );

        Ok(result)
    }
}

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<OpenAiMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
