//! OpenAI-compatible chat backend.
//!
//! Works against api.openai.com and any server speaking the same
//! `/chat/completions` dialect (LM Studio, vLLM, ...).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::chat::{ChatBackend, ChatMessage, ChatRole};
use crate::config::RequestOptions;
use crate::error::AssistantError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";
const DEFAULT_MODEL: &str = "gpt-4.1";

pub struct OpenAiCompatible {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    model: String,
    timeout: Duration,
    options: RequestOptions,
}

#[derive(Serialize, Debug)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Serialize, Debug)]
struct OpenAiChatMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Deserialize, Debug)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize, Debug)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize, Debug)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

impl OpenAiCompatible {
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<String>,
        model: Option<String>,
        timeout_seconds: u64,
        options: RequestOptions,
    ) -> Result<Self, AssistantError> {
        let raw = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let normalized = if raw.ends_with('/') { raw } else { format!("{raw}/") };
        let base_url = Url::parse(&normalized)
            .map_err(|e| AssistantError::InvalidRequest(format!("invalid base URL: {e}")))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(timeout_seconds),
            options,
        })
    }

    fn build_messages<'a>(
        messages: &'a [ChatMessage],
        system_prompt: &'a str,
    ) -> Vec<OpenAiChatMessage<'a>> {
        let mut payload = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.is_empty() {
            payload.push(OpenAiChatMessage {
                role: "system",
                content: system_prompt,
                name: None,
            });
        }
        for message in messages {
            payload.push(OpenAiChatMessage {
                role: role_name(message.role),
                content: &message.content,
                name: message.tool_name.as_deref(),
            });
        }
        payload
    }
}

fn role_name(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatible {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
    ) -> Result<String, AssistantError> {
        let body = OpenAiChatRequest {
            model: &self.model,
            messages: Self::build_messages(messages, system_prompt),
            temperature: self.options.temperature,
            top_p: self.options.top_p,
            max_tokens: self.options.max_tokens,
            stream: false,
        };
        let url = self
            .base_url
            .join("chat/completions")
            .map_err(|e| AssistantError::HttpError(e.to_string()))?;

        if let Ok(json) = serde_json::to_string(&body) {
            log::trace!("chat completion request: {json}");
        }

        let mut request = self.client.post(url).json(&body).timeout(self.timeout);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let raw_response = response.text().await.unwrap_or_default();
            return Err(AssistantError::ResponseFormatError {
                message: format!("chat completion endpoint returned error status: {status}"),
                raw_response,
            });
        }

        let raw = response.text().await?;
        let parsed: OpenAiChatResponse =
            serde_json::from_str(&raw).map_err(|e| AssistantError::ResponseFormatError {
                message: format!("failed to decode chat completion response: {e}"),
                raw_response: raw,
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                AssistantError::BackendError("model backend returned no content".to_string())
            })
    }
}
