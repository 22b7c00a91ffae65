//! Gemini chat backend.
//!
//! Speaks the `generateContent` dialect and normalizes candidate parts to a
//! single reply string. Rate-limit responses are retried with exponential
//! backoff and randomized jitter; everything else fails fast.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::chat::{ChatBackend, ChatMessage, ChatRole};
use crate::config::RequestOptions;
use crate::error::AssistantError;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const MAX_RATE_LIMIT_ATTEMPTS: usize = 3;
const BACKOFF_BASE_MS: u64 = 1_000;

/// Finish reasons that mean the reply was withheld, not generated.
const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "RECITATION"];

pub struct Gemini {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    model: String,
    timeout: Duration,
    options: RequestOptions,
}

#[derive(Serialize, Debug)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize, Debug)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiRequestPart>,
}

#[derive(Serialize, Debug)]
struct GeminiRequestPart {
    text: String,
}

#[derive(Serialize, Debug)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(rename = "topK", skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
    error: Option<GeminiApiError>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize, Debug)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GeminiApiError {
    message: Option<String>,
}

impl Gemini {
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<String>,
        model: Option<String>,
        timeout_seconds: u64,
        options: RequestOptions,
    ) -> Result<Self, AssistantError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(AssistantError::AuthError("Missing Gemini API key".to_string()));
        }
        let raw = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let normalized = if raw.ends_with('/') { raw } else { format!("{raw}/") };
        let base_url = Url::parse(&normalized)
            .map_err(|e| AssistantError::InvalidRequest(format!("invalid base URL: {e}")))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(timeout_seconds),
            options,
        })
    }

    /// Gemini has no system or tool roles: the system prompt is folded into
    /// the first user part and tool results become labeled user parts.
    fn build_contents(messages: &[ChatMessage], system_prompt: &str) -> Vec<GeminiContent> {
        let mut system_texts: Vec<&str> = Vec::new();
        if !system_prompt.is_empty() {
            system_texts.push(system_prompt);
        }
        system_texts.extend(
            messages
                .iter()
                .filter(|m| m.role == ChatRole::System)
                .map(|m| m.content.as_str()),
        );
        let mut system_block = system_texts.join("\n\n");

        let mut contents = Vec::with_capacity(messages.len());
        for message in messages {
            match message.role {
                ChatRole::System => {}
                ChatRole::User => {
                    let text = if system_block.is_empty() {
                        message.content.clone()
                    } else {
                        let combined = format!("{system_block}\n\n{}", message.content);
                        system_block.clear();
                        combined
                    };
                    contents.push(GeminiContent {
                        role: "user",
                        parts: vec![GeminiRequestPart { text }],
                    });
                }
                ChatRole::Assistant => contents.push(GeminiContent {
                    role: "model",
                    parts: vec![GeminiRequestPart {
                        text: message.content.clone(),
                    }],
                }),
                ChatRole::Tool => {
                    let name = message.tool_name.as_deref().unwrap_or("tool");
                    contents.push(GeminiContent {
                        role: "user",
                        parts: vec![GeminiRequestPart {
                            text: format!("Tool result ({name}): {}", message.content),
                        }],
                    });
                }
            }
        }
        contents
    }
}

fn normalize_response(parsed: GeminiResponse) -> Result<String, AssistantError> {
    if let Some(error) = parsed.error {
        return Err(AssistantError::BackendError(
            error.message.unwrap_or_else(|| "unknown Gemini API error".to_string()),
        ));
    }
    let Some(candidates) = parsed.candidates.filter(|c| !c.is_empty()) else {
        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(AssistantError::BackendError(format!(
                "Content blocked by Gemini: {reason}"
            )));
        }
        return Err(AssistantError::BackendError(
            "Gemini returned no candidates".to_string(),
        ));
    };
    let candidate = &candidates[0];
    if let Some(reason) = candidate
        .finish_reason
        .as_deref()
        .filter(|r| BLOCKING_FINISH_REASONS.contains(r))
    {
        return Err(AssistantError::BackendError(format!(
            "Content blocked by safety filter: {reason}"
        )));
    }
    let text: String = candidate
        .content
        .as_ref()
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(AssistantError::BackendError(
            "no text content in Gemini response".to_string(),
        ));
    }
    Ok(text.trim().to_string())
}

fn backoff_delay(attempt: usize) -> Duration {
    let base_ms = BACKOFF_BASE_MS.saturating_mul(1u64 << attempt.min(6));
    let jitter: f64 = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_millis((base_ms as f64 * jitter) as u64)
}

#[async_trait]
impl ChatBackend for Gemini {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
    ) -> Result<String, AssistantError> {
        let body = GeminiRequest {
            contents: Self::build_contents(messages, system_prompt),
            generation_config: GenerationConfig {
                temperature: self.options.temperature,
                top_p: self.options.top_p,
                top_k: self.options.top_k,
                max_output_tokens: self.options.max_tokens,
            },
        };
        let url = self
            .base_url
            .join(&format!("models/{}:generateContent", self.model))
            .map_err(|e| AssistantError::HttpError(e.to_string()))?;

        for attempt in 0..MAX_RATE_LIMIT_ATTEMPTS {
            let response = self
                .client
                .post(url.clone())
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .timeout(self.timeout)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt + 1 == MAX_RATE_LIMIT_ATTEMPTS {
                    break;
                }
                let delay = backoff_delay(attempt);
                log::warn!(
                    "Gemini rate limit hit, retrying in {delay:?} (attempt {}/{MAX_RATE_LIMIT_ATTEMPTS})",
                    attempt + 1,
                );
                tokio::time::sleep(delay).await;
                continue;
            }
            if !status.is_success() {
                let raw_response = response.text().await.unwrap_or_default();
                return Err(AssistantError::ResponseFormatError {
                    message: format!("Gemini API returned error status: {status}"),
                    raw_response,
                });
            }
            let raw = response.text().await?;
            let parsed: GeminiResponse =
                serde_json::from_str(&raw).map_err(|e| AssistantError::ResponseFormatError {
                    message: format!("failed to decode Gemini response: {e}"),
                    raw_response: raw,
                })?;
            return normalize_response(parsed);
        }

        Err(AssistantError::RetryExceeded {
            attempts: MAX_RATE_LIMIT_ATTEMPTS,
            last_error: "Gemini API rate limit exceeded".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(url: &str) -> Gemini {
        Gemini::new(
            "test-key",
            Some(url.to_string()),
            Some("gemini-test".to_string()),
            5,
            RequestOptions::default(),
        )
        .unwrap()
    }

    fn user(content: &str) -> ChatMessage {
        ChatMessage::user().content(content).build()
    }

    #[tokio::test]
    async fn concatenates_candidate_parts() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-test:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .with_status(200)
            .with_body(
                r#"{"candidates": [{"content": {"parts": [{"text": "Panel "}, {"text": "P-002 is dirty."}]}}]}"#,
            )
            .create_async()
            .await;

        let reply = backend(&server.url())
            .chat(&[user("status of P-002?")], "")
            .await
            .unwrap();
        assert_eq!(reply, "Panel P-002 is dirty.");
    }

    #[tokio::test]
    async fn safety_block_is_a_backend_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-test:generateContent")
            .with_status(200)
            .with_body(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#)
            .create_async()
            .await;

        let err = backend(&server.url())
            .chat(&[user("hi")], "")
            .await
            .unwrap_err();
        match err {
            AssistantError::BackendError(msg) => assert!(msg.contains("SAFETY")),
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_rate_limit_retries_then_reports_retry_exceeded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-test:generateContent")
            .with_status(429)
            .expect(MAX_RATE_LIMIT_ATTEMPTS)
            .create_async()
            .await;

        let err = backend(&server.url())
            .chat(&[user("hi")], "")
            .await
            .unwrap_err();
        mock.assert_async().await;
        assert!(matches!(err, AssistantError::RetryExceeded { .. }));
    }

    #[test]
    fn system_prompt_folds_into_first_user_turn() {
        let contents = Gemini::build_contents(
            &[
                user("find dirty panels"),
                ChatMessage::assistant().content("to=find_panels ...").build(),
                ChatMessage::tool("find_panels").content("[]").build(),
                user("thanks"),
            ],
            "you are a fleet assistant",
        );
        assert_eq!(contents.len(), 4);
        assert_eq!(contents[0].role, "user");
        assert!(contents[0].parts[0].text.starts_with("you are a fleet assistant"));
        assert!(contents[0].parts[0].text.ends_with("find dirty panels"));
        assert_eq!(contents[1].role, "model");
        assert!(contents[2].parts[0].text.starts_with("Tool result (find_panels):"));
        // the system prompt is injected exactly once
        assert_eq!(contents[3].parts[0].text, "thanks");
    }

    #[test]
    fn empty_candidates_with_block_reason_reports_block() {
        let parsed: GeminiResponse = serde_json::from_str(
            r#"{"promptFeedback": {"blockReason": "PROHIBITED_CONTENT"}}"#,
        )
        .unwrap();
        let err = normalize_response(parsed).unwrap_err();
        match err {
            AssistantError::BackendError(msg) => assert!(msg.contains("PROHIBITED_CONTENT")),
            other => panic!("expected backend error, got {other:?}"),
        }
    }
}
