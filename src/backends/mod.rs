//! Model backend implementations and startup-time selection.

mod google;
mod openai;

use std::str::FromStr;
use std::sync::Arc;

pub use google::Gemini;
pub use openai::OpenAiCompatible;

use crate::chat::ChatBackend;
use crate::config::Settings;
use crate::error::AssistantError;

/// Supported model backend providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    OpenAiCompatible,
    Gemini,
}

impl FromStr for BackendKind {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "openai-compatible" | "lmstudio" => Ok(BackendKind::OpenAiCompatible),
            "gemini" | "google" => Ok(BackendKind::Gemini),
            _ => Err(AssistantError::InvalidRequest(format!(
                "Unknown model backend: {s}"
            ))),
        }
    }
}

/// Resolves the configured provider to a backend, once, at startup.
pub fn build_backend(settings: &Settings) -> Result<Arc<dyn ChatBackend>, AssistantError> {
    let provider = &settings.provider;
    let kind = provider.name.parse::<BackendKind>()?;
    let api_key = provider.resolve_api_key();
    let backend: Arc<dyn ChatBackend> = match kind {
        BackendKind::OpenAiCompatible => Arc::new(OpenAiCompatible::new(
            api_key,
            provider.base_url.clone(),
            provider.model.clone(),
            provider.timeout_seconds,
            settings.request_options.clone(),
        )?),
        BackendKind::Gemini => Arc::new(Gemini::new(
            api_key,
            provider.base_url.clone(),
            provider.model.clone(),
            provider.timeout_seconds,
            settings.request_options.clone(),
        )?),
    };
    Ok(backend)
}
