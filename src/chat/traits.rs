use async_trait::async_trait;

use crate::error::AssistantError;

use super::message::ChatMessage;

/// Trait for model backends that turn a conversation into reply text.
///
/// Implementations own all provider-specific payload shaping; the
/// orchestrator only ever sees the normalized reply string.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
    ) -> Result<String, AssistantError>;
}
