use axum::{extract::State, Json};

use super::helpers::{bad_request, internal_error, ApiResult};
use crate::api::types::{ChatRequest, ChatResponseBody, IncomingMessage};
use crate::api::ServerState;
use crate::chat::{ChatMessage, ChatRole};
use crate::error::AssistantError;

pub async fn handle_chat(
    State(state): State<ServerState>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponseBody>> {
    let messages = req
        .messages
        .ok_or_else(|| bad_request("Invalid request body, 'messages' field is required."))?;
    let messages: Vec<ChatMessage> = messages.into_iter().map(build_message).collect();

    let outcome = state
        .orchestrator
        .handle_chat(messages, req.conversation_id.as_deref())
        .await
        .map_err(|err| match err {
            AssistantError::InvalidRequest(msg) => bad_request(msg),
            other => internal_error(other.to_string()),
        })?;

    Ok(Json(ChatResponseBody {
        conversation_id: outcome.conversation_id.to_string(),
        response: outcome.response,
    }))
}

fn build_message(msg: IncomingMessage) -> ChatMessage {
    ChatMessage {
        role: parse_role(&msg.role),
        content: msg.content,
        tool_name: None,
    }
}

fn parse_role(role: &str) -> ChatRole {
    match role {
        "system" => ChatRole::System,
        "user" => ChatRole::User,
        "assistant" => ChatRole::Assistant,
        "tool" => ChatRole::Tool,
        _ => ChatRole::User,
    }
}
