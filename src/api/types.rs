use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;

/// Inbound body for `POST /chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Option<Vec<IncomingMessage>>,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    pub content: String,
}

/// Response body for `POST /chat`.
#[derive(Debug, Serialize)]
pub struct ChatResponseBody {
    pub conversation_id: String,
    pub response: ChatMessage,
}
