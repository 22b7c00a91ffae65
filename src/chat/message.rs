use serde::{Deserialize, Serialize};

/// Role of a participant in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions injected once at the head of the conversation
    System,
    /// The human operator issuing commands
    User,
    /// The model's replies, including raw tool-call text
    Assistant,
    /// The result of a dispatched tool, fed back to the model
    Tool,
}

/// A single message in a chat conversation.
///
/// `tool_name` is populated only for [`ChatRole::Tool`] messages and names
/// the tool whose result the content carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of who sent this message
    pub role: ChatRole,
    /// The text content of the message
    pub content: String,
    /// Name of the originating tool, for tool-result messages
    #[serde(rename = "name", skip_serializing_if = "Option::is_none", default)]
    pub tool_name: Option<String>,
}

impl ChatMessage {
    /// Create a new builder for a system message
    pub fn system() -> ChatMessageBuilder {
        ChatMessageBuilder::new(ChatRole::System)
    }

    /// Create a new builder for a user message
    pub fn user() -> ChatMessageBuilder {
        ChatMessageBuilder::new(ChatRole::User)
    }

    /// Create a new builder for an assistant message
    pub fn assistant() -> ChatMessageBuilder {
        ChatMessageBuilder::new(ChatRole::Assistant)
    }

    /// Create a new builder for a tool-result message
    pub fn tool(tool_name: impl Into<String>) -> ChatMessageBuilder {
        ChatMessageBuilder {
            role: ChatRole::Tool,
            content: String::new(),
            tool_name: Some(tool_name.into()),
        }
    }
}

/// Builder for ChatMessage
#[derive(Debug)]
pub struct ChatMessageBuilder {
    role: ChatRole,
    content: String,
    tool_name: Option<String>,
}

impl ChatMessageBuilder {
    /// Create a new ChatMessageBuilder with specified role
    pub fn new(role: ChatRole) -> Self {
        Self {
            role,
            content: String::new(),
            tool_name: None,
        }
    }

    /// Set the message content
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Build the ChatMessage
    pub fn build(self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content,
            tool_name: self.tool_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_builder_sets_name() {
        let msg = ChatMessage::tool("find_panels").content("{}").build();
        assert_eq!(msg.role, ChatRole::Tool);
        assert_eq!(msg.tool_name.as_deref(), Some("find_panels"));
    }

    #[test]
    fn wire_format_omits_name_for_plain_messages() {
        let msg = ChatMessage::user().content("hello").build();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn wire_format_includes_name_for_tool_messages() {
        let msg = ChatMessage::tool("find_drones").content("[]").build();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"role": "tool", "content": "[]", "name": "find_drones"})
        );
    }
}
