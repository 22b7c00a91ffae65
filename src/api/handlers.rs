#[path = "handlers/chat.rs"]
mod chat;

#[path = "handlers/conversations.rs"]
mod conversations;

#[path = "handlers/helpers.rs"]
mod helpers;

pub use chat::handle_chat;
pub use conversations::{get_conversation, list_conversations};
