//! HTTP surface of the coordinate server.

mod handlers;
pub mod types;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::orchestrator::ChatOrchestrator;
use crate::store::ConversationStore;

#[derive(Clone)]
pub struct ServerState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub store: Arc<ConversationStore>,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/chat", post(handlers::handle_chat))
        .route("/conversations", get(handlers::list_conversations))
        .route("/conversations/:id", get(handlers::get_conversation))
        .with_state(state)
}
