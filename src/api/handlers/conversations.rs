use axum::{
    extract::{Path, State},
    Json,
};

use super::helpers::{not_found, ApiResult};
use crate::api::ServerState;
use crate::store::{Conversation, ConversationSummary};

pub async fn list_conversations(
    State(state): State<ServerState>,
) -> Json<Vec<ConversationSummary>> {
    Json(state.store.list().await)
}

pub async fn get_conversation(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    state
        .store
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found("Conversation not found."))
}
