//! In-memory conversation storage.
//!
//! Process-lifetime only: no persistence, no eviction. Conversations are
//! kept behind per-conversation mutexes so concurrent requests targeting
//! the same identifier cannot interleave their appends.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::chat::ChatMessage;

const EMPTY_TITLE: &str = "Empty Conversation";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ConversationId(Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

/// One user's ongoing exchange: an append-only message sequence.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub start_time: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    fn new(id: ConversationId) -> Self {
        Self {
            id,
            start_time: Utc::now(),
            messages: Vec::new(),
        }
    }

    pub fn title(&self) -> String {
        self.messages
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_else(|| EMPTY_TITLE.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub start_time: DateTime<Utc>,
    pub title: String,
}

/// Shared handle to a single conversation's state.
pub type ConversationHandle = Arc<Mutex<Conversation>>;

/// Owner of all live conversations, injected into the orchestrator.
#[derive(Default)]
pub struct ConversationStore {
    conversations: RwLock<HashMap<ConversationId, ConversationHandle>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `id` to an existing conversation, or creates a fresh one
    /// when the identifier is absent or unknown. Fresh identifiers are
    /// random UUIDs and never collide with live ones.
    pub async fn get_or_create(&self, id: Option<&str>) -> (ConversationId, ConversationHandle) {
        if let Some(id) = id.and_then(ConversationId::parse) {
            if let Some(handle) = self.conversations.read().await.get(&id) {
                return (id, Arc::clone(handle));
            }
        }
        let id = ConversationId::new();
        let handle = Arc::new(Mutex::new(Conversation::new(id)));
        self.conversations
            .write()
            .await
            .insert(id, Arc::clone(&handle));
        log::debug!("created conversation {id}");
        (id, handle)
    }

    /// Appends a message, holding the conversation's lock only for the
    /// duration of the push. Returns false for unknown identifiers.
    pub async fn append(&self, id: ConversationId, message: ChatMessage) -> bool {
        let handle = self.conversations.read().await.get(&id).cloned();
        match handle {
            Some(handle) => {
                handle.lock().await.messages.push(message);
                true
            }
            None => false,
        }
    }

    /// Snapshot of a single conversation.
    pub async fn get(&self, id: &str) -> Option<Conversation> {
        let id = ConversationId::parse(id)?;
        let handle = self.conversations.read().await.get(&id).cloned()?;
        let conversation = handle.lock().await.clone();
        Some(conversation)
    }

    /// Summaries of every live conversation, oldest first.
    pub async fn list(&self) -> Vec<ConversationSummary> {
        let handles: Vec<ConversationHandle> =
            self.conversations.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            let conversation = handle.lock().await;
            summaries.push(ConversationSummary {
                id: conversation.id,
                start_time: conversation.start_time,
                title: conversation.title(),
            });
        }
        summaries.sort_by_key(|s| s.start_time);
        summaries
    }
}
