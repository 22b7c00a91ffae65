//! Per-request orchestration: model call, tool extraction, dispatch, and
//! the follow-up summary call.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::chat::{ChatBackend, ChatMessage};
use crate::error::AssistantError;
use crate::extractor::{extract_tool_call, Extraction};
use crate::fleet::ToolDispatcher;
use crate::store::{ConversationHandle, ConversationId, ConversationStore};

/// Outcome of one `/chat` request.
#[derive(Debug)]
pub struct ChatOutcome {
    pub conversation_id: ConversationId,
    pub response: ChatMessage,
}

pub struct ChatOrchestrator {
    backend: Arc<dyn ChatBackend>,
    dispatcher: ToolDispatcher,
    store: Arc<ConversationStore>,
    system_prompt: String,
}

impl ChatOrchestrator {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        dispatcher: ToolDispatcher,
        store: Arc<ConversationStore>,
        system_prompt: String,
    ) -> Self {
        Self {
            backend,
            dispatcher,
            store,
            system_prompt,
        }
    }

    /// Runs one request end to end. Apart from an empty inbound message
    /// list, every failure mode degrades into an assistant message rather
    /// than an error: the caller always gets a response to show.
    ///
    /// Tool use is single-hop: a tool marker in the summary reply is
    /// returned verbatim, never dispatched again.
    pub async fn handle_chat(
        &self,
        messages: Vec<ChatMessage>,
        conversation_id: Option<&str>,
    ) -> Result<ChatOutcome, AssistantError> {
        if messages.is_empty() {
            return Err(AssistantError::InvalidRequest(
                "'messages' must contain at least one message".to_string(),
            ));
        }

        let (id, handle) = self.store.get_or_create(conversation_id).await;
        let history = {
            let mut conversation = handle.lock().await;
            conversation.messages.extend(messages);
            conversation.messages.clone()
        };

        let first_reply = self.model_reply(&history).await;

        let final_message = match extract_tool_call(&first_reply) {
            Extraction::NoCall => ChatMessage::assistant().content(first_reply).build(),
            Extraction::Call(call) => {
                log::info!("executing tool {} for conversation {id}", call.tool_name);
                let result = self
                    .dispatcher
                    .dispatch(&call.tool_name, &call.parameters)
                    .await;
                self.summarize_tool_round(&handle, first_reply, &call.tool_name, result)
                    .await
            }
            Extraction::Malformed { tool_name, reason } => {
                log::warn!("malformed tool call in conversation {id}: {reason}");
                let name = tool_name.unwrap_or_else(|| "unknown".to_string());
                let result = json!({"error": format!("Malformed tool call: {reason}")});
                self.summarize_tool_round(&handle, first_reply, &name, result)
                    .await
            }
        };

        handle.lock().await.messages.push(final_message.clone());
        Ok(ChatOutcome {
            conversation_id: id,
            response: final_message,
        })
    }

    /// Records the tool round-trip and asks the model for a natural-language
    /// summary of the (possibly failed) result.
    async fn summarize_tool_round(
        &self,
        handle: &ConversationHandle,
        raw_reply: String,
        tool_name: &str,
        result: Value,
    ) -> ChatMessage {
        let result_text = serde_json::to_string(&result).unwrap_or_else(|_| "{}".to_string());
        let history = {
            let mut conversation = handle.lock().await;
            conversation
                .messages
                .push(ChatMessage::assistant().content(raw_reply).build());
            conversation
                .messages
                .push(ChatMessage::tool(tool_name).content(result_text).build());
            conversation.messages.clone()
        };
        let summary = self.model_reply(&history).await;
        ChatMessage::assistant().content(summary).build()
    }

    async fn model_reply(&self, history: &[ChatMessage]) -> String {
        match self.backend.chat(history, &self.system_prompt).await {
            Ok(text) => text,
            Err(err) => {
                log::error!("model backend call failed: {err}");
                format!("The assistant could not complete this request: {err}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use crate::chat::ChatRole;

    /// Backend returning a scripted sequence of replies.
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, AssistantError>>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<String, AssistantError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _system_prompt: &str,
        ) -> Result<String, AssistantError> {
            self.replies
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(AssistantError::BackendError("script exhausted".into())))
        }
    }

    fn orchestrator(
        backend: Arc<ScriptedBackend>,
        fleet_url: &str,
    ) -> (ChatOrchestrator, Arc<ConversationStore>) {
        let store = Arc::new(ConversationStore::new());
        let dispatcher = ToolDispatcher::new(fleet_url, 5).unwrap();
        let orchestrator = ChatOrchestrator::new(
            backend,
            dispatcher,
            Arc::clone(&store),
            "test prompt".to_string(),
        );
        (orchestrator, store)
    }

    fn user(content: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::user().content(content).build()]
    }

    #[tokio::test]
    async fn empty_message_list_is_rejected() {
        let backend = ScriptedBackend::new(vec![]);
        let (orchestrator, _) = orchestrator(backend, "http://127.0.0.1:1");
        let err = orchestrator.handle_chat(Vec::new(), None).await.unwrap_err();
        assert!(matches!(err, AssistantError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn plain_reply_is_returned_verbatim() {
        let backend = ScriptedBackend::new(vec![Ok("All panels are clean.".to_string())]);
        let (orchestrator, store) = orchestrator(backend, "http://127.0.0.1:1");

        let outcome = orchestrator.handle_chat(user("status?"), None).await.unwrap();
        assert_eq!(outcome.response.content, "All panels are clean.");
        assert_eq!(outcome.response.role, ChatRole::Assistant);

        let conversation = store
            .get(&outcome.conversation_id.to_string())
            .await
            .unwrap();
        let roles: Vec<ChatRole> = conversation.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![ChatRole::User, ChatRole::Assistant]);
    }

    #[tokio::test]
    async fn tool_round_records_call_and_summary() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/panels")
            .match_query(mockito::Matcher::Exact("clusterid=3&status=dirty".into()))
            .with_status(200)
            .with_body(r#"[{"panel_id": "P-002"}, {"panel_id": "P-004"}]"#)
            .create_async()
            .await;

        let backend = ScriptedBackend::new(vec![
            Ok(r#"to=find_panels <|message|>{"cluster_id": 3, "status": "dirty"}"#.to_string()),
            Ok("Panels P-002 and P-004 in cluster 3 are dirty.".to_string()),
        ]);
        let (orchestrator, store) = orchestrator(backend, &server.url());

        let outcome = orchestrator
            .handle_chat(user("find all panels in cluster 3 that are dirty"), None)
            .await
            .unwrap();
        assert_eq!(
            outcome.response.content,
            "Panels P-002 and P-004 in cluster 3 are dirty."
        );

        let conversation = store
            .get(&outcome.conversation_id.to_string())
            .await
            .unwrap();
        let roles: Vec<ChatRole> = conversation.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::Tool,
                ChatRole::Assistant,
            ]
        );
        let tool_messages: Vec<&ChatMessage> = conversation
            .messages
            .iter()
            .filter(|m| m.role == ChatRole::Tool)
            .collect();
        assert_eq!(tool_messages.len(), 1);
        assert_eq!(tool_messages[0].tool_name.as_deref(), Some("find_panels"));
        assert!(tool_messages[0].content.contains("P-002"));
    }

    #[tokio::test]
    async fn unknown_tool_still_produces_a_summary() {
        let backend = ScriptedBackend::new(vec![
            Ok(r#"to=defragment_sun <|message|>{}"#.to_string()),
            Ok("I cannot do that.".to_string()),
        ]);
        let (orchestrator, store) = orchestrator(backend, "http://127.0.0.1:1");

        let outcome = orchestrator.handle_chat(user("defrag the sun"), None).await.unwrap();
        assert_eq!(outcome.response.content, "I cannot do that.");

        let conversation = store
            .get(&outcome.conversation_id.to_string())
            .await
            .unwrap();
        let tool_message = conversation
            .messages
            .iter()
            .find(|m| m.role == ChatRole::Tool)
            .unwrap();
        assert!(tool_message.content.contains("not found"));
    }

    #[tokio::test]
    async fn malformed_tool_call_degrades_instead_of_failing() {
        let backend = ScriptedBackend::new(vec![
            Ok(r#"to=find_panels <|message|>{"cluster_id": }"#.to_string()),
            Ok("Something went wrong while reading the tool call.".to_string()),
        ]);
        let (orchestrator, store) = orchestrator(backend, "http://127.0.0.1:1");

        let outcome = orchestrator.handle_chat(user("find panels"), None).await.unwrap();
        assert_eq!(
            outcome.response.content,
            "Something went wrong while reading the tool call."
        );

        let conversation = store
            .get(&outcome.conversation_id.to_string())
            .await
            .unwrap();
        let tool_message = conversation
            .messages
            .iter()
            .find(|m| m.role == ChatRole::Tool)
            .unwrap();
        assert_eq!(tool_message.tool_name.as_deref(), Some("find_panels"));
        assert!(tool_message.content.contains("Malformed tool call"));
    }

    #[tokio::test]
    async fn backend_failure_becomes_an_explanatory_answer() {
        let backend = ScriptedBackend::new(vec![Err(AssistantError::BackendError(
            "connection refused".to_string(),
        ))]);
        let (orchestrator, _) = orchestrator(backend, "http://127.0.0.1:1");

        let outcome = orchestrator.handle_chat(user("status?"), None).await.unwrap();
        assert!(outcome
            .response
            .content
            .contains("could not complete this request"));
    }

    #[tokio::test]
    async fn tool_marker_in_summary_is_not_redispatched() {
        let mut server = mockito::Server::new_async().await;
        let panels = server
            .mock("GET", "/panels")
            .with_status(200)
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;

        let second = r#"to=find_panels <|message|>{"cluster_id": 1}"#;
        let backend = ScriptedBackend::new(vec![
            Ok(r#"to=find_panels <|message|>{}"#.to_string()),
            Ok(second.to_string()),
        ]);
        let (orchestrator, store) = orchestrator(backend, &server.url());

        let outcome = orchestrator.handle_chat(user("find panels"), None).await.unwrap();
        // the second reply is returned verbatim even though it looks like a call
        assert_eq!(outcome.response.content, second);
        panels.assert_async().await;

        let conversation = store
            .get(&outcome.conversation_id.to_string())
            .await
            .unwrap();
        let tool_count = conversation
            .messages
            .iter()
            .filter(|m| m.role == ChatRole::Tool)
            .count();
        assert_eq!(tool_count, 1);
    }

    #[tokio::test]
    async fn requests_without_identifier_get_distinct_conversations() {
        let backend = ScriptedBackend::new(vec![
            Ok("first".to_string()),
            Ok("second".to_string()),
        ]);
        let (orchestrator, _) = orchestrator(backend, "http://127.0.0.1:1");

        let first = orchestrator.handle_chat(user("one"), None).await.unwrap();
        let second = orchestrator.handle_chat(user("two"), None).await.unwrap();
        assert_ne!(first.conversation_id, second.conversation_id);
    }

    #[tokio::test]
    async fn follow_up_reuses_the_conversation() {
        let backend = ScriptedBackend::new(vec![
            Ok("first".to_string()),
            Ok("second".to_string()),
        ]);
        let (orchestrator, store) = orchestrator(backend, "http://127.0.0.1:1");

        let first = orchestrator.handle_chat(user("one"), None).await.unwrap();
        let id = first.conversation_id.to_string();
        let second = orchestrator.handle_chat(user("two"), Some(&id)).await.unwrap();
        assert_eq!(first.conversation_id, second.conversation_id);

        let conversation = store.get(&id).await.unwrap();
        assert_eq!(conversation.messages.len(), 4);
    }
}
