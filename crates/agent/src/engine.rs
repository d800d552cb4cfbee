//! The client-facing assistant: admission, history, suspension and resolution.

use crate::loop_runner::{AgentLoop, LoopOutcome};
use crate::pending::{PendingActionStore, PendingDraft};
use crate::prompt::SystemPrompt;
use crate::rate_limit::RateLimiter;
use crate::stream_event::{chunk_text, AgentStreamEvent};
use chrono::Utc;
use ledgerclaw_core::error::AgentError;
use ledgerclaw_core::event::{DomainEvent, EventBus};
use ledgerclaw_core::history::{
    ConversationStore, ConversationSummary, Favorite, HistoryRecord, ToolUsage,
};
use ledgerclaw_core::message::{ConversationId, Message};
use ledgerclaw_core::tool::ToolSpec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const DEFAULT_CHUNK_CHARS: usize = 20;
pub const CONVERSATION_LIST_LIMIT: usize = 20;

/// The answer to one client operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Message {
        text: String,
        conversation_id: ConversationId,
        #[serde(default)]
        tools_used: Vec<ToolUsage>,
    },

    ConfirmationNeeded {
        token: String,
        tool_name: String,
        description: String,
        raw_input: serde_json::Value,
        conversation_id: ConversationId,
    },

    Error { text: String },
}

impl Reply {
    pub fn error(err: &AgentError) -> Self {
        Self::Error {
            text: err.to_string(),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Message { text, .. } | Self::Error { text } => Some(text),
            Self::ConfirmationNeeded { .. } => None,
        }
    }
}

pub struct Assistant {
    agent: AgentLoop,
    history: Arc<dyn ConversationStore>,
    prompt: Arc<dyn SystemPrompt>,
    pending: PendingActionStore,
    limiter: RateLimiter,
    history_limit: usize,
    chunk_chars: usize,
    simulated_writes: bool,
}

impl Assistant {
    pub fn new(
        agent: AgentLoop,
        history: Arc<dyn ConversationStore>,
        prompt: Arc<dyn SystemPrompt>,
    ) -> Self {
        Self {
            agent,
            history,
            prompt,
            pending: PendingActionStore::default(),
            limiter: RateLimiter::new(10, Duration::from_secs(60)),
            history_limit: DEFAULT_HISTORY_LIMIT,
            chunk_chars: DEFAULT_CHUNK_CHARS,
            simulated_writes: true,
        }
    }

    /// Number of stored messages handed to the model each turn.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_rate_limit(mut self, max_requests: usize, window: Duration) -> Self {
        self.limiter = RateLimiter::new(max_requests, window);
        self
    }

    pub fn with_confirmation_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.pending.set_ttl(ttl);
        self
    }

    /// Characters per `text_delta` event.
    pub fn with_chunk_size(mut self, chars: usize) -> Self {
        self.chunk_chars = chars.max(1);
        self
    }

    /// Record whether mutating tools only simulate their effect.
    pub fn with_simulated_writes(mut self, simulated: bool) -> Self {
        self.simulated_writes = simulated;
        self
    }

    pub fn writes_simulated(&self) -> bool {
        self.simulated_writes
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        self.agent.event_bus()
    }

    pub fn tool_catalog(&self) -> Vec<ToolSpec> {
        self.agent.tools().catalog()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop expired confirmations.
    pub fn sweep_expired(&self) -> usize {
        self.pending.sweep()
    }

    fn report(&self, context: &str, err: &AgentError) {
        self.event_bus().publish(DomainEvent::ErrorOccurred {
            context: context.to_string(),
            error_message: err.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Process one user message.
    pub async fn send_message(
        &self,
        client_key: &str,
        conversation_id: Option<ConversationId>,
        text: &str,
    ) -> Result<Reply, AgentError> {
        self.converse(client_key, conversation_id, text, None).await
    }

    async fn converse(
        &self,
        client_key: &str,
        conversation_id: Option<ConversationId>,
        text: &str,
        events: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<Reply, AgentError> {
        if !self.limiter.admit(client_key) {
            warn!(client_key, "Rate limit exceeded");
            self.event_bus().publish(DomainEvent::RateLimited {
                client_key: client_key.to_string(),
                timestamp: Utc::now(),
            });
            return Err(AgentError::RateLimited);
        }

        let conversation_id = conversation_id.unwrap_or_default();
        info!(conversation_id = %conversation_id, "Processing message");

        let result = self.run_turn(&conversation_id, text, events).await;
        if let Err(e) = &result {
            warn!(conversation_id = %conversation_id, error = %e, "Turn failed");
            self.report("send_message", e);
        }
        result
    }

    async fn run_turn(
        &self,
        conversation_id: &ConversationId,
        text: &str,
        events: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<Reply, AgentError> {
        let mut messages = self.history.load(conversation_id, self.history_limit).await?;
        messages.push(Message::user(text));
        let system = self.prompt.render().await;

        match self.agent.run(conversation_id, &system, messages, events).await? {
            LoopOutcome::Answer {
                text: answer,
                tools_used,
            } => {
                self.history
                    .append_exchange(conversation_id, text, &answer, &tools_used)
                    .await?;
                Ok(Reply::Message {
                    text: answer,
                    conversation_id: conversation_id.clone(),
                    tools_used,
                })
            }
            LoopOutcome::Suspended(suspension) => {
                let tool_name = suspension.invocation.name.clone();
                let raw_input = suspension.invocation.arguments.clone();
                let description = suspension.description.clone();

                let ticket = self.pending.create(PendingDraft {
                    conversation_id: conversation_id.clone(),
                    user_message: text.to_string(),
                    suspension,
                    model: self.agent.model().to_string(),
                    system_prompt: system,
                });

                info!(
                    conversation_id = %conversation_id,
                    tool = %tool_name,
                    expires_at = %ticket.expires_at,
                    "Confirmation requested"
                );
                self.event_bus().publish(DomainEvent::ConfirmationRequested {
                    conversation_id: conversation_id.to_string(),
                    tool_name: tool_name.clone(),
                    expires_at: ticket.expires_at,
                });

                Ok(Reply::ConfirmationNeeded {
                    token: ticket.token,
                    tool_name,
                    description,
                    raw_input,
                    conversation_id: conversation_id.clone(),
                })
            }
        }
    }

    /// Approve or reject a suspended action. Each token resolves once.
    pub async fn resolve_confirmation(&self, token: &str, confirmed: bool) -> Result<Reply, AgentError> {
        let action = self.pending.take(token)?;
        let conversation_id = action.conversation_id.clone();
        let tool = action.tool_name().to_string();

        info!(conversation_id = %conversation_id, tool = %tool, confirmed, "Resolving confirmation");
        self.event_bus().publish(DomainEvent::ActionResolved {
            conversation_id: conversation_id.to_string(),
            tool_name: tool.clone(),
            confirmed,
            timestamp: Utc::now(),
        });

        if !confirmed {
            self.history
                .append_exchange(
                    &conversation_id,
                    &action.user_message,
                    &format!("Action cancelled: {tool}"),
                    &[],
                )
                .await?;
            return Ok(Reply::Message {
                text: "Action cancelled".into(),
                conversation_id,
                tools_used: vec![],
            });
        }

        let text = match self.agent.resume(&action).await {
            Ok(text) => text,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Closing turn failed after confirmed action");
                self.report("resolve_confirmation", &e);
                return Err(e);
            }
        };

        let tools_used = vec![ToolUsage::confirmed(tool, action.suspension.description.clone())];
        self.history
            .append_exchange(&conversation_id, &action.user_message, &text, &tools_used)
            .await?;

        Ok(Reply::Message {
            text,
            conversation_id,
            tools_used,
        })
    }

    /// Process one user message, delivering the lifecycle as events.
    ///
    /// The receiver yields `tool_started` events while tools run, then
    /// either `confirmation_needed`, or `tools_used`, `text_delta`s and
    /// `done`; or a single `error`.
    pub fn stream_message(
        self: &Arc<Self>,
        client_key: String,
        conversation_id: Option<ConversationId>,
        text: String,
    ) -> mpsc::Receiver<AgentStreamEvent> {
        let (tx, rx) = mpsc::channel::<AgentStreamEvent>(128);
        let this = Arc::clone(self);

        tokio::spawn(async move {
            let reply = this
                .converse(&client_key, conversation_id, &text, Some(&tx))
                .await;
            for event in this.reply_events(reply) {
                if tx.send(event).await.is_err() {
                    debug!("Stream receiver dropped");
                    break;
                }
            }
        });

        rx
    }

    fn reply_events(&self, reply: Result<Reply, AgentError>) -> Vec<AgentStreamEvent> {
        match reply {
            Ok(Reply::Message {
                text,
                conversation_id,
                tools_used,
            }) => {
                let mut events = vec![AgentStreamEvent::ToolsUsed { tools: tools_used }];
                events.extend(
                    chunk_text(&text, self.chunk_chars)
                        .into_iter()
                        .map(|text| AgentStreamEvent::TextDelta { text }),
                );
                events.push(AgentStreamEvent::Done { conversation_id });
                events
            }
            Ok(Reply::ConfirmationNeeded {
                token,
                tool_name,
                description,
                raw_input,
                conversation_id,
            }) => vec![AgentStreamEvent::ConfirmationNeeded {
                token,
                tool_name,
                description,
                raw_input,
                conversation_id,
            }],
            Ok(Reply::Error { text }) => vec![AgentStreamEvent::Error { message: text }],
            Err(e) => vec![AgentStreamEvent::Error {
                message: e.to_string(),
            }],
        }
    }

    pub async fn list_history(
        &self,
        conversation_id: Option<&ConversationId>,
    ) -> Result<Vec<HistoryRecord>, AgentError> {
        Ok(self.history.list(conversation_id).await?)
    }

    pub async fn clear_history(&self, conversation_id: Option<&ConversationId>) -> Result<u64, AgentError> {
        let removed = self.history.clear(conversation_id).await?;
        info!(removed, "History cleared");
        Ok(removed)
    }

    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, AgentError> {
        Ok(self.history.conversations(CONVERSATION_LIST_LIMIT).await?)
    }

    pub async fn favorites(&self) -> Result<Vec<Favorite>, AgentError> {
        Ok(self.history.favorites().await?)
    }

    pub async fn add_favorite(&self, query: &str, label: Option<&str>) -> Result<Favorite, AgentError> {
        let favorite = self.history.add_favorite(query, label).await?;
        info!(id = favorite.id, "Favorite saved");
        Ok(favorite)
    }

    /// Returns whether the favorite existed.
    pub async fn remove_favorite(&self, id: i64) -> Result<bool, AgentError> {
        Ok(self.history.remove_favorite(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::FixedPrompt;
    use crate::test_helpers::*;
    use ledgerclaw_core::error::ProviderError;
    use ledgerclaw_core::message::Role;
    use ledgerclaw_core::provider::ProviderResponse;
    use ledgerclaw_memory::InMemoryHistory;

    fn assistant(provider: Arc<ScriptedProvider>) -> (Arc<Assistant>, Counters, Arc<InMemoryHistory>) {
        let (tools, counters) = registry();
        let history = Arc::new(InMemoryHistory::new());
        let agent = AgentLoop::new(provider, "mock-model", 0.3, tools, Arc::new(EventBus::default()));
        let assistant = Assistant::new(agent, history.clone(), Arc::new(FixedPrompt("sys".into())));
        (Arc::new(assistant), counters, history)
    }

    fn write_call() -> ProviderResponse {
        tool_response(vec![make_tool_call("w1", "write_record", serde_json::json!({"value": "x"}))])
    }

    #[tokio::test]
    async fn answer_is_stored() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Hi there")]));
        let (assistant, _, history) = assistant(provider);
        let conv = ConversationId::from("c1");

        let reply = assistant.send_message("k", Some(conv.clone()), "Hello").await.unwrap();
        assert_eq!(reply.text(), Some("Hi there"));

        let records = history.list(Some(&conv)).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].role, Role::User);
        assert_eq!(records[1].content, "Hi there");
    }

    #[tokio::test]
    async fn tools_behind_an_answer_are_stored() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![make_tool_call(
                "c1",
                "lookup_a",
                serde_json::json!({"key": "1", "explanation": "Checking A"}),
            )]),
            text_response("A is fine."),
        ]));
        let (assistant, _, history) = assistant(provider);
        let conv = ConversationId::from("c1");
        assistant.send_message("k", Some(conv.clone()), "check a").await.unwrap();

        let records = history.list(Some(&conv)).await.unwrap();
        assert!(records[0].tool_calls.is_empty());
        assert_eq!(records[1].tool_calls.len(), 1);
        assert_eq!(records[1].tool_calls[0].tool, "lookup_a");
        assert_eq!(records[1].tool_calls[0].description, "Checking A");
        assert!(!records[1].tool_calls[0].confirmed);
    }

    #[tokio::test]
    async fn blank_answer_never_reaches_history() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response(""), text_response("Sure.")]));
        let (assistant, _, history) = assistant(provider.clone());
        let conv = ConversationId::from("c1");

        let reply = assistant.send_message("k", Some(conv.clone()), "hi").await.unwrap();
        assert_eq!(reply.text(), Some(crate::loop_runner::EMPTY_ANSWER));
        assert_eq!(history.list(Some(&conv)).await.unwrap()[1].content, crate::loop_runner::EMPTY_ANSWER);

        assistant.send_message("k", Some(conv), "again").await.unwrap();
        let sent = &provider.requests()[1].messages;
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|m| !m.content.trim().is_empty()));
    }

    #[tokio::test]
    async fn favorites_round_trip() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let (assistant, _, _) = assistant(provider.clone());

        let saved = assistant
            .add_favorite("Show me every overdue invoice for this quarter, grouped by contact", None)
            .await
            .unwrap();
        assert_eq!(saved.label.chars().count(), 50);
        let named = assistant.add_favorite("Cash position", Some("Cash")).await.unwrap();

        let favorites = assistant.favorites().await.unwrap();
        assert_eq!(favorites.len(), 2);
        assert_eq!(favorites[0].id, named.id);

        assert!(assistant.remove_favorite(saved.id).await.unwrap());
        assert!(!assistant.remove_favorite(saved.id).await.unwrap());
        assert_eq!(assistant.favorites().await.unwrap(), vec![named]);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn history_is_sent_to_the_model() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("first"),
            text_response("second"),
        ]));
        let (assistant, _, _) = assistant(provider.clone());
        let conv = ConversationId::from("c1");
        assistant.send_message("k", Some(conv.clone()), "one").await.unwrap();
        assistant.send_message("k", Some(conv), "two").await.unwrap();

        let contents: Vec<_> = provider.requests()[1]
            .messages
            .iter()
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(contents, vec!["one", "first", "two"]);
    }

    #[tokio::test]
    async fn new_conversation_gets_an_id() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("ok")]));
        let (assistant, _, _) = assistant(provider);
        let reply = assistant.send_message("k", None, "hi").await.unwrap();
        let Reply::Message { conversation_id, .. } = reply else {
            panic!("Expected message");
        };
        assert!(!conversation_id.as_str().is_empty());
    }

    #[tokio::test]
    async fn suspension_defers_history_until_confirmed() {
        let provider = Arc::new(ScriptedProvider::new(vec![write_call(), text_response("Written.")]));
        let (assistant, counters, history) = assistant(provider);
        let conv = ConversationId::from("c1");

        let reply = assistant.send_message("k", Some(conv.clone()), "write x").await.unwrap();
        let Reply::ConfirmationNeeded {
            token,
            tool_name,
            description,
            raw_input,
            ..
        } = reply
        else {
            panic!("Expected confirmation");
        };
        assert_eq!(tool_name, "write_record");
        assert_eq!(description, "Write x");
        assert_eq!(raw_input["value"], "x");
        assert!(history.list(Some(&conv)).await.unwrap().is_empty());
        assert_eq!(counters.writes(), 0);

        let reply = assistant.resolve_confirmation(&token, true).await.unwrap();
        let Reply::Message { text, tools_used, .. } = reply else {
            panic!("Expected message");
        };
        assert_eq!(text, "Written.");
        assert_eq!(tools_used[0].tool, "write_record");
        assert!(tools_used[0].confirmed);
        assert_eq!(counters.writes(), 1);

        let records = history.list(Some(&conv)).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].content, "write x");
        assert_eq!(records[1].content, "Written.");
        assert!(records[0].tool_calls.is_empty());
        assert_eq!(records[1].tool_calls, vec![ToolUsage::confirmed("write_record", "Write x")]);

        assert!(matches!(
            assistant.resolve_confirmation(&token, true).await,
            Err(AgentError::Expired)
        ));
        assert_eq!(counters.writes(), 1);
    }

    #[tokio::test]
    async fn closing_turn_failure_consumes_the_token() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![write_call()]).then_fail(ProviderError::Network("reset".into())),
        );
        let (assistant, counters, history) = assistant(provider);
        let conv = ConversationId::from("c1");

        let Reply::ConfirmationNeeded { token, .. } =
            assistant.send_message("k", Some(conv.clone()), "write x").await.unwrap()
        else {
            panic!("Expected confirmation");
        };

        let err = assistant.resolve_confirmation(&token, true).await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(ProviderError::Network(_))));
        assert_eq!(counters.writes(), 1);
        assert!(history.list(Some(&conv)).await.unwrap().is_empty());
        assert_eq!(assistant.pending_count(), 0);

        assert!(matches!(
            assistant.resolve_confirmation(&token, true).await,
            Err(AgentError::Expired)
        ));
        assert_eq!(counters.writes(), 1);
    }

    #[tokio::test]
    async fn rejection_records_cancellation() {
        let provider = Arc::new(ScriptedProvider::new(vec![write_call()]));
        let (assistant, counters, history) = assistant(provider.clone());
        let conv = ConversationId::from("c1");

        let Reply::ConfirmationNeeded { token, .. } =
            assistant.send_message("k", Some(conv.clone()), "write x").await.unwrap()
        else {
            panic!("Expected confirmation");
        };

        let reply = assistant.resolve_confirmation(&token, false).await.unwrap();
        assert_eq!(reply.text(), Some("Action cancelled"));
        assert_eq!(counters.writes(), 0);
        assert_eq!(provider.call_count(), 1);

        let records = history.list(Some(&conv)).await.unwrap();
        assert_eq!(records[1].content, "Action cancelled: write_record");

        assert!(matches!(
            assistant.resolve_confirmation(&token, false).await,
            Err(AgentError::Expired)
        ));
        assert_eq!(history.list(Some(&conv)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn expired_confirmation_never_executes() {
        let provider = Arc::new(ScriptedProvider::new(vec![write_call()]));
        let (tools, counters) = registry();
        let agent = AgentLoop::new(provider, "mock-model", 0.3, tools, Arc::new(EventBus::default()));
        let assistant = Assistant::new(
            agent,
            Arc::new(InMemoryHistory::new()),
            Arc::new(FixedPrompt("sys".into())),
        )
        .with_confirmation_ttl(chrono::Duration::seconds(-1));

        let Reply::ConfirmationNeeded { token, .. } =
            assistant.send_message("k", None, "write x").await.unwrap()
        else {
            panic!("Expected confirmation");
        };
        assert!(matches!(
            assistant.resolve_confirmation(&token, true).await,
            Err(AgentError::Expired)
        ));
        assert_eq!(counters.writes(), 0);
    }

    #[tokio::test]
    async fn backend_failure_writes_nothing() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![]).then_fail(ProviderError::AuthenticationFailed("bad key".into())),
        );
        let (assistant, _, history) = assistant(provider);
        let mut events = assistant.event_bus().subscribe();

        let err = assistant.send_message("k", None, "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
        assert!(history.list(None).await.unwrap().is_empty());

        let event = events.recv().await.unwrap();
        assert_eq!(event.name(), "error_occurred");
    }

    #[tokio::test]
    async fn rate_limit_denies_before_any_model_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("a"), text_response("b")]));
        let (tools, _) = registry();
        let agent = AgentLoop::new(provider.clone(), "m", 0.3, tools, Arc::new(EventBus::default()));
        let assistant = Assistant::new(
            agent,
            Arc::new(InMemoryHistory::new()),
            Arc::new(FixedPrompt("sys".into())),
        )
        .with_rate_limit(1, Duration::from_secs(60));

        assistant.send_message("k", None, "one").await.unwrap();
        let err = assistant.send_message("k", None, "two").await.unwrap_err();
        assert!(matches!(err, AgentError::RateLimited));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn stream_delivers_answer_in_fragments() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![make_tool_call("c1", "lookup_a", serde_json::json!({"key": "1"}))]),
            text_response("The overdue total is 2,950.00 EUR across two invoices."),
        ]));
        let (assistant, _, history) = assistant(provider);
        let conv = ConversationId::from("s1");

        let mut rx = assistant.stream_message("k".into(), Some(conv.clone()), "overdue?".into());
        let mut events = vec![];
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(matches!(&events[0], AgentStreamEvent::ToolStarted { tool, .. } if tool == "lookup_a"));
        assert!(matches!(&events[1], AgentStreamEvent::ToolsUsed { tools } if tools.len() == 1));
        assert_eq!(
            events.last(),
            Some(&AgentStreamEvent::Done {
                conversation_id: conv.clone()
            })
        );

        let deltas: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                AgentStreamEvent::TextDelta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert!(deltas.iter().all(|d| d.chars().count() <= 20));
        assert_eq!(deltas.concat(), "The overdue total is 2,950.00 EUR across two invoices.");
        assert_eq!(history.list(Some(&conv)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stream_ends_at_confirmation() {
        let provider = Arc::new(ScriptedProvider::new(vec![write_call()]));
        let (assistant, _, history) = assistant(provider);

        let mut rx = assistant.stream_message("k".into(), None, "write x".into());
        let mut events = vec![];
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), "tool_started");
        assert!(matches!(
            &events[1],
            AgentStreamEvent::ConfirmationNeeded { tool_name, .. } if tool_name == "write_record"
        ));
        assert_eq!(assistant.pending_count(), 1);
        assert!(history.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stream_reports_errors() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let (assistant, _, _) = assistant(provider);
        let mut rx = assistant.stream_message("k".into(), None, "hi".into());
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "error");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn clear_then_list_is_empty() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("a"), text_response("b")]));
        let (assistant, _, _) = assistant(provider);
        let c1 = ConversationId::from("c1");
        let c2 = ConversationId::from("c2");
        assistant.send_message("k", Some(c1.clone()), "one").await.unwrap();
        assistant.send_message("k", Some(c2.clone()), "two").await.unwrap();

        assert_eq!(assistant.clear_history(Some(&c1)).await.unwrap(), 2);
        assert!(assistant.list_history(Some(&c1)).await.unwrap().is_empty());
        assert_eq!(assistant.list_history(Some(&c2)).await.unwrap().len(), 2);
        assert_eq!(assistant.conversations().await.unwrap().len(), 1);
    }
}
