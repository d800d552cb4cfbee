//! ConversationStore trait: the durable, append-only conversation log.
//!
//! Only settled exchanges are written here: the user's message and the
//! assistant's final text, with a summary of the tools that answer used.
//! Intermediate tool traffic stays in memory for the duration of a turn.
//!
//! The same store keeps the user's saved queries (favorites).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HistoryError;
use crate::message::{ConversationId, Message, Role};
use crate::tool::ToolCall;

/// How many entries `list(None)` returns across all conversations.
pub const RECENT_HISTORY_LIMIT: usize = 50;

/// Characters of the query used as a favorite's label when none is given.
pub const FAVORITE_LABEL_CHARS: usize = 50;

/// A tool an answer made use of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUsage {
    pub tool: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub confirmed: bool,
}

impl ToolUsage {
    /// The model's own `explanation` argument when it gave one.
    pub fn for_call(call: &ToolCall) -> Self {
        let description = call.arguments["explanation"]
            .as_str()
            .filter(|s| !s.is_empty())
            .unwrap_or(call.name.as_str())
            .to_string();
        Self {
            tool: call.name.clone(),
            description,
            confirmed: false,
        }
    }

    /// A mutating call the user approved.
    pub fn confirmed(tool: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            description: description.into(),
            confirmed: true,
        }
    }
}

/// One stored history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Monotonic insertion sequence; defines chronological order.
    pub seq: i64,
    pub conversation_id: ConversationId,
    pub role: Role,
    pub content: String,
    /// Tools behind an assistant answer; empty for user entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolUsage>,
    pub timestamp: DateTime<Utc>,
}

impl HistoryRecord {
    /// The message form handed to the model backend.
    pub fn to_message(&self) -> Message {
        let mut msg = match self.role {
            Role::User => Message::user(self.content.clone()),
            _ => Message::assistant(self.content.clone()),
        };
        msg.id = self.seq.to_string();
        msg.timestamp = self.timestamp;
        msg
    }
}

/// Overview row for a stored conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub started_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
    pub message_count: u64,
    /// First user message, useful as a title
    pub first_message: Option<String>,
}

/// A saved query the user can re-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: i64,
    pub query: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

/// The label stored for a favorite: the given one, or the start of the query.
pub fn favorite_label(query: &str, label: Option<&str>) -> String {
    match label.map(str::trim).filter(|l| !l.is_empty()) {
        Some(label) => label.to_string(),
        None => query.chars().take(FAVORITE_LABEL_CHARS).collect(),
    }
}

/// The core ConversationStore trait.
///
/// Implementations: SQLite (durable) and in-memory (tests, ephemeral sessions).
/// Appends to one conversation are serialized by the implementation;
/// different conversations never contend.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Append one entry.
    async fn append(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
    ) -> Result<(), HistoryError>;

    /// Append a user message and the assistant reply as two adjacent
    /// entries; no other writer can slip between the pair. `tools` is
    /// stored with the reply.
    async fn append_exchange(
        &self,
        conversation_id: &ConversationId,
        user: &str,
        assistant: &str,
        tools: &[ToolUsage],
    ) -> Result<(), HistoryError>;

    /// The most recent `limit` messages of a conversation, oldest first.
    async fn load(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, HistoryError>;

    /// Every entry of one conversation, or the latest
    /// [`RECENT_HISTORY_LIMIT`] entries across all conversations; oldest first.
    async fn list(
        &self,
        conversation_id: Option<&ConversationId>,
    ) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// Delete one conversation, or everything. Returns the number of entries removed.
    async fn clear(&self, conversation_id: Option<&ConversationId>) -> Result<u64, HistoryError>;

    /// Most recently active conversations first.
    async fn conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>, HistoryError>;

    /// Saved queries, newest first.
    async fn favorites(&self) -> Result<Vec<Favorite>, HistoryError>;

    /// Save a query. Without a label, the first
    /// [`FAVORITE_LABEL_CHARS`] characters of the query are used.
    async fn add_favorite(&self, query: &str, label: Option<&str>) -> Result<Favorite, HistoryError>;

    /// Returns whether a favorite with that id existed.
    async fn remove_favorite(&self, id: i64) -> Result<bool, HistoryError>;
}
