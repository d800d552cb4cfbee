//! In-memory conversation store, for tests and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use ledgerclaw_core::error::HistoryError;
use ledgerclaw_core::history::{
    favorite_label, ConversationStore, ConversationSummary, Favorite, HistoryRecord, ToolUsage,
    RECENT_HISTORY_LIMIT,
};
use ledgerclaw_core::message::{ConversationId, Message, Role};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

type Log = Arc<Mutex<Vec<HistoryRecord>>>;

/// Keeps each conversation's log behind its own lock, so writers to
/// different conversations never wait on each other.
pub struct InMemoryHistory {
    conversations: RwLock<HashMap<ConversationId, Log>>,
    seq: AtomicI64,
    favorites: Mutex<Vec<Favorite>>,
    favorite_seq: AtomicI64,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            seq: AtomicI64::new(1),
            favorites: Mutex::new(Vec::new()),
            favorite_seq: AtomicI64::new(1),
        }
    }

    async fn log_for(&self, conversation_id: &ConversationId) -> Log {
        if let Some(log) = self.conversations.read().await.get(conversation_id) {
            return log.clone();
        }
        self.conversations
            .write()
            .await
            .entry(conversation_id.clone())
            .or_default()
            .clone()
    }

    fn record(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
        tools: &[ToolUsage],
    ) -> HistoryRecord {
        HistoryRecord {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            conversation_id: conversation_id.clone(),
            role,
            content: content.to_string(),
            tool_calls: tools.to_vec(),
            timestamp: Utc::now(),
        }
    }

    async fn snapshot(&self) -> Vec<Log> {
        self.conversations.read().await.values().cloned().collect()
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryHistory {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
    ) -> Result<(), HistoryError> {
        let log = self.log_for(conversation_id).await;
        let mut entries = log.lock().await;
        entries.push(self.record(conversation_id, role, content, &[]));
        Ok(())
    }

    async fn append_exchange(
        &self,
        conversation_id: &ConversationId,
        user: &str,
        assistant: &str,
        tools: &[ToolUsage],
    ) -> Result<(), HistoryError> {
        let log = self.log_for(conversation_id).await;
        let mut entries = log.lock().await;
        entries.push(self.record(conversation_id, Role::User, user, &[]));
        entries.push(self.record(conversation_id, Role::Assistant, assistant, tools));
        Ok(())
    }

    async fn load(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, HistoryError> {
        let Some(log) = self.conversations.read().await.get(conversation_id).cloned() else {
            return Ok(Vec::new());
        };
        let entries = log.lock().await;
        let start = entries.len().saturating_sub(limit);
        Ok(entries[start..].iter().map(HistoryRecord::to_message).collect())
    }

    async fn list(
        &self,
        conversation_id: Option<&ConversationId>,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        if let Some(id) = conversation_id {
            let Some(log) = self.conversations.read().await.get(id).cloned() else {
                return Ok(Vec::new());
            };
            return Ok(log.lock().await.clone());
        }

        let mut all = Vec::new();
        for log in self.snapshot().await {
            all.extend(log.lock().await.iter().cloned());
        }
        all.sort_by_key(|r| r.seq);
        let start = all.len().saturating_sub(RECENT_HISTORY_LIMIT);
        Ok(all.split_off(start))
    }

    async fn clear(&self, conversation_id: Option<&ConversationId>) -> Result<u64, HistoryError> {
        let mut conversations = self.conversations.write().await;
        let removed: Vec<Log> = match conversation_id {
            Some(id) => conversations.remove(id).into_iter().collect(),
            None => conversations.drain().map(|(_, log)| log).collect(),
        };
        drop(conversations);

        let mut count = 0u64;
        for log in removed {
            count += log.lock().await.len() as u64;
        }
        Ok(count)
    }

    async fn conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>, HistoryError> {
        let mut summaries: Vec<(i64, ConversationSummary)> = Vec::new();
        for log in self.snapshot().await {
            let entries = log.lock().await;
            let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
                continue;
            };
            summaries.push((
                last.seq,
                ConversationSummary {
                    id: first.conversation_id.clone(),
                    started_at: first.timestamp,
                    last_message_at: last.timestamp,
                    message_count: entries.len() as u64,
                    first_message: entries
                        .iter()
                        .find(|r| r.role == Role::User)
                        .map(|r| r.content.clone()),
                },
            ));
        }
        summaries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(summaries.into_iter().take(limit).map(|(_, s)| s).collect())
    }

    async fn favorites(&self) -> Result<Vec<Favorite>, HistoryError> {
        let mut favorites = self.favorites.lock().await.clone();
        favorites.reverse();
        Ok(favorites)
    }

    async fn add_favorite(&self, query: &str, label: Option<&str>) -> Result<Favorite, HistoryError> {
        let mut favorites = self.favorites.lock().await;
        let favorite = Favorite {
            id: self.favorite_seq.fetch_add(1, Ordering::SeqCst),
            query: query.to_string(),
            label: favorite_label(query, label),
            created_at: Utc::now(),
        };
        favorites.push(favorite.clone());
        Ok(favorite)
    }

    async fn remove_favorite(&self, id: i64) -> Result<bool, HistoryError> {
        let mut favorites = self.favorites.lock().await;
        let before = favorites.len();
        favorites.retain(|f| f.id != id);
        Ok(favorites.len() < before)
    }
}
