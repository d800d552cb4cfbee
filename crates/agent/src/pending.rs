//! Suspended mutating tool calls awaiting user approval.
//!
//! Each entry is addressed by an unguessable token and consumed at most
//! once: `take` removes it under the same lock that looks it up, so two
//! concurrent resolutions of one token cannot both succeed. Entries live
//! only as long as the process.

use crate::loop_runner::Suspension;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use ledgerclaw_core::error::AgentError;
use ledgerclaw_core::message::ConversationId;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

pub const DEFAULT_CONFIRMATION_TTL_SECS: i64 = 300;

/// Everything needed to finish a suspended turn.
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub token: String,
    pub conversation_id: ConversationId,
    /// The user message that started the turn; written to history on resolution
    pub user_message: String,
    pub suspension: Suspension,
    /// Model and system prompt the turn ran with
    pub model: String,
    pub system_prompt: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn tool_name(&self) -> &str {
        &self.suspension.invocation.name
    }
}

/// Input to [`PendingActionStore::create`].
#[derive(Debug, Clone)]
pub struct PendingDraft {
    pub conversation_id: ConversationId,
    pub user_message: String,
    pub suspension: Suspension,
    pub model: String,
    pub system_prompt: String,
}

/// Handle returned to the client for a new pending action.
#[derive(Debug, Clone)]
pub struct PendingTicket {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct PendingActionStore {
    ttl: Duration,
    actions: Mutex<HashMap<String, PendingAction>>,
}

fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl PendingActionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            actions: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    pub fn create(&self, draft: PendingDraft) -> PendingTicket {
        self.create_at(draft, Utc::now())
    }

    fn create_at(&self, draft: PendingDraft, now: DateTime<Utc>) -> PendingTicket {
        let mut actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        Self::sweep_locked(&mut actions, now);

        let mut token = new_token();
        while actions.contains_key(&token) {
            token = new_token();
        }

        let expires_at = now
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        actions.insert(
            token.clone(),
            PendingAction {
                token: token.clone(),
                conversation_id: draft.conversation_id,
                user_message: draft.user_message,
                suspension: draft.suspension,
                model: draft.model,
                system_prompt: draft.system_prompt,
                created_at: now,
                expires_at,
            },
        );
        PendingTicket { token, expires_at }
    }

    /// Remove and return the action for `token`.
    ///
    /// Unknown, already consumed and expired tokens all yield
    /// [`AgentError::Expired`].
    pub fn take(&self, token: &str) -> Result<PendingAction, AgentError> {
        self.take_at(token, Utc::now())
    }

    pub(crate) fn take_at(&self, token: &str, now: DateTime<Utc>) -> Result<PendingAction, AgentError> {
        let mut actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        let action = actions.remove(token);
        Self::sweep_locked(&mut actions, now);
        drop(actions);

        match action {
            Some(action) if now <= action.expires_at => Ok(action),
            Some(action) => {
                debug!(tool = %action.tool_name(), "Pending action expired before resolution");
                Err(AgentError::Expired)
            }
            None => Err(AgentError::Expired),
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let mut actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        Self::sweep_locked(&mut actions, Utc::now())
    }

    fn sweep_locked(actions: &mut HashMap<String, PendingAction>, now: DateTime<Utc>) -> usize {
        let before = actions.len();
        actions.retain(|_, a| now <= a.expires_at);
        let removed = before - actions.len();
        if removed > 0 {
            debug!(removed, "Swept expired pending actions");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.actions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PendingActionStore {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_CONFIRMATION_TTL_SECS))
    }
}
