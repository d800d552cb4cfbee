//! Provider trait: the abstraction over model backends.
//!
//! A provider receives a system prompt, the tool catalog and the message
//! history, and answers with exactly one [`ModelTurn`]: either final text or
//! a list of tool invocations. The variant is decided by the backend's own
//! stop signal, never guessed from the shape of the content.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::{ToolCall, ToolSpec};

/// One request to the model backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "claude-sonnet-4-20250514")
    pub model: String,

    /// System prompt, sent outside the message list
    pub system: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.3
}

/// What the model decided to do with its turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelTurn {
    /// A final answer; the loop ends here.
    Final { text: String },

    /// One or more tool invocations, in the order the model emitted them,
    /// plus any text the model wrote alongside them.
    ToolUse { text: String, calls: Vec<ToolCall> },
}

impl ModelTurn {
    pub fn text(&self) -> &str {
        match self {
            Self::Final { text } | Self::ToolUse { text, .. } => text,
        }
    }

    /// The assistant message this turn contributes to the history.
    pub fn to_message(&self) -> Message {
        match self {
            Self::Final { text } => Message::assistant(text.clone()),
            Self::ToolUse { text, calls } => Message::assistant_with_calls(text.clone(), calls.clone()),
        }
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub turn: ModelTurn,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// The agent loop calls `complete()` without knowing which backend is behind it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get one complete turn back.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}
