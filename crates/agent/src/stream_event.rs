//! Agent-level streaming events.
//!
//! `AgentStreamEvent` is the incremental form of a [`crate::Reply`]: the
//! gateway forwards each one to the client as a server-sent event.

use ledgerclaw_core::history::ToolUsage;
use ledgerclaw_core::message::ConversationId;
use serde::{Deserialize, Serialize};

/// Events emitted while one message is processed, in order:
///
/// - `tool_started`        once per tool call the loop reaches
/// - `confirmation_needed` a mutating call was suspended (last event)
/// - `tools_used`          summary of executed tools
/// - `text_delta`          fixed-size fragments of the answer
/// - `done`                the answer is complete
/// - `error`               the request failed (last event)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    ToolStarted { id: String, tool: String },

    ConfirmationNeeded {
        token: String,
        tool_name: String,
        description: String,
        raw_input: serde_json::Value,
        conversation_id: ConversationId,
    },

    ToolsUsed { tools: Vec<ToolUsage> },

    TextDelta { text: String },

    Done { conversation_id: ConversationId },

    Error { message: String },
}

impl AgentStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ToolStarted { .. } => "tool_started",
            Self::ConfirmationNeeded { .. } => "confirmation_needed",
            Self::ToolsUsed { .. } => "tools_used",
            Self::TextDelta { .. } => "text_delta",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ConfirmationNeeded { .. } | Self::Done { .. } | Self::Error { .. }
        )
    }
}

/// Split `text` into fragments of at most `size` characters.
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}
