//! Message domain types.
//!
//! A conversation is the ordered list of these value objects:
//! user text, assistant turns (optionally requesting tools) and tool results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::ToolCall;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The assistant (model output)
    Assistant,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content (JSON text for tool results)
    pub content: String,

    /// Tool invocations requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// If this is a tool result, which invocation it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Set on tool results that carry an error payload
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,

    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn build(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::build(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::build(Role::Assistant, content.into())
    }

    /// An assistant turn that requested one or more tool invocations.
    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::build(Role::Assistant, content.into());
        msg.tool_calls = calls;
        msg
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::build(Role::Tool, content.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// A tool result carrying `{"error": reason}`.
    pub fn tool_error(tool_call_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        let payload = serde_json::json!({ "error": reason.to_string() });
        let mut msg = Self::tool_result(tool_call_id, payload.to_string());
        msg.is_error = true;
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("How much did we invoice in March?");
        assert_eq!(msg.role, Role::User);
        assert!(msg.tool_calls.is_empty());
        assert!(!msg.is_error);
    }

    #[test]
    fn tool_error_is_structured_json() {
        let msg = Message::tool_error("call_1", "Unknown tool: nope");
        assert_eq!(msg.role, Role::Tool);
        assert!(msg.is_error);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        let payload: serde_json::Value = serde_json::from_str(&msg.content).unwrap();
        assert_eq!(payload["error"], "Unknown tool: nope");
    }

    #[test]
    fn role_parses_from_storage_form() {
        for role in [Role::User, Role::Assistant, Role::Tool] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("system".parse::<Role>().is_err());
    }

    #[test]
    fn conversation_id_serializes_as_plain_string() {
        let id = ConversationId::from("conv-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""conv-7""#);
    }
}
