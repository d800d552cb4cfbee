//! Domain event system: decoupled observation of the engine.
//!
//! Events are published when something interesting happens: a model turn,
//! a tool run, a confirmation requested or resolved. Subscribers (the
//! gateway log stream, tests) react without coupling to the agent loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The model backend answered a turn
    ResponseGenerated {
        conversation_id: String,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A mutating tool call was suspended pending approval
    ConfirmationRequested {
        conversation_id: String,
        tool_name: String,
        expires_at: DateTime<Utc>,
    },

    /// A suspended call was approved or rejected
    ActionResolved {
        conversation_id: String,
        tool_name: String,
        confirmed: bool,
        timestamp: DateTime<Utc>,
    },

    /// A client was refused by the rate limiter
    RateLimited {
        client_key: String,
        timestamp: DateTime<Utc>,
    },

    /// An error ended a request
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Stable snake_case name, used as the SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResponseGenerated { .. } => "response_generated",
            Self::ToolExecuted { .. } => "tool_executed",
            Self::ConfirmationRequested { .. } => "confirmation_requested",
            Self::ActionResolved { .. } => "action_resolved",
            Self::RateLimited { .. } => "rate_limited",
            Self::ErrorOccurred { .. } => "error_occurred",
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
