//! # LedgerClaw Core
//!
//! Domain types, traits, and error definitions for the LedgerClaw assistant
//! engine. This crate has no framework dependencies: it defines the model
//! that the provider, storage, tool and agent crates implement against.
//!
//! ## Layout
//!
//! - [`tool`]: the tool contract, its read-only/mutating classification and the registry
//! - [`provider`]: the model-backend contract and its tagged [`ModelTurn`] result
//! - [`history`]: the durable conversation log contract
//! - [`event`]: broadcast bus for domain events
//! - [`error`]: one error enum per bounded context

pub mod error;
pub mod event;
pub mod history;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{AgentError, Error, HistoryError, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use history::{ConversationStore, ConversationSummary, Favorite, HistoryRecord, ToolUsage};
pub use message::{ConversationId, Message, Role};
pub use provider::{ModelTurn, Provider, ProviderRequest, ProviderResponse, Usage};
pub use tool::{Tool, ToolCall, ToolClass, ToolRegistry, ToolResult, ToolSpec};
