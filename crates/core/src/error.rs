//! Error types for the LedgerClaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! folds them together for bootstrap and CLI code.

use thiserror::Error;

/// The top-level error type for all LedgerClaw operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures talking to the model backend. All of these end the current turn.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Failures of a single tool invocation. Never fatal to a turn: the agent
/// loop turns them into an error tool-result for the model.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Database error: {0}")]
    Database(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Errors surfaced to the client by the assistant engine.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Rate limit exceeded. Please wait a moment.")]
    RateLimited,

    #[error("This action has expired. Please try again.")]
    Expired,

    #[error("Stopped after {0} tool iterations without a final answer")]
    IterationLimit(u32),

    #[error("Model backend error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Conversation store error: {0}")]
    History(#[from] HistoryError),
}
