//! The assistant engine: agent loop, write confirmation and streaming.
//!
//! A user message flows through:
//!
//! 1. **Admission**: the per-client [`RateLimiter`]
//! 2. **Context**: stored history plus the new message and a system prompt
//! 3. **Loop**: model turns; read-only tools run inline
//! 4. **Suspension**: the first mutating tool call is parked in the
//!    [`PendingActionStore`] behind a token
//! 5. **Resolution**: the user approves (the call runs once, the model
//!    writes one closing turn) or rejects
//!
//! History is written only when a turn settles, never while it is suspended.

pub mod bootstrap;
pub mod engine;
pub mod loop_runner;
pub mod pending;
pub mod prompt;
pub mod rate_limit;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use bootstrap::{assistant_from_config, assistant_with_provider, open_ledger};
pub use engine::{Assistant, Reply};
pub use ledgerclaw_core::history::ToolUsage;
pub use loop_runner::{AgentLoop, LoopOutcome, Suspension, EMPTY_ANSWER};
pub use pending::{PendingAction, PendingActionStore};
pub use prompt::{FixedPrompt, LedgerPrompt, SystemPrompt};
pub use rate_limit::RateLimiter;
pub use stream_event::AgentStreamEvent;
