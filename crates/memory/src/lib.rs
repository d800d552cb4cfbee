//! Conversation store implementations for LedgerClaw.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryHistory;
pub use sqlite::SqliteHistory;

use ledgerclaw_core::error::HistoryError;
use ledgerclaw_core::history::ConversationStore;
use std::path::Path;
use std::sync::Arc;

/// Open the store named by `backend` ("sqlite" or "memory").
pub async fn open_store(
    backend: &str,
    path: &Path,
) -> Result<Arc<dyn ConversationStore>, HistoryError> {
    match backend {
        "memory" => Ok(Arc::new(InMemoryHistory::new())),
        "sqlite" => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    HistoryError::Storage(format!("Cannot create {}: {e}", parent.display()))
                })?;
            }
            let store = SqliteHistory::new(&path.display().to_string()).await?;
            Ok(Arc::new(store))
        }
        other => Err(HistoryError::Storage(format!(
            "Unknown history backend '{other}'"
        ))),
    }
}
