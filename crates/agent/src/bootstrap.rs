//! Assemble an [`Assistant`] from configuration.

use crate::engine::Assistant;
use crate::loop_runner::AgentLoop;
use crate::prompt::{FixedPrompt, LedgerPrompt, SystemPrompt};
use ledgerclaw_config::AppConfig;
use ledgerclaw_core::error::{Error, ProviderError};
use ledgerclaw_core::event::EventBus;
use ledgerclaw_core::provider::Provider;
use ledgerclaw_tools::business::{BusinessClient, DryRunClient};
use ledgerclaw_tools::ledger::LedgerDb;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Open the ledger database, creating its directory when needed.
pub async fn open_ledger(path: &Path) -> ledgerclaw_core::Result<LedgerDb> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::Config {
            message: format!("Cannot create {}: {e}", parent.display()),
        })?;
    }
    Ok(LedgerDb::open(&path.display().to_string()).await?)
}

/// Build the assistant with the provider named in the config.
pub async fn assistant_from_config(config: &AppConfig) -> ledgerclaw_core::Result<Assistant> {
    let router = ledgerclaw_providers::build_from_config(config);
    let provider = router.default().ok_or_else(|| {
        ProviderError::NotConfigured(format!(
            "Provider '{}' is not available",
            config.default_provider
        ))
    })?;
    assistant_with_provider(config, provider).await
}

/// Build the assistant around an already constructed provider.
pub async fn assistant_with_provider(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
) -> ledgerclaw_core::Result<Assistant> {
    config.validate()?;

    let history =
        ledgerclaw_memory::open_store(&config.history.backend, &config.history.resolved_path()).await?;
    let ledger = Arc::new(open_ledger(&config.ledger.resolved_path()).await?);

    let client: Arc<dyn BusinessClient> = Arc::new(DryRunClient::new());
    let tools = Arc::new(ledgerclaw_tools::default_registry(ledger.clone(), client.clone()));

    let prompt: Arc<dyn SystemPrompt> = match &config.agent.system_prompt_override {
        Some(text) => Arc::new(FixedPrompt(text.clone())),
        None => Arc::new(LedgerPrompt::new(ledger, client.is_simulated())),
    };

    let max_iterations = u32::try_from(config.agent.max_iterations).unwrap_or(u32::MAX);
    let agent = AgentLoop::new(
        provider,
        config.default_model.clone(),
        config.default_temperature,
        tools,
        Arc::new(EventBus::default()),
    )
    .with_max_iterations(max_iterations)
    .with_max_tokens(config.default_max_tokens);

    let ttl_secs = i64::try_from(config.agent.confirmation_ttl_secs).unwrap_or(i64::MAX);
    let ttl = chrono::Duration::try_seconds(ttl_secs).unwrap_or(chrono::Duration::MAX);

    info!(
        model = %config.default_model,
        history = %config.history.backend,
        simulated_writes = client.is_simulated(),
        "Assistant ready"
    );

    Ok(Assistant::new(agent, history, prompt)
        .with_history_limit(config.agent.history_limit)
        .with_rate_limit(
            config.rate_limit.max_requests,
            Duration::from_secs(config.rate_limit.window_secs),
        )
        .with_confirmation_ttl(ttl)
        .with_chunk_size(config.agent.stream_chunk_chars)
        .with_simulated_writes(client.is_simulated()))
}
