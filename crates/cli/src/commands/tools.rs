//! `ledgerclaw tools`: print the tool catalog.

use ledgerclaw_config::AppConfig;
use ledgerclaw_core::tool::ToolSpec;
use std::sync::Arc;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let ledger = Arc::new(ledgerclaw_agent::open_ledger(&config.ledger.resolved_path()).await?);
    let registry = ledgerclaw_tools::default_registry(ledger, Arc::new(ledgerclaw_tools::DryRunClient::new()));

    println!("Tools ({})", registry.len());
    println!("=========");
    for line in catalog_lines(&registry.catalog()) {
        println!("{line}");
    }

    Ok(())
}

pub fn catalog_lines(specs: &[ToolSpec]) -> Vec<String> {
    let width = specs.iter().map(|s| s.name.len()).max().unwrap_or(0);
    specs
        .iter()
        .map(|spec| {
            let mark = if spec.is_mutating() { "confirm" } else { "read" };
            let summary = spec.description.lines().next().unwrap_or_default();
            format!("  {:<width$}  [{mark:<7}]  {summary}", spec.name)
        })
        .collect()
}
