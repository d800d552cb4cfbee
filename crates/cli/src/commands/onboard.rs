//! `ledgerclaw onboard`: first-time setup.

use ledgerclaw_config::AppConfig;

pub async fn run(demo: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("LedgerClaw: First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\nConfig already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("Created config.toml at: {}", config_path.display());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let ledger_path = config.ledger.resolved_path();
    let ledger = ledgerclaw_agent::open_ledger(&ledger_path).await?;
    println!("Ledger database ready: {}", ledger_path.display());

    if demo {
        ledger.seed_demo().await?;
        let summary = ledger.summary().await?;
        println!(
            "Loaded demo data: {} invoices, {} contacts, {} products",
            summary.invoices, summary.contacts, summary.products
        );
    }

    if !config.has_api_key() {
        println!("\nNext steps:");
        println!("   1. Set ANTHROPIC_API_KEY or add api_key to {}", config_path.display());
        println!("   2. Run: ledgerclaw agent");
    }

    println!("\nSetup complete. Run `ledgerclaw agent` to start.\n");

    Ok(())
}
