//! `ledgerclaw gateway`: start the HTTP API server.

use ledgerclaw_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("LedgerClaw Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   CORS origin: {}", config.gateway.cors_origin);

    ledgerclaw_gateway::start(config).await?;

    Ok(())
}
