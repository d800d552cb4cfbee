//! HTTP API gateway for LedgerClaw.
//!
//! Exposes the assistant's client-facing operations as JSON and SSE
//! endpoints under `/v1`, plus an unauthenticated `/health` probe.
//!
//! Built on Axum.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::{Router, extract::State, http::HeaderValue, response::Json, routing::get};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, warn};

use ledgerclaw_agent::Assistant;
use ledgerclaw_config::AppConfig;

/// Maximum accepted request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the full router: `/health` plus the v1 API.
///
/// Layers applied:
/// - CORS restricted to the configured origin
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(assistant: Arc<Assistant>, cors_origin: &str) -> Router {
    let state = Arc::new(api_v1::ApiV1State::new(assistant));

    let origin = match cors_origin.parse::<HeaderValue>() {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            warn!(origin = %cors_origin, "Invalid CORS origin, falling back to localhost");
            AllowOrigin::exact(HeaderValue::from_static("http://localhost:8080"))
        }
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderName::from_static("x-client-id"),
        ]);

    Router::new()
        .route("/health", get(health_handler).with_state(state.clone()))
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Also runs a background task that sweeps expired confirmations every
/// `agent.sweep_interval_secs`.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let assistant = Arc::new(ledgerclaw_agent::assistant_from_config(&config).await?);
    spawn_sweeper(
        assistant.clone(),
        Duration::from_secs(config.agent.sweep_interval_secs.max(1)),
    );

    info!(
        addr = %addr,
        simulated_writes = assistant.writes_simulated(),
        "Gateway starting with v1 API"
    );
    let app = build_router(assistant, &config.gateway.cors_origin);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically drop confirmations nobody resolved in time.
pub fn spawn_sweeper(assistant: Arc<Assistant>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = assistant.sweep_expired();
            if removed > 0 {
                debug!(removed, "Swept expired confirmations");
            }
        }
    })
}

// --- Handlers ---

#[derive(Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: i64,
    pending_actions: usize,
    simulated_writes: bool,
}

async fn health_handler(State(state): State<api_v1::SharedApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: (chrono::Utc::now() - state.start_time).num_seconds(),
        pending_actions: state.assistant.pending_count(),
        simulated_writes: state.assistant.writes_simulated(),
    })
}
