// LLM Gateway server
// Run with: cargo run --bin server

use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use llm_gateway::api::{router, AppState};
use llm_gateway::auth::JwtAuthValidator;
use llm_gateway::config::GatewayConfig;
use llm_gateway::llm::providers::Adapters;
use llm_gateway::stores::InMemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        eprintln!("No .env file found; reading configuration from the environment");
    }

    let config = Arc::new(GatewayConfig::from_env());

    let default_filter = if config.dev_mode { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!("Starting LLM gateway");
    let readiness = config.readiness();
    info!(
        anthropic = readiness.anthropic,
        openai = readiness.openai,
        google = readiness.google,
        "provider readiness"
    );
    if !readiness.any_ready() {
        warn!("no provider is enabled with credentials; all chat requests will fail");
    }
    if config.auth_jwt_secret.is_empty() {
        warn!("AUTH_JWT_SECRET is empty; bearer validation will reject all tokens");
    }

    let store = Arc::new(InMemoryStore::new());
    let state = AppState {
        adapters: Arc::new(Adapters::from_config(&config)),
        auth: Arc::new(JwtAuthValidator::new(&config.auth_jwt_secret)),
        conversations: store.clone(),
        memory: store.clone(),
        videos: store,
        config: config.clone(),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(router(state).into_make_service())
        .await?;

    Ok(())
}
