//! HTTP layer
//!
//! Wires the chat endpoint, health check, and fallback into an axum
//! router with permissive CORS for browser clients.

pub mod handlers;
pub mod types;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

pub use handlers::AppState;

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/chat", post(handlers::chat))
        .fallback(handlers::not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
