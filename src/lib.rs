//! Multi-provider LLM request router and streaming gateway
//!
//! Accepts authenticated chat requests, selects the most appropriate model
//! across Anthropic, OpenAI, and Google, invokes the provider's streaming
//! API, and returns a provider-agnostic SSE stream plus a stable set of
//! routing metadata headers. Messages are persisted around the stream,
//! per-user memory summaries are maintained asynchronously, and every
//! request carries a pre-flight cost estimate.
//!
//! Module map:
//! - [`llm`]: routing engine, provider adapters, SSE normalizer, debate
//!   orchestration, memory, cost
//! - [`api`]: the HTTP surface and header contract
//! - [`stores`]: collaborator persistence interfaces
//! - [`auth`]: bearer token validation
//! - [`config`]: environment configuration, read once at start-up

pub mod api;
pub mod auth;
pub mod config;
pub mod llm;
pub mod stores;

pub use api::{router, AppState};
pub use config::GatewayConfig;
