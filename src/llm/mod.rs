//! LLM routing and streaming gateway core
//!
//! This module contains the provider-agnostic types shared by the routing
//! engine, the provider adapters, and the streaming normalizer, plus the
//! error taxonomy surfaced through the HTTP layer.

pub mod availability;
pub mod cost;
pub mod debate;
pub mod memory;
pub mod pricing;
pub mod providers;
pub mod registry;
pub mod routing;
pub mod sse;
pub mod tokens;
pub mod transforms;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Upstream providers the gateway can route to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Provider {
    Anthropic,
    OpenAI,
    Google,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Anthropic => write!(f, "anthropic"),
            Provider::OpenAI => write!(f, "openai"),
            Provider::Google => write!(f, "google"),
        }
    }
}

impl FromStr for Provider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "openai" | "gpt" => Ok(Provider::OpenAI),
            "google" | "gemini" => Ok(Provider::Google),
            _ => Err(()),
        }
    }
}

/// Stable internal model identifiers, independent of the providers'
/// concrete version strings. New tiers are added here and in the registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ModelTier {
    Sonnet46,
    Opus46,
    Haiku45,
    Gpt5Mini,
    Gemini3Flash,
    Gemini31Pro,
}

impl ModelTier {
    /// The stable tier key exposed in headers and accepted as an override.
    pub fn key(&self) -> &'static str {
        match self {
            ModelTier::Sonnet46 => "sonnet-4.6",
            ModelTier::Opus46 => "opus-4.6",
            ModelTier::Haiku45 => "haiku-4.5",
            ModelTier::Gpt5Mini => "gpt-5-mini",
            ModelTier::Gemini3Flash => "gemini-3-flash",
            ModelTier::Gemini31Pro => "gemini-3.1-pro",
        }
    }

    pub fn all() -> &'static [ModelTier] {
        &[
            ModelTier::Sonnet46,
            ModelTier::Opus46,
            ModelTier::Haiku45,
            ModelTier::Gpt5Mini,
            ModelTier::Gemini3Flash,
            ModelTier::Gemini31Pro,
        ]
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for ModelTier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelTier::all()
            .iter()
            .find(|t| t.key() == s)
            .copied()
            .ok_or(())
    }
}

/// Message roles in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single conversation turn. Immutable within a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Base64 image payload recorded on the message that carried it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image_data: None,
            media_type: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            image_data: None,
            media_type: None,
        }
    }
}

/// An image attached to the current request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    /// Base64-encoded bytes
    pub data: String,
    /// MIME type, e.g. `image/png`
    pub media_type: String,
}

/// Client platform, used as a routing input
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    Mobile,
}

/// Input to the routing decision engine
#[derive(Debug, Clone)]
pub struct RouterParams {
    pub user_query: String,
    pub current_session_tokens: u64,
    pub platform: Platform,
    pub history: Vec<Message>,
    pub images: Vec<ImageAttachment>,
    pub has_video_assets: bool,
}

/// The outcome of a routing decision.
///
/// `provider_model_id` and `budget_cap` are always derived from
/// `model_tier` through the model registry.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub provider: Provider,
    pub provider_model_id: String,
    pub model_tier: ModelTier,
    pub budget_cap: u32,
    pub rationale: String,
    pub complexity_score: u8,
}

/// Usage counters reported by an upstream provider after completion
#[derive(Debug, Clone, Default)]
pub struct UsageCounters {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub reasoning_tokens: Option<u64>,
}

/// Gemini thinking-level hint for flash-class models
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Low,
    High,
    /// Hint was dropped after the upstream rejected it
    None,
}

impl ThinkingLevel {
    pub fn header_value(&self) -> &'static str {
        match self {
            ThinkingLevel::Low => "low",
            ThinkingLevel::High => "high",
            ThinkingLevel::None => "n/a",
        }
    }
}

/// Error taxonomy surfaced through the HTTP layer
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conversation not owned by caller")]
    Forbidden,

    #[error("video assets not ready")]
    VideoNotReady,

    #[error("provider {provider} is not available: {reason}")]
    ProviderUnavailable { provider: Provider, reason: String },

    #[error("upstream error from {provider}: {details}")]
    Upstream { provider: Provider, details: String },

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("server misconfiguration: {0}")]
    ServerMisconfig(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_key_round_trip() {
        for tier in ModelTier::all() {
            assert_eq!(tier.key().parse::<ModelTier>().unwrap(), *tier);
        }
    }

    #[test]
    fn test_provider_display() {
        assert_eq!(Provider::Anthropic.to_string(), "anthropic");
        assert_eq!(Provider::OpenAI.to_string(), "openai");
        assert_eq!(Provider::Google.to_string(), "google");
    }

    #[test]
    fn test_unknown_tier_key() {
        assert!("sonnet-9".parse::<ModelTier>().is_err());
    }
}
