//! Provider adapters
//!
//! One adapter per upstream provider, each owning its wire format, its
//! streaming endpoint call, and a delta extractor that reduces one parsed
//! upstream event to zero or more plain-text chunks. The set is closed:
//! adding a provider means a new registry entry and a new adapter case.

pub mod anthropic;
pub mod google;
pub mod openai;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::GatewayConfig;

use super::{GatewayError, GatewayResult, ImageAttachment, Message, Provider, ThinkingLevel};

pub use anthropic::AnthropicClient;
pub use google::GoogleClient;
pub use openai::OpenAIClient;

/// Converts one parsed upstream event payload into text deltas.
/// Non-content events yield an empty vector.
pub type DeltaExtractor = fn(&serde_json::Value) -> Vec<String>;

/// Raw upstream byte stream plus everything needed to normalize it
pub struct AdapterStream {
    pub bytes: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    pub extract_deltas: DeltaExtractor,
    pub effective_model_id: String,
    pub effective_thinking_level: ThinkingLevel,
}

/// Per-call knobs layered over the routing decision
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Overrides the decision's budget cap, used for debate worker caps
    pub max_output_tokens: Option<u32>,
    /// Requested Gemini thinking level; ignored by other providers
    pub thinking_level: ThinkingLevel,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            max_output_tokens: None,
            thinking_level: ThinkingLevel::High,
        }
    }
}

/// The adapter interface: build the provider request, open the streaming
/// endpoint, and hand back the byte stream with its extractor.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn call_stream(
        &self,
        model_id: &str,
        budget_cap: u32,
        messages: &[Message],
        images: &[ImageAttachment],
        opts: &CallOptions,
    ) -> GatewayResult<AdapterStream>;

    fn provider(&self) -> Provider;
}

/// The gateway's configured adapters, one slot per provider. A missing
/// slot means credentials were absent at start-up; the availability
/// normalizer keeps decisions away from those.
pub struct Adapters {
    anthropic: Option<AnthropicClient>,
    openai: Option<OpenAIClient>,
    google: Option<GoogleClient>,
}

impl Adapters {
    pub fn from_config(config: &Arc<GatewayConfig>) -> Self {
        let http = reqwest::Client::new();
        Self {
            anthropic: config
                .anthropic_api_key
                .clone()
                .map(|key| AnthropicClient::new(http.clone(), key)),
            openai: config
                .openai_api_key
                .clone()
                .map(|key| OpenAIClient::new(http.clone(), key)),
            google: config
                .google_api_key
                .clone()
                .map(|key| GoogleClient::new(http.clone(), key)),
        }
    }

    pub fn get(&self, provider: Provider) -> GatewayResult<&dyn ProviderClient> {
        let client: Option<&dyn ProviderClient> = match provider {
            Provider::Anthropic => self.anthropic.as_ref().map(|c| c as _),
            Provider::OpenAI => self.openai.as_ref().map(|c| c as _),
            Provider::Google => self.google.as_ref().map(|c| c as _),
        };
        client.ok_or(GatewayError::ProviderUnavailable {
            provider,
            reason: "no credentials configured".to_string(),
        })
    }

    /// The Google client, when configured; used by the alias resolver
    pub fn google(&self) -> Option<&GoogleClient> {
        self.google.as_ref()
    }
}

/// Map a non-2xx upstream response to the gateway error taxonomy
pub(crate) fn upstream_error(provider: Provider, status: u16, body: &str) -> GatewayError {
    GatewayError::Upstream {
        provider,
        details: format!("HTTP {}: {}", status, body),
    }
}

/// Map a transport failure to the gateway error taxonomy
pub(crate) fn network_error(provider: Provider, err: reqwest::Error) -> GatewayError {
    GatewayError::Upstream {
        provider,
        details: err.to_string(),
    }
}
