//! Model registry
//!
//! Maps each stable model tier to its concrete provider model id, output
//! budget cap, and image capability. Process-wide constant, initialized at
//! start-up. Routing decisions must derive `provider_model_id` and
//! `budget_cap` from here and nowhere else.

use lazy_static::lazy_static;
use std::collections::HashMap;

use super::{ModelTier, Provider};

/// Registry entry for one model tier
#[derive(Debug, Clone)]
pub struct ModelRegistryEntry {
    pub provider: Provider,
    pub provider_model_id: &'static str,
    pub budget_cap: u32,
    pub supports_images: bool,
}

lazy_static! {
    static ref MODEL_REGISTRY: HashMap<ModelTier, ModelRegistryEntry> = {
        let mut m = HashMap::new();
        m.insert(
            ModelTier::Sonnet46,
            ModelRegistryEntry {
                provider: Provider::Anthropic,
                provider_model_id: "claude-sonnet-4-6",
                budget_cap: 8192,
                supports_images: true,
            },
        );
        m.insert(
            ModelTier::Opus46,
            ModelRegistryEntry {
                provider: Provider::Anthropic,
                provider_model_id: "claude-opus-4-6",
                budget_cap: 16384,
                supports_images: true,
            },
        );
        m.insert(
            ModelTier::Haiku45,
            ModelRegistryEntry {
                provider: Provider::Anthropic,
                provider_model_id: "claude-haiku-4-5",
                budget_cap: 4096,
                supports_images: true,
            },
        );
        m.insert(
            ModelTier::Gpt5Mini,
            ModelRegistryEntry {
                provider: Provider::OpenAI,
                provider_model_id: "gpt-5-mini",
                budget_cap: 4096,
                supports_images: true,
            },
        );
        m.insert(
            ModelTier::Gemini3Flash,
            ModelRegistryEntry {
                provider: Provider::Google,
                provider_model_id: "gemini-3-flash",
                budget_cap: 8192,
                supports_images: true,
            },
        );
        m.insert(
            ModelTier::Gemini31Pro,
            ModelRegistryEntry {
                provider: Provider::Google,
                provider_model_id: "gemini-3.1-pro",
                budget_cap: 16384,
                supports_images: true,
            },
        );
        m
    };
}

/// Look up the registry entry for a tier. Every tier has one.
pub fn entry(tier: ModelTier) -> &'static ModelRegistryEntry {
    MODEL_REGISTRY
        .get(&tier)
        .expect("model registry covers every tier")
}
