//! Provider availability normalization
//!
//! A provider is ready when it is both enabled by configuration and has
//! credentials present. Decisions that land on an unready provider are
//! re-targeted to the first ready entry of a fixed fallback ladder, unless
//! the decision came from an explicit manual override, which fails loudly
//! instead.

use tracing::warn;

use super::registry;
use super::{GatewayError, GatewayResult, ModelTier, Provider, RouteDecision};

/// Readiness snapshot for the three providers, taken from configuration
/// once at start-up.
#[derive(Debug, Clone, Copy)]
pub struct ProviderReadiness {
    pub anthropic: bool,
    pub openai: bool,
    pub google: bool,
}

impl ProviderReadiness {
    pub fn is_ready(&self, provider: Provider) -> bool {
        match provider {
            Provider::Anthropic => self.anthropic,
            Provider::OpenAI => self.openai,
            Provider::Google => self.google,
        }
    }

    pub fn any_ready(&self) -> bool {
        self.anthropic || self.openai || self.google
    }
}

/// Fallback ladder: first ready entry wins
const FALLBACK_LADDER: &[(Provider, ModelTier)] = &[
    (Provider::Google, ModelTier::Gemini3Flash),
    (Provider::OpenAI, ModelTier::Gpt5Mini),
    (Provider::Anthropic, ModelTier::Sonnet46),
];

/// Replace a decision targeting an unready provider with a safe fallback.
///
/// Manual overrides are never silently re-targeted; pointing an override at
/// a provider without credentials is a caller error.
pub fn normalize_decision(
    decision: RouteDecision,
    readiness: &ProviderReadiness,
    from_manual_override: bool,
) -> GatewayResult<RouteDecision> {
    if !readiness.any_ready() {
        return Err(GatewayError::ServerMisconfig(
            "no upstream provider is enabled with credentials".to_string(),
        ));
    }

    if readiness.is_ready(decision.provider) {
        return Ok(decision);
    }

    if from_manual_override {
        return Err(GatewayError::ProviderUnavailable {
            provider: decision.provider,
            reason: "requested via model override but not configured".to_string(),
        });
    }

    let original_provider = decision.provider;
    for (provider, tier) in FALLBACK_LADDER {
        if readiness.is_ready(*provider) {
            let entry = registry::entry(*tier);
            warn!(
                from = %original_provider,
                to = %provider,
                "provider unavailable, re-targeting decision"
            );
            return Ok(RouteDecision {
                provider: *provider,
                provider_model_id: entry.provider_model_id.to_string(),
                model_tier: *tier,
                budget_cap: entry.budget_cap,
                rationale: format!("provider-unavailable-fallback-{}", original_provider),
                complexity_score: decision.complexity_score,
            });
        }
    }

    // any_ready() held above, so the ladder cannot be exhausted
    Err(GatewayError::ServerMisconfig(
        "fallback ladder exhausted".to_string(),
    ))
}
