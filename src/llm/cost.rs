//! Cost estimation and reconciliation
//!
//! Pre-flight estimates run before the upstream call from the full prompt
//! context; final costs reconcile against the usage counters the provider
//! reported. Both read the versioned pricing registry and never guess when
//! a tier has no published rate.

use super::pricing::{self, PRICING_VERSION};
use super::tokens::{estimate_tokens, image_tokens};
use super::{ModelTier, UsageCounters};

/// Projected output is this fraction of the prompt, floored at 64 tokens
const OUTPUT_PROJECTION_RATIO: f64 = 0.35;
const OUTPUT_PROJECTION_FLOOR: u64 = 64;

/// A pre-flight cost estimate
#[derive(Debug, Clone)]
pub struct PreflightCost {
    pub prompt_tokens: u64,
    pub projected_output_tokens: u64,
    pub estimated_usd: f64,
    pub pricing_version: &'static str,
    pub has_unknown_rate: bool,
}

/// Final cost reconciled from provider usage counters
#[derive(Debug, Clone)]
pub struct FinalCost {
    pub total_usd: f64,
    pub pricing_version: &'static str,
    pub has_unknown_rate: bool,
}

/// Round to micro-dollar precision
fn round_usd(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Estimate the cost of a request before it is sent upstream.
pub fn preflight(
    tier: ModelTier,
    full_context_text: &str,
    image_count: usize,
    extra_prompt_tokens: u64,
) -> PreflightCost {
    let prompt_tokens =
        estimate_tokens(full_context_text) + image_tokens(image_count) + extra_prompt_tokens;
    let projected_output_tokens = OUTPUT_PROJECTION_FLOOR
        .max((prompt_tokens as f64 * OUTPUT_PROJECTION_RATIO).ceil() as u64);

    match pricing::rate(tier) {
        Some(entry) => {
            let estimated_usd = round_usd(
                entry.input_per_1m * prompt_tokens as f64 / 1e6
                    + entry.output_per_1m * projected_output_tokens as f64 / 1e6,
            );
            PreflightCost {
                prompt_tokens,
                projected_output_tokens,
                estimated_usd,
                pricing_version: PRICING_VERSION,
                has_unknown_rate: false,
            }
        }
        None => PreflightCost {
            prompt_tokens,
            projected_output_tokens,
            estimated_usd: 0.0,
            pricing_version: PRICING_VERSION,
            has_unknown_rate: true,
        },
    }
}

/// Compute the final cost from provider-reported usage counters.
pub fn final_cost(tier: ModelTier, usage: &UsageCounters) -> FinalCost {
    match pricing::rate(tier) {
        Some(entry) => {
            let reasoning_rate = entry.reasoning_per_1m.unwrap_or(entry.output_per_1m);
            let total = entry.input_per_1m * usage.prompt_tokens as f64 / 1e6
                + entry.output_per_1m * usage.completion_tokens as f64 / 1e6
                + reasoning_rate * usage.reasoning_tokens.unwrap_or(0) as f64 / 1e6;
            FinalCost {
                total_usd: round_usd(total),
                pricing_version: PRICING_VERSION,
                has_unknown_rate: false,
            }
        }
        None => FinalCost {
            total_usd: 0.0,
            pricing_version: PRICING_VERSION,
            has_unknown_rate: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preflight_prompt_token_identity() {
        let text = "explain the borrow checker in plain words";
        for images in [0usize, 1, 4] {
            let cost = preflight(ModelTier::Gemini3Flash, text, images, 0);
            assert_eq!(
                cost.prompt_tokens,
                estimate_tokens(text) + image_tokens(images)
            );
        }
    }

    #[test]
    fn test_preflight_extra_tokens_added() {
        let cost = preflight(ModelTier::Haiku45, "hi", 0, 250);
        assert_eq!(cost.prompt_tokens, estimate_tokens("hi") + 250);
    }

    #[test]
    fn test_projection_floor() {
        let cost = preflight(ModelTier::Gpt5Mini, "short", 0, 0);
        assert_eq!(cost.projected_output_tokens, 64);
    }

    #[test]
    fn test_projection_ratio_above_floor() {
        let long = "word ".repeat(2000);
        let cost = preflight(ModelTier::Opus46, &long, 0, 0);
        let expected = (cost.prompt_tokens as f64 * 0.35).ceil() as u64;
        assert_eq!(cost.projected_output_tokens, expected);
    }

    #[test]
    fn test_final_cost_reasoning_defaults_to_output_rate() {
        // Sonnet has no distinct reasoning rate
        let usage = UsageCounters {
            prompt_tokens: 1_000_000,
            completion_tokens: 0,
            reasoning_tokens: Some(1_000_000),
        };
        let cost = final_cost(ModelTier::Sonnet46, &usage);
        // 1M input @ $3 + 1M reasoning billed at the $15 output rate
        assert!((cost.total_usd - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_rounding_precision() {
        let usage = UsageCounters {
            prompt_tokens: 7,
            completion_tokens: 3,
            reasoning_tokens: None,
        };
        let cost = final_cost(ModelTier::Haiku45, &usage);
        let scaled = cost.total_usd * 1e6;
        assert!((scaled - scaled.round()).abs() < 1e-9);
    }
}
