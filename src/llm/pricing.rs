//! Versioned pricing registry
//!
//! Per-tier USD rates per million tokens. The whole table is tagged with a
//! single version string exposed in the `X-Cost-Pricing-Version` header so
//! clients can correlate estimates with the rate sheet that produced them.

use lazy_static::lazy_static;
use std::collections::HashMap;

use super::ModelTier;

/// Version tag for the whole pricing table
pub const PRICING_VERSION: &str = "2026-07-01";

/// Pricing for one model tier, in USD per 1M tokens
#[derive(Debug, Clone)]
pub struct PricingEntry {
    pub input_per_1m: f64,
    pub output_per_1m: f64,
    /// Reasoning-token rate; billed at the output rate when absent
    pub reasoning_per_1m: Option<f64>,
    pub as_of: &'static str,
    pub source: &'static str,
    /// Rates marked estimated are provisional, not confirmed list prices
    pub estimated: bool,
}

lazy_static! {
    static ref PRICING_TABLE: HashMap<ModelTier, PricingEntry> = {
        let mut m = HashMap::new();
        m.insert(
            ModelTier::Sonnet46,
            PricingEntry {
                input_per_1m: 3.0,
                output_per_1m: 15.0,
                reasoning_per_1m: None,
                as_of: "2026-07-01",
                source: "anthropic.com/pricing",
                estimated: false,
            },
        );
        m.insert(
            ModelTier::Opus46,
            PricingEntry {
                input_per_1m: 15.0,
                output_per_1m: 75.0,
                reasoning_per_1m: None,
                as_of: "2026-07-01",
                source: "anthropic.com/pricing",
                estimated: false,
            },
        );
        m.insert(
            ModelTier::Haiku45,
            PricingEntry {
                input_per_1m: 0.8,
                output_per_1m: 4.0,
                reasoning_per_1m: None,
                as_of: "2026-07-01",
                source: "anthropic.com/pricing",
                estimated: false,
            },
        );
        m.insert(
            ModelTier::Gpt5Mini,
            PricingEntry {
                input_per_1m: 0.25,
                output_per_1m: 2.0,
                reasoning_per_1m: Some(2.0),
                as_of: "2026-07-01",
                source: "openai.com/api/pricing",
                estimated: true,
            },
        );
        m.insert(
            ModelTier::Gemini3Flash,
            PricingEntry {
                input_per_1m: 0.3,
                output_per_1m: 2.5,
                reasoning_per_1m: Some(2.5),
                as_of: "2026-07-01",
                source: "ai.google.dev/pricing",
                estimated: true,
            },
        );
        m.insert(
            ModelTier::Gemini31Pro,
            PricingEntry {
                input_per_1m: 2.0,
                output_per_1m: 12.0,
                reasoning_per_1m: Some(12.0),
                as_of: "2026-07-01",
                source: "ai.google.dev/pricing",
                estimated: true,
            },
        );
        m
    };
}

/// Look up pricing for a tier. `None` means the tier has no published rate
/// and cost computations must report an unknown rate rather than guess.
pub fn rate(tier: ModelTier) -> Option<&'static PricingEntry> {
    PRICING_TABLE.get(&tier)
}
