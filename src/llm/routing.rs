//! Routing decision engine
//!
//! Pure complexity scoring plus ordered decision rules. Nothing in here
//! performs I/O; the handler feeds it a `RouterParams` snapshot and gets a
//! `RouteDecision` back. Provider model ids and budget caps always come
//! from the model registry, keyed by the chosen tier.

use tracing::debug;

use super::registry;
use super::tokens::estimate_tokens;
use super::{ModelTier, RouteDecision, RouterParams};

/// Session-token ceiling above which the defensive fallback escalates
const FALLBACK_ESCALATION_TOKENS: u64 = 150_000;

/// Keywords that push the score toward heavier models
const COMPLEX_KEYWORDS: &[&str] = &[
    "analyze",
    "architecture",
    "architect",
    "algorithm",
    "benchmark",
    "concurrency",
    "debug",
    "derive",
    "design",
    "distributed",
    "in depth",
    "optimize",
    "performance",
    "prove",
    "refactor",
    "root cause",
    "security",
    "stack trace",
    "strategy",
    "trade-off",
    "tradeoff",
];

/// Keywords that signal a quick, cheap answer is wanted
const QUICK_KEYWORDS: &[&str] = &[
    "briefly",
    "define",
    "one line",
    "quick",
    "reword",
    "short answer",
    "simple",
    "summarize",
    "tl;dr",
    "tldr",
    "translate",
    "what is",
];

/// Inquiry terms counted for the question-density bump
const INQUIRY_TERMS: &[&str] = &[
    "why", "how", "what if", "could", "would", "should", "compare", "versus", "vs",
];

/// Language keywords counted as one code signal when any appears
const CODE_LANGUAGE_MARKERS: &[&str] = &[
    "fn ",
    "def ",
    "class ",
    "const ",
    "let ",
    "var ",
    "import ",
    "function",
    "impl ",
    "struct ",
    "typescript",
    "javascript",
    "python",
    "rust",
    "golang",
    "sql",
];

/// Error vocabulary counted as one code signal
const ERROR_VOCABULARY: &[&str] = &[
    "error",
    "exception",
    "panic",
    "segfault",
    "stack trace",
    "traceback",
    "undefined is not",
    "null pointer",
];

/// Markers of creative-writing requests
const CREATIVE_MARKERS: &[&str] = &[
    "story", "poem", "poetry", "fiction", "lyrics", "screenplay", "creative writing",
];

/// Structured-output markers eligible for the short-output discount
const STRUCTURED_OUTPUT_MARKERS: &[&str] = &["json", "list", "bullet", "table", "csv"];

/// Count how many code signals the query carries. Fences, language
/// keywords, brace density, and error vocabulary are one signal each.
fn code_signals(query_lower: &str) -> u32 {
    let mut signals = 0;
    if query_lower.contains("```") {
        signals += 1;
    }
    if CODE_LANGUAGE_MARKERS.iter().any(|k| query_lower.contains(k)) {
        signals += 1;
    }
    let brace_chars = query_lower
        .chars()
        .filter(|c| matches!(c, '{' | '}' | '(' | ')' | ';' | '='))
        .count();
    if brace_chars >= 4 {
        signals += 1;
    }
    if ERROR_VOCABULARY.iter().any(|k| query_lower.contains(k)) {
        signals += 1;
    }
    signals
}

/// Compute the complexity score for a query, clamped to [0, 100].
pub fn complexity_score(params: &RouterParams) -> u8 {
    let query_lower = params.user_query.to_lowercase();
    let query_tokens = estimate_tokens(&params.user_query);
    let mut score: i32 = 50;

    // Query length bands
    if query_tokens < 20 {
        score -= 20;
    } else if query_tokens < 50 {
        score -= 10;
    } else if query_tokens > 500 {
        score += 15;
    } else if query_tokens > 200 {
        score += 10;
    }

    // Keyword buckets, capped in each direction
    let complex_hits = COMPLEX_KEYWORDS
        .iter()
        .filter(|k| query_lower.contains(*k))
        .count() as i32;
    score += (complex_hits * 5).min(25);

    let quick_hits = QUICK_KEYWORDS
        .iter()
        .filter(|k| query_lower.contains(*k))
        .count() as i32;
    score -= (quick_hits * 5).min(15);

    // Inquiry density
    let inquiry_hits: usize = INQUIRY_TERMS
        .iter()
        .map(|term| query_lower.matches(term).count())
        .sum();
    if inquiry_hits >= 3 {
        score += 15;
    } else if inquiry_hits >= 2 {
        score += 8;
    }

    // Code signals
    let signals = code_signals(&query_lower);
    if signals >= 3 {
        score += 15;
    } else if signals >= 2 {
        score += 10;
    }

    // Accumulated session context
    if params.current_session_tokens > 100_000 {
        score += 10;
    } else if params.current_session_tokens > 50_000 {
        score += 5;
    }

    // Short structured-output requests are cheap to serve
    if query_tokens < 100
        && STRUCTURED_OUTPUT_MARKERS
            .iter()
            .any(|k| query_lower.contains(k))
    {
        score -= 10;
    }

    // Creative writing sits in a narrow mid band regardless of length
    if CREATIVE_MARKERS.iter().any(|k| query_lower.contains(k)) {
        score = score.clamp(50, 65);
    }

    score.clamp(0, 100) as u8
}

/// True when the query reads like a code task
pub fn is_code_heavy(query: &str) -> bool {
    code_signals(&query.to_lowercase()) >= 2
}

fn decision(tier: ModelTier, rationale: &str, score: u8) -> RouteDecision {
    let entry = registry::entry(tier);
    RouteDecision {
        provider: entry.provider,
        provider_model_id: entry.provider_model_id.to_string(),
        model_tier: tier,
        budget_cap: entry.budget_cap,
        rationale: rationale.to_string(),
        complexity_score: score,
    }
}

/// Map routing inputs to a decision. First matching rule wins.
pub fn determine_route(params: &RouterParams, manual_override: Option<ModelTier>) -> RouteDecision {
    let score = complexity_score(params);
    let query_tokens = estimate_tokens(&params.user_query);
    let total = params.current_session_tokens;

    if let Some(tier) = manual_override {
        return decision(tier, "manual-override", score);
    }

    if params.has_video_assets {
        return decision(ModelTier::Gemini31Pro, "video-default-pro", score);
    }

    if !params.images.is_empty() {
        return if score >= 70 || total >= 60_000 {
            decision(ModelTier::Gemini31Pro, "images-complex", score)
        } else if score <= 30 && total < 30_000 {
            decision(ModelTier::Gemini3Flash, "images-fast", score)
        } else {
            decision(ModelTier::Gemini3Flash, "images-default-flash", score)
        };
    }

    if is_code_heavy(&params.user_query) && score >= 45 && total < 90_000 {
        return decision(ModelTier::Sonnet46, "code-quality-priority", score);
    }
    if score >= 80 || total > 100_000 {
        return decision(ModelTier::Opus46, "high-complexity", score);
    }
    if score <= 18 && query_tokens < 80 && total < 12_000 {
        return decision(ModelTier::Gpt5Mini, "ultra-low-latency", score);
    }
    if score <= 25 && query_tokens < 100 && total < 10_000 {
        return decision(ModelTier::Haiku45, "low-complexity", score);
    }

    let d = decision(ModelTier::Gemini3Flash, "default-cost-optimized", score);
    debug!(score, total, "route defaulted to cost-optimized tier");
    d
}

/// Defensive fallback used when routing inputs are unusable. Escalates for
/// very large sessions so long conversations are not dropped onto a
/// small-context tier.
pub fn fallback_route(total_session_tokens: u64) -> RouteDecision {
    if total_session_tokens > FALLBACK_ESCALATION_TOKENS {
        decision(ModelTier::Opus46, "high-complexity", 50)
    } else {
        decision(ModelTier::Gemini3Flash, "default-cost-optimized", 50)
    }
}

/// Legacy tier strings still accepted as overrides
const OVERRIDE_ALIASES: &[(&str, ModelTier)] = &[
    ("sonnet-4.5", ModelTier::Sonnet46),
    ("sonnet-4", ModelTier::Sonnet46),
    ("opus-4.5", ModelTier::Opus46),
    ("opus-4.1", ModelTier::Opus46),
    ("haiku-4", ModelTier::Haiku45),
    ("gpt-4o-mini", ModelTier::Gpt5Mini),
    ("gpt-4.1-mini", ModelTier::Gpt5Mini),
    ("gemini-2.5-flash", ModelTier::Gemini3Flash),
    ("gemini-2.5-pro", ModelTier::Gemini31Pro),
];

/// Normalize a manual model override to a tier.
///
/// Accepts exact tier keys, `provider:tier` qualified forms, legacy alias
/// strings, and loose natural-language fragments. Unknown input yields
/// `None` and routing proceeds automatically; this function never fails.
pub fn normalize_override(raw: &str) -> Option<ModelTier> {
    let cleaned = raw.trim().to_lowercase();
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(tier) = cleaned.parse::<ModelTier>() {
        return Some(tier);
    }

    if let Some((_, alias_tier)) = OVERRIDE_ALIASES.iter().find(|(alias, _)| *alias == cleaned) {
        return Some(*alias_tier);
    }

    // provider-qualified form, e.g. "anthropic:sonnet-4.6"
    if let Some((prefix, rest)) = cleaned.split_once(':') {
        if prefix.parse::<super::Provider>().is_ok() {
            return normalize_override(rest);
        }
    }

    // Loose natural-language fragments, most specific family first
    if cleaned.contains("opus") {
        return Some(ModelTier::Opus46);
    }
    if cleaned.contains("sonnet") {
        return Some(ModelTier::Sonnet46);
    }
    if cleaned.contains("haiku") {
        return Some(ModelTier::Haiku45);
    }
    if cleaned.contains("gemini") {
        if cleaned.contains("pro") {
            return Some(ModelTier::Gemini31Pro);
        }
        if cleaned.contains("flash") {
            return Some(ModelTier::Gemini3Flash);
        }
        return None;
    }
    if cleaned.contains("gpt") && cleaned.contains("mini") {
        return Some(ModelTier::Gpt5Mini);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ImageAttachment, Platform};

    fn params(query: &str, session_tokens: u64) -> RouterParams {
        RouterParams {
            user_query: query.to_string(),
            current_session_tokens: session_tokens,
            platform: Platform::Web,
            history: Vec::new(),
            images: Vec::new(),
            has_video_assets: false,
        }
    }

    fn png() -> ImageAttachment {
        ImageAttachment {
            data: "aGVsbG8=".to_string(),
            media_type: "image/png".to_string(),
        }
    }

    #[test]
    fn test_score_always_in_range() {
        let inputs = [
            "",
            "hi",
            "why how what if could would should compare versus vs",
            &"complex analyze optimize refactor debug design ".repeat(100),
            "tl;dr define quick short simple",
        ];
        for q in inputs {
            let score = complexity_score(&params(q, 0));
            assert!(score <= 100);
        }
    }

    #[test]
    fn test_creative_clamp() {
        let score = complexity_score(&params("Write a short story about a lighthouse.", 0));
        assert!((50..=65).contains(&score), "got {}", score);
    }

    #[test]
    fn test_hello_world_defaults_to_flash() {
        let d = determine_route(&params("Hello, world!", 0), None);
        assert_eq!(d.model_tier, ModelTier::Gemini3Flash);
        assert_eq!(d.rationale, "default-cost-optimized");
    }

    #[test]
    fn test_code_query_routes_to_sonnet() {
        let q = "Please debug this TypeScript and explain the stack trace: ```ts const x=()=>{}```";
        let d = determine_route(&params(q, 0), None);
        assert_eq!(d.model_tier, ModelTier::Sonnet46);
        assert_eq!(d.rationale, "code-quality-priority");
    }

    #[test]
    fn test_long_session_escalates_to_opus() {
        let d = determine_route(&params("Summarize.", 155_000), None);
        assert_eq!(d.model_tier, ModelTier::Opus46);
        assert_eq!(d.rationale, "high-complexity");
    }

    #[test]
    fn test_images_complex_at_60k_session() {
        let mut p = params("Analyze", 60_000);
        p.images.push(png());
        let d = determine_route(&p, None);
        assert_eq!(d.model_tier, ModelTier::Gemini31Pro);
        assert_eq!(d.rationale, "images-complex");
    }

    #[test]
    fn test_images_fast_for_simple_queries() {
        let mut p = params("What is this?", 0);
        p.images.push(png());
        let d = determine_route(&p, None);
        assert_eq!(d.model_tier, ModelTier::Gemini3Flash);
        assert_eq!(d.rationale, "images-fast");
    }

    #[test]
    fn test_quick_define_routes_to_haiku() {
        let d = determine_route(&params("Quick define.", 0), None);
        assert_eq!(d.model_tier, ModelTier::Haiku45);
        assert_eq!(d.rationale, "low-complexity");
    }

    #[test]
    fn test_video_overrides_everything_but_manual() {
        let mut p = params("quick question", 0);
        p.has_video_assets = true;
        let d = determine_route(&p, None);
        assert_eq!(d.model_tier, ModelTier::Gemini31Pro);
        assert_eq!(d.rationale, "video-default-pro");

        let d = determine_route(&p, Some(ModelTier::Haiku45));
        assert_eq!(d.model_tier, ModelTier::Haiku45);
        assert_eq!(d.rationale, "manual-override");
    }

    #[test]
    fn test_decision_fields_come_from_registry() {
        let d = determine_route(&params("Hello, world!", 0), None);
        let entry = registry::entry(d.model_tier);
        assert_eq!(d.provider_model_id, entry.provider_model_id);
        assert_eq!(d.budget_cap, entry.budget_cap);
        assert_eq!(d.provider, entry.provider);
    }

    #[test]
    fn test_fallback_escalation_boundary() {
        let low = fallback_route(149_999);
        assert_eq!(low.model_tier, ModelTier::Gemini3Flash);
        assert_eq!(low.rationale, "default-cost-optimized");

        let high = fallback_route(150_001);
        assert_eq!(high.model_tier, ModelTier::Opus46);
        assert_eq!(high.rationale, "high-complexity");
    }

    #[test]
    fn test_override_exact_keys() {
        assert_eq!(normalize_override("sonnet-4.6"), Some(ModelTier::Sonnet46));
        assert_eq!(
            normalize_override("GEMINI-3-FLASH"),
            Some(ModelTier::Gemini3Flash)
        );
    }

    #[test]
    fn test_override_qualified_and_aliases() {
        assert_eq!(
            normalize_override("anthropic:opus-4.6"),
            Some(ModelTier::Opus46)
        );
        assert_eq!(normalize_override("sonnet-4.5"), Some(ModelTier::Sonnet46));
        assert_eq!(
            normalize_override("gemini-2.5-pro"),
            Some(ModelTier::Gemini31Pro)
        );
    }

    #[test]
    fn test_override_natural_language() {
        assert_eq!(
            normalize_override("use gemini 3 flash"),
            Some(ModelTier::Gemini3Flash)
        );
        assert_eq!(normalize_override("gpt mini"), Some(ModelTier::Gpt5Mini));
    }

    #[test]
    fn test_override_unknown_returns_none() {
        assert_eq!(normalize_override("llama-9000"), None);
        assert_eq!(normalize_override(""), None);
    }

    #[test]
    fn test_override_idempotent() {
        for raw in ["sonnet-4.5", "use gemini 3 flash", "OPUS-4.6", "garbage"] {
            let once = normalize_override(raw);
            if let Some(tier) = once {
                assert_eq!(normalize_override(tier.key()), Some(tier));
            }
        }
    }
}
