//! Debate Mode orchestration
//!
//! A bounded fan-out of cheap "challenger" calls whose critiques are folded
//! into a single synthesis prompt for the primary model. Challengers run in
//! parallel with per-stage timeouts and independent cancellation; a
//! challenger that times out or errors simply contributes nothing. If every
//! challenger comes back empty the request silently falls through to the
//! normal single-provider path.

use futures::future::join_all;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::GatewayConfig;

use super::availability::ProviderReadiness;
use super::providers::{Adapters, CallOptions};
use super::registry;
use super::sse::collect_stream_text;
use super::{Message, ModelTier, ThinkingLevel};

/// Closed set of debate profiles; unrecognized input means no debate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebateProfile {
    General,
    Code,
    VideoUi,
}

impl DebateProfile {
    pub fn key(&self) -> &'static str {
        match self {
            DebateProfile::General => "general",
            DebateProfile::Code => "code",
            DebateProfile::VideoUi => "video_ui",
        }
    }
}

impl FromStr for DebateProfile {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(DebateProfile::General),
            "code" => Ok(DebateProfile::Code),
            "video_ui" => Ok(DebateProfile::VideoUi),
            _ => Err(()),
        }
    }
}

/// How the debate was activated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebateTrigger {
    Explicit,
    Auto,
}

impl DebateTrigger {
    pub fn header_value(&self) -> &'static str {
        match self {
            DebateTrigger::Explicit => "explicit",
            DebateTrigger::Auto => "auto",
        }
    }
}

/// One challenger slot in a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenger {
    pub role: String,
    pub tier: ModelTier,
}

/// A selected debate plan
#[derive(Debug, Clone)]
pub struct DebatePlan {
    pub profile: DebateProfile,
    pub challengers: Vec<Challenger>,
    pub max_challenger_chars: usize,
}

/// A challenger's clamped critique
#[derive(Debug, Clone)]
pub struct ChallengerOutput {
    pub role: String,
    pub tier: ModelTier,
    pub text: String,
}

/// The result of a debate round that produced at least one critique
#[derive(Debug, Clone)]
pub struct DebateSynthesis {
    pub profile: DebateProfile,
    pub trigger: DebateTrigger,
    pub outputs: Vec<ChallengerOutput>,
    /// The composite prompt replacing the user message
    pub composite_query: String,
}

/// Whether a debate request is eligible to run at all.
///
/// Generic profiles refuse media entirely; video review requires ready
/// video and no images, and can only be requested explicitly.
pub fn is_eligible(
    profile: DebateProfile,
    trigger: DebateTrigger,
    has_images: bool,
    has_video: bool,
) -> bool {
    match profile {
        DebateProfile::General | DebateProfile::Code => !has_images && !has_video,
        DebateProfile::VideoUi => {
            has_video && !has_images && trigger == DebateTrigger::Explicit
        }
    }
}

fn dedup_challengers(challengers: Vec<Challenger>) -> Vec<Challenger> {
    let mut seen: Vec<(String, ModelTier)> = Vec::new();
    challengers
        .into_iter()
        .filter(|c| {
            let key = (c.role.clone(), c.tier);
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        })
        .collect()
}

/// Select the challenger panel for a profile.
///
/// Generic profiles never field a challenger on the primary's own tier;
/// video review always runs on the Google pro family (or the configured
/// ladder override).
pub fn get_debate_plan(
    profile: DebateProfile,
    primary_tier: ModelTier,
    config: &GatewayConfig,
) -> DebatePlan {
    match profile {
        DebateProfile::General => {
            let challengers = vec![
                Challenger {
                    role: "Skeptic".to_string(),
                    tier: ModelTier::Gpt5Mini,
                },
                Challenger {
                    role: "Synthesist".to_string(),
                    tier: ModelTier::Gemini3Flash,
                },
            ];
            let challengers: Vec<_> = dedup_challengers(challengers)
                .into_iter()
                .filter(|c| c.tier != primary_tier)
                .take(2)
                .collect();
            DebatePlan {
                profile,
                challengers,
                max_challenger_chars: 2000,
            }
        }
        DebateProfile::Code => {
            let challengers = vec![
                Challenger {
                    role: "Critic".to_string(),
                    tier: ModelTier::Gpt5Mini,
                },
                Challenger {
                    role: "Implementer".to_string(),
                    tier: ModelTier::Haiku45,
                },
            ];
            let challengers: Vec<_> = dedup_challengers(challengers)
                .into_iter()
                .filter(|c| c.tier != primary_tier)
                .take(2)
                .collect();
            DebatePlan {
                profile,
                challengers,
                max_challenger_chars: 2400,
            }
        }
        DebateProfile::VideoUi => {
            let roles = ["UI Designer Critic", "Product QA/UX", "Customer Persona"];
            let ladder = video_ui_ladder(config);
            let challengers = roles
                .iter()
                .enumerate()
                .map(|(i, role)| Challenger {
                    role: role.to_string(),
                    tier: ladder[i % ladder.len()],
                })
                .collect();
            DebatePlan {
                profile,
                challengers: dedup_challengers(challengers).into_iter().take(3).collect(),
                max_challenger_chars: 1800,
            }
        }
    }
}

/// Google tiers used for video review challengers, overridable via
/// `DEBATE_VIDEO_UI_MODEL_LADDER`
fn video_ui_ladder(config: &GatewayConfig) -> Vec<ModelTier> {
    let ladder: Vec<ModelTier> = config
        .debate_video_ui_model_ladder
        .iter()
        .filter_map(|raw| super::routing::normalize_override(raw))
        .filter(|tier| registry::entry(*tier).provider == super::Provider::Google)
        .collect();
    if ladder.is_empty() {
        vec![ModelTier::Gemini31Pro]
    } else {
        ladder
    }
}

/// Per-challenger wall clock for a profile
fn stage_timeout(profile: DebateProfile, config: &GatewayConfig) -> Duration {
    match profile {
        DebateProfile::General => Duration::from_secs(10),
        DebateProfile::Code => Duration::from_secs(12),
        DebateProfile::VideoUi => {
            Duration::from_millis(config.debate_video_ui_stage_timeout_ms)
        }
    }
}

/// Per-challenger output token cap for a profile
fn worker_token_cap(profile: DebateProfile, config: &GatewayConfig) -> u32 {
    match profile {
        DebateProfile::General => config.debate_worker_max_tokens_general,
        DebateProfile::Code => config.debate_worker_max_tokens_code,
        DebateProfile::VideoUi => config.debate_worker_max_tokens_video_ui,
    }
}

/// Clamp a critique to the plan's character budget on a char boundary
pub fn clamp_output(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

/// Build one challenger's prompt from its role directive and the query
pub fn challenger_prompt(role: &str, query: &str) -> String {
    format!(
        "You are the {} on a small review panel. Critique the request below \
         from that perspective in a few concise paragraphs. Be specific and \
         direct; do not produce the final answer yourself.\n\nRequest:\n{}",
        role, query
    )
}

/// Build the composite synthesis prompt from the original query and the
/// challengers' critiques, listed in plan order.
pub fn synthesis_prompt(query: &str, outputs: &[ChallengerOutput]) -> String {
    let mut prompt = String::from(query);
    prompt.push_str("\n\nTEAM DEBATE NOTES\n");
    for output in outputs {
        prompt.push_str(&format!(
            "\n[{} - {}]\n{}\n",
            output.role,
            output.tier.key(),
            output.text
        ));
    }
    prompt.push_str(
        "\nUse the debate notes above as critique from your team, then answer \
         the original request with your own judgment.",
    );
    prompt
}

/// Run the challenger fan-out and assemble the synthesis prompt.
///
/// Returns `None` when every challenger produced nothing, which callers
/// treat as a silent fall-through to the normal single-provider path.
pub async fn run_debate(
    adapters: &Adapters,
    readiness: &ProviderReadiness,
    plan: &DebatePlan,
    trigger: DebateTrigger,
    query: &str,
    config: &GatewayConfig,
    cancel: &CancellationToken,
) -> Option<DebateSynthesis> {
    let timeout = stage_timeout(plan.profile, config);
    let token_cap = worker_token_cap(plan.profile, config);

    let mut handles = Vec::new();
    for challenger in &plan.challengers {
        let entry = registry::entry(challenger.tier);
        if !readiness.is_ready(entry.provider) {
            debug!(tier = challenger.tier.key(), "skipping unready challenger");
            handles.push(None);
            continue;
        }
        let client = match adapters.get(entry.provider) {
            Ok(client) => client,
            Err(_) => {
                handles.push(None);
                continue;
            }
        };

        let prompt = challenger_prompt(&challenger.role, query);
        let messages = vec![Message::user(prompt)];
        let opts = CallOptions {
            max_output_tokens: Some(token_cap.min(entry.budget_cap)),
            thinking_level: ThinkingLevel::Low,
        };
        let child_cancel = cancel.child_token();
        let model_id = entry.provider_model_id.to_string();
        let budget_cap = entry.budget_cap;

        handles.push(Some(async move {
            let call = async {
                let stream = client
                    .call_stream(&model_id, budget_cap, &messages, &[], &opts)
                    .await?;
                collect_stream_text(stream).await
            };
            tokio::select! {
                _ = child_cancel.cancelled() => None,
                result = tokio::time::timeout(timeout, call) => match result {
                    Ok(Ok(text)) => Some(text),
                    Ok(Err(e)) => {
                        warn!("challenger call failed: {}", e);
                        None
                    }
                    Err(_) => {
                        debug!("challenger timed out");
                        None
                    }
                },
            }
        }));
    }

    // Join in plan order so the synthesis notes are deterministic no
    // matter which challenger finished first
    let results = join_all(handles.into_iter().map(|h| async move {
        match h {
            Some(fut) => fut.await,
            None => None,
        }
    }))
    .await;

    let outputs: Vec<ChallengerOutput> = plan
        .challengers
        .iter()
        .zip(results)
        .filter_map(|(challenger, text)| {
            let text = text?;
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            Some(ChallengerOutput {
                role: challenger.role.clone(),
                tier: challenger.tier,
                text: clamp_output(trimmed, plan.max_challenger_chars),
            })
        })
        .collect();

    if outputs.is_empty() {
        debug!("all challengers empty, falling back to single-provider path");
        return None;
    }

    let composite_query = synthesis_prompt(query, &outputs);
    Some(DebateSynthesis {
        profile: plan.profile,
        trigger,
        outputs,
        composite_query,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GatewayConfig {
        GatewayConfig::for_tests()
    }

    #[test]
    fn test_profile_parsing_is_closed() {
        assert_eq!("general".parse(), Ok(DebateProfile::General));
        assert_eq!("code".parse(), Ok(DebateProfile::Code));
        assert_eq!("video_ui".parse(), Ok(DebateProfile::VideoUi));
        assert!("adversarial".parse::<DebateProfile>().is_err());
    }

    #[test]
    fn test_general_plan_excludes_primary_tier() {
        let plan = get_debate_plan(DebateProfile::General, ModelTier::Gpt5Mini, &config());
        assert!(plan.challengers.iter().all(|c| c.tier != ModelTier::Gpt5Mini));
        assert!(plan.challengers.len() <= 2);
        assert_eq!(plan.max_challenger_chars, 2000);
    }

    #[test]
    fn test_code_plan_composition() {
        let plan = get_debate_plan(DebateProfile::Code, ModelTier::Sonnet46, &config());
        assert_eq!(plan.challengers.len(), 2);
        assert_eq!(plan.challengers[0].role, "Critic");
        assert_eq!(plan.challengers[1].tier, ModelTier::Haiku45);
        assert_eq!(plan.max_challenger_chars, 2400);
    }

    #[test]
    fn test_video_ui_plan_all_google() {
        let plan = get_debate_plan(DebateProfile::VideoUi, ModelTier::Gemini31Pro, &config());
        assert_eq!(plan.challengers.len(), 3);
        for challenger in &plan.challengers {
            assert_eq!(
                registry::entry(challenger.tier).provider,
                crate::llm::Provider::Google
            );
        }
        assert_eq!(plan.max_challenger_chars, 1800);
    }

    #[test]
    fn test_eligibility_gates() {
        use DebateProfile::*;
        use DebateTrigger::*;
        assert!(is_eligible(General, Explicit, false, false));
        assert!(!is_eligible(General, Explicit, true, false));
        assert!(!is_eligible(Code, Auto, false, true));
        assert!(is_eligible(VideoUi, Explicit, false, true));
        assert!(!is_eligible(VideoUi, Explicit, true, true));
        assert!(!is_eligible(VideoUi, Auto, false, true));
        assert!(!is_eligible(VideoUi, Explicit, false, false));
    }

    #[test]
    fn test_clamp_output() {
        assert_eq!(clamp_output("short", 10), "short");
        assert_eq!(clamp_output("0123456789abc", 10), "0123456789");
        // Clamping on char boundaries, not bytes
        assert_eq!(clamp_output("ééééé", 3), "ééé");
    }

    #[test]
    fn test_synthesis_prompt_lists_outputs_in_order() {
        let outputs = vec![
            ChallengerOutput {
                role: "Skeptic".to_string(),
                tier: ModelTier::Gpt5Mini,
                text: "first critique".to_string(),
            },
            ChallengerOutput {
                role: "Synthesist".to_string(),
                tier: ModelTier::Gemini3Flash,
                text: "second critique".to_string(),
            },
        ];
        let prompt = synthesis_prompt("original question", &outputs);
        assert!(prompt.starts_with("original question"));
        assert!(prompt.contains("TEAM DEBATE NOTES"));
        let skeptic = prompt.find("Skeptic").unwrap();
        let synthesist = prompt.find("Synthesist").unwrap();
        assert!(skeptic < synthesist);
        assert!(prompt.contains("gpt-5-mini"));
    }

    #[test]
    fn test_video_ladder_override_rejects_non_google() {
        let mut cfg = config();
        cfg.debate_video_ui_model_ladder =
            vec!["gpt-5-mini".to_string(), "gemini-3-flash".to_string()];
        let plan = get_debate_plan(DebateProfile::VideoUi, ModelTier::Gemini31Pro, &cfg);
        for challenger in &plan.challengers {
            assert_eq!(
                registry::entry(challenger.tier).provider,
                crate::llm::Provider::Google
            );
        }
    }
}
