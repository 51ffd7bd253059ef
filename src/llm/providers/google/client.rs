//! Google provider client
//!
//! Calls the Gemini streamGenerateContent endpoint. Registry model ids are
//! fuzzy aliases resolved against the provider's live model list, which is
//! cached for ten minutes behind a mutex. Flash-class calls carry a
//! thinking-level hint that is dropped on retry if the upstream rejects it.

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::llm::providers::{
    network_error, upstream_error, AdapterStream, CallOptions, ProviderClient,
};
use crate::llm::transforms::to_google;
use crate::llm::{GatewayError, GatewayResult, ImageAttachment, Message, Provider, ThinkingLevel};

use super::config;
use super::types::{
    GoogleGenerationConfig, GoogleModelList, GoogleRequest, GoogleThinkingConfig,
};

struct ModelListCache {
    fetched_at: Instant,
    models: Vec<String>,
}

pub struct GoogleClient {
    client: Client,
    api_key: String,
    base_url: String,
    model_cache: Mutex<Option<ModelListCache>>,
}

impl GoogleClient {
    pub fn new(client: Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            base_url: config::base_url(),
            model_cache: Mutex::new(None),
        }
    }

    /// Fetch the provider's model list, serving from cache within the TTL.
    /// Readers may observe entries up to ten minutes stale; refetches are
    /// serialized behind the lock.
    async fn available_models(&self) -> GatewayResult<Vec<String>> {
        let mut cache = self.model_cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < Duration::from_secs(config::MODEL_CACHE_TTL_SECONDS) {
                return Ok(cached.models.clone());
            }
        }

        let url = format!(
            "{}/models?key={}",
            self.base_url,
            urlencoding::encode(&self.api_key)
        );
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| network_error(Provider::Google, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(upstream_error(Provider::Google, status, &text));
        }

        let listing: GoogleModelList = response
            .json()
            .await
            .map_err(|e| network_error(Provider::Google, e))?;
        let models: Vec<String> = listing
            .models
            .into_iter()
            .map(|m| m.name.trim_start_matches("models/").to_string())
            .collect();

        debug!(count = models.len(), "refreshed google model list");
        *cache = Some(ModelListCache {
            fetched_at: Instant::now(),
            models: models.clone(),
        });
        Ok(models)
    }

    /// Resolve a fuzzy alias (e.g. a registry tier id) to a concrete model
    /// id from the provider's current listing.
    pub async fn resolve_alias(&self, alias: &str) -> GatewayResult<String> {
        let models = self.available_models().await?;
        let best = models
            .iter()
            .map(|model| (model, alias_score(alias, model)))
            .filter(|(_, score)| *score > 0)
            .max_by_key(|(_, score)| *score);

        match best {
            Some((model, score)) => {
                debug!(alias, model = model.as_str(), score, "resolved google alias");
                Ok(model.clone())
            }
            None => Err(GatewayError::Upstream {
                provider: Provider::Google,
                details: format!(
                    "no available model matches alias '{}'; the model registry may need a refresh",
                    alias
                ),
            }),
        }
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url,
            model,
            urlencoding::encode(&self.api_key)
        )
    }

    async fn send(
        &self,
        model: &str,
        body: &GoogleRequest,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(self.stream_url(model))
            .json(body)
            .timeout(Duration::from_secs(config::TIMEOUT_SECONDS))
            .send()
            .await
    }
}

/// Score one available model against an alias. Exact match dominates,
/// substring containment comes next, then family and variant boosts;
/// preview/experimental builds are penalized so stable models win ties.
fn alias_score(alias: &str, model: &str) -> i32 {
    let alias = alias.to_lowercase();
    let model_lower = model.to_lowercase();
    let mut score = 0;

    if model_lower == alias {
        score += 1000;
    } else if model_lower.contains(&alias) || alias.contains(&model_lower) {
        score += 500;
    }

    if alias.contains("flash") && model_lower.contains("flash") {
        score += 120;
    }
    if alias.contains("pro") && model_lower.contains("pro") {
        score += 120;
    }
    if alias.contains("gemini-3.1") && model_lower.contains("gemini-3.1") {
        score += 150;
    }
    if alias.contains("gemini-3") && model_lower.contains("gemini-3") {
        score += 100;
    }

    if model_lower.contains("preview") {
        score -= 200;
    }
    if model_lower.contains("exp") {
        score -= 150;
    }
    if model_lower.contains("customtools") {
        score -= 300;
    }

    score
}

/// Pull text deltas out of one parsed stream chunk
pub fn extract_deltas(event: &serde_json::Value) -> Vec<String> {
    event
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(|parts| parts.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ProviderClient for GoogleClient {
    async fn call_stream(
        &self,
        model_id: &str,
        budget_cap: u32,
        messages: &[Message],
        images: &[ImageAttachment],
        opts: &CallOptions,
    ) -> GatewayResult<AdapterStream> {
        let resolved = self.resolve_alias(model_id).await?;

        // Thinking hints only apply to the flash family
        let hint = match opts.thinking_level {
            ThinkingLevel::Low if resolved.contains("flash") => Some("LOW"),
            ThinkingLevel::High if resolved.contains("flash") => Some("HIGH"),
            _ => None,
        };

        let mut body = GoogleRequest {
            contents: to_google(messages, images),
            generation_config: Some(GoogleGenerationConfig {
                max_output_tokens: opts.max_output_tokens.unwrap_or(budget_cap),
                thinking_config: hint.map(|level| GoogleThinkingConfig {
                    thinking_level: level.to_string(),
                }),
            }),
        };

        debug!(model = resolved.as_str(), thinking = ?hint, "google stream request");
        let mut response = self
            .send(&resolved, &body)
            .await
            .map_err(|e| network_error(Provider::Google, e))?;
        let mut effective_thinking = match hint {
            Some("LOW") => ThinkingLevel::Low,
            Some("HIGH") => ThinkingLevel::High,
            _ => ThinkingLevel::None,
        };

        if response.status().as_u16() == 400 && hint.is_some() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            if text.to_lowercase().contains("thinking") {
                warn!(model = resolved.as_str(), "retrying without thinking hint");
                if let Some(cfg) = body.generation_config.as_mut() {
                    cfg.thinking_config = None;
                }
                effective_thinking = ThinkingLevel::None;
                response = self
                    .send(&resolved, &body)
                    .await
                    .map_err(|e| network_error(Provider::Google, e))?;
            } else {
                return Err(upstream_error(Provider::Google, 400, &text));
            }
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(upstream_error(Provider::Google, status, &text));
        }

        Ok(AdapterStream {
            bytes: Box::pin(response.bytes_stream()),
            extract_deltas,
            effective_model_id: resolved,
            effective_thinking_level: effective_thinking,
        })
    }

    fn provider(&self) -> Provider {
        Provider::Google
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alias_exact_match_wins() {
        assert!(alias_score("gemini-3-flash", "gemini-3-flash") > 1000);
        assert!(
            alias_score("gemini-3-flash", "gemini-3-flash")
                > alias_score("gemini-3-flash", "gemini-3-flash-002")
        );
    }

    #[test]
    fn test_alias_prefers_stable_over_preview() {
        let stable = alias_score("gemini-3.1-pro", "gemini-3.1-pro-002");
        let preview = alias_score("gemini-3.1-pro", "gemini-3.1-pro-preview");
        assert!(stable > preview);
    }

    #[test]
    fn test_alias_family_boosts_separate_variants() {
        let flash = alias_score("gemini-3-flash", "gemini-3-flash-002");
        let pro = alias_score("gemini-3-flash", "gemini-3.1-pro-002");
        assert!(flash > pro);
    }

    #[test]
    fn test_alias_no_match_is_negative_or_zero() {
        assert!(alias_score("gemini-3-flash", "imagen-4") <= 0);
        assert!(alias_score("gemini-3-flash", "gemini-3-flash-customtools") < 1000);
    }

    #[test]
    fn test_extract_candidate_text() {
        let event = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hel"}, {"text": "lo"}]},
                "index": 0
            }]
        });
        assert_eq!(
            extract_deltas(&event),
            vec!["Hel".to_string(), "lo".to_string()]
        );
    }

    #[test]
    fn test_extract_skips_finish_only_chunks() {
        let event = json!({
            "candidates": [{"finishReason": "STOP", "index": 0}]
        });
        assert!(extract_deltas(&event).is_empty());
    }
}
