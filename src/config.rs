//! Gateway configuration
//!
//! Every knob is read from the environment exactly once at start-up and
//! carried in an immutable `GatewayConfig`. Provider readiness is the
//! conjunction of the enable flag and credential presence.

use std::env;

use crate::llm::availability::ProviderReadiness;

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(value) => matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    // Provider credentials; absence gates readiness
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub google_api_key: Option<String>,

    // Per-provider feature flags
    pub enable_anthropic: bool,
    pub enable_openai: bool,
    pub enable_google: bool,

    /// Verbose decision logging
    pub dev_mode: bool,

    // Debate mode
    pub enable_debate_mode: bool,
    pub enable_debate_auto: bool,
    pub debate_complexity_threshold: u8,
    pub debate_worker_max_tokens_general: u32,
    pub debate_worker_max_tokens_code: u32,
    pub debate_worker_max_tokens_video_ui: u32,
    pub debate_video_ui_stage_timeout_ms: u64,
    pub debate_video_ui_model_ladder: Vec<String>,

    /// Overall request deadline in milliseconds
    pub function_timeout_ms: u64,

    /// HS256 secret for bearer token validation
    pub auth_jwt_secret: String,

    pub server_port: u16,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: env_opt("ANTHROPIC_API_KEY"),
            openai_api_key: env_opt("OPENAI_API_KEY"),
            google_api_key: env_opt("GOOGLE_API_KEY"),
            enable_anthropic: env_bool("ENABLE_ANTHROPIC", true),
            enable_openai: env_bool("ENABLE_OPENAI", true),
            enable_google: env_bool("ENABLE_GOOGLE", true),
            dev_mode: env_bool("DEV_MODE", false),
            enable_debate_mode: env_bool("ENABLE_DEBATE_MODE", false),
            enable_debate_auto: env_bool("ENABLE_DEBATE_AUTO", false),
            debate_complexity_threshold: env_parse("DEBATE_COMPLEXITY_THRESHOLD", 85),
            debate_worker_max_tokens_general: env_parse("DEBATE_WORKER_MAX_TOKENS_GENERAL", 700),
            debate_worker_max_tokens_code: env_parse("DEBATE_WORKER_MAX_TOKENS_CODE", 900),
            debate_worker_max_tokens_video_ui: env_parse("DEBATE_WORKER_MAX_TOKENS_VIDEO_UI", 800),
            debate_video_ui_stage_timeout_ms: env_parse("DEBATE_VIDEO_UI_STAGE_TIMEOUT_MS", 20_000),
            debate_video_ui_model_ladder: env_opt("DEBATE_VIDEO_UI_MODEL_LADDER")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            function_timeout_ms: env_parse("FUNCTION_TIMEOUT_MS", 55_000),
            auth_jwt_secret: env_opt("AUTH_JWT_SECRET").unwrap_or_default(),
            server_port: env_parse("SERVER_PORT", 3000),
        }
    }

    /// Readiness snapshot for the availability normalizer
    pub fn readiness(&self) -> ProviderReadiness {
        ProviderReadiness {
            anthropic: self.enable_anthropic && self.anthropic_api_key.is_some(),
            openai: self.enable_openai && self.openai_api_key.is_some(),
            google: self.enable_google && self.google_api_key.is_some(),
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            anthropic_api_key: Some("test-anthropic-key".to_string()),
            openai_api_key: Some("test-openai-key".to_string()),
            google_api_key: Some("test-google-key".to_string()),
            enable_anthropic: true,
            enable_openai: true,
            enable_google: true,
            dev_mode: false,
            enable_debate_mode: true,
            enable_debate_auto: false,
            debate_complexity_threshold: 85,
            debate_worker_max_tokens_general: 700,
            debate_worker_max_tokens_code: 900,
            debate_worker_max_tokens_video_ui: 800,
            debate_video_ui_stage_timeout_ms: 20_000,
            debate_video_ui_model_ladder: Vec::new(),
            function_timeout_ms: 55_000,
            auth_jwt_secret: "test-secret".to_string(),
            server_port: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_requires_flag_and_credentials() {
        let mut config = GatewayConfig::for_tests();
        assert!(config.readiness().anthropic);

        config.enable_anthropic = false;
        assert!(!config.readiness().anthropic);

        config.enable_anthropic = true;
        config.anthropic_api_key = None;
        assert!(!config.readiness().anthropic);
    }

    #[test]
    fn test_defaults_are_sane() {
        let config = GatewayConfig::for_tests();
        assert_eq!(config.debate_complexity_threshold, 85);
        assert_eq!(config.function_timeout_ms, 55_000);
    }
}
