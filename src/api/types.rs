//! HTTP wire types
//!
//! The chat request body, the error envelope, and the stable response
//! header names. Header semantics: the always-present set describes the
//! routing outcome; `X-Debate-*` headers exist only on requests where
//! debate actually ran.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::{GatewayError, ImageAttachment, Message, Platform};

/// POST /v1/chat request body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Required unless images or video assets are present
    #[serde(default)]
    pub query: Option<String>,
    pub conversation_id: Uuid,
    pub platform: Platform,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
    #[serde(default)]
    pub video_asset_ids: Vec<Uuid>,
    #[serde(default)]
    pub model_override: Option<String>,
    /// `low` | `high`, default `high`
    #[serde(default)]
    pub gemini_flash_thinking_level: Option<String>,
    /// `debate` opts into debate mode
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub debate_profile: Option<String>,
}

/// Maximum accepted query length in characters
pub const MAX_QUERY_CHARS: usize = 50_000;

// Always-present response headers
pub const HEADER_ROUTER_MODEL: &str = "x-router-model";
pub const HEADER_ROUTER_MODEL_ID: &str = "x-router-model-id";
pub const HEADER_PROVIDER: &str = "x-provider";
pub const HEADER_MODEL_OVERRIDE: &str = "x-model-override";
pub const HEADER_ROUTER_RATIONALE: &str = "x-router-rationale";
pub const HEADER_COMPLEXITY_SCORE: &str = "x-complexity-score";
pub const HEADER_GEMINI_THINKING_LEVEL: &str = "x-gemini-thinking-level";
pub const HEADER_MEMORY_HITS: &str = "x-memory-hits";
pub const HEADER_MEMORY_TOKENS: &str = "x-memory-tokens";
pub const HEADER_COST_ESTIMATE_USD: &str = "x-cost-estimate-usd";
pub const HEADER_COST_PRICING_VERSION: &str = "x-cost-pricing-version";

// Present only when debate ran
pub const HEADER_DEBATE_MODE: &str = "x-debate-mode";
pub const HEADER_DEBATE_PROFILE: &str = "x-debate-profile";
pub const HEADER_DEBATE_TRIGGER: &str = "x-debate-trigger";
pub const HEADER_DEBATE_MODEL: &str = "x-debate-model";
pub const HEADER_DEBATE_COST_NOTE: &str = "x-debate-cost-note";

/// Error envelope returned on non-2xx responses
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::VideoNotReady => StatusCode::BAD_REQUEST,
            GatewayError::ProviderUnavailable { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::ServerMisconfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            GatewayError::BadRequest(msg) => ErrorBody {
                error: "bad_request".to_string(),
                provider: None,
                details: Some(msg.clone()),
            },
            GatewayError::Unauthorized(msg) => ErrorBody {
                error: "unauthorized".to_string(),
                provider: None,
                details: Some(msg.clone()),
            },
            GatewayError::Forbidden => ErrorBody {
                error: "forbidden".to_string(),
                provider: None,
                details: Some("conversation not owned by caller".to_string()),
            },
            GatewayError::VideoNotReady => ErrorBody {
                error: "video_not_ready".to_string(),
                provider: None,
                details: Some("one or more video assets are not ready".to_string()),
            },
            GatewayError::ProviderUnavailable { provider, reason } => ErrorBody {
                error: "provider_unavailable".to_string(),
                provider: Some(provider.to_string()),
                details: Some(reason.clone()),
            },
            GatewayError::Upstream { provider, details } => ErrorBody {
                error: "upstream_error".to_string(),
                provider: Some(provider.to_string()),
                details: Some(details.clone()),
            },
            GatewayError::DeadlineExceeded => ErrorBody {
                error: "deadline_exceeded".to_string(),
                provider: None,
                details: Some("overall request deadline exceeded".to_string()),
            },
            GatewayError::ServerMisconfig(msg) => ErrorBody {
                error: "server_misconfig".to_string(),
                provider: None,
                details: Some(msg.clone()),
            },
            GatewayError::Internal(msg) => ErrorBody {
                error: "internal_error".to_string(),
                provider: None,
                details: Some(msg.clone()),
            },
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
