//! HTTP handlers
//!
//! The chat endpoint ties the pipeline together: auth, validation,
//! ownership, video and memory context, routing, availability
//! normalization, optional debate, pre-flight cost, persistence, the
//! provider call, and the SSE pump. The user message is recorded before
//! the stream starts; the assistant message and summarization run after
//! the pump completes.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthValidator;
use crate::config::GatewayConfig;
use crate::llm::availability::normalize_decision;
use crate::llm::cost::{preflight, PreflightCost};
use crate::llm::debate::{
    get_debate_plan, is_eligible, run_debate, DebateProfile, DebateSynthesis, DebateTrigger,
};
use crate::llm::memory::{self, MemoryContext};
use crate::llm::providers::{AdapterStream, Adapters, CallOptions};
use crate::llm::routing::{determine_route, fallback_route, is_code_heavy, normalize_override};
use crate::llm::sse::{pump_sse, StreamOutcome};
use crate::llm::tokens::{estimate_tokens, image_tokens};
use crate::llm::{
    GatewayError, GatewayResult, Message, RouteDecision, RouterParams, Role, ThinkingLevel,
};
use crate::stores::{ConversationStore, MemoryStore, MessageRecord, VideoArtifactStore};

use super::types::*;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub adapters: Arc<Adapters>,
    pub auth: Arc<dyn AuthValidator>,
    pub conversations: Arc<dyn ConversationStore>,
    pub memory: Arc<dyn MemoryStore>,
    pub videos: Arc<dyn VideoArtifactStore>,
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "llm-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Fallback for unknown routes
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "not_found".to_string(),
            provider: None,
            details: None,
        }),
    )
}

/// Everything prepared before the response stream opens
struct PreparedRequest {
    user_id: String,
    conversation_id: Uuid,
    decision: RouteDecision,
    debate: Option<DebateSynthesis>,
    cost: PreflightCost,
    memory_ctx: MemoryContext,
    overridden: bool,
    total_tokens_before: u64,
    user_message_tokens: u64,
    effective_model_id: String,
    effective_thinking_level: ThinkingLevel,
}

/// Chat endpoint - POST /v1/chat
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Response, GatewayError> {
    let cancel = CancellationToken::new();
    let deadline = Duration::from_millis(state.config.function_timeout_ms);
    let watchdog = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            cancel.cancel();
        })
    };

    // Everything up to the first streamed byte shares the overall deadline
    let prepared = tokio::select! {
        _ = cancel.cancelled() => Err(GatewayError::DeadlineExceeded),
        prepared = prepare(&state, &headers, request, &cancel) => prepared,
    };
    let (prepared, stream) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            watchdog.abort();
            return Err(e);
        }
    };

    let response_headers = build_headers(&prepared);
    let AdapterStream {
        bytes: upstream,
        extract_deltas: extract,
        ..
    } = stream;

    let (mut sender, body) = Body::channel();
    let pump_state = state.clone();
    let pump_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut assistant_text = String::new();
        let outcome = pump_sse(
            upstream,
            extract,
            &mut sender,
            &mut |delta: &str| assistant_text.push_str(delta),
            &pump_cancel,
        )
        .await;
        watchdog.abort();
        finish_request(pump_state, prepared, assistant_text, outcome).await;
    });

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive");
    if let Some(h) = builder.headers_mut() {
        h.extend(response_headers);
    }
    let response = builder
        .body(body)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    Ok(response.into_response())
}

/// Run the pre-stream pipeline and open the upstream call
async fn prepare(
    state: &AppState,
    headers: &HeaderMap,
    request: ChatRequest,
    cancel: &CancellationToken,
) -> GatewayResult<(PreparedRequest, AdapterStream)> {
    // Bearer auth
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or_else(|| GatewayError::Unauthorized("missing bearer token".to_string()))?;
    let auth = state.auth.verify(token).await?;

    // Body validation
    let original_query = request.query.clone().unwrap_or_default();
    let has_images = !request.images.is_empty();
    let has_video = !request.video_asset_ids.is_empty();
    if original_query.trim().is_empty() && !has_images && !has_video {
        return Err(GatewayError::BadRequest(
            "query is required when no images or video assets are attached".to_string(),
        ));
    }
    if original_query.chars().count() > MAX_QUERY_CHARS {
        return Err(GatewayError::BadRequest(format!(
            "query exceeds {} characters",
            MAX_QUERY_CHARS
        )));
    }
    for image in &request.images {
        if base64::engine::general_purpose::STANDARD
            .decode(image.data.as_bytes())
            .is_err()
        {
            return Err(GatewayError::BadRequest(
                "image data is not valid base64".to_string(),
            ));
        }
    }

    // Conversation ownership
    let ownership = state
        .conversations
        .verify_ownership(request.conversation_id, &auth.user_id)
        .await?;
    if !ownership.exists {
        return Err(GatewayError::Forbidden);
    }

    // Video context: all requested assets must be ready
    let mut query = original_query.clone();
    if has_video {
        let artifacts = match state
            .videos
            .list_ready_for(&request.video_asset_ids, &auth.user_id)
            .await
        {
            Ok(artifacts) => artifacts,
            Err(e) => {
                warn!("video artifact lookup failed: {}", e);
                return Err(GatewayError::VideoNotReady);
            }
        };
        if artifacts.len() != request.video_asset_ids.len() {
            return Err(GatewayError::VideoNotReady);
        }
        let mut block = String::from("### Video Context");
        for artifact in &artifacts {
            block.push_str(&format!("\n- {}: {}", artifact.title, artifact.summary));
        }
        query = format!("{}\n\n{}", block, query);
    }

    // Memory retrieval and injection; failures degrade inside
    let memory_ctx = memory::fetch_relevant(state.memory.as_ref(), &auth.user_id, &original_query).await;
    let augmented_query = memory::inject(&memory_ctx.block, &query);

    // Manual override: the normalizer itself never fails, but a present
    // and unrecognized override is a caller error
    let manual = match request.model_override.as_deref() {
        Some(raw) => Some(normalize_override(raw).ok_or_else(|| {
            GatewayError::BadRequest(format!("unrecognized model override '{}'", raw))
        })?),
        None => None,
    };

    let params = RouterParams {
        user_query: augmented_query.clone(),
        current_session_tokens: ownership.total_tokens + memory_ctx.tokens,
        platform: request.platform,
        history: request.history.clone(),
        images: request.images.clone(),
        has_video_assets: has_video,
    };

    // Routing is pure and cannot fail in principle; the catch keeps a
    // poisoned input from taking the request down with it
    let decision = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        determine_route(&params, manual)
    }))
    .unwrap_or_else(|_| fallback_route(params.current_session_tokens));

    if state.config.dev_mode {
        debug!(
            tier = decision.model_tier.key(),
            rationale = decision.rationale.as_str(),
            score = decision.complexity_score,
            "routing decision"
        );
    }

    let readiness = state.config.readiness();
    let decision = normalize_decision(decision, &readiness, manual.is_some())?;

    // Debate activation
    let debate_request = resolve_debate_request(state, &request, &decision, &original_query)?;
    let debate = match debate_request {
        Some((profile, trigger)) => {
            let plan = get_debate_plan(profile, decision.model_tier, &state.config);
            run_debate(
                &state.adapters,
                &readiness,
                &plan,
                trigger,
                &original_query,
                &state.config,
                cancel,
            )
            .await
            .map(|mut synthesis| {
                // The composite replaces the user message; keep the memory
                // and video context it was built around
                synthesis.composite_query =
                    crate::llm::debate::synthesis_prompt(&augmented_query, &synthesis.outputs);
                synthesis
            })
        }
        None => None,
    };

    let final_query = debate
        .as_ref()
        .map(|d| d.composite_query.clone())
        .unwrap_or(augmented_query);

    let mut messages = request.history.clone();
    messages.push(Message::user(final_query));

    // Pre-flight estimate over the full outgoing context; for debates this
    // covers the synthesized prompt but not the challenger calls
    let full_context: String = messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let cost = preflight(decision.model_tier, &full_context, request.images.len(), 0);

    // The user message is durable before the stream starts
    let user_message_tokens =
        estimate_tokens(&original_query) + image_tokens(request.images.len());
    if let Err(e) = state
        .conversations
        .record_message(MessageRecord {
            conversation_id: request.conversation_id,
            role: Role::User,
            content: original_query.clone(),
            token_count: user_message_tokens,
            model_used: None,
            image_url: None,
            created_at: Utc::now(),
        })
        .await
    {
        warn!("user message persistence failed: {}", e);
    }

    // Open the upstream stream
    let thinking_level = match request
        .gemini_flash_thinking_level
        .as_deref()
        .map(|s| s.to_lowercase())
        .as_deref()
    {
        Some("low") => ThinkingLevel::Low,
        _ => ThinkingLevel::High,
    };
    let opts = CallOptions {
        max_output_tokens: None,
        thinking_level,
    };
    let client = state.adapters.get(decision.provider)?;
    let stream = client
        .call_stream(
            &decision.provider_model_id,
            decision.budget_cap,
            &messages,
            &request.images,
            &opts,
        )
        .await?;

    info!(
        tier = decision.model_tier.key(),
        model = stream.effective_model_id.as_str(),
        rationale = decision.rationale.as_str(),
        debate = debate.is_some(),
        "dispatching chat request"
    );

    Ok((
        PreparedRequest {
            user_id: auth.user_id,
            conversation_id: request.conversation_id,
            decision,
            debate,
            cost,
            memory_ctx,
            overridden: manual.is_some(),
            total_tokens_before: ownership.total_tokens,
            user_message_tokens,
            effective_model_id: stream.effective_model_id.clone(),
            effective_thinking_level: stream.effective_thinking_level,
        },
        stream,
    ))
}

/// Decide whether this request runs a debate, and how it was triggered.
///
/// Explicit requests with an unknown profile are caller errors; an
/// ineligible explicit request is too. Auto triggering never errors, it
/// just declines.
fn resolve_debate_request(
    state: &AppState,
    request: &ChatRequest,
    decision: &RouteDecision,
    query: &str,
) -> GatewayResult<Option<(DebateProfile, DebateTrigger)>> {
    let has_images = !request.images.is_empty();
    let has_video = !request.video_asset_ids.is_empty();

    if request.mode.as_deref() == Some("debate") {
        let raw = request.debate_profile.as_deref().ok_or_else(|| {
            GatewayError::BadRequest("debateProfile is required when mode is debate".to_string())
        })?;
        let profile: DebateProfile = raw.parse().map_err(|_| {
            GatewayError::BadRequest(format!("unknown debate profile '{}'", raw))
        })?;
        if !state.config.enable_debate_mode {
            debug!("debate requested but the master switch is off");
            return Ok(None);
        }
        if !is_eligible(profile, DebateTrigger::Explicit, has_images, has_video) {
            return Err(GatewayError::BadRequest(format!(
                "debate profile '{}' is not eligible for this request",
                profile.key()
            )));
        }
        return Ok(Some((profile, DebateTrigger::Explicit)));
    }

    if state.config.enable_debate_mode
        && state.config.enable_debate_auto
        && decision.complexity_score >= state.config.debate_complexity_threshold
    {
        let profile = if is_code_heavy(query) {
            DebateProfile::Code
        } else {
            DebateProfile::General
        };
        if is_eligible(profile, DebateTrigger::Auto, has_images, has_video) {
            return Ok(Some((profile, DebateTrigger::Auto)));
        }
    }

    Ok(None)
}

/// Assemble the stable response header set
fn build_headers(prepared: &PreparedRequest) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let decision = &prepared.decision;

    insert(&mut headers, HEADER_ROUTER_MODEL, decision.model_tier.key());
    insert(
        &mut headers,
        HEADER_ROUTER_MODEL_ID,
        &prepared.effective_model_id,
    );
    insert(&mut headers, HEADER_PROVIDER, &decision.provider.to_string());

    let override_value = match (&prepared.debate, prepared.overridden) {
        (Some(debate), _) => format!("debate:{}", debate.profile.key()),
        (None, true) => decision.model_tier.key().to_string(),
        (None, false) => "auto".to_string(),
    };
    insert(&mut headers, HEADER_MODEL_OVERRIDE, &override_value);

    insert(&mut headers, HEADER_ROUTER_RATIONALE, &decision.rationale);
    insert(
        &mut headers,
        HEADER_COMPLEXITY_SCORE,
        &decision.complexity_score.to_string(),
    );
    insert(
        &mut headers,
        HEADER_GEMINI_THINKING_LEVEL,
        prepared.effective_thinking_level.header_value(),
    );
    insert(
        &mut headers,
        HEADER_MEMORY_HITS,
        &prepared.memory_ctx.hits.to_string(),
    );
    insert(
        &mut headers,
        HEADER_MEMORY_TOKENS,
        &prepared.memory_ctx.tokens.to_string(),
    );
    insert(
        &mut headers,
        HEADER_COST_ESTIMATE_USD,
        &format!("{:.6}", prepared.cost.estimated_usd),
    );
    insert(
        &mut headers,
        HEADER_COST_PRICING_VERSION,
        prepared.cost.pricing_version,
    );

    if let Some(debate) = &prepared.debate {
        insert(&mut headers, HEADER_DEBATE_MODE, "true");
        insert(&mut headers, HEADER_DEBATE_PROFILE, debate.profile.key());
        insert(
            &mut headers,
            HEADER_DEBATE_TRIGGER,
            debate.trigger.header_value(),
        );
        insert(&mut headers, HEADER_DEBATE_MODEL, decision.model_tier.key());
        insert(&mut headers, HEADER_DEBATE_COST_NOTE, "partial");
    }

    headers
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// Post-stream side effects, run exactly once after the pump finishes
async fn finish_request(
    state: AppState,
    prepared: PreparedRequest,
    assistant_text: String,
    outcome: StreamOutcome,
) {
    match &outcome {
        StreamOutcome::Completed => debug!("stream completed"),
        StreamOutcome::Failed(e) => warn!("stream failed: {}", e),
        StreamOutcome::Cancelled => warn!("stream cancelled by deadline"),
    }

    let assistant_tokens = estimate_tokens(&assistant_text);
    if !assistant_text.is_empty() {
        if let Err(e) = state
            .conversations
            .record_message(MessageRecord {
                conversation_id: prepared.conversation_id,
                role: Role::Assistant,
                content: assistant_text,
                token_count: assistant_tokens,
                model_used: Some(prepared.decision.model_tier.key().to_string()),
                image_url: None,
                created_at: Utc::now(),
            })
            .await
        {
            warn!("assistant message persistence failed: {}", e);
        }
    }

    let delta = prepared.user_message_tokens + assistant_tokens;
    if let Err(e) = state
        .conversations
        .increment_tokens(prepared.conversation_id, delta)
        .await
    {
        warn!("token increment failed: {}", e);
    }

    // Summarization is detached with its own deadline
    let memory_store = state.memory.clone();
    let adapters = state.adapters.clone();
    let config = state.config.clone();
    let user_id = prepared.user_id.clone();
    let conversation_id = prepared.conversation_id;
    let total_tokens = prepared.total_tokens_before + delta;
    tokio::spawn(async move {
        memory::maybe_summarize(
            memory_store,
            adapters,
            config,
            conversation_id,
            user_id,
            total_tokens,
        )
        .await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuthValidator;
    use crate::llm::Platform;
    use crate::stores::InMemoryStore;

    fn test_state(config: GatewayConfig) -> (AppState, Arc<InMemoryStore>, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let conversation_id = Uuid::new_v4();
        store.seed_conversation(conversation_id, "alice", 0);
        let config = Arc::new(config);
        let state = AppState {
            adapters: Arc::new(Adapters::from_config(&config)),
            auth: Arc::new(StaticAuthValidator {
                user_id: "alice".to_string(),
            }),
            conversations: store.clone(),
            memory: store.clone(),
            videos: store.clone(),
            config,
        };
        (state, store, conversation_id)
    }

    fn request_for(conversation_id: Uuid, query: &str) -> ChatRequest {
        ChatRequest {
            query: Some(query.to_string()),
            conversation_id,
            platform: Platform::Web,
            history: Vec::new(),
            images: Vec::new(),
            video_asset_ids: Vec::new(),
            model_override: None,
            gemini_flash_thinking_level: None,
            mode: None,
            debate_profile: None,
        }
    }

    fn bearer_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer valid-token"),
        );
        headers
    }

    #[tokio::test]
    async fn test_missing_bearer_is_unauthorized() {
        let (state, _, conversation_id) = test_state(GatewayConfig::for_tests());
        let err = chat(
            State(state),
            HeaderMap::new(),
            Json(request_for(conversation_id, "hello")),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_empty_query_without_attachments_is_bad_request() {
        let (state, _, conversation_id) = test_state(GatewayConfig::for_tests());
        let err = chat(
            State(state),
            bearer_headers(),
            Json(request_for(conversation_id, "   ")),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_unowned_conversation_is_forbidden() {
        let (state, _, _) = test_state(GatewayConfig::for_tests());
        let err = chat(
            State(state),
            bearer_headers(),
            Json(request_for(Uuid::new_v4(), "hello")),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::Forbidden));
    }

    #[tokio::test]
    async fn test_unknown_override_is_bad_request() {
        let (state, _, conversation_id) = test_state(GatewayConfig::for_tests());
        let mut request = request_for(conversation_id, "hello");
        request.model_override = Some("llama-9000".to_string());
        let err = chat(State(state), bearer_headers(), Json(request))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_unready_video_assets_rejected() {
        let (state, store, conversation_id) = test_state(GatewayConfig::for_tests());
        let pending = Uuid::new_v4();
        store.seed_video(crate::stores::VideoArtifact {
            id: pending,
            user_id: "alice".to_string(),
            ready: false,
            title: "wip".to_string(),
            summary: String::new(),
        });
        let mut request = request_for(conversation_id, "review this video");
        request.video_asset_ids = vec![pending];
        let err = chat(State(state), bearer_headers(), Json(request))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::VideoNotReady));
    }

    #[tokio::test]
    async fn test_unknown_debate_profile_is_bad_request() {
        let (state, _, conversation_id) = test_state(GatewayConfig::for_tests());
        let mut request = request_for(conversation_id, "refactor this module");
        request.mode = Some("debate".to_string());
        request.debate_profile = Some("adversarial".to_string());
        let err = chat(State(state), bearer_headers(), Json(request))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_debate_with_images_is_ineligible() {
        let (state, _, conversation_id) = test_state(GatewayConfig::for_tests());
        let mut request = request_for(conversation_id, "refactor this module");
        request.mode = Some("debate".to_string());
        request.debate_profile = Some("code".to_string());
        request.images = vec![crate::llm::ImageAttachment {
            data: "Zm9v".to_string(),
            media_type: "image/png".to_string(),
        }];
        let err = chat(State(state), bearer_headers(), Json(request))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_no_providers_ready_is_misconfig() {
        let mut config = GatewayConfig::for_tests();
        config.anthropic_api_key = None;
        config.openai_api_key = None;
        config.google_api_key = None;
        let (state, _, conversation_id) = test_state(config);
        let err = chat(
            State(state),
            bearer_headers(),
            Json(request_for(conversation_id, "hello")),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::ServerMisconfig(_)));
    }
}
