//! OpenAI provider client
//!
//! Calls chat completions with `stream: true`. Newer models take
//! `max_completion_tokens`; on a 400 naming that field the call is retried
//! once with the legacy `max_tokens`.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::llm::providers::{
    network_error, upstream_error, AdapterStream, CallOptions, ProviderClient,
};
use crate::llm::transforms::to_openai;
use crate::llm::{GatewayResult, ImageAttachment, Message, Provider, ThinkingLevel};

use super::config;
use super::types::OpenAIRequest;

pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(client: Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            base_url: config::base_url(),
        }
    }

    fn build_headers(&self) -> GatewayResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|e| {
                crate::llm::GatewayError::Internal(format!("invalid API key format: {}", e))
            })?,
        );
        Ok(headers)
    }

    async fn send(
        &self,
        headers: HeaderMap,
        body: &OpenAIRequest,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .headers(headers)
            .json(body)
            .timeout(Duration::from_secs(config::TIMEOUT_SECONDS))
            .send()
            .await
    }
}

/// Pull text deltas out of one parsed stream chunk
pub fn extract_deltas(event: &serde_json::Value) -> Vec<String> {
    event
        .get("choices")
        .and_then(|c| c.as_array())
        .map(|choices| {
            choices
                .iter()
                .filter_map(|choice| {
                    choice
                        .get("delta")
                        .and_then(|d| d.get("content"))
                        .and_then(|c| c.as_str())
                })
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ProviderClient for OpenAIClient {
    async fn call_stream(
        &self,
        model_id: &str,
        budget_cap: u32,
        messages: &[Message],
        images: &[ImageAttachment],
        opts: &CallOptions,
    ) -> GatewayResult<AdapterStream> {
        let cap = opts.max_output_tokens.unwrap_or(budget_cap);
        let mut body = OpenAIRequest {
            model: model_id.to_string(),
            messages: to_openai(messages, images),
            max_completion_tokens: Some(cap),
            max_tokens: None,
            stream: true,
        };

        debug!(model = model_id, "openai stream request");
        let headers = self.build_headers()?;
        let mut response = self
            .send(headers.clone(), &body)
            .await
            .map_err(|e| network_error(Provider::OpenAI, e))?;

        if response.status().as_u16() == 400 {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            if text.contains("max_completion_tokens") {
                // Older model families still want the legacy field
                warn!(model = model_id, "retrying with legacy max_tokens field");
                body.max_completion_tokens = None;
                body.max_tokens = Some(cap);
                response = self
                    .send(headers, &body)
                    .await
                    .map_err(|e| network_error(Provider::OpenAI, e))?;
            } else {
                return Err(upstream_error(Provider::OpenAI, 400, &text));
            }
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(upstream_error(Provider::OpenAI, status, &text));
        }

        Ok(AdapterStream {
            bytes: Box::pin(response.bytes_stream()),
            extract_deltas,
            effective_model_id: model_id.to_string(),
            effective_thinking_level: ThinkingLevel::None,
        })
    }

    fn provider(&self) -> Provider {
        Provider::OpenAI
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_content_delta() {
        let event = json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "delta": {"content": "Hi"}, "finish_reason": null}]
        });
        assert_eq!(extract_deltas(&event), vec!["Hi".to_string()]);
    }

    #[test]
    fn test_role_only_and_finish_chunks_yield_nothing() {
        let role_only = json!({
            "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": null}]
        });
        assert!(extract_deltas(&role_only).is_empty());

        let finish = json!({
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
        });
        assert!(extract_deltas(&finish).is_empty());
    }

    #[test]
    fn test_empty_content_filtered() {
        let event = json!({
            "choices": [{"index": 0, "delta": {"content": ""}, "finish_reason": null}]
        });
        assert!(extract_deltas(&event).is_empty());
    }
}
