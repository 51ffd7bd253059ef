//! Anthropic provider client
//!
//! Calls the messages API with `stream: true` and exposes a delta
//! extractor for `content_block_delta` events.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};

use crate::llm::providers::{
    network_error, upstream_error, AdapterStream, CallOptions, ProviderClient,
};
use crate::llm::transforms::to_anthropic;
use crate::llm::{GatewayResult, ImageAttachment, Message, Provider, ThinkingLevel};

use super::config;
use super::types::AnthropicRequest;

pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
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
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|e| {
                crate::llm::GatewayError::Internal(format!("invalid API key format: {}", e))
            })?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(config::API_VERSION),
        );
        Ok(headers)
    }
}

/// Pull text deltas out of one parsed stream event
pub fn extract_deltas(event: &serde_json::Value) -> Vec<String> {
    if event.get("type").and_then(|t| t.as_str()) != Some("content_block_delta") {
        return Vec::new();
    }
    event
        .get("delta")
        .and_then(|d| d.get("text"))
        .and_then(|t| t.as_str())
        .map(|t| vec![t.to_string()])
        .unwrap_or_default()
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    async fn call_stream(
        &self,
        model_id: &str,
        budget_cap: u32,
        messages: &[Message],
        images: &[ImageAttachment],
        opts: &CallOptions,
    ) -> GatewayResult<AdapterStream> {
        let body = AnthropicRequest {
            model: model_id.to_string(),
            max_tokens: opts.max_output_tokens.unwrap_or(budget_cap),
            messages: to_anthropic(messages, images),
            stream: true,
        };

        let url = format!("{}/v1/messages", self.base_url);
        debug!(model = model_id, "anthropic stream request");

        let response = self
            .client
            .post(&url)
            .headers(self.build_headers()?)
            .json(&body)
            .timeout(Duration::from_secs(config::TIMEOUT_SECONDS))
            .send()
            .await
            .map_err(|e| network_error(Provider::Anthropic, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            error!(status, "anthropic API error: {}", text);
            return Err(upstream_error(Provider::Anthropic, status, &text));
        }

        Ok(AdapterStream {
            bytes: Box::pin(response.bytes_stream()),
            extract_deltas,
            effective_model_id: model_id.to_string(),
            effective_thinking_level: ThinkingLevel::None,
        })
    }

    fn provider(&self) -> Provider {
        Provider::Anthropic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_content_delta() {
        let event = json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": "Hello"}
        });
        assert_eq!(extract_deltas(&event), vec!["Hello".to_string()]);
    }

    #[test]
    fn test_non_content_events_yield_nothing() {
        for event in [
            json!({"type": "ping"}),
            json!({"type": "message_start", "message": {}}),
            json!({"type": "message_stop"}),
            json!({"type": "content_block_delta", "delta": {"type": "input_json_delta"}}),
        ] {
            assert!(extract_deltas(&event).is_empty());
        }
    }
}
