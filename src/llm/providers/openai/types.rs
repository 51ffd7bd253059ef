//! OpenAI wire types
//!
//! Chat-completions request shapes. Message content is either a plain
//! string or a parts array once images are involved.

use serde::{Deserialize, Serialize};

/// Chat completions request body.
///
/// Newer models take `max_completion_tokens`; the legacy field is kept as
/// an option because the client retries once with it on a 400 naming the
/// new field.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: OpenAIContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAIContent {
    Text(String),
    Parts(Vec<OpenAIContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAIContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAIImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIImageUrl {
    pub url: String,
}

impl OpenAIImageUrl {
    /// Data-URL form OpenAI expects for inline images
    pub fn data_url(media_type: &str, base64_data: &str) -> Self {
        Self {
            url: format!("data:{};base64,{}", media_type, base64_data),
        }
    }
}

impl OpenAIMessage {
    /// Concatenated text content, used for round-trip checks
    pub fn text(&self) -> String {
        match &self.content {
            OpenAIContent::Text(text) => text.clone(),
            OpenAIContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    OpenAIContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// Error envelope returned on non-2xx responses
#[derive(Debug, Deserialize)]
pub struct OpenAIError {
    pub error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
}
