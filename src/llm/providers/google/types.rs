//! Google wire types
//!
//! Request shapes for the Gemini generateContent API. Roles are
//! `user`/`model`, content is a parts array, and inline images travel as
//! `inlineData` parts ahead of the text.

use serde::{Deserialize, Serialize};

/// generateContent request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleRequest {
    pub contents: Vec<GoogleContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GoogleGenerationConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleGenerationConfig {
    pub max_output_tokens: u32,
    /// Thinking-level hint for flash-class models; dropped on retry when
    /// the upstream rejects it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<GoogleThinkingConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleThinkingConfig {
    pub thinking_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleContent {
    pub role: String,
    pub parts: Vec<GooglePart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GooglePart {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GoogleInlineData,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleInlineData {
    pub mime_type: String,
    pub data: String,
}

impl GoogleContent {
    /// Concatenated text content, used for round-trip checks
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                GooglePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Response shape of the model-listing endpoint used by the alias resolver
#[derive(Debug, Deserialize)]
pub struct GoogleModelList {
    #[serde(default)]
    pub models: Vec<GoogleModelEntry>,
}

#[derive(Debug, Deserialize)]
pub struct GoogleModelEntry {
    /// Fully qualified name, e.g. `models/gemini-3-flash-002`
    pub name: String,
}

/// Error envelope returned on non-2xx responses
#[derive(Debug, Deserialize)]
pub struct GoogleError {
    pub error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct GoogleErrorDetail {
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}
