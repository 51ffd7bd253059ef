//! Message transforms
//!
//! Pure conversions from the generic `Message` history plus the current
//! request's image attachments to each provider's wire shape. Attachments
//! go on the last user message only; historical image references stay
//! inline on the message that carried them.

use super::providers::anthropic::types::{
    AnthropicContentBlock, AnthropicImageSource, AnthropicMessage,
};
use super::providers::google::types::{GoogleContent, GoogleInlineData, GooglePart};
use super::providers::openai::types::{
    OpenAIContent, OpenAIContentPart, OpenAIImageUrl, OpenAIMessage,
};
use super::{ImageAttachment, Message, Role};

/// Stand-in text when an image arrives with no accompanying prompt
pub const IMAGE_PLACEHOLDER: &str = "Please analyze this image.";

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Index of the message that receives the current request's attachments
fn last_user_index(messages: &[Message]) -> Option<usize> {
    messages.iter().rposition(|m| m.role == Role::User)
}

/// Text body for a message, substituting the placeholder when images are
/// present but the text is blank
fn body_text(message: &Message, has_images: bool) -> String {
    let trimmed = message.content.trim();
    if trimmed.is_empty() && has_images {
        IMAGE_PLACEHOLDER.to_string()
    } else {
        message.content.clone()
    }
}

/// Convert to Anthropic content-block messages.
pub fn to_anthropic(messages: &[Message], images: &[ImageAttachment]) -> Vec<AnthropicMessage> {
    let attach_at = last_user_index(messages);
    messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            let mut content = Vec::new();
            if let (Some(data), Some(media_type)) = (&message.image_data, &message.media_type) {
                content.push(AnthropicContentBlock::Image {
                    source: AnthropicImageSource::base64(media_type.clone(), data.clone()),
                });
            }
            let current = attach_at == Some(i);
            if current {
                for image in images {
                    content.push(AnthropicContentBlock::Image {
                        source: AnthropicImageSource::base64(
                            image.media_type.clone(),
                            image.data.clone(),
                        ),
                    });
                }
            }
            let has_images = !content.is_empty();
            content.push(AnthropicContentBlock::Text {
                text: body_text(message, has_images),
            });
            AnthropicMessage {
                role: role_str(message.role).to_string(),
                content,
            }
        })
        .collect()
}

/// Convert to OpenAI chat messages. Text-only turns stay plain strings;
/// turns with images become parts arrays.
pub fn to_openai(messages: &[Message], images: &[ImageAttachment]) -> Vec<OpenAIMessage> {
    let attach_at = last_user_index(messages);
    messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            let mut parts = Vec::new();
            if let (Some(data), Some(media_type)) = (&message.image_data, &message.media_type) {
                parts.push(OpenAIContentPart::ImageUrl {
                    image_url: OpenAIImageUrl::data_url(media_type, data),
                });
            }
            if attach_at == Some(i) {
                for image in images {
                    parts.push(OpenAIContentPart::ImageUrl {
                        image_url: OpenAIImageUrl::data_url(&image.media_type, &image.data),
                    });
                }
            }
            let content = if parts.is_empty() {
                OpenAIContent::Text(message.content.clone())
            } else {
                parts.push(OpenAIContentPart::Text {
                    text: body_text(message, true),
                });
                OpenAIContent::Parts(parts)
            };
            OpenAIMessage {
                role: role_str(message.role).to_string(),
                content,
            }
        })
        .collect()
}

/// Convert to Google contents. Assistant turns take the `model` role and
/// inline images travel as `inlineData` parts ahead of the text.
pub fn to_google(messages: &[Message], images: &[ImageAttachment]) -> Vec<GoogleContent> {
    let attach_at = last_user_index(messages);
    messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            let mut parts = Vec::new();
            if let (Some(data), Some(media_type)) = (&message.image_data, &message.media_type) {
                parts.push(GooglePart::InlineData {
                    inline_data: GoogleInlineData {
                        mime_type: media_type.clone(),
                        data: data.clone(),
                    },
                });
            }
            if attach_at == Some(i) {
                for image in images {
                    parts.push(GooglePart::InlineData {
                        inline_data: GoogleInlineData {
                            mime_type: image.media_type.clone(),
                            data: image.data.clone(),
                        },
                    });
                }
            }
            let has_images = !parts.is_empty();
            parts.push(GooglePart::Text {
                text: body_text(message, has_images),
            });
            GoogleContent {
                role: match message.role {
                    Role::User => "user".to_string(),
                    Role::Assistant => "model".to_string(),
                },
                parts,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Vec<Message> {
        vec![
            Message::user("first question"),
            Message::assistant("first answer"),
            Message::user("second question"),
        ]
    }

    fn png() -> ImageAttachment {
        ImageAttachment {
            data: "aW1hZ2U=".to_string(),
            media_type: "image/png".to_string(),
        }
    }

    #[test]
    fn test_text_round_trip_all_providers() {
        let messages = history();
        let anthropic = to_anthropic(&messages, &[]);
        let openai = to_openai(&messages, &[]);
        let google = to_google(&messages, &[]);
        for (i, original) in messages.iter().enumerate() {
            assert_eq!(anthropic[i].text(), original.content);
            assert_eq!(openai[i].text(), original.content);
            assert_eq!(google[i].text(), original.content);
        }
    }

    #[test]
    fn test_images_attach_to_last_user_message_only() {
        let messages = history();
        let images = vec![png()];

        let anthropic = to_anthropic(&messages, &images);
        assert_eq!(anthropic[0].content.len(), 1);
        assert_eq!(anthropic[2].content.len(), 2);
        assert!(matches!(
            anthropic[2].content[0],
            AnthropicContentBlock::Image { .. }
        ));

        let openai = to_openai(&messages, &images);
        assert!(matches!(openai[0].content, OpenAIContent::Text(_)));
        assert!(matches!(openai[2].content, OpenAIContent::Parts(_)));
    }

    #[test]
    fn test_historical_image_preserved_inline() {
        let mut messages = history();
        messages[0].image_data = Some("b2xk".to_string());
        messages[0].media_type = Some("image/jpeg".to_string());

        let google = to_google(&messages, &[]);
        assert_eq!(google[0].parts.len(), 2);
        assert!(matches!(google[0].parts[0], GooglePart::InlineData { .. }));
        // Current-request images still target the last user message
        let google = to_google(&messages, &[png()]);
        assert_eq!(google[2].parts.len(), 2);
    }

    #[test]
    fn test_blank_text_with_image_gets_placeholder() {
        let messages = vec![Message::user("   ")];
        let anthropic = to_anthropic(&messages, &[png()]);
        assert_eq!(anthropic[0].text(), IMAGE_PLACEHOLDER);

        let google = to_google(&messages, &[png()]);
        assert_eq!(google[0].text(), IMAGE_PLACEHOLDER);
    }

    #[test]
    fn test_blank_text_without_image_stays_blank() {
        let messages = vec![Message::user("")];
        let openai = to_openai(&messages, &[]);
        assert_eq!(openai[0].text(), "");
    }

    #[test]
    fn test_google_assistant_role_is_model() {
        let google = to_google(&history(), &[]);
        assert_eq!(google[1].role, "model");
        assert_eq!(google[0].role, "user");
    }

    #[test]
    fn test_openai_data_url_shape() {
        let url = OpenAIImageUrl::data_url("image/png", "Zm9v").url;
        assert_eq!(url, "data:image/png;base64,Zm9v");
    }
}
