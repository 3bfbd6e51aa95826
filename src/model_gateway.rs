//! Model Gateway Module
//!
//! The single boundary where requests leave the process for a hosted
//! language model. Everything above this module talks to the
//! [`ModelGateway`] trait through a [`ModelAccess`] capability, which is
//! either `Disabled` (no API key) or `Enabled` with a concrete gateway.

use crate::error::AnalysisError;
use log::{debug, warn};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEXT_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One piece of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// Inline image content as a `data:` URL.
    pub fn inline_image(mime: &str, base64_data: &str) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{mime};base64,{base64_data}"),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn user(content: Vec<ContentPart>) -> Self {
        ChatMessage {
            role: Role::User,
            content,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user(vec![ContentPart::text(text)])
    }
}

/// A chat-completions request as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// All text parts of all messages, joined by newlines.
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn image_count(&self) -> usize {
        self.messages
            .iter()
            .flat_map(|m| m.content.iter())
            .filter(|part| matches!(part, ContentPart::ImageUrl { .. }))
            .count()
    }
}

/// Sends one request to a hosted model and returns the text of the first
/// completion choice.
pub trait ModelGateway: Send + Sync {
    fn complete(&self, request: &ChatRequest) -> Result<String, AnalysisError>;
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Gateway for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiGateway {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl OpenAiGateway {
    pub fn new(api_key: &str, api_base: &str, timeout: Duration) -> Result<Self, AnalysisError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(OpenAiGateway {
            client,
            endpoint: format!("{}/chat/completions", api_base.trim().trim_end_matches('/')),
            api_key: api_key.to_string(),
        })
    }
}

impl ModelGateway for OpenAiGateway {
    fn complete(&self, request: &ChatRequest) -> Result<String, AnalysisError> {
        debug!("Sending request to {} (model {})", self.endpoint, request.model);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnalysisError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletion = response
            .json()
            .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;
        first_choice_text(completion)
    }
}

fn first_choice_text(completion: ChatCompletion) -> Result<String, AnalysisError> {
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| AnalysisError::MalformedResponse("response has no message content".into()))
}

/// Connection settings for the hosted model.
#[derive(Clone)]
pub struct ModelSettings {
    pub api_key: Option<String>,
    pub api_base: String,
    pub vision_model: String,
    pub text_model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for ModelSettings {
    fn default() -> Self {
        ModelSettings {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl fmt::Debug for ModelSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("vision_model", &self.vision_model)
            .field("text_model", &self.text_model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Capability to reach a model. Built once at startup and handed to every
/// analysis component by reference.
pub enum ModelAccess<G = OpenAiGateway> {
    Disabled,
    Enabled(G),
}

impl<G: ModelGateway> ModelAccess<G> {
    pub fn is_enabled(&self) -> bool {
        matches!(self, ModelAccess::Enabled(_))
    }

    /// The gateway, or [`AnalysisError::Disabled`] without touching the network.
    pub fn gateway(&self) -> Result<&G, AnalysisError> {
        match self {
            ModelAccess::Enabled(gateway) => Ok(gateway),
            ModelAccess::Disabled => Err(AnalysisError::Disabled),
        }
    }
}

impl ModelAccess<OpenAiGateway> {
    /// Builds the capability from settings. A missing or blank API key yields
    /// `Disabled` and logs a single warning.
    pub fn from_settings(settings: &ModelSettings) -> Result<Self, AnalysisError> {
        match settings.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(ModelAccess::Enabled(OpenAiGateway::new(
                key,
                &settings.api_base,
                settings.timeout,
            )?)),
            _ => {
                warn!("No OpenAI API key provided. LLM analysis will be disabled.");
                Ok(ModelAccess::Disabled)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_to_chat_completions_shape() {
        let request = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage::user(vec![
                ContentPart::text("Describe"),
                ContentPart::inline_image("image/png", "AAAA"),
            ])],
            max_tokens: Some(500),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "gpt-4o",
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "Describe"},
                        {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
                    ]
                }],
                "max_tokens": 500
            })
        );
    }

    #[test]
    fn max_tokens_is_omitted_when_unset() {
        let request = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage::user_text("hi")],
            max_tokens: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("max_tokens").is_none());
        assert_eq!(request.prompt_text(), "hi");
        assert_eq!(request.image_count(), 0);
    }

    #[test]
    fn first_choice_content_is_returned() {
        let completion: ChatCompletion = serde_json::from_value(json!({
            "choices": [
                {"message": {"role": "assistant", "content": "first"}},
                {"message": {"role": "assistant", "content": "second"}}
            ]
        }))
        .unwrap();
        assert_eq!(first_choice_text(completion).unwrap(), "first");
    }

    #[test]
    fn missing_choices_is_malformed() {
        let completion: ChatCompletion = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(
            first_choice_text(completion),
            Err(AnalysisError::MalformedResponse(_))
        ));

        let completion: ChatCompletion = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": null}}]
        }))
        .unwrap();
        assert!(matches!(
            first_choice_text(completion),
            Err(AnalysisError::MalformedResponse(_))
        ));
    }

    #[test]
    fn missing_or_blank_key_disables_access() {
        let settings = ModelSettings::default();
        let access = ModelAccess::from_settings(&settings).unwrap();
        assert!(!access.is_enabled());
        assert!(matches!(access.gateway(), Err(AnalysisError::Disabled)));

        let settings = ModelSettings {
            api_key: Some("   ".to_string()),
            ..ModelSettings::default()
        };
        assert!(!ModelAccess::from_settings(&settings).unwrap().is_enabled());
    }

    #[test]
    fn debug_output_hides_api_key() {
        let settings = ModelSettings {
            api_key: Some("sk-secret".to_string()),
            ..ModelSettings::default()
        };
        let printed = format!("{:?}", settings);
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn configured_key_enables_access() {
        let settings = ModelSettings {
            api_key: Some("sk-test".to_string()),
            api_base: "http://localhost:9/v1/".to_string(),
            ..ModelSettings::default()
        };
        let access = ModelAccess::from_settings(&settings).unwrap();
        let gateway = access.gateway().unwrap();
        assert_eq!(gateway.endpoint, "http://localhost:9/v1/chat/completions");
    }
}
