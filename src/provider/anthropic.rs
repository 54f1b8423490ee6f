//! Anthropic Claude provider.

use serde::{Deserialize, Serialize};

use super::{classify_transport_error, prompt, AnalysisProvider, AnalyzeRequest};
use crate::config::ProviderConfig;
use crate::error::ProviderError;

const ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

pub struct AnthropicProvider {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum AnthropicContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { source: AnthropicImageSource },
}

#[derive(Debug, Serialize)]
struct AnthropicImageSource {
    #[serde(rename = "type")]
    source_type: String,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponseContent {
    text: Option<String>,
}

impl AnthropicProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        let endpoint = if config.endpoint.is_empty() {
            ANTHROPIC_ENDPOINT.to_string()
        } else {
            config.endpoint.trim_end_matches('/').to_string()
        };
        let model = if config.model.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            config.model.clone()
        };
        Self {
            endpoint,
            api_key: config.api_key.clone(),
            model,
            timeout_secs: config.timeout_secs_clamped(),
        }
    }

    fn agent(&self) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()
    }

    fn request(&self, path: &str) -> ureq::Request {
        self.agent()
            .post(&format!("{}{}", self.endpoint, path))
            .set("Content-Type", "application/json")
            .set("x-api-key", self.api_key.as_deref().unwrap_or(""))
            .set("anthropic-version", ANTHROPIC_VERSION)
    }
}

impl AnalysisProvider for AnthropicProvider {
    fn analyze(&self, request: &AnalyzeRequest) -> Result<String, ProviderError> {
        let mut content = Vec::new();
        if let Some(ref image) = request.image {
            content.push(AnthropicContent::Image {
                source: AnthropicImageSource {
                    source_type: "base64".to_string(),
                    media_type: image.media_type.to_string(),
                    data: image.base64.clone(),
                },
            });
        }
        content.push(AnthropicContent::Text {
            text: prompt::build_prompt(request),
        });

        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: 500,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content,
            }],
        };

        let response = self
            .request("/v1/messages")
            .send_json(&body)
            .map_err(|e| classify_transport_error(e, self.timeout_secs))?;

        let reply: AnthropicResponse = response
            .into_json()
            .map_err(|e| ProviderError::EmptyReply(e.to_string()))?;

        reply
            .content
            .first()
            .and_then(|c| c.text.clone())
            .ok_or_else(|| ProviderError::EmptyReply("no text block in reply".to_string()))
    }

    fn test(&self) -> Option<String> {
        let req = self
            .agent()
            .get(&format!("{}/v1/models", self.endpoint))
            .set("x-api-key", self.api_key.as_deref().unwrap_or(""))
            .set("anthropic-version", ANTHROPIC_VERSION);
        match req.call() {
            Ok(_) => None,
            Err(e) => Some(classify_transport_error(e, self.timeout_secs).to_string()),
        }
    }

    fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    fn available_models(&self) -> Vec<String> {
        vec![
            "claude-opus-4-20250514".to_string(),
            "claude-sonnet-4-20250514".to_string(),
            "claude-3-5-haiku-20241022".to_string(),
        ]
    }

    fn name(&self) -> &'static str {
        "Anthropic Claude"
    }
}
