//! OpenAI-compatible chat completions provider.
//!
//! One implementation serves every vendor speaking this dialect: OpenAI
//! itself, Azure OpenAI (deployment URL + api-key header), Grok, and a
//! local Exo cluster.

use serde::{Deserialize, Serialize};

use super::{classify_transport_error, prompt, AnalysisProvider, AnalyzeRequest};
use crate::config::ProviderConfig;
use crate::error::ProviderError;

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
const GROK_ENDPOINT: &str = "https://api.x.ai/v1";
const EXO_ENDPOINT: &str = "http://localhost:52415/v1";
const AZURE_DEFAULT_API_VERSION: &str = "2024-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// Azure: `api-key: <key>` plus api-version query parameter
    AzureKey,
}

pub struct OpenAiCompatibleProvider {
    name: &'static str,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    auth: AuthStyle,
    api_version: Option<String>,
    timeout_secs: u64,
    known_models: &'static [&'static str],
    /// Local deployments are usable without an API key.
    key_optional: bool,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OpenAiCompatibleProvider {
    pub fn openai(config: &ProviderConfig) -> Self {
        Self::build(config, "OpenAI", OPENAI_ENDPOINT, AuthStyle::Bearer, false)
            .with_known_models(&["gpt-4o", "gpt-4o-mini", "gpt-4.1", "gpt-4.1-mini"])
    }

    pub fn azure(config: &ProviderConfig) -> Self {
        Self::build(config, "Azure OpenAI", "", AuthStyle::AzureKey, false)
    }

    pub fn grok(config: &ProviderConfig) -> Self {
        Self::build(config, "Grok", GROK_ENDPOINT, AuthStyle::Bearer, false)
            .with_known_models(&["grok-2-vision-1212", "grok-2-1212"])
    }

    pub fn exo(config: &ProviderConfig) -> Self {
        Self::build(config, "Exo", EXO_ENDPOINT, AuthStyle::Bearer, true)
    }

    fn build(
        config: &ProviderConfig,
        name: &'static str,
        default_endpoint: &str,
        auth: AuthStyle,
        key_optional: bool,
    ) -> Self {
        let endpoint = if config.endpoint.is_empty() {
            default_endpoint.to_string()
        } else {
            config.endpoint.trim_end_matches('/').to_string()
        };
        Self {
            name,
            endpoint,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            auth,
            api_version: config.api_version.clone(),
            timeout_secs: config.timeout_secs_clamped(),
            known_models: &[],
            key_optional,
        }
    }

    fn with_known_models(mut self, models: &'static [&'static str]) -> Self {
        self.known_models = models;
        self
    }

    fn chat_url(&self) -> String {
        match self.auth {
            AuthStyle::Bearer => format!("{}/chat/completions", self.endpoint),
            AuthStyle::AzureKey => {
                let version = self
                    .api_version
                    .as_deref()
                    .unwrap_or(AZURE_DEFAULT_API_VERSION);
                format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    self.endpoint, self.model, version
                )
            }
        }
    }

    fn models_url(&self) -> String {
        match self.auth {
            AuthStyle::Bearer => format!("{}/models", self.endpoint),
            AuthStyle::AzureKey => {
                let version = self
                    .api_version
                    .as_deref()
                    .unwrap_or(AZURE_DEFAULT_API_VERSION);
                format!("{}/openai/models?api-version={}", self.endpoint, version)
            }
        }
    }

    fn agent(&self) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()
    }

    fn authorize(&self, mut req: ureq::Request) -> ureq::Request {
        if let Some(ref key) = self.api_key {
            req = match self.auth {
                AuthStyle::Bearer => req.set("Authorization", &format!("Bearer {key}")),
                AuthStyle::AzureKey => req.set("api-key", key),
            };
        }
        req
    }
}

impl AnalysisProvider for OpenAiCompatibleProvider {
    fn analyze(&self, request: &AnalyzeRequest) -> Result<String, ProviderError> {
        let mut content = vec![ContentPart::Text {
            text: prompt::build_prompt(request),
        }];
        if let Some(ref image) = request.image {
            content.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:{};base64,{}", image.media_type, image.base64),
                },
            });
        }

        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content,
            }],
            max_tokens: 500,
            temperature: 0.2,
        };

        let req = self
            .authorize(self.agent().post(&self.chat_url()))
            .set("Content-Type", "application/json");

        let response = req
            .send_json(&body)
            .map_err(|e| classify_transport_error(e, self.timeout_secs))?;

        let chat: ChatResponse = response
            .into_json()
            .map_err(|e| ProviderError::EmptyReply(e.to_string()))?;

        chat.choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| ProviderError::EmptyReply("no choices in reply".to_string()))
    }

    fn test(&self) -> Option<String> {
        let req = self.authorize(self.agent().get(&self.models_url()));
        match req.call() {
            Ok(_) => None,
            Err(e) => Some(classify_transport_error(e, self.timeout_secs).to_string()),
        }
    }

    fn is_configured(&self) -> bool {
        let keyed = self.api_key.as_deref().is_some_and(|k| !k.is_empty());
        let endpoint_ok = !self.endpoint.is_empty();
        let model_ok = !self.model.is_empty();
        match self.auth {
            AuthStyle::AzureKey => keyed && endpoint_ok && model_ok,
            AuthStyle::Bearer => (keyed || self.key_optional) && endpoint_ok && model_ok,
        }
    }

    fn available_models(&self) -> Vec<String> {
        self.known_models.iter().map(|m| m.to_string()).collect()
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
