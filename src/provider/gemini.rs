//! Google Gemini provider (generateContent REST API).

use serde::{Deserialize, Serialize};

use super::{classify_transport_error, prompt, AnalysisProvider, AnalyzeRequest};
use crate::config::ProviderConfig;
use crate::error::ProviderError;

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiProvider {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        let endpoint = if config.endpoint.is_empty() {
            GEMINI_ENDPOINT.to_string()
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

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.endpoint,
            self.model,
            self.api_key.as_deref().unwrap_or("")
        )
    }
}

impl AnalysisProvider for GeminiProvider {
    fn analyze(&self, request: &AnalyzeRequest) -> Result<String, ProviderError> {
        let mut parts = vec![Part::Text {
            text: prompt::build_prompt(request),
        }];
        if let Some(ref image) = request.image {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: image.media_type.to_string(),
                    data: image.base64.clone(),
                },
            });
        }

        let body = GenerateRequest {
            contents: vec![Content { parts }],
        };

        let response = self
            .agent()
            .post(&self.generate_url())
            .set("Content-Type", "application/json")
            .send_json(&body)
            .map_err(|e| classify_transport_error(e, self.timeout_secs))?;

        let reply: GenerateResponse = response
            .into_json()
            .map_err(|e| ProviderError::EmptyReply(e.to_string()))?;

        let text: String = reply
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            Err(ProviderError::EmptyReply(
                "no text candidate in reply".to_string(),
            ))
        } else {
            Ok(text)
        }
    }

    fn test(&self) -> Option<String> {
        let url = format!(
            "{}/v1beta/models?key={}",
            self.endpoint,
            self.api_key.as_deref().unwrap_or("")
        );
        match self.agent().get(&url).call() {
            Ok(_) => None,
            Err(e) => Some(classify_transport_error(e, self.timeout_secs).to_string()),
        }
    }

    fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    fn available_models(&self) -> Vec<String> {
        vec![
            "gemini-2.0-flash".to_string(),
            "gemini-2.0-flash-lite".to_string(),
            "gemini-1.5-pro".to_string(),
        ]
    }

    fn name(&self) -> &'static str {
        "Google Gemini"
    }
}
