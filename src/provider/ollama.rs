//! Ollama provider (local inference server).

use serde::{Deserialize, Serialize};

use super::{classify_transport_error, prompt, AnalysisProvider, AnalyzeRequest};
use crate::config::ProviderConfig;
use crate::error::ProviderError;

const OLLAMA_ENDPOINT: &str = "http://localhost:11434";

pub struct OllamaProvider {
    endpoint: String,
    model: String,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    images: Vec<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        let endpoint = if config.endpoint.is_empty() {
            OLLAMA_ENDPOINT.to_string()
        } else {
            config.endpoint.trim_end_matches('/').to_string()
        };
        Self {
            endpoint,
            model: config.model.clone(),
            timeout_secs: config.timeout_secs_clamped(),
        }
    }

    fn agent(&self) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()
    }
}

impl AnalysisProvider for OllamaProvider {
    fn analyze(&self, request: &AnalyzeRequest) -> Result<String, ProviderError> {
        let images = request
            .image
            .as_ref()
            .map(|i| vec![i.base64.clone()])
            .unwrap_or_default();

        let body = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt::build_prompt(request),
            images,
            stream: false,
        };

        let response = self
            .agent()
            .post(&format!("{}/api/generate", self.endpoint))
            .set("Content-Type", "application/json")
            .send_json(&body)
            .map_err(|e| classify_transport_error(e, self.timeout_secs))?;

        let reply: OllamaResponse = response
            .into_json()
            .map_err(|e| ProviderError::EmptyReply(e.to_string()))?;

        Ok(reply.response)
    }

    fn test(&self) -> Option<String> {
        match self.agent().get(&format!("{}/api/tags", self.endpoint)).call() {
            Ok(_) => None,
            Err(e) => Some(classify_transport_error(e, self.timeout_secs).to_string()),
        }
    }

    fn is_configured(&self) -> bool {
        !self.model.is_empty()
    }

    /// The local install defines the model set, so probe it live.
    fn available_models(&self) -> Vec<String> {
        let response = match self
            .agent()
            .get(&format!("{}/api/tags", self.endpoint))
            .call()
        {
            Ok(r) => r,
            Err(_) => return Vec::new(),
        };
        match response.into_json::<TagsResponse>() {
            Ok(tags) => tags.models.into_iter().map(|m| m.name).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn name(&self) -> &'static str {
        "Ollama"
    }
}
