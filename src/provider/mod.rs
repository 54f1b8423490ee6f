//! Provider gateway: a uniform interface over AI vision backends.
//!
//! Every variant takes the same analyze request and returns raw reply
//! text; only the normalizer is allowed to interpret it. Transport, auth
//! and timeout failures surface as [`ProviderError`] and are converted to
//! per-item skips by the caller, never propagated.

pub mod anthropic;
pub mod gemini;
pub mod heuristic;
pub mod ollama;
pub mod openai;
pub mod prompt;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::config::{ProviderConfig, ProviderType};
use crate::error::ProviderError;
use crate::media::MediaItem;

/// Longest image edge sent to a vision endpoint.
const MAX_IMAGE_DIMENSION: u32 = 1024;

/// Image payload ready for a vision call.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub base64: String,
    pub media_type: &'static str,
}

/// Everything a provider needs to classify one media item.
pub struct AnalyzeRequest<'a> {
    pub item: &'a MediaItem,
    /// Known folder paths, alphabetically ordered by the resolver.
    pub folder_context: &'a [String],
    pub max_depth: u32,
    pub allow_new_folders: bool,
    pub image: Option<EncodedImage>,
    pub suggested_folders: &'a [String],
    pub custom_context: Option<&'a str>,
}

/// Uniform capability set over AI backends.
pub trait AnalysisProvider: Send + Sync {
    /// Ask the backend to classify one item. Returns the raw reply text.
    fn analyze(&self, request: &AnalyzeRequest) -> Result<String, ProviderError>;

    /// Connectivity probe with no side effects. `None` means reachable;
    /// `Some` carries a diagnostic string.
    fn test(&self) -> Option<String>;

    fn is_configured(&self) -> bool;

    fn available_models(&self) -> Vec<String>;

    fn name(&self) -> &'static str;
}

/// Create a provider based on configuration.
pub fn create_provider(config: &ProviderConfig) -> Box<dyn AnalysisProvider> {
    match config.provider {
        ProviderType::OpenAi => Box::new(openai::OpenAiCompatibleProvider::openai(config)),
        ProviderType::AzureOpenAi => Box::new(openai::OpenAiCompatibleProvider::azure(config)),
        ProviderType::Grok => Box::new(openai::OpenAiCompatibleProvider::grok(config)),
        ProviderType::Exo => Box::new(openai::OpenAiCompatibleProvider::exo(config)),
        ProviderType::Anthropic => Box::new(anthropic::AnthropicProvider::new(config)),
        ProviderType::Gemini => Box::new(gemini::GeminiProvider::new(config)),
        ProviderType::Ollama => Box::new(ollama::OllamaProvider::new(config)),
        ProviderType::Heuristic => Box::new(heuristic::HeuristicProvider::new()),
    }
}

/// Client wrapper around a provider. Caches the configuration check so
/// status polling does not trigger repeated validation round-trips.
pub struct ProviderClient {
    provider: Arc<dyn AnalysisProvider>,
    configured: OnceLock<bool>,
}

impl ProviderClient {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            provider: Arc::from(create_provider(config)),
            configured: OnceLock::new(),
        }
    }

    pub fn new(provider: Box<dyn AnalysisProvider>) -> Self {
        Self {
            provider: Arc::from(provider),
            configured: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn analyze(&self, request: &AnalyzeRequest) -> Result<String, ProviderError> {
        self.provider.analyze(request)
    }

    pub fn test(&self) -> Option<String> {
        self.provider.test()
    }

    pub fn is_configured(&self) -> bool {
        *self
            .configured
            .get_or_init(|| self.provider.is_configured())
    }

    pub fn available_models(&self) -> Vec<String> {
        self.provider.available_models()
    }
}

impl Clone for ProviderClient {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            configured: OnceLock::new(),
        }
    }
}

/// Load an image, downscale if either dimension exceeds the cap, re-encode
/// as JPEG, and return the base64 payload.
pub fn encode_image(path: &Path) -> Result<EncodedImage> {
    let img = image::open(path)
        .map_err(|e| anyhow!("failed to open image {}: {}", path.display(), e))?;

    let (width, height) = img.dimensions();
    let img = if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
        img.resize(
            MAX_IMAGE_DIMENSION,
            MAX_IMAGE_DIMENSION,
            image::imageops::FilterType::Triangle,
        )
    } else {
        img
    };

    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, 85);
    img.write_with_encoder(encoder)
        .map_err(|e| anyhow!("failed to encode image as JPEG: {}", e))?;

    Ok(EncodedImage {
        base64: BASE64.encode(buf.into_inner()),
        media_type: "image/jpeg",
    })
}

/// Map a ureq failure onto the provider error taxonomy.
pub(crate) fn classify_transport_error(err: ureq::Error, timeout_secs: u64) -> ProviderError {
    match err {
        ureq::Error::Status(code, _) if code == 401 || code == 403 => {
            ProviderError::Auth(format!("HTTP {code}"))
        }
        ureq::Error::Status(code, response) => {
            ProviderError::Transport(format!("HTTP {} {}", code, response.status_text()))
        }
        ureq::Error::Transport(transport) => {
            let message = transport.to_string();
            if message.contains("timed out") || message.contains("timeout") {
                ProviderError::Timeout(timeout_secs)
            } else {
                ProviderError::Transport(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;

    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
    }

    impl AnalysisProvider for CountingProvider {
        fn analyze(&self, _request: &AnalyzeRequest) -> Result<String, ProviderError> {
            Ok(String::new())
        }

        fn test(&self) -> Option<String> {
            None
        }

        fn is_configured(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn available_models(&self) -> Vec<String> {
            Vec::new()
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[test]
    fn test_is_configured_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = ProviderClient::new(Box::new(CountingProvider {
            calls: calls.clone(),
        }));
        assert!(client.is_configured());
        assert!(client.is_configured());
        assert!(client.is_configured());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_factory_picks_heuristic_by_default() {
        let provider = create_provider(&Default::default());
        assert_eq!(provider.name(), "Heuristic");
        assert!(provider.is_configured());
    }
}
