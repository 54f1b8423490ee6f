use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hard ceiling on provider call timeouts, regardless of configuration.
pub const MAX_PROVIDER_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub library: LibraryConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    OpenAi,
    AzureOpenAi,
    Anthropic,
    Gemini,
    Ollama,
    Grok,
    Exo,
    #[default]
    Heuristic,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub provider: ProviderType,

    /// Base endpoint. Empty means the vendor default.
    #[serde(default)]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Azure only: the api-version query parameter.
    #[serde(default)]
    pub api_version: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Optional operator context prepended to the classification prompt.
    #[serde(default)]
    pub custom_context: Option<String>,
}

impl ProviderConfig {
    /// Configured timeout clamped to the hard maximum.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs_clamped())
    }

    pub fn timeout_secs_clamped(&self) -> u64 {
        self.timeout_secs.min(MAX_PROVIDER_TIMEOUT_SECS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Media items per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum folder nesting depth the provider may propose.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    #[serde(default = "default_allow_new_folders")]
    pub allow_new_folders: bool,

    /// Capacity of the recent-results ring buffer on the scan session.
    #[serde(default = "default_recent_results")]
    pub recent_results: usize,

    /// A running session with no queue activity for this long is failed.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: i64,

    /// Folder names surfaced to the provider as suggestions.
    #[serde(default)]
    pub suggested_folders: Vec<String>,
}

fn default_chunk_size() -> usize {
    10
}

fn default_max_depth() -> u32 {
    2
}

fn default_allow_new_folders() -> bool {
    true
}

fn default_recent_results() -> usize {
    50
}

fn default_stale_after_secs() -> i64 {
    300
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_depth: default_max_depth(),
            allow_new_folders: default_allow_new_folders(),
            recent_results: default_recent_results(),
            stale_after_secs: default_stale_after_secs(),
            suggested_folders: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            media_extensions: default_media_extensions(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mediatheca")
        .join("mediatheca.db")
}

fn default_model() -> String {
    String::new()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_media_extensions() -> Vec<String> {
    [
        "jpg", "jpeg", "png", "gif", "webp", "heic", "heif", "bmp", "tif", "tiff", "mp4", "mov",
        "mkv", "webm", "avi", "pdf", "doc", "docx", "txt", "mp3", "wav",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            provider: ProviderConfig::default(),
            scan: ScanConfig::default(),
            library: LibraryConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mediatheca")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}
