//! Configuration loading for scanpipe
//!
//! Both processes read the same TOML file. The parsed configuration is
//! immutable and passed to each component at construction time. All request
//! store paths are resolved relative to the directory containing the config
//! file, so a deployment directory can be relocated as a unit.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from the TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// HTTP server settings (ingestion/serving process)
    #[serde(default)]
    pub server: ServerConfig,

    /// Request store directory layout
    pub requests: RequestsConfig,

    /// Processing worker settings
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Layout engine endpoint (required by the worker)
    #[serde(default)]
    pub engine: Option<EngineConfig>,

    /// Caption enrichment settings
    #[serde(default)]
    pub captions: CaptionsConfig,

    /// Music notation export settings
    #[serde(default)]
    pub music: MusicConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Request store directory layout
///
/// Relative paths are resolved against the config file's directory by
/// [`TomlConfig::load`].
#[derive(Debug, Clone, Deserialize)]
pub struct RequestsConfig {
    pub upload_path: PathBuf,
    pub result_path: PathBuf,
    pub logits_path: PathBuf,
    pub error_path: PathBuf,
    pub music_path: PathBuf,
}

/// Processing worker settings
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Upload directory scan interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Pad uploaded images to A4 aspect ratio before layout analysis
    #[serde(default)]
    pub pad_to_a4: bool,
}

/// Layout engine endpoint settings
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Layout engine process URL, e.g. `http://127.0.0.1:8510/process`
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,
}

/// Caption enrichment settings
#[derive(Debug, Clone, Deserialize)]
pub struct CaptionsConfig {
    /// Enable caption enrichment for non-text regions
    #[serde(default)]
    pub enabled: bool,

    /// API key, inline
    #[serde(default)]
    pub api_key: Option<String>,

    /// Path to a file whose first line is the API key
    #[serde(default)]
    pub api_key_file: Option<PathBuf>,

    /// Captioning endpoint (OpenAI-compatible chat completions)
    #[serde(default = "default_captions_endpoint")]
    pub endpoint: String,

    /// Model name sent to the captioning endpoint
    #[serde(default = "default_captions_model")]
    pub model: String,

    /// Crops larger than this are downscaled so the larger dimension matches
    #[serde(default = "default_max_image_size")]
    pub max_image_size: u32,

    /// Maximum concurrent caption requests per page
    #[serde(default = "default_caption_workers")]
    pub workers: usize,

    /// Request timeout in seconds
    #[serde(default = "default_captions_timeout")]
    pub timeout_secs: u64,
}

/// Music notation export settings
#[derive(Debug, Clone, Deserialize)]
pub struct MusicConfig {
    /// Enable music notation export
    #[serde(default)]
    pub enabled: bool,

    /// Notation rendering endpoint URL
    #[serde(default)]
    pub url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_music_timeout")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8500
}

fn default_poll_interval() -> u64 {
    1
}

fn default_engine_timeout() -> u64 {
    300
}

fn default_captions_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_captions_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_image_size() -> u32 {
    512
}

fn default_caption_workers() -> usize {
    4
}

fn default_captions_timeout() -> u64 {
    60
}

fn default_music_timeout() -> u64 {
    120
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            pad_to_a4: false,
        }
    }
}

impl Default for CaptionsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            api_key_file: None,
            endpoint: default_captions_endpoint(),
            model: default_captions_model(),
            max_image_size: default_max_image_size(),
            workers: default_caption_workers(),
            timeout_secs: default_captions_timeout(),
        }
    }
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            timeout_secs: default_music_timeout(),
        }
    }
}

impl TomlConfig {
    /// Load configuration from a TOML file and resolve relative store paths
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;

        let mut config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.requests.resolve_against(base);

        Ok(config)
    }

    /// Resolve the captioning API key from the config (inline key wins over
    /// key file). Returns None when captions are not configured with a key.
    pub fn caption_api_key(&self) -> Result<Option<String>> {
        if let Some(key) = &self.captions.api_key {
            return Ok(Some(key.trim().to_string()));
        }

        if let Some(key_file) = &self.captions.api_key_file {
            let content = std::fs::read_to_string(key_file).map_err(|e| {
                Error::Config(format!("cannot read API key file {}: {}", key_file.display(), e))
            })?;
            let key = content.lines().next().unwrap_or("").trim().to_string();
            if key.is_empty() {
                return Err(Error::Config(format!(
                    "API key file {} is empty",
                    key_file.display()
                )));
            }
            return Ok(Some(key));
        }

        Ok(None)
    }
}

impl RequestsConfig {
    fn resolve_against(&mut self, base: &Path) {
        for path in [
            &mut self.upload_path,
            &mut self.result_path,
            &mut self.logits_path,
            &mut self.error_path,
            &mut self.music_path,
        ] {
            if path.is_relative() {
                *path = base.join(path.as_path());
            }
        }
    }
}
