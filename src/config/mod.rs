use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::models::{AnalysisMode, MediaType};

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// Read on its own since tracing is set up before the rest of the config loads.
    pub fn from_env() -> Self {
        match env::var("LOG_FORMAT") {
            Ok(v) if v.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Parameters for one remote completion call.
#[derive(Clone, PartialEq)]
pub struct ModelProfile {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

// Keeps the api key out of logs.
impl std::fmt::Debug for ModelProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelProfile")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for ModelProfile {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_LLM_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 4000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub max_file_size_mb: usize,
    pub max_concurrent_requests: usize,
    pub stream_timeout_seconds: u64,
    pub allowed_media_types: Vec<MediaType>,
    pub upload_dir: PathBuf,
    pub cache_ttl_seconds: u64,
    pub cache_path: Option<PathBuf>,
    pub include_document_text: bool,
    pub max_document_chars: usize,
    pub standard_profile: ModelProfile,
    /// Placeholder mapping: unless overridden every field mirrors the standard profile.
    pub deep_thinker_profile: ModelProfile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 8080,
            max_file_size_mb: 10,
            max_concurrent_requests: 100,
            stream_timeout_seconds: 300,
            allowed_media_types: MediaType::ALL.to_vec(),
            upload_dir: PathBuf::from("uploads"),
            cache_ttl_seconds: 24 * 60 * 60,
            cache_path: None,
            include_document_text: true,
            max_document_chars: 12_000,
            standard_profile: ModelProfile::default(),
            deep_thinker_profile: ModelProfile::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");
        let defaults = Config::default();

        let standard_profile = ModelProfile {
            base_url: env_string("LLM_BASE_URL", DEFAULT_LLM_BASE_URL),
            api_key: env::var("LLM_API_KEY")
                .or_else(|_| env::var("OPENAI_API_KEY"))
                .unwrap_or_default(),
            model: env_string("LLM_MODEL", DEFAULT_LLM_MODEL),
            temperature: Self::parse_env_var("LLM_TEMPERATURE", 0.7_f32)
                .context("Failed to parse LLM_TEMPERATURE")?,
            max_tokens: Self::parse_env_var("LLM_MAX_TOKENS", 4000_u32)
                .context("Failed to parse LLM_MAX_TOKENS")?,
        };

        let deep_thinker_profile = ModelProfile {
            base_url: env_string("DEEP_THINKER_BASE_URL", &standard_profile.base_url),
            api_key: env_string("DEEP_THINKER_API_KEY", &standard_profile.api_key),
            model: env_string("DEEP_THINKER_MODEL", &standard_profile.model),
            temperature: Self::parse_env_var("DEEP_THINKER_TEMPERATURE", standard_profile.temperature)
                .context("Failed to parse DEEP_THINKER_TEMPERATURE")?,
            max_tokens: Self::parse_env_var("DEEP_THINKER_MAX_TOKENS", standard_profile.max_tokens)
                .context("Failed to parse DEEP_THINKER_MAX_TOKENS")?,
        };

        let allowed_media_types = match env::var("ALLOWED_MEDIA_TYPES") {
            Ok(raw) => parse_media_types(&raw).context("Failed to parse ALLOWED_MEDIA_TYPES")?,
            Err(_) => defaults.allowed_media_types.clone(),
        };

        let config = Config {
            server_host: env_string("SERVER_HOST", &defaults.server_host),
            server_port: Self::parse_env_var("SERVER_PORT", defaults.server_port)
                .context("Failed to parse SERVER_PORT")?,
            max_file_size_mb: Self::parse_env_var("MAX_FILE_SIZE_MB", defaults.max_file_size_mb)
                .context("Failed to parse MAX_FILE_SIZE_MB")?,
            max_concurrent_requests: Self::parse_env_var(
                "MAX_CONCURRENT_REQUESTS",
                defaults.max_concurrent_requests,
            )
            .context("Failed to parse MAX_CONCURRENT_REQUESTS")?,
            stream_timeout_seconds: Self::parse_env_var(
                "STREAM_TIMEOUT_SECONDS",
                defaults.stream_timeout_seconds,
            )
            .context("Failed to parse STREAM_TIMEOUT_SECONDS")?,
            allowed_media_types,
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            cache_ttl_seconds: Self::parse_env_var("CACHE_TTL_SECONDS", defaults.cache_ttl_seconds)
                .context("Failed to parse CACHE_TTL_SECONDS")?,
            cache_path: env::var("CACHE_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            include_document_text: Self::parse_env_var(
                "INCLUDE_DOCUMENT_TEXT",
                defaults.include_document_text,
            )
            .context("Failed to parse INCLUDE_DOCUMENT_TEXT")?,
            max_document_chars: Self::parse_env_var("MAX_DOCUMENT_CHARS", defaults.max_document_chars)
                .context("Failed to parse MAX_DOCUMENT_CHARS")?,
            standard_profile,
            deep_thinker_profile,
        };

        config.validate()?;

        if config.standard_profile.api_key.is_empty() {
            warn!("No upstream API key configured. Set LLM_API_KEY or OPENAI_API_KEY.");
        }
        if config.deep_thinker_profile == config.standard_profile {
            warn!("Deep thinker mode uses the standard model profile; set DEEP_THINKER_MODEL to differentiate it");
        }

        info!("Configuration loaded successfully: {:?}", config);
        Ok(config)
    }

    fn parse_env_var<T>(var_name: &str, default: T) -> Result<T>
    where
        T: std::str::FromStr + Copy + std::fmt::Debug,
        T::Err: std::fmt::Display,
    {
        match env::var(var_name) {
            Ok(val) => match val.trim().parse() {
                Ok(parsed) => Ok(parsed),
                Err(e) => {
                    warn!("Failed to parse {}: {} (using default: {:?})", var_name, e, default);
                    Ok(default)
                }
            },
            Err(_) => {
                info!("{} not set, using default: {:?}", var_name, default);
                Ok(default)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_port == 0 {
            return Err(anyhow::anyhow!("SERVER_PORT must be greater than 0"));
        }
        if self.max_file_size_mb == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_MB must be greater than 0"));
        }
        if self.max_concurrent_requests == 0 {
            return Err(anyhow::anyhow!("MAX_CONCURRENT_REQUESTS must be greater than 0"));
        }
        if self.stream_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("STREAM_TIMEOUT_SECONDS must be greater than 0"));
        }
        if self.cache_ttl_seconds == 0 {
            return Err(anyhow::anyhow!("CACHE_TTL_SECONDS must be greater than 0"));
        }
        if self.allowed_media_types.is_empty() {
            return Err(anyhow::anyhow!("ALLOWED_MEDIA_TYPES must name at least one type"));
        }
        for profile in [&self.standard_profile, &self.deep_thinker_profile] {
            if profile.max_tokens == 0 {
                return Err(anyhow::anyhow!("max tokens must be greater than 0 for model {}", profile.model));
            }
            if !(0.0..=2.0).contains(&profile.temperature) {
                return Err(anyhow::anyhow!(
                    "temperature {} for model {} is outside 0.0..=2.0",
                    profile.temperature,
                    profile.model
                ));
            }
        }
        Ok(())
    }

    pub fn max_file_size_bytes(&self) -> usize {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_seconds)
    }

    pub fn profile(&self, mode: AnalysisMode) -> &ModelProfile {
        match mode {
            AnalysisMode::Standard => &self.standard_profile,
            AnalysisMode::DeepThinker => &self.deep_thinker_profile,
        }
    }
}

fn env_string(var_name: &str, default: &str) -> String {
    env::var(var_name).unwrap_or_else(|_| default.to_string())
}

fn parse_media_types(raw: &str) -> Result<Vec<MediaType>> {
    let mut types = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let media_type: MediaType = item.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        if !types.contains(&media_type) {
            types.push(media_type);
        }
    }
    Ok(types)
}
