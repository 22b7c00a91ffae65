//! Process-wide configuration, loaded once at startup.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::fleet::DEFAULT_FLEET_TIMEOUT_SECS;

pub const DEFAULT_CONFIG_PATH: &str = "config/coordinate-server.toml";

const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub request_options: RequestOptions,
    pub fleet: FleetSettings,
    pub server: ServerSettings,
    pub prompt: PromptSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Backend name: "openai" (any OpenAI-compatible endpoint) or "gemini".
    pub name: String,
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset.
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: "openai".to_string(),
            api_key: None,
            api_key_env: None,
            base_url: None,
            model: None,
            timeout_seconds: DEFAULT_MODEL_TIMEOUT_SECS,
        }
    }
}

impl ProviderSettings {
    /// Configured key, or the contents of `api_key_env`, or empty.
    pub fn resolve_api_key(&self) -> String {
        if let Some(key) = self.api_key.as_deref() {
            if !key.is_empty() {
                return key.to_string();
            }
        }
        if let Some(var) = self.api_key_env.as_deref() {
            if let Ok(value) = std::env::var(var) {
                return value;
            }
        }
        String::new()
    }
}

/// Default request options forwarded to the model backend on every call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FleetSettings {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_seconds: DEFAULT_FLEET_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    /// Override for the built-in system prompt template.
    pub template: Option<String>,
    /// JSON file holding the tool definitions injected into the prompt.
    pub tools_file: Option<PathBuf>,
}

/// Loads settings from `path`. A missing file yields defaults so a bare
/// checkout still boots against local endpoints.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("config file {} not found, using defaults", path.display());
            Ok(Settings::default())
        }
        Err(err) => Err(ConfigError::Io(err)),
    }
}
