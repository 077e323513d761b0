use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SousError};

/// Main configuration structure for Sous
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Model provider configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Streaming relay tuning
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Config {
    /// Load configuration from an explicit path, or from the first default
    /// location that exists. Falls back to defaults when no file is found.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::from_file(path);
        }

        for path in default_config_paths().iter().flatten() {
            if path.exists() {
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read and parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        tracing::info!("Loading config from: {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            SousError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| SousError::Config(format!("Failed to parse config: {e}")))
    }
}

fn default_config_paths() -> [Option<PathBuf>; 3] {
    [
        dirs::home_dir().map(|h| h.join(".sous").join("config.toml")),
        dirs::config_dir().map(|c| c.join("sous").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ]
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:3001")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    /// Replace the port of `listen_addr`, keeping the host part
    pub fn override_port(&mut self, port: u16) {
        let host = self
            .listen_addr
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or("127.0.0.1");
        self.listen_addr = format!("{host}:{port}");
    }

    /// Apply command-line overrides: the listen address first, then the port
    pub fn apply_overrides(&mut self, listen: Option<String>, port: Option<u16>) {
        if let Some(listen) = listen {
            self.listen_addr = listen;
        }
        if let Some(port) = port {
            self.override_port(port);
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:3001".to_string()
}

fn default_max_body_bytes() -> usize {
    50 * 1024 * 1024
}

/// OpenAI-compatible chat completion provider
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base API URL; `/chat/completions` is appended
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the bearer token
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Optional completion length cap forwarded to the provider
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl UpstreamConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).map_err(|_| {
            SousError::Config(format!("API key env var '{}' not set", self.api_key_env))
        })
    }

    /// Full chat completions endpoint
    pub fn completions_url(&self) -> Result<url::Url> {
        let endpoint = format!("{}/chat/completions", self.api_url.trim_end_matches('/'));
        url::Url::parse(&endpoint).map_err(|e| {
            SousError::Config(format!("Invalid upstream api_url '{}': {e}", self.api_url))
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_api_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    30
}

/// Streaming relay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Frames buffered between the upstream reader and the client
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Upper bound on a single relay, unset means unbounded
    #[serde(default)]
    pub max_duration_secs: Option<u64>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            max_duration_secs: None,
        }
    }
}

impl RelayConfig {
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_secs.map(Duration::from_secs)
    }
}

fn default_channel_capacity() -> usize {
    16
}
