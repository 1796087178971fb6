use convai_realtime::ConvaiConfig;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub api_key: String,
    pub agent_id: String,
    /// Base URL of the upstream HTTP API (signed-URL provider).
    pub api_base: String,
    /// Public realtime WebSocket endpoint of the upstream.
    pub ws_url: String,
    pub connect_timeout: Duration,
    /// Optional fixed contextual briefing sent to the agent once per session.
    pub agent_context: Option<String>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let api_key = std::env::var("ELEVENLABS_API_KEY")
            .map_err(|_| ConfigError::MissingVar("ELEVENLABS_API_KEY".to_string()))?;
        let agent_id = std::env::var("ELEVENLABS_AGENT_ID")
            .map_err(|_| ConfigError::MissingVar("ELEVENLABS_AGENT_ID".to_string()))?;

        let api_base = std::env::var("ELEVENLABS_API_BASE")
            .unwrap_or_else(|_| "https://api.elevenlabs.io".to_string());
        let ws_url = std::env::var("ELEVENLABS_WS_URL")
            .unwrap_or_else(|_| "wss://api.elevenlabs.io/v1/convai/conversation".to_string());

        let connect_timeout_str =
            std::env::var("UPSTREAM_CONNECT_TIMEOUT_SECS").unwrap_or_else(|_| "10".to_string());
        let connect_timeout_secs = connect_timeout_str.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(
                "UPSTREAM_CONNECT_TIMEOUT_SECS".to_string(),
                format!("'{}' is not a valid number of seconds", connect_timeout_str),
            )
        })?;

        let agent_context = std::env::var("AGENT_CONTEXT")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            api_key,
            agent_id,
            api_base,
            ws_url,
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            agent_context,
            log_level,
        })
    }

    /// The upstream dial settings derived from this configuration.
    pub fn convai_config(&self) -> ConvaiConfig {
        ConvaiConfig {
            http_base: self.api_base.clone(),
            ws_url: self.ws_url.clone(),
            api_key: self.api_key.clone(),
            agent_id: self.agent_id.clone(),
            connect_timeout: self.connect_timeout,
        }
    }
}
