use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, error};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Session lifetime in the store, refreshed on every write
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Maximum number of sessions kept by the store
    #[serde(default = "default_session_store_capacity")]
    pub session_store_capacity: u64,

    /// Language assigned to sessions created without one
    #[serde(default = "default_language")]
    pub default_language: String,
}

static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::Env(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "prod" || self.environment.to_lowercase() == "production"
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Origins allowed to call the API and open sockets.
    /// Falls back to the local frontend dev servers.
    pub fn allowed_origins(&self) -> Vec<String> {
        match &self.cors_origins {
            Some(origins) => origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect(),
            None => vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
            ],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            service_name: default_service_name(),
            session_ttl_secs: default_session_ttl_secs(),
            session_store_capacity: default_session_store_capacity(),
            default_language: default_language(),
        }
    }
}

/// Store the process-wide configuration. Later calls are ignored.
pub fn init_config(config: Config) -> &'static Config {
    CONFIG.get_or_init(|| config)
}

/// Get the process-wide configuration, or the defaults if none was stored.
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    Env(#[from] envy::Error),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "codestream-hub".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_session_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_session_store_capacity() -> u64 {
    100_000
}

fn default_language() -> String {
    "javascript".to_string()
}
