//! # Application Configuration
//!
//! Loaded from `quintet.toml` (or the path given with `--config`):
//!
//! ```toml
//! [engine]
//! fan_out = "cross_product"      # or "zip"
//! validation = "poison"          # or "reject"
//! max_evaluation_depth = 64
//! max_trigger_rounds = 1024
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! api_key_env = "QUINTET_API_KEY"
//! cors_origins = "http://localhost:3000"
//! rate_limit = 100
//! tick_ms = 1000
//! ```
//!
//! `QUINTET_CORS_ORIGINS` overrides `cors_origins`.

use crate::api::DEFAULT_API_KEY_ENV;
use quintet_core::{EngineConfig, QuintetError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "quintet.toml";

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Comma-separated origins, or `*`. Unset allows localhost only.
    pub cors_origins: Option<String>,
    /// Requests per second; 0 disables rate limiting.
    pub rate_limit: u32,
    /// Timer trigger resolution in milliseconds.
    pub tick_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            cors_origins: None,
            rate_limit: 100,
            tick_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Parse a TOML document.
    pub fn from_toml(source: &str) -> Result<Self, QuintetError> {
        toml::from_str(source)
            .map_err(|e| QuintetError::DeserializationError(format!("Config: {}", e)))
    }

    /// Load configuration, then apply environment overrides.
    ///
    /// An explicit path must exist. Without one, a missing `quintet.toml`
    /// means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, QuintetError> {
        let config = match path {
            Some(path) => Self::read(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::read(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    fn read(path: &Path) -> Result<Self, QuintetError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            QuintetError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(QuintetError::DeserializationError(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let source = std::fs::read_to_string(path)
            .map_err(|e| QuintetError::IoError(format!("Read config: {}", e)))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Self::from_toml(&source)
    }

    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(origins) = std::env::var("QUINTET_CORS_ORIGINS")
            .ok()
            .filter(|origins| !origins.trim().is_empty())
        {
            self.server.cors_origins = Some(origins);
        }
        self
    }
}

// =============================================================================
// TESTS
// =============================================================================
