//! # Configuration Management
//!
//! This module handles loading and managing application configuration from
//! multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_MODEL_PATH, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! The model path is the one setting the process cannot run without: it is
//! checked at startup and a missing directory is fatal (see main.rs).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub limits: LimitsConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "0.0.0.0"`: Accept connections from any interface (the default;
///   this service fronts other machines on the network)
/// - `port = 5567`: The fixed port existing clients are configured against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Recognition model configuration.
///
/// ## Fields:
/// - `path`: Filesystem directory holding the Whisper model files
///   (`config.json`, `tokenizer.json`, `model.safetensors`)
/// - `language`: Optional ISO 639-1 language hint for decoding ("en", "pt", ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: String,
    pub language: Option<String>,
}

/// Per-request resource limits.
///
/// ## Fields:
/// - `max_upload_bytes`: Upper bound on the uploaded WAV size
/// - `request_timeout_secs`: Bound on recognition time per request; a request
///   that exceeds it gets a server-error response instead of blocking forever
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_upload_bytes: usize,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(), // Listen on all interfaces
                port: 5567,                  // Fixed port the clients expect
            },
            model: ModelConfig {
                path: "./model".to_string(),
                language: Some("en".to_string()),
            },
            limits: LimitsConfig {
                max_upload_bytes: 50 * 1024 * 1024, // 50MB cap on uploads
                request_timeout_secs: 60,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST, PORT, and MODEL_PATH variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=127.0.0.1`: Override server host
    /// - `APP_MODEL_PATH=/opt/models/whisper-base`: Override model directory
    /// - `HOST=...` / `PORT=...` / `MODEL_PATH=...`: Deployment-platform
    ///   conventions that don't follow the APP_ prefix
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(model_path) = env::var("MODEL_PATH") {
            settings = settings.set_override("model.path", model_path)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching configuration errors here keeps them out of the request path
    /// and produces a clear startup message about what's wrong.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.model.path.trim().is_empty() {
            return Err(anyhow::anyhow!("Model path cannot be empty"));
        }

        if self.limits.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        if self.limits.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Request timeout must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The default configuration must be valid and carry the fixed port.
    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5567);
        assert_eq!(config.model.path, "./model");
        assert!(config.validate().is_ok());
    }

    /// Validation catches a zero port.
    #[test]
    fn test_config_validation_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    /// A layered source overrides only the fields it names; the rest keep
    /// their defaults.
    #[test]
    fn test_partial_override_keeps_defaults() {
        let config: AppConfig = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default()).unwrap())
            .add_source(config::File::from_str(
                "[server]\nport = 9000\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.model.path, "./model");
    }

    /// Validation catches an empty model path and a zero timeout.
    #[test]
    fn test_config_validation_model_and_limits() {
        let mut config = AppConfig::default();
        config.model.path = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.limits.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.limits.max_upload_bytes = 0;
        assert!(config.validate().is_err());
    }
}
