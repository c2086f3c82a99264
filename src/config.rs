use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

use crate::llm_providers::LLMProviderType;

// Import logging macros
use crate::{log_system_event, log_validation};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LLMConfig,
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub logging: LoggingConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Large Language Model service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub provider: LLMProviderType,
    pub model: Option<String>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Where uploaded PDFs go and how large they may be
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub directory: String,
    pub max_bytes: usize,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

/// Reads one configuration variable.
type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&|key: &str| env::var(key).ok())
    }

    pub fn from_lookup(get: Lookup<'_>) -> Result<Self> {
        log_system_event!(config, "Loading application configuration");

        let config = Config {
            database: DatabaseConfig::from_lookup(get),
            llm: LLMConfig::from_lookup(get),
            server: ServerConfig::from_lookup(get)?,
            upload: UploadConfig::from_lookup(get)?,
            logging: LoggingConfig::from_lookup(get),
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            llm_provider = ?self.llm.provider,
            llm_model = ?self.llm.model,
            llm_api_key_masked = %mask_sensitive_data(&self.llm.api_key),
            server_address = %self.server.address(),
            upload_directory = %self.upload.directory,
            max_upload_bytes = self.upload.max_bytes,
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            let err = anyhow!("DATABASE_URL must start with 'sqlite:'");
            log_validation!(failure, "configuration", error = err);
            return Err(err);
        }

        if self.server.port == 0 {
            let err = anyhow!("Server port must be greater than 0");
            log_validation!(failure, "configuration", error = err);
            return Err(err);
        }

        if self.upload.max_bytes == 0 {
            let err = anyhow!("MAX_UPLOAD_BYTES must be greater than 0");
            log_validation!(failure, "configuration", error = err);
            return Err(err);
        }

        if self.llm.api_key.is_empty() {
            warn!("LLM API key is empty - generation requests will fail");
        }

        if !["trace", "debug", "info", "warn", "error"]
            .iter()
            .any(|level| self.logging.level.to_lowercase().starts_with(level))
        {
            warn!("Unrecognized log level '{}', falling back to 'info'", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl DatabaseConfig {
    fn from_lookup(get: Lookup<'_>) -> Self {
        let url = get("DATABASE_URL").unwrap_or_else(|| "sqlite:study_assistant.db".to_string());
        DatabaseConfig { url }
    }
}

impl LLMConfig {
    fn from_lookup(get: Lookup<'_>) -> Self {
        let api_key = get("LLM_API_KEY")
            .or_else(|| get("GEMINI_API_KEY"))
            .unwrap_or_default();

        let base_url = get("LLM_BASE_URL");

        let provider_str = get("LLM_PROVIDER").unwrap_or_else(|| "gemini".to_string());
        let provider = LLMProviderType::parse(&provider_str).unwrap_or_else(|| {
            info!("Unknown LLM provider '{}', defaulting to Gemini", provider_str);
            LLMProviderType::Gemini
        });

        let model = get("LLM_MODEL");

        LLMConfig {
            api_key,
            base_url,
            provider,
            model,
        }
    }
}

impl ServerConfig {
    fn from_lookup(get: Lookup<'_>) -> Result<Self> {
        let port_str = get("PORT").unwrap_or_else(|| "8000".to_string());

        let port = port_str
            .parse::<u16>()
            .map_err(|_| anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str))?;

        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl UploadConfig {
    fn from_lookup(get: Lookup<'_>) -> Result<Self> {
        let directory = get("UPLOAD_DIR").unwrap_or_else(|| "uploads/documents".to_string());

        let max_bytes = match get("MAX_UPLOAD_BYTES") {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| anyhow!("Invalid MAX_UPLOAD_BYTES value: '{}'", value))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(UploadConfig { directory, max_bytes })
    }
}

impl LoggingConfig {
    fn from_lookup(get: Lookup<'_>) -> Self {
        let level = get("RUST_LOG").unwrap_or_else(|| "info,study_assistant=debug".to_string());

        let file_enabled = get("LOG_FILE_ENABLED")
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(true);

        let console_enabled = get("LOG_CONSOLE_ENABLED")
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(true);

        let log_directory = get("LOG_DIRECTORY").unwrap_or_else(|| "logs".to_string());

        LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        }
    }
}

/// Mask sensitive data in configuration for safe logging
pub fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}
