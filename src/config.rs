use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub accrual: AccrualConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccrualConfig {
    /// Base URL of the external accrual engine
    pub base_url: String,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout() -> u64 {
    5000
}

/// Queue and retry settings for the reconciliation pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    /// Bounded capacity of each worker queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Base delay for exponential backoff (milliseconds)
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,
    /// Maximum backoff delay (milliseconds)
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Jitter fraction applied to each delay (0.0..1.0)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_queue_capacity() -> usize {
    100
}

fn default_base_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    60_000
}

fn default_jitter() -> f64 {
    0.2
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
            jitter: default_jitter(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            .set_default("accrual.request_timeout_ms", 5000)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TALLY_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TALLY_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("TALLY")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for CLI usage
    pub fn default_config(database_url: &str, accrual_base_url: &str) -> Self {
        Self {
            database: DatabaseConfig {
                url: database_url.to_string(),
                max_connections: default_max_connections(),
            },
            accrual: AccrualConfig {
                base_url: accrual_base_url.to_string(),
                request_timeout_ms: default_request_timeout(),
            },
            pipeline: PipelineSettings::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.database.url.is_empty() {
            errors.push("database.url must not be empty".to_string());
        }

        if self.accrual.base_url.is_empty() {
            errors.push("accrual.base_url must not be empty".to_string());
        }

        if self.accrual.request_timeout_ms == 0 {
            errors.push("accrual.request_timeout_ms must be positive".to_string());
        }

        if self.pipeline.queue_capacity == 0 {
            errors.push("pipeline.queue_capacity must be positive".to_string());
        }

        if self.pipeline.base_backoff_ms == 0 {
            errors.push("pipeline.base_backoff_ms must be positive".to_string());
        }

        if self.pipeline.max_backoff_ms < self.pipeline.base_backoff_ms {
            errors.push("pipeline.max_backoff_ms must be >= base_backoff_ms".to_string());
        }

        if !(0.0..1.0).contains(&self.pipeline.jitter) {
            errors.push("pipeline.jitter must be in [0, 1)".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
