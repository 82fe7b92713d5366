use crate::error::LoggerError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub logger: LoggerConfig,
    #[serde(default)]
    pub sink: SinkConfig,
}

/// Process log output (not the security events themselves)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Logger tuning, consumed once when the logger is constructed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggerConfig {
    /// Consecutive failures before the breaker opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Cooldown before an open breaker allows a trial write
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,

    /// Housekeeping interval (backlog flush attempts, gauge refresh)
    #[serde(default = "default_monitoring_period_ms")]
    pub monitoring_period_ms: u64,

    /// Backlog capacity
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// A sink write slower than this counts as a failure
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Let housekeeping flush the backlog on its own
    #[serde(default = "default_auto_flush")]
    pub auto_flush: bool,

    /// Buffered error notifications per subscriber
    #[serde(default = "default_error_channel_capacity")]
    pub error_channel_capacity: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
            monitoring_period_ms: default_monitoring_period_ms(),
            max_queue_size: default_max_queue_size(),
            write_timeout_ms: default_write_timeout_ms(),
            auto_flush: default_auto_flush(),
            error_channel_capacity: default_error_channel_capacity(),
        }
    }
}

impl LoggerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn monitoring_period(&self) -> Duration {
        Duration::from_millis(self.monitoring_period_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Reject values that would make the logger misbehave later
    pub fn validate(&self) -> Result<(), LoggerError> {
        if self.failure_threshold == 0 {
            return Err(LoggerError::InvalidConfig(
                "failure_threshold must be greater than 0".to_string(),
            ));
        }
        if self.max_queue_size == 0 {
            return Err(LoggerError::InvalidConfig(
                "max_queue_size must be greater than 0".to_string(),
            ));
        }
        if self.reset_timeout_ms == 0 {
            return Err(LoggerError::InvalidConfig(
                "reset_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.write_timeout_ms == 0 {
            return Err(LoggerError::InvalidConfig(
                "write_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.monitoring_period_ms == 0 {
            return Err(LoggerError::InvalidConfig(
                "monitoring_period_ms must be greater than 0".to_string(),
            ));
        }
        if self.error_channel_capacity == 0 {
            return Err(LoggerError::InvalidConfig(
                "error_channel_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where security events are persisted
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    /// Structured `tracing` records on the `security_audit` target
    #[default]
    Tracing,
    /// Append-only JSON lines file
    JsonLines { path: PathBuf },
    /// SQLite database
    Sqlite { url: String },
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_ms() -> u64 {
    60_000
}

fn default_monitoring_period_ms() -> u64 {
    10_000
}

fn default_max_queue_size() -> usize {
    1000
}

fn default_write_timeout_ms() -> u64 {
    5_000
}

fn default_auto_flush() -> bool {
    true
}

fn default_error_channel_capacity() -> usize {
    256
}

/// Load configuration from a TOML file plus `SECURITY_LOG__*` environment overrides
///
/// The file is optional; missing values fall back to defaults.
pub fn load_config(path: &Path) -> Result<Config, LoggerError> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("SECURITY_LOG").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> Result<(), LoggerError> {
    cfg.logger.validate()?;

    match cfg.logging.format.as_str() {
        "text" | "json" => {}
        other => {
            return Err(LoggerError::InvalidConfig(format!(
                "logging.format must be 'text' or 'json', got '{}'",
                other
            )))
        }
    }

    match &cfg.sink {
        SinkConfig::JsonLines { path } if path.as_os_str().is_empty() => {
            return Err(LoggerError::InvalidConfig(
                "sink.path cannot be empty".to_string(),
            ));
        }
        SinkConfig::Sqlite { url } if url.is_empty() => {
            return Err(LoggerError::InvalidConfig(
                "sink.url cannot be empty".to_string(),
            ));
        }
        _ => {}
    }

    Ok(())
}
