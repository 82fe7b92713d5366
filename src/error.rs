use std::time::Duration;
use thiserror::Error;

/// Errors raised while constructing or configuring the logger
#[derive(Debug, Error)]
pub enum LoggerError {
    /// Configuration values rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Configuration could not be loaded or deserialized
    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),
    /// Unrecognized security level name
    #[error("Unknown security level: {0}")]
    InvalidLevel(String),
    /// Sink could not be opened
    #[error("Sink setup failed: {0}")]
    SinkSetup(#[from] SinkError),
}

/// A failed write to the sink
///
/// Cloneable so it can travel on the error broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("Sink write timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

impl SinkError {
    /// Short label used for metrics and structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Io(_) => "io",
            Self::Database(_) => "database",
            Self::Serialization(_) => "serialization",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<sqlx::Error> for SinkError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SinkError::Timeout(Duration::from_millis(250));
        assert_eq!(error.to_string(), "Sink write timed out after 250ms");

        let error = LoggerError::InvalidConfig("max_queue_size must be greater than 0".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: max_queue_size must be greater than 0"
        );
    }

    #[test]
    fn test_invalid_level_display() {
        let error = LoggerError::InvalidLevel("fatal".to_string());
        assert_eq!(error.to_string(), "Unknown security level: fatal");
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(SinkError::Io("disk full".to_string()).kind(), "io");
        assert_eq!(SinkError::Timeout(Duration::from_secs(1)).kind(), "timeout");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error: SinkError = io.into();
        assert!(matches!(error, SinkError::Io(msg) if msg.contains("denied")));
    }
}
