//! Security event model
//!
//! A [`SecurityEvent`] is created once inside a logging call and then moved into the
//! logger. It is never mutated afterwards.

use crate::error::LoggerError;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

/// Severity of a security event, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Info,
    Warn,
    Error,
    Critical,
}

impl SecurityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Critical)
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SecurityLevel {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            other => Err(LoggerError::InvalidLevel(other.to_string())),
        }
    }
}

/// Authentication occurrences recorded under the `auth` category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    Login,
    FailedLogin,
    Logout,
    PasswordReset,
    AccountLocked,
}

impl AuthEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::FailedLogin => "failed_login",
            Self::Logout => "logout",
            Self::PasswordReset => "password_reset",
            Self::AccountLocked => "account_locked",
        }
    }

    pub fn level(&self) -> SecurityLevel {
        match self {
            Self::Login | Self::Logout | Self::PasswordReset => SecurityLevel::Info,
            Self::FailedLogin => SecurityLevel::Warn,
            Self::AccountLocked => SecurityLevel::Error,
        }
    }
}

/// File upload occurrences recorded under the `upload` category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadEvent {
    Accepted,
    Rejected,
    Blocked,
}

impl UploadEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "upload_accepted",
            Self::Rejected => "upload_rejected",
            Self::Blocked => "upload_blocked",
        }
    }

    pub fn level(&self) -> SecurityLevel {
        match self {
            Self::Accepted => SecurityLevel::Info,
            Self::Rejected => SecurityLevel::Warn,
            Self::Blocked => SecurityLevel::Error,
        }
    }
}

/// Request context attached to an event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// One security-relevant occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Unique id, lets consumers de-duplicate repeated deliveries
    pub id: Uuid,
    pub level: SecurityLevel,
    pub category: String,
    pub action: String,
    /// Opaque payload, persisted as-is
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RequestMetadata>,
    pub timestamp: DateTime<Utc>,
}

// Last timestamp handed out, in microseconds since the epoch
static LAST_TIMESTAMP_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Next event timestamp, strictly increasing within the process
///
/// Wall clocks can be coarse or step backwards; ties and regressions are
/// bumped one microsecond past the previous value.
fn next_timestamp() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let mut last = LAST_TIMESTAMP_MICROS.load(Ordering::Relaxed);
    loop {
        let candidate = if now > last { now } else { last + 1 };
        match LAST_TIMESTAMP_MICROS.compare_exchange_weak(
            last,
            candidate,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => {
                return Utc
                    .timestamp_micros(candidate)
                    .single()
                    .unwrap_or_else(Utc::now);
            }
            Err(actual) => last = actual,
        }
    }
}

impl SecurityEvent {
    pub fn new(
        level: SecurityLevel,
        category: impl Into<String>,
        action: impl Into<String>,
        details: serde_json::Value,
        metadata: Option<RequestMetadata>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            category: category.into(),
            action: action.into(),
            details,
            metadata,
            timestamp: next_timestamp(),
        }
    }

    pub fn is_critical(&self) -> bool {
        self.level.is_critical()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_level_ordering() {
        assert!(SecurityLevel::Info < SecurityLevel::Warn);
        assert!(SecurityLevel::Warn < SecurityLevel::Error);
        assert!(SecurityLevel::Error < SecurityLevel::Critical);
        assert!(SecurityLevel::Critical.is_critical());
        assert!(!SecurityLevel::Error.is_critical());
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("warning".parse::<SecurityLevel>().unwrap(), SecurityLevel::Warn);
        assert_eq!("CRITICAL".parse::<SecurityLevel>().unwrap(), SecurityLevel::Critical);
        assert!(matches!(
            "fatal".parse::<SecurityLevel>(),
            Err(LoggerError::InvalidLevel(level)) if level == "fatal"
        ));
    }

    #[test]
    fn test_auth_and_upload_mapping() {
        assert_eq!(AuthEvent::FailedLogin.as_str(), "failed_login");
        assert_eq!(AuthEvent::FailedLogin.level(), SecurityLevel::Warn);
        assert_eq!(AuthEvent::AccountLocked.level(), SecurityLevel::Error);
        assert_eq!(AuthEvent::Login.level(), SecurityLevel::Info);
        assert_eq!(UploadEvent::Rejected.as_str(), "upload_rejected");
        assert_eq!(UploadEvent::Blocked.level(), SecurityLevel::Error);
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let events: Vec<_> = (0..1000)
            .map(|i| SecurityEvent::new(SecurityLevel::Info, "auth", "login", json!({ "n": i }), None))
            .collect();

        for pair in events.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = SecurityEvent::new(
            SecurityLevel::Warn,
            "auth",
            "failed_login",
            json!({ "reason": "bad_password" }),
            Some(RequestMetadata {
                ip: Some("10.0.0.1".to_string()),
                ..Default::default()
            }),
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["level"], "warn");
        assert_eq!(value["action"], "failed_login");
        assert_eq!(value["details"]["reason"], "bad_password");
        assert_eq!(value["metadata"]["ip"], "10.0.0.1");
        assert!(value["metadata"].get("user_agent").is_none());
    }
}
