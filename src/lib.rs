pub mod backlog;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod event;
pub mod logger;
pub mod metrics;
pub mod sink;

pub use circuit_breaker::{CircuitState, Clock, ManualClock, SystemClock};
pub use config::{LoggerConfig, SinkConfig};
pub use error::{LoggerError, SinkError};
pub use event::{AuthEvent, RequestMetadata, SecurityEvent, SecurityLevel, UploadEvent};
pub use logger::{global, init_global, LoggingError, SecurityLogger};
pub use metrics::MetricsSnapshot;
pub use sink::{JsonLinesSink, SinkWriter, SqliteSink, TracingSink};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` takes precedence over `level`. `format` is "json" or "text".
/// Calling this twice is harmless; the second subscriber is ignored.
pub fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if format == "json" {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    if let Err(e) = result {
        eprintln!("Warning: tracing already initialized: {}", e);
    }
}
