#![allow(dead_code)]

use security_event_log::{LoggerConfig, ManualClock, SecurityLogger, SinkWriter};
use std::sync::Arc;

/// Logger config for tests: housekeeping never flushes on its own
pub fn test_config(failure_threshold: u32, max_queue_size: usize) -> LoggerConfig {
    LoggerConfig {
        failure_threshold,
        reset_timeout_ms: 30_000,
        max_queue_size,
        write_timeout_ms: 2_000,
        auto_flush: false,
        ..Default::default()
    }
}

/// Logger driven by a manual clock so breaker cooldowns are deterministic
pub fn logger_with_clock(
    config: LoggerConfig,
    sink: Arc<dyn SinkWriter>,
) -> (SecurityLogger, ManualClock) {
    let clock = ManualClock::new();
    let logger = SecurityLogger::with_clock(config, sink, Arc::new(clock.clone()))
        .expect("valid test config");
    (logger, clock)
}
