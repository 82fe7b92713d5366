use crate::circuit_breaker::CircuitState;
use crate::event::SecurityLevel;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::time::Duration;

/// Install the Prometheus recorder
///
/// Fails if a global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metric_descriptions();
    Ok(handle)
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "security_log_events_total",
        "Total number of security events submitted"
    );
    describe_counter!(
        "security_log_writes_total",
        "Sink write attempts by outcome"
    );
    describe_histogram!(
        "security_log_write_duration_seconds",
        "Sink write latency in seconds"
    );
    describe_counter!(
        "security_log_circuit_trips_total",
        "Number of closed to open circuit breaker transitions"
    );
    describe_counter!(
        "security_log_evictions_total",
        "Events evicted from a full backlog"
    );
    describe_gauge!(
        "security_log_circuit_state",
        "Circuit breaker state (0 closed, 1 half-open, 2 open)"
    );
    describe_gauge!("security_log_queue_size", "Events waiting in the backlog");
}

/// Record a submitted event
pub fn record_event(level: SecurityLevel, category: &str) {
    counter!(
        "security_log_events_total",
        "level" => level.as_str(),
        "category" => category.to_string(),
    )
    .increment(1);
}

/// Record the outcome of a sink write
pub fn record_write(sink: &str, outcome: &'static str, duration: Duration) {
    counter!(
        "security_log_writes_total",
        "sink" => sink.to_string(),
        "outcome" => outcome,
    )
    .increment(1);
    histogram!(
        "security_log_write_duration_seconds",
        "sink" => sink.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a closed → open transition
pub fn record_circuit_trip(sink: &str) {
    counter!("security_log_circuit_trips_total", "sink" => sink.to_string()).increment(1);
}

/// Record an event evicted from the backlog
pub fn record_eviction(level: SecurityLevel) {
    counter!("security_log_evictions_total", "level" => level.as_str()).increment(1);
}

/// Publish the current breaker state and backlog length
pub fn record_gauges(state: CircuitState, queue_size: usize) {
    gauge!("security_log_circuit_state").set(state.as_gauge());
    gauge!("security_log_queue_size").set(queue_size as f64);
}

/// Point-in-time copy of the logger's counters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_events: u64,
    pub successful_logs: u64,
    pub failed_logs: u64,
    pub circuit_breaker_trips: u64,
    /// Running mean of successful write latency, in milliseconds
    pub average_response_time: f64,
    pub last_reset_time: DateTime<Utc>,
    pub circuit_state: CircuitState,
    pub queue_size: usize,
    /// Events routed to the backlog
    pub queued_events: u64,
    /// Events evicted from a full backlog
    pub dropped_events: u64,
    /// Evictions that hit a critical event
    pub critical_evictions: u64,
    /// Events re-delivered from the backlog
    pub flushed_events: u64,
}

/// Counters owned by the logger and mutated under its state lock
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    total_events: u64,
    successful_logs: u64,
    failed_logs: u64,
    circuit_breaker_trips: u64,
    average_response_time: f64,
    timed_writes: u64,
    last_reset_time: DateTime<Utc>,
    queued_events: u64,
    dropped_events: u64,
    critical_evictions: u64,
    flushed_events: u64,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            total_events: 0,
            successful_logs: 0,
            failed_logs: 0,
            circuit_breaker_trips: 0,
            average_response_time: 0.0,
            timed_writes: 0,
            last_reset_time: Utc::now(),
            queued_events: 0,
            dropped_events: 0,
            critical_evictions: 0,
            flushed_events: 0,
        }
    }

    pub fn record_event(&mut self) {
        self.total_events += 1;
    }

    pub fn record_success(&mut self, latency: Duration) {
        self.successful_logs += 1;
        self.timed_writes += 1;
        let sample = latency.as_secs_f64() * 1000.0;
        self.average_response_time +=
            (sample - self.average_response_time) / self.timed_writes as f64;
    }

    pub fn record_failure(&mut self) {
        self.failed_logs += 1;
    }

    pub fn record_trip(&mut self) {
        self.circuit_breaker_trips += 1;
    }

    pub fn record_queued(&mut self) {
        self.queued_events += 1;
    }

    pub fn record_eviction(&mut self, critical: bool) {
        self.dropped_events += 1;
        if critical {
            self.critical_evictions += 1;
        }
    }

    pub fn record_flushed(&mut self) {
        self.flushed_events += 1;
    }

    pub fn mark_reset(&mut self) {
        self.last_reset_time = Utc::now();
    }

    pub fn snapshot(&self, circuit_state: CircuitState, queue_size: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            total_events: self.total_events,
            successful_logs: self.successful_logs,
            failed_logs: self.failed_logs,
            circuit_breaker_trips: self.circuit_breaker_trips,
            average_response_time: self.average_response_time,
            last_reset_time: self.last_reset_time,
            circuit_state,
            queue_size,
            queued_events: self.queued_events,
            dropped_events: self.dropped_events,
            critical_evictions: self.critical_evictions,
            flushed_events: self.flushed_events,
        }
    }
}
