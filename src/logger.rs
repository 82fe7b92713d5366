//! Security logger facade
//!
//! Callers hand events to [`SecurityLogger`]; it decides whether the sink may be
//! touched (circuit breaker), parks undeliverable events in a bounded backlog and
//! keeps counters for operators.
//!
//! ## Locking
//!
//! Breaker, backlog and metrics share one `tokio::sync::Mutex`. The lock is never
//! held across a sink write, which is the only suspension point.
//!
//! ## Process-wide instance
//!
//! [`init_global`] builds the shared instance on its first call. Every later call
//! returns that same instance and ignores its arguments, so the configuration is
//! fixed at first use for the life of the process.

use crate::backlog::{BacklogQueue, Eviction};
use crate::circuit_breaker::{CircuitBreaker, Clock, SystemClock, Transition};
use crate::config::LoggerConfig;
use crate::error::{LoggerError, SinkError};
use crate::event::{AuthEvent, RequestMetadata, SecurityEvent, SecurityLevel, UploadEvent};
use crate::metrics::{self, MetricsAggregator, MetricsSnapshot};
use crate::sink::SinkWriter;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

static GLOBAL: OnceLock<SecurityLogger> = OnceLock::new();

/// Get or create the process-wide logger
///
/// The first successful call constructs the logger from `config` (defaults when
/// `None`) and `sink`. Later calls return the existing instance; their arguments
/// are ignored.
pub fn init_global(
    config: Option<LoggerConfig>,
    sink: Arc<dyn SinkWriter>,
) -> Result<SecurityLogger, LoggerError> {
    if let Some(existing) = GLOBAL.get() {
        tracing::debug!("Security logger already initialized, ignoring new configuration");
        return Ok(existing.clone());
    }

    let logger = SecurityLogger::new(config.unwrap_or_default(), sink)?;
    // A concurrent caller may have won; our instance is dropped and its task exits
    Ok(GLOBAL.get_or_init(|| logger).clone())
}

/// The process-wide logger, if [`init_global`] has run
pub fn global() -> Option<SecurityLogger> {
    GLOBAL.get().cloned()
}

/// Notification sent to subscribers when a delivery attempt fails
#[derive(Debug, Clone)]
pub struct LoggingError {
    pub error: SinkError,
    pub event: SecurityEvent,
}

struct LoggerState {
    breaker: CircuitBreaker,
    backlog: BacklogQueue,
    metrics: MetricsAggregator,
}

struct Inner {
    config: LoggerConfig,
    sink: Arc<dyn SinkWriter>,
    state: Mutex<LoggerState>,
    errors: broadcast::Sender<LoggingError>,
    destroyed: AtomicBool,
    shutdown: watch::Sender<bool>,
    housekeeping: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a security logger
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct SecurityLogger {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SecurityLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityLogger")
            .field("sink", &self.inner.sink.name())
            .field("config", &self.inner.config)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl SecurityLogger {
    /// Create a logger writing to `sink`
    ///
    /// Fails fast on invalid configuration. When called inside a tokio runtime a
    /// housekeeping task is started; it runs every `monitoring_period` until
    /// [`destroy`](Self::destroy) is called or the last handle is dropped.
    pub fn new(config: LoggerConfig, sink: Arc<dyn SinkWriter>) -> Result<Self, LoggerError> {
        Self::with_clock(config, sink, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new) with an explicit breaker clock
    pub fn with_clock(
        config: LoggerConfig,
        sink: Arc<dyn SinkWriter>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LoggerError> {
        config.validate()?;

        let (errors, _) = broadcast::channel(config.error_channel_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let state = LoggerState {
            breaker: CircuitBreaker::new(config.failure_threshold, config.reset_timeout(), clock),
            backlog: BacklogQueue::new(config.max_queue_size),
            metrics: MetricsAggregator::new(),
        };

        let inner = Arc::new(Inner {
            config,
            sink,
            state: Mutex::new(state),
            errors,
            destroyed: AtomicBool::new(false),
            shutdown,
            housekeeping: std::sync::Mutex::new(None),
        });

        match spawn_housekeeping(&inner, shutdown_rx) {
            Some(handle) => {
                if let Ok(mut slot) = inner.housekeeping.lock() {
                    *slot = Some(handle);
                }
            }
            None => {
                tracing::warn!("No tokio runtime available, security logger housekeeping disabled");
            }
        }

        tracing::info!(
            sink = inner.sink.name(),
            failure_threshold = inner.config.failure_threshold,
            reset_timeout_ms = inner.config.reset_timeout_ms,
            max_queue_size = inner.config.max_queue_size,
            "Security logger initialized"
        );

        Ok(Self { inner })
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.inner.config
    }

    pub fn sink_name(&self) -> &str {
        self.inner.sink.name()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Subscribe to failed-delivery notifications
    ///
    /// Delivery is fire-and-forget: a subscriber that falls behind by more than
    /// `error_channel_capacity` notifications skips the oldest ones.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<LoggingError> {
        self.inner.errors.subscribe()
    }

    /// Record a security event
    ///
    /// Returns `true` only if the event reached the sink during this call. An event
    /// refused by the breaker or rejected by the sink is kept in the backlog and
    /// `false` is returned; sink failures are never raised to the caller.
    pub async fn log_security_event(
        &self,
        level: SecurityLevel,
        category: impl Into<String>,
        action: impl Into<String>,
        details: serde_json::Value,
        metadata: Option<RequestMetadata>,
    ) -> bool {
        if self.is_destroyed() {
            tracing::warn!("Security event submitted after logger was destroyed, discarding");
            return false;
        }

        let event = SecurityEvent::new(level, category, action, details, metadata);
        metrics::record_event(event.level, &event.category);
        self.deliver(event).await
    }

    /// Record an authentication event (category `auth`)
    pub async fn log_auth(
        &self,
        kind: AuthEvent,
        user_id: Option<&str>,
        details: serde_json::Value,
        metadata: Option<RequestMetadata>,
    ) -> bool {
        let metadata = with_user(metadata, user_id);
        self.log_security_event(kind.level(), "auth", kind.as_str(), details, metadata)
            .await
    }

    /// Record a file upload event (category `upload`)
    pub async fn log_upload(
        &self,
        kind: UploadEvent,
        user_id: &str,
        details: serde_json::Value,
        metadata: Option<RequestMetadata>,
    ) -> bool {
        let metadata = with_user(metadata, Some(user_id));
        self.log_security_event(kind.level(), "upload", kind.as_str(), details, metadata)
            .await
    }

    /// Record a critical event (category `system`)
    ///
    /// Follows the same breaker path as any other event; criticality only protects
    /// the event from backlog eviction.
    pub async fn log_critical(
        &self,
        action: impl Into<String>,
        details: serde_json::Value,
        metadata: Option<RequestMetadata>,
    ) -> bool {
        self.log_security_event(SecurityLevel::Critical, "system", action, details, metadata)
            .await
    }

    pub async fn get_metrics(&self) -> MetricsSnapshot {
        let state = self.inner.state.lock().await;
        state
            .metrics
            .snapshot(state.breaker.state(), state.backlog.len())
    }

    /// Force the breaker closed and clear its failure count
    pub async fn reset_circuit_breaker(&self) {
        let mut state = self.inner.state.lock().await;
        let previous = state.breaker.state();
        state.breaker.reset();
        state.metrics.mark_reset();
        metrics::record_gauges(state.breaker.state(), state.backlog.len());

        tracing::info!(
            sink = self.inner.sink.name(),
            previous_state = %previous,
            "Circuit breaker manually reset"
        );
    }

    /// Re-deliver backlogged events in FIFO order
    ///
    /// Stops as soon as the breaker refuses. Events that fail again and the untried
    /// ones go back to the head of the backlog in their original order, ahead of
    /// anything queued while the flush ran. Returns the number of events written.
    pub async fn flush_queue(&self) -> usize {
        if self.is_destroyed() {
            return 0;
        }

        let pending = {
            let mut state = self.inner.state.lock().await;
            state.backlog.dequeue_all()
        };
        if pending.is_empty() {
            return 0;
        }

        let total = pending.len();
        let mut delivered = 0;
        let mut undelivered = Vec::new();
        let mut pending = pending.into_iter();

        while let Some(event) = pending.next() {
            {
                let mut state = self.inner.state.lock().await;
                let allowed = !self.is_destroyed() && self.admit(&mut state);
                if !allowed {
                    undelivered.push(event);
                    undelivered.extend(pending.by_ref());
                    break;
                }
            }

            match self.attempt_write(&event).await {
                Ok(latency) => {
                    let mut state = self.inner.state.lock().await;
                    self.on_success(&mut state, latency);
                    state.metrics.record_flushed();
                    delivered += 1;
                }
                Err(error) => {
                    {
                        let mut state = self.inner.state.lock().await;
                        self.on_failure(&mut state, &event, &error);
                    }
                    undelivered.push(event.clone());
                    self.emit_error(error, event);
                }
            }
        }

        let requeued = undelivered.len();
        if requeued > 0 {
            let mut state = self.inner.state.lock().await;
            self.requeue_front_locked(&mut state, undelivered);
        }

        tracing::info!(
            sink = self.inner.sink.name(),
            delivered = delivered,
            requeued = requeued,
            attempted = total,
            "Backlog flush finished"
        );

        delivered
    }

    /// Stop background work and refuse further events
    ///
    /// Safe to call more than once. Events still in the backlog are not written.
    pub async fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.inner.shutdown.send(true);
        let handle = self
            .inner
            .housekeeping
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Security logger housekeeping task ended abnormally");
            }
        }

        let remaining = self.inner.state.lock().await.backlog.len();
        tracing::info!(
            sink = self.inner.sink.name(),
            undelivered = remaining,
            "Security logger destroyed"
        );
    }

    async fn deliver(&self, event: SecurityEvent) -> bool {
        {
            let mut state = self.inner.state.lock().await;
            state.metrics.record_event();

            if !self.admit(&mut state) {
                tracing::debug!(
                    event_id = %event.id,
                    action = %event.action,
                    "Circuit open, security event queued"
                );
                self.enqueue_locked(&mut state, event);
                return false;
            }
        }

        match self.attempt_write(&event).await {
            Ok(latency) => {
                let mut state = self.inner.state.lock().await;
                self.on_success(&mut state, latency);
                true
            }
            Err(error) => {
                {
                    let mut state = self.inner.state.lock().await;
                    self.on_failure(&mut state, &event, &error);
                    self.enqueue_locked(&mut state, event.clone());
                }
                self.emit_error(error, event);
                false
            }
        }
    }

    /// One sink write, bounded by `write_timeout`
    ///
    /// A panicking sink is reported as unavailable instead of unwinding into the caller.
    async fn attempt_write(&self, event: &SecurityEvent) -> Result<Duration, SinkError> {
        let timeout = self.inner.config.write_timeout();
        let started = Instant::now();

        let write = std::panic::AssertUnwindSafe(self.inner.sink.write(event)).catch_unwind();
        let result = match tokio::time::timeout(timeout, write).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SinkError::Unavailable("sink panicked during write".to_string())),
            Err(_) => Err(SinkError::Timeout(timeout)),
        };

        let elapsed = started.elapsed();
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::record_write(self.inner.sink.name(), outcome, elapsed);

        result.map(|()| elapsed)
    }

    fn admit(&self, state: &mut LoggerState) -> bool {
        let (allowed, transition) = state.breaker.allow_request();
        if let Some(transition) = transition {
            self.observe_transition(state, transition);
        }
        allowed
    }

    fn on_success(&self, state: &mut LoggerState, latency: Duration) {
        if let Some(transition) = state.breaker.record_success() {
            self.observe_transition(state, transition);
        }
        state.metrics.record_success(latency);
    }

    fn on_failure(&self, state: &mut LoggerState, event: &SecurityEvent, error: &SinkError) {
        tracing::error!(
            sink = self.inner.sink.name(),
            event_id = %event.id,
            action = %event.action,
            error_kind = error.kind(),
            error = %error,
            "Failed to write security event"
        );

        if let Some(transition) = state.breaker.record_failure() {
            self.observe_transition(state, transition);
        }
        state.metrics.record_failure();
    }

    fn enqueue_locked(&self, state: &mut LoggerState, event: SecurityEvent) {
        state.metrics.record_queued();

        if let Some(eviction) = state.backlog.enqueue(event) {
            self.observe_eviction(state, eviction);
        }

        metrics::record_gauges(state.breaker.state(), state.backlog.len());
    }

    fn requeue_front_locked(&self, state: &mut LoggerState, events: Vec<SecurityEvent>) {
        events.iter().for_each(|_| state.metrics.record_queued());

        for eviction in state.backlog.requeue_front(events) {
            self.observe_eviction(state, eviction);
        }

        metrics::record_gauges(state.breaker.state(), state.backlog.len());
    }

    fn observe_eviction(&self, state: &mut LoggerState, eviction: Eviction) {
        let critical = eviction.is_critical();
        state.metrics.record_eviction(critical);
        metrics::record_eviction(eviction.event.level);

        if critical {
            tracing::error!(
                event_id = %eviction.event.id,
                action = %eviction.event.action,
                capacity = state.backlog.capacity(),
                "Backlog full of critical events, oldest critical event dropped"
            );
        } else {
            tracing::warn!(
                event_id = %eviction.event.id,
                level = %eviction.event.level,
                action = %eviction.event.action,
                "Backlog full, dropped oldest non-critical event"
            );
        }
    }

    fn observe_transition(&self, state: &mut LoggerState, transition: Transition) {
        let sink = self.inner.sink.name();
        let failures = state.breaker.consecutive_failures();

        match transition {
            Transition::Tripped => {
                state.metrics.record_trip();
                metrics::record_circuit_trip(sink);
                tracing::warn!(
                    sink = sink,
                    consecutive_failures = failures,
                    reset_timeout_ms = self.inner.config.reset_timeout_ms,
                    "🔴 Circuit opened due to {} consecutive failures",
                    failures
                );
            }
            Transition::Reopened => {
                tracing::warn!(
                    sink = sink,
                    consecutive_failures = failures,
                    "🔴 Trial write failed, circuit re-opened"
                );
            }
            Transition::HalfOpened => {
                tracing::info!(sink = sink, "🟡 Circuit half-open, allowing one trial write");
            }
            Transition::Recovered => {
                tracing::info!(sink = sink, "✅ Trial write succeeded, circuit closed");
            }
        }

        metrics::record_gauges(state.breaker.state(), state.backlog.len());
    }

    fn emit_error(&self, error: SinkError, event: SecurityEvent) {
        // No subscribers is not an error
        let _ = self.inner.errors.send(LoggingError { error, event });
    }

    async fn housekeeping_tick(&self) {
        let (circuit_state, queued) = {
            let state = self.inner.state.lock().await;
            (state.breaker.state(), state.backlog.len())
        };
        metrics::record_gauges(circuit_state, queued);

        tracing::debug!(
            circuit_state = %circuit_state,
            queue_size = queued,
            "Security logger housekeeping"
        );

        if self.inner.config.auto_flush && queued > 0 && !self.is_destroyed() {
            self.flush_queue().await;
        }
    }
}

fn with_user(metadata: Option<RequestMetadata>, user_id: Option<&str>) -> Option<RequestMetadata> {
    match user_id {
        Some(id) => {
            let mut metadata = metadata.unwrap_or_default();
            metadata.user_id = Some(id.to_string());
            Some(metadata)
        }
        None => metadata,
    }
}

/// Periodic backlog flush and gauge refresh
///
/// Holds only a weak reference so an abandoned logger can be dropped.
fn spawn_housekeeping(
    inner: &Arc<Inner>,
    mut shutdown: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    let runtime = tokio::runtime::Handle::try_current().ok()?;
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let period = inner.config.monitoring_period();

    Some(runtime.spawn(async move {
        let result = std::panic::AssertUnwindSafe(async {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        SecurityLogger { inner }.housekeeping_tick().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
        .catch_unwind()
        .await;

        match result {
            Ok(()) => tracing::debug!("Security logger housekeeping stopped"),
            Err(e) => tracing::error!(panic = ?e, "Security logger housekeeping panicked"),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Fails while `failing` is set, counts every call
    #[derive(Default)]
    struct SwitchSink {
        failing: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SinkWriter for SwitchSink {
        fn name(&self) -> &str {
            "switch"
        }

        async fn write(&self, _event: &SecurityEvent) -> Result<(), SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err(SinkError::Unavailable("switched off".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct PanicSink;

    #[async_trait]
    impl SinkWriter for PanicSink {
        fn name(&self) -> &str {
            "panic"
        }

        async fn write(&self, _event: &SecurityEvent) -> Result<(), SinkError> {
            panic!("sink exploded");
        }
    }

    fn test_config() -> LoggerConfig {
        LoggerConfig {
            failure_threshold: 2,
            reset_timeout_ms: 60_000,
            max_queue_size: 10,
            auto_flush: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = LoggerConfig {
            max_queue_size: 0,
            ..Default::default()
        };
        let result = SecurityLogger::new(config, Arc::new(SwitchSink::default()));
        assert!(matches!(result, Err(LoggerError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_successful_write() {
        let sink = Arc::new(SwitchSink::default());
        let logger = SecurityLogger::new(test_config(), sink.clone()).unwrap();

        assert!(logger.log_auth(AuthEvent::Login, Some("u-1"), json!({}), None).await);

        let metrics = logger.get_metrics().await;
        assert_eq!(metrics.total_events, 1);
        assert_eq!(metrics.successful_logs, 1);
        assert_eq!(metrics.queue_size, 0);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_write_is_queued() {
        let sink = Arc::new(SwitchSink::default());
        sink.failing.store(true, Ordering::SeqCst);
        let logger = SecurityLogger::new(test_config(), sink).unwrap();

        assert!(!logger.log_critical("config_tampered", json!({ "file": "app.toml" }), None).await);

        let metrics = logger.get_metrics().await;
        assert_eq!(metrics.failed_logs, 1);
        assert_eq!(metrics.queue_size, 1);
        assert_eq!(metrics.circuit_state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_panicking_sink_is_contained() {
        let logger = SecurityLogger::new(test_config(), Arc::new(PanicSink)).unwrap();
        let mut errors = logger.subscribe_errors();

        assert!(!logger.log_critical("disk_failure", json!({}), None).await);

        let notification = errors.recv().await.unwrap();
        assert_eq!(notification.error.kind(), "unavailable");
        assert_eq!(logger.get_metrics().await.queue_size, 1);
    }

    #[test]
    fn test_user_id_lands_in_metadata() {
        let metadata = with_user(
            Some(RequestMetadata {
                ip: Some("127.0.0.1".to_string()),
                ..Default::default()
            }),
            Some("alice"),
        )
        .unwrap();
        assert_eq!(metadata.user_id.as_deref(), Some("alice"));
        assert_eq!(metadata.ip.as_deref(), Some("127.0.0.1"));

        assert!(with_user(None, None).is_none());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let sink = Arc::new(SwitchSink::default());
        let logger = SecurityLogger::new(test_config(), sink.clone()).unwrap();

        logger.destroy().await;
        logger.destroy().await;

        assert!(logger.is_destroyed());
        assert!(!logger.log_security_event(SecurityLevel::Info, "auth", "login", json!({}), None).await);
        assert_eq!(logger.flush_queue().await, 0);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
        assert_eq!(logger.get_metrics().await.total_events, 0);
    }

    #[test]
    fn test_construction_without_runtime() {
        let logger = SecurityLogger::new(test_config(), Arc::new(SwitchSink::default())).unwrap();
        assert!(!logger.is_destroyed());
        assert!(logger.inner.housekeeping.lock().unwrap().is_none());
    }
}
