use async_trait::async_trait;
use security_event_log::{SecurityEvent, SinkError, SinkWriter};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Deterministic sink: succeeds or fails on demand, optionally slowly
///
/// Every call is counted; successful writes are recorded in order.
#[derive(Default)]
pub struct MockSink {
    failing: AtomicBool,
    delay_ms: AtomicU64,
    calls: AtomicUsize,
    written: Mutex<Vec<SecurityEvent>>,
}

impl MockSink {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let sink = Self::default();
        sink.failing.store(true, Ordering::SeqCst);
        Arc::new(sink)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<SecurityEvent> {
        self.written.lock().unwrap().clone()
    }

    pub fn written_actions(&self) -> Vec<String> {
        self.written().into_iter().map(|e| e.action).collect()
    }
}

#[async_trait]
impl SinkWriter for MockSink {
    fn name(&self) -> &str {
        "mock"
    }

    async fn write(&self, event: &SecurityEvent) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("mock sink is down".to_string()));
        }

        self.written.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Sink failing at random with the given rate (0.0-1.0)
pub struct FlakySink {
    error_rate: f64,
    successes: AtomicUsize,
    failures: AtomicUsize,
}

impl FlakySink {
    pub fn new(error_rate: f64) -> Arc<Self> {
        Arc::new(Self {
            error_rate,
            successes: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        })
    }

    pub fn successes(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SinkWriter for FlakySink {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn write(&self, _event: &SecurityEvent) -> Result<(), SinkError> {
        tokio::task::yield_now().await;

        if self.error_rate > 0.0 && rand::random::<f64>() < self.error_rate {
            self.failures.fetch_add(1, Ordering::SeqCst);
            Err(SinkError::Io("injected failure".to_string()))
        } else {
            self.successes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
