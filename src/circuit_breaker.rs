//! Circuit breaker guarding the sink
//!
//! The breaker itself holds no lock; the logger keeps it inside its single state
//! mutex together with the backlog and the metrics.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of monotonic time for the breaker
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Wall-clock backed [`Clock`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced [`Clock`] for deterministic tests
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Sink is healthy, writes pass through
    Closed,
    /// Sink is failing, writes are refused
    Open,
    /// Cooldown elapsed, a single trial write is permitted
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    /// Numeric encoding for gauges
    pub fn as_gauge(&self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::HalfOpen => 1.0,
            Self::Open => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State change caused by a breaker call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// closed → open
    Tripped,
    /// half_open → open
    Reopened,
    /// open → half_open
    HalfOpened,
    /// half_open → closed
    Recovered,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    clock: Arc<dyn Clock>,
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_time: Option<Instant>,
    trial_in_flight: bool,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state)
            .field("consecutive_failures", &self.consecutive_failures)
            .field("failure_threshold", &self.failure_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            clock,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_time: None,
            trial_in_flight: false,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_failure_time(&self) -> Option<Instant> {
        self.last_failure_time
    }

    /// Whether a write may be attempted now
    ///
    /// An open breaker whose cooldown has elapsed moves to half-open and hands out
    /// exactly one trial; everyone else is refused until that trial is recorded.
    pub fn allow_request(&mut self) -> (bool, Option<Transition>) {
        match self.state {
            CircuitState::Closed => (true, None),
            CircuitState::Open => {
                let cooled_down = self
                    .last_failure_time
                    .map(|t| self.clock.now().saturating_duration_since(t) >= self.reset_timeout)
                    .unwrap_or(true);

                if cooled_down {
                    self.state = CircuitState::HalfOpen;
                    self.trial_in_flight = true;
                    (true, Some(Transition::HalfOpened))
                } else {
                    (false, None)
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    (false, None)
                } else {
                    self.trial_in_flight = true;
                    (true, None)
                }
            }
        }
    }

    pub fn record_success(&mut self) -> Option<Transition> {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                None
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Closed;
                self.consecutive_failures = 0;
                self.trial_in_flight = false;
                Some(Transition::Recovered)
            }
            // Late result from a write admitted before the breaker opened;
            // only a trial may close it
            CircuitState::Open => None,
        }
    }

    pub fn record_failure(&mut self) -> Option<Transition> {
        let now = self.clock.now();
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        match self.state {
            CircuitState::Closed => {
                if self.consecutive_failures >= self.failure_threshold {
                    self.state = CircuitState::Open;
                    self.last_failure_time = Some(now);
                    Some(Transition::Tripped)
                } else {
                    self.last_failure_time = Some(now);
                    None
                }
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.trial_in_flight = false;
                self.last_failure_time = Some(now);
                // Keep the open invariant even if a reset happened mid-trial
                self.consecutive_failures = self.consecutive_failures.max(self.failure_threshold);
                Some(Transition::Reopened)
            }
            CircuitState::Open => {
                // Late result from a write admitted before the breaker opened
                self.last_failure_time = Some(now);
                None
            }
        }
    }

    /// Force the breaker closed (operator override)
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.trial_in_flight = false;
    }
}
