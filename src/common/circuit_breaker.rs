//! Per call-site circuit breaker.
//!
//! Closed passes calls through. Open fails fast until the cooldown ends. The
//! first call after the cooldown runs as a HalfOpen trial that either closes
//! the breaker or reopens it with a fresh cooldown.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Failures before the breaker opens
    pub failure_threshold: u32,
    /// Cooldown before a trial call is allowed
    pub recovery_time: Duration,
    /// Deadline for each guarded call
    pub request_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_time: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitPhase {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitPhase::Closed => write!(f, "CLOSED"),
            CircuitPhase::Open => write!(f, "OPEN"),
            CircuitPhase::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Snapshot of a breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerState {
    pub phase: CircuitPhase,
    pub failure_count: u32,
    pub last_failure_time: Option<Instant>,
    pub next_attempt_time: Option<Instant>,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            phase: CircuitPhase::Closed,
            failure_count: 0,
            last_failure_time: None,
            next_attempt_time: None,
        }
    }
}

#[derive(Debug, Default)]
struct BreakerInner {
    state: CircuitBreakerState,
    trial_in_flight: bool,
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

/// Releases the HalfOpen trial slot even if the guarded future is dropped
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    active: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.active {
            self.breaker.lock().trial_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state
    pub fn state(&self) -> CircuitBreakerState {
        self.lock().state
    }

    /// Back to Closed with no recorded failures
    pub fn reset(&self) {
        *self.lock() = BreakerInner::default();
        debug!(name = %self.name, "Circuit breaker reset");
    }

    /// Run `operation` under the breaker
    pub async fn execute<T, F, Fut>(&self, operation: F) -> ClientResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let is_trial = self.admit()?;
        let _trial = TrialGuard {
            breaker: self,
            active: is_trial,
        };

        let outcome = match tokio::time::timeout(self.config.request_timeout, operation()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    name = %self.name,
                    timeout_ms = self.config.request_timeout.as_millis() as u64,
                    "Guarded call timed out"
                );
                Err(ClientError::Timeout)
            }
        };

        match &outcome {
            Ok(_) => self.record_success(is_trial),
            Err(e) => self.record_failure(e, is_trial),
        }
        outcome
    }

    /// Decide whether a call may proceed. Returns true for the HalfOpen trial.
    fn admit(&self) -> ClientResult<bool> {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state.phase {
            CircuitPhase::Closed => Ok(false),
            CircuitPhase::Open => {
                let next_attempt = inner.state.next_attempt_time.unwrap_or(now);
                if now < next_attempt {
                    return Err(self.open_error(next_attempt - now));
                }
                debug!(name = %self.name, "Cooldown elapsed, trying half-open call");
                inner.state.phase = CircuitPhase::HalfOpen;
                inner.trial_in_flight = true;
                Ok(true)
            }
            CircuitPhase::HalfOpen if inner.trial_in_flight => {
                Err(self.open_error(Duration::ZERO))
            }
            CircuitPhase::HalfOpen => {
                inner.trial_in_flight = true;
                Ok(true)
            }
        }
    }

    fn open_error(&self, remaining: Duration) -> ClientError {
        ClientError::CircuitOpen {
            name: self.name.clone(),
            retry_in_secs: ((remaining.as_millis() + 500) / 1000) as u64,
        }
    }

    /// Only the trial call may close a HalfOpen breaker. Calls admitted
    /// before the breaker opened do not change its phase when they finish.
    fn record_success(&self, is_trial: bool) {
        let mut inner = self.lock();
        match inner.state.phase {
            CircuitPhase::HalfOpen if is_trial => {
                inner.state.phase = CircuitPhase::Closed;
                inner.state.failure_count = 0;
                info!(name = %self.name, "Circuit breaker closed after successful trial");
            }
            CircuitPhase::Closed => {
                inner.state.failure_count = inner.state.failure_count.saturating_sub(1);
            }
            CircuitPhase::HalfOpen | CircuitPhase::Open => {
                debug!(name = %self.name, "Late success ignored while breaker is not closed");
            }
        }
    }

    fn record_failure(&self, error: &ClientError, is_trial: bool) {
        let mut inner = self.lock();
        let now = Instant::now();
        let state = &mut inner.state;

        if !is_trial && state.phase != CircuitPhase::Closed {
            debug!(
                name = %self.name,
                phase = %state.phase,
                error = %error,
                "Late failure ignored while breaker is not closed"
            );
            return;
        }

        state.failure_count += 1;
        state.last_failure_time = Some(now);

        let reopen = is_trial || state.failure_count >= self.config.failure_threshold;
        if reopen {
            state.phase = CircuitPhase::Open;
            state.next_attempt_time = Some(now + self.config.recovery_time);
            warn!(
                name = %self.name,
                failure_count = state.failure_count,
                recovery_ms = self.config.recovery_time.as_millis() as u64,
                error = %error,
                "Circuit breaker opened"
            );
        } else {
            debug!(
                name = %self.name,
                failure_count = state.failure_count,
                threshold = self.config.failure_threshold,
                error = %error,
                "Guarded call failed"
            );
        }
    }
}
