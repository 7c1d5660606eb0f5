use conductor_core::{ConductorError, ConductorResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through; consecutive failures are counted.
    Closed,
    /// Calls are rejected without invoking the operation until the
    /// recovery timeout elapses.
    Open,
    /// One trial call is in flight; its outcome decides Closed vs Open.
    HalfOpen,
}

/// Predicate deciding which errors trip the breaker. Errors it rejects
/// pass through to the caller without counting as breaker failures.
pub type FailureFilter = fn(&ConductorError) -> bool;

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Three-state circuit breaker guarding one named operation.
///
/// Closed → (failure_threshold consecutive tripping failures) → Open →
/// (recovery_timeout elapsed since last failure, next call) → HalfOpen →
/// Closed on trial success, back to Open on trial failure. While open and
/// inside the recovery window, calls fail fast with
/// [`ConductorError::CircuitOpen`] and the operation is never invoked.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    failure_filter: Option<FailureFilter>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// A closed breaker for the named operation.
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            recovery_timeout,
            failure_filter: None,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Only count errors accepted by `filter` as breaker failures.
    pub fn with_failure_filter(mut self, filter: FailureFilter) -> Self {
        self.failure_filter = Some(filter);
        self
    }

    /// The operation name this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state (for monitoring and tests).
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Current consecutive-failure count.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Run `op` under the breaker.
    pub async fn call<T, F, Fut>(&self, op: F) -> ConductorResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ConductorResult<T>>,
    {
        self.before_call()?;

        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                if self.failure_filter.map_or(true, |f| f(&e)) {
                    self.on_failure();
                }
                Err(e)
            }
        }
    }

    fn before_call(&self) -> ConductorResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let recovered = inner
                    .last_failure
                    .map_or(true, |at| at.elapsed() >= self.recovery_timeout);
                if recovered {
                    info!(operation = %self.name, "Circuit half-open, attempting trial call");
                    inner.state = CircuitState::HalfOpen;
                    Ok(())
                } else {
                    Err(ConductorError::CircuitOpen(self.name.clone()))
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            info!(operation = %self.name, "Trial call succeeded, circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        let opened = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.failure_count >= self.failure_threshold,
            CircuitState::Open => true,
        };
        if opened && inner.state != CircuitState::Open {
            warn!(
                operation = %self.name,
                failures = inner.failure_count,
                "Circuit opened"
            );
        }
        if opened {
            inner.state = CircuitState::Open;
        }
    }
}
