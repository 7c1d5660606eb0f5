//! Resilience layer: retry, circuit breaking, fallback, and error tracking.
//!
//! Pure and reusable — nothing here knows about tasks, agents, or the
//! scheduler. The worker wraps every execution of external work in a
//! [`ResilientCall`], which composes the pieces as
//! `retry(circuit_breaker(op))`, records terminal failures to the
//! [`ErrorTracker`], and then consults the [`FallbackHandler`].
//!
//! # Main types
//!
//! - [`RetryPolicy`] — exponential backoff with cap and optional jitter.
//! - [`CircuitBreaker`] — Closed/Open/HalfOpen guard for one named operation.
//! - [`FallbackHandler`] — per-operation fallback registry.
//! - [`ErrorTracker`] — bounded ring buffer of [`ErrorRecord`]s with aggregate queries.
//! - [`ResilientCall`] — the composition used for a fully-protected call.

/// Circuit breaker for one named operation.
pub mod circuit_breaker;
/// Bounded error history and aggregate queries.
pub mod error_tracker;
/// Per-operation fallback registry.
pub mod fallback;
/// Exponential-backoff retry policy.
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitState, FailureFilter};
pub use error_tracker::{ErrorRecord, ErrorSeverity, ErrorTracker, DEFAULT_CAPACITY};
pub use fallback::FallbackHandler;
pub use retry::RetryPolicy;

use conductor_core::{ConductorError, ConductorResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Short classification tag for a tracked error.
pub fn error_kind(error: &ConductorError) -> &'static str {
    match error {
        ConductorError::DependencyCycle(_) => "dependency_cycle",
        ConductorError::CircuitOpen(_) => "circuit_open",
        ConductorError::WorkerExecution(_) => "worker_execution",
        ConductorError::ResourceExhaustion(_) => "resource_exhaustion",
        ConductorError::Store(_) => "store",
        ConductorError::VersionConflict(_) => "version_conflict",
        ConductorError::Scheduler(_) => "scheduler",
        ConductorError::Router(_) => "router",
        ConductorError::Config(_) => "config",
        ConductorError::Serialization(_) => "serialization",
        ConductorError::Io(_) => "io",
    }
}

/// Default severity assigned to a tracked error by kind.
pub fn classify_severity(error: &ConductorError) -> ErrorSeverity {
    match error {
        ConductorError::DependencyCycle(_) | ConductorError::ResourceExhaustion(_) => {
            ErrorSeverity::Critical
        }
        ConductorError::WorkerExecution(_) | ConductorError::Store(_) | ConductorError::Io(_) => {
            ErrorSeverity::High
        }
        ConductorError::CircuitOpen(_)
        | ConductorError::VersionConflict(_)
        | ConductorError::Scheduler(_)
        | ConductorError::Serialization(_) => ErrorSeverity::Medium,
        ConductorError::Router(_) | ConductorError::Config(_) => ErrorSeverity::Low,
    }
}

/// Serializable knobs for the whole layer, as loaded from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,
    #[serde(default = "default_tracker_capacity")]
    pub tracker_capacity: usize,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_exponential_base() -> f64 {
    2.0
}
fn default_jitter() -> bool {
    true
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_recovery_timeout_ms() -> u64 {
    60_000
}
fn default_tracker_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            exponential_base: default_exponential_base(),
            jitter: default_jitter(),
            failure_threshold: default_failure_threshold(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
            tracker_capacity: default_tracker_capacity(),
        }
    }
}

impl ResilienceConfig {
    /// The retry policy described by this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            exponential_base: self.exponential_base,
            jitter: self.jitter,
        }
    }

    /// A breaker for the named operation described by this config.
    pub fn circuit_breaker(&self, operation: impl Into<String>) -> CircuitBreaker {
        CircuitBreaker::new(
            operation,
            self.failure_threshold,
            Duration::from_millis(self.recovery_timeout_ms),
        )
    }
}

/// A fully-protected call for one named operation:
/// `retry(circuit_breaker(op))`, then error tracking, then fallback.
pub struct ResilientCall {
    operation: String,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    tracker: Arc<ErrorTracker>,
}

impl ResilientCall {
    pub fn new(
        operation: impl Into<String>,
        retry: RetryPolicy,
        breaker: CircuitBreaker,
        tracker: Arc<ErrorTracker>,
    ) -> Self {
        Self {
            operation: operation.into(),
            retry,
            breaker,
            tracker,
        }
    }

    /// Build the protected call for `operation` straight from config.
    pub fn from_config(
        operation: &str,
        config: &ResilienceConfig,
        tracker: Arc<ErrorTracker>,
    ) -> Self {
        Self::new(
            operation,
            config.retry_policy(),
            config.circuit_breaker(operation),
            tracker,
        )
    }

    /// The tracker terminal failures are recorded to.
    pub fn tracker(&self) -> &Arc<ErrorTracker> {
        &self.tracker
    }

    /// The breaker state (for monitoring and tests).
    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Run `op` under retry + breaker; on terminal failure record the
    /// error, then try the registered fallback, else propagate.
    pub async fn run<T, F, Fut>(
        &self,
        op: F,
        fallbacks: &FallbackHandler<T>,
    ) -> ConductorResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ConductorResult<T>>,
    {
        match self.retry.call(|| self.breaker.call(&op)).await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.tracker.record(
                    ErrorRecord::new(error_kind(&e), e.to_string(), classify_severity(&e))
                        .with_context("operation", self.operation.clone()),
                );

                match fallbacks.invoke(&self.operation).await {
                    Some(result) => {
                        warn!(
                            operation = %self.operation,
                            error = %e,
                            "Primary failed terminally, fallback engaged"
                        );
                        result
                    }
                    None => Err(e),
                }
            }
        }
    }
}
