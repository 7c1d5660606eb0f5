use conductor_core::{ConductorError, ConductorResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::info;

/// Type alias for the injectable sleep function used in tests.
#[cfg(test)]
type SleepFn = Box<
    dyn Fn(Duration) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        + Send
        + Sync,
>;

/// Exponential-backoff retry policy for a single operation.
///
/// Attempts are 0-indexed: `delay(attempt)` is the pause taken after
/// attempt number `attempt` fails. After `max_retries` exhausted retries
/// the final error is returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the initial attempt (so `max_retries + 1` calls total).
    pub max_retries: u32,
    /// Base delay for the backoff curve.
    pub base_delay: Duration,
    /// Cap applied to the computed delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub exponential_base: f64,
    /// When set, each delay is scaled by a uniform factor in [0.5, 1.0).
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps and never retries. Useful where retry is
    /// composed in but a caller wants a single attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            exponential_base: 1.0,
            jitter: false,
        }
    }

    /// Delay after the given 0-indexed failed attempt:
    /// `min(base_delay * exponential_base^attempt, max_delay)`, optionally
    /// scaled by the jitter factor.
    pub fn delay(&self, attempt: u32) -> Duration {
        let raw = self.base_delay.as_secs_f64() * self.exponential_base.powi(attempt as i32);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let scaled = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..1.0)
        } else {
            capped
        };
        Duration::from_secs_f64(scaled)
    }

    /// Run `op`, retrying with backoff until it succeeds or retries are
    /// exhausted; the last error is returned.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> ConductorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ConductorResult<T>>,
    {
        let sleep = |d: Duration| -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> {
            Box::pin(tokio::time::sleep(d))
        };
        self.call_with_sleep(&mut op, sleep).await
    }

    async fn call_with_sleep<T, F, Fut, S>(&self, op: &mut F, sleep: S) -> ConductorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ConductorResult<T>>,
        S: Fn(Duration) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>>,
    {
        let mut last_err: Option<ConductorError> = None;

        for attempt in 0..=self.max_retries {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt < self.max_retries {
                        let delay = self.delay(attempt);
                        info!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Attempt failed, backing off"
                        );
                        sleep(delay).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| ConductorError::WorkerExecution("retries exhausted".into())))
    }

    /// Test hook: run with an injected sleep so tests never wait.
    #[cfg(test)]
    async fn call_no_sleep<T, F, Fut>(&self, mut op: F) -> ConductorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ConductorResult<T>>,
    {
        let noop: SleepFn = Box::new(|_| Box::pin(async {}));
        self.call_with_sleep(&mut op, noop).await
    }
}
