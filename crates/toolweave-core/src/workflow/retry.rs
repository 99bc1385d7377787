//! Retry loop with exponential backoff and per-attempt timeouts.
//!
//! Stateless: all logic lives in associated functions on `RetryHandler`
//! that take the policy as a parameter.

use std::future::Future;
use std::time::Duration;

use toolweave_types::workflow::RetryConfig;

use super::step_executor::{StepError, StepFailure, StepOutcome};

/// Outcome of a retried operation.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, StepError>,
    /// Number of times the operation was invoked.
    pub attempts: u32,
}

impl Attempted<serde_json::Value> {
    /// Attach the attempt count to either side of the result.
    pub fn into_outcome(self) -> Result<StepOutcome, StepFailure> {
        let attempts = self.attempts;
        self.result
            .map(|result| StepOutcome { result, attempts })
            .map_err(|error| StepFailure::new(error, attempts))
    }
}

/// Stateless retry handler for tool and HTTP calls.
pub struct RetryHandler;

impl RetryHandler {
    /// The policy that applies to a step: its own, else the workflow's,
    /// else a single attempt.
    pub fn effective_policy(
        step: Option<&RetryConfig>,
        workflow: Option<&RetryConfig>,
    ) -> RetryConfig {
        step.or(workflow)
            .cloned()
            .unwrap_or_else(RetryConfig::single_attempt)
    }

    /// Whether a failure on `attempt` (0-based) should be retried.
    pub fn should_retry(config: &RetryConfig, attempt: u32, error: &StepError) -> bool {
        if attempt + 1 >= config.max_attempts || !error.is_retryable() {
            return false;
        }
        match &config.retry_on_exceptions {
            Some(kinds) => kinds.iter().any(|k| k == error.kind()),
            None => true,
        }
    }

    /// Sleep before the retry that follows a failed `attempt` (0-based):
    /// `initial_delay * backoff_factor^attempt`, clamped to `max_delay`.
    pub fn delay_for_attempt(config: &RetryConfig, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let mut secs = config.initial_delay * config.backoff_factor.powi(exponent);
        if let Some(max) = config.max_delay {
            secs = secs.min(max);
        }
        if !secs.is_finite() {
            secs = f64::from(u32::MAX);
        }
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::ZERO)
    }

    /// Run `op` until it succeeds, the policy is exhausted, or a
    /// non-retryable error occurs. Each attempt is bounded by
    /// `attempt_timeout` when set; expiry counts as a failed attempt.
    pub async fn run<T, F, Fut>(
        config: &RetryConfig,
        attempt_timeout: Option<Duration>,
        step_id: &str,
        mut op: F,
    ) -> Attempted<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
    {
        let mut attempt = 0u32;
        loop {
            let result = match attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, op(attempt)).await {
                    Ok(r) => r,
                    Err(_) => Err(StepError::Timeout(limit.as_secs())),
                },
                None => op(attempt).await,
            };

            match result {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt + 1,
                    };
                }
                Err(error) if Self::should_retry(config, attempt, &error) => {
                    let delay = Self::delay_for_attempt(config, attempt);
                    tracing::warn!(
                        step_id,
                        attempt = attempt + 1,
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "step attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    return Attempted {
                        result: Err(error),
                        attempts: attempt + 1,
                    };
                }
            }
        }
    }
}
