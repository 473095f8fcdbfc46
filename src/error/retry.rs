use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};

/// Suspends the current task.
///
/// Every wait in the workflow (retry backoff, LRO polling, propagation
/// settling) goes through this trait so tests can record waits instead of
/// sleeping.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled after every failure
    pub initial_delay: Duration,
    /// Decides whether a failure is worth another attempt
    pub retryable: fn(&AppError) -> bool,
}

fn always(_: &AppError) -> bool {
    true
}

impl RetryPolicy {
    /// Retry every failure up to the attempt budget
    pub fn retry_all(max_attempts: u32, initial_delay: Duration) -> Self {
        Self::retry_when(max_attempts, initial_delay, always)
    }

    /// Retry only failures accepted by `retryable`; anything else propagates at once
    pub fn retry_when(
        max_attempts: u32,
        initial_delay: Duration,
        retryable: fn(&AppError) -> bool,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            retryable,
        }
    }

    /// 3 attempts, 30s initial backoff
    pub fn standard() -> Self {
        Self::retry_all(3, Duration::from_secs(30))
    }

    /// Backoff schedule this policy produces when every attempt fails
    pub fn delays(&self) -> Vec<Duration> {
        let mut delay = self.initial_delay;
        let mut out = Vec::new();
        for _ in 1..self.max_attempts {
            out.push(delay);
            delay = delay.saturating_mul(2);
        }
        out
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Runs operations under a [`RetryPolicy`] with exponential backoff
#[derive(Clone)]
pub struct RetryExecutor {
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor").finish_non_exhaustive()
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(Arc::new(TokioSleeper))
    }
}

impl RetryExecutor {
    pub fn new(sleeper: Arc<dyn Sleeper>) -> Self {
        Self { sleeper }
    }

    pub fn sleeper(&self) -> Arc<dyn Sleeper> {
        Arc::clone(&self.sleeper)
    }

    /// Execute an operation with retry logic.
    ///
    /// Returns the first success. A failure the policy does not consider
    /// retryable is returned unchanged; running out of attempts yields
    /// [`AppError::RetryExhausted`] wrapping the last failure.
    pub async fn execute<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = policy.initial_delay;
        let mut attempt = 1;

        loop {
            debug!(
                operation = operation_name,
                attempt = attempt,
                max_attempts = policy.max_attempts,
                "Executing operation with retry"
            );

            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        info!(
                            operation = operation_name,
                            attempt = attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !(policy.retryable)(&error) {
                        debug!(
                            operation = operation_name,
                            attempt = attempt,
                            error = %error,
                            "Error is not retryable"
                        );
                        return Err(error);
                    }

                    if attempt >= policy.max_attempts {
                        warn!(
                            operation = operation_name,
                            attempt = attempt,
                            max_attempts = policy.max_attempts,
                            "Maximum retry attempts reached"
                        );
                        return Err(AppError::RetryExhausted {
                            operation: operation_name.to_string(),
                            attempts: attempt,
                            source: Box::new(error),
                        });
                    }

                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        delay_secs = delay.as_secs_f64(),
                        error = %error,
                        "Attempt failed, waiting before retrying"
                    );

                    self.sleeper.sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }
}
