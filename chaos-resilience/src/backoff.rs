//! Retry with exponential backoff.

use crate::error::RetryError;
use chaos_core::{BackoffConfig, BackoffConfigError, BackoffSchedule, RandomSource, ThreadRandom};
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// One entry in a retry log.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    /// 1-based attempt number.
    pub attempt_number: u32,
    /// Time slept before this attempt.
    pub delay_before_attempt: Duration,
    /// When the attempt started.
    pub timestamp: Instant,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Error message when it failed.
    pub error: Option<String>,
}

/// A successful retried operation.
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    /// The operation's result.
    pub value: T,
    /// Every attempt made, the last one successful.
    pub attempts: Vec<RetryAttempt>,
}

/// Runs operations with exponential backoff between attempts.
#[derive(Debug)]
pub struct BackoffExecutor {
    config: BackoffConfig,
    random: Mutex<Box<dyn RandomSource>>,
}

impl BackoffExecutor {
    /// Create an executor using the thread RNG for jitter.
    pub fn new(config: BackoffConfig) -> Result<Self, BackoffConfigError> {
        Self::with_random(config, Box::new(ThreadRandom))
    }

    /// Create an executor with an explicit jitter source.
    pub fn with_random(
        config: BackoffConfig,
        random: Box<dyn RandomSource>,
    ) -> Result<Self, BackoffConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            random: Mutex::new(random),
        })
    }

    /// Backoff configuration.
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Run `op` until it succeeds or `max_attempts` is reached.
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: &str,
        op: F,
    ) -> Result<RetryOutcome<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.execute_if(operation, op, |_| true).await
    }

    /// Like [`execute`](Self::execute), but stops early on errors for which
    /// `is_retryable` returns false.
    pub async fn execute_if<T, E, F, Fut, R>(
        &self,
        operation: &str,
        mut op: F,
        is_retryable: R,
    ) -> Result<RetryOutcome<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        R: Fn(&E) -> bool,
    {
        let mut schedule = BackoffSchedule::new(self.config.clone());
        let mut log = Vec::new();
        let mut last_error = None;

        while let Some(step) = schedule.next_step(self.sample()) {
            if !step.delay.is_zero() {
                tracing::debug!(
                    operation,
                    attempt = step.attempt,
                    delay = ?step.delay,
                    "Backing off before retry"
                );
                tokio::time::sleep(step.delay).await;
            }

            let timestamp = Instant::now();
            match op().await {
                Ok(value) => {
                    log.push(RetryAttempt {
                        attempt_number: step.attempt,
                        delay_before_attempt: step.delay,
                        timestamp,
                        success: true,
                        error: None,
                    });
                    if step.attempt > 1 {
                        tracing::info!(operation, attempts = step.attempt, "Succeeded after retry");
                    }
                    return Ok(RetryOutcome {
                        value,
                        attempts: log,
                    });
                }
                Err(e) => {
                    tracing::debug!(operation, attempt = step.attempt, error = %e, "Attempt failed");
                    log.push(RetryAttempt {
                        attempt_number: step.attempt,
                        delay_before_attempt: step.delay,
                        timestamp,
                        success: false,
                        error: Some(e.to_string()),
                    });
                    if !is_retryable(&e) {
                        tracing::warn!(operation, attempt = step.attempt, error = %e, "Non-retryable failure");
                        return Err(RetryError::NonRetryable {
                            operation: operation.to_string(),
                            attempt: step.attempt,
                            error: e,
                            log,
                        });
                    }
                    last_error = Some(e);
                }
            }
        }

        let attempts = schedule.attempts();
        match last_error {
            Some(last_error) => {
                tracing::warn!(operation, attempts, error = %last_error, "Retries exhausted");
                Err(RetryError::MaxRetriesExceeded {
                    operation: operation.to_string(),
                    attempts,
                    last_error,
                    log,
                })
            }
            // A validated config always runs at least one attempt.
            None => Err(RetryError::Config(BackoffConfigError::NoAttempts)),
        }
    }

    fn sample(&self) -> f64 {
        self.random
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sample()
    }
}
