//! Async circuit breaker.
//!
//! Wraps [`BreakerState`] with a lock and the tokio clock. The lock is only
//! held to admit a call and to record its outcome, never across the call.

use crate::error::BreakerError;
use chaos_core::{Admission, BreakerConfig, BreakerSnapshot, BreakerState, CircuitState, Transition};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Named circuit breaker guarding one dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::new()),
        }
    }

    /// Breaker name, used in errors and logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration this breaker was built with.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Run `op` through the breaker.
    ///
    /// Rejected calls return [`BreakerError::Open`] without invoking `op`.
    /// Half-open trials are bounded by `half_open_timeout`; a trial that runs
    /// past it counts as a failure.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = {
            let mut state = self.lock();
            let (admission, transition) = state.admit(&self.config, crate::now());
            self.log_transition(transition);
            admission
        };

        let trial = match admission {
            Admission::Allowed { trial } => trial,
            Admission::Rejected { retry_after } => {
                tracing::debug!(breaker = %self.name, ?retry_after, "Call rejected");
                return Err(BreakerError::Open {
                    name: self.name.clone(),
                    retry_after,
                });
            }
        };

        let outcome = if trial {
            match tokio::time::timeout(self.config.half_open_timeout, op()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        breaker = %self.name,
                        timeout = ?self.config.half_open_timeout,
                        "Half-open trial timed out"
                    );
                    self.record_failure();
                    return Err(BreakerError::TrialTimeout {
                        name: self.name.clone(),
                        timeout: self.config.half_open_timeout,
                    });
                }
            }
        } else {
            op().await
        };

        match outcome {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Current state and counters.
    pub fn state(&self) -> BreakerSnapshot {
        self.lock().snapshot()
    }

    /// Shorthand for `state().state`.
    pub fn circuit_state(&self) -> CircuitState {
        self.lock().state()
    }

    /// Force the breaker back to Closed with zeroed counters.
    pub fn reset(&self) {
        let mut state = self.lock();
        let from = state.state();
        state.reset();
        if from != CircuitState::Closed {
            tracing::info!(breaker = %self.name, ?from, "Circuit manually reset");
        }
    }

    fn record_success(&self) {
        let transition = self.lock().on_success(&self.config);
        self.log_transition(transition);
    }

    fn record_failure(&self) {
        let transition = self.lock().on_failure(&self.config, crate::now());
        self.log_transition(transition);
    }

    fn log_transition(&self, transition: Option<Transition>) {
        if let Some(Transition { from, to }) = transition {
            match to {
                CircuitState::Open => {
                    tracing::warn!(breaker = %self.name, ?from, ?to, "Circuit opened")
                }
                _ => tracing::info!(breaker = %self.name, ?from, ?to, "Circuit state change"),
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
