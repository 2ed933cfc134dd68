//! Circuit breaker state machine.
//!
//! This module provides a pure, side-effect-free breaker. Callers ask for
//! admission before running the guarded operation and report its outcome
//! afterwards; every method takes `now` explicitly.
//!
//! The only legal edges are:
//!
//! ```text
//! Closed   --failures >= threshold-------------> Open
//! Open     --now - last_failure > reset_timeout--> HalfOpen
//! HalfOpen --successes >= required_successes---> Closed
//! HalfOpen --any failure-----------------------> Open
//! ```

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected without running.
    Open,
    /// Trial calls probe whether the dependency recovered.
    HalfOpen,
}

/// Breaker tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures in Closed that open the circuit.
    pub failure_threshold: u32,
    /// Quiet time after the last failure before a trial is allowed.
    pub reset_timeout: Duration,
    /// Successful trials in HalfOpen that close the circuit.
    pub required_successes: u32,
    /// Upper bound on a single half-open trial call.
    pub half_open_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            required_successes: 2,
            half_open_timeout: Duration::from_secs(10),
        }
    }
}

/// Answer to "may this call run?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Run the call. `trial` is true when running in HalfOpen.
    Allowed {
        /// Whether this call is a half-open trial.
        trial: bool,
    },
    /// Reject without running.
    Rejected {
        /// Time until a trial will be admitted.
        retry_after: Duration,
    },
}

/// A state change, reported so the caller can log it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Previous state.
    pub from: CircuitState,
    /// New state.
    pub to: CircuitState,
}

/// Read-only copy of the breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    /// Current position.
    pub state: CircuitState,
    /// Consecutive failures.
    pub failure_count: u32,
    /// Successful trials (HalfOpen only).
    pub success_count: u32,
    /// When the last failure was recorded.
    pub last_failure_time: Option<Instant>,
}

/// Breaker state - NO I/O, just transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerState {
    /// Create a closed breaker with zeroed counters.
    pub fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
        }
    }

    /// Current position.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Copy out the full state.
    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            last_failure_time: self.last_failure_time,
        }
    }

    /// Decide whether a call may run at `now`.
    ///
    /// This is the only place Open moves to HalfOpen.
    pub fn admit(&mut self, config: &BreakerConfig, now: Instant) -> (Admission, Option<Transition>) {
        match self.state {
            CircuitState::Closed => (Admission::Allowed { trial: false }, None),
            CircuitState::HalfOpen => (Admission::Allowed { trial: true }, None),
            CircuitState::Open => {
                let elapsed = self
                    .last_failure_time
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or(Duration::MAX);

                if elapsed > config.reset_timeout {
                    self.success_count = 0;
                    let t = self.move_to(CircuitState::HalfOpen);
                    (Admission::Allowed { trial: true }, t)
                } else {
                    (
                        Admission::Rejected {
                            retry_after: config.reset_timeout - elapsed,
                        },
                        None,
                    )
                }
            }
        }
    }

    /// Record a successful call.
    pub fn on_success(&mut self, config: &BreakerConfig) -> Option<Transition> {
        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
                None
            }
            CircuitState::HalfOpen => {
                self.success_count = self.success_count.saturating_add(1);
                if self.success_count >= config.required_successes {
                    self.failure_count = 0;
                    self.success_count = 0;
                    self.move_to(CircuitState::Closed)
                } else {
                    None
                }
            }
            // Late outcome of a call admitted before the circuit opened.
            CircuitState::Open => None,
        }
    }

    /// Record a failed call at `now`.
    pub fn on_failure(&mut self, config: &BreakerConfig, now: Instant) -> Option<Transition> {
        match self.state {
            CircuitState::Closed => {
                self.failure_count = self.failure_count.saturating_add(1);
                self.last_failure_time = Some(now);
                if self.failure_count >= config.failure_threshold {
                    self.move_to(CircuitState::Open)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                self.failure_count = self.failure_count.saturating_add(1);
                self.success_count = 0;
                self.last_failure_time = Some(now);
                self.move_to(CircuitState::Open)
            }
            CircuitState::Open => None,
        }
    }

    /// Force the breaker back to Closed with zeroed counters.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn move_to(&mut self, to: CircuitState) -> Option<Transition> {
        let from = self.state;
        self.state = to;
        (from != to).then_some(Transition { from, to })
    }
}
