//! Exponential backoff schedule.
//!
//! The schedule yields one [`BackoffStep`] per attempt: the first attempt runs
//! immediately, each later one after the current delay (optionally jittered by
//! up to ±[`JITTER_FRACTION`]). The base delay grows by `multiplier` after
//! every step and is capped at `max_delay`.

use std::time::Duration;
use thiserror::Error;

/// Maximum relative jitter applied to a delay.
pub const JITTER_FRACTION: f64 = 0.1;

/// Backoff tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Cap for any single delay.
    pub max_delay: Duration,
    /// Growth factor between delays (>= 1).
    pub multiplier: f64,
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Perturb delays by up to ±10%.
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_attempts: 3,
            jitter: true,
        }
    }
}

/// Rejected backoff configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackoffConfigError {
    /// No attempts would run.
    #[error("max_attempts must be at least 1")]
    NoAttempts,
    /// Shrinking delays would break monotonicity.
    #[error("multiplier {0} must be a finite number >= 1")]
    InvalidMultiplier(f64),
    /// Initial delay exceeds the cap.
    #[error("initial_delay {initial:?} exceeds max_delay {max:?}")]
    InitialAboveMax {
        /// Configured initial delay.
        initial: Duration,
        /// Configured cap.
        max: Duration,
    },
}

impl BackoffConfig {
    /// Check the configuration.
    pub fn validate(&self) -> Result<(), BackoffConfigError> {
        if self.max_attempts == 0 {
            return Err(BackoffConfigError::NoAttempts);
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(BackoffConfigError::InvalidMultiplier(self.multiplier));
        }
        if self.initial_delay > self.max_delay {
            return Err(BackoffConfigError::InitialAboveMax {
                initial: self.initial_delay,
                max: self.max_delay,
            });
        }
        Ok(())
    }
}

/// One scheduled attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffStep {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Time to wait before running this attempt.
    pub delay: Duration,
    /// Un-jittered delay this step was derived from.
    pub base_delay: Duration,
}

/// Iterator-like backoff schedule driven by external jitter samples.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    config: BackoffConfig,
    current: Duration,
    attempt: u32,
}

impl BackoffSchedule {
    /// Start a schedule. The config should already be validated.
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.initial_delay;
        Self {
            config,
            current,
            attempt: 0,
        }
    }

    /// Attempts handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Next attempt, or `None` once `max_attempts` is reached.
    ///
    /// `jitter_sample` is a uniform value in `[0, 1)`; it is ignored when
    /// jitter is disabled and for the first attempt.
    pub fn next_step(&mut self, jitter_sample: f64) -> Option<BackoffStep> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }
        self.attempt += 1;

        if self.attempt == 1 {
            return Some(BackoffStep {
                attempt: 1,
                delay: Duration::ZERO,
                base_delay: Duration::ZERO,
            });
        }

        let base = self.current;
        let delay = if self.config.jitter {
            let factor = 1.0 + (jitter_sample * 2.0 - 1.0) * JITTER_FRACTION;
            scale(base, factor.max(0.0)).min(self.config.max_delay)
        } else {
            base
        };

        self.current = scale(base, self.config.multiplier).min(self.config.max_delay);

        Some(BackoffStep {
            attempt: self.attempt,
            delay,
            base_delay: base,
        })
    }
}

/// Multiply a duration, rounding to the nearest nanosecond.
fn scale(d: Duration, factor: f64) -> Duration {
    Duration::from_nanos((d.as_nanos() as f64 * factor).round() as u64)
}
