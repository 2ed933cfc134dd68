//! Error types for the resilience primitives.
//!
//! These propagate to callers as typed errors so assertions can match on
//! them directly.

use crate::backoff::RetryAttempt;
use chaos_core::BackoffConfigError;
use chaos_types::LeaseId;
use std::time::Duration;
use thiserror::Error;

/// Circuit breaker errors.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the operation was not invoked.
    #[error("circuit {name} is open (retry after {retry_after:?})")]
    Open {
        /// Breaker name.
        name: String,
        /// Time until a half-open trial will be admitted.
        retry_after: Duration,
    },

    /// A half-open trial did not finish within the trial window.
    #[error("circuit {name} half-open trial timed out after {timeout:?}")]
    TrialTimeout {
        /// Breaker name.
        name: String,
        /// Trial window.
        timeout: Duration,
    },

    /// The operation ran and failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Returns true if the call was rejected without running.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// The operation's own error, if it ran and failed.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Connection pool and lease errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// No connection was released before the wait timeout.
    #[error("pool timeout: no connection available within {waited:?} (max {max_connections})")]
    Timeout {
        /// How long the request waited.
        waited: Duration,
        /// Pool capacity.
        max_connections: usize,
    },

    /// The lease has expired and was reclaimed.
    #[error("lease {0} expired")]
    LeaseExpired(LeaseId),

    /// The lease is not held (never granted, released or swept).
    #[error("unknown lease {0}")]
    UnknownLease(LeaseId),
}

/// Backoff retry errors.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed.
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        /// Name of the retried operation.
        operation: String,
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last_error: E,
        /// Full attempt log.
        log: Vec<RetryAttempt>,
    },

    /// An attempt failed with an error the caller marked as not retryable.
    #[error("{operation} failed with a non-retryable error on attempt {attempt}: {error}")]
    NonRetryable {
        /// Name of the retried operation.
        operation: String,
        /// Attempt that failed.
        attempt: u32,
        /// The error.
        error: E,
        /// Full attempt log.
        log: Vec<RetryAttempt>,
    },

    /// The backoff configuration was rejected.
    #[error("invalid backoff configuration: {0}")]
    Config(#[from] BackoffConfigError),
}

impl<E> RetryError<E> {
    /// Attempt log, when any attempt ran.
    pub fn attempts(&self) -> &[RetryAttempt] {
        match self {
            Self::MaxRetriesExceeded { log, .. } | Self::NonRetryable { log, .. } => log,
            Self::Config(_) => &[],
        }
    }

    /// The last underlying error, if any attempt ran.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::MaxRetriesExceeded { last_error, .. } => Some(last_error),
            Self::NonRetryable { error, .. } => Some(error),
            Self::Config(_) => None,
        }
    }
}
