//! # chaos-resilience
//!
//! Fault-tolerance primitives for the faultline harness.
//!
//! This crate wraps the pure state machines from `chaos-core` with timers and
//! waiter wake-ups:
//! - [`CircuitBreaker`] - rejects calls to a persistently failing dependency
//! - [`ConnectionPool`] - bounds concurrent usage, queues and times out excess demand
//! - [`LeaseManager`] - pool variant whose grants expire and are swept
//! - [`BackoffExecutor`] - retries an operation with exponential backoff
//!
//! All timing goes through `tokio::time`, so tests can run on a paused clock.
//!
//! # Example
//!
//! ```ignore
//! let breaker = CircuitBreaker::new("payments", BreakerConfig::default());
//! let retry = BackoffExecutor::new(BackoffConfig::default())?;
//! let outcome = retry
//!     .execute("charge", || breaker.execute(|| client.charge()))
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod backoff;
mod breaker;
mod error;
mod lease;
mod pool;

pub use backoff::{BackoffExecutor, RetryAttempt, RetryOutcome};
pub use breaker::CircuitBreaker;
pub use error::{BreakerError, PoolError, RetryError};
pub use lease::{LeaseConfig, LeaseManager};
pub use pool::{ConnectionPool, PoolConfig, PoolStats};

pub use chaos_core::{BackoffConfig, BreakerConfig, BreakerSnapshot, CircuitState, Lease};

/// Current time on the tokio clock, as a std `Instant` for the core machines.
pub(crate) fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}
