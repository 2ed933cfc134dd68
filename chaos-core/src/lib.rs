//! # chaos-core
//!
//! Pure logic for faultline (no I/O, instant tests).
//!
//! This crate implements the state machines and bookkeeping behind the
//! resilience primitives without any timers, tasks or locks, enabling fast
//! unit tests.
//!
//! ## Design Philosophy
//!
//! Every function takes the current time (`now`) and any random sample as
//! input instead of reading a clock or an ambient RNG. This enables:
//! - Instant unit tests (no sleeps, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual waiting (sleeps, timeouts, waiter wake-ups) is performed by
//! `chaos-resilience` and `chaos-engine`, which drive these machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod breaker;
pub mod deadline;
pub mod intensity;
pub mod pool;
pub mod random;

pub use backoff::{BackoffConfig, BackoffConfigError, BackoffSchedule, BackoffStep, JITTER_FRACTION};
pub use breaker::{
    Admission, BreakerConfig, BreakerSnapshot, BreakerState, CircuitState, Transition,
};
pub use deadline::DeadlineQueue;
pub use intensity::{FaultIntensity, LATENCY_JITTER, MEMORY_CHUNK_BYTES};
pub use pool::{Lease, LeaseCheck, PoolLedger, WaiterId};
pub use random::{RandomSource, ScriptedRandom, SeededRandom, ThreadRandom};
