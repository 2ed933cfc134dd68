//! # faultline-chaos-tests
//!
//! End-to-end chaos scenarios for faultline.
//!
//! This crate exercises the harness as a whole:
//! - Resilience primitives under injected faults (breaker, pool, backoff)
//! - Every fault injector against the simulated environment
//! - The scheduler's activation, expiry and cleanup guarantees
//! - Full runs assembled from run files
//!
//! Everything runs in-process on tokio's paused clock; no containers or
//! network access are required.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assertions;
pub mod harness;

pub mod scenarios;
