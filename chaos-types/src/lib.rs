//! # chaos-types
//!
//! Shared types for the faultline resilience-verification harness.
//!
//! This crate provides the foundational types used across all faultline crates:
//! - [`ChaosScenario`], [`Severity`] - Fault scenario definitions
//! - [`ChaosTestResult`], [`EngineMetrics`], [`ExecutionLogEntry`] - Run results
//! - [`LeaseId`], [`ConnectionId`] - Pool identity types
//! - [`InjectedFault`], [`ScenarioError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod result;
mod scenario;
pub mod serde_ms;

pub use error::{InjectedFault, ScenarioError};
pub use ids::{ConnectionId, LeaseId};
pub use result::{
    ChaosTestResult, EngineMetrics, ExecutionEvent, ExecutionLogEntry, FaultRecord,
    FaultRecordKind, ResultMetrics,
};
pub use scenario::{ChaosScenario, Severity};
