//! Results, metrics and the execution log produced by a chaos run.

use crate::scenario::{ChaosScenario, Severity};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Where a fault record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultRecordKind {
    /// The injector failed to activate.
    Activation,
    /// The injector failed to clean up.
    Cleanup,
    /// A fault observed while the scenario was active.
    Injected,
}

/// One entry in a result's ordered error list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultRecord {
    /// When the fault was recorded.
    pub at: SystemTime,
    /// Origin of the fault.
    pub kind: FaultRecordKind,
    /// Human-readable description.
    pub message: String,
}

impl FaultRecord {
    /// Record a fault now.
    pub fn now(kind: FaultRecordKind, message: impl Into<String>) -> Self {
        Self {
            at: SystemTime::now(),
            kind,
            message: message.into(),
        }
    }
}

/// Per-window metrics attached to a finalized result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetrics {
    /// Requests touched by an injected rule or outage during the window.
    pub requests_affected: u64,
    /// Failed requests over total requests during the window.
    pub error_rate: f64,
    /// Monotonic length of the fault window in milliseconds.
    pub recovery_time_ms: u64,
}

/// Outcome of one scenario activation.
///
/// Opened at activation, finalized exactly once at cleanup, never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChaosTestResult {
    /// Scenario name.
    pub scenario: String,
    /// Scenario severity at activation.
    pub severity: Severity,
    /// Whether the injector activated successfully.
    pub executed: bool,
    /// Wall-clock activation time.
    pub start_time: SystemTime,
    /// Wall-clock finalization time; `None` while open.
    pub end_time: Option<SystemTime>,
    /// Ordered fault records.
    pub errors: Vec<FaultRecord>,
    /// Window metrics, filled at finalization.
    pub metrics: ResultMetrics,
}

impl ChaosTestResult {
    /// Open a result for a scenario that is being activated.
    pub fn open(scenario: &ChaosScenario) -> Self {
        Self {
            scenario: scenario.name.clone(),
            severity: scenario.severity,
            executed: false,
            start_time: SystemTime::now(),
            end_time: None,
            errors: Vec::new(),
            metrics: ResultMetrics::default(),
        }
    }

    /// Returns true once the result has been finalized.
    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Aggregate engine metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineMetrics {
    /// Registered scenarios.
    pub total_scenarios: usize,
    /// Finalized results.
    pub executed_scenarios: usize,
    /// Currently active scenarios.
    pub active_scenarios: usize,
    /// Sum of error-list lengths over all results.
    pub total_errors: usize,
    /// Mean window length over finalized results, in milliseconds.
    pub average_recovery_time_ms: f64,
}

impl EngineMetrics {
    /// Aggregate metrics from the results log.
    pub fn aggregate(total_scenarios: usize, active_scenarios: usize, results: &[ChaosTestResult]) -> Self {
        let finalized: Vec<&ChaosTestResult> = results.iter().filter(|r| r.is_finalized()).collect();
        let average_recovery_time_ms = if finalized.is_empty() {
            0.0
        } else {
            finalized
                .iter()
                .map(|r| r.metrics.recovery_time_ms as f64)
                .sum::<f64>()
                / finalized.len() as f64
        };

        Self {
            total_scenarios,
            executed_scenarios: results.len(),
            active_scenarios,
            total_errors: results.iter().map(|r| r.errors.len()).sum(),
            average_recovery_time_ms,
        }
    }
}

/// Scheduler events recorded in the execution log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// Injector activated.
    Activated,
    /// Injector failed to activate.
    ActivationFailed,
    /// Scenario cleaned up and finalized.
    Deactivated,
    /// Cleanup reported an error (scenario still finalized).
    CleanupFailed,
}

/// One entry of the engine's append-only execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    /// When the event happened.
    pub at: SystemTime,
    /// Scenario name.
    pub scenario: String,
    /// What happened.
    pub event: ExecutionEvent,
    /// Optional detail (error text, footprint summary).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
