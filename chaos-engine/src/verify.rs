//! Pass/fail checks over a finished run.
//!
//! These are pure functions: they take the workload report and engine results
//! as input and return assertion results.

use crate::workload::WorkloadReport;
use chaos_types::ChaosTestResult;
use serde::Serialize;
use std::time::Duration;

/// Verification thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationConfig {
    /// Minimum workload success rate in [0, 1].
    pub min_success_rate: f64,
    /// Longest acceptable fault window.
    pub max_recovery_time: Duration,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            min_success_rate: 0.5,
            max_recovery_time: Duration::from_secs(60),
        }
    }
}

/// Result of an assertion check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionResult {
    /// Whether the assertion passed
    pub passed: bool,
    /// Description of what was checked
    pub description: String,
    /// Details on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_details: Option<String>,
}

impl AssertionResult {
    /// Create a passing result.
    pub fn pass(description: &str) -> Self {
        Self {
            passed: true,
            description: description.into(),
            failure_details: None,
        }
    }

    /// Create a failing result.
    pub fn fail(description: &str, details: &str) -> Self {
        Self {
            passed: false,
            description: description.into(),
            failure_details: Some(details.into()),
        }
    }
}

/// Assert the workload kept at least `min` of its requests succeeding.
pub fn assert_success_rate(report: &WorkloadReport, min: f64) -> AssertionResult {
    if report.success_rate >= min {
        AssertionResult::pass(&format!(
            "Success rate {:.3} >= {:.3} ({}/{} requests)",
            report.success_rate, min, report.succeeded, report.attempted
        ))
    } else {
        AssertionResult::fail(
            &format!("Success rate should be at least {:.3}", min),
            &format!(
                "{}/{} requests succeeded ({:.3}); {} circuit rejections, {} pool timeouts, {} retry exhaustions",
                report.succeeded,
                report.attempted,
                report.success_rate,
                report.circuit_rejections,
                report.pool_timeouts,
                report.retry_exhaustions
            ),
        )
    }
}

/// Assert every finalized fault window closed within `max`.
pub fn assert_recovery_within(results: &[ChaosTestResult], max: Duration) -> AssertionResult {
    let limit = max.as_millis() as u64;
    let slow: Vec<String> = results
        .iter()
        .filter(|r| r.is_finalized() && r.metrics.recovery_time_ms > limit)
        .map(|r| format!("{} ({} ms)", r.scenario, r.metrics.recovery_time_ms))
        .collect();

    if slow.is_empty() {
        AssertionResult::pass(&format!(
            "All {} fault windows closed within {} ms",
            results.len(),
            limit
        ))
    } else {
        AssertionResult::fail(
            &format!("Fault windows should close within {} ms", limit),
            &format!("Exceeded by: {}", slow.join(", ")),
        )
    }
}

/// Assert nothing was left active after the engine stopped.
pub fn assert_no_active_scenarios(active: &[String]) -> AssertionResult {
    if active.is_empty() {
        AssertionResult::pass("No scenarios active after stop")
    } else {
        AssertionResult::fail(
            "No scenarios should be active after stop",
            &format!("Still active: {}", active.join(", ")),
        )
    }
}

/// Assert every result was finalized exactly once.
pub fn assert_results_finalized(results: &[ChaosTestResult]) -> AssertionResult {
    let open: Vec<&str> = results
        .iter()
        .filter(|r| !r.is_finalized())
        .map(|r| r.scenario.as_str())
        .collect();
    if open.is_empty() {
        AssertionResult::pass(&format!("All {} results finalized", results.len()))
    } else {
        AssertionResult::fail(
            "Every result should be finalized",
            &format!("Open results: {}", open.join(", ")),
        )
    }
}

/// Run every check for a finished run.
pub fn verify_run(
    config: &VerificationConfig,
    report: &WorkloadReport,
    results: &[ChaosTestResult],
    active_after_stop: &[String],
) -> Vec<AssertionResult> {
    vec![
        assert_success_rate(report, config.min_success_rate),
        assert_recovery_within(results, config.max_recovery_time),
        assert_no_active_scenarios(active_after_stop),
        assert_results_finalized(results),
    ]
}
