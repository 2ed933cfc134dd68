//! Assertion helpers for chaos testing.
//!
//! These are pure functions that verify harness state after chaos scenarios
//! complete. They take state as input and return pass/fail.

use crate::harness::HarnessState;
use chaos_core::{BreakerSnapshot, CircuitState};
use chaos_engine::AssertionResult;
use chaos_resilience::{PoolStats, RetryAttempt};
use chaos_types::ExecutionEvent;
use std::collections::HashMap;
use std::time::Duration;

/// Assert that every fault was undone: no outages, routes, skew or corruptors.
pub fn assert_environment_restored(state: &HarnessState) -> AssertionResult {
    let mut leftovers = Vec::new();
    if !state.failing_dependencies.is_empty() {
        leftovers.push(format!(
            "failing dependencies {:?}",
            state.failing_dependencies
        ));
    }
    if state.routes > 0 {
        leftovers.push(format!("{} interception routes", state.routes));
    }
    if state.offline {
        leftovers.push("network offline".to_string());
    }
    if state.clock_offset_ms != 0 {
        leftovers.push(format!("clock skewed by {} ms", state.clock_offset_ms));
    }
    if !state.write_path_clean {
        leftovers.push("corruptor on write path".to_string());
    }

    if leftovers.is_empty() {
        AssertionResult::pass("Environment fully restored")
    } else {
        AssertionResult::fail("Environment should be fully restored", &leftovers.join("; "))
    }
}

/// Assert that each activation produced exactly one finalized result.
///
/// Activations are counted from the execution log (`Activated` and
/// `ActivationFailed`); every `Activated` must be closed by exactly one
/// `Deactivated` or `CleanupFailed`.
pub fn assert_one_result_per_activation(state: &HarnessState) -> AssertionResult {
    let mut open: HashMap<&str, usize> = HashMap::new();
    let mut activations = 0usize;

    for entry in &state.log {
        match entry.event {
            ExecutionEvent::Activated => {
                activations += 1;
                *open.entry(entry.scenario.as_str()).or_default() += 1;
            }
            ExecutionEvent::ActivationFailed => activations += 1,
            ExecutionEvent::Deactivated | ExecutionEvent::CleanupFailed => {
                let count = open.entry(entry.scenario.as_str()).or_default();
                if *count == 0 {
                    return AssertionResult::fail(
                        "Each activation finalizes once",
                        &format!("{} finalized without an open activation", entry.scenario),
                    );
                }
                *count -= 1;
            }
        }
    }

    let still_open = open.values().sum::<usize>();
    let finalized = state.results.iter().filter(|r| r.is_finalized()).count();
    let expected = activations - still_open;

    if finalized != expected {
        return AssertionResult::fail(
            "Each activation finalizes once",
            &format!(
                "{} activations ({} still open) but {} finalized results",
                activations, still_open, finalized
            ),
        );
    }
    if still_open != state.active.len() {
        return AssertionResult::fail(
            "Each activation finalizes once",
            &format!(
                "{} open activations in the log but {} active scenarios",
                still_open,
                state.active.len()
            ),
        );
    }

    AssertionResult::pass(&format!(
        "{} activations, {} finalized, {} active",
        activations, finalized, still_open
    ))
}

/// Assert that no scenario was activated again while still active.
pub fn assert_no_overlapping_activations(state: &HarnessState) -> AssertionResult {
    let mut active: HashMap<&str, bool> = HashMap::new();
    for entry in &state.log {
        let open = active.entry(entry.scenario.as_str()).or_default();
        match entry.event {
            ExecutionEvent::Activated if *open => {
                return AssertionResult::fail(
                    "Scenarios never overlap themselves",
                    &format!("{} activated while already active", entry.scenario),
                );
            }
            ExecutionEvent::Activated => *open = true,
            ExecutionEvent::Deactivated | ExecutionEvent::CleanupFailed => *open = false,
            ExecutionEvent::ActivationFailed => {}
        }
    }
    AssertionResult::pass("No scenario overlapped itself")
}

/// Assert that no scenario is active.
pub fn assert_no_active_scenarios(state: &HarnessState) -> AssertionResult {
    chaos_engine::verify::assert_no_active_scenarios(&state.active)
}

/// Assert the breaker is in `expected`.
pub fn assert_circuit_state(snapshot: &BreakerSnapshot, expected: CircuitState) -> AssertionResult {
    if snapshot.state == expected {
        AssertionResult::pass(&format!("Circuit is {:?}", expected))
    } else {
        AssertionResult::fail(
            &format!("Circuit should be {:?}", expected),
            &format!(
                "Circuit is {:?} (failures={}, successes={})",
                snapshot.state, snapshot.failure_count, snapshot.success_count
            ),
        )
    }
}

/// Assert the pool never holds more than its capacity and nothing is queued.
pub fn assert_pool_quiescent(stats: &PoolStats) -> AssertionResult {
    if stats.active > stats.max_connections {
        return AssertionResult::fail(
            "Pool within capacity",
            &format!("{} active > max {}", stats.active, stats.max_connections),
        );
    }
    if stats.waiting > 0 {
        return AssertionResult::fail(
            "Pool has no stranded waiters",
            &format!("{} requests still queued", stats.waiting),
        );
    }
    AssertionResult::pass(&format!(
        "Pool quiescent ({}/{} active)",
        stats.active, stats.max_connections
    ))
}

/// Assert retry delays never shrink and never exceed `max_delay`.
///
/// Only meaningful for jitter-free logs.
pub fn assert_delays_non_decreasing(attempts: &[RetryAttempt], max_delay: Duration) -> AssertionResult {
    let delays: Vec<Duration> = attempts
        .iter()
        .skip(1)
        .map(|a| a.delay_before_attempt)
        .collect();

    if let Some(over) = delays.iter().find(|d| **d > max_delay) {
        return AssertionResult::fail(
            "Retry delays capped",
            &format!("delay {:?} exceeds max {:?}", over, max_delay),
        );
    }
    for pair in delays.windows(2) {
        if pair[1] < pair[0] {
            return AssertionResult::fail(
                "Retry delays non-decreasing",
                &format!("delay shrank from {:?} to {:?}", pair[0], pair[1]),
            );
        }
    }
    AssertionResult::pass(&format!("{} retry delays non-decreasing", delays.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaos_types::{ChaosScenario, ChaosTestResult, ExecutionLogEntry, Severity};
    use std::time::SystemTime;

    fn entry(scenario: &str, event: ExecutionEvent) -> ExecutionLogEntry {
        ExecutionLogEntry {
            at: SystemTime::now(),
            scenario: scenario.into(),
            event,
            detail: None,
        }
    }

    fn finalized(name: &str) -> ChaosTestResult {
        let mut result = ChaosTestResult::open(&ChaosScenario::new(name, 1.0, Severity::Low));
        result.end_time = Some(SystemTime::now());
        result
    }

    fn attempt(n: u32, delay_ms: u64) -> RetryAttempt {
        RetryAttempt {
            attempt_number: n,
            delay_before_attempt: Duration::from_millis(delay_ms),
            timestamp: tokio::time::Instant::now(),
            success: false,
            error: None,
        }
    }

    fn clean_state() -> HarnessState {
        HarnessState {
            write_path_clean: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_environment_restored_pass() {
        assert!(assert_environment_restored(&clean_state()).passed);
    }

    #[test]
    fn test_environment_restored_lists_leftovers() {
        let state = HarnessState {
            failing_dependencies: vec!["database".into()],
            clock_offset_ms: 30_000,
            ..clean_state()
        };
        let result = assert_environment_restored(&state);
        assert!(!result.passed);
        let details = result.failure_details.unwrap();
        assert!(details.contains("database"));
        assert!(details.contains("30000 ms"));
    }

    #[test]
    fn test_one_result_per_activation_pass() {
        let state = HarnessState {
            log: vec![
                entry("a", ExecutionEvent::Activated),
                entry("b", ExecutionEvent::ActivationFailed),
                entry("a", ExecutionEvent::Deactivated),
                entry("a", ExecutionEvent::Activated),
            ],
            results: vec![finalized("b"), finalized("a")],
            active: vec!["a".into()],
            ..clean_state()
        };
        assert!(assert_one_result_per_activation(&state).passed);
    }

    #[test]
    fn test_one_result_per_activation_detects_double_finalize() {
        let state = HarnessState {
            log: vec![
                entry("a", ExecutionEvent::Activated),
                entry("a", ExecutionEvent::Deactivated),
                entry("a", ExecutionEvent::CleanupFailed),
            ],
            results: vec![finalized("a")],
            ..clean_state()
        };
        assert!(!assert_one_result_per_activation(&state).passed);
    }

    #[test]
    fn test_one_result_per_activation_detects_missing_result() {
        let state = HarnessState {
            log: vec![
                entry("a", ExecutionEvent::Activated),
                entry("a", ExecutionEvent::Deactivated),
            ],
            ..clean_state()
        };
        let result = assert_one_result_per_activation(&state);
        assert!(!result.passed);
        assert!(result.failure_details.unwrap().contains("0 finalized"));
    }

    #[test]
    fn test_no_overlapping_activations() {
        let mut state = HarnessState {
            log: vec![
                entry("a", ExecutionEvent::Activated),
                entry("b", ExecutionEvent::Activated),
                entry("a", ExecutionEvent::Deactivated),
                entry("a", ExecutionEvent::Activated),
            ],
            ..clean_state()
        };
        assert!(assert_no_overlapping_activations(&state).passed);

        state.log.push(entry("b", ExecutionEvent::Activated));
        let result = assert_no_overlapping_activations(&state);
        assert!(!result.passed);
        assert!(result.failure_details.unwrap().starts_with("b "));
    }

    #[test]
    fn test_delays_non_decreasing() {
        let good = [attempt(1, 0), attempt(2, 100), attempt(3, 200), attempt(4, 200)];
        assert!(assert_delays_non_decreasing(&good, Duration::from_millis(200)).passed);

        let shrinking = [attempt(1, 0), attempt(2, 200), attempt(3, 100)];
        assert!(!assert_delays_non_decreasing(&shrinking, Duration::from_secs(1)).passed);

        let uncapped = [attempt(1, 0), attempt(2, 500)];
        assert!(!assert_delays_non_decreasing(&uncapped, Duration::from_millis(400)).passed);
    }

    #[test]
    fn test_pool_quiescent() {
        let stats = PoolStats {
            active: 2,
            max_connections: 2,
            ..Default::default()
        };
        assert!(assert_pool_quiescent(&stats).passed);

        let stranded = PoolStats {
            waiting: 1,
            ..stats
        };
        assert!(!assert_pool_quiescent(&stranded).passed);
    }
}
