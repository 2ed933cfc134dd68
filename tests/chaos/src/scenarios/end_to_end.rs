//! Full runs assembled from run files.
//!
//! A [`ChaosRun`](chaos_engine::ChaosRun) wires the scheduler, the simulated
//! clients and the resilience primitives together, runs for a fixed time on
//! the paused clock, and verifies the outcome.

#[cfg(test)]
mod tests {
    use crate::harness::init_test_logging;
    use chaos_engine::{ChaosRun, RunConfig, RunReport};
    use std::time::Duration;

    const MIXED_RUN: &str = r#"
[engine]
tick_interval_ms = 1000
seed = 11

[[scenarios]]
name = "db-outage"
injector = "service-outage"
probability = 0.3
severity = "high"
duration_ms = 3000
cooldown_ms = 2000
affected_services = ["database"]

[[scenarios]]
name = "slow-cache"
injector = "network-degradation"
probability = 0.2
severity = "low"
duration_ms = 2000
affected_services = ["cache"]

[[scenarios]]
name = "skew"
injector = "clock-skew"
probability = 0.5
severity = "medium"
duration_ms = 1500

[[scenarios]]
name = "cascade"
injector = "cascading-failure"
probability = 0.1
severity = "medium"
duration_ms = 6000
cooldown_ms = 10000

[breaker]
failure_threshold = 5
reset_timeout_ms = 2000

[pool]
max_connections = 3
acquire_timeout_ms = 1000

[backoff]
initial_delay_ms = 50
max_delay_ms = 400
max_attempts = 3
jitter = false

[workload]
clients = 4
request_interval_ms = 100

[verification]
min_success_rate = 0.0
max_recovery_time_ms = 6000
"#;

    async fn run_file(toml: &str, secs: u64) -> (ChaosRun, RunReport) {
        init_test_logging();
        let config: RunConfig = toml::from_str(toml).unwrap();
        let run = ChaosRun::from_config(config).unwrap();
        let report = run.run(Duration::from_secs(secs)).await.unwrap();
        (run, report)
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_run_verifies_and_cleans_up() {
        let (run, report) = run_file(MIXED_RUN, 30).await;

        assert!(report.passed, "{:?}", report.assertions);
        assert!(!report.results.is_empty());
        assert!(report.workload.attempted > 0);
        assert_eq!(
            report.workload.attempted,
            report.workload.succeeded + report.workload.failed
        );
        assert_eq!(report.metrics.active_scenarios, 0);
        assert_eq!(report.metrics.executed_scenarios, report.results.len());

        let scenarios = run.config().scenarios.clone();
        for result in &report.results {
            assert!(result.is_finalized());
            let scenario = scenarios
                .iter()
                .find(|s| s.name == result.scenario)
                .unwrap();
            let limit = scenario.duration.unwrap().as_millis() as u64;
            assert!(
                result.metrics.recovery_time_ms <= limit,
                "{} window {} ms over {} ms",
                result.scenario,
                result.metrics.recovery_time_ms,
                limit
            );
        }

        let env = run.environment();
        assert!(env.dependencies().failing().is_empty());
        assert_eq!(env.network().route_count(), 0);
        assert_eq!(env.clock().offset_ms(), 0);
        assert_eq!(run.workload().leases().stats().active, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn same_seed_same_fault_timeline() {
        let (_, first) = run_file(MIXED_RUN, 20).await;
        let (_, second) = run_file(MIXED_RUN, 20).await;

        let timeline = |report: &RunReport| {
            report
                .results
                .iter()
                .map(|r| (r.scenario.clone(), r.metrics.recovery_time_ms))
                .collect::<Vec<_>>()
        };
        assert_eq!(timeline(&first), timeline(&second));
    }

    #[tokio::test(start_paused = true)]
    async fn total_outage_fails_verification() {
        let toml = r#"
[engine]
tick_interval_ms = 1000
seed = 3

[[scenarios]]
name = "everything-down"
injector = "service-outage"
probability = 1.0
severity = "high"
affected_services = ["api", "database", "cache"]

[backoff]
max_attempts = 2
jitter = false

[workload]
clients = 2

[verification]
min_success_rate = 0.9
"#;
        let (run, report) = run_file(toml, 10).await;

        assert!(!report.passed);
        let failed: Vec<_> = report.assertions.iter().filter(|a| !a.passed).collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].description.contains("Success rate"));
        assert_eq!(report.workload.succeeded, 0);
        assert!(report.workload.circuit_rejections > 0);

        // The scenario had no duration; stop still cleaned it up.
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].metrics.recovery_time_ms, 10_000);
        assert!(run.environment().dependencies().failing().is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["passed"], false);
        assert_eq!(json["seed"], 3);
    }
}
