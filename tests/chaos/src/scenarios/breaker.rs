//! Circuit breaker scenarios.
//!
//! The breaker guards calls into the simulated environment while a service
//! outage is injected, trips, rejects without calling through, and recovers
//! once the outage is cleaned up.

#[cfg(test)]
mod tests {
    use crate::assertions::assert_circuit_state;
    use crate::harness::ChaosHarness;
    use chaos_core::{BreakerConfig, CircuitState};
    use chaos_resilience::{BreakerError, CircuitBreaker};
    use chaos_types::{ChaosScenario, InjectedFault, Severity};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn breaker(threshold: u32, reset_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "database",
            BreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_millis(reset_ms),
                required_successes: 2,
                half_open_timeout: Duration::from_secs(5),
            },
        )
    }

    fn db_outage() -> ChaosScenario {
        ChaosScenario::new("db-outage", 1.0, Severity::High)
            .with_injector("service-outage")
            .affecting("database")
    }

    /// Three failures open the circuit; the fourth call is rejected unrun.
    #[tokio::test(start_paused = true)]
    async fn three_failures_reject_fourth_call() {
        let harness = ChaosHarness::new();
        harness.inject(db_outage()).await.unwrap();
        let breaker = breaker(3, 30_000);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let result = breaker
                .execute(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    harness.send("http://database/users").await
                })
                .await;
            assert!(matches!(
                result,
                Err(BreakerError::Inner(InjectedFault::ServiceUnavailable { .. }))
            ));
        }
        assert!(assert_circuit_state(&breaker.state(), CircuitState::Open).passed);

        let fourth = breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                harness.send("http://database/users").await
            })
            .await;
        assert!(matches!(fourth, Err(BreakerError::Open { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    /// After the reset timeout the first call is a half-open trial; two
    /// successes close the circuit and clear the failure count.
    #[tokio::test(start_paused = true)]
    async fn recovers_after_reset_timeout() {
        let harness = ChaosHarness::new();
        harness.inject(db_outage()).await.unwrap();
        let breaker = breaker(3, 2000);

        for _ in 0..3 {
            let _ = breaker
                .execute(|| harness.send("http://database/users"))
                .await;
        }
        assert_eq!(breaker.circuit_state(), CircuitState::Open);

        harness.expire("db-outage").await;
        tokio::time::advance(Duration::from_millis(2001)).await;

        let seen = Mutex::new(None);
        breaker
            .execute(|| async {
                *seen.lock().unwrap() = Some(breaker.circuit_state());
                harness.send("http://database/users").await
            })
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(CircuitState::HalfOpen));

        breaker
            .execute(|| harness.send("http://database/users"))
            .await
            .unwrap();
        let snapshot = breaker.state();
        assert!(assert_circuit_state(&snapshot, CircuitState::Closed).passed);
        assert_eq!(snapshot.failure_count, 0);
    }

    /// A failed half-open trial reopens the circuit immediately.
    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens() {
        let harness = ChaosHarness::new();
        harness.inject(db_outage()).await.unwrap();
        let breaker = breaker(2, 1000);

        for _ in 0..2 {
            let _ = breaker.execute(|| harness.send("http://database/q")).await;
        }
        tokio::time::advance(Duration::from_millis(1001)).await;

        // Outage still active: the trial fails.
        let trial = breaker.execute(|| harness.send("http://database/q")).await;
        assert!(matches!(trial, Err(BreakerError::Inner(_))));
        assert_eq!(breaker.circuit_state(), CircuitState::Open);

        let rejected = breaker.execute(|| harness.send("http://database/q")).await;
        assert!(rejected.unwrap_err().is_open());
    }

    /// A trial stuck behind injected latency counts as a failure.
    #[tokio::test(start_paused = true)]
    async fn slow_trial_times_out() {
        let harness = ChaosHarness::new();
        let breaker = CircuitBreaker::new(
            "search",
            BreakerConfig {
                failure_threshold: 1,
                reset_timeout: Duration::from_millis(100),
                required_successes: 1,
                half_open_timeout: Duration::from_millis(500),
            },
        );

        harness
            .inject(
                ChaosScenario::new("outage", 1.0, Severity::Low)
                    .with_injector("service-outage")
                    .affecting("search")
                    .with_cooldown(Duration::from_secs(60)),
            )
            .await
            .unwrap();
        let _ = breaker.execute(|| harness.send("http://search/q")).await;
        harness.expire("outage").await;

        // Critical degradation: 5 s base latency, far over the trial window.
        harness
            .inject(
                ChaosScenario::new("slow", 1.0, Severity::Critical)
                    .with_injector("network-degradation")
                    .affecting("search"),
            )
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(101)).await;

        let trial = breaker.execute(|| harness.send("http://search/q")).await;
        assert!(matches!(trial, Err(BreakerError::TrialTimeout { .. })));
        assert_eq!(breaker.circuit_state(), CircuitState::Open);
    }
}
