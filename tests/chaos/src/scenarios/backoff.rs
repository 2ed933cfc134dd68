//! Retry scenarios.
//!
//! Exponential backoff against scripted failures and against injected
//! outages that end partway through the retry schedule.

#[cfg(test)]
mod tests {
    use crate::assertions::assert_delays_non_decreasing;
    use crate::harness::{init_test_logging, ChaosHarness};
    use chaos_resilience::{BackoffConfig, BackoffExecutor, RetryError};
    use chaos_types::{ChaosScenario, InjectedFault, Severity};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn executor(initial_ms: u64, multiplier: f64, max_delay_ms: u64, attempts: u32) -> BackoffExecutor {
        BackoffExecutor::new(BackoffConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            multiplier,
            max_attempts: attempts,
            jitter: false,
        })
        .unwrap()
    }

    fn delays(attempts: &[chaos_resilience::RetryAttempt]) -> Vec<u64> {
        attempts
            .iter()
            .skip(1)
            .map(|a| a.delay_before_attempt.as_millis() as u64)
            .collect()
    }

    /// Two failures then a success: three attempts, 100 ms then 200 ms apart.
    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        init_test_logging();
        let retry = executor(100, 2.0, 10_000, 4);
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let outcome = retry
            .execute("flaky", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("attempt {n} failed"))
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.value, 3);
        assert_eq!(outcome.attempts.len(), 3);
        assert_eq!(delays(&outcome.attempts), vec![100, 200]);
        assert!(outcome.attempts[..2].iter().all(|a| !a.success));
        assert!(outcome.attempts[2].success);
        assert_eq!(
            outcome.attempts[2].timestamp - started,
            Duration::from_millis(300)
        );
    }

    /// Every attempt fails: the error carries the full log and the last error.
    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_every_attempt() {
        let retry = executor(100, 2.0, 10_000, 4);

        let err = retry
            .execute("always-down", || async { Err::<(), _>("down") })
            .await
            .unwrap_err();

        match &err {
            RetryError::MaxRetriesExceeded {
                attempts,
                last_error,
                log,
                ..
            } => {
                assert_eq!(*attempts, 4);
                assert_eq!(*last_error, "down");
                assert_eq!(delays(log), vec![100, 200, 400]);
                assert!(assert_delays_non_decreasing(log, Duration::from_secs(10)).passed);
            }
            other => panic!("expected exhaustion, got {other}"),
        }
        assert_eq!(err.attempts().len(), 4);
    }

    /// Delays stop growing at `max_delay`.
    #[tokio::test(start_paused = true)]
    async fn delays_are_capped() {
        let retry = executor(100, 10.0, 500, 4);

        let err = retry
            .execute("capped", || async { Err::<(), _>("nope") })
            .await
            .unwrap_err();

        assert_eq!(delays(err.attempts()), vec![100, 500, 500]);
        assert!(assert_delays_non_decreasing(err.attempts(), Duration::from_millis(500)).passed);
    }

    /// An outage shorter than the retry schedule is ridden out.
    #[tokio::test(start_paused = true)]
    async fn rides_out_timed_outage() {
        let harness = ChaosHarness::new();
        harness
            .inject(
                ChaosScenario::new("blip", 1.0, Severity::Medium)
                    .with_injector("service-outage")
                    .affecting("database")
                    .with_duration(Duration::from_millis(250)),
            )
            .await
            .unwrap();
        let retry = executor(100, 2.0, 10_000, 4);

        let outcome = retry
            .execute("query", || harness.send("http://database/rows"))
            .await
            .unwrap();

        // Attempts at 0 ms and 100 ms hit the outage; 300 ms is past it.
        assert_eq!(outcome.attempts.len(), 3);
        assert!(outcome.attempts[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("database")));
        harness.teardown().await;
    }

    /// Fatal outages stop the retry loop on the first attempt.
    #[tokio::test(start_paused = true)]
    async fn fatal_outage_is_not_retried() {
        let harness = ChaosHarness::new();
        harness
            .inject(
                ChaosScenario::new("meltdown", 1.0, Severity::Critical)
                    .with_injector("service-outage")
                    .affecting("payments"),
            )
            .await
            .unwrap();
        let retry = executor(100, 2.0, 10_000, 4);
        let started = Instant::now();

        let err = retry
            .execute_if(
                "charge",
                || harness.send("http://payments/charge"),
                |e: &InjectedFault| !e.is_fatal(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::NonRetryable { attempt: 1, .. }));
        assert!(err.last_error().is_some_and(InjectedFault::is_fatal));
        assert_eq!(started.elapsed(), Duration::ZERO);
        harness.teardown().await;
    }
}
