//! Connection pool and lease scenarios.
//!
//! Exhaust the pool, queue behind it, time out, and lose leases to expiry
//! while dependencies are failing underneath.

#[cfg(test)]
mod tests {
    use crate::assertions::assert_pool_quiescent;
    use crate::harness::{init_test_logging, ChaosHarness};
    use chaos_resilience::{ConnectionPool, LeaseConfig, LeaseManager, PoolConfig, PoolError};
    use chaos_types::{ChaosScenario, InjectedFault, Severity};
    use std::time::Duration;
    use tokio::time::Instant;

    fn pool(max: usize, timeout_ms: u64) -> ConnectionPool {
        ConnectionPool::new(PoolConfig {
            max_connections: max,
            acquire_timeout: Duration::from_millis(timeout_ms),
        })
    }

    async fn wait_for_waiters(pool: &ConnectionPool, n: usize) {
        while pool.stats().waiting < n {
            tokio::task::yield_now().await;
        }
    }

    /// Two of three concurrent acquires succeed at once; the third times out.
    #[tokio::test(start_paused = true)]
    async fn third_acquire_times_out() {
        init_test_logging();
        let pool = pool(2, 1000);
        let started = Instant::now();

        let timed = |pool: ConnectionPool| async move {
            let result = pool.acquire().await;
            (result, started.elapsed())
        };
        let (a, b, c) = tokio::join!(
            timed(pool.clone()),
            timed(pool.clone()),
            timed(pool.clone())
        );

        let mut granted = 0;
        let mut timed_out = Vec::new();
        for (result, elapsed) in [a, b, c] {
            match result {
                Ok(_) => {
                    assert_eq!(elapsed, Duration::ZERO);
                    granted += 1;
                }
                Err(PoolError::Timeout {
                    waited,
                    max_connections,
                }) => {
                    assert_eq!(waited, Duration::from_millis(1000));
                    assert_eq!(max_connections, 2);
                    timed_out.push(elapsed);
                }
                Err(other) => panic!("unexpected pool error: {other}"),
            }
        }
        assert_eq!(granted, 2);
        assert_eq!(timed_out.len(), 1);
        assert!(timed_out[0] >= Duration::from_millis(1000));
        assert!(timed_out[0] < Duration::from_millis(1100));

        let stats = pool.stats();
        assert_eq!(stats.active, 2);
        assert_eq!(stats.total_timeouts, 1);
        assert!(assert_pool_quiescent(&stats).passed);
    }

    /// Waiters are served oldest first.
    #[tokio::test(start_paused = true)]
    async fn waiters_served_in_arrival_order() {
        let pool = pool(1, 10_000);
        let held = pool.acquire().await.unwrap();

        let first = tokio::spawn({
            let pool = pool.clone();
            async move { pool.acquire().await }
        });
        wait_for_waiters(&pool, 1).await;
        let second = tokio::spawn({
            let pool = pool.clone();
            async move { pool.acquire().await }
        });
        wait_for_waiters(&pool, 2).await;

        pool.release(&held);
        let first_lease = first.await.unwrap().unwrap();
        assert_eq!(pool.stats().waiting, 1);
        assert!(!second.is_finished());

        pool.release(&first_lease);
        let second_lease = second.await.unwrap().unwrap();
        assert_ne!(first_lease, second_lease);

        pool.release(&second_lease);
        let stats = pool.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.total_acquired, 3);
        assert!(assert_pool_quiescent(&stats).passed);
    }

    /// A waiter whose slot frees up before its deadline is never reported
    /// as timed out.
    #[tokio::test(start_paused = true)]
    async fn release_before_deadline_wakes_waiter() {
        let pool = pool(1, 1000);
        let held = pool.acquire().await.unwrap();

        let waiter = tokio::spawn({
            let pool = pool.clone();
            async move { pool.acquire().await }
        });
        wait_for_waiters(&pool, 1).await;

        tokio::time::advance(Duration::from_millis(999)).await;
        pool.release(&held);
        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(pool.stats().total_timeouts, 0);
    }

    fn leases(max: usize, lease_ms: u64) -> LeaseManager {
        LeaseManager::new(LeaseConfig {
            max_connections: max,
            acquire_timeout: Duration::from_millis(5000),
            lease_duration: Duration::from_millis(lease_ms),
            sweep_interval: Duration::from_millis(100),
        })
    }

    /// Using an expired lease fails and frees the slot for the next caller.
    #[tokio::test(start_paused = true)]
    async fn expired_lease_is_refused_and_reclaimed() {
        let harness = ChaosHarness::new();
        let manager = leases(1, 500);
        let lease = manager.lease().await.unwrap();

        let ok = manager
            .perform(&lease, |_| harness.send("http://api/health"))
            .await
            .unwrap();
        assert!(ok.is_ok());
        assert_eq!(manager.lease_info(&lease).unwrap().operations_performed, 1);

        tokio::time::advance(Duration::from_millis(500)).await;
        let expired = manager
            .perform(&lease, |_| harness.send("http://api/health"))
            .await;
        assert_eq!(expired.unwrap_err(), PoolError::LeaseExpired(lease));

        let stats = manager.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.total_expired, 1);

        let next = manager.lease().await.unwrap();
        assert_ne!(next, lease);
        manager.release(&next);
    }

    /// The sweeper reclaims a lease whose holder stalled behind an outage and
    /// hands the slot to a queued caller.
    #[tokio::test(start_paused = true)]
    async fn sweeper_reclaims_stalled_lease() {
        let harness = ChaosHarness::new();
        harness
            .inject(
                ChaosScenario::new("db-down", 1.0, Severity::High)
                    .with_injector("service-outage")
                    .affecting("database"),
            )
            .await
            .unwrap();

        let manager = leases(1, 300);
        let sweeper = manager.spawn_sweeper();
        let stalled = manager.lease().await.unwrap();
        let failed = manager
            .perform(&stalled, |_| harness.send("http://database/rows"))
            .await
            .unwrap();
        assert!(matches!(
            failed,
            Err(InjectedFault::ServiceUnavailable { .. })
        ));

        // The holder never releases; a second caller queues behind it.
        let queued = tokio::spawn({
            let manager = manager.clone();
            async move { manager.lease().await }
        });

        tokio::time::sleep(Duration::from_millis(400)).await;
        let granted = queued.await.unwrap().unwrap();
        assert!(manager.lease_info(&stalled).is_none());
        assert!(manager.lease_info(&granted).is_some());
        assert_eq!(manager.stats().total_expired, 1);

        sweeper.abort();
        harness.teardown().await;
    }

    /// Releasing twice or releasing an unknown lease leaves the pool intact.
    #[tokio::test(start_paused = true)]
    async fn double_release_is_harmless() {
        let manager = leases(2, 10_000);
        let lease = manager.lease().await.unwrap();
        manager.release(&lease);
        manager.release(&lease);

        let stats = manager.stats();
        assert_eq!(stats.active, 0);
        assert!(assert_pool_quiescent(&stats).passed);
        assert_eq!(
            manager.perform(&lease, |_| async {}).await.unwrap_err(),
            PoolError::UnknownLease(lease)
        );
    }
}
