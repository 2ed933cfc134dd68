//! Time-bounded connection leases.
//!
//! A [`LeaseManager`] is a [`ConnectionPool`] whose grants carry an absolute
//! expiry. Operations against an expired lease are refused, and a background
//! sweeper reclaims leases whose holders never came back.

use crate::error::PoolError;
use crate::pool::{ConnectionPool, PoolConfig, PoolStats};
use chaos_core::Lease;
use chaos_types::LeaseId;
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Lease manager tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseConfig {
    /// Maximum concurrently held leases.
    pub max_connections: usize,
    /// How long `lease` waits for a slot.
    pub acquire_timeout: Duration,
    /// Lifetime of each lease.
    pub lease_duration: Duration,
    /// Period of the expiry sweeper.
    pub sweep_interval: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            lease_duration: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Connection pool with expiring leases.
#[derive(Debug, Clone)]
pub struct LeaseManager {
    pool: ConnectionPool,
    sweep_interval: Duration,
}

impl LeaseManager {
    /// Create a lease manager.
    pub fn new(config: LeaseConfig) -> Self {
        let pool = ConnectionPool::with_lease_ttl(
            PoolConfig {
                max_connections: config.max_connections,
                acquire_timeout: config.acquire_timeout,
            },
            Some(config.lease_duration),
        );
        Self {
            pool,
            sweep_interval: config.sweep_interval,
        }
    }

    /// Acquire a lease, waiting up to `acquire_timeout` for a slot.
    pub async fn lease(&self) -> Result<LeaseId, PoolError> {
        self.pool.acquire().await
    }

    /// Run `op` under `lease_id`.
    ///
    /// Fails with [`PoolError::LeaseExpired`] if the lease has expired (the
    /// slot is reclaimed on the spot) or [`PoolError::UnknownLease`] if it is
    /// not held.
    pub async fn perform<T, F, Fut>(&self, lease_id: &LeaseId, op: F) -> Result<T, PoolError>
    where
        F: FnOnce(Lease) -> Fut,
        Fut: Future<Output = T>,
    {
        let lease = self.pool.touch(lease_id)?;
        Ok(op(lease).await)
    }

    /// Return a lease. Unknown or already-released ids are a no-op.
    pub fn release(&self, lease_id: &LeaseId) {
        self.pool.release(lease_id);
    }

    /// Current record for a held lease.
    pub fn lease_info(&self, lease_id: &LeaseId) -> Option<Lease> {
        self.pool.lease(lease_id)
    }

    /// Reclaim expired leases now. Returns how many were reclaimed.
    pub fn sweep(&self) -> usize {
        let purged = self.pool.purge_expired();
        for lease in &purged {
            tracing::info!(
                lease = ?lease.lease_id,
                conn = %lease.connection_id,
                ops = lease.operations_performed,
                "Reclaimed expired lease"
            );
        }
        purged.len()
    }

    /// Current statistics.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Spawn the periodic expiry sweeper.
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            tracing::info!(interval = ?manager.sweep_interval, "Lease sweeper started");

            let mut timer = interval(manager.sweep_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;
                let reclaimed = manager.sweep();
                if reclaimed == 0 {
                    tracing::trace!("Sweep: no expired leases");
                }
            }
        })
    }
}
