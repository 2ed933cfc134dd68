//! Bounded connection pool with FIFO waiters.
//!
//! Requests beyond `max_connections` park on a oneshot channel whose sender
//! is queued in the [`PoolLedger`]. A release hands its slot to the oldest
//! live waiter while still holding the ledger lock, so a grant is either
//! delivered or still queued when the waiter times out; it can never be lost
//! in between.

use crate::error::PoolError;
use chaos_core::{Lease, PoolLedger, WaiterId};
use chaos_types::LeaseId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// Pool sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum concurrently held connections.
    pub max_connections: usize,
    /// How long `acquire` waits for a slot.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently held.
    pub active: usize,
    /// Requests currently queued.
    pub waiting: usize,
    /// Configured capacity.
    pub max_connections: usize,
    /// Grants handed out since creation.
    pub total_acquired: u64,
    /// Requests that gave up waiting.
    pub total_timeouts: u64,
    /// Leases reclaimed by expiry.
    pub total_expired: u64,
}

type Ledger = PoolLedger<oneshot::Sender<Lease>>;

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicU64,
    timeouts: AtomicU64,
    expired: AtomicU64,
}

#[derive(Debug)]
struct PoolInner {
    config: PoolConfig,
    ledger: Mutex<Ledger>,
    counters: Counters,
}

/// Shared handle to a connection pool.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create a pool whose grants never expire.
    pub fn new(config: PoolConfig) -> Self {
        Self::with_lease_ttl(config, None)
    }

    pub(crate) fn with_lease_ttl(config: PoolConfig, lease_ttl: Option<Duration>) -> Self {
        let ledger = PoolLedger::new(config.max_connections, lease_ttl);
        Self {
            inner: Arc::new(PoolInner {
                config,
                ledger: Mutex::new(ledger),
                counters: Counters::default(),
            }),
        }
    }

    /// Pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Acquire a connection, waiting up to `acquire_timeout` for a slot.
    pub async fn acquire(&self) -> Result<LeaseId, PoolError> {
        self.acquire_lease().await.map(|lease| lease.lease_id)
    }

    /// Acquire a connection and return the full lease record.
    pub async fn acquire_lease(&self) -> Result<Lease, PoolError> {
        let (tx, rx) = oneshot::channel();
        let waiter = {
            let mut ledger = self.lock();
            if let Some(lease) = ledger.try_grant(crate::now()) {
                self.inner.counters.acquired.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(lease = ?lease.lease_id, conn = %lease.connection_id, "Granted immediately");
                return Ok(lease);
            }
            ledger.enqueue(tx)
        };

        let mut guard = WaiterGuard {
            pool: self,
            waiter,
            rx,
            armed: true,
        };
        tracing::debug!(?waiter, "Pool exhausted, waiting for a release");

        let timeout = self.inner.config.acquire_timeout;
        match tokio::time::timeout(timeout, &mut guard.rx).await {
            Ok(Ok(lease)) => {
                guard.armed = false;
                Ok(lease)
            }
            // The sender only drops unsent if our waiter was cancelled,
            // which only the guard does. Report it as a timeout.
            Ok(Err(_)) | Err(_) => {
                if let Some(lease) = guard.withdraw() {
                    return Ok(lease);
                }
                self.inner.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    ?timeout,
                    max = self.inner.config.max_connections,
                    "Connection acquire timed out"
                );
                Err(PoolError::Timeout {
                    waited: timeout,
                    max_connections: self.inner.config.max_connections,
                })
            }
        }
    }

    /// Return a connection. Unknown or already-released ids are a no-op.
    pub fn release(&self, lease_id: &LeaseId) {
        let mut ledger = self.lock();
        if ledger.release(lease_id).is_none() {
            tracing::debug!(lease = ?lease_id, "Release of unknown lease ignored");
            return;
        }
        self.dispatch(&mut ledger);
    }

    /// Current statistics.
    pub fn stats(&self) -> PoolStats {
        let ledger = self.lock();
        PoolStats {
            active: ledger.active_count(),
            waiting: ledger.waiting_count(),
            max_connections: ledger.max_connections(),
            total_acquired: self.inner.counters.acquired.load(Ordering::Relaxed),
            total_timeouts: self.inner.counters.timeouts.load(Ordering::Relaxed),
            total_expired: self.inner.counters.expired.load(Ordering::Relaxed),
        }
    }

    /// Look up a held lease.
    pub fn lease(&self, lease_id: &LeaseId) -> Option<Lease> {
        self.lock().get(lease_id).cloned()
    }

    /// Validate a lease for an operation, counting the operation.
    pub(crate) fn touch(&self, lease_id: &LeaseId) -> Result<Lease, PoolError> {
        let mut ledger = self.lock();
        match ledger.touch(lease_id, crate::now()) {
            Ok(lease) => Ok(lease),
            Err(chaos_core::LeaseCheck::Unknown) => Err(PoolError::UnknownLease(*lease_id)),
            Err(chaos_core::LeaseCheck::Expired) => {
                self.inner.counters.expired.fetch_add(1, Ordering::Relaxed);
                tracing::info!(lease = ?lease_id, "Lease expired on use");
                self.dispatch(&mut ledger);
                Err(PoolError::LeaseExpired(*lease_id))
            }
        }
    }

    /// Reclaim every expired lease and hand the slots to waiters.
    pub(crate) fn purge_expired(&self) -> Vec<Lease> {
        let mut ledger = self.lock();
        let purged = ledger.purge_expired(crate::now());
        if !purged.is_empty() {
            self.inner
                .counters
                .expired
                .fetch_add(purged.len() as u64, Ordering::Relaxed);
            self.dispatch(&mut ledger);
        }
        purged
    }

    /// Hand free slots to queued waiters, skipping any that stopped listening.
    fn dispatch(&self, ledger: &mut Ledger) {
        let now = crate::now();
        while let Some((waiter, tx, lease)) = ledger.grant_next(now) {
            let lease_id = lease.lease_id;
            match tx.send(lease) {
                Ok(()) => {
                    self.inner.counters.acquired.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(?waiter, lease = ?lease_id, "Handed slot to waiter");
                }
                Err(_) => {
                    ledger.release(&lease_id);
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.inner.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a queued waiter if the acquiring future is dropped mid-wait.
///
/// A grant can land between the last poll and the drop. The guard owns the
/// receiving end so such a lease is handed back instead of leaking its slot.
struct WaiterGuard<'a> {
    pool: &'a ConnectionPool,
    waiter: WaiterId,
    rx: oneshot::Receiver<Lease>,
    armed: bool,
}

impl WaiterGuard<'_> {
    /// Leave the queue, returning a lease that was granted before we left.
    fn withdraw(&mut self) -> Option<Lease> {
        self.armed = false;
        // Grants are sent under the ledger lock, so once the waiter is out
        // of the queue any lease meant for it is already in the channel.
        let still_queued = self.pool.lock().cancel(self.waiter).is_some();
        if still_queued {
            return None;
        }
        self.rx.try_recv().ok()
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(lease) = self.withdraw() {
            tracing::debug!(lease = ?lease.lease_id, "Waiter dropped after its grant, returning slot");
            self.pool.release(&lease.lease_id);
        }
    }
}
