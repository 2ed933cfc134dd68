//! Connection pool ledger.
//!
//! This module provides the bookkeeping behind the async connection pool:
//! - Bounded active set (`active <= max_connections` at all times)
//! - FIFO waiting queue carrying an opaque per-waiter payload
//! - Optional absolute lease expiry and expiry sweeps
//!
//! The ledger never waits. The async pool parks each waiter on a channel,
//! stores the sending half as the payload, and delivers grants popped from
//! here.

use chaos_types::{ConnectionId, LeaseId};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// A granted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Opaque handle given to the caller.
    pub lease_id: LeaseId,
    /// Freshly minted connection.
    pub connection_id: ConnectionId,
    /// When the lease was granted.
    pub granted_at: Instant,
    /// Absolute expiry, when leases are time-bounded.
    pub lease_expiry: Option<Instant>,
    /// Operations performed through this lease.
    pub operations_performed: u64,
}

impl Lease {
    /// Returns true if the lease has reached its expiry.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.lease_expiry.is_some_and(|expiry| now >= expiry)
    }
}

/// Position of a queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaiterId(u64);

/// Why an operation against a lease was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseCheck {
    /// The lease is not (or no longer) held.
    Unknown,
    /// The lease has expired and was purged.
    Expired,
}

/// Pool bookkeeping, generic over the waiter payload.
#[derive(Debug)]
pub struct PoolLedger<W> {
    max_connections: usize,
    lease_ttl: Option<Duration>,
    active: HashMap<LeaseId, Lease>,
    waiting: VecDeque<(WaiterId, W)>,
    next_connection: u64,
    next_waiter: u64,
}

impl<W> PoolLedger<W> {
    /// Create a ledger. `lease_ttl` stamps every grant with an expiry.
    pub fn new(max_connections: usize, lease_ttl: Option<Duration>) -> Self {
        Self {
            max_connections,
            lease_ttl,
            active: HashMap::new(),
            waiting: VecDeque::new(),
            next_connection: 0,
            next_waiter: 0,
        }
    }

    /// Configured capacity.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Leases currently held.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Requests currently queued.
    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    /// Grant immediately if a slot is free and nobody is queued ahead.
    pub fn try_grant(&mut self, now: Instant) -> Option<Lease> {
        if self.has_capacity() && self.waiting.is_empty() {
            Some(self.mint(now))
        } else {
            None
        }
    }

    /// Queue a request at the back.
    pub fn enqueue(&mut self, payload: W) -> WaiterId {
        let id = WaiterId(self.next_waiter);
        self.next_waiter += 1;
        self.waiting.push_back((id, payload));
        id
    }

    /// Remove a queued request (timeout). Returns its payload if it was still queued.
    pub fn cancel(&mut self, id: WaiterId) -> Option<W> {
        let pos = self.waiting.iter().position(|(w, _)| *w == id)?;
        self.waiting.remove(pos).map(|(_, payload)| payload)
    }

    /// Pop the oldest waiter and mint its grant, if a slot is free.
    pub fn grant_next(&mut self, now: Instant) -> Option<(WaiterId, W, Lease)> {
        if !self.has_capacity() {
            return None;
        }
        let (id, payload) = self.waiting.pop_front()?;
        let lease = self.mint(now);
        Some((id, payload, lease))
    }

    /// Release a lease. Unknown or already-released ids are a no-op.
    pub fn release(&mut self, lease_id: &LeaseId) -> Option<Lease> {
        self.active.remove(lease_id)
    }

    /// Look up a lease for an operation, counting the operation.
    ///
    /// An expired lease is purged and reported as [`LeaseCheck::Expired`].
    pub fn touch(&mut self, lease_id: &LeaseId, now: Instant) -> Result<Lease, LeaseCheck> {
        let lease = self.active.get_mut(lease_id).ok_or(LeaseCheck::Unknown)?;
        if lease.is_expired(now) {
            self.active.remove(lease_id);
            return Err(LeaseCheck::Expired);
        }
        lease.operations_performed += 1;
        Ok(lease.clone())
    }

    /// Look up a lease without counting an operation.
    pub fn get(&self, lease_id: &LeaseId) -> Option<&Lease> {
        self.active.get(lease_id)
    }

    /// Remove and return every expired lease.
    pub fn purge_expired(&mut self, now: Instant) -> Vec<Lease> {
        let expired: Vec<LeaseId> = self
            .active
            .values()
            .filter(|l| l.is_expired(now))
            .map(|l| l.lease_id)
            .collect();
        expired
            .iter()
            .filter_map(|id| self.active.remove(id))
            .collect()
    }

    /// Earliest expiry among active leases.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.active.values().filter_map(|l| l.lease_expiry).min()
    }

    fn has_capacity(&self) -> bool {
        self.active.len() < self.max_connections
    }

    fn mint(&mut self, now: Instant) -> Lease {
        self.next_connection += 1;
        let lease = Lease {
            lease_id: LeaseId::new(),
            connection_id: ConnectionId::new(self.next_connection),
            granted_at: now,
            lease_expiry: self.lease_ttl.map(|ttl| now + ttl),
            operations_performed: 0,
        };
        self.active.insert(lease.lease_id, lease.clone());
        lease
    }
}
