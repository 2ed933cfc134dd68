//! Named dependencies that can be put into an outage.

use chaos_types::InjectedFault;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Handle to one outage. Several outages can hold the same service down;
/// it recovers once every holder has been restored or has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutageId(u64);

impl fmt::Display for OutageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "outage-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Outage {
    id: OutageId,
    fatal: bool,
    until: Option<Instant>,
}

impl Outage {
    fn is_over(&self, now: Instant) -> bool {
        self.until.is_some_and(|until| now >= until)
    }
}

#[derive(Debug, Default)]
struct Outages {
    by_service: BTreeMap<String, Vec<Outage>>,
    next_id: u64,
}

impl Outages {
    /// Drop elapsed holders and services left with none.
    fn prune(&mut self, now: Instant) {
        self.by_service.retain(|service, holders| {
            holders.retain(|o| !o.is_over(now));
            if holders.is_empty() {
                tracing::debug!(service = %service, "Outage elapsed");
            }
            !holders.is_empty()
        });
    }
}

/// Registry of failing services. Services not listed are healthy.
#[derive(Debug, Default)]
pub struct DependencyRegistry {
    outages: Mutex<Outages>,
}

impl DependencyRegistry {
    /// Create a registry where every service is healthy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `service` into an outage, optionally ending on its own after `lasts`.
    ///
    /// Outages stack: the service stays down until every returned id has
    /// been passed to [`restore`](Self::restore) or has run out.
    pub fn fail(&self, service: &str, fatal: bool, lasts: Option<Duration>) -> OutageId {
        let until = lasts.map(|d| Instant::now() + d);
        let mut outages = self.lock();
        let id = OutageId(outages.next_id);
        outages.next_id += 1;
        tracing::info!(service, %id, fatal, ?lasts, "Dependency failing");
        outages
            .by_service
            .entry(service.to_string())
            .or_default()
            .push(Outage { id, fatal, until });
        id
    }

    /// End the outage `id` on `service`. Returns false if it was not held.
    ///
    /// Other outages on the same service are left in place.
    pub fn restore(&self, service: &str, id: OutageId) -> bool {
        let mut outages = self.lock();
        let Some(holders) = outages.by_service.get_mut(service) else {
            return false;
        };
        let before = holders.len();
        holders.retain(|o| o.id != id);
        let removed = holders.len() != before;
        let remaining = holders.len();
        if remaining == 0 {
            outages.by_service.remove(service);
        }
        if removed {
            tracing::info!(service, %id, remaining, "Dependency outage lifted");
        }
        removed
    }

    /// Fail with [`InjectedFault::ServiceUnavailable`] if `service` is in an outage.
    ///
    /// The failure is fatal if any live holder is fatal.
    pub fn check(&self, service: &str) -> Result<(), InjectedFault> {
        let mut outages = self.lock();
        outages.prune(Instant::now());
        match outages.by_service.get(service) {
            Some(holders) => Err(InjectedFault::ServiceUnavailable {
                service: service.to_string(),
                fatal: holders.iter().any(|o| o.fatal),
            }),
            None => Ok(()),
        }
    }

    /// Returns true if `service` is currently failing.
    pub fn is_failing(&self, service: &str) -> bool {
        self.check(service).is_err()
    }

    /// Services currently failing, sorted.
    pub fn failing(&self) -> Vec<String> {
        let mut outages = self.lock();
        outages.prune(Instant::now());
        outages.by_service.keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Outages> {
        self.outages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
