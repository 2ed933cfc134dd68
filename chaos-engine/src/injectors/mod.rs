//! Fault injectors.
//!
//! An injector turns a scenario into an [`ActiveFault`] by changing the
//! [`Environment`]. The active fault owns everything it installed (route ids,
//! worker threads, buffers) and undoes it in [`ActiveFault::cleanup`], which
//! consumes the handle so it can run at most once.
//!
//! | Name | Effect |
//! |------|--------|
//! | `network-partition` | Abort matching routes; go offline when untargeted |
//! | `network-degradation` | Delay matching requests by severity-scaled latency |
//! | `service-outage` | Fail named dependencies for the scenario duration |
//! | `cpu-spike` | Spin busy worker threads |
//! | `memory-pressure` | Hold large committed buffers |
//! | `clock-skew` | Shift the perceived wall clock forward |
//! | `data-corruption` | Flip bytes on the storage write path |
//! | `cascading-failure` | Fail dependencies in timed stages |

mod cascade;
mod clock;
mod corruption;
mod network;
mod outage;
mod resources;

pub use cascade::CascadingFailureInjector;
pub use clock::ClockSkewInjector;
pub use corruption::{DataCorruptionInjector, ProbabilisticCorruptor};
pub use network::{NetworkDegradationInjector, NetworkPartitionInjector};
pub use outage::ServiceOutageInjector;
pub use resources::{CpuSpikeInjector, MemoryPressureInjector};

use crate::environment::Environment;
use crate::error::{CleanupError, InjectorError};
use async_trait::async_trait;
use chaos_types::ChaosScenario;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// What an active fault currently holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaultFootprint {
    /// Abort routes installed, and whether the network was taken offline.
    NetworkPartition {
        /// Blocked URL patterns.
        patterns: Vec<String>,
        /// Whether the offline flag was raised.
        offline: bool,
    },
    /// Delay routes installed.
    NetworkDegradation {
        /// Delayed URL patterns.
        patterns: Vec<String>,
        /// Base latency per request.
        latency_ms: u64,
        /// Relative jitter.
        jitter: f64,
    },
    /// Dependencies put into an outage.
    ServiceOutage {
        /// Failing services.
        services: Vec<String>,
        /// Whether callers see the outage as fatal.
        fatal: bool,
    },
    /// Busy worker threads running.
    CpuSpike {
        /// Worker threads.
        workers: usize,
    },
    /// Memory held.
    MemoryPressure {
        /// Bytes allocated.
        bytes: usize,
        /// Chunks allocated.
        chunks: usize,
    },
    /// Clock offset applied.
    ClockSkew {
        /// Forward shift in milliseconds.
        offset_ms: u64,
    },
    /// Corruptor installed on the write path.
    DataCorruption {
        /// Per-write corruption probability.
        probability: f64,
    },
    /// Progress of a staged cascade.
    CascadingFailure {
        /// Dependencies failed so far, in order.
        failed: Vec<String>,
        /// Whether broad request failures have started.
        broad_failure: bool,
    },
}

/// A fault currently applied to the environment.
#[async_trait]
pub trait ActiveFault: Send + Sync + fmt::Debug {
    /// What the fault holds right now.
    fn footprint(&self) -> FaultFootprint;

    /// Undo the fault. Must succeed on an environment that is already clean.
    async fn cleanup(self: Box<Self>, env: &Environment) -> Result<(), CleanupError>;
}

/// Applies one kind of fault.
#[async_trait]
pub trait FaultInjector: Send + Sync + fmt::Debug {
    /// Registry key, e.g. `network-partition`.
    fn name(&self) -> &'static str;

    /// One-line description for listings.
    fn description(&self) -> &'static str;

    /// Apply the fault described by `scenario`.
    async fn activate(
        &self,
        scenario: &ChaosScenario,
        env: &Environment,
    ) -> Result<Box<dyn ActiveFault>, InjectorError>;
}

/// Injectors by name.
#[derive(Debug, Clone, Default)]
pub struct InjectorRegistry {
    injectors: BTreeMap<&'static str, Arc<dyn FaultInjector>>,
}

impl InjectorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in injector.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(NetworkPartitionInjector);
        registry.register(NetworkDegradationInjector);
        registry.register(ServiceOutageInjector);
        registry.register(CpuSpikeInjector::default());
        registry.register(MemoryPressureInjector::default());
        registry.register(ClockSkewInjector);
        registry.register(DataCorruptionInjector);
        registry.register(CascadingFailureInjector::default());
        registry
    }

    /// Add or replace an injector under its own name.
    pub fn register(&mut self, injector: impl FaultInjector + 'static) {
        let injector: Arc<dyn FaultInjector> = Arc::new(injector);
        self.injectors.insert(injector.name(), injector);
    }

    /// Look up an injector.
    pub fn get(&self, name: &str) -> Option<Arc<dyn FaultInjector>> {
        self.injectors.get(name).cloned()
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.injectors.contains_key(name)
    }

    /// Registered injectors, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn FaultInjector>> {
        self.injectors.values()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.injectors.keys().copied().collect()
    }
}

/// Scenario targets, or `defaults` when the scenario names none.
pub(crate) fn targets_or(scenario: &ChaosScenario, defaults: &[&str]) -> Vec<String> {
    if scenario.affected_services.is_empty() {
        defaults.iter().map(|s| s.to_string()).collect()
    } else {
        scenario.affected_services.iter().cloned().collect()
    }
}

/// URL pattern covering every request to `service`.
pub(crate) fn service_pattern(service: &str) -> String {
    format!("*://{service}/*")
}
