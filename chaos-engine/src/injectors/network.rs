//! Network partition and degradation.

use super::{service_pattern, ActiveFault, FaultFootprint, FaultInjector};
use crate::environment::{Environment, RouteAction, RouteId};
use crate::error::{CleanupError, InjectorError};
use async_trait::async_trait;
use chaos_core::{FaultIntensity, LATENCY_JITTER};
use chaos_types::ChaosScenario;

/// Blocks requests to the affected services.
///
/// With no affected services every route (`*`) is blocked and the network
/// is taken offline.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkPartitionInjector;

#[derive(Debug)]
struct Partition {
    routes: Vec<(RouteId, String)>,
    offline: bool,
}

#[async_trait]
impl FaultInjector for NetworkPartitionInjector {
    fn name(&self) -> &'static str {
        "network-partition"
    }

    fn description(&self) -> &'static str {
        "Abort requests to the affected services (all traffic and offline if none named)"
    }

    async fn activate(
        &self,
        scenario: &ChaosScenario,
        env: &Environment,
    ) -> Result<Box<dyn ActiveFault>, InjectorError> {
        let patterns: Vec<String> = if scenario.affected_services.is_empty() {
            vec!["*".to_string()]
        } else {
            scenario
                .affected_services
                .iter()
                .map(|s| service_pattern(s))
                .collect()
        };

        let routes = patterns
            .into_iter()
            .map(|p| (env.network().route(&p, RouteAction::Abort), p))
            .collect();

        let offline = scenario.affected_services.is_empty();
        if offline {
            env.network().hold_offline();
        }

        Ok(Box::new(Partition { routes, offline }))
    }
}

#[async_trait]
impl ActiveFault for Partition {
    fn footprint(&self) -> FaultFootprint {
        FaultFootprint::NetworkPartition {
            patterns: self.routes.iter().map(|(_, p)| p.clone()).collect(),
            offline: self.offline,
        }
    }

    async fn cleanup(self: Box<Self>, env: &Environment) -> Result<(), CleanupError> {
        for (id, _) in &self.routes {
            env.network().unroute(*id);
        }
        if self.offline {
            env.network().release_offline();
        }
        Ok(())
    }
}

/// Delays requests to the affected services (all when none named) by a
/// severity-scaled latency with ±30% jitter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkDegradationInjector;

#[derive(Debug)]
struct Degradation {
    routes: Vec<(RouteId, String)>,
    intensity: FaultIntensity,
}

#[async_trait]
impl FaultInjector for NetworkDegradationInjector {
    fn name(&self) -> &'static str {
        "network-degradation"
    }

    fn description(&self) -> &'static str {
        "Delay requests by 500-5000 ms (by severity) with ±30% jitter"
    }

    async fn activate(
        &self,
        scenario: &ChaosScenario,
        env: &Environment,
    ) -> Result<Box<dyn ActiveFault>, InjectorError> {
        let intensity = FaultIntensity::for_severity(scenario.severity);
        let patterns: Vec<String> = if scenario.affected_services.is_empty() {
            vec!["*".to_string()]
        } else {
            scenario
                .affected_services
                .iter()
                .map(|s| service_pattern(s))
                .collect()
        };

        let action = RouteAction::Delay {
            base: intensity.latency,
            jitter: LATENCY_JITTER,
        };
        let routes = patterns
            .into_iter()
            .map(|p| (env.network().route(&p, action.clone()), p))
            .collect();

        Ok(Box::new(Degradation { routes, intensity }))
    }
}

#[async_trait]
impl ActiveFault for Degradation {
    fn footprint(&self) -> FaultFootprint {
        FaultFootprint::NetworkDegradation {
            patterns: self.routes.iter().map(|(_, p)| p.clone()).collect(),
            latency_ms: self.intensity.latency.as_millis() as u64,
            jitter: LATENCY_JITTER,
        }
    }

    async fn cleanup(self: Box<Self>, env: &Environment) -> Result<(), CleanupError> {
        for (id, _) in &self.routes {
            env.network().unroute(*id);
        }
        Ok(())
    }
}
