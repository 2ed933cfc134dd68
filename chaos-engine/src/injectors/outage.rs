//! Dependency outage.

use super::{targets_or, ActiveFault, FaultFootprint, FaultInjector};
use crate::environment::{Environment, OutageId};
use crate::error::{CleanupError, InjectorError};
use async_trait::async_trait;
use chaos_types::{ChaosScenario, Severity};

/// Service targeted when a scenario names none.
const DEFAULT_SERVICE: &str = "database";

/// Fails the affected dependencies for the scenario duration.
///
/// The outage carries its own expiry, so it ends even if cleanup never runs.
/// Critical outages are reported as fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceOutageInjector;

#[derive(Debug)]
struct Outage {
    held: Vec<(String, OutageId)>,
    fatal: bool,
}

#[async_trait]
impl FaultInjector for ServiceOutageInjector {
    fn name(&self) -> &'static str {
        "service-outage"
    }

    fn description(&self) -> &'static str {
        "Fail the affected dependencies (fatal when critical)"
    }

    async fn activate(
        &self,
        scenario: &ChaosScenario,
        env: &Environment,
    ) -> Result<Box<dyn ActiveFault>, InjectorError> {
        let services = targets_or(scenario, &[DEFAULT_SERVICE]);
        let fatal = scenario.severity == Severity::Critical;
        let held = services
            .into_iter()
            .map(|service| {
                let id = env.dependencies().fail(&service, fatal, scenario.duration);
                (service, id)
            })
            .collect();
        Ok(Box::new(Outage { held, fatal }))
    }
}

#[async_trait]
impl ActiveFault for Outage {
    fn footprint(&self) -> FaultFootprint {
        FaultFootprint::ServiceOutage {
            services: self.held.iter().map(|(s, _)| s.clone()).collect(),
            fatal: self.fatal,
        }
    }

    async fn cleanup(self: Box<Self>, env: &Environment) -> Result<(), CleanupError> {
        for (service, id) in &self.held {
            // Already gone if the outage expired on its own.
            env.dependencies().restore(service, *id);
        }
        Ok(())
    }
}
