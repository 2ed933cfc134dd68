//! Clock skew.

use super::{ActiveFault, FaultFootprint, FaultInjector};
use crate::environment::Environment;
use crate::error::{CleanupError, InjectorError};
use async_trait::async_trait;
use chaos_core::FaultIntensity;
use chaos_types::ChaosScenario;
use std::time::Duration;

/// Shifts the perceived wall clock forward by 30 s (low) to 24 h (critical).
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockSkewInjector;

#[derive(Debug)]
struct ClockSkew {
    offset: Duration,
}

#[async_trait]
impl FaultInjector for ClockSkewInjector {
    fn name(&self) -> &'static str {
        "clock-skew"
    }

    fn description(&self) -> &'static str {
        "Shift the perceived clock forward by 30 s to 24 h (by severity)"
    }

    async fn activate(
        &self,
        scenario: &ChaosScenario,
        env: &Environment,
    ) -> Result<Box<dyn ActiveFault>, InjectorError> {
        let offset = FaultIntensity::for_severity(scenario.severity).clock_skew;
        env.clock().shift_forward(offset);
        Ok(Box::new(ClockSkew { offset }))
    }
}

#[async_trait]
impl ActiveFault for ClockSkew {
    fn footprint(&self) -> FaultFootprint {
        FaultFootprint::ClockSkew {
            offset_ms: self.offset.as_millis() as u64,
        }
    }

    async fn cleanup(self: Box<Self>, env: &Environment) -> Result<(), CleanupError> {
        env.clock().shift_back(self.offset);
        Ok(())
    }
}
