//! Data corruption on the storage write path.

use super::{ActiveFault, FaultFootprint, FaultInjector};
use crate::environment::{Corruptor, CorruptorId, Environment, SharedRandom};
use crate::error::{CleanupError, InjectorError};
use async_trait::async_trait;
use chaos_core::{FaultIntensity, RandomSource};
use chaos_types::ChaosScenario;
use std::sync::Arc;

/// Flips one random byte of a write with a fixed probability.
#[derive(Debug)]
pub struct ProbabilisticCorruptor {
    probability: f64,
    random: SharedRandom,
}

impl ProbabilisticCorruptor {
    /// Corrupt each write with `probability`, drawing from `random`.
    pub fn new(probability: f64, random: SharedRandom) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            random,
        }
    }
}

impl Corruptor for ProbabilisticCorruptor {
    fn corrupt(&self, _key: &str, data: &mut [u8]) -> bool {
        if data.is_empty() {
            return false;
        }
        let mut random = self.random.clone();
        if random.sample() >= self.probability {
            return false;
        }
        let index = ((random.sample() * data.len() as f64) as usize).min(data.len() - 1);
        // XOR with a non-zero mask always changes the byte.
        let mask = ((random.sample() * 255.0) as u8).saturating_add(1);
        data[index] ^= mask;
        true
    }
}

/// Installs a [`ProbabilisticCorruptor`] with a severity-scaled probability
/// (1% low to 25% critical).
#[derive(Debug, Clone, Copy, Default)]
pub struct DataCorruptionInjector;

#[derive(Debug)]
struct DataCorruption {
    id: CorruptorId,
    probability: f64,
}

#[async_trait]
impl FaultInjector for DataCorruptionInjector {
    fn name(&self) -> &'static str {
        "data-corruption"
    }

    fn description(&self) -> &'static str {
        "Flip bytes in 1-25% of storage writes (by severity)"
    }

    async fn activate(
        &self,
        scenario: &ChaosScenario,
        env: &Environment,
    ) -> Result<Box<dyn ActiveFault>, InjectorError> {
        let probability = FaultIntensity::for_severity(scenario.severity).corruption_probability;
        let corruptor = ProbabilisticCorruptor::new(probability, env.random());
        let id = env.storage().install_corruptor(Arc::new(corruptor));
        Ok(Box::new(DataCorruption { id, probability }))
    }
}

#[async_trait]
impl ActiveFault for DataCorruption {
    fn footprint(&self) -> FaultFootprint {
        FaultFootprint::DataCorruption {
            probability: self.probability,
        }
    }

    async fn cleanup(self: Box<Self>, env: &Environment) -> Result<(), CleanupError> {
        env.storage().remove_corruptor(self.id);
        Ok(())
    }
}
