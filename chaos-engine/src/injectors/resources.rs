//! CPU and memory pressure.

use super::{ActiveFault, FaultFootprint, FaultInjector};
use crate::environment::Environment;
use crate::error::{CleanupError, InjectorError};
use async_trait::async_trait;
use chaos_core::{FaultIntensity, MEMORY_CHUNK_BYTES};
use chaos_types::ChaosScenario;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

// ============================================================================
// CPU spike
// ============================================================================

/// Spins busy worker threads, scaled by severity and capped at the host's
/// available parallelism.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuSpikeInjector {
    max_workers: Option<usize>,
}

impl CpuSpikeInjector {
    /// Cap workers at `max` regardless of severity.
    pub fn with_max_workers(max: usize) -> Self {
        Self {
            max_workers: Some(max),
        }
    }

    fn worker_count(&self, scenario: &ChaosScenario) -> usize {
        let wanted = FaultIntensity::for_severity(scenario.severity).cpu_workers;
        let available = thread::available_parallelism().map_or(1, |n| n.get());
        let cap = self.max_workers.map_or(available, |m| m.min(available));
        wanted.min(cap).max(1)
    }
}

#[derive(Debug)]
struct CpuSpike {
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<u64>>,
}

#[async_trait]
impl FaultInjector for CpuSpikeInjector {
    fn name(&self) -> &'static str {
        "cpu-spike"
    }

    fn description(&self) -> &'static str {
        "Spin 1-8 busy worker threads (by severity, capped at available cores)"
    }

    async fn activate(
        &self,
        scenario: &ChaosScenario,
        _env: &Environment,
    ) -> Result<Box<dyn ActiveFault>, InjectorError> {
        let count = self.worker_count(scenario);
        let stop = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(count);

        for i in 0..count {
            let worker_stop = Arc::clone(&stop);
            let spawned = thread::Builder::new()
                .name(format!("faultline-cpu-{i}"))
                .spawn(move || burn(&worker_stop));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    stop.store(true, Ordering::SeqCst);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(InjectorError::Activation {
                        injector: self.name().to_string(),
                        reason: format!("failed to spawn worker thread: {e}"),
                    });
                }
            }
        }

        tracing::debug!(workers = count, "CPU workers started");
        Ok(Box::new(CpuSpike { stop, workers }))
    }
}

/// Busy loop until told to stop. Returns the iteration count.
fn burn(stop: &AtomicBool) -> u64 {
    let mut x: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut iterations = 0u64;
    while !stop.load(Ordering::Relaxed) {
        for _ in 0..1_000 {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
        }
        std::hint::black_box(x);
        iterations += 1;
    }
    iterations
}

#[async_trait]
impl ActiveFault for CpuSpike {
    fn footprint(&self) -> FaultFootprint {
        FaultFootprint::CpuSpike {
            workers: self.workers.len(),
        }
    }

    async fn cleanup(self: Box<Self>, _env: &Environment) -> Result<(), CleanupError> {
        let CpuSpike { stop, workers } = *self;
        stop.store(true, Ordering::SeqCst);

        let joined = tokio::task::spawn_blocking(move || {
            workers
                .into_iter()
                .map(|w| w.join())
                .filter(Result::is_err)
                .count()
        })
        .await;

        match joined {
            Ok(0) => Ok(()),
            Ok(panicked) => Err(CleanupError::new(
                "cpu-spike",
                format!("{panicked} worker thread(s) panicked"),
            )),
            Err(e) => Err(CleanupError::new("cpu-spike", e.to_string())),
        }
    }
}

// ============================================================================
// Memory pressure
// ============================================================================

/// Holds committed buffers up to a severity-scaled target, allocated in
/// 10 MiB chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryPressureInjector {
    target_bytes: Option<usize>,
}

impl MemoryPressureInjector {
    /// Allocate exactly `bytes` (rounded up to whole chunks) regardless of
    /// severity.
    pub fn with_target(bytes: usize) -> Self {
        Self {
            target_bytes: Some(bytes),
        }
    }
}

#[derive(Debug)]
struct MemoryPressure {
    chunks: Vec<Vec<u8>>,
}

impl MemoryPressure {
    fn bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl FaultInjector for MemoryPressureInjector {
    fn name(&self) -> &'static str {
        "memory-pressure"
    }

    fn description(&self) -> &'static str {
        "Hold 50-500 MB of committed memory (by severity)"
    }

    async fn activate(
        &self,
        scenario: &ChaosScenario,
        _env: &Environment,
    ) -> Result<Box<dyn ActiveFault>, InjectorError> {
        let target = self
            .target_bytes
            .unwrap_or_else(|| FaultIntensity::for_severity(scenario.severity).memory_bytes);
        let count = target.div_ceil(MEMORY_CHUNK_BYTES);

        let chunks = tokio::task::spawn_blocking(move || {
            (0..count)
                .map(|i| {
                    // Non-zero fill so every page is committed.
                    vec![(i as u8) | 0x01; MEMORY_CHUNK_BYTES]
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| InjectorError::Activation {
            injector: self.name().to_string(),
            reason: e.to_string(),
        })?;

        let held = MemoryPressure { chunks };
        tracing::debug!(bytes = held.bytes(), chunks = count, "Memory pressure applied");
        Ok(Box::new(held))
    }
}

#[async_trait]
impl ActiveFault for MemoryPressure {
    fn footprint(&self) -> FaultFootprint {
        FaultFootprint::MemoryPressure {
            bytes: self.bytes(),
            chunks: self.chunks.len(),
        }
    }

    async fn cleanup(self: Box<Self>, _env: &Environment) -> Result<(), CleanupError> {
        let bytes = self.bytes();
        drop(self);
        tracing::debug!(bytes, "Memory pressure released");
        Ok(())
    }
}
