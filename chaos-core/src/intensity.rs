//! Severity-scaled fault intensity.

use chaos_types::Severity;
use std::time::Duration;

/// Relative jitter applied to injected network latency (±30%).
pub const LATENCY_JITTER: f64 = 0.3;

/// Size of each buffer allocated by memory pressure.
pub const MEMORY_CHUNK_BYTES: usize = 10 * 1024 * 1024;

const MB: usize = 1024 * 1024;

/// How hard each injector pushes at a given severity.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultIntensity {
    /// Base delay added to every request by network degradation.
    pub latency: Duration,
    /// Target bytes held by memory pressure.
    pub memory_bytes: usize,
    /// Busy worker threads spawned by a CPU spike.
    pub cpu_workers: usize,
    /// Forward shift applied to the perceived clock.
    pub clock_skew: Duration,
    /// Per-write probability that data corruption mutates the payload.
    pub corruption_probability: f64,
}

impl FaultIntensity {
    /// Intensity table for `severity`.
    pub fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::Low => Self {
                latency: Duration::from_millis(500),
                memory_bytes: 50 * MB,
                cpu_workers: 1,
                clock_skew: Duration::from_secs(30),
                corruption_probability: 0.01,
            },
            Severity::Medium => Self {
                latency: Duration::from_millis(1000),
                memory_bytes: 100 * MB,
                cpu_workers: 2,
                clock_skew: Duration::from_secs(5 * 60),
                corruption_probability: 0.05,
            },
            Severity::High => Self {
                latency: Duration::from_millis(2500),
                memory_bytes: 250 * MB,
                cpu_workers: 4,
                clock_skew: Duration::from_secs(60 * 60),
                corruption_probability: 0.10,
            },
            Severity::Critical => Self {
                latency: Duration::from_millis(5000),
                memory_bytes: 500 * MB,
                cpu_workers: 8,
                clock_skew: Duration::from_secs(24 * 60 * 60),
                corruption_probability: 0.25,
            },
        }
    }

    /// Number of [`MEMORY_CHUNK_BYTES`] chunks needed to reach `memory_bytes`.
    pub fn memory_chunks(&self) -> usize {
        self.memory_bytes.div_ceil(MEMORY_CHUNK_BYTES)
    }
}
