//! Run configuration for faultline.
//!
//! A run is described by one TOML file:
//!
//! ```toml
//! [engine]
//! tick_interval_ms = 5000
//! seed = 42
//!
//! [[scenarios]]
//! name = "db-outage"
//! injector = "service-outage"
//! probability = 0.3
//! severity = "high"
//! duration_ms = 4000
//! affected_services = ["database"]
//!
//! [workload]
//! clients = 4
//!
//! [verification]
//! min_success_rate = 0.7
//! ```
//!
//! Every section is optional and every field has a default.

use crate::engine::EngineConfig;
use crate::verify::VerificationConfig;
use crate::workload::WorkloadConfig;
use chaos_core::{BackoffConfig, BreakerConfig};
use chaos_resilience::LeaseConfig;
use chaos_types::ChaosScenario;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Scheduler settings.
    pub engine: EngineSection,
    /// Scenarios to register.
    pub scenarios: Vec<ChaosScenario>,
    /// Circuit breaker guarding workload requests.
    pub breaker: BreakerSection,
    /// Lease pool bounding workload concurrency.
    pub pool: PoolSection,
    /// Retry policy for workload requests.
    pub backoff: BackoffSection,
    /// Simulated clients.
    pub workload: WorkloadSection,
    /// Pass/fail thresholds.
    pub verification: VerificationSection,
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSection {
    /// Tick interval in milliseconds (default: 5000).
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Seed for reproducible runs (default: none, thread RNG).
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSection {
    /// Consecutive failures that open the circuit (default: 5).
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Quiet time before a half-open trial, in milliseconds (default: 30000).
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
    /// Successful trials that close the circuit (default: 2).
    #[serde(default = "default_required_successes")]
    pub required_successes: u32,
    /// Upper bound on a half-open trial, in milliseconds (default: 10000).
    #[serde(default = "default_half_open_timeout_ms")]
    pub half_open_timeout_ms: u64,
}

/// Lease pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSection {
    /// Maximum concurrently held leases (default: 10).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Wait for a free slot, in milliseconds (default: 5000).
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Lease lifetime in milliseconds (default: 30000).
    #[serde(default = "default_lease_duration_ms")]
    pub lease_duration_ms: u64,
    /// Expiry sweep period in milliseconds (default: 1000).
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffSection {
    /// First retry delay in milliseconds (default: 100).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Delay cap in milliseconds (default: 10000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Delay growth factor (default: 2.0).
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Total attempts including the first (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Perturb delays by up to 10% (default: true).
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

/// Workload configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSection {
    /// Concurrent simulated clients (default: 4).
    #[serde(default = "default_clients")]
    pub clients: usize,
    /// Pause between a client's requests, in milliseconds (default: 100).
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
    /// Services the clients call, round-robin (default: api, database, cache).
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,
    /// Run length in seconds when the CLI is not given one (default: 30).
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
}

/// Verification thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSection {
    /// Minimum workload success rate in [0, 1] (default: 0.5).
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    /// Longest acceptable fault window, in milliseconds (default: 60000).
    #[serde(default = "default_max_recovery_time_ms")]
    pub max_recovery_time_ms: u64,
}

// Default value functions
fn default_tick_interval_ms() -> u64 {
    5000
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_ms() -> u64 {
    30_000
}

fn default_required_successes() -> u32 {
    2
}

fn default_half_open_timeout_ms() -> u64 {
    10_000
}

fn default_max_connections() -> usize {
    10
}

fn default_acquire_timeout_ms() -> u64 {
    5000
}

fn default_lease_duration_ms() -> u64 {
    30_000
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_jitter() -> bool {
    true
}

fn default_clients() -> usize {
    4
}

fn default_request_interval_ms() -> u64 {
    100
}

fn default_targets() -> Vec<String> {
    vec!["api".into(), "database".into(), "cache".into()]
}

fn default_duration_secs() -> u64 {
    30
}

fn default_min_success_rate() -> f64 {
    0.5
}

fn default_max_recovery_time_ms() -> u64 {
    60_000
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            seed: None,
        }
    }
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
            required_successes: default_required_successes(),
            half_open_timeout_ms: default_half_open_timeout_ms(),
        }
    }
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            lease_duration_ms: default_lease_duration_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
            jitter: default_jitter(),
        }
    }
}

impl Default for WorkloadSection {
    fn default() -> Self {
        Self {
            clients: default_clients(),
            request_interval_ms: default_request_interval_ms(),
            targets: default_targets(),
            duration_secs: default_duration_secs(),
        }
    }
}

impl Default for VerificationSection {
    fn default() -> Self {
        Self {
            min_success_rate: default_min_success_rate(),
            max_recovery_time_ms: default_max_recovery_time_ms(),
        }
    }
}

// ============================================================================
// Conversions into component configs
// ============================================================================

impl EngineSection {
    /// Scheduler settings.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            seed: self.seed,
        }
    }
}

impl BreakerSection {
    /// Breaker tuning.
    pub fn to_breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: Duration::from_millis(self.reset_timeout_ms),
            required_successes: self.required_successes,
            half_open_timeout: Duration::from_millis(self.half_open_timeout_ms),
        }
    }
}

impl PoolSection {
    /// Lease manager tuning.
    pub fn to_lease_config(&self) -> LeaseConfig {
        LeaseConfig {
            max_connections: self.max_connections,
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            lease_duration: Duration::from_millis(self.lease_duration_ms),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
        }
    }
}

impl BackoffSection {
    /// Retry policy.
    pub fn to_backoff_config(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            max_attempts: self.max_attempts,
            jitter: self.jitter,
        }
    }
}

impl WorkloadSection {
    /// Client settings.
    pub fn to_workload_config(&self) -> WorkloadConfig {
        WorkloadConfig {
            clients: self.clients,
            request_interval: Duration::from_millis(self.request_interval_ms),
            targets: self.targets.clone(),
        }
    }

    /// Default run length.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

impl VerificationSection {
    /// Thresholds.
    pub fn to_verification_config(&self) -> VerificationConfig {
        VerificationConfig {
            min_success_rate: self.min_success_rate,
            max_recovery_time: Duration::from_millis(self.max_recovery_time_ms),
        }
    }
}

// ============================================================================
// Loading and validation
// ============================================================================

impl RunConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed. The result is
    /// not validated; call [`validate`](Self::validate) before running.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check cross-field constraints the type system cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.tick_interval_ms == 0 {
            return Err(ConfigError::invalid("engine.tick_interval_ms must be positive"));
        }

        let mut seen = HashSet::new();
        for scenario in &self.scenarios {
            scenario
                .validate()
                .map_err(|e| ConfigError::invalid(format!("scenario {}: {e}", scenario.name)))?;
            if !seen.insert(scenario.name.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate scenario name {}",
                    scenario.name
                )));
            }
        }

        if self.breaker.failure_threshold == 0 || self.breaker.required_successes == 0 {
            return Err(ConfigError::invalid(
                "breaker thresholds must be at least 1",
            ));
        }
        if self.pool.max_connections == 0 {
            return Err(ConfigError::invalid("pool.max_connections must be at least 1"));
        }
        if self.pool.sweep_interval_ms == 0 {
            return Err(ConfigError::invalid("pool.sweep_interval_ms must be positive"));
        }
        self.backoff
            .to_backoff_config()
            .validate()
            .map_err(|e| ConfigError::invalid(format!("backoff: {e}")))?;
        if self.workload.targets.is_empty() {
            return Err(ConfigError::invalid("workload.targets must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.verification.min_success_rate) {
            return Err(ConfigError::invalid(
                "verification.min_success_rate must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// The configuration parsed but is not usable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}
