//! One complete chaos run: environment, engine and workload built from a
//! [`RunConfig`], run for a fixed time, then verified.

use crate::config::RunConfig;
use crate::engine::ChaosEngine;
use crate::environment::{Environment, RequestCounts};
use crate::error::RunError;
use crate::injectors::InjectorRegistry;
use crate::verify::{verify_run, AssertionResult};
use crate::workload::{Workload, WorkloadReport};
use chaos_core::{CircuitState, RandomSource, SeededRandom, ThreadRandom};
use chaos_resilience::{BackoffExecutor, CircuitBreaker, LeaseManager};
use chaos_types::{ChaosTestResult, EngineMetrics, ExecutionLogEntry};
use serde::Serialize;
use std::time::Duration;

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Seed used, if the run was reproducible.
    pub seed: Option<u64>,
    /// Configured run length in milliseconds.
    pub duration_ms: u64,
    /// Engine aggregates.
    pub metrics: EngineMetrics,
    /// Finalized results in finalization order.
    pub results: Vec<ChaosTestResult>,
    /// Scheduler event log.
    pub execution_log: Vec<ExecutionLogEntry>,
    /// Workload totals.
    pub workload: WorkloadReport,
    /// Request counters over the whole run.
    pub requests: RequestCounts,
    /// Breaker position when the run ended.
    pub breaker_state: CircuitState,
    /// Verification checks.
    pub assertions: Vec<AssertionResult>,
    /// True when every check passed.
    pub passed: bool,
}

/// A configured run, ready to start.
#[derive(Debug, Clone)]
pub struct ChaosRun {
    config: RunConfig,
    env: Environment,
    engine: ChaosEngine,
    workload: Workload,
}

impl ChaosRun {
    /// Validate `config` and build every component with the default injectors.
    pub fn from_config(config: RunConfig) -> Result<Self, RunError> {
        Self::with_injectors(config, InjectorRegistry::with_defaults())
    }

    /// Validate `config` and build every component with `injectors`.
    pub fn with_injectors(config: RunConfig, injectors: InjectorRegistry) -> Result<Self, RunError> {
        config.validate()?;
        let seed = config.engine.seed;

        // One stream per consumer: scheduler, environment, retry jitter.
        let env = match seed {
            Some(seed) => Environment::seeded(seed.wrapping_add(1)),
            None => Environment::new(),
        };
        let engine = ChaosEngine::with_parts(
            config.engine.to_engine_config(),
            injectors,
            random_source(seed),
        );
        engine.add_scenarios(config.scenarios.iter().cloned())?;

        let retry = BackoffExecutor::with_random(
            config.backoff.to_backoff_config(),
            random_source(seed.map(|s| s.wrapping_add(2))),
        )?;
        let workload = Workload::new(
            env.clone(),
            config.workload.to_workload_config(),
            LeaseManager::new(config.pool.to_lease_config()),
            CircuitBreaker::new("workload", config.breaker.to_breaker_config()),
            retry,
        );

        Ok(Self {
            config,
            env,
            engine,
            workload,
        })
    }

    /// Configuration this run was built from.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Environment the faults act on.
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Scheduler.
    pub fn engine(&self) -> &ChaosEngine {
        &self.engine
    }

    /// Simulated clients.
    pub fn workload(&self) -> &Workload {
        &self.workload
    }

    /// Run the workload and the engine together for `duration`, stop both,
    /// and verify the outcome.
    pub async fn run(&self, duration: Duration) -> Result<RunReport, RunError> {
        tracing::info!(
            ?duration,
            scenarios = self.config.scenarios.len(),
            seed = ?self.config.engine.seed,
            "Chaos run starting"
        );

        let running = self.workload.start();
        if let Err(e) = self.engine.start(&self.env).await {
            running.stop().await;
            return Err(e.into());
        }

        tokio::time::sleep(duration).await;

        self.engine.stop(&self.env).await;
        let workload = running.stop().await;

        let results = self.engine.results();
        let active = self.engine.active_scenarios();
        let assertions = verify_run(
            &self.config.verification.to_verification_config(),
            &workload,
            &results,
            &active,
        );
        let passed = assertions.iter().all(|a| a.passed);
        for failed in assertions.iter().filter(|a| !a.passed) {
            tracing::warn!(
                check = %failed.description,
                details = failed.failure_details.as_deref().unwrap_or_default(),
                "Verification failed"
            );
        }
        tracing::info!(passed, results = results.len(), "Chaos run finished");

        Ok(RunReport {
            seed: self.config.engine.seed,
            duration_ms: duration.as_millis() as u64,
            metrics: self.engine.metrics(),
            results,
            execution_log: self.engine.execution_log(),
            workload,
            requests: self.env.stats().snapshot(),
            breaker_state: self.workload.breaker().circuit_state(),
            assertions,
            passed,
        })
    }
}

fn random_source(seed: Option<u64>) -> Box<dyn RandomSource> {
    match seed {
        Some(seed) => Box::new(SeededRandom::new(seed)),
        None => Box::new(ThreadRandom),
    }
}
