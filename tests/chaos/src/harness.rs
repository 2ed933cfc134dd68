//! Chaos test harness: an environment plus a scheduler with scripted rolls.
//!
//! Scenario tests drive the engine by hand (`inject`, `tick`, `expire`)
//! instead of waiting on real timers, and inspect the environment through
//! [`HarnessState`] snapshots that the assertion helpers consume.

use chaos_core::{RandomSource, ScriptedRandom, SeededRandom};
use chaos_engine::{
    ChaosEngine, EngineConfig, EngineError, Environment, InjectorRegistry, Request, Response,
};
use chaos_types::{ChaosScenario, ChaosTestResult, ExecutionLogEntry, InjectedFault};
use std::sync::Once;
use std::time::Duration;
use thiserror::Error;

static INIT_LOGGING: Once = Once::new();

/// Seed used by harnesses that do not pick their own.
pub const DEFAULT_SEED: u64 = 0xFA17_11AE;

/// Initialize test logging. Honours `RUST_LOG`; safe to call repeatedly.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_ansi(false)
            .try_init();
    });
}

/// Errors that can occur during harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The engine rejected the scenario.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// A tick ran but the scenario did not become active.
    #[error("scenario {0} was not activated")]
    NotActivated(String),
}

/// Point-in-time view of the environment and the engine.
#[derive(Debug, Clone, Default)]
pub struct HarnessState {
    /// Active scenario names.
    pub active: Vec<String>,
    /// Finalized results.
    pub results: Vec<ChaosTestResult>,
    /// Scheduler event log.
    pub log: Vec<ExecutionLogEntry>,
    /// Dependencies currently failing.
    pub failing_dependencies: Vec<String>,
    /// Interception routes installed.
    pub routes: usize,
    /// Offline flag.
    pub offline: bool,
    /// Clock skew in milliseconds.
    pub clock_offset_ms: i64,
    /// Whether the storage write path carries no corruptor.
    pub write_path_clean: bool,
}

/// Outcome counts for a batch of requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficSummary {
    /// Requests sent.
    pub sent: usize,
    /// Requests answered.
    pub ok: usize,
    /// Requests failed with an injected fault.
    pub failed: usize,
}

/// In-process chaos orchestrator.
///
/// The engine's activation rolls come from a script, so a scenario with
/// probability `p` fires on a tick exactly when the scripted roll is `< p`.
pub struct ChaosHarness {
    env: Environment,
    engine: ChaosEngine,
}

impl Default for ChaosHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl ChaosHarness {
    /// Harness whose rolls always hit (every roll is 0).
    pub fn new() -> Self {
        Self::with_rolls([0.0])
    }

    /// Harness replaying `rolls` (cycled) for activation decisions.
    pub fn with_rolls(rolls: impl IntoIterator<Item = f64>) -> Self {
        Self::with_registry(InjectorRegistry::with_defaults(), rolls)
    }

    /// Harness with a custom injector set.
    pub fn with_registry(
        injectors: InjectorRegistry,
        rolls: impl IntoIterator<Item = f64>,
    ) -> Self {
        Self::build(injectors, Box::new(ScriptedRandom::new(rolls)))
    }

    /// Harness whose activation rolls come from a seeded generator.
    pub fn seeded(seed: u64) -> Self {
        Self::build(
            InjectorRegistry::with_defaults(),
            Box::new(SeededRandom::new(seed)),
        )
    }

    fn build(injectors: InjectorRegistry, random: Box<dyn RandomSource>) -> Self {
        init_test_logging();
        let env = Environment::seeded(DEFAULT_SEED);
        let engine = ChaosEngine::with_parts(
            EngineConfig {
                tick_interval: Duration::from_millis(1000),
                seed: None,
            },
            injectors,
            random,
        );
        Self { env, engine }
    }

    /// The environment faults act on.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// The scheduler.
    pub fn engine(&self) -> &ChaosEngine {
        &self.engine
    }

    /// Register `scenario` and run one tick; fail unless it became active.
    pub async fn inject(&self, scenario: ChaosScenario) -> Result<(), HarnessError> {
        let name = scenario.name.clone();
        self.engine.add_scenario(scenario)?;
        let activated = self.engine.tick(&self.env).await;
        if activated.contains(&name) {
            tracing::debug!(scenario = %name, "Injected");
            Ok(())
        } else {
            Err(HarnessError::NotActivated(name))
        }
    }

    /// Clean up one scenario now.
    pub async fn expire(&self, name: &str) -> bool {
        self.engine.deactivate(name, &self.env).await
    }

    /// Send one GET request.
    pub async fn send(&self, url: &str) -> Result<Response, InjectedFault> {
        self.env.dispatch(Request::get(url)).await
    }

    /// Send `per_url` requests to each URL, in order.
    pub async fn send_many(&self, urls: &[&str], per_url: usize) -> TrafficSummary {
        let mut summary = TrafficSummary::default();
        for url in urls {
            for _ in 0..per_url {
                summary.sent += 1;
                match self.send(url).await {
                    Ok(_) => summary.ok += 1,
                    Err(_) => summary.failed += 1,
                }
            }
        }
        summary
    }

    /// Snapshot the environment and engine.
    pub fn state(&self) -> HarnessState {
        HarnessState {
            active: self.engine.active_scenarios(),
            results: self.engine.results(),
            log: self.engine.execution_log(),
            failing_dependencies: self.env.dependencies().failing(),
            routes: self.env.network().route_count(),
            offline: self.env.network().is_offline(),
            clock_offset_ms: self.env.clock().offset_ms(),
            write_path_clean: self.env.storage().is_write_path_clean(),
        }
    }

    /// Stop the engine (cleaning up every active scenario) and snapshot.
    pub async fn teardown(&self) -> HarnessState {
        let pending = self.engine.active_scenarios();
        tracing::debug!(active = pending.len(), "Tearing down harness");
        for name in &pending {
            self.engine.deactivate(name, &self.env).await;
        }
        self.engine.stop(&self.env).await;
        self.state()
    }
}
