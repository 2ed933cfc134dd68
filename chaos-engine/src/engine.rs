//! Chaos scheduler and result aggregator.
//!
//! The engine owns the scenario registry, the active set, the results log and
//! one [`DeadlineQueue`] of pending cleanups. A single background task drives
//! it: every tick it rolls each idle scenario against its probability, and in
//! between it sleeps until the next tick or the next cleanup deadline,
//! whichever comes first.
//!
//! Locks are only held for bookkeeping, never across injector calls.

use crate::environment::{Environment, RequestCounts};
use crate::error::{EngineError, InjectorError};
use crate::injectors::{ActiveFault, FaultFootprint, InjectorRegistry};
use chaos_core::{DeadlineQueue, RandomSource, SeededRandom, ThreadRandom};
use chaos_types::{
    ChaosScenario, ChaosTestResult, EngineMetrics, ExecutionEvent, ExecutionLogEntry, FaultRecord,
    FaultRecordKind, ScenarioError,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Period between scheduling rounds.
    pub tick_interval: Duration,
    /// Seed for activation rolls; `None` uses the thread RNG.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            seed: None,
        }
    }
}

/// Where an active scenario is in its lifecycle.
enum Phase {
    /// Reserved; the injector is still applying the fault.
    Activating,
    /// Applied and holding its fault.
    Active(Box<dyn ActiveFault>),
    /// Being cleaned up.
    Finalizing,
}

struct ActiveEntry {
    phase: Phase,
    result: ChaosTestResult,
    started: Instant,
    baseline: RequestCounts,
    cooldown: Option<Duration>,
}

#[derive(Default)]
struct EngineState {
    scenarios: Vec<ChaosScenario>,
    active: BTreeMap<String, ActiveEntry>,
    results: Vec<ChaosTestResult>,
    log: Vec<ExecutionLogEntry>,
    deadlines: DeadlineQueue<String>,
    cooldowns: HashMap<String, Instant>,
}

impl EngineState {
    fn record(&mut self, scenario: &str, event: ExecutionEvent, detail: Option<String>) {
        self.log.push(ExecutionLogEntry {
            at: SystemTime::now(),
            scenario: scenario.to_string(),
            event,
            detail,
        });
    }

    fn cooling_down(&self, name: &str, now: Instant) -> bool {
        self.cooldowns.get(name).is_some_and(|until| now < *until)
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct EngineInner {
    config: EngineConfig,
    injectors: InjectorRegistry,
    random: Mutex<Box<dyn RandomSource>>,
    state: Mutex<EngineState>,
    deadline_changed: Notify,
    running: Mutex<Option<Running>>,
}

/// Probabilistic fault scheduler.
///
/// Cheap to clone; clones share the same engine.
#[derive(Clone)]
pub struct ChaosEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for ChaosEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ChaosEngine")
            .field("config", &self.inner.config)
            .field("scenarios", &state.scenarios.len())
            .field("active", &state.active.len())
            .field("results", &state.results.len())
            .finish()
    }
}

impl ChaosEngine {
    /// Engine with every built-in injector.
    pub fn new(config: EngineConfig) -> Self {
        let random: Box<dyn RandomSource> = match config.seed {
            Some(seed) => Box::new(SeededRandom::new(seed)),
            None => Box::new(ThreadRandom),
        };
        Self::with_parts(config, InjectorRegistry::with_defaults(), random)
    }

    /// Engine with an explicit injector registry and activation random source.
    pub fn with_parts(
        config: EngineConfig,
        injectors: InjectorRegistry,
        random: Box<dyn RandomSource>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                injectors,
                random: Mutex::new(random),
                state: Mutex::new(EngineState::default()),
                deadline_changed: Notify::new(),
                running: Mutex::new(None),
            }),
        }
    }

    /// Injectors available to scenarios.
    pub fn injectors(&self) -> &InjectorRegistry {
        &self.inner.injectors
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a scenario. Names must be unique.
    pub fn add_scenario(&self, scenario: ChaosScenario) -> Result<(), EngineError> {
        scenario.validate()?;
        if !self.inner.injectors.contains(scenario.injector_name()) {
            tracing::warn!(
                scenario = %scenario.name,
                injector = scenario.injector_name(),
                "No injector registered for scenario; activations will fail"
            );
        }

        let mut state = self.state();
        if state.scenarios.iter().any(|s| s.name == scenario.name) {
            return Err(ScenarioError::Duplicate(scenario.name).into());
        }
        tracing::debug!(scenario = %scenario.name, probability = scenario.probability, "Scenario registered");
        state.scenarios.push(scenario);
        Ok(())
    }

    /// Register several scenarios, stopping at the first rejection.
    pub fn add_scenarios(
        &self,
        scenarios: impl IntoIterator<Item = ChaosScenario>,
    ) -> Result<(), EngineError> {
        scenarios.into_iter().try_for_each(|s| self.add_scenario(s))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start scheduling. The first round runs before this returns.
    pub async fn start(&self, env: &Environment) -> Result<(), EngineError> {
        {
            let mut running = self.running();
            if running.is_some() {
                return Err(EngineError::AlreadyRunning);
            }
            let (shutdown, shutdown_rx) = watch::channel(false);
            let engine = self.clone();
            let task_env = env.clone();
            let task = tokio::spawn(async move {
                engine.run(task_env, shutdown_rx).await;
            });
            *running = Some(Running { shutdown, task });
        }

        tracing::info!(
            interval = ?self.inner.config.tick_interval,
            scenarios = self.state().scenarios.len(),
            "Chaos engine started"
        );
        self.tick(env).await;
        Ok(())
    }

    /// Stop scheduling and clean up every active scenario. No-op when stopped.
    pub async fn stop(&self, env: &Environment) {
        let Some(Running { shutdown, task }) = self.running().take() else {
            return;
        };

        let _ = shutdown.send(true);
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                tracing::error!("Chaos engine task failed: {}", e);
            }
        }

        let pending = {
            let mut state = self.state();
            state.deadlines.clear();
            state.active.keys().cloned().collect::<Vec<_>>()
        };
        for name in pending {
            self.deactivate(&name, env).await;
        }

        let metrics = self.metrics();
        tracing::info!(
            executed = metrics.executed_scenarios,
            errors = metrics.total_errors,
            "Chaos engine stopped"
        );
    }

    /// Returns true while the scheduler task is running.
    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    async fn run(self, env: Environment, mut shutdown: watch::Receiver<bool>) {
        let period = self.inner.config.tick_interval;
        // `start` already ran the first round.
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let next_deadline = self.state().deadlines.next_deadline();
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = sleep_until(next_deadline) => {
                    self.expire_due(&env).await;
                }
                _ = ticker.tick() => {
                    self.tick(&env).await;
                }
                _ = self.inner.deadline_changed.notified() => {}
            }
        }
        tracing::debug!("Chaos engine loop exited");
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Run one scheduling round. Returns the names activated.
    pub async fn tick(&self, env: &Environment) -> Vec<String> {
        let now = crate::now();
        let chosen: Vec<ChaosScenario> = {
            let mut state = self.state();
            let mut random = self.random();
            let mut chosen = Vec::new();
            for scenario in &state.scenarios {
                if state.active.contains_key(&scenario.name)
                    || state.cooling_down(&scenario.name, now)
                {
                    continue;
                }
                let roll = random.sample();
                if roll < scenario.probability {
                    chosen.push(scenario.clone());
                } else {
                    tracing::trace!(scenario = %scenario.name, roll, "Scenario not selected");
                }
            }
            for scenario in &chosen {
                state.active.insert(
                    scenario.name.clone(),
                    ActiveEntry {
                        phase: Phase::Activating,
                        result: ChaosTestResult::open(scenario),
                        started: now,
                        baseline: env.stats().snapshot(),
                        cooldown: scenario.cooldown,
                    },
                );
            }
            chosen
        };

        let mut activated = Vec::new();
        for scenario in chosen {
            if self.activate(scenario.clone(), env).await {
                activated.push(scenario.name);
            }
        }
        activated
    }

    /// Dispatch a reserved scenario to its injector.
    async fn activate(&self, scenario: ChaosScenario, env: &Environment) -> bool {
        let outcome = match self.inner.injectors.get(scenario.injector_name()) {
            Some(injector) => injector.activate(&scenario, env).await,
            None => Err(InjectorError::UnknownInjector(
                scenario.injector_name().to_string(),
            )),
        };

        let mut guard = self.state();
        let state = &mut *guard;
        match outcome {
            Ok(fault) => {
                let footprint = fault.footprint();
                let Some(entry) = state.active.get_mut(&scenario.name) else {
                    return false;
                };
                entry.phase = Phase::Active(fault);
                entry.result.executed = true;
                if let Some(duration) = scenario.duration {
                    state
                        .deadlines
                        .schedule(scenario.name.clone(), entry.started + duration);
                    self.inner.deadline_changed.notify_one();
                }
                state.record(
                    &scenario.name,
                    ExecutionEvent::Activated,
                    Some(format!("{footprint:?}")),
                );
                tracing::info!(
                    scenario = %scenario.name,
                    severity = %scenario.severity,
                    injector = scenario.injector_name(),
                    duration = ?scenario.duration,
                    "Scenario activated"
                );
                true
            }
            Err(e) => {
                let Some(mut entry) = state.active.remove(&scenario.name) else {
                    return false;
                };
                let message = e.to_string();
                entry
                    .result
                    .errors
                    .push(FaultRecord::now(FaultRecordKind::Activation, message.clone()));
                entry.result.end_time = Some(SystemTime::now());
                if let Some(cooldown) = entry.cooldown {
                    state
                        .cooldowns
                        .insert(scenario.name.clone(), crate::now() + cooldown);
                }
                state.results.push(entry.result);
                state.record(&scenario.name, ExecutionEvent::ActivationFailed, Some(message));
                tracing::warn!(scenario = %scenario.name, error = %e, "Scenario activation failed");
                false
            }
        }
    }

    /// Clean up every scenario whose duration has elapsed.
    async fn expire_due(&self, env: &Environment) {
        let due = self.state().deadlines.pop_due(crate::now());
        for name in due {
            tracing::debug!(scenario = %name, "Scenario duration elapsed");
            self.deactivate(&name, env).await;
        }
    }

    /// Clean up an active scenario now and finalize its result.
    ///
    /// Returns false if the scenario is not active (or still activating).
    pub async fn deactivate(&self, name: &str, env: &Environment) -> bool {
        let fault = {
            let mut state = self.state();
            state.deadlines.cancel(&name.to_string());
            let Some(entry) = state.active.get_mut(name) else {
                return false;
            };
            match std::mem::replace(&mut entry.phase, Phase::Finalizing) {
                Phase::Active(fault) => fault,
                other => {
                    entry.phase = other;
                    return false;
                }
            }
        };

        let cleanup = fault.cleanup(env).await;

        let mut state = self.state();
        let Some(mut entry) = state.active.remove(name) else {
            return false;
        };
        let window = env.stats().snapshot().since(&entry.baseline);
        let result = &mut entry.result;
        result.metrics.requests_affected = window.affected;
        result.metrics.error_rate = window.error_rate();
        result.metrics.recovery_time_ms =
            crate::now().saturating_duration_since(entry.started).as_millis() as u64;
        result.end_time = Some(SystemTime::now());

        match cleanup {
            Ok(()) => {
                state.record(name, ExecutionEvent::Deactivated, None);
                tracing::info!(
                    scenario = name,
                    window_ms = result.metrics.recovery_time_ms,
                    affected = window.affected,
                    "Scenario deactivated"
                );
            }
            Err(e) => {
                let message = e.to_string();
                result
                    .errors
                    .push(FaultRecord::now(FaultRecordKind::Cleanup, message.clone()));
                state.record(name, ExecutionEvent::CleanupFailed, Some(message));
                tracing::warn!(scenario = name, error = %e, "Scenario cleanup failed");
            }
        }

        if let Some(cooldown) = entry.cooldown {
            state.cooldowns.insert(name.to_string(), crate::now() + cooldown);
        }
        state.results.push(entry.result);
        true
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Finalized results, in finalization order.
    pub fn results(&self) -> Vec<ChaosTestResult> {
        self.state().results.clone()
    }

    /// Scheduler event log.
    pub fn execution_log(&self) -> Vec<ExecutionLogEntry> {
        self.state().log.clone()
    }

    /// Aggregate metrics.
    pub fn metrics(&self) -> EngineMetrics {
        let state = self.state();
        EngineMetrics::aggregate(state.scenarios.len(), state.active.len(), &state.results)
    }

    /// Names of the currently active scenarios, sorted.
    pub fn active_scenarios(&self) -> Vec<String> {
        self.state().active.keys().cloned().collect()
    }

    /// Footprint of every applied fault, sorted by scenario name.
    pub fn active_faults(&self) -> Vec<(String, FaultFootprint)> {
        self.state()
            .active
            .iter()
            .filter_map(|(name, entry)| match &entry.phase {
                Phase::Active(fault) => Some((name.clone(), fault.footprint())),
                _ => None,
            })
            .collect()
    }

    /// Registered scenarios, in registration order.
    pub fn scenarios(&self) -> Vec<ChaosScenario> {
        self.state().scenarios.clone()
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn random(&self) -> MutexGuard<'_, Box<dyn RandomSource>> {
        self.inner.random.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.inner.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}
