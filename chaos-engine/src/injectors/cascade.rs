//! Staged cascading failure.
//!
//! Stage 1 fails the first dependency at activation. A background task fails
//! the second one after `second_after`, then starts failing every request
//! after a further `broad_after`. Cleanup aborts any stage still pending and
//! reverts the stages that ran.

use super::{targets_or, ActiveFault, FaultFootprint, FaultInjector};
use crate::environment::{Environment, OutageId, RouteAction, RouteId};
use crate::error::{CleanupError, InjectorError};
use async_trait::async_trait;
use chaos_types::{ChaosScenario, Severity};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

const DEFAULT_DEPENDENCIES: [&str; 2] = ["database", "cache"];

/// Status returned by the broad-failure stage.
const BROAD_FAILURE_STATUS: u16 = 503;

/// Fails dependencies one after another, then everything.
#[derive(Debug, Clone, Copy)]
pub struct CascadingFailureInjector {
    second_after: Duration,
    broad_after: Duration,
}

impl Default for CascadingFailureInjector {
    fn default() -> Self {
        Self {
            second_after: Duration::from_millis(2000),
            broad_after: Duration::from_millis(3000),
        }
    }
}

impl CascadingFailureInjector {
    /// Custom stage delays.
    pub fn with_stages(second_after: Duration, broad_after: Duration) -> Self {
        Self {
            second_after,
            broad_after,
        }
    }
}

#[derive(Debug, Default)]
struct CascadeProgress {
    failed: Vec<(String, OutageId)>,
    broad_route: Option<RouteId>,
}

#[derive(Debug)]
struct Cascade {
    progress: Arc<Mutex<CascadeProgress>>,
    stages: JoinHandle<()>,
}

fn lock(progress: &Mutex<CascadeProgress>) -> MutexGuard<'_, CascadeProgress> {
    progress.lock().unwrap_or_else(PoisonError::into_inner)
}

/// First two targets, padded with the defaults.
fn cascade_targets(scenario: &ChaosScenario) -> (String, String) {
    let mut targets = targets_or(scenario, &DEFAULT_DEPENDENCIES);
    for fallback in DEFAULT_DEPENDENCIES {
        if targets.len() >= 2 {
            break;
        }
        if !targets.iter().any(|t| t == fallback) {
            targets.push(fallback.to_string());
        }
    }
    let mut targets = targets.into_iter();
    let first = targets.next().unwrap_or_else(|| DEFAULT_DEPENDENCIES[0].to_string());
    let second = targets.next().unwrap_or_else(|| DEFAULT_DEPENDENCIES[1].to_string());
    (first, second)
}

#[async_trait]
impl FaultInjector for CascadingFailureInjector {
    fn name(&self) -> &'static str {
        "cascading-failure"
    }

    fn description(&self) -> &'static str {
        "Fail one dependency, a second after 2 s, then all requests after 3 s more"
    }

    async fn activate(
        &self,
        scenario: &ChaosScenario,
        env: &Environment,
    ) -> Result<Box<dyn ActiveFault>, InjectorError> {
        let (first, second) = cascade_targets(scenario);
        let fatal = scenario.severity == Severity::Critical;
        let progress = Arc::new(Mutex::new(CascadeProgress::default()));

        let id = env.dependencies().fail(&first, fatal, None);
        lock(&progress).failed.push((first.clone(), id));
        tracing::info!(scenario = %scenario.name, stage = 1, service = %first, "Cascade stage");

        let stages = {
            let env = env.clone();
            let progress = Arc::clone(&progress);
            let (second_after, broad_after) = (self.second_after, self.broad_after);
            let scenario = scenario.name.clone();
            tokio::spawn(async move {
                tokio::time::sleep(second_after).await;
                {
                    let mut p = lock(&progress);
                    let id = env.dependencies().fail(&second, fatal, None);
                    p.failed.push((second.clone(), id));
                }
                tracing::info!(%scenario, stage = 2, service = %second, "Cascade stage");

                tokio::time::sleep(broad_after).await;
                {
                    let mut p = lock(&progress);
                    let id = env.network().route(
                        "*",
                        RouteAction::Fail {
                            status: BROAD_FAILURE_STATUS,
                        },
                    );
                    p.broad_route = Some(id);
                }
                tracing::info!(%scenario, stage = 3, "Cascade stage: broad failures");
            })
        };

        Ok(Box::new(Cascade { progress, stages }))
    }
}

#[async_trait]
impl ActiveFault for Cascade {
    fn footprint(&self) -> FaultFootprint {
        let p = lock(&self.progress);
        FaultFootprint::CascadingFailure {
            failed: p.failed.iter().map(|(s, _)| s.clone()).collect(),
            broad_failure: p.broad_route.is_some(),
        }
    }

    async fn cleanup(self: Box<Self>, env: &Environment) -> Result<(), CleanupError> {
        let Cascade { progress, stages } = *self;
        stages.abort();
        let outcome = stages.await;

        let p = std::mem::take(&mut *lock(&progress));
        for (service, id) in &p.failed {
            env.dependencies().restore(service, *id);
        }
        if let Some(id) = p.broad_route {
            env.network().unroute(id);
        }

        match outcome {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(CleanupError::new(
                "cascading-failure",
                format!("stage task failed: {e}"),
            )),
        }
    }
}
