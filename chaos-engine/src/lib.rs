//! # chaos-engine
//!
//! Chaos scheduler, fault injectors and the environment they act on.
//!
//! The pieces, leaf-first:
//! - [`environment`] - request interception, dependencies, clock and storage
//! - [`injectors`] - one [`FaultInjector`] per fault kind
//! - [`ChaosEngine`] - probabilistic scheduler with timed cleanup and metrics
//! - [`Workload`] - simulated clients using the resilience primitives
//! - [`verify`] - pass/fail checks over a finished run
//! - [`ChaosRun`] - all of the above assembled from a [`RunConfig`]
//!
//! # Example
//!
//! ```ignore
//! let env = Environment::new();
//! let engine = ChaosEngine::new(EngineConfig::default());
//! engine.add_scenario(
//!     ChaosScenario::new("service-outage", 0.2, Severity::High)
//!         .affecting("database")
//!         .with_duration(Duration::from_secs(5)),
//! )?;
//! engine.start(&env).await?;
//! // ... drive traffic ...
//! engine.stop(&env).await;
//! println!("{:?}", engine.metrics());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod engine;
pub mod environment;
mod error;
pub mod injectors;
mod session;
pub mod verify;
mod workload;

pub use config::{
    BackoffSection, BreakerSection, ConfigError, EngineSection, PoolSection, RunConfig,
    VerificationSection, WorkloadSection,
};
pub use engine::{ChaosEngine, EngineConfig};
pub use environment::{Environment, Request, Response};
pub use error::{CleanupError, EngineError, InjectorError, RunError};
pub use injectors::{ActiveFault, FaultFootprint, FaultInjector, InjectorRegistry};
pub use session::{ChaosRun, RunReport};
pub use verify::{AssertionResult, VerificationConfig};
pub use workload::{RequestOutcome, RunningWorkload, Workload, WorkloadConfig, WorkloadReport};

/// Current time on the tokio clock, as a std `Instant` for the core machines.
pub(crate) fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}
