//! Error types for the chaos engine.

use chaos_core::BackoffConfigError;
use chaos_types::ScenarioError;
use thiserror::Error;

/// A fault injector failed to activate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InjectorError {
    /// No injector is registered under this name.
    #[error("no fault injector named {0}")]
    UnknownInjector(String),

    /// The injector could not apply its fault.
    #[error("{injector} failed to activate: {reason}")]
    Activation {
        /// Injector name.
        injector: String,
        /// What went wrong.
        reason: String,
    },
}

/// An injector's cleanup step failed. Logged against the scenario, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{injector} cleanup failed: {reason}")]
pub struct CleanupError {
    /// Injector name.
    pub injector: String,
    /// What went wrong.
    pub reason: String,
}

impl CleanupError {
    /// Create a cleanup error.
    pub fn new(injector: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            injector: injector.into(),
            reason: reason.into(),
        }
    }
}

/// Engine lifecycle and registration errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// `start` was called on a running engine.
    #[error("chaos engine is already running")]
    AlreadyRunning,

    /// A scenario was rejected at registration.
    #[error("invalid scenario: {0}")]
    Scenario(#[from] ScenarioError),
}

/// A run could not be assembled or started.
#[derive(Debug, Error)]
pub enum RunError {
    /// The run configuration was rejected.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// The retry policy was rejected.
    #[error("invalid backoff configuration: {0}")]
    Backoff(#[from] BackoffConfigError),

    /// The engine refused to start or register a scenario.
    #[error(transparent)]
    Engine(#[from] EngineError),
}
