//! Error types shared across faultline crates.

use serde::Serialize;
use thiserror::Error;

/// A failure caused on purpose by an active scenario.
///
/// These are expected by the test that scheduled the scenario; they are not
/// framework bugs.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InjectedFault {
    /// The environment is offline (network partition).
    #[error("network offline: request to {url} failed")]
    NetworkOffline {
        /// Target URL of the dropped request.
        url: String,
    },

    /// The request matched an abort route.
    #[error("request to {url} aborted by route {pattern}")]
    Aborted {
        /// Target URL of the aborted request.
        url: String,
        /// Route pattern that matched.
        pattern: String,
    },

    /// The request matched a failing route.
    #[error("request to {url} failed with status {status}")]
    Failed {
        /// Target URL of the failed request.
        url: String,
        /// Status code returned by the route.
        status: u16,
    },

    /// The target dependency is in an outage.
    #[error("service {service} unavailable (fatal: {fatal})")]
    ServiceUnavailable {
        /// Name of the failing dependency.
        service: String,
        /// Whether the outage is unrecoverable for the caller.
        fatal: bool,
    },
}

impl InjectedFault {
    /// Returns true if the fault should not be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { fatal: true, .. })
    }
}

/// Errors raised when a scenario definition is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScenarioError {
    /// Scenario name is empty.
    #[error("scenario name must not be empty")]
    EmptyName,

    /// Probability is outside [0, 1] or not a number.
    #[error("scenario {name}: probability {probability} is outside [0, 1]")]
    InvalidProbability {
        /// Scenario name.
        name: String,
        /// Offending probability.
        probability: f64,
    },

    /// Duration of zero would finalize the scenario before it acts.
    #[error("scenario {name}: duration must be greater than zero")]
    ZeroDuration {
        /// Scenario name.
        name: String,
    },

    /// A target service is listed more than once.
    #[error("scenario {name}: service {service} is listed more than once")]
    DuplicateService {
        /// Scenario name.
        name: String,
        /// Repeated service.
        service: String,
    },

    /// A scenario with the same name is already registered.
    #[error("scenario {0} is already registered")]
    Duplicate(String),
}
