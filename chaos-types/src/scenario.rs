//! Scenario definitions.

use crate::error::ScenarioError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How hard a scenario hits the environment.
///
/// Injectors scale their intensity (latency, memory, workers, skew) by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Minor degradation.
    Low,
    /// Noticeable degradation.
    Medium,
    /// Severe degradation.
    High,
    /// Worst case; outages become fatal.
    Critical,
}

impl Severity {
    /// All severities, mildest first.
    pub const ALL: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Lowercase name as used in scenario files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, probability-gated fault definition.
///
/// Scenarios are immutable once registered with the engine; the engine keeps
/// its own shared copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChaosScenario {
    /// Unique key; also the default injector name.
    pub name: String,
    /// Per-tick activation probability in [0, 1].
    pub probability: f64,
    /// How long the fault stays active before automatic cleanup.
    #[serde(
        rename = "duration_ms",
        default,
        with = "crate::serde_ms::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,
    /// Intensity of the injected fault.
    pub severity: Severity,
    /// Minimum quiet time after cleanup before the scenario may fire again.
    #[serde(
        rename = "cooldown_ms",
        default,
        with = "crate::serde_ms::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub cooldown: Option<Duration>,
    /// Target service names (dependencies, route patterns), in declaration
    /// order. Staged injectors hit them in this order.
    #[serde(default)]
    pub affected_services: Vec<String>,
    /// Injector to dispatch to, when it differs from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injector: Option<String>,
}

impl ChaosScenario {
    /// Create a scenario with no duration, cooldown or targets.
    pub fn new(name: impl Into<String>, probability: f64, severity: Severity) -> Self {
        Self {
            name: name.into(),
            probability,
            duration: None,
            severity,
            cooldown: None,
            affected_services: Vec::new(),
            injector: None,
        }
    }

    /// Set the active duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Set the cooldown after cleanup.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    /// Add a target service. Naming one twice keeps the first position.
    pub fn affecting(mut self, service: impl Into<String>) -> Self {
        let service = service.into();
        if !self.affected_services.contains(&service) {
            self.affected_services.push(service);
        }
        self
    }

    /// Dispatch to a differently-named injector.
    pub fn with_injector(mut self, injector: impl Into<String>) -> Self {
        self.injector = Some(injector.into());
        self
    }

    /// Name of the injector this scenario dispatches to.
    pub fn injector_name(&self) -> &str {
        self.injector.as_deref().unwrap_or(&self.name)
    }

    /// Check the definition before registration.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.name.trim().is_empty() {
            return Err(ScenarioError::EmptyName);
        }
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(ScenarioError::InvalidProbability {
                name: self.name.clone(),
                probability: self.probability,
            });
        }
        if self.duration == Some(Duration::ZERO) {
            return Err(ScenarioError::ZeroDuration {
                name: self.name.clone(),
            });
        }
        for (i, service) in self.affected_services.iter().enumerate() {
            if self.affected_services[..i].contains(service) {
                return Err(ScenarioError::DuplicateService {
                    name: self.name.clone(),
                    service: service.clone(),
                });
            }
        }
        Ok(())
    }
}
