//! Check a run file.

use anyhow::{Context, Result};
use chaos_engine::{InjectorRegistry, RunConfig};
use std::path::Path;

/// Run the validate command.
pub fn run(path: &Path) -> Result<()> {
    let config = RunConfig::from_file(path)?;
    config
        .validate()
        .with_context(|| format!("{} is not a usable run file", path.display()))?;

    let registry = InjectorRegistry::with_defaults();
    let unknown: Vec<&str> = config
        .scenarios
        .iter()
        .map(|s| s.injector_name())
        .filter(|name| !registry.contains(name))
        .collect();
    if !unknown.is_empty() {
        anyhow::bail!(
            "{}: no injector named {} (see `faultline injectors`)",
            path.display(),
            unknown.join(", ")
        );
    }

    println!("{}: OK", path.display());
    println!("  Scenarios: {}", config.scenarios.len());
    for scenario in &config.scenarios {
        println!(
            "    {} -> {} (p={}, {})",
            scenario.name,
            scenario.injector_name(),
            scenario.probability,
            scenario.severity
        );
    }
    println!("  Tick:      {} ms", config.engine.tick_interval_ms);
    println!("  Clients:   {}", config.workload.clients);

    Ok(())
}
