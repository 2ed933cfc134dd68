//! Run scenarios and print the report.

use anyhow::{Context, Result};
use chaos_engine::{ChaosRun, RunConfig};
use std::path::Path;
use std::time::Duration;

/// Run the run command.
///
/// Fails after writing the report if any verification check failed.
pub async fn run(
    path: &Path,
    duration_secs: Option<u64>,
    seed: Option<u64>,
    output: Option<&Path>,
) -> Result<()> {
    let mut config = RunConfig::from_file(path)?;
    if seed.is_some() {
        config.engine.seed = seed;
    }
    let duration = duration_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.workload.duration());

    let chaos = ChaosRun::from_config(config)
        .with_context(|| format!("Failed to set up run from {}", path.display()))?;
    let report = chaos.run(duration).await.context("Chaos run failed")?;

    let json = serde_json::to_string_pretty(&report).context("Failed to encode report")?;
    match output {
        Some(out) => {
            std::fs::write(out, json + "\n")
                .with_context(|| format!("Failed to write report to {}", out.display()))?;
            tracing::info!(path = %out.display(), "Report written");
        }
        None => println!("{json}"),
    }

    if !report.passed {
        let failed = report.assertions.iter().filter(|a| !a.passed).count();
        anyhow::bail!("{failed} verification check(s) failed");
    }
    Ok(())
}
