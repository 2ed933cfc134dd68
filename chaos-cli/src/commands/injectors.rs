//! List fault injectors.

use anyhow::Result;
use chaos_engine::InjectorRegistry;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct InjectorInfo {
    name: &'static str,
    description: &'static str,
}

/// Run the injectors command.
pub fn run(json: bool) -> Result<()> {
    let registry = InjectorRegistry::with_defaults();
    let infos: Vec<InjectorInfo> = registry
        .iter()
        .map(|i| InjectorInfo {
            name: i.name(),
            description: i.description(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    let width = infos.iter().map(|i| i.name.len()).max().unwrap_or(0);
    for info in &infos {
        println!("{:width$}  {}", info.name, info.description, width = width);
    }
    Ok(())
}
