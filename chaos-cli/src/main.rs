//! # faultline
//!
//! Command-line front end for the chaos engine.
//!
//! ## Commands
//!
//! - `run`: Run scenarios against the simulated environment and print a JSON report
//! - `validate`: Check a run file without running it
//! - `injectors`: List the available fault injectors
//!
//! ## Example
//!
//! ```bash
//! # Check the run file
//! faultline validate --config chaos.toml
//!
//! # Run for 60 seconds with a fixed seed
//! faultline run --config chaos.toml --duration 60 --seed 42 > report.json
//!
//! # More detail on stderr
//! RUST_LOG=debug faultline run --config chaos.toml
//! ```
//!
//! `run` exits non-zero when any verification check fails.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{injectors, run, validate};

/// Resilience-verification harness.
#[derive(Parser, Debug)]
#[command(name = "faultline")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the configured scenarios and workload, then verify
    Run {
        /// Run file (TOML)
        #[arg(long, short)]
        config: PathBuf,

        /// Run length in seconds (overrides [workload].duration_secs)
        #[arg(long, short)]
        duration: Option<u64>,

        /// Seed for a reproducible run (overrides [engine].seed)
        #[arg(long)]
        seed: Option<u64>,

        /// Write the report here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Check a run file without running it
    Validate {
        /// Run file (TOML)
        #[arg(long, short)]
        config: PathBuf,
    },

    /// List the available fault injectors
    Injectors {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so reports on stdout stay machine-readable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            config,
            duration,
            seed,
            output,
        } => {
            run::run(&config, duration, seed, output.as_deref()).await?;
        }
        Commands::Validate { config } => {
            validate::run(&config)?;
        }
        Commands::Injectors { json } => {
            injectors::run(json)?;
        }
    }

    Ok(())
}
