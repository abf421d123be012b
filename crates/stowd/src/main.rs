//! stowd: the Stowgrid scenario driver.
//!
//! Replays a facility scenario through the storage core and prints every
//! committed (bundle, pod) decision followed by a run summary.
//!
//! # Usage
//!
//! ```text
//! stowd run --scenario facility.toml --config stow.toml --seed 7 --json
//! stowd check-config --config stow.toml
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use stow_core::StowConfig;
use stowd::{Scenario, Simulation};
use stowgrid_scheduler::{Assignment, CommitListener};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "stowd", about = "Stowgrid storage scenario driver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a scenario through the storage allocators.
    Run {
        /// Scenario file (TOML).
        #[arg(long)]
        scenario: PathBuf,

        /// Storage configuration file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Random seed; overrides the scenario's seed.
        #[arg(long)]
        seed: Option<u64>,

        /// Print commits and the summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Validate a configuration file and print it normalized.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,stowd=debug,stowgrid=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            scenario,
            config,
            seed,
            json,
        } => run(scenario, config, seed, json),
        Command::CheckConfig { config } => check_config(config),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<StowConfig> {
    match path {
        Some(path) => StowConfig::from_file(path).with_context(|| format!("loading config {}", path.display())),
        None => Ok(StowConfig::default()),
    }
}

fn run(scenario_path: PathBuf, config_path: Option<PathBuf>, seed: Option<u64>, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path.as_ref())?;
    let scenario = Scenario::from_file(&scenario_path)?;
    let seed = seed.or(scenario.seed).unwrap_or(0);
    info!(scenario = %scenario_path.display(), seed, "replaying scenario");

    let listener: CommitListener = Box::new(move |assignment: &Assignment| print_commit(assignment, json));
    let mut sim = Simulation::new(&config, &scenario, seed, Some(listener))?;
    let summary = sim.run(&scenario)?;

    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!("---");
        println!("pods bound      {}", summary.pods_bound);
        println!("seeded bundles  {}", summary.seeded_bundles);
        println!("arrived         {}", summary.arrived);
        println!("committed       {}", summary.committed);
        println!("stored          {}", summary.stored);
        println!("pending         {}", summary.pending);
        println!("parked          {}", summary.parked);
        println!("class scans     {}", summary.total_scans);
        println!("recycled picks  {}", summary.recycled);
        println!("end time        {:.1}", summary.end_time);
    }
    if summary.pending > 0 {
        warn!(pending = summary.pending, "bundles left without a pod");
    }
    Ok(())
}

fn print_commit(assignment: &Assignment, json: bool) {
    if json {
        match serde_json::to_string(assignment) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "failed to encode commit"),
        }
    } else {
        println!(
            "{:>10.1}  {} -> {} (class {}, {} x {})",
            assignment.decided_at,
            assignment.bundle.id,
            assignment.pod,
            assignment.class,
            assignment.bundle.quantity,
            assignment.bundle.item.id,
        );
    }
}

fn check_config(path: PathBuf) -> anyhow::Result<()> {
    let config = load_config(Some(&path))?;
    info!(
        classes = config.item_storage.classes.class_count(),
        "configuration is valid"
    );
    print!("{}", config.to_toml_string()?);
    Ok(())
}
