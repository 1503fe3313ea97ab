//! # motesim
//!
//! CLI runner for MoteSim.
//!
//! This is the main entry point for running LPWAN mote simulations.

use clap::{ArgGroup, Args, Parser, Subcommand};
use motesim_model::{load_scenario, ScenarioConfig};
use motesim_network::AdaptationConfig;
use motesim_runner::{MoteSelector, RunOptions, RunnerError, SimulationController};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// CLI Configuration
// ============================================================================

/// MoteSim - LPWAN Mote Network Simulator
#[derive(Parser, Debug)]
#[command(name = "motesim")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a simulation and print the final state as JSON
    Run(RunConfig),
    /// Run a simulation, then report the transmission energy of one mote
    Energy(EnergyConfig),
    /// Print the default scenario configuration as YAML
    Defaults,
}

/// Configuration for the run command
#[derive(Args, Debug)]
pub struct RunConfig {
    /// Scenario file (YAML or JSON). The default layout is used when omitted.
    pub scenario: Option<PathBuf>,

    /// Stop after this many ticks. Runs until Ctrl-C when omitted.
    #[arg(long)]
    pub ticks: Option<u64>,

    /// Override the scenario's random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Enable transmission power self-adaptation with default settings
    /// when the scenario does not configure it
    #[arg(long)]
    pub adapt: bool,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Configuration for the energy command
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("mote").required(true).args(["id", "eui"])))]
pub struct EnergyConfig {
    /// Scenario file (YAML or JSON)
    pub scenario: PathBuf,

    /// Number of ticks to simulate before querying
    #[arg(long)]
    pub ticks: u64,

    /// Mote index in the environment
    #[arg(long)]
    pub id: Option<usize>,

    /// Mote EUI
    #[arg(long)]
    pub eui: Option<u64>,

    /// Run to report, the current run when omitted
    #[arg(long)]
    pub run: Option<usize>,

    /// Override the scenario's random seed
    #[arg(long)]
    pub seed: Option<u64>,
}

// ============================================================================
// Commands
// ============================================================================

fn load_config(path: Option<&Path>, seed: Option<u64>) -> Result<ScenarioConfig, RunnerError> {
    let mut config = match path {
        Some(path) => load_scenario(path)?,
        None => ScenarioConfig::default(),
    };
    if seed.is_some() {
        config.seed = seed;
    }
    Ok(config)
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<(), RunnerError> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn check_ticks(ticks: u64) -> Result<u64, RunnerError> {
    if ticks == 0 {
        return Err(RunnerError::ConfigError("--ticks must be positive".to_string()));
    }
    Ok(ticks)
}

fn run_simulation(config: RunConfig) -> Result<(), RunnerError> {
    if let Some(ticks) = config.ticks {
        check_ticks(ticks)?;
    }
    let mut scenario = load_config(config.scenario.as_deref(), config.seed)?;
    if config.adapt && scenario.adaptation.is_none() {
        scenario.adaptation = Some(AdaptationConfig::default());
    }

    let controller = SimulationController::new();
    controller.configure(&scenario)?;
    controller.set_options(RunOptions {
        max_ticks: config.ticks,
        ..controller.options()
    });

    let handler_controller = controller.clone();
    ctrlc::set_handler(move || {
        handler_controller.stop();
    })
    .expect("Error setting Ctrl+C handler");

    let status = controller.status();
    eprintln!(
        "Simulating {} motes and {} gateways{}",
        status.mote_count,
        status.gateway_count,
        match config.ticks {
            Some(ticks) => format!(" for {} ticks", ticks),
            None => " until Ctrl-C".to_string(),
        }
    );

    controller.start()?;
    let passes = controller.join()?;
    info!("Finished after {} passes", passes);

    let report = controller.report()?;
    write_json(&report, config.output.as_deref())
}

fn report_energy(config: EnergyConfig) -> Result<(), RunnerError> {
    let selector = MoteSelector::from_query(config.id, config.eui)?;
    let ticks = check_ticks(config.ticks)?;
    let scenario = load_config(Some(config.scenario.as_path()), config.seed)?;

    let controller = SimulationController::new();
    controller.configure(&scenario)?;
    controller.set_options(RunOptions {
        max_ticks: Some(ticks),
        ..controller.options()
    });
    controller.start()?;
    controller.join()?;

    let usage = controller.mote_energy_usage(selector, config.run)?;
    write_json(&usage, None)
}

fn print_defaults() -> Result<(), RunnerError> {
    let yaml = serde_yaml::to_string(&ScenarioConfig::documented_defaults())?;
    print!("{}", yaml);
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(config) => run_simulation(config),
        Commands::Energy(config) => report_energy(config),
        Commands::Defaults => print_defaults(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
