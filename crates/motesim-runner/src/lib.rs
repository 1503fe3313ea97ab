//! # motesim-runner library
//!
//! Library interface for the MoteSim runner.
//!
//! This crate re-exports the types needed to run simulations
//! programmatically and for integration testing:
//! - [`SimulationLoop`] drives an environment pass by pass
//! - [`SimulationController`] runs the loop on a worker thread with
//!   start/stop control, status and energy queries
//! - [`SimulationReport`] and friends are the serializable state export
//!
//! ## Threading
//!
//! The loop thread owns nothing but its cursors. The environment sits behind
//! a `parking_lot::RwLock` that the loop write-locks once per pass. Stopping
//! is cooperative: the loop polls an `AtomicBool` before each pass.

pub mod controller;
pub mod export;
pub mod simulation;

pub use controller::{MoteSelector, RunOptions, SharedEnvironment, SimulationController};
pub use export::{GatewayState, MoteEnergyUsage, MoteState, SimulationReport, StatusReport};
pub use motesim_common::SimTime;
pub use simulation::{MoteCursor, PassSummary, SimulationLoop, DEFAULT_TICK};

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors reported by the run control surface.
#[derive(Debug, Error)]
pub enum ControlError {
    /// A start or reconfiguration arrived while the loop was running.
    #[error("Simulation is already running")]
    AlreadyRunning,

    /// No environment has been configured or started yet.
    #[error("No environment available")]
    NoEnvironment,

    /// The selected mote does not exist.
    #[error("Mote not found: {0}")]
    MoteNotFound(MoteSelector),

    /// The requested run has not happened.
    #[error("Run {run} out of range (runs: {runs})")]
    RunOutOfRange { run: usize, runs: usize },

    /// A malformed query.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The loop thread panicked.
    #[error("Simulation loop panicked")]
    LoopPanicked,

    /// Model error.
    #[error("Model error: {0}")]
    Model(#[from] motesim_model::ModelError),

    /// Simulation error.
    #[error("Simulation error: {0}")]
    Simulation(#[from] motesim_common::SimError),

    /// The loop thread could not be spawned.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur in the runner binary.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Run control error.
    #[error(transparent)]
    Control(#[from] ControlError),

    /// Model error.
    #[error("Model error: {0}")]
    Model(#[from] motesim_model::ModelError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
