//! Run control for a simulation executing on a worker thread.
//!
//! The controller hands the environment to a dedicated loop thread and
//! shares it behind a lock. The loop holds the write lock for one pass at a
//! time, so queries between passes always see a consistent state. Status
//! polls only read atomics and never wait for a pass.

use crate::export::{MoteEnergyUsage, SimulationReport, StatusReport};
use crate::simulation::{SimulationLoop, DEFAULT_TICK};
use crate::ControlError;
use motesim_common::{DevEui, SimError, SimTime};
use motesim_model::{build_environment, build_scenario, ScenarioConfig};
use motesim_network::{AdaptationConfig, Environment, NetworkEntity};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Environment handle shared between the controller and the loop thread.
pub type SharedEnvironment = Arc<RwLock<Environment>>;

// ============================================================================
// Options
// ============================================================================

/// How the loop thread drives the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Simulated time per pass.
    pub tick: SimTime,
    /// Stop on its own after this many passes.
    pub max_ticks: Option<u64>,
    /// Power self-adaptation, disabled when `None`.
    pub adaptation: Option<AdaptationConfig>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            tick: DEFAULT_TICK,
            max_ticks: None,
            adaptation: None,
        }
    }
}

// ============================================================================
// Mote Selection
// ============================================================================

/// Identifies a mote by registry index or by EUI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoteSelector {
    Index(usize),
    Eui(DevEui),
}

impl MoteSelector {
    /// Build a selector from a query giving exactly one of index and EUI.
    pub fn from_query(id: Option<usize>, eui: Option<u64>) -> Result<Self, ControlError> {
        match (id, eui) {
            (Some(index), None) => Ok(MoteSelector::Index(index)),
            (None, Some(eui)) => Ok(MoteSelector::Eui(DevEui(eui))),
            (Some(_), Some(_)) => Err(ControlError::InvalidQuery(
                "give either a mote index or an EUI, not both".to_string(),
            )),
            (None, None) => Err(ControlError::InvalidQuery(
                "a mote index or an EUI is required".to_string(),
            )),
        }
    }

    fn resolve(&self, env: &Environment) -> Result<usize, ControlError> {
        match *self {
            MoteSelector::Index(index) if index < env.motes().len() => Ok(index),
            MoteSelector::Eui(eui) => env.find_mote(eui).ok_or(ControlError::MoteNotFound(*self)),
            MoteSelector::Index(_) => Err(ControlError::MoteNotFound(*self)),
        }
    }
}

impl std::fmt::Display for MoteSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MoteSelector::Index(index) => write!(f, "index {}", index),
            MoteSelector::Eui(eui) => write!(f, "EUI {}", eui),
        }
    }
}

// ============================================================================
// Shared State
// ============================================================================

struct SharedState {
    should_stop: AtomicBool,
    is_running: AtomicBool,
    current_run: AtomicUsize,
    mote_count: AtomicUsize,
    gateway_count: AtomicUsize,
    ticks: AtomicU64,
    environment: RwLock<Option<SharedEnvironment>>,
    options: Mutex<RunOptions>,
    worker: Mutex<Option<JoinHandle<Result<u64, SimError>>>>,
    created_at: Instant,
}

impl SharedState {
    fn publish_counts(&self, env: &Environment) {
        self.current_run.store(env.current_run(), Ordering::Release);
        self.mote_count.store(env.motes().len(), Ordering::Release);
        self.gateway_count.store(env.gateways().len(), Ordering::Release);
        self.ticks.store(env.ticks(), Ordering::Release);
    }
}

/// Clears the running flag when the loop thread ends, however it ends.
struct RunningGuard(Arc<SharedState>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.is_running.store(false, Ordering::Release);
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Starts, stops and inspects a simulation running on its own thread.
///
/// Cloning yields another handle to the same simulation.
#[derive(Clone)]
pub struct SimulationController {
    shared: Arc<SharedState>,
}

impl Default for SimulationController {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationController {
    pub fn new() -> Self {
        SimulationController {
            shared: Arc::new(SharedState {
                should_stop: AtomicBool::new(false),
                is_running: AtomicBool::new(false),
                current_run: AtomicUsize::new(0),
                mote_count: AtomicUsize::new(0),
                gateway_count: AtomicUsize::new(0),
                ticks: AtomicU64::new(0),
                environment: RwLock::new(None),
                options: Mutex::new(RunOptions::default()),
                worker: Mutex::new(None),
                created_at: Instant::now(),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running.load(Ordering::Acquire)
    }

    /// Build the environment of a scenario and install it.
    ///
    /// The scenario's adaptation settings replace the current ones.
    pub fn configure(&self, config: &ScenarioConfig) -> Result<(), ControlError> {
        if self.is_running() {
            return Err(ControlError::AlreadyRunning);
        }
        let built = build_scenario(config)?;
        self.shared.options.lock().adaptation = built.adaptation;
        self.install(built.environment)
    }

    /// Install a ready-made environment.
    pub fn install(&self, env: Environment) -> Result<(), ControlError> {
        if self.is_running() {
            return Err(ControlError::AlreadyRunning);
        }
        self.shared.publish_counts(&env);
        *self.shared.environment.write() = Some(Arc::new(RwLock::new(env)));
        info!("Environment installed");
        Ok(())
    }

    /// The installed environment, if any.
    pub fn environment(&self) -> Option<SharedEnvironment> {
        self.shared.environment.read().clone()
    }

    pub fn options(&self) -> RunOptions {
        self.shared.options.lock().clone()
    }

    /// Replace the run options used by the next start.
    pub fn set_options(&self, options: RunOptions) {
        *self.shared.options.lock() = options;
    }

    /// Launch the loop thread.
    ///
    /// Uses the installed environment, or the default scenario when none is
    /// installed. A run that already has history is followed by a new run.
    pub fn start(&self) -> Result<(), ControlError> {
        if self
            .shared
            .is_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ControlError::AlreadyRunning);
        }

        // Reap a previous worker that finished on its own.
        if let Some(previous) = self.shared.worker.lock().take() {
            match previous.join() {
                Ok(Ok(passes)) => debug!("Reaped previous loop after {} passes", passes),
                Ok(Err(e)) => warn!("Previous simulation loop failed: {}", e),
                Err(_) => warn!("Previous simulation loop panicked"),
            }
        }

        match self.launch() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.shared.is_running.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn launch(&self) -> Result<(), ControlError> {
        let env = match self.environment() {
            Some(env) => env,
            None => {
                info!("No environment configured, building the default scenario");
                let env = Arc::new(RwLock::new(build_environment(&ScenarioConfig::default())?));
                *self.shared.environment.write() = Some(env.clone());
                env
            }
        };

        {
            let mut guard = env.write();
            if guard.current_run_has_history() {
                guard.begin_new_run();
            }
            self.shared.publish_counts(&guard);
        }

        let options = self.options();
        self.shared.should_stop.store(false, Ordering::Release);

        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name("motesim-loop".to_string())
            .spawn(move || {
                let guard = RunningGuard(shared);
                let result = run_loop(&guard.0, &env, &options);
                if let Err(e) = &result {
                    warn!("Simulation loop failed: {}", e);
                }
                result
            })?;
        *self.shared.worker.lock() = Some(handle);
        info!("Simulation started");
        Ok(())
    }

    /// Ask the loop to stop after its current pass. No-op when idle.
    pub fn stop(&self) {
        if !self.is_running() {
            return;
        }
        self.shared.should_stop.store(true, Ordering::Release);
        debug!("Stop requested");
    }

    /// Wait for the loop thread to finish and return the passes it made.
    ///
    /// Returns zero when no loop was started.
    pub fn join(&self) -> Result<u64, ControlError> {
        let Some(handle) = self.shared.worker.lock().take() else {
            return Ok(0);
        };
        match handle.join() {
            Ok(result) => Ok(result?),
            Err(_) => Err(ControlError::LoopPanicked),
        }
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            is_running: self.is_running(),
            current_run: self.shared.current_run.load(Ordering::Acquire),
            mote_count: self.shared.mote_count.load(Ordering::Acquire),
            gateway_count: self.shared.gateway_count.load(Ordering::Acquire),
            ticks: self.shared.ticks.load(Ordering::Acquire),
            uptime_ms: self.shared.created_at.elapsed().as_millis() as u64,
        }
    }

    /// Energy spent by a mote's transmissions in a run, the current run by
    /// default.
    pub fn mote_energy_usage(&self, selector: MoteSelector, run: Option<usize>) -> Result<MoteEnergyUsage, ControlError> {
        let env = self.environment().ok_or(ControlError::NoEnvironment)?;
        let env = env.read();

        let index = selector.resolve(&env)?;
        let runs = env.number_of_runs();
        let run = run.unwrap_or(env.current_run());
        if run >= runs {
            return Err(ControlError::RunOutOfRange { run, runs });
        }

        let mote = &env.motes()[index];
        let transmission_energy = mote.used_energy(run).map(<[f64]>::to_vec).unwrap_or_default();
        let total_energy = transmission_energy.iter().sum();
        Ok(MoteEnergyUsage {
            eui: mote.eui(),
            run,
            transmission_energy,
            total_energy,
        })
    }

    /// Snapshot of the installed environment.
    pub fn report(&self) -> Result<SimulationReport, ControlError> {
        let env = self.environment().ok_or(ControlError::NoEnvironment)?;
        let env = env.read();
        Ok(SimulationReport::capture(&env)?)
    }
}

/// Body of the loop thread.
fn run_loop(shared: &SharedState, env: &SharedEnvironment, options: &RunOptions) -> Result<u64, SimError> {
    let mut sim = {
        let env = env.read();
        let sim = SimulationLoop::new(&env).with_tick(options.tick);
        match &options.adaptation {
            Some(config) => sim.with_adaptation(config.clone()),
            None => sim,
        }
    };

    loop {
        if shared.should_stop.load(Ordering::Acquire) {
            break;
        }
        if options.max_ticks.is_some_and(|max| sim.passes() >= max) {
            break;
        }

        let mut env = env.write();
        sim.step(&mut env)?;
        shared.ticks.store(env.ticks(), Ordering::Release);
    }

    info!("Simulation stopped after {} passes", sim.passes());
    Ok(sim.passes())
}
