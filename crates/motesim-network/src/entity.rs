//! Radio-capable entities and their per-run histories.

use motesim_common::{DevEui, EnvironmentId, GridPos, SimTime, TransmissionId};
use motesim_radio::SignalWindow;
use serde::Serialize;
use std::collections::HashMap;

/// A transmission as recorded by one receiver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reception {
    /// The received transmission.
    pub transmission: TransmissionId,
    /// Power at the receiver in dBm.
    pub received_power_dbm: f64,
    /// Received but lost to interference.
    pub collision: bool,
}

/// Everything an entity sent and received during one run.
#[derive(Debug, Clone, Default)]
pub struct RunHistory {
    sent: Vec<TransmissionId>,
    received: Vec<Reception>,
    received_index: HashMap<TransmissionId, usize>,
    power_settings: Vec<(SimTime, i32)>,
}

impl RunHistory {
    /// Transmissions sent, in order.
    pub fn sent(&self) -> &[TransmissionId] {
        &self.sent
    }

    /// Receptions, in arrival order.
    pub fn received(&self) -> &[Reception] {
        &self.received
    }

    /// Look up the reception of a given transmission.
    pub fn reception(&self, id: TransmissionId) -> Option<&Reception> {
        self.received_index.get(&id).map(|&idx| &self.received[idx])
    }

    /// Power in effect at each send, aligned with [`RunHistory::sent`].
    pub fn power_settings(&self) -> &[(SimTime, i32)] {
        &self.power_settings
    }

    fn record_sent(&mut self, id: TransmissionId, at: SimTime, tx_power_dbm: i32) {
        self.sent.push(id);
        self.power_settings.push((at, tx_power_dbm));
    }

    fn record_reception(&mut self, reception: Reception) {
        self.received_index.insert(reception.transmission, self.received.len());
        self.received.push(reception);
    }

    fn mark_collision(&mut self, id: TransmissionId) {
        if let Some(&idx) = self.received_index.get(&id) {
            self.received[idx].collision = true;
        }
    }
}

/// State shared by motes and gateways.
#[derive(Debug, Clone)]
pub struct EntityCore {
    eui: DevEui,
    position: GridPos,
    initial_position: GridPos,
    tx_power_dbm: i32,
    spreading_factor: u8,
    environment: Option<EnvironmentId>,
    runs: Vec<RunHistory>,
    /// Signals still on the air at this receiver.
    active_receptions: Vec<SignalWindow>,
}

impl EntityCore {
    /// Create the core of an entity with one empty run slot.
    pub fn new(eui: DevEui, position: GridPos, tx_power_dbm: i32, spreading_factor: u8) -> Self {
        EntityCore {
            eui,
            position,
            initial_position: position,
            tx_power_dbm,
            spreading_factor,
            environment: None,
            runs: vec![RunHistory::default()],
            active_receptions: Vec::new(),
        }
    }

    pub fn eui(&self) -> DevEui {
        self.eui
    }

    pub fn position(&self) -> GridPos {
        self.position
    }

    /// Position the entity had when it was created.
    pub fn initial_position(&self) -> GridPos {
        self.initial_position
    }

    pub fn set_position(&mut self, position: GridPos) {
        self.position = position;
    }

    pub fn tx_power_dbm(&self) -> i32 {
        self.tx_power_dbm
    }

    pub fn set_tx_power_dbm(&mut self, tx_power_dbm: i32) {
        self.tx_power_dbm = tx_power_dbm;
    }

    pub fn spreading_factor(&self) -> u8 {
        self.spreading_factor
    }

    pub fn set_spreading_factor(&mut self, spreading_factor: u8) {
        self.spreading_factor = spreading_factor;
    }

    /// Environment this entity is registered with.
    pub fn environment(&self) -> Option<EnvironmentId> {
        self.environment
    }

    /// Number of run slots held.
    pub fn number_of_runs(&self) -> usize {
        self.runs.len()
    }

    /// History of a given run.
    pub fn history(&self, run: usize) -> Option<&RunHistory> {
        self.runs.get(run)
    }

    /// Sent transmissions of a run, empty when the run does not exist.
    pub fn sent_transmissions(&self, run: usize) -> &[TransmissionId] {
        self.runs.get(run).map(RunHistory::sent).unwrap_or(&[])
    }

    /// Receptions of a run, empty when the run does not exist.
    pub fn received_transmissions(&self, run: usize) -> &[Reception] {
        self.runs.get(run).map(RunHistory::received).unwrap_or(&[])
    }

    /// Power settings of a run, empty when the run does not exist.
    pub fn power_setting_history(&self, run: usize) -> &[(SimTime, i32)] {
        self.runs.get(run).map(RunHistory::power_settings).unwrap_or(&[])
    }

    pub(crate) fn attach(&mut self, environment: EnvironmentId, runs: usize) {
        self.environment = Some(environment);
        self.ensure_runs(runs);
    }

    pub(crate) fn ensure_runs(&mut self, runs: usize) {
        while self.runs.len() < runs {
            self.runs.push(RunHistory::default());
        }
    }

    pub(crate) fn record_sent(&mut self, run: usize, id: TransmissionId, at: SimTime, tx_power_dbm: i32) {
        self.ensure_runs(run + 1);
        self.runs[run].record_sent(id, at, tx_power_dbm);
    }

    pub(crate) fn record_reception(&mut self, run: usize, reception: Reception) {
        self.ensure_runs(run + 1);
        self.runs[run].record_reception(reception);
    }

    pub(crate) fn mark_collision(&mut self, run: usize, id: TransmissionId) {
        if let Some(history) = self.runs.get_mut(run) {
            history.mark_collision(id);
        }
    }

    /// Drop signals that ended before `now` and return the ones still on the air.
    pub(crate) fn active_receptions(&mut self, now: SimTime) -> &[SignalWindow] {
        self.active_receptions.retain(|s| s.end_time > now);
        &self.active_receptions
    }

    pub(crate) fn push_active_reception(&mut self, signal: SignalWindow) {
        self.active_receptions.push(signal);
    }

    /// Start a new run slot and return to the initial position.
    pub(crate) fn begin_run(&mut self) {
        self.runs.push(RunHistory::default());
        self.position = self.initial_position;
        self.active_receptions.clear();
    }

    /// Drop every history and return to the initial position.
    pub(crate) fn reset(&mut self) {
        self.runs.clear();
        self.runs.push(RunHistory::default());
        self.position = self.initial_position;
        self.active_receptions.clear();
    }
}

/// Entity kind, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Mote,
    Gateway,
}

/// Base trait for all radio-capable entities.
pub trait NetworkEntity: Send {
    fn core(&self) -> &EntityCore;

    fn core_mut(&mut self) -> &mut EntityCore;

    fn kind(&self) -> EntityKind;

    /// Prepare for the next run, keeping prior histories.
    fn begin_run(&mut self) {
        self.core_mut().begin_run();
    }

    /// Clear all histories, keeping identity and configuration.
    fn reset(&mut self) {
        self.core_mut().reset();
    }

    fn eui(&self) -> DevEui {
        self.core().eui()
    }

    fn position(&self) -> GridPos {
        self.core().position()
    }

    fn tx_power_dbm(&self) -> i32 {
        self.core().tx_power_dbm()
    }

    fn spreading_factor(&self) -> u8 {
        self.core().spreading_factor()
    }

    fn environment(&self) -> Option<EnvironmentId> {
        self.core().environment()
    }
}
