//! Motes: mobile, energy-bounded sensor nodes.

use crate::entity::{EntityCore, EntityKind, NetworkEntity};
use motesim_common::{DevEui, GridPos};
use serde::{Deserialize, Serialize};

// ============================================================================
// Energy
// ============================================================================

/// Remaining energy of a mote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Energy {
    /// Never runs out.
    Unlimited,
    /// Whole energy units left.
    Units(u32),
}

impl Energy {
    /// Interpret a signed level where any negative value means unlimited.
    pub fn from_level(level: i64) -> Self {
        if level < 0 {
            Energy::Unlimited
        } else {
            Energy::Units(level.min(u32::MAX as i64) as u32)
        }
    }

    /// Units left, or `None` when unlimited.
    pub fn units(&self) -> Option<u32> {
        match self {
            Energy::Unlimited => None,
            Energy::Units(units) => Some(*units),
        }
    }
}

// ============================================================================
// Sensors and MAC commands
// ============================================================================

/// Sensor mounted on a mote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoteSensor {
    Soot,
    Ozone,
    CarbonDioxide,
    ParticulateMatter,
    Gps,
}

/// LoRaWAN MAC commands a mote can piggyback on an uplink.
///
/// Commands are serialized in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MacCommand {
    LinkCheckReq,
    LinkAdrAns,
    DutyCycleAns,
    RxParamSetupAns,
    DevStatusAns,
    NewChannelAns,
    RxTimingSetupAns,
}

// ============================================================================
// Sampling
// ============================================================================

/// Tick-counted sampling cadence.
///
/// Starts at the start offset when that is positive, otherwise at the period.
/// Every call to [`Countdown::tick`] decrements it; reaching zero fires and
/// rearms at the period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    period: u32,
    remaining: u32,
}

impl Countdown {
    pub fn new(period: u32, start_offset: u32) -> Self {
        let remaining = if start_offset > 0 { start_offset } else { period };
        Countdown { period, remaining }
    }

    /// Advance by one pass. Returns true when it is time to sample.
    pub fn tick(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.remaining = self.period;
            true
        } else {
            false
        }
    }

    /// Passes left until the next sample.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn period(&self) -> u32 {
        self.period
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Last observed link statistics of a mote. Cleared at run boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MoteMetrics {
    /// Strongest of each gateway's most recent reception from this mote in
    /// the current run, in dBm. A gateway that missed the latest uplink
    /// contributes an older one.
    pub highest_received_signal: Option<f64>,
    /// Distance to the closest gateway, in metres.
    pub shortest_distance_to_gateway: Option<f64>,
    /// Packet loss ratio of the current run.
    pub packet_loss: Option<f64>,
}

// ============================================================================
// Mote
// ============================================================================

/// Default sampling period in passes.
pub const DEFAULT_SAMPLING_RATE: u32 = 10;

/// Default movement speed.
pub const DEFAULT_MOVEMENT_SPEED: f64 = 1.0;

/// Default energy level.
pub const DEFAULT_ENERGY_UNITS: u32 = 100;

/// A mobile sensor node.
#[derive(Debug, Clone)]
pub struct Mote {
    core: EntityCore,
    sensors: Vec<MoteSensor>,
    path: Vec<GridPos>,
    energy: Energy,
    initial_energy: Energy,
    energy_buffer: f64,
    sampling_rate: u32,
    countdown: Countdown,
    movement_speed: f64,
    start_offset: u32,
    used_energy: Vec<Vec<f64>>,
    sent_packets: usize,
    lost_packets: usize,
    metrics: MoteMetrics,
}

impl Mote {
    /// Create a mote with default sampling, speed and energy.
    pub fn new(eui: DevEui, position: GridPos, tx_power_dbm: i32, spreading_factor: u8) -> Self {
        Mote {
            core: EntityCore::new(eui, position, tx_power_dbm, spreading_factor),
            sensors: Vec::new(),
            path: Vec::new(),
            energy: Energy::Units(DEFAULT_ENERGY_UNITS),
            initial_energy: Energy::Units(DEFAULT_ENERGY_UNITS),
            energy_buffer: 0.0,
            sampling_rate: DEFAULT_SAMPLING_RATE,
            countdown: Countdown::new(DEFAULT_SAMPLING_RATE, 0),
            movement_speed: DEFAULT_MOVEMENT_SPEED,
            start_offset: 0,
            used_energy: vec![Vec::new()],
            sent_packets: 0,
            lost_packets: 0,
            metrics: MoteMetrics::default(),
        }
    }

    pub fn with_energy(mut self, energy: Energy) -> Self {
        self.energy = energy;
        self.initial_energy = energy;
        self
    }

    pub fn with_sensors(mut self, sensors: Vec<MoteSensor>) -> Self {
        self.sensors = sensors;
        self
    }

    pub fn with_path(mut self, path: Vec<GridPos>) -> Self {
        self.path = path;
        self
    }

    pub fn with_sampling(mut self, sampling_rate: u32, start_offset: u32) -> Self {
        self.sampling_rate = sampling_rate;
        self.start_offset = start_offset;
        self.countdown = Countdown::new(sampling_rate, start_offset);
        self
    }

    pub fn with_movement_speed(mut self, movement_speed: f64) -> Self {
        self.movement_speed = movement_speed;
        self
    }

    pub fn sensors(&self) -> &[MoteSensor] {
        &self.sensors
    }

    /// Waypoints of the cyclic movement path.
    pub fn path(&self) -> &[GridPos] {
        &self.path
    }

    pub fn set_path(&mut self, path: Vec<GridPos>) {
        self.path = path;
    }

    pub fn energy(&self) -> Energy {
        self.energy
    }

    pub fn set_energy(&mut self, energy: Energy) {
        self.energy = energy;
    }

    /// Fractional energy not yet deducted.
    pub fn energy_buffer(&self) -> f64 {
        self.energy_buffer
    }

    pub fn has_energy(&self) -> bool {
        match self.energy {
            Energy::Unlimited => true,
            Energy::Units(units) => units > 0,
        }
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    /// Change the sampling period and rearm the countdown with it.
    pub fn set_sampling_rate(&mut self, sampling_rate: u32) {
        self.sampling_rate = sampling_rate;
        self.countdown = Countdown::new(sampling_rate, 0);
    }

    pub fn start_offset(&self) -> u32 {
        self.start_offset
    }

    pub fn movement_speed(&self) -> f64 {
        self.movement_speed
    }

    pub fn set_movement_speed(&mut self, movement_speed: f64) {
        self.movement_speed = movement_speed;
    }

    pub fn set_tx_power_dbm(&mut self, tx_power_dbm: i32) {
        self.core.set_tx_power_dbm(tx_power_dbm);
    }

    /// Advance the sampling countdown by one pass.
    pub fn should_send(&mut self) -> bool {
        self.countdown.tick()
    }

    /// Move one unit towards `target` along the axis with the larger
    /// remaining distance. Returns true once the target is reached.
    pub fn step_towards(&mut self, target: GridPos) -> bool {
        let mut pos = self.core.position();
        let dx = target.x - pos.x;
        let dy = target.y - pos.y;
        if dx != 0 && dx.abs() >= dy.abs() {
            pos.x += dx.signum();
        } else if dy != 0 {
            pos.y += dy.signum();
        }
        self.core.set_position(pos);
        pos == target
    }

    /// Deduct consumed energy in joules.
    ///
    /// Sub-unit amounts accumulate until a whole unit can be taken. The level
    /// never drops below zero. Non-positive amounts and unlimited motes are
    /// left untouched.
    pub fn consume_energy(&mut self, joules: f64) {
        let Energy::Units(units) = self.energy else {
            return;
        };
        if joules <= 0.0 || !joules.is_finite() {
            return;
        }

        self.energy_buffer += joules;
        let whole = self.energy_buffer.floor();
        if whole < 1.0 {
            return;
        }

        let deducted = whole.min(u32::MAX as f64) as u32;
        self.energy = Energy::Units(units.saturating_sub(deducted));
        self.energy_buffer -= whole;
    }

    /// Energy spent per transmission in a run.
    pub fn used_energy(&self, run: usize) -> Option<&[f64]> {
        self.used_energy.get(run).map(Vec::as_slice)
    }

    pub(crate) fn record_energy_usage(&mut self, run: usize, joules: f64) {
        while self.used_energy.len() <= run {
            self.used_energy.push(Vec::new());
        }
        self.used_energy[run].push(joules);
    }

    /// Packets sent in the current run.
    pub fn sent_packets(&self) -> usize {
        self.sent_packets
    }

    /// Packets lost as of the last packet loss calculation.
    pub fn lost_packets(&self) -> usize {
        self.lost_packets
    }

    pub(crate) fn note_sent(&mut self) {
        self.sent_packets += 1;
    }

    pub(crate) fn set_packet_counts(&mut self, sent: usize, lost: usize) {
        self.sent_packets = sent;
        self.lost_packets = lost;
    }

    pub fn metrics(&self) -> &MoteMetrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut MoteMetrics {
        &mut self.metrics
    }

    pub(crate) fn attach_runs(&mut self, runs: usize) {
        while self.used_energy.len() < runs {
            self.used_energy.push(Vec::new());
        }
    }

    /// Restore the state a run starts from.
    fn restart(&mut self) {
        self.energy = self.initial_energy;
        self.energy_buffer = 0.0;
        self.countdown = Countdown::new(self.sampling_rate, self.start_offset);
        self.sent_packets = 0;
        self.lost_packets = 0;
        self.metrics = MoteMetrics::default();
    }
}

impl NetworkEntity for Mote {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Mote
    }

    fn begin_run(&mut self) {
        self.core.begin_run();
        self.used_energy.push(Vec::new());
        self.restart();
    }

    fn reset(&mut self) {
        self.core.reset();
        self.used_energy = vec![Vec::new()];
        self.restart();
    }
}
