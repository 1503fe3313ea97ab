//! # motesim-radio
//!
//! LoRa radio approximations for MoteSim.
//!
//! This crate provides:
//! - Radio parameter configuration ([`RadioParams`])
//! - Configurable PHY parameters ([`LoraPhyConfig`])
//! - Time on air ([`calculate_time_on_air`])
//! - Terrain classes and log-distance path loss ([`Terrain`], [`received_power_dbm`])
//! - Collision resolution with capture effect ([`resolve_collision`])
//! - Transmission energy cost ([`transmission_energy`])

use motesim_common::SimTime;
use rand::Rng;
use serde::{Deserialize, Serialize};

// ============================================================================
// Radio Parameters
// ============================================================================

/// LoRa radio parameters of a single transmission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadioParams {
    /// Bandwidth in Hz.
    pub bandwidth_hz: u32,
    /// Spreading factor (7-12).
    pub spreading_factor: u8,
    /// Coding rate (5-8, representing 4/5 to 4/8).
    pub coding_rate: u8,
    /// Transmit power in dBm.
    pub tx_power_dbm: i32,
}

impl RadioParams {
    /// Default uplink bandwidth.
    pub const DEFAULT_BANDWIDTH_HZ: u32 = 125_000;
    /// Default coding rate (4/5).
    pub const DEFAULT_CODING_RATE: u8 = 5;

    /// Parameters for an uplink at the given power and spreading factor.
    pub fn uplink(tx_power_dbm: i32, spreading_factor: u8) -> Self {
        RadioParams {
            bandwidth_hz: Self::DEFAULT_BANDWIDTH_HZ,
            spreading_factor,
            coding_rate: Self::DEFAULT_CODING_RATE,
            tx_power_dbm,
        }
    }

    /// Calculate time on air for a given payload length.
    pub fn time_on_air(&self, payload_len: usize) -> SimTime {
        calculate_time_on_air(self, payload_len)
    }
}

impl Default for RadioParams {
    fn default() -> Self {
        RadioParams::uplink(14, 12)
    }
}

// ============================================================================
// PHY Configuration
// ============================================================================

/// Configuration for LoRa PHY calculations.
///
/// Default sensitivities are SX1276 figures at 125 kHz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraPhyConfig {
    /// Number of preamble symbols.
    pub preamble_symbols: u32,
    /// Receiver sensitivity in dBm for spreading factors 7-12, indexed as [SF-7].
    pub sensitivity_dbm: [f64; 6],
    /// Minimum power separation for the stronger of two colliding signals to survive.
    pub capture_threshold_db: f64,
    /// Whether log-normal shadow fading is applied to received power.
    pub shadowing: bool,
}

impl LoraPhyConfig {
    /// Default preamble symbol count.
    pub const DEFAULT_PREAMBLE_SYMBOLS: u32 = 8;

    /// Default sensitivities for SF 7-12.
    pub const DEFAULT_SENSITIVITY_DBM: [f64; 6] = [-123.0, -126.0, -129.0, -132.0, -134.5, -137.0];

    /// Get the sensitivity floor for a given spreading factor.
    ///
    /// Spreading factors outside 7-12 are clamped to the nearest valid one.
    pub fn sensitivity(&self, spreading_factor: u8) -> f64 {
        let sf = spreading_factor.clamp(7, 12);
        self.sensitivity_dbm[(sf - 7) as usize]
    }

    /// Same configuration with shadow fading switched off.
    pub fn without_shadowing(mut self) -> Self {
        self.shadowing = false;
        self
    }
}

impl Default for LoraPhyConfig {
    fn default() -> Self {
        Self {
            preamble_symbols: Self::DEFAULT_PREAMBLE_SYMBOLS,
            sensitivity_dbm: Self::DEFAULT_SENSITIVITY_DBM,
            capture_threshold_db: CAPTURE_EFFECT_THRESHOLD_DB,
            shadowing: true,
        }
    }
}

// ============================================================================
// PHY Calculations
// ============================================================================

/// Calculate the time on air for a LoRa packet.
///
/// This function uses the default preamble symbols (8). For configurable
/// preamble, use [`calculate_time_on_air_with_config()`].
pub fn calculate_time_on_air(params: &RadioParams, payload_len: usize) -> SimTime {
    calculate_time_on_air_with_config(params, payload_len, &LoraPhyConfig::default())
}

/// Calculate the time on air for a LoRa packet with configurable PHY parameters.
///
/// Explicit header and payload CRC are assumed. Low data rate optimisation
/// kicks in when the symbol time exceeds 16 ms (SF11/SF12 at 125 kHz).
pub fn calculate_time_on_air_with_config(
    params: &RadioParams,
    payload_len: usize,
    config: &LoraPhyConfig,
) -> SimTime {
    let sf = params.spreading_factor as f64;
    let bw = params.bandwidth_hz.max(1) as f64;
    let cr = params.coding_rate as f64;

    // Symbol time in seconds
    let t_sym = 2.0_f64.powf(sf) / bw;
    let de = if t_sym > 0.016 { 1.0 } else { 0.0 };

    // Preamble symbols + 4.25 (sync word and start frame delimiter)
    let n_preamble = config.preamble_symbols as f64 + 4.25;

    let pl = payload_len as f64;
    let payload_symbols =
        8.0 + ((8.0 * pl - 4.0 * sf + 28.0 + 16.0) / (4.0 * (sf - 2.0 * de))).ceil().max(0.0) * cr;

    SimTime::from_secs((n_preamble + payload_symbols) * t_sym)
}

/// Energy drawn by one transmission, in joules.
///
/// Radiated power `10^((P-30)/10)` W held for the time on air.
pub fn transmission_energy(tx_power_dbm: i32, time_on_air: SimTime) -> f64 {
    let watts = 10f64.powf((tx_power_dbm as f64 - 30.0) / 10.0);
    watts * time_on_air.as_secs_f64()
}

// ============================================================================
// Propagation
// ============================================================================

/// Terrain classification of a map cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    /// Wooded area.
    Forest,
    /// Open field.
    Plain,
    /// Built-up area.
    City,
}

impl Terrain {
    /// All terrain classes in declaration order.
    pub const ALL: [Terrain; 3] = [Terrain::Forest, Terrain::Plain, Terrain::City];

    /// Log-distance path loss exponent.
    pub fn path_loss_exponent(&self) -> f64 {
        match self {
            Terrain::Forest => 2.5,
            Terrain::Plain => 2.0,
            Terrain::City => 3.0,
        }
    }

    /// Standard deviation of shadow fading in dB.
    pub fn shadow_fading_db(&self) -> f64 {
        match self {
            Terrain::Forest => 2.0,
            Terrain::Plain => 1.0,
            Terrain::City => 3.0,
        }
    }
}

/// Log-distance path loss with a 1 m reference distance.
///
/// Distances below the reference distance are treated as the reference
/// distance, so the loss is never negative.
pub fn path_loss_db(distance_m: f64, exponent: f64) -> f64 {
    10.0 * exponent * distance_m.max(1.0).log10()
}

/// Received power for a transmission at `tx_power_dbm` over `distance_m`.
pub fn received_power_dbm(tx_power_dbm: i32, distance_m: f64, exponent: f64, shadowing_db: f64) -> f64 {
    tx_power_dbm as f64 - path_loss_db(distance_m, exponent) + shadowing_db
}

/// Sample a value from a Gaussian (normal) distribution.
/// Uses the Box-Muller transform for deterministic simulation.
pub fn sample_gaussian<R: Rng>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return mean;
    }
    let u1: f64 = rng.gen();
    let u2: f64 = rng.gen();

    // Avoid log(0)
    let u1 = if u1 == 0.0 { f64::MIN_POSITIVE } else { u1 };

    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z0
}

// ============================================================================
// Collision Detection
// ============================================================================

/// Minimum power separation required for capture effect (in dB).
/// If one signal is at least this much stronger than another, it survives.
pub const CAPTURE_EFFECT_THRESHOLD_DB: f64 = 6.0;

/// A signal as seen by one receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalWindow {
    /// Caller-defined signal identifier.
    pub id: u64,
    /// Arrival time.
    pub start_time: SimTime,
    /// End of reception.
    pub end_time: SimTime,
    /// Spreading factor the signal was sent with.
    pub spreading_factor: u8,
    /// Received power in dBm.
    pub power_dbm: f64,
}

impl SignalWindow {
    /// Whether two signals occupy the channel at the same time.
    pub fn overlaps(&self, other: &SignalWindow) -> bool {
        self.start_time < other.end_time && self.end_time > other.start_time
    }

    /// Whether two signals interfere: same time window and same spreading factor.
    pub fn interferes_with(&self, other: &SignalWindow) -> bool {
        self.spreading_factor == other.spreading_factor && self.overlaps(other)
    }
}

/// Result of resolving an incoming signal against the active ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionOutcome {
    /// The incoming signal cannot be decoded.
    pub incoming_lost: bool,
    /// Identifiers of active signals destroyed by the incoming one.
    pub destroyed: Vec<u64>,
}

impl CollisionOutcome {
    /// True when no signal was affected.
    pub fn is_clean(&self) -> bool {
        !self.incoming_lost && self.destroyed.is_empty()
    }
}

/// Check an incoming signal against signals already being received.
///
/// Each interfering pair is judged on its own:
/// - If one signal is at least `capture_threshold_db` stronger, it survives (capture effect)
/// - Otherwise, both are destroyed
pub fn resolve_collision(
    incoming: &SignalWindow,
    active: &[SignalWindow],
    capture_threshold_db: f64,
) -> CollisionOutcome {
    let mut outcome = CollisionOutcome::default();
    for other in active {
        if !incoming.interferes_with(other) {
            continue;
        }

        let diff = incoming.power_dbm - other.power_dbm;
        if diff >= capture_threshold_db {
            outcome.destroyed.push(other.id);
        } else if diff <= -capture_threshold_db {
            outcome.incoming_lost = true;
        } else {
            outcome.incoming_lost = true;
            outcome.destroyed.push(other.id);
        }
    }
    outcome
}
