//! Scenario file schema.
//!
//! Field names are snake_case. The camelCase spellings used by older JSON
//! scenario files are accepted as aliases, and unknown fields are ignored.

use motesim_network::{AdaptationConfig, MoteSensor};
use serde::{Deserialize, Serialize};

/// How the environment is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioMode {
    /// Fixed hand-authored layout.
    Default,
    /// Random positions for a number of motes and gateways.
    Bulk,
    /// Explicit motes and gateways.
    Personalized,
}

/// How a personalized mote moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Static,
    SpecificPath,
    RandomWalk,
}

/// A waypoint in grid metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaypointConfig {
    pub x: i32,
    pub y: i32,
}

/// Top-level scenario description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Explicit mode. Inferred from the other fields when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ScenarioMode>,
    /// Seed for random placement and shadow fading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    // Bulk mode
    #[serde(alias = "numMotes", skip_serializing_if = "Option::is_none")]
    pub num_motes: Option<usize>,
    #[serde(alias = "numGateways", skip_serializing_if = "Option::is_none")]
    pub num_gateways: Option<usize>,
    #[serde(alias = "areaWidthMeters", skip_serializing_if = "Option::is_none")]
    pub area_width_meters: Option<u32>,
    #[serde(alias = "areaHeightMeters", skip_serializing_if = "Option::is_none")]
    pub area_height_meters: Option<u32>,

    // Defaults for entities that leave a field out
    #[serde(alias = "defaultEnergyLevel", skip_serializing_if = "Option::is_none")]
    pub default_energy_level: Option<i64>,
    #[serde(alias = "defaultSamplingRate", skip_serializing_if = "Option::is_none")]
    pub default_sampling_rate: Option<u32>,
    #[serde(alias = "defaultMovementSpeed", skip_serializing_if = "Option::is_none")]
    pub default_movement_speed: Option<f64>,
    #[serde(alias = "defaultStartOffset", skip_serializing_if = "Option::is_none")]
    pub default_start_offset: Option<u32>,
    #[serde(alias = "defaultTransmissionPower", skip_serializing_if = "Option::is_none")]
    pub default_transmission_power: Option<i32>,
    #[serde(alias = "defaultSpreadingFactor", skip_serializing_if = "Option::is_none")]
    pub default_spreading_factor: Option<u8>,

    // Personalized mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motes: Option<Vec<MoteConfig>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateways: Option<Vec<GatewayConfig>>,

    // Environment
    /// Apply log-normal shadow fading. Defaults to true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadowing: Option<bool>,
    /// Edge length of a terrain cell.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_size_meters: Option<u32>,
    /// Enables transmission power adaptation when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adaptation: Option<AdaptationConfig>,
}

/// One mote of a personalized scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoteConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eui: Option<u64>,
    #[serde(alias = "xPos", skip_serializing_if = "Option::is_none")]
    pub x_pos: Option<i32>,
    #[serde(alias = "yPos", skip_serializing_if = "Option::is_none")]
    pub y_pos: Option<i32>,
    #[serde(alias = "transmissionPower", skip_serializing_if = "Option::is_none")]
    pub transmission_power: Option<i32>,
    #[serde(alias = "spreadingFactor", skip_serializing_if = "Option::is_none")]
    pub spreading_factor: Option<u8>,
    #[serde(alias = "samplingRate", skip_serializing_if = "Option::is_none")]
    pub sampling_rate: Option<u32>,
    #[serde(alias = "movementSpeed", skip_serializing_if = "Option::is_none")]
    pub movement_speed: Option<f64>,
    #[serde(alias = "startOffset", skip_serializing_if = "Option::is_none")]
    pub start_offset: Option<u32>,
    #[serde(alias = "movementType", skip_serializing_if = "Option::is_none")]
    pub movement_type: Option<MovementType>,
    #[serde(alias = "waypointRadius", skip_serializing_if = "Option::is_none")]
    pub waypoint_radius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waypoints: Option<Vec<WaypointConfig>>,
    /// Negative means unlimited.
    #[serde(alias = "energyLevel", skip_serializing_if = "Option::is_none")]
    pub energy_level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensors: Option<Vec<MoteSensor>>,
}

/// One gateway of a personalized scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eui: Option<u64>,
    #[serde(alias = "xPos", skip_serializing_if = "Option::is_none")]
    pub x_pos: Option<i32>,
    #[serde(alias = "yPos", skip_serializing_if = "Option::is_none")]
    pub y_pos: Option<i32>,
    #[serde(alias = "transmissionPower", skip_serializing_if = "Option::is_none")]
    pub transmission_power: Option<i32>,
    #[serde(alias = "spreadingFactor", skip_serializing_if = "Option::is_none")]
    pub spreading_factor: Option<u8>,
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_TRANSMISSION_POWER: i32 = 14;
pub const DEFAULT_SPREADING_FACTOR: u8 = 12;
pub const DEFAULT_SAMPLING_RATE: u32 = 10;
pub const DEFAULT_MOVEMENT_SPEED: f64 = 1.0;
pub const DEFAULT_ENERGY_LEVEL: i64 = 100;
pub const DEFAULT_START_OFFSET: u32 = 0;
pub const DEFAULT_NUM_MOTES: usize = 3;
pub const DEFAULT_NUM_GATEWAYS: usize = 1;
pub const DEFAULT_AREA_METERS: u32 = 1000;
pub const DEFAULT_WAYPOINT_RADIUS: f64 = 100.0;
pub const DEFAULT_SEED: u64 = 0;

impl ScenarioConfig {
    /// Mode to build: explicit, or inferred from which fields are present.
    pub fn resolved_mode(&self) -> ScenarioMode {
        if let Some(mode) = self.mode {
            return mode;
        }
        if self.motes.is_some() || self.gateways.is_some() {
            ScenarioMode::Personalized
        } else if self.num_motes.is_some() || self.num_gateways.is_some() {
            ScenarioMode::Bulk
        } else {
            ScenarioMode::Default
        }
    }

    /// A bulk scenario with every default spelled out.
    pub fn documented_defaults() -> Self {
        ScenarioConfig {
            mode: Some(ScenarioMode::Bulk),
            seed: Some(DEFAULT_SEED),
            num_motes: Some(DEFAULT_NUM_MOTES),
            num_gateways: Some(DEFAULT_NUM_GATEWAYS),
            area_width_meters: Some(DEFAULT_AREA_METERS),
            area_height_meters: Some(DEFAULT_AREA_METERS),
            default_energy_level: Some(DEFAULT_ENERGY_LEVEL),
            default_sampling_rate: Some(DEFAULT_SAMPLING_RATE),
            default_movement_speed: Some(DEFAULT_MOVEMENT_SPEED),
            default_start_offset: Some(DEFAULT_START_OFFSET),
            default_transmission_power: Some(DEFAULT_TRANSMISSION_POWER),
            default_spreading_factor: Some(DEFAULT_SPREADING_FACTOR),
            motes: None,
            gateways: None,
            shadowing: Some(true),
            cell_size_meters: Some(motesim_network::terrain::DEFAULT_CELL_SIZE_M),
            adaptation: Some(AdaptationConfig::default()),
        }
    }

    pub(crate) fn transmission_power(&self) -> i32 {
        self.default_transmission_power.unwrap_or(DEFAULT_TRANSMISSION_POWER)
    }

    pub(crate) fn spreading_factor(&self) -> u8 {
        self.default_spreading_factor.unwrap_or(DEFAULT_SPREADING_FACTOR)
    }

    pub(crate) fn sampling_rate(&self) -> u32 {
        self.default_sampling_rate.unwrap_or(DEFAULT_SAMPLING_RATE)
    }

    pub(crate) fn movement_speed(&self) -> f64 {
        self.default_movement_speed.unwrap_or(DEFAULT_MOVEMENT_SPEED)
    }

    pub(crate) fn energy_level(&self) -> i64 {
        self.default_energy_level.unwrap_or(DEFAULT_ENERGY_LEVEL)
    }

    pub(crate) fn start_offset(&self) -> u32 {
        self.default_start_offset.unwrap_or(DEFAULT_START_OFFSET)
    }
}
