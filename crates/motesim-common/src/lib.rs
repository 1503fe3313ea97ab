//! # motesim-common
//!
//! Common types shared by the MoteSim crates.
//!
//! This crate provides core simulation primitives including:
//! - Time representation ([`SimTime`])
//! - Grid and geographic positions ([`GridPos`], [`GeoCoord`])
//! - Identifiers ([`DevEui`], [`TransmissionId`], [`EnvironmentId`])
//! - Error type shared by the engine ([`SimError`])

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Simulation errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// No entity with the given identifier is registered.
    #[error("Entity not found: {0}")]
    EntityNotFound(DevEui),

    /// Entity index outside the registry.
    #[error("Entity index {index} out of range (registered: {len})")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of registered entities.
        len: usize,
    },

    /// Run index at or beyond the number of runs.
    #[error("Run {run} out of range (runs: {runs})")]
    RunOutOfRange {
        /// Requested run.
        run: usize,
        /// Number of runs in the environment.
        runs: usize,
    },

    /// A parameter the engine cannot work with.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

// ============================================================================
// Time Types
// ============================================================================

/// Simulation time in microseconds since simulation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SimTime(u64);

impl SimTime {
    /// Zero time.
    pub const ZERO: SimTime = SimTime(0);

    /// Create from microseconds.
    pub const fn from_micros(us: u64) -> Self {
        SimTime(us)
    }

    /// Create from milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        SimTime(ms * 1000)
    }

    /// Create from seconds (float).
    pub fn from_secs(s: f64) -> Self {
        SimTime((s * 1_000_000.0) as u64)
    }

    /// Get as microseconds.
    pub fn as_micros(&self) -> u64 {
        self.0
    }

    /// Get as milliseconds.
    pub fn as_millis(&self) -> u64 {
        self.0 / 1000
    }

    /// Get as seconds (float).
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }
}

impl std::ops::Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Self) -> Self::Output {
        SimTime(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign for SimTime {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl std::ops::Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: Self) -> Self::Output {
        SimTime(self.0.saturating_sub(rhs.0))
    }
}

// ============================================================================
// Position Types
// ============================================================================

/// Integer position on the simulation grid. One unit is one metre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridPos {
    /// East-west coordinate.
    pub x: i32,
    /// North-south coordinate.
    pub y: i32,
}

impl GridPos {
    /// Create a new grid position.
    pub const fn new(x: i32, y: i32) -> Self {
        GridPos { x, y }
    }

    /// Euclidean distance in metres.
    pub fn distance_to(&self, other: &GridPos) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Chebyshev (king-move) distance.
    pub fn chebyshev_distance(&self, other: &GridPos) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// Manhattan distance.
    pub fn manhattan_distance(&self, other: &GridPos) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl std::fmt::Display for GridPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Geographic coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoord {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl GeoCoord {
    /// Mean length of one degree of latitude, in kilometres.
    pub const KM_PER_DEGREE: f64 = 111.32;

    /// Create a new coordinate.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        GeoCoord { latitude, longitude }
    }

    /// Calculate distance to another coordinate in meters.
    /// Uses the Haversine formula.
    pub fn distance_to(&self, other: &GeoCoord) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;

        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_M * c
    }

    /// Project this coordinate onto the grid whose origin is `origin`.
    ///
    /// The x axis follows the longitude difference along the origin's
    /// parallel and the y axis the latitude difference along its meridian.
    pub fn to_grid(&self, origin: &GeoCoord) -> GridPos {
        let x = origin.distance_to(&GeoCoord::new(origin.latitude, self.longitude));
        let y = origin.distance_to(&GeoCoord::new(self.latitude, origin.longitude));
        GridPos::new(x.round() as i32, y.round() as i32)
    }

    /// Inverse of [`GeoCoord::to_grid`] using the flat-earth approximation.
    pub fn from_grid(pos: GridPos, origin: &GeoCoord) -> GeoCoord {
        let dist_lat_km = pos.y as f64 / 1000.0;
        let dist_lon_km = pos.x as f64 / 1000.0;
        GeoCoord::new(
            origin.latitude + dist_lat_km / Self::KM_PER_DEGREE,
            origin.longitude + dist_lon_km / (Self::KM_PER_DEGREE * origin.latitude.to_radians().cos()),
        )
    }
}

// ============================================================================
// Identifier Types
// ============================================================================

/// 64-bit unique device identifier of a mote or gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DevEui(pub u64);

impl DevEui {
    /// Designated receiver used for uplinks addressed to any gateway.
    pub const GATEWAYS: DevEui = DevEui(u64::MAX);

    /// Create a new device identifier.
    pub fn new(id: u64) -> Self {
        DevEui(id)
    }
}

impl std::fmt::Display for DevEui {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Identity of a single transmission, shared by every history that records it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransmissionId(pub u64);

/// Identity of an environment, held by entities as a back-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvironmentId(pub u64);

static NEXT_ENVIRONMENT_ID: AtomicU64 = AtomicU64::new(1);

impl EnvironmentId {
    /// Allocate a process-unique environment id.
    pub fn next() -> Self {
        EnvironmentId(NEXT_ENVIRONMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_time_conversions() {
        let time = SimTime::from_secs(1.5);
        assert_eq!(time.as_millis(), 1500);
        assert_eq!(time.as_micros(), 1_500_000);
        assert!((time.as_secs_f64() - 1.5).abs() < 0.0001);
    }

    #[test]
    fn test_sim_time_arithmetic() {
        let t1 = SimTime::from_millis(100);
        let t2 = SimTime::from_millis(50);
        assert_eq!((t1 + t2).as_millis(), 150);
        assert_eq!((t1 - t2).as_millis(), 50);
        assert_eq!((t2 - t1), SimTime::ZERO);
    }

    #[test]
    fn test_geo_coord_distance() {
        let sf = GeoCoord::new(37.7749, -122.4194);
        let la = GeoCoord::new(34.0522, -118.2437);
        let distance = sf.distance_to(&la);
        // SF to LA is approximately 559 km
        assert!(distance > 550_000.0 && distance < 570_000.0);
    }

    #[test]
    fn test_geo_grid_projection_round_trip() {
        let origin = GeoCoord::new(50.853718, 4.673155);
        let pos = GridPos::new(420, 1310);
        let back = GeoCoord::from_grid(pos, &origin).to_grid(&origin);
        assert!((back.x - pos.x).abs() <= 2, "x drifted to {}", back.x);
        assert!((back.y - pos.y).abs() <= 2, "y drifted to {}", back.y);
    }

    #[test]
    fn test_grid_distances() {
        let a = GridPos::new(0, 0);
        let b = GridPos::new(3, -4);
        assert_eq!(a.distance_to(&b), 5.0);
        assert_eq!(a.chebyshev_distance(&b), 4);
        assert_eq!(a.manhattan_distance(&b), 7);
    }

    #[test]
    fn test_environment_ids_are_unique() {
        let a = EnvironmentId::next();
        let b = EnvironmentId::next();
        assert_ne!(a, b);
    }
}
