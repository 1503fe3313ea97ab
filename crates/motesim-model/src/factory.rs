//! Environment construction for the three scenario modes.

use crate::config::{
    GatewayConfig, MoteConfig, MovementType, ScenarioConfig, ScenarioMode, DEFAULT_AREA_METERS,
    DEFAULT_NUM_GATEWAYS, DEFAULT_NUM_MOTES, DEFAULT_SEED, DEFAULT_WAYPOINT_RADIUS,
};
use crate::ModelError;
use motesim_common::{DevEui, GeoCoord, GridPos};
use motesim_network::terrain::DEFAULT_CELL_SIZE_M;
use motesim_network::{
    AdaptationConfig, Energy, Environment, EnvironmentConfig, Gateway, Mote, NetworkEntity, TerrainMap,
};
use motesim_radio::LoraPhyConfig;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, UnitDisc};
use std::collections::HashSet;
use tracing::info;

/// Waypoints generated for a random-walk mote.
pub const RANDOM_WALK_WAYPOINTS: usize = 5;

/// First identifier handed to generated gateways.
pub const GATEWAY_EUI_BASE: u64 = 100;

/// First identifier handed to generated motes.
pub const MOTE_EUI_BASE: u64 = 1;

/// A constructed environment plus the run options that came with it.
#[derive(Debug, Clone)]
pub struct BuiltScenario {
    pub environment: Environment,
    pub mode: ScenarioMode,
    /// Present when power adaptation is enabled.
    pub adaptation: Option<AdaptationConfig>,
    pub seed: u64,
}

/// Build an environment and its run options from a scenario.
pub fn build_scenario(config: &ScenarioConfig) -> Result<BuiltScenario, ModelError> {
    let mode = config.resolved_mode();
    let seed = config.seed.unwrap_or(DEFAULT_SEED);
    let environment = match mode {
        ScenarioMode::Default => build_default(config, seed)?,
        ScenarioMode::Bulk => build_bulk(config, seed)?,
        ScenarioMode::Personalized => build_personalized(config, seed)?,
    };

    info!(
        "Built {:?} scenario: {} motes, {} gateways",
        mode,
        environment.motes().len(),
        environment.gateways().len()
    );

    Ok(BuiltScenario {
        environment,
        mode,
        adaptation: config.adaptation.clone(),
        seed,
    })
}

/// Build only the environment of a scenario.
pub fn build_environment(config: &ScenarioConfig) -> Result<Environment, ModelError> {
    build_scenario(config).map(|built| built.environment)
}

fn environment_config(config: &ScenarioConfig, seed: u64) -> EnvironmentConfig {
    let mut phy = LoraPhyConfig::default();
    phy.shadowing = config.shadowing.unwrap_or(true);
    EnvironmentConfig { phy, seed }
}

fn cell_size(config: &ScenarioConfig) -> u32 {
    config.cell_size_meters.unwrap_or(DEFAULT_CELL_SIZE_M)
}

fn check_spreading_factor(what: &str, sf: u8) -> Result<(), ModelError> {
    if (7..=12).contains(&sf) {
        Ok(())
    } else {
        Err(ModelError::InvalidConfig(format!(
            "{what}: spreading factor {sf} outside 7..=12"
        )))
    }
}

fn check_sampling_rate(what: &str, rate: u32) -> Result<(), ModelError> {
    if rate == 0 {
        Err(ModelError::InvalidConfig(format!("{what}: sampling rate must be positive")))
    } else {
        Ok(())
    }
}

fn check_defaults(config: &ScenarioConfig) -> Result<(), ModelError> {
    check_spreading_factor("defaults", config.spreading_factor())?;
    check_sampling_rate("defaults", config.sampling_rate())
}

// ============================================================================
// Default layout
// ============================================================================

/// South-west corner of the default map.
pub const MAP_ORIGIN: GeoCoord = GeoCoord::new(50.853718, 4.673155);

/// North-east extent used to size the default map.
const MAP_EXTENT: GeoCoord = GeoCoord::new(50.878697, 4.701200);

const DEFAULT_LAYOUT_SPEED: f64 = 0.5;

/// Upper bound (exclusive) of the start offsets drawn for default motes.
const DEFAULT_LAYOUT_MAX_OFFSET: u32 = 5;

const LAYOUT_GATEWAYS: [GeoCoord; 4] = [
    GeoCoord::new(50.859722, 4.681944),
    GeoCoord::new(50.863780, 4.677992),
    GeoCoord::new(50.867222, 4.678056),
    GeoCoord::new(50.856667, 4.676389),
];

const TRACK_NORTH: [GeoCoord; 17] = [
    GeoCoord::new(50.856020, 4.675844),
    GeoCoord::new(50.856545, 4.676743),
    GeoCoord::new(50.857852, 4.679702),
    GeoCoord::new(50.860061, 4.683473),
    GeoCoord::new(50.861985, 4.680993),
    GeoCoord::new(50.862263, 4.680672),
    GeoCoord::new(50.862696, 4.680416),
    GeoCoord::new(50.863049, 4.680321),
    GeoCoord::new(50.863455, 4.680385),
    GeoCoord::new(50.863977, 4.680610),
    GeoCoord::new(50.864770, 4.680898),
    GeoCoord::new(50.865176, 4.680973),
    GeoCoord::new(50.865583, 4.680976),
    GeoCoord::new(50.867980, 4.680381),
    GeoCoord::new(50.867881, 4.678226),
    GeoCoord::new(50.868028, 4.678175),
    GeoCoord::new(50.869650, 4.676740),
];

const TRACK_EAST: [GeoCoord; 6] = [
    GeoCoord::new(50.868551, 4.698337),
    GeoCoord::new(50.866713, 4.695153),
    GeoCoord::new(50.861330, 4.685687),
    GeoCoord::new(50.857910, 4.679724),
    GeoCoord::new(50.856486, 4.676650),
    GeoCoord::new(50.856020, 4.675844),
];

/// Start of the mote that follows the eastern track.
const EAST_MOTE_START: GeoCoord = GeoCoord::new(50.862752, 4.688886);

/// Edge length of the square default map in metres.
pub fn default_map_size() -> u32 {
    let north = MAP_ORIGIN.distance_to(&GeoCoord::new(MAP_EXTENT.latitude, MAP_ORIGIN.longitude));
    let east = MAP_ORIGIN.distance_to(&GeoCoord::new(MAP_ORIGIN.latitude, MAP_EXTENT.longitude));
    north.max(east).ceil() as u32
}

fn to_grid(points: &[GeoCoord]) -> Vec<GridPos> {
    points.iter().map(|p| p.to_grid(&MAP_ORIGIN)).collect()
}

fn build_default(config: &ScenarioConfig, seed: u64) -> Result<Environment, ModelError> {
    check_defaults(config)?;
    let size = default_map_size();
    let terrain = TerrainMap::three_bands(size, size, cell_size(config));
    let mut env = Environment::new(terrain, environment_config(config, seed));
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    for (i, gw) in LAYOUT_GATEWAYS.iter().enumerate() {
        env.add_gateway(Gateway::new(
            DevEui(GATEWAY_EUI_BASE + i as u64),
            gw.to_grid(&MAP_ORIGIN),
            config.transmission_power(),
            config.spreading_factor(),
        ));
    }

    let motes = [
        (TRACK_NORTH[0], to_grid(&TRACK_NORTH)),
        (TRACK_EAST[0], Vec::new()),
        (EAST_MOTE_START, to_grid(&TRACK_EAST)),
    ];
    for (i, (start, path)) in motes.into_iter().enumerate() {
        let offset = rng.gen_range(0..DEFAULT_LAYOUT_MAX_OFFSET);
        let mote = Mote::new(
            DevEui(MOTE_EUI_BASE + i as u64),
            start.to_grid(&MAP_ORIGIN),
            config.transmission_power(),
            config.spreading_factor(),
        )
        .with_energy(Energy::from_level(config.energy_level()))
        .with_sampling(config.sampling_rate(), offset)
        .with_movement_speed(DEFAULT_LAYOUT_SPEED)
        .with_path(path);
        env.add_mote(mote);
    }

    Ok(env)
}

// ============================================================================
// Bulk
// ============================================================================

fn build_bulk(config: &ScenarioConfig, seed: u64) -> Result<Environment, ModelError> {
    check_defaults(config)?;
    let width = config.area_width_meters.unwrap_or(DEFAULT_AREA_METERS);
    let height = config.area_height_meters.unwrap_or(width);
    if width == 0 || height == 0 {
        return Err(ModelError::InvalidConfig("bulk area must be non-empty".into()));
    }

    let terrain = TerrainMap::three_bands(width, height, cell_size(config));
    let mut env = Environment::new(terrain, environment_config(config, seed));
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let random_position = |rng: &mut ChaCha8Rng| {
        GridPos::new(rng.gen_range(0..width) as i32, rng.gen_range(0..height) as i32)
    };

    for i in 0..config.num_gateways.unwrap_or(DEFAULT_NUM_GATEWAYS) {
        let position = random_position(&mut rng);
        env.add_gateway(Gateway::new(
            DevEui(GATEWAY_EUI_BASE + i as u64),
            position,
            config.transmission_power(),
            config.spreading_factor(),
        ));
    }

    for i in 0..config.num_motes.unwrap_or(DEFAULT_NUM_MOTES) {
        let position = random_position(&mut rng);
        let mote = Mote::new(
            DevEui(MOTE_EUI_BASE + i as u64),
            position,
            config.transmission_power(),
            config.spreading_factor(),
        )
        .with_energy(Energy::from_level(config.energy_level()))
        .with_sampling(config.sampling_rate(), config.start_offset())
        .with_movement_speed(config.movement_speed())
        .with_path(vec![position]);
        env.add_mote(mote);
    }

    Ok(env)
}

// ============================================================================
// Personalized
// ============================================================================

fn build_personalized(config: &ScenarioConfig, seed: u64) -> Result<Environment, ModelError> {
    let width = config.area_width_meters.unwrap_or(DEFAULT_AREA_METERS).max(1);
    let height = config.area_height_meters.unwrap_or(width).max(1);
    let terrain = TerrainMap::three_bands(width, height, cell_size(config));
    let mut env = Environment::new(terrain, environment_config(config, seed));
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut seen = HashSet::new();

    for (i, gw) in config.gateways.iter().flatten().enumerate() {
        let gateway = gateway_from_config(config, gw, i)?;
        if !seen.insert(gateway.eui()) {
            return Err(ModelError::DuplicateEui(gateway.eui()));
        }
        env.add_gateway(gateway);
    }

    for (i, mc) in config.motes.iter().flatten().enumerate() {
        let mote = mote_from_config(config, mc, i, &mut rng)?;
        if !seen.insert(mote.eui()) {
            return Err(ModelError::DuplicateEui(mote.eui()));
        }
        env.add_mote(mote);
    }

    Ok(env)
}

fn required<T>(value: Option<T>, what: &str, field: &str) -> Result<T, ModelError> {
    value.ok_or_else(|| ModelError::InvalidConfig(format!("{what}: missing {field}")))
}

fn gateway_from_config(config: &ScenarioConfig, gw: &GatewayConfig, index: usize) -> Result<Gateway, ModelError> {
    let what = format!("gateway #{index}");
    let eui = required(gw.eui, &what, "eui")?;
    let x = required(gw.x_pos, &what, "x_pos")?;
    let y = required(gw.y_pos, &what, "y_pos")?;
    let sf = gw.spreading_factor.unwrap_or(config.spreading_factor());
    check_spreading_factor(&what, sf)?;

    Ok(Gateway::new(
        DevEui(eui),
        GridPos::new(x, y),
        gw.transmission_power.unwrap_or(config.transmission_power()),
        sf,
    ))
}

fn mote_from_config(
    config: &ScenarioConfig,
    mc: &MoteConfig,
    index: usize,
    rng: &mut ChaCha8Rng,
) -> Result<Mote, ModelError> {
    let what = format!("mote #{index}");
    let eui = required(mc.eui, &what, "eui")?;
    let x = required(mc.x_pos, &what, "x_pos")?;
    let y = required(mc.y_pos, &what, "y_pos")?;
    let sf = mc.spreading_factor.unwrap_or(config.spreading_factor());
    check_spreading_factor(&what, sf)?;
    let sampling_rate = mc.sampling_rate.unwrap_or(config.sampling_rate());
    check_sampling_rate(&what, sampling_rate)?;

    let position = GridPos::new(x, y);
    let movement = mc.movement_type.unwrap_or(if mc.waypoints.is_some() {
        MovementType::SpecificPath
    } else {
        MovementType::Static
    });
    let path = match movement {
        MovementType::Static => Vec::new(),
        MovementType::SpecificPath => mc
            .waypoints
            .iter()
            .flatten()
            .map(|wp| GridPos::new(wp.x, wp.y))
            .collect(),
        MovementType::RandomWalk => {
            let radius = mc.waypoint_radius.unwrap_or(DEFAULT_WAYPOINT_RADIUS);
            if !(radius.is_finite() && radius >= 0.0) {
                return Err(ModelError::InvalidConfig(format!("{what}: invalid waypoint radius {radius}")));
            }
            random_walk(position, radius, rng)
        }
    };

    Ok(Mote::new(
        DevEui(eui),
        position,
        mc.transmission_power.unwrap_or(config.transmission_power()),
        sf,
    )
    .with_energy(Energy::from_level(mc.energy_level.unwrap_or(config.energy_level())))
    .with_sensors(mc.sensors.clone().unwrap_or_default())
    .with_sampling(sampling_rate, mc.start_offset.unwrap_or(config.start_offset()))
    .with_movement_speed(mc.movement_speed.unwrap_or(config.movement_speed()))
    .with_path(path))
}

/// Waypoints scattered uniformly over a disc around `center`.
fn random_walk(center: GridPos, radius: f64, rng: &mut ChaCha8Rng) -> Vec<GridPos> {
    (0..RANDOM_WALK_WAYPOINTS)
        .map(|_| {
            let [dx, dy]: [f64; 2] = UnitDisc.sample(&mut *rng);
            GridPos::new(
                center.x + (dx * radius).round() as i32,
                center.y + (dy * radius).round() as i32,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WaypointConfig;

    fn personalized_mote(eui: u64) -> MoteConfig {
        MoteConfig {
            eui: Some(eui),
            x_pos: Some(10),
            y_pos: Some(20),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_layout() {
        let env = build_environment(&ScenarioConfig::default()).unwrap();
        assert_eq!(env.gateways().len(), 4);
        assert_eq!(env.motes().len(), 3);
        assert_eq!(env.motes()[0].path().len(), 17);
        assert!(env.motes()[1].path().is_empty());
        assert_eq!(env.motes()[2].path().len(), 6);
        assert!(env.motes().iter().all(|m| m.movement_speed() == 0.5));
        assert!(env.motes().iter().all(|m| m.start_offset() < 5));

        let size = default_map_size();
        assert!(size > 2700 && size < 2800, "map size {size}");
        for gw in env.gateways() {
            let pos = gw.position();
            assert!(pos.x >= 0 && pos.x < size as i32 && pos.y >= 0 && pos.y < size as i32);
        }
    }

    #[test]
    fn test_default_layout_is_deterministic() {
        let config = ScenarioConfig {
            seed: Some(9),
            ..Default::default()
        };
        let a = build_environment(&config).unwrap();
        let b = build_environment(&config).unwrap();
        let offsets = |env: &Environment| env.motes().iter().map(|m| m.start_offset()).collect::<Vec<_>>();
        assert_eq!(offsets(&a), offsets(&b));
    }

    #[test]
    fn test_bulk_defaults() {
        let config = ScenarioConfig {
            mode: Some(ScenarioMode::Bulk),
            ..Default::default()
        };
        let env = build_environment(&config).unwrap();
        assert_eq!(env.gateways().len(), 1);
        assert_eq!(env.motes().len(), 3);
        assert_eq!(env.gateways()[0].eui(), DevEui(100));
        for (i, mote) in env.motes().iter().enumerate() {
            assert_eq!(mote.eui(), DevEui(i as u64 + 1));
            assert_eq!(mote.tx_power_dbm(), 14);
            assert_eq!(mote.spreading_factor(), 12);
            assert_eq!(mote.sampling_rate(), 10);
            assert_eq!(mote.energy(), Energy::Units(100));
            assert_eq!(mote.start_offset(), 0);
            assert_eq!(mote.movement_speed(), 1.0);
            assert_eq!(mote.path(), &[mote.position()]);
            assert!(mote.position().x < 1000 && mote.position().y < 1000);
        }
    }

    #[test]
    fn test_generated_euis_avoid_gateway_receiver() {
        for mode in [ScenarioMode::Default, ScenarioMode::Bulk] {
            let config = ScenarioConfig {
                mode: Some(mode),
                ..Default::default()
            };
            let env = build_environment(&config).unwrap();
            assert!(env.motes().iter().all(|m| m.eui() != DevEui::GATEWAYS));
            assert!(env.gateways().iter().all(|g| g.eui() != DevEui::GATEWAYS));
            assert_eq!(env.motes()[0].eui(), DevEui(MOTE_EUI_BASE));
        }
    }

    #[test]
    fn test_bulk_overrides() {
        let config = ScenarioConfig {
            num_motes: Some(7),
            num_gateways: Some(2),
            area_width_meters: Some(300),
            default_transmission_power: Some(5),
            default_spreading_factor: Some(9),
            default_energy_level: Some(-1),
            ..Default::default()
        };
        let env = build_environment(&config).unwrap();
        assert_eq!(env.motes().len(), 7);
        assert_eq!(env.gateways().len(), 2);
        assert_eq!(env.terrain().width_m(), 300);
        assert!(env.motes().iter().all(|m| m.tx_power_dbm() == 5 && m.spreading_factor() == 9));
        assert!(env.motes().iter().all(|m| m.energy() == Energy::Unlimited));
    }

    #[test]
    fn test_personalized_paths() {
        let mut walker = personalized_mote(2);
        walker.movement_type = Some(MovementType::RandomWalk);
        walker.waypoint_radius = Some(50.0);
        let mut tracked = personalized_mote(3);
        tracked.waypoints = Some(vec![WaypointConfig { x: 0, y: 0 }, WaypointConfig { x: 40, y: 5 }]);

        let config = ScenarioConfig {
            motes: Some(vec![personalized_mote(1), walker, tracked]),
            gateways: Some(vec![GatewayConfig {
                eui: Some(100),
                x_pos: Some(0),
                y_pos: Some(0),
                ..Default::default()
            }]),
            ..Default::default()
        };
        let env = build_environment(&config).unwrap();
        assert!(env.motes()[0].path().is_empty());

        let walk = env.motes()[1].path();
        assert_eq!(walk.len(), RANDOM_WALK_WAYPOINTS);
        assert!(walk.iter().all(|p| p.distance_to(&GridPos::new(10, 20)) <= 51.0));

        assert_eq!(env.motes()[2].path(), &[GridPos::new(0, 0), GridPos::new(40, 5)]);
    }

    #[test]
    fn test_personalized_validation() {
        let missing_eui = ScenarioConfig {
            motes: Some(vec![MoteConfig {
                x_pos: Some(1),
                y_pos: Some(1),
                ..Default::default()
            }]),
            ..Default::default()
        };
        assert!(matches!(build_environment(&missing_eui), Err(ModelError::InvalidConfig(_))));

        let mut bad_sf = personalized_mote(1);
        bad_sf.spreading_factor = Some(13);
        let config = ScenarioConfig {
            motes: Some(vec![bad_sf]),
            ..Default::default()
        };
        assert!(matches!(build_environment(&config), Err(ModelError::InvalidConfig(_))));

        let mut zero_rate = personalized_mote(1);
        zero_rate.sampling_rate = Some(0);
        let config = ScenarioConfig {
            motes: Some(vec![zero_rate]),
            ..Default::default()
        };
        assert!(matches!(build_environment(&config), Err(ModelError::InvalidConfig(_))));

        let duplicate = ScenarioConfig {
            motes: Some(vec![personalized_mote(1), personalized_mote(1)]),
            ..Default::default()
        };
        assert!(matches!(
            build_environment(&duplicate),
            Err(ModelError::DuplicateEui(DevEui(1)))
        ));
    }

    #[test]
    fn test_shadowing_and_adaptation_options() {
        let config = ScenarioConfig {
            mode: Some(ScenarioMode::Bulk),
            shadowing: Some(false),
            adaptation: Some(AdaptationConfig::default()),
            seed: Some(4),
            ..Default::default()
        };
        let built = build_scenario(&config).unwrap();
        assert!(!built.environment.phy().shadowing);
        assert!(built.adaptation.is_some());
        assert_eq!(built.seed, 4);
        assert_eq!(built.mode, ScenarioMode::Bulk);
    }
}
