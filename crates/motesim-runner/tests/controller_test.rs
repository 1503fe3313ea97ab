//! Run control integration tests.
//!
//! These tests drive the simulation on its worker thread through
//! [`SimulationController`] and inspect the results through the query
//! surface only.

use motesim_common::{DevEui, GridPos};
use motesim_model::{load_scenario_from_str, ScenarioConfig};
use motesim_network::{Environment, EnvironmentConfig, Gateway, Mote, TerrainMap};
use motesim_radio::{LoraPhyConfig, Terrain};
use motesim_runner::{ControlError, MoteSelector, RunOptions, SimulationController};
use std::thread;
use std::time::Duration;

// ============================================================================
// Helpers
// ============================================================================

fn limited(controller: &SimulationController, ticks: u64) {
    controller.set_options(RunOptions {
        max_ticks: Some(ticks),
        ..controller.options()
    });
}

fn small_bulk() -> ScenarioConfig {
    load_scenario_from_str(
        r#"
mode: bulk
seed: 11
num_motes: 2
num_gateways: 1
area_width_meters: 200
area_height_meters: 200
default_sampling_rate: 2
"#,
    )
    .unwrap()
}

/// A city environment with one gateway, a mote next to it and a mote far
/// beyond the reach of any signal.
fn reach_environment() -> Environment {
    let config = EnvironmentConfig {
        phy: LoraPhyConfig::default().without_shadowing(),
        seed: 5,
    };
    let mut env = Environment::new(TerrainMap::uniform(2000, 2000, 10, Terrain::City), config);
    env.add_gateway(Gateway::new(DevEui(100), GridPos::new(0, 0), 14, 12));
    env.add_mote(Mote::new(DevEui(1), GridPos::new(30, 0), 14, 12).with_sampling(5, 0));
    env.add_mote(Mote::new(DevEui(2), GridPos::new(1_000_000, 0), 14, 12).with_sampling(5, 2));
    env
}

// ============================================================================
// Start / Stop
// ============================================================================

#[test]
fn test_start_rejected_while_running() {
    let controller = SimulationController::new();
    controller.configure(&small_bulk()).unwrap();
    controller.start().unwrap();

    assert!(controller.is_running());
    assert!(matches!(controller.start(), Err(ControlError::AlreadyRunning)));
    assert!(matches!(
        controller.configure(&small_bulk()),
        Err(ControlError::AlreadyRunning)
    ));

    thread::sleep(Duration::from_millis(20));
    controller.stop();
    controller.join().unwrap();
    assert!(!controller.is_running());
    assert!(!controller.status().is_running);
}

#[test]
fn test_stop_then_restart_continues_in_new_run() {
    let controller = SimulationController::new();
    controller.configure(&small_bulk()).unwrap();
    limited(&controller, 10);

    controller.start().unwrap();
    assert_eq!(controller.join().unwrap(), 10);
    assert_eq!(controller.status().current_run, 0);
    assert_eq!(controller.status().ticks, 10);

    controller.start().unwrap();
    assert_eq!(controller.join().unwrap(), 10);
    let status = controller.status();
    assert_eq!(status.current_run, 1);
    assert_eq!(status.ticks, 20);

    // Both runs stay queryable
    let first = controller.mote_energy_usage(MoteSelector::Index(0), Some(0)).unwrap();
    let second = controller.mote_energy_usage(MoteSelector::Index(0), None).unwrap();
    assert_eq!(first.run, 0);
    assert_eq!(second.run, 1);
    assert_eq!(first.transmission_energy.len(), 5);
    assert_eq!(second.transmission_energy.len(), 5);
}

#[test]
fn test_start_without_configuration_uses_default_layout() {
    let controller = SimulationController::new();
    limited(&controller, 3);
    controller.start().unwrap();
    controller.join().unwrap();

    let status = controller.status();
    assert_eq!(status.mote_count, 3);
    assert_eq!(status.gateway_count, 4);
    assert_eq!(status.ticks, 3);
}

#[test]
fn test_start_without_history_keeps_run() {
    let controller = SimulationController::new();
    controller.configure(&small_bulk()).unwrap();
    // One pass is too short for any mote to sample
    limited(&controller, 1);

    controller.start().unwrap();
    controller.join().unwrap();
    controller.start().unwrap();
    controller.join().unwrap();
    assert_eq!(controller.status().current_run, 0);
}

// ============================================================================
// Energy Queries
// ============================================================================

#[test]
fn test_energy_usage_by_eui_and_index_agree() {
    let controller = SimulationController::new();
    controller.install(reach_environment()).unwrap();
    limited(&controller, 10);
    controller.start().unwrap();
    controller.join().unwrap();

    let by_index = controller.mote_energy_usage(MoteSelector::Index(0), None).unwrap();
    let by_eui = controller.mote_energy_usage(MoteSelector::Eui(DevEui(1)), None).unwrap();
    assert_eq!(by_index, by_eui);
    assert_eq!(by_index.transmission_energy.len(), 2);

    let sum: f64 = by_index.transmission_energy.iter().sum();
    assert!((by_index.total_energy - sum).abs() < 1e-12);
    assert!(by_index.total_energy > 0.0);
}

#[test]
fn test_energy_usage_errors() {
    let controller = SimulationController::new();
    controller.install(reach_environment()).unwrap();

    assert!(matches!(
        controller.mote_energy_usage(MoteSelector::Index(9), None),
        Err(ControlError::MoteNotFound(MoteSelector::Index(9)))
    ));
    assert!(matches!(
        controller.mote_energy_usage(MoteSelector::Eui(DevEui(77)), None),
        Err(ControlError::MoteNotFound(_))
    ));
    assert!(matches!(
        controller.mote_energy_usage(MoteSelector::Index(0), Some(1)),
        Err(ControlError::RunOutOfRange { run: 1, runs: 1 })
    ));
}

#[test]
fn test_energy_usage_of_idle_run_is_empty() {
    let controller = SimulationController::new();
    controller.install(reach_environment()).unwrap();
    let usage = controller.mote_energy_usage(MoteSelector::Index(1), None).unwrap();
    assert_eq!(usage.eui, DevEui(2));
    assert!(usage.transmission_energy.is_empty());
    assert_eq!(usage.total_energy, 0.0);
}

// ============================================================================
// End to End
// ============================================================================

#[test]
fn test_in_range_and_out_of_range_packet_loss() {
    let controller = SimulationController::new();
    controller.install(reach_environment()).unwrap();
    limited(&controller, 20);
    controller.start().unwrap();
    controller.join().unwrap();

    let report = controller.report().unwrap();
    let near = &report.motes[0];
    let far = &report.motes[1];

    assert_eq!(near.packets_sent, 4);
    assert_eq!(near.packets_lost, 0);
    assert_eq!(near.packet_loss, 0.0);
    assert!(near.highest_received_signal.is_some());

    assert_eq!(far.packets_sent, 4);
    assert_eq!(far.packets_lost, 4);
    assert_eq!(far.packet_loss, 1.0);
    assert_eq!(far.recent_packet_loss, 1.0);
    assert_eq!(far.highest_received_signal, None);

    assert_eq!(report.gateways[0].packets_received, 4);
}

#[test]
fn test_adaptation_lowers_power_of_close_mote() {
    let config = EnvironmentConfig {
        phy: LoraPhyConfig::default().without_shadowing(),
        seed: 5,
    };
    let mut env = Environment::new(TerrainMap::uniform(500, 500, 10, Terrain::City), config);
    env.add_gateway(Gateway::new(DevEui(100), GridPos::new(0, 0), 14, 12));
    env.add_mote(Mote::new(DevEui(1), GridPos::new(10, 0), 14, 12).with_sampling(1, 0));

    let controller = SimulationController::new();
    controller.install(env).unwrap();
    controller.set_options(RunOptions {
        max_ticks: Some(10),
        adaptation: Some(Default::default()),
        ..RunOptions::default()
    });
    controller.start().unwrap();
    controller.join().unwrap();

    let report = controller.report().unwrap();
    assert_eq!(report.motes[0].transmission_power_dbm, 12);
}
