//! Serializable views of the simulation state.
//!
//! Every value here is read through the accessors of the environment and its
//! entities. Nothing is recomputed from the radio model.

use motesim_common::{DevEui, GridPos, SimError};
use motesim_network::{Energy, Environment, Gateway, MoteProbe, MoteSensor, NetworkEntity};
use serde::Serialize;

/// Number of recent uplinks inspected for the recent packet loss.
pub const RECENT_PACKET_LOSS_WINDOW: usize = 10;

/// Exported state of one mote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoteState {
    pub eui: DevEui,
    pub position: GridPos,
    pub transmission_power_dbm: i32,
    pub spreading_factor: u8,
    pub energy_level: Energy,
    /// Energy spent in the current run, in joules.
    pub energy_consumed: f64,
    pub movement_speed: f64,
    pub sampling_rate: u32,
    pub start_offset: u32,
    pub sensors: Vec<MoteSensor>,
    pub shortest_distance_to_gateway: Option<f64>,
    pub highest_received_signal: Option<f64>,
    pub packet_loss: f64,
    pub recent_packet_loss: f64,
    pub packets_sent: usize,
    pub packets_lost: usize,
}

impl MoteState {
    /// Capture the state of the mote at `index`.
    ///
    /// Cached link metrics are used when the loop has filled them in and
    /// computed on demand otherwise. Packet counts and loss ratios are always
    /// computed from the run history, since a later uplink in the same pass
    /// can turn an earlier reception into a collision.
    pub fn capture(env: &Environment, index: usize) -> Result<Self, SimError> {
        let probe = MoteProbe::new(env, index)?;
        let mote = &env.motes()[index];
        let run = env.current_run();
        let metrics = probe.metrics_or_cached();
        let stats = env.packet_stats(index, run)?;

        Ok(MoteState {
            eui: mote.eui(),
            position: mote.position(),
            transmission_power_dbm: mote.tx_power_dbm(),
            spreading_factor: mote.spreading_factor(),
            energy_level: mote.energy(),
            energy_consumed: mote.used_energy(run).map(|used| used.iter().sum()).unwrap_or(0.0),
            movement_speed: mote.movement_speed(),
            sampling_rate: mote.sampling_rate(),
            start_offset: mote.start_offset(),
            sensors: mote.sensors().to_vec(),
            shortest_distance_to_gateway: metrics.shortest_distance_to_gateway,
            highest_received_signal: metrics.highest_received_signal,
            packet_loss: stats.loss_ratio(),
            recent_packet_loss: env.calculate_recent_packet_loss(index, run, RECENT_PACKET_LOSS_WINDOW)?,
            packets_sent: stats.sent,
            packets_lost: stats.lost,
        })
    }
}

/// Exported state of one gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayState {
    pub eui: DevEui,
    pub position: GridPos,
    pub transmission_power_dbm: i32,
    pub spreading_factor: u8,
    /// Uplinks received in the current run, collided ones included.
    pub packets_received: usize,
    pub packets_collided: usize,
}

impl GatewayState {
    pub fn capture(env: &Environment, gateway: &Gateway) -> Self {
        let received = gateway.core().received_transmissions(env.current_run());
        GatewayState {
            eui: gateway.eui(),
            position: gateway.position(),
            transmission_power_dbm: gateway.tx_power_dbm(),
            spreading_factor: gateway.spreading_factor(),
            packets_received: received.len(),
            packets_collided: received.iter().filter(|r| r.collision).count(),
        }
    }
}

/// Energy spent by a mote on its transmissions during one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoteEnergyUsage {
    pub eui: DevEui,
    pub run: usize,
    /// Energy of each transmission in joules, in sending order.
    pub transmission_energy: Vec<f64>,
    pub total_energy: f64,
}

/// Snapshot of the controller, answered without locking the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub is_running: bool,
    pub current_run: usize,
    pub mote_count: usize,
    pub gateway_count: usize,
    pub ticks: u64,
    pub uptime_ms: u64,
}

/// Full state of an environment at the end of (or during) a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub run: usize,
    pub runs: usize,
    pub ticks: u64,
    pub simulated_time_s: f64,
    pub transmissions: usize,
    pub motes: Vec<MoteState>,
    pub gateways: Vec<GatewayState>,
}

impl SimulationReport {
    pub fn capture(env: &Environment) -> Result<Self, SimError> {
        let motes = (0..env.motes().len())
            .map(|index| MoteState::capture(env, index))
            .collect::<Result<Vec<_>, _>>()?;
        let gateways = env
            .gateways()
            .iter()
            .map(|gateway| GatewayState::capture(env, gateway))
            .collect();

        Ok(SimulationReport {
            run: env.current_run(),
            runs: env.number_of_runs(),
            ticks: env.ticks(),
            simulated_time_s: env.clock().as_secs_f64(),
            transmissions: env.transmissions().len(),
            motes,
            gateways,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimulationLoop;
    use motesim_network::{EnvironmentConfig, Mote, TerrainMap};
    use motesim_radio::{LoraPhyConfig, Terrain};

    fn env() -> Environment {
        let config = EnvironmentConfig {
            phy: LoraPhyConfig::default().without_shadowing(),
            seed: 3,
        };
        let mut env = Environment::new(TerrainMap::uniform(1000, 1000, 10, Terrain::Plain), config);
        env.add_gateway(Gateway::new(DevEui(100), GridPos::new(0, 0), 14, 12));
        env.add_mote(
            Mote::new(DevEui(1), GridPos::new(60, 80), 14, 12)
                .with_sampling(2, 0)
                .with_sensors(vec![MoteSensor::Ozone]),
        );
        env
    }

    #[test]
    fn test_mote_state_before_any_send() {
        let env = env();
        let state = MoteState::capture(&env, 0).unwrap();
        assert_eq!(state.eui, DevEui(1));
        assert_eq!(state.shortest_distance_to_gateway, Some(100.0));
        assert_eq!(state.highest_received_signal, None);
        assert_eq!(state.packet_loss, 0.0);
        assert_eq!(state.packets_sent, 0);
        assert_eq!(state.energy_consumed, 0.0);
        assert_eq!(state.sensors, vec![MoteSensor::Ozone]);
    }

    #[test]
    fn test_report_after_passes() {
        let mut env = env();
        SimulationLoop::new(&env).run_for(&mut env, 4).unwrap();

        let report = SimulationReport::capture(&env).unwrap();
        assert_eq!(report.ticks, 4);
        assert_eq!(report.transmissions, 2);
        assert_eq!(report.motes[0].packets_sent, 2);
        assert_eq!(report.gateways[0].packets_received, 2);
        assert_eq!(report.gateways[0].packets_collided, 0);
        assert!(report.motes[0].energy_consumed > 0.0);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["motes"][0]["eui"], 1);
        assert_eq!(json["motes"][0]["position"]["x"], 60);
    }

    #[test]
    fn test_packet_loss_counts_collision_from_later_sender() {
        let mut env = env();
        // Same distance to the gateway as mote 1, same slot
        env.add_mote(Mote::new(DevEui(2), GridPos::new(80, 60), 14, 12).with_sampling(2, 0));
        SimulationLoop::new(&env).run_for(&mut env, 2).unwrap();

        let report = SimulationReport::capture(&env).unwrap();
        assert_eq!(report.gateways[0].packets_collided, 2);
        for state in &report.motes {
            assert_eq!(state.packets_sent, 1);
            assert_eq!(state.packets_lost, 1);
            assert_eq!(state.packet_loss, 1.0);
            assert_eq!(state.recent_packet_loss, 1.0);
        }
        assert_eq!(env.motes()[0].metrics().packet_loss, Some(1.0));
    }

    #[test]
    fn test_mote_state_out_of_range_index() {
        let env = env();
        assert!(MoteState::capture(&env, 5).is_err());
    }
}
