//! The tick-driven simulation loop.
//!
//! Each pass moves every mote one step along its path, lets motes whose
//! sampling countdown expired send an uplink, and then advances the
//! environment clock by one tick.

use motesim_common::{SimError, SimTime};
use motesim_network::{
    AdaptationConfig, AdaptationController, Countdown, Environment, MoteProbe, NetworkEntity, PowerDecision,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// Simulated time covered by one pass.
pub const DEFAULT_TICK: SimTime = SimTime::from_millis(1500);

/// Loop state kept per mote, outside the mote itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoteCursor {
    /// Index of the waypoint the mote is heading to.
    pub waypoint: usize,
    /// Passes left until the next uplink.
    pub countdown: Countdown,
}

/// What happened during one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    /// Uplinks put on air.
    pub sent: usize,
    /// Uplinks due but dropped for lack of energy.
    pub dropped: usize,
    /// Transmission power changes made by the adaptation controller.
    pub power_changes: usize,
}

/// Drives an [`Environment`] pass by pass.
#[derive(Debug, Clone)]
pub struct SimulationLoop {
    cursors: Vec<MoteCursor>,
    tick: SimTime,
    adaptation: Option<AdaptationController>,
    passes: u64,
}

impl SimulationLoop {
    /// Create a loop for the motes currently in `env`.
    pub fn new(env: &Environment) -> Self {
        let mut sim = SimulationLoop {
            cursors: Vec::with_capacity(env.motes().len()),
            tick: DEFAULT_TICK,
            adaptation: None,
            passes: 0,
        };
        sim.sync_cursors(env);
        sim
    }

    pub fn with_tick(mut self, tick: SimTime) -> Self {
        self.tick = tick;
        self
    }

    /// Enable transmission power self-adaptation.
    pub fn with_adaptation(mut self, config: AdaptationConfig) -> Self {
        self.adaptation = Some(AdaptationController::new(config));
        self
    }

    pub fn tick_duration(&self) -> SimTime {
        self.tick
    }

    pub fn cursors(&self) -> &[MoteCursor] {
        &self.cursors
    }

    pub fn adaptation(&self) -> Option<&AdaptationController> {
        self.adaptation.as_ref()
    }

    /// Passes completed by this loop.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Add cursors for motes registered after the loop was created.
    fn sync_cursors(&mut self, env: &Environment) {
        for mote in &env.motes()[self.cursors.len().min(env.motes().len())..] {
            self.cursors.push(MoteCursor {
                waypoint: 0,
                countdown: Countdown::new(mote.sampling_rate(), mote.start_offset()),
            });
        }
    }

    /// Perform one full pass over every mote, then advance the clock.
    pub fn step(&mut self, env: &mut Environment) -> Result<PassSummary, SimError> {
        self.sync_cursors(env);
        let mut summary = PassSummary::default();

        for index in 0..env.motes().len() {
            self.move_mote(env, index);

            let cursor = &mut self.cursors[index];
            let period = env.motes()[index].sampling_rate();
            if cursor.countdown.period() != period {
                cursor.countdown = Countdown::new(period, 0);
            }
            if !cursor.countdown.tick() {
                continue;
            }

            match env.send_to_gateway(index, &[], &BTreeMap::new())? {
                Some(id) => {
                    trace!("Mote {} sent {:?}", env.motes()[index].eui(), id);
                    summary.sent += 1;
                }
                None => summary.dropped += 1,
            }
            refresh_metrics(env, index)?;

            if let Some(controller) = self.adaptation.as_mut() {
                let decision = controller.observe(env, index)?;
                if matches!(decision, PowerDecision::Increase { .. } | PowerDecision::Decrease { .. }) {
                    summary.power_changes += 1;
                }
            }
        }

        if summary.sent > 0 {
            refresh_packet_loss(env)?;
        }

        env.tick(self.tick);
        self.passes += 1;
        Ok(summary)
    }

    /// Move a mote one unit towards its current waypoint.
    fn move_mote(&mut self, env: &mut Environment, index: usize) {
        let Some(mote) = env.mote_mut(index) else {
            return;
        };
        let path_len = mote.path().len();
        if path_len == 0 {
            return;
        }

        let cursor = &mut self.cursors[index];
        if cursor.waypoint >= path_len {
            cursor.waypoint = 0;
        }
        let target = mote.path()[cursor.waypoint];
        if mote.step_towards(target) {
            cursor.waypoint = (cursor.waypoint + 1) % path_len;
        }
    }

    /// Run passes until `stop` is set.
    ///
    /// The flag is checked before each pass, so a started pass always
    /// completes. Returns the number of passes made.
    pub fn run(&mut self, env: &mut Environment, stop: &AtomicBool) -> Result<u64, SimError> {
        let mut passes = 0;
        while !stop.load(Ordering::Acquire) {
            self.step(env)?;
            passes += 1;
        }
        debug!("Simulation loop stopped after {} passes", passes);
        Ok(passes)
    }

    /// Run exactly `passes` passes.
    pub fn run_for(&mut self, env: &mut Environment, passes: u64) -> Result<PassSummary, SimError> {
        let mut total = PassSummary::default();
        for _ in 0..passes {
            let pass = self.step(env)?;
            total.sent += pass.sent;
            total.dropped += pass.dropped;
            total.power_changes += pass.power_changes;
        }
        Ok(total)
    }
}

/// Recompute the cached link statistics of a mote after an uplink.
fn refresh_metrics(env: &mut Environment, index: usize) -> Result<(), SimError> {
    let run = env.current_run();
    let probed = MoteProbe::new(env, index)?.metrics();
    let loss = env.calculate_packet_loss(index, run)?;
    if let Some(mote) = env.mote_mut(index) {
        let metrics = mote.metrics_mut();
        metrics.highest_received_signal = probed.highest_received_signal;
        metrics.shortest_distance_to_gateway = probed.shortest_distance_to_gateway;
        metrics.packet_loss = Some(loss);
    }
    Ok(())
}

/// Recompute the cached loss ratio of every mote that has one.
///
/// Uplinks sent later in a pass can collide with earlier ones, so the ratio
/// cached right after a send may be stale by the end of the pass.
fn refresh_packet_loss(env: &mut Environment) -> Result<(), SimError> {
    let run = env.current_run();
    for index in 0..env.motes().len() {
        if env.motes()[index].metrics().packet_loss.is_none() {
            continue;
        }
        let loss = env.calculate_packet_loss(index, run)?;
        if let Some(mote) = env.mote_mut(index) {
            mote.metrics_mut().packet_loss = Some(loss);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use motesim_common::{DevEui, GridPos};
    use motesim_network::{EnvironmentConfig, Gateway, Mote, TerrainMap};
    use motesim_radio::{LoraPhyConfig, Terrain};

    fn env() -> Environment {
        let config = EnvironmentConfig {
            phy: LoraPhyConfig::default().without_shadowing(),
            seed: 7,
        };
        let mut env = Environment::new(TerrainMap::uniform(1000, 1000, 10, Terrain::Plain), config);
        env.add_gateway(Gateway::new(DevEui(100), GridPos::new(0, 0), 14, 12));
        env
    }

    #[test]
    fn test_first_send_on_offset_pass() {
        let mut env = env();
        env.add_mote(Mote::new(DevEui(1), GridPos::new(10, 0), 14, 12).with_sampling(4, 2));
        let mut sim = SimulationLoop::new(&env);

        let sends: Vec<u64> = (1..=10)
            .filter(|_| sim.step(&mut env).unwrap().sent == 1)
            .collect();
        assert_eq!(sends, vec![2, 6, 10]);
    }

    #[test]
    fn test_first_send_on_period_pass_without_offset() {
        let mut env = env();
        env.add_mote(Mote::new(DevEui(1), GridPos::new(10, 0), 14, 12).with_sampling(3, 0));
        let mut sim = SimulationLoop::new(&env);

        let sends: Vec<u64> = (1..=9)
            .filter(|_| sim.step(&mut env).unwrap().sent == 1)
            .collect();
        assert_eq!(sends, vec![3, 6, 9]);
    }

    #[test]
    fn test_step_advances_clock() {
        let mut env = env();
        let mut sim = SimulationLoop::new(&env).with_tick(SimTime::from_millis(500));
        sim.run_for(&mut env, 4).unwrap();
        assert_eq!(env.ticks(), 4);
        assert_eq!(env.clock(), SimTime::from_millis(2000));
        assert_eq!(sim.passes(), 4);
    }

    #[test]
    fn test_movement_cycles_through_waypoints() {
        let mut env = env();
        let a = GridPos::new(3, 1);
        let b = GridPos::new(0, 0);
        env.add_mote(
            Mote::new(DevEui(1), GridPos::new(0, 0), 14, 12)
                .with_path(vec![a, b])
                .with_sampling(1000, 0),
        );
        let mut sim = SimulationLoop::new(&env);

        sim.run_for(&mut env, 4).unwrap();
        assert_eq!(env.motes()[0].position(), a);
        assert_eq!(sim.cursors()[0].waypoint, 1);

        sim.run_for(&mut env, 4).unwrap();
        assert_eq!(env.motes()[0].position(), b);
        assert_eq!(sim.cursors()[0].waypoint, 0);
    }

    #[test]
    fn test_metrics_refreshed_after_send() {
        let mut env = env();
        env.add_mote(Mote::new(DevEui(1), GridPos::new(30, 40), 14, 12).with_sampling(1, 0));
        let mut sim = SimulationLoop::new(&env);
        sim.step(&mut env).unwrap();

        let metrics = env.motes()[0].metrics();
        assert_eq!(metrics.shortest_distance_to_gateway, Some(50.0));
        assert_eq!(metrics.packet_loss, Some(0.0));
        assert!(metrics.highest_received_signal.is_some());
    }

    #[test]
    fn test_run_stops_when_flag_set() {
        let mut env = env();
        let stop = AtomicBool::new(true);
        let mut sim = SimulationLoop::new(&env);
        assert_eq!(sim.run(&mut env, &stop).unwrap(), 0);
        assert_eq!(env.ticks(), 0);
    }

    #[test]
    fn test_exhausted_mote_drops_uplinks() {
        let mut env = env();
        env.add_mote(
            Mote::new(DevEui(1), GridPos::new(10, 0), 14, 12)
                .with_sampling(1, 0)
                .with_energy(motesim_network::Energy::Units(0)),
        );
        let mut sim = SimulationLoop::new(&env);
        let summary = sim.run_for(&mut env, 3).unwrap();
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.dropped, 3);
    }
}
