//! Read-only link statistics of a mote.

use crate::entity::NetworkEntity;
use crate::environment::Environment;
use crate::mote::MoteMetrics;
use motesim_common::SimError;

/// Observes one mote through its environment.
#[derive(Debug, Clone, Copy)]
pub struct MoteProbe<'a> {
    env: &'a Environment,
    mote: usize,
}

impl<'a> MoteProbe<'a> {
    pub fn new(env: &'a Environment, mote: usize) -> Result<Self, SimError> {
        if mote >= env.motes().len() {
            return Err(SimError::IndexOutOfRange {
                index: mote,
                len: env.motes().len(),
            });
        }
        Ok(MoteProbe { env, mote })
    }

    /// Distance in metres to the closest gateway, `None` without gateways.
    pub fn shortest_distance_to_gateway(&self) -> Option<f64> {
        let position = self.env.motes()[self.mote].position();
        self.env
            .gateways()
            .iter()
            .map(|g| g.position().distance_to(&position))
            .min_by(f64::total_cmp)
    }

    /// Strongest received power among the gateways' most recent receptions
    /// from this mote in the current run.
    ///
    /// Each gateway contributes the last reception it holds from this mote,
    /// which can predate the mote's latest uplink. `None` when no gateway
    /// heard the mote in this run.
    pub fn highest_received_signal(&self) -> Option<f64> {
        let run = self.env.current_run();
        let eui = self.env.motes()[self.mote].eui();
        self.env
            .gateways()
            .iter()
            .filter_map(|g| {
                g.core()
                    .received_transmissions(run)
                    .iter()
                    .rev()
                    .find(|r| {
                        self.env
                            .transmission(r.transmission)
                            .is_some_and(|tx| tx.sender() == eui)
                    })
                    .map(|r| r.received_power_dbm)
            })
            .max_by(f64::total_cmp)
    }

    /// Transmission power currently configured.
    pub fn power_setting(&self) -> i32 {
        self.env.motes()[self.mote].tx_power_dbm()
    }

    pub fn spreading_factor(&self) -> u8 {
        self.env.motes()[self.mote].spreading_factor()
    }

    /// Packet loss ratio of the current run.
    pub fn packet_loss(&self) -> f64 {
        self.env
            .packet_stats(self.mote, self.env.current_run())
            .map(|s| s.loss_ratio())
            .unwrap_or(0.0)
    }

    /// Fresh metrics for the current state.
    pub fn metrics(&self) -> MoteMetrics {
        MoteMetrics {
            highest_received_signal: self.highest_received_signal(),
            shortest_distance_to_gateway: self.shortest_distance_to_gateway(),
            packet_loss: Some(self.packet_loss()),
        }
    }

    /// Cached metrics where present, computed on demand otherwise.
    pub fn metrics_or_cached(&self) -> MoteMetrics {
        let cached = self.env.motes()[self.mote].metrics();
        MoteMetrics {
            highest_received_signal: cached
                .highest_received_signal
                .or_else(|| self.highest_received_signal()),
            shortest_distance_to_gateway: cached
                .shortest_distance_to_gateway
                .or_else(|| self.shortest_distance_to_gateway()),
            packet_loss: cached.packet_loss.or_else(|| Some(self.packet_loss())),
        }
    }
}
