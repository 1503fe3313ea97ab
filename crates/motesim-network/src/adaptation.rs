//! Closed-loop transmission power adaptation.
//!
//! After each uplink the controller records the best power at which a gateway
//! heard the mote. Every `window` observations it averages them and nudges
//! the mote's transmission power by one step:
//!
//! - mean above the upper threshold: the link has margin, lower the power
//! - mean below the lower threshold: the link is weak, raise the power
//! - otherwise leave the power alone
//!
//! Windows do not overlap; the buffer is cleared after each evaluation.

use crate::entity::NetworkEntity;
use crate::environment::Environment;
use crate::probe::MoteProbe;
use motesim_common::{DevEui, SimError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Tuning of the adaptation controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationConfig {
    /// Observations averaged per decision.
    pub window: usize,
    /// Mean signal above which power is lowered, in dBm.
    pub upper_threshold_dbm: f64,
    /// Mean signal below which power is raised, in dBm.
    pub lower_threshold_dbm: f64,
    /// Lowest allowed transmission power.
    pub min_power_dbm: i32,
    /// Highest allowed transmission power.
    pub max_power_dbm: i32,
    /// Power change per decision.
    pub step_db: i32,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        AdaptationConfig {
            window: 5,
            upper_threshold_dbm: -42.0,
            lower_threshold_dbm: -48.0,
            min_power_dbm: -3,
            max_power_dbm: 14,
            step_db: 1,
        }
    }
}

/// Outcome of feeding one observation to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum PowerDecision {
    /// No gateway heard the latest uplink.
    NoObservation,
    /// The window is not full yet.
    Collecting { samples: usize },
    /// The mean sits in the dead band, or the power is already at its bound.
    Hold { power_dbm: i32 },
    Decrease { from_dbm: i32, to_dbm: i32 },
    Increase { from_dbm: i32, to_dbm: i32 },
}

impl PowerDecision {
    /// New power when the decision changes it.
    pub fn new_power(&self) -> Option<i32> {
        match self {
            PowerDecision::Decrease { to_dbm, .. } | PowerDecision::Increase { to_dbm, .. } => Some(*to_dbm),
            _ => None,
        }
    }
}

/// Per-mote hysteresis controller for transmission power.
#[derive(Debug, Clone, Default)]
pub struct AdaptationController {
    config: AdaptationConfig,
    buffers: HashMap<DevEui, Vec<f64>>,
}

impl AdaptationController {
    pub fn new(config: AdaptationConfig) -> Self {
        AdaptationController {
            config,
            buffers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AdaptationConfig {
        &self.config
    }

    /// Observations buffered for a mote.
    pub fn buffered(&self, eui: DevEui) -> &[f64] {
        self.buffers.get(&eui).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Decide on a new power from a full window of samples.
    pub fn evaluate(&self, samples: &[f64], current_power_dbm: i32) -> PowerDecision {
        if samples.is_empty() {
            return PowerDecision::Hold {
                power_dbm: current_power_dbm,
            };
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let cfg = &self.config;

        if mean > cfg.upper_threshold_dbm {
            let to = (current_power_dbm - cfg.step_db).max(cfg.min_power_dbm);
            if to < current_power_dbm {
                return PowerDecision::Decrease {
                    from_dbm: current_power_dbm,
                    to_dbm: to,
                };
            }
        } else if mean < cfg.lower_threshold_dbm {
            let to = (current_power_dbm + cfg.step_db).min(cfg.max_power_dbm);
            if to > current_power_dbm {
                return PowerDecision::Increase {
                    from_dbm: current_power_dbm,
                    to_dbm: to,
                };
            }
        }

        PowerDecision::Hold {
            power_dbm: current_power_dbm,
        }
    }

    /// Record the latest uplink of a mote and adapt its power when a window
    /// is complete.
    pub fn observe(&mut self, env: &mut Environment, mote: usize) -> Result<PowerDecision, SimError> {
        let (eui, signal, current_power) = {
            let probe = MoteProbe::new(env, mote)?;
            (
                env.motes()[mote].eui(),
                probe.highest_received_signal(),
                probe.power_setting(),
            )
        };

        let Some(signal) = signal else {
            trace!("No gateway heard mote {}", eui);
            return Ok(PowerDecision::NoObservation);
        };

        let window = self.config.window.max(1);
        let buffer = self.buffers.entry(eui).or_default();
        buffer.push(signal);
        if buffer.len() < window {
            return Ok(PowerDecision::Collecting { samples: buffer.len() });
        }

        let samples = std::mem::take(buffer);
        let decision = self.evaluate(&samples, current_power);
        if let Some(power) = decision.new_power() {
            if let Some(m) = env.mote_mut(mote) {
                m.set_tx_power_dbm(power);
            }
            debug!("Mote {} power {} -> {} dBm", eui, current_power, power);
        }
        Ok(decision)
    }

    /// Forget all buffered observations.
    pub fn reset(&mut self) {
        self.buffers.clear();
    }
}
