//! Transmission records.

use motesim_common::{DevEui, SimTime, TransmissionId};
use motesim_radio::{calculate_time_on_air_with_config, LoraPhyConfig, RadioParams};
use serde::Serialize;

/// A single over-the-air frame.
///
/// Transmissions are created by the environment and never change afterwards.
/// Every history that mentions a transmission refers to it by id.
#[derive(Debug, Clone, Serialize)]
pub struct Transmission {
    id: TransmissionId,
    sender: DevEui,
    receiver: DevEui,
    params: RadioParams,
    payload: Vec<u8>,
    departure_time: SimTime,
    time_on_air: SimTime,
}

impl Transmission {
    pub(crate) fn new(
        id: TransmissionId,
        sender: DevEui,
        receiver: DevEui,
        params: RadioParams,
        payload: Vec<u8>,
        departure_time: SimTime,
        phy: &LoraPhyConfig,
    ) -> Self {
        let time_on_air = calculate_time_on_air_with_config(&params, payload.len(), phy);
        Transmission {
            id,
            sender,
            receiver,
            params,
            payload,
            departure_time,
            time_on_air,
        }
    }

    pub fn id(&self) -> TransmissionId {
        self.id
    }

    pub fn sender(&self) -> DevEui {
        self.sender
    }

    /// Designated receiver.
    pub fn receiver(&self) -> DevEui {
        self.receiver
    }

    pub fn params(&self) -> &RadioParams {
        &self.params
    }

    /// Transmission power at emission, in dBm.
    pub fn tx_power_dbm(&self) -> i32 {
        self.params.tx_power_dbm
    }

    pub fn spreading_factor(&self) -> u8 {
        self.params.spreading_factor
    }

    pub fn bandwidth_hz(&self) -> u32 {
        self.params.bandwidth_hz
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn departure_time(&self) -> SimTime {
        self.departure_time
    }

    pub fn time_on_air(&self) -> SimTime {
        self.time_on_air
    }

    /// Time at which the last symbol leaves the air.
    pub fn end_time(&self) -> SimTime {
        self.departure_time + self.time_on_air
    }
}

impl PartialEq for Transmission {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Transmission {}
