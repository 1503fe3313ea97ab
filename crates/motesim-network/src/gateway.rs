//! Gateways: stationary receivers with unlimited energy.

use crate::entity::{EntityCore, EntityKind, NetworkEntity};
use motesim_common::{DevEui, GridPos};

/// A stationary receiver.
#[derive(Debug, Clone)]
pub struct Gateway {
    core: EntityCore,
}

impl Gateway {
    pub fn new(eui: DevEui, position: GridPos, tx_power_dbm: i32, spreading_factor: u8) -> Self {
        Gateway {
            core: EntityCore::new(eui, position, tx_power_dbm, spreading_factor),
        }
    }
}

impl NetworkEntity for Gateway {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Gateway
    }
}
