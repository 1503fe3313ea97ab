//! The shared environment: entity registry, radio medium and run bookkeeping.

use crate::entity::{EntityCore, NetworkEntity, Reception};
use crate::gateway::Gateway;
use crate::mote::{MacCommand, Mote};
use crate::terrain::TerrainMap;
use crate::transmission::Transmission;
use motesim_common::{DevEui, EnvironmentId, GridPos, SimError, SimTime, TransmissionId};
use motesim_radio::{
    received_power_dbm, resolve_collision, sample_gaussian, transmission_energy, LoraPhyConfig,
    RadioParams, SignalWindow,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Index of an entity inside an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityIndex {
    Mote(usize),
    Gateway(usize),
}

/// Environment-wide settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentConfig {
    /// PHY parameters used for every link.
    pub phy: LoraPhyConfig,
    /// Seed for shadow fading.
    pub seed: u64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        EnvironmentConfig {
            phy: LoraPhyConfig::default(),
            seed: 0,
        }
    }
}

/// Sent and lost packet counts of one mote in one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketStats {
    pub sent: usize,
    pub lost: usize,
}

impl PacketStats {
    /// Lost over sent, 0 when nothing was sent.
    pub fn loss_ratio(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.lost as f64 / self.sent as f64
        }
    }
}

/// The shared world every mote and gateway lives in.
///
/// The environment owns all entities and every transmission ever sent in the
/// current session. Entities refer back to it through its [`EnvironmentId`].
#[derive(Debug, Clone)]
pub struct Environment {
    id: EnvironmentId,
    terrain: TerrainMap,
    config: EnvironmentConfig,
    motes: Vec<Mote>,
    gateways: Vec<Gateway>,
    transmissions: Vec<Transmission>,
    runs: usize,
    clock: SimTime,
    ticks: u64,
    rng: ChaCha8Rng,
}

impl Environment {
    pub fn new(terrain: TerrainMap, config: EnvironmentConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Environment {
            id: EnvironmentId::next(),
            terrain,
            config,
            motes: Vec::new(),
            gateways: Vec::new(),
            transmissions: Vec::new(),
            runs: 1,
            clock: SimTime::ZERO,
            ticks: 0,
            rng,
        }
    }

    pub fn id(&self) -> EnvironmentId {
        self.id
    }

    pub fn terrain(&self) -> &TerrainMap {
        &self.terrain
    }

    pub fn phy(&self) -> &LoraPhyConfig {
        &self.config.phy
    }

    // ------------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------------

    /// Register a mote and return its index.
    ///
    /// Identifiers are not deduplicated here.
    pub fn add_mote(&mut self, mut mote: Mote) -> usize {
        mote.core_mut().attach(self.id, self.runs);
        mote.attach_runs(self.runs);
        debug!("Added mote {} at {}", mote.eui(), mote.position());
        self.motes.push(mote);
        self.motes.len() - 1
    }

    /// Register a gateway and return its index.
    pub fn add_gateway(&mut self, mut gateway: Gateway) -> usize {
        gateway.core_mut().attach(self.id, self.runs);
        debug!("Added gateway {} at {}", gateway.eui(), gateway.position());
        self.gateways.push(gateway);
        self.gateways.len() - 1
    }

    pub fn motes(&self) -> &[Mote] {
        &self.motes
    }

    pub fn gateways(&self) -> &[Gateway] {
        &self.gateways
    }

    pub fn mote(&self, index: usize) -> Option<&Mote> {
        self.motes.get(index)
    }

    pub fn mote_mut(&mut self, index: usize) -> Option<&mut Mote> {
        self.motes.get_mut(index)
    }

    pub fn gateway(&self, index: usize) -> Option<&Gateway> {
        self.gateways.get(index)
    }

    /// Index of the first mote with the given identifier.
    pub fn find_mote(&self, eui: DevEui) -> Option<usize> {
        self.motes.iter().position(|m| m.eui() == eui)
    }

    /// Index of the first gateway with the given identifier.
    pub fn find_gateway(&self, eui: DevEui) -> Option<usize> {
        self.gateways.iter().position(|g| g.eui() == eui)
    }

    fn checked_mote(&self, index: usize) -> Result<&Mote, SimError> {
        self.motes.get(index).ok_or(SimError::IndexOutOfRange {
            index,
            len: self.motes.len(),
        })
    }

    fn checked_run(&self, run: usize) -> Result<(), SimError> {
        if run < self.runs {
            Ok(())
        } else {
            Err(SimError::RunOutOfRange { run, runs: self.runs })
        }
    }

    fn core(&self, entity: EntityIndex) -> Result<&EntityCore, SimError> {
        match entity {
            EntityIndex::Mote(index) => self.checked_mote(index).map(|m| m.core()),
            EntityIndex::Gateway(index) => self
                .gateways
                .get(index)
                .map(|g| g.core())
                .ok_or(SimError::IndexOutOfRange {
                    index,
                    len: self.gateways.len(),
                }),
        }
    }

    fn core_mut(&mut self, entity: EntityIndex) -> Result<&mut EntityCore, SimError> {
        let motes = self.motes.len();
        let gateways = self.gateways.len();
        match entity {
            EntityIndex::Mote(index) => self
                .motes
                .get_mut(index)
                .map(|m| m.core_mut())
                .ok_or(SimError::IndexOutOfRange { index, len: motes }),
            EntityIndex::Gateway(index) => self
                .gateways
                .get_mut(index)
                .map(|g| g.core_mut())
                .ok_or(SimError::IndexOutOfRange { index, len: gateways }),
        }
    }

    // ------------------------------------------------------------------------
    // Clock and runs
    // ------------------------------------------------------------------------

    /// Number of runs so far, always at least 1. The current run is
    /// `number_of_runs() - 1`.
    pub fn number_of_runs(&self) -> usize {
        self.runs
    }

    pub fn current_run(&self) -> usize {
        self.runs - 1
    }

    /// Simulated time elapsed.
    pub fn clock(&self) -> SimTime {
        self.clock
    }

    /// Number of ticks since construction or the last reset.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Mark the passage of `duration`.
    pub fn tick(&mut self, duration: SimTime) {
        self.clock += duration;
        self.ticks += 1;
    }

    /// Whether any entity sent something during the current run.
    pub fn current_run_has_history(&self) -> bool {
        let run = self.current_run();
        self.motes.iter().any(|m| !m.core().sent_transmissions(run).is_empty())
            || self.gateways.iter().any(|g| !g.core().sent_transmissions(run).is_empty())
    }

    /// Start a new run. Prior runs stay queryable.
    pub fn begin_new_run(&mut self) {
        self.runs += 1;
        for mote in &mut self.motes {
            mote.begin_run();
        }
        for gateway in &mut self.gateways {
            gateway.begin_run();
        }
        debug!("Environment {:?} started run {}", self.id, self.current_run());
    }

    /// Discard all history and start over from run 0.
    pub fn reset(&mut self) {
        for mote in &mut self.motes {
            mote.reset();
        }
        for gateway in &mut self.gateways {
            gateway.reset();
        }
        self.transmissions.clear();
        self.runs = 1;
        self.clock = SimTime::ZERO;
        self.ticks = 0;
        self.rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        debug!("Environment {:?} reset", self.id);
    }

    // ------------------------------------------------------------------------
    // Radio medium
    // ------------------------------------------------------------------------

    /// Look up a transmission by id.
    pub fn transmission(&self, id: TransmissionId) -> Option<&Transmission> {
        self.transmissions.get(id.0 as usize)
    }

    /// Every transmission since construction or the last reset.
    pub fn transmissions(&self) -> &[Transmission] {
        &self.transmissions
    }

    /// Emit a transmission from `sender` and offer it to every other entity.
    pub fn lora_send(
        &mut self,
        sender: EntityIndex,
        params: RadioParams,
        receiver: DevEui,
        payload: Vec<u8>,
    ) -> Result<TransmissionId, SimError> {
        let run = self.current_run();
        let (sender_eui, origin) = {
            let core = self.core(sender)?;
            (core.eui(), core.position())
        };

        let now = self.clock;
        let id = TransmissionId(self.transmissions.len() as u64);
        let transmission = Transmission::new(id, sender_eui, receiver, params, payload, now, &self.config.phy);
        let signal_end = transmission.end_time();
        self.transmissions.push(transmission);
        self.core_mut(sender)?.record_sent(run, id, now, params.tx_power_dbm);

        trace!(
            "{} sent {:?} at {} dBm, SF{} (ends at {} ms)",
            sender_eui,
            id,
            params.tx_power_dbm,
            params.spreading_factor,
            signal_end.as_millis()
        );

        let targets: Vec<EntityIndex> = (0..self.gateways.len())
            .map(EntityIndex::Gateway)
            .chain((0..self.motes.len()).map(EntityIndex::Mote))
            .filter(|&target| target != sender)
            .collect();

        for target in targets {
            self.deliver(id, &params, origin, target)?;
        }

        Ok(id)
    }

    /// Compute the signal of a transmission at one receiver and record it.
    fn deliver(
        &mut self,
        id: TransmissionId,
        params: &RadioParams,
        origin: GridPos,
        target: EntityIndex,
    ) -> Result<(), SimError> {
        let run = self.current_run();
        let now = self.clock;
        let end_time = self.transmissions[id.0 as usize].end_time();

        let position = self.core(target)?.position();
        let distance = origin.distance_to(&position);
        let profile = self.terrain.path_profile(origin, position);
        let shadowing = if self.config.phy.shadowing {
            sample_gaussian(&mut self.rng, 0.0, profile.dominant.shadow_fading_db())
        } else {
            0.0
        };
        let power = received_power_dbm(params.tx_power_dbm, distance, profile.exponent, shadowing);

        if power < self.config.phy.sensitivity(params.spreading_factor) {
            trace!("{:?} below sensitivity at {:?}: {:.1} dBm", id, target, power);
            return Ok(());
        }

        let signal = SignalWindow {
            id: id.0,
            start_time: now,
            end_time,
            spreading_factor: params.spreading_factor,
            power_dbm: power,
        };
        let capture_threshold = self.config.phy.capture_threshold_db;

        let core = self.core_mut(target)?;
        let outcome = resolve_collision(&signal, core.active_receptions(now), capture_threshold);
        for destroyed in &outcome.destroyed {
            core.mark_collision(run, TransmissionId(*destroyed));
        }
        core.record_reception(
            run,
            Reception {
                transmission: id,
                received_power_dbm: power,
                collision: outcome.incoming_lost,
            },
        );
        core.push_active_reception(signal);

        if !outcome.is_clean() {
            trace!(
                "Collision at {}: {:?} lost={}, destroyed {:?}",
                core.eui(),
                id,
                outcome.incoming_lost,
                outcome.destroyed
            );
        }
        Ok(())
    }

    /// Send an uplink from a mote to the gateways.
    ///
    /// The payload is the MAC command bytes, in command order, followed by
    /// `data`. Returns `Ok(None)` when the mote has no energy left. Every new
    /// transmission is charged to the mote's energy.
    pub fn send_to_gateway(
        &mut self,
        mote: usize,
        data: &[u8],
        mac_commands: &BTreeMap<MacCommand, Vec<u8>>,
    ) -> Result<Option<TransmissionId>, SimError> {
        let run = self.current_run();
        let (params, sent_before) = {
            let m = self.checked_mote(mote)?;
            if !m.has_energy() {
                trace!("Mote {} has no energy, uplink dropped", m.eui());
                return Ok(None);
            }
            (
                RadioParams::uplink(m.tx_power_dbm(), m.spreading_factor()),
                m.core().sent_transmissions(run).len(),
            )
        };

        let mut payload: Vec<u8> = mac_commands.values().flatten().copied().collect();
        payload.extend_from_slice(data);

        let id = self.lora_send(EntityIndex::Mote(mote), params, DevEui::GATEWAYS, payload)?;
        self.charge_new_transmissions(mote, run, sent_before);
        Ok(Some(id))
    }

    /// Charge the energy of every transmission sent after `sent_before`,
    /// at the power recorded for it.
    fn charge_new_transmissions(&mut self, mote: usize, run: usize, sent_before: usize) {
        let costs: Vec<f64> = {
            let core = self.motes[mote].core();
            let sent = core.sent_transmissions(run);
            let powers = core.power_setting_history(run);
            sent.iter()
                .zip(powers)
                .skip(sent_before)
                .filter_map(|(id, &(_, power))| {
                    self.transmission(*id)
                        .map(|tx| transmission_energy(power, tx.time_on_air()))
                })
                .collect()
        };

        let m = &mut self.motes[mote];
        for cost in costs {
            m.note_sent();
            m.record_energy_usage(run, cost);
            m.consume_energy(cost);
        }
    }

    // ------------------------------------------------------------------------
    // Packet loss
    // ------------------------------------------------------------------------

    /// Whether some gateway or another mote received `id` without collision.
    fn received_cleanly(&self, id: TransmissionId, run: usize, sender: usize) -> bool {
        let clean = |core: &EntityCore| {
            core.history(run)
                .and_then(|h| h.reception(id))
                .is_some_and(|r| !r.collision)
        };
        self.gateways.iter().any(|g| clean(g.core()))
            || self
                .motes
                .iter()
                .enumerate()
                .any(|(i, m)| i != sender && clean(m.core()))
    }

    /// Sent and lost counts of a mote in a run, without touching its counters.
    pub fn packet_stats(&self, mote: usize, run: usize) -> Result<PacketStats, SimError> {
        let m = self.checked_mote(mote)?;
        self.checked_run(run)?;
        let sent = m.core().sent_transmissions(run);
        let lost = sent
            .iter()
            .filter(|&&id| !self.received_cleanly(id, run, mote))
            .count();
        Ok(PacketStats { sent: sent.len(), lost })
    }

    /// Packet loss ratio of a mote over a run. Updates the mote's counters.
    pub fn calculate_packet_loss(&mut self, mote: usize, run: usize) -> Result<f64, SimError> {
        let stats = self.packet_stats(mote, run)?;
        self.motes[mote].set_packet_counts(stats.sent, stats.lost);
        Ok(stats.loss_ratio())
    }

    /// Packet loss ratio over the last `window` transmissions of a run.
    pub fn calculate_recent_packet_loss(&self, mote: usize, run: usize, window: usize) -> Result<f64, SimError> {
        let m = self.checked_mote(mote)?;
        self.checked_run(run)?;
        let sent = m.core().sent_transmissions(run);
        let inspected = window.min(sent.len());
        if inspected == 0 {
            return Ok(0.0);
        }

        let lost = sent[sent.len() - inspected..]
            .iter()
            .filter(|&&id| !self.received_cleanly(id, run, mote))
            .count();
        Ok(lost as f64 / inspected as f64)
    }
}
