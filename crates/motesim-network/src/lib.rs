//! # motesim-network
//!
//! Network entities and the shared environment for MoteSim.
//!
//! This crate provides:
//! - Terrain maps and path sampling ([`TerrainMap`])
//! - The entity abstraction with per-run histories ([`NetworkEntity`], [`EntityCore`])
//! - Motes and gateways ([`Mote`], [`Gateway`])
//! - The radio medium, energy accounting and packet loss ([`Environment`])
//! - Link statistics ([`MoteProbe`])
//! - Transmission power self-adaptation ([`AdaptationController`])
//!
//! ## Ownership
//!
//! The [`Environment`] owns every entity and every [`Transmission`]. Entities
//! are addressed by index and only hold the [`EnvironmentId`] of their owner.
//! Histories store [`TransmissionId`]s, so a transmission recorded by a
//! sender and several receivers exists exactly once.
//!
//! [`EnvironmentId`]: motesim_common::EnvironmentId
//! [`TransmissionId`]: motesim_common::TransmissionId

pub mod adaptation;
pub mod entity;
pub mod environment;
pub mod gateway;
pub mod mote;
pub mod probe;
pub mod terrain;
pub mod transmission;

pub use adaptation::{AdaptationConfig, AdaptationController, PowerDecision};
pub use entity::{EntityCore, EntityKind, NetworkEntity, Reception, RunHistory};
pub use environment::{EntityIndex, Environment, EnvironmentConfig, PacketStats};
pub use gateway::Gateway;
pub use mote::{Countdown, Energy, MacCommand, Mote, MoteMetrics, MoteSensor};
pub use probe::MoteProbe;
pub use terrain::{PathProfile, TerrainMap};
pub use transmission::Transmission;
