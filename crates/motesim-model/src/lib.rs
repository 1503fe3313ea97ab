//! # motesim-model
//!
//! Scenario loading and environment construction for MoteSim.
//!
//! This crate provides:
//! - The scenario schema ([`ScenarioConfig`])
//! - Scenario loading from YAML (or JSON) files and strings
//! - Environment construction for the default, bulk and personalized modes
//!
//! ## Modes
//!
//! The mode is taken from the `mode` field when present. Otherwise a scenario
//! listing `motes` or `gateways` is personalized, one giving `num_motes` or
//! `num_gateways` is bulk, and anything else gets the default layout.

pub mod config;
pub mod factory;

pub use config::{GatewayConfig, MoteConfig, MovementType, ScenarioConfig, ScenarioMode, WaypointConfig};
pub use factory::{build_environment, build_scenario, default_map_size, BuiltScenario, MAP_ORIGIN};

use motesim_common::DevEui;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while loading or building a scenario.
#[derive(Debug, Error)]
pub enum ModelError {
    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Two entities share an identifier.
    #[error("Duplicate EUI: {0}")]
    DuplicateEui(DevEui),
}

// ============================================================================
// Scenario Loading
// ============================================================================

/// Load a scenario from a file.
pub fn load_scenario(path: &Path) -> Result<ScenarioConfig, ModelError> {
    let text = std::fs::read_to_string(path)?;
    load_scenario_from_str(&text)
}

/// Parse a scenario from a YAML or JSON string.
///
/// An empty document yields the default scenario.
pub fn load_scenario_from_str(text: &str) -> Result<ScenarioConfig, ModelError> {
    if text.trim().is_empty() {
        return Ok(ScenarioConfig::default());
    }
    Ok(serde_yaml::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_str() {
        let yaml = r#"
mode: personalized
seed: 3
gateways:
  - eui: 100
    x_pos: 0
    y_pos: 0
motes:
  - eui: 1
    x_pos: 25
    y_pos: 0
    sampling_rate: 2
"#;
        let config = load_scenario_from_str(yaml).unwrap();
        assert_eq!(config.mode, Some(ScenarioMode::Personalized));
        let env = build_environment(&config).unwrap();
        assert_eq!(env.motes()[0].sampling_rate(), 2);
    }

    #[test]
    fn test_empty_document_is_default_scenario() {
        let config = load_scenario_from_str("  \n").unwrap();
        assert_eq!(config.resolved_mode(), ScenarioMode::Default);
    }

    #[test]
    fn test_malformed_yaml() {
        let result = load_scenario_from_str("motes: [ {eui: 1");
        assert!(matches!(result, Err(ModelError::Yaml(_))));
    }

    #[test]
    fn test_wrong_field_type() {
        let result = load_scenario_from_str("num_motes: many");
        assert!(matches!(result, Err(ModelError::Yaml(_))));
    }
}
