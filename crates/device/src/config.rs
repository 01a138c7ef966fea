//! Cell configuration: which devices exist and how they are simulated.
//!
//! ```json
//! {
//!   "devices": [
//!     { "name": "Z1", "kind": "stepper" },
//!     { "name": "C1", "kind": "vision", "lookups": { "profiles": ["barcode"] } }
//!   ]
//! }
//! ```

use crate::device::Device;
use crate::error::ConfigError;
use crate::registry::{CellContext, DeviceRegistry};
use crate::sim::{SimActuator, SimSettings, SimTrigger};
use cellctl_core::{DeviceKind, DeviceLookups};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// One device entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    /// Unique name used in command text
    pub name: String,

    /// Device-type tag
    pub kind: DeviceKind,

    /// Validation lookup tables
    #[serde(default)]
    pub lookups: DeviceLookups,

    /// Simulation behaviour
    #[serde(default)]
    pub sim: SimSettings,
}

impl DeviceSpec {
    /// Create a spec with default simulation settings.
    pub fn new(name: impl Into<String>, kind: impl Into<DeviceKind>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            lookups: DeviceLookups::default(),
            sim: SimSettings::default(),
        }
    }

    /// Set the lookup tables.
    pub fn with_lookups(mut self, lookups: DeviceLookups) -> Self {
        self.lookups = lookups;
        self
    }

    /// Set the simulation behaviour.
    pub fn with_sim(mut self, sim: SimSettings) -> Self {
        self.sim = sim;
        self
    }

    fn driver(&self) -> Result<Arc<dyn Device>, ConfigError> {
        if SimActuator::supports(&self.kind) {
            Ok(Arc::new(SimActuator::new(
                self.name.clone(),
                self.kind.clone(),
                self.sim.clone(),
            )))
        } else if SimTrigger::supports(&self.kind) {
            Ok(Arc::new(SimTrigger::new(
                self.name.clone(),
                self.kind.clone(),
                self.sim.clone(),
            )))
        } else {
            Err(ConfigError::NoDriver {
                device: self.name.clone(),
                kind: self.kind.to_string(),
            })
        }
    }
}

/// The devices of one work cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellConfig {
    /// Device entries
    pub devices: Vec<DeviceSpec>,
}

impl CellConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device.
    pub fn with_device(mut self, spec: DeviceSpec) -> Self {
        self.devices.push(spec);
        self
    }

    /// Parse from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Instantiate drivers and wrap them in a cell context.
    ///
    /// The cell is not started; call [`CellContext::start`].
    pub fn build(&self) -> Result<CellContext, ConfigError> {
        let mut registry = DeviceRegistry::new();
        for spec in &self.devices {
            let driver = spec.driver()?;
            registry.register(driver, spec.lookups.clone())?;
            debug!("Registered {} ({})", spec.name, spec.kind);
        }
        Ok(CellContext::new(registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "devices": [
                    {{ "name": "Z1", "kind": "stepper", "sim": {{ "moving_polls": 3 }} }},
                    {{ "name": "C1", "kind": "vision", "lookups": {{ "profiles": ["barcode"] }} }}
                ]
            }}"#
        )
        .unwrap();

        let config = CellConfig::from_path(file.path()).unwrap();
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[0].sim.moving_polls, 3);
        assert_eq!(config.devices[0].sim.default_velocity, 10.0);
        assert!(config.devices[1].lookups.contains("profiles", "barcode"));

        let cell = config.build().unwrap();
        let c1 = cell.registry().resolve("C1").unwrap();
        assert!(cell.registry().lookups(c1).unwrap().contains("profiles", "barcode"));
        cell.start().unwrap();
        assert!(cell.is_started());
    }

    #[test]
    fn test_unknown_kind_has_no_driver() {
        let config = CellConfig::new().with_device(DeviceSpec::new("R1", "teleporter"));
        assert!(matches!(config.build(), Err(ConfigError::NoDriver { .. })));
    }

    #[test]
    fn test_duplicate_names() {
        let config = CellConfig::new()
            .with_device(DeviceSpec::new("Z1", DeviceKind::STEPPER))
            .with_device(DeviceSpec::new("Z1", DeviceKind::RELAY));
        assert!(matches!(
            config.build(),
            Err(ConfigError::Device(DeviceError::DuplicateName(_)))
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            CellConfig::from_json_str("{ devices: "),
            Err(ConfigError::Json(_))
        ));
    }
}
