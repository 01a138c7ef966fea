//! Device arena and the shared cell context.

use crate::device::Device;
use crate::error::DeviceError;
use crate::lock::ExclusiveLock;
use cellctl_core::{DeviceId, DeviceLookups};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

struct Registered {
    device: Arc<dyn Device>,
    lookups: DeviceLookups,
}

/// Owns every driver instance; operation records refer to them by [`DeviceId`].
#[derive(Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceId, Registered>,
    names: HashMap<String, DeviceId>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device with its validation lookup tables.
    pub fn register(
        &mut self,
        device: Arc<dyn Device>,
        lookups: DeviceLookups,
    ) -> Result<DeviceId, DeviceError> {
        let name = device.name().to_string();
        if self.names.contains_key(&name) {
            return Err(DeviceError::DuplicateName(name));
        }
        let id = DeviceId::new();
        self.names.insert(name, id);
        self.devices.insert(id, Registered { device, lookups });
        Ok(id)
    }

    /// Get a device by handle.
    pub fn get(&self, id: DeviceId) -> Option<&Arc<dyn Device>> {
        self.devices.get(&id).map(|r| &r.device)
    }

    /// Find a device handle by name.
    pub fn resolve(&self, name: &str) -> Option<DeviceId> {
        self.names.get(name).copied()
    }

    /// Lookup tables of a device.
    pub fn lookups(&self, id: DeviceId) -> Option<&DeviceLookups> {
        self.devices.get(&id).map(|r| &r.lookups)
    }

    /// Name of a device, for diagnostics.
    pub fn name_of(&self, id: DeviceId) -> Option<&str> {
        self.get(id).map(|d| d.name())
    }

    /// All registered devices.
    pub fn devices(&self) -> impl Iterator<Item = &Arc<dyn Device>> {
        self.devices.values().map(|r| &r.device)
    }

    /// Number of devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Shared context handed to the task engine: the device arena plus the
/// single batch runner slot. Its lifetime is bounded by explicit
/// [`start`](Self::start) and [`shutdown`](Self::shutdown) calls.
pub struct CellContext {
    registry: DeviceRegistry,
    runner: ExclusiveLock,
    started: AtomicBool,
}

impl CellContext {
    /// Wrap a registry.
    pub fn new(registry: DeviceRegistry) -> Self {
        Self {
            registry,
            runner: ExclusiveLock::new(),
            started: AtomicBool::new(false),
        }
    }

    /// The device arena.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// The shared batch execution slot.
    pub fn runner(&self) -> &ExclusiveLock {
        &self.runner
    }

    /// Initialize every device as its own kind.
    pub fn start(&self) -> Result<(), DeviceError> {
        for device in self.registry.devices() {
            device.initialize(device.kind())?;
        }
        self.started.store(true, Ordering::Release);
        info!("Cell started with {} devices", self.registry.len());
        Ok(())
    }

    /// Stop every device and mark the cell stopped.
    pub fn shutdown(&self) {
        self.halt_all();
        self.started.store(false, Ordering::Release);
        info!("Cell shut down");
    }

    /// Whether [`start`](Self::start) has run.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Send stop to every device. Returns how many accepted it.
    pub fn halt_all(&self) -> usize {
        let mut stopped = 0;
        for device in self.registry.devices() {
            match device.stop() {
                Ok(()) => stopped += 1,
                Err(e) => warn!("Device {}: stop failed: {}", device.name(), e),
            }
        }
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimActuator, SimSettings, SimTrigger};
    use cellctl_core::DeviceKind;

    #[test]
    fn test_register_and_resolve() {
        let mut registry = DeviceRegistry::new();
        let z1 = SimActuator::new("Z1", DeviceKind::STEPPER, SimSettings::default());
        let id = registry.register(Arc::new(z1), DeviceLookups::new()).unwrap();

        assert_eq!(registry.resolve("Z1"), Some(id));
        assert_eq!(registry.name_of(id), Some("Z1"));
        assert_eq!(registry.resolve("Z2"), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = DeviceRegistry::new();
        let a = SimTrigger::new("K1", DeviceKind::RELAY, SimSettings::default());
        let b = SimTrigger::new("K1", DeviceKind::RELAY, SimSettings::default());
        registry.register(Arc::new(a), DeviceLookups::new()).unwrap();
        assert_eq!(
            registry.register(Arc::new(b), DeviceLookups::new()),
            Err(DeviceError::DuplicateName("K1".to_string()))
        );
    }

    #[test]
    fn test_start_initializes_devices() {
        let mut registry = DeviceRegistry::new();
        let z1 = Arc::new(SimActuator::new("Z1", DeviceKind::STEPPER, SimSettings::default()));
        registry.register(z1.clone(), DeviceLookups::new()).unwrap();
        let cell = CellContext::new(registry);

        assert!(!z1.current_state().initialized);
        cell.start().unwrap();
        assert!(cell.is_started());
        assert!(z1.current_state().initialized);

        assert_eq!(cell.halt_all(), 1);
        cell.shutdown();
        assert!(!cell.is_started());
    }
}
