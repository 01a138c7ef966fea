//! Spy devices shared by the engine tests.

use cellctl_core::{ArgBundle, DeviceKind, DeviceLookups, OperationRecord, OperationTag};
use cellctl_device::{
    completion_channel, Accepted, CellContext, Device, DeviceError, DeviceRegistry, DeviceStatus,
    MotionPhase,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared invocation log: `Z1.MA`, `G1.OPEN`, `C.done`, ...
pub type Log = Arc<Mutex<Vec<String>>>;

/// Device that records every call and completes after a fixed delay.
pub struct Spy {
    name: String,
    kind: DeviceKind,
    log: Log,
    succeed: bool,
    delay: Duration,
    reject: bool,
    panic: bool,
    stops: AtomicUsize,
    initialized: AtomicBool,
}

impl Spy {
    pub fn new(name: &str, log: &Log) -> Self {
        Self {
            name: name.to_string(),
            kind: DeviceKind::new(DeviceKind::STEPPER),
            log: Arc::clone(log),
            succeed: true,
            delay: Duration::from_millis(5),
            reject: false,
            panic: false,
            stops: AtomicUsize::new(0),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn failing(mut self) -> Self {
        self.succeed = false;
        self
    }

    pub fn rejecting(mut self) -> Self {
        self.reject = true;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::Acquire)
    }
}

impl Device for Spy {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &DeviceKind {
        &self.kind
    }

    fn initialize(&self, _kind: &DeviceKind) -> Result<(), DeviceError> {
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn operate(&self, record: &OperationRecord) -> Result<Accepted, DeviceError> {
        if record.operation == OperationTag::Stop {
            self.stop()?;
            return Ok(Accepted::Immediate);
        }
        if self.reject {
            return Err(DeviceError::Busy(self.name.clone()));
        }
        if self.panic {
            panic!("{} lost its controller", self.name);
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("{}.{}", self.name, record.operation));

        let (tx, rx) = completion_channel(&self.name);
        let log = Arc::clone(&self.log);
        let name = self.name.clone();
        let delay = self.delay;
        let succeed = self.succeed;
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            log.lock().unwrap().push(format!("{name}.done"));
            tx.send(succeed);
        });
        Ok(Accepted::Pending(rx))
    }

    fn stop(&self) -> Result<(), DeviceError> {
        self.stops.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn current_position(&self) -> Option<f64> {
        None
    }

    fn current_state(&self) -> DeviceStatus {
        DeviceStatus {
            initialized: self.initialized.load(Ordering::Acquire),
            busy: false,
            phase: MotionPhase::Idle,
            position: None,
            last_result: None,
        }
    }
}

/// Register devices and start the cell.
pub fn cell(devices: Vec<Arc<dyn Device>>) -> Arc<CellContext> {
    let mut registry = DeviceRegistry::new();
    for device in devices {
        registry.register(device, DeviceLookups::new()).unwrap();
    }
    let cell = CellContext::new(registry);
    cell.start().unwrap();
    Arc::new(cell)
}

/// Record for a named device of `cell`.
pub fn record(cell: &CellContext, device: &str, operation: OperationTag) -> OperationRecord {
    record_with(cell, device, operation, ArgBundle::default())
}

/// Record with arguments for a named device of `cell`.
pub fn record_with(
    cell: &CellContext,
    device: &str,
    operation: OperationTag,
    args: ArgBundle,
) -> OperationRecord {
    let id = cell.registry().resolve(device).unwrap();
    OperationRecord::new(id, operation, args)
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}
