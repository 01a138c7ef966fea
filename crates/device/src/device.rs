//! The capability interface every driver implements.

use crate::completion::CompletionReceiver;
use crate::error::DeviceError;
use crate::watchdog::MotionPhase;
use cellctl_core::{DeviceKind, OperationRecord};

/// How a driver accepted an operation.
#[derive(Debug)]
pub enum Accepted {
    /// Finished (or fired and forgotten) during the call
    Immediate,
    /// Running in the background; the receiver yields exactly one result
    Pending(CompletionReceiver),
}

impl Accepted {
    /// Whether the result arrives later on a completion channel.
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

/// Snapshot of a device's state.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    /// `initialize` succeeded
    pub initialized: bool,

    /// An operation holds the exclusive lock
    pub busy: bool,

    /// Watchdog phase
    pub phase: MotionPhase,

    /// Last known position, if the device has one
    pub position: Option<f64>,

    /// How the last move ended; `None` before the first one
    pub last_result: Option<MotionPhase>,
}

impl DeviceStatus {
    /// Whether the device is moving.
    pub fn in_motion(&self) -> bool {
        self.phase == MotionPhase::InMotion
    }
}

/// A hardware device driver.
///
/// Contract:
/// - `operate` never blocks on hardware I/O. It either rejects immediately
///   (busy, not initialized, bad arguments) or submits the command and
///   returns, starting a watchdog for asynchronous operations.
/// - A busy device rejects a second `operate` with [`DeviceError::Busy`]
///   instead of queueing it.
/// - `stop` may be called from any thread at any time, repeatedly, and on
///   an idle device. It signals and returns without waiting for idle.
pub trait Device: Send + Sync {
    /// Unique device name (`Z1`, `G2`, ...).
    fn name(&self) -> &str;

    /// Device-type tag.
    fn kind(&self) -> &DeviceKind;

    /// Prepare the device to run as `kind`.
    fn initialize(&self, kind: &DeviceKind) -> Result<(), DeviceError>;

    /// Submit an operation.
    fn operate(&self, record: &OperationRecord) -> Result<Accepted, DeviceError>;

    /// Request a stop.
    fn stop(&self) -> Result<(), DeviceError>;

    /// Last known position.
    fn current_position(&self) -> Option<f64>;

    /// Current state snapshot.
    fn current_state(&self) -> DeviceStatus;
}
