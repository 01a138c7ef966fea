//! Device capability contract.
//!
//! Every driver implements [`Device`] and follows the same concurrency
//! discipline: a non-blocking [`ExclusiveLock`] per instance, a one-shot
//! completion channel per accepted operation and, for motion drivers, a
//! [`Watchdog`] thread that drives the move to tolerance and releases the
//! lock.

#![warn(missing_docs)]

pub mod error;
pub mod lock;
pub mod completion;
pub mod device;
pub mod watchdog;
pub mod registry;
pub mod sim;
pub mod config;

pub use error::{ConfigError, DeviceError};
pub use lock::{ExclusiveLock, LockGuard};
pub use completion::{completion_channel, Completion, CompletionReceiver, CompletionSender};
pub use device::{Accepted, Device, DeviceStatus};
pub use watchdog::{
    AxisStatus, MotionBackend, MotionOutcome, MotionPhase, MotionState, Watchdog, WatchdogConfig,
};
pub use registry::{CellContext, DeviceRegistry};
pub use sim::{MoveCommand, SimActuator, SimMotor, SimSettings, SimTrigger};
pub use config::{CellConfig, DeviceSpec};
