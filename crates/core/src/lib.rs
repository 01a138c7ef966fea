//! cellctl core data models.
//!
//! This crate defines the values that flow between the command layer, the
//! device drivers and the task engine of an automation cell controller.

#![warn(missing_docs)]

// Identities
mod id;

// Commands and typed operation records
mod command;
mod operation;
mod lookup;

// Results
mod outcome;
mod event;

// Re-exports
pub use id::*;

pub use command::{Command, Value};
pub use operation::{ArgBundle, DeviceKind, OperationRecord, OperationTag};
pub use lookup::DeviceLookups;
pub use outcome::Outcome;
pub use event::{TaskEvent, TaskEventKind};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

/// Name of the pseudo device that addresses device-less operations
/// (`SYS.DELAY duration:1.5`, `SYS.HALT`, ...).
pub const SYSTEM_DEVICE: &str = "SYS";

/// Device-type tag used to validate commands addressed to [`SYSTEM_DEVICE`].
pub const SYSTEM_KIND: &str = "system";
