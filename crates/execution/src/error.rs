//! Error types for the execution layer.
//!
//! None of these cross the task-engine boundary: once a tree is running,
//! every failure is reported as an [`Outcome`](cellctl_core::Outcome).

use cellctl_command::{ParseError, ValidationError};
use cellctl_core::TaskId;
use thiserror::Error;

/// Command text that cannot become an operation record.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Malformed text
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Schema violation
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// No device with this name in the cell
    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    /// Operation needs a device but was addressed to the system pseudo device
    #[error("operation {0} requires a device")]
    DeviceRequired(String),

    /// Parameter accepted by the schema but not mapped to an argument
    #[error("parameter '{0}' has no operation argument")]
    UnsupportedArgument(String),

    /// Parameter value of the wrong shape
    #[error("parameter '{name}' must be {expected}")]
    InvalidArgument {
        name: String,
        expected: &'static str,
    },
}

/// A task tree that cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// Composite node without children
    #[error("{0} node needs at least one child")]
    EmptyComposite(&'static str),

    /// Batched record with no device
    #[error("simultaneous batch entry {0} has no device")]
    DetachedInBatch(String),
}

/// A submission the scheduler refused.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Another composite root is running and the policy rejects a second one
    #[error("composite task {0} is already active")]
    CompositeActive(TaskId),

    /// The root thread could not be started
    #[error("failed to spawn task thread: {0}")]
    Spawn(#[from] std::io::Error),
}
