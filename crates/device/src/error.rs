//! Error types for device drivers.

use thiserror::Error;

/// Why a driver refused or failed an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Another operation holds the device
    #[error("device {0} is busy")]
    Busy(String),

    /// `initialize` has not succeeded yet
    #[error("device {0} is not initialized")]
    NotInitialized(String),

    /// The driver cannot run this device kind
    #[error("device {device} does not support kind '{kind}'")]
    UnsupportedKind { device: String, kind: String },

    /// The driver does not implement this operation
    #[error("device {device} does not support operation {operation}")]
    Unsupported { device: String, operation: String },

    /// A required argument is absent
    #[error("device {device}: operation {operation} requires '{argument}'")]
    MissingArgument {
        device: String,
        operation: String,
        argument: String,
    },

    /// Protocol or transport failure
    #[error("communication error: {0}")]
    Communication(String),

    /// Two devices registered under one name
    #[error("duplicate device name {0}")]
    DuplicateName(String),
}

/// Errors loading a cell configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No simulated driver exists for the kind
    #[error("no driver for device kind '{kind}' (device {device})")]
    NoDriver { device: String, kind: String },

    /// Registry rejected a device
    #[error(transparent)]
    Device(#[from] DeviceError),
}
