//! Error types for command parsing and validation.

use thiserror::Error;

/// Malformed command text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("command head '{0}' is not of the form DEVICE.OPERATION")]
    MalformedHead(String),

    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("argument '{0}' is missing a ':' separator")]
    MissingSeparator(String),

    #[error("unterminated {0} quote")]
    UnterminatedQuote(char),
}

/// A command that does not satisfy its device type's schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("unknown device type '{0}'")]
    UnknownDeviceType(String),

    #[error("operation '{operation}' is not allowed for device type '{device_type}'")]
    OperationNotAllowed {
        device_type: String,
        operation: String,
    },

    #[error("parameter '{parameter}' is not allowed for device type '{device_type}'")]
    ParameterNotAllowed {
        device_type: String,
        parameter: String,
    },

    #[error("parameter '{parameter}' expects {expected}, got {actual}")]
    TypeMismatch {
        parameter: String,
        expected: String,
        actual: String,
    },

    #[error("'{value}' is not listed in the device's '{table}' table")]
    UnknownLookupValue { table: String, value: String },
}

/// Errors loading schema configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
