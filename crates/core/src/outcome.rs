//! Aggregated execution result.

use serde::{Deserialize, Serialize};

/// Result of running an operation or a task tree.
///
/// Failures never carry an error value across the task-engine boundary, only
/// the name of the device that failed (if one is known).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Whether everything succeeded
    pub success: bool,

    /// Device blamed for the failure
    pub failing_device: Option<String>,
}

impl Outcome {
    /// Successful outcome.
    pub fn ok() -> Self {
        Self {
            success: true,
            failing_device: None,
        }
    }

    /// Failure attributed to a device.
    pub fn failed(device: impl Into<String>) -> Self {
        Self {
            success: false,
            failing_device: Some(device.into()),
        }
    }

    /// Failure with no device to blame (aborted between steps, lost worker).
    pub fn aborted() -> Self {
        Self {
            success: false,
            failing_device: None,
        }
    }

    /// Build from a boolean and the device to blame if it is false.
    pub fn from_bool(success: bool, device: &str) -> Self {
        if success {
            Self::ok()
        } else {
            Self::failed(device)
        }
    }
}
