//! Operation records - the typed, validated unit of work.

use crate::id::DeviceId;
use serde::{Deserialize, Serialize};

/// Device-type tag (`stepper`, `servo_gripper`, `vision`, ...).
///
/// Kinds are open strings so a new device type needs only a schema entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKind(String);

impl DeviceKind {
    /// Linear stepper actuator
    pub const STEPPER: &'static str = "stepper";
    /// Rotary stage
    pub const ROTARY_STAGE: &'static str = "rotary_stage";
    /// Servo gripper
    pub const SERVO_GRIPPER: &'static str = "servo_gripper";
    /// Vision station (camera trigger)
    pub const VISION: &'static str = "vision";
    /// Relay / digital output bank
    pub const RELAY: &'static str = "relay";
    /// SCARA robot
    pub const SCARA: &'static str = "scara";
    /// PLC-backed node
    pub const PLC: &'static str = "plc";

    /// Create a kind from its tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The tag string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceKind {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// What an operation does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationTag {
    /// Move to an absolute position (`MA`)
    MoveAbsolute,
    /// Move by a relative offset (`MR`)
    MoveRelative,
    /// Return to the home position (`HO`)
    Home,
    /// Open a gripper
    Open,
    /// Close a gripper
    Close,
    /// Close a gripper to a commanded width
    Grip,
    /// Rotate a stage to an angle
    Rotate,
    /// Move a robot to a named point (`MP`)
    MoveToPoint,
    /// Fire a trigger output
    Trigger,
    /// Set a digital output
    SetOutput,
    /// Capture an image with a named profile
    Capture,
    /// Stop the addressed device
    Stop,
    /// Stop every device in the cell (no device required)
    Halt,
    /// Sleep for `duration` seconds (no device required)
    Delay,
    /// Do nothing (no device required)
    NoOp,
    /// Play a media cue (no device required)
    PlayMedia,
    /// Driver-specific operation, passed through by name
    Custom(String),
}

impl OperationTag {
    /// Map an operation name from command text to a tag.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "MA" | "MOVE_ABS" => Self::MoveAbsolute,
            "MR" | "MOVE_REL" => Self::MoveRelative,
            "HO" | "HOME" => Self::Home,
            "OPEN" => Self::Open,
            "CLOSE" => Self::Close,
            "GRIP" => Self::Grip,
            "ROTATE" => Self::Rotate,
            "MP" | "MOVE_POINT" => Self::MoveToPoint,
            "TRIGGER" => Self::Trigger,
            "SET" | "SET_OUTPUT" => Self::SetOutput,
            "CAPTURE" => Self::Capture,
            "STOP" => Self::Stop,
            "HALT" => Self::Halt,
            "DELAY" | "WAIT" => Self::Delay,
            "NOOP" => Self::NoOp,
            "PLAY" | "PLAY_MEDIA" => Self::PlayMedia,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Canonical operation name.
    pub fn name(&self) -> &str {
        match self {
            Self::MoveAbsolute => "MA",
            Self::MoveRelative => "MR",
            Self::Home => "HO",
            Self::Open => "OPEN",
            Self::Close => "CLOSE",
            Self::Grip => "GRIP",
            Self::Rotate => "ROTATE",
            Self::MoveToPoint => "MP",
            Self::Trigger => "TRIGGER",
            Self::SetOutput => "SET",
            Self::Capture => "CAPTURE",
            Self::Stop => "STOP",
            Self::Halt => "HALT",
            Self::Delay => "DELAY",
            Self::NoOp => "NOOP",
            Self::PlayMedia => "PLAY",
            Self::Custom(name) => name,
        }
    }

    /// Whether the operation needs a device to run.
    pub fn requires_device(&self) -> bool {
        !matches!(self, Self::Halt | Self::Delay | Self::NoOp | Self::PlayMedia)
    }

    /// Whether the caller waits for the device's completion channel.
    ///
    /// Stops, halts and fire-and-forget triggers return immediately.
    pub fn is_blocking(&self) -> bool {
        !matches!(
            self,
            Self::Stop | Self::Halt | Self::Trigger | Self::SetOutput | Self::Capture
        )
    }

    /// Whether the operation is a motion-class operation driven by a watchdog.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            Self::MoveAbsolute
                | Self::MoveRelative
                | Self::Home
                | Self::Open
                | Self::Close
                | Self::Grip
                | Self::Rotate
                | Self::MoveToPoint
        )
    }
}

impl std::fmt::Display for OperationTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed arguments of an operation.
///
/// Each tag reads only the subset of fields it needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgBundle {
    /// Target (or relative) position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<f64>,

    /// End position of a sweep
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_position: Option<f64>,

    /// Commanded speed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,

    /// Duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    /// Channel / output / program selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<i64>,

    /// Cartesian or joint coordinates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Vec<f64>>,

    /// Free text (media name, PLC tag, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Named flags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,

    /// Named robot position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<String>,

    /// Named camera profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// A validated operation ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Target device; `None` for device-less operations
    pub device: Option<DeviceId>,

    /// What to do
    pub operation: OperationTag,

    /// Typed arguments
    pub args: ArgBundle,
}

impl OperationRecord {
    /// Create a record for a device.
    pub fn new(device: DeviceId, operation: OperationTag, args: ArgBundle) -> Self {
        Self {
            device: Some(device),
            operation,
            args,
        }
    }

    /// Create a device-less record.
    pub fn detached(operation: OperationTag, args: ArgBundle) -> Self {
        Self {
            device: None,
            operation,
            args,
        }
    }
}
