//! Per-device-type schemas and command validation.

use crate::error::{ConfigError, ValidationError};
use cellctl_core::{Command, DeviceKind, DeviceLookups, Value, SYSTEM_KIND};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, warn};

/// Wildcard entry in `allowed_operations`.
pub const ANY_OPERATION: &str = "*";

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// Integer
    Int,
    /// Float; integers are widened
    Float,
    /// Boolean
    Bool,
    /// String
    String,
    /// List
    List,
    /// Map
    Map,
    /// Any value
    Any,
}

impl ParamType {
    fn describe(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(n) if n.is_f64() => "float",
            Value::Number(_) => "int",
            Value::String(_) => "string",
            Value::Array(_) => "list",
            Value::Object(_) => "map",
        }
    }

    /// Check `value` against this type, returning the (possibly widened) value.
    fn coerce(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Self::Any, v) => Some(v.clone()),
            (Self::Int, Value::Number(n)) if !n.is_f64() => Some(value.clone()),
            (Self::Float, Value::Number(n)) if n.is_f64() => Some(value.clone()),
            (Self::Float, Value::Number(n)) => n.as_f64().map(Value::from),
            (Self::Bool, Value::Bool(_))
            | (Self::String, Value::String(_))
            | (Self::List, Value::Array(_))
            | (Self::Map, Value::Object(_)) => Some(value.clone()),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::String => "string",
            Self::List => "list",
            Self::Map => "map",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// Allowed operations, parameters and result fields of one device type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceTypeSchema {
    /// Allowed operation names (`*` allows any)
    #[serde(default)]
    pub allowed_operations: BTreeSet<String>,

    /// Allowed parameter names and their types
    #[serde(default)]
    pub allowed_parameters: BTreeMap<String, ParamType>,

    /// Fields a device of this type reports back
    #[serde(default)]
    pub result_fields: BTreeSet<String>,

    /// Parameters whose value must appear in a device lookup table
    /// (parameter name -> table name)
    #[serde(default)]
    pub lookups: BTreeMap<String, String>,
}

impl DeviceTypeSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow operations.
    pub fn operations<I, S>(mut self, ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_operations.extend(ops.into_iter().map(Into::into));
        self
    }

    /// Allow a parameter.
    pub fn parameter(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.allowed_parameters.insert(name.into(), ty);
        self
    }

    /// Declare result fields.
    pub fn results<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.result_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Require a parameter's value to appear in a device lookup table.
    pub fn lookup(mut self, parameter: impl Into<String>, table: impl Into<String>) -> Self {
        self.lookups.insert(parameter.into(), table.into());
        self
    }

    /// Whether `operation` is allowed.
    pub fn allows_operation(&self, operation: &str) -> bool {
        self.allowed_operations.contains(ANY_OPERATION)
            || self
                .allowed_operations
                .iter()
                .any(|op| op.eq_ignore_ascii_case(operation))
    }

    /// Check a command against this schema.
    ///
    /// Returns the command with values coerced to their declared types.
    pub fn check(
        &self,
        command: &Command,
        device_type: &str,
        lookups: Option<&DeviceLookups>,
    ) -> Result<Command, ValidationError> {
        if !self.allows_operation(command.operation()) {
            return Err(ValidationError::OperationNotAllowed {
                device_type: device_type.to_string(),
                operation: command.operation().to_string(),
            });
        }

        let mut coerced = BTreeMap::new();
        for (name, value) in command.arguments() {
            let ty = self.allowed_parameters.get(name).ok_or_else(|| {
                ValidationError::ParameterNotAllowed {
                    device_type: device_type.to_string(),
                    parameter: name.clone(),
                }
            })?;
            let value = ty.coerce(value).ok_or_else(|| ValidationError::TypeMismatch {
                parameter: name.clone(),
                expected: ty.to_string(),
                actual: ParamType::describe(value).to_string(),
            })?;

            if let Some(table) = self.lookups.get(name) {
                check_lookup(table, &value, lookups)?;
            }

            coerced.insert(name.clone(), value);
        }

        Ok(command.with_arguments(coerced))
    }
}

fn check_lookup(
    table: &str,
    value: &Value,
    lookups: Option<&DeviceLookups>,
) -> Result<(), ValidationError> {
    // Without device tables only the schema itself is checked.
    let Some(lookups) = lookups else {
        return Ok(());
    };
    let entry = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if lookups.contains(table, &entry) {
        Ok(())
    } else {
        Err(ValidationError::UnknownLookupValue {
            table: table.to_string(),
            value: entry,
        })
    }
}

/// Validate a command against a device type's schema.
///
/// Returns `false` (and logs why) when the operation or a parameter is not
/// allowed or a value has the wrong type after int-to-float widening.
/// Lookup-keyed parameters are not checked; see [`validate_with`].
pub fn validate(command: &Command, schema: &DeviceTypeSchema, device_type: &str) -> bool {
    validate_with(command, schema, device_type, None)
}

/// Like [`validate`], additionally checking lookup-keyed parameters
/// (`profile`, `point`, ...) against a device's tables.
pub fn validate_with(
    command: &Command,
    schema: &DeviceTypeSchema,
    device_type: &str,
    lookups: Option<&DeviceLookups>,
) -> bool {
    match schema.check(command, device_type, lookups) {
        Ok(_) => true,
        Err(e) => {
            warn!("Rejected command '{}': {}", command, e);
            false
        }
    }
}

/// Schemas for every known device type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaRegistry {
    types: BTreeMap<String, DeviceTypeSchema>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a registry from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a registry from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let registry = Self::from_json_str(&content)?;
        debug!(
            "Loaded {} device type schemas from {}",
            registry.types.len(),
            path.as_ref().display()
        );
        Ok(registry)
    }

    /// Register (or replace) a device type.
    pub fn insert(&mut self, device_type: impl Into<String>, schema: DeviceTypeSchema) {
        self.types.insert(device_type.into(), schema);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_type(mut self, device_type: impl Into<String>, schema: DeviceTypeSchema) -> Self {
        self.insert(device_type, schema);
        self
    }

    /// Get the schema of a device type.
    pub fn get(&self, device_type: &str) -> Option<&DeviceTypeSchema> {
        self.types.get(device_type)
    }

    /// Iterate over `(device type, schema)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DeviceTypeSchema)> {
        self.types.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Check a command addressed to a device of `device_type`, including the
    /// device's own lookup tables.
    pub fn check(
        &self,
        command: &Command,
        device_type: &str,
        lookups: Option<&DeviceLookups>,
    ) -> Result<Command, ValidationError> {
        let schema = self
            .get(device_type)
            .ok_or_else(|| ValidationError::UnknownDeviceType(device_type.to_string()))?;
        schema.check(command, device_type, lookups)
    }

    /// Schemas for the device types the controller ships drivers for.
    pub fn builtin() -> Self {
        use ParamType::*;

        Self::new()
            .with_type(
                DeviceKind::STEPPER,
                DeviceTypeSchema::new()
                    .operations(["MA", "MR", "HO", "STOP"])
                    .parameter("position", Float)
                    .parameter("velocity", Float)
                    .results(["position"]),
            )
            .with_type(
                DeviceKind::ROTARY_STAGE,
                DeviceTypeSchema::new()
                    .operations(["ROTATE", "MA", "HO", "STOP"])
                    .parameter("position", Float)
                    .parameter("velocity", Float)
                    .results(["position"]),
            )
            .with_type(
                DeviceKind::SERVO_GRIPPER,
                DeviceTypeSchema::new()
                    .operations(["OPEN", "CLOSE", "GRIP", "STOP"])
                    .parameter("position", Float)
                    .parameter("velocity", Float)
                    .results(["position"]),
            )
            .with_type(
                DeviceKind::VISION,
                DeviceTypeSchema::new()
                    .operations(["CAPTURE", "TRIGGER"])
                    .parameter("profile", String)
                    .parameter("selector", Int)
                    .lookup("profile", "profiles")
                    .results(["image", "result"]),
            )
            .with_type(
                DeviceKind::RELAY,
                DeviceTypeSchema::new()
                    .operations(["TRIGGER", "SET", "STOP"])
                    .parameter("selector", Int)
                    .parameter("duration", Float)
                    .parameter("flags", List)
                    .results(["state"]),
            )
            .with_type(
                DeviceKind::SCARA,
                DeviceTypeSchema::new()
                    .operations(["MP", "MA", "HO", "STOP"])
                    .parameter("point", String)
                    .parameter("coordinates", List)
                    .parameter("velocity", Float)
                    .lookup("point", "points")
                    .results(["coordinates"]),
            )
            .with_type(
                DeviceKind::PLC,
                DeviceTypeSchema::new()
                    .operations([ANY_OPERATION])
                    .parameter("selector", Int)
                    .parameter("position", Float)
                    .parameter("text", String)
                    .parameter("flags", List)
                    .results(["state"]),
            )
            .with_type(
                SYSTEM_KIND,
                DeviceTypeSchema::new()
                    .operations(["DELAY", "HALT", "NOOP", "PLAY"])
                    .parameter("duration", Float)
                    .parameter("text", String),
            )
    }
}
