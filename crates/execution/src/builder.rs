//! Turning validated commands into operation records.

use crate::error::BuildError;
use cellctl_command::{parse, SchemaRegistry};
use cellctl_core::{
    ArgBundle, Command, DeviceKind, OperationRecord, OperationTag, Value, SYSTEM_DEVICE, SYSTEM_KIND,
};
use cellctl_device::DeviceRegistry;
use tracing::{debug, warn};

/// Validates commands against the schema registry and resolves device names
/// to registry handles.
pub struct RecordBuilder<'a> {
    schemas: &'a SchemaRegistry,
    devices: &'a DeviceRegistry,
}

impl<'a> RecordBuilder<'a> {
    /// Create a builder over a schema registry and a device registry.
    pub fn new(schemas: &'a SchemaRegistry, devices: &'a DeviceRegistry) -> Self {
        Self { schemas, devices }
    }

    /// Parse and build in one step.
    pub fn build_text(&self, text: &str) -> Result<OperationRecord, BuildError> {
        let command = parse(text)?;
        self.build(&command)
    }

    /// Validate a command and build its record.
    pub fn build(&self, command: &Command) -> Result<OperationRecord, BuildError> {
        let (device, kind, lookups) = if command.device() == SYSTEM_DEVICE {
            (None, DeviceKind::new(SYSTEM_KIND), None)
        } else {
            let id = self
                .devices
                .resolve(command.device())
                .ok_or_else(|| BuildError::UnknownDevice(command.device().to_string()))?;
            let kind = self
                .devices
                .get(id)
                .map(|d| d.kind().clone())
                .ok_or_else(|| BuildError::UnknownDevice(command.device().to_string()))?;
            (Some(id), kind, self.devices.lookups(id))
        };

        let checked = self
            .schemas
            .check(command, kind.as_str(), lookups)
            .inspect_err(|e| warn!("Rejected '{}': {}", command, e))?;

        let operation = OperationTag::from_name(checked.operation());
        if device.is_none() && operation.requires_device() {
            return Err(BuildError::DeviceRequired(operation.to_string()));
        }

        let args = arg_bundle(&checked)?;
        debug!("Built {} for {}", operation, command.device());
        Ok(OperationRecord {
            device,
            operation,
            args,
        })
    }
}

fn arg_bundle(command: &Command) -> Result<ArgBundle, BuildError> {
    let mut args = ArgBundle::default();
    for (name, value) in command.arguments() {
        match name.as_str() {
            "position" => args.position = Some(number(name, value)?),
            "end_position" => args.end_position = Some(number(name, value)?),
            "velocity" => args.velocity = Some(number(name, value)?),
            "duration" => args.duration = Some(number(name, value)?),
            "selector" => {
                args.selector = Some(value.as_i64().ok_or_else(|| invalid(name, "an integer"))?)
            }
            "coordinates" => {
                let list = value.as_array().ok_or_else(|| invalid(name, "a list of numbers"))?;
                let coordinates = list
                    .iter()
                    .map(|v| v.as_f64().ok_or_else(|| invalid(name, "a list of numbers")))
                    .collect::<Result<Vec<_>, _>>()?;
                args.coordinates = Some(coordinates);
            }
            "flags" => {
                let list = value.as_array().ok_or_else(|| invalid(name, "a list of strings"))?;
                args.flags = list.iter().map(text).collect();
            }
            "text" => args.text = Some(text(value)),
            "point" => args.point = Some(text(value)),
            "profile" => args.profile = Some(text(value)),
            other => return Err(BuildError::UnsupportedArgument(other.to_string())),
        }
    }
    Ok(args)
}

fn number(name: &str, value: &Value) -> Result<f64, BuildError> {
    value.as_f64().ok_or_else(|| invalid(name, "a number"))
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn invalid(name: &str, expected: &'static str) -> BuildError {
    BuildError::InvalidArgument {
        name: name.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellctl_command::ValidationError;
    use cellctl_core::DeviceLookups;
    use cellctl_device::{SimActuator, SimSettings, SimTrigger};
    use std::sync::Arc;

    fn devices() -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();
        registry
            .register(
                Arc::new(SimActuator::new("Z1", DeviceKind::STEPPER, SimSettings::default())),
                DeviceLookups::new(),
            )
            .unwrap();
        registry
            .register(
                Arc::new(SimTrigger::new("C1", DeviceKind::VISION, SimSettings::default())),
                DeviceLookups::new().with_table("profiles", ["barcode", "inspect"]),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_build_motion_record() {
        let schemas = SchemaRegistry::builtin();
        let devices = devices();
        let builder = RecordBuilder::new(&schemas, &devices);

        let record = builder.build_text("Z1.MA position:10 velocity:2").unwrap();
        assert_eq!(record.device, devices.resolve("Z1"));
        assert_eq!(record.operation, OperationTag::MoveAbsolute);
        assert_eq!(record.args.position, Some(10.0));
        assert_eq!(record.args.velocity, Some(2.0));
    }

    #[test]
    fn test_system_operations_are_detached() {
        let schemas = SchemaRegistry::builtin();
        let devices = devices();
        let builder = RecordBuilder::new(&schemas, &devices);

        let record = builder.build_text("SYS.DELAY duration:0.5").unwrap();
        assert_eq!(record.device, None);
        assert_eq!(record.operation, OperationTag::Delay);
        assert_eq!(record.args.duration, Some(0.5));

        let record = builder.build_text(r#"SYS.PLAY text:"cycle done""#).unwrap();
        assert_eq!(record.args.text.as_deref(), Some("cycle done"));
    }

    #[test]
    fn test_lookup_tables_apply() {
        let schemas = SchemaRegistry::builtin();
        let devices = devices();
        let builder = RecordBuilder::new(&schemas, &devices);

        let record = builder.build_text("C1.CAPTURE profile:barcode").unwrap();
        assert_eq!(record.args.profile.as_deref(), Some("barcode"));

        assert!(matches!(
            builder.build_text("C1.CAPTURE profile:thermal"),
            Err(BuildError::Validation(ValidationError::UnknownLookupValue { .. }))
        ));
    }

    #[test]
    fn test_rejections() {
        let schemas = SchemaRegistry::builtin();
        let devices = devices();
        let builder = RecordBuilder::new(&schemas, &devices);

        assert!(matches!(
            builder.build_text("Q9.MA position:1"),
            Err(BuildError::UnknownDevice(name)) if name == "Q9"
        ));
        assert!(matches!(
            builder.build_text("Z1.OPEN"),
            Err(BuildError::Validation(ValidationError::OperationNotAllowed { .. }))
        ));
        assert!(matches!(
            builder.build_text("Z1.MA position:fast"),
            Err(BuildError::Validation(ValidationError::TypeMismatch { .. }))
        ));
        assert!(matches!(builder.build_text("Z1 MA"), Err(BuildError::Parse(_))));
    }

    #[test]
    fn test_unmapped_parameter() {
        let schemas = SchemaRegistry::new().with_type(
            DeviceKind::STEPPER,
            cellctl_command::DeviceTypeSchema::new()
                .operations(["MA"])
                .parameter("torque", cellctl_command::ParamType::Float),
        );
        let devices = devices();
        let builder = RecordBuilder::new(&schemas, &devices);
        assert!(matches!(
            builder.build_text("Z1.MA torque:3"),
            Err(BuildError::UnsupportedArgument(name)) if name == "torque"
        ));
    }
}
