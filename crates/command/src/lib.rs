//! Command DSL
//!
//! Parses `DEVICE.OPERATION key:value ...` text into [`Command`]s and checks
//! them against per-device-type schemas before they reach a device.
//!
//! [`Command`]: cellctl_core::Command

#![warn(missing_docs)]

pub mod error;
pub mod lexer;
pub mod literal;
pub mod parser;
pub mod schema;

pub use error::{ConfigError, ParseError, ValidationError};
pub use parser::parse;
pub use schema::{validate, validate_with, DeviceTypeSchema, ParamType, SchemaRegistry};
