//! Command model - the parsed form of `DEVICE.OPERATION key:value ...` text.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Literal argument value (integer, float, boolean, null, list, map or string).
pub type Value = serde_json::Value;

/// A command addressed to one device.
///
/// Commands are immutable once constructed; schema coercion produces a new
/// command instead of editing one in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    device: String,
    operation: String,
    arguments: BTreeMap<String, Value>,
}

impl Command {
    /// Create a new command.
    pub fn new(
        device: impl Into<String>,
        operation: impl Into<String>,
        arguments: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            device: device.into(),
            operation: operation.into(),
            arguments,
        }
    }

    /// Device name (left of the dot).
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Operation name (right of the dot).
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// All `key:value` arguments.
    pub fn arguments(&self) -> &BTreeMap<String, Value> {
        &self.arguments
    }

    /// Get a single argument.
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    /// Copy of this command with a different argument map.
    pub fn with_arguments(&self, arguments: BTreeMap<String, Value>) -> Self {
        Self {
            device: self.device.clone(),
            operation: self.operation.clone(),
            arguments,
        }
    }

    /// Render the command back into command text.
    ///
    /// The output parses back into an equal command.
    pub fn to_text(&self) -> String {
        let mut text = format!("{}.{}", self.device, self.operation);
        for (key, value) in &self.arguments {
            text.push(' ');
            text.push_str(key);
            text.push(':');
            text.push_str(&render_value(value));
        }
        text
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::String(s) if is_bare_word(s) => s.clone(),
        // Single quotes keep the JSON text intact through the shell-style split.
        _ => format!("'{}'", value.to_string().replace('\'', "\\u0027")),
    }
}

fn is_bare_word(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    if matches!(s, "true" | "false" | "null" | "True" | "False" | "None") {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_text_bare_and_quoted() {
        let mut args = BTreeMap::new();
        args.insert("position".to_string(), json!(10));
        args.insert("label".to_string(), json!("pick up"));
        args.insert("mode".to_string(), json!("fast"));
        let command = Command::new("Z1", "MA", args);

        assert_eq!(
            command.to_text(),
            r#"Z1.MA label:'"pick up"' mode:fast position:10"#
        );
    }

    #[test]
    fn test_keyword_strings_are_quoted() {
        let mut args = BTreeMap::new();
        args.insert("text".to_string(), json!("true"));
        let command = Command::new("SYS", "PLAY", args);
        assert_eq!(command.to_text(), r#"SYS.PLAY text:'"true"'"#);
    }

    #[test]
    fn test_apostrophe_is_escaped() {
        let mut args = BTreeMap::new();
        args.insert("text".to_string(), json!("it's"));
        let command = Command::new("SYS", "PLAY", args);
        assert_eq!(command.to_text(), r#"SYS.PLAY text:'"it\u0027s"'"#);
    }
}
