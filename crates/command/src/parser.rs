//! Command text parser.
//!
//! Grammar:
//!
//! ```text
//! <command>   ::= <device> "." <operation> (<ws> <kv>)*
//! <kv>        ::= identifier ":" <literal-or-string>
//! ```

use crate::error::ParseError;
use crate::lexer;
use crate::literal;
use cellctl_core::Command;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn identifier() -> &'static Regex {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"))
}

/// Parse command text into a [`Command`].
pub fn parse(text: &str) -> Result<Command, ParseError> {
    let tokens = lexer::split(text)?;
    let Some((head, rest)) = tokens.split_first() else {
        return Err(ParseError::Empty);
    };

    let (device, operation) = split_head(head)?;

    let mut arguments = BTreeMap::new();
    for token in rest {
        let (key, raw) = token
            .split_once(':')
            .ok_or_else(|| ParseError::MissingSeparator(token.clone()))?;
        check_identifier(key)?;
        arguments.insert(key.to_string(), literal::coerce(raw));
    }

    Ok(Command::new(device, operation, arguments))
}

fn split_head(head: &str) -> Result<(&str, &str), ParseError> {
    match head.split_once('.') {
        Some((device, operation)) if !device.is_empty() && !operation.is_empty() => {
            check_identifier(device)?;
            check_identifier(operation)?;
            Ok((device, operation))
        }
        _ => Err(ParseError::MalformedHead(head.to_string())),
    }
}

fn check_identifier(ident: &str) -> Result<(), ParseError> {
    if identifier().is_match(ident) {
        Ok(())
    } else {
        Err(ParseError::InvalidIdentifier(ident.to_string()))
    }
}
