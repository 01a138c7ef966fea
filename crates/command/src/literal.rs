//! Structured literal parsing for argument values.
//!
//! Accepts integers, floats, booleans (`true`/`True`), null (`null`/`None`),
//! quoted strings (single or double quotes, JSON escapes), lists `[...]` and
//! maps `{...}`. Anything else is not a literal and is kept as plain text by
//! the caller.

use cellctl_core::Value;
use serde_json::{Map, Number};

/// Coerce raw argument text into a value, falling back to a plain string.
pub fn coerce(raw: &str) -> Value {
    parse_literal(raw).unwrap_or_else(|| Value::String(raw.to_string()))
}

/// Parse a complete literal, or `None` if `raw` is not one.
pub fn parse_literal(raw: &str) -> Option<Value> {
    let mut cursor = Cursor::new(raw);
    let value = cursor.value()?;
    cursor.skip_ws();
    cursor.at_end().then_some(value)
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> Option<Value> {
        self.skip_ws();
        match self.peek()? {
            '[' => self.list(),
            '{' => self.map(),
            '"' | '\'' => self.string().map(Value::String),
            c if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            _ => self.keyword(),
        }
    }

    fn list(&mut self) -> Option<Value> {
        self.bump();
        let mut items = Vec::new();
        self.skip_ws();
        if self.eat(']') {
            return Some(Value::Array(items));
        }
        loop {
            items.push(self.value()?);
            self.skip_ws();
            if self.eat(',') {
                self.skip_ws();
                // trailing comma
                if self.eat(']') {
                    return Some(Value::Array(items));
                }
                continue;
            }
            if self.eat(']') {
                return Some(Value::Array(items));
            }
            return None;
        }
    }

    fn map(&mut self) -> Option<Value> {
        self.bump();
        let mut entries = Map::new();
        self.skip_ws();
        if self.eat('}') {
            return Some(Value::Object(entries));
        }
        loop {
            let key = match self.value()? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            self.skip_ws();
            if !self.eat(':') {
                return None;
            }
            let value = self.value()?;
            entries.insert(key, value);
            self.skip_ws();
            if self.eat(',') {
                self.skip_ws();
                if self.eat('}') {
                    return Some(Value::Object(entries));
                }
                continue;
            }
            if self.eat('}') {
                return Some(Value::Object(entries));
            }
            return None;
        }
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            match self.bump()? {
                c if c == quote => return Some(out),
                '\\' => match self.bump()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    'u' => out.push(self.unicode_escape()?),
                    other => out.push(other),
                },
                c => out.push(c),
            }
        }
    }

    fn unicode_escape(&mut self) -> Option<char> {
        let hex = self.rest().get(..4)?;
        let code = u32::from_str_radix(hex, 16).ok()?;
        self.pos += 4;
        char::from_u32(code)
    }

    fn number(&mut self) -> Option<Value> {
        let start = self.pos;
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '-' | '+' => {}
                '.' | 'e' | 'E' => is_float = true,
                _ => break,
            }
            self.bump();
        }
        let text = self.rest_from(start);
        let text = text.strip_prefix('+').unwrap_or(text);
        if !text.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }
        if is_float {
            let f: f64 = text.parse().ok()?;
            Number::from_f64(f).map(Value::Number)
        } else {
            text.parse::<i64>().ok().map(Value::from)
        }
    }

    fn rest_from(&self, start: usize) -> &'a str {
        &self.src[start..self.pos]
    }

    fn keyword(&mut self) -> Option<Value> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.bump();
        }
        match self.rest_from(start) {
            "true" | "True" => Some(Value::Bool(true)),
            "false" | "False" => Some(Value::Bool(false)),
            "null" | "None" => Some(Value::Null),
            _ => None,
        }
    }
}
