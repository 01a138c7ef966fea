//! Shell-style tokenizer for command text.
//!
//! Tokens are separated by whitespace. At the top level, quotes group text
//! (including whitespace) and are removed, as a shell would. Inside `[...]`
//! and `{...}` whitespace does not split and quotes are kept verbatim so the
//! literal parser still sees them.

use crate::error::ParseError;

/// Split command text into tokens.
pub fn split(text: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut depth = 0usize;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() && depth == 0 => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '"' | '\'' => {
                in_token = true;
                if depth > 0 {
                    current.push(c);
                    read_quoted_verbatim(&mut chars, c, &mut current)?;
                } else if c == '"' {
                    read_double_quoted(&mut chars, &mut current)?;
                } else {
                    read_single_quoted(&mut chars, &mut current)?;
                }
            }
            '[' | '{' => {
                in_token = true;
                depth += 1;
                current.push(c);
            }
            ']' | '}' => {
                in_token = true;
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }

    if in_token {
        tokens.push(current);
    }

    Ok(tokens)
}

/// `"..."` at top level: `\"` and `\\` are escapes, quotes are dropped.
fn read_double_quoted(
    chars: &mut std::str::Chars<'_>,
    out: &mut String,
) -> Result<(), ParseError> {
    while let Some(c) = chars.next() {
        match c {
            '"' => return Ok(()),
            '\\' => match chars.next() {
                Some(escaped @ ('"' | '\\')) => out.push(escaped),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => break,
            },
            c => out.push(c),
        }
    }
    Err(ParseError::UnterminatedQuote('"'))
}

/// `'...'` at top level: no escapes, quotes are dropped.
fn read_single_quoted(
    chars: &mut std::str::Chars<'_>,
    out: &mut String,
) -> Result<(), ParseError> {
    for c in chars.by_ref() {
        if c == '\'' {
            return Ok(());
        }
        out.push(c);
    }
    Err(ParseError::UnterminatedQuote('\''))
}

/// Quoted text nested in brackets: copied as-is, closing quote included.
fn read_quoted_verbatim(
    chars: &mut std::str::Chars<'_>,
    quote: char,
    out: &mut String,
) -> Result<(), ParseError> {
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
            continue;
        }
        if c == quote {
            return Ok(());
        }
    }
    Err(ParseError::UnterminatedQuote(quote))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_whitespace() {
        let tokens = split("  Z1.MA   position:10\tvelocity:5 ").unwrap();
        assert_eq!(tokens, vec!["Z1.MA", "position:10", "velocity:5"]);
    }

    #[test]
    fn test_split_double_quotes() {
        let tokens = split(r#"SYS.PLAY text:"hello world" other:"a \"b\"""#).unwrap();
        assert_eq!(tokens, vec!["SYS.PLAY", "text:hello world", r#"other:a "b""#]);
    }

    #[test]
    fn test_split_single_quotes() {
        let tokens = split(r#"SYS.PLAY text:'"two words"'"#).unwrap();
        assert_eq!(tokens, vec!["SYS.PLAY", r#"text:"two words""#]);
    }

    #[test]
    fn test_split_brackets_keep_whitespace() {
        let tokens = split(r#"R1.MA coordinates:[1, 2, 3] map:{"a b": 1}"#).unwrap();
        assert_eq!(
            tokens,
            vec!["R1.MA", "coordinates:[1, 2, 3]", r#"map:{"a b": 1}"#]
        );
    }

    #[test]
    fn test_empty_quoted_token() {
        let tokens = split(r#"SYS.PLAY text:"""#).unwrap();
        assert_eq!(tokens, vec!["SYS.PLAY", "text:"]);
    }

    #[test]
    fn test_unterminated_quote() {
        assert_eq!(
            split(r#"SYS.PLAY text:"oops"#),
            Err(ParseError::UnterminatedQuote('"'))
        );
        assert_eq!(
            split("SYS.PLAY text:'oops"),
            Err(ParseError::UnterminatedQuote('\''))
        );
    }
}
