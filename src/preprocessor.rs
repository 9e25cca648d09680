// `$name` / `${name}` variable expansion applied to DSL text before parsing.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

/// Replace every `$name` or `${name}` with its value. A `$` not followed by
/// an identifier is kept literally and `$$` produces a single `$`.
pub fn expand_variables(input: &str, variables: &HashMap<String, String>) -> Result<String> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            output.push(c);
            continue;
        }
        let name = match chars.peek() {
            Some('$') => {
                chars.next();
                output.push('$');
                continue;
            }
            Some('{') => {
                chars.next();
                let name = consume_identifier(&mut chars);
                if chars.next() != Some('}') {
                    return Err(Error::Parse(format!("unterminated variable reference '${{{}'", name)));
                }
                name
            }
            _ => consume_identifier(&mut chars),
        };
        if name.is_empty() {
            output.push('$');
            continue;
        }
        match variables.get(&name) {
            Some(value) => output.push_str(value),
            None => return Err(Error::Parse(format!("variable '${}' is not defined", name))),
        }
    }

    Ok(output)
}

/// Parse `name=value` command-line definitions.
pub fn parse_definitions<'a, I>(defs: I) -> Result<HashMap<String, String>>
where
    I: IntoIterator<Item = &'a str>,
{
    defs.into_iter()
        .map(|def| match def.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value.to_string())),
            _ => Err(Error::Parse(format!("expected name=value, got '{}'", def))),
        })
        .collect()
}

fn consume_identifier(chars: &mut Peekable<Chars>) -> String {
    let mut name = String::new();
    if let Some(&c) = chars.peek() {
        if !c.is_alphabetic() && c != '_' {
            return name;
        }
    }
    while let Some(&c) = chars.peek() {
        if c.is_alphanumeric() || c == '_' {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    name
}
