// Token-level parsers shared by the DSL component parsers.

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, take_while},
    character::complete::{char, multispace0, satisfy},
    combinator::{map, map_opt, not, peek, recognize, value},
    number::complete::double,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

/// Wrap a parser so it skips surrounding whitespace.
pub fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

/// Column or keyword name: a letter, `_` or `.` followed by letters, digits,
/// `_` or `.`. Backquoted names may contain anything but a backquote.
pub fn identifier(input: &str) -> IResult<&str, String> {
    alt((
        map(
            recognize(pair(
                satisfy(|c| c.is_alphabetic() || c == '_' || c == '.'),
                take_while(is_ident_char),
            )),
            String::from,
        ),
        map(delimited(char('`'), is_not("`"), char('`')), String::from),
    ))(input)
}

fn quoted<'a>(quote: char) -> impl FnMut(&'a str) -> IResult<&'a str, String> {
    let stop = if quote == '"' { "\"\\" } else { "'\\" };
    move |input: &'a str| {
        alt((
            value(String::new(), pair(char(quote), char(quote))),
            delimited(
                char(quote),
                escaped_transform(
                    is_not(stop),
                    '\\',
                    alt((
                        value("\\", char('\\')),
                        value("\"", char('"')),
                        value("'", char('\'')),
                        value("\n", char('n')),
                        value("\t", char('t')),
                    )),
                ),
                char(quote),
            ),
        ))(input)
    }
}

/// Double- or single-quoted string with `\\`, `\"`, `\'`, `\n`, `\t` escapes.
pub fn string_literal(input: &str) -> IResult<&str, String> {
    alt((quoted('"'), quoted('\'')))(input)
}

/// Floating point number (sign and exponent allowed). Words such as `inf`
/// or `nan` are names, not numbers.
pub fn number_literal(input: &str) -> IResult<&str, f64> {
    preceded(
        peek(satisfy(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))),
        double,
    )(input)
}

/// `true` / `false` (also `TRUE` / `FALSE`) not followed by a name character.
pub fn boolean_literal(input: &str) -> IResult<&str, bool> {
    map_opt(
        terminated(identifier, not(peek(ws(char('('))))),
        |word| match word.as_str() {
            "true" | "TRUE" => Some(true),
            "false" | "FALSE" => Some(false),
            _ => None,
        },
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier() {
        assert_eq!(identifier("hwy)"), Ok((")", "hwy".to_string())));
        assert_eq!(identifier("cty_2 "), Ok((" ", "cty_2".to_string())));
        assert_eq!(identifier("`miles per gallon`,"), Ok((",", "miles per gallon".to_string())));
        assert!(identifier("2x").is_err());
    }

    #[test]
    fn test_string_literal() {
        assert_eq!(string_literal("\"red\""), Ok(("", "red".to_string())));
        assert_eq!(string_literal("'a \\'b\\''"), Ok(("", "a 'b'".to_string())));
        assert_eq!(string_literal("\"\""), Ok(("", String::new())));
        assert!(string_literal("\"open").is_err());
    }

    #[test]
    fn test_number_literal() {
        assert_eq!(number_literal("-1.5e2,"), Ok((",", -150.0)));
        assert_eq!(number_literal("42"), Ok(("", 42.0)));
        assert!(number_literal("information").is_err());
    }

    #[test]
    fn test_boolean_literal() {
        assert_eq!(boolean_literal("true)"), Ok((")", true)));
        assert_eq!(boolean_literal("FALSE"), Ok(("", false)));
        assert!(boolean_literal("trueish").is_err());
        assert!(ws(char('|'))("  |  x").is_ok());
    }
}
