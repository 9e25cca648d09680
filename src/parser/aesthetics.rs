// Aesthetic expressions and the `aes(...)` component.

use super::args::{ArgValue, Call};
use super::lexer::{identifier, number_literal, string_literal, ws};
use crate::aes::{Aes, AesExpr, Agg, BinOp, Func, Mapping};
use crate::data::Value;
use crate::error::{Error, Result};
use nom::{
    branch::alt,
    character::complete::{char, one_of},
    combinator::{map, not, peek},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

fn bin_op(c: char) -> BinOp {
    match c {
        '+' => BinOp::Add,
        '-' => BinOp::Sub,
        '*' => BinOp::Mul,
        _ => BinOp::Div,
    }
}

fn fold(first: AesExpr, rest: Vec<(char, AesExpr)>) -> AesExpr {
    rest.into_iter()
        .fold(first, |acc, (op, rhs)| AesExpr::Binary(bin_op(op), Box::new(acc), Box::new(rhs)))
}

/// `f(expr)` where `f` is a known function, aggregate or `after_stat`.
fn function_call(input: &str) -> IResult<&str, AesExpr> {
    let (rest, name) = ws(identifier)(input)?;
    let (rest, arg) = delimited(ws(char('(')), parse_expr, ws(char(')')))(rest)?;
    let expr = if name == "after_stat" || name == "stat" {
        Some(AesExpr::AfterStat(Box::new(arg)))
    } else if let Some(f) = Func::from_name(&name) {
        Some(AesExpr::Call(f, Box::new(arg)))
    } else {
        Agg::from_name(&name).map(|a| AesExpr::Aggregate(a, Box::new(arg)))
    };
    match expr {
        Some(expr) => Ok((rest, expr)),
        None => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Verify))),
    }
}

/// A column name not followed by `(`. The `..name..` form refers to a
/// computed variable.
fn column(input: &str) -> IResult<&str, AesExpr> {
    map(terminated(ws(identifier), not(peek(ws(char('('))))), |name| {
        match name.strip_prefix("..").and_then(|n| n.strip_suffix("..")) {
            Some(inner) if !inner.is_empty() => AesExpr::after_stat(inner),
            _ => AesExpr::Column(name),
        }
    })(input)
}

fn factor(input: &str) -> IResult<&str, AesExpr> {
    ws(alt((
        map(number_literal, |n| AesExpr::Literal(Value::Num(n))),
        map(string_literal, |s| AesExpr::Literal(Value::Str(s))),
        map(preceded(char('-'), factor), |e| match e {
            AesExpr::Literal(Value::Num(n)) => AesExpr::Literal(Value::Num(-n)),
            other => AesExpr::Binary(BinOp::Sub, Box::new(AesExpr::Literal(Value::Num(0.0))), Box::new(other)),
        }),
        delimited(char('('), parse_expr, ws(char(')'))),
        function_call,
        column,
    )))(input)
}

fn term(input: &str) -> IResult<&str, AesExpr> {
    let (input, first) = factor(input)?;
    let (input, rest) = many0(pair(ws(one_of("*/")), factor))(input)?;
    Ok((input, fold(first, rest)))
}

/// Arithmetic expression over columns, literals and function calls.
pub fn parse_expr(input: &str) -> IResult<&str, AesExpr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(ws(one_of("+-")), term))(input)?;
    Ok((input, fold(first, rest)))
}

/// Expression bound to an aesthetic argument.
pub fn expr_of(value: &ArgValue) -> Option<AesExpr> {
    match value {
        ArgValue::Expr(e) => Some(e.clone()),
        ArgValue::Num(n) => Some(AesExpr::Literal(Value::Num(*n))),
        ArgValue::Str(s) => Some(AesExpr::Literal(Value::Str(s.clone()))),
        _ => None,
    }
}

pub fn aes_named(call: &Call, key: &str) -> Result<Aes> {
    Aes::from_name(key).ok_or_else(|| Error::Parse(format!("{}(): unknown aesthetic '{}'", call.name, key)))
}

/// Build the mapping of `aes(x: displ, y: hwy, colour: class)`. The first
/// two unnamed arguments map `x` and `y`.
pub fn build_mapping(call: &Call) -> Result<Mapping> {
    let mut mapping = Mapping::new();
    let mut positional = [Aes::X, Aes::Y].into_iter();
    for arg in &call.args {
        let aes = match &arg.key {
            Some(key) => aes_named(call, key)?,
            None => positional
                .next()
                .ok_or_else(|| Error::Parse("aes(): only x and y may be given without a name".to_string()))?,
        };
        let expr = expr_of(&arg.value).ok_or_else(|| {
            Error::Parse(format!("aes(): '{}' must be a column or an expression", aes))
        })?;
        mapping.insert(aes, expr);
    }
    Ok(mapping)
}
