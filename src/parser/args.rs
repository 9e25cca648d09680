// Generic `name(key: value, ...)` call syntax shared by every pipeline
// component, plus typed accessors used when building the plot spec.

use super::aesthetics::parse_expr;
use super::lexer::{boolean_literal, identifier, ws};
use crate::aes::AesExpr;
use crate::data::Value;
use crate::error::{Error, Result};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{map, opt},
    multi::{separated_list0, separated_list1},
    sequence::{delimited, separated_pair, terminated, tuple},
    IResult,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Num(f64),
    Bool(bool),
    /// Anything else that reads as an aesthetic expression (column names,
    /// arithmetic, function calls)
    Expr(AesExpr),
    List(Vec<ArgValue>),
    /// Nested call such as `element_text(size: 12)`
    Call(Call),
    /// `rows ~ cols`; either side may be empty
    Formula { lhs: Vec<String>, rhs: Vec<String> },
}

impl ArgValue {
    fn kind(&self) -> &'static str {
        match self {
            ArgValue::Str(_) => "string",
            ArgValue::Num(_) => "number",
            ArgValue::Bool(_) => "boolean",
            ArgValue::Expr(_) => "expression",
            ArgValue::List(_) => "list",
            ArgValue::Call(_) => "call",
            ArgValue::Formula { .. } => "formula",
        }
    }

    /// Fixed value for a layer parameter, if this is a literal.
    pub fn as_value(&self) -> Option<Value> {
        match self {
            ArgValue::Str(s) => Some(Value::Str(s.clone())),
            ArgValue::Num(n) => Some(Value::Num(*n)),
            _ => None,
        }
    }

    /// Bare words are accepted wherever a string is expected.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            ArgValue::Expr(AesExpr::Column(c)) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub key: Option<String>,
    pub value: ArgValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Arg>,
}

fn formula_side(input: &str) -> IResult<&str, Vec<String>> {
    map(opt(separated_list1(ws(char('+')), ws(identifier))), |vars| {
        vars.unwrap_or_default()
            .into_iter()
            .filter(|v| v != ".")
            .collect()
    })(input)
}

fn formula(input: &str) -> IResult<&str, ArgValue> {
    map(separated_pair(formula_side, ws(char('~')), formula_side), |(lhs, rhs)| {
        ArgValue::Formula { lhs, rhs }
    })(input)
}

fn list(input: &str) -> IResult<&str, ArgValue> {
    map(
        delimited(
            ws(char('[')),
            terminated(separated_list0(ws(char(',')), parse_value), opt(ws(char(',')))),
            ws(char(']')),
        ),
        ArgValue::List,
    )(input)
}

fn expression(input: &str) -> IResult<&str, ArgValue> {
    map(parse_expr, |expr| match expr {
        AesExpr::Literal(Value::Num(n)) => ArgValue::Num(n),
        AesExpr::Literal(Value::Str(s)) => ArgValue::Str(s),
        other => ArgValue::Expr(other),
    })(input)
}

/// One argument value.
pub fn parse_value(input: &str) -> IResult<&str, ArgValue> {
    ws(alt((
        formula,
        list,
        map(boolean_literal, ArgValue::Bool),
        expression,
        map(parse_call, ArgValue::Call),
    )))(input)
}

fn parse_arg(input: &str) -> IResult<&str, Arg> {
    map(
        tuple((opt(terminated(ws(identifier), ws(char(':')))), parse_value)),
        |(key, value)| Arg { key, value },
    )(input)
}

/// `name(arg, ...)`; a trailing comma is allowed.
pub fn parse_call(input: &str) -> IResult<&str, Call> {
    let (input, name) = ws(identifier)(input)?;
    let (input, _) = ws(char('('))(input)?;
    let (input, args) = separated_list0(ws(char(',')), parse_arg)(input)?;
    let (input, _) = opt(ws(tag(",")))(input)?;
    let (input, _) = ws(char(')'))(input)?;
    Ok((input, Call { name, args }))
}

fn invalid(call: &Call, key: &str, expected: &str, got: &ArgValue) -> Error {
    Error::Parse(format!(
        "{}(): argument '{}' expects a {}, got a {}",
        call.name,
        key,
        expected,
        got.kind()
    ))
}

impl Call {
    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.args
            .iter()
            .find(|a| a.key.as_deref() == Some(key))
            .map(|a| &a.value)
    }

    /// The `index`-th argument given without a key.
    pub fn positional(&self, index: usize) -> Option<&ArgValue> {
        self.args.iter().filter(|a| a.key.is_none()).nth(index).map(|a| &a.value)
    }

    /// Fail on keys outside `allowed` and on more than `max_positional`
    /// unnamed arguments.
    pub fn check(&self, allowed: &[&str], max_positional: usize) -> Result<()> {
        if let Some(key) = self
            .args
            .iter()
            .filter_map(|a| a.key.as_deref())
            .find(|k| !allowed.contains(k))
        {
            return Err(Error::Parse(format!("{}(): unknown argument '{}'", self.name, key)));
        }
        let positional = self.args.iter().filter(|a| a.key.is_none()).count();
        if positional > max_positional {
            return Err(Error::Parse(format!(
                "{}(): expected at most {} unnamed argument(s), got {}",
                self.name, max_positional, positional
            )));
        }
        Ok(())
    }

    pub fn num(&self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            None => Ok(None),
            Some(ArgValue::Num(n)) => Ok(Some(*n)),
            Some(other) => Err(invalid(self, key, "number", other)),
        }
    }

    pub fn count(&self, key: &str) -> Result<Option<usize>> {
        match self.num(key)? {
            Some(n) if n >= 1.0 && n.fract() == 0.0 => Ok(Some(n as usize)),
            Some(n) => Err(Error::Parse(format!(
                "{}(): argument '{}' must be a positive integer, got {}",
                self.name, key, n
            ))),
            None => Ok(None),
        }
    }

    pub fn string(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| invalid(self, key, "string", v)),
        }
    }

    pub fn flag(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(ArgValue::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(invalid(self, key, "boolean", other)),
        }
    }

    pub fn numbers(&self, key: &str) -> Result<Option<Vec<f64>>> {
        match self.get(key) {
            None => Ok(None),
            Some(ArgValue::List(items)) => items
                .iter()
                .map(|v| match v {
                    ArgValue::Num(n) => Ok(*n),
                    other => Err(invalid(self, key, "list of numbers", other)),
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(other) => Err(invalid(self, key, "list of numbers", other)),
        }
    }

    pub fn strings(&self, key: &str) -> Result<Option<Vec<String>>> {
        match self.get(key) {
            None => Ok(None),
            Some(ArgValue::List(items)) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string).ok_or_else(|| invalid(self, key, "list of strings", v)))
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(other) => Err(invalid(self, key, "list of strings", other)),
        }
    }

    /// A two-number list such as `limits: [0, 10]`.
    pub fn pair(&self, key: &str) -> Result<Option<(f64, f64)>> {
        match self.numbers(key)? {
            Some(v) if v.len() == 2 => Ok(Some((v[0], v[1]))),
            Some(v) => Err(Error::Parse(format!(
                "{}(): argument '{}' expects two numbers, got {}",
                self.name,
                key,
                v.len()
            ))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_call_with_mixed_args() {
        let (rest, call) = parse_call("point(colour: \"red\", size: 2, x: displ, show_legend: false)").unwrap();
        assert_eq!(rest, "");
        assert_eq!(call.name, "point");
        assert_eq!(call.get("colour"), Some(&ArgValue::Str("red".to_string())));
        assert_eq!(call.num("size").unwrap(), Some(2.0));
        assert_eq!(call.get("x"), Some(&ArgValue::Expr(AesExpr::column("displ"))));
        assert_eq!(call.flag("show_legend").unwrap(), Some(false));
    }

    #[test]
    fn test_nested_calls_and_lists() {
        let (_, call) = parse_call("theme(plot_title: element_text(size: 20), legend_position: [0.9, 0.1],)").unwrap();
        match call.get("plot_title") {
            Some(ArgValue::Call(inner)) => assert_eq!(inner.num("size").unwrap(), Some(20.0)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(call.pair("legend_position").unwrap(), Some((0.9, 0.1)));
    }

    #[test]
    fn test_formula() {
        let (_, call) = parse_call("facet_grid(drv ~ cyl + year)").unwrap();
        assert_eq!(
            call.positional(0),
            Some(&ArgValue::Formula {
                lhs: vec!["drv".to_string()],
                rhs: vec!["cyl".to_string(), "year".to_string()],
            })
        );
        let (_, call) = parse_call("facet_wrap(~class)").unwrap();
        assert!(matches!(call.positional(0), Some(ArgValue::Formula { lhs, .. }) if lhs.is_empty()));
        let (_, call) = parse_call("facet_grid(. ~ cyl)").unwrap();
        assert!(matches!(call.positional(0), Some(ArgValue::Formula { lhs, .. }) if lhs.is_empty()));
    }

    #[test]
    fn test_type_errors() {
        let (_, call) = parse_call("histogram(bins: \"ten\")").unwrap();
        assert!(matches!(call.num("bins"), Err(Error::Parse(_))));
        assert!(call.check(&["binwidth"], 0).is_err());
        let (_, call) = parse_call("histogram(bins: 2.5)").unwrap();
        assert!(call.count("bins").is_err());
    }
}
