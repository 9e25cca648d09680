//! Aesthetics and the expressions that map data onto them.

use crate::data::{format_number, RowTable, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A visually perceivable attribute that can be bound to data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aes {
    X,
    Y,
    Xmin,
    Xmax,
    Xend,
    Ymin,
    Ymax,
    Yend,
    Colour,
    Fill,
    Size,
    Shape,
    Alpha,
    Linetype,
    Label,
    Group,
    Weight,
}

impl Aes {
    pub const ALL: [Aes; 17] = [
        Aes::X,
        Aes::Y,
        Aes::Xmin,
        Aes::Xmax,
        Aes::Xend,
        Aes::Ymin,
        Aes::Ymax,
        Aes::Yend,
        Aes::Colour,
        Aes::Fill,
        Aes::Size,
        Aes::Shape,
        Aes::Alpha,
        Aes::Linetype,
        Aes::Label,
        Aes::Group,
        Aes::Weight,
    ];

    pub const X_FAMILY: [Aes; 4] = [Aes::X, Aes::Xmin, Aes::Xmax, Aes::Xend];
    pub const Y_FAMILY: [Aes; 4] = [Aes::Y, Aes::Ymin, Aes::Ymax, Aes::Yend];

    /// Column name the aesthetic occupies in a row table.
    pub fn name(self) -> &'static str {
        match self {
            Aes::X => "x",
            Aes::Y => "y",
            Aes::Xmin => "xmin",
            Aes::Xmax => "xmax",
            Aes::Xend => "xend",
            Aes::Ymin => "ymin",
            Aes::Ymax => "ymax",
            Aes::Yend => "yend",
            Aes::Colour => "colour",
            Aes::Fill => "fill",
            Aes::Size => "size",
            Aes::Shape => "shape",
            Aes::Alpha => "alpha",
            Aes::Linetype => "linetype",
            Aes::Label => "label",
            Aes::Group => "group",
            Aes::Weight => "weight",
        }
    }

    pub fn from_name(name: &str) -> Option<Aes> {
        match name {
            "color" | "col" => Some(Aes::Colour),
            "linewidth" => Some(Aes::Size),
            _ => Aes::ALL.iter().copied().find(|a| a.name() == name),
        }
    }

    pub fn is_position(self) -> bool {
        self.family() == Aes::X || self.family() == Aes::Y
    }

    /// The scale family an aesthetic trains: `xmin`/`xmax`/`xend` share `x`.
    pub fn family(self) -> Aes {
        match self {
            Aes::Xmin | Aes::Xmax | Aes::Xend => Aes::X,
            Aes::Ymin | Aes::Ymax | Aes::Yend => Aes::Y,
            other => other,
        }
    }

    /// Whether values of this aesthetic are drawn from a scale at all.
    pub fn is_scaled(self) -> bool {
        !matches!(self, Aes::Group | Aes::Label | Aes::Weight)
    }
}

impl fmt::Display for Aes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Log10,
    Log,
    Sqrt,
    Abs,
    Exp,
    /// Treat values as discrete labels.
    Factor,
}

impl Func {
    pub fn from_name(name: &str) -> Option<Func> {
        match name {
            "log10" => Some(Func::Log10),
            "log" => Some(Func::Log),
            "sqrt" => Some(Func::Sqrt),
            "abs" => Some(Func::Abs),
            "exp" => Some(Func::Exp),
            "factor" | "as_factor" => Some(Func::Factor),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Func::Log10 => "log10",
            Func::Log => "log",
            Func::Sqrt => "sqrt",
            Func::Abs => "abs",
            Func::Exp => "exp",
            Func::Factor => "factor",
        }
    }

    fn apply(self, v: &Value) -> Value {
        if self == Func::Factor {
            return match v {
                Value::Null => Value::Null,
                other => Value::Str(other.label()),
            };
        }
        let Some(n) = v.as_f64() else { return Value::Null };
        let out = match self {
            Func::Log10 => n.log10(),
            Func::Log => n.ln(),
            Func::Sqrt => n.sqrt(),
            Func::Abs => n.abs(),
            Func::Exp => n.exp(),
            Func::Factor => unreachable!(),
        };
        if out.is_finite() {
            Value::Num(out)
        } else {
            Value::Null
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }
}

/// Whole-column reductions usable inside expressions (`count / max(count)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agg {
    Max,
    Min,
    Sum,
    Mean,
}

impl Agg {
    pub fn from_name(name: &str) -> Option<Agg> {
        match name {
            "max" => Some(Agg::Max),
            "min" => Some(Agg::Min),
            "sum" => Some(Agg::Sum),
            "mean" => Some(Agg::Mean),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Agg::Max => "max",
            Agg::Min => "min",
            Agg::Sum => "sum",
            Agg::Mean => "mean",
        }
    }
}

/// An aesthetic expression evaluated against a row table.
#[derive(Debug, Clone, PartialEq)]
pub enum AesExpr {
    Column(String),
    Literal(Value),
    Call(Func, Box<AesExpr>),
    Binary(BinOp, Box<AesExpr>, Box<AesExpr>),
    Aggregate(Agg, Box<AesExpr>),
    /// Evaluated only after the layer's stat has run.
    AfterStat(Box<AesExpr>),
}

impl AesExpr {
    pub fn column(name: &str) -> AesExpr {
        AesExpr::Column(name.to_string())
    }

    pub fn after_stat(name: &str) -> AesExpr {
        AesExpr::AfterStat(Box::new(AesExpr::column(name)))
    }

    pub fn is_after_stat(&self) -> bool {
        matches!(self, AesExpr::AfterStat(_))
    }

    /// Column names referenced anywhere in the expression.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            AesExpr::Column(c) => vec![c.as_str()],
            AesExpr::Literal(_) => vec![],
            AesExpr::Call(_, e) | AesExpr::Aggregate(_, e) | AesExpr::AfterStat(e) => e.columns(),
            AesExpr::Binary(_, a, b) => {
                let mut cols = a.columns();
                cols.extend(b.columns());
                cols
            }
        }
    }

    /// Evaluate to one value per row. The error is a human-readable reason.
    pub fn eval(&self, table: &RowTable) -> Result<Vec<Value>, String> {
        let n = table.nrow();
        match self {
            AesExpr::Column(name) => table
                .column(name)
                .map(|col| col.into_iter().cloned().collect())
                .ok_or_else(|| format!("column '{}' not found", name)),
            AesExpr::Literal(v) => Ok(vec![v.clone(); n]),
            AesExpr::Call(func, inner) => Ok(inner.eval(table)?.iter().map(|v| func.apply(v)).collect()),
            AesExpr::Binary(op, lhs, rhs) => {
                let a = lhs.eval(table)?;
                let b = rhs.eval(table)?;
                a.iter()
                    .zip(b.iter())
                    .map(|(x, y)| binary(*op, x, y))
                    .collect()
            }
            AesExpr::Aggregate(agg, inner) => {
                let values: Vec<f64> = inner.eval(table)?.iter().filter_map(Value::as_f64).collect();
                let result = if values.is_empty() {
                    Value::Null
                } else {
                    Value::Num(match agg {
                        Agg::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                        Agg::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
                        Agg::Sum => values.iter().sum(),
                        Agg::Mean => values.iter().sum::<f64>() / values.len() as f64,
                    })
                };
                Ok(vec![result; n])
            }
            AesExpr::AfterStat(inner) => inner.eval(table),
        }
    }
}

fn binary(op: BinOp, a: &Value, b: &Value) -> Result<Value, String> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Err(format!("operator '{}' needs numeric operands", op.symbol()));
    };
    let out = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => x / y,
    };
    Ok(if out.is_finite() { Value::Num(out) } else { Value::Null })
}

impl fmt::Display for AesExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AesExpr::Column(c) => write!(f, "{}", c),
            AesExpr::Literal(Value::Str(s)) => write!(f, "\"{}\"", s),
            AesExpr::Literal(Value::Num(n)) => write!(f, "{}", format_number(*n)),
            AesExpr::Literal(Value::Null) => write!(f, "NA"),
            AesExpr::Call(func, e) => write!(f, "{}({})", func.name(), e),
            AesExpr::Binary(op, a, b) => write!(f, "({} {} {})", a, op.symbol(), b),
            AesExpr::Aggregate(agg, e) => write!(f, "{}({})", agg.name(), e),
            AesExpr::AfterStat(e) => write!(f, "after_stat({})", e),
        }
    }
}

/// Aesthetic → expression bindings of a plot or layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mapping(BTreeMap<Aes, AesExpr>);

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an aesthetic to a column (builder style).
    pub fn with(mut self, aes: Aes, column: &str) -> Self {
        self.0.insert(aes, AesExpr::column(column));
        self
    }

    pub fn with_expr(mut self, aes: Aes, expr: AesExpr) -> Self {
        self.0.insert(aes, expr);
        self
    }

    pub fn insert(&mut self, aes: Aes, expr: AesExpr) {
        self.0.insert(aes, expr);
    }

    pub fn get(&self, aes: Aes) -> Option<&AesExpr> {
        self.0.get(&aes)
    }

    pub fn contains(&self, aes: Aes) -> bool {
        self.0.contains_key(&aes)
    }

    pub fn remove(&mut self, aes: Aes) -> Option<AesExpr> {
        self.0.remove(&aes)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Aes, &AesExpr)> {
        self.0.iter()
    }

    pub fn aesthetics(&self) -> impl Iterator<Item = Aes> + '_ {
        self.0.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Layer bindings win over the global ones they override.
    pub fn overlaid_on(&self, global: &Mapping) -> Mapping {
        let mut merged = global.0.clone();
        for (aes, expr) in &self.0 {
            merged.insert(*aes, expr.clone());
        }
        Mapping(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RowTable {
        RowTable::new(
            vec!["a".into(), "count".into()],
            vec![
                vec![Value::Num(10.0), Value::Num(2.0)],
                vec![Value::Num(100.0), Value::Num(4.0)],
            ],
        )
    }

    #[test]
    fn test_aes_names_and_aliases() {
        assert_eq!(Aes::from_name("color"), Some(Aes::Colour));
        assert_eq!(Aes::from_name("ymax"), Some(Aes::Ymax));
        assert_eq!(Aes::Ymax.family(), Aes::Y);
        assert!(Aes::Xend.is_position());
        assert!(!Aes::Fill.is_position());
    }

    #[test]
    fn test_eval_function_and_aggregate() {
        let t = table();
        let expr = AesExpr::Call(Func::Log10, Box::new(AesExpr::column("a")));
        assert_eq!(expr.eval(&t).unwrap(), vec![Value::Num(1.0), Value::Num(2.0)]);

        let scaled = AesExpr::Binary(
            BinOp::Div,
            Box::new(AesExpr::column("count")),
            Box::new(AesExpr::Aggregate(Agg::Max, Box::new(AesExpr::column("count")))),
        );
        assert_eq!(scaled.eval(&t).unwrap(), vec![Value::Num(0.5), Value::Num(1.0)]);
    }

    #[test]
    fn test_eval_missing_column() {
        let err = AesExpr::column("density").eval(&table()).unwrap_err();
        assert!(err.contains("density"));
    }

    #[test]
    fn test_factor_makes_labels() {
        let expr = AesExpr::Call(Func::Factor, Box::new(AesExpr::column("count")));
        assert_eq!(expr.eval(&table()).unwrap(), vec![Value::from("2"), Value::from("4")]);
    }

    #[test]
    fn test_display_round_trips_source_form() {
        let expr = AesExpr::after_stat("count");
        assert_eq!(expr.to_string(), "after_stat(count)");
    }

    #[test]
    fn test_mapping_overlay() {
        let global = Mapping::new().with(Aes::X, "a").with(Aes::Y, "b");
        let layer = Mapping::new().with(Aes::Y, "c");
        let merged = layer.overlaid_on(&global);
        assert_eq!(merged.get(Aes::X), Some(&AesExpr::column("a")));
        assert_eq!(merged.get(Aes::Y), Some(&AesExpr::column("c")));
    }
}
