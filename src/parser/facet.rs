// `facet_wrap(~ class, ncol: 3)` and `facet_grid(drv ~ cyl, scales: "free_y")`.

use super::args::{ArgValue, Call};
use super::ast::{Facet, FacetScales};
use crate::error::{Error, Result};

pub fn is_facet(name: &str) -> bool {
    name == "facet_wrap" || name == "facet_grid" || name == "facet_null"
}

fn scales(call: &Call) -> Result<FacetScales> {
    match call.string("scales")? {
        Some(name) => FacetScales::from_name(&name)
            .ok_or_else(|| Error::Parse(format!("{}(): unknown scales '{}'", call.name, name))),
        None => Ok(FacetScales::Fixed),
    }
}

/// Facet variables from a formula, a list or a bare column name.
fn variables(call: &Call, key: &str, index: usize) -> Result<Option<(Vec<String>, Vec<String>)>> {
    let value = call.get(key).or_else(|| call.positional(index));
    Ok(match value {
        None => None,
        Some(ArgValue::Formula { lhs, rhs }) => Some((lhs.clone(), rhs.clone())),
        Some(ArgValue::List(_)) => call.strings(key)?.map(|vars| (Vec::new(), vars)),
        Some(other) => match other.as_str() {
            Some(name) => Some((Vec::new(), vec![name.to_string()])),
            None => return Err(Error::Parse(format!("{}(): expected facet variables", call.name))),
        },
    })
}

pub fn build_facet(call: &Call) -> Result<Facet> {
    match call.name.as_str() {
        "facet_null" => {
            call.check(&[], 0)?;
            Ok(Facet::None)
        }
        "facet_wrap" => {
            call.check(&["facets", "ncol", "nrow", "scales"], 1)?;
            let (lhs, rhs) = variables(call, "facets", 0)?
                .ok_or_else(|| Error::Parse("facet_wrap(): expected facet variables".to_string()))?;
            let vars: Vec<String> = lhs.into_iter().chain(rhs).collect();
            if vars.is_empty() {
                return Err(Error::Parse("facet_wrap(): expected at least one variable".to_string()));
            }
            Ok(Facet::Wrap {
                vars,
                ncol: call.count("ncol")?,
                nrow: call.count("nrow")?,
                scales: scales(call)?,
            })
        }
        "facet_grid" => {
            call.check(&["rows", "cols", "scales"], 1)?;
            let (rows, cols) = match variables(call, "rows", 0)? {
                Some((lhs, rhs)) if call.get("rows").is_none() => (lhs, rhs),
                Some((_, rows)) => (rows, Vec::new()),
                None => (Vec::new(), Vec::new()),
            };
            let cols = match call.get("cols") {
                Some(_) => variables(call, "cols", usize::MAX)?.map(|(_, c)| c).unwrap_or_default(),
                None => cols,
            };
            if rows.is_empty() && cols.is_empty() {
                return Err(Error::Parse("facet_grid(): expected row or column variables".to_string()));
            }
            Ok(Facet::Grid {
                rows,
                cols,
                scales: scales(call)?,
            })
        }
        other => Err(Error::Parse(format!("unknown facet '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::args::parse_call;

    fn facet(input: &str) -> Result<Facet> {
        let (_, call) = parse_call(input).unwrap();
        build_facet(&call)
    }

    #[test]
    fn test_wrap() {
        assert_eq!(
            facet("facet_wrap(~ class, ncol: 3)").unwrap(),
            Facet::Wrap {
                vars: vec!["class".to_string()],
                ncol: Some(3),
                nrow: None,
                scales: FacetScales::Fixed
            }
        );
        assert_eq!(facet("facet_wrap(class)").unwrap(), Facet::wrap(&["class"]));
        assert!(facet("facet_wrap(~ .)").is_err());
    }

    #[test]
    fn test_grid() {
        assert_eq!(
            facet("facet_grid(drv ~ cyl, scales: \"free_y\")").unwrap(),
            Facet::Grid {
                rows: vec!["drv".to_string()],
                cols: vec!["cyl".to_string()],
                scales: FacetScales::FreeY
            }
        );
        assert_eq!(facet("facet_grid(. ~ cyl)").unwrap(), Facet::grid(&[], &["cyl"]));
        assert_eq!(facet("facet_grid(rows: drv, cols: [cyl, year])").unwrap(), Facet::grid(&["drv"], &["cyl", "year"]));
    }
}
