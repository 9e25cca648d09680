// Layer components: `point(...)`, `histogram(bins: 20)`, `stat_summary(...)`.

use super::aesthetics::{build_mapping, expr_of};
use super::args::{ArgValue, Call};
use super::ast::{DataFn, Geom, Layer, LayerData, Position, SmoothMethod, Stat, SummaryFun, ViolinScale};
use crate::aes::Aes;
use crate::error::{Error, Result};

const LAYER_KEYS: &[&str] = &["stat", "geom", "position", "data", "width", "show_legend", "inherit_aes", "reverse", "seed"];

/// Keys each stat accepts.
fn stat_keys(stat: &Stat) -> &'static [&'static str] {
    match stat {
        Stat::Bin { .. } => &["bins", "binwidth", "boundary"],
        Stat::Smooth { .. } => &["method", "se", "level", "n"],
        Stat::Boxplot { .. } => &["coef"],
        Stat::Density { .. } => &["adjust", "n"],
        Stat::Ydensity { .. } => &["adjust", "n", "scale", "trim"],
        Stat::Summary { .. } => &["fun"],
        Stat::Identity | Stat::Count => &[],
    }
}

const ALL_STAT_KEYS: &[&str] = &[
    "bins", "binwidth", "boundary", "method", "se", "level", "n", "coef", "adjust", "scale", "trim", "fun",
];

fn named<T>(call: &Call, key: &str, parse: fn(&str) -> Option<T>) -> Result<Option<T>> {
    match call.string(key)? {
        Some(name) => parse(&name)
            .map(Some)
            .ok_or_else(|| Error::Parse(format!("{}(): unknown {} '{}'", call.name, key, name))),
        None => Ok(None),
    }
}

fn with_stat_params(stat: Stat, call: &Call) -> Result<Stat> {
    if let Some(key) = ALL_STAT_KEYS
        .iter()
        .find(|k| call.get(k).is_some() && !stat_keys(&stat).contains(k))
    {
        return Err(Error::Parse(format!(
            "{}(): argument '{}' does not apply to stat '{}'",
            call.name,
            key,
            stat.name()
        )));
    }
    Ok(match stat {
        Stat::Bin { bins, binwidth, boundary } => Stat::Bin {
            bins: call.count("bins")?.unwrap_or(bins),
            binwidth: call.num("binwidth")?.or(binwidth),
            boundary: call.num("boundary")?.or(boundary),
        },
        Stat::Smooth { method, se, level, n } => Stat::Smooth {
            method: named(call, "method", SmoothMethod::from_name)?.unwrap_or(method),
            se: call.flag("se")?.unwrap_or(se),
            level: call.num("level")?.unwrap_or(level),
            n: call.count("n")?.unwrap_or(n),
        },
        Stat::Boxplot { coef } => Stat::Boxplot {
            coef: call.num("coef")?.unwrap_or(coef),
        },
        Stat::Density { adjust, n } => Stat::Density {
            adjust: call.num("adjust")?.unwrap_or(adjust),
            n: call.count("n")?.unwrap_or(n),
        },
        Stat::Ydensity { adjust, n, scale, trim } => Stat::Ydensity {
            adjust: call.num("adjust")?.unwrap_or(adjust),
            n: call.count("n")?.unwrap_or(n),
            scale: named(call, "scale", ViolinScale::from_name)?.unwrap_or(scale),
            trim: call.flag("trim")?.unwrap_or(trim),
        },
        Stat::Summary { fun } => Stat::Summary {
            fun: named(call, "fun", SummaryFun::from_name)?.unwrap_or(fun),
        },
        other => other,
    })
}

/// `position: "dodge"` or `position: jitter(width: 0.2, seed: 1)`.
fn position_of(call: &Call) -> Result<Option<Position>> {
    let Some(value) = call.get("position") else { return Ok(None) };
    let (name, inner) = match value {
        ArgValue::Call(inner) => (inner.name.as_str(), Some(inner)),
        other => match other.as_str() {
            Some(name) => (name, None),
            None => return Err(Error::Parse(format!("{}(): invalid position", call.name))),
        },
    };
    let name = name.strip_prefix("position_").unwrap_or(name);
    let base = Position::from_name(name)
        .ok_or_else(|| Error::Parse(format!("{}(): unknown position '{}'", call.name, name)))?;
    let Some(inner) = inner else { return Ok(Some(base)) };
    Ok(Some(match base {
        Position::Stack { .. } => {
            inner.check(&["reverse"], 0)?;
            Position::Stack {
                reverse: inner.flag("reverse")?.unwrap_or(false),
            }
        }
        Position::Fill { .. } => {
            inner.check(&["reverse"], 0)?;
            Position::Fill {
                reverse: inner.flag("reverse")?.unwrap_or(false),
            }
        }
        Position::Dodge { .. } => {
            inner.check(&["width"], 0)?;
            Position::Dodge { width: inner.num("width")? }
        }
        Position::Jitter { .. } => {
            inner.check(&["width", "height", "seed"], 0)?;
            Position::Jitter {
                width: inner.num("width")?,
                height: inner.num("height")?,
                seed: inner.num("seed")?.map(|s| s as u64),
            }
        }
        Position::Nudge { .. } => {
            inner.check(&["x", "y"], 0)?;
            Position::Nudge {
                x: inner.num("x")?.unwrap_or(0.0),
                y: inner.num("y")?.unwrap_or(0.0),
            }
        }
        Position::Identity => Position::Identity,
    }))
}

/// Top-level `reverse:` / `seed:` shortcuts.
fn with_position_shortcuts(position: Position, call: &Call) -> Result<Position> {
    let reverse = call.flag("reverse")?;
    let seed = call.num("seed")?.map(|s| s as u64);
    Ok(match position {
        Position::Stack { reverse: r } => Position::Stack {
            reverse: reverse.unwrap_or(r),
        },
        Position::Fill { reverse: r } => Position::Fill {
            reverse: reverse.unwrap_or(r),
        },
        Position::Jitter { width, height, seed: s } => Position::Jitter {
            width,
            height,
            seed: seed.or(s),
        },
        other if reverse.is_some() || seed.is_some() => {
            return Err(Error::Parse(format!(
                "{}(): 'reverse' and 'seed' do not apply to position '{}'",
                call.name,
                other.name()
            )))
        }
        other => other,
    })
}

/// `data: filter(class: "suv")` or `data: head(10)`.
fn data_of(call: &Call) -> Result<Option<LayerData>> {
    let Some(value) = call.get("data") else { return Ok(None) };
    let ArgValue::Call(f) = value else {
        return Err(Error::Parse(format!("{}(): 'data' expects filter(...) or head(...)", call.name)));
    };
    let func = match f.name.as_str() {
        "filter" => {
            let [arg] = f.args.as_slice() else {
                return Err(Error::Parse("filter(): expected exactly one column: value condition".to_string()));
            };
            let (Some(column), Some(value)) = (&arg.key, arg.value.as_value()) else {
                return Err(Error::Parse("filter(): expected column: value".to_string()));
            };
            DataFn::filter_eq(column, &value.label())
        }
        "head" => {
            let n = match (f.positional(0), f.get("n")) {
                (Some(ArgValue::Num(n)), _) | (None, Some(ArgValue::Num(n))) if *n >= 0.0 => *n as usize,
                _ => return Err(Error::Parse("head(): expected a row count".to_string())),
            };
            DataFn::head(n)
        }
        other => return Err(Error::Parse(format!("unknown data function '{}'", other))),
    };
    Ok(Some(LayerData::Function(func)))
}

/// Whether a call names a layer component.
pub fn is_layer(name: &str) -> bool {
    Geom::from_name(name).is_some() || name.strip_prefix("stat_").and_then(Stat::from_name).is_some()
}

/// Build a layer from `geom(...)` or `stat_<name>(geom: "...")`.
pub fn build_layer(call: &Call) -> Result<Layer> {
    let (geom, stat) = match call.name.strip_prefix("stat_").and_then(Stat::from_name) {
        Some(stat) => {
            let geom = match call.string("geom")? {
                Some(name) => Geom::from_name(&name)
                    .ok_or_else(|| Error::Parse(format!("{}(): unknown geom '{}'", call.name, name)))?,
                None => Geom::Point,
            };
            (geom, stat)
        }
        None => {
            let geom = Geom::from_name(&call.name)
                .ok_or_else(|| Error::Parse(format!("unknown component '{}'", call.name)))?;
            let stat = named(call, "stat", Stat::from_name)?.unwrap_or_else(|| geom.default_stat());
            (geom, stat)
        }
    };

    let mut layer = Layer::new(geom).stat(with_stat_params(stat, call)?);
    let position = position_of(call)?.unwrap_or_else(|| geom.default_position());
    layer = layer.position(with_position_shortcuts(position, call)?);
    if let Some(data) = data_of(call)? {
        layer = layer.data(data);
    }
    if let Some(width) = call.num("width")? {
        layer = layer.width(width);
    }
    if let Some(show) = call.flag("show_legend")? {
        layer = layer.show_legend(show);
    }
    if let Some(inherit) = call.flag("inherit_aes")? {
        layer = layer.inherit_aes(inherit);
    }

    for arg in &call.args {
        let Some(key) = arg.key.as_deref() else {
            match &arg.value {
                ArgValue::Call(inner) if inner.name == "aes" => {
                    layer.mapping = build_mapping(inner)?.overlaid_on(&layer.mapping);
                    continue;
                }
                _ => {
                    return Err(Error::Parse(format!(
                        "{}(): unnamed arguments other than aes(...) are not accepted",
                        call.name
                    )))
                }
            }
        };
        if LAYER_KEYS.contains(&key) || ALL_STAT_KEYS.contains(&key) {
            continue;
        }
        let aes = Aes::from_name(key)
            .ok_or_else(|| Error::Parse(format!("{}(): unknown argument '{}'", call.name, key)))?;
        match &arg.value {
            ArgValue::Str(_) | ArgValue::Num(_) => {
                if let Some(value) = arg.value.as_value() {
                    layer = layer.param(aes, value);
                }
            }
            other => {
                let expr = expr_of(other).ok_or_else(|| {
                    Error::Parse(format!("{}(): '{}' must be a value or an expression", call.name, key))
                })?;
                layer = layer.map(aes, expr);
            }
        }
    }
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aes::AesExpr;
    use crate::data::Value;
    use crate::parser::args::parse_call;

    fn layer(input: &str) -> Result<Layer> {
        let (rest, call) = parse_call(input).unwrap();
        assert!(rest.is_empty());
        build_layer(&call)
    }

    #[test]
    fn test_point_params_and_mappings() {
        let l = layer("point(colour: \"red\", size: 3, y: hwy * 2)").unwrap();
        assert_eq!(l.geom, Geom::Point);
        assert_eq!(l.params.get(&Aes::Colour), Some(&Value::from("red")));
        assert_eq!(l.params.get(&Aes::Size), Some(&Value::Num(3.0)));
        assert!(l.mapping.contains(Aes::Y));
    }

    #[test]
    fn test_histogram_bins() {
        let l = layer("histogram(bins: 12, boundary: 0)").unwrap();
        assert_eq!(
            l.stat,
            Stat::Bin {
                bins: 12,
                binwidth: None,
                boundary: Some(0.0)
            }
        );
        assert!(matches!(layer("point(bins: 3)"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_positions() {
        let l = layer("bar(position: \"dodge\")").unwrap();
        assert_eq!(l.position, Position::Dodge { width: None });
        let l = layer("point(position: jitter(width: 0.1, height: 0), seed: 7)").unwrap();
        assert_eq!(
            l.position,
            Position::Jitter {
                width: Some(0.1),
                height: Some(0.0),
                seed: Some(7)
            }
        );
        let l = layer("col(reverse: true)").unwrap();
        assert_eq!(l.position, Position::Stack { reverse: true });
    }

    #[test]
    fn test_stat_component() {
        let l = layer("stat_summary(fun: \"median\", geom: \"point\")").unwrap();
        assert_eq!(l.stat, Stat::Summary { fun: SummaryFun::Median });
        assert_eq!(l.geom, Geom::Point);
    }

    #[test]
    fn test_inline_aes_and_flags() {
        let l = layer("smooth(aes(colour: drv), method: \"lm\", se: false, show_legend: false)").unwrap();
        assert_eq!(l.mapping.get(Aes::Colour), Some(&AesExpr::column("drv")));
        assert!(matches!(l.stat, Stat::Smooth { se: false, .. }));
        assert_eq!(l.show_legend, Some(false));
    }

    #[test]
    fn test_layer_data_function() {
        let l = layer("point(data: filter(class: \"suv\"))").unwrap();
        assert!(matches!(l.data, LayerData::Function(_)));
        assert!(layer("point(data: \"x\")").is_err());
    }
}
