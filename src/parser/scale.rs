// Scale components: `scale_<aes>_<kind>(...)`, `xlim(...)`, `ylim(...)`.

use super::aesthetics::aes_named;
use super::args::{ArgValue, Call};
use super::ast::{GuideKind, Limits, Oob, ScaleSpec};
use crate::aes::Aes;
use crate::error::{Error, Result};
use crate::trans::Transform;

const SCALE_KEYS: &[&str] = &[
    "name", "limits", "breaks", "labels", "n_breaks", "bins", "oob", "trans", "transform", "guide", "guide_key",
    "expand", "values", "range", "low", "high",
];

pub fn is_scale(name: &str) -> bool {
    name.starts_with("scale_") || name == "xlim" || name == "ylim"
}

fn guide_kind(call: &Call) -> Result<Option<GuideKind>> {
    Ok(match call.string("guide")?.as_deref() {
        None => None,
        Some("legend") => Some(GuideKind::Legend),
        Some("colourbar" | "colorbar") => Some(GuideKind::Colourbar),
        Some("none") => Some(GuideKind::None),
        Some(other) => return Err(Error::Parse(format!("{}(): unknown guide '{}'", call.name, other))),
    })
}

/// Numeric pairs become continuous limits; anything else is a level list.
fn limits(call: &Call) -> Result<Option<Limits>> {
    match call.get("limits") {
        None => Ok(None),
        Some(ArgValue::List(items)) if items.iter().all(|v| matches!(v, ArgValue::Num(_))) => {
            Ok(call.pair("limits")?.map(|(lo, hi)| Limits::Continuous(lo, hi)))
        }
        Some(_) => Ok(call.strings("limits")?.map(Limits::Discrete)),
    }
}

fn base_spec(call: &Call, aes: Aes, kind: &str) -> Result<ScaleSpec> {
    Ok(match kind {
        "continuous" | "gradient" => ScaleSpec::continuous(aes),
        "discrete" | "manual" => ScaleSpec::discrete(aes),
        "binned" => ScaleSpec::binned(aes),
        other => match Transform::from_name(other) {
            Some(t) if !t.is_identity() => ScaleSpec::continuous(aes).transform(t),
            _ => return Err(Error::Parse(format!("unknown scale '{}'", call.name))),
        },
    })
}

/// Build a scale spec from `scale_<aes>_<kind>(...)`.
pub fn build_scale(call: &Call) -> Result<ScaleSpec> {
    if call.name == "xlim" || call.name == "ylim" {
        return build_lim(call);
    }
    call.check(SCALE_KEYS, 1)?;
    let rest = call
        .name
        .strip_prefix("scale_")
        .ok_or_else(|| Error::Parse(format!("unknown scale '{}'", call.name)))?;
    let (aes_name, kind) = rest
        .rsplit_once('_')
        .ok_or_else(|| Error::Parse(format!("unknown scale '{}'", call.name)))?;
    let aes = aes_named(call, aes_name)?;
    let mut spec = base_spec(call, aes, kind)?;

    let name = match call.positional(0) {
        Some(value) => Some(
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| Error::Parse(format!("{}(): the scale name must be a string", call.name)))?,
        ),
        None => call.string("name")?,
    };
    spec.name = name;
    spec.limits = limits(call)?;
    if let Some(trans) = call.string("trans")?.or(call.string("transform")?) {
        spec.transform = Transform::from_name(&trans)
            .ok_or_else(|| Error::Parse(format!("{}(): unknown transform '{}'", call.name, trans)))?;
    }
    if let Some(oob) = call.string("oob")? {
        spec.oob = Oob::from_name(&oob)
            .ok_or_else(|| Error::Parse(format!("{}(): unknown oob policy '{}'", call.name, oob)))?;
    }
    if let Some(breaks) = call.numbers("breaks")? {
        if kind == "binned" {
            spec.bin_edges = Some(breaks);
        } else {
            spec.breaks = Some(breaks);
        }
    }
    spec.labels = call.strings("labels")?;
    spec.n_breaks = call.count("n_breaks")?;
    spec.bins = call.count("bins")?;
    if let Some(guide) = guide_kind(call)? {
        spec.guide = guide;
    }
    spec.guide_key = call.string("guide_key")?;
    spec.expand = call.pair("expand")?;
    spec.values = call.strings("values")?;
    spec.range = call.pair("range")?;
    spec.gradient = match (call.string("low")?, call.string("high")?) {
        (Some(low), Some(high)) => Some((low, high)),
        (None, None) => None,
        _ => return Err(Error::Parse(format!("{}(): 'low' and 'high' must be given together", call.name))),
    };

    if kind == "manual" && spec.values.is_none() {
        return Err(Error::Parse(format!("{}(): 'values' is required", call.name)));
    }
    Ok(spec)
}

/// `xlim(0, 10)` or `xlim("a", "b", "c")`.
fn build_lim(call: &Call) -> Result<ScaleSpec> {
    let aes = if call.name == "xlim" { Aes::X } else { Aes::Y };
    let values: Vec<&ArgValue> = call.args.iter().filter(|a| a.key.is_none()).map(|a| &a.value).collect();
    call.check(&[], values.len())?;
    match values.as_slice() {
        [ArgValue::Num(lo), ArgValue::Num(hi)] => Ok(ScaleSpec::continuous(aes).limits(*lo, *hi)),
        items if !items.is_empty() => {
            let levels = items
                .iter()
                .map(|v| v.as_str())
                .collect::<Option<Vec<&str>>>()
                .ok_or_else(|| Error::Parse(format!("{}(): expected two numbers or a list of levels", call.name)))?;
            Ok(ScaleSpec::discrete(aes).levels(&levels))
        }
        _ => Err(Error::Parse(format!("{}(): expected limits", call.name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::args::parse_call;
    use crate::parser::ast::ScaleKind;

    fn scale(input: &str) -> Result<ScaleSpec> {
        let (_, call) = parse_call(input).unwrap();
        build_scale(&call)
    }

    #[test]
    fn test_log_scale() {
        let s = scale("scale_x_log10()").unwrap();
        assert_eq!(s.aesthetic, Aes::X);
        assert_eq!(s.transform, Transform::Log10);
        assert_eq!(s.kind, Some(ScaleKind::Continuous));
    }

    #[test]
    fn test_continuous_options() {
        let s = scale("scale_y_continuous(\"Highway\", limits: [2, 8], oob: \"squish\", breaks: [2, 4, 6, 8])").unwrap();
        assert_eq!(s.name.as_deref(), Some("Highway"));
        assert_eq!(s.limits, Some(Limits::Continuous(2.0, 8.0)));
        assert_eq!(s.oob, Oob::Squish);
        assert_eq!(s.breaks, Some(vec![2.0, 4.0, 6.0, 8.0]));
    }

    #[test]
    fn test_discrete_and_manual() {
        let s = scale("scale_colour_discrete(limits: [\"low\", \"mid\", \"high\"], guide_key: \"shared\")").unwrap();
        assert_eq!(
            s.limits,
            Some(Limits::Discrete(vec!["low".into(), "mid".into(), "high".into()]))
        );
        assert_eq!(s.guide_key.as_deref(), Some("shared"));
        let s = scale("scale_fill_manual(values: [\"red\", \"blue\"], guide: \"none\")").unwrap();
        assert_eq!(s.values, Some(vec!["red".to_string(), "blue".to_string()]));
        assert_eq!(s.guide, GuideKind::None);
        assert!(scale("scale_fill_manual()").is_err());
    }

    #[test]
    fn test_binned_breaks_are_edges() {
        let s = scale("scale_colour_binned(breaks: [0, 5, 10])").unwrap();
        assert_eq!(s.bin_edges, Some(vec![0.0, 5.0, 10.0]));
        assert_eq!(s.breaks, None);
    }

    #[test]
    fn test_gradient() {
        let s = scale("scale_colour_gradient(low: \"white\", high: \"#ff0000\")").unwrap();
        assert_eq!(s.gradient, Some(("white".to_string(), "#ff0000".to_string())));
        assert!(scale("scale_colour_gradient(low: \"white\")").is_err());
    }

    #[test]
    fn test_lims() {
        assert_eq!(scale("xlim(0, 10)").unwrap().limits, Some(Limits::Continuous(0.0, 10.0)));
        assert_eq!(scale("ylim(\"a\", \"b\")").unwrap().aesthetic, Aes::Y);
        assert!(scale("xlim()").is_err());
    }

    #[test]
    fn test_unknown_scale() {
        assert!(matches!(scale("scale_x_weird()"), Err(Error::Parse(_))));
        assert!(matches!(scale("scale_x_continuous(colour: 1)"), Err(Error::Parse(_))));
    }
}
