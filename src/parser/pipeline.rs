// Pipeline parser for the grammar-of-graphics DSL:
// `df | aes(x: displ, y: hwy) | point() | labs(title: "...")`.

use super::aesthetics::build_mapping;
use super::args::{parse_call, Call};
use super::ast::PlotSpec;
use super::coord::{build_coord, is_coord};
use super::facet::{build_facet, is_facet};
use super::geom::{build_layer, is_layer};
use super::labels::{build_labels, is_labels};
use super::lexer::ws;
use super::scale::{build_scale, is_scale};
use super::theme::{build_theme, is_theme};
use crate::error::{Error, Result};
use log::debug;
use nom::{
    bytes::complete::tag,
    character::complete::char,
    combinator::{eof, opt},
    multi::separated_list1,
    sequence::{terminated, tuple},
    IResult,
};

fn components(input: &str) -> IResult<&str, Vec<Call>> {
    let (input, _) = opt(tuple((ws(tag("df")), ws(char('|')))))(input)?;
    terminated(separated_list1(ws(char('|')), parse_call), ws(eof))(input)
}

/// Describe where a syntax error happened.
fn syntax_error(full: &str, err: nom::Err<nom::error::Error<&str>>) -> Error {
    let remaining = match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => e.input,
        nom::Err::Incomplete(_) => "",
    };
    let offset = full.len() - remaining.len();
    let snippet: String = remaining.trim_start().chars().take(24).collect();
    if snippet.is_empty() {
        Error::Parse(format!("unexpected end of input at offset {}", offset))
    } else {
        Error::Parse(format!("syntax error at offset {} near '{}'", offset, snippet))
    }
}

fn apply(spec: &mut PlotSpec, call: &Call) -> Result<()> {
    let name = call.name.as_str();
    if name == "aes" {
        spec.mapping = build_mapping(call)?.overlaid_on(&spec.mapping);
    } else if is_layer(name) {
        spec.layers.push(build_layer(call)?);
    } else if is_scale(name) {
        spec.add_scale(build_scale(call)?);
    } else if is_coord(name) {
        spec.coord = build_coord(call)?;
    } else if is_facet(name) {
        spec.facet = build_facet(call)?;
    } else if is_labels(name) {
        spec.labels.merge(build_labels(call)?);
    } else if is_theme(name) {
        let theme = build_theme(call)?;
        if name == "theme" {
            spec.theme.overlay(&theme);
        } else {
            spec.theme = theme;
        }
    } else {
        return Err(Error::Parse(format!("unknown component '{}'", name)));
    }
    Ok(())
}

/// Parse a complete plot specification. Later components override earlier
/// ones of the same kind; `aes`, `labs` and `theme` merge.
pub fn parse_plot_spec(input: &str) -> Result<PlotSpec> {
    let (_, calls) = components(input).map_err(|e| syntax_error(input, e))?;

    let mut spec = PlotSpec::default();
    for call in &calls {
        debug!("component {}({} args)", call.name, call.args.len());
        apply(&mut spec, call)?;
    }
    if spec.layers.is_empty() {
        return Err(Error::Parse("a plot needs at least one layer".to_string()));
    }
    Ok(spec)
}
