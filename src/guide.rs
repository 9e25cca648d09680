//! Guides: axes for position scales and legends / colour bars for mapped
//! non-position scales.

use crate::aes::{Aes, AesExpr, Mapping};
use crate::data::{RowTable, Value};
use crate::error::{Error, Result};
use crate::geom::Geom;
use crate::ir::{Color, Grob, Primitive, TextStyle, Viewport};
use crate::parser::ast::{GuideKind, Labels};
use crate::scale::{Scale, ScaleRegistry};
use crate::theme_resolve::{parse_color, ResolvedTheme};
use log::debug;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Legend key box side, px.
pub const KEY_SIZE: f64 = 23.0;
/// Axis tick length, px.
pub const TICK_LENGTH: f64 = 3.67;
const TICK_GAP: f64 = 2.2;
const PADDING: f64 = 5.5;
const GUIDE_SPACING: f64 = 11.0;
const TITLE_GAP: f64 = 4.0;
const LABEL_GAP: f64 = 5.0;
const COLOURBAR_STEPS: usize = 20;

/// What a legend needs to know about one layer.
#[derive(Debug, Clone, Copy)]
pub struct LegendLayer<'a> {
    pub geom: Geom,
    pub mapping: &'a Mapping,
    pub params: &'a BTreeMap<Aes, Value>,
    pub show_legend: Option<bool>,
}

impl LegendLayer<'_> {
    fn maps(&self, aes: Aes) -> bool {
        self.mapping.aesthetics().any(|a| a.family() == aes)
    }

    fn contributes(&self, aesthetics: &[Aes]) -> bool {
        match self.show_legend {
            Some(show) => show,
            None => aesthetics.iter().any(|a| self.maps(*a)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegendKey {
    pub label: String,
    /// Key glyphs in key-box units, one set per contributing layer
    pub glyphs: Vec<Primitive>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GuideBody {
    Legend(Vec<LegendKey>),
    Colourbar {
        /// Bottom to top
        colours: Vec<Color>,
        /// (position in `[0, 1]` along the bar, label)
        ticks: Vec<(f64, String)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Guide {
    pub key: String,
    pub title: String,
    pub aesthetics: Vec<Aes>,
    pub body: GuideBody,
}

/// A legend before merging: the labels and, per aesthetic, the mapped value
/// of each entry.
struct Pending {
    key: String,
    title: String,
    aesthetics: Vec<Aes>,
    labels: Vec<String>,
    mapped: Vec<(Aes, Vec<Value>)>,
    colourbar: Option<(Vec<Color>, Vec<(f64, String)>)>,
}

fn expr_title(expr: &AesExpr) -> String {
    match expr {
        AesExpr::AfterStat(inner) => inner.to_string(),
        other => other.to_string(),
    }
}

/// Title for an aesthetic family: `labs()`, then the scale name, then the
/// first mapping expression bound to it.
fn title_for(aes: Aes, labels: &Labels, scale: Option<&Scale>, mappings: &[&Mapping]) -> Option<String> {
    if let Some(title) = labels.for_aes(aes) {
        return Some(title.to_string());
    }
    if let Some(name) = scale.and_then(|s| s.spec.name.clone()) {
        return Some(name);
    }
    mappings.iter().find_map(|m| {
        m.iter()
            .find(|(a, _)| a.family() == aes)
            .map(|(_, expr)| expr_title(expr))
    })
}

/// Axis titles (bottom, left). Under a flipped coordinate system the y
/// scale is drawn along the bottom.
pub fn axis_titles(
    labels: &Labels,
    scales: &ScaleRegistry,
    mappings: &[&Mapping],
    flipped: bool,
) -> (Option<String>, Option<String>) {
    let x = title_for(Aes::X, labels, scales.x.first(), mappings);
    let y = title_for(Aes::Y, labels, scales.y.first(), mappings);
    if flipped {
        (y, x)
    } else {
        (x, y)
    }
}

fn merge_key(title: &str, labels: &[String]) -> String {
    let mut hasher = DefaultHasher::new();
    title.hash(&mut hasher);
    labels.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn use_colourbar(scale: &Scale) -> bool {
    let colour = matches!(scale.aes, Aes::Colour | Aes::Fill);
    match scale.spec.guide {
        GuideKind::Colourbar | GuideKind::Auto => colour && scale.is_continuous(),
        GuideKind::Legend | GuideKind::None => false,
    }
}

fn colourbar(scale: &Scale) -> Result<Option<(Vec<Color>, Vec<(f64, String)>)>> {
    let Some((lo, hi)) = scale.limits() else { return Ok(None) };
    let mut colours = Vec::with_capacity(COLOURBAR_STEPS);
    for i in 0..COLOURBAR_STEPS {
        let v = lo + (hi - lo) * i as f64 / (COLOURBAR_STEPS - 1) as f64;
        let mapped = scale.map_value(&Value::Num(v))?;
        colours.push(mapped.as_str().and_then(parse_color).unwrap_or(Color::WHITE));
    }
    let breaks = scale.breaks();
    let labels = scale.break_labels(&breaks);
    let span = (hi - lo).max(f64::EPSILON);
    let ticks = breaks
        .into_iter()
        .zip(labels)
        .map(|(b, l)| ((b - lo) / span, l))
        .filter(|(p, _)| (-1e-9..=1.0 + 1e-9).contains(p))
        .collect();
    Ok(Some((colours, ticks)))
}

/// Build the legends of every mapped non-position scale, merging legends
/// that share a merge key.
pub fn build_legends(scales: &ScaleRegistry, labels: &Labels, layers: &[LegendLayer]) -> Result<Vec<Guide>> {
    let mappings: Vec<&Mapping> = layers.iter().map(|l| l.mapping).collect();
    let mut pending: Vec<Pending> = Vec::new();

    for scale in scales.non_position() {
        if scale.spec.guide == GuideKind::None {
            continue;
        }
        if !layers.iter().any(|l| l.show_legend != Some(false) && l.maps(scale.aes)) {
            continue;
        }
        let title = title_for(scale.aes, labels, Some(scale), &mappings).unwrap_or_else(|| scale.aes.to_string());

        let (entry_labels, mapped, bar) = if use_colourbar(scale) {
            match colourbar(scale)? {
                Some((colours, ticks)) => {
                    let tick_labels: Vec<String> = ticks.iter().map(|(_, l)| l.clone()).collect();
                    (tick_labels, Vec::new(), Some((colours, ticks)))
                }
                None => continue,
            }
        } else {
            let entries = scale.legend_entries();
            if entries.is_empty() {
                continue;
            }
            let values = entries
                .iter()
                .map(|(v, _)| scale.map_value(v))
                .collect::<Result<Vec<_>>>()?;
            let entry_labels: Vec<String> = entries.into_iter().map(|(_, l)| l).collect();
            (entry_labels, vec![(scale.aes, values)], None)
        };

        let key = match &scale.spec.guide_key {
            Some(k) => k.clone(),
            None => merge_key(&title, &entry_labels),
        };

        match pending.iter_mut().find(|p| p.key == key) {
            Some(existing) => {
                if existing.labels != entry_labels || existing.colourbar.is_some() != bar.is_some() {
                    return Err(Error::GuideMergeConflict {
                        key,
                        reason: format!(
                            "'{}' has labels [{}] but '{}' has [{}]",
                            existing.title,
                            existing.labels.join(", "),
                            title,
                            entry_labels.join(", ")
                        ),
                    });
                }
                existing.aesthetics.push(scale.aes);
                existing.mapped.extend(mapped);
            }
            None => pending.push(Pending {
                key,
                title,
                aesthetics: vec![scale.aes],
                labels: entry_labels,
                mapped,
                colourbar: bar,
            }),
        }
    }

    let mut guides = Vec::new();
    for p in pending {
        let body = match p.colourbar {
            Some((colours, ticks)) => GuideBody::Colourbar { colours, ticks },
            None => GuideBody::Legend(legend_keys(&p.labels, &p.mapped, layers)),
        };
        debug!("legend '{}' for {:?}", p.title, p.aesthetics);
        guides.push(Guide {
            key: p.key,
            title: p.title,
            aesthetics: p.aesthetics,
            body,
        });
    }
    Ok(guides)
}

fn legend_keys(labels: &[String], mapped: &[(Aes, Vec<Value>)], layers: &[LegendLayer]) -> Vec<LegendKey> {
    let aesthetics: Vec<Aes> = mapped.iter().map(|(a, _)| *a).collect();
    let contributing: Vec<&LegendLayer> = layers.iter().filter(|l| l.contributes(&aesthetics)).collect();

    labels
        .iter()
        .enumerate()
        .map(|(j, label)| {
            let mut glyphs = Vec::new();
            for layer in &contributing {
                let drawn = layer.geom.key_aes();
                let mut columns: Vec<String> = Vec::new();
                let mut row: Vec<Value> = Vec::new();
                let mut set = |aes: Aes, value: Value| match columns.iter().position(|c| c == aes.name()) {
                    Some(i) => row[i] = value,
                    None => {
                        columns.push(aes.name().to_string());
                        row.push(value);
                    }
                };
                for (aes, values) in mapped.iter().filter(|(a, _)| drawn.contains(a)) {
                    set(*aes, values[j].clone());
                }
                for (aes, value) in layer.params.iter() {
                    set(*aes, value.clone());
                }
                let table = RowTable::new(columns, vec![row]);
                let style = layer.geom.default_style().from_row(&table, 0);
                glyphs.extend(layer.geom.draw_key(&style));
            }
            LegendKey {
                label: label.clone(),
                glyphs,
            }
        })
        .collect()
}

// =============================================================================
// Legend drawing
// =============================================================================

fn guide_size(guide: &Guide, theme: &ResolvedTheme) -> (f64, f64) {
    let (title_w, title_h) = theme.legend_title.measure(&guide.title);
    let (labels, body_h): (Vec<&str>, f64) = match &guide.body {
        GuideBody::Legend(keys) => (keys.iter().map(|k| k.label.as_str()).collect(), keys.len() as f64 * KEY_SIZE),
        GuideBody::Colourbar { ticks, .. } => (ticks.iter().map(|(_, l)| l.as_str()).collect(), 5.0 * KEY_SIZE),
    };
    let label_w = labels
        .iter()
        .map(|l| theme.legend_text.measure(l).0)
        .fold(0.0, f64::max);
    (title_w.max(KEY_SIZE + LABEL_GAP + label_w), title_h + TITLE_GAP + body_h)
}

/// Pixel size of the legend box: guides stacked vertically, or side by side
/// when `horizontal`.
pub fn legend_box_size(guides: &[Guide], theme: &ResolvedTheme, horizontal: bool) -> (f64, f64) {
    if guides.is_empty() {
        return (0.0, 0.0);
    }
    let sizes: Vec<(f64, f64)> = guides.iter().map(|g| guide_size(g, theme)).collect();
    let gaps = GUIDE_SPACING * (sizes.len() - 1) as f64;
    let (w, h) = if horizontal {
        (
            sizes.iter().map(|s| s.0).sum::<f64>() + gaps,
            sizes.iter().map(|s| s.1).fold(0.0, f64::max),
        )
    } else {
        (
            sizes.iter().map(|s| s.0).fold(0.0, f64::max),
            sizes.iter().map(|s| s.1).sum::<f64>() + gaps,
        )
    };
    (w + 2.0 * PADDING, h + 2.0 * PADDING)
}

fn text_at(at: (f64, f64), label: &str, style: &TextStyle, hjust: f64) -> Primitive {
    Primitive::Text {
        at,
        label: label.to_string(),
        style: TextStyle {
            hjust,
            vjust: 0.5,
            ..style.clone()
        },
    }
}

/// Draw the legend box into `area` (pixels).
pub fn draw_legend_box(guides: &[Guide], theme: &ResolvedTheme, horizontal: bool, area: Viewport) -> Grob {
    let mut children = Vec::new();
    if let Some(bg) = theme.legend_background {
        children.push(Grob::primitive(
            "background",
            Primitive::Rect {
                min: (0.0, 0.0),
                max: (1.0, 1.0),
                fill: bg.fill,
                stroke: bg.stroke(),
            },
        ));
    }
    let (mut x, mut y) = (area.x + PADDING, area.y + PADDING);
    for (i, guide) in guides.iter().enumerate() {
        let (w, h) = guide_size(guide, theme);
        let vp = Viewport::new(x, y, w, h);
        children.push(draw_guide(i, guide, theme, vp));
        if horizontal {
            x += w + GUIDE_SPACING;
        } else {
            y += h + GUIDE_SPACING;
        }
    }
    Grob::viewport("guide-box", area, children)
}

fn draw_guide(index: usize, guide: &Guide, theme: &ResolvedTheme, vp: Viewport) -> Grob {
    let (w, h) = (vp.width.max(f64::EPSILON), vp.height.max(f64::EPSILON));
    let norm = |px: f64, py: f64| (px / w, 1.0 - py / h);
    let title_h = theme.legend_title.measure(&guide.title).1;
    let top = title_h + TITLE_GAP;

    let mut children = vec![Grob::primitive(
        "title",
        text_at(norm(0.0, title_h / 2.0), &guide.title, &theme.legend_title, 0.0),
    )];

    match &guide.body {
        GuideBody::Legend(keys) => {
            for (j, key) in keys.iter().enumerate() {
                let key_top = top + j as f64 * KEY_SIZE;
                let mut glyphs = Vec::new();
                if let Some(bg) = theme.legend_key {
                    glyphs.push(Grob::primitive(
                        "background",
                        Primitive::Rect {
                            min: (0.0, 0.0),
                            max: (1.0, 1.0),
                            fill: bg.fill,
                            stroke: bg.stroke(),
                        },
                    ));
                }
                glyphs.extend(key.glyphs.iter().cloned().map(|p| Grob::primitive("glyph", p)));
                children.push(Grob::viewport(
                    format!("key-{}", j + 1),
                    Viewport::new(vp.x, vp.y + key_top, KEY_SIZE, KEY_SIZE),
                    glyphs,
                ));
                children.push(Grob::primitive(
                    format!("label-{}", j + 1),
                    text_at(
                        norm(KEY_SIZE + LABEL_GAP, key_top + KEY_SIZE / 2.0),
                        &key.label,
                        &theme.legend_text,
                        0.0,
                    ),
                ));
            }
        }
        GuideBody::Colourbar { colours, ticks } => {
            let bar_h = 5.0 * KEY_SIZE;
            children.push(Grob::primitive(
                "bar",
                Primitive::Raster {
                    min: norm(0.0, top + bar_h),
                    max: norm(KEY_SIZE, top),
                    ncol: 1,
                    nrow: colours.len(),
                    cells: colours.iter().rev().copied().collect(),
                },
            ));
            for (j, (pos, label)) in ticks.iter().enumerate() {
                let py = top + (1.0 - pos) * bar_h;
                children.push(Grob::primitive(
                    format!("label-{}", j + 1),
                    text_at(norm(KEY_SIZE + LABEL_GAP, py), label, &theme.legend_text, 0.0),
                ));
            }
        }
    }
    Grob::viewport(format!("guide-{}", index + 1), vp, children)
}

// =============================================================================
// Axes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSide {
    Bottom,
    Left,
}

/// Pixel depth of an axis (height of a bottom axis, width of a left one).
pub fn axis_extent(side: AxisSide, ticks: &[(f64, String)], theme: &ResolvedTheme) -> f64 {
    let tick = if theme.axis_ticks.is_some() { TICK_LENGTH } else { 0.0 };
    let Some(text) = &theme.axis_text else { return tick };
    let label = ticks
        .iter()
        .map(|(_, l)| {
            let (w, h) = text.measure(l);
            match side {
                AxisSide::Bottom => h,
                AxisSide::Left => w,
            }
        })
        .fold(0.0, f64::max);
    tick + TICK_GAP + label
}

/// Draw an axis into `vp` (pixels); tick positions are in `[0, 1]` along it.
pub fn draw_axis(name: String, side: AxisSide, ticks: &[(f64, String)], theme: &ResolvedTheme, vp: Viewport) -> Grob {
    let (w, h) = (vp.width.max(f64::EPSILON), vp.height.max(f64::EPSILON));
    let mut children = Vec::new();

    if let Some(line) = theme.axis_line {
        let points = match side {
            AxisSide::Bottom => vec![(0.0, 1.0), (1.0, 1.0)],
            AxisSide::Left => vec![(1.0, 0.0), (1.0, 1.0)],
        };
        children.push(Grob::primitive(
            "line",
            Primitive::Path {
                points,
                stroke: line.stroke(),
            },
        ));
    }

    let on_axis: Vec<&(f64, String)> = ticks.iter().filter(|(p, _)| (-1e-9..=1.0 + 1e-9).contains(p)).collect();
    let tick_len = match theme.axis_ticks {
        Some(tick) => {
            for (p, _) in &on_axis {
                let points = match side {
                    AxisSide::Bottom => vec![(*p, 1.0), (*p, 1.0 - TICK_LENGTH / h)],
                    AxisSide::Left => vec![(1.0, *p), (1.0 - TICK_LENGTH / w, *p)],
                };
                children.push(Grob::primitive(
                    "tick",
                    Primitive::Path {
                        points,
                        stroke: tick.stroke(),
                    },
                ));
            }
            TICK_LENGTH
        }
        None => 0.0,
    };

    if let Some(text) = &theme.axis_text {
        for (p, label) in &on_axis {
            let (at, hjust, vjust) = match side {
                AxisSide::Bottom => ((*p, 1.0 - (tick_len + TICK_GAP) / h), 0.5, 1.0),
                AxisSide::Left => ((1.0 - (tick_len + TICK_GAP) / w, *p), 1.0, 0.5),
            };
            children.push(Grob::primitive(
                "label",
                Primitive::Text {
                    at,
                    label: label.clone(),
                    style: TextStyle {
                        hjust,
                        vjust,
                        ..text.clone()
                    },
                },
            ));
        }
    }
    Grob::viewport(name, vp, children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::PanelLayout;
    use crate::parser::ast::{ScaleSpec, Theme};

    fn colour_table() -> RowTable {
        RowTable::from_columns(vec![
            ("colour", vec!["a".into(), "b".into(), "a".into()]),
            ("shape", vec!["a".into(), "b".into(), "a".into()]),
            ("fill", vec![1.0.into(), 5.0.into(), 3.0.into()]),
        ])
        .unwrap()
    }

    fn trained(specs: &[ScaleSpec]) -> ScaleRegistry {
        let t = colour_table();
        let mut scales = ScaleRegistry::new(specs, &PanelLayout::single());
        scales.add_missing(&[&t]).unwrap();
        scales.train_discrete(&[&t]);
        scales.train_non_position(&[&t]);
        scales
    }

    #[test]
    fn test_same_title_and_labels_merge() {
        let mapping = Mapping::new().with(Aes::Colour, "class").with(Aes::Shape, "class");
        let params = BTreeMap::new();
        let layer = LegendLayer {
            geom: Geom::Point,
            mapping: &mapping,
            params: &params,
            show_legend: None,
        };
        let scales = trained(&[ScaleSpec::new(Aes::Fill).guide(GuideKind::None)]);
        let guides = build_legends(&scales, &Labels::default(), &[layer]).unwrap();
        assert_eq!(guides.len(), 1);
        assert_eq!(guides[0].title, "class");
        assert_eq!(guides[0].aesthetics, vec![Aes::Colour, Aes::Shape]);
        let GuideBody::Legend(keys) = &guides[0].body else { panic!("expected a legend") };
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].label, "a");
        assert!(matches!(keys[0].glyphs[0], Primitive::Point { .. }));
    }

    #[test]
    fn test_explicit_key_conflict() {
        let mapping = Mapping::new().with(Aes::Colour, "class").with(Aes::Fill, "n");
        let params = BTreeMap::new();
        let layer = LegendLayer {
            geom: Geom::Bar,
            mapping: &mapping,
            params: &params,
            show_legend: None,
        };
        let scales = trained(&[
            ScaleSpec::new(Aes::Colour).guide_key("shared"),
            ScaleSpec::binned(Aes::Fill).bins(2).guide_key("shared"),
        ]);
        let err = build_legends(&scales, &Labels::default(), &[layer]).unwrap_err();
        assert!(matches!(err, Error::GuideMergeConflict { ref key, .. } if key == "shared"));
    }

    #[test]
    fn test_continuous_fill_gets_colourbar() {
        let mapping = Mapping::new().with(Aes::Fill, "n");
        let params = BTreeMap::new();
        let layer = LegendLayer {
            geom: Geom::Tile,
            mapping: &mapping,
            params: &params,
            show_legend: None,
        };
        let scales = trained(&[]);
        let guides = build_legends(&scales, &Labels::default().aes(Aes::Fill, "Count"), &[layer]).unwrap();
        assert_eq!(guides.len(), 1);
        assert_eq!(guides[0].title, "Count");
        match &guides[0].body {
            GuideBody::Colourbar { colours, ticks } => {
                assert_eq!(colours.len(), COLOURBAR_STEPS);
                assert!(ticks.iter().all(|(p, _)| (0.0..=1.0 + 1e-9).contains(p)));
            }
            other => panic!("expected a colour bar, got {:?}", other),
        }
    }

    #[test]
    fn test_hidden_layer_has_no_legend() {
        let mapping = Mapping::new().with(Aes::Colour, "class");
        let params = BTreeMap::new();
        let layer = LegendLayer {
            geom: Geom::Point,
            mapping: &mapping,
            params: &params,
            show_legend: Some(false),
        };
        let scales = trained(&[]);
        assert!(build_legends(&scales, &Labels::default(), &[layer]).unwrap().is_empty());
    }

    #[test]
    fn test_axis_titles_strip_after_stat() {
        let mapping = Mapping::new()
            .with(Aes::X, "hwy")
            .with_expr(Aes::Y, AesExpr::after_stat("count"));
        let scales = ScaleRegistry::new(&[], &PanelLayout::single());
        let (x, y) = axis_titles(&Labels::default(), &scales, &[&mapping], false);
        assert_eq!(x.as_deref(), Some("hwy"));
        assert_eq!(y.as_deref(), Some("count"));
        let (bottom, _) = axis_titles(&Labels::default(), &scales, &[&mapping], true);
        assert_eq!(bottom.as_deref(), Some("count"));
    }

    #[test]
    fn test_axis_drawing() {
        let theme = Theme::default().resolve();
        let ticks = vec![(0.25, "10".to_string()), (0.75, "20".to_string()), (1.5, "30".to_string())];
        let extent = axis_extent(AxisSide::Bottom, &ticks, &theme);
        let axis = draw_axis(
            "axis-b-1-1".to_string(),
            AxisSide::Bottom,
            &ticks,
            &theme,
            Viewport::new(0.0, 0.0, 200.0, extent),
        );
        let labels: Vec<&str> = axis
            .primitives()
            .into_iter()
            .filter_map(|p| match p {
                Primitive::Text { label, .. } => Some(label.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(labels, vec!["10", "20"]);
    }
}
