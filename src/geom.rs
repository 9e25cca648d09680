//! Geoms: the geom pre-pass before position adjustment, and drawing into
//! panel-normalized primitives.

use crate::aes::Aes;
use crate::coord::{CoordSystem, PanelParams};
use crate::data::{RowTable, Value};
use crate::ir::{Color, Grob, LineType, PointShape, Primitive, Stroke, TextStyle};
use crate::position::Position;
use crate::stat::{resolution, Stat};
use crate::theme_resolve::parse_color;

/// Points per millimetre.
const PT: f64 = 72.27 / 25.4;
/// Pixels per point.
const PX_PER_PT: f64 = 96.0 / 72.0;

/// Millimetre sizes to pixels.
fn mm_to_px(mm: f64) -> f64 {
    mm * PT * PX_PER_PT
}

/// Millimetre font sizes to points.
fn mm_to_pt(mm: f64) -> f64 {
    mm * PT
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Geom {
    #[default]
    Point,
    Line,
    Path,
    Bar,
    Col,
    Histogram,
    Area,
    Ribbon,
    Polygon,
    Text,
    Tile,
    Raster,
    Segment,
    Boxplot,
    Violin,
    Smooth,
}

/// Resolved visual attributes of one row (sizes in millimetres).
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub colour: Option<Color>,
    pub fill: Option<Color>,
    pub size: f64,
    pub alpha: Option<f64>,
    pub shape: PointShape,
    pub linetype: LineType,
}

impl Style {
    /// Override defaults with the row's aesthetic values.
    pub fn from_row(&self, table: &RowTable, row: usize) -> Style {
        let mut style = self.clone();
        let value = |aes: Aes| table.value(row, aes.name()).filter(|v| !v.is_null());
        if let Some(v) = value(Aes::Colour) {
            style.colour = colour_value(v).unwrap_or(style.colour);
        }
        if let Some(v) = value(Aes::Fill) {
            style.fill = colour_value(v).unwrap_or(style.fill);
        }
        if let Some(size) = value(Aes::Size).and_then(Value::as_f64) {
            style.size = size;
        }
        if let Some(alpha) = value(Aes::Alpha).and_then(Value::as_f64) {
            style.alpha = Some(alpha);
        }
        if let Some(shape) = value(Aes::Shape).and_then(|v| PointShape::from_name(&v.label())) {
            style.shape = shape;
        }
        if let Some(linetype) = value(Aes::Linetype).and_then(|v| LineType::from_name(&v.label())) {
            style.linetype = linetype;
        }
        style
    }

    fn alpha(&self, colour: Option<Color>) -> Option<Color> {
        colour.map(|c| match self.alpha {
            Some(a) => c.with_alpha(a),
            None => c,
        })
    }

    /// Fill with alpha applied.
    pub fn fill_colour(&self) -> Option<Color> {
        self.alpha(self.fill)
    }

    /// Outline or line stroke; alpha applies when `with_alpha` is set.
    pub fn stroke(&self, with_alpha: bool) -> Option<Stroke> {
        let colour = if with_alpha { self.alpha(self.colour) } else { self.colour };
        colour.map(|c| Stroke {
            colour: c,
            width: mm_to_px(self.size),
            linetype: self.linetype,
        })
    }
}

/// `Some(None)` for explicit "no colour" values.
fn colour_value(v: &Value) -> Option<Option<Color>> {
    let s = v.as_str()?;
    if matches!(s.to_lowercase().as_str(), "na" | "none" | "transparent") {
        return Some(None);
    }
    parse_color(s).map(Some)
}

const GREY20: Color = Color::rgb(51, 51, 51);
const GREY35: Color = Color::rgb(89, 89, 89);
const GREY60: Color = Color::rgb(153, 153, 153);

impl Geom {
    pub fn from_name(name: &str) -> Option<Geom> {
        let name = name.strip_prefix("geom_").unwrap_or(name);
        Some(match name {
            "point" => Geom::Point,
            "line" => Geom::Line,
            "path" => Geom::Path,
            "bar" => Geom::Bar,
            "col" => Geom::Col,
            "histogram" => Geom::Histogram,
            "area" => Geom::Area,
            "ribbon" => Geom::Ribbon,
            "polygon" => Geom::Polygon,
            "text" => Geom::Text,
            "tile" => Geom::Tile,
            "raster" => Geom::Raster,
            "segment" => Geom::Segment,
            "boxplot" => Geom::Boxplot,
            "violin" => Geom::Violin,
            "smooth" => Geom::Smooth,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Geom::Point => "point",
            Geom::Line => "line",
            Geom::Path => "path",
            Geom::Bar => "bar",
            Geom::Col => "col",
            Geom::Histogram => "histogram",
            Geom::Area => "area",
            Geom::Ribbon => "ribbon",
            Geom::Polygon => "polygon",
            Geom::Text => "text",
            Geom::Tile => "tile",
            Geom::Raster => "raster",
            Geom::Segment => "segment",
            Geom::Boxplot => "boxplot",
            Geom::Violin => "violin",
            Geom::Smooth => "smooth",
        }
    }

    pub fn default_stat(self) -> Stat {
        match self {
            Geom::Bar => Stat::Count,
            Geom::Histogram => Stat::bin(),
            Geom::Boxplot => Stat::boxplot(),
            Geom::Violin => Stat::ydensity(),
            Geom::Smooth => Stat::smooth(),
            _ => Stat::Identity,
        }
    }

    pub fn default_position(self) -> Position {
        match self {
            Geom::Bar | Geom::Col | Geom::Histogram | Geom::Area => Position::Stack { reverse: false },
            Geom::Boxplot | Geom::Violin => Position::Dodge { width: None },
            _ => Position::Identity,
        }
    }

    /// Aesthetics a row needs to be drawn.
    pub fn required_aes(self) -> &'static [Aes] {
        match self {
            Geom::Ribbon => &[Aes::X, Aes::Ymin, Aes::Ymax],
            Geom::Text => &[Aes::X, Aes::Y, Aes::Label],
            Geom::Segment => &[Aes::X, Aes::Y, Aes::Xend, Aes::Yend],
            Geom::Boxplot => &[Aes::X],
            _ => &[Aes::X, Aes::Y],
        }
    }

    /// Aesthetics the legend draws for this geom.
    pub fn key_aes(self) -> &'static [Aes] {
        match self {
            Geom::Point => &[Aes::Colour, Aes::Fill, Aes::Size, Aes::Shape, Aes::Alpha],
            Geom::Line | Geom::Path | Geom::Segment => &[Aes::Colour, Aes::Size, Aes::Linetype, Aes::Alpha],
            Geom::Text => &[Aes::Colour, Aes::Size, Aes::Alpha],
            _ => &[Aes::Colour, Aes::Fill, Aes::Size, Aes::Linetype, Aes::Alpha],
        }
    }

    pub fn default_style(self) -> Style {
        let base = Style {
            colour: Some(Color::BLACK),
            fill: None,
            size: 0.5,
            alpha: None,
            shape: PointShape::Circle,
            linetype: LineType::Solid,
        };
        match self {
            Geom::Point => Style { size: 1.5, ..base },
            Geom::Text => Style { size: 3.88, ..base },
            Geom::Bar | Geom::Col | Geom::Histogram => Style {
                colour: None,
                fill: Some(GREY35),
                ..base
            },
            Geom::Area | Geom::Ribbon | Geom::Polygon | Geom::Tile | Geom::Raster => Style {
                colour: None,
                fill: Some(GREY20),
                ..base
            },
            Geom::Boxplot | Geom::Violin => Style {
                colour: Some(GREY20),
                fill: Some(Color::WHITE),
                ..base
            },
            Geom::Smooth => Style {
                colour: Some(Color::rgb(0x33, 0x66, 0xFF)),
                fill: Some(GREY60),
                size: 1.0,
                alpha: Some(0.4),
                ..base
            },
            _ => base,
        }
    }

    /// Remove rows missing a required aesthetic; returns the number removed.
    pub fn remove_missing(self, table: &RowTable) -> (RowTable, usize) {
        let mut out = table.clone();
        let idx: Vec<Option<usize>> = self.required_aes().iter().map(|a| out.column_index(a.name())).collect();
        let removed = out.retain(|_, row| idx.iter().all(|i| i.map(|i| !row[i].is_null()).unwrap_or(false)));
        (out, removed)
    }

    /// Pre-pass before position adjustment: interval geoms get their extents.
    pub fn setup_data(self, table: &RowTable, width: Option<f64>) -> RowTable {
        let mut out = table.clone();
        let n = out.nrow();
        let xs = out.numeric("x").unwrap_or_else(|| vec![None; n]);
        let col_width = out.numeric("width");
        let res_x = resolution(&out.finite("x"));

        let widths: Vec<f64> = (0..n)
            .map(|i| {
                width
                    .or_else(|| col_width.as_ref().and_then(|w| w[i]))
                    .unwrap_or(match self {
                        Geom::Tile | Geom::Raster => res_x,
                        _ => 0.9 * res_x,
                    })
            })
            .collect();

        let set_x_extent = |out: &mut RowTable| {
            if out.has_column("xmin") && out.has_column("xmax") {
                return;
            }
            let xmin = xs.iter().zip(&widths).map(|(x, w)| x.map(|x| Value::Num(x - w / 2.0)).unwrap_or(Value::Null)).collect();
            let xmax = xs.iter().zip(&widths).map(|(x, w)| x.map(|x| Value::Num(x + w / 2.0)).unwrap_or(Value::Null)).collect();
            out.set_column("xmin", xmin);
            out.set_column("xmax", xmax);
        };

        match self {
            Geom::Bar | Geom::Col | Geom::Histogram => {
                set_x_extent(&mut out);
                let ys = out.numeric("y").unwrap_or_else(|| vec![None; n]);
                out.set_column("ymin", ys.iter().map(|y| y.map(|y| Value::Num(y.min(0.0))).unwrap_or(Value::Null)).collect());
                out.set_column("ymax", ys.iter().map(|y| y.map(|y| Value::Num(y.max(0.0))).unwrap_or(Value::Null)).collect());
                out.set_numeric("width", widths);
            }
            Geom::Area => {
                let ys = out.numeric("y").unwrap_or_else(|| vec![None; n]);
                out.set_numeric("ymin", vec![0.0; n]);
                out.set_column("ymax", ys.into_iter().map(|y| y.map(Value::Num).unwrap_or(Value::Null)).collect());
            }
            Geom::Tile | Geom::Raster => {
                set_x_extent(&mut out);
                if !(out.has_column("ymin") && out.has_column("ymax")) {
                    let h = resolution(&out.finite("y"));
                    let ys = out.numeric("y").unwrap_or_else(|| vec![None; n]);
                    out.set_column("ymin", ys.iter().map(|y| y.map(|y| Value::Num(y - h / 2.0)).unwrap_or(Value::Null)).collect());
                    out.set_column("ymax", ys.iter().map(|y| y.map(|y| Value::Num(y + h / 2.0)).unwrap_or(Value::Null)).collect());
                }
            }
            Geom::Boxplot | Geom::Violin => {
                set_x_extent(&mut out);
                out.set_numeric("width", widths);
            }
            _ => {}
        }
        out
    }

    /// Draw one panel's rows of a layer.
    pub fn draw_panel(self, data: &RowTable, coord: &CoordSystem, params: &PanelParams) -> Vec<Grob> {
        let base = self.default_style();
        let mut grobs = Vec::new();
        let pt = |x: f64, y: f64| coord.transform(params, x, y);

        match self {
            Geom::Point => {
                for row in 0..data.nrow() {
                    let (Some(x), Some(y)) = (data.num(row, "x"), data.num(row, "y")) else { continue };
                    let style = base.from_row(data, row);
                    if let Some(p) = point(&style, pt(x, y)) {
                        grobs.push(Grob::primitive("point", p));
                    }
                }
            }
            Geom::Line | Geom::Path => {
                for part in data.partitions() {
                    let t = &part.table;
                    let mut pts: Vec<(f64, f64)> = (0..t.nrow())
                        .filter_map(|r| Some((t.num(r, "x")?, t.num(r, "y")?)))
                        .collect();
                    if self == Geom::Line {
                        pts.sort_by(|a, b| a.0.total_cmp(&b.0));
                    }
                    let style = base.from_row(t, 0);
                    if let (Some(stroke), true) = (style.stroke(true), pts.len() >= 2) {
                        grobs.push(Grob::primitive(
                            "path",
                            Primitive::Path {
                                points: coord.munch(params, &pts, false),
                                stroke,
                            },
                        ));
                    }
                }
            }
            Geom::Segment => {
                for row in 0..data.nrow() {
                    let coords = ["x", "y", "xend", "yend"].map(|c| data.num(row, c));
                    let [Some(x), Some(y), Some(xend), Some(yend)] = coords else { continue };
                    let style = base.from_row(data, row);
                    if let Some(stroke) = style.stroke(true) {
                        grobs.push(Grob::primitive(
                            "segment",
                            Primitive::Path {
                                points: coord.munch(params, &[(x, y), (xend, yend)], false),
                                stroke,
                            },
                        ));
                    }
                }
            }
            Geom::Bar | Geom::Col | Geom::Histogram | Geom::Tile => {
                for row in 0..data.nrow() {
                    let style = base.from_row(data, row);
                    if let Some(g) = rect_row(coord, params, data, row, &style) {
                        grobs.push(g);
                    }
                }
            }
            Geom::Raster => match raster(coord, params, data, &base) {
                Some(g) => grobs.push(g),
                None => {
                    for row in 0..data.nrow() {
                        let style = base.from_row(data, row);
                        if let Some(g) = rect_row(coord, params, data, row, &style) {
                            grobs.push(g);
                        }
                    }
                }
            },
            Geom::Area | Geom::Ribbon => {
                for part in data.partitions() {
                    let style = base.from_row(&part.table, 0);
                    if let Some(g) = ribbon(coord, params, &part.table, &style) {
                        grobs.push(g);
                    }
                }
            }
            Geom::Polygon => {
                for part in data.partitions() {
                    let t = &part.table;
                    let pts: Vec<(f64, f64)> = (0..t.nrow())
                        .filter_map(|r| Some((t.num(r, "x")?, t.num(r, "y")?)))
                        .collect();
                    if pts.len() < 3 {
                        continue;
                    }
                    let style = base.from_row(t, 0);
                    grobs.push(Grob::primitive(
                        "polygon",
                        Primitive::Polygon {
                            points: coord.munch(params, &pts, true),
                            fill: style.fill_colour(),
                            stroke: style.stroke(false),
                        },
                    ));
                }
            }
            Geom::Text => {
                for row in 0..data.nrow() {
                    let (Some(x), Some(y)) = (data.num(row, "x"), data.num(row, "y")) else { continue };
                    let Some(at) = pt(x, y) else { continue };
                    let style = base.from_row(data, row);
                    let label = data.value(row, "label").map(Value::label).unwrap_or_default();
                    grobs.push(Grob::primitive(
                        "text",
                        Primitive::Text {
                            at,
                            label,
                            style: TextStyle {
                                size: mm_to_pt(style.size),
                                colour: style.alpha(style.colour).unwrap_or(Color::BLACK),
                                ..TextStyle::default()
                            },
                        },
                    ));
                }
            }
            Geom::Boxplot => {
                for row in 0..data.nrow() {
                    let style = base.from_row(data, row);
                    grobs.extend(boxplot_row(coord, params, data, row, &style));
                }
            }
            Geom::Violin => {
                for part in data.partitions() {
                    let style = base.from_row(&part.table, 0);
                    if let Some(g) = violin(coord, params, &part.table, &style) {
                        grobs.push(g);
                    }
                }
            }
            Geom::Smooth => {
                for part in data.partitions() {
                    let t = &part.table;
                    let style = base.from_row(t, 0);
                    if t.has_column("ymin") && t.has_column("ymax") {
                        let band = Style {
                            colour: None,
                            ..style.clone()
                        };
                        if let Some(g) = ribbon(coord, params, t, &band) {
                            grobs.push(g);
                        }
                    }
                    let mut pts: Vec<(f64, f64)> = (0..t.nrow())
                        .filter_map(|r| Some((t.num(r, "x")?, t.num(r, "y")?)))
                        .collect();
                    pts.sort_by(|a, b| a.0.total_cmp(&b.0));
                    if let (Some(stroke), true) = (style.stroke(false), pts.len() >= 2) {
                        grobs.push(Grob::primitive(
                            "path",
                            Primitive::Path {
                                points: coord.munch(params, &pts, false),
                                stroke,
                            },
                        ));
                    }
                }
            }
        }
        grobs
    }

    /// Legend key glyph in key-box units.
    pub fn draw_key(self, style: &Style) -> Vec<Primitive> {
        match self {
            Geom::Point => point(style, Some((0.5, 0.5))).into_iter().collect(),
            Geom::Line | Geom::Path | Geom::Segment => style
                .stroke(true)
                .map(|stroke| Primitive::Path {
                    points: vec![(0.1, 0.5), (0.9, 0.5)],
                    stroke,
                })
                .into_iter()
                .collect(),
            Geom::Smooth => {
                let mut key = Vec::new();
                if let Some(fill) = style.fill_colour() {
                    key.push(Primitive::Rect {
                        min: (0.0, 0.0),
                        max: (1.0, 1.0),
                        fill: Some(fill),
                        stroke: None,
                    });
                }
                if let Some(stroke) = style.stroke(false) {
                    key.push(Primitive::Path {
                        points: vec![(0.1, 0.5), (0.9, 0.5)],
                        stroke,
                    });
                }
                key
            }
            Geom::Text => vec![Primitive::Text {
                at: (0.5, 0.5),
                label: "a".to_string(),
                style: TextStyle {
                    size: mm_to_pt(style.size),
                    colour: style.alpha(style.colour).unwrap_or(Color::BLACK),
                    face: crate::ir::FontFace::Bold,
                    ..TextStyle::default()
                },
            }],
            _ => vec![Primitive::Rect {
                min: (0.1, 0.1),
                max: (0.9, 0.9),
                fill: style.fill_colour(),
                stroke: style.stroke(false),
            }],
        }
    }
}

fn point(style: &Style, at: Option<(f64, f64)>) -> Option<Primitive> {
    let at = at?;
    let colour = style.alpha(style.colour)?;
    Some(Primitive::Point {
        at,
        shape: style.shape,
        size: mm_to_px(style.size) / 2.0 + 0.5,
        colour,
        fill: style.fill_colour(),
        stroke_width: mm_to_px(0.5),
    })
}

fn rect_row(coord: &CoordSystem, params: &PanelParams, data: &RowTable, row: usize, style: &Style) -> Option<Grob> {
    let [xmin, xmax, ymin, ymax] = ["xmin", "xmax", "ymin", "ymax"].map(|c| data.num(row, c));
    let (xmin, xmax, ymin, ymax) = (xmin?, xmax?, ymin?, ymax?);
    if coord.is_linear() {
        let a = coord.transform(params, xmin, ymin)?;
        let b = coord.transform(params, xmax, ymax)?;
        return Some(Grob::primitive(
            "rect",
            Primitive::Rect {
                min: (a.0.min(b.0), a.1.min(b.1)),
                max: (a.0.max(b.0), a.1.max(b.1)),
                fill: style.fill_colour(),
                stroke: style.stroke(false),
            },
        ));
    }
    let points = coord.rect(params, (xmin, ymin), (xmax, ymax));
    (points.len() >= 3).then(|| {
        Grob::primitive(
            "rect",
            Primitive::Polygon {
                points,
                fill: style.fill_colour(),
                stroke: style.stroke(false),
            },
        )
    })
}

/// Regular grids on a linear, unflipped panel become one raster image.
fn raster(coord: &CoordSystem, params: &PanelParams, data: &RowTable, base: &Style) -> Option<Grob> {
    if !matches!(coord, CoordSystem::Cartesian { .. }) || data.is_empty() {
        return None;
    }
    let distinct = |name: &str| {
        let mut v = data.finite(name);
        v.sort_by(|a, b| a.total_cmp(b));
        v.dedup();
        v
    };
    let xs = distinct("x");
    let ys = distinct("y");
    let xmin = data.finite("xmin").into_iter().fold(f64::INFINITY, f64::min);
    let xmax = data.finite("xmax").into_iter().fold(f64::NEG_INFINITY, f64::max);
    let ymin = data.finite("ymin").into_iter().fold(f64::INFINITY, f64::min);
    let ymax = data.finite("ymax").into_iter().fold(f64::NEG_INFINITY, f64::max);

    let (ncol, nrow) = (xs.len(), ys.len());
    let mut cells = vec![Color::WHITE.with_alpha(0.0); ncol * nrow];
    for row in 0..data.nrow() {
        let (Some(x), Some(y)) = (data.num(row, "x"), data.num(row, "y")) else { continue };
        let ci = xs.iter().position(|v| *v == x)?;
        let ri = nrow - 1 - ys.iter().position(|v| *v == y)?;
        if let Some(fill) = base.from_row(data, row).fill_colour() {
            cells[ri * ncol + ci] = fill;
        }
    }
    let a = coord.transform(params, xmin, ymin)?;
    let b = coord.transform(params, xmax, ymax)?;
    Some(Grob::primitive(
        "raster",
        Primitive::Raster {
            min: a,
            max: b,
            ncol,
            nrow,
            cells,
        },
    ))
}

fn ribbon(coord: &CoordSystem, params: &PanelParams, t: &RowTable, style: &Style) -> Option<Grob> {
    let mut rows: Vec<(f64, f64, f64)> = (0..t.nrow())
        .filter_map(|r| Some((t.num(r, "x")?, t.num(r, "ymin")?, t.num(r, "ymax")?)))
        .collect();
    if rows.len() < 2 {
        return None;
    }
    rows.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut outline: Vec<(f64, f64)> = rows.iter().map(|(x, _, hi)| (*x, *hi)).collect();
    outline.extend(rows.iter().rev().map(|(x, lo, _)| (*x, *lo)));
    Some(Grob::primitive(
        "ribbon",
        Primitive::Polygon {
            points: coord.munch(params, &outline, true),
            fill: style.fill_colour(),
            stroke: style.stroke(false),
        },
    ))
}

fn boxplot_row(coord: &CoordSystem, params: &PanelParams, data: &RowTable, row: usize, style: &Style) -> Vec<Grob> {
    let Some(x) = data.num(row, "x") else { return Vec::new() };
    if data.num(row, "outlier").is_some() {
        let outlier = Style {
            size: 1.5,
            fill: None,
            ..style.clone()
        };
        return data
            .num(row, "y")
            .and_then(|y| point(&outlier, coord.transform(params, x, y)))
            .map(|p| vec![Grob::primitive("outlier", p)])
            .unwrap_or_default();
    }
    let stats = ["xmin", "xmax", "ymin", "lower", "middle", "upper", "ymax"].map(|c| data.num(row, c));
    let [Some(xmin), Some(xmax), Some(ymin), Some(lower), Some(middle), Some(upper), Some(ymax)] = stats else {
        return Vec::new();
    };
    let Some(stroke) = style.stroke(false) else { return Vec::new() };

    let mut grobs = Vec::new();
    for (name, from, to) in [("whisker", ymax, upper), ("whisker", lower, ymin)] {
        grobs.push(Grob::primitive(
            name,
            Primitive::Path {
                points: coord.munch(params, &[(x, from), (x, to)], false),
                stroke,
            },
        ));
    }
    grobs.push(Grob::primitive(
        "box",
        Primitive::Polygon {
            points: coord.rect(params, (xmin, lower), (xmax, upper)),
            fill: style.fill_colour(),
            stroke: Some(stroke),
        },
    ));
    grobs.push(Grob::primitive(
        "median",
        Primitive::Path {
            points: coord.munch(params, &[(xmin, middle), (xmax, middle)], false),
            stroke: Stroke {
                width: stroke.width * 2.0,
                ..stroke
            },
        },
    ));
    grobs
}

fn violin(coord: &CoordSystem, params: &PanelParams, t: &RowTable, style: &Style) -> Option<Grob> {
    let mut rows: Vec<(f64, f64, f64, f64, f64)> = (0..t.nrow())
        .filter_map(|r| {
            Some((
                t.num(r, "y")?,
                t.num(r, "x")?,
                t.num(r, "xmin")?,
                t.num(r, "xmax")?,
                t.num(r, "violinwidth").unwrap_or(1.0),
            ))
        })
        .collect();
    if rows.len() < 2 {
        return None;
    }
    rows.sort_by(|a, b| a.0.total_cmp(&b.0));
    let half = |(_, x, xmin, xmax, w): &(f64, f64, f64, f64, f64)| (*x, (xmax - xmin) / 2.0 * w);
    let mut outline: Vec<(f64, f64)> = rows
        .iter()
        .map(|r| {
            let (x, h) = half(r);
            (x - h, r.0)
        })
        .collect();
    outline.extend(rows.iter().rev().map(|r| {
        let (x, h) = half(r);
        (x + h, r.0)
    }));
    Some(Grob::primitive(
        "violin",
        Primitive::Polygon {
            points: coord.munch(params, &outline, true),
            fill: style.fill_colour(),
            stroke: style.stroke(false),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::{ScaleKind, ScaleSpec};
    use approx::assert_relative_eq;
    use crate::scale::Scale;

    fn params(coord: &CoordSystem) -> PanelParams {
        let mut x = Scale::new(ScaleSpec::new(Aes::X), ScaleKind::Continuous);
        x.train_continuous(vec![0.0, 10.0]);
        let mut y = Scale::new(ScaleSpec::new(Aes::Y), ScaleKind::Continuous);
        y.train_continuous(vec![0.0, 10.0]);
        coord.panel_params(&x, &y)
    }

    fn table(columns: Vec<(&str, Vec<Value>)>) -> RowTable {
        RowTable::from_columns(columns).unwrap()
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Geom::from_name("geom_col"), Some(Geom::Col));
        assert_eq!(Geom::Bar.default_stat(), Stat::Count);
        assert_eq!(Geom::Point.default_position(), Position::Identity);
    }

    #[test]
    fn test_bar_setup_spans_zero() {
        let t = table(vec![("x", vec![1.0.into(), 2.0.into()]), ("y", vec![3.0.into(), (-1.0).into()])]);
        let out = Geom::Bar.setup_data(&t, None);
        let xmin = out.finite("xmin");
        assert_relative_eq!(xmin[0], 0.55, epsilon = 1e-12);
        assert_relative_eq!(xmin[1], 1.55, epsilon = 1e-12);
        assert_eq!(out.finite("ymin"), vec![0.0, -1.0]);
        assert_eq!(out.finite("ymax"), vec![3.0, 0.0]);
    }

    #[test]
    fn test_bar_setup_keeps_stat_extents() {
        let t = table(vec![
            ("x", vec![0.5.into()]),
            ("y", vec![2.0.into()]),
            ("xmin", vec![0.0.into()]),
            ("xmax", vec![1.0.into()]),
        ]);
        let out = Geom::Histogram.setup_data(&t, None);
        assert_eq!(out.num(0, "xmin"), Some(0.0));
    }

    #[test]
    fn test_remove_missing() {
        let t = table(vec![("x", vec![1.0.into(), Value::Null]), ("y", vec![1.0.into(), 2.0.into()])]);
        let (out, removed) = Geom::Point.remove_missing(&t);
        assert_eq!(removed, 1);
        assert_eq!(out.nrow(), 1);
    }

    #[test]
    fn test_point_draws_in_panel_units() {
        let coord = CoordSystem::default();
        let t = table(vec![
            ("x", vec![5.0.into()]),
            ("y", vec![5.0.into()]),
            ("colour", vec!["#FF0000".into()]),
        ]);
        let grobs = Geom::Point.draw_panel(&t, &coord, &params(&coord));
        assert_eq!(grobs.len(), 1);
        match grobs[0].as_primitive() {
            Some(Primitive::Point { at, colour, .. }) => {
                assert!((at.0 - 0.5).abs() < 1e-9);
                assert_eq!(colour.to_hex(), "#FF0000");
            }
            other => panic!("expected a point, got {:?}", other),
        }
    }

    #[test]
    fn test_line_sorted_by_x() {
        let coord = CoordSystem::default();
        let t = table(vec![
            ("x", vec![3.0.into(), 1.0.into(), 2.0.into()]),
            ("y", vec![1.0.into(), 2.0.into(), 3.0.into()]),
        ]);
        let grobs = Geom::Line.draw_panel(&t, &coord, &params(&coord));
        let Some(Primitive::Path { points, .. }) = grobs[0].as_primitive() else {
            panic!("expected a path")
        };
        assert!(points.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn test_bar_in_polar_is_polygon() {
        let coord = CoordSystem::Polar {
            theta: crate::coord::Theta::Y,
            start: 0.0,
            direction: 1.0,
        };
        let t = table(vec![
            ("xmin", vec![0.0.into()]),
            ("xmax", vec![1.0.into()]),
            ("ymin", vec![0.0.into()]),
            ("ymax", vec![5.0.into()]),
        ]);
        let grobs = Geom::Bar.draw_panel(&t, &coord, &params(&coord));
        assert!(matches!(grobs[0].as_primitive(), Some(Primitive::Polygon { .. })));
    }

    #[test]
    fn test_boxplot_draws_box_and_outliers() {
        let coord = CoordSystem::default();
        let t = table(vec![
            ("x", vec![1.0.into(), 1.0.into()]),
            ("xmin", vec![0.5.into(), 0.5.into()]),
            ("xmax", vec![1.5.into(), 1.5.into()]),
            ("ymin", vec![1.0.into(), Value::Null]),
            ("lower", vec![2.0.into(), Value::Null]),
            ("middle", vec![3.0.into(), Value::Null]),
            ("upper", vec![4.0.into(), Value::Null]),
            ("ymax", vec![5.0.into(), Value::Null]),
            ("y", vec![Value::Null, 9.0.into()]),
            ("outlier", vec![Value::Null, 1.0.into()]),
        ]);
        let grobs = Geom::Boxplot.draw_panel(&t, &coord, &params(&coord));
        let names: Vec<&str> = grobs.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["whisker", "whisker", "box", "median", "outlier"]);
    }

    #[test]
    fn test_keys() {
        let style = Geom::Bar.default_style();
        assert!(matches!(Geom::Bar.draw_key(&style)[..], [Primitive::Rect { .. }]));
        let style = Geom::Point.default_style();
        assert!(matches!(Geom::Point.draw_key(&style)[..], [Primitive::Point { .. }]));
    }
}
