//! Intermediate representations shared between the build stages and the
//! draw-primitive executor.
//!
//! ```text
//! Grob "plot"            (group, viewport = whole canvas)
//! ├── "background"       (rect)
//! ├── "panel-1-1"        (group, viewport = panel pixels)
//! │   ├── "panel-bg"
//! │   ├── "grid"
//! │   └── "layer-1" ...  (primitives in panel-normalized units)
//! ├── "axis-l-1-1", "axis-b-1-1", "strip-t-1-1"
//! └── "guide-box", "title", "xlab-b", "ylab-l", ...
//! ```
//!
//! Primitive coordinates are normalized `[0, 1]` units of the nearest
//! enclosing viewport, with `y` pointing up. Sizes (point size, line width,
//! font size) are absolute pixels.

use crate::data::Value;
use serde::Serialize;

// =============================================================================
// Styles
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// Opacity in `[0, 1]`.
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Color {
        Color { r, g, b, a: 1.0 }
    }

    pub fn with_alpha(self, a: f64) -> Color {
        Color {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Linear interpolation in RGB space, `t` clamped to `[0, 1]`.
    pub fn lerp(self, other: Color, t: f64) -> Color {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Color {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: self.a + (other.a - self.a) * t,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineType {
    #[default]
    Solid,
    Dashed,
    Dotted,
    Dotdash,
    Longdash,
    Twodash,
}

impl LineType {
    pub const ALL: [LineType; 6] = [
        LineType::Solid,
        LineType::Dashed,
        LineType::Dotted,
        LineType::Dotdash,
        LineType::Longdash,
        LineType::Twodash,
    ];

    pub fn from_name(name: &str) -> Option<LineType> {
        match name.to_lowercase().as_str() {
            "solid" => Some(LineType::Solid),
            "dashed" | "dash" => Some(LineType::Dashed),
            "dotted" | "dot" => Some(LineType::Dotted),
            "dotdash" => Some(LineType::Dotdash),
            "longdash" => Some(LineType::Longdash),
            "twodash" => Some(LineType::Twodash),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LineType::Solid => "solid",
            LineType::Dashed => "dashed",
            LineType::Dotted => "dotted",
            LineType::Dotdash => "dotdash",
            LineType::Longdash => "longdash",
            LineType::Twodash => "twodash",
        }
    }

    /// On/off dash lengths in multiples of the line width.
    pub fn dashes(self) -> &'static [f64] {
        match self {
            LineType::Solid => &[],
            LineType::Dashed => &[4.0, 4.0],
            LineType::Dotted => &[1.0, 3.0],
            LineType::Dotdash => &[1.0, 3.0, 4.0, 3.0],
            LineType::Longdash => &[7.0, 3.0],
            LineType::Twodash => &[2.0, 2.0, 6.0, 2.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PointShape {
    #[default]
    Circle,
    Triangle,
    Square,
    Plus,
    Cross,
    Diamond,
}

impl PointShape {
    pub const ALL: [PointShape; 6] = [
        PointShape::Circle,
        PointShape::Triangle,
        PointShape::Square,
        PointShape::Plus,
        PointShape::Cross,
        PointShape::Diamond,
    ];

    pub fn from_name(name: &str) -> Option<PointShape> {
        match name.to_lowercase().as_str() {
            "circle" => Some(PointShape::Circle),
            "triangle" => Some(PointShape::Triangle),
            "square" => Some(PointShape::Square),
            "plus" => Some(PointShape::Plus),
            "cross" | "x" => Some(PointShape::Cross),
            "diamond" => Some(PointShape::Diamond),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PointShape::Circle => "circle",
            PointShape::Triangle => "triangle",
            PointShape::Square => "square",
            PointShape::Plus => "plus",
            PointShape::Cross => "cross",
            PointShape::Diamond => "diamond",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stroke {
    pub colour: Color,
    pub width: f64,
    pub linetype: LineType,
}

impl Stroke {
    pub fn solid(colour: Color, width: f64) -> Stroke {
        Stroke {
            colour,
            width,
            linetype: LineType::Solid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FontFace {
    #[default]
    Plain,
    Bold,
    Italic,
    BoldItalic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextStyle {
    pub family: String,
    pub size: f64,
    pub colour: Color,
    pub face: FontFace,
    pub angle: f64,
    pub hjust: f64,
    pub vjust: f64,
}

impl Default for TextStyle {
    fn default() -> Self {
        TextStyle {
            family: "sans-serif".to_string(),
            size: 11.0,
            colour: Color::BLACK,
            face: FontFace::Plain,
            angle: 0.0,
            hjust: 0.5,
            vjust: 0.5,
        }
    }
}

impl TextStyle {
    /// Font size in pixels (`size` is in points).
    pub fn px(&self) -> f64 {
        self.size * 96.0 / 72.0
    }

    /// Approximate pixel extent (width, height) of a single-line label,
    /// accounting for quarter-turn rotation.
    pub fn measure(&self, label: &str) -> (f64, f64) {
        let w = label.chars().count() as f64 * self.px() * 0.55;
        let h = self.px() * 1.2;
        if (self.angle.abs() - 90.0).abs() < 1e-9 {
            (h, w)
        } else {
            (w, h)
        }
    }
}

// =============================================================================
// Drawing primitive tree
// =============================================================================

/// Pixel rectangle, origin at the top-left of the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Viewport {
        Viewport {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Pixel position of a normalized point (y up).
    pub fn to_pixel(&self, nx: f64, ny: f64) -> (f64, f64) {
        (self.x + nx * self.width, self.y + (1.0 - ny) * self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Point {
        at: (f64, f64),
        shape: PointShape,
        size: f64,
        colour: Color,
        fill: Option<Color>,
        stroke_width: f64,
    },
    Path {
        points: Vec<(f64, f64)>,
        stroke: Stroke,
    },
    Polygon {
        points: Vec<(f64, f64)>,
        fill: Option<Color>,
        stroke: Option<Stroke>,
    },
    /// Axis-aligned rectangle between two opposite corners.
    Rect {
        min: (f64, f64),
        max: (f64, f64),
        fill: Option<Color>,
        stroke: Option<Stroke>,
    },
    Text {
        at: (f64, f64),
        label: String,
        style: TextStyle,
    },
    /// Row-major cells, first row at the top.
    Raster {
        min: (f64, f64),
        max: (f64, f64),
        ncol: usize,
        nrow: usize,
        cells: Vec<Color>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrobKind {
    Primitive(Primitive),
    Group {
        viewport: Option<Viewport>,
        children: Vec<Grob>,
    },
}

/// A named node of the drawing tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grob {
    pub name: String,
    pub kind: GrobKind,
}

impl Grob {
    pub fn primitive(name: impl Into<String>, primitive: Primitive) -> Grob {
        Grob {
            name: name.into(),
            kind: GrobKind::Primitive(primitive),
        }
    }

    pub fn group(name: impl Into<String>, children: Vec<Grob>) -> Grob {
        Grob {
            name: name.into(),
            kind: GrobKind::Group {
                viewport: None,
                children,
            },
        }
    }

    pub fn viewport(name: impl Into<String>, viewport: Viewport, children: Vec<Grob>) -> Grob {
        Grob {
            name: name.into(),
            kind: GrobKind::Group {
                viewport: Some(viewport),
                children,
            },
        }
    }

    pub fn children(&self) -> &[Grob] {
        match &self.kind {
            GrobKind::Group { children, .. } => children,
            GrobKind::Primitive(_) => &[],
        }
    }

    pub fn as_primitive(&self) -> Option<&Primitive> {
        match &self.kind {
            GrobKind::Primitive(p) => Some(p),
            GrobKind::Group { .. } => None,
        }
    }

    pub fn viewport_rect(&self) -> Option<Viewport> {
        match &self.kind {
            GrobKind::Group { viewport, .. } => *viewport,
            GrobKind::Primitive(_) => None,
        }
    }

    /// Depth-first search by node name.
    pub fn find(&self, name: &str) -> Option<&Grob> {
        if self.name == name {
            return Some(self);
        }
        self.children().iter().find_map(|c| c.find(name))
    }

    /// All primitives beneath this node, depth-first.
    pub fn primitives(&self) -> Vec<&Primitive> {
        let mut out = Vec::new();
        self.collect_primitives(&mut out);
        out
    }

    fn collect_primitives<'a>(&'a self, out: &mut Vec<&'a Primitive>) {
        match &self.kind {
            GrobKind::Primitive(p) => out.push(p),
            GrobKind::Group { children, .. } => {
                for child in children {
                    child.collect_primitives(out);
                }
            }
        }
    }

    /// Names of every node, depth-first.
    pub fn names(&self) -> Vec<&str> {
        let mut out = vec![self.name.as_str()];
        for child in self.children() {
            out.extend(child.names());
        }
        out
    }
}

// =============================================================================
// Panel layout
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelInfo {
    pub panel_id: usize,
    /// 0-based grid position.
    pub row: usize,
    pub col: usize,
    /// Facet variable → value for this panel.
    pub key: Vec<(String, Value)>,
    /// Index into the per-panel x / y position scales.
    pub scale_x: usize,
    pub scale_y: usize,
}

impl PanelInfo {
    /// Strip text: the facet values joined by ", ".
    pub fn strip_label(&self) -> Option<String> {
        if self.key.is_empty() {
            return None;
        }
        Some(self.key.iter().map(|(_, v)| v.label()).collect::<Vec<_>>().join(", "))
    }
}

/// Facet strips: wrap panels get one strip on top, grids split by rows and
/// columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StripKind {
    #[default]
    None,
    Wrap,
    Grid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelLayout {
    pub panels: Vec<PanelInfo>,
    pub nrow: usize,
    pub ncol: usize,
    pub strips: StripKind,
    /// Grid facets: row variables (strip on the right) and column variables (strip on top).
    pub row_vars: Vec<String>,
    pub col_vars: Vec<String>,
}

impl PanelLayout {
    pub fn single() -> PanelLayout {
        PanelLayout {
            panels: vec![PanelInfo {
                panel_id: 0,
                row: 0,
                col: 0,
                key: Vec::new(),
                scale_x: 0,
                scale_y: 0,
            }],
            nrow: 1,
            ncol: 1,
            strips: StripKind::None,
            row_vars: Vec::new(),
            col_vars: Vec::new(),
        }
    }

    pub fn panel(&self, panel_id: usize) -> Option<&PanelInfo> {
        self.panels.iter().find(|p| p.panel_id == panel_id)
    }

    pub fn n_scales_x(&self) -> usize {
        self.panels.iter().map(|p| p.scale_x + 1).max().unwrap_or(1)
    }

    pub fn n_scales_y(&self) -> usize {
        self.panels.iter().map(|p| p.scale_y + 1).max().unwrap_or(1)
    }
}
