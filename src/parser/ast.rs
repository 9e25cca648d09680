// Abstract Syntax Tree for the grammar-of-graphics plot specification.
//
// A `PlotSpec` is produced either by the DSL parser or directly through the
// builder methods below. The build pipeline only ever reads it.

use crate::aes::{Aes, AesExpr, Mapping};
use crate::data::{RowTable, Value};
use crate::error::Result;
use crate::trans::Transform;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use crate::coord::{CoordSystem, Projection, Theta};
pub use crate::geom::Geom;
pub use crate::position::Position;
pub use crate::stat::{SmoothMethod, Stat, SummaryFun, ViolinScale};

/// Complete plot specification
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlotSpec {
    /// Default aesthetic mapping shared by all layers
    pub mapping: Mapping,
    pub layers: Vec<Layer>,
    /// At most one spec per aesthetic family (a later spec replaces an earlier one)
    pub scales: Vec<ScaleSpec>,
    pub coord: CoordSystem,
    pub facet: Facet,
    pub labels: Labels,
    pub theme: Theme,
}

impl PlotSpec {
    pub fn new(mapping: Mapping) -> Self {
        PlotSpec {
            mapping,
            ..Default::default()
        }
    }

    pub fn layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn scale(mut self, scale: ScaleSpec) -> Self {
        self.add_scale(scale);
        self
    }

    pub fn coord(mut self, coord: CoordSystem) -> Self {
        self.coord = coord;
        self
    }

    pub fn facet(mut self, facet: Facet) -> Self {
        self.facet = facet;
        self
    }

    pub fn labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    /// Register a scale spec, replacing any earlier one for the same family.
    pub fn add_scale(&mut self, scale: ScaleSpec) {
        let family = scale.aesthetic.family();
        self.scales.retain(|s| s.aesthetic.family() != family);
        self.scales.push(scale);
    }

    pub fn scale_spec(&self, aes: Aes) -> Option<&ScaleSpec> {
        let family = aes.family();
        self.scales.iter().find(|s| s.aesthetic.family() == family)
    }
}

// =============================================================================
// Layers
// =============================================================================

/// A function deriving a layer's table from the plot's default data.
#[derive(Clone)]
pub struct DataFn(pub Arc<dyn Fn(&RowTable) -> Result<RowTable> + Send + Sync>);

impl DataFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&RowTable) -> Result<RowTable> + Send + Sync + 'static,
    {
        DataFn(Arc::new(f))
    }

    /// Keep rows whose `column` renders as `value`.
    pub fn filter_eq(column: &str, value: &str) -> Self {
        let column = column.to_string();
        let value = value.to_string();
        DataFn::new(move |table| {
            let mut out = table.clone();
            let idx = table.column_index(&column);
            out.retain(|_, row| idx.map(|i| row[i].label() == value).unwrap_or(false));
            Ok(out)
        })
    }

    /// Keep the first `n` rows.
    pub fn head(n: usize) -> Self {
        DataFn::new(move |table| {
            let mut out = table.clone();
            out.retain(|i, _| i < n);
            Ok(out)
        })
    }

    pub fn apply(&self, table: &RowTable) -> Result<RowTable> {
        (self.0)(table)
    }
}

impl fmt::Debug for DataFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataFn(..)")
    }
}

impl PartialEq for DataFn {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Where a layer's rows come from.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LayerData {
    /// Use the plot's default data.
    #[default]
    Inherit,
    Table(RowTable),
    /// Untyped data that must still be validated into a table.
    Json(serde_json::Value),
    Function(DataFn),
}

/// Individual visualization layer
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub geom: Geom,
    pub stat: Stat,
    pub position: Position,
    pub data: LayerData,
    /// Layer-level aesthetic overrides
    pub mapping: Mapping,
    /// Fixed (non data-driven) aesthetic values, e.g. `colour = "red"`
    pub params: BTreeMap<Aes, Value>,
    /// Bar / tile / boxplot width in data units
    pub width: Option<f64>,
    pub inherit_aes: bool,
    /// `None` shows the layer in legends whenever it maps a legend aesthetic
    pub show_legend: Option<bool>,
}

impl Layer {
    /// A layer with the geom's default stat and position.
    pub fn new(geom: Geom) -> Self {
        Layer {
            stat: geom.default_stat(),
            position: geom.default_position(),
            geom,
            data: LayerData::Inherit,
            mapping: Mapping::new(),
            params: BTreeMap::new(),
            width: None,
            inherit_aes: true,
            show_legend: None,
        }
    }

    pub fn stat(mut self, stat: Stat) -> Self {
        self.stat = stat;
        self
    }

    pub fn position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn data(mut self, data: LayerData) -> Self {
        self.data = data;
        self
    }

    pub fn mapping(mut self, mapping: Mapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn map(mut self, aes: Aes, expr: AesExpr) -> Self {
        self.mapping.insert(aes, expr);
        self
    }

    pub fn param(mut self, aes: Aes, value: impl Into<Value>) -> Self {
        self.params.insert(aes, value.into());
        self
    }

    pub fn width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    pub fn inherit_aes(mut self, inherit: bool) -> Self {
        self.inherit_aes = inherit;
        self
    }

    pub fn show_legend(mut self, show: bool) -> Self {
        self.show_legend = Some(show);
        self
    }
}

// =============================================================================
// Scales
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleKind {
    Continuous,
    Discrete,
    Binned,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Limits {
    Continuous(f64, f64),
    /// Declared level order
    Discrete(Vec<String>),
}

/// Out-of-bounds policy for continuous limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Oob {
    #[default]
    Censor,
    Squish,
    Keep,
}

impl Oob {
    pub fn from_name(name: &str) -> Option<Oob> {
        match name {
            "censor" => Some(Oob::Censor),
            "squish" => Some(Oob::Squish),
            "keep" => Some(Oob::Keep),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuideKind {
    /// Legend for discrete/binned scales, colour bar for continuous colour
    #[default]
    Auto,
    Legend,
    Colourbar,
    None,
}

/// User configuration of one scale.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleSpec {
    pub aesthetic: Aes,
    /// `None` infers the kind from the data
    pub kind: Option<ScaleKind>,
    pub transform: Transform,
    pub limits: Option<Limits>,
    pub oob: Oob,
    /// Break positions in raw data units
    pub breaks: Option<Vec<f64>>,
    pub labels: Option<Vec<String>>,
    pub n_breaks: Option<usize>,
    /// Binned scales: number of equal-width bins (default 10) or explicit edges
    pub bins: Option<usize>,
    pub bin_edges: Option<Vec<f64>>,
    /// Axis / legend title
    pub name: Option<String>,
    pub guide: GuideKind,
    /// Legends sharing a key are merged into one
    pub guide_key: Option<String>,
    /// (multiplicative, additive) range expansion for position scales
    pub expand: Option<(f64, f64)>,
    /// Manual palette for discrete non-position scales
    pub values: Option<Vec<String>>,
    /// Output range for size / alpha
    pub range: Option<(f64, f64)>,
    /// Low / high colours for continuous colour scales
    pub gradient: Option<(String, String)>,
}

impl ScaleSpec {
    pub fn new(aesthetic: Aes) -> Self {
        ScaleSpec {
            aesthetic: aesthetic.family(),
            kind: None,
            transform: Transform::Identity,
            limits: None,
            oob: Oob::Censor,
            breaks: None,
            labels: None,
            n_breaks: None,
            bins: None,
            bin_edges: None,
            name: None,
            guide: GuideKind::Auto,
            guide_key: None,
            expand: None,
            values: None,
            range: None,
            gradient: None,
        }
    }

    pub fn continuous(aesthetic: Aes) -> Self {
        ScaleSpec {
            kind: Some(ScaleKind::Continuous),
            ..ScaleSpec::new(aesthetic)
        }
    }

    pub fn discrete(aesthetic: Aes) -> Self {
        ScaleSpec {
            kind: Some(ScaleKind::Discrete),
            ..ScaleSpec::new(aesthetic)
        }
    }

    pub fn binned(aesthetic: Aes) -> Self {
        ScaleSpec {
            kind: Some(ScaleKind::Binned),
            ..ScaleSpec::new(aesthetic)
        }
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn limits(mut self, lo: f64, hi: f64) -> Self {
        self.limits = Some(Limits::Continuous(lo, hi));
        self
    }

    pub fn levels(mut self, levels: &[&str]) -> Self {
        self.limits = Some(Limits::Discrete(levels.iter().map(|s| s.to_string()).collect()));
        self
    }

    pub fn oob(mut self, oob: Oob) -> Self {
        self.oob = oob;
        self
    }

    pub fn breaks(mut self, breaks: Vec<f64>) -> Self {
        self.breaks = Some(breaks);
        self
    }

    pub fn labels(mut self, labels: Vec<String>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn bins(mut self, bins: usize) -> Self {
        self.bins = Some(bins);
        self
    }

    pub fn bin_edges(mut self, edges: Vec<f64>) -> Self {
        self.bin_edges = Some(edges);
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn guide(mut self, guide: GuideKind) -> Self {
        self.guide = guide;
        self
    }

    pub fn guide_key(mut self, key: &str) -> Self {
        self.guide_key = Some(key.to_string());
        self
    }

    pub fn values(mut self, values: &[&str]) -> Self {
        self.values = Some(values.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn range(mut self, lo: f64, hi: f64) -> Self {
        self.range = Some((lo, hi));
        self
    }

    pub fn gradient(mut self, low: &str, high: &str) -> Self {
        self.gradient = Some((low.to_string(), high.to_string()));
        self
    }
}

// =============================================================================
// Facets
// =============================================================================

/// Scale sharing between facet panels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacetScales {
    #[default]
    Fixed,
    FreeX,
    FreeY,
    Free,
}

impl FacetScales {
    pub fn from_name(name: &str) -> Option<FacetScales> {
        match name {
            "fixed" => Some(FacetScales::Fixed),
            "free_x" => Some(FacetScales::FreeX),
            "free_y" => Some(FacetScales::FreeY),
            "free" => Some(FacetScales::Free),
            _ => None,
        }
    }

    pub fn free_x(self) -> bool {
        matches!(self, FacetScales::FreeX | FacetScales::Free)
    }

    pub fn free_y(self) -> bool {
        matches!(self, FacetScales::FreeY | FacetScales::Free)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Facet {
    #[default]
    None,
    Wrap {
        vars: Vec<String>,
        ncol: Option<usize>,
        nrow: Option<usize>,
        scales: FacetScales,
    },
    Grid {
        rows: Vec<String>,
        cols: Vec<String>,
        scales: FacetScales,
    },
}

impl Facet {
    pub fn wrap(vars: &[&str]) -> Facet {
        Facet::Wrap {
            vars: vars.iter().map(|s| s.to_string()).collect(),
            ncol: None,
            nrow: None,
            scales: FacetScales::Fixed,
        }
    }

    pub fn grid(rows: &[&str], cols: &[&str]) -> Facet {
        Facet::Grid {
            rows: rows.iter().map(|s| s.to_string()).collect(),
            cols: cols.iter().map(|s| s.to_string()).collect(),
            scales: FacetScales::Fixed,
        }
    }

    pub fn vars(&self) -> Vec<&str> {
        match self {
            Facet::None => Vec::new(),
            Facet::Wrap { vars, .. } => vars.iter().map(String::as_str).collect(),
            Facet::Grid { rows, cols, .. } => rows.iter().chain(cols.iter()).map(String::as_str).collect(),
        }
    }

    pub fn scales(&self) -> FacetScales {
        match self {
            Facet::None => FacetScales::Fixed,
            Facet::Wrap { scales, .. } | Facet::Grid { scales, .. } => *scales,
        }
    }
}

// =============================================================================
// Labels
// =============================================================================

/// Plot labels (title, subtitle, caption, tag and per-aesthetic titles)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Labels {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub caption: Option<String>,
    pub tag: Option<String>,
    /// Axis and legend titles keyed by aesthetic family
    pub aesthetics: BTreeMap<Aes, String>,
}

impl Labels {
    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn aes(mut self, aes: Aes, title: &str) -> Self {
        self.aesthetics.insert(aes.family(), title.to_string());
        self
    }

    pub fn for_aes(&self, aes: Aes) -> Option<&str> {
        self.aesthetics.get(&aes.family()).map(String::as_str)
    }

    /// Fields set in `other` win.
    pub fn merge(&mut self, other: Labels) {
        if other.title.is_some() {
            self.title = other.title;
        }
        if other.subtitle.is_some() {
            self.subtitle = other.subtitle;
        }
        if other.caption.is_some() {
            self.caption = other.caption;
        }
        if other.tag.is_some() {
            self.tag = other.tag;
        }
        self.aesthetics.extend(other.aesthetics);
    }
}

// =============================================================================
// Theme
// =============================================================================

/// Position of the legend box
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LegendPosition {
    #[default]
    Right,
    Left,
    Top,
    Bottom,
    /// Normalized position inside the panel area
    Inside(f64, f64),
    None,
}

impl LegendPosition {
    pub fn from_name(name: &str) -> Option<LegendPosition> {
        match name {
            "right" => Some(LegendPosition::Right),
            "left" => Some(LegendPosition::Left),
            "top" => Some(LegendPosition::Top),
            "bottom" => Some(LegendPosition::Bottom),
            "inside" => Some(LegendPosition::Inside(0.95, 0.95)),
            "none" => Some(LegendPosition::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementText {
    pub family: Option<String>,
    pub color: Option<String>,
    pub size: Option<f64>,
    pub face: Option<String>,
    pub angle: Option<f64>,
    pub hjust: Option<f64>,
    pub vjust: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementLine {
    pub color: Option<String>,
    pub width: Option<f64>,
    pub linetype: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementRect {
    pub fill: Option<String>,
    pub color: Option<String>,
    pub width: Option<f64>,
}

/// One theme slot: inherit from the parent, blank it, or override fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ThemeElement {
    #[default]
    Inherit,
    Blank,
    Text(ElementText),
    Line(ElementLine),
    Rect(ElementRect),
}

/// Hierarchical theme; resolution lives in `theme_resolve`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Theme {
    // Root elements
    pub line: ThemeElement,
    pub rect: ThemeElement,
    pub text: ThemeElement,

    pub plot_background: ThemeElement,
    pub plot_title: ThemeElement,
    pub plot_subtitle: ThemeElement,
    pub plot_caption: ThemeElement,
    pub plot_tag: ThemeElement,

    pub panel_background: ThemeElement,
    pub panel_border: ThemeElement,
    pub panel_grid_major: ThemeElement,
    pub panel_grid_minor: ThemeElement,

    pub axis_text: ThemeElement,
    pub axis_title: ThemeElement,
    pub axis_line: ThemeElement,
    pub axis_ticks: ThemeElement,

    pub strip_background: ThemeElement,
    pub strip_text: ThemeElement,

    pub legend_background: ThemeElement,
    pub legend_key: ThemeElement,
    pub legend_text: ThemeElement,
    pub legend_title: ThemeElement,
    pub legend_position: Option<LegendPosition>,
}

macro_rules! overlay_fields {
    ($self:ident, $other:ident, $($field:ident),*) => {
        $(
            if $other.$field != ThemeElement::Inherit {
                $self.$field = $other.$field.clone();
            }
        )*
    };
}

impl Theme {
    /// Apply `other` on top of `self`: every non-inherited slot of `other` wins.
    pub fn overlay(&mut self, other: &Theme) {
        overlay_fields!(
            self,
            other,
            line,
            rect,
            text,
            plot_background,
            plot_title,
            plot_subtitle,
            plot_caption,
            plot_tag,
            panel_background,
            panel_border,
            panel_grid_major,
            panel_grid_minor,
            axis_text,
            axis_title,
            axis_line,
            axis_ticks,
            strip_background,
            strip_text,
            legend_background,
            legend_key,
            legend_text,
            legend_title
        );
        if other.legend_position.is_some() {
            self.legend_position = other.legend_position;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_defaults_come_from_geom() {
        let layer = Layer::new(Geom::Histogram);
        assert!(matches!(layer.stat, Stat::Bin { .. }));
        assert!(matches!(layer.position, Position::Stack { .. }));
        assert!(layer.inherit_aes);
    }

    #[test]
    fn test_add_scale_replaces_family() {
        let spec = PlotSpec::default()
            .scale(ScaleSpec::continuous(Aes::X).name("first"))
            .scale(ScaleSpec::continuous(Aes::Xmin).name("second"));
        assert_eq!(spec.scales.len(), 1);
        assert_eq!(spec.scale_spec(Aes::X).and_then(|s| s.name.as_deref()), Some("second"));
    }

    #[test]
    fn test_theme_overlay() {
        let mut base = Theme {
            panel_grid_minor: ThemeElement::Blank,
            ..Default::default()
        };
        let user = Theme {
            axis_line: ThemeElement::Line(ElementLine::default()),
            legend_position: Some(LegendPosition::Bottom),
            ..Default::default()
        };
        base.overlay(&user);
        assert_eq!(base.panel_grid_minor, ThemeElement::Blank);
        assert!(matches!(base.axis_line, ThemeElement::Line(_)));
        assert_eq!(base.legend_position, Some(LegendPosition::Bottom));
    }

    #[test]
    fn test_data_fn_filter() {
        let table = RowTable::from_columns(vec![("g", vec!["a".into(), "b".into(), "a".into()])]).unwrap();
        let out = DataFn::filter_eq("g", "a").apply(&table).unwrap();
        assert_eq!(out.nrow(), 2);
    }
}
