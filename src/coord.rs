//! Coordinate systems: map scale-space positions into panel-normalized
//! `[0, 1]` coordinates (y up).

use crate::scale::{expand_range, Scale};
use crate::trans::Transform;
use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

/// Maximum length of a munched segment, in normalized panel units.
const SEGMENT_LENGTH: f64 = 0.01;
const MAX_PIECES: usize = 1000;
/// Outer radius of a polar panel.
const POLAR_RADIUS: f64 = 0.4;

/// External map projection. Treated as opaque and pure: `None` marks a point
/// the projection cannot place.
pub trait Projection: fmt::Debug + Send + Sync {
    fn project(&self, x: f64, y: f64) -> Option<(f64, f64)>;
}

/// Which position variable drives the angle of a polar coordinate system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theta {
    #[default]
    X,
    Y,
}

impl Theta {
    pub fn from_name(name: &str) -> Option<Theta> {
        match name {
            "x" => Some(Theta::X),
            "y" => Some(Theta::Y),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CoordSystem {
    /// Zoom limits are in raw data units.
    Cartesian {
        xlim: Option<(f64, f64)>,
        ylim: Option<(f64, f64)>,
        expand: bool,
    },
    Flip,
    Polar {
        theta: Theta,
        /// Offset of the origin from 12 o'clock, in radians
        start: f64,
        /// 1 clockwise, -1 anticlockwise
        direction: f64,
    },
    /// Transform applied to positions after statistics.
    Trans {
        x: Transform,
        y: Transform,
    },
    Projected(Arc<dyn Projection>),
}

impl Default for CoordSystem {
    fn default() -> Self {
        CoordSystem::Cartesian {
            xlim: None,
            ylim: None,
            expand: true,
        }
    }
}

impl PartialEq for CoordSystem {
    fn eq(&self, other: &Self) -> bool {
        use CoordSystem::*;
        match (self, other) {
            (
                Cartesian { xlim, ylim, expand },
                Cartesian {
                    xlim: x2,
                    ylim: y2,
                    expand: e2,
                },
            ) => xlim == x2 && ylim == y2 && expand == e2,
            (Flip, Flip) => true,
            (
                Polar {
                    theta,
                    start,
                    direction,
                },
                Polar {
                    theta: t2,
                    start: s2,
                    direction: d2,
                },
            ) => theta == t2 && start == s2 && direction == d2,
            (Trans { x, y }, Trans { x: x2, y: y2 }) => x == x2 && y == y2,
            (Projected(a), Projected(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Break positions (scale space) and labels of one position scale, as seen
/// by a panel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AxisBreaks {
    pub major: Vec<f64>,
    pub labels: Vec<String>,
    pub minor: Vec<f64>,
}

/// Per-panel ranges and breaks.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelParams {
    /// Ranges in coordinate space (after any coord transform)
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    pub x: AxisBreaks,
    pub y: AxisBreaks,
    /// Projected bounding box (min x, min y, max x, max y)
    bbox: Option<(f64, f64, f64, f64)>,
}

fn rescale(v: f64, (lo, hi): (f64, f64)) -> f64 {
    if hi - lo == 0.0 {
        0.5
    } else {
        (v - lo) / (hi - lo)
    }
}

fn axis_breaks(scale: &Scale, range: (f64, f64), to_coord: impl Fn(f64) -> Option<f64>) -> AxisBreaks {
    let (lo, hi) = (range.0.min(range.1), range.0.max(range.1));
    let inside = |b: &f64| to_coord(*b).map(|c| c >= lo - 1e-9 && c <= hi + 1e-9).unwrap_or(false);

    let all = scale.breaks();
    let all_labels = scale.break_labels(&all);
    let (major, labels): (Vec<f64>, Vec<String>) = all.into_iter().zip(all_labels).filter(|(b, _)| inside(b)).unzip();

    let minor = if scale.is_continuous() {
        major.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
    } else {
        Vec::new()
    };
    AxisBreaks { major, labels, minor }
}

impl CoordSystem {
    pub fn name(&self) -> &'static str {
        match self {
            CoordSystem::Cartesian { .. } => "cartesian",
            CoordSystem::Flip => "flip",
            CoordSystem::Polar { .. } => "polar",
            CoordSystem::Trans { .. } => "trans",
            CoordSystem::Projected(_) => "projected",
        }
    }

    /// Straight lines in data space stay straight on the panel.
    pub fn is_linear(&self) -> bool {
        matches!(self, CoordSystem::Cartesian { .. } | CoordSystem::Flip)
    }

    /// The horizontal axis shows the y scale.
    pub fn is_flipped(&self) -> bool {
        matches!(self, CoordSystem::Flip)
            || matches!(self, CoordSystem::Polar { theta: Theta::Y, .. })
    }

    /// Compute a panel's ranges and breaks from its trained position scales.
    pub fn panel_params(&self, x: &Scale, y: &Scale) -> PanelParams {
        match self {
            CoordSystem::Cartesian { xlim, ylim, expand } => {
                let limited = |scale: &Scale, lim: &Option<(f64, f64)>| match lim {
                    Some((lo, hi)) => {
                        let t = scale.transform();
                        expand_range((t.forward(*lo), t.forward(*hi)), scale.expansion(*expand))
                    }
                    None => scale.expanded_range(*expand),
                };
                let x_range = limited(x, xlim);
                let y_range = limited(y, ylim);
                PanelParams {
                    x: axis_breaks(x, x_range, Some),
                    y: axis_breaks(y, y_range, Some),
                    x_range,
                    y_range,
                    bbox: None,
                }
            }
            CoordSystem::Flip => {
                let x_range = x.expanded_range(true);
                let y_range = y.expanded_range(true);
                PanelParams {
                    x: axis_breaks(x, x_range, Some),
                    y: axis_breaks(y, y_range, Some),
                    x_range,
                    y_range,
                    bbox: None,
                }
            }
            CoordSystem::Polar { theta, .. } => {
                // The angle wraps without expansion; the radius is expanded.
                let angle_range = |s: &Scale| {
                    if s.is_discrete() {
                        (-0.5, (s.levels().len() as f64 - 0.5).max(0.5))
                    } else {
                        s.expanded_range(false)
                    }
                };
                let (x_range, y_range) = match theta {
                    Theta::X => (angle_range(x), y.expanded_range(true)),
                    Theta::Y => (x.expanded_range(true), angle_range(y)),
                };
                PanelParams {
                    x: axis_breaks(x, x_range, Some),
                    y: axis_breaks(y, y_range, Some),
                    x_range,
                    y_range,
                    bbox: None,
                }
            }
            CoordSystem::Trans { x: tx, y: ty } => {
                let trans_range = |scale: &Scale, t: Transform| {
                    let (lo, hi) = scale
                        .limits()
                        .unwrap_or_else(|| scale.expanded_range(false));
                    let (mut a, b) = (t.forward(lo), t.forward(hi));
                    if !a.is_finite() {
                        a = b - 1.0;
                    }
                    expand_range((a.min(b), a.max(b)), scale.expansion(true))
                };
                let x_range = trans_range(x, *tx);
                let y_range = trans_range(y, *ty);
                let fwd = |t: Transform| move |v: f64| if t.in_domain(v) { Some(t.forward(v)) } else { None };
                PanelParams {
                    x: axis_breaks(x, x_range, fwd(*tx)),
                    y: axis_breaks(y, y_range, fwd(*ty)),
                    x_range,
                    y_range,
                    bbox: None,
                }
            }
            CoordSystem::Projected(projection) => {
                let x_range = x.expanded_range(false);
                let y_range = y.expanded_range(false);
                let mut bbox: Option<(f64, f64, f64, f64)> = None;
                const STEPS: usize = 20;
                for i in 0..=STEPS {
                    for j in 0..=STEPS {
                        let px = x_range.0 + (x_range.1 - x_range.0) * i as f64 / STEPS as f64;
                        let py = y_range.0 + (y_range.1 - y_range.0) * j as f64 / STEPS as f64;
                        if let Some((u, v)) = projection.project(px, py) {
                            bbox = Some(match bbox {
                                Some((a, b, c, d)) => (a.min(u), b.min(v), c.max(u), d.max(v)),
                                None => (u, v, u, v),
                            });
                        }
                    }
                }
                PanelParams {
                    x: AxisBreaks::default(),
                    y: AxisBreaks::default(),
                    x_range,
                    y_range,
                    bbox,
                }
            }
        }
    }

    /// Map one scale-space position to normalized panel coordinates.
    pub fn transform(&self, params: &PanelParams, x: f64, y: f64) -> Option<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        match self {
            CoordSystem::Cartesian { .. } => Some((rescale(x, params.x_range), rescale(y, params.y_range))),
            CoordSystem::Flip => Some((rescale(y, params.y_range), rescale(x, params.x_range))),
            CoordSystem::Trans { x: tx, y: ty } => {
                if !tx.in_domain(x) || !ty.in_domain(y) {
                    return None;
                }
                Some((
                    rescale(tx.forward(x), params.x_range),
                    rescale(ty.forward(y), params.y_range),
                ))
            }
            CoordSystem::Polar {
                theta,
                start,
                direction,
            } => {
                let (t, r) = match theta {
                    Theta::X => (rescale(x, params.x_range), rescale(y, params.y_range)),
                    Theta::Y => (rescale(y, params.y_range), rescale(x, params.x_range)),
                };
                let angle = start + direction * 2.0 * PI * t;
                let radius = r * POLAR_RADIUS;
                Some((0.5 + radius * angle.sin(), 0.5 + radius * angle.cos()))
            }
            CoordSystem::Projected(projection) => {
                let (u, v) = projection.project(x, y)?;
                let (x0, y0, x1, y1) = params.bbox?;
                Some((rescale(u, (x0, x1)), rescale(v, (y0, y1))))
            }
        }
    }

    /// Map a path, interpolating segments first when the system is not linear.
    pub fn munch(&self, params: &PanelParams, points: &[(f64, f64)], closed: bool) -> Vec<(f64, f64)> {
        if self.is_linear() {
            return points.iter().filter_map(|&(x, y)| self.transform(params, x, y)).collect();
        }
        let closed = closed && points.len() > 2;
        let mut pts = points.to_vec();
        if closed {
            pts.push(pts[0]);
        }
        let mut out = Vec::new();
        for (i, &(x, y)) in pts.iter().enumerate() {
            if let Some(&(nx, ny)) = pts.get(i + 1) {
                let dx = rescale(nx, params.x_range) - rescale(x, params.x_range);
                let dy = rescale(ny, params.y_range) - rescale(y, params.y_range);
                let dist = (dx * dx + dy * dy).sqrt();
                let pieces = ((dist / SEGMENT_LENGTH).ceil() as usize).clamp(1, MAX_PIECES);
                for k in 0..pieces {
                    let f = k as f64 / pieces as f64;
                    if let Some(p) = self.transform(params, x + (nx - x) * f, y + (ny - y) * f) {
                        out.push(p);
                    }
                }
            } else if !closed {
                if let Some(p) = self.transform(params, x, y) {
                    out.push(p);
                }
            }
        }
        out
    }

    /// Rectangle in scale space to a closed outline in panel coordinates.
    pub fn rect(&self, params: &PanelParams, min: (f64, f64), max: (f64, f64)) -> Vec<(f64, f64)> {
        let corners = [(min.0, min.1), (min.0, max.1), (max.0, max.1), (max.0, min.1)];
        self.munch(params, &corners, true)
    }

    /// Major (and minor) grid lines as panel paths: one per x break across the
    /// y range and one per y break across the x range.
    pub fn grid_lines(&self, params: &PanelParams, minor: bool) -> Vec<Vec<(f64, f64)>> {
        let xs = if minor { &params.x.minor } else { &params.x.major };
        let ys = if minor { &params.y.minor } else { &params.y.major };
        let (ylo, yhi) = self.data_range(params, false);
        let (xlo, xhi) = self.data_range(params, true);
        let mut lines = Vec::new();
        for &b in xs {
            lines.push(self.munch(params, &[(b, ylo), (b, yhi)], false));
        }
        for &b in ys {
            lines.push(self.munch(params, &[(xlo, b), (xhi, b)], false));
        }
        lines.retain(|l| l.len() >= 2);
        lines
    }

    /// Panel range in scale space (undoing a coord transform).
    fn data_range(&self, params: &PanelParams, x: bool) -> (f64, f64) {
        let range = if x { params.x_range } else { params.y_range };
        match self {
            CoordSystem::Trans { x: tx, y: ty } => {
                let t = if x { tx } else { ty };
                (t.inverse(range.0), t.inverse(range.1))
            }
            _ => range,
        }
    }

    /// Axis ticks along the bottom and left panel edges: (position in `[0, 1]`,
    /// label). Polar panels only get a radius axis on the left.
    pub fn axis_ticks(&self, params: &PanelParams) -> (Vec<(f64, String)>, Vec<(f64, String)>) {
        let (xlo, _) = self.data_range(params, true);
        let (ylo, _) = self.data_range(params, false);
        let flipped = matches!(self, CoordSystem::Flip);
        let along = |breaks: &AxisBreaks, horizontal: bool| -> Vec<(f64, String)> {
            breaks
                .major
                .iter()
                .zip(&breaks.labels)
                .filter_map(|(&b, label)| {
                    let p = match (flipped, horizontal) {
                        (true, true) => self.transform(params, xlo, b)?.0,
                        (true, false) => self.transform(params, b, ylo)?.1,
                        (false, true) => self.transform(params, b, ylo)?.0,
                        (false, false) => self.transform(params, xlo, b)?.1,
                    };
                    Some((p, label.clone()))
                })
                .collect()
        };
        match self {
            CoordSystem::Cartesian { .. } | CoordSystem::Trans { .. } => (along(&params.x, true), along(&params.y, false)),
            CoordSystem::Flip => (along(&params.y, true), along(&params.x, false)),
            CoordSystem::Polar { theta, .. } => {
                let (r_breaks, r_range) = match theta {
                    Theta::X => (&params.y, params.y_range),
                    Theta::Y => (&params.x, params.x_range),
                };
                let left = r_breaks
                    .major
                    .iter()
                    .zip(&r_breaks.labels)
                    .map(|(&b, l)| (0.5 + rescale(b, r_range) * POLAR_RADIUS, l.clone()))
                    .collect();
                (Vec::new(), left)
            }
            CoordSystem::Projected(_) => (Vec::new(), Vec::new()),
        }
    }

    /// Angle labels of a polar panel: (position, label) just outside the
    /// outer circle.
    pub fn theta_labels(&self, params: &PanelParams) -> Vec<((f64, f64), String)> {
        let CoordSystem::Polar {
            theta,
            start,
            direction,
        } = self
        else {
            return Vec::new();
        };
        let (breaks, range) = match theta {
            Theta::X => (&params.x, params.x_range),
            Theta::Y => (&params.y, params.y_range),
        };
        let mut labels = Vec::new();
        for (&b, label) in breaks.major.iter().zip(&breaks.labels) {
            let t = rescale(b, range);
            // The end of the circle coincides with its start.
            if t > 1.0 - 1e-9 && !labels.is_empty() {
                continue;
            }
            let angle = start + direction * 2.0 * PI * t;
            let radius = POLAR_RADIUS + 0.05;
            labels.push(((0.5 + radius * angle.sin(), 0.5 + radius * angle.cos()), label.clone()));
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aes::Aes;
    use crate::parser::ast::{ScaleKind, ScaleSpec};
    use approx::assert_relative_eq;

    fn scale(aes: Aes, lo: f64, hi: f64) -> Scale {
        let mut s = Scale::new(ScaleSpec::new(aes), ScaleKind::Continuous);
        s.train_continuous(vec![lo, hi]);
        s
    }

    #[derive(Debug)]
    struct Swap;

    impl Projection for Swap {
        fn project(&self, x: f64, y: f64) -> Option<(f64, f64)> {
            Some((y, x))
        }
    }

    #[test]
    fn test_cartesian_normalizes_with_expansion() {
        let coord = CoordSystem::default();
        let params = coord.panel_params(&scale(Aes::X, 0.0, 10.0), &scale(Aes::Y, 0.0, 10.0));
        assert_eq!(params.x_range, (-0.5, 10.5));
        let (x, y) = coord.transform(&params, 5.0, 10.5).unwrap();
        assert_relative_eq!(x, 0.5);
        assert_relative_eq!(y, 1.0);
    }

    #[test]
    fn test_cartesian_zoom_limits() {
        let coord = CoordSystem::Cartesian {
            xlim: Some((2.0, 4.0)),
            ylim: None,
            expand: false,
        };
        let params = coord.panel_params(&scale(Aes::X, 0.0, 10.0), &scale(Aes::Y, 0.0, 1.0));
        assert_eq!(params.x_range, (2.0, 4.0));
        assert_relative_eq!(coord.transform(&params, 3.0, 0.0).unwrap().0, 0.5);
    }

    #[test]
    fn test_flip_swaps_axes() {
        let coord = CoordSystem::Flip;
        let params = coord.panel_params(&scale(Aes::X, 0.0, 10.0), &scale(Aes::Y, 0.0, 100.0));
        let (h, v) = coord.transform(&params, 10.5, -5.0).unwrap();
        assert_relative_eq!(h, 0.0);
        assert_relative_eq!(v, 1.0);
        let (bottom, _) = coord.axis_ticks(&params);
        assert!(bottom.iter().any(|(_, l)| l == "100"));
    }

    #[test]
    fn test_polar_places_points_on_circle() {
        let coord = CoordSystem::Polar {
            theta: Theta::X,
            start: 0.0,
            direction: 1.0,
        };
        let params = coord.panel_params(&scale(Aes::X, 0.0, 4.0), &scale(Aes::Y, 0.0, 1.0));
        // theta 0 points straight up
        let (x, y) = coord.transform(&params, 0.0, params.y_range.1).unwrap();
        assert_relative_eq!(x, 0.5, epsilon = 1e-9);
        assert_relative_eq!(y, 0.9, epsilon = 1e-9);
        // a quarter turn points right
        let (x, _) = coord.transform(&params, 1.0, params.y_range.1).unwrap();
        assert_relative_eq!(x, 0.9, epsilon = 1e-9);
    }

    #[test]
    fn test_munch_curves_polar_segments() {
        let coord = CoordSystem::Polar {
            theta: Theta::X,
            start: 0.0,
            direction: 1.0,
        };
        let params = coord.panel_params(&scale(Aes::X, 0.0, 4.0), &scale(Aes::Y, 0.0, 1.0));
        let path = coord.munch(&params, &[(0.0, 1.0), (2.0, 1.0)], false);
        assert!(path.len() > 10);
        let cartesian = CoordSystem::default();
        let params = cartesian.panel_params(&scale(Aes::X, 0.0, 4.0), &scale(Aes::Y, 0.0, 1.0));
        assert_eq!(cartesian.munch(&params, &[(0.0, 1.0), (2.0, 1.0)], false).len(), 2);
    }

    #[test]
    fn test_trans_drops_out_of_domain() {
        let coord = CoordSystem::Trans {
            x: Transform::Identity,
            y: Transform::Log10,
        };
        let params = coord.panel_params(&scale(Aes::X, 0.0, 1.0), &scale(Aes::Y, 1.0, 100.0));
        assert!(coord.transform(&params, 0.5, -1.0).is_none());
        let (_, mid) = coord.transform(&params, 0.5, 10.0).unwrap();
        assert_relative_eq!(mid, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_projected_uses_bounding_box() {
        let coord = CoordSystem::Projected(Arc::new(Swap));
        let params = coord.panel_params(&scale(Aes::X, 0.0, 2.0), &scale(Aes::Y, 0.0, 4.0));
        let (u, v) = coord.transform(&params, 2.0, 0.0).unwrap();
        assert_relative_eq!(u, 0.0);
        assert_relative_eq!(v, 1.0);
    }

    #[test]
    fn test_grid_lines_cover_breaks() {
        let coord = CoordSystem::default();
        let params = coord.panel_params(&scale(Aes::X, 0.0, 10.0), &scale(Aes::Y, 0.0, 10.0));
        let lines = coord.grid_lines(&params, false);
        assert_eq!(lines.len(), params.x.major.len() + params.y.major.len());
    }
}
