//! Compositor: pixel layout of the whole plot and the named top-level nodes
//! of the drawing tree.

use crate::coord::{CoordSystem, PanelParams};
use crate::guide::{self, AxisSide, Guide};
use crate::ir::{Grob, PanelInfo, PanelLayout, Primitive, StripKind, TextStyle, Viewport};
use crate::parser::ast::{Labels, LegendPosition};
use crate::theme_resolve::{ResolvedLine, ResolvedRect, ResolvedTheme};
use log::debug;

const MARGIN: f64 = 5.5;
const PANEL_SPACING: f64 = 5.5;
const STRIP_PADDING: f64 = 4.4;
const TITLE_GAP: f64 = 5.5;

/// One panel's computed state and geom output.
#[derive(Debug, Clone)]
pub struct PanelGrobs {
    pub info: PanelInfo,
    pub params: PanelParams,
    /// One group per layer
    pub layers: Vec<Grob>,
}

/// Everything the compositor arranges.
#[derive(Debug, Clone, Copy)]
pub struct Composition<'a> {
    pub layout: &'a PanelLayout,
    pub panels: &'a [PanelGrobs],
    pub coord: &'a CoordSystem,
    pub theme: &'a ResolvedTheme,
    pub labels: &'a Labels,
    /// (bottom, left)
    pub axis_titles: (&'a Option<String>, &'a Option<String>),
    pub guides: &'a [Guide],
}

fn rect_grob(name: &str, rect: &ResolvedRect) -> Grob {
    Grob::primitive(
        name,
        Primitive::Rect {
            min: (0.0, 0.0),
            max: (1.0, 1.0),
            fill: rect.fill,
            stroke: rect.stroke(),
        },
    )
}

fn text_node(name: &str, label: &str, style: &TextStyle, vp: Viewport) -> Grob {
    let at = (style.hjust, 0.5);
    Grob::viewport(
        name,
        vp,
        vec![Grob::primitive(
            "text",
            Primitive::Text {
                at,
                label: label.to_string(),
                style: TextStyle {
                    vjust: 0.5,
                    ..style.clone()
                },
            },
        )],
    )
}

fn grid_lines(lines: Vec<Vec<(f64, f64)>>, style: &ResolvedLine, name: &str) -> Vec<Grob> {
    lines
        .into_iter()
        .filter(|l| l.len() >= 2)
        .map(|points| {
            Grob::primitive(
                name,
                Primitive::Path {
                    points,
                    stroke: style.stroke(),
                },
            )
        })
        .collect()
}

impl Composition<'_> {
    fn draws_bottom_axis(&self, panel: &PanelInfo) -> bool {
        self.layout.n_scales_x() > 1
            || !self
                .layout
                .panels
                .iter()
                .any(|p| p.col == panel.col && p.row > panel.row)
    }

    fn draws_left_axis(&self, panel: &PanelInfo) -> bool {
        self.layout.n_scales_y() > 1 || panel.col == 0
    }

    fn strip_height(&self) -> f64 {
        self.theme.strip_text.measure("Xg").1 + 2.0 * STRIP_PADDING
    }

    fn strip(&self, name: String, label: &str, vertical: bool, vp: Viewport) -> Grob {
        let mut children = Vec::new();
        if let Some(bg) = &self.theme.strip_background {
            children.push(rect_grob("background", bg));
        }
        let mut style = self.theme.strip_text.clone();
        if vertical {
            style.angle = -90.0;
        }
        children.push(Grob::primitive(
            "text",
            Primitive::Text {
                at: (0.5, 0.5),
                label: label.to_string(),
                style: TextStyle {
                    hjust: 0.5,
                    vjust: 0.5,
                    ..style
                },
            },
        ));
        Grob::viewport(name, vp, children)
    }

    fn panel(&self, panel: &PanelGrobs, vp: Viewport) -> Grob {
        let theme = self.theme;
        let mut children = Vec::new();
        if let Some(bg) = &theme.panel_background {
            children.push(rect_grob("background", bg));
        }
        let mut grid = Vec::new();
        if let Some(minor) = &theme.panel_grid_minor {
            grid.extend(grid_lines(self.coord.grid_lines(&panel.params, true), minor, "minor"));
        }
        if let Some(major) = &theme.panel_grid_major {
            grid.extend(grid_lines(self.coord.grid_lines(&panel.params, false), major, "major"));
        }
        children.push(Grob::group("grid", grid));
        children.extend(panel.layers.iter().cloned());
        if let Some(text) = &theme.axis_text {
            let theta: Vec<Grob> = self
                .coord
                .theta_labels(&panel.params)
                .into_iter()
                .map(|(at, label)| {
                    Grob::primitive(
                        "theta-label",
                        Primitive::Text {
                            at,
                            label,
                            style: text.clone(),
                        },
                    )
                })
                .collect();
            if !theta.is_empty() {
                children.push(Grob::group("theta-labels", theta));
            }
        }
        if let Some(border) = &theme.panel_border {
            children.push(rect_grob(
                "border",
                &ResolvedRect {
                    fill: None,
                    ..*border
                },
            ));
        }
        Grob::viewport(
            format!("panel-{}-{}", panel.info.row + 1, panel.info.col + 1),
            vp,
            children,
        )
    }

    /// Lay out and draw the plot on a `width` × `height` pixel canvas.
    pub fn compose(&self, width: f64, height: f64) -> Grob {
        let theme = self.theme;
        let labels = self.labels;
        let mut nodes = Vec::new();
        if let Some(bg) = &theme.plot_background {
            nodes.push(rect_grob("background", bg));
        }

        let (mut left, mut top) = (MARGIN, MARGIN);
        let (mut right, mut bottom) = (width - MARGIN, height - MARGIN);

        // Title block
        let mut header = Vec::new();
        for (name, text, style) in [
            ("tag", &labels.tag, &theme.plot_tag),
            ("title", &labels.title, &theme.plot_title),
            ("subtitle", &labels.subtitle, &theme.plot_subtitle),
        ] {
            if let Some(text) = text {
                let h = style.measure(text).1;
                header.push((name, text.clone(), style, top, h));
                top += h + TITLE_GAP;
            }
        }
        let caption = labels.caption.as_ref().map(|text| {
            let h = theme.plot_caption.measure(text).1;
            bottom -= h + TITLE_GAP;
            (text.clone(), bottom + TITLE_GAP, h)
        });

        // Legend band
        let position = if self.guides.is_empty() {
            LegendPosition::None
        } else {
            theme.legend_position
        };
        let horizontal = matches!(position, LegendPosition::Top | LegendPosition::Bottom);
        let (lw, lh) = guide::legend_box_size(self.guides, theme, horizontal);
        match position {
            LegendPosition::Right => right -= lw + MARGIN,
            LegendPosition::Left => left += lw + MARGIN,
            LegendPosition::Top => top += lh + MARGIN,
            LegendPosition::Bottom => bottom -= lh + MARGIN,
            LegendPosition::Inside(..) | LegendPosition::None => {}
        }
        let legend_band_bottom = bottom;

        // Axis titles
        let (x_title, y_title) = self.axis_titles;
        let x_title = x_title.as_ref().zip(theme.axis_title.as_ref());
        let y_title = y_title.as_ref().zip(theme.axis_title.as_ref()).map(|(t, s)| {
            let style = TextStyle {
                angle: 90.0,
                ..s.clone()
            };
            (t, style)
        });
        let xlab_h = x_title.map(|(t, s)| s.measure(t).1 + TITLE_GAP).unwrap_or(0.0);
        let ylab_w = y_title.as_ref().map(|(t, s)| s.measure(t).0 + TITLE_GAP).unwrap_or(0.0);
        bottom -= xlab_h;
        left += ylab_w;

        // Panel grid
        let layout = self.layout;
        let (nrow, ncol) = (layout.nrow.max(1), layout.ncol.max(1));
        let mut col_left = vec![0.0f64; ncol];
        let mut row_bottom = vec![0.0f64; nrow];
        let mut row_strip = vec![0.0f64; nrow];
        let mut ticks = Vec::with_capacity(self.panels.len());
        for panel in self.panels {
            let (b, l) = self.coord.axis_ticks(&panel.params);
            let info = &panel.info;
            if self.draws_bottom_axis(info) {
                row_bottom[info.row] = row_bottom[info.row].max(guide::axis_extent(AxisSide::Bottom, &b, theme));
            }
            if self.draws_left_axis(info) {
                col_left[info.col] = col_left[info.col].max(guide::axis_extent(AxisSide::Left, &l, theme));
            }
            if layout.strips == StripKind::Wrap && info.strip_label().is_some() {
                row_strip[info.row] = self.strip_height();
            }
            ticks.push((b, l));
        }
        let grid_strips = layout.strips == StripKind::Grid;
        let top_strip = if grid_strips && !layout.col_vars.is_empty() { self.strip_height() } else { 0.0 };
        let right_strip = if grid_strips && !layout.row_vars.is_empty() { self.strip_height() } else { 0.0 };

        let fixed_w = col_left.iter().sum::<f64>() + right_strip + PANEL_SPACING * (ncol - 1) as f64;
        let fixed_h = row_bottom.iter().sum::<f64>()
            + row_strip.iter().sum::<f64>()
            + top_strip
            + PANEL_SPACING * (nrow - 1) as f64;
        let pw = ((right - left - fixed_w) / ncol as f64).max(1.0);
        let ph = ((bottom - top - fixed_h) / nrow as f64).max(1.0);

        let col_x: Vec<f64> = (0..ncol)
            .scan(left, |x, c| {
                let start = *x + col_left[c];
                *x = start + pw + PANEL_SPACING;
                Some(start)
            })
            .collect();
        let row_y: Vec<f64> = (0..nrow)
            .scan(top + top_strip, |y, r| {
                let start = *y + row_strip[r];
                *y = start + ph + row_bottom[r] + PANEL_SPACING;
                Some(start)
            })
            .collect();
        debug!("panels are {:.1}x{:.1}px in a {}x{} grid", pw, ph, nrow, ncol);

        let mut panel_nodes = Vec::new();
        let mut axis_nodes = Vec::new();
        let mut strip_nodes = Vec::new();
        for (panel, (b, l)) in self.panels.iter().zip(&ticks) {
            let info = &panel.info;
            let (r, c) = (info.row, info.col);
            let vp = Viewport::new(col_x[c], row_y[r], pw, ph);
            panel_nodes.push(self.panel(panel, vp));

            if self.draws_bottom_axis(info) && row_bottom[r] > 0.0 {
                axis_nodes.push(guide::draw_axis(
                    format!("axis-b-{}-{}", r + 1, c + 1),
                    AxisSide::Bottom,
                    b,
                    theme,
                    Viewport::new(vp.x, vp.bottom(), pw, row_bottom[r]),
                ));
            }
            if self.draws_left_axis(info) && col_left[c] > 0.0 {
                axis_nodes.push(guide::draw_axis(
                    format!("axis-l-{}-{}", r + 1, c + 1),
                    AxisSide::Left,
                    l,
                    theme,
                    Viewport::new(vp.x - col_left[c], vp.y, col_left[c], ph),
                ));
            }
            if layout.strips == StripKind::Wrap {
                if let Some(label) = info.strip_label() {
                    strip_nodes.push(self.strip(
                        format!("strip-t-{}-{}", c + 1, r + 1),
                        &label,
                        false,
                        Viewport::new(vp.x, vp.y - row_strip[r], pw, row_strip[r]),
                    ));
                }
            }
        }
        if grid_strips {
            let value_label = |info: &PanelInfo, vars: &[String]| {
                info.key
                    .iter()
                    .filter(|(v, _)| vars.contains(v))
                    .map(|(_, value)| value.label())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            for info in layout.panels.iter() {
                if top_strip > 0.0 && info.row == 0 {
                    strip_nodes.push(self.strip(
                        format!("strip-t-{}-1", info.col + 1),
                        &value_label(info, &layout.col_vars),
                        false,
                        Viewport::new(col_x[info.col], top, pw, top_strip),
                    ));
                }
                if right_strip > 0.0 && info.col + 1 == ncol {
                    strip_nodes.push(self.strip(
                        format!("strip-r-{}-{}", info.row + 1, ncol),
                        &value_label(info, &layout.row_vars),
                        true,
                        Viewport::new(col_x[info.col] + pw, row_y[info.row], right_strip, ph),
                    ));
                }
            }
        }

        let panels_left = col_x.first().copied().unwrap_or(left);
        let panels_right = col_x.last().map(|x| x + pw).unwrap_or(right);
        let panels_top = row_y.first().copied().unwrap_or(top);
        let panels_bottom = row_y.last().map(|y| y + ph).unwrap_or(bottom);
        let axes_bottom = panels_bottom + row_bottom.last().copied().unwrap_or(0.0);

        for (name, text, style, y, h) in header {
            nodes.push(text_node(name, &text, style, Viewport::new(panels_left, y, panels_right - panels_left, h)));
        }
        nodes.extend(panel_nodes);
        nodes.extend(axis_nodes);
        nodes.extend(strip_nodes);

        if let Some((text, style)) = x_title {
            nodes.push(text_node(
                "xlab-b",
                text,
                &TextStyle {
                    hjust: 0.5,
                    ..style.clone()
                },
                Viewport::new(panels_left, axes_bottom, panels_right - panels_left, xlab_h),
            ));
        }
        if let Some((text, style)) = &y_title {
            nodes.push(text_node(
                "ylab-l",
                text,
                &TextStyle {
                    hjust: 0.5,
                    ..style.clone()
                },
                Viewport::new(left - ylab_w, panels_top, ylab_w, panels_bottom - panels_top),
            ));
        }

        let legend_area = match position {
            LegendPosition::Right => Some(Viewport::new(
                width - MARGIN - lw,
                (panels_top + panels_bottom - lh) / 2.0,
                lw,
                lh,
            )),
            LegendPosition::Left => Some(Viewport::new(MARGIN, (panels_top + panels_bottom - lh) / 2.0, lw, lh)),
            LegendPosition::Top => Some(Viewport::new(
                (panels_left + panels_right - lw) / 2.0,
                panels_top - top_strip - row_strip[0] - lh - MARGIN,
                lw,
                lh,
            )),
            LegendPosition::Bottom => Some(Viewport::new(
                (panels_left + panels_right - lw) / 2.0,
                legend_band_bottom + MARGIN,
                lw,
                lh,
            )),
            LegendPosition::Inside(x, y) => Some(Viewport::new(
                panels_left + x * (panels_right - panels_left - lw),
                panels_top + (1.0 - y) * (panels_bottom - panels_top - lh),
                lw,
                lh,
            )),
            LegendPosition::None => None,
        };
        if let Some(area) = legend_area {
            nodes.push(guide::draw_legend_box(self.guides, theme, horizontal, area));
        }

        if let Some((text, y, h)) = caption {
            nodes.push(text_node(
                "caption",
                &text,
                &theme.plot_caption,
                Viewport::new(panels_left, y, panels_right - panels_left, h),
            ));
        }

        Grob::viewport("plot", Viewport::new(0.0, 0.0, width, height), nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aes::Aes;
    use crate::data::Value;
    use crate::parser::ast::{ScaleKind, ScaleSpec, Theme};
    use crate::scale::Scale;

    fn params(coord: &CoordSystem) -> PanelParams {
        let mut x = Scale::new(ScaleSpec::new(Aes::X), ScaleKind::Continuous);
        x.train_continuous(vec![0.0, 10.0]);
        let mut y = Scale::new(ScaleSpec::new(Aes::Y), ScaleKind::Continuous);
        y.train_continuous(vec![0.0, 100.0]);
        coord.panel_params(&x, &y)
    }

    fn wrap_layout() -> PanelLayout {
        let panel = |id: usize, label: &str| PanelInfo {
            panel_id: id,
            row: id / 2,
            col: id % 2,
            key: vec![("g".to_string(), Value::from(label))],
            scale_x: 0,
            scale_y: 0,
        };
        PanelLayout {
            panels: vec![panel(0, "a"), panel(1, "b"), panel(2, "c")],
            nrow: 2,
            ncol: 2,
            strips: StripKind::Wrap,
            row_vars: Vec::new(),
            col_vars: vec!["g".to_string()],
        }
    }

    #[test]
    fn test_named_nodes() {
        let coord = CoordSystem::default();
        let layout = PanelLayout::single();
        let panels = vec![PanelGrobs {
            info: layout.panels[0].clone(),
            params: params(&coord),
            layers: vec![Grob::group("layer-1", Vec::new())],
        }];
        let theme = Theme::default().resolve();
        let labels = Labels::default().title("Fuel economy");
        let (xt, yt) = (Some("displ".to_string()), Some("hwy".to_string()));
        let plot = Composition {
            layout: &layout,
            panels: &panels,
            coord: &coord,
            theme: &theme,
            labels: &labels,
            axis_titles: (&xt, &yt),
            guides: &[],
        }
        .compose(800.0, 600.0);

        for name in ["background", "panel-1-1", "axis-l-1-1", "axis-b-1-1", "xlab-b", "ylab-l", "title"] {
            assert!(plot.find(name).is_some(), "missing node {}", name);
        }
        assert!(plot.find("guide-box").is_none());

        let panel = plot.find("panel-1-1").and_then(|p| p.viewport_rect()).unwrap();
        let axis = plot.find("axis-b-1-1").and_then(|p| p.viewport_rect()).unwrap();
        assert!((axis.y - panel.bottom()).abs() < 1e-9);
        assert!(panel.right() <= 800.0 && panel.bottom() <= 600.0);
    }

    #[test]
    fn test_wrap_axes_and_strips() {
        let coord = CoordSystem::default();
        let layout = wrap_layout();
        let panels: Vec<PanelGrobs> = layout
            .panels
            .iter()
            .map(|info| PanelGrobs {
                info: info.clone(),
                params: params(&coord),
                layers: Vec::new(),
            })
            .collect();
        let theme = Theme::default().resolve();
        let labels = Labels::default();
        let plot = Composition {
            layout: &layout,
            panels: &panels,
            coord: &coord,
            theme: &theme,
            labels: &labels,
            axis_titles: (&None, &None),
            guides: &[],
        }
        .compose(600.0, 600.0);

        assert!(plot.find("strip-t-2-1").is_some());
        assert!(plot.find("strip-t-1-2").is_some());
        // Panel (1, 2) has nothing below it, so it carries a bottom axis
        assert!(plot.find("axis-b-1-2").is_some());
        assert!(plot.find("axis-b-1-1").is_none());
        assert!(plot.find("axis-l-1-2").is_none());
        assert!(plot.find("axis-l-2-1").is_some());
    }
}
