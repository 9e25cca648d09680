// Plot build orchestration: the data stages (resolve → layout → map → stat →
// position → final scales) and the table → drawing tree stage.

use crate::aes::{Aes, Mapping};
use crate::compositor::{Composition, PanelGrobs};
use crate::coord::PanelParams;
use crate::data::RowTable;
use crate::error::{Diagnostic, Result, Stage};
use crate::geom::Geom;
use crate::graph::Executor;
use crate::guide::{self, LegendLayer};
use crate::ir::{Grob, PanelLayout};
use crate::layout;
use crate::mapper;
use crate::parser::ast::{PlotSpec, ScaleKind, ScaleSpec};
use crate::resolve;
use crate::scale::{Scale, ScaleRegistry};
use crate::{OutputFormat, RenderOptions};
use log::{debug, info};

/// Final state of one layer after the data stages.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltLayer {
    pub index: usize,
    pub geom: Geom,
    pub mapping: Mapping,
    /// Position columns in panel-ready data units, non-position columns
    /// holding visual values
    pub data: RowTable,
}

/// Result of building a plot: per-layer tables, trained scales and the
/// panel layout. The spec it came from is kept for drawing.
#[derive(Debug, Clone)]
pub struct BuiltPlot {
    pub spec: PlotSpec,
    pub layout: PanelLayout,
    pub scales: ScaleRegistry,
    pub layers: Vec<BuiltLayer>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Layer state threaded through the stages.
struct Working {
    index: usize,
    mapping: Mapping,
    data: RowTable,
}

fn tables(layers: &[Working]) -> Vec<&RowTable> {
    layers.iter().map(|l| &l.data).collect()
}

/// Run the data stages of the pipeline over `spec` with `data` as the
/// default dataset. The spec is never modified.
pub fn build_plot(spec: &PlotSpec, data: &RowTable) -> Result<BuiltPlot> {
    let mut diagnostics = Vec::new();

    let resolved = resolve::resolve_plot(spec, data)?;
    let raw: Vec<&RowTable> = resolved.iter().map(|l| &l.data).collect();
    let layout = layout::compute_layout(&spec.facet, &raw)?;

    let mut layers = Vec::with_capacity(resolved.len());
    for layer in &resolved {
        let paneled = layout::map_panels(&layout, &layer.data);
        layers.push(Working {
            index: layer.index,
            data: mapper::evaluate_pre_stat(&paneled, &layer.mapping)?,
            mapping: layer.mapping.clone(),
        });
    }
    debug!("mapped {} layer(s) before statistics", layers.len());

    let mut scales = ScaleRegistry::new(&spec.scales, &layout);
    scales.add_missing(&tables(&layers))?;
    scales.train_discrete(&tables(&layers));
    for layer in &mut layers {
        layer.data = scales.transform_table(&layer.data)?;
    }

    scales.train_positions(&tables(&layers));
    scales.train_binned(&tables(&layers));
    scales.freeze_bins();
    for layer in &mut layers {
        mapper::assign_groups(&mut layer.data, &layer.mapping, &scales);
        let (mapped, removed) = scales.map_positions(&layer.data);
        if removed > 0 {
            diagnostics.push(Diagnostic::new(
                Stage::Scale,
                Some(layer.index),
                format!("removed {} row(s) outside the scale range", removed),
            ));
        }
        layer.data = mapped;
    }

    for layer in &mut layers {
        let def = &spec.layers[layer.index];
        let (computed, diags) = def.stat.compute_layer(&layer.data, &scales, layer.index)?;
        diagnostics.extend(diags);
        let (mapped, diags) = mapper::evaluate_post_stat(&computed, &layer.mapping, &mut scales, layer.index)?;
        diagnostics.extend(diags);
        let prepared = def.geom.setup_data(&mapped, def.width);
        layer.data = def.position.compute_layer(&prepared)?;
    }

    for layer in &mut layers {
        let (kept, removed) = scales.censor_positions(&layer.data);
        if removed > 0 {
            diagnostics.push(Diagnostic::new(
                Stage::Scale,
                Some(layer.index),
                format!("removed {} row(s) outside the scale range after adjustment", removed),
            ));
        }
        layer.data = kept;
    }
    scales.reset_positions();
    scales.retrain_positions(&tables(&layers));
    scales.train_non_position(&tables(&layers));

    let mut built = Vec::with_capacity(layers.len());
    for layer in layers {
        let def = &spec.layers[layer.index];
        let mut table = scales.map_non_position(&layer.data)?;
        let n = table.nrow();
        for (aes, value) in &def.params {
            table.set_column(aes.name(), vec![value.clone(); n]);
        }
        let (table, removed) = def.geom.remove_missing(&table);
        if removed > 0 {
            diagnostics.push(Diagnostic::new(
                Stage::Geom,
                Some(layer.index),
                format!(
                    "removed {} row(s) missing aesthetics required by geom '{}'",
                    removed,
                    def.geom.name()
                ),
            ));
        }
        built.push(BuiltLayer {
            index: layer.index,
            geom: def.geom,
            mapping: layer.mapping,
            data: table,
        });
    }

    info!(
        "built {} layer(s) over {} panel(s) with {} diagnostic(s)",
        built.len(),
        layout.panels.len(),
        diagnostics.len()
    );
    Ok(BuiltPlot {
        spec: spec.clone(),
        layout,
        scales,
        layers: built,
        diagnostics,
    })
}

impl BuiltPlot {
    /// Final table of a layer.
    pub fn layer_data(&self, index: usize) -> Option<&RowTable> {
        self.layers.get(index).map(|l| &l.data)
    }

    fn position_scale(&self, aes: Aes, panel_id: usize) -> Scale {
        self.scales
            .scale_for(aes, panel_id)
            .cloned()
            .unwrap_or_else(|| Scale::new(ScaleSpec::new(aes), ScaleKind::Continuous))
    }

    /// Coordinate-system parameters of one panel.
    pub fn panel_params(&self, panel_id: usize) -> PanelParams {
        let x = self.position_scale(Aes::X, panel_id);
        let y = self.position_scale(Aes::Y, panel_id);
        self.spec.coord.panel_params(&x, &y)
    }

    /// Draw every panel and assemble guides and layout into the drawing tree.
    pub fn render_tree(&self, width: f64, height: f64) -> Result<Grob> {
        let coord = &self.spec.coord;
        let panels: Vec<PanelGrobs> = self
            .layout
            .panels
            .iter()
            .map(|info| {
                let params = self.panel_params(info.panel_id);
                let layers = self
                    .layers
                    .iter()
                    .map(|layer| {
                        let slice = layer.data.panel_slice(info.panel_id);
                        Grob::group(
                            format!("layer-{}", layer.index + 1),
                            layer.geom.draw_panel(&slice, coord, &params),
                        )
                    })
                    .collect();
                PanelGrobs {
                    info: info.clone(),
                    params,
                    layers,
                }
            })
            .collect();

        let legend_layers: Vec<LegendLayer> = self
            .layers
            .iter()
            .map(|layer| {
                let def = &self.spec.layers[layer.index];
                LegendLayer {
                    geom: layer.geom,
                    mapping: &layer.mapping,
                    params: &def.params,
                    show_legend: def.show_legend,
                }
            })
            .collect();
        let guides = guide::build_legends(&self.scales, &self.spec.labels, &legend_layers)?;

        let mappings: Vec<&Mapping> = self.layers.iter().map(|l| &l.mapping).collect();
        let (x_title, y_title) = guide::axis_titles(&self.spec.labels, &self.scales, &mappings, coord.is_flipped());

        let theme = self.spec.theme.resolve();
        let tree = Composition {
            layout: &self.layout,
            panels: &panels,
            coord,
            theme: &theme,
            labels: &self.spec.labels,
            axis_titles: (&x_title, &y_title),
            guides: &guides,
        }
        .compose(width, height);
        debug!("drawing tree has {} node(s)", tree.names().len());
        Ok(tree)
    }
}

/// Output of a full render.
#[derive(Debug)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Build, draw and encode a plot in the requested output format.
pub fn render_plot(spec: &PlotSpec, data: &RowTable, options: &RenderOptions) -> Result<Rendered> {
    let built = build_plot(spec, data)?;
    let tree = built.render_tree(options.width as f64, options.height as f64)?;
    let executor = Executor::new(options.width, options.height);
    let bytes = match options.format {
        OutputFormat::Png => executor.png(&tree)?,
        OutputFormat::Svg => executor.svg(&tree)?.into_bytes(),
        OutputFormat::Json => serde_json::to_vec_pretty(&tree)?,
    };
    Ok(Rendered {
        bytes,
        diagnostics: built.diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aes::AesExpr;
    use crate::data::Value;
    use crate::parser::ast::{Facet, Labels, Layer, Oob, Position};
    use approx::assert_relative_eq;

    fn mpg() -> RowTable {
        RowTable::from_columns(vec![
            ("displ", vec![1.8.into(), 2.0.into(), 2.8.into(), 3.1.into(), 5.7.into(), 6.2.into()]),
            ("hwy", vec![29.0.into(), 31.0.into(), 26.0.into(), 27.0.into(), 17.0.into(), 26.0.into()]),
            (
                "class",
                vec!["compact".into(), "compact".into(), "midsize".into(), "midsize".into(), "suv".into(), "2seater".into()],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_point_plot_builds_tree() {
        let spec = PlotSpec::new(Mapping::new().with(Aes::X, "displ").with(Aes::Y, "hwy").with(Aes::Colour, "class"))
            .layer(Layer::new(Geom::Point))
            .labels(Labels::default().title("Engine size"));
        let built = build_plot(&spec, &mpg()).unwrap();
        assert!(built.diagnostics.is_empty());
        let data = built.layer_data(0).unwrap();
        assert_eq!(data.nrow(), 6);
        assert_eq!(data.value(0, "colour").and_then(Value::as_str).map(|s| s.starts_with('#')), Some(true));

        let tree = built.render_tree(640.0, 480.0).unwrap();
        for name in ["plot", "panel-1-1", "layer-1", "guide-box", "title", "xlab-b", "ylab-l"] {
            assert!(tree.find(name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn test_spec_is_not_mutated() {
        let spec = PlotSpec::new(Mapping::new().with(Aes::X, "class")).layer(Layer::new(Geom::Bar));
        let before = spec.clone();
        build_plot(&spec, &mpg()).unwrap();
        assert_eq!(spec, before);
    }

    #[test]
    fn test_bar_counts_after_stat() {
        let spec = PlotSpec::new(Mapping::new().with(Aes::X, "class")).layer(Layer::new(Geom::Bar));
        let built = build_plot(&spec, &mpg()).unwrap();
        let data = built.layer_data(0).unwrap();
        assert_eq!(data.finite("ymax"), vec![2.0, 2.0, 1.0, 1.0]);
        let y = built.scales.scale_for(Aes::Y, 0).unwrap();
        assert_eq!(y.trained_range(), Some((0.0, 2.0)));
    }

    #[test]
    fn test_params_override_without_scale() {
        let spec = PlotSpec::new(Mapping::new().with(Aes::X, "displ").with(Aes::Y, "hwy"))
            .layer(Layer::new(Geom::Point).param(Aes::Colour, "red"));
        let built = build_plot(&spec, &mpg()).unwrap();
        assert!(built.scales.get(Aes::Colour).is_none());
        assert_eq!(built.layer_data(0).unwrap().value(3, "colour"), Some(&Value::from("red")));
    }

    #[test]
    fn test_censored_rows_are_reported() {
        let spec = PlotSpec::new(Mapping::new().with(Aes::X, "displ").with(Aes::Y, "hwy"))
            .layer(Layer::new(Geom::Point))
            .scale(ScaleSpec::continuous(Aes::X).limits(2.0, 6.0));
        let built = build_plot(&spec, &mpg()).unwrap();
        assert_eq!(built.layer_data(0).unwrap().nrow(), 4);
        assert_eq!(built.diagnostics.len(), 1);
        assert_eq!(built.diagnostics[0].stage, Stage::Scale);
    }

    #[test]
    fn test_stacked_columns() {
        let data = RowTable::from_columns(vec![
            ("x", vec![1.0.into(), 1.0.into()]),
            ("y", vec![2.0.into(), 3.0.into()]),
            ("g", vec!["a".into(), "b".into()]),
        ])
        .unwrap();
        let spec = PlotSpec::new(Mapping::new().with(Aes::X, "x").with(Aes::Y, "y").with(Aes::Fill, "g"))
            .layer(Layer::new(Geom::Col).position(Position::Stack { reverse: false }));
        let built = build_plot(&spec, &data).unwrap();
        let out = built.layer_data(0).unwrap();
        assert_eq!(out.finite("ymin"), vec![0.0, 2.0]);
        assert_eq!(out.finite("ymax"), vec![2.0, 5.0]);
        assert_relative_eq!(built.scales.scale_for(Aes::Y, 0).unwrap().trained_range().unwrap().1, 5.0);
    }

    #[test]
    fn test_adjusted_positions_respect_limits() {
        let data = RowTable::from_columns(vec![
            ("x", vec![1.0.into(), 1.0.into()]),
            ("y", vec![2.0.into(), 3.0.into()]),
        ])
        .unwrap();
        let spec = PlotSpec::new(Mapping::new().with(Aes::X, "x").with(Aes::Y, "y"))
            .layer(Layer::new(Geom::Col))
            .scale(ScaleSpec::continuous(Aes::Y).limits(0.0, 4.0));
        let built = build_plot(&spec, &data).unwrap();
        let out = built.layer_data(0).unwrap();
        assert_eq!(out.nrow(), 1);
        assert_eq!(out.finite("ymax"), vec![2.0]);
        assert!(built.diagnostics.iter().any(|d| d.stage == Stage::Scale));

        let squished = spec.clone().scale(ScaleSpec::continuous(Aes::Y).limits(0.0, 4.0).oob(Oob::Squish));
        let built = build_plot(&squished, &data).unwrap();
        assert_eq!(built.layer_data(0).unwrap().finite("ymax"), vec![2.0, 4.0]);
    }

    #[test]
    fn test_facets_split_rows() {
        let spec = PlotSpec::new(Mapping::new().with(Aes::X, "displ").with(Aes::Y, "hwy"))
            .layer(Layer::new(Geom::Point))
            .facet(Facet::wrap(&["class"]));
        let built = build_plot(&spec, &mpg()).unwrap();
        assert_eq!(built.layout.panels.len(), 4);
        let tree = built.render_tree(800.0, 600.0).unwrap();
        assert!(tree.find("panel-2-2").is_some());
        assert!(tree.find("strip-t-1-1").is_some());
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let spec = PlotSpec::new(Mapping::new().with(Aes::X, "nope")).layer(Layer::new(Geom::Point));
        assert!(build_plot(&spec, &mpg()).is_err());
    }

    #[test]
    fn test_after_stat_density_maps_to_y() {
        let spec = PlotSpec::new(Mapping::new().with(Aes::X, "displ"))
            .layer(Layer::new(Geom::Histogram).map(Aes::Y, AesExpr::after_stat("density")));
        let built = build_plot(&spec, &mpg()).unwrap();
        let data = built.layer_data(0).unwrap();
        let widths: Vec<f64> = (0..data.nrow())
            .filter_map(|i| Some(data.num(i, "xmax")? - data.num(i, "xmin")?))
            .collect();
        let area: f64 = data.finite("y").iter().zip(&widths).map(|(d, w)| d * w).sum();
        assert_relative_eq!(area, 1.0, epsilon = 1e-9);
    }
}
