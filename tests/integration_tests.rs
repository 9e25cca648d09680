use ggbuild::aes::{Aes, AesExpr, Mapping};
use ggbuild::error::Stage;
use ggbuild::parser::ast::{CoordSystem, Facet, Geom, Layer, LayerData, Position, ScaleKind, ScaleSpec, Stat, SummaryFun};
use ggbuild::scale::Scale;
use ggbuild::trans::Transform;
use ggbuild::{build_plot, parse_plot_spec, PlotSpec, RowTable, Value};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::Write;
use std::process::{Command, Stdio};

/// Helper function to run ggbuild with DSL, extra flags and stdin data
fn run_ggbuild(dsl: &str, flags: &[&str], input: &str) -> Result<Vec<u8>, String> {
    let mut child = Command::new("cargo")
        .args(["run", "--quiet", "--bin", "ggbuild", "--", dsl])
        .args(flags)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to spawn process: {}", e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .map_err(|e| format!("Failed to write to stdin: {}", e))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| format!("Failed to wait for process: {}", e))?;

    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(String::from_utf8_lossy(&output.stderr).to_string())
    }
}

/// Check if bytes are a valid PNG
fn is_valid_png(bytes: &[u8]) -> bool {
    bytes.len() > 8 && bytes[0..8] == [137, 80, 78, 71, 13, 10, 26, 10]
}

fn mpg_csv() -> String {
    fs::read_to_string("test/mpg.csv").expect("Failed to read test CSV")
}

fn mpg() -> RowTable {
    RowTable::from_csv(mpg_csv().as_bytes()).unwrap()
}

fn xy(xs: &[f64], ys: &[f64]) -> RowTable {
    RowTable::from_columns(vec![
        ("x", xs.iter().map(|v| Value::Num(*v)).collect()),
        ("y", ys.iter().map(|v| Value::Num(*v)).collect()),
    ])
    .unwrap()
}

fn xy_mapping() -> Mapping {
    Mapping::new().with(Aes::X, "x").with(Aes::Y, "y")
}

// =============================================================================
// Pipeline properties
// =============================================================================

#[test]
fn test_group_ids_survive_statistics() {
    let spec = PlotSpec::new(Mapping::new().with(Aes::X, "hwy").with(Aes::Fill, "class"))
        .layer(Layer::new(Geom::Histogram).stat(Stat::Bin {
            bins: 5,
            binwidth: None,
            boundary: None,
        }));
    let built = build_plot(&spec, &mpg()).unwrap();
    let data = built.layer_data(0).unwrap();

    let groups: BTreeSet<usize> = data.group_ids().into_iter().collect();
    assert_eq!(groups, (0..5).collect::<BTreeSet<_>>());
    for g in groups {
        let fills: HashSet<String> = (0..data.nrow())
            .filter(|&row| data.group_id(row) == g)
            .filter_map(|row| data.value(row, "fill").map(Value::label))
            .collect();
        assert_eq!(fills.len(), 1, "group {} has fills {:?}", g, fills);
    }
}

#[test]
fn test_panel_ids_survive_positions() {
    let spec = PlotSpec::new(Mapping::new().with(Aes::X, "displ").with(Aes::Y, "hwy"))
        .layer(Layer::new(Geom::Point).position(Position::Jitter {
            width: Some(0.1),
            height: Some(0.0),
            seed: Some(7),
        }))
        .facet(Facet::wrap(&["class"]));
    let built = build_plot(&spec, &mpg()).unwrap();
    let data = built.layer_data(0).unwrap();
    // 2seater, compact, midsize, subcompact, suv
    let mut counts = vec![0; 5];
    for panel in data.panel_ids() {
        counts[panel] += 1;
    }
    assert_eq!(counts, vec![2, 3, 4, 2, 3]);
}

#[test]
fn test_stacking_example() {
    let data = RowTable::from_columns(vec![
        ("x", vec![1.0.into(), 1.0.into()]),
        ("y", vec![2.0.into(), 3.0.into()]),
    ])
    .unwrap();
    let spec = PlotSpec::new(xy_mapping()).layer(Layer::new(Geom::Col));
    let built = build_plot(&spec, &data).unwrap();
    let out = built.layer_data(0).unwrap();
    assert_eq!(out.finite("ymin"), vec![0.0, 2.0]);
    assert_eq!(out.finite("ymax"), vec![2.0, 5.0]);
}

#[test]
fn test_declared_level_order() {
    let data = RowTable::from_columns(vec![
        ("x", vec!["high".into(), "mid".into(), "low".into(), "mid".into()]),
        ("y", vec![1.0.into(), 2.0.into(), 3.0.into(), 4.0.into()]),
    ])
    .unwrap();
    let spec = PlotSpec::new(xy_mapping())
        .layer(Layer::new(Geom::Point))
        .scale(ScaleSpec::discrete(Aes::X).levels(&["low", "mid", "high"]));
    let built = build_plot(&spec, &data).unwrap();
    assert_eq!(built.layer_data(0).unwrap().finite("x"), vec![2.0, 1.0, 0.0, 1.0]);
    let x = built.scales.scale_for(Aes::X, 0).unwrap();
    assert_eq!(x.rank(&Value::from("mid")), Some(1));
}

#[test]
fn test_censor_happens_before_statistics() {
    let spec = PlotSpec::new(xy_mapping())
        .layer(Layer::new(Geom::Point).stat(Stat::Summary { fun: SummaryFun::Mean }))
        .scale(ScaleSpec::continuous(Aes::Y).limits(2.0, 8.0));
    let built = build_plot(&spec, &xy(&[1.0, 1.0, 1.0], &[1.5, 3.0, 5.0])).unwrap();
    assert_eq!(built.layer_data(0).unwrap().finite("y"), vec![4.0]);
    assert!(built.diagnostics.iter().any(|d| d.stage == Stage::Scale));
}

#[test]
fn test_binned_position_groups_by_bin() {
    let spec = PlotSpec::new(xy_mapping())
        .layer(Layer::new(Geom::Point))
        .scale(ScaleSpec::binned(Aes::X).bins(2));
    let built = build_plot(&spec, &xy(&[1.0, 1.1, 1.2, 9.0], &[1.0, 2.0, 3.0, 4.0])).unwrap();
    let data = built.layer_data(0).unwrap();
    assert_eq!(data.finite("x"), vec![3.0, 3.0, 3.0, 7.0]);
    assert_eq!(data.group_ids(), vec![0, 0, 0, 1]);
}

#[test]
fn test_binned_colour_lines_keep_their_rows() {
    let data = RowTable::from_columns(vec![
        ("x", vec![1.0.into(), 2.0.into(), 3.0.into(), 4.0.into()]),
        ("y", vec![1.0.into(), 2.0.into(), 3.0.into(), 4.0.into()]),
        ("z", vec![1.0.into(), 1.1.into(), 1.2.into(), 9.0.into()]),
    ])
    .unwrap();
    let spec = PlotSpec::new(xy_mapping().with(Aes::Colour, "z"))
        .layer(Layer::new(Geom::Line))
        .scale(ScaleSpec::binned(Aes::Colour).bins(2));
    let built = build_plot(&spec, &data).unwrap();
    assert_eq!(built.layer_data(0).unwrap().group_ids(), vec![0, 0, 0, 1]);
}

#[test]
fn test_stacked_bars_are_censored_after_adjustment() {
    let data = xy(&[1.0, 1.0], &[2.0, 3.0]);
    let spec = PlotSpec::new(xy_mapping())
        .layer(Layer::new(Geom::Col))
        .scale(ScaleSpec::continuous(Aes::Y).limits(0.0, 4.0));
    let built = build_plot(&spec, &data).unwrap();
    let out = built.layer_data(0).unwrap();
    let (lo, hi) = built.scales.scale_for(Aes::Y, 0).unwrap().limits().unwrap();
    assert!(out.finite("ymax").iter().all(|y| *y >= lo && *y <= hi));
    assert_eq!(out.nrow(), 1);
    assert!(built.diagnostics.iter().any(|d| d.stage == Stage::Scale));
}

#[test]
fn test_scale_transform_differs_from_coord_transform() {
    let data = xy(&[1.0, 1.0, 1.0], &[1.0, 10.0, 100.0]);
    let layer = Layer::new(Geom::Point).stat(Stat::Summary { fun: SummaryFun::Mean });

    let scale_spec = PlotSpec::new(xy_mapping())
        .layer(layer.clone())
        .scale(ScaleSpec::continuous(Aes::Y).transform(Transform::Log10));
    let mean_of_logs = build_plot(&scale_spec, &data).unwrap().layer_data(0).unwrap().finite("y")[0];
    approx::assert_relative_eq!(mean_of_logs, 1.0, epsilon = 1e-12);

    let coord_spec = PlotSpec::new(xy_mapping()).layer(layer).coord(CoordSystem::Trans {
        x: Transform::Identity,
        y: Transform::Log10,
    });
    let mean = build_plot(&coord_spec, &data).unwrap().layer_data(0).unwrap().finite("y")[0];
    approx::assert_relative_eq!(mean, 37.0, epsilon = 1e-12);
    assert!((mean.log10() - mean_of_logs).abs() > 0.5);
}

proptest! {
    #[test]
    fn prop_stacked_intervals_are_adjacent(ys in prop::collection::vec(0.1f64..100.0, 1..8)) {
        let xs = vec![1.0; ys.len()];
        let spec = PlotSpec::new(xy_mapping()).layer(Layer::new(Geom::Col));
        let built = build_plot(&spec, &xy(&xs, &ys)).unwrap();
        let out = built.layer_data(0).unwrap();
        let mut intervals: Vec<(f64, f64)> = out.finite("ymin").into_iter().zip(out.finite("ymax")).collect();
        prop_assert_eq!(intervals.len(), ys.len());
        intervals.sort_by(|a, b| a.0.total_cmp(&b.0));
        prop_assert!(intervals[0].0.abs() < 1e-9);
        for pair in intervals.windows(2) {
            prop_assert!((pair[0].1 - pair[1].0).abs() < 1e-9);
        }
        let total: f64 = ys.iter().sum();
        prop_assert!((intervals[intervals.len() - 1].1 - total).abs() < 1e-6);
    }

    #[test]
    fn prop_training_is_order_independent(
        tables in prop::collection::vec(prop::collection::vec(-1e3f64..1e3, 1..6), 1..5),
        seed in any::<u64>(),
    ) {
        let layers: Vec<Layer> = tables
            .iter()
            .map(|ys| {
                let xs: Vec<f64> = (0..ys.len()).map(|i| i as f64).collect();
                Layer::new(Geom::Point).data(LayerData::Table(xy(&xs, ys)))
            })
            .collect();
        let mut shuffled = layers.clone();
        let n = shuffled.len();
        shuffled.rotate_left((seed as usize) % n);
        shuffled.reverse();

        let range = |layers: &[Layer]| {
            let spec = layers.iter().cloned().fold(PlotSpec::new(xy_mapping()), |spec, l| spec.layer(l));
            let built = build_plot(&spec, &xy(&[0.0], &[0.0])).unwrap();
            built.scales.scale_for(Aes::Y, 0).unwrap().trained_range()
        };
        prop_assert_eq!(range(&layers), range(&shuffled));
    }

    #[test]
    fn prop_discrete_ranks_are_a_bijection(
        labels in prop::collection::hash_set("[a-z]{1,6}", 1..10),
        repeats in 1usize..4,
    ) {
        let values: Vec<Value> = labels
            .iter()
            .flat_map(|l| std::iter::repeat(Value::from(l.as_str())).take(repeats))
            .collect();
        let mut scale = Scale::new(ScaleSpec::discrete(Aes::Colour), ScaleKind::Discrete);
        scale.train_discrete(&values);
        let ranks: BTreeSet<usize> = labels
            .iter()
            .filter_map(|l| scale.rank(&Value::from(l.as_str())))
            .collect();
        prop_assert_eq!(ranks, (0..labels.len()).collect::<BTreeSet<_>>());
    }
}

// =============================================================================
// DSL to built plot
// =============================================================================

#[test]
fn test_dsl_builds_counts() {
    let spec = parse_plot_spec("df | aes(x: class) | bar() | coord_flip()").unwrap();
    let built = build_plot(&spec, &mpg()).unwrap();
    // first-observed order: compact, 2seater, suv, subcompact, midsize
    assert_eq!(built.layer_data(0).unwrap().finite("ymax"), vec![3.0, 2.0, 3.0, 2.0, 4.0]);
}

#[test]
fn test_dsl_layer_data_and_params() {
    let spec = parse_plot_spec(
        r#"aes(x: displ, y: hwy) | point(colour: "grey") | point(data: filter(class: "suv"), colour: "red", size: 3)"#,
    )
    .unwrap();
    let built = build_plot(&spec, &mpg()).unwrap();
    assert_eq!(built.layer_data(0).unwrap().nrow(), 14);
    let suv = built.layer_data(1).unwrap();
    assert_eq!(suv.nrow(), 3);
    assert_eq!(suv.value(0, "colour"), Some(&Value::from("red")));
    assert!(built.scales.get(Aes::Colour).is_none());
}

#[test]
fn test_dsl_expression_mapping() {
    let spec = parse_plot_spec("aes(x: displ, y: hwy / cty) | point()").unwrap();
    let built = build_plot(&spec, &mpg()).unwrap();
    approx::assert_relative_eq!(built.layer_data(0).unwrap().finite("y")[0], 29.0 / 18.0);
    assert_eq!(spec.mapping.get(Aes::X), Some(&AesExpr::column("displ")));
}

#[test]
fn test_dsl_render_tree_has_facet_strips() {
    let spec = parse_plot_spec(
        r#"aes(x: displ, y: hwy, colour: drv) | point() | facet_wrap(~ year) | labs(title: "Mileage")"#,
    )
    .unwrap();
    let built = build_plot(&spec, &mpg()).unwrap();
    let tree = built.render_tree(800.0, 600.0).unwrap();
    for name in ["panel-1-1", "panel-1-2", "strip-t-1-1", "title", "guide-box"] {
        assert!(tree.find(name).is_some(), "missing {}", name);
    }
}

// =============================================================================
// CLI
// =============================================================================

#[test]
fn test_end_to_end_scatter_plot() {
    let result = run_ggbuild("aes(x: displ, y: hwy, colour: class) | point()", &[], &mpg_csv());
    assert!(result.is_ok(), "Failed: {:?}", result.err());
    assert!(is_valid_png(&result.unwrap()), "Output is not a valid PNG");
}

#[test]
fn test_end_to_end_dodge_bars() {
    let csv = fs::read_to_string("test/sales.csv").expect("Failed to read test CSV");
    let result = run_ggbuild(
        r#"aes(x: month, y: units, fill: product) | col(position: "dodge") | facet_wrap(~ region)"#,
        &[],
        &csv,
    );
    assert!(result.is_ok(), "Failed: {:?}", result.err());
    assert!(is_valid_png(&result.unwrap()));
}

#[test]
fn test_end_to_end_svg_output() {
    let result = run_ggbuild(
        "aes(x: hwy) | histogram(bins: 6) | theme_minimal()",
        &["--format", "svg", "--width", "400", "--height", "300"],
        &mpg_csv(),
    );
    let svg = String::from_utf8(result.expect("render failed")).unwrap();
    assert!(svg.contains("<svg"));
}

#[test]
fn test_end_to_end_json_tree() {
    let result = run_ggbuild(
        "aes(x: class, y: hwy) | boxplot()",
        &["--options", r#"{"type": "json"}"#],
        &mpg_csv(),
    );
    let tree: serde_json::Value = serde_json::from_slice(&result.expect("render failed")).unwrap();
    assert!(tree.is_object());
}

#[test]
fn test_end_to_end_variables() {
    let result = run_ggbuild(
        "aes(x: displ, y: $col) | point() | labs(title: \"${title}\")",
        &["--var", "col=hwy", "--var", "title=Highway"],
        &mpg_csv(),
    );
    assert!(result.is_ok(), "Failed: {:?}", result.err());
}

#[test]
fn test_end_to_end_json_input() {
    let json = r#"[{"x": 1, "y": 2}, {"x": 2, "y": 4}, {"x": 3, "y": 3}]"#;
    let result = run_ggbuild("aes(x: x, y: y) | line() | point()", &["--json"], json);
    assert!(is_valid_png(&result.expect("render failed")));
}

#[test]
fn test_end_to_end_invalid_syntax() {
    let result = run_ggbuild("aes(x: displ, y: hwy) | point(", &[], &mpg_csv());
    let err = result.expect_err("should fail");
    assert!(err.contains("Parse error"), "{}", err);
}

#[test]
fn test_end_to_end_column_not_found() {
    let result = run_ggbuild("aes(x: displ, y: nope) | point()", &[], &mpg_csv());
    assert!(result.is_err());
}

#[test]
fn test_end_to_end_empty_csv() {
    let result = run_ggbuild("aes(x: a, y: b) | point()", &[], "a,b\n");
    assert!(result.is_err());
}

#[test]
fn test_end_to_end_undefined_variable() {
    let result = run_ggbuild("aes(x: $missing) | bar()", &[], &mpg_csv());
    assert!(result.is_err());
}
