//! Aesthetic mapping: evaluating mapping expressions into aesthetic columns
//! (once before and once after statistics) and deriving group ids.

use crate::aes::{Aes, AesExpr, Mapping};
use crate::data::{compare_values, RowTable, Value};
use crate::error::{Diagnostic, Error, Result, Stage};
use crate::scale::ScaleRegistry;
use log::debug;
use std::collections::BTreeMap;

fn eval_error(aes: Aes, expr: &AesExpr, stage: Stage, reason: String) -> Error {
    Error::AestheticEval {
        aesthetic: aes.name().to_string(),
        expression: expr.to_string(),
        stage,
        reason,
    }
}

/// Evaluate every non-`after_stat` mapping against the layer's raw rows.
///
/// The result holds one column per mapped aesthetic and keeps the panel ids
/// assigned by the layout.
pub fn evaluate_pre_stat(table: &RowTable, mapping: &Mapping) -> Result<RowTable> {
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for (aes, expr) in mapping.iter().filter(|(_, e)| !e.is_after_stat()) {
        let evaluated = expr
            .eval(table)
            .map_err(|reason| eval_error(*aes, expr, Stage::PreStat, reason))?;
        columns.push(aes.name().to_string());
        values.push(evaluated);
    }
    let rows = (0..table.nrow())
        .map(|i| values.iter().map(|col| col[i].clone()).collect())
        .collect();
    debug!("pre-stat mapping produced {:?}", columns);
    Ok(RowTable::with_panels(columns, rows, table.panel_ids()))
}

/// Evaluate `after_stat` mappings against the stat output, then place the new
/// columns in their scales' transformed space.
///
/// Values outside a transform's domain become missing with a diagnostic.
pub fn evaluate_post_stat(
    table: &RowTable,
    mapping: &Mapping,
    scales: &mut ScaleRegistry,
    layer: usize,
) -> Result<(RowTable, Vec<Diagnostic>)> {
    let mut out = table.clone();
    let mut mapped = Vec::new();
    for (aes, expr) in mapping.iter().filter(|(_, e)| e.is_after_stat()) {
        let evaluated = expr
            .eval(table)
            .map_err(|reason| eval_error(*aes, expr, Stage::PostStat, reason))?;
        out.set_column(aes.name(), evaluated);
        mapped.push(*aes);
    }
    if mapped.is_empty() {
        return Ok((out, Vec::new()));
    }
    scales.add_missing(&[&out])?;

    let mut diagnostics = Vec::new();
    for aes in mapped.into_iter().filter(|a| a.is_scaled()) {
        let Some(col) = out.column(aes.name()) else { continue };
        let mut transformed = Vec::with_capacity(col.len());
        let mut dropped = 0;
        for (row, v) in col.into_iter().enumerate() {
            let scale = scales.scale_for(aes, out.panel_id(row)).filter(|s| !s.is_discrete());
            transformed.push(match (scale, v.as_f64()) {
                (Some(scale), Some(n)) => match scale.transform_value(n) {
                    Ok(t) => Value::Num(t),
                    Err(_) => {
                        dropped += 1;
                        Value::Null
                    }
                },
                _ => v.clone(),
            });
        }
        if dropped > 0 {
            diagnostics.push(Diagnostic::new(
                Stage::PostStat,
                Some(layer),
                format!("{} value(s) of '{}' outside the scale transform domain", dropped, aes),
            ));
        }
        out.set_column(aes.name(), transformed);
    }
    Ok((out, diagnostics))
}

/// Assign dense group ids.
///
/// An explicit `group` mapping wins. Otherwise rows are grouped by the
/// interaction of every discrete or binned aesthetic except `label`, with ids
/// following the lexicographic order of the level ranks.
pub fn assign_groups(table: &mut RowTable, mapping: &Mapping, scales: &ScaleRegistry) {
    let n = table.nrow();
    if let Some(col) = table.column(Aes::Group.name()) {
        let mut distinct: Vec<&Value> = col.iter().copied().filter(|v| !v.is_null()).collect();
        distinct.sort_by(|a, b| compare_values(a, b));
        distinct.dedup();
        let ids = col
            .iter()
            .map(|v| distinct.iter().position(|d| *d == *v).unwrap_or(distinct.len()))
            .collect();
        table.assign_groups(ids);
        return;
    }

    let grouping: Vec<Aes> = mapping
        .aesthetics()
        .filter(|a| *a != Aes::Label && a.is_scaled() && table.has_column(a.name()))
        .filter(|a| {
            scales
                .scale_for(*a, 0)
                .map(|s| s.is_discrete() || s.is_binned())
                .unwrap_or(false)
        })
        .collect();
    if grouping.is_empty() {
        table.assign_groups(vec![0; n]);
        return;
    }

    let mut keys: Vec<Vec<usize>> = vec![Vec::with_capacity(grouping.len()); n];
    for aes in &grouping {
        let ranks = level_ranks(table, *aes, scales);
        for (key, rank) in keys.iter_mut().zip(ranks) {
            key.push(rank);
        }
    }
    let mut distinct: Vec<&Vec<usize>> = keys.iter().collect();
    distinct.sort();
    distinct.dedup();
    let index: BTreeMap<&Vec<usize>, usize> = distinct.into_iter().enumerate().map(|(i, k)| (k, i)).collect();
    let ids = keys.iter().map(|k| index[k]).collect();
    debug!("grouped by {:?} into {} groups", grouping, index.len());
    table.assign_groups(ids);
}

/// Rank of each row's value in its scale's level order; missing values rank last.
fn level_ranks(table: &RowTable, aes: Aes, scales: &ScaleRegistry) -> Vec<usize> {
    let Some(col) = table.column(aes.name()) else {
        return vec![0; table.nrow()];
    };
    col.into_iter()
        .enumerate()
        .map(|(row, v)| {
            let Some(scale) = scales.scale_for(aes, table.panel_id(row)) else {
                return usize::MAX;
            };
            if scale.is_discrete() {
                return scale.rank(v).unwrap_or(usize::MAX);
            }
            // Values are already in transformed space, as are the frozen edges
            let edges = scale.bin_edges();
            match (v.as_f64(), edges.len()) {
                (Some(x), n) if n >= 2 => edges[1..n - 1].iter().filter(|e| x >= **e).count(),
                _ => usize::MAX,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aes::Func;
    use crate::ir::PanelLayout;
    use crate::parser::ast::ScaleSpec;

    fn raw() -> RowTable {
        RowTable::from_columns(vec![
            ("a", vec![1.0.into(), 2.0.into(), 3.0.into(), 4.0.into()]),
            ("b", vec![10.0.into(), 20.0.into(), 30.0.into(), 40.0.into()]),
            ("g", vec!["q".into(), "p".into(), "q".into(), "p".into()]),
        ])
        .unwrap()
    }

    fn registry(specs: &[ScaleSpec], tables: &[&RowTable]) -> ScaleRegistry {
        let mut scales = ScaleRegistry::new(specs, &PanelLayout::single());
        scales.add_missing(tables).unwrap();
        scales.train_discrete(tables);
        scales
    }

    #[test]
    fn test_pre_stat_evaluates_expressions() {
        let mapping = Mapping::new()
            .with(Aes::X, "a")
            .with_expr(Aes::Y, AesExpr::Call(Func::Log10, Box::new(AesExpr::column("b"))))
            .with_expr(Aes::Fill, AesExpr::after_stat("count"));
        let out = evaluate_pre_stat(&raw(), &mapping).unwrap();
        assert_eq!(out.columns(), &["x".to_string(), "y".to_string()]);
        assert_eq!(out.num(2, "y"), Some(30f64.log10()));
    }

    #[test]
    fn test_pre_stat_missing_column_names_the_aesthetic() {
        let mapping = Mapping::new().with(Aes::Y, "count");
        let err = evaluate_pre_stat(&raw(), &mapping).unwrap_err();
        match err {
            Error::AestheticEval { aesthetic, expression, stage, .. } => {
                assert_eq!(aesthetic, "y");
                assert_eq!(expression, "count");
                assert_eq!(stage, Stage::PreStat);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_post_stat_after_stat_column() {
        let stat_out = RowTable::from_columns(vec![
            ("x", vec![1.0.into(), 2.0.into()]),
            ("count", vec![3.0.into(), 5.0.into()]),
        ])
        .unwrap();
        let mapping = Mapping::new().with_expr(Aes::Y, AesExpr::after_stat("count"));
        let mut scales = registry(&[], &[&stat_out]);
        let (out, diags) = evaluate_post_stat(&stat_out, &mapping, &mut scales, 0).unwrap();
        assert_eq!(out.finite("y"), vec![3.0, 5.0]);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_post_stat_domain_violation_is_a_diagnostic() {
        let stat_out = RowTable::from_columns(vec![("count", vec![0.0.into(), 100.0.into()])]).unwrap();
        let mapping = Mapping::new().with_expr(Aes::Y, AesExpr::after_stat("count"));
        let specs = [ScaleSpec::continuous(Aes::Y).transform(crate::trans::Transform::Log10)];
        let mut scales = ScaleRegistry::new(&specs, &PanelLayout::single());
        let (out, diags) = evaluate_post_stat(&stat_out, &mapping, &mut scales, 0).unwrap();
        assert_eq!(out.value(0, "y"), Some(&Value::Null));
        assert_eq!(out.num(1, "y"), Some(2.0));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].stage, Stage::PostStat);
    }

    #[test]
    fn test_groups_follow_level_order() {
        let mapping = Mapping::new().with(Aes::X, "a").with(Aes::Colour, "g");
        let mut mapped = evaluate_pre_stat(&raw(), &mapping).unwrap();
        let specs = [ScaleSpec::discrete(Aes::Colour).levels(&["p", "q"])];
        let scales = registry(&specs, &[&mapped]);
        assign_groups(&mut mapped, &mapping, &scales);
        assert_eq!(mapped.group_ids(), vec![1, 0, 1, 0]);
    }

    #[test]
    fn test_explicit_group_wins() {
        let mapping = Mapping::new()
            .with(Aes::X, "a")
            .with(Aes::Colour, "g")
            .with(Aes::Group, "b");
        let mut mapped = evaluate_pre_stat(&raw(), &mapping).unwrap();
        let scales = registry(&[], &[&mapped]);
        assign_groups(&mut mapped, &mapping, &scales);
        assert_eq!(mapped.group_ids(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_binned_groups_use_frozen_edges_in_transformed_space() {
        let table = RowTable::from_columns(vec![
            ("a", vec![1.0.into(), 2.0.into(), 3.0.into(), 4.0.into()]),
            ("z", vec![1.0.into(), 10.0.into(), 100.0.into(), 1000.0.into()]),
        ])
        .unwrap();
        let mapping = Mapping::new().with(Aes::X, "a").with(Aes::Colour, "z");
        let specs = [ScaleSpec::binned(Aes::Colour)
            .bins(2)
            .transform(crate::trans::Transform::Log10)];
        let raw = evaluate_pre_stat(&table, &mapping).unwrap();
        let mut scales = registry(&specs, &[&raw]);
        let mut mapped = scales.transform_table(&raw).unwrap();
        scales.train_positions(&[&mapped]);
        scales.train_binned(&[&mapped]);
        scales.freeze_bins();
        assert_eq!(scales.get(Aes::Colour).unwrap().bin_edges().len(), 3);
        assign_groups(&mut mapped, &mapping, &scales);
        assert_eq!(mapped.group_ids(), vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_label_does_not_group() {
        let mapping = Mapping::new().with(Aes::X, "a").with(Aes::Label, "g");
        let mut mapped = evaluate_pre_stat(&raw(), &mapping).unwrap();
        let scales = registry(&[], &[&mapped]);
        assign_groups(&mut mapped, &mapping, &scales);
        assert_eq!(mapped.group_ids(), vec![0; 4]);
    }
}
