//! Panel layout: facet keys → panels, grid placement and per-panel scale
//! indices, and attaching `panel_id` to each layer's rows.

use crate::data::{compare_values, RowTable, Value};
use crate::error::{Error, Result};
use crate::ir::{PanelInfo, PanelLayout, StripKind};
use crate::parser::ast::{Facet, FacetScales};
use log::debug;
use std::cmp::Ordering;

type Key = Vec<Value>;

fn compare_keys(a: &Key, b: &Key) -> Ordering {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| compare_values(x, y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Distinct values of `vars` over every table that has all of them, sorted.
fn distinct_keys(vars: &[String], tables: &[&RowTable]) -> Result<Vec<Key>> {
    if vars.is_empty() {
        return Ok(vec![Vec::new()]);
    }
    let mut keys: Vec<Key> = Vec::new();
    let mut found = false;
    for table in tables {
        let idx: Option<Vec<usize>> = vars.iter().map(|v| table.column_index(v)).collect();
        let Some(idx) = idx else { continue };
        found = true;
        for row in table.rows() {
            let key: Key = idx.iter().map(|i| row[*i].clone()).collect();
            if !keys.iter().any(|k| compare_keys(k, &key) == Ordering::Equal) {
                keys.push(key);
            }
        }
    }
    if !found {
        return Err(Error::DataShape(format!(
            "no layer contains all faceting variables ({})",
            vars.join(", ")
        )));
    }
    if keys.is_empty() {
        // Facet columns without rows still produce one (empty) panel
        return Ok(vec![Vec::new()]);
    }
    keys.sort_by(compare_keys);
    Ok(keys)
}

fn labelled(vars: &[String], key: &Key) -> Vec<(String, Value)> {
    vars.iter().cloned().zip(key.iter().cloned()).collect()
}

/// Build the panel layout from the facet spec and every layer's resolved data.
pub fn compute_layout(facet: &Facet, tables: &[&RowTable]) -> Result<PanelLayout> {
    let layout = match facet {
        Facet::None => PanelLayout::single(),
        Facet::Wrap { vars, ncol, nrow, scales } => wrap_layout(vars, *ncol, *nrow, *scales, tables)?,
        Facet::Grid { rows, cols, scales } => grid_layout(rows, cols, *scales, tables)?,
    };
    debug!(
        "layout: {} panel(s) in a {}x{} grid",
        layout.panels.len(),
        layout.nrow,
        layout.ncol
    );
    Ok(layout)
}

fn wrap_layout(
    vars: &[String],
    ncol: Option<usize>,
    nrow: Option<usize>,
    scales: FacetScales,
    tables: &[&RowTable],
) -> Result<PanelLayout> {
    let keys = distinct_keys(vars, tables)?;
    let n = keys.len().max(1);
    let (nrow, ncol) = match (nrow, ncol) {
        (_, Some(c)) => (n.div_ceil(c.max(1)), c.max(1)),
        (Some(r), None) => (r.max(1), n.div_ceil(r.max(1))),
        (None, None) => {
            let c = (n as f64).sqrt().ceil() as usize;
            (n.div_ceil(c), c)
        }
    };
    let panels = keys
        .iter()
        .enumerate()
        .map(|(i, key)| PanelInfo {
            panel_id: i,
            row: i / ncol,
            col: i % ncol,
            key: labelled(vars, key),
            scale_x: if scales.free_x() { i } else { 0 },
            scale_y: if scales.free_y() { i } else { 0 },
        })
        .collect();
    Ok(PanelLayout {
        panels,
        nrow,
        ncol,
        strips: StripKind::Wrap,
        row_vars: Vec::new(),
        col_vars: vars.to_vec(),
    })
}

fn grid_layout(rows: &[String], cols: &[String], scales: FacetScales, tables: &[&RowTable]) -> Result<PanelLayout> {
    let row_keys = distinct_keys(rows, tables)?;
    let col_keys = distinct_keys(cols, tables)?;
    let ncol = col_keys.len();
    let mut panels = Vec::with_capacity(row_keys.len() * ncol);
    for (r, row_key) in row_keys.iter().enumerate() {
        for (c, col_key) in col_keys.iter().enumerate() {
            let mut key = labelled(rows, row_key);
            key.extend(labelled(cols, col_key));
            panels.push(PanelInfo {
                panel_id: r * ncol + c,
                row: r,
                col: c,
                key,
                scale_x: if scales.free_x() { c } else { 0 },
                scale_y: if scales.free_y() { r } else { 0 },
            });
        }
    }
    Ok(PanelLayout {
        panels,
        nrow: row_keys.len(),
        ncol,
        strips: StripKind::Grid,
        row_vars: rows.to_vec(),
        col_vars: cols.to_vec(),
    })
}

/// Attach panel ids to a layer's rows.
///
/// Facet variables the table lacks match every panel, so a layer without the
/// facet columns is repeated in each panel.
pub fn map_panels(layout: &PanelLayout, table: &RowTable) -> RowTable {
    if layout.panels.len() == 1 && layout.panels[0].key.is_empty() {
        return RowTable::with_panels(table.columns().to_vec(), table.rows().to_vec(), vec![0; table.nrow()]);
    }
    let matchers: Vec<Vec<(usize, &Value)>> = layout
        .panels
        .iter()
        .map(|p| {
            p.key
                .iter()
                .filter_map(|(var, value)| table.column_index(var).map(|i| (i, value)))
                .collect()
        })
        .collect();

    let mut rows = Vec::new();
    let mut panel_ids = Vec::new();
    for row in table.rows() {
        for (panel, matcher) in layout.panels.iter().zip(&matchers) {
            if matcher.iter().all(|(i, v)| compare_values(&row[*i], v) == Ordering::Equal) {
                rows.push(row.clone());
                panel_ids.push(panel.panel_id);
            }
        }
    }
    RowTable::with_panels(table.columns().to_vec(), rows, panel_ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> RowTable {
        RowTable::from_columns(vec![
            ("x", vec![1.0.into(), 2.0.into(), 3.0.into(), 4.0.into(), 5.0.into()]),
            ("cyl", vec![8.0.into(), 4.0.into(), 6.0.into(), 4.0.into(), 10.0.into()]),
            ("drv", vec!["f".into(), "f".into(), "r".into(), "4".into(), "r".into()]),
        ])
        .unwrap()
    }

    #[test]
    fn test_single_panel() {
        let t = data();
        let layout = compute_layout(&Facet::None, &[&t]).unwrap();
        assert_eq!(layout.panels.len(), 1);
        assert_eq!(map_panels(&layout, &t).panel_ids(), vec![0; 5]);
    }

    #[test]
    fn test_wrap_sorts_numerically() {
        let t = data();
        let layout = compute_layout(&Facet::wrap(&["cyl"]), &[&t]).unwrap();
        let labels: Vec<String> = layout.panels.iter().filter_map(|p| p.strip_label()).collect();
        assert_eq!(labels, vec!["4", "6", "8", "10"]);
        assert_eq!((layout.nrow, layout.ncol), (2, 2));
        assert_eq!(map_panels(&layout, &t).panel_ids(), vec![2, 0, 1, 0, 3]);
    }

    #[test]
    fn test_wrap_explicit_ncol() {
        let t = data();
        let facet = Facet::Wrap {
            vars: vec!["cyl".to_string()],
            ncol: Some(3),
            nrow: None,
            scales: FacetScales::FreeY,
        };
        let layout = compute_layout(&facet, &[&t]).unwrap();
        assert_eq!((layout.nrow, layout.ncol), (2, 3));
        assert_eq!(layout.panels[3].row, 1);
        assert_eq!(layout.panels[3].scale_y, 3);
        assert_eq!(layout.panels[3].scale_x, 0);
    }

    #[test]
    fn test_grid_is_full_cross_product() {
        let t = data();
        let layout = compute_layout(&Facet::grid(&["drv"], &["cyl"]), &[&t]).unwrap();
        assert_eq!(layout.nrow, 3);
        assert_eq!(layout.ncol, 4);
        assert_eq!(layout.panels.len(), 12);
        // drv "4" sorts first as a string, cyl 4 first as a number
        let mapped = map_panels(&layout, &t);
        assert_eq!(mapped.panel_id(3), 0);
    }

    #[test]
    fn test_layer_without_facet_column_repeats() {
        let t = data();
        let annotation = RowTable::from_columns(vec![("x", vec![0.0.into()])]).unwrap();
        let layout = compute_layout(&Facet::wrap(&["drv"]), &[&t, &annotation]).unwrap();
        let mapped = map_panels(&layout, &annotation);
        assert_eq!(mapped.nrow(), 3);
        assert_eq!(mapped.panel_ids(), vec![0, 1, 2]);
    }

    #[test]
    fn test_missing_facet_variable() {
        let t = data();
        let err = compute_layout(&Facet::wrap(&["nope"]), &[&t]).unwrap_err();
        assert!(matches!(err, Error::DataShape(_)));
    }
}
