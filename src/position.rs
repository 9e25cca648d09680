//! Position adjustments applied after the geom pre-pass.

use crate::aes::Aes;
use crate::data::{RowTable, Value};
use crate::error::Result;
use crate::stat::resolution;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Position {
    #[default]
    Identity,
    Stack {
        reverse: bool,
    },
    /// Stack normalized to a total height of 1
    Fill {
        reverse: bool,
    },
    Dodge {
        width: Option<f64>,
    },
    Jitter {
        width: Option<f64>,
        height: Option<f64>,
        seed: Option<u64>,
    },
    Nudge {
        x: f64,
        y: f64,
    },
}

impl Position {
    pub fn from_name(name: &str) -> Option<Position> {
        match name {
            "identity" => Some(Position::Identity),
            "stack" => Some(Position::Stack { reverse: false }),
            "fill" => Some(Position::Fill { reverse: false }),
            "dodge" => Some(Position::Dodge { width: None }),
            "jitter" => Some(Position::Jitter {
                width: None,
                height: None,
                seed: None,
            }),
            "nudge" => Some(Position::Nudge { x: 0.0, y: 0.0 }),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Position::Identity => "identity",
            Position::Stack { .. } => "stack",
            Position::Fill { .. } => "fill",
            Position::Dodge { .. } => "dodge",
            Position::Jitter { .. } => "jitter",
            Position::Nudge { .. } => "nudge",
        }
    }

    /// Adjust a whole layer table; reserved ids stay with their rows.
    pub fn compute_layer(&self, table: &RowTable) -> Result<RowTable> {
        let mut out = table.clone();
        match self {
            Position::Identity => {}
            Position::Stack { reverse } => stack(&mut out, *reverse, false),
            Position::Fill { reverse } => stack(&mut out, *reverse, true),
            Position::Dodge { width } => dodge(&mut out, *width),
            Position::Jitter { width, height, seed } => {
                let seed = seed.unwrap_or_else(clock_seed);
                log::debug!("jitter seed {}", seed);
                jitter(&mut out, *width, *height, seed);
            }
            Position::Nudge { x, y } => {
                shift(&mut out, &Aes::X_FAMILY, |_| *x);
                shift(&mut out, &Aes::Y_FAMILY, |_| *y);
            }
        }
        Ok(out)
    }
}

/// Rows sharing a panel and an x position.
fn x_key(table: &RowTable, row: usize) -> Option<(usize, u64)> {
    let x = table.num(row, "x").or_else(|| {
        let lo = table.num(row, "xmin")?;
        let hi = table.num(row, "xmax")?;
        Some((lo + hi) / 2.0)
    })?;
    // -0.0 and 0.0 share a stack
    Some((table.panel_id(row), (x + 0.0).to_bits()))
}

fn stack(table: &mut RowTable, reverse: bool, fill: bool) {
    if !table.has_column("y") && !table.has_column("ymax") {
        return;
    }

    let mut order: Vec<usize> = (0..table.nrow()).collect();
    order.sort_by_key(|&i| {
        let g = table.group_id(i);
        (if reverse { usize::MAX - g } else { g }, i)
    });

    let n = table.nrow();
    let mut ymin = vec![Value::Null; n];
    let mut ymax = vec![Value::Null; n];
    let mut keys = vec![None; n];
    let mut pos_base: HashMap<(usize, u64), f64> = HashMap::new();
    let mut neg_base: HashMap<(usize, u64), f64> = HashMap::new();

    for &i in &order {
        let height = match table.num(i, "y") {
            Some(y) => y,
            None => match (table.num(i, "ymin"), table.num(i, "ymax")) {
                (Some(lo), Some(hi)) => hi - lo,
                _ => continue,
            },
        };
        let Some(key) = x_key(table, i) else { continue };
        keys[i] = Some(key);
        let base = if height >= 0.0 {
            pos_base.entry(key).or_insert(0.0)
        } else {
            neg_base.entry(key).or_insert(0.0)
        };
        let (lo, hi) = if height >= 0.0 {
            (*base, *base + height)
        } else {
            (*base + height, *base)
        };
        *base += height;
        ymin[i] = Value::Num(lo);
        ymax[i] = Value::Num(hi);
    }

    if fill {
        for i in 0..n {
            let Some(key) = keys[i] else { continue };
            let pos_total = pos_base.get(&key).copied().unwrap_or(0.0);
            let neg_total = neg_base.get(&key).copied().unwrap_or(0.0).abs();
            let (Some(lo), Some(hi)) = (ymin[i].as_f64(), ymax[i].as_f64()) else { continue };
            let total = if hi > 0.0 { pos_total } else { neg_total };
            if total > 0.0 {
                ymin[i] = Value::Num(lo / total);
                ymax[i] = Value::Num(hi / total);
            }
        }
    }

    let y: Vec<Value> = ymin
        .iter()
        .zip(&ymax)
        .enumerate()
        .map(|(i, (lo, hi))| match (lo.as_f64(), hi.as_f64()) {
            (Some(lo), Some(hi)) if hi <= 0.0 && lo < 0.0 => Value::Num(lo),
            (Some(_), Some(hi)) => Value::Num(hi),
            _ => table.value(i, "y").cloned().unwrap_or(Value::Null),
        })
        .collect();
    table.set_column("ymin", ymin);
    table.set_column("ymax", ymax);
    table.set_column("y", y);
}

fn dodge(table: &mut RowTable, width: Option<f64>) {
    let n = table.nrow();
    let xs = table.numeric("x").unwrap_or_else(|| vec![None; n]);

    // Distinct groups per (panel, x), in group order.
    let mut groups: HashMap<(usize, u64), Vec<usize>> = HashMap::new();
    for i in 0..n {
        if let Some(key) = x_key(table, i) {
            let entry = groups.entry(key).or_default();
            let g = table.group_id(i);
            if !entry.contains(&g) {
                entry.push(g);
            }
        }
    }
    for g in groups.values_mut() {
        g.sort_unstable();
    }

    let default_width = 0.9 * resolution(&xs.iter().flatten().copied().collect::<Vec<_>>());
    let mut new_x = Vec::with_capacity(n);
    let mut new_xmin = Vec::with_capacity(n);
    let mut new_xmax = Vec::with_capacity(n);
    for i in 0..n {
        let key = x_key(table, i);
        let (Some(key), Some(center)) = (key, key.map(|k| f64::from_bits(k.1))) else {
            new_x.push(table.value(i, "x").cloned().unwrap_or(Value::Null));
            new_xmin.push(table.value(i, "xmin").cloned().unwrap_or(Value::Null));
            new_xmax.push(table.value(i, "xmax").cloned().unwrap_or(Value::Null));
            continue;
        };
        let w = match (table.num(i, "xmin"), table.num(i, "xmax")) {
            (Some(lo), Some(hi)) => width.unwrap_or(hi - lo),
            _ => width.unwrap_or(default_width),
        };
        let members = &groups[&key];
        let slots = members.len().max(1) as f64;
        let slot = members.iter().position(|g| *g == table.group_id(i)).unwrap_or(0) as f64;
        let lo = center - w / 2.0 + slot * w / slots;
        let hi = lo + w / slots;
        new_x.push(Value::Num((lo + hi) / 2.0));
        new_xmin.push(Value::Num(lo));
        new_xmax.push(Value::Num(hi));
    }
    table.set_column("x", new_x);
    table.set_column("xmin", new_xmin);
    table.set_column("xmax", new_xmax);
}

fn jitter(table: &mut RowTable, width: Option<f64>, height: Option<f64>, seed: u64) {
    let width = width.unwrap_or_else(|| 0.4 * resolution(&table.finite("x")));
    let height = height.unwrap_or_else(|| 0.4 * resolution(&table.finite("y")));
    let mut rng = SplitMix64::new(seed);
    let offsets: Vec<(f64, f64)> = (0..table.nrow())
        .map(|_| (rng.uniform(-width, width), rng.uniform(-height, height)))
        .collect();
    shift(table, &Aes::X_FAMILY, |i| offsets[i].0);
    shift(table, &Aes::Y_FAMILY, |i| offsets[i].1);
}

/// Add a per-row offset to every numeric column of an aesthetic family.
fn shift<F>(table: &mut RowTable, family: &[Aes], offset: F)
where
    F: Fn(usize) -> f64,
{
    for aes in family {
        let Some(col) = table.numeric(aes.name()) else { continue };
        let shifted = col
            .into_iter()
            .enumerate()
            .map(|(i, v)| v.map(|v| Value::Num(v + offset(i))).unwrap_or(Value::Null))
            .collect();
        table.set_column(aes.name(), shifted);
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// SplitMix64 generator.
struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    /// Uniform in `[lo, hi)`.
    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        let unit = (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
        lo + (hi - lo) * unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(xs: &[f64], ys: &[f64], groups: Vec<usize>) -> RowTable {
        let mut t = RowTable::from_columns(vec![
            ("x", xs.iter().map(|v| Value::Num(*v)).collect()),
            ("y", ys.iter().map(|v| Value::Num(*v)).collect()),
        ])
        .unwrap();
        t.assign_panels(vec![0; xs.len()]);
        t.assign_groups(groups);
        t
    }

    #[test]
    fn test_stack_two_records() {
        let t = table(&[1.0, 1.0], &[2.0, 3.0], vec![0, 0]);
        let out = Position::Stack { reverse: false }.compute_layer(&t).unwrap();
        assert_eq!(out.finite("ymin"), vec![0.0, 2.0]);
        assert_eq!(out.finite("ymax"), vec![2.0, 5.0]);
        assert_eq!(out.finite("y"), vec![2.0, 5.0]);
    }

    #[test]
    fn test_stack_orders_by_group_and_splits_signs() {
        let t = table(&[1.0, 1.0, 1.0], &[3.0, 2.0, -1.0], vec![1, 0, 0]);
        let out = Position::Stack { reverse: false }.compute_layer(&t).unwrap();
        // group 0 first: 2 at [0,2], then group 1: 3 at [2,5]; the negative goes below 0
        assert_eq!(out.num(0, "ymin"), Some(2.0));
        assert_eq!(out.num(0, "ymax"), Some(5.0));
        assert_eq!(out.num(1, "ymin"), Some(0.0));
        assert_eq!(out.num(2, "ymin"), Some(-1.0));
        assert_eq!(out.num(2, "ymax"), Some(0.0));
    }

    #[test]
    fn test_stack_reverse() {
        let t = table(&[1.0, 1.0], &[2.0, 3.0], vec![0, 1]);
        let out = Position::Stack { reverse: true }.compute_layer(&t).unwrap();
        assert_eq!(out.finite("ymin"), vec![3.0, 0.0]);
    }

    #[test]
    fn test_fill_normalizes() {
        let t = table(&[1.0, 1.0, 2.0], &[1.0, 3.0, 5.0], vec![0, 1, 0]);
        let out = Position::Fill { reverse: false }.compute_layer(&t).unwrap();
        assert_eq!(out.finite("ymax"), vec![0.25, 1.0, 1.0]);
    }

    #[test]
    fn test_dodge_splits_width() {
        let mut t = table(&[1.0, 1.0], &[2.0, 3.0], vec![0, 1]);
        t.set_numeric("xmin", vec![0.5, 0.5]);
        t.set_numeric("xmax", vec![1.5, 1.5]);
        let out = Position::Dodge { width: None }.compute_layer(&t).unwrap();
        assert_eq!(out.finite("xmin"), vec![0.5, 1.0]);
        assert_eq!(out.finite("xmax"), vec![1.0, 1.5]);
        assert_eq!(out.finite("x"), vec![0.75, 1.25]);
    }

    #[test]
    fn test_jitter_is_seeded_and_bounded() {
        let t = table(&[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0], vec![0, 0, 0]);
        let jitter = Position::Jitter {
            width: Some(0.1),
            height: Some(0.0),
            seed: Some(42),
        };
        let a = jitter.compute_layer(&t).unwrap();
        let b = jitter.compute_layer(&t).unwrap();
        assert_eq!(a, b);
        for (i, x) in a.finite("x").iter().enumerate() {
            assert!((x - (i as f64 + 1.0)).abs() <= 0.1);
        }
        assert_eq!(a.finite("y"), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_nudge_and_ids_survive() {
        let t = table(&[1.0], &[1.0], vec![3]);
        let out = Position::Nudge { x: 0.5, y: -1.0 }.compute_layer(&t).unwrap();
        assert_eq!(out.num(0, "x"), Some(1.5));
        assert_eq!(out.num(0, "y"), Some(0.0));
        assert_eq!(out.group_ids(), vec![3]);
    }
}
