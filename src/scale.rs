//! Scale registry: one scale per aesthetic family (one per panel scale index
//! for `x` and `y`), trained over all layers.
//!
//! Position scales are used twice. Before statistics they transform, rank
//! (discrete), bin (binned) and censor raw values; after position adjustment
//! their continuous ranges are reset and retrained on the final geometry.
//! Non-position scales are trained on the final data and then map values to
//! colours, sizes, shapes, linetypes and alphas.

use crate::aes::Aes;
use crate::data::{format_number, RowTable, Value};
use crate::error::{Error, Result};
use crate::ir::{Color, PanelLayout};
use crate::palette::{AlphaPalette, ColorPalette, Gradient, LinetypePalette, ShapePalette, SizePalette};
use crate::parser::ast::{Limits, Oob, ScaleKind, ScaleSpec};
use crate::trans::{extended_breaks, Transform};
use std::collections::BTreeMap;

const DEFAULT_BINS: usize = 10;
const DEFAULT_N_BREAKS: usize = 5;

/// Value used for missing colours.
pub const NA_COLOUR: Color = Color::rgb(127, 127, 127);

#[derive(Debug, Clone, PartialEq)]
pub struct Scale {
    /// Aesthetic family (`x` for `xmin` etc.)
    pub aes: Aes,
    pub kind: ScaleKind,
    pub spec: ScaleSpec,
    /// Trained continuous range, in transformed space
    range: Option<(f64, f64)>,
    /// Discrete levels: declared order, else first observed
    levels: Vec<String>,
    declared_levels: bool,
    /// Bin edges fixed once the pre-stat range is known
    edges: Vec<f64>,
}

impl Scale {
    pub fn new(spec: ScaleSpec, kind: ScaleKind) -> Scale {
        let (levels, declared_levels) = match &spec.limits {
            Some(Limits::Discrete(levels)) => (levels.clone(), true),
            _ => (Vec::new(), false),
        };
        Scale {
            aes: spec.aesthetic.family(),
            kind,
            spec,
            range: None,
            levels,
            declared_levels,
            edges: Vec::new(),
        }
    }

    pub fn is_discrete(&self) -> bool {
        self.kind == ScaleKind::Discrete
    }

    pub fn is_binned(&self) -> bool {
        self.kind == ScaleKind::Binned
    }

    pub fn is_continuous(&self) -> bool {
        self.kind == ScaleKind::Continuous
    }

    pub fn transform(&self) -> Transform {
        if self.is_discrete() {
            Transform::Identity
        } else {
            self.spec.transform
        }
    }

    // -------------------------------------------------------------------------
    // Training
    // -------------------------------------------------------------------------

    /// Append unseen levels in first-observed order. Declared levels are fixed.
    pub fn train_discrete<'a, I>(&mut self, values: I)
    where
        I: IntoIterator<Item = &'a Value>,
    {
        if self.declared_levels {
            return;
        }
        for v in values {
            if v.is_null() {
                continue;
            }
            let label = v.label();
            if !self.levels.contains(&label) {
                self.levels.push(label);
            }
        }
    }

    /// Widen the continuous range to cover the finite values.
    pub fn train_continuous<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = f64>,
    {
        for v in values.into_iter().filter(|v| v.is_finite()) {
            self.range = Some(match self.range {
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
                None => (v, v),
            });
        }
    }

    /// Forget the trained continuous range; discrete levels are kept.
    pub fn reset(&mut self) {
        self.range = None;
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn trained_range(&self) -> Option<(f64, f64)> {
        self.range
    }

    /// 0-based rank of a value among the levels.
    pub fn rank(&self, value: &Value) -> Option<usize> {
        if value.is_null() {
            return None;
        }
        let label = value.label();
        self.levels.iter().position(|l| *l == label)
    }

    // -------------------------------------------------------------------------
    // Transformation and positioning
    // -------------------------------------------------------------------------

    /// Forward-transform one raw value, rejecting values outside the domain.
    pub fn transform_value(&self, v: f64) -> Result<f64> {
        let t = self.transform();
        if !t.in_domain(v) {
            return Err(Error::domain(
                self.aes.name(),
                format!("value {} is outside the domain of the {} transform", format_number(v), t.name()),
            ));
        }
        Ok(t.forward(v))
    }

    /// User limits in transformed space.
    pub fn user_limits(&self) -> Option<(f64, f64)> {
        match self.spec.limits {
            Some(Limits::Continuous(lo, hi)) => {
                let t = self.transform();
                let (a, b) = (t.forward(lo), t.forward(hi));
                Some((a.min(b), a.max(b)))
            }
            _ => None,
        }
    }

    /// Continuous limits in transformed space: user limits, else trained range.
    pub fn limits(&self) -> Option<(f64, f64)> {
        self.user_limits().or(self.range)
    }

    /// Apply the out-of-bounds policy against user limits.
    pub fn oob(&self, v: f64) -> Option<f64> {
        let Some((lo, hi)) = self.user_limits() else {
            return Some(v);
        };
        if v >= lo && v <= hi {
            return Some(v);
        }
        match self.spec.oob {
            Oob::Censor => None,
            Oob::Squish => Some(v.clamp(lo, hi)),
            Oob::Keep => Some(v),
        }
    }

    /// Bin edges in transformed space.
    pub fn bin_edges(&self) -> Vec<f64> {
        if !self.edges.is_empty() {
            return self.edges.clone();
        }
        if let Some(edges) = &self.spec.bin_edges {
            let t = self.transform();
            let mut out: Vec<f64> = edges.iter().filter(|e| t.in_domain(**e)).map(|e| t.forward(*e)).collect();
            out.sort_by(|a, b| a.total_cmp(b));
            out.dedup();
            return out;
        }
        let Some((lo, hi)) = self.limits() else {
            return Vec::new();
        };
        let n = self.spec.bins.unwrap_or(DEFAULT_BINS).max(1);
        if hi <= lo {
            return vec![lo - 0.5, lo + 0.5];
        }
        let width = (hi - lo) / n as f64;
        (0..=n).map(|i| lo + i as f64 * width).collect()
    }

    /// Fix the bin edges from the current range.
    pub fn freeze_bins(&mut self) {
        if self.is_binned() && self.edges.is_empty() {
            self.edges = self.bin_edges();
        }
    }

    /// Midpoint of the bin containing `v`; bins are `[a, b)` except the last,
    /// which is closed on the right.
    pub fn bin_midpoint(&self, v: f64) -> Option<f64> {
        let edges = self.bin_edges();
        let last = edges.len().checked_sub(2)?;
        for (i, pair) in edges.windows(2).enumerate() {
            let (a, b) = (pair[0], pair[1]);
            if (v >= a && v < b) || (i == last && v == b) {
                return Some((a + b) / 2.0);
            }
        }
        None
    }

    /// Map one pre-stat position value: rank, bin midpoint or censored value.
    pub fn map_position(&self, value: &Value) -> Option<f64> {
        match self.kind {
            ScaleKind::Discrete => self.rank(value).map(|r| r as f64),
            ScaleKind::Continuous => self.oob(value.as_f64()?),
            ScaleKind::Binned => self.bin_midpoint(self.oob(value.as_f64()?)?),
        }
    }

    // -------------------------------------------------------------------------
    // Panel range and breaks
    // -------------------------------------------------------------------------

    /// (multiplicative, additive) expansion of the panel range.
    pub fn expansion(&self, expand: bool) -> (f64, f64) {
        match (expand, self.spec.expand) {
            (false, _) => (0.0, 0.0),
            (true, Some(e)) => e,
            (true, None) if self.is_discrete() => (0.0, 0.6),
            (true, None) => (0.05, 0.0),
        }
    }

    /// Range the panel spans in transformed space, including expansion.
    pub fn expanded_range(&self, expand: bool) -> (f64, f64) {
        let (mult, add) = self.expansion(expand);

        if self.is_discrete() {
            let n = self.levels.len();
            let mut lo = -add;
            let mut hi = n.saturating_sub(1) as f64 + add;
            if let Some((clo, chi)) = self.range {
                if n == 0 {
                    let pad = (chi - clo) * mult;
                    return degenerate(clo - pad, chi + pad);
                }
                lo = lo.min(clo);
                hi = hi.max(chi);
            }
            return degenerate(lo, hi);
        }

        expand_range(self.limits().unwrap_or((0.0, 1.0)), (mult, add))
    }

    /// Break positions in transformed space.
    pub fn breaks(&self) -> Vec<f64> {
        match self.kind {
            ScaleKind::Discrete => (0..self.levels.len()).map(|i| i as f64).collect(),
            ScaleKind::Binned => self.bin_edges(),
            ScaleKind::Continuous => {
                let Some((lo, hi)) = self.limits() else {
                    return Vec::new();
                };
                let t = self.transform();
                match &self.spec.breaks {
                    Some(breaks) => breaks
                        .iter()
                        .filter(|b| t.in_domain(**b))
                        .map(|b| t.forward(*b))
                        .filter(|b| *b >= lo - 1e-9 && *b <= hi + 1e-9)
                        .collect(),
                    None => t.breaks((lo, hi), self.spec.n_breaks.unwrap_or(DEFAULT_N_BREAKS)),
                }
            }
        }
    }

    /// Labels for the given breaks.
    pub fn break_labels(&self, breaks: &[f64]) -> Vec<String> {
        if let Some(labels) = &self.spec.labels {
            if labels.len() == breaks.len() {
                return labels.clone();
            }
        }
        match self.kind {
            ScaleKind::Discrete => breaks
                .iter()
                .map(|b| self.levels.get(*b as usize).cloned().unwrap_or_default())
                .collect(),
            _ => {
                let t = self.transform();
                breaks.iter().map(|b| format_number(round_label(t.inverse(*b)))).collect()
            }
        }
    }

    // -------------------------------------------------------------------------
    // Non-position mapping
    // -------------------------------------------------------------------------

    /// Rescale a transformed value to `[0, 1]` over the limits, applying the
    /// out-of-bounds policy. `None` is a censored value.
    fn rescale(&self, v: f64) -> Option<f64> {
        let v = self.oob(v)?;
        let (lo, hi) = self.limits()?;
        if hi - lo <= f64::EPSILON {
            return Some(0.5);
        }
        Some(((v - lo) / (hi - lo)).clamp(0.0, 1.0))
    }

    /// Map one value of a non-position aesthetic to its visual value.
    pub fn map_value(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(self.na_value());
        }
        match self.kind {
            ScaleKind::Discrete => {
                let Some(rank) = self.rank(value) else {
                    return Ok(self.na_value());
                };
                Ok(self.map_discrete(rank))
            }
            ScaleKind::Continuous | ScaleKind::Binned => {
                let Some(mut v) = value.as_f64() else {
                    return Err(Error::domain(
                        self.aes.name(),
                        format!("discrete value '{}' supplied to a continuous scale", value.label()),
                    ));
                };
                if self.is_binned() {
                    match self.bin_midpoint(v) {
                        Some(mid) => v = mid,
                        None => return Ok(self.na_value()),
                    }
                }
                match self.rescale(v) {
                    Some(t) => self.map_continuous(t),
                    None => Ok(self.na_value()),
                }
            }
        }
    }

    fn na_value(&self) -> Value {
        match self.aes {
            Aes::Colour | Aes::Fill => Value::Str(NA_COLOUR.to_hex()),
            _ => Value::Null,
        }
    }

    fn map_discrete(&self, rank: usize) -> Value {
        let n = self.levels.len();
        match self.aes {
            Aes::Colour | Aes::Fill => {
                let palette = match &self.spec.values {
                    Some(values) => ColorPalette::manual(values),
                    None => ColorPalette::hue(n),
                };
                Value::Str(palette.get_color(rank).to_hex())
            }
            Aes::Size => {
                let (lo, hi) = self.spec.range.unwrap_or((2.0, 6.0));
                Value::Num(SizePalette::new(lo, hi).discrete(rank, n))
            }
            Aes::Alpha => {
                let (lo, hi) = self.spec.range.unwrap_or((0.1, 1.0));
                Value::Num(AlphaPalette::new(lo, hi).discrete(rank, n))
            }
            Aes::Shape => Value::Str(
                self.manual_value(rank)
                    .unwrap_or_else(|| ShapePalette::get_shape(rank).name().to_string()),
            ),
            Aes::Linetype => Value::Str(
                self.manual_value(rank)
                    .unwrap_or_else(|| LinetypePalette::get_linetype(rank).name().to_string()),
            ),
            _ => Value::Num(rank as f64),
        }
    }

    fn manual_value(&self, rank: usize) -> Option<String> {
        let values = self.spec.values.as_ref().filter(|v| !v.is_empty())?;
        Some(values[rank % values.len()].clone())
    }

    fn map_continuous(&self, t: f64) -> Result<Value> {
        match self.aes {
            Aes::Colour | Aes::Fill => {
                let gradient = self
                    .spec
                    .gradient
                    .as_ref()
                    .and_then(|(low, high)| Gradient::from_names(low, high))
                    .unwrap_or_default();
                Ok(Value::Str(gradient.at(t).to_hex()))
            }
            Aes::Size => {
                let palette = self
                    .spec
                    .range
                    .map(|(lo, hi)| SizePalette::new(lo, hi))
                    .unwrap_or_else(SizePalette::default_range);
                Ok(Value::Num(palette.continuous(t)))
            }
            Aes::Alpha => {
                let palette = self
                    .spec
                    .range
                    .map(|(lo, hi)| AlphaPalette::new(lo, hi))
                    .unwrap_or_else(AlphaPalette::default_range);
                Ok(Value::Num(palette.continuous(t)))
            }
            Aes::Shape | Aes::Linetype => Err(Error::domain(
                self.aes.name(),
                format!("a continuous variable cannot be mapped to {}", self.aes),
            )),
            _ => Ok(Value::Num(t)),
        }
    }

    /// Legend entries as (value in scale space, label).
    pub fn legend_entries(&self) -> Vec<(Value, String)> {
        match self.kind {
            ScaleKind::Discrete => {
                let breaks: Vec<f64> = (0..self.levels.len()).map(|i| i as f64).collect();
                let labels = self.break_labels(&breaks);
                self.levels
                    .iter()
                    .zip(labels)
                    .map(|(level, label)| (Value::Str(level.clone()), label))
                    .collect()
            }
            ScaleKind::Binned => {
                let edges = self.bin_edges();
                let t = self.transform();
                edges
                    .windows(2)
                    .map(|w| {
                        let label = format!(
                            "{} to {}",
                            format_number(round_label(t.inverse(w[0]))),
                            format_number(round_label(t.inverse(w[1])))
                        );
                        (Value::Num((w[0] + w[1]) / 2.0), label)
                    })
                    .collect()
            }
            ScaleKind::Continuous => {
                let breaks = self.breaks();
                let labels = self.break_labels(&breaks);
                breaks.into_iter().map(Value::Num).zip(labels).collect()
            }
        }
    }
}

/// Widen a continuous range by a (multiplicative, additive) expansion.
pub fn expand_range((lo, hi): (f64, f64), (mult, add): (f64, f64)) -> (f64, f64) {
    let pad = (hi - lo) * mult;
    degenerate(lo - pad - add, hi + pad + add)
}

fn degenerate(lo: f64, hi: f64) -> (f64, f64) {
    if hi - lo <= f64::EPSILON * lo.abs().max(1.0) {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    }
}

/// Strip floating-point noise from inverted break values.
fn round_label(v: f64) -> f64 {
    if v == 0.0 || !v.is_finite() {
        return v;
    }
    let magnitude = v.abs().log10().floor();
    let scale = 10f64.powf(9.0 - magnitude);
    (v * scale).round() / scale
}

// =============================================================================
// Registry
// =============================================================================

/// All scales of one plot build.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleRegistry {
    specs: Vec<ScaleSpec>,
    /// Per panel scale index
    pub x: Vec<Scale>,
    pub y: Vec<Scale>,
    others: BTreeMap<Aes, Scale>,
    /// panel_id → (x scale index, y scale index)
    panel_scales: Vec<(usize, usize)>,
}

impl ScaleRegistry {
    pub fn new(specs: &[ScaleSpec], layout: &PanelLayout) -> ScaleRegistry {
        let n_panels = layout.panels.iter().map(|p| p.panel_id + 1).max().unwrap_or(1);
        let mut panel_scales = vec![(0, 0); n_panels];
        for p in &layout.panels {
            panel_scales[p.panel_id] = (p.scale_x, p.scale_y);
        }
        ScaleRegistry {
            specs: specs.to_vec(),
            x: Vec::new(),
            y: Vec::new(),
            others: BTreeMap::new(),
            panel_scales,
        }
    }

    fn spec_for(&self, family: Aes) -> ScaleSpec {
        self.specs
            .iter()
            .find(|s| s.aesthetic.family() == family)
            .cloned()
            .unwrap_or_else(|| ScaleSpec::new(family))
    }

    /// Create scales for every scaled aesthetic family present in the tables
    /// that does not have one yet, inferring the kind from the values.
    pub fn add_missing(&mut self, tables: &[&RowTable]) -> Result<()> {
        for family in families_present(tables) {
            let exists = match family {
                Aes::X => !self.x.is_empty(),
                Aes::Y => !self.y.is_empty(),
                other => self.others.contains_key(&other),
            };
            if exists {
                continue;
            }
            let spec = self.spec_for(family);
            let has_text = tables.iter().any(|t| family_values(t, family).any(|v| v.as_str().is_some()));
            let kind = match spec.kind {
                Some(ScaleKind::Continuous) | Some(ScaleKind::Binned) if has_text => {
                    return Err(Error::domain(
                        family.name(),
                        "discrete value supplied to a continuous scale",
                    ))
                }
                Some(kind) => kind,
                None if has_text || matches!(spec.limits, Some(Limits::Discrete(_))) => ScaleKind::Discrete,
                None => ScaleKind::Continuous,
            };
            log::debug!("scale for '{}' is {:?}", family, kind);
            let scale = Scale::new(spec, kind);
            match family {
                Aes::X => self.x = vec![scale; self.n_x()],
                Aes::Y => self.y = vec![scale; self.n_y()],
                other => {
                    self.others.insert(other, scale);
                }
            }
        }
        Ok(())
    }

    fn n_x(&self) -> usize {
        self.panel_scales.iter().map(|(x, _)| x + 1).max().unwrap_or(1)
    }

    fn n_y(&self) -> usize {
        self.panel_scales.iter().map(|(_, y)| y + 1).max().unwrap_or(1)
    }

    /// Scale an aesthetic uses in the given panel.
    pub fn scale_for(&self, aes: Aes, panel_id: usize) -> Option<&Scale> {
        let (sx, sy) = self.panel_scales.get(panel_id).copied().unwrap_or((0, 0));
        match aes.family() {
            Aes::X => self.x.get(sx),
            Aes::Y => self.y.get(sy),
            other => self.others.get(&other),
        }
    }

    fn scale_for_mut(&mut self, aes: Aes, panel_id: usize) -> Option<&mut Scale> {
        let (sx, sy) = self.panel_scales.get(panel_id).copied().unwrap_or((0, 0));
        match aes.family() {
            Aes::X => self.x.get_mut(sx),
            Aes::Y => self.y.get_mut(sy),
            other => self.others.get_mut(&other),
        }
    }

    /// Non-position scale of an aesthetic family.
    pub fn get(&self, aes: Aes) -> Option<&Scale> {
        self.others.get(&aes.family())
    }

    pub fn non_position(&self) -> impl Iterator<Item = &Scale> {
        self.others.values()
    }

    /// Aesthetic columns of a table that some scale covers.
    fn scaled_columns(table: &RowTable) -> Vec<Aes> {
        table
            .columns()
            .iter()
            .filter_map(|c| Aes::from_name(c))
            .filter(|a| a.is_scaled() && table.has_column(a.name()))
            .collect()
    }

    /// Train discrete levels (first-observed across the tables, in order).
    pub fn train_discrete(&mut self, tables: &[&RowTable]) {
        for table in tables {
            for aes in Self::scaled_columns(table) {
                let Some(col) = table.column(aes.name()) else { continue };
                for (row, value) in col.into_iter().enumerate() {
                    if let Some(scale) = self.scale_for_mut(aes, table.panel_id(row)) {
                        if scale.is_discrete() {
                            scale.train_discrete(std::iter::once(value));
                        }
                    }
                }
            }
        }
    }

    /// Forward-transform continuous and binned columns.
    pub fn transform_table(&self, table: &RowTable) -> Result<RowTable> {
        let mut out = table.clone();
        for aes in Self::scaled_columns(table) {
            let Some(scale) = self.scale_for(aes, 0) else { continue };
            if scale.is_discrete() || scale.transform().is_identity() {
                continue;
            }
            let Some(col) = table.column(aes.name()) else { continue };
            let mut values = Vec::with_capacity(col.len());
            for v in col {
                values.push(match v.as_f64() {
                    Some(n) => Value::Num(scale.transform_value(n)?),
                    None => v.clone(),
                });
            }
            out.set_column(aes.name(), values);
        }
        Ok(out)
    }

    /// Train continuous position ranges on numeric position values.
    pub fn train_positions(&mut self, tables: &[&RowTable]) {
        for table in tables {
            for aes in Self::scaled_columns(table).into_iter().filter(|a| a.is_position()) {
                let Some(col) = table.numeric(aes.name()) else { continue };
                for (row, v) in col.into_iter().enumerate() {
                    let Some(v) = v else { continue };
                    if let Some(scale) = self.scale_for_mut(aes, table.panel_id(row)) {
                        if !scale.is_discrete() {
                            scale.train_continuous(std::iter::once(v));
                        }
                    }
                }
            }
        }
    }

    /// Train the continuous range of every position scale (discrete ones
    /// included) on final geometry.
    pub fn retrain_positions(&mut self, tables: &[&RowTable]) {
        for table in tables {
            for aes in Self::scaled_columns(table).into_iter().filter(|a| a.is_position()) {
                let Some(col) = table.numeric(aes.name()) else { continue };
                for (row, v) in col.into_iter().enumerate() {
                    let Some(v) = v else { continue };
                    if let Some(scale) = self.scale_for_mut(aes, table.panel_id(row)) {
                        scale.train_continuous(std::iter::once(v));
                    }
                }
            }
        }
    }

    /// Train binned non-position scales on pre-stat values so their edges
    /// exist before grouping.
    pub fn train_binned(&mut self, tables: &[&RowTable]) {
        for table in tables {
            for aes in Self::scaled_columns(table).into_iter().filter(|a| !a.is_position()) {
                let Some(scale) = self.others.get_mut(&aes.family()).filter(|s| s.is_binned()) else {
                    continue;
                };
                let Some(col) = table.column(aes.name()) else { continue };
                scale.train_continuous(col.into_iter().filter_map(Value::as_f64));
            }
        }
    }

    pub fn freeze_bins(&mut self) {
        for scale in self.x.iter_mut().chain(self.y.iter_mut()).chain(self.others.values_mut()) {
            scale.freeze_bins();
        }
    }

    /// Map position columns before statistics. Returns the table with rows
    /// whose position became missing removed, and the number removed.
    pub fn map_positions(&self, table: &RowTable) -> (RowTable, usize) {
        let mut out = table.clone();
        let positions: Vec<Aes> = Self::scaled_columns(table).into_iter().filter(|a| a.is_position()).collect();
        for aes in &positions {
            let Some(col) = table.column(aes.name()) else { continue };
            let mapped = col
                .into_iter()
                .enumerate()
                .map(|(row, v)| {
                    self.scale_for(*aes, table.panel_id(row))
                        .and_then(|s| s.map_position(v))
                        .map(Value::Num)
                        .unwrap_or(Value::Null)
                })
                .collect();
            out.set_column(aes.name(), mapped);
        }
        let idx: Vec<usize> = positions.iter().filter_map(|a| out.column_index(a.name())).collect();
        let removed = out.retain(|_, row| idx.iter().all(|i| !row[*i].is_null()));
        (out, removed)
    }

    /// Apply the out-of-bounds policy to adjusted position columns. Rows with
    /// a censored value are dropped; returns the table and the number dropped.
    pub fn censor_positions(&self, table: &RowTable) -> (RowTable, usize) {
        let mut out = table.clone();
        let mut censored = vec![false; table.nrow()];
        for aes in Self::scaled_columns(table).into_iter().filter(|a| a.is_position()) {
            let Some(col) = table.column(aes.name()) else { continue };
            let mapped = col
                .into_iter()
                .enumerate()
                .map(|(row, v)| {
                    let scale = self.scale_for(aes, table.panel_id(row)).filter(|s| !s.is_discrete());
                    match (scale, v.as_f64()) {
                        (Some(scale), Some(n)) => match scale.oob(n) {
                            Some(kept) => Value::Num(kept),
                            None => {
                                censored[row] = true;
                                Value::Null
                            }
                        },
                        _ => v.clone(),
                    }
                })
                .collect();
            out.set_column(aes.name(), mapped);
        }
        let removed = out.retain(|row, _| !censored[row]);
        (out, removed)
    }

    /// Reset continuous position ranges before retraining.
    pub fn reset_positions(&mut self) {
        for scale in self.x.iter_mut().chain(self.y.iter_mut()) {
            scale.reset();
        }
    }

    /// Train non-position scales on final data.
    pub fn train_non_position(&mut self, tables: &[&RowTable]) {
        for table in tables {
            for aes in Self::scaled_columns(table).into_iter().filter(|a| !a.is_position()) {
                let Some(scale) = self.others.get_mut(&aes.family()) else { continue };
                let Some(col) = table.column(aes.name()) else { continue };
                if scale.is_discrete() {
                    scale.train_discrete(col);
                } else {
                    scale.train_continuous(col.into_iter().filter_map(Value::as_f64));
                }
            }
        }
        for scale in self.others.values_mut() {
            scale.freeze_bins();
        }
    }

    /// Replace non-position aesthetic columns by their mapped visual values.
    pub fn map_non_position(&self, table: &RowTable) -> Result<RowTable> {
        let mut out = table.clone();
        for aes in Self::scaled_columns(table).into_iter().filter(|a| !a.is_position()) {
            let Some(scale) = self.others.get(&aes.family()) else { continue };
            let Some(col) = table.column(aes.name()) else { continue };
            let mapped = col.into_iter().map(|v| scale.map_value(v)).collect::<Result<Vec<_>>>()?;
            out.set_column(aes.name(), mapped);
        }
        Ok(out)
    }
}

fn families_present(tables: &[&RowTable]) -> Vec<Aes> {
    let mut families = Vec::new();
    for table in tables {
        for col in table.columns() {
            if let Some(aes) = Aes::from_name(col).filter(|a| a.is_scaled()) {
                if !families.contains(&aes.family()) {
                    families.push(aes.family());
                }
            }
        }
    }
    families
}

fn family_values<'a>(table: &'a RowTable, family: Aes) -> impl Iterator<Item = &'a Value> + 'a {
    table
        .columns()
        .iter()
        .enumerate()
        .filter(move |(_, c)| Aes::from_name(c).map(|a| a.family() == family).unwrap_or(false))
        .flat_map(move |(i, _)| table.rows().iter().map(move |r| &r[i]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn values(xs: &[f64]) -> Vec<Value> {
        xs.iter().map(|x| Value::Num(*x)).collect()
    }

    #[test]
    fn test_declared_order_rank() {
        let scale = Scale::new(ScaleSpec::discrete(Aes::X).levels(&["low", "mid", "high"]), ScaleKind::Discrete);
        assert_eq!(scale.map_position(&Value::from("mid")), Some(1.0));
        assert_eq!(scale.map_position(&Value::from("other")), None);
    }

    #[test]
    fn test_first_observed_levels() {
        let mut scale = Scale::new(ScaleSpec::new(Aes::Colour), ScaleKind::Discrete);
        scale.train_discrete(&[Value::from("b"), Value::from("a"), Value::Null, Value::from("b")]);
        scale.train_discrete(&[Value::from("c")]);
        assert_eq!(scale.levels(), &["b", "a", "c"]);
    }

    #[test]
    fn test_censor_squish_keep() {
        let censor = Scale::new(ScaleSpec::continuous(Aes::X).limits(2.0, 8.0), ScaleKind::Continuous);
        assert_eq!(censor.map_position(&Value::Num(1.5)), None);
        assert_eq!(censor.map_position(&Value::Num(8.0)), Some(8.0));

        let squish = Scale::new(
            ScaleSpec::continuous(Aes::X).limits(2.0, 8.0).oob(Oob::Squish),
            ScaleKind::Continuous,
        );
        assert_eq!(squish.map_position(&Value::Num(1.5)), Some(2.0));

        let keep = Scale::new(ScaleSpec::continuous(Aes::X).limits(2.0, 8.0).oob(Oob::Keep), ScaleKind::Continuous);
        assert_eq!(keep.map_position(&Value::Num(1.5)), Some(1.5));
    }

    #[test]
    fn test_transform_domain_error() {
        let scale = Scale::new(ScaleSpec::continuous(Aes::Y).transform(Transform::Log10), ScaleKind::Continuous);
        assert_relative_eq!(scale.transform_value(100.0).unwrap(), 2.0);
        assert!(matches!(scale.transform_value(-1.0), Err(Error::ScaleDomain { .. })));
    }

    #[test]
    fn test_binned_midpoints_last_bin_closed() {
        let mut scale = Scale::new(ScaleSpec::binned(Aes::X).bins(4), ScaleKind::Binned);
        scale.train_continuous(vec![0.0, 8.0]);
        assert_eq!(scale.bin_edges(), vec![0.0, 2.0, 4.0, 6.0, 8.0]);
        assert_eq!(scale.bin_midpoint(0.0), Some(1.0));
        assert_eq!(scale.bin_midpoint(2.0), Some(3.0));
        assert_eq!(scale.bin_midpoint(8.0), Some(7.0));
        assert_eq!(scale.bin_midpoint(8.5), None);
    }

    #[test]
    fn test_explicit_bin_edges() {
        let scale = Scale::new(ScaleSpec::binned(Aes::X).bin_edges(vec![0.0, 1.0, 10.0]), ScaleKind::Binned);
        assert_eq!(scale.bin_midpoint(5.0), Some(5.5));
    }

    #[test]
    fn test_expanded_range() {
        let mut scale = Scale::new(ScaleSpec::new(Aes::X), ScaleKind::Continuous);
        scale.train_continuous(vec![0.0, 10.0]);
        assert_eq!(scale.expanded_range(true), (-0.5, 10.5));
        assert_eq!(scale.expanded_range(false), (0.0, 10.0));

        let mut discrete = Scale::new(ScaleSpec::new(Aes::X), ScaleKind::Discrete);
        discrete.train_discrete(&[Value::from("a"), Value::from("b")]);
        assert_eq!(discrete.expanded_range(true), (-0.6, 1.6));
    }

    #[test]
    fn test_log_breaks_and_labels() {
        let mut scale = Scale::new(ScaleSpec::continuous(Aes::Y).transform(Transform::Log10), ScaleKind::Continuous);
        scale.train_continuous(vec![0.0, 3.0]);
        let breaks = scale.breaks();
        assert_eq!(scale.break_labels(&breaks), vec!["1", "10", "100", "1000"]);
    }

    #[test]
    fn test_map_colour_discrete_and_continuous() {
        let mut discrete = Scale::new(ScaleSpec::new(Aes::Colour).values(&["red", "blue"]), ScaleKind::Discrete);
        discrete.train_discrete(&[Value::from("a"), Value::from("b")]);
        assert_eq!(discrete.map_value(&Value::from("b")).unwrap(), Value::from("#0000FF"));

        let mut continuous = Scale::new(ScaleSpec::new(Aes::Fill), ScaleKind::Continuous);
        continuous.train_continuous(vec![0.0, 1.0]);
        assert_eq!(continuous.map_value(&Value::Num(0.0)).unwrap(), Value::from("#132B43"));
        assert_eq!(continuous.map_value(&Value::Num(1.0)).unwrap(), Value::from("#56B1F7"));
    }

    #[test]
    fn test_continuous_shape_is_an_error() {
        let mut scale = Scale::new(ScaleSpec::new(Aes::Shape), ScaleKind::Continuous);
        scale.train_continuous(vec![0.0, 1.0]);
        assert!(scale.map_value(&Value::Num(0.5)).is_err());
    }

    #[test]
    fn test_registry_infers_kinds_and_maps_positions() {
        let table = RowTable::from_columns(vec![
            ("x", vec!["b".into(), "a".into(), "b".into()]),
            ("y", values(&[1.0, 2.0, 3.0])),
        ])
        .unwrap();
        let layout = PanelLayout::single();
        let mut registry = ScaleRegistry::new(&[], &layout);
        registry.add_missing(&[&table]).unwrap();
        registry.train_discrete(&[&table]);
        assert!(registry.scale_for(Aes::X, 0).unwrap().is_discrete());
        assert!(registry.scale_for(Aes::Y, 0).unwrap().is_continuous());

        let (mapped, removed) = registry.map_positions(&table);
        assert_eq!(removed, 0);
        assert_eq!(mapped.numeric("x").unwrap(), vec![Some(0.0), Some(1.0), Some(0.0)]);
    }

    #[test]
    fn test_declared_continuous_rejects_text() {
        let table = RowTable::from_columns(vec![("x", vec!["a".into()])]).unwrap();
        let mut registry = ScaleRegistry::new(&[ScaleSpec::continuous(Aes::X)], &PanelLayout::single());
        assert!(matches!(registry.add_missing(&[&table]), Err(Error::ScaleDomain { .. })));
    }
}
