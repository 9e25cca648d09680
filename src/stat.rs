//! Statistical transforms.
//!
//! A stat runs once per layer: `setup_params` sees the whole layer table and
//! the trained scales, then `compute_group` runs on every
//! (`panel_id`, `group_id`) partition and the outputs are reassembled in
//! ascending partition order. A failing partition contributes zero rows and a
//! [`Diagnostic`]; a failing setup aborts the build.

use crate::aes::{Aes, AesExpr};
use crate::data::{compare_values, Partition, RowTable, Value};
use crate::error::{Diagnostic, Error, Result, Stage};
use crate::scale::ScaleRegistry;

const DEFAULT_BINS: usize = 30;
const DENSITY_POINTS: usize = 512;
const SMOOTH_POINTS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmoothMethod {
    /// Ordinary least squares line
    #[default]
    Lm,
}

impl SmoothMethod {
    pub fn from_name(name: &str) -> Option<SmoothMethod> {
        match name {
            "lm" | "auto" => Some(SmoothMethod::Lm),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryFun {
    #[default]
    Mean,
    Median,
    Min,
    Max,
}

impl SummaryFun {
    pub fn from_name(name: &str) -> Option<SummaryFun> {
        match name {
            "mean" | "mean_se" => Some(SummaryFun::Mean),
            "median" => Some(SummaryFun::Median),
            "min" => Some(SummaryFun::Min),
            "max" => Some(SummaryFun::Max),
            _ => None,
        }
    }
}

/// How violin widths compare across groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViolinScale {
    /// Equal area
    #[default]
    Area,
    /// Area proportional to the number of observations
    Count,
    /// Equal maximum width
    Width,
}

impl ViolinScale {
    pub fn from_name(name: &str) -> Option<ViolinScale> {
        match name {
            "area" => Some(ViolinScale::Area),
            "count" => Some(ViolinScale::Count),
            "width" => Some(ViolinScale::Width),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Stat {
    #[default]
    Identity,
    Count,
    Bin {
        bins: usize,
        binwidth: Option<f64>,
        boundary: Option<f64>,
    },
    Smooth {
        method: SmoothMethod,
        se: bool,
        level: f64,
        n: usize,
    },
    Boxplot {
        coef: f64,
    },
    Density {
        adjust: f64,
        n: usize,
    },
    Ydensity {
        adjust: f64,
        n: usize,
        scale: ViolinScale,
        trim: bool,
    },
    Summary {
        fun: SummaryFun,
    },
}

/// Whole-layer parameters computed before the per-partition pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatParams {
    /// Bin edges per panel, in transformed x units
    pub edges: Vec<Vec<f64>>,
    /// Evaluation range per panel
    pub range: Vec<Option<(f64, f64)>>,
    /// Box / violin width
    pub width: f64,
}

impl Stat {
    pub fn bin() -> Stat {
        Stat::Bin {
            bins: DEFAULT_BINS,
            binwidth: None,
            boundary: None,
        }
    }

    pub fn smooth() -> Stat {
        Stat::Smooth {
            method: SmoothMethod::Lm,
            se: true,
            level: 0.95,
            n: SMOOTH_POINTS,
        }
    }

    pub fn boxplot() -> Stat {
        Stat::Boxplot { coef: 1.5 }
    }

    pub fn density() -> Stat {
        Stat::Density {
            adjust: 1.0,
            n: DENSITY_POINTS,
        }
    }

    pub fn ydensity() -> Stat {
        Stat::Ydensity {
            adjust: 1.0,
            n: DENSITY_POINTS,
            scale: ViolinScale::Area,
            trim: true,
        }
    }

    pub fn from_name(name: &str) -> Option<Stat> {
        match name {
            "identity" => Some(Stat::Identity),
            "count" => Some(Stat::Count),
            "bin" => Some(Stat::bin()),
            "smooth" => Some(Stat::smooth()),
            "boxplot" => Some(Stat::boxplot()),
            "density" => Some(Stat::density()),
            "ydensity" => Some(Stat::ydensity()),
            "summary" => Some(Stat::Summary { fun: SummaryFun::Mean }),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stat::Identity => "identity",
            Stat::Count => "count",
            Stat::Bin { .. } => "bin",
            Stat::Smooth { .. } => "smooth",
            Stat::Boxplot { .. } => "boxplot",
            Stat::Density { .. } => "density",
            Stat::Ydensity { .. } => "ydensity",
            Stat::Summary { .. } => "summary",
        }
    }

    pub fn required_aes(&self) -> &'static [Aes] {
        match self {
            Stat::Identity => &[],
            Stat::Count | Stat::Bin { .. } | Stat::Density { .. } => &[Aes::X],
            Stat::Boxplot { .. } | Stat::Ydensity { .. } => &[Aes::Y],
            Stat::Smooth { .. } | Stat::Summary { .. } => &[Aes::X, Aes::Y],
        }
    }

    /// Aesthetics the stat maps from its own output unless the user maps them.
    pub fn default_aes(&self) -> Vec<(Aes, AesExpr)> {
        match self {
            Stat::Count | Stat::Bin { .. } => vec![(Aes::Y, AesExpr::after_stat("count"))],
            Stat::Density { .. } => vec![(Aes::Y, AesExpr::after_stat("density"))],
            _ => Vec::new(),
        }
    }

    /// Whole-layer pre-pass.
    pub fn setup_params(&self, table: &RowTable, scales: &ScaleRegistry) -> Result<StatParams> {
        let n_panels = table.panel_ids().into_iter().max().map(|p| p + 1).unwrap_or(1);
        let mut params = StatParams::default();

        match self {
            Stat::Bin {
                bins,
                binwidth,
                boundary,
            } => {
                for panel in 0..n_panels {
                    let scale = scales.scale_for(Aes::X, panel);
                    if scale.map(|s| s.is_discrete()).unwrap_or(false) {
                        return Err(Error::stat(
                            self.name(),
                            "requires a continuous x aesthetic; use stat 'count' for discrete x",
                        ));
                    }
                    let range = scale
                        .and_then(|s| s.limits())
                        .or_else(|| finite_range(&table.panel_slice(panel).finite(Aes::X.name())));
                    let edges = match range {
                        Some(range) => bin_edges(range, *bins, *binwidth, *boundary)?,
                        None => Vec::new(),
                    };
                    params.edges.push(edges);
                }
            }
            Stat::Density { .. } => {
                for panel in 0..n_panels {
                    let range = scales
                        .scale_for(Aes::X, panel)
                        .and_then(|s| s.limits())
                        .or_else(|| finite_range(&table.panel_slice(panel).finite(Aes::X.name())));
                    params.range.push(range);
                }
            }
            Stat::Boxplot { .. } => {
                params.width = 0.9 * resolution(&table.finite(Aes::X.name()));
            }
            Stat::Ydensity { .. } => {
                params = Stat::boxplot().setup_params(table, scales)?;
            }
            _ => {}
        }
        Ok(params)
    }

    /// Whole-layer data pre-pass: boxplots and violins without x sit at 0.
    pub fn setup_data(&self, table: &RowTable) -> RowTable {
        let mut out = table.clone();
        if matches!(self, Stat::Boxplot { .. } | Stat::Ydensity { .. }) && !out.has_column(Aes::X.name()) {
            out.set_numeric(Aes::X.name(), vec![0.0; out.nrow()]);
        }
        out
    }

    /// Run the stat over a whole layer table.
    pub fn compute_layer(
        &self,
        table: &RowTable,
        scales: &ScaleRegistry,
        layer: usize,
    ) -> Result<(RowTable, Vec<Diagnostic>)> {
        if *self == Stat::Identity {
            return Ok((table.clone(), Vec::new()));
        }
        let table = self.setup_data(table);
        for aes in self.required_aes() {
            if !table.has_column(aes.name()) {
                return Err(Error::stat(self.name(), format!("requires the '{}' aesthetic", aes)));
            }
        }
        let params = self.setup_params(&table, scales)?;

        let mut diagnostics = Vec::new();
        let mut outputs = Vec::new();
        for part in table.partitions() {
            match self.compute_group(&part, &params) {
                Ok(result) => outputs.push(Partition {
                    table: carry_constant_columns(&part.table, result),
                    ..part
                }),
                Err(e) => diagnostics.push(Diagnostic::new(
                    Stage::Stat,
                    Some(layer),
                    format!(
                        "stat '{}' dropped panel {} group {}: {}",
                        self.name(),
                        part.panel_id,
                        part.group_id,
                        e
                    ),
                )),
            }
        }

        let mut out = RowTable::from_partitions(outputs);
        if let Stat::Ydensity { scale, .. } = self {
            violin_widths(&mut out, *scale);
        }
        log::debug!("stat '{}' produced {} rows", self.name(), out.nrow());
        Ok((out, diagnostics))
    }

    /// Compute one (`panel_id`, `group_id`) partition.
    pub fn compute_group(&self, part: &Partition, params: &StatParams) -> Result<RowTable> {
        let data = &part.table;
        match self {
            Stat::Identity => Ok(data.clone()),
            Stat::Count => compute_count(data),
            Stat::Bin { .. } => {
                let edges = params.edges.get(part.panel_id).cloned().unwrap_or_default();
                compute_bin(data, &edges)
            }
            Stat::Smooth { se, level, n, .. } => compute_smooth(data, *se, *level, *n),
            Stat::Boxplot { coef } => compute_boxplot(data, *coef, params.width),
            Stat::Density { adjust, n } => {
                let range = params.range.get(part.panel_id).copied().flatten();
                compute_density(data, *adjust, *n, range)
            }
            Stat::Ydensity { adjust, n, trim, .. } => compute_ydensity(data, *adjust, *n, *trim, params.width),
            Stat::Summary { fun } => compute_summary(data, *fun),
        }
    }
}

/// Copy input columns that hold one value across the partition into the
/// output, unless the stat produced them.
fn carry_constant_columns(input: &RowTable, mut output: RowTable) -> RowTable {
    if input.is_empty() {
        return output;
    }
    for name in input.columns() {
        if output.has_column(name) {
            continue;
        }
        let Some(col) = input.column(name) else { continue };
        let first = col[0];
        if col.iter().all(|v| compare_values(v, first).is_eq() && v.is_null() == first.is_null()) {
            let value = first.clone();
            output.set_column(name, vec![value; output.nrow()]);
        }
    }
    output
}

fn finite_range(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some((lo, hi))
}

/// Smallest gap between distinct values, or 1 with fewer than two values.
pub(crate) fn resolution(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted.dedup();
    sorted
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|d| *d > 1e-12)
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.min(d))))
        .unwrap_or(1.0)
}

fn weights(data: &RowTable) -> Vec<f64> {
    match data.numeric(Aes::Weight.name()) {
        Some(w) => w.into_iter().map(|v| v.unwrap_or(1.0)).collect(),
        None => vec![1.0; data.nrow()],
    }
}

fn numeric(data: &RowTable, aes: Aes) -> Vec<f64> {
    data.finite(aes.name())
}

// -----------------------------------------------------------------------------
// count / bin
// -----------------------------------------------------------------------------

fn compute_count(data: &RowTable) -> Result<RowTable> {
    let xs = data
        .numeric(Aes::X.name())
        .ok_or_else(|| Error::stat("count", "missing x"))?;
    let w = weights(data);

    let mut counts: Vec<(f64, f64)> = Vec::new();
    for (x, w) in xs.into_iter().zip(w) {
        let Some(x) = x else { continue };
        match counts.iter_mut().find(|(v, _)| *v == x) {
            Some(entry) => entry.1 += w,
            None => counts.push((x, w)),
        }
    }
    counts.sort_by(|a, b| a.0.total_cmp(&b.0));
    let total: f64 = counts.iter().map(|(_, c)| c).sum();

    RowTable::from_columns(vec![
        ("x", counts.iter().map(|(x, _)| Value::Num(*x)).collect()),
        ("count", counts.iter().map(|(_, c)| Value::Num(*c)).collect()),
        ("prop", counts.iter().map(|(_, c)| Value::Num(c / total)).collect()),
    ])
}

const MAX_BINS: usize = 1_000_000;

/// Bin edges covering `range`. With a bin count the outer bins are centred on
/// the range ends; with a bin width the edges align to `boundary`.
pub(crate) fn bin_edges(
    range: (f64, f64),
    bins: usize,
    binwidth: Option<f64>,
    boundary: Option<f64>,
) -> Result<Vec<f64>> {
    let (lo, hi) = range;
    if let Some(w) = binwidth {
        if w <= 0.0 || !w.is_finite() {
            return Err(Error::stat("bin", "binwidth must be positive"));
        }
    }
    if bins == 0 {
        return Err(Error::stat("bin", "bins must be at least 1"));
    }
    if hi - lo <= f64::EPSILON {
        let w = binwidth.unwrap_or(0.1);
        return Ok(vec![lo - w / 2.0, lo + w / 2.0]);
    }

    let (width, boundary) = match binwidth {
        Some(w) => (w, boundary.unwrap_or(w / 2.0)),
        None if bins == 1 => (hi - lo, boundary.unwrap_or(lo)),
        None => {
            let w = (hi - lo) / (bins - 1) as f64;
            (w, boundary.unwrap_or(w / 2.0))
        }
    };

    let shift = ((lo - boundary) / width).floor();
    let origin = boundary + shift * width;
    let max_x = hi + (1.0 - 1e-8) * width;
    if (max_x - origin) / width > MAX_BINS as f64 {
        return Err(Error::stat(
            "bin",
            format!("binwidth {} gives more than {} bins", width, MAX_BINS),
        ));
    }
    let mut edges = Vec::new();
    let mut i = 0;
    loop {
        let e = origin + i as f64 * width;
        if e > max_x {
            break;
        }
        edges.push(e);
        i += 1;
    }
    if edges.len() < 2 {
        edges.push(origin + width);
    }
    Ok(edges)
}

/// Index of the bin holding `x`; bins are closed on the right, the first one
/// on both sides.
fn bin_index(edges: &[f64], x: f64) -> Option<usize> {
    let fuzz = 1e-8 * (edges[edges.len() - 1] - edges[0]).abs().max(1.0) / edges.len() as f64;
    if x < edges[0] - fuzz || x > edges[edges.len() - 1] + fuzz {
        return None;
    }
    edges
        .windows(2)
        .position(|w| x <= w[1] + fuzz)
        .or(Some(edges.len() - 2))
}

fn compute_bin(data: &RowTable, edges: &[f64]) -> Result<RowTable> {
    if edges.len() < 2 {
        return Err(Error::stat("bin", "no finite x values to bin"));
    }
    let xs = data
        .numeric(Aes::X.name())
        .ok_or_else(|| Error::stat("bin", "missing x"))?;
    let w = weights(data);

    let n_bins = edges.len() - 1;
    let mut counts = vec![0.0; n_bins];
    for (x, w) in xs.into_iter().zip(w) {
        if let Some(i) = x.and_then(|x| bin_index(edges, x)) {
            counts[i] += w;
        }
    }

    let total: f64 = counts.iter().sum();
    let widths: Vec<f64> = edges.windows(2).map(|e| e[1] - e[0]).collect();
    let density: Vec<f64> = counts
        .iter()
        .zip(&widths)
        .map(|(c, w)| if total > 0.0 { c / (w * total) } else { 0.0 })
        .collect();
    let max_count = counts.iter().copied().fold(0.0, f64::max);
    let max_density = density.iter().copied().fold(0.0, f64::max);
    let norm = |v: f64, max: f64| if max > 0.0 { v / max } else { 0.0 };

    let nums = |v: Vec<f64>| v.into_iter().map(Value::Num).collect::<Vec<_>>();
    RowTable::from_columns(vec![
        ("x", nums(edges.windows(2).map(|e| (e[0] + e[1]) / 2.0).collect())),
        ("count", nums(counts.clone())),
        ("density", nums(density.clone())),
        ("ncount", nums(counts.iter().map(|c| norm(*c, max_count)).collect())),
        ("ndensity", nums(density.iter().map(|d| norm(*d, max_density)).collect())),
        ("width", nums(widths)),
        ("xmin", nums(edges[..n_bins].to_vec())),
        ("xmax", nums(edges[1..].to_vec())),
    ])
}

// -----------------------------------------------------------------------------
// smooth
// -----------------------------------------------------------------------------

fn compute_smooth(data: &RowTable, se: bool, level: f64, n: usize) -> Result<RowTable> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = data
        .numeric(Aes::X.name())
        .unwrap_or_default()
        .into_iter()
        .zip(data.numeric(Aes::Y.name()).unwrap_or_default())
        .filter_map(|(x, y)| Some((x?, y?)))
        .unzip();

    let count = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / count;
    let mean_y = ys.iter().sum::<f64>() / count;
    let sxx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    if xs.len() < 2 || sxx <= 0.0 {
        return Err(Error::stat("smooth", "needs at least two distinct x values"));
    }
    let sxy: f64 = xs.iter().zip(&ys).map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let df = xs.len() as f64 - 2.0;
    let sigma = if df > 0.0 {
        let ssr: f64 = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
            .sum();
        Some((ssr / df).sqrt())
    } else {
        None
    };
    let t = if df > 0.0 {
        student_t_quantile((1.0 + level) / 2.0, df)
    } else {
        0.0
    };

    let (lo, hi) = finite_range(&xs).unwrap_or((0.0, 0.0));
    let n = n.max(2);
    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let x = lo + (hi - lo) * i as f64 / (n - 1) as f64;
        let y = intercept + slope * x;
        let mut row = vec![Value::Num(x), Value::Num(y)];
        if se {
            match sigma {
                Some(s) => {
                    let se_fit = s * (1.0 / count + (x - mean_x).powi(2) / sxx).sqrt();
                    row.extend([
                        Value::Num(y - t * se_fit),
                        Value::Num(y + t * se_fit),
                        Value::Num(se_fit),
                    ]);
                }
                None => row.extend([Value::Num(y), Value::Num(y), Value::Null]),
            }
        }
        rows.push(row);
    }
    let mut columns = vec!["x".to_string(), "y".to_string()];
    if se {
        columns.extend(["ymin".to_string(), "ymax".to_string(), "se".to_string()]);
    }
    Ok(RowTable::new(columns, rows))
}

fn ln_gamma(x: f64) -> f64 {
    const COEF: [f64; 6] = [
        76.18009172947146,
        -86.50532032941677,
        24.01409824083091,
        -1.231739572450155,
        0.1208650973866179e-2,
        -0.5395239384953e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000000000190015;
    for c in COEF {
        y += 1.0;
        ser += c / y;
    }
    -tmp + (2.5066282746310005 * ser / x).ln()
}

/// Continued fraction for the regularized incomplete beta function.
fn beta_cf(a: f64, b: f64, x: f64) -> f64 {
    const TINY: f64 = 1e-300;
    let (qab, qap, qam) = (a + b, a + 1.0, a - 1.0);
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;
    for m in 1..300 {
        let m = m as f64;
        let m2 = 2.0 * m;
        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;
        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < 1e-14 {
            break;
        }
    }
    h
}

fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let front = (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln()).exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_cf(a, b, x) / a
    } else {
        1.0 - front * beta_cf(b, a, 1.0 - x) / b
    }
}

fn student_t_cdf(t: f64, df: f64) -> f64 {
    let tail = 0.5 * incomplete_beta(df / 2.0, 0.5, df / (df + t * t));
    if t >= 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

/// Quantile of Student's t distribution, by bisection on the CDF.
pub(crate) fn student_t_quantile(p: f64, df: f64) -> f64 {
    let (mut lo, mut hi) = (-1e4, 1e4);
    for _ in 0..200 {
        let mid = (lo + hi) / 2.0;
        if student_t_cdf(mid, df) < p {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-12 {
            break;
        }
    }
    (lo + hi) / 2.0
}

// -----------------------------------------------------------------------------
// boxplot / density / ydensity
// -----------------------------------------------------------------------------

/// Linear-interpolation quantile of sorted data.
fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    let n = sorted_data.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return sorted_data[0];
    }

    let rank = p * (n - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = rank.ceil() as usize;

    if lower_idx == upper_idx {
        sorted_data[lower_idx]
    } else {
        let weight = rank - lower_idx as f64;
        sorted_data[lower_idx] * (1.0 - weight) + sorted_data[upper_idx] * weight
    }
}

fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

/// The partition's x position: its single value, else the middle of its range.
fn group_x(data: &RowTable) -> f64 {
    finite_range(&numeric(data, Aes::X))
        .map(|(lo, hi)| (lo + hi) / 2.0)
        .unwrap_or(0.0)
}

fn compute_boxplot(data: &RowTable, coef: f64, width: f64) -> Result<RowTable> {
    let ys = sorted(numeric(data, Aes::Y));
    if ys.is_empty() {
        return Err(Error::stat("boxplot", "no finite y values"));
    }
    let q1 = percentile(&ys, 0.25);
    let median = percentile(&ys, 0.5);
    let q3 = percentile(&ys, 0.75);
    let iqr = q3 - q1;
    let lower_fence = q1 - coef * iqr;
    let upper_fence = q3 + coef * iqr;

    let lower_whisker = ys.iter().copied().find(|v| *v >= lower_fence).unwrap_or(q1);
    let upper_whisker = ys.iter().rev().copied().find(|v| *v <= upper_fence).unwrap_or(q3);
    let outliers: Vec<f64> = ys.iter().copied().filter(|v| *v < lower_fence || *v > upper_fence).collect();

    let x = group_x(data);
    let columns = [
        "x", "ymin", "lower", "middle", "upper", "ymax", "y", "outlier", "width", "n",
    ];
    let mut rows = vec![vec![
        Value::Num(x),
        Value::Num(lower_whisker),
        Value::Num(q1),
        Value::Num(median),
        Value::Num(q3),
        Value::Num(upper_whisker),
        Value::Null,
        Value::Null,
        Value::Num(width),
        Value::Num(ys.len() as f64),
    ]];
    for o in outliers {
        rows.push(vec![
            Value::Num(x),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Num(o),
            Value::Num(1.0),
            Value::Num(width),
            Value::Num(ys.len() as f64),
        ]);
    }
    Ok(RowTable::new(columns.iter().map(|c| c.to_string()).collect(), rows))
}

/// Rule-of-thumb bandwidth: 0.9 · min(sd, IQR / 1.34) · n^(-1/5).
fn silverman_bandwidth(sorted_data: &[f64]) -> f64 {
    let n = sorted_data.len() as f64;
    if n < 2.0 {
        return 1.0;
    }
    let mean = sorted_data.iter().sum::<f64>() / n;
    let sd = (sorted_data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
    let iqr = percentile(sorted_data, 0.75) - percentile(sorted_data, 0.25);

    let mut scale = sd.min(iqr / 1.34);
    if scale <= 0.0 {
        scale = if sd > 0.0 {
            sd
        } else if sorted_data[0] != 0.0 {
            sorted_data[0].abs()
        } else {
            1.0
        };
    }
    0.9 * scale * n.powf(-0.2)
}

fn gaussian_kernel(u: f64) -> f64 {
    const SQRT_2PI: f64 = 2.5066282746310002;
    (-0.5 * u * u).exp() / SQRT_2PI
}

/// Gaussian KDE of `data` at `n` evenly spaced points over `range`.
fn compute_kde(data: &[f64], bandwidth: f64, range: (f64, f64), n: usize) -> (Vec<f64>, Vec<f64>) {
    let count = data.len() as f64;
    let n = n.max(2);
    let step = (range.1 - range.0) / (n - 1) as f64;
    let grid: Vec<f64> = (0..n).map(|i| range.0 + i as f64 * step).collect();
    let density = grid
        .iter()
        .map(|g| data.iter().map(|xi| gaussian_kernel((g - xi) / bandwidth)).sum::<f64>() / (count * bandwidth))
        .collect();
    (grid, density)
}

fn density_table(position: Aes, grid: Vec<f64>, density: Vec<f64>, count: f64) -> Result<RowTable> {
    let max = density.iter().copied().fold(0.0, f64::max);
    let nums = |v: Vec<f64>| v.into_iter().map(Value::Num).collect::<Vec<_>>();
    let scaled: Vec<f64> = density.iter().map(|d| if max > 0.0 { d / max } else { 0.0 }).collect();
    RowTable::from_columns(vec![
        (position.name(), nums(grid)),
        ("density", nums(density.clone())),
        ("scaled", nums(scaled.clone())),
        ("ndensity", nums(scaled)),
        ("count", nums(density.iter().map(|d| d * count).collect())),
        ("n", vec![Value::Num(count); density.len()]),
    ])
}

fn compute_density(data: &RowTable, adjust: f64, n: usize, range: Option<(f64, f64)>) -> Result<RowTable> {
    let xs = sorted(numeric(data, Aes::X));
    if xs.len() < 2 {
        return Err(Error::stat("density", "needs at least two observations"));
    }
    let bw = silverman_bandwidth(&xs) * adjust;
    let range = range.or_else(|| finite_range(&xs)).unwrap_or((0.0, 1.0));
    let (grid, density) = compute_kde(&xs, bw, range, n);
    density_table(Aes::X, grid, density, xs.len() as f64)
}

fn compute_ydensity(data: &RowTable, adjust: f64, n: usize, trim: bool, width: f64) -> Result<RowTable> {
    let ys = sorted(numeric(data, Aes::Y));
    if ys.len() < 2 {
        return Err(Error::stat("ydensity", "needs at least two observations"));
    }
    let bw = silverman_bandwidth(&ys) * adjust;
    let (lo, hi) = finite_range(&ys).unwrap_or((0.0, 1.0));
    let range = if trim { (lo, hi) } else { (lo - 3.0 * bw, hi + 3.0 * bw) };
    let (grid, density) = compute_kde(&ys, bw, range, n);
    let rows = grid.len();
    let mut out = density_table(Aes::Y, grid, density, ys.len() as f64)?;
    out.set_numeric("x", vec![group_x(data); rows]);
    out.set_numeric("width", vec![width; rows]);
    Ok(out)
}

/// Violin half-widths relative to the box width, compared across all groups.
fn violin_widths(table: &mut RowTable, scale: ViolinScale) {
    let density = table.numeric("density").unwrap_or_default();
    let scaled = table.numeric("scaled").unwrap_or_default();
    let counts = table.numeric("n").unwrap_or_default();
    let max_density = density.iter().flatten().copied().fold(0.0, f64::max);
    let max_n = counts.iter().flatten().copied().fold(0.0, f64::max);

    let widths = (0..table.nrow())
        .map(|i| {
            let d = density[i].unwrap_or(0.0);
            let w = match scale {
                ViolinScale::Area if max_density > 0.0 => d / max_density,
                ViolinScale::Count if max_density > 0.0 && max_n > 0.0 => {
                    d / max_density * counts[i].unwrap_or(0.0) / max_n
                }
                ViolinScale::Width => scaled[i].unwrap_or(0.0),
                _ => 0.0,
            };
            Value::Num(w)
        })
        .collect();
    table.set_column("violinwidth", widths);
}

// -----------------------------------------------------------------------------
// summary
// -----------------------------------------------------------------------------

fn compute_summary(data: &RowTable, fun: SummaryFun) -> Result<RowTable> {
    let xs = data.numeric(Aes::X.name()).unwrap_or_default();
    let ys = data.numeric(Aes::Y.name()).unwrap_or_default();

    let mut by_x: Vec<(f64, Vec<f64>)> = Vec::new();
    for (x, y) in xs.into_iter().zip(ys) {
        let (Some(x), Some(y)) = (x, y) else { continue };
        match by_x.iter_mut().find(|(v, _)| *v == x) {
            Some((_, ys)) => ys.push(y),
            None => by_x.push((x, vec![y])),
        }
    }
    if by_x.is_empty() {
        return Err(Error::stat("summary", "no complete x/y observations"));
    }
    by_x.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut rows = Vec::with_capacity(by_x.len());
    for (x, ys) in by_x {
        let ys = sorted(ys);
        let n = ys.len() as f64;
        let mean = ys.iter().sum::<f64>() / n;
        let se = if ys.len() > 1 {
            (ys.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt() / n.sqrt()
        } else {
            0.0
        };
        let y = match fun {
            SummaryFun::Mean => mean,
            SummaryFun::Median => percentile(&ys, 0.5),
            SummaryFun::Min => ys[0],
            SummaryFun::Max => ys[ys.len() - 1],
        };
        rows.push(vec![
            Value::Num(x),
            Value::Num(y),
            Value::Num(mean - se),
            Value::Num(mean + se),
        ]);
    }
    Ok(RowTable::new(
        vec!["x".into(), "y".into(), "ymin".into(), "ymax".into()],
        rows,
    ))
}
