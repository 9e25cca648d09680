//! Scale transformations (forward function + exact inverse) and break
//! computation.

use serde::Serialize;

/// A transform applied to raw values before any statistic runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    #[default]
    Identity,
    Log10,
    Log2,
    Ln,
    Sqrt,
    Reverse,
}

impl Transform {
    pub fn from_name(name: &str) -> Option<Transform> {
        match name {
            "identity" | "linear" => Some(Transform::Identity),
            "log10" => Some(Transform::Log10),
            "log2" => Some(Transform::Log2),
            "log" | "ln" => Some(Transform::Ln),
            "sqrt" => Some(Transform::Sqrt),
            "reverse" => Some(Transform::Reverse),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Transform::Identity => "identity",
            Transform::Log10 => "log10",
            Transform::Log2 => "log2",
            Transform::Ln => "log",
            Transform::Sqrt => "sqrt",
            Transform::Reverse => "reverse",
        }
    }

    pub fn is_identity(self) -> bool {
        self == Transform::Identity
    }

    /// Whether `v` lies in the domain of the forward function.
    pub fn in_domain(self, v: f64) -> bool {
        match self {
            Transform::Log10 | Transform::Log2 | Transform::Ln => v > 0.0,
            Transform::Sqrt => v >= 0.0,
            Transform::Identity | Transform::Reverse => v.is_finite(),
        }
    }

    pub fn forward(self, v: f64) -> f64 {
        match self {
            Transform::Identity => v,
            Transform::Log10 => v.log10(),
            Transform::Log2 => v.log2(),
            Transform::Ln => v.ln(),
            Transform::Sqrt => v.sqrt(),
            Transform::Reverse => -v,
        }
    }

    pub fn inverse(self, v: f64) -> f64 {
        match self {
            Transform::Identity => v,
            Transform::Log10 => 10f64.powf(v),
            Transform::Log2 => 2f64.powf(v),
            Transform::Ln => v.exp(),
            Transform::Sqrt => v * v,
            Transform::Reverse => -v,
        }
    }

    fn log_base(self) -> Option<f64> {
        match self {
            Transform::Log10 => Some(10.0),
            Transform::Log2 => Some(2.0),
            Transform::Ln => Some(std::f64::consts::E),
            _ => None,
        }
    }

    /// Breaks in *transformed* space for a transformed-space range.
    ///
    /// Log transforms put breaks on integer powers of the base when at least
    /// two fit; everything else gets nice numbers in raw space.
    pub fn breaks(self, range: (f64, f64), n: usize) -> Vec<f64> {
        let (lo, hi) = (range.0.min(range.1), range.0.max(range.1));
        if let Some(base) = self.log_base() {
            if base == 10.0 || base == 2.0 {
                let powers: Vec<f64> = (lo.ceil() as i64..=hi.floor() as i64).map(|p| p as f64).collect();
                if powers.len() >= 2 {
                    return powers;
                }
            }
        }
        let raw_lo = self.inverse(lo);
        let raw_hi = self.inverse(hi);
        extended_breaks(raw_lo.min(raw_hi), raw_lo.max(raw_hi), n)
            .into_iter()
            .filter(|b| self.in_domain(*b))
            .map(|b| self.forward(b))
            .filter(|b| *b >= lo - 1e-9 && *b <= hi + 1e-9)
            .collect()
    }
}

/// Heckbert's nice number.
fn nice(x: f64, round: bool) -> f64 {
    let exp = x.log10().floor();
    let f = x / 10f64.powf(exp);
    let nf = if round {
        if f < 1.5 {
            1.0
        } else if f < 3.0 {
            2.0
        } else if f < 7.0 {
            5.0
        } else {
            10.0
        }
    } else if f <= 1.0 {
        1.0
    } else if f <= 2.0 {
        2.0
    } else if f <= 5.0 {
        5.0
    } else {
        10.0
    };
    nf * 10f64.powf(exp)
}

/// Roughly `n` round-number breaks inside `[lo, hi]`.
pub fn extended_breaks(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    if !lo.is_finite() || !hi.is_finite() {
        return Vec::new();
    }
    if (hi - lo).abs() < f64::EPSILON * lo.abs().max(1.0) {
        return vec![lo];
    }
    let n = n.max(2);
    let range = nice(hi - lo, false);
    let step = nice(range / (n - 1) as f64, true);
    let start = (lo / step).ceil() * step;
    let decimals = (-step.log10().floor()).max(0.0) as i32;
    let scale = 10f64.powi(decimals);

    let mut out = Vec::new();
    let mut v = start;
    while v <= hi + step * 1e-9 {
        let cleaned = (v * scale).round() / scale;
        out.push(if cleaned == 0.0 { 0.0 } else { cleaned });
        v += step;
    }
    out
}
