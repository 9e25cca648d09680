// Color, size, shape and linetype palettes for data-driven aesthetics

use crate::ir::{Color, LineType, PointShape};
use crate::theme_resolve::parse_color;

/// Color palette for categorical data
#[derive(Debug, Clone, PartialEq)]
pub struct ColorPalette {
    colors: Vec<Color>,
}

impl ColorPalette {
    /// Evenly spaced hues around the HCL colour wheel (chroma 100, luminance
    /// 65), starting at 15°.
    pub fn hue(n: usize) -> Self {
        let n = n.max(1);
        let colors = (0..n)
            .map(|i| {
                let h = (15.0 + i as f64 * 360.0 / n as f64) % 360.0;
                hcl(h, 100.0, 65.0)
            })
            .collect();
        ColorPalette { colors }
    }

    /// User-supplied colours; unparseable entries fall back to grey50.
    pub fn manual(values: &[String]) -> Self {
        let colors = values
            .iter()
            .map(|v| parse_color(v).unwrap_or(Color::rgb(127, 127, 127)))
            .collect::<Vec<_>>();
        if colors.is_empty() {
            return ColorPalette::hue(1);
        }
        ColorPalette { colors }
    }

    /// Get color for a specific index (wraps around if index > palette size)
    pub fn get_color(&self, index: usize) -> Color {
        self.colors[index % self.colors.len()]
    }
}

/// Two-colour gradient for continuous colour scales
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gradient {
    pub low: Color,
    pub high: Color,
}

impl Default for Gradient {
    fn default() -> Self {
        Gradient {
            low: Color::rgb(0x13, 0x2B, 0x43),
            high: Color::rgb(0x56, 0xB1, 0xF7),
        }
    }
}

impl Gradient {
    pub fn from_names(low: &str, high: &str) -> Option<Self> {
        Some(Gradient {
            low: parse_color(low)?,
            high: parse_color(high)?,
        })
    }

    /// Colour at a rescaled position in `[0, 1]`.
    pub fn at(&self, t: f64) -> Color {
        self.low.lerp(self.high, t)
    }
}

/// Size palette for categorical or continuous size mapping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizePalette {
    min_size: f64,
    max_size: f64,
}

impl SizePalette {
    pub fn new(min_size: f64, max_size: f64) -> Self {
        SizePalette { min_size, max_size }
    }

    /// Default size palette (1.0 to 6.0)
    pub fn default_range() -> Self {
        SizePalette::new(1.0, 6.0)
    }

    /// Area-proportional size for a rescaled value in `[0, 1]`.
    pub fn continuous(&self, t: f64) -> f64 {
        self.min_size + (self.max_size - self.min_size) * t.clamp(0.0, 1.0).sqrt()
    }

    /// Size of level `index` out of `n`, evenly distributed between min and max
    pub fn discrete(&self, index: usize, n: usize) -> f64 {
        if n <= 1 {
            return (self.min_size + self.max_size) / 2.0;
        }
        let fraction = index as f64 / (n - 1) as f64;
        self.min_size + (self.max_size - self.min_size) * fraction
    }
}

/// Linear alpha palette
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlphaPalette {
    min: f64,
    max: f64,
}

impl AlphaPalette {
    pub fn new(min: f64, max: f64) -> Self {
        AlphaPalette { min, max }
    }

    /// Default alpha range (0.1 to 1.0)
    pub fn default_range() -> Self {
        AlphaPalette::new(0.1, 1.0)
    }

    pub fn continuous(&self, t: f64) -> f64 {
        self.min + (self.max - self.min) * t.clamp(0.0, 1.0)
    }

    pub fn discrete(&self, index: usize, n: usize) -> f64 {
        if n <= 1 {
            return self.max;
        }
        self.continuous(index as f64 / (n - 1) as f64)
    }
}

/// Shape palette for categorical shape mapping
pub struct ShapePalette;

impl ShapePalette {
    /// Get shape for a specific index (wraps around)
    pub fn get_shape(index: usize) -> PointShape {
        PointShape::ALL[index % PointShape::ALL.len()]
    }
}

/// Linetype palette for categorical linetype mapping
pub struct LinetypePalette;

impl LinetypePalette {
    pub fn get_linetype(index: usize) -> LineType {
        LineType::ALL[index % LineType::ALL.len()]
    }
}

/// Polar CIE-Luv (hue in degrees) to sRGB.
fn hcl(h: f64, c: f64, l: f64) -> Color {
    const WHITE: (f64, f64, f64) = (95.047, 100.0, 108.883);
    if l <= 0.0 {
        return Color::BLACK;
    }
    let rad = h.to_radians();
    let (u, v) = (c * rad.cos(), c * rad.sin());

    let denom = WHITE.0 + 15.0 * WHITE.1 + 3.0 * WHITE.2;
    let un = 4.0 * WHITE.0 / denom;
    let vn = 9.0 * WHITE.1 / denom;

    let y = WHITE.1
        * if l > 8.0 {
            ((l + 16.0) / 116.0).powi(3)
        } else {
            l / 903.3
        };
    let up = u / (13.0 * l) + un;
    let vp = v / (13.0 * l) + vn;
    let x = y * 9.0 * up / (4.0 * vp);
    let z = y * (12.0 - 3.0 * up - 20.0 * vp) / (4.0 * vp);
    let (x, y, z) = (x / 100.0, y / 100.0, z / 100.0);

    let r = 3.2404542 * x - 1.5371385 * y - 0.4985314 * z;
    let g = -0.9692660 * x + 1.8760108 * y + 0.0415560 * z;
    let b = 0.0556434 * x - 0.2040259 * y + 1.0572252 * z;

    let gamma = |v: f64| {
        let v = if v <= 0.0031308 {
            12.92 * v
        } else {
            1.055 * v.powf(1.0 / 2.4) - 0.055
        };
        (v.clamp(0.0, 1.0) * 255.0).round() as u8
    };
    Color::rgb(gamma(r), gamma(g), gamma(b))
}
