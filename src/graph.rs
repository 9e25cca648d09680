// Reference draw-primitive executor: walks the drawing tree and renders it
// through plotters onto a bitmap (PNG) or an SVG document.

use crate::error::{Error, Result};
use crate::ir::{self, Color, Grob, GrobKind, PointShape, Primitive, Stroke, Viewport};
use image::ImageEncoder;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{Color as _, FontStyle, FontTransform};

type Px = (i32, i32);

fn render_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Render(e.to_string())
}

fn rgba(c: Color) -> RGBAColor {
    RGBAColor(c.r, c.g, c.b, c.a)
}

fn px((x, y): (f64, f64)) -> Px {
    (x.round() as i32, y.round() as i32)
}

fn line_style(stroke: &Stroke) -> ShapeStyle {
    ShapeStyle {
        color: rgba(stroke.colour),
        filled: false,
        stroke_width: stroke.width.round().max(1.0) as u32,
    }
}

/// Split a polyline into the "on" pieces of a dash pattern given in multiples
/// of the line width. An empty pattern returns the line unchanged.
fn dash_segments(points: &[(f64, f64)], pattern: &[f64], width: f64) -> Vec<Vec<(f64, f64)>> {
    if pattern.is_empty() || points.len() < 2 {
        return vec![points.to_vec()];
    }
    let lengths: Vec<f64> = pattern.iter().map(|p| p * width.max(1.0)).collect();
    let mut out = Vec::new();
    let mut current = vec![points[0]];
    let mut idx = 0;
    let mut left = lengths[0];
    for w in points.windows(2) {
        let (mut a, b) = (w[0], w[1]);
        let mut seg = ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt();
        while seg > left {
            let t = left / seg;
            let cut = (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t);
            if idx % 2 == 0 {
                current.push(cut);
                out.push(std::mem::take(&mut current));
            } else {
                current = vec![cut];
            }
            seg -= left;
            a = cut;
            idx = (idx + 1) % lengths.len();
            left = lengths[idx];
        }
        left -= seg;
        if idx % 2 == 0 {
            current.push(b);
        }
    }
    if idx % 2 == 0 && current.len() >= 2 {
        out.push(current);
    }
    out
}

fn text_anchor(style: &ir::TextStyle) -> Pos {
    let h = if style.hjust < 0.25 {
        HPos::Left
    } else if style.hjust > 0.75 {
        HPos::Right
    } else {
        HPos::Center
    };
    let v = if style.vjust < 0.25 {
        VPos::Bottom
    } else if style.vjust > 0.75 {
        VPos::Top
    } else {
        VPos::Center
    };
    Pos::new(h, v)
}

fn font_transform(angle: f64) -> FontTransform {
    match angle.rem_euclid(360.0).round() as i64 {
        90 => FontTransform::Rotate270,
        180 => FontTransform::Rotate180,
        270 => FontTransform::Rotate90,
        _ => FontTransform::None,
    }
}

fn font_style(face: ir::FontFace) -> FontStyle {
    match face {
        ir::FontFace::Plain => FontStyle::Normal,
        ir::FontFace::Bold | ir::FontFace::BoldItalic => FontStyle::Bold,
        ir::FontFace::Italic => FontStyle::Italic,
    }
}

/// Renders drawing trees onto a fixed-size canvas.
#[derive(Debug, Clone, Copy)]
pub struct Executor {
    width: u32,
    height: u32,
}

impl Executor {
    pub fn new(width: u32, height: u32) -> Self {
        Executor {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Size of the RGB raster in bytes.
    fn buffer_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Rasterize the tree and encode it as PNG.
    pub fn png(&self, tree: &Grob) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; self.buffer_len()];
        {
            let root = BitMapBackend::with_buffer(&mut buffer, (self.width, self.height)).into_drawing_area();
            root.fill(&WHITE).map_err(render_err)?;
            self.draw(&root, tree)?;
            root.present().map_err(render_err)?;
        }

        let mut png_bytes = Vec::new();
        image::codecs::png::PngEncoder::new(&mut png_bytes)
            .write_image(&buffer, self.width, self.height, image::ColorType::Rgb8)
            .map_err(render_err)?;
        Ok(png_bytes)
    }

    /// Render the tree as an SVG document.
    pub fn svg(&self, tree: &Grob) -> Result<String> {
        let mut out = String::new();
        {
            let root = SVGBackend::with_string(&mut out, (self.width, self.height)).into_drawing_area();
            root.fill(&WHITE).map_err(render_err)?;
            self.draw(&root, tree)?;
            root.present().map_err(render_err)?;
        }
        Ok(out)
    }

    fn draw<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>, tree: &Grob) -> Result<()> {
        let canvas = Viewport::new(0.0, 0.0, self.width as f64, self.height as f64);
        walk(area, tree, canvas)
    }
}

fn walk<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, grob: &Grob, vp: Viewport) -> Result<()> {
    match &grob.kind {
        GrobKind::Group { viewport, children } => {
            let vp = viewport.unwrap_or(vp);
            for child in children {
                walk(area, child, vp)?;
            }
            Ok(())
        }
        GrobKind::Primitive(p) => draw_primitive(area, p, vp),
    }
}

fn draw_primitive<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, primitive: &Primitive, vp: Viewport) -> Result<()> {
    let to_px = |(x, y): (f64, f64)| vp.to_pixel(x, y);
    match primitive {
        Primitive::Point {
            at,
            shape,
            size,
            colour,
            fill,
            stroke_width,
        } => draw_point(area, to_px(*at), *shape, *size, *colour, *fill, *stroke_width),
        Primitive::Path { points, stroke } => {
            let pixels: Vec<(f64, f64)> = points.iter().map(|p| to_px(*p)).collect();
            for piece in dash_segments(&pixels, stroke.linetype.dashes(), stroke.width) {
                let piece: Vec<Px> = piece.into_iter().map(px).collect();
                area.draw(&PathElement::new(piece, line_style(stroke))).map_err(render_err)?;
            }
            Ok(())
        }
        Primitive::Polygon { points, fill, stroke } => {
            let pixels: Vec<(f64, f64)> = points.iter().map(|p| to_px(*p)).collect();
            if let Some(fill) = fill {
                let poly: Vec<Px> = pixels.iter().copied().map(px).collect();
                area.draw(&Polygon::new(poly, rgba(*fill).filled())).map_err(render_err)?;
            }
            if let (Some(stroke), Some(first)) = (stroke, pixels.first()) {
                let mut ring = pixels.clone();
                ring.push(*first);
                for piece in dash_segments(&ring, stroke.linetype.dashes(), stroke.width) {
                    let piece: Vec<Px> = piece.into_iter().map(px).collect();
                    area.draw(&PathElement::new(piece, line_style(stroke))).map_err(render_err)?;
                }
            }
            Ok(())
        }
        Primitive::Rect { min, max, fill, stroke } => {
            let (a, b) = (to_px(*min), to_px(*max));
            let corners = [px((a.0.min(b.0), a.1.min(b.1))), px((a.0.max(b.0), a.1.max(b.1)))];
            if let Some(fill) = fill {
                area.draw(&Rectangle::new(corners, rgba(*fill).filled())).map_err(render_err)?;
            }
            if let Some(stroke) = stroke {
                area.draw(&Rectangle::new(corners, line_style(stroke))).map_err(render_err)?;
            }
            Ok(())
        }
        Primitive::Text { at, label, style } => {
            let font = (style.family.as_str(), style.px())
                .into_font()
                .style(font_style(style.face))
                .color(&rgba(style.colour))
                .transform(font_transform(style.angle))
                .pos(text_anchor(style));
            // Missing system fonts should not abort the whole drawing
            if let Err(e) = area.draw(&Text::new(label.clone(), px(to_px(*at)), font)) {
                log::warn!("could not draw text '{}': {}", label, e);
            }
            Ok(())
        }
        Primitive::Raster {
            min,
            max,
            ncol,
            nrow,
            cells,
        } => {
            let (a, b) = (to_px(*min), to_px(*max));
            let (left, top) = (a.0.min(b.0), a.1.min(b.1));
            let (ncol, nrow) = ((*ncol).max(1), (*nrow).max(1));
            let cw = (a.0 - b.0).abs() / ncol as f64;
            let ch = (a.1 - b.1).abs() / nrow as f64;
            for (i, colour) in cells.iter().enumerate() {
                let (r, c) = (i / ncol, i % ncol);
                let x0 = left + c as f64 * cw;
                let y0 = top + r as f64 * ch;
                let rect = Rectangle::new([px((x0, y0)), px((x0 + cw, y0 + ch))], rgba(*colour).filled());
                area.draw(&rect).map_err(render_err)?;
            }
            Ok(())
        }
    }
}

fn draw_point<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    (x, y): (f64, f64),
    shape: PointShape,
    radius: f64,
    colour: Color,
    fill: Option<Color>,
    stroke_width: f64,
) -> Result<()> {
    let outline = ShapeStyle {
        color: rgba(colour),
        filled: false,
        stroke_width: stroke_width.round().max(1.0) as u32,
    };
    let body = rgba(fill.unwrap_or(colour)).filled();
    let r = radius.max(0.5);
    let polygon = |pts: Vec<(f64, f64)>| pts.into_iter().map(px).collect::<Vec<Px>>();
    match shape {
        PointShape::Circle => {
            area.draw(&Circle::new(px((x, y)), r.round() as i32, body)).map_err(render_err)?;
            if fill.is_some() {
                area.draw(&Circle::new(px((x, y)), r.round() as i32, outline)).map_err(render_err)?;
            }
        }
        PointShape::Square => {
            let corners = [px((x - r, y - r)), px((x + r, y + r))];
            area.draw(&Rectangle::new(corners, body)).map_err(render_err)?;
            if fill.is_some() {
                area.draw(&Rectangle::new(corners, outline)).map_err(render_err)?;
            }
        }
        PointShape::Triangle | PointShape::Diamond => {
            let pts = if shape == PointShape::Triangle {
                vec![(x, y - r), (x + r, y + r * 0.8), (x - r, y + r * 0.8)]
            } else {
                vec![(x, y - r), (x + r, y), (x, y + r), (x - r, y)]
            };
            area.draw(&Polygon::new(polygon(pts.clone()), body)).map_err(render_err)?;
            if fill.is_some() {
                let mut ring = pts.clone();
                ring.push(pts[0]);
                area.draw(&PathElement::new(polygon(ring), outline)).map_err(render_err)?;
            }
        }
        PointShape::Plus | PointShape::Cross => {
            let d = if shape == PointShape::Cross { r * std::f64::consts::FRAC_1_SQRT_2 } else { r };
            let strokes = if shape == PointShape::Plus {
                [[(x - d, y), (x + d, y)], [(x, y - d), (x, y + d)]]
            } else {
                [[(x - d, y - d), (x + d, y + d)], [(x - d, y + d), (x + d, y - d)]]
            };
            for s in strokes {
                area.draw(&PathElement::new(polygon(s.to_vec()), outline)).map_err(render_err)?;
            }
        }
    }
    Ok(())
}
