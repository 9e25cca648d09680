//! Theme Resolution Engine
//!
//! Resolves hierarchical theme elements into concrete, fully-specified styles.
//! Child elements inherit from their parents, ggplot2 style. The built-in
//! presets are full themes; a user theme is overlaid on the grey preset
//! before resolution.
//!
//! Inheritance hierarchy:
//! ```text
//! text
//! ├── plot_title, plot_subtitle, plot_caption, plot_tag
//! ├── axis_text, axis_title
//! ├── strip_text
//! └── legend_text, legend_title
//!
//! rect
//! ├── plot_background, panel_background, panel_border
//! ├── strip_background
//! └── legend_background, legend_key
//!
//! line
//! ├── axis_line
//! ├── axis_ticks
//! └── panel_grid_major
//!     └── panel_grid_minor
//! ```

use crate::ir::{Color, FontFace, LineType, Stroke, TextStyle};
use crate::parser::ast::{ElementLine, ElementRect, ElementText, LegendPosition, Theme, ThemeElement};

// === Resolved Types (no Options on style fields - fully concrete) ===

/// Fully resolved line style ready for rendering
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedLine {
    pub color: Color,
    pub width: f64,
    pub linetype: LineType,
}

impl ResolvedLine {
    pub fn stroke(&self) -> Stroke {
        Stroke {
            colour: self.color,
            width: self.width,
            linetype: self.linetype,
        }
    }
}

/// Fully resolved rectangle style ready for rendering
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedRect {
    /// `None` is transparent
    pub fill: Option<Color>,
    pub border_color: Option<Color>,
    pub border_width: f64,
}

impl ResolvedRect {
    pub fn stroke(&self) -> Option<Stroke> {
        self.border_color
            .filter(|_| self.border_width > 0.0)
            .map(|c| Stroke::solid(c, self.border_width))
    }
}

/// Complete resolved theme with all elements fully specified.
/// `None` means the element is blank.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTheme {
    pub plot_background: Option<ResolvedRect>,
    pub plot_title: TextStyle,
    pub plot_subtitle: TextStyle,
    pub plot_caption: TextStyle,
    pub plot_tag: TextStyle,
    pub panel_background: Option<ResolvedRect>,
    pub panel_border: Option<ResolvedRect>,
    pub panel_grid_major: Option<ResolvedLine>,
    pub panel_grid_minor: Option<ResolvedLine>,
    pub axis_text: Option<TextStyle>,
    pub axis_title: Option<TextStyle>,
    pub axis_line: Option<ResolvedLine>,
    pub axis_ticks: Option<ResolvedLine>,
    pub strip_background: Option<ResolvedRect>,
    pub strip_text: TextStyle,
    pub legend_background: Option<ResolvedRect>,
    pub legend_key: Option<ResolvedRect>,
    pub legend_text: TextStyle,
    pub legend_title: TextStyle,
    pub legend_position: LegendPosition,
}

// === Default Values ===

impl Default for ResolvedLine {
    fn default() -> Self {
        ResolvedLine {
            color: Color::BLACK,
            width: 1.0,
            linetype: LineType::Solid,
        }
    }
}

impl Default for ResolvedRect {
    fn default() -> Self {
        ResolvedRect {
            fill: Some(Color::WHITE),
            border_color: None,
            border_width: 0.0,
        }
    }
}

// === Color Parsing ===

/// Parse a color string, supporting hex (#RRGGBB, #RRGGBBAA, #RGB) and named colors
pub fn parse_color(color_str: &str) -> Option<Color> {
    let color_str = color_str.trim();

    if color_str.starts_with('#') {
        return parse_hex_color(color_str);
    }

    match color_str.to_lowercase().as_str() {
        "white" => Some(Color::rgb(255, 255, 255)),
        "black" => Some(Color::rgb(0, 0, 0)),
        "red" => Some(Color::rgb(255, 0, 0)),
        "green" => Some(Color::rgb(0, 128, 0)),
        "blue" => Some(Color::rgb(0, 0, 255)),
        "yellow" => Some(Color::rgb(255, 255, 0)),
        "cyan" => Some(Color::rgb(0, 255, 255)),
        "magenta" => Some(Color::rgb(255, 0, 255)),
        "orange" => Some(Color::rgb(255, 165, 0)),
        "purple" => Some(Color::rgb(128, 0, 128)),
        "pink" => Some(Color::rgb(255, 192, 203)),
        "brown" => Some(Color::rgb(139, 69, 19)),
        "navy" => Some(Color::rgb(0, 0, 128)),
        "steelblue" => Some(Color::rgb(70, 130, 180)),
        "darkblue" => Some(Color::rgb(0, 0, 139)),
        "darkred" => Some(Color::rgb(139, 0, 0)),
        "darkgreen" => Some(Color::rgb(0, 100, 0)),
        "gold" => Some(Color::rgb(255, 215, 0)),
        "gray" | "grey" => Some(Color::rgb(190, 190, 190)),
        "darkgray" | "darkgrey" => Some(Color::rgb(169, 169, 169)),
        "lightgray" | "lightgrey" => Some(Color::rgb(211, 211, 211)),
        // ggplot2-style grayscale (gray0 to gray100)
        s if s.starts_with("gray") || s.starts_with("grey") => {
            let n = s[4..].parse::<u8>().ok().filter(|n| *n <= 100)?;
            let v = (n as f64 * 2.55).round() as u8;
            Some(Color::rgb(v, v, v))
        }
        _ => None,
    }
}

/// Whether a fill string asks for no fill at all.
fn is_transparent(color_str: &str) -> bool {
    matches!(
        color_str.trim().to_lowercase().as_str(),
        "none" | "na" | "transparent"
    )
}

/// Parse hex color (#RRGGBB, #RRGGBBAA or #RGB)
fn parse_hex_color(hex: &str) -> Option<Color> {
    let hex = hex.trim_start_matches('#');
    let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        6 => Some(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
        8 => Some(Color::rgb(byte(0)?, byte(2)?, byte(4)?).with_alpha(byte(6)? as f64 / 255.0)),
        3 => {
            let nibble = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok().map(|v| v * 17);
            Some(Color::rgb(nibble(0)?, nibble(1)?, nibble(2)?))
        }
        _ => None,
    }
}

/// Parse face string into FontFace
fn parse_face(face: &str) -> FontFace {
    match face.to_lowercase().as_str() {
        "bold" => FontFace::Bold,
        "italic" => FontFace::Italic,
        "bold.italic" | "bolditalic" => FontFace::BoldItalic,
        _ => FontFace::Plain,
    }
}

// === Presets ===

fn text(size: Option<f64>, color: Option<&str>, hjust: Option<f64>) -> ThemeElement {
    ThemeElement::Text(ElementText {
        size,
        color: color.map(str::to_string),
        hjust,
        ..Default::default()
    })
}

fn line(color: &str, width: f64) -> ThemeElement {
    ThemeElement::Line(ElementLine {
        color: Some(color.to_string()),
        width: Some(width),
        linetype: None,
    })
}

fn rect(fill: &str, border: Option<(&str, f64)>) -> ThemeElement {
    ThemeElement::Rect(ElementRect {
        fill: Some(fill.to_string()),
        color: border.map(|(c, _)| c.to_string()),
        width: border.map(|(_, w)| w),
    })
}

impl Theme {
    /// The default grey-panel theme.
    pub fn grey() -> Theme {
        Theme {
            line: line("black", 1.0),
            rect: rect("white", None),
            text: text(Some(11.0), Some("black"), None),
            plot_background: rect("white", None),
            plot_title: text(Some(13.2), None, Some(0.0)),
            plot_subtitle: text(None, None, Some(0.0)),
            plot_caption: text(Some(8.8), None, Some(1.0)),
            plot_tag: text(Some(13.2), None, Some(0.0)),
            panel_background: rect("grey92", None),
            panel_border: ThemeElement::Blank,
            panel_grid_major: line("white", 1.0),
            panel_grid_minor: line("white", 0.5),
            axis_text: text(Some(8.8), Some("grey30"), None),
            axis_title: ThemeElement::Inherit,
            axis_line: ThemeElement::Blank,
            axis_ticks: line("grey20", 1.0),
            strip_background: rect("grey85", None),
            strip_text: text(Some(8.8), Some("grey10"), None),
            legend_background: rect("white", None),
            legend_key: rect("grey95", None),
            legend_text: text(Some(8.8), None, Some(0.0)),
            legend_title: text(None, None, Some(0.0)),
            legend_position: Some(LegendPosition::Right),
        }
    }

    /// White panel with a dark border.
    pub fn bw() -> Theme {
        let mut theme = Theme::grey();
        theme.overlay(&Theme {
            panel_background: rect("white", None),
            panel_border: rect("none", Some(("grey20", 1.0))),
            panel_grid_major: line("grey92", 1.0),
            panel_grid_minor: line("grey92", 0.5),
            strip_background: rect("grey85", Some(("grey20", 1.0))),
            legend_key: rect("white", None),
            ..Default::default()
        });
        theme
    }

    /// No backgrounds, borders or ticks.
    pub fn minimal() -> Theme {
        let mut theme = Theme::bw();
        theme.overlay(&Theme {
            plot_background: ThemeElement::Blank,
            panel_background: ThemeElement::Blank,
            panel_border: ThemeElement::Blank,
            axis_ticks: ThemeElement::Blank,
            strip_background: ThemeElement::Blank,
            legend_background: ThemeElement::Blank,
            legend_key: ThemeElement::Blank,
            ..Default::default()
        });
        theme
    }

    /// Axis lines and no grid.
    pub fn classic() -> Theme {
        let mut theme = Theme::bw();
        theme.overlay(&Theme {
            panel_border: ThemeElement::Blank,
            panel_grid_major: ThemeElement::Blank,
            panel_grid_minor: ThemeElement::Blank,
            axis_line: line("black", 1.0),
            strip_background: rect("white", Some(("black", 1.0))),
            legend_key: ThemeElement::Blank,
            ..Default::default()
        });
        theme
    }

    pub fn preset(name: &str) -> Option<Theme> {
        match name {
            "grey" | "gray" => Some(Theme::grey()),
            "bw" => Some(Theme::bw()),
            "minimal" => Some(Theme::minimal()),
            "classic" => Some(Theme::classic()),
            _ => None,
        }
    }
}

// === Resolution Logic ===

impl Theme {
    /// Resolve the theme into concrete styles using the inheritance hierarchy.
    ///
    /// The grey preset supplies every slot the user left as `Inherit`; then,
    /// for each element:
    /// 1. Check the specific element (e.g., `axis_text`)
    /// 2. Check the parent element (e.g., `text`)
    /// 3. Use hardcoded default
    pub fn resolve(&self) -> ResolvedTheme {
        let mut effective = Theme::grey();
        effective.overlay(self);
        effective.resolve_elements()
    }

    fn resolve_elements(&self) -> ResolvedTheme {
        let base_text = self.resolve_base_text();
        let base_line = self.resolve_base_line();
        let base_rect = self.resolve_base_rect();

        let panel_grid_major = resolve_optional_line(&self.panel_grid_major, &base_line);
        let panel_grid_minor = self.resolve_grid_minor(&panel_grid_major, &base_line);

        ResolvedTheme {
            plot_background: resolve_optional_rect(&self.plot_background, &base_rect),
            plot_title: resolve_text_element(&self.plot_title, &base_text),
            plot_subtitle: resolve_text_element(&self.plot_subtitle, &base_text),
            plot_caption: resolve_text_element(&self.plot_caption, &base_text),
            plot_tag: resolve_text_element(&self.plot_tag, &base_text),
            panel_background: resolve_optional_rect(&self.panel_background, &base_rect),
            panel_border: resolve_optional_rect(&self.panel_border, &ResolvedRect {
                fill: None,
                ..base_rect
            }),
            panel_grid_major,
            panel_grid_minor,
            axis_text: resolve_optional_text(&self.axis_text, &base_text),
            axis_title: resolve_optional_text(&self.axis_title, &base_text),
            axis_line: resolve_optional_line(&self.axis_line, &base_line),
            axis_ticks: resolve_optional_line(&self.axis_ticks, &base_line),
            strip_background: resolve_optional_rect(&self.strip_background, &base_rect),
            strip_text: resolve_text_element(&self.strip_text, &base_text),
            legend_background: resolve_optional_rect(&self.legend_background, &base_rect),
            legend_key: resolve_optional_rect(&self.legend_key, &base_rect),
            legend_text: resolve_text_element(&self.legend_text, &base_text),
            legend_title: resolve_text_element(&self.legend_title, &base_text),
            legend_position: self.legend_position.unwrap_or_default(),
        }
    }

    /// Resolve base text style from root `text` element
    fn resolve_base_text(&self) -> TextStyle {
        let mut base = TextStyle::default();
        if let ThemeElement::Text(t) = &self.text {
            apply_text_overrides(&mut base, t);
        }
        base
    }

    /// Resolve base line style from root `line` element
    fn resolve_base_line(&self) -> ResolvedLine {
        let mut base = ResolvedLine::default();
        if let ThemeElement::Line(l) = &self.line {
            apply_line_overrides(&mut base, l);
        }
        base
    }

    /// Resolve base rect style from root `rect` element
    fn resolve_base_rect(&self) -> ResolvedRect {
        let mut base = ResolvedRect::default();
        if let ThemeElement::Rect(r) = &self.rect {
            apply_rect_overrides(&mut base, r);
        }
        base
    }

    /// panel_grid_minor inherits from panel_grid_major, then from line
    fn resolve_grid_minor(&self, major: &Option<ResolvedLine>, base: &ResolvedLine) -> Option<ResolvedLine> {
        match &self.panel_grid_minor {
            ThemeElement::Blank => None,
            ThemeElement::Line(l) => {
                let mut resolved = major.unwrap_or(*base);
                apply_line_overrides(&mut resolved, l);
                if l.width.is_none() {
                    resolved.width *= 0.5;
                }
                Some(resolved)
            }
            _ => major.map(|mut m| {
                m.width *= 0.5;
                m
            }),
        }
    }
}

/// Text elements fall back to their parent when blanked.
fn resolve_text_element(element: &ThemeElement, base: &TextStyle) -> TextStyle {
    match element {
        ThemeElement::Text(t) => {
            let mut resolved = base.clone();
            apply_text_overrides(&mut resolved, t);
            resolved
        }
        _ => base.clone(),
    }
}

fn resolve_optional_text(element: &ThemeElement, base: &TextStyle) -> Option<TextStyle> {
    match element {
        ThemeElement::Blank => None,
        other => Some(resolve_text_element(other, base)),
    }
}

fn resolve_optional_line(element: &ThemeElement, base: &ResolvedLine) -> Option<ResolvedLine> {
    match element {
        ThemeElement::Line(l) => {
            let mut resolved = *base;
            apply_line_overrides(&mut resolved, l);
            Some(resolved)
        }
        ThemeElement::Blank => None,
        _ => Some(*base),
    }
}

fn resolve_optional_rect(element: &ThemeElement, base: &ResolvedRect) -> Option<ResolvedRect> {
    match element {
        ThemeElement::Rect(r) => {
            let mut resolved = *base;
            apply_rect_overrides(&mut resolved, r);
            Some(resolved)
        }
        ThemeElement::Blank => None,
        _ => Some(*base),
    }
}

// === Override Application ===

fn apply_text_overrides(resolved: &mut TextStyle, element: &ElementText) {
    if let Some(ref family) = element.family {
        resolved.family = family.clone();
    }
    if let Some(c) = element.color.as_deref().and_then(parse_color) {
        resolved.colour = c;
    }
    if let Some(size) = element.size {
        resolved.size = size;
    }
    if let Some(ref face) = element.face {
        resolved.face = parse_face(face);
    }
    if let Some(angle) = element.angle {
        resolved.angle = angle;
    }
    if let Some(hjust) = element.hjust {
        resolved.hjust = hjust;
    }
    if let Some(vjust) = element.vjust {
        resolved.vjust = vjust;
    }
}

fn apply_line_overrides(resolved: &mut ResolvedLine, element: &ElementLine) {
    if let Some(c) = element.color.as_deref().and_then(parse_color) {
        resolved.color = c;
    }
    if let Some(width) = element.width {
        resolved.width = width;
    }
    if let Some(lt) = element.linetype.as_deref().and_then(LineType::from_name) {
        resolved.linetype = lt;
    }
}

fn apply_rect_overrides(resolved: &mut ResolvedRect, element: &ElementRect) {
    if let Some(ref fill) = element.fill {
        if is_transparent(fill) {
            resolved.fill = None;
        } else if let Some(c) = parse_color(fill) {
            resolved.fill = Some(c);
        }
    }
    if let Some(ref color) = element.color {
        resolved.border_color = parse_color(color);
        if resolved.border_width == 0.0 {
            resolved.border_width = 1.0;
        }
    }
    if let Some(width) = element.width {
        resolved.border_width = width;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_color("#FF0000"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(parse_color("#F00"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(parse_color("#CCCCCC"), Some(Color::rgb(204, 204, 204)));
        assert_eq!(parse_color("#00000080").map(|c| (c.a * 255.0).round()), Some(128.0));
        assert_eq!(parse_color("#12"), None);
    }

    #[test]
    fn test_parse_named_and_gray_scale() {
        assert_eq!(parse_color("white"), Some(Color::WHITE));
        assert_eq!(parse_color("gray0"), Some(Color::BLACK));
        assert_eq!(parse_color("gray100"), Some(Color::WHITE));
        assert_eq!(parse_color("grey90"), Some(Color::rgb(229, 229, 229)));
        assert_eq!(parse_color("grey101"), None);
        assert_eq!(parse_color("not-a-colour"), None);
    }

    #[test]
    fn test_resolve_default_is_grey() {
        let resolved = Theme::default().resolve();
        assert_eq!(
            resolved.panel_background.and_then(|r| r.fill),
            Some(Color::rgb(235, 235, 235))
        );
        assert!(resolved.axis_line.is_none());
        assert_eq!(resolved.legend_position, LegendPosition::Right);
    }

    #[test]
    fn test_resolve_with_blank_elements() {
        let theme = Theme {
            axis_ticks: ThemeElement::Blank,
            panel_grid_major: ThemeElement::Blank,
            ..Default::default()
        };
        let resolved = theme.resolve();
        assert!(resolved.axis_ticks.is_none());
        assert!(resolved.panel_grid_major.is_none());
        // Minor grid keeps its own preset definition
        assert!(resolved.panel_grid_minor.is_some());
    }

    #[test]
    fn test_resolve_with_custom_text() {
        let theme = Theme {
            plot_title: ThemeElement::Text(ElementText {
                size: Some(24.0),
                face: Some("bold".to_string()),
                color: Some("#FF0000".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let resolved = theme.resolve();
        assert_eq!(resolved.plot_title.size, 24.0);
        assert_eq!(resolved.plot_title.face, FontFace::Bold);
        assert_eq!(resolved.plot_title.colour, Color::rgb(255, 0, 0));
    }

    #[test]
    fn test_inheritance_from_root() {
        let theme = Theme {
            text: ThemeElement::Text(ElementText {
                family: Some("serif".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let resolved = theme.resolve();
        assert_eq!(resolved.axis_text.map(|t| t.family), Some("serif".to_string()));
        assert_eq!(resolved.legend_title.family, "serif");
    }

    #[test]
    fn test_minor_grid_inherits_major() {
        let theme = Theme {
            panel_grid_major: line("red", 2.0),
            panel_grid_minor: ThemeElement::Inherit,
            ..Default::default()
        };
        // The grey preset defines the minor grid explicitly, so only a bare
        // element_line() shows inheritance from the major grid.
        let theme = Theme {
            panel_grid_minor: ThemeElement::Line(ElementLine::default()),
            ..theme
        };
        let minor = theme.resolve().panel_grid_minor.unwrap();
        assert_eq!(minor.color, Color::rgb(255, 0, 0));
        assert_eq!(minor.width, 1.0);
    }

    #[test]
    fn test_presets() {
        let classic = Theme::classic().resolve();
        assert!(classic.panel_grid_major.is_none());
        assert!(classic.axis_line.is_some());

        let minimal = Theme::minimal().resolve();
        assert!(minimal.panel_background.is_none());
        assert!(minimal.axis_ticks.is_none());

        let bw = Theme::bw().resolve();
        assert_eq!(bw.panel_border.and_then(|b| b.fill), None);
        assert!(bw.panel_border.and_then(|b| b.border_color).is_some());
    }
}
