// Theme components: `theme_<preset>()` and `theme(slot: element_*(...))`.

use super::args::{ArgValue, Call};
use super::ast::{ElementLine, ElementRect, ElementText, LegendPosition, Theme, ThemeElement};
use crate::error::{Error, Result};

pub fn is_theme(name: &str) -> bool {
    name == "theme" || name.starts_with("theme_")
}

/// Slot keys accept `.` as a separator (`axis.text`) and `colour` for `color`.
fn slot<'a>(theme: &'a mut Theme, key: &str) -> Option<&'a mut ThemeElement> {
    Some(match key {
        "line" => &mut theme.line,
        "rect" => &mut theme.rect,
        "text" => &mut theme.text,
        "plot_background" => &mut theme.plot_background,
        "plot_title" => &mut theme.plot_title,
        "plot_subtitle" => &mut theme.plot_subtitle,
        "plot_caption" => &mut theme.plot_caption,
        "plot_tag" => &mut theme.plot_tag,
        "panel_background" => &mut theme.panel_background,
        "panel_border" => &mut theme.panel_border,
        "panel_grid_major" => &mut theme.panel_grid_major,
        "panel_grid_minor" => &mut theme.panel_grid_minor,
        "axis_text" => &mut theme.axis_text,
        "axis_title" => &mut theme.axis_title,
        "axis_line" => &mut theme.axis_line,
        "axis_ticks" => &mut theme.axis_ticks,
        "strip_background" => &mut theme.strip_background,
        "strip_text" => &mut theme.strip_text,
        "legend_background" => &mut theme.legend_background,
        "legend_key" => &mut theme.legend_key,
        "legend_text" => &mut theme.legend_text,
        "legend_title" => &mut theme.legend_title,
        _ => return None,
    })
}

fn colour(call: &Call) -> Result<Option<String>> {
    Ok(call.string("color")?.or(call.string("colour")?))
}

fn element(call: &Call) -> Result<ThemeElement> {
    match call.name.as_str() {
        "element_blank" => {
            call.check(&[], 0)?;
            Ok(ThemeElement::Blank)
        }
        "element_text" => {
            call.check(&["family", "color", "colour", "size", "face", "angle", "hjust", "vjust"], 0)?;
            Ok(ThemeElement::Text(ElementText {
                family: call.string("family")?,
                color: colour(call)?,
                size: call.num("size")?,
                face: call.string("face")?,
                angle: call.num("angle")?,
                hjust: call.num("hjust")?,
                vjust: call.num("vjust")?,
            }))
        }
        "element_line" => {
            call.check(&["color", "colour", "width", "linewidth", "linetype"], 0)?;
            Ok(ThemeElement::Line(ElementLine {
                color: colour(call)?,
                width: call.num("width")?.or(call.num("linewidth")?),
                linetype: call.string("linetype")?,
            }))
        }
        "element_rect" => {
            call.check(&["fill", "color", "colour", "width", "linewidth"], 0)?;
            Ok(ThemeElement::Rect(ElementRect {
                fill: call.string("fill")?,
                color: colour(call)?,
                width: call.num("width")?.or(call.num("linewidth")?),
            }))
        }
        other => Err(Error::Parse(format!("unknown theme element '{}'", other))),
    }
}

/// Whether `element` may fill the slot named `key`.
fn fits(key: &str, element: &ThemeElement) -> bool {
    match element {
        ThemeElement::Inherit | ThemeElement::Blank => true,
        ThemeElement::Text(_) => {
            key == "text" || key.ends_with("_text") || key.ends_with("_title") || (key.starts_with("plot_") && !key.ends_with("background"))
        }
        ThemeElement::Line(_) => key == "line" || key.contains("grid") || key == "axis_line" || key == "axis_ticks",
        ThemeElement::Rect(_) => key == "rect" || key.ends_with("background") || key == "panel_border" || key == "legend_key",
    }
}

fn legend_position(call: &Call, value: &ArgValue) -> Result<LegendPosition> {
    match value {
        ArgValue::List(_) => {
            let (x, y) = call
                .pair("legend_position")?
                .ok_or_else(|| Error::Parse("theme(): legend_position expects [x, y]".to_string()))?;
            Ok(LegendPosition::Inside(x, y))
        }
        other => {
            let name = other
                .as_str()
                .ok_or_else(|| Error::Parse("theme(): legend_position expects a name or [x, y]".to_string()))?;
            LegendPosition::from_name(name)
                .ok_or_else(|| Error::Parse(format!("theme(): unknown legend position '{}'", name)))
        }
    }
}

/// `theme_minimal()` and friends produce a full preset; `theme(...)`
/// produces a partial theme to overlay on the current one.
pub fn build_theme(call: &Call) -> Result<Theme> {
    if let Some(preset) = call.name.strip_prefix("theme_") {
        call.check(&[], 0)?;
        return Theme::preset(preset).ok_or_else(|| Error::Parse(format!("unknown theme '{}'", call.name)));
    }

    let mut theme = Theme::default();
    for arg in &call.args {
        let key = arg
            .key
            .as_deref()
            .ok_or_else(|| Error::Parse("theme(): every setting needs a name".to_string()))?
            .replace('.', "_");
        if key == "legend_position" {
            theme.legend_position = Some(legend_position(call, &arg.value)?);
            continue;
        }
        let ArgValue::Call(inner) = &arg.value else {
            return Err(Error::Parse(format!("theme(): '{}' expects an element_*() value", key)));
        };
        let value = element(inner)?;
        if !fits(&key, &value) {
            return Err(Error::Parse(format!("theme(): {}() does not fit '{}'", inner.name, key)));
        }
        let target = slot(&mut theme, &key)
            .ok_or_else(|| Error::Parse(format!("theme(): unknown setting '{}'", key)))?;
        *target = value;
    }
    Ok(theme)
}
