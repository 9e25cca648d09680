use super::aesthetics::aes_named;
use super::args::{ArgValue, Call};
use super::ast::Labels;
use crate::aes::Aes;
use crate::error::{Error, Result};

pub fn is_labels(name: &str) -> bool {
    matches!(name, "labs" | "ggtitle" | "xlab" | "ylab")
}

fn text(call: &Call, value: &ArgValue) -> Result<String> {
    match value {
        ArgValue::Num(n) => Ok(n.to_string()),
        other => other
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Parse(format!("{}(): labels must be strings", call.name))),
    }
}

fn first(call: &Call) -> Result<String> {
    call.check(&[], 1)?;
    match call.positional(0) {
        Some(value) => text(call, value),
        None => Err(Error::Parse(format!("{}(): expected a label", call.name))),
    }
}

/// `labs(title: ..., colour: ...)`, `ggtitle(...)`, `xlab(...)`, `ylab(...)`.
pub fn build_labels(call: &Call) -> Result<Labels> {
    let mut labels = Labels::default();
    match call.name.as_str() {
        "ggtitle" => {
            call.check(&["subtitle"], 1)?;
            let title = call
                .positional(0)
                .ok_or_else(|| Error::Parse("ggtitle(): expected a title".to_string()))?;
            labels.title = Some(text(call, title)?);
            labels.subtitle = call.string("subtitle")?;
        }
        "xlab" => {
            labels.aesthetics.insert(Aes::X, first(call)?);
        }
        "ylab" => {
            labels.aesthetics.insert(Aes::Y, first(call)?);
        }
        _ => {
            for arg in &call.args {
                let key = arg
                    .key
                    .as_deref()
                    .ok_or_else(|| Error::Parse("labs(): every label needs a name".to_string()))?;
                let value = text(call, &arg.value)?;
                match key {
                    "title" => labels.title = Some(value),
                    "subtitle" => labels.subtitle = Some(value),
                    "caption" => labels.caption = Some(value),
                    "tag" => labels.tag = Some(value),
                    other => {
                        let aes = aes_named(call, other)?;
                        labels.aesthetics.insert(aes.family(), value);
                    }
                }
            }
        }
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::args::parse_call;

    fn labels(input: &str) -> Result<Labels> {
        let (_, call) = parse_call(input).unwrap();
        build_labels(&call)
    }

    #[test]
    fn test_labs() {
        let l = labels("labs(title: \"Fuel\", x: \"Displacement\", colour: \"Class\", caption: \"mpg\")").unwrap();
        assert_eq!(l.title.as_deref(), Some("Fuel"));
        assert_eq!(l.caption.as_deref(), Some("mpg"));
        assert_eq!(l.for_aes(Aes::X), Some("Displacement"));
        assert_eq!(l.for_aes(Aes::Colour), Some("Class"));
    }

    #[test]
    fn test_shorthands() {
        assert_eq!(labels("ggtitle(\"T\", subtitle: \"S\")").unwrap().subtitle.as_deref(), Some("S"));
        assert_eq!(labels("ylab(\"Highway\")").unwrap().for_aes(Aes::Y), Some("Highway"));
        assert!(labels("xlab()").is_err());
        assert!(labels("labs(\"untitled\")").is_err());
        assert!(labels("labs(wobble: \"x\")").is_err());
    }
}
