// Coordinate system components.

use super::args::Call;
use super::ast::{CoordSystem, Theta};
use crate::error::{Error, Result};
use crate::trans::Transform;

pub fn is_coord(name: &str) -> bool {
    name.starts_with("coord_")
}

fn transform(call: &Call, key: &str) -> Result<Transform> {
    match call.string(key)? {
        Some(name) => Transform::from_name(&name)
            .ok_or_else(|| Error::Parse(format!("{}(): unknown transform '{}'", call.name, name))),
        None => Ok(Transform::Identity),
    }
}

pub fn build_coord(call: &Call) -> Result<CoordSystem> {
    match call.name.as_str() {
        "coord_cartesian" => {
            call.check(&["xlim", "ylim", "expand"], 0)?;
            Ok(CoordSystem::Cartesian {
                xlim: call.pair("xlim")?,
                ylim: call.pair("ylim")?,
                expand: call.flag("expand")?.unwrap_or(true),
            })
        }
        "coord_flip" => {
            call.check(&[], 0)?;
            Ok(CoordSystem::Flip)
        }
        "coord_polar" => {
            call.check(&["theta", "start", "direction"], 0)?;
            let theta = match call.string("theta")? {
                Some(name) => Theta::from_name(&name)
                    .ok_or_else(|| Error::Parse(format!("coord_polar(): theta must be \"x\" or \"y\", got '{}'", name)))?,
                None => Theta::X,
            };
            let direction = call.num("direction")?.unwrap_or(1.0);
            if direction != 1.0 && direction != -1.0 {
                return Err(Error::Parse("coord_polar(): direction must be 1 or -1".to_string()));
            }
            Ok(CoordSystem::Polar {
                theta,
                start: call.num("start")?.unwrap_or(0.0),
                direction,
            })
        }
        "coord_trans" => {
            call.check(&["x", "y"], 0)?;
            Ok(CoordSystem::Trans {
                x: transform(call, "x")?,
                y: transform(call, "y")?,
            })
        }
        other => Err(Error::Parse(format!("unknown coordinate system '{}'", other))),
    }
}
