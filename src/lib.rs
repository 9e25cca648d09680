// Library exports for ggbuild

pub mod data;
pub mod error;
pub mod graph;
pub mod palette;
pub mod parser;
pub mod preprocessor;
pub mod runtime;

// Build pipeline
pub mod aes;
pub mod compositor;
pub mod coord;
pub mod geom;
pub mod guide;
pub mod ir;
pub mod layout;
pub mod mapper;
pub mod position;
pub mod resolve;
pub mod scale;
pub mod stat;
pub mod theme_resolve;
pub mod trans;

pub use data::{RowTable, Value};
pub use error::{Diagnostic, Error, Result};
pub use parser::{parse_plot_spec, PlotSpec};
pub use runtime::{build_plot, render_plot, BuiltPlot, Rendered};

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Svg,
    /// The drawing primitive tree as JSON
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderOptions {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default, rename = "type", alias = "format")]
    pub format: OutputFormat,
}

fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 600 }

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            format: OutputFormat::Png,
        }
    }
}
