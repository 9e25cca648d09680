// Grammar-of-graphics DSL parser

pub mod aesthetics;
pub mod args;
pub mod ast;
pub mod coord;
pub mod facet;
pub mod geom;
pub mod labels;
pub mod lexer;
pub mod pipeline;
pub mod scale;
pub mod theme;

// Public API re-exports
pub use ast::PlotSpec;
pub use pipeline::parse_plot_spec;
