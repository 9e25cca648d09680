//! Error types for the plot build pipeline.

use std::io;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage a failure or diagnostic originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolve,
    Layout,
    PreStat,
    Scale,
    Stat,
    PostStat,
    Position,
    Geom,
    Guide,
    Compose,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Resolve => "resolve",
            Stage::Layout => "layout",
            Stage::PreStat => "pre-stat mapping",
            Stage::Scale => "scale",
            Stage::Stat => "stat",
            Stage::PostStat => "post-stat mapping",
            Stage::Position => "position",
            Stage::Geom => "geom",
            Stage::Guide => "guide",
            Stage::Compose => "compose",
        };
        f.write_str(name)
    }
}

/// Errors that abort a plot build.
#[derive(Error, Debug)]
pub enum Error {
    /// Resolved layer data is not a table of named columns.
    #[error("data shape error: {0}")]
    DataShape(String),

    /// An aesthetic expression references a column that does not exist at this stage.
    #[error("cannot evaluate aesthetic '{aesthetic}' = {expression} during {stage}: {reason}")]
    AestheticEval {
        /// Aesthetic being mapped.
        aesthetic: String,
        /// Source form of the unresolved expression.
        expression: String,
        /// Stage the evaluation was attempted in.
        stage: Stage,
        /// What went wrong.
        reason: String,
    },

    /// A value cannot be placed in its scale's domain.
    #[error("scale domain error on '{aesthetic}': {reason}")]
    ScaleDomain {
        /// Aesthetic family of the scale.
        aesthetic: String,
        /// Offending value or constraint.
        reason: String,
    },

    /// A statistic could not run for a whole layer.
    #[error("stat '{stat}' failed: {reason}")]
    StatComputation {
        /// Stat name.
        stat: String,
        /// Failure description.
        reason: String,
    },

    /// Two scales share a guide merge key but disagree on the legend content.
    #[error("guides sharing merge key '{key}' conflict: {reason}")]
    GuideMergeConflict {
        /// Shared merge key.
        key: String,
        /// Disagreement description.
        reason: String,
    },

    /// DSL parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Draw-primitive executor failure.
    #[error("rendering error: {0}")]
    Render(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// CSV decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding/decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn stat(stat: &str, reason: impl Into<String>) -> Self {
        Error::StatComputation {
            stat: stat.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn domain(aesthetic: &str, reason: impl Into<String>) -> Self {
        Error::ScaleDomain {
            aesthetic: aesthetic.to_string(),
            reason: reason.into(),
        }
    }
}

/// A recoverable problem surfaced alongside a successful build.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Diagnostic {
    pub stage: Stage,
    /// Index of the layer concerned, if any.
    pub layer: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, layer: Option<usize>, message: impl Into<String>) -> Self {
        let diagnostic = Diagnostic {
            stage,
            layer,
            message: message.into(),
        };
        log::warn!("{}", diagnostic);
        diagnostic
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.layer {
            Some(layer) => write!(f, "[{} / layer {}] {}", self.stage, layer + 1, self.message),
            None => write!(f, "[{}] {}", self.stage, self.message),
        }
    }
}
