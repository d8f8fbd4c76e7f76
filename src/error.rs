use std::{io, path::PathBuf};
use thiserror::Error;

/// Failures of the loading and statistics core.
///
/// The binary layer wraps these into `anyhow` errors with context about the
/// file or step being processed.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("no inflammation data {ext} files found in path {dir:?}")]
    NoDataFound { dir: PathBuf, ext: &'static str },

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    Shape(String),

    #[error("table has no subjects to reduce")]
    Empty,

    #[error("unsupported data file format: {0:?}")]
    UnsupportedFormat(String),

    #[error("invalid file pattern")]
    Pattern(#[from] glob::PatternError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn parse<P: Into<PathBuf>, S: ToString>(path: P, reason: S) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
