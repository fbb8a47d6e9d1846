//! Error types for drvq

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("IO error on {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No training data")]
    EmptyData,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Codebook corruption: {0}")]
    Corruption(String),
}

impl Error {
    /// Attach the failing path to an IO error
    pub fn at_path(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::IoPath {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
