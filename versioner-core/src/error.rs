//! Error types for versioner-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, with the path that caused it.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// None of the accepted timestamp encodings matched.
    #[error("unrecognised timestamp format: {raw:?}")]
    MalformedTimestamp { raw: String },

    /// The run cannot start: nothing to extract from, or inputs are missing.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
