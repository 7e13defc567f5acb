//! Rendering failures for `.sql` object scripts and agent-job files.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// A template failed to parse (embedded or user override) or to render
    /// an object or job context.
    #[error("template error: {0}")]
    Tera(#[from] tera::Error),

    /// An object or job context could not be turned into template values.
    #[error("failed to build template context: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The override directory given with `--templates` could not be read.
    #[error("cannot read template override {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}
