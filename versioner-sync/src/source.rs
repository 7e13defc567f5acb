//! The seam to the database layer.
//!
//! [`CatalogSource`] is what the orchestrator talks to; connecting to SQL
//! Server lives behind it. [`SnapshotSource`] serves catalog rows that were
//! exported to YAML, which is how runs are replayed offline and tested.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use versioner_core::{paths::sanitize_filename, CatalogRow, JobStepRow};

/// Failures from a [`CatalogSource`]. The orchestrator logs them and moves on
/// to the next unit.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot connect to {server}: {message}")]
    Connect { server: String, message: String },

    #[error("query failed on {server}/{database}: {message}")]
    Query {
        server: String,
        database: String,
        message: String,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Where catalog rows come from.
pub trait CatalogSource {
    /// Online user databases on `server`, in the order to visit them.
    fn list_databases(&mut self, server: &str) -> Result<Vec<String>, SourceError>;

    /// View and procedure rows for one database.
    fn fetch_objects(&mut self, server: &str, database: &str)
        -> Result<Vec<CatalogRow>, SourceError>;

    /// Flattened job × step rows from the server's job catalog.
    fn fetch_agent_jobs(&mut self, server: &str) -> Result<Vec<JobStepRow>, SourceError>;
}

const OBJECTS_SUFFIX: &str = ".objects.yaml";
const AGENT_JOBS_FILE: &str = "agent_jobs.yaml";

/// Catalog rows exported to YAML:
///
/// ```text
/// <root>/<server>/<database>.objects.yaml   # list of catalog rows
/// <root>/<server>/agent_jobs.yaml           # list of job × step rows
/// ```
///
/// Server directory names go through [`sanitize_filename`]. A missing server
/// directory reads as an unreachable server.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    root: PathBuf,
}

impl SnapshotSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SnapshotSource { root: root.into() }
    }

    fn server_dir(&self, server: &str) -> Result<PathBuf, SourceError> {
        let dir = self.root.join(sanitize_filename(server));
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(SourceError::Connect {
                server: server.to_string(),
                message: format!("no snapshot directory at {}", dir.display()),
            })
        }
    }
}

impl CatalogSource for SnapshotSource {
    fn list_databases(&mut self, server: &str) -> Result<Vec<String>, SourceError> {
        let dir = self.server_dir(server)?;
        let entries = std::fs::read_dir(&dir).map_err(|source| SourceError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SourceError::Io {
                path: dir.clone(),
                source,
            })?;
            let file_name = entry.file_name();
            if let Some(db) = file_name.to_str().and_then(|n| n.strip_suffix(OBJECTS_SUFFIX)) {
                if !db.is_empty() {
                    names.push(db.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn fetch_objects(
        &mut self,
        server: &str,
        database: &str,
    ) -> Result<Vec<CatalogRow>, SourceError> {
        let path = self
            .server_dir(server)?
            .join(format!("{database}{OBJECTS_SUFFIX}"));
        match read_rows(&path)? {
            Some(rows) => Ok(rows),
            None => Err(SourceError::Query {
                server: server.to_string(),
                database: database.to_string(),
                message: "database not found".to_string(),
            }),
        }
    }

    fn fetch_agent_jobs(&mut self, server: &str) -> Result<Vec<JobStepRow>, SourceError> {
        let path = self.server_dir(server)?.join(AGENT_JOBS_FILE);
        Ok(read_rows(&path)?.unwrap_or_default())
    }
}

/// `None` when the file does not exist; an empty file is an empty list.
fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Option<Vec<T>>, SourceError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SourceError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if raw.trim().is_empty() {
        return Ok(Some(Vec::new()));
    }
    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(|source| SourceError::Parse {
            path: path.to_path_buf(),
            source,
        })
}
