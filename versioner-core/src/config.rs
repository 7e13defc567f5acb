//! Run configuration.
//!
//! A run is described by one explicit [`RunConfig`], built once at process
//! start from CLI values ([`RunConfigBuilder`]) merged with the optional YAML
//! config file ([`ConfigFile`]). Nothing downstream reads the environment.
//!
//! ```text
//! environments:
//!   fabric:
//!     servers: [xyz.datawarehouse.fabric.microsoft.com]
//!   onprem:
//!     servers: [SQL01, SQL02]
//!     extract_agent_jobs: true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::SourceType;
use crate::watermark::DEFAULT_WATERMARK_FILE;

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

/// Root of `config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub environments: Environments,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environments {
    #[serde(default)]
    pub fabric: EnvironmentConfig,
    #[serde(default)]
    pub onprem: EnvironmentConfig,
}

/// Per-source settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default)]
    pub extract_agent_jobs: bool,
}

impl ConfigFile {
    pub fn environment(&self, source: SourceType) -> &EnvironmentConfig {
        match source {
            SourceType::Fabric => &self.environments.fabric,
            SourceType::OnPrem => &self.environments.onprem,
        }
    }
}

/// Load `path`. A missing file is an empty config.
pub fn load_config_at(path: &Path) -> Result<ConfigFile, CoreError> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    if contents.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Pick the config file to load: `explicit` if present, else
/// `<user config dir>/versioner/config.yaml` if present, else `explicit`.
pub fn config_search_path(explicit: &Path) -> PathBuf {
    if explicit.exists() {
        return explicit.to_path_buf();
    }
    if let Some(user) = dirs::config_dir().map(|d| d.join("versioner").join(DEFAULT_CONFIG_FILE)) {
        if user.exists() {
            return user;
        }
    }
    explicit.to_path_buf()
}

// ---------------------------------------------------------------------------
// Resolved run config
// ---------------------------------------------------------------------------

/// Which databases to visit on each server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseSelection {
    /// Ask the server for its online user databases.
    All,
    /// A fixed list, same for every server.
    Named(Vec<String>),
    /// No object extraction (agent jobs only).
    None,
}

/// Everything a run needs, resolved up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub source_type: SourceType,
    pub repo_root: PathBuf,
    pub watermark_path: PathBuf,
    pub servers: Vec<String>,
    pub databases: DatabaseSelection,
    pub include_drop: bool,
    pub include_header: bool,
    pub include_agent_jobs: bool,
    pub dry_run: bool,
    pub collect_diffs: bool,
}

impl RunConfig {
    /// Watermark key for this run's source.
    pub fn watermark_key(&self) -> &'static str {
        self.source_type.watermark_key()
    }
}

/// CLI-side inputs, merged with a [`ConfigFile`] by [`RunConfigBuilder::resolve`].
#[derive(Debug, Clone)]
pub struct RunConfigBuilder {
    pub source_type: SourceType,
    pub repo_root: PathBuf,
    pub watermark_path: PathBuf,
    pub server: Option<String>,
    pub servers: Vec<String>,
    pub database: Option<String>,
    pub databases: Option<String>,
    pub databases_file: Option<PathBuf>,
    pub all_databases: bool,
    pub include_drop: bool,
    pub include_header: bool,
    pub include_agent_jobs: bool,
    pub dry_run: bool,
    pub collect_diffs: bool,
}

impl RunConfigBuilder {
    pub fn new(source_type: SourceType) -> Self {
        RunConfigBuilder {
            source_type,
            repo_root: PathBuf::from("."),
            watermark_path: PathBuf::from(DEFAULT_WATERMARK_FILE),
            server: None,
            servers: vec![],
            database: None,
            databases: None,
            databases_file: None,
            all_databases: false,
            include_drop: false,
            include_header: false,
            include_agent_jobs: false,
            dry_run: false,
            collect_diffs: false,
        }
    }

    /// Merge with `file` and validate. Fails only when no extraction could start.
    pub fn resolve(self, file: &ConfigFile) -> Result<RunConfig, CoreError> {
        let env = file.environment(self.source_type);

        let mut servers = Vec::new();
        match self.source_type {
            SourceType::Fabric => {
                if let Some(s) = &self.server {
                    servers.push(s.clone());
                } else {
                    servers.extend(env.servers.iter().cloned());
                }
            }
            SourceType::OnPrem => {
                if self.servers.is_empty() {
                    servers.extend(env.servers.iter().cloned());
                } else {
                    servers.extend(self.servers.iter().cloned());
                }
                servers.extend(self.server.iter().cloned());
            }
        }
        let servers = dedup_keep_first(servers);
        if servers.is_empty() {
            return Err(CoreError::Config(format!(
                "no server specified for {}; use --server{} or list servers under environments.{}.servers in the config file",
                self.source_type,
                if self.source_type == SourceType::OnPrem { "/--servers" } else { "" },
                self.source_type.config_key(),
            )));
        }

        let databases = if let Some(path) = &self.databases_file {
            let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
            DatabaseSelection::Named(split_names(contents.lines()))
        } else if let Some(list) = &self.databases {
            DatabaseSelection::Named(split_names(list.split(',')))
        } else if self.all_databases {
            DatabaseSelection::All
        } else if let Some(db) = &self.database {
            DatabaseSelection::Named(split_names(std::iter::once(db.as_str())))
        } else {
            DatabaseSelection::None
        };
        let databases = match databases {
            DatabaseSelection::Named(names) if names.is_empty() => DatabaseSelection::None,
            other => other,
        };

        let include_agent_jobs = self.source_type == SourceType::OnPrem
            && (self.include_agent_jobs || env.extract_agent_jobs);

        if databases == DatabaseSelection::None && !include_agent_jobs {
            return Err(CoreError::Config(
                "no database selected; use --database, --databases, --databases-file or --all-databases"
                    .to_string(),
            ));
        }

        Ok(RunConfig {
            source_type: self.source_type,
            repo_root: self.repo_root,
            watermark_path: self.watermark_path,
            servers,
            databases,
            include_drop: self.include_drop,
            include_header: self.include_header,
            include_agent_jobs,
            dry_run: self.dry_run,
            collect_diffs: self.collect_diffs,
        })
    }
}

fn split_names<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    dedup_keep_first(
        items
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn dedup_keep_first(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|s| seen.insert(s.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn onprem_file() -> ConfigFile {
        serde_yaml::from_str(
            "environments:\n  onprem:\n    servers: [SQL01, SQL02]\n    extract_agent_jobs: true\n",
        )
        .expect("config")
    }

    #[test]
    fn missing_config_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let cfg = load_config_at(&tmp.path().join("config.yaml")).unwrap();
        assert_eq!(cfg, ConfigFile::default());
    }

    #[test]
    fn malformed_config_file_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "environments: [unclosed").unwrap();
        let err = load_config_at(&path).unwrap_err();
        assert!(matches!(err, CoreError::Parse { .. }));
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn fabric_cli_server_overrides_config() {
        let file: ConfigFile =
            serde_yaml::from_str("environments:\n  fabric:\n    servers: [cfg-server]\n").unwrap();
        let mut b = RunConfigBuilder::new(SourceType::Fabric);
        b.server = Some("cli-server".into());
        b.database = Some("Sales".into());
        let cfg = b.resolve(&file).unwrap();
        assert_eq!(cfg.servers, vec!["cli-server".to_string()]);
        assert_eq!(cfg.databases, DatabaseSelection::Named(vec!["Sales".into()]));
        assert!(!cfg.include_agent_jobs);
    }

    #[test]
    fn onprem_merges_and_dedups_servers() {
        let mut b = RunConfigBuilder::new(SourceType::OnPrem);
        b.server = Some("SQL01".into());
        let cfg = b.resolve(&onprem_file()).unwrap();
        assert_eq!(cfg.servers, vec!["SQL01".to_string(), "SQL02".to_string()]);
        assert_eq!(cfg.databases, DatabaseSelection::None);
        assert!(cfg.include_agent_jobs, "config enables agent jobs");
    }

    #[test]
    fn no_server_is_config_error() {
        let mut b = RunConfigBuilder::new(SourceType::Fabric);
        b.all_databases = true;
        let err = b.resolve(&ConfigFile::default()).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)), "got: {err}");
    }

    #[test]
    fn nothing_to_extract_is_config_error() {
        let mut b = RunConfigBuilder::new(SourceType::Fabric);
        b.server = Some("s".into());
        assert!(matches!(
            b.resolve(&ConfigFile::default()),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn database_selection_priority() {
        let tmp = TempDir::new().unwrap();
        let list = tmp.path().join("dbs.txt");
        std::fs::write(&list, "A\n\n B \nA\n").unwrap();

        let mut b = RunConfigBuilder::new(SourceType::Fabric);
        b.server = Some("s".into());
        b.databases_file = Some(list);
        b.databases = Some("X,Y".into());
        b.all_databases = true;
        let cfg = b.clone().resolve(&ConfigFile::default()).unwrap();
        assert_eq!(cfg.databases, DatabaseSelection::Named(vec!["A".into(), "B".into()]));

        b.databases_file = None;
        let cfg = b.clone().resolve(&ConfigFile::default()).unwrap();
        assert_eq!(cfg.databases, DatabaseSelection::Named(vec!["X".into(), "Y".into()]));

        b.databases = None;
        let cfg = b.resolve(&ConfigFile::default()).unwrap();
        assert_eq!(cfg.databases, DatabaseSelection::All);
    }

    #[test]
    fn fabric_never_extracts_agent_jobs() {
        let mut b = RunConfigBuilder::new(SourceType::Fabric);
        b.server = Some("s".into());
        b.all_databases = true;
        b.include_agent_jobs = true;
        assert!(!b.resolve(&ConfigFile::default()).unwrap().include_agent_jobs);
    }
}
