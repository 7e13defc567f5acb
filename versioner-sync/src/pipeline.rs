//! Run orchestrator: walks servers × databases for one source type, reconciles
//! every unit, and commits the watermark once at the end.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use versioner_core::{watermark, DatabaseSelection, RunConfig, SourceType};
use versioner_renderer::Renderer;

use crate::{
    jobs::{reconcile_jobs, JobUnit},
    objects::{reconcile_objects, ObjectUnit},
    outcome::{Entry, ReconcileOptions, ReconcileOutcome},
    source::CatalogSource,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Objects,
    AgentJobs,
}

/// Result of one (server, database) or (server, agent jobs) unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSummary {
    pub server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub kind: UnitKind,
    pub changed: usize,
    pub skipped: usize,
    pub entries: Vec<Entry>,
    /// Set when the unit could not be read; it then counts as zero rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UnitSummary {
    fn failed(server: &str, database: Option<&str>, kind: UnitKind, error: String) -> Self {
        UnitSummary {
            server: server.to_string(),
            database: database.map(str::to_string),
            kind,
            changed: 0,
            skipped: 0,
            entries: Vec::new(),
            error: Some(error),
        }
    }

    fn from_outcome(
        server: &str,
        database: Option<&str>,
        kind: UnitKind,
        outcome: ReconcileOutcome,
    ) -> Self {
        UnitSummary {
            server: server.to_string(),
            database: database.map(str::to_string),
            kind,
            changed: outcome.changed,
            skipped: outcome.skipped,
            entries: outcome.entries,
            error: None,
        }
    }
}

/// What happened to the watermark at the end of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WatermarkUpdate {
    /// Nothing newer than the stored value was seen.
    Unchanged { at: DateTime<Utc> },
    /// Dry-run: the value a real run would have committed.
    DryRun { would_be: DateTime<Utc> },
    Advanced {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    /// The store could not be written; the next run re-reads the old value.
    Failed { error: String },
}

/// Everything a run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub source_type: SourceType,
    pub previous_watermark: DateTime<Utc>,
    pub max_modified_seen: DateTime<Utc>,
    pub changed: usize,
    pub skipped: usize,
    pub units: Vec<UnitSummary>,
    pub watermark: WatermarkUpdate,
}

impl RunSummary {
    /// Units that failed to read.
    pub fn failed_units(&self) -> impl Iterator<Item = &UnitSummary> {
        self.units.iter().filter(|u| u.error.is_some())
    }

    fn absorb(&mut self, unit: UnitSummary) {
        self.changed += unit.changed;
        self.skipped += unit.skipped;
        self.units.push(unit);
    }
}

/// Execute one extraction run.
///
/// Every unit is reconciled against the watermark read at the start of the
/// run. A unit whose source read fails is logged and treated as empty; the
/// run always reaches the watermark step. The watermark is written only when
/// not in dry-run and something strictly newer than the stored value was
/// seen.
pub fn run(config: &RunConfig, source: &mut dyn CatalogSource, renderer: &Renderer) -> RunSummary {
    let key = config.watermark_key();
    let last_run = watermark::read_watermark(&config.watermark_path, key);
    info!("{key}: last run {}", last_run.to_rfc3339());

    let options = ReconcileOptions::from_config(config);
    let mut summary = RunSummary {
        source_type: config.source_type,
        previous_watermark: last_run,
        max_modified_seen: last_run,
        changed: 0,
        skipped: 0,
        units: Vec::new(),
        watermark: WatermarkUpdate::Unchanged { at: last_run },
    };

    for server in &config.servers {
        info!("processing server {server}");

        if config.include_agent_jobs {
            let unit = match source.fetch_agent_jobs(server) {
                Ok(rows) => {
                    let job_unit = JobUnit {
                        repo_root: &config.repo_root,
                        source: config.source_type,
                        server,
                    };
                    let outcome = reconcile_jobs(&rows, &job_unit, last_run, &options, renderer);
                    summary.max_modified_seen =
                        watermark::advance(summary.max_modified_seen, outcome.max_modified_seen);
                    UnitSummary::from_outcome(server, None, UnitKind::AgentJobs, outcome)
                }
                Err(e) => {
                    error!("[{server}] agent job extraction failed: {e}");
                    UnitSummary::failed(server, None, UnitKind::AgentJobs, e.to_string())
                }
            };
            summary.absorb(unit);
        }

        let databases = match &config.databases {
            DatabaseSelection::All => match source.list_databases(server) {
                Ok(dbs) => dbs,
                Err(e) => {
                    error!("[{server}] listing databases failed: {e}");
                    summary.absorb(UnitSummary::failed(
                        server,
                        None,
                        UnitKind::Objects,
                        e.to_string(),
                    ));
                    continue;
                }
            },
            DatabaseSelection::Named(dbs) => dbs.clone(),
            DatabaseSelection::None => Vec::new(),
        };

        for database in &databases {
            info!("[{server}] processing database {database}");
            let unit = match source.fetch_objects(server, database) {
                Ok(rows) => {
                    let object_unit = ObjectUnit {
                        repo_root: &config.repo_root,
                        source: config.source_type,
                        server,
                        database,
                    };
                    let outcome =
                        reconcile_objects(&rows, &object_unit, last_run, &options, renderer);
                    summary.max_modified_seen =
                        watermark::advance(summary.max_modified_seen, outcome.max_modified_seen);
                    UnitSummary::from_outcome(
                        server,
                        Some(database.as_str()),
                        UnitKind::Objects,
                        outcome,
                    )
                }
                Err(e) => {
                    error!("[{server}] query failed for {database}: {e}");
                    UnitSummary::failed(
                        server,
                        Some(database.as_str()),
                        UnitKind::Objects,
                        e.to_string(),
                    )
                }
            };
            summary.absorb(unit);
        }
    }

    summary.watermark = commit_watermark(config, last_run, summary.max_modified_seen);
    summary
}

fn commit_watermark(
    config: &RunConfig,
    last_run: DateTime<Utc>,
    max_seen: DateTime<Utc>,
) -> WatermarkUpdate {
    if max_seen <= last_run {
        info!("no objects newer than {}; watermark unchanged", last_run.to_rfc3339());
        return WatermarkUpdate::Unchanged { at: last_run };
    }
    if config.dry_run {
        info!("[dry-run] watermark would advance to {}", max_seen.to_rfc3339());
        return WatermarkUpdate::DryRun { would_be: max_seen };
    }
    match watermark::write_watermark(&config.watermark_path, config.watermark_key(), max_seen) {
        Ok(()) => {
            info!("watermark advanced to {}", max_seen.to_rfc3339());
            WatermarkUpdate::Advanced {
                from: last_run,
                to: max_seen,
            }
        }
        Err(e) => {
            error!("failed to update watermark: {e}");
            WatermarkUpdate::Failed {
                error: e.to_string(),
            }
        }
    }
}
