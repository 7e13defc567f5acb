//! `versioner extract`: reconcile one source type's objects against the tree.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use versioner_core::{
    config::{config_search_path, load_config_at, DEFAULT_CONFIG_FILE},
    types::SourceType,
    watermark::DEFAULT_WATERMARK_FILE,
    RunConfigBuilder,
};
use versioner_renderer::Renderer;
use versioner_sync::{
    pipeline::{self, RunSummary, UnitKind, UnitSummary, WatermarkUpdate},
    Action, SnapshotSource,
};

use crate::SourceTypeArg;

/// Arguments for `versioner extract`.
#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Source type: fabric or onprem.
    #[arg(long = "type", value_name = "TYPE")]
    pub source_type: SourceTypeArg,

    /// Config file (falls back to the user config directory).
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Root of the version-controlled tree.
    #[arg(long, default_value = ".")]
    pub repo_root: PathBuf,

    /// Watermark store.
    #[arg(long, default_value = DEFAULT_WATERMARK_FILE)]
    pub watermark_file: PathBuf,

    /// Directory of exported catalog rows to read from.
    #[arg(long, value_name = "DIR", default_value = "snapshot")]
    pub snapshot: PathBuf,

    /// Single server (Fabric endpoint, or an extra on-prem server).
    #[arg(long)]
    pub server: Option<String>,

    /// On-prem servers; replaces the configured list.
    #[arg(long, num_args = 1..)]
    pub servers: Vec<String>,

    /// Single database.
    #[arg(long)]
    pub database: Option<String>,

    /// Comma-separated database list.
    #[arg(long)]
    pub databases: Option<String>,

    /// File with one database name per line.
    #[arg(long)]
    pub databases_file: Option<PathBuf>,

    /// Visit every online user database on each server.
    #[arg(long)]
    pub all_databases: bool,

    /// Prefix each script with a guarded DROP statement.
    #[arg(long)]
    pub include_drop: bool,

    /// Prefix each script with a comment header.
    #[arg(long)]
    pub header: bool,

    /// Also export SQL Agent jobs (on-prem only).
    #[arg(long)]
    pub include_sql_agent_jobs: bool,

    /// Directory of `.tera` templates overriding the built-in ones.
    #[arg(long, value_name = "DIR")]
    pub templates: Option<PathBuf>,

    /// Report what would be written without touching files or the watermark.
    #[arg(long)]
    pub dry_run: bool,

    /// With --dry-run, print a unified diff for every file that would change.
    #[arg(long, requires = "dry_run")]
    pub diff: bool,

    /// Emit the run summary as JSON.
    #[arg(long)]
    pub json: bool,
}

impl ExtractArgs {
    pub fn run(self, verbose: bool) -> Result<()> {
        let source_type: SourceType = self.source_type.into();
        let config_path = config_search_path(&self.config);
        let file = load_config_at(&config_path)
            .with_context(|| format!("failed to load config {}", config_path.display()))?;

        let mut builder = RunConfigBuilder::new(source_type);
        builder.repo_root = self.repo_root;
        builder.watermark_path = self.watermark_file;
        builder.server = self.server;
        builder.servers = self.servers;
        builder.database = self.database;
        builder.databases = self.databases;
        builder.databases_file = self.databases_file;
        builder.all_databases = self.all_databases;
        builder.include_drop = self.include_drop;
        builder.include_header = self.header;
        builder.include_agent_jobs = self.include_sql_agent_jobs;
        builder.dry_run = self.dry_run;
        builder.collect_diffs = self.diff;
        let config = builder
            .resolve(&file)
            .with_context(|| format!("invalid {source_type} extraction settings"))?;

        let renderer = Renderer::with_template_dir(self.templates.as_deref())
            .context("failed to load templates")?;
        let mut source = SnapshotSource::new(self.snapshot);

        let summary = pipeline::run(&config, &mut source, &renderer);

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("failed to serialize run summary")?
            );
            return Ok(());
        }

        print_summary(&summary, config.dry_run, verbose);
        Ok(())
    }
}

fn print_summary(summary: &RunSummary, dry_run: bool, verbose: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };

    for unit in &summary.units {
        print_unit(unit, prefix, verbose);
    }

    println!(
        "{prefix}Total changed: {}, skipped: {}",
        summary.changed, summary.skipped
    );

    match &summary.watermark {
        WatermarkUpdate::Unchanged { at } => {
            println!("{prefix}Watermark unchanged at {}", at.to_rfc3339())
        }
        WatermarkUpdate::DryRun { would_be } => {
            println!("{prefix}Watermark would advance to {}", would_be.to_rfc3339())
        }
        WatermarkUpdate::Advanced { to, .. } => {
            println!("Watermark advanced to {}", to.to_rfc3339())
        }
        WatermarkUpdate::Failed { error } => {
            println!("{} {error}", "Watermark not updated:".red())
        }
    }
}

fn print_unit(unit: &UnitSummary, prefix: &str, verbose: bool) {
    let scope = match (&unit.database, unit.kind) {
        (Some(db), _) => format!("{}/{db}", unit.server),
        (None, UnitKind::AgentJobs) => format!("{}/agent jobs", unit.server),
        (None, UnitKind::Objects) => unit.server.clone(),
    };

    if let Some(error) = &unit.error {
        println!("{prefix}{} [{scope}] {error}", "✗".red());
        return;
    }
    println!(
        "{prefix}{} [{scope}] {} changed, {} skipped",
        "✓".green(),
        unit.changed,
        unit.skipped
    );

    for entry in &unit.entries {
        let shown = entry
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| entry.label.clone());
        match &entry.action {
            Action::Written => println!("  ✎  {shown}"),
            Action::WouldWrite { diff } => {
                println!("  ~  {shown}");
                if let Some(diff) = diff {
                    print!("{diff}");
                    if !diff.ends_with('\n') {
                        println!();
                    }
                }
            }
            Action::Unchanged if verbose => println!("  ·  {shown}"),
            Action::Skipped(reason) if verbose => {
                println!("  {}  {} ({reason})", "-".bright_black(), entry.label)
            }
            Action::Failed { error } => println!("  {}  {}: {error}", "✗".red(), entry.label),
            _ => {}
        }
    }
}
