//! Versioner: incremental SQL Server metadata export CLI.
//!
//! # Usage
//!
//! ```text
//! versioner extract --type fabric|onprem [--server S] [--servers S..] [--database D]
//!                   [--databases A,B] [--databases-file F] [--all-databases]
//!                   [--include-drop] [--header] [--include-sql-agent-jobs]
//!                   [--snapshot DIR] [--templates DIR] [--dry-run] [--diff] [--json]
//! versioner watermark show [--watermark-file F] [--json]
//! ```

mod commands;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{extract::ExtractArgs, watermark::WatermarkCommand};
use versioner_core::types::SourceType;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "versioner",
    version,
    about = "Export SQL Server views, procedures and agent jobs into a version-controlled tree",
    long_about = None,
)]
struct Cli {
    /// Log at debug level (per-object decisions).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract changed objects for one source type and advance its watermark.
    Extract(ExtractArgs),

    /// Inspect the watermark store.
    Watermark {
        #[command(subcommand)]
        command: WatermarkCommand,
    },
}

// ---------------------------------------------------------------------------
// Shared SourceType argument: parsed from CLI strings, converts to core type
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse `SourceType` from CLI args.
#[derive(Debug, Clone, Copy)]
pub struct SourceTypeArg(pub SourceType);

impl FromStr for SourceTypeArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fabric" => Ok(Self(SourceType::Fabric)),
            "onprem" | "on-prem" => Ok(Self(SourceType::OnPrem)),
            other => Err(format!(
                "unknown source type '{other}'; expected: fabric, onprem"
            )),
        }
    }
}

impl fmt::Display for SourceTypeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<SourceTypeArg> for SourceType {
    fn from(s: SourceTypeArg) -> Self {
        s.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Extract(args) => args.run(cli.verbose),
        Commands::Watermark { command } => commands::watermark::run(command),
    }
}
