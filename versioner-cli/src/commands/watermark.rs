//! `versioner watermark`: inspect the per-source watermark store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use versioner_core::watermark::{self, DEFAULT_WATERMARK_FILE};

#[derive(Subcommand, Debug)]
pub enum WatermarkCommand {
    /// Show every stored watermark.
    Show(ShowArgs),
}

/// Arguments for `versioner watermark show`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Watermark store.
    #[arg(long, default_value = DEFAULT_WATERMARK_FILE)]
    pub watermark_file: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize, Tabled)]
struct WatermarkRow {
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "last run")]
    last_run: String,
    #[tabled(rename = "status")]
    status: String,
}

pub fn run(command: WatermarkCommand) -> Result<()> {
    match command {
        WatermarkCommand::Show(args) => show(args),
    }
}

fn show(args: ShowArgs) -> Result<()> {
    let entries = watermark::read_all(&args.watermark_file).with_context(|| {
        format!(
            "failed to read watermark store {}",
            args.watermark_file.display()
        )
    })?;

    let rows: Vec<WatermarkRow> = entries
        .into_iter()
        .map(|(source, value)| match value {
            Ok(ts) => WatermarkRow {
                source,
                last_run: ts.to_rfc3339(),
                status: "ok".to_string(),
            },
            Err(e) => WatermarkRow {
                source,
                last_run: watermark::epoch_sentinel().to_rfc3339(),
                status: format!("unreadable ({e})"),
            },
        })
        .collect();

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).context("failed to serialize watermarks")?
        );
        return Ok(());
    }

    if rows.is_empty() {
        println!(
            "No watermarks recorded in {}; the next run starts from {}.",
            args.watermark_file.display(),
            watermark::epoch_sentinel().to_rfc3339()
        );
        return Ok(());
    }

    println!("{}", args.watermark_file.display().to_string().bold());
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}
