//! Reconciliation results shared by the object and agent-job reconcilers.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use versioner_core::{parse_timestamp, RawTimestamp, RunConfig};

use crate::{diff, store};

/// Per-run rendering and write switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub include_drop: bool,
    pub include_header: bool,
    pub dry_run: bool,
    /// Dry-run only: attach a unified diff to every would-be write.
    pub collect_diffs: bool,
}

impl ReconcileOptions {
    pub fn from_config(config: &RunConfig) -> Self {
        ReconcileOptions {
            include_drop: config.include_drop,
            include_header: config.include_header,
            dry_run: config.dry_run,
            collect_diffs: config.collect_diffs,
        }
    }
}

/// Why a candidate was not written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Not a view or procedure.
    UnsupportedKind { object_type: String },
    /// Definition absent or empty (encrypted or not visible).
    NoDefinition,
    /// File exists and the object is not newer than the watermark.
    NotModified {
        modified: DateTime<Utc>,
        last_run: DateTime<Utc>,
    },
    /// File exists and the modification time could not be decoded.
    UnknownModified,
    /// Another job in this run already claimed the same file name.
    NameCollision { other: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnsupportedKind { object_type } => {
                write!(f, "object type '{}' not exported", object_type.trim())
            }
            SkipReason::NoDefinition => f.write_str("no definition or encrypted"),
            SkipReason::NotModified { modified, last_run } => write!(
                f,
                "modified {} <= last run {}",
                modified.to_rfc3339(),
                last_run.to_rfc3339()
            ),
            SkipReason::UnknownModified => f.write_str("unable to determine modification time"),
            SkipReason::NameCollision { other } => {
                write!(f, "file name already used by job {other}")
            }
        }
    }
}

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Written,
    /// Dry-run: content differs from disk.
    WouldWrite {
        #[serde(skip_serializing_if = "Option::is_none")]
        diff: Option<String>,
    },
    /// Rendered content is byte-identical to the file on disk.
    Unchanged,
    Skipped(SkipReason),
    /// Rendering or writing failed; the run carried on.
    Failed { error: String },
}

impl Action {
    /// Counts towards `changed` (otherwise `skipped`).
    pub fn is_change(&self) -> bool {
        matches!(self, Action::Written | Action::WouldWrite { .. })
    }
}

/// One candidate object or job and its fate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(flatten)]
    pub action: Action,
}

/// Totals for one reconciled unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub changed: usize,
    pub skipped: usize,
    /// Max decoded modification time seen, seeded with the watermark.
    pub max_modified_seen: DateTime<Utc>,
    pub entries: Vec<Entry>,
}

impl ReconcileOutcome {
    pub fn new(last_run: DateTime<Utc>) -> Self {
        ReconcileOutcome {
            changed: 0,
            skipped: 0,
            max_modified_seen: last_run,
            entries: Vec::new(),
        }
    }

    pub(crate) fn observe(&mut self, modified: DateTime<Utc>) {
        if modified > self.max_modified_seen {
            self.max_modified_seen = modified;
        }
    }

    pub(crate) fn record(&mut self, label: String, path: Option<PathBuf>, action: Action) {
        if action.is_change() {
            self.changed += 1;
        } else {
            self.skipped += 1;
        }
        self.entries.push(Entry { label, path, action });
    }
}

/// A catalog modification time after decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Modified {
    Known(DateTime<Utc>),
    Unknown,
}

impl Modified {
    pub(crate) fn decode(raw: Option<&RawTimestamp>, label: &str) -> Modified {
        match raw.map(parse_timestamp) {
            Some(Ok(dt)) => Modified::Known(dt),
            Some(Err(e)) => {
                tracing::debug!("{label}: {e}");
                Modified::Unknown
            }
            None => Modified::Unknown,
        }
    }

    /// Skip policy for a destination that already exists: rewrite only on
    /// evidence of a change strictly after the watermark.
    pub(crate) fn skip_existing(self, last_run: DateTime<Utc>) -> Option<SkipReason> {
        match self {
            Modified::Unknown => Some(SkipReason::UnknownModified),
            Modified::Known(modified) if modified <= last_run => {
                Some(SkipReason::NotModified { modified, last_run })
            }
            Modified::Known(_) => None,
        }
    }
}

/// Hand rendered content to the content store (or, in dry-run, compare only).
pub(crate) fn apply(
    path: &Path,
    content: &str,
    options: &ReconcileOptions,
    display_root: &Path,
) -> Action {
    if options.dry_run {
        return match store::is_different(path, content.as_bytes()) {
            Ok(true) => {
                let diff = if options.collect_diffs {
                    match diff::unified_diff(path, content, display_root) {
                        Ok(d) => Some(d),
                        Err(e) => {
                            tracing::warn!("diff failed for {}: {e}", path.display());
                            None
                        }
                    }
                } else {
                    None
                };
                tracing::debug!("[dry-run] would write: {}", path.display());
                Action::WouldWrite { diff }
            }
            Ok(false) => Action::Unchanged,
            Err(e) => {
                tracing::warn!("{e}");
                Action::Failed { error: e.to_string() }
            }
        };
    }

    match store::write_if_changed(path, content.as_bytes()) {
        Ok(true) => Action::Written,
        Ok(false) => Action::Unchanged,
        Err(e) => {
            tracing::warn!("{e}");
            Action::Failed { error: e.to_string() }
        }
    }
}
