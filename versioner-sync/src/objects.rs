//! Object reconciler: decides, per view or procedure, whether to write, skip
//! or leave unchanged, and tracks the newest modification time seen.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use versioner_core::{paths, CatalogRow, ObjectKind, SourceType};
use versioner_renderer::{ObjectContext, Renderer};

use crate::outcome::{apply, Action, Modified, ReconcileOptions, ReconcileOutcome, SkipReason};

/// The (server, database) pair whose rows are being reconciled.
#[derive(Debug, Clone, Copy)]
pub struct ObjectUnit<'a> {
    pub repo_root: &'a Path,
    pub source: SourceType,
    pub server: &'a str,
    pub database: &'a str,
}

/// Reconcile one database's catalog rows against the destination tree.
///
/// Rows are processed in order; a failure on one row is recorded as
/// [`Action::Failed`] and never stops the rest.
pub fn reconcile_objects(
    rows: &[CatalogRow],
    unit: &ObjectUnit<'_>,
    last_run: DateTime<Utc>,
    options: &ReconcileOptions,
    renderer: &Renderer,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::new(last_run);
    debug!(
        "[{}] {} rows from database {}",
        unit.server,
        rows.len(),
        unit.database
    );

    for row in rows {
        let label = row.qualified_name();
        let modified = Modified::decode(row.modified_at.as_ref(), &label);
        if let Modified::Known(dt) = modified {
            outcome.observe(dt);
        }

        let Some(kind) = ObjectKind::from_type_code(&row.object_type) else {
            debug!("SKIP: {label} - object type '{}' not exported", row.object_type.trim());
            let reason = SkipReason::UnsupportedKind {
                object_type: row.object_type.trim().to_string(),
            };
            outcome.record(label, None, Action::Skipped(reason));
            continue;
        };

        let definition = match row.definition.as_deref() {
            Some(d) if !d.is_empty() => d,
            _ => {
                debug!("SKIP: {label} - no definition or encrypted");
                outcome.record(label, None, Action::Skipped(SkipReason::NoDefinition));
                continue;
            }
        };

        let dest = paths::object_path(
            unit.repo_root,
            unit.source,
            unit.database,
            kind,
            &row.schema,
            &row.name,
        );

        if dest.exists() {
            if let Some(reason) = modified.skip_existing(last_run) {
                debug!("SKIP: {label} - {reason}");
                outcome.record(label, Some(dest), Action::Skipped(reason));
                continue;
            }
        } else {
            debug!("NEW: {label} - file doesn't exist, will be added");
        }

        let ctx = ObjectContext {
            server: unit.server.to_string(),
            database: unit.database.to_string(),
            schema: row.schema.clone(),
            name: row.name.clone(),
            kind,
            modified: row.modified_at.as_ref().map(|m| m.to_string()),
            definition: definition.to_string(),
            include_header: options.include_header,
            include_drop: options.include_drop,
        };
        let action = match renderer.render_object(&ctx) {
            Ok(content) => apply(&dest, &content, options, unit.repo_root),
            Err(e) => {
                tracing::warn!("{label}: {e}");
                Action::Failed { error: e.to_string() }
            }
        };
        match &action {
            Action::Written => info!("WROTE: {}", dest.display()),
            Action::WouldWrite { .. } => info!("[dry-run] WOULD WRITE: {}", dest.display()),
            Action::Unchanged => debug!("UNCHANGED: {}", dest.display()),
            _ => {}
        }
        outcome.record(label, Some(dest), action);
    }

    outcome
}
