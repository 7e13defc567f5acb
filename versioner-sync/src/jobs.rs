//! Agent-job reconciler: groups flattened job × step rows into
//! [`JobRecord`]s and applies the object skip policy at job granularity.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use versioner_core::{paths, JobRecord, JobStepRow, SourceType, StepRecord};
use versioner_renderer::Renderer;

use crate::outcome::{apply, Action, Modified, ReconcileOptions, ReconcileOutcome, SkipReason};

/// The server whose SQL Agent jobs are being reconciled.
#[derive(Debug, Clone, Copy)]
pub struct JobUnit<'a> {
    pub repo_root: &'a Path,
    pub source: SourceType,
    pub server: &'a str,
}

/// Group rows by job id in first-seen order. The first row of a job supplies
/// its header fields; every row with a step id contributes one step. Steps
/// are sorted by step id.
pub fn group_jobs(rows: &[JobStepRow]) -> Vec<JobRecord> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut jobs: Vec<JobRecord> = Vec::new();

    for row in rows {
        let slot = *index.entry(row.job_id.0.as_str()).or_insert_with(|| {
            jobs.push(JobRecord::from_header(row));
            jobs.len() - 1
        });
        if let Some(step) = StepRecord::from_row(row) {
            jobs[slot].steps.push(step);
        }
    }

    for job in &mut jobs {
        job.steps.sort_by_key(|s| s.step_id);
    }
    jobs
}

/// Reconcile one server's agent jobs against the destination tree.
///
/// Two jobs whose names sanitize to the same file are not allowed to
/// overwrite each other: the first job seen keeps the file and later ones
/// are reported as [`SkipReason::NameCollision`].
pub fn reconcile_jobs(
    rows: &[JobStepRow],
    unit: &JobUnit<'_>,
    last_run: DateTime<Utc>,
    options: &ReconcileOptions,
    renderer: &Renderer,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::new(last_run);
    if rows.is_empty() {
        info!("[{}] no SQL Agent job records found", unit.server);
        return outcome;
    }
    info!("[{}] {} SQL Agent job step records", unit.server, rows.len());

    let jobs = group_jobs(rows);
    let mut claimed: HashMap<PathBuf, String> = HashMap::new();

    for job in &jobs {
        let label = format!("{} ({})", job.name, job.job_id);
        let modified = Modified::decode(job.modified_at.as_ref(), &label);
        if let Modified::Known(dt) = modified {
            outcome.observe(dt);
        }

        let dest = paths::job_path(unit.repo_root, unit.source, unit.server, &job.name);
        if let Some(other) = claimed.get(&dest) {
            warn!(
                "[{}] job {label} maps to {} already used by {other}; skipped",
                unit.server,
                dest.display()
            );
            let reason = SkipReason::NameCollision {
                other: other.clone(),
            };
            outcome.record(label, Some(dest), Action::Skipped(reason));
            continue;
        }
        claimed.insert(dest.clone(), label.clone());

        if dest.exists() {
            if let Some(reason) = modified.skip_existing(last_run) {
                debug!("SKIP: agent job '{}' - {reason}", job.name);
                outcome.record(label, Some(dest), Action::Skipped(reason));
                continue;
            }
        } else {
            debug!("NEW: agent job '{}' - file doesn't exist, will be added", job.name);
        }

        let action = match renderer.render_job(job) {
            Ok(content) => apply(&dest, &content, options, unit.repo_root),
            Err(e) => {
                warn!("{label}: {e}");
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;
    use versioner_core::{JobId, RawTimestamp};

    fn step_row(job: &str, name: &str, step: Option<i32>, modified: &str) -> JobStepRow {
        JobStepRow {
            job_id: JobId::from(job),
            job_name: name.into(),
            enabled: true,
            description: Some("nightly".into()),
            created_at: Some(RawTimestamp::from("2023-01-01 00:00:00")),
            modified_at: Some(RawTimestamp::from(modified)),
            step_id: step,
            step_name: step.map(|s| format!("step {s}")),
            subsystem: step.map(|_| "TSQL".to_string()),
            command: step.map(|s| format!("EXEC dbo.Step{s}")),
            database_name: step.map(|_| "Sales".to_string()),
            on_success_action: step.map(|_| "3".to_string()),
            on_fail_action: step.map(|_| "2".to_string()),
            retry_attempts: step.map(|_| 0),
            retry_interval: step.map(|_| 0),
        }
    }

    fn unit(root: &Path) -> JobUnit<'_> {
        JobUnit {
            repo_root: root,
            source: SourceType::OnPrem,
            server: "sql01",
        }
    }

    fn last_run() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn grouping_keeps_first_seen_order_and_sorts_steps() {
        let rows = vec![
            step_row("b", "Backup", Some(2), "2024-02-01 00:00:00"),
            step_row("a", "Archive", None, "2024-02-01 00:00:00"),
            step_row("b", "Backup", Some(1), "2024-02-01 00:00:00"),
        ];
        let jobs = group_jobs(&rows);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].name, "Backup");
        assert_eq!(
            jobs[0].steps.iter().map(|s| s.step_id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(jobs[1].name, "Archive");
        assert!(jobs[1].steps.is_empty());
    }

    #[test]
    fn out_of_order_steps_render_in_step_order() {
        let dir = TempDir::new().unwrap();
        let renderer = Renderer::new().unwrap();
        let rows = vec![
            step_row("b", "Backup", Some(2), "2024-02-01 00:00:00"),
            step_row("b", "Backup", Some(1), "2024-02-01 00:00:00"),
        ];
        let out = reconcile_jobs(
            &rows,
            &unit(dir.path()),
            last_run(),
            &ReconcileOptions::default(),
            &renderer,
        );
        assert_eq!(out.changed, 1);

        let text =
            std::fs::read_to_string(dir.path().join("src/OnPrem/sql01/SQL_AGENT_JOBS/Backup.txt"))
                .unwrap();
        let first = text.find("Step 1: step 1").unwrap();
        let second = text.find("Step 2: step 2").unwrap();
        assert!(first < second);
        assert!(text.contains("Total Steps: 2"));
    }

    #[test]
    fn existing_job_follows_watermark_policy() {
        let dir = TempDir::new().unwrap();
        let renderer = Renderer::new().unwrap();
        let opts = ReconcileOptions::default();
        let path = dir.path().join("src/OnPrem/sql01/SQL_AGENT_JOBS/Backup.txt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "old\n").unwrap();

        let stale = vec![step_row("b", "Backup", Some(1), "2023-12-31 23:59:59")];
        let out = reconcile_jobs(&stale, &unit(dir.path()), last_run(), &opts, &renderer);
        assert_eq!((out.changed, out.skipped), (0, 1));

        let unknown = vec![step_row("b", "Backup", Some(1), "garbage")];
        let out = reconcile_jobs(&unknown, &unit(dir.path()), last_run(), &opts, &renderer);
        assert_eq!((out.changed, out.skipped), (0, 1));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old\n");

        let fresh = vec![step_row("b", "Backup", Some(1), "2024-01-02 00:00:00")];
        let out = reconcile_jobs(&fresh, &unit(dir.path()), last_run(), &opts, &renderer);
        assert_eq!((out.changed, out.skipped), (1, 0));
        assert_eq!(
            out.max_modified_seen,
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn colliding_job_names_keep_first_job() {
        let dir = TempDir::new().unwrap();
        let renderer = Renderer::new().unwrap();
        let rows = vec![
            step_row("1", "Load/Sales", Some(1), "2024-02-01 00:00:00"),
            step_row("2", "Load Sales", Some(1), "2024-02-01 00:00:00"),
        ];
        let out = reconcile_jobs(
            &rows,
            &unit(dir.path()),
            last_run(),
            &ReconcileOptions::default(),
            &renderer,
        );
        assert_eq!((out.changed, out.skipped), (1, 1));
        assert!(matches!(
            &out.entries[1].action,
            Action::Skipped(SkipReason::NameCollision { other }) if other.contains("Load/Sales")
        ));

        let text =
            std::fs::read_to_string(dir.path().join("src/OnPrem/sql01/SQL_AGENT_JOBS/Load_Sales.txt"))
                .unwrap();
        assert!(text.contains("JobID: 1"));
    }

    #[test]
    fn no_rows_is_empty_outcome() {
        let dir = TempDir::new().unwrap();
        let renderer = Renderer::new().unwrap();
        let out = reconcile_jobs(
            &[],
            &unit(dir.path()),
            last_run(),
            &ReconcileOptions::default(),
            &renderer,
        );
        assert_eq!((out.changed, out.skipped), (0, 0));
        assert_eq!(out.max_modified_seen, last_run());
    }
}
