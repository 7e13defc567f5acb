//! Watermark store: per-source "last successful extraction" timestamps.
//!
//! The store is a small YAML mapping of source key to ISO-8601 UTC string:
//!
//! ```text
//! Fabric: 2024-01-02T00:00:00+00:00
//! On-Prem: 2023-11-30T08:15:00.250+00:00
//! ```
//!
//! Reads never fail: a missing, unreadable or malformed store (or key) yields
//! [`epoch_sentinel`] and a warning. Writes use the `.tmp` + rename pattern so
//! a crash mid-write leaves the previous store intact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde_yaml::{Mapping, Value};

use crate::error::{io_err, CoreError};
use crate::timestamp::parse_timestamp_str;

/// Default store file name, relative to the working directory.
pub const DEFAULT_WATERMARK_FILE: &str = "last_run.yaml";

/// "Never extracted": older than any object a catalog can report.
pub fn epoch_sentinel() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1940, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// The watermark a run should commit: never lower than `previous`.
pub fn advance(previous: DateTime<Utc>, observed: DateTime<Utc>) -> DateTime<Utc> {
    previous.max(observed)
}

/// Read the watermark for `key`, falling back to [`epoch_sentinel`].
pub fn read_watermark(path: &Path, key: &str) -> DateTime<Utc> {
    let mapping = match load_mapping(path) {
        Ok(Some(mapping)) => mapping,
        Ok(None) => return epoch_sentinel(),
        Err(e) => {
            tracing::warn!("failed to read watermark store: {e}; using {}", epoch_sentinel());
            return epoch_sentinel();
        }
    };

    match mapping.get(key) {
        None | Some(Value::Null) => epoch_sentinel(),
        Some(Value::String(s)) if s.trim().is_empty() => epoch_sentinel(),
        Some(Value::String(s)) => match parse_timestamp_str(s) {
            Ok(dt) => dt,
            Err(e) => {
                tracing::warn!(
                    "watermark '{key}' in {}: {e}; using {}",
                    path.display(),
                    epoch_sentinel()
                );
                epoch_sentinel()
            }
        },
        Some(other) => {
            tracing::warn!(
                "watermark '{key}' in {} is not a string ({other:?}); using {}",
                path.display(),
                epoch_sentinel()
            );
            epoch_sentinel()
        }
    }
}

/// Persist `key -> timestamp` (as UTC ISO-8601), keeping every other key.
pub fn write_watermark(path: &Path, key: &str, timestamp: DateTime<Utc>) -> Result<(), CoreError> {
    let mut mapping = match load_mapping(path) {
        Ok(mapping) => mapping.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("replacing unreadable watermark store: {e}");
            Mapping::new()
        }
    };
    mapping.insert(
        Value::String(key.to_string()),
        Value::String(timestamp.with_timezone(&Utc).to_rfc3339()),
    );

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }

    let yaml = serde_yaml::to_string(&mapping)?;
    let tmp = tmp_path(path);
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

/// Every entry in the store, in file order, for display. Values that do not
/// decode are reported as errors next to their key.
pub fn read_all(path: &Path) -> Result<Vec<(String, Result<DateTime<Utc>, CoreError>)>, CoreError> {
    let Some(mapping) = load_mapping(path)? else {
        return Ok(vec![]);
    };
    let mut entries = Vec::new();
    for (k, v) in mapping {
        let key = match k {
            Value::String(s) => s,
            other => format!("{other:?}"),
        };
        let parsed = match v {
            Value::String(s) => parse_timestamp_str(&s),
            other => Err(CoreError::MalformedTimestamp {
                raw: format!("{other:?}"),
            }),
        };
        entries.push((key, parsed));
    }
    Ok(entries)
}

/// `<file>.tmp` next to the store (same filesystem, so rename is atomic).
pub fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_WATERMARK_FILE.to_string());
    path.with_file_name(format!("{name}.tmp"))
}

fn load_mapping(path: &Path) -> Result<Option<Mapping>, CoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    if contents.trim().is_empty() {
        return Ok(Some(Mapping::new()));
    }
    let value: Value = serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    match value {
        Value::Mapping(m) => Ok(Some(m)),
        Value::Null => Ok(Some(Mapping::new())),
        _ => Err(CoreError::Config(format!(
            "watermark store {} is not a mapping",
            path.display()
        ))),
    }
}
