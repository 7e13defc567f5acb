//! Dry-run unified diffs between rendered content and what is on disk.

use std::io::ErrorKind;
use std::path::Path;

use similar::TextDiff;

use crate::{error::io_err, SyncError};

/// Unified diff from the current file at `path` (empty if absent) to
/// `rendered`. Headers are `a/<rel>` and `b/<rel>` relative to `display_root`.
pub fn unified_diff(path: &Path, rendered: &str, display_root: &Path) -> Result<String, SyncError> {
    let existing = read_existing_or_empty(path)?;
    let relative = path.strip_prefix(display_root).unwrap_or(path);
    let old_header = format!("a/{}", relative.display());
    let new_header = format!("b/{}", relative.display());
    Ok(TextDiff::from_lines(existing.as_str(), rendered)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string())
}

fn read_existing_or_empty(path: &Path) -> Result<String, SyncError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(io_err(path, err)),
    }
}
