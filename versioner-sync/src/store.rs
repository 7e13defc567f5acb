//! Content store: hash-gated, atomic file writes.
//!
//! ## `write_if_changed` protocol
//!
//! 1. SHA-256 the new content.
//! 2. If the destination exists, SHA-256 its bytes → skip if identical.
//! 3. Create parent directories.
//! 4. Write to `<path>.versioner.tmp` in the same directory.
//! 5. Rename over the destination (atomic on POSIX).
//!
//! A reader of `path` only ever sees the old bytes or the new bytes. A crash
//! between 4 and 5 leaves the destination untouched and a stray `.tmp`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{io_err, SyncError};

const TMP_SUFFIX: &str = "versioner.tmp";

/// Hex SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// `true` unless `path` already holds exactly `content`. Never writes.
pub fn is_different(path: &Path, content: &[u8]) -> Result<bool, SyncError> {
    match std::fs::read(path) {
        Ok(existing) => Ok(digest(&existing) != digest(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(true),
        Err(err) => Err(io_err(path, err)),
    }
}

/// Write `content` to `path` unless it is already there. Returns `true` when a
/// physical write happened.
pub fn write_if_changed(path: &Path, content: &[u8]) -> Result<bool, SyncError> {
    if !is_different(path, content)? {
        tracing::debug!("unchanged: {}", path.display());
        return Ok(false);
    }
    stage(path, content)?.commit()?;
    tracing::debug!("wrote: {}", path.display());
    Ok(true)
}

/// Temp file used for `path`.
pub fn tmp_path_for(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.{TMP_SUFFIX}", path.display()))
}

/// A fully written temp file waiting to be renamed over its destination.
///
/// Dropping it without [`StagedWrite::commit`] removes the temp file.
#[derive(Debug)]
pub struct StagedWrite {
    tmp: PathBuf,
    dest: PathBuf,
    committed: bool,
}

impl StagedWrite {
    pub fn tmp_path(&self) -> &Path {
        &self.tmp
    }

    /// Rename the temp file over the destination. On failure the temp file
    /// is removed and the destination is left as it was.
    pub fn commit(mut self) -> Result<(), SyncError> {
        let result = std::fs::rename(&self.tmp, &self.dest);
        self.committed = true;
        if let Err(e) = result {
            let _ = std::fs::remove_file(&self.tmp);
            return Err(io_err(&self.dest, e));
        }
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.tmp);
        }
    }
}

/// Steps 3–4: create directories and write the temp file next to `path`.
pub fn stage(path: &Path, content: &[u8]) -> Result<StagedWrite, SyncError> {
    stage_with_tmp(path, content, &tmp_path_for(path))
}

fn stage_with_tmp(path: &Path, content: &[u8], tmp: &Path) -> Result<StagedWrite, SyncError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    if let Err(e) = std::fs::write(tmp, content) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(tmp, e));
    }
    Ok(StagedWrite {
        tmp: tmp.to_path_buf(),
        dest: path.to_path_buf(),
        committed: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn first_write_reports_changed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("V1.sql");
        assert!(write_if_changed(&path, b"select 1\n").unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"select 1\n");
    }

    #[test]
    fn second_write_same_content_reports_unchanged() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("V1.sql");
        assert!(write_if_changed(&path, b"same").unwrap());
        assert!(!write_if_changed(&path, b"same").unwrap());
    }

    #[test]
    fn changed_content_is_rewritten() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("V1.sql");
        write_if_changed(&path, b"v1").unwrap();
        assert!(write_if_changed(&path, b"v2").unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"v2");
    }

    #[test]
    fn is_different_never_writes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("nope.sql");
        assert!(is_different(&path, b"content").unwrap());
        assert!(!path.exists(), "is_different must not create files");
        assert!(!path.parent().unwrap().exists(), "is_different must not create dirs");
    }

    #[test]
    fn creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("src").join("Fabric").join("db").join("V.sql");
        write_if_changed(&path, b"x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn tmp_file_removed_after_write() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("clean.sql");
        write_if_changed(&path, b"data").unwrap();
        assert!(!tmp_path_for(&path).exists(), ".versioner.tmp must be cleaned up");
    }

    #[test]
    fn crash_before_rename_leaves_destination_untouched() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("V1.sql");
        fs::write(&path, "original").unwrap();

        let staged = stage(&path, b"replacement").unwrap();
        let tmp_file = staged.tmp_path().to_path_buf();
        // Simulate the process dying: no commit, no destructor.
        std::mem::forget(staged);

        assert_eq!(fs::read_to_string(&path).unwrap(), "original");
        assert_eq!(fs::read_to_string(&tmp_file).unwrap(), "replacement");
    }

    #[test]
    fn abandoned_stage_removes_tmp() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("V1.sql");
        let staged = stage(&path, b"replacement").unwrap();
        let tmp_file = staged.tmp_path().to_path_buf();
        drop(staged);
        assert!(!tmp_file.exists());
        assert!(!path.exists());
    }

    #[test]
    #[cfg(unix)]
    fn rename_failure_leaves_original_and_cleans_tmp() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let readonly_dir = root.path().join("readonly");
        fs::create_dir_all(&readonly_dir).unwrap();

        let path = readonly_dir.join("file.sql");
        fs::write(&path, "original").unwrap();

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o555);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        let tmp_dir = TempDir::new().unwrap();
        let tmp_path = tmp_dir.path().join("file.sql.versioner.tmp");

        let result = stage_with_tmp(&path, b"new content", &tmp_path).and_then(StagedWrite::commit);

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        // Running as root bypasses directory permissions; only assert when it failed.
        if result.is_err() {
            assert!(!tmp_path.exists(), ".versioner.tmp should be cleaned up");
            assert_eq!(fs::read_to_string(&path).unwrap(), "original");
        }
    }
}
