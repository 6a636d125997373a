//! Durable file replacement
//!
//! The commit primitive behind every store write. New content lands in a
//! sibling temp file first, the temp file is fsynced, and an atomic rename
//! swaps it over the target. At any instant, across crash or restart, the
//! target holds either its previous content or the new content in full.
//!
//! Atomicity is achieved via:
//! 1. Write to temp file in the same directory
//! 2. fsync temp file (durability)
//! 3. Rename temp to final (atomic on POSIX)

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::errors::{StoreError, StoreResult};

/// Sibling temp path: same directory, `<file_name>.tmp`.
///
/// Same-directory placement keeps the rename within one filesystem, which is
/// what makes it atomic.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically replace the file at `path` with `bytes`.
///
/// Any failure at temp-file creation, write, sync, or rename removes the temp
/// file and leaves `path` untouched. The returned error's context names the
/// step that failed.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let temp = temp_path(path);

    let result = write_via_temp(path, &temp, bytes);
    if result.is_err() {
        // Already on an error path; removal is best effort.
        let _ = fs::remove_file(&temp);
        return result;
    }

    // fsync the directory so the rename itself survives a crash. Best effort:
    // the swap is already visible and cannot be rolled back.
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

fn write_via_temp(path: &Path, temp: &Path, bytes: &[u8]) -> StoreResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp)
        .map_err(|e| StoreError::io(format!("failed to create temp file {}", temp.display()), e))?;

    file.write_all(bytes)
        .map_err(|e| StoreError::io(format!("failed to write temp file {}", temp.display()), e))?;

    // fsync is mandatory: the rename must never promote bytes that are not
    // yet on stable storage.
    file.sync_all()
        .map_err(|e| StoreError::io(format!("failed to sync temp file {}", temp.display()), e))?;

    fs::rename(temp, path).map_err(|e| {
        StoreError::io(
            format!(
                "failed to rename {} over {}",
                temp.display(),
                path.display()
            ),
            e,
        )
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_temp_path_is_sibling() {
        let path = Path::new("/data/state.json");
        assert_eq!(temp_path(path), Path::new("/data/state.json.tmp"));
    }

    #[test]
    fn test_write_creates_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");

        write_atomic(&path, b"{\"val\":1}").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"{\"val\":1}");
    }

    #[test]
    fn test_write_replaces_existing_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");

        write_atomic(&path, b"old").unwrap();
        write_atomic(&path, b"new").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_no_temp_file_left_on_success() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");

        write_atomic(&path, b"content").unwrap();

        assert!(!path.with_file_name("state.json.tmp").exists());
    }

    #[test]
    fn test_rename_failure_cleans_temp_and_reports_step() {
        let tmp = TempDir::new().unwrap();

        // A directory at the target makes the rename fail.
        let path = tmp.path().join("occupied");
        fs::create_dir(&path).unwrap();

        let err = write_atomic(&path, b"content").unwrap_err();

        assert!(format!("{}", err).contains("rename"));
        assert!(path.is_dir(), "target must be untouched");
        assert!(
            !tmp.path().join("occupied.tmp").exists(),
            "temp file must be cleaned up on failure"
        );
    }

    #[test]
    fn test_create_failure_reports_step() {
        let tmp = TempDir::new().unwrap();

        // Parent directory does not exist, so the temp file cannot be created.
        let path = tmp.path().join("missing").join("state.json");
        let err = write_atomic(&path, b"content").unwrap_err();

        assert!(format!("{}", err).contains("temp file"));
    }
}
