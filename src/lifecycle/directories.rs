use super::fs::FileSystem;
use log::{debug, error};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Files with these extensions in a parent directory mark a pre-versioned layout.
pub const LEGACY_LAYOUT_EXTENSIONS: &[&str] = &["txn", "idx", "log"];
pub const LEGACY_VERSION_FILE: &str = "VERSION";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("{path} is not a directory")]
    NotADirectory { path: PathBuf },
    #[error("unable to create directory {path}: {reason}")]
    CreateFailed { path: PathBuf, reason: String },
    #[error("old layout detected in {parent}: {marker}")]
    OldLayout { parent: PathBuf, marker: PathBuf },
}

/// Ensures `dir` exists as a directory and that its parent carries no legacy layout.
pub fn check_directory_structure(dir: &Path, fs: &dyn FileSystem) -> Result<(), DirectoryError> {
    if fs.exists(dir) {
        if !fs.is_dir(dir) {
            return Err(DirectoryError::NotADirectory {
                path: dir.to_path_buf(),
            });
        }
    } else if let Err(err) = fs.mkdirs(dir) {
        error!(
            "event=directory_create_failed path={} error={}",
            dir.display(),
            err
        );
        return Err(DirectoryError::CreateFailed {
            path: dir.to_path_buf(),
            reason: err.to_string(),
        });
    }
    if let Some(marker) = find_legacy_marker(dir, fs) {
        let parent = dir.parent().map(Path::to_path_buf).unwrap_or_default();
        error!(
            "event=old_layout_detected dir={} marker={}",
            dir.display(),
            marker.display()
        );
        return Err(DirectoryError::OldLayout { parent, marker });
    }
    Ok(())
}

fn find_legacy_marker(dir: &Path, fs: &dyn FileSystem) -> Option<PathBuf> {
    let parent = dir.parent().filter(|p| !p.as_os_str().is_empty())?;
    let children = match fs.list(parent) {
        Ok(children) => children,
        Err(err) => {
            debug!(
                "event=legacy_scan_skipped parent={} error={}",
                parent.display(),
                err
            );
            return None;
        }
    };
    children.into_iter().find(|child| is_legacy_marker(child))
}

fn is_legacy_marker(path: &Path) -> bool {
    if path.file_name().and_then(|name| name.to_str()) == Some(LEGACY_VERSION_FILE) {
        return true;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| LEGACY_LAYOUT_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}
