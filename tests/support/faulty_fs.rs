#![allow(dead_code)]

use ledgerstore::lifecycle::{FileSystem, OsFileSystem};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

/// Real filesystem with injectable failures on creation and removal.
#[derive(Debug, Default)]
pub struct FaultyFileSystem {
    fail_mkdirs: bool,
    undeletable: Mutex<HashSet<PathBuf>>,
    removed: Mutex<Vec<PathBuf>>,
}

impl FaultyFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_mkdirs() -> Self {
        Self {
            fail_mkdirs: true,
            ..Self::default()
        }
    }

    pub fn protect(&self, path: impl Into<PathBuf>) {
        self.undeletable.lock().insert(path.into());
    }

    pub fn removed(&self) -> Vec<PathBuf> {
        self.removed.lock().clone()
    }
}

impl FileSystem for FaultyFileSystem {
    fn exists(&self, path: &Path) -> bool {
        OsFileSystem.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        OsFileSystem.is_dir(path)
    }

    fn mkdirs(&self, path: &Path) -> io::Result<()> {
        if self.fail_mkdirs {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("mkdirs refused for {}", path.display()),
            ));
        }
        OsFileSystem.mkdirs(path)
    }

    fn list(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        OsFileSystem.list(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        if self.undeletable.lock().contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is protected", path.display()),
            ));
        }
        OsFileSystem.remove(path)?;
        self.removed.lock().push(path.to_path_buf());
        Ok(())
    }
}
