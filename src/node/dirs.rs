use crate::config::ServerConfig;
use log::{error, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reports the used fraction (0.0..=1.0) of the filesystem holding a directory.
pub trait DiskUsageProbe: Send + Sync {
    fn usage(&self, dir: &Path) -> io::Result<f32>;
}

/// Probe answering from a table of configured values, with a default for
/// unknown directories. Lets operators and tests pin usage explicitly.
#[derive(Debug, Default)]
pub struct FixedDiskUsage {
    default_usage: f32,
    overrides: RwLock<HashMap<PathBuf, f32>>,
}

impl FixedDiskUsage {
    pub fn new(default_usage: f32) -> Self {
        Self {
            default_usage,
            overrides: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_usage(&self, dir: impl Into<PathBuf>, usage: f32) {
        self.overrides.write().insert(dir.into(), usage);
    }
}

impl DiskUsageProbe for FixedDiskUsage {
    fn usage(&self, dir: &Path) -> io::Result<f32> {
        Ok(self
            .overrides
            .read()
            .get(dir)
            .copied()
            .unwrap_or(self.default_usage))
    }
}

/// Tracks which ledger directories may still receive writes.
pub struct LedgerDirsManager {
    dirs: Vec<PathBuf>,
    threshold: f32,
    warn_threshold: f32,
    probe: Arc<dyn DiskUsageProbe>,
}

impl LedgerDirsManager {
    pub fn new(config: &ServerConfig, probe: Arc<dyn DiskUsageProbe>) -> Self {
        Self {
            dirs: config.ledger_dirs.clone().unwrap_or_default(),
            threshold: config.disk_usage_threshold,
            warn_threshold: config.disk_usage_warn_threshold,
            probe,
        }
    }

    pub fn all_dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn writable_dirs(&self) -> Vec<PathBuf> {
        self.dirs
            .iter()
            .filter(|dir| self.is_writable(dir))
            .cloned()
            .collect()
    }

    /// First writable directory, or `None` when every directory is full.
    pub fn pick_writable_dir(&self) -> Option<PathBuf> {
        self.dirs.iter().find(|dir| self.is_writable(dir)).cloned()
    }

    fn is_writable(&self, dir: &Path) -> bool {
        match self.probe.usage(dir) {
            Ok(usage) if usage >= self.threshold => {
                warn!(
                    "event=ledger_dir_full path={} usage={:.3} threshold={:.3}",
                    dir.display(),
                    usage,
                    self.threshold
                );
                false
            }
            Ok(usage) => {
                if usage >= self.warn_threshold {
                    warn!(
                        "event=ledger_dir_usage_warn path={} usage={:.3} warn_threshold={:.3}",
                        dir.display(),
                        usage,
                        self.warn_threshold
                    );
                }
                true
            }
            Err(err) => {
                error!(
                    "event=ledger_dir_probe_failed path={} error={}",
                    dir.display(),
                    err
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for LedgerDirsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerDirsManager")
            .field("dirs", &self.dirs)
            .field("threshold", &self.threshold)
            .field("warn_threshold", &self.warn_threshold)
            .finish()
    }
}
