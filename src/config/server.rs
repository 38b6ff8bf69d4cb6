use super::{port_in_range, ConfigError};
use crate::util::config::{config_base_dir, resolve_dir_group};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_BOOKIE_PORT: i32 = 3181;
pub const DEFAULT_HTTP_PORT: i32 = 8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirGroup {
    Journal,
    Ledger,
    Index,
}

impl fmt::Display for DirGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DirGroup::Journal => "journal",
            DirGroup::Ledger => "ledger",
            DirGroup::Index => "index",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub journal_dirs: Option<Vec<PathBuf>>,
    pub ledger_dirs: Option<Vec<PathBuf>>,
    /// Falls back to `ledger_dirs` when unset.
    pub index_dirs: Option<Vec<PathBuf>>,
    pub disk_usage_threshold: f32,
    pub disk_usage_warn_threshold: f32,
    pub bookie_id: Option<String>,
    pub advertised_address: Option<String>,
    pub listening_interface: Option<String>,
    pub bookie_port: i32,
    pub http_port: i32,
    pub use_host_name_as_bookie_id: bool,
    pub use_short_host_name: bool,
    pub allow_loopback: bool,
    pub journal_sync_data: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            journal_dirs: None,
            ledger_dirs: None,
            index_dirs: None,
            disk_usage_threshold: 0.95,
            disk_usage_warn_threshold: 0.90,
            bookie_id: None,
            advertised_address: None,
            listening_interface: None,
            bookie_port: DEFAULT_BOOKIE_PORT,
            http_port: DEFAULT_HTTP_PORT,
            use_host_name_as_bookie_id: false,
            use_short_host_name: false,
            allow_loopback: false,
            journal_sync_data: true,
        }
    }
}

impl ServerConfig {
    /// Configuration rooted at `base`, with one journal and one ledger directory.
    pub fn with_base_dir(base: &Path) -> Self {
        Self {
            journal_dirs: Some(vec![base.join("journal")]),
            ledger_dirs: Some(vec![base.join("ledgers")]),
            ..Self::default()
        }
    }

    /// Reads JSON from `path`; relative directories resolve against the file's parent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: ServerConfig = serde_json::from_slice(&raw)?;
        let base = config_base_dir(path);
        for group in [
            &mut config.journal_dirs,
            &mut config.ledger_dirs,
            &mut config.index_dirs,
        ] {
            if let Some(dirs) = group.as_mut() {
                *dirs = resolve_dir_group(&base, dirs);
            }
        }
        Ok(config)
    }

    pub fn dirs(&self, group: DirGroup) -> Option<&[PathBuf]> {
        match group {
            DirGroup::Journal => self.journal_dirs.as_deref(),
            DirGroup::Ledger => self.ledger_dirs.as_deref(),
            DirGroup::Index => self
                .index_dirs
                .as_deref()
                .or(self.ledger_dirs.as_deref()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.ledger_dirs.as_deref() {
            None => return Err(ConfigError::MissingDirectories(DirGroup::Ledger)),
            Some([]) => return Err(ConfigError::EmptyDirectories(DirGroup::Ledger)),
            Some(_) => {}
        }
        check_threshold("disk_usage_threshold", self.disk_usage_threshold)?;
        check_threshold("disk_usage_warn_threshold", self.disk_usage_warn_threshold)?;
        if self.disk_usage_warn_threshold > self.disk_usage_threshold {
            return Err(ConfigError::WarnAboveThreshold {
                warn: self.disk_usage_warn_threshold,
                threshold: self.disk_usage_threshold,
            });
        }
        if !port_in_range(self.bookie_port) {
            return Err(ConfigError::InvalidPort {
                name: "bookie_port",
                port: self.bookie_port,
            });
        }
        if !port_in_range(self.http_port) {
            return Err(ConfigError::InvalidPort {
                name: "http_port",
                port: self.http_port,
            });
        }
        Ok(())
    }
}

fn check_threshold(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold { name, value })
    }
}
