use super::ConfigError;
use crate::codec::DigestType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub ensemble_size: usize,
    pub write_quorum: usize,
    pub ack_quorum: usize,
    pub digest_type: DigestType,
    pub add_entry_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// Zero disables the background explicit-LAC flusher.
    pub explicit_lac_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ensemble_size: 3,
            write_quorum: 2,
            ack_quorum: 2,
            digest_type: DigestType::Crc32,
            add_entry_timeout_ms: 5_000,
            read_timeout_ms: 5_000,
            explicit_lac_interval_ms: 0,
        }
    }
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ClientConfig = serde_json::from_slice(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_quorum(ensemble_size: usize, write_quorum: usize, ack_quorum: usize) -> Self {
        Self {
            ensemble_size,
            write_quorum,
            ack_quorum,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_quorum(self.ensemble_size, self.write_quorum, self.ack_quorum)
    }

    pub fn add_entry_timeout(&self) -> Duration {
        Duration::from_millis(self.add_entry_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn explicit_lac_interval(&self) -> Option<Duration> {
        (self.explicit_lac_interval_ms > 0)
            .then(|| Duration::from_millis(self.explicit_lac_interval_ms))
    }
}

pub fn validate_quorum(ensemble: usize, write: usize, ack: usize) -> Result<(), ConfigError> {
    if ack >= 1 && ack <= write && write <= ensemble {
        Ok(())
    } else {
        Err(ConfigError::InvalidQuorum {
            ensemble,
            write,
            ack,
        })
    }
}
