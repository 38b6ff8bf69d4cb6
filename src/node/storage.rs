use crate::config::ServerConfig;
use log::info;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("ledger {0} does not exist")]
    NoSuchLedger(i64),
    #[error("entry {entry_id} of ledger {ledger_id} does not exist")]
    NoSuchEntry { ledger_id: i64, entry_id: i64 },
    #[error("entry {entry_id} of ledger {ledger_id} already stored with different content")]
    EntryConflict { ledger_id: i64, entry_id: i64 },
    #[error("storage already initialized")]
    AlreadyInitialized,
    #[error("storage not initialized")]
    NotInitialized,
    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),
    #[error("storage I/O error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// Same bytes were already present.
    Duplicate,
}

/// Indexed entry store behind a node. Durability is the journal's job; this
/// layer only answers point lookups.
pub trait LedgerStorage: Send + Sync {
    fn initialize(&self, config: &ServerConfig) -> Result<(), StorageError>;
    fn is_initialized(&self) -> bool;
    fn put_entry(
        &self,
        ledger_id: i64,
        entry_id: i64,
        entry: Vec<u8>,
    ) -> Result<PutOutcome, StorageError>;
    fn get_entry(&self, ledger_id: i64, entry_id: i64) -> Result<Vec<u8>, StorageError>;
    fn has_ledger(&self, ledger_id: i64) -> bool;
    fn last_entry_id(&self, ledger_id: i64) -> Option<i64>;
    fn flush(&self) -> Result<(), StorageError>;
    fn shutdown(&self) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct InMemoryLedgerStorage {
    initialized: AtomicBool,
    ledgers: RwLock<HashMap<i64, BTreeMap<i64, Arc<[u8]>>>>,
}

impl InMemoryLedgerStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_initialized(&self) -> Result<(), StorageError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(StorageError::NotInitialized)
        }
    }
}

impl LedgerStorage for InMemoryLedgerStorage {
    fn initialize(&self, config: &ServerConfig) -> Result<(), StorageError> {
        config
            .validate()
            .map_err(|err| StorageError::InvalidConfig(err.to_string()))?;
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StorageError::AlreadyInitialized);
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn put_entry(
        &self,
        ledger_id: i64,
        entry_id: i64,
        entry: Vec<u8>,
    ) -> Result<PutOutcome, StorageError> {
        self.ensure_initialized()?;
        let mut ledgers = self.ledgers.write();
        let entries = ledgers.entry(ledger_id).or_default();
        match entries.get(&entry_id) {
            Some(existing) if existing[..] == entry[..] => Ok(PutOutcome::Duplicate),
            Some(_) => Err(StorageError::EntryConflict {
                ledger_id,
                entry_id,
            }),
            None => {
                entries.insert(entry_id, Arc::from(entry));
                Ok(PutOutcome::Stored)
            }
        }
    }

    fn get_entry(&self, ledger_id: i64, entry_id: i64) -> Result<Vec<u8>, StorageError> {
        self.ensure_initialized()?;
        let ledgers = self.ledgers.read();
        let entries = ledgers
            .get(&ledger_id)
            .ok_or(StorageError::NoSuchLedger(ledger_id))?;
        entries
            .get(&entry_id)
            .map(|entry| entry.to_vec())
            .ok_or(StorageError::NoSuchEntry {
                ledger_id,
                entry_id,
            })
    }

    fn has_ledger(&self, ledger_id: i64) -> bool {
        self.ledgers.read().contains_key(&ledger_id)
    }

    fn last_entry_id(&self, ledger_id: i64) -> Option<i64> {
        self.ledgers
            .read()
            .get(&ledger_id)
            .and_then(|entries| entries.keys().next_back().copied())
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.ensure_initialized()
    }

    fn shutdown(&self) -> Result<(), StorageError> {
        info!(
            "event=ledger_storage_shutdown ledgers={}",
            self.ledgers.read().len()
        );
        Ok(())
    }
}

/// Prepares storage for offline tools: validates `config` and initializes
/// either the supplied storage or a fresh in-memory one. Storage that is
/// already initialized is refused.
pub fn mount_ledger_storage_offline(
    config: &ServerConfig,
    storage: Option<Arc<dyn LedgerStorage>>,
) -> Result<Arc<dyn LedgerStorage>, StorageError> {
    let storage = match storage {
        Some(storage) if storage.is_initialized() => return Err(StorageError::AlreadyInitialized),
        Some(storage) => storage,
        None => Arc::new(InMemoryLedgerStorage::new()) as Arc<dyn LedgerStorage>,
    };
    storage.initialize(config)?;
    info!(
        "event=ledger_storage_mounted ledger_dirs={:?}",
        config.ledger_dirs
    );
    Ok(storage)
}
