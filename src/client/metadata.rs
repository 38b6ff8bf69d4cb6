use super::ClientError;
use crate::codec::{DigestType, INVALID_ENTRY_ID};
use crate::node::BookieId;
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Open,
    Closed,
}

/// Client-visible description of a ledger: where it lives, how it is
/// replicated and, once closed, its last entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMetadata {
    pub ledger_id: i64,
    pub ensemble: Vec<BookieId>,
    pub ensemble_size: usize,
    pub write_quorum: usize,
    pub ack_quorum: usize,
    pub digest_type: DigestType,
    /// SHA-256 of the master key; lets an opener reject a wrong password
    /// before touching any node.
    pub password_digest: Vec<u8>,
    pub status: LedgerStatus,
    pub last_entry_id: i64,
}

impl LedgerMetadata {
    pub fn new(
        ledger_id: i64,
        ensemble: Vec<BookieId>,
        write_quorum: usize,
        ack_quorum: usize,
        digest_type: DigestType,
        master_key: &[u8],
    ) -> Self {
        Self {
            ledger_id,
            ensemble_size: ensemble.len(),
            ensemble,
            write_quorum,
            ack_quorum,
            digest_type,
            password_digest: password_digest(master_key),
            status: LedgerStatus::Open,
            last_entry_id: INVALID_ENTRY_ID,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == LedgerStatus::Closed
    }

    pub fn accepts_key(&self, master_key: &[u8]) -> bool {
        self.password_digest == password_digest(master_key)
    }

    pub fn close(&mut self, last_entry_id: i64) {
        self.status = LedgerStatus::Closed;
        self.last_entry_id = last_entry_id;
    }
}

fn password_digest(master_key: &[u8]) -> Vec<u8> {
    Sha256::digest(master_key).to_vec()
}

/// Where ledger metadata lives. Writes replace the whole record.
pub trait LedgerMetadataStore: Send + Sync {
    fn next_ledger_id(&self) -> Result<i64, ClientError>;
    fn create(&self, metadata: LedgerMetadata) -> Result<(), ClientError>;
    fn read(&self, ledger_id: i64) -> Result<LedgerMetadata, ClientError>;
    fn write(&self, metadata: LedgerMetadata) -> Result<(), ClientError>;
}

#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    ledgers: RwLock<BTreeMap<i64, LedgerMetadata>>,
    next_id: AtomicI64,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ledgers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.read().is_empty()
    }

    /// Serialized view of every record, as a metadata service would hold it.
    pub fn export_json(&self) -> Result<String, ClientError> {
        let ledgers: Vec<LedgerMetadata> = self.ledgers.read().values().cloned().collect();
        serde_json::to_string_pretty(&ledgers).map_err(|err| ClientError::Metadata(err.to_string()))
    }
}

impl LedgerMetadataStore for InMemoryMetadataStore {
    fn next_ledger_id(&self) -> Result<i64, ClientError> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn create(&self, metadata: LedgerMetadata) -> Result<(), ClientError> {
        let mut ledgers = self.ledgers.write();
        if ledgers.contains_key(&metadata.ledger_id) {
            return Err(ClientError::Metadata(format!(
                "ledger {} already exists",
                metadata.ledger_id
            )));
        }
        debug!(
            "event=ledger_metadata_created ledger_id={} ensemble={:?}",
            metadata.ledger_id, metadata.ensemble
        );
        ledgers.insert(metadata.ledger_id, metadata);
        Ok(())
    }

    fn read(&self, ledger_id: i64) -> Result<LedgerMetadata, ClientError> {
        self.ledgers
            .read()
            .get(&ledger_id)
            .cloned()
            .ok_or(ClientError::NoSuchLedger(ledger_id))
    }

    fn write(&self, metadata: LedgerMetadata) -> Result<(), ClientError> {
        let mut ledgers = self.ledgers.write();
        let slot = ledgers
            .get_mut(&metadata.ledger_id)
            .ok_or(ClientError::NoSuchLedger(metadata.ledger_id))?;
        debug!(
            "event=ledger_metadata_written ledger_id={} status={:?} last_entry_id={}",
            metadata.ledger_id, metadata.status, metadata.last_entry_id
        );
        *slot = metadata;
        Ok(())
    }
}
