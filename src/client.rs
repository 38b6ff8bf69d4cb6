//! Quorum client: writes and reads ledger entries across an ensemble of nodes.

pub mod handle;
pub mod ledger_client;
pub mod metadata;
mod ops;
pub mod quorum;
pub mod transport;

pub use handle::{LastConfirmedAndEntry, LedgerEntry, LedgerHandle};
pub use ledger_client::{LedgerClient, LedgerClientBuilder};
pub use metadata::{InMemoryMetadataStore, LedgerMetadata, LedgerMetadataStore, LedgerStatus};
pub use quorum::{AckSet, RoundRobinSchedule};
pub use transport::{BookieClient, LocalBookieClient, NodeState};

use crate::node::{BookieError, BookieId};
use crate::util::completion::Cancelled;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("incorrect parameter: {0}")]
    IncorrectParameter(String),
    #[error("range offset {offset} length {length} out of bounds for {len} bytes")]
    IndexOutOfBounds {
        offset: usize,
        length: usize,
        len: usize,
    },
    #[error("read failed: {0}")]
    ReadException(String),
    #[error("not enough bookies: {0}")]
    NotEnoughBookies(String),
    #[error("ledger {0} is closed")]
    LedgerClosed(i64),
    #[error("ledger {0} is fenced")]
    LedgerFenced(i64),
    #[error("illegal operation: {0}")]
    IllegalOp(String),
    #[error("ledger {0} does not exist")]
    NoSuchLedger(i64),
    #[error("entry {entry_id} of ledger {ledger_id} does not exist")]
    NoSuchEntry { ledger_id: i64, entry_id: i64 },
    #[error("unauthorized access to ledger {0}")]
    Unauthorized(i64),
    #[error("digest mismatch for ledger {ledger_id} entry {entry_id}")]
    DigestMismatch { ledger_id: i64, entry_id: i64 },
    #[error("nodes disagree on ledger {ledger_id} entry {entry_id}")]
    InconsistentEntry { ledger_id: i64, entry_id: i64 },
    #[error("request timed out")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
    #[error("bookie {0} is not available")]
    BookieHandleNotAvailable(BookieId),
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
    #[error("metadata store failure: {0}")]
    Metadata(String),
    #[error(transparent)]
    Bookie(BookieError),
}

impl ClientError {
    /// Client-side result code (0 is success).
    pub fn code(&self) -> i32 {
        match self {
            ClientError::ReadException(_) => -1,
            ClientError::DigestMismatch { .. } => -5,
            ClientError::NotEnoughBookies(_) => -6,
            ClientError::NoSuchLedger(_) => -7,
            ClientError::BookieHandleNotAvailable(_) => -8,
            ClientError::LedgerClosed(_) => -11,
            ClientError::NoSuchEntry { .. } => -13,
            ClientError::IncorrectParameter(_) | ClientError::IndexOutOfBounds { .. } => -14,
            ClientError::Timeout => -23,
            ClientError::Metadata(_) => -18,
            ClientError::IllegalOp(_) | ClientError::InvalidConfig(_) => -100,
            ClientError::LedgerFenced(_) => -101,
            ClientError::Unauthorized(_) => -102,
            ClientError::InconsistentEntry { .. } => -103,
            ClientError::Cancelled => -110,
            ClientError::Bookie(_) => -12,
        }
    }
}

impl From<BookieError> for ClientError {
    fn from(err: BookieError) -> Self {
        match err {
            BookieError::NoSuchLedger(ledger_id) => ClientError::NoSuchLedger(ledger_id),
            BookieError::NoSuchEntry {
                ledger_id,
                entry_id,
            } => ClientError::NoSuchEntry {
                ledger_id,
                entry_id,
            },
            BookieError::Unauthorized { ledger_id }
            | BookieError::MissingMasterKey { ledger_id } => ClientError::Unauthorized(ledger_id),
            BookieError::LedgerFenced(ledger_id) => ClientError::LedgerFenced(ledger_id),
            BookieError::Cancelled => ClientError::Cancelled,
            other => ClientError::Bookie(other),
        }
    }
}

impl From<Cancelled> for ClientError {
    fn from(_: Cancelled) -> Self {
        ClientError::Cancelled
    }
}
