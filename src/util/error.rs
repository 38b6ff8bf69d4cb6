use crate::client::ClientError;
use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::lifecycle::{DirectoryError, FormatError};
use crate::node::{BookieError, IdentityError, JournalError, StorageError};
use thiserror::Error;

/// Crate-wide error for callers that drive both halves of the store.
#[derive(Debug, Error)]
pub enum LedgerStoreError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Bookie(#[from] BookieError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LedgerStoreError>;
