//! Distributed append-only ledger store: the storage node ("bookie") that
//! admits and serves ledger entries, and the quorum client that replicates
//! them across an ensemble of nodes.

pub mod client;
pub mod codec;
pub mod config;
pub mod lifecycle;
pub mod node;
pub mod prelude;
pub mod telemetry;
pub mod util;

pub use client::{
    AckSet, BookieClient, ClientError, InMemoryMetadataStore, LastConfirmedAndEntry, LedgerClient,
    LedgerClientBuilder, LedgerEntry, LedgerHandle, LedgerMetadata, LedgerMetadataStore,
    LedgerStatus, LocalBookieClient, NodeState, RoundRobinSchedule,
};
pub use codec::{CodecError, DigestType, EntryHeader};
pub use config::{ClientConfig, ConfigError, DirGroup, ServerConfig};
pub use lifecycle::{
    check_directory_structure, format, ConfirmPrompt, DirectoryError, FileSystem, FormatError,
    LinePrompt, OsFileSystem, ShutdownTrigger,
};
pub use node::{
    Bookie, BookieBuilder, BookieError, BookieId, BookieSocketAddress, HostResolver,
    IdentityError, Journal, JournalError, LastAddConfirmedUpdate, LedgerState, LedgerStorage,
    StorageError, Watcher, WriteAck,
};
pub use telemetry::{InMemoryStats, NullStats, RegistryStats, StatsSink};
pub use util::completion::{Cancelled, Completion};
pub use util::error::LedgerStoreError;
