//! Convenience re-exports for downstream crates. Pull this module in via
//! `use ledgerstore::prelude::*;` when you want the most common types without
//! spelunking the module tree.

pub use crate::client::{
    BookieClient, ClientError, LastConfirmedAndEntry, LedgerClient, LedgerEntry, LedgerHandle,
    LocalBookieClient,
};
pub use crate::config::{ClientConfig, ServerConfig};
pub use crate::node::{Bookie, BookieBuilder, BookieError, BookieId, Watcher};
pub use crate::telemetry::StatsSink;
pub use crate::util::completion::Completion;
pub use crate::util::error::{LedgerStoreError, Result as LedgerStoreResult};
