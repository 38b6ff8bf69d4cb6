//! Storage node: entry admission, LAC tracking, identity and durable journal.

pub mod bookie;
pub mod dirs;
pub mod identity;
pub mod journal;
pub mod ledger;
pub mod storage;
pub mod watch;

pub use bookie::{current_directories, Bookie, BookieBuilder, BookieError, WriteAck};
pub use dirs::{DiskUsageProbe, FixedDiskUsage, LedgerDirsManager};
pub use identity::{
    get_bookie_address, get_bookie_id, BookieId, BookieSocketAddress, HostResolver,
    IdentityError, SystemResolver,
};
pub use journal::{Journal, JournalError, JournalReplay, JOURNAL_FILE_NAME};
pub use ledger::LedgerState;
pub use storage::{
    mount_ledger_storage_offline, InMemoryLedgerStorage, LedgerStorage, PutOutcome, StorageError,
};
pub use watch::{LastAddConfirmedUpdate, LastConfirmedWatchRegistry, Watcher};
