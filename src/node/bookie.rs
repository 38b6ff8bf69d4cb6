use super::dirs::{DiskUsageProbe, FixedDiskUsage, LedgerDirsManager};
use super::identity::{get_bookie_id, BookieId, HostResolver, IdentityError, SystemResolver};
use super::journal::{Journal, JournalError};
use super::ledger::{LedgerDescriptor, LedgerState};
use super::storage::{mount_ledger_storage_offline, LedgerStorage, StorageError};
use super::watch::{self, Watcher};
use crate::codec::{self, CodecError, EntryHeader, RecordKind};
use crate::config::{DirGroup, ServerConfig};
use crate::lifecycle::{check_directory_structure, DirectoryError, FileSystem, OsFileSystem};
use crate::lifecycle::ShutdownTrigger;
use crate::telemetry::{NullStats, StatsSink};
use crate::util::completion::{Cancelled, Completion};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

type ShutdownHook = Box<dyn Fn(i32) + Send + Sync>;

const OP_ADD_ENTRY: &str = "bookie.add_entry";
const OP_RECOVERY_ADD_ENTRY: &str = "bookie.recovery_add_entry";
const OP_READ_ENTRY: &str = "bookie.read_entry";
const OP_SET_EXPLICIT_LAC: &str = "bookie.set_explicit_lac";
const COUNTER_WATCHERS_FIRED: &str = "bookie.watchers_fired";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BookieError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("invalid ledger id {0}")]
    InvalidLedgerId(i64),
    #[error("invalid entry id {0}")]
    InvalidEntryId(i64),
    #[error("master key required for ledger {ledger_id}")]
    MissingMasterKey { ledger_id: i64 },
    #[error("master key mismatch for ledger {ledger_id}")]
    Unauthorized { ledger_id: i64 },
    #[error("ledger {0} does not exist")]
    NoSuchLedger(i64),
    #[error("entry {entry_id} of ledger {ledger_id} does not exist")]
    NoSuchEntry { ledger_id: i64, entry_id: i64 },
    #[error("entry {entry_id} of ledger {ledger_id} already stored with different content")]
    EntryConflict { ledger_id: i64, entry_id: i64 },
    #[error("ledger {0} is fenced")]
    LedgerFenced(i64),
    #[error("no writable ledger directory available")]
    NoWritableDirectory,
    #[error("bookie is not running")]
    NotRunning,
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Storage(StorageError),
    #[error("journal failure: {0}")]
    Journal(String),
    #[error("request cancelled")]
    Cancelled,
}

impl BookieError {
    /// Result code as reported on the node protocol (0 is success).
    pub fn code(&self) -> i32 {
        match self {
            BookieError::NoSuchLedger(_) => 1,
            BookieError::NoSuchEntry { .. } => 2,
            BookieError::Unauthorized { .. } | BookieError::MissingMasterKey { .. } => 102,
            BookieError::LedgerFenced(_) => 104,
            BookieError::NoWritableDirectory => 105,
            BookieError::Codec(_)
            | BookieError::InvalidLedgerId(_)
            | BookieError::InvalidEntryId(_)
            | BookieError::InvalidArgument(_) => 100,
            _ => 101,
        }
    }
}

impl From<StorageError> for BookieError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NoSuchLedger(ledger_id) => BookieError::NoSuchLedger(ledger_id),
            StorageError::NoSuchEntry {
                ledger_id,
                entry_id,
            } => BookieError::NoSuchEntry {
                ledger_id,
                entry_id,
            },
            StorageError::EntryConflict {
                ledger_id,
                entry_id,
            } => BookieError::EntryConflict {
                ledger_id,
                entry_id,
            },
            StorageError::AlreadyInitialized => {
                BookieError::IllegalState("ledger storage already initialized".into())
            }
            StorageError::InvalidConfig(reason) => BookieError::InvalidConfig(reason),
            other => BookieError::Storage(other),
        }
    }
}

impl From<JournalError> for BookieError {
    fn from(err: JournalError) -> Self {
        BookieError::Journal(err.to_string())
    }
}

impl From<Cancelled> for BookieError {
    fn from(_: Cancelled) -> Self {
        BookieError::Cancelled
    }
}

/// Acknowledgement delivered once a write is accepted (and, unless the caller
/// asked to ack before sync, durable).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAck {
    pub ledger_id: i64,
    pub entry_id: i64,
    pub bookie_id: BookieId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Add { ack_before_sync: bool },
    Recovery,
}

impl WriteMode {
    fn op_name(self) -> &'static str {
        match self {
            WriteMode::Add { .. } => OP_ADD_ENTRY,
            WriteMode::Recovery => OP_RECOVERY_ADD_ENTRY,
        }
    }

    fn acks_before_sync(self) -> bool {
        matches!(self, WriteMode::Add { ack_before_sync: true })
    }
}

/// Returns the configured directories unchanged; an unset group is an error
/// because there is no implicit default.
pub fn current_directories(dirs: Option<&[PathBuf]>) -> Result<Vec<PathBuf>, BookieError> {
    dirs.map(<[PathBuf]>::to_vec)
        .ok_or_else(|| BookieError::InvalidArgument("directory list is not set".into()))
}

pub struct BookieBuilder {
    config: ServerConfig,
    bookie_id: Option<BookieId>,
    storage: Option<Arc<dyn LedgerStorage>>,
    journal: Option<Journal>,
    stats: Arc<dyn StatsSink>,
    resolver: Arc<dyn HostResolver>,
    disk_usage: Arc<dyn DiskUsageProbe>,
    fs: Arc<dyn FileSystem>,
    shutdown_hook: Option<ShutdownHook>,
}

impl BookieBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            bookie_id: None,
            storage: None,
            journal: None,
            stats: Arc::new(NullStats),
            resolver: Arc::new(SystemResolver),
            disk_usage: Arc::new(FixedDiskUsage::new(0.0)),
            fs: Arc::new(OsFileSystem),
            shutdown_hook: None,
        }
    }

    /// Skips identity resolution.
    pub fn bookie_id(mut self, id: BookieId) -> Self {
        self.bookie_id = Some(id);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn LedgerStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = stats;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn disk_usage(mut self, probe: Arc<dyn DiskUsageProbe>) -> Self {
        self.disk_usage = probe;
        self
    }

    pub fn filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Invoked once, with the exit code, at the end of the shutdown sequence.
    pub fn on_shutdown<F>(mut self, hook: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.shutdown_hook = Some(Box::new(hook));
        self
    }

    /// Validates configuration and directories, resolves identity and mounts
    /// storage. The node accepts requests only after [`Bookie::start`].
    pub fn build(self) -> Result<Bookie, BookieError> {
        self.config
            .validate()
            .map_err(|err| BookieError::InvalidConfig(err.to_string()))?;

        let journal_dirs = match self.journal {
            Some(_) => Vec::new(),
            None => current_directories(self.config.journal_dirs.as_deref())?,
        };
        for group in [DirGroup::Journal, DirGroup::Ledger, DirGroup::Index] {
            for dir in self.config.dirs(group).unwrap_or_default() {
                check_directory_structure(dir, self.fs.as_ref())?;
            }
        }

        let id = match self.bookie_id {
            Some(id) => id,
            None => get_bookie_id(&self.config, self.resolver.as_ref())?,
        };
        let journal = match self.journal {
            Some(journal) => journal,
            None => {
                let dir = journal_dirs.first().ok_or_else(|| {
                    BookieError::InvalidConfig("journal directories are empty".into())
                })?;
                Journal::open(dir, self.config.journal_sync_data)?
            }
        };
        let storage = mount_ledger_storage_offline(&self.config, self.storage)?;
        let dirs = LedgerDirsManager::new(&self.config, self.disk_usage);
        info!(
            "event=bookie_built bookie_id={} ledger_dirs={:?}",
            id,
            dirs.all_dirs()
        );

        Ok(Bookie {
            id,
            config: self.config,
            storage,
            journal,
            dirs,
            ledgers: RwLock::new(HashMap::new()),
            stats: self.stats,
            running: AtomicBool::new(false),
            shutdown: ShutdownTrigger::new(),
            shutdown_hook: self.shutdown_hook,
        })
    }
}

/// Storage node: admits entries for many ledgers, tracks each ledger's
/// last-add-confirmed and wakes readers waiting on it.
pub struct Bookie {
    id: BookieId,
    config: ServerConfig,
    storage: Arc<dyn LedgerStorage>,
    journal: Journal,
    dirs: LedgerDirsManager,
    ledgers: RwLock<HashMap<i64, Arc<LedgerDescriptor>>>,
    stats: Arc<dyn StatsSink>,
    running: AtomicBool,
    shutdown: ShutdownTrigger,
    shutdown_hook: Option<ShutdownHook>,
}

impl std::fmt::Debug for Bookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bookie")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .field("ledgers", &self.ledgers.read().len())
            .finish()
    }
}

impl Bookie {
    pub fn id(&self) -> &BookieId {
        &self.id
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Replays the journal and opens the node for requests.
    pub fn start(&self) -> Result<(), BookieError> {
        if self.shutdown.is_triggered() {
            return Err(BookieError::IllegalState("bookie has been shut down".into()));
        }
        if self.is_running() {
            return Ok(());
        }
        let replay = self.journal.replay()?;
        let records = replay.records.len();
        for record in replay.records {
            self.apply_journal_record(&record);
        }
        self.running.store(true, Ordering::Release);
        info!(
            "event=bookie_started bookie_id={} replayed_records={} ledgers={}",
            self.id,
            records,
            self.ledgers.read().len()
        );
        Ok(())
    }

    pub fn create_master_key_entry(ledger_id: i64, master_key: &[u8]) -> Result<Vec<u8>, BookieError> {
        Ok(codec::encode_master_key_record(ledger_id, master_key)?)
    }

    pub fn create_explicit_lac_entry(ledger_id: i64, lac: &[u8]) -> Result<Vec<u8>, BookieError> {
        if ledger_id < 0 {
            return Err(BookieError::InvalidLedgerId(ledger_id));
        }
        Ok(codec::encode_explicit_lac_record(ledger_id, lac)?)
    }

    /// Admits an encoded entry. Validation, authorization and storage errors
    /// are returned directly; the completion resolves once the write is
    /// queued (`ack_before_sync`) or durable.
    pub fn add_entry(
        &self,
        entry: &[u8],
        ack_before_sync: bool,
        master_key: &[u8],
    ) -> Result<Completion<WriteAck, BookieError>, BookieError> {
        self.write_entry(entry, master_key, WriteMode::Add { ack_before_sync })
    }

    /// Like [`Bookie::add_entry`] for recovery writers: always acks after sync
    /// and is accepted on fenced ledgers.
    pub fn recovery_add_entry(
        &self,
        entry: &[u8],
        master_key: &[u8],
    ) -> Result<Completion<WriteAck, BookieError>, BookieError> {
        self.write_entry(entry, master_key, WriteMode::Recovery)
    }

    pub fn read_entry(&self, ledger_id: i64, entry_id: i64) -> Result<Vec<u8>, BookieError> {
        let started = Instant::now();
        let result = self
            .ensure_running()
            .and_then(|_| self.ledger(ledger_id))
            .and_then(|_| Ok(self.storage.get_entry(ledger_id, entry_id)?));
        match &result {
            Ok(_) => self.stats.record_success(OP_READ_ENTRY, started.elapsed()),
            Err(err) => {
                debug!(
                    "event=bookie_read_failed ledger_id={} entry_id={} error={}",
                    ledger_id, entry_id, err
                );
                self.stats.record_failure(OP_READ_ENTRY, started.elapsed());
            }
        }
        result
    }

    pub fn read_last_add_confirmed(&self, ledger_id: i64) -> Result<i64, BookieError> {
        self.ensure_running()?;
        let ledger = self.ledger(ledger_id)?;
        let lac = ledger.lock().lac;
        Ok(lac)
    }

    /// Returns `true` when the LAC already exceeds `previous_lac` (or the
    /// ledger is fenced, so it can no longer grow). Otherwise registers
    /// `watcher`, if given, and returns `false`; the watcher then fires
    /// exactly once when the LAC passes `previous_lac`.
    pub fn wait_for_last_add_confirmed_update(
        &self,
        ledger_id: i64,
        previous_lac: i64,
        watcher: Option<&Watcher>,
    ) -> Result<bool, BookieError> {
        self.ensure_running()?;
        let ledger = self.ledger(ledger_id)?;
        let progress = ledger.lock();
        if progress.lac > previous_lac || progress.state == LedgerState::Fenced {
            return Ok(true);
        }
        if let Some(watcher) = watcher {
            ledger.watchers().register(previous_lac, watcher.clone());
        }
        Ok(false)
    }

    pub fn cancel_wait_for_last_add_confirmed_update(
        &self,
        ledger_id: i64,
        watcher: &Watcher,
    ) -> Result<(), BookieError> {
        let ledger = self.ledger(ledger_id)?;
        if ledger.watchers().cancel(watcher) {
            debug!(
                "event=lac_watch_cancelled ledger_id={} watcher={}",
                ledger_id,
                watcher.id()
            );
        }
        Ok(())
    }

    /// Stores an explicit LAC payload (`ledger_id`, `lac`, optional trailer)
    /// and advances the ledger's LAC as an add would.
    pub fn set_explicit_lac(
        &self,
        payload: &[u8],
        master_key: &[u8],
    ) -> Result<Completion<WriteAck, BookieError>, BookieError> {
        let started = Instant::now();
        let result = self.set_explicit_lac_inner(payload, master_key);
        match &result {
            Ok(_) => self
                .stats
                .record_success(OP_SET_EXPLICIT_LAC, started.elapsed()),
            Err(err) => {
                warn!("event=explicit_lac_rejected bookie_id={} error={}", self.id, err);
                self.stats
                    .record_failure(OP_SET_EXPLICIT_LAC, started.elapsed());
            }
        }
        result
    }

    pub fn get_explicit_lac(&self, ledger_id: i64) -> Result<Option<Vec<u8>>, BookieError> {
        self.ensure_running()?;
        let ledger = self.ledger(ledger_id)?;
        let explicit = ledger.lock().explicit_lac.clone();
        Ok(explicit)
    }

    /// Fences the ledger against further plain adds and returns its LAC.
    pub fn fence_ledger(&self, ledger_id: i64, master_key: &[u8]) -> Result<i64, BookieError> {
        self.ensure_running()?;
        if ledger_id < 0 {
            return Err(BookieError::InvalidLedgerId(ledger_id));
        }
        let ledger = self.authorized_ledger(ledger_id, master_key)?;
        let (lac, newly_fenced, fired) = {
            let mut progress = ledger.lock();
            let newly_fenced = progress.state != LedgerState::Fenced;
            if newly_fenced {
                self.journal.append(&codec::encode_fence_record(ledger_id))?;
                progress.state = LedgerState::Fenced;
            }
            // Fencing ends the ledger's growth; pending waiters are released.
            let fired = ledger.watchers().take_satisfied(i64::MAX);
            (progress.lac, newly_fenced, fired)
        };
        self.journal.sync()?;
        watch::fire(ledger_id, lac, &fired);
        if newly_fenced {
            info!("event=ledger_fenced ledger_id={} lac={}", ledger_id, lac);
        }
        Ok(lac)
    }

    pub fn ledger_state(&self, ledger_id: i64) -> Option<LedgerState> {
        self.ledgers
            .read()
            .get(&ledger_id)
            .map(|ledger| ledger.lock().state)
    }

    /// Makes every write accepted so far durable.
    pub fn flush(&self) -> Result<(), BookieError> {
        self.journal.sync()?;
        self.storage.flush()?;
        Ok(())
    }

    /// Runs the shutdown sequence once; every later call is a no-op that
    /// returns `false`.
    pub fn trigger_bookie_shutdown(&self, exit_code: i32) -> bool {
        self.shutdown
            .fire(exit_code, |code| self.shutdown_sequence(code))
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.shutdown.exit_code()
    }

    fn shutdown_sequence(&self, exit_code: i32) {
        self.running.store(false, Ordering::Release);
        if let Err(err) = self.flush() {
            error!(
                "event=bookie_shutdown_flush_failed bookie_id={} error={}",
                self.id, err
            );
        }
        if let Err(err) = self.storage.shutdown() {
            error!(
                "event=bookie_storage_shutdown_failed bookie_id={} error={}",
                self.id, err
            );
        }
        info!(
            "event=bookie_shutdown bookie_id={} exit_code={}",
            self.id, exit_code
        );
        if let Some(hook) = &self.shutdown_hook {
            hook(exit_code);
        }
    }

    fn write_entry(
        &self,
        entry: &[u8],
        master_key: &[u8],
        mode: WriteMode,
    ) -> Result<Completion<WriteAck, BookieError>, BookieError> {
        let started = Instant::now();
        let op = mode.op_name();
        match self.write_entry_inner(entry, master_key, mode) {
            Ok(completion) => {
                let stats = Arc::clone(&self.stats);
                completion.on_complete(move |outcome| match outcome {
                    Ok(_) => stats.record_success(op, started.elapsed()),
                    Err(_) => stats.record_failure(op, started.elapsed()),
                });
                Ok(completion)
            }
            Err(err) => {
                warn!(
                    "event=bookie_write_rejected bookie_id={} op={} error={}",
                    self.id, op, err
                );
                self.stats.record_failure(op, started.elapsed());
                Err(err)
            }
        }
    }

    fn write_entry_inner(
        &self,
        entry: &[u8],
        master_key: &[u8],
        mode: WriteMode,
    ) -> Result<Completion<WriteAck, BookieError>, BookieError> {
        self.ensure_running()?;
        let header = EntryHeader::decode(entry)?;
        if header.ledger_id < 0 {
            return Err(BookieError::InvalidLedgerId(header.ledger_id));
        }
        if header.entry_id < 0 {
            return Err(BookieError::InvalidEntryId(header.entry_id));
        }
        let ledger = self.authorized_ledger(header.ledger_id, master_key)?;

        let (lac, fired) = {
            let mut progress = ledger.lock();
            if progress.state == LedgerState::Fenced && mode != WriteMode::Recovery {
                return Err(BookieError::LedgerFenced(header.ledger_id));
            }
            match self.storage.get_entry(header.ledger_id, header.entry_id) {
                Ok(existing) if existing == entry => {
                    debug!(
                        "event=bookie_duplicate_entry ledger_id={} entry_id={}",
                        header.ledger_id, header.entry_id
                    );
                }
                Ok(_) => {
                    return Err(BookieError::EntryConflict {
                        ledger_id: header.ledger_id,
                        entry_id: header.entry_id,
                    })
                }
                Err(StorageError::NoSuchLedger(_)) | Err(StorageError::NoSuchEntry { .. }) => {
                    self.journal.append(entry)?;
                    self.storage
                        .put_entry(header.ledger_id, header.entry_id, entry.to_vec())?;
                }
                Err(err) => return Err(err.into()),
            }
            let fired = ledger.advance_and_collect(&mut progress, header.entry_id);
            (progress.lac, fired)
        };

        let ack = WriteAck {
            ledger_id: header.ledger_id,
            entry_id: header.entry_id,
            bookie_id: self.id.clone(),
        };
        let completion = Completion::new();
        if mode.acks_before_sync() {
            completion.complete(ack);
        } else {
            match self.journal.sync() {
                Ok(()) => {
                    completion.complete(ack);
                }
                Err(err) => {
                    completion.fail(err.into());
                }
            }
        }
        self.fire_watchers(header.ledger_id, lac, &fired);
        debug!(
            "event=bookie_entry_added bookie_id={} ledger_id={} entry_id={} lac={}",
            self.id, header.ledger_id, header.entry_id, lac
        );
        Ok(completion)
    }

    fn set_explicit_lac_inner(
        &self,
        payload: &[u8],
        master_key: &[u8],
    ) -> Result<Completion<WriteAck, BookieError>, BookieError> {
        self.ensure_running()?;
        let (ledger_id, lac_value) = codec::decode_lac_payload(payload)?;
        let record = Self::create_explicit_lac_entry(ledger_id, payload)?;
        let ledger = self.authorized_ledger(ledger_id, master_key)?;
        let (lac, fired) = {
            let mut progress = ledger.lock();
            self.journal.append(&record)?;
            progress.explicit_lac = Some(payload.to_vec());
            let fired = ledger.advance_and_collect(&mut progress, lac_value);
            (progress.lac, fired)
        };
        let completion = Completion::new();
        match self.journal.sync() {
            Ok(()) => {
                completion.complete(WriteAck {
                    ledger_id,
                    entry_id: lac_value,
                    bookie_id: self.id.clone(),
                });
            }
            Err(err) => {
                completion.fail(err.into());
            }
        }
        self.fire_watchers(ledger_id, lac, &fired);
        debug!(
            "event=explicit_lac_set bookie_id={} ledger_id={} explicit_lac={} lac={}",
            self.id, ledger_id, lac_value, lac
        );
        Ok(completion)
    }

    /// Resolves the ledger for a privileged operation, binding `master_key`
    /// on first use. Rejects empty keys and full disks before any state changes.
    fn authorized_ledger(
        &self,
        ledger_id: i64,
        master_key: &[u8],
    ) -> Result<Arc<LedgerDescriptor>, BookieError> {
        if master_key.is_empty() {
            return Err(BookieError::MissingMasterKey { ledger_id });
        }
        let existing = self.ledgers.read().get(&ledger_id).cloned();
        if let Some(ledger) = &existing {
            if !ledger.accepts_key(master_key) {
                return Err(BookieError::Unauthorized { ledger_id });
            }
        }
        if self.dirs.pick_writable_dir().is_none() {
            return Err(BookieError::NoWritableDirectory);
        }
        if let Some(ledger) = existing {
            return Ok(ledger);
        }

        let mut ledgers = self.ledgers.write();
        if let Some(ledger) = ledgers.get(&ledger_id) {
            return if ledger.accepts_key(master_key) {
                Ok(Arc::clone(ledger))
            } else {
                Err(BookieError::Unauthorized { ledger_id })
            };
        }
        self.journal
            .append(&codec::encode_master_key_record(ledger_id, master_key)?)?;
        let ledger = Arc::new(LedgerDescriptor::new(ledger_id, master_key.to_vec()));
        ledgers.insert(ledger_id, Arc::clone(&ledger));
        info!(
            "event=ledger_bound bookie_id={} ledger_id={}",
            self.id, ledger_id
        );
        Ok(ledger)
    }

    fn ledger(&self, ledger_id: i64) -> Result<Arc<LedgerDescriptor>, BookieError> {
        self.ledgers
            .read()
            .get(&ledger_id)
            .cloned()
            .ok_or(BookieError::NoSuchLedger(ledger_id))
    }

    fn ensure_running(&self) -> Result<(), BookieError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(BookieError::NotRunning)
        }
    }

    fn fire_watchers(&self, ledger_id: i64, lac: i64, fired: &[Watcher]) {
        if fired.is_empty() {
            return;
        }
        watch::fire(ledger_id, lac, fired);
        self.stats
            .inc_counter(COUNTER_WATCHERS_FIRED, fired.len() as u64);
    }

    fn apply_journal_record(&self, record: &[u8]) {
        let applied = match codec::record_kind(record) {
            Ok(RecordKind::MasterKey) => codec::decode_master_key_record(record).map(|key| {
                self.ledgers
                    .write()
                    .entry(key.ledger_id)
                    .or_insert_with(|| {
                        Arc::new(LedgerDescriptor::new(key.ledger_id, key.master_key))
                    });
            }),
            Ok(RecordKind::Entry) => EntryHeader::decode(record).map(|header| {
                if let Err(err) =
                    self.storage
                        .put_entry(header.ledger_id, header.entry_id, record.to_vec())
                {
                    warn!(
                        "event=journal_replay_entry_skipped ledger_id={} entry_id={} error={}",
                        header.ledger_id, header.entry_id, err
                    );
                    return;
                }
                if let Some(ledger) = self.ledgers.read().get(&header.ledger_id) {
                    ledger.lock().advance_lac(header.entry_id);
                }
            }),
            Ok(RecordKind::Fence) => codec::ledger_id_of_record(record).map(|ledger_id| {
                if let Some(ledger) = self.ledgers.read().get(&ledger_id) {
                    ledger.lock().state = LedgerState::Fenced;
                }
            }),
            Ok(RecordKind::ExplicitLac) => codec::decode_explicit_lac_record(record).and_then(
                |explicit| {
                    let (_, lac) = codec::decode_lac_payload(&explicit.lac)?;
                    if let Some(ledger) = self.ledgers.read().get(&explicit.ledger_id) {
                        let mut progress = ledger.lock();
                        progress.advance_lac(lac);
                        progress.explicit_lac = Some(explicit.lac);
                    }
                    Ok(())
                },
            ),
            Err(err) => Err(err),
        };
        if let Err(err) = applied {
            warn!(
                "event=journal_replay_record_skipped bookie_id={} bytes={} error={}",
                self.id,
                record.len(),
                err
            );
        }
    }
}
