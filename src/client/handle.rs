use super::metadata::{LedgerMetadata, LedgerMetadataStore};
use super::ops::{self, PendingQueue};
use super::quorum::RoundRobinSchedule;
use super::transport::BookieClient;
use super::ClientError;
use crate::codec::{DigestType, INVALID_ENTRY_ID};
use crate::telemetry::StatsSink;
use crate::util::completion::Completion;
use log::{error, info, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub ledger_id: i64,
    pub entry_id: i64,
    pub payload: Vec<u8>,
}

/// Result of a long-poll read: the LAC observed and, when the requested
/// entry became available in time, the entry itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastConfirmedAndEntry {
    pub last_add_confirmed: i64,
    pub entry: Option<LedgerEntry>,
}

pub(crate) struct HandleParts {
    pub(crate) metadata: LedgerMetadata,
    pub(crate) ensemble: Vec<Arc<dyn BookieClient>>,
    pub(crate) master_key: Vec<u8>,
    pub(crate) read_only: bool,
    pub(crate) runtime: Handle,
    pub(crate) add_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) explicit_lac_interval: Option<Duration>,
    pub(crate) stats: Arc<dyn StatsSink>,
    pub(crate) store: Arc<dyn LedgerMetadataStore>,
}

pub(super) struct HandleInner {
    pub(super) ledger_id: i64,
    pub(super) metadata: RwLock<LedgerMetadata>,
    pub(super) ensemble: Vec<Arc<dyn BookieClient>>,
    pub(super) schedule: RoundRobinSchedule,
    pub(super) digest: DigestType,
    pub(super) master_key: Vec<u8>,
    pub(super) last_add_pushed: AtomicI64,
    pub(super) last_add_confirmed: AtomicI64,
    pub(super) length: AtomicU64,
    pub(super) pending: Mutex<PendingQueue>,
    pub(super) closed: AtomicBool,
    pub(super) read_only: bool,
    pub(super) runtime: Handle,
    pub(super) add_timeout: Duration,
    pub(super) read_timeout: Duration,
    pub(super) stats: Arc<dyn StatsSink>,
    pub(super) store: Arc<dyn LedgerMetadataStore>,
    pub(super) last_explicit_lac_sent: AtomicI64,
    lac_flusher: Mutex<Option<JoinHandle<()>>>,
}

impl HandleInner {
    pub(super) fn lac(&self) -> i64 {
        self.last_add_confirmed.load(Ordering::Acquire)
    }

    pub(super) fn advance_lac(&self, candidate: i64) {
        self.last_add_confirmed
            .fetch_max(candidate, Ordering::AcqRel);
    }

    pub(super) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Highest entry id a reader may ask for.
    pub(super) fn confirmed_bound(&self) -> i64 {
        let metadata = self.metadata.read();
        if metadata.is_closed() {
            metadata.last_entry_id
        } else {
            self.lac()
        }
    }

    pub(super) fn check_writable(&self) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::LedgerClosed(self.ledger_id));
        }
        if self.read_only {
            return Err(ClientError::IllegalOp(format!(
                "ledger {} was opened read-only",
                self.ledger_id
            )));
        }
        Ok(())
    }

    /// Seals the ledger at the current LAC after an add could not be
    /// replicated.
    pub(super) fn close_on_error(&self) {
        self.closed.store(true, Ordering::Release);
        self.stop_lac_flusher();
        if let Err(err) = self.seal_metadata(self.lac()) {
            error!(
                "event=ledger_close_failed ledger_id={} error={}",
                self.ledger_id, err
            );
        }
    }

    /// Records the ledger as closed at `last_entry_id`. A record already
    /// closed by a recovering opener is adopted instead of overwritten.
    pub(super) fn seal_metadata(&self, last_entry_id: i64) -> Result<(), ClientError> {
        let stored = self.store.read(self.ledger_id)?;
        let sealed = {
            let mut metadata = self.metadata.write();
            if metadata.is_closed() {
                return Ok(());
            }
            if stored.is_closed() {
                let recovered = stored.last_entry_id;
                *metadata = stored;
                drop(metadata);
                warn!(
                    "event=ledger_closed_by_recovery ledger_id={} last_entry_id={} local_lac={}",
                    self.ledger_id, recovered, last_entry_id
                );
                return if recovered == last_entry_id {
                    Ok(())
                } else {
                    Err(ClientError::LedgerFenced(self.ledger_id))
                };
            }
            metadata.close(last_entry_id);
            metadata.clone()
        };
        self.store.write(sealed)?;
        info!(
            "event=ledger_closed ledger_id={} last_entry_id={}",
            self.ledger_id, last_entry_id
        );
        Ok(())
    }

    fn stop_lac_flusher(&self) {
        if let Some(flusher) = self.lac_flusher.lock().take() {
            flusher.abort();
        }
    }
}

/// Writer or reader over one ledger. Cloning shares the same handle.
#[derive(Clone)]
pub struct LedgerHandle {
    inner: Arc<HandleInner>,
}

impl std::fmt::Debug for LedgerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerHandle")
            .field("ledger_id", &self.inner.ledger_id)
            .field("last_add_confirmed", &self.inner.lac())
            .field("closed", &self.inner.is_closed())
            .field("read_only", &self.inner.read_only)
            .finish()
    }
}

impl LedgerHandle {
    pub(crate) fn new(parts: HandleParts) -> Self {
        let metadata = parts.metadata;
        let schedule = RoundRobinSchedule::new(
            metadata.ensemble_size,
            metadata.write_quorum,
            metadata.ack_quorum,
        );
        let closed = metadata.is_closed();
        let lac = if closed {
            metadata.last_entry_id
        } else {
            INVALID_ENTRY_ID
        };
        let inner = Arc::new(HandleInner {
            ledger_id: metadata.ledger_id,
            digest: metadata.digest_type,
            metadata: RwLock::new(metadata),
            ensemble: parts.ensemble,
            schedule,
            master_key: parts.master_key,
            last_add_pushed: AtomicI64::new(lac),
            last_add_confirmed: AtomicI64::new(lac),
            length: AtomicU64::new(0),
            pending: Mutex::new(PendingQueue::default()),
            closed: AtomicBool::new(closed),
            read_only: parts.read_only,
            runtime: parts.runtime,
            add_timeout: parts.add_timeout,
            read_timeout: parts.read_timeout,
            stats: parts.stats,
            store: parts.store,
            last_explicit_lac_sent: AtomicI64::new(INVALID_ENTRY_ID),
            lac_flusher: Mutex::new(None),
        });
        let flush_interval = parts
            .explicit_lac_interval
            .filter(|_| !parts.read_only && !closed);
        if let Some(interval) = flush_interval {
            let flusher = spawn_lac_flusher(&inner.runtime, Arc::downgrade(&inner), interval);
            *inner.lac_flusher.lock() = Some(flusher);
        }
        Self { inner }
    }

    /// Fences the ensemble and recovers the tail; the handle ends up closed.
    pub(crate) fn recover(&self) -> Result<i64, ClientError> {
        let last = ops::recover(&self.inner)?;
        self.inner.advance_lac(last);
        self.inner
            .last_add_pushed
            .fetch_max(last, Ordering::AcqRel);
        self.inner.seal_metadata(last)?;
        self.inner.closed.store(true, Ordering::Release);
        Ok(last)
    }

    pub fn ledger_id(&self) -> i64 {
        self.inner.ledger_id
    }

    pub fn metadata(&self) -> LedgerMetadata {
        self.inner.metadata.read().clone()
    }

    pub fn get_last_add_confirmed(&self) -> i64 {
        self.inner.lac()
    }

    pub fn get_last_add_pushed(&self) -> i64 {
        self.inner.last_add_pushed.load(Ordering::Acquire)
    }

    /// Payload bytes this handle has had acknowledged.
    pub fn length(&self) -> u64 {
        self.inner.length.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.read_only
    }

    /// Appends `data` and blocks until the ack quorum stored it.
    pub fn add_entry(&self, data: &[u8]) -> Result<i64, ClientError> {
        self.append_async(data).join()
    }

    /// Appends `data[offset..offset + length]`; `callback` receives the entry id
    /// or the failure. A range outside `data` is rejected before anything is sent.
    pub fn async_add_entry<F>(
        &self,
        data: &[u8],
        offset: usize,
        length: usize,
        callback: F,
    ) -> Result<(), ClientError>
    where
        F: FnOnce(Result<i64, ClientError>) + Send + 'static,
    {
        let slice = offset
            .checked_add(length)
            .and_then(|end| data.get(offset..end))
            .ok_or(ClientError::IndexOutOfBounds {
                offset,
                length,
                len: data.len(),
            })?;
        self.append_async(slice)
            .on_complete(move |outcome| callback(outcome.clone()));
        Ok(())
    }

    pub fn append_async(&self, data: &[u8]) -> Completion<i64, ClientError> {
        ops::submit_add(&self.inner, data)
    }

    pub fn read_entries(&self, first: i64, last: i64) -> Result<Vec<LedgerEntry>, ClientError> {
        self.read_async(first, last).join()
    }

    pub fn async_read_entries<F>(&self, first: i64, last: i64, callback: F)
    where
        F: FnOnce(Result<Vec<LedgerEntry>, ClientError>) + Send + 'static,
    {
        self.read_async(first, last)
            .on_complete(move |outcome| callback(outcome.clone()));
    }

    /// Reads `first..=last`; every entry must be at or below the LAC.
    pub fn read_async(&self, first: i64, last: i64) -> Completion<Vec<LedgerEntry>, ClientError> {
        ops::read_range(&self.inner, first, last)
    }

    pub fn read_last_confirmed(&self) -> Result<i64, ClientError> {
        self.read_last_confirmed_async().join()
    }

    pub fn async_read_last_confirmed<F>(&self, callback: F)
    where
        F: FnOnce(Result<i64, ClientError>) + Send + 'static,
    {
        self.read_last_confirmed_async()
            .on_complete(move |outcome| callback(outcome.clone()));
    }

    /// A closed ledger answers from its metadata without contacting any node.
    pub fn read_last_confirmed_async(&self) -> Completion<i64, ClientError> {
        let metadata = self.inner.metadata.read();
        if metadata.is_closed() {
            return Completion::completed(metadata.last_entry_id);
        }
        drop(metadata);
        ops::read_lac(&self.inner)
    }

    pub fn read_last_confirmed_and_entry(
        &self,
        entry_id: i64,
        timeout: Duration,
        parallel: bool,
    ) -> Result<LastConfirmedAndEntry, ClientError> {
        self.read_last_confirmed_and_entry_async(entry_id, timeout, parallel)
            .join()
    }

    pub fn async_read_last_confirmed_and_entry<F>(
        &self,
        entry_id: i64,
        timeout_ms: u64,
        parallel: bool,
        callback: F,
    ) where
        F: FnOnce(Result<LastConfirmedAndEntry, ClientError>) + Send + 'static,
    {
        self.read_last_confirmed_and_entry_async(
            entry_id,
            Duration::from_millis(timeout_ms),
            parallel,
        )
        .on_complete(move |outcome| callback(outcome.clone()));
    }

    /// Waits up to `timeout` for `entry_id` to be confirmed and returns it.
    /// With `parallel` every ensemble member is polled, otherwise only the
    /// entry's write set.
    pub fn read_last_confirmed_and_entry_async(
        &self,
        entry_id: i64,
        timeout: Duration,
        parallel: bool,
    ) -> Completion<LastConfirmedAndEntry, ClientError> {
        if entry_id < 0 {
            return Completion::failed(ClientError::IncorrectParameter(format!(
                "invalid entry id {}",
                entry_id
            )));
        }
        let closed_at = {
            let metadata = self.inner.metadata.read();
            metadata.is_closed().then_some(metadata.last_entry_id)
        };
        if let Some(last) = closed_at.or_else(|| self.inner.is_closed().then(|| self.inner.lac())) {
            return Completion::completed(LastConfirmedAndEntry {
                last_add_confirmed: last,
                entry: None,
            });
        }
        let lac = self.inner.lac();
        if entry_id < lac {
            return Completion::completed(LastConfirmedAndEntry {
                last_add_confirmed: lac,
                entry: None,
            });
        }
        if entry_id == lac {
            return ops::read_entry(&self.inner, entry_id).map_result(move |outcome| {
                outcome.clone().map(|entry| LastConfirmedAndEntry {
                    last_add_confirmed: lac,
                    entry: Some(entry),
                })
            });
        }
        ops::read_lac_and_entry(&self.inner, entry_id, timeout, parallel)
    }

    /// Pushes the current LAC to the ensemble out of band.
    pub fn send_explicit_lac(&self) -> Completion<i64, ClientError> {
        ops::send_explicit_lac(&self.inner)
    }

    pub fn read_explicit_last_confirmed(&self) -> Result<i64, ClientError> {
        self.read_explicit_last_confirmed_async().join()
    }

    pub fn read_explicit_last_confirmed_async(&self) -> Completion<i64, ClientError> {
        ops::read_explicit_lac(&self.inner)
    }

    /// Waits for outstanding adds, then records the ledger as closed at its
    /// LAC. Read-only handles only close locally. Calling again is a no-op.
    pub fn close(&self) -> Result<(), ClientError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.stop_lac_flusher();
        if self.inner.read_only {
            return Ok(());
        }
        let outstanding = self.inner.pending.lock().completions();
        for add in outstanding {
            if let Err(err) = add.join() {
                warn!(
                    "event=pending_add_failed_during_close ledger_id={} error={}",
                    self.inner.ledger_id, err
                );
            }
        }
        self.inner.seal_metadata(self.inner.lac())
    }
}

/// Periodically pushes the LAC out of band while it keeps advancing. Holds
/// only a weak reference so a dropped handle ends the task.
fn spawn_lac_flusher(
    runtime: &Handle,
    inner: Weak<HandleInner>,
    interval: Duration,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(handle) = inner.upgrade() else {
                break;
            };
            if handle.is_closed() {
                break;
            }
            let lac = handle.lac();
            if lac <= handle.last_explicit_lac_sent.load(Ordering::Acquire) {
                continue;
            }
            let send = ops::send_explicit_lac(&handle);
            drop(handle);
            if let Err(err) = send.await {
                warn!("event=explicit_lac_flush_failed lac={} error={}", lac, err);
            }
        }
    })
}
