//! Per-ledger registry of readers waiting for the last-add-confirmed to advance.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_WATCHER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastAddConfirmedUpdate {
    pub ledger_id: i64,
    pub last_add_confirmed: i64,
}

/// Callback handle; two watchers are equal only if they are clones of the same registration.
#[derive(Clone)]
pub struct Watcher {
    id: u64,
    callback: Arc<dyn Fn(LastAddConfirmedUpdate) + Send + Sync>,
}

impl Watcher {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(LastAddConfirmedUpdate) + Send + Sync + 'static,
    {
        Self {
            id: NEXT_WATCHER_ID.fetch_add(1, Ordering::Relaxed),
            callback: Arc::new(callback),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn notify(&self, update: LastAddConfirmedUpdate) {
        (self.callback)(update)
    }
}

impl PartialEq for Watcher {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Watcher {}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher").field("id", &self.id).finish()
    }
}

#[derive(Debug)]
struct Registration {
    threshold: i64,
    watcher: Watcher,
}

/// Pending watchers of one ledger. A watcher leaves the registry either by
/// firing or by being cancelled, never both.
#[derive(Debug)]
pub struct LastConfirmedWatchRegistry {
    ledger_id: i64,
    pending: Mutex<HashMap<u64, Registration>>,
}

impl LastConfirmedWatchRegistry {
    pub fn new(ledger_id: i64) -> Self {
        Self {
            ledger_id,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn ledger_id(&self) -> i64 {
        self.ledger_id
    }

    /// Waits for the LAC to move strictly past `threshold`. Re-registering
    /// the same watcher replaces its threshold.
    pub fn register(&self, threshold: i64, watcher: Watcher) {
        self.pending
            .lock()
            .insert(watcher.id, Registration { threshold, watcher });
    }

    /// Returns `false` when the watcher already fired or was never registered.
    pub fn cancel(&self, watcher: &Watcher) -> bool {
        self.pending.lock().remove(&watcher.id).is_some()
    }

    /// Removes every watcher satisfied by `lac`; the caller fires them.
    pub fn take_satisfied(&self, lac: i64) -> Vec<Watcher> {
        let mut pending = self.pending.lock();
        let ready: Vec<u64> = pending
            .iter()
            .filter(|(_, registration)| lac > registration.threshold)
            .map(|(id, _)| *id)
            .collect();
        ready
            .into_iter()
            .filter_map(|id| pending.remove(&id))
            .map(|registration| registration.watcher)
            .collect()
    }

    /// Fires and removes satisfied watchers outside the registry lock.
    pub fn notify(&self, lac: i64) -> usize {
        let fired = self.take_satisfied(lac);
        fire(self.ledger_id, lac, &fired);
        fired.len()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn fire(ledger_id: i64, lac: i64, watchers: &[Watcher]) {
    let update = LastAddConfirmedUpdate {
        ledger_id,
        last_add_confirmed: lac,
    };
    for watcher in watchers {
        watcher.notify(update);
    }
}
