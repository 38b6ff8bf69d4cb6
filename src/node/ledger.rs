use super::watch::{LastConfirmedWatchRegistry, Watcher};
use crate::codec::INVALID_ENTRY_ID;
use parking_lot::{Mutex, MutexGuard};

/// Lifecycle of a ledger at a node. A ledger the node has never seen has no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerState {
    Open,
    Fenced,
}

#[derive(Debug)]
pub(crate) struct LedgerProgress {
    pub(crate) lac: i64,
    pub(crate) explicit_lac: Option<Vec<u8>>,
    pub(crate) state: LedgerState,
}

impl LedgerProgress {
    /// Moves the LAC forward to `candidate` if it is higher; the LAC never decreases.
    pub(crate) fn advance_lac(&mut self, candidate: i64) -> bool {
        if candidate > self.lac {
            self.lac = candidate;
            true
        } else {
            false
        }
    }
}

/// Node-side record of one ledger. The master key is bound once; everything
/// mutable sits behind the per-ledger lock.
#[derive(Debug)]
pub(crate) struct LedgerDescriptor {
    master_key: Vec<u8>,
    progress: Mutex<LedgerProgress>,
    watchers: LastConfirmedWatchRegistry,
}

impl LedgerDescriptor {
    pub(crate) fn new(ledger_id: i64, master_key: Vec<u8>) -> Self {
        Self {
            master_key,
            progress: Mutex::new(LedgerProgress {
                lac: INVALID_ENTRY_ID,
                explicit_lac: None,
                state: LedgerState::Open,
            }),
            watchers: LastConfirmedWatchRegistry::new(ledger_id),
        }
    }

    pub(crate) fn accepts_key(&self, master_key: &[u8]) -> bool {
        self.master_key == master_key
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, LedgerProgress> {
        self.progress.lock()
    }

    pub(crate) fn watchers(&self) -> &LastConfirmedWatchRegistry {
        &self.watchers
    }

    /// Applies a LAC candidate and hands back the watchers it satisfied.
    pub(crate) fn advance_and_collect(
        &self,
        progress: &mut LedgerProgress,
        candidate: i64,
    ) -> Vec<Watcher> {
        if progress.advance_lac(candidate) {
            self.watchers.take_satisfied(progress.lac)
        } else {
            Vec::new()
        }
    }
}
