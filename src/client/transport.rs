use super::ClientError;
use crate::node::{Bookie, BookieId, Watcher, WriteAck};
use crate::util::completion::Completion;
use log::debug;
use parking_lot::RwLock;
use std::sync::Arc;

/// Request seam between the quorum client and a single node. Every call
/// answers through a [`Completion`]; a node that never answers simply never
/// settles it, and the caller's timer decides.
pub trait BookieClient: Send + Sync {
    fn bookie_id(&self) -> &BookieId;
    fn is_available(&self) -> bool;
    fn add_entry(
        &self,
        entry: Arc<[u8]>,
        master_key: &[u8],
        recovery: bool,
    ) -> Completion<WriteAck, ClientError>;
    fn read_entry(&self, ledger_id: i64, entry_id: i64) -> Completion<Vec<u8>, ClientError>;
    fn read_last_add_confirmed(&self, ledger_id: i64) -> Completion<i64, ClientError>;
    /// Resolves with the node's LAC once it exceeds `previous_lac`.
    /// Cancelling the completion withdraws the wait at the node.
    fn read_lac_long_poll(&self, ledger_id: i64, previous_lac: i64)
        -> Completion<i64, ClientError>;
    fn write_lac(&self, payload: Vec<u8>, master_key: &[u8]) -> Completion<WriteAck, ClientError>;
    fn read_explicit_lac(&self, ledger_id: i64) -> Completion<Option<Vec<u8>>, ClientError>;
    fn fence_ledger(&self, ledger_id: i64, master_key: &[u8]) -> Completion<i64, ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Up,
    /// Requests fail immediately.
    Down,
    /// Requests are accepted but never answered.
    Unresponsive,
}

/// In-process transport calling straight into a [`Bookie`].
pub struct LocalBookieClient {
    bookie: Arc<Bookie>,
    state: RwLock<NodeState>,
}

impl LocalBookieClient {
    pub fn new(bookie: Arc<Bookie>) -> Self {
        Self {
            bookie,
            state: RwLock::new(NodeState::Up),
        }
    }

    pub fn bookie(&self) -> &Arc<Bookie> {
        &self.bookie
    }

    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    pub fn set_state(&self, state: NodeState) {
        debug!(
            "event=bookie_client_state bookie_id={} state={:?}",
            self.bookie.id(),
            state
        );
        *self.state.write() = state;
    }

    fn dispatch<T, F>(&self, call: F) -> Completion<T, ClientError>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&Bookie) -> Completion<T, ClientError>,
    {
        match self.state() {
            NodeState::Up => call(&self.bookie),
            NodeState::Down => Completion::failed(ClientError::BookieHandleNotAvailable(
                self.bookie.id().clone(),
            )),
            NodeState::Unresponsive => Completion::new(),
        }
    }
}

impl std::fmt::Debug for LocalBookieClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBookieClient")
            .field("bookie_id", self.bookie.id())
            .field("state", &self.state())
            .finish()
    }
}

fn settle<T>(result: Result<T, crate::node::BookieError>) -> Completion<T, ClientError>
where
    T: Send + Sync + 'static,
{
    match result {
        Ok(value) => Completion::completed(value),
        Err(err) => Completion::failed(err.into()),
    }
}

fn forward(
    result: Result<Completion<WriteAck, crate::node::BookieError>, crate::node::BookieError>,
) -> Completion<WriteAck, ClientError> {
    match result {
        Ok(ack) => ack.map_result(|outcome| outcome.clone().map_err(ClientError::from)),
        Err(err) => Completion::failed(err.into()),
    }
}

impl BookieClient for LocalBookieClient {
    fn bookie_id(&self) -> &BookieId {
        self.bookie.id()
    }

    fn is_available(&self) -> bool {
        self.state() == NodeState::Up && self.bookie.is_running()
    }

    fn add_entry(
        &self,
        entry: Arc<[u8]>,
        master_key: &[u8],
        recovery: bool,
    ) -> Completion<WriteAck, ClientError> {
        self.dispatch(|bookie| {
            if recovery {
                forward(bookie.recovery_add_entry(&entry, master_key))
            } else {
                forward(bookie.add_entry(&entry, false, master_key))
            }
        })
    }

    fn read_entry(&self, ledger_id: i64, entry_id: i64) -> Completion<Vec<u8>, ClientError> {
        self.dispatch(|bookie| settle(bookie.read_entry(ledger_id, entry_id)))
    }

    fn read_last_add_confirmed(&self, ledger_id: i64) -> Completion<i64, ClientError> {
        self.dispatch(|bookie| settle(bookie.read_last_add_confirmed(ledger_id)))
    }

    fn read_lac_long_poll(
        &self,
        ledger_id: i64,
        previous_lac: i64,
    ) -> Completion<i64, ClientError> {
        let bookie = Arc::clone(&self.bookie);
        self.dispatch(move |_| {
            let completion: Completion<i64, ClientError> = Completion::new();
            let target = completion.clone();
            let watcher = Watcher::new(move |update| {
                target.complete(update.last_add_confirmed);
            });
            match bookie.wait_for_last_add_confirmed_update(ledger_id, previous_lac, Some(&watcher))
            {
                Ok(true) => match bookie.read_last_add_confirmed(ledger_id) {
                    Ok(lac) => {
                        completion.complete(lac);
                    }
                    Err(err) => {
                        completion.fail(err.into());
                    }
                },
                Ok(false) => {
                    let bookie = Arc::clone(&bookie);
                    completion.on_cancel(move || {
                        let _ = bookie.cancel_wait_for_last_add_confirmed_update(ledger_id, &watcher);
                    });
                }
                Err(err) => {
                    completion.fail(err.into());
                }
            }
            completion
        })
    }

    fn write_lac(&self, payload: Vec<u8>, master_key: &[u8]) -> Completion<WriteAck, ClientError> {
        self.dispatch(|bookie| forward(bookie.set_explicit_lac(&payload, master_key)))
    }

    fn read_explicit_lac(&self, ledger_id: i64) -> Completion<Option<Vec<u8>>, ClientError> {
        self.dispatch(|bookie| settle(bookie.get_explicit_lac(ledger_id)))
    }

    fn fence_ledger(&self, ledger_id: i64, master_key: &[u8]) -> Completion<i64, ClientError> {
        self.dispatch(|bookie| settle(bookie.fence_ledger(ledger_id, master_key)))
    }
}
