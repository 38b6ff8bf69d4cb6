//! Per-request state machines behind [`super::LedgerHandle`].

use super::handle::{HandleInner, LastConfirmedAndEntry, LedgerEntry};
use super::quorum::AckSet;
use super::ClientError;
use crate::codec::{self, DecodedEntry, EntryHeader, INVALID_ENTRY_ID};
use crate::node::WriteAck;
use crate::util::completion::Completion;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub(super) const OP_ADD_ENTRY: &str = "client.add_entry";
pub(super) const OP_READ_ENTRY: &str = "client.read_entry";
pub(super) const OP_READ_LAC: &str = "client.read_lac";
pub(super) const OP_LONG_POLL: &str = "client.long_poll";
pub(super) const COUNTER_DIGEST_MISMATCH: &str = "client.digest_mismatch";

/// Fails `completion` with [`ClientError::Timeout`] unless it settles first.
pub(super) fn arm_timeout<T>(
    runtime: &tokio::runtime::Handle,
    completion: &Completion<T, ClientError>,
    timeout: Duration,
) where
    T: Send + Sync + 'static,
{
    if completion.is_done() {
        return;
    }
    let target = completion.clone();
    let timer = runtime.spawn(async move {
        tokio::time::sleep(timeout).await;
        target.fail(ClientError::Timeout);
    });
    completion.on_complete(move |_| timer.abort());
}

/// Adds that have been sent but not yet handed back to their callers.
/// Entries leave strictly from the front.
#[derive(Default)]
pub(super) struct PendingQueue {
    ops: VecDeque<Arc<PendingAddOp>>,
    draining: bool,
}

impl PendingQueue {
    pub(super) fn completions(&self) -> Vec<Completion<i64, ClientError>> {
        self.ops.iter().map(|op| op.completion.clone()).collect()
    }
}

pub(super) struct PendingAddOp {
    entry_id: i64,
    entry: Arc<[u8]>,
    payload_len: u64,
    started: Instant,
    completion: Completion<i64, ClientError>,
    progress: Mutex<AddProgress>,
}

struct AddProgress {
    acks: AckSet,
    resolution: Option<Result<(), ClientError>>,
}

impl PendingAddOp {
    /// Applies one node's answer. Returns `true` when this answer decided the op.
    fn record(&self, slot: usize, outcome: &Result<WriteAck, ClientError>) -> bool {
        let mut progress = self.progress.lock();
        if progress.resolution.is_some() {
            return false;
        }
        match outcome {
            Ok(_) => {
                if progress.acks.complete(slot) {
                    progress.resolution = Some(Ok(()));
                    return true;
                }
            }
            Err(err) => {
                debug!(
                    "event=add_response_failed entry_id={} slot={} error={}",
                    self.entry_id, slot, err
                );
                if matches!(
                    err,
                    ClientError::LedgerFenced(_) | ClientError::Unauthorized(_)
                ) {
                    progress.resolution = Some(Err(err.clone()));
                    return true;
                }
                if !progress.acks.fail(slot) {
                    progress.resolution = Some(Err(ClientError::NotEnoughBookies(format!(
                        "entry {} acknowledged by {} nodes, {} failed",
                        self.entry_id,
                        progress.acks.acked(),
                        progress.acks.failed()
                    ))));
                    return true;
                }
            }
        }
        false
    }

    fn resolution(&self) -> Option<Result<(), ClientError>> {
        self.progress.lock().resolution.clone()
    }
}

/// Assigns the next entry id, encodes the entry and sends it to its write set.
pub(super) fn submit_add(inner: &Arc<HandleInner>, payload: &[u8]) -> Completion<i64, ClientError> {
    let op = {
        let mut queue = inner.pending.lock();
        if let Err(err) = inner.check_writable() {
            return Completion::failed(err);
        }
        let entry_id = inner.last_add_pushed.load(Ordering::Acquire) + 1;
        inner.last_add_pushed.store(entry_id, Ordering::Release);
        let header = EntryHeader::new(inner.ledger_id, entry_id, inner.lac());
        let op = Arc::new(PendingAddOp {
            entry_id,
            entry: codec::encode_entry(header, payload, inner.digest).into(),
            payload_len: payload.len() as u64,
            started: Instant::now(),
            completion: Completion::new(),
            progress: Mutex::new(AddProgress {
                acks: inner.schedule.ack_set(),
                resolution: None,
            }),
        });
        queue.ops.push_back(Arc::clone(&op));
        op
    };
    let completion = op.completion.clone();
    for slot in inner.schedule.write_set(op.entry_id) {
        let request =
            inner.ensemble[slot].add_entry(Arc::clone(&op.entry), &inner.master_key, false);
        arm_timeout(&inner.runtime, &request, inner.add_timeout);
        let handle = Arc::clone(inner);
        let pending = Arc::clone(&op);
        request.on_complete(move |outcome| {
            if pending.record(slot, outcome) {
                drain(&handle);
            }
        });
    }
    completion
}

/// Hands decided ops back to their callers in entry-id order. Only one
/// thread drains at a time; a late arrival leaves the work to it.
fn drain(inner: &Arc<HandleInner>) {
    {
        let mut queue = inner.pending.lock();
        if queue.draining {
            return;
        }
        queue.draining = true;
    }
    loop {
        let next = {
            let mut queue = inner.pending.lock();
            let ready = queue
                .ops
                .front()
                .is_some_and(|op| op.resolution().is_some());
            if ready {
                queue.ops.pop_front()
            } else {
                queue.draining = false;
                None
            }
        };
        match next {
            Some(op) => finish_add(inner, op),
            None => return,
        }
    }
}

fn finish_add(inner: &Arc<HandleInner>, op: Arc<PendingAddOp>) {
    let Some(resolution) = op.resolution() else {
        return;
    };
    match resolution {
        Ok(()) => {
            inner.advance_lac(op.entry_id);
            inner.length.fetch_add(op.payload_len, Ordering::AcqRel);
            inner
                .stats
                .record_success(OP_ADD_ENTRY, op.started.elapsed());
            op.completion.complete(op.entry_id);
        }
        Err(err) => {
            warn!(
                "event=add_entry_failed ledger_id={} entry_id={} error={}",
                inner.ledger_id, op.entry_id, err
            );
            inner
                .stats
                .record_failure(OP_ADD_ENTRY, op.started.elapsed());
            op.completion.fail(err.clone());
            let abandoned: Vec<Arc<PendingAddOp>> = inner.pending.lock().ops.drain(..).collect();
            for later in abandoned {
                inner
                    .stats
                    .record_failure(OP_ADD_ENTRY, later.started.elapsed());
                later.completion.fail(err.clone());
            }
            inner.close_on_error();
        }
    }
}

/// Decodes a node's copy of `entry_id` and checks it belongs to this ledger.
pub(super) fn verify_entry(
    inner: &HandleInner,
    entry_id: i64,
    bytes: &[u8],
) -> Result<DecodedEntry, ClientError> {
    let mismatch = ClientError::DigestMismatch {
        ledger_id: inner.ledger_id,
        entry_id,
    };
    let decoded = codec::decode_entry(bytes, inner.digest).map_err(|_| mismatch.clone())?;
    if decoded.header.ledger_id != inner.ledger_id || decoded.header.entry_id != entry_id {
        return Err(mismatch);
    }
    Ok(decoded)
}

fn note_read_failure(inner: &HandleInner, err: &ClientError) {
    if matches!(err, ClientError::DigestMismatch { .. }) {
        warn!(
            "event=entry_digest_mismatch ledger_id={} error={}",
            inner.ledger_id, err
        );
        inner.stats.inc_counter(COUNTER_DIGEST_MISMATCH, 1);
    }
}

struct ReadProgress {
    acks: AckSet,
    payload: Option<Vec<u8>>,
    last_error: Option<ClientError>,
}

/// Reads one entry from its write set; succeeds once `ack_quorum` copies agree.
pub(super) fn read_entry(inner: &Arc<HandleInner>, entry_id: i64) -> Completion<LedgerEntry, ClientError> {
    let started = Instant::now();
    let completion: Completion<LedgerEntry, ClientError> = Completion::new();
    let stats = Arc::clone(&inner.stats);
    completion.on_complete(move |outcome| match outcome {
        Ok(_) => stats.record_success(OP_READ_ENTRY, started.elapsed()),
        Err(_) => stats.record_failure(OP_READ_ENTRY, started.elapsed()),
    });
    let write_set = inner.schedule.write_set(entry_id);
    let members = write_set.len();
    let progress = Arc::new(Mutex::new(ReadProgress {
        acks: inner.schedule.ack_set(),
        payload: None,
        last_error: None,
    }));
    for slot in write_set {
        let request = inner.ensemble[slot].read_entry(inner.ledger_id, entry_id);
        arm_timeout(&inner.runtime, &request, inner.read_timeout);
        let handle = Arc::clone(inner);
        let progress = Arc::clone(&progress);
        let completion = completion.clone();
        request.on_complete(move |outcome| {
            let verdict = match outcome {
                Ok(bytes) => verify_entry(&handle, entry_id, bytes).map(|decoded| decoded.payload),
                Err(err) => Err(err.clone()),
            };
            let decided = {
                let mut progress = progress.lock();
                match verdict {
                    Ok(payload) => {
                        let conflict = progress
                            .payload
                            .as_ref()
                            .is_some_and(|seen| *seen != payload);
                        if conflict {
                            Some(Err(ClientError::InconsistentEntry {
                                ledger_id: handle.ledger_id,
                                entry_id,
                            }))
                        } else if progress.acks.complete(slot) {
                            Some(Ok(LedgerEntry {
                                ledger_id: handle.ledger_id,
                                entry_id,
                                payload,
                            }))
                        } else {
                            progress.payload = Some(payload);
                            None
                        }
                    }
                    Err(err) => {
                        note_read_failure(&handle, &err);
                        let reachable = progress.acks.fail(slot);
                        progress.last_error = Some(err);
                        if reachable {
                            None
                        } else {
                            Some(Err(ClientError::ReadException(format!(
                                "entry {} of ledger {}: {} of {} copies unreadable, last error: {}",
                                entry_id,
                                handle.ledger_id,
                                progress.acks.failed(),
                                members,
                                progress
                                    .last_error
                                    .as_ref()
                                    .map(ToString::to_string)
                                    .unwrap_or_default()
                            ))))
                        }
                    }
                }
            };
            match decided {
                Some(Ok(entry)) => {
                    completion.complete(entry);
                }
                Some(Err(err)) => {
                    debug!(
                        "event=read_entry_failed ledger_id={} entry_id={} error={}",
                        handle.ledger_id, entry_id, err
                    );
                    completion.fail(err);
                }
                None => {}
            }
        });
    }
    completion
}

/// Reads one entry from a single node, still verifying its digest.
pub(super) fn read_entry_from(
    inner: &Arc<HandleInner>,
    slot: usize,
    entry_id: i64,
) -> Completion<LedgerEntry, ClientError> {
    let request = inner.ensemble[slot].read_entry(inner.ledger_id, entry_id);
    arm_timeout(&inner.runtime, &request, inner.read_timeout);
    let handle = Arc::clone(inner);
    request.map_result(move |outcome| {
        let bytes = outcome.as_ref().map_err(Clone::clone)?;
        let decoded = verify_entry(&handle, entry_id, bytes).map_err(|err| {
            note_read_failure(&handle, &err);
            err
        })?;
        Ok(LedgerEntry {
            ledger_id: handle.ledger_id,
            entry_id,
            payload: decoded.payload,
        })
    })
}

pub(super) fn read_range(
    inner: &Arc<HandleInner>,
    first: i64,
    last: i64,
) -> Completion<Vec<LedgerEntry>, ClientError> {
    if first < 0 || first > last {
        return Completion::failed(ClientError::IncorrectParameter(format!(
            "invalid read range [{}, {}]",
            first, last
        )));
    }
    let confirmed = inner.confirmed_bound();
    if last > confirmed {
        return Completion::failed(ClientError::ReadException(format!(
            "entry {} is beyond last confirmed entry {} of ledger {}",
            last, confirmed, inner.ledger_id
        )));
    }
    let reads = (first..=last)
        .map(|entry_id| read_entry(inner, entry_id))
        .collect();
    Completion::all(reads)
}

struct LacProgress {
    responded: HashSet<usize>,
    max_lac: i64,
    answered: usize,
}

/// Asks every node for its LAC and settles once the answers cover every
/// possible ack quorum.
pub(super) fn read_lac(inner: &Arc<HandleInner>) -> Completion<i64, ClientError> {
    let started = Instant::now();
    let completion: Completion<i64, ClientError> = Completion::new();
    let stats = Arc::clone(&inner.stats);
    completion.on_complete(move |outcome| match outcome {
        Ok(_) => stats.record_success(OP_READ_LAC, started.elapsed()),
        Err(_) => stats.record_failure(OP_READ_LAC, started.elapsed()),
    });
    let members = inner.ensemble.len();
    let progress = Arc::new(Mutex::new(LacProgress {
        responded: HashSet::new(),
        max_lac: INVALID_ENTRY_ID,
        answered: 0,
    }));
    for slot in 0..members {
        let request = inner.ensemble[slot].read_last_add_confirmed(inner.ledger_id);
        arm_timeout(&inner.runtime, &request, inner.read_timeout);
        let handle = Arc::clone(inner);
        let progress = Arc::clone(&progress);
        let completion = completion.clone();
        request.on_complete(move |outcome| {
            let decided = {
                let mut progress = progress.lock();
                progress.answered += 1;
                let lac = match outcome {
                    Ok(lac) => Some(*lac),
                    Err(ClientError::NoSuchLedger(_)) | Err(ClientError::NoSuchEntry { .. }) => {
                        Some(INVALID_ENTRY_ID)
                    }
                    Err(err) => {
                        debug!(
                            "event=read_lac_response_failed ledger_id={} slot={} error={}",
                            handle.ledger_id, slot, err
                        );
                        None
                    }
                };
                if let Some(lac) = lac {
                    progress.responded.insert(slot);
                    progress.max_lac = progress.max_lac.max(lac);
                }
                if handle.schedule.covered_by(&progress.responded) {
                    Some(Ok(progress.max_lac))
                } else if progress.answered == members {
                    Some(Err(ClientError::ReadException(format!(
                        "only {} of {} nodes answered the LAC read for ledger {}",
                        progress.responded.len(),
                        members,
                        handle.ledger_id
                    ))))
                } else {
                    None
                }
            };
            match decided {
                Some(Ok(lac)) => {
                    if handle.read_only {
                        handle.advance_lac(lac);
                    }
                    completion.complete(lac);
                }
                Some(Err(err)) => {
                    completion.fail(err);
                }
                None => {}
            }
        });
    }
    completion
}

struct PollProgress {
    known_lac: i64,
    answered: usize,
    failed: usize,
    claimed: bool,
}

impl PollProgress {
    /// First caller wins the right to settle the request.
    fn claim(&mut self) -> bool {
        !std::mem::replace(&mut self.claimed, true)
    }
}

fn cancel_all(polls: &Mutex<Vec<Completion<i64, ClientError>>>) {
    let polls = polls.lock().clone();
    for poll in polls {
        poll.cancel();
    }
}

/// Long-polls for `entry_id` to become confirmed and fetches it from the
/// node that reported it. Expiry settles with the best LAC seen and no entry.
pub(super) fn read_lac_and_entry(
    inner: &Arc<HandleInner>,
    entry_id: i64,
    timeout: Duration,
    parallel: bool,
) -> Completion<LastConfirmedAndEntry, ClientError> {
    let started = Instant::now();
    let result: Completion<LastConfirmedAndEntry, ClientError> = Completion::new();
    let stats = Arc::clone(&inner.stats);
    result.on_complete(move |outcome| match outcome {
        Ok(_) => stats.record_success(OP_LONG_POLL, started.elapsed()),
        Err(_) => stats.record_failure(OP_LONG_POLL, started.elapsed()),
    });
    let targets: Vec<usize> = if parallel {
        (0..inner.ensemble.len()).collect()
    } else {
        inner.schedule.write_set(entry_id)
    };
    let target_count = targets.len();
    let progress = Arc::new(Mutex::new(PollProgress {
        known_lac: inner.lac(),
        answered: 0,
        failed: 0,
        claimed: false,
    }));
    let polls: Arc<Mutex<Vec<Completion<i64, ClientError>>>> = Arc::new(Mutex::new(Vec::new()));

    let timer = {
        let progress = Arc::clone(&progress);
        let polls = Arc::clone(&polls);
        let result = result.clone();
        let ledger_id = inner.ledger_id;
        inner.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            let known = {
                let mut progress = progress.lock();
                if !progress.claim() {
                    return;
                }
                progress.known_lac
            };
            debug!(
                "event=long_poll_expired ledger_id={} entry_id={} lac={}",
                ledger_id, entry_id, known
            );
            cancel_all(&polls);
            result.complete(LastConfirmedAndEntry {
                last_add_confirmed: known,
                entry: None,
            });
        })
    };
    result.on_complete(move |_| timer.abort());
    {
        let polls = Arc::clone(&polls);
        result.on_complete(move |_| cancel_all(&polls));
    }

    // A claimed request still waiting on its entry read must not leave fresh
    // watchers behind on the remaining nodes.
    for slot in targets {
        if progress.lock().claimed {
            break;
        }
        let poll = inner.ensemble[slot].read_lac_long_poll(inner.ledger_id, entry_id - 1);
        polls.lock().push(poll.clone());
        if progress.lock().claimed {
            poll.cancel();
        }
        let handle = Arc::clone(inner);
        let progress = Arc::clone(&progress);
        let polls = Arc::clone(&polls);
        let result = result.clone();
        poll.on_complete(move |outcome| {
            let lac = match outcome {
                Ok(lac) if *lac >= entry_id => {
                    let won = {
                        let mut progress = progress.lock();
                        progress.known_lac = progress.known_lac.max(*lac);
                        progress.claim()
                    };
                    if !won {
                        return;
                    }
                    *lac
                }
                Ok(lac) => {
                    let settled = {
                        let mut progress = progress.lock();
                        progress.known_lac = progress.known_lac.max(*lac);
                        progress.answered += 1;
                        (progress.answered == target_count && progress.claim())
                            .then_some(progress.known_lac)
                    };
                    if let Some(known) = settled {
                        result.complete(LastConfirmedAndEntry {
                            last_add_confirmed: known,
                            entry: None,
                        });
                    }
                    return;
                }
                Err(ClientError::NoSuchLedger(_)) | Err(ClientError::NoSuchEntry { .. }) => {
                    // Nothing stored there yet; the timer settles the request.
                    debug!(
                        "event=long_poll_ledger_unknown ledger_id={} slot={}",
                        handle.ledger_id, slot
                    );
                    return;
                }
                Err(err) => {
                    let settled = {
                        let mut progress = progress.lock();
                        if progress.claimed {
                            return;
                        }
                        debug!(
                            "event=long_poll_response_failed ledger_id={} slot={} error={}",
                            handle.ledger_id, slot, err
                        );
                        progress.answered += 1;
                        progress.failed += 1;
                        (progress.answered == target_count && progress.claim())
                            .then_some((progress.failed == target_count, progress.known_lac))
                    };
                    match settled {
                        Some((true, _)) => {
                            result.fail(ClientError::ReadException(format!(
                                "no node answered the long poll for entry {} of ledger {}",
                                entry_id, handle.ledger_id
                            )));
                        }
                        Some((false, known)) => {
                            result.complete(LastConfirmedAndEntry {
                                last_add_confirmed: known,
                                entry: None,
                            });
                        }
                        None => {}
                    }
                    return;
                }
            };
            cancel_all(&polls);
            if handle.read_only {
                handle.advance_lac(lac);
            }
            let entry = if handle.schedule.has_entry(entry_id, slot) {
                read_entry_from(&handle, slot, entry_id)
            } else {
                read_entry(&handle, entry_id)
            };
            let result = result.clone();
            entry.on_complete(move |outcome| match outcome {
                Ok(entry) => {
                    result.complete(LastConfirmedAndEntry {
                        last_add_confirmed: lac,
                        entry: Some(entry.clone()),
                    });
                }
                Err(err) => {
                    result.fail(err.clone());
                }
            });
        });
    }
    result
}

/// Sends the handle's LAC to every ensemble member as an explicit LAC record.
/// Settles once `ack_quorum` members stored it.
pub(super) fn send_explicit_lac(inner: &Arc<HandleInner>) -> Completion<i64, ClientError> {
    let lac = inner.lac();
    if lac < 0 {
        return Completion::completed(lac);
    }
    let completion: Completion<i64, ClientError> = Completion::new();
    let payload = codec::encode_lac_payload(inner.ledger_id, lac);
    let acks = Arc::new(Mutex::new(AckSet::new(
        inner.ensemble.len(),
        inner.schedule.ack_quorum(),
    )));
    for (slot, bookie) in inner.ensemble.iter().enumerate() {
        let request = bookie.write_lac(payload.clone(), &inner.master_key);
        arm_timeout(&inner.runtime, &request, inner.add_timeout);
        let handle = Arc::clone(inner);
        let acks = Arc::clone(&acks);
        let completion = completion.clone();
        request.on_complete(move |outcome| {
            let decided = {
                let mut acks = acks.lock();
                match outcome {
                    Ok(_) => acks.complete(slot).then_some(Ok(lac)),
                    Err(err) => {
                        debug!(
                            "event=explicit_lac_write_failed ledger_id={} slot={} error={}",
                            handle.ledger_id, slot, err
                        );
                        (!acks.fail(slot)).then(|| {
                            Err(ClientError::NotEnoughBookies(format!(
                                "explicit LAC {} of ledger {} stored on {} nodes",
                                lac,
                                handle.ledger_id,
                                acks.acked()
                            )))
                        })
                    }
                }
            };
            match decided {
                Some(Ok(lac)) => {
                    handle
                        .last_explicit_lac_sent
                        .fetch_max(lac, Ordering::AcqRel);
                    completion.complete(lac);
                }
                Some(Err(err)) => {
                    completion.fail(err);
                }
                None => {}
            }
        });
    }
    completion
}

struct ExplicitLacProgress {
    max_lac: i64,
    answered: usize,
    succeeded: usize,
}

/// Highest explicit LAC stored on any ensemble member, `-1` when none has one.
pub(super) fn read_explicit_lac(inner: &Arc<HandleInner>) -> Completion<i64, ClientError> {
    let completion: Completion<i64, ClientError> = Completion::new();
    let members = inner.ensemble.len();
    let progress = Arc::new(Mutex::new(ExplicitLacProgress {
        max_lac: INVALID_ENTRY_ID,
        answered: 0,
        succeeded: 0,
    }));
    for (slot, bookie) in inner.ensemble.iter().enumerate() {
        let request = bookie.read_explicit_lac(inner.ledger_id);
        arm_timeout(&inner.runtime, &request, inner.read_timeout);
        let handle = Arc::clone(inner);
        let progress = Arc::clone(&progress);
        let completion = completion.clone();
        request.on_complete(move |outcome| {
            let decided = {
                let mut progress = progress.lock();
                progress.answered += 1;
                match outcome {
                    Ok(payload) => {
                        progress.succeeded += 1;
                        let decoded = payload.as_deref().map(codec::decode_lac_payload);
                        match decoded {
                            Some(Ok((ledger_id, lac))) if ledger_id == handle.ledger_id => {
                                progress.max_lac = progress.max_lac.max(lac);
                            }
                            Some(Ok(_)) | Some(Err(_)) => warn!(
                                "event=explicit_lac_payload_rejected ledger_id={} slot={}",
                                handle.ledger_id, slot
                            ),
                            None => {}
                        }
                    }
                    Err(ClientError::NoSuchLedger(_)) => progress.succeeded += 1,
                    Err(err) => debug!(
                        "event=explicit_lac_read_failed ledger_id={} slot={} error={}",
                        handle.ledger_id, slot, err
                    ),
                }
                if progress.answered < members {
                    None
                } else if progress.succeeded == 0 {
                    Some(Err(ClientError::ReadException(format!(
                        "no node returned an explicit LAC for ledger {}",
                        handle.ledger_id
                    ))))
                } else {
                    Some(Ok(progress.max_lac))
                }
            };
            match decided {
                Some(Ok(lac)) => {
                    completion.complete(lac);
                }
                Some(Err(err)) => {
                    completion.fail(err);
                }
                None => {}
            }
        });
    }
    completion
}

/// Fences the ensemble, re-replicates the unconfirmed tail and returns the
/// last recovered entry id. Blocks the calling thread.
pub(super) fn recover(inner: &Arc<HandleInner>) -> Result<i64, ClientError> {
    let fences: Vec<(usize, Completion<i64, ClientError>)> = inner
        .ensemble
        .iter()
        .enumerate()
        .map(|(slot, bookie)| {
            let fence = bookie.fence_ledger(inner.ledger_id, &inner.master_key);
            arm_timeout(&inner.runtime, &fence, inner.read_timeout);
            (slot, fence)
        })
        .collect();
    let mut fenced = HashSet::new();
    let mut max_lac = INVALID_ENTRY_ID;
    for (slot, fence) in fences {
        match fence.join() {
            Ok(lac) => {
                fenced.insert(slot);
                max_lac = max_lac.max(lac);
            }
            Err(ClientError::Unauthorized(ledger_id)) => {
                return Err(ClientError::Unauthorized(ledger_id))
            }
            Err(err) => warn!(
                "event=recovery_fence_failed ledger_id={} slot={} error={}",
                inner.ledger_id, slot, err
            ),
        }
    }
    if !inner.schedule.covered_by(&fenced) {
        return Err(ClientError::NotEnoughBookies(format!(
            "fenced {} of {} nodes of ledger {}",
            fenced.len(),
            inner.ensemble.len(),
            inner.ledger_id
        )));
    }

    let mut last_recovered = INVALID_ENTRY_ID;
    if max_lac >= 0 {
        let confirmed = read_any(inner, max_lac)
            .map(|(decoded, _)| decoded.header.last_add_confirmed)
            .unwrap_or(INVALID_ENTRY_ID);
        last_recovered = confirmed;
        for entry_id in (confirmed + 1)..=max_lac {
            let Some((_, raw)) = read_any(inner, entry_id) else {
                warn!(
                    "event=recovery_entry_unreadable ledger_id={} entry_id={}",
                    inner.ledger_id, entry_id
                );
                break;
            };
            replicate(inner, entry_id, raw.into())?;
            last_recovered = entry_id;
        }
    }
    info!(
        "event=ledger_recovered ledger_id={} fenced={} last_entry_id={}",
        inner.ledger_id,
        fenced.len(),
        last_recovered
    );
    Ok(last_recovered)
}

fn read_any(inner: &Arc<HandleInner>, entry_id: i64) -> Option<(DecodedEntry, Vec<u8>)> {
    for slot in inner.schedule.write_set(entry_id) {
        let request = inner.ensemble[slot].read_entry(inner.ledger_id, entry_id);
        arm_timeout(&inner.runtime, &request, inner.read_timeout);
        match request.join() {
            Ok(bytes) => match verify_entry(inner, entry_id, &bytes) {
                Ok(decoded) => return Some((decoded, bytes)),
                Err(err) => note_read_failure(inner, &err),
            },
            Err(err) => debug!(
                "event=recovery_read_failed ledger_id={} entry_id={} slot={} error={}",
                inner.ledger_id, entry_id, slot, err
            ),
        }
    }
    None
}

fn replicate(inner: &Arc<HandleInner>, entry_id: i64, raw: Arc<[u8]>) -> Result<(), ClientError> {
    let requests: Vec<(usize, Completion<WriteAck, ClientError>)> = inner
        .schedule
        .write_set(entry_id)
        .into_iter()
        .map(|slot| {
            let request =
                inner.ensemble[slot].add_entry(Arc::clone(&raw), &inner.master_key, true);
            arm_timeout(&inner.runtime, &request, inner.add_timeout);
            (slot, request)
        })
        .collect();
    let mut acks = inner.schedule.ack_set();
    for (slot, request) in requests {
        match request.join() {
            Ok(_) => {
                acks.complete(slot);
            }
            Err(err) => {
                debug!(
                    "event=recovery_add_failed ledger_id={} entry_id={} slot={} error={}",
                    inner.ledger_id, entry_id, slot, err
                );
                acks.fail(slot);
            }
        }
    }
    if acks.is_satisfied() {
        Ok(())
    } else {
        Err(ClientError::NotEnoughBookies(format!(
            "recovered entry {} of ledger {} stored on {} nodes",
            entry_id,
            inner.ledger_id,
            acks.acked()
        )))
    }
}
