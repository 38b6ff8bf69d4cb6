//! Single-fire completion handles shared by the node and the client.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

type Continuation<T, E> = Box<dyn FnOnce(&Result<T, E>) + Send>;
type CancelHook = Box<dyn FnOnce() + Send>;

/// A result that is produced exactly once and may be observed many times.
///
/// The first call to [`Completion::complete`], [`Completion::fail`] or
/// [`Completion::cancel`] settles the handle; every later attempt returns
/// `false` and leaves the outcome untouched. Continuations attached with
/// [`Completion::on_complete`] run on the settling thread, or immediately
/// when the handle is already settled.
pub struct Completion<T, E> {
    shared: Arc<Shared<T, E>>,
}

struct Shared<T, E> {
    state: Mutex<State<T, E>>,
    settled: Condvar,
}

struct State<T, E> {
    outcome: Option<Arc<Result<T, E>>>,
    continuations: Vec<Continuation<T, E>>,
    cancel_hooks: Vec<CancelHook>,
    wakers: Vec<Waker>,
}

impl<T, E> Clone for Completion<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> Default for Completion<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for Completion<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("done", &self.is_done())
            .finish()
    }
}

impl<T, E> Completion<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    outcome: None,
                    continuations: Vec::new(),
                    cancel_hooks: Vec::new(),
                    wakers: Vec::new(),
                }),
                settled: Condvar::new(),
            }),
        }
    }

    pub fn completed(value: T) -> Self {
        let completion = Self::new();
        completion.complete(value);
        completion
    }

    pub fn failed(err: E) -> Self {
        let completion = Self::new();
        completion.fail(err);
        completion
    }

    pub fn complete(&self, value: T) -> bool {
        self.settle(Ok(value)).is_some()
    }

    pub fn fail(&self, err: E) -> bool {
        self.settle(Err(err)).is_some()
    }

    pub fn is_done(&self) -> bool {
        self.shared.state.lock().outcome.is_some()
    }

    /// Attaches a continuation that observes the outcome exactly once.
    pub fn on_complete<F>(&self, continuation: F)
    where
        F: FnOnce(&Result<T, E>) + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        match state.outcome.clone() {
            Some(outcome) => {
                drop(state);
                continuation(&outcome);
            }
            None => state.continuations.push(Box::new(continuation)),
        }
    }

    /// Registers a hook that runs only if this handle is settled by [`Completion::cancel`].
    pub fn on_cancel<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.outcome.is_none() {
            state.cancel_hooks.push(Box::new(hook));
        }
    }

    /// Settles the handle with a [`Cancelled`] error and runs the cancel hooks.
    /// Has no effect once an outcome exists.
    pub fn cancel(&self) -> bool
    where
        E: From<Cancelled>,
    {
        match self.settle(Err(E::from(Cancelled))) {
            Some(hooks) => {
                for hook in hooks {
                    hook();
                }
                true
            }
            None => false,
        }
    }

    /// Derives a new handle whose outcome is `map` applied to this one.
    pub fn map_result<U, F2, M>(&self, map: M) -> Completion<U, F2>
    where
        U: Send + Sync + 'static,
        F2: Send + Sync + 'static,
        M: FnOnce(&Result<T, E>) -> Result<U, F2> + Send + 'static,
    {
        let derived = Completion::new();
        let target = derived.clone();
        self.on_complete(move |outcome| match map(outcome) {
            Ok(value) => {
                target.complete(value);
            }
            Err(err) => {
                target.fail(err);
            }
        });
        derived
    }

    fn settle(&self, outcome: Result<T, E>) -> Option<Vec<CancelHook>> {
        let outcome = Arc::new(outcome);
        let (continuations, hooks, wakers) = {
            let mut state = self.shared.state.lock();
            if state.outcome.is_some() {
                return None;
            }
            state.outcome = Some(Arc::clone(&outcome));
            (
                std::mem::take(&mut state.continuations),
                std::mem::take(&mut state.cancel_hooks),
                std::mem::take(&mut state.wakers),
            )
        };
        self.shared.settled.notify_all();
        for waker in wakers {
            waker.wake();
        }
        for continuation in continuations {
            continuation(&outcome);
        }
        Some(hooks)
    }
}

impl<T, E> Completion<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Blocks the calling thread until the handle settles.
    pub fn join(&self) -> Result<T, E> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(outcome) = state.outcome.as_ref() {
                return (**outcome).clone();
            }
            self.shared.settled.wait(&mut state);
        }
    }

    /// Like [`Completion::join`] but gives up after `timeout`.
    pub fn join_timeout(&self, timeout: Duration) -> Option<Result<T, E>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if let Some(outcome) = state.outcome.as_ref() {
                return Some((**outcome).clone());
            }
            if self
                .shared
                .settled
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.outcome.as_ref().map(|outcome| (**outcome).clone());
            }
        }
    }

    pub fn peek(&self) -> Option<Result<T, E>> {
        self.shared
            .state
            .lock()
            .outcome
            .as_ref()
            .map(|outcome| (**outcome).clone())
    }

    /// Resolves once every handle succeeds, or with the first failure observed.
    pub fn all(completions: Vec<Completion<T, E>>) -> Completion<Vec<T>, E> {
        let joined = Completion::new();
        if completions.is_empty() {
            joined.complete(Vec::new());
            return joined;
        }
        let slots: Arc<Mutex<(Vec<Option<T>>, usize)>> =
            Arc::new(Mutex::new((vec![None; completions.len()], completions.len())));
        for (idx, completion) in completions.into_iter().enumerate() {
            let slots = Arc::clone(&slots);
            let joined = joined.clone();
            completion.on_complete(move |outcome| match outcome {
                Ok(value) => {
                    let finished = {
                        let mut guard = slots.lock();
                        guard.0[idx] = Some(value.clone());
                        guard.1 -= 1;
                        if guard.1 == 0 {
                            Some(guard.0.iter_mut().filter_map(Option::take).collect())
                        } else {
                            None
                        }
                    };
                    if let Some(values) = finished {
                        joined.complete(values);
                    }
                }
                Err(err) => {
                    joined.fail(err.clone());
                }
            });
        }
        joined
    }
}

impl<T, E> Future for Completion<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.state.lock();
        match state.outcome.as_ref() {
            Some(outcome) => Poll::Ready((**outcome).clone()),
            None => {
                if !state.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                    state.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
