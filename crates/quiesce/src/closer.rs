//! The closer node: lifecycle state machine and close propagation.
//!
//! A [`Closer`] is one vertex in a shutdown tree. Closing a node runs its
//! closing hooks, closes its children, waits for tracked work, runs its
//! closed hooks, and fixes the error aggregate. All of that happens
//! exactly once, no matter how many threads race to close it. Two-way
//! children additionally take their parent down with them.

use std::sync::{Arc, Mutex, Weak};
use std::thread;

use tokio_util::sync::CancellationToken;

use crate::error::{BoxError, CloseError};
use crate::hook::{run_hooks, HookList};
use crate::signal::Signal;
use crate::waitgroup::WaitGroup;

/// How a child relates to its parent when either side closes.
///
/// One-way children close when their parent closes; closing the child
/// leaves the parent running. Two-way children additionally close their
/// parent when they close themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    OneWay,
    TwoWay,
}

/// A node in the shutdown tree.
///
/// `Closer` is a cheap handle; clones refer to the same node. A closed
/// node stays a valid, inert object: every query keeps answering and
/// repeated closes keep returning the stored aggregate.
#[derive(Clone)]
pub struct Closer {
    inner: Arc<Inner>,
}

struct Inner {
    /// Serializes the close pass; held for the whole pass.
    close_lock: Mutex<()>,
    /// Guards the mutable fields; held only for short, non-blocking
    /// sections and never across calls into another node.
    state: Mutex<State>,
    closing: Signal,
    closed: Signal,
    deps: WaitGroup,
    parent: Option<ParentLink>,
}

struct ParentLink {
    node: Weak<Inner>,
    relation: Relation,
}

struct State {
    closing_hooks: HookList,
    closed_hooks: HookList,
    children: Vec<Closer>,
    /// Caller-injected root cause; first writer wins.
    cause: Option<BoxError>,
    /// Aggregate of the completed close pass; write-once.
    result: Option<CloseError>,
    /// True once the aggregate is fixed, even when it is empty.
    finished: bool,
    /// Lazily-created token, cancelled when the closing signal fires.
    token: Option<CancellationToken>,
}

impl Closer {
    /// Create a root node with no parent.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a root node with an initial closing-phase hook.
    pub fn with_closing_hook<F>(hook: F) -> Self
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        let closer = Self::new();
        closer.on_closing(hook);
        closer
    }

    fn build(parent: Option<ParentLink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                close_lock: Mutex::new(()),
                state: Mutex::new(State {
                    closing_hooks: HookList::new(),
                    closed_hooks: HookList::new(),
                    children: Vec::new(),
                    cause: None,
                    result: None,
                    finished: false,
                    token: None,
                }),
                closing: Signal::new(),
                closed: Signal::new(),
                deps: WaitGroup::new(),
                parent,
            }),
        }
    }

    /// Spawn a child related to this node.
    ///
    /// The child is registered immediately. If this node is already closing
    /// or closed, the child is closed before it is returned, so no child is
    /// ever left open under a finished parent.
    pub fn spawn_child(&self, relation: Relation) -> Closer {
        let child = Self::build(Some(ParentLink {
            node: Arc::downgrade(&self.inner),
            relation,
        }));
        let parent_closing = {
            let mut state = self.inner.state.lock().unwrap();
            state.children.push(child.clone());
            self.inner.closing.is_set()
        };
        if parent_closing {
            let _ = child.close();
        }
        child
    }

    /// Spawn a child that closes when this node closes, but never the
    /// reverse.
    pub fn spawn_one_way(&self) -> Closer {
        self.spawn_child(Relation::OneWay)
    }

    /// Spawn a child that closes when this node closes and closes this
    /// node when it closes itself.
    pub fn spawn_two_way(&self) -> Closer {
        self.spawn_child(Relation::TwoWay)
    }

    /// Register a hook for the closing phase, run before any child closes.
    ///
    /// Hooks run in reverse registration order. Registering after the
    /// phase has already run is accepted; the hook is dropped.
    pub fn on_closing<F>(&self, hook: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.inner
            .state
            .lock()
            .unwrap()
            .closing_hooks
            .push(Box::new(hook));
    }

    /// Register a hook for the closed phase, run after every child has
    /// closed and all tracked work has finished.
    ///
    /// Same ordering and late-registration rules as
    /// [`on_closing`](Closer::on_closing).
    pub fn on_closed<F>(&self, hook: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.inner
            .state
            .lock()
            .unwrap()
            .closed_hooks
            .push(Box::new(hook));
    }

    /// Register `n` asynchronous obligations that must finish before this
    /// node can reach the closed state.
    pub fn add_wait(&self, n: usize) {
        self.inner.deps.add(n);
    }

    /// Retire one obligation registered with [`add_wait`](Closer::add_wait).
    ///
    /// Panics if there is no pending obligation (mismatched add/done pair).
    pub fn done(&self) {
        self.inner.deps.done();
    }

    /// Whether teardown has begun.
    pub fn is_closing(&self) -> bool {
        self.inner.closing.is_set()
    }

    /// Whether teardown has fully completed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_set()
    }

    /// The signal fired the moment teardown begins.
    pub fn closing_signal(&self) -> &Signal {
        &self.inner.closing
    }

    /// The signal fired once teardown has fully completed.
    pub fn closed_signal(&self) -> &Signal {
        &self.inner.closed
    }

    /// Close this node and its subtree.
    ///
    /// Blocks until the pass has fully completed: closing hooks (reverse
    /// registration order), children, tracked work, closed hooks. The
    /// first caller drives the pass; concurrent and later callers block
    /// until it finishes and then receive the same aggregate. Closing an
    /// already-closed node is cheap.
    ///
    /// Hooks run as part of the pass, so a hook must not call back into
    /// `close` on its own node; that would self-deadlock. Closing other
    /// nodes from a hook is fine.
    pub fn close(&self) -> Result<(), CloseError> {
        let cs = self.inner.close_lock.lock().unwrap();

        if self.inner.closing.is_set() {
            // A previous pass already ran to completion under this lock.
            drop(cs);
            return self.stored_result();
        }

        self.inner.closing.set();

        // Drain closing hooks and snapshot the children while the state
        // lock is held; both run without it so they may touch this node.
        let (closing_hooks, children, token) = {
            let mut state = self.inner.state.lock().unwrap();
            (
                state.closing_hooks.take(),
                state.children.clone(),
                state.token.clone(),
            )
        };
        if let Some(token) = token {
            token.cancel();
        }

        let mut errors = Vec::new();
        run_hooks(closing_hooks, &mut errors);

        for child in &children {
            if !child.is_closed() {
                // The child keeps its own aggregate; this only drives the
                // transition.
                let _ = child.close();
            }
        }

        self.inner.deps.wait();

        let closed_hooks = self.inner.state.lock().unwrap().closed_hooks.take();
        run_hooks(closed_hooks, &mut errors);

        let result = {
            let mut state = self.inner.state.lock().unwrap();
            state.result = CloseError::from_parts(state.cause.take(), errors);
            state.finished = true;
            state.children.clear();
            state.result.clone()
        };

        self.inner.closed.set();
        drop(cs);

        if let Some(link) = &self.inner.parent {
            if let Some(parent) = link.node.upgrade() {
                let parent = Closer { inner: parent };
                parent.remove_child(&self.inner);
                // The closing check is the deadlock guard for two-way
                // chains closed from both ends: an ancestor mid-pass has
                // already fired its closing signal.
                if link.relation == Relation::TwoWay && !parent.is_closing() {
                    let _ = parent.close();
                }
            }
        }

        match result {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Close, recording `err` as the root cause of the teardown.
    ///
    /// The cause takes the first position in the aggregate, ahead of any
    /// hook errors, so callers holding the injected value can match it by
    /// identity. The first recorded cause wins; later ones are dropped.
    pub fn close_with_error(&self, err: impl Into<BoxError>) -> Result<(), CloseError> {
        self.record_cause(err.into());
        self.close()
    }

    /// Retire one obligation, then close.
    ///
    /// The combination a tracked worker needs to take its owner down:
    /// plain [`close`](Closer::close) would wait on the worker's own
    /// pending obligation and never return.
    pub fn close_and_done(&self) -> Result<(), CloseError> {
        self.inner.deps.done();
        self.close()
    }

    /// Run `task` on its own thread, tracked as one obligation of this
    /// node.
    ///
    /// The obligation is retired when the task returns. A task that
    /// returns an error records it as the node's close cause and initiates
    /// the close. If the node is already closed at call time the task is
    /// never started.
    pub fn spawn_tracked<F>(&self, task: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        if self.is_closed() {
            log::debug!("tracked task skipped, closer already closed");
            return;
        }
        self.add_wait(1);
        let node = self.clone();
        thread::spawn(move || {
            let outcome = task();
            // Retire the obligation before closing; closing first would
            // wait on it.
            node.inner.deps.done();
            if let Err(err) = outcome {
                node.record_cause(err);
                let _ = node.close();
            }
        });
    }

    pub(crate) fn cancellation_token_slot(&self) -> CancellationToken {
        let mut state = self.inner.state.lock().unwrap();
        state
            .token
            .get_or_insert_with(CancellationToken::new)
            .clone()
    }

    fn stored_result(&self) -> Result<(), CloseError> {
        match self.inner.state.lock().unwrap().result.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn record_cause(&self, err: BoxError) {
        let mut state = self.inner.state.lock().unwrap();
        if state.finished {
            log::warn!("close cause arrived after the aggregate was fixed, dropping: {err}");
        } else if state.cause.is_some() {
            log::warn!("close cause already recorded, dropping: {err}");
        } else {
            state.cause = Some(err);
        }
    }

    /// Sever `child` from this node's children. Identity-based; dropping
    /// the edge is what lets a finished child be collected.
    fn remove_child(&self, child: &Arc<Inner>) {
        let mut state = self.inner.state.lock().unwrap();
        state.children.retain(|c| !Arc::ptr_eq(&c.inner, child));
    }
}

impl Default for Closer {
    fn default() -> Self {
        Self::new()
    }
}
