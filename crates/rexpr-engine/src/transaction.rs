//! Transaction coordinator: batches commit handlers per root and converges.
//!
//! Leaves register commit handlers against their root whenever their
//! underlying value changes. [`TransactionCoordinator::commit`] runs every
//! pending handler for a root, re-checks the root one scheduler tick later
//! (handlers may have registered more handlers or deferred work), and only
//! when nothing is left announces the root on the `committed` stream, at
//! most once per settle.
//!
//! Commits fire automatically when the last open change cycle closes and
//! the coordinator is not suspended.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::error::{EngineError, EngineResult};
use crate::event::{EventStream, Subscription};
use crate::node::NodeId;
use crate::scheduler::Scheduler;
use crate::state::{CycleEvent, StateManager};

/// A commit continuation. Returns `true` when its change reached the root.
pub(crate) type CommitHandler = Box<dyn FnOnce() -> EngineResult<bool>>;

#[derive(Default)]
struct RootCycle {
    handlers: Vec<(NodeId, CommitHandler)>,
    /// A pass or re-check for this root is queued.
    converging: bool,
    /// Deferred continuations scoped to this root that have not run yet.
    outstanding: usize,
    /// Some handler reached the root during this settle.
    committed: bool,
    /// Consecutive passes since the last deferred task completed.
    passes: usize,
}

pub struct TransactionCoordinator {
    scheduler: Scheduler,
    roots: RefCell<BTreeMap<NodeId, RootCycle>>,
    in_flight: Cell<u32>,
    suspended: Cell<u32>,
    committed: EventStream<NodeId>,
    errors: RefCell<Vec<EngineError>>,
    max_commit_passes: usize,
    cycle_hook: RefCell<Option<Subscription>>,
}

enum Next {
    Rerun,
    Wait,
    Announce,
    Reset,
    Diverged(usize),
    Gone,
}

impl TransactionCoordinator {
    pub fn new(max_settle_steps: usize, max_commit_passes: usize) -> Rc<Self> {
        Rc::new(Self {
            scheduler: Scheduler::new(max_settle_steps),
            roots: RefCell::new(BTreeMap::new()),
            in_flight: Cell::new(0),
            suspended: Cell::new(0),
            committed: EventStream::new(),
            errors: RefCell::new(Vec::new()),
            max_commit_passes,
            cycle_hook: RefCell::new(None),
        })
    }

    /// Count the state manager's change cycles as in-flight cycles.
    pub fn attach(self: &Rc<Self>, state: &StateManager) {
        let weak: Weak<Self> = Rc::downgrade(self);
        let hook = state.change_cycles().subscribe(move |event| {
            let Some(this) = weak.upgrade() else {
                return;
            };
            match event {
                CycleEvent::Start => this.in_flight.set(this.in_flight.get() + 1),
                CycleEvent::End => this.end_cycle(),
            }
        });
        *self.cycle_hook.borrow_mut() = Some(hook);
    }

    // ── Registration ──────────────────────────────────────────────────────────

    /// Queue `handler` for `root`. Pure bookkeeping; nothing runs yet.
    pub(crate) fn register_change(&self, root: NodeId, owner: NodeId, handler: CommitHandler) {
        trace!(root = %root, owner = %owner, "register change");
        self.roots
            .borrow_mut()
            .entry(root)
            .or_default()
            .handlers
            .push((owner, handler));
    }

    /// Run `f` as one change cycle; commits when the outermost cycle closes.
    pub fn change_cycle<R>(self: &Rc<Self>, f: impl FnOnce() -> R) -> R {
        self.in_flight.set(self.in_flight.get() + 1);
        let result = f();
        self.end_cycle();
        result
    }

    fn end_cycle(self: &Rc<Self>) {
        let remaining = self.in_flight.get().saturating_sub(1);
        self.in_flight.set(remaining);
        if remaining == 0 {
            if let Err(error) = self.commit() {
                self.record_error(error);
            }
        }
    }

    /// Defer `task` to the next tick on behalf of `root`.
    ///
    /// The root is not announced as committed while any of its deferred
    /// tasks are still queued.
    pub(crate) fn defer_for(self: &Rc<Self>, root: NodeId, task: impl FnOnce() + 'static) {
        self.roots.borrow_mut().entry(root).or_default().outstanding += 1;
        let this = Rc::clone(self);
        self.scheduler.defer(move || {
            task();
            this.finish_deferred(root);
        });
    }

    fn finish_deferred(self: &Rc<Self>, root: NodeId) {
        let resume = {
            let mut roots = self.roots.borrow_mut();
            let Some(cycle) = roots.get_mut(&root) else {
                return;
            };
            cycle.outstanding = cycle.outstanding.saturating_sub(1);
            // A finished deferred task is progress; only passes driven by
            // handlers alone count toward the limit.
            cycle.passes = 0;
            let ready = cycle.outstanding == 0 && !cycle.converging && self.can_commit();
            if ready {
                cycle.converging = true;
            }
            ready
        };
        if resume {
            let this = Rc::clone(self);
            self.scheduler.defer(move || this.run_root(root));
        }
    }

    /// Defer an unscoped task to the next tick.
    pub(crate) fn defer(&self, task: impl FnOnce() + 'static) {
        self.scheduler.defer(task);
    }

    /// Drop everything queued for `root`.
    pub(crate) fn forget(&self, root: NodeId) {
        let removed = self.roots.borrow_mut().remove(&root);
        drop(removed);
    }

    // ── Commit ────────────────────────────────────────────────────────────────

    fn can_commit(&self) -> bool {
        self.suspended.get() == 0 && self.in_flight.get() == 0
    }

    /// Start a convergence pass for every root with pending work and drain
    /// the scheduler. Does nothing while suspended or inside a change cycle.
    pub fn commit(self: &Rc<Self>) -> EngineResult<()> {
        if !self.can_commit() {
            return Ok(());
        }
        let ready: Vec<NodeId> = {
            let mut roots = self.roots.borrow_mut();
            roots
                .iter_mut()
                .filter(|(_, cycle)| {
                    !cycle.converging
                        && (!cycle.handlers.is_empty()
                            || (cycle.committed && cycle.outstanding == 0))
                })
                .map(|(id, cycle)| {
                    cycle.converging = true;
                    *id
                })
                .collect()
        };
        for root in ready {
            let this = Rc::clone(self);
            self.scheduler.defer(move || this.run_root(root));
        }
        self.scheduler.run_until_idle().map(|_| ())
    }

    fn run_root(self: &Rc<Self>, root: NodeId) {
        let handlers = {
            let mut roots = self.roots.borrow_mut();
            let Some(cycle) = roots.get_mut(&root) else {
                return;
            };
            cycle.passes += 1;
            std::mem::take(&mut cycle.handlers)
        };
        debug!(root = %root, handlers = handlers.len(), "commit pass");

        let mut reached = false;
        for (owner, handler) in handlers {
            match handler() {
                Ok(hit) => reached |= hit,
                Err(error) => {
                    warn!(root = %root, owner = %owner, %error, "commit handler failed");
                    self.record_error(error);
                }
            }
        }
        if reached {
            if let Some(cycle) = self.roots.borrow_mut().get_mut(&root) {
                cycle.committed = true;
            }
        }
        let this = Rc::clone(self);
        self.scheduler.defer(move || this.check_root(root));
    }

    fn check_root(self: &Rc<Self>, root: NodeId) {
        let next = {
            let mut roots = self.roots.borrow_mut();
            match roots.get_mut(&root) {
                None => Next::Gone,
                Some(cycle) if !cycle.handlers.is_empty() => {
                    if cycle.passes >= self.max_commit_passes {
                        let passes = cycle.passes;
                        let removed = roots.remove(&root);
                        drop(roots);
                        drop(removed);
                        Next::Diverged(passes)
                    } else {
                        Next::Rerun
                    }
                }
                Some(cycle) if cycle.outstanding > 0 => {
                    cycle.converging = false;
                    Next::Wait
                }
                Some(cycle) => {
                    let committed = cycle.committed;
                    roots.remove(&root);
                    if committed {
                        Next::Announce
                    } else {
                        Next::Reset
                    }
                }
            }
        };
        match next {
            Next::Rerun => self.run_root(root),
            Next::Wait | Next::Gone => {}
            Next::Announce => {
                debug!(root = %root, "committed");
                self.committed.emit(&root);
            }
            Next::Reset => trace!(root = %root, "settled without reaching root"),
            Next::Diverged(passes) => {
                warn!(root = %root, passes, "commit did not converge");
                self.record_error(EngineError::NoConvergence { root, passes });
            }
        }
    }

    // ── Suspension ────────────────────────────────────────────────────────────

    pub fn suspend(&self) {
        self.suspended.set(self.suspended.get() + 1);
    }

    /// Leave one level of suspension; the outermost resume commits unless a
    /// change cycle is still open.
    pub fn resume(self: &Rc<Self>) -> EngineResult<()> {
        let remaining = self.suspended.get().saturating_sub(1);
        self.suspended.set(remaining);
        if remaining == 0 {
            self.commit()
        } else {
            Ok(())
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.get() > 0
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    pub fn committed(&self) -> &EventStream<NodeId> {
        &self.committed
    }

    pub fn has_pending(&self, root: NodeId) -> bool {
        self.roots.borrow().contains_key(&root)
    }

    pub(crate) fn record_error(&self, error: EngineError) {
        self.errors.borrow_mut().push(error);
    }

    pub fn take_errors(&self) -> Vec<EngineError> {
        std::mem::take(&mut *self.errors.borrow_mut())
    }
}
