//! Change tracking.
//!
//! A [`ChangeTracker`] records, for every publication of a root
//! expression, which identifier slots changed and from what to what. The
//! records are collected by one hub per root and flushed one scheduler tick
//! later, so several publications in the same drain land in one
//! [`ChangeBatch`]. Within a batch each slot appears once, holding its
//! oldest old value and its newest new value.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::error::{LifecycleError, PlaybackError};
use crate::event::{EventStream, Subscription};
use crate::node::{ExprNode, NodeId, Services};
use crate::playback::{self, Direction, PlaybackTarget};
use crate::transaction::TransactionCoordinator;
use crate::value::{Key, Obj, ObjId, Value};

// ══════════════════════════════════════════════════════════════════════════════
// Records
// ══════════════════════════════════════════════════════════════════════════════

/// The slot an identifier reads.
#[derive(Debug, Clone)]
pub struct IdentifierRef {
    pub context: Obj,
    pub key: Key,
    /// Source text of the identifier, for display.
    pub label: Rc<str>,
}

impl IdentifierRef {
    pub fn new(context: Obj, key: Key) -> Self {
        let label = Rc::from(key.to_string());
        Self {
            context,
            key,
            label,
        }
    }

    pub(crate) fn slot(&self) -> (ObjId, Key) {
        (self.context.id(), self.key.clone())
    }
}

#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub identifier: IdentifierRef,
    pub old: Value,
    pub new: Value,
}

/// One flush worth of changes.
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    /// Sequence number within the recording tracker.
    pub index: usize,
    pub timestamp_ms: u64,
    pub changes: Vec<ChangeRecord>,
}

/// Ordered batches recorded by one tracker.
#[derive(Debug, Clone, Default)]
pub struct History {
    batches: Vec<ChangeBatch>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, batch: ChangeBatch) {
        self.batches.push(batch);
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&ChangeBatch> {
        self.batches.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeBatch> {
        self.batches.iter()
    }

    pub fn batches(&self) -> &[ChangeBatch] {
        &self.batches
    }

    /// Position of the last batch recorded at or before `timestamp_ms`.
    pub fn position_at_or_before(&self, timestamp_ms: u64) -> Option<usize> {
        self.batches
            .iter()
            .rposition(|batch| batch.timestamp_ms <= timestamp_ms)
    }

    /// Position of the first batch recorded at or after `timestamp_ms`.
    pub fn position_at_or_after(&self, timestamp_ms: u64) -> Option<usize> {
        self.batches
            .iter()
            .position(|batch| batch.timestamp_ms >= timestamp_ms)
    }

    fn trim_to(&mut self, limit: usize) {
        if self.batches.len() > limit {
            let excess = self.batches.len() - limit;
            self.batches.drain(..excess);
        }
    }
}

impl From<Vec<ChangeBatch>> for History {
    fn from(batches: Vec<ChangeBatch>) -> Self {
        Self { batches }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

/// Collapse records per slot: oldest old, newest new, no-ops dropped.
pub(crate) fn coalesce(records: Vec<ChangeRecord>) -> Vec<ChangeRecord> {
    let mut order: Vec<(ObjId, Key)> = Vec::new();
    let mut merged: HashMap<(ObjId, Key), ChangeRecord> = HashMap::new();
    for record in records {
        let slot = record.identifier.slot();
        match merged.get_mut(&slot) {
            Some(existing) => existing.new = record.new,
            None => {
                order.push(slot.clone());
                merged.insert(slot, record);
            }
        }
    }
    order
        .into_iter()
        .filter_map(|slot| merged.remove(&slot))
        .filter(|record| !record.old.same_value(&record.new))
        .collect()
}

// ══════════════════════════════════════════════════════════════════════════════
// Hub
// ══════════════════════════════════════════════════════════════════════════════

/// Per-root collector shared by every tracker of that root.
pub(crate) struct TrackerHub {
    coordinator: Rc<TransactionCoordinator>,
    pending: RefCell<Vec<ChangeRecord>>,
    flush_queued: Cell<bool>,
    trackers: RefCell<Vec<Weak<TrackerInner>>>,
    hook: RefCell<Option<Subscription>>,
}

impl TrackerHub {
    fn new(root: &Rc<ExprNode>, coordinator: Rc<TransactionCoordinator>) -> Rc<Self> {
        let hub = Rc::new(Self {
            coordinator,
            pending: RefCell::new(Vec::new()),
            flush_queued: Cell::new(false),
            trackers: RefCell::new(Vec::new()),
            hook: RefCell::new(None),
        });
        let weak = Rc::downgrade(&hub);
        let hook = root.subscribe_changed(move |root| {
            if let Some(hub) = weak.upgrade() {
                hub.collect(root);
            }
        });
        *hub.hook.borrow_mut() = Some(hook);
        hub
    }

    fn collect(self: &Rc<Self>, root: &Rc<ExprNode>) {
        self.pending
            .borrow_mut()
            .extend(root.last_batch.borrow().iter().cloned());
        if self.flush_queued.replace(true) {
            return;
        }
        let hub = Rc::downgrade(self);
        self.coordinator.defer(move || {
            if let Some(hub) = hub.upgrade() {
                hub.flush();
            }
        });
    }

    fn flush(&self) {
        self.flush_queued.set(false);
        let records = std::mem::take(&mut *self.pending.borrow_mut());
        let changes = coalesce(records);
        if changes.is_empty() {
            return;
        }
        let timestamp_ms = now_ms();
        let trackers: Vec<Rc<TrackerInner>> = self
            .trackers
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        debug!(changes = changes.len(), trackers = trackers.len(), "tracker flush");
        for tracker in trackers {
            tracker.record(timestamp_ms, &changes);
        }
    }
}

/// Hubs by root, counted by live trackers.
#[derive(Default)]
pub(crate) struct TrackerRegistry {
    hubs: RefCell<HashMap<NodeId, (Rc<TrackerHub>, usize)>>,
}

impl TrackerRegistry {
    fn acquire(&self, root: &Rc<ExprNode>, coordinator: &Rc<TransactionCoordinator>) -> Rc<TrackerHub> {
        let mut hubs = self.hubs.borrow_mut();
        let (hub, count) = hubs
            .entry(root.id())
            .or_insert_with(|| (TrackerHub::new(root, Rc::clone(coordinator)), 0));
        *count += 1;
        Rc::clone(hub)
    }

    fn release(&self, root: NodeId) {
        let removed = {
            let mut hubs = self.hubs.borrow_mut();
            let last = hubs.get_mut(&root).is_some_and(|(_, count)| {
                *count -= 1;
                *count == 0
            });
            if last {
                hubs.remove(&root)
            } else {
                None
            }
        };
        if let Some((hub, _)) = removed {
            let hook = hub.hook.borrow_mut().take();
            drop(hook);
            debug!(root = %root, "tracker hub released");
        }
    }

    pub(crate) fn hub_count(&self) -> usize {
        self.hubs.borrow().len()
    }

    /// Run `f` with every live tracker paused, then restore each one.
    pub(crate) fn with_paused<R>(&self, f: impl FnOnce() -> R) -> R {
        let trackers: Vec<Rc<TrackerInner>> = self
            .hubs
            .borrow()
            .values()
            .flat_map(|(hub, _)| hub.trackers.borrow().iter().filter_map(Weak::upgrade).collect::<Vec<_>>())
            .collect();
        let previous: Vec<bool> = trackers.iter().map(|tracker| tracker.paused.replace(true)).collect();
        let result = f();
        for (tracker, was_paused) in trackers.iter().zip(previous) {
            tracker.paused.set(was_paused);
        }
        result
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Tracker
// ══════════════════════════════════════════════════════════════════════════════

pub(crate) struct TrackerInner {
    root: NodeId,
    paused: Cell<bool>,
    disposed: Cell<bool>,
    history: RefCell<History>,
    next_index: Cell<usize>,
    history_limit: Option<usize>,
    batches: EventStream<ChangeBatch>,
}

impl TrackerInner {
    fn record(&self, timestamp_ms: u64, changes: &[ChangeRecord]) {
        if self.paused.get() || self.disposed.get() {
            return;
        }
        let index = self.next_index.get();
        self.next_index.set(index + 1);
        let batch = ChangeBatch {
            index,
            timestamp_ms,
            changes: changes.to_vec(),
        };
        {
            let mut history = self.history.borrow_mut();
            history.push(batch.clone());
            if let Some(limit) = self.history_limit {
                history.trim_to(limit);
            }
        }
        self.batches.emit(&batch);
    }
}

/// Records change batches for one bound expression.
pub struct ChangeTracker {
    inner: Rc<TrackerInner>,
    hub: Rc<TrackerHub>,
    services: Rc<Services>,
    registry: Weak<TrackerRegistry>,
    on_dispose: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl ChangeTracker {
    pub(crate) fn new(
        root: &Rc<ExprNode>,
        services: &Rc<Services>,
        registry: &Rc<TrackerRegistry>,
        history_limit: Option<usize>,
        on_dispose: Box<dyn FnOnce()>,
    ) -> Self {
        let hub = registry.acquire(root, &services.coordinator);
        let inner = Rc::new(TrackerInner {
            root: root.id(),
            paused: Cell::new(false),
            disposed: Cell::new(false),
            history: RefCell::new(History::new()),
            next_index: Cell::new(0),
            history_limit,
            batches: EventStream::new(),
        });
        hub.trackers.borrow_mut().push(Rc::downgrade(&inner));
        Self {
            inner,
            hub,
            services: Rc::clone(services),
            registry: Rc::downgrade(registry),
            on_dispose: RefCell::new(Some(on_dispose)),
        }
    }

    fn ensure_live(&self) -> Result<(), LifecycleError> {
        if self.inner.disposed.get() {
            Err(LifecycleError::Disposed("change tracker"))
        } else {
            Ok(())
        }
    }

    /// Receive every batch recorded from now on.
    pub fn subscribe(&self, listener: impl Fn(&ChangeBatch) + 'static) -> Result<Subscription, LifecycleError> {
        self.ensure_live()?;
        Ok(self.inner.batches.subscribe(listener))
    }

    /// Stop recording; the subscription on the root stays in place.
    pub fn pause(&self) {
        self.inner.paused.set(true);
    }

    pub fn resume(&self) {
        self.inner.paused.set(false);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.get()
    }

    pub fn history(&self) -> History {
        self.inner.history.borrow().clone()
    }

    pub fn root_id(&self) -> NodeId {
        self.inner.root
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Stop recording for good. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.hub
            .trackers
            .borrow_mut()
            .retain(|t| t.upgrade().is_some_and(|t| !Rc::ptr_eq(&t, &self.inner)));
        if let Some(registry) = self.registry.upgrade() {
            registry.release(self.inner.root);
        }
        let on_dispose = self.on_dispose.borrow_mut().take();
        if let Some(on_dispose) = on_dispose {
            on_dispose();
        }
    }

    /// Replay this tracker's history forward to `target`.
    ///
    /// Recording is paused while the writes settle, so the replay itself
    /// is not recorded. Returns the number of slots written.
    pub fn play_forward(&self, target: PlaybackTarget) -> Result<usize, PlaybackError> {
        self.replay(target, Direction::Forward)
    }

    /// Replay this tracker's history backward to `target`.
    pub fn play_backward(&self, target: PlaybackTarget) -> Result<usize, PlaybackError> {
        self.replay(target, Direction::Backward)
    }

    fn replay(&self, target: PlaybackTarget, direction: Direction) -> Result<usize, PlaybackError> {
        self.ensure_live()?;
        let history = self.history();
        let was_paused = self.inner.paused.replace(true);
        let result = playback::plan(target, direction, &history)
            .and_then(|writes| playback::apply(&self.services.coordinator, &self.services.state, writes));
        self.inner.paused.set(was_paused);
        result
    }
}

impl Drop for ChangeTracker {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("root", &self.inner.root)
            .field("paused", &self.inner.paused.get())
            .field("batches", &self.inner.history.borrow().len())
            .finish()
    }
}
