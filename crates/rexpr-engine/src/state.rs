//! Slot watching and observable writes over the data graph.
//!
//! The state manager owns an arena of watch records keyed by
//! `(container identity, key)`. Each record counts its listeners on its own,
//! independent of which expression registered them, so two expressions
//! reading the same slot share one record. Dropping the last [`SlotWatch`]
//! for a slot removes the record.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::error::EvalResult;
use crate::event::{EventStream, Subscription};
use crate::value::{Key, Obj, ObjId, Shape, Value};

/// A completed observable write.
#[derive(Debug, Clone)]
pub struct Change {
    pub context: Obj,
    pub key: Key,
    pub old: Value,
    pub new: Value,
}

/// Brackets around a group of writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEvent {
    Start,
    End,
}

/// Options attached to a watch registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Id of the registering party, for introspection.
    pub owner: Option<u64>,
}

type SlotListener = Rc<dyn Fn(&Change)>;

struct SlotRecord {
    listeners: Vec<(u64, Option<u64>, SlotListener)>,
}

pub struct StateManager {
    slots: RefCell<HashMap<(ObjId, Key), SlotRecord>>,
    /// Key-set listeners of records and maps, told when a key is added.
    members: RefCell<HashMap<ObjId, SlotRecord>>,
    next_listener: Cell<u64>,
    changes: EventStream<Change>,
    cycles: EventStream<CycleEvent>,
}

/// Registration on one slot. Dropping it unwatches.
#[must_use = "dropping a SlotWatch unwatches the slot"]
#[derive(Debug)]
pub struct SlotWatch {
    _detach: Subscription,
}

impl SlotWatch {
    pub fn unwatch(self) {
        drop(self);
    }
}

/// Registrations on every slot reachable from a container.
#[must_use = "dropping a DeepWatch unwatches every slot it covers"]
#[derive(Debug, Default)]
pub struct DeepWatch {
    watches: Vec<SlotWatch>,
    members: Vec<SlotWatch>,
}

impl DeepWatch {
    pub fn slot_count(&self) -> usize {
        self.watches.len()
    }

    /// Records and maps whose key set is watched.
    pub fn container_count(&self) -> usize {
        self.members.len()
    }
}

impl StateManager {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            slots: RefCell::new(HashMap::new()),
            members: RefCell::new(HashMap::new()),
            next_listener: Cell::new(0),
            changes: EventStream::new(),
            cycles: EventStream::new(),
        })
    }

    // ── Watching ──────────────────────────────────────────────────────────────

    /// Watch `(context, key)` and return its current value.
    pub fn watch(
        self: &Rc<Self>,
        context: &Obj,
        key: &Key,
        options: WatchOptions,
        listener: impl Fn(&Change) + 'static,
    ) -> (Value, SlotWatch) {
        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        let slot = (context.id(), key.clone());
        self.slots
            .borrow_mut()
            .entry(slot.clone())
            .or_insert_with(|| SlotRecord {
                listeners: Vec::new(),
            })
            .listeners
            .push((id, options.owner, Rc::new(listener)));
        trace!(context = %context.id(), key = %key, "watch");

        let manager: Weak<StateManager> = Rc::downgrade(self);
        let detach = Subscription::new(move || {
            if let Some(manager) = manager.upgrade() {
                manager.remove_listener(&slot, id);
            }
        });
        (context.get(key), SlotWatch { _detach: detach })
    }

    fn remove_listener(&self, slot: &(ObjId, Key), id: u64) {
        let removed = {
            let mut slots = self.slots.borrow_mut();
            let Some(record) = slots.get_mut(slot) else {
                return;
            };
            let removed = record
                .listeners
                .iter()
                .position(|(entry, _, _)| *entry == id)
                .map(|pos| record.listeners.remove(pos));
            if record.listeners.is_empty() {
                slots.remove(slot);
                trace!(context = %slot.0, key = %slot.1, "unwatch");
            }
            removed
        };
        drop(removed);
    }

    /// Watch the key set of a record or map: `listener` hears about every
    /// write that adds a key to `context`.
    pub fn watch_members(
        self: &Rc<Self>,
        context: &Obj,
        options: WatchOptions,
        listener: impl Fn(&Change) + 'static,
    ) -> SlotWatch {
        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        let obj = context.id();
        self.members
            .borrow_mut()
            .entry(obj)
            .or_insert_with(|| SlotRecord {
                listeners: Vec::new(),
            })
            .listeners
            .push((id, options.owner, Rc::new(listener)));

        let manager: Weak<StateManager> = Rc::downgrade(self);
        let detach = Subscription::new(move || {
            if let Some(manager) = manager.upgrade() {
                manager.remove_member_listener(obj, id);
            }
        });
        SlotWatch { _detach: detach }
    }

    fn remove_member_listener(&self, obj: ObjId, id: u64) {
        let removed = {
            let mut members = self.members.borrow_mut();
            let Some(record) = members.get_mut(&obj) else {
                return;
            };
            let removed = record
                .listeners
                .iter()
                .position(|(entry, _, _)| *entry == id)
                .map(|pos| record.listeners.remove(pos));
            if record.listeners.is_empty() {
                members.remove(&obj);
            }
            removed
        };
        drop(removed);
    }

    /// Watch every key of `value` and of the containers nested under it.
    ///
    /// Lists also watch their `length`, records and maps their key set. Cycles in the graph are visited
    /// once. Scalars and async sources produce an empty watch.
    pub fn watch_deep(
        self: &Rc<Self>,
        value: &Value,
        options: WatchOptions,
        listener: Rc<dyn Fn(&Change)>,
    ) -> DeepWatch {
        let mut deep = DeepWatch::default();
        let mut visited = HashSet::new();
        self.watch_nested(value, options, &listener, &mut visited, &mut deep);
        deep
    }

    fn watch_nested(
        self: &Rc<Self>,
        value: &Value,
        options: WatchOptions,
        listener: &Rc<dyn Fn(&Change)>,
        visited: &mut HashSet<ObjId>,
        deep: &mut DeepWatch,
    ) {
        let Value::Object(obj) = value else {
            return;
        };
        if !visited.insert(obj.id()) {
            return;
        }
        let mut keys = obj.keys();
        if obj.is_list() {
            keys.push(Key::length());
        } else {
            let notify = Rc::clone(listener);
            deep.members.push(self.watch_members(obj, options, move |change| notify(change)));
        }
        for key in keys {
            let notify = Rc::clone(listener);
            let (child, watch) = self.watch(obj, &key, options, move |change| notify(change));
            deep.watches.push(watch);
            self.watch_nested(&child, options, listener, visited, deep);
        }
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    pub fn is_watched(&self, context: &Obj, key: &Key) -> bool {
        self.slots
            .borrow()
            .contains_key(&(context.id(), key.clone()))
    }

    /// Whether any listener watches the key set of `context`.
    pub fn is_members_watched(&self, context: &Obj) -> bool {
        self.members.borrow().contains_key(&context.id())
    }

    /// Number of distinct watched slots.
    pub fn watched_slot_count(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Watched keys of one container, in key order.
    pub fn watched_keys(&self, context: &Obj) -> Vec<Key> {
        let mut keys: Vec<Key> = self
            .slots
            .borrow()
            .keys()
            .filter(|(id, _)| *id == context.id())
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Owners registered on one slot.
    pub fn owners(&self, context: &Obj, key: &Key) -> Vec<u64> {
        self.slots
            .borrow()
            .get(&(context.id(), key.clone()))
            .map(|record| record.listeners.iter().filter_map(|(_, o, _)| *o).collect())
            .unwrap_or_default()
    }

    // ── Reads & Writes ────────────────────────────────────────────────────────

    pub fn get_value(&self, context: &Obj, key: &Key) -> Value {
        context.get(key)
    }

    /// Write a slot inside its own change cycle.
    ///
    /// Listeners of the slot hear about the write only if the value changed.
    /// When a list's length changes as a side effect, `length` listeners are
    /// notified too; when a record or map gains a key, its key-set listeners
    /// are. A list write past [`crate::MAX_LIST_LEN`] fails and changes
    /// nothing.
    pub fn set_value(&self, context: &Obj, key: &Key, value: Value) -> EvalResult<()> {
        self.cycles.emit(&CycleEvent::Start);
        let result = self.write(context, key, value);
        self.cycles.emit(&CycleEvent::End);
        result
    }

    fn write(&self, context: &Obj, key: &Key, value: Value) -> EvalResult<()> {
        let old_len = context.is_list().then(|| context.len());
        let added = !context.is_list() && !context.contains(key);
        let old = context.try_set(key, value.clone())?;
        let change = Change {
            context: context.clone(),
            key: key.clone(),
            old,
            new: value,
        };
        if added {
            self.notify_members(&change);
        }
        if !change.old.same_value(&change.new) {
            self.notify(change);
        }
        if let Some(old_len) = old_len {
            let new_len = context.len();
            if new_len != old_len && !key.is_length() {
                self.notify(Change {
                    context: context.clone(),
                    key: Key::length(),
                    old: Value::Number(old_len as f64),
                    new: Value::Number(new_len as f64),
                });
            }
        }
        Ok(())
    }

    /// Run `f` inside one change cycle so its writes settle together.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.cycles.emit(&CycleEvent::Start);
        let result = f();
        self.cycles.emit(&CycleEvent::End);
        result
    }

    fn notify(&self, change: Change) {
        let listeners: Vec<SlotListener> = self
            .slots
            .borrow()
            .get(&(change.context.id(), change.key.clone()))
            .map(|record| record.listeners.iter().map(|(_, _, l)| Rc::clone(l)).collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(&change);
        }
        self.changes.emit(&change);
    }

    fn notify_members(&self, change: &Change) {
        let listeners: Vec<SlotListener> = self
            .members
            .borrow()
            .get(&change.context.id())
            .map(|record| record.listeners.iter().map(|(_, _, l)| Rc::clone(l)).collect())
            .unwrap_or_default();
        trace!(context = %change.context.id(), key = %change.key, "key added");
        for listener in listeners {
            listener(change);
        }
    }

    /// Whether nested reads under `value` need their own watches.
    pub fn needs_deep_observation(&self, value: &Value) -> bool {
        matches!(value.shape(), Shape::Record | Shape::List | Shape::Map)
    }

    pub fn changes(&self) -> &EventStream<Change> {
        &self.changes
    }

    pub fn change_cycles(&self) -> &EventStream<CycleEvent> {
        &self.cycles
    }
}
