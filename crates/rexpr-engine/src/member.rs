//! Member path resolution.
//!
//! A member node such as `a.b[i].c` owns its base (`a`) and the index
//! expressions of its computed segments (`i`) as children. Each resolved
//! segment is backed by a *hop*: an internal identifier bound to
//! `(container at this point, key)`. Hops are created one tick after the
//! container they read becomes known, never inside the evaluation that
//! discovered it.
//!
//! Evaluation walks the segments left to right and reuses every hop whose
//! slot still matches. The first mismatch disposes that hop and all hops
//! after it, then schedules a rebind. While a rebind started from segment
//! `p` is queued, changes arriving from segments after `p` are ignored: the
//! rebind will recompute them anyway.

use std::rc::Rc;

use tracing::{debug, trace};

use crate::node::{Binding, Evaluated, ExprNode, NodeKind, Runtime};
use crate::identifier::IdentifierState;
use crate::ops;
use crate::value::{Key, Obj, Value};

#[derive(Debug, Clone)]
pub(crate) enum SegmentKey {
    Static(Rc<str>),
    /// Index of the `Index` child holding the key expression.
    Computed(usize),
}

#[derive(Debug, Clone)]
pub(crate) struct Segment {
    pub(crate) key: SegmentKey,
}

#[derive(Default)]
pub(crate) struct MemberState {
    pub(crate) hops: Vec<Rc<ExprNode>>,
    generation: u64,
    /// Segment whose hop is queued for binding.
    pending_from: Option<usize>,
    /// Container the last segment was read from.
    receiver: Option<Value>,
}

/// What the walk decided for one segment.
enum Step {
    Continue(Value),
    Rebind(Obj, Key),
    Pending,
}

impl ExprNode {
    pub(crate) fn hops(&self) -> Vec<Rc<ExprNode>> {
        match &*self.runtime.borrow() {
            Runtime::Member(state) => state.hops.clone(),
            _ => Vec::new(),
        }
    }

    /// `this` for a call whose callee is this node.
    pub(crate) fn receiver(&self) -> Value {
        match &*self.runtime.borrow() {
            Runtime::Member(state) => state.receiver.clone().unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Segment a change from `trigger` starts at.
    fn entry_segment(&self, segments: &[Segment], trigger: Option<&Rc<ExprNode>>) -> usize {
        let Some(trigger) = trigger else {
            return 0;
        };
        if let Some(position) = self.hops().iter().position(|hop| Rc::ptr_eq(hop, trigger)) {
            return position + 1;
        }
        segments
            .iter()
            .position(|segment| {
                matches!(segment.key, SegmentKey::Computed(child)
                    if self.children.get(child).is_some_and(|c| Rc::ptr_eq(c, trigger)))
            })
            .unwrap_or(0)
    }

    pub(crate) fn evaluate_member(
        self: &Rc<Self>,
        segments: &[Segment],
        trigger: Option<&Rc<ExprNode>>,
    ) -> Evaluated {
        let from = self.entry_segment(segments, trigger);
        let superseded = match &*self.runtime.borrow() {
            Runtime::Member(state) => state.pending_from.is_some_and(|p| p < from),
            _ => return Evaluated::Pending,
        };
        if superseded {
            trace!(node = %self.id, from, "stale member change ignored");
            return Evaluated::Pending;
        }

        let Some(mut current) = self.children.first().and_then(|base| base.value()) else {
            return Evaluated::Pending;
        };
        for (index, segment) in segments.iter().enumerate() {
            let key = match &segment.key {
                SegmentKey::Static(name) => Key::name(name),
                SegmentKey::Computed(child) => {
                    match self.children.get(*child).and_then(|c| c.value()) {
                        Some(value) => Key::from_value(&value),
                        None => return Evaluated::Pending,
                    }
                }
            };
            if index + 1 == segments.len() {
                if let Runtime::Member(state) = &mut *self.runtime.borrow_mut() {
                    state.receiver = Some(current.clone());
                }
            }
            match self.step(index, &current, key) {
                Step::Continue(next) => current = next,
                Step::Pending => return Evaluated::Pending,
                Step::Rebind(context, key) => {
                    self.schedule_hop(index, context, key, index + 1 == segments.len());
                    return Evaluated::Pending;
                }
            }
        }
        Evaluated::Value(current)
    }

    /// Read one segment from `current`, reusing the hop at `index` when it
    /// still observes the same slot.
    fn step(&self, index: usize, current: &Value, key: Key) -> Step {
        let Value::Object(context) = current else {
            self.truncate_hops(index);
            let next = match current {
                Value::String(s) => ops::string_member(s, &key),
                _ => Value::Undefined,
            };
            return Step::Continue(next);
        };
        let reusable = self.hops().get(index).cloned().filter(|hop| {
            matches!(&*hop.runtime.borrow(), Runtime::Identifier(state) if state.is_slot(context, &key))
        });
        match reusable {
            Some(hop) => match hop.value() {
                Some(value) => Step::Continue(value),
                None => Step::Pending,
            },
            None => Step::Rebind(context.clone(), key),
        }
    }

    /// Dispose the hops at `index` and after.
    fn truncate_hops(&self, index: usize) {
        let stale: Vec<Rc<ExprNode>> = match &mut *self.runtime.borrow_mut() {
            Runtime::Member(state) if state.hops.len() > index => state.hops.split_off(index),
            _ => Vec::new(),
        };
        for hop in stale {
            hop.dispose();
        }
    }

    /// Invalidate from `index` on and bind a fresh hop on the next tick.
    fn schedule_hop(self: &Rc<Self>, index: usize, context: Obj, key: Key, leaf: bool) {
        self.truncate_hops(index);
        let generation = match &mut *self.runtime.borrow_mut() {
            Runtime::Member(state) => {
                state.generation += 1;
                state.pending_from = Some(index);
                state.generation
            }
            _ => return,
        };
        *self.value.borrow_mut() = None;
        let Some(binding) = self.binding.borrow().clone() else {
            return;
        };
        debug!(node = %self.id, index, key = %key, "rebind member hop");
        let member = Rc::downgrade(self);
        binding.services.coordinator.defer_for(binding.root_id, move || {
            if let Some(member) = member.upgrade() {
                member.bind_hop(index, context, key, leaf, generation);
            }
        });
    }

    fn generation(&self) -> Option<u64> {
        match &*self.runtime.borrow() {
            Runtime::Member(state) => Some(state.generation),
            _ => None,
        }
    }

    fn bind_hop(self: &Rc<Self>, index: usize, context: Obj, key: Key, leaf: bool, generation: u64) {
        if self.is_disposed() || self.generation() != Some(generation) {
            return;
        }
        let Some(binding) = self.binding.borrow().clone() else {
            return;
        };
        let label = format!("{}", key);
        let hop = ExprNode::new(NodeKind::Identifier { name: label.as_str().into() }, label, vec![]);
        hop.set_parent(self);
        *hop.binding.borrow_mut() = Some(Binding {
            context: context.clone(),
            ..binding.clone()
        });
        *hop.runtime.borrow_mut() = Runtime::Identifier(IdentifierState::new(context, key, leaf));
        hop.resolve_identifier();

        let accepted = match &mut *self.runtime.borrow_mut() {
            Runtime::Member(state) if state.hops.len() == index => {
                state.hops.push(Rc::clone(&hop));
                state.pending_from = None;
                true
            }
            _ => false,
        };
        if !accepted {
            hop.dispose();
            return;
        }

        let member = Rc::downgrade(self);
        let handler_hop = Rc::clone(&hop);
        binding.services.coordinator.register_change(
            binding.root_id,
            hop.id,
            Box::new(move || {
                let live = member
                    .upgrade()
                    .is_some_and(|m| !m.is_disposed() && m.generation() == Some(generation));
                if !live || handler_hop.is_disposed() {
                    return Ok(false);
                }
                handler_hop.propagate(false)
            }),
        );
    }
}
