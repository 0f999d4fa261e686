//! Identifier resolution.
//!
//! An identifier node is bound to one `(context, key)` slot. It watches the
//! slot through the state manager, unwraps async sources and nested
//! expressions down to a plain payload, and (for leaves) deep-watches a
//! container payload so nested mutations reach the expression.
//!
//! Every notification funnels into [`ExprNode::signal`], which registers at
//! most one pending commit per identifier with the transaction coordinator.

use std::rc::{Rc, Weak};

use tracing::trace;

use crate::async_value::unwrap_value;
use crate::error::EngineResult;
use crate::event::Subscription;
use crate::node::{ExprNode, Runtime};
use crate::state::{DeepWatch, SlotWatch, WatchOptions};
use crate::tracker::{ChangeRecord, IdentifierRef};
use crate::value::{Key, Obj, Value};

pub(crate) struct IdentifierState {
    pub(crate) context: Obj,
    pub(crate) key: Key,
    /// Leaves get deep observation of container payloads.
    leaf: bool,
    watch: Option<SlotWatch>,
    sources: Vec<Subscription>,
    deep: Option<DeepWatch>,
    /// `Some(forced)` while a commit is queued.
    pending: Option<bool>,
}

impl IdentifierState {
    pub(crate) fn new(context: Obj, key: Key, leaf: bool) -> Self {
        Self {
            context,
            key,
            leaf,
            watch: None,
            sources: Vec::new(),
            deep: None,
            pending: None,
        }
    }

    pub(crate) fn is_slot(&self, context: &Obj, key: &Key) -> bool {
        self.context.ptr_eq(context) && &self.key == key
    }
}

fn notifier(node: &Weak<ExprNode>, forced: bool) -> impl Fn() + 'static {
    let node = Weak::clone(node);
    move || {
        if let Some(node) = node.upgrade() {
            node.signal(forced);
        }
    }
}

impl ExprNode {
    /// The slot this identifier reads, if it is a bound identifier.
    pub(crate) fn slot(&self) -> Option<(Obj, Key)> {
        match &*self.runtime.borrow() {
            Runtime::Identifier(state) => Some((state.context.clone(), state.key.clone())),
            _ => None,
        }
    }

    /// (Re)establish watches on the slot and store its unwrapped value.
    ///
    /// Returns the new value; `None` while an async source is unresolved.
    pub(crate) fn resolve_identifier(self: &Rc<Self>) -> Option<Value> {
        let binding = self.binding.borrow().clone()?;
        let (context, key, leaf) = match &*self.runtime.borrow() {
            Runtime::Identifier(state) => (state.context.clone(), state.key.clone(), state.leaf),
            _ => return None,
        };
        let weak = Rc::downgrade(self);
        let state = &binding.services.state;
        let options = WatchOptions {
            owner: Some(self.id.get()),
        };

        let on_slot = notifier(&weak, false);
        let (raw, watch) = state.watch(&context, &key, options, move |_| on_slot());
        let on_update: Rc<dyn Fn()> = Rc::new(notifier(&weak, false));
        let mut sources = Vec::new();
        let value = unwrap_value(&raw, &on_update, &mut sources);

        let deep = match &value {
            Some(payload)
                if leaf
                    && binding.services.deep_observation
                    && state.needs_deep_observation(payload)
                    && binding
                        .should_watch
                        .as_ref()
                        .map_or(true, |should_watch| should_watch(&key, payload)) =>
            {
                let on_nested = notifier(&weak, true);
                Some(state.watch_deep(payload, options, Rc::new(move |_| on_nested())))
            }
            _ => None,
        };

        let replaced = match &mut *self.runtime.borrow_mut() {
            Runtime::Identifier(state) => Some((
                state.watch.replace(watch),
                std::mem::replace(&mut state.sources, sources),
                std::mem::replace(&mut state.deep, deep),
            )),
            _ => None,
        };
        drop(replaced);

        *self.value.borrow_mut() = value.clone();
        value
    }

    /// Queue a commit for this identifier. Repeated signals before the
    /// commit runs collapse into one; `forced` is sticky.
    pub(crate) fn signal(self: &Rc<Self>, forced: bool) {
        if self.is_disposed() {
            return;
        }
        let first = match &mut *self.runtime.borrow_mut() {
            Runtime::Identifier(state) => {
                let first = state.pending.is_none();
                state.pending = Some(state.pending.unwrap_or(false) || forced);
                first
            }
            _ => return,
        };
        if !first {
            return;
        }
        let Some(binding) = self.binding.borrow().clone() else {
            return;
        };
        trace!(node = %self.id, source = %self.source, forced, "identifier changed");
        let coordinator = &binding.services.coordinator;
        let node = Rc::clone(self);
        coordinator.change_cycle(|| {
            coordinator.register_change(
                binding.root_id,
                self.id,
                Box::new(move || node.commit_identifier()),
            );
        });
    }

    /// Commit handler: re-resolve the slot, journal the transition and
    /// propagate it upward.
    pub(crate) fn commit_identifier(self: &Rc<Self>) -> EngineResult<bool> {
        let forced = match &mut *self.runtime.borrow_mut() {
            Runtime::Identifier(state) => state.pending.take().unwrap_or(false),
            _ => return Ok(false),
        };
        if self.is_disposed() {
            return Ok(false);
        }
        let old = self.value();
        let Some(new) = self.resolve_identifier() else {
            return Ok(false);
        };
        let changed = old.as_ref().map_or(true, |old| !old.same_value(&new));
        if let (Some(old), true) = (old, changed) {
            if let Some((context, key)) = self.slot() {
                self.journal_change(ChangeRecord {
                    identifier: IdentifierRef {
                        context,
                        key,
                        label: Rc::clone(&self.source),
                    },
                    old,
                    new: new.clone(),
                });
            }
        }
        if !changed && !forced {
            return Ok(false);
        }
        if forced {
            self.touched.set(true);
        }
        self.propagate(forced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Binding, NodeKind, Services};
    use crate::state::StateManager;
    use crate::transaction::TransactionCoordinator;

    fn bound_identifier(context: &Obj, name: &str) -> (Rc<ExprNode>, Rc<Services>) {
        let state = StateManager::new();
        let coordinator = TransactionCoordinator::new(1_000, 16);
        coordinator.attach(&state);
        let services = Rc::new(Services {
            coordinator,
            state,
            deep_observation: true,
        });
        let node = ExprNode::new(NodeKind::Identifier { name: name.into() }, name, vec![]);
        node.bind(&Binding {
            context: context.clone(),
            services: Rc::clone(&services),
            root: Rc::downgrade(&node),
            root_id: node.id(),
            should_watch: None,
        });
        (node, services)
    }

    #[test]
    fn test_bind_resolves_current_value() {
        let ctx = Obj::record();
        ctx.set(&Key::name("a"), Value::from(1));
        let (node, services) = bound_identifier(&ctx, "a");
        assert_eq!(node.value(), Some(Value::from(1)));
        assert!(services.state.is_watched(&ctx, &Key::name("a")));
    }

    #[test]
    fn test_write_commits_and_journals() {
        let ctx = Obj::record();
        ctx.set(&Key::name("a"), Value::from(1));
        let (node, services) = bound_identifier(&ctx, "a");
        services.state.set_value(&ctx, &Key::name("a"), Value::from(2)).unwrap();
        assert_eq!(node.value(), Some(Value::from(2)));
        // Nothing published yet, so the transition stays in the journal.
        let journal = node.journal.borrow();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].old, Value::from(1));
        assert_eq!(journal[0].new, Value::from(2));
    }

    #[test]
    fn test_pending_future_leaves_value_unset() {
        let ctx = Obj::record();
        let future = crate::async_value::AsyncSingle::pending();
        ctx.set(&Key::name("a"), Value::Future(future.clone()));
        let (node, _services) = bound_identifier(&ctx, "a");
        assert_eq!(node.value(), None);
        future.resolve(Value::from(5));
        assert_eq!(node.value(), Some(Value::from(5)));
    }

    #[test]
    fn test_leaf_deep_watches_container() {
        let ctx = Obj::record();
        ctx.set(&Key::name("a"), Value::record([("x", Value::from(1)), ("y", Value::from(2))]));
        let (_node, services) = bound_identifier(&ctx, "a");
        assert_eq!(services.state.watched_slot_count(), 3);
    }

    #[test]
    fn test_dispose_unwatches() {
        let ctx = Obj::record();
        ctx.set(&Key::name("a"), Value::from(1));
        let (node, services) = bound_identifier(&ctx, "a");
        node.dispose();
        assert_eq!(services.state.watched_slot_count(), 0);
        services.state.set_value(&ctx, &Key::name("a"), Value::from(9)).unwrap();
        assert_eq!(node.value(), Some(Value::from(1)));
    }
}
