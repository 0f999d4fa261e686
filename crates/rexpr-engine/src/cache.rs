//! Reference-counted expression caches.
//!
//! Two tables back [`crate::Engine::create_expression`]:
//!
//! - the parse table maps exact source text to an unbound tree; every
//!   checkout gets a fresh clone while the count tracks the cached copy;
//! - the binding table counts references per `(context, source)` pair; each
//!   checkout binds its own clone into the context and commits it once.
//!
//! Each checkout hands out a [`Lease`]. Releasing the last lease on an
//! instance disposes its tree and releases its parse lease; the pair entry
//! goes away with its last instance.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::build;
use crate::error::BuildError;
use crate::node::{Binding, ExprNode, NodeId, Services, ShouldWatch};
use crate::value::{Obj, ObjId};

type BindingKey = (ObjId, Rc<str>);

struct ParseEntry {
    tree: Rc<ExprNode>,
    refs: usize,
}

struct BindingEntry {
    context: Obj,
    refs: usize,
}

/// One bound tree and the leases held on it.
struct Instance {
    root: Rc<ExprNode>,
    refs: usize,
    _parse_lease: Lease,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LeaseKind {
    Parse(Rc<str>),
    Binding(BindingKey, NodeId),
}

/// Ownership token for one cache checkout.
///
/// Dropping a lease releases it.
#[must_use = "dropping a Lease releases the checkout"]
pub struct Lease {
    kind: LeaseKind,
    cache: Weak<ExpressionCache>,
    released: Cell<bool>,
}

impl Lease {
    fn new(kind: LeaseKind, cache: &Rc<ExpressionCache>) -> Self {
        Self {
            kind,
            cache: Rc::downgrade(cache),
            released: Cell::new(false),
        }
    }

    /// Give the checkout back. Later calls do nothing.
    pub fn release(&self) {
        if self.released.replace(true) {
            return;
        }
        if let Some(cache) = self.cache.upgrade() {
            cache.release(&self.kind);
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.get()
    }

    /// Whether releasing this lease would drop the last reference to its
    /// entry. For bindings the entry is the `(context, source)` pair.
    pub fn can_dispose(&self) -> bool {
        !self.is_released()
            && self
                .cache
                .upgrade()
                .is_some_and(|cache| cache.ref_count(&self.kind) == 1)
    }

    /// A second lease on the same entry.
    pub(crate) fn duplicate(&self) -> Lease {
        let cache = self.cache.upgrade().filter(|_| !self.is_released());
        match cache {
            Some(cache) => {
                cache.retain(&self.kind);
                Lease::new(self.kind.clone(), &cache)
            }
            None => Lease {
                kind: self.kind.clone(),
                cache: Weak::new(),
                released: Cell::new(true),
            },
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("kind", &self.kind)
            .field("released", &self.released.get())
            .finish()
    }
}

pub(crate) struct ExpressionCache {
    services: Rc<Services>,
    parsed: RefCell<HashMap<Rc<str>, ParseEntry>>,
    bound: RefCell<HashMap<BindingKey, BindingEntry>>,
    instances: RefCell<HashMap<NodeId, Instance>>,
    contexts: RefCell<HashMap<ObjId, usize>>,
}

impl ExpressionCache {
    pub(crate) fn new(services: Rc<Services>) -> Rc<Self> {
        Rc::new(Self {
            services,
            parsed: RefCell::new(HashMap::new()),
            bound: RefCell::new(HashMap::new()),
            instances: RefCell::new(HashMap::new()),
            contexts: RefCell::new(HashMap::new()),
        })
    }

    // ── Parse table ───────────────────────────────────────────────────────────

    /// A fresh unbound clone of the tree for `source`.
    pub(crate) fn checkout_parse(self: &Rc<Self>, source: &str) -> Result<(Rc<ExprNode>, Lease), BuildError> {
        let key: Rc<str> = Rc::from(source);
        let cached = self.parsed.borrow_mut().get_mut(&key).map(|entry| {
            entry.refs += 1;
            entry.tree.clone_unbound()
        });
        let tree = match cached {
            Some(tree) => tree,
            None => {
                let tree = build::build(source)?;
                debug!(source, "parse cache miss");
                let copy = tree.clone_unbound();
                self.parsed
                    .borrow_mut()
                    .insert(Rc::clone(&key), ParseEntry { tree, refs: 1 });
                copy
            }
        };
        Ok((tree, Lease::new(LeaseKind::Parse(key), self)))
    }

    // ── Binding table ─────────────────────────────────────────────────────────

    /// A fresh tree for `source` bound into `context` and committed once.
    pub(crate) fn checkout_binding(
        self: &Rc<Self>,
        context: &Obj,
        source: &str,
        should_watch: Option<ShouldWatch>,
    ) -> Result<(Rc<ExprNode>, Lease), BuildError> {
        let (root, parse_lease) = self.checkout_parse(source)?;
        let key: BindingKey = (context.id(), Rc::from(source));
        let first = {
            let mut bound = self.bound.borrow_mut();
            let entry = bound.entry(key.clone()).or_insert_with(|| BindingEntry {
                context: context.clone(),
                refs: 0,
            });
            entry.refs += 1;
            entry.refs == 1
        };
        if first {
            *self.contexts.borrow_mut().entry(context.id()).or_default() += 1;
        }
        self.instances.borrow_mut().insert(
            root.id(),
            Instance {
                root: Rc::clone(&root),
                refs: 1,
                _parse_lease: parse_lease,
            },
        );
        debug!(context = %context.id(), source, root = %root.id(), "bind expression");

        let root_id = root.id();
        let weak = Rc::downgrade(&root);
        let coordinator = &self.services.coordinator;
        let hook = coordinator.committed().subscribe(move |committed| {
            if *committed != root_id {
                return;
            }
            if let Some(root) = weak.upgrade() {
                root.publish();
            }
        });
        *root.root_hook.borrow_mut() = Some(hook);

        let binding = Binding {
            context: context.clone(),
            services: Rc::clone(&self.services),
            root: Rc::downgrade(&root),
            root_id,
            should_watch,
        };
        coordinator.change_cycle(|| {
            root.bind(&binding);
            let initial = Rc::clone(&root);
            coordinator.register_change(
                root_id,
                root_id,
                Box::new(move || {
                    initial.evaluate_tree()?;
                    Ok(initial.value().is_some())
                }),
            );
        });
        let kind = LeaseKind::Binding(key, root_id);
        Ok((root, Lease::new(kind, self)))
    }

    // ── Accounting ────────────────────────────────────────────────────────────

    fn retain(&self, kind: &LeaseKind) {
        match kind {
            LeaseKind::Parse(source) => {
                if let Some(entry) = self.parsed.borrow_mut().get_mut(source) {
                    entry.refs += 1;
                }
            }
            LeaseKind::Binding(key, root) => {
                if let Some(instance) = self.instances.borrow_mut().get_mut(root) {
                    instance.refs += 1;
                }
                if let Some(entry) = self.bound.borrow_mut().get_mut(key) {
                    entry.refs += 1;
                }
            }
        }
    }

    fn release(&self, kind: &LeaseKind) {
        match kind {
            LeaseKind::Parse(source) => {
                let removed = {
                    let mut parsed = self.parsed.borrow_mut();
                    let last = parsed.get_mut(source).is_some_and(|entry| {
                        entry.refs = entry.refs.saturating_sub(1);
                        entry.refs == 0
                    });
                    if last {
                        parsed.remove(source)
                    } else {
                        None
                    }
                };
                if removed.is_some() {
                    debug!(source = %source, "parse entry released");
                }
            }
            LeaseKind::Binding(key, root) => {
                self.release_instance(*root);
                let removed = {
                    let mut bound = self.bound.borrow_mut();
                    let last = bound.get_mut(key).is_some_and(|entry| {
                        entry.refs = entry.refs.saturating_sub(1);
                        entry.refs == 0
                    });
                    if last {
                        bound.remove(key)
                    } else {
                        None
                    }
                };
                let Some(entry) = removed else {
                    return;
                };
                debug!(context = %key.0, source = %key.1, "binding released");
                let mut contexts = self.contexts.borrow_mut();
                let id = entry.context.id();
                if let Some(count) = contexts.get_mut(&id) {
                    *count -= 1;
                    if *count == 0 {
                        contexts.remove(&id);
                    }
                }
            }
        }
    }

    fn release_instance(&self, root: NodeId) {
        let removed = {
            let mut instances = self.instances.borrow_mut();
            let last = instances.get_mut(&root).is_some_and(|instance| {
                instance.refs = instance.refs.saturating_sub(1);
                instance.refs == 0
            });
            if last {
                instances.remove(&root)
            } else {
                None
            }
        };
        if let Some(instance) = removed {
            instance.root.dispose();
            // Dropping the instance releases its parse lease.
            drop(instance);
        }
    }

    fn ref_count(&self, kind: &LeaseKind) -> usize {
        match kind {
            LeaseKind::Parse(source) => self.parse_ref_count(source),
            LeaseKind::Binding(key, _) => self.bound.borrow().get(key).map_or(0, |entry| entry.refs),
        }
    }

    pub(crate) fn parse_ref_count(&self, source: &str) -> usize {
        self.parsed.borrow().get(source).map_or(0, |entry| entry.refs)
    }

    pub(crate) fn binding_ref_count(&self, context: &Obj, source: &str) -> usize {
        let key: BindingKey = (context.id(), Rc::from(source));
        self.bound.borrow().get(&key).map_or(0, |entry| entry.refs)
    }

    /// Number of contexts with at least one live binding.
    pub(crate) fn bound_context_count(&self) -> usize {
        self.contexts.borrow().len()
    }
}
