//! Public expression handles.
//!
//! [`BoundExpression`] is what [`crate::Engine::create_expression`] returns:
//! a leased view of one bound tree. [`ExpressionHandle`] is a
//! non-owning view of any node in that tree, and [`UnboundExpression`] an
//! independent structural copy for inspection.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::accessor::Accessor;
use crate::cache::Lease;
use crate::error::{EngineError, EngineResult, LifecycleError};
use crate::event::Subscription;
use crate::node::{ExprNode, ExpressionType, NodeId, NodeKind, Services};
use crate::value::{ExpressionRef, Value};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// A live expression over one context.
///
/// Every [`crate::Engine::create_expression`] call binds its own tree.
/// Cloning a handle takes another lease on the same tree; each clone must be
/// disposed (or dropped) on its own.
pub struct BoundExpression {
    root: Rc<ExprNode>,
    lease: Lease,
    services: Rc<Services>,
    handle_id: u64,
    disposed: Cell<bool>,
}

impl BoundExpression {
    pub(crate) fn new(root: Rc<ExprNode>, lease: Lease, services: Rc<Services>) -> Self {
        Self {
            root,
            lease,
            services,
            handle_id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            disposed: Cell::new(false),
        }
    }

    fn ensure_live(&self) -> Result<(), LifecycleError> {
        if self.is_disposed() {
            Err(LifecycleError::Disposed("bound expression"))
        } else {
            Ok(())
        }
    }

    pub(crate) fn root(&self) -> &Rc<ExprNode> {
        &self.root
    }

    pub(crate) fn handle_id(&self) -> u64 {
        self.handle_id
    }

    /// Id of the shared root node.
    pub fn id(&self) -> NodeId {
        self.root.id()
    }

    /// Last committed value; `None` until the expression first settles.
    pub fn value(&self) -> Option<Value> {
        self.root.committed_value()
    }

    /// Listen for committed values. The current value, if any, is delivered
    /// immediately.
    pub fn subscribe(&self, listener: impl Fn(&Value) + 'static) -> EngineResult<Subscription> {
        self.ensure_live()?;
        if let Some(current) = self.root.committed_value() {
            listener(&current);
        }
        Ok(self.root.subscribe_changed(move |node| {
            if let Some(value) = node.committed_value() {
                listener(&value);
            }
        }))
    }

    pub fn expression_type(&self) -> ExpressionType {
        self.root.expression_type()
    }

    pub fn expression_string(&self) -> &str {
        self.root.source()
    }

    pub fn child_expressions(&self) -> Vec<ExpressionHandle> {
        ExpressionHandle::new(Rc::clone(&self.root)).child_expressions()
    }

    /// This expression as a value that can be stored in a context.
    pub fn as_value(&self) -> Value {
        Value::Expression(ExpressionRef(Rc::clone(&self.root)))
    }

    /// Write `value` into the slot this expression reads.
    ///
    /// Only identifiers and fully resolved member paths are assignable.
    pub fn set_value(&self, value: Value) -> EngineResult<()> {
        self.ensure_live()?;
        let accessor = self
            .target()
            .ok_or_else(|| EngineError::NotAssignable(self.root.source().to_string()))?;
        accessor.write(&self.services.state, value)?;
        Ok(())
    }

    fn target(&self) -> Option<Accessor> {
        let slot = match &self.root.kind {
            NodeKind::Identifier { .. } => self.root.slot(),
            NodeKind::Member { segments } => {
                let hops = self.root.hops();
                if hops.len() == segments.len() {
                    hops.last().and_then(|hop| hop.slot())
                } else {
                    None
                }
            }
            _ => None,
        };
        slot.map(|(context, key)| Accessor::new(context, key))
    }

    /// An independent unbound copy of this expression's tree.
    pub fn clone_unbound(&self) -> UnboundExpression {
        UnboundExpression {
            root: self.root.clone_unbound(),
        }
    }

    /// Whether releasing this handle would drop the last reference to its
    /// `(context, source)` pair.
    pub fn can_dispose(&self) -> bool {
        self.lease.can_dispose()
    }

    /// Release this handle. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.lease.release();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get() || self.root.is_disposed()
    }
}

impl Clone for BoundExpression {
    fn clone(&self) -> Self {
        let lease = self.lease.duplicate();
        let clone = BoundExpression::new(Rc::clone(&self.root), lease, Rc::clone(&self.services));
        clone.disposed.set(self.disposed.get());
        clone
    }
}

impl std::fmt::Debug for BoundExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundExpression")
            .field("id", &self.root.id())
            .field("source", &self.root.source())
            .field("value", &self.value())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Views
// ══════════════════════════════════════════════════════════════════════════════

/// A non-owning view of one node of a bound tree.
#[derive(Clone)]
pub struct ExpressionHandle {
    node: Rc<ExprNode>,
}

impl ExpressionHandle {
    fn new(node: Rc<ExprNode>) -> Self {
        Self { node }
    }

    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    pub fn value(&self) -> Option<Value> {
        self.node.committed_value()
    }

    pub fn expression_type(&self) -> ExpressionType {
        self.node.expression_type()
    }

    pub fn expression_string(&self) -> &str {
        self.node.source()
    }

    pub fn child_expressions(&self) -> Vec<ExpressionHandle> {
        self.node
            .children
            .iter()
            .map(|child| ExpressionHandle::new(Rc::clone(child)))
            .collect()
    }

    pub fn subscribe(&self, listener: impl Fn(&Value) + 'static) -> Subscription {
        self.node.subscribe_changed(move |node| {
            if let Some(value) = node.committed_value() {
                listener(&value);
            }
        })
    }
}

impl std::fmt::Debug for ExpressionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} `{}`", self.node.expression_type(), self.node.source())
    }
}

/// A structural copy with no binding.
#[derive(Debug)]
pub struct UnboundExpression {
    root: Rc<ExprNode>,
}

impl UnboundExpression {
    pub fn id(&self) -> NodeId {
        self.root.id()
    }

    pub fn expression_type(&self) -> ExpressionType {
        self.root.expression_type()
    }

    pub fn expression_string(&self) -> &str {
        self.root.source()
    }

    pub fn child_expressions(&self) -> Vec<UnboundExpression> {
        self.root
            .children
            .iter()
            .map(|child| UnboundExpression {
                root: Rc::clone(child),
            })
            .collect()
    }
}
