//! Expression node model.
//!
//! A bound expression is a tree of [`ExprNode`]s. Children are owned by
//! their parent and point back to it weakly. Every node memoizes its last
//! evaluated value (`None` while unset), the value last published to
//! subscribers, and a `changed` stream.
//!
//! Re-evaluation is bottom-up: a leaf that observed a change walks its
//! ancestors with [`ExprNode::propagate`] and stops at the first ancestor
//! that is Pending, ignores the child, or does not change. Publication to
//! subscribers is a separate step run once the transaction coordinator
//! announces the root as committed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use rexpr_types::ast::{BinaryOp, LogicalOp, UnaryOp};
use serde::{Deserialize, Serialize};

use crate::error::{EngineResult, EvalError, EvalResult};
use crate::event::{EventStream, Subscription};
use crate::identifier::IdentifierState;
use crate::member::{MemberState, Segment};
use crate::ops;
use crate::state::StateManager;
use crate::tracker::ChangeRecord;
use crate::transaction::TransactionCoordinator;
use crate::value::{Key, Obj, Value};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Kinds
// ══════════════════════════════════════════════════════════════════════════════

/// Public name of a node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpressionType {
    // ── Literals ──
    NumberLiteral,
    StringLiteral,
    BooleanLiteral,
    NullLiteral,
    UndefinedLiteral,
    Template,
    Array,
    Object,
    Property,
    Spread,

    // ── References ──
    Identifier,
    Index,
    Member,
    Call,
    New,

    // ── Unary ──
    Negate,
    UnaryPlus,
    Not,
    BitwiseNot,
    Typeof,

    // ── Binary ──
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Exponent,
    LeftShift,
    RightShift,
    UnsignedRightShift,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    Equals,
    NotEquals,
    StrictEquals,
    StrictNotEquals,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    In,

    // ── Control ──
    And,
    Or,
    NullishCoalescing,
    Conditional,
    Sequence,
}

/// How an object literal member names its slot.
#[derive(Debug, Clone)]
pub(crate) enum PropertyKey {
    /// Children: `[value]`.
    Static(Rc<str>),
    /// Children: `[key, value]`.
    Computed,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Literal(Value),
    /// Children are the substitutions; there is one more quasi than children.
    Template { quasis: Vec<Rc<str>> },
    /// Children are items, spreads and holes.
    Array,
    /// Children are `Property` and `Spread` nodes.
    Object,
    Property(PropertyKey),
    Spread,
    Identifier { name: Rc<str> },
    /// A computed member segment. Children: `[expression]`.
    Index,
    /// Children: `[base, Index...]`. Segments refer to the index children.
    Member { segments: Vec<Segment> },
    /// Children: `[callee, args...]`.
    Call { optional: bool },
    New,
    /// Built through [`NodeKind::unary`], which carries the public type.
    Unary(UnaryOp, ExpressionType),
    /// Built through [`NodeKind::binary`].
    Binary(BinaryOp, ExpressionType),
    Logical(LogicalOp),
    Conditional,
    Sequence,
}

impl NodeKind {
    /// A unary node, or `None` for `void` and `delete`.
    pub(crate) fn unary(op: UnaryOp) -> Option<NodeKind> {
        let ty = match op {
            UnaryOp::Neg => ExpressionType::Negate,
            UnaryOp::Plus => ExpressionType::UnaryPlus,
            UnaryOp::Not => ExpressionType::Not,
            UnaryOp::BitNot => ExpressionType::BitwiseNot,
            UnaryOp::Typeof => ExpressionType::Typeof,
            UnaryOp::Void | UnaryOp::Delete => return None,
        };
        Some(NodeKind::Unary(op, ty))
    }

    /// A binary node, or `None` for `instanceof`.
    pub(crate) fn binary(op: BinaryOp) -> Option<NodeKind> {
        let ty = match op {
            BinaryOp::Add => ExpressionType::Add,
            BinaryOp::Sub => ExpressionType::Subtract,
            BinaryOp::Mul => ExpressionType::Multiply,
            BinaryOp::Div => ExpressionType::Divide,
            BinaryOp::Rem => ExpressionType::Remainder,
            BinaryOp::Pow => ExpressionType::Exponent,
            BinaryOp::Shl => ExpressionType::LeftShift,
            BinaryOp::Shr => ExpressionType::RightShift,
            BinaryOp::UShr => ExpressionType::UnsignedRightShift,
            BinaryOp::BitAnd => ExpressionType::BitwiseAnd,
            BinaryOp::BitOr => ExpressionType::BitwiseOr,
            BinaryOp::BitXor => ExpressionType::BitwiseXor,
            BinaryOp::Eq => ExpressionType::Equals,
            BinaryOp::NotEq => ExpressionType::NotEquals,
            BinaryOp::StrictEq => ExpressionType::StrictEquals,
            BinaryOp::StrictNotEq => ExpressionType::StrictNotEquals,
            BinaryOp::Less => ExpressionType::LessThan,
            BinaryOp::Greater => ExpressionType::GreaterThan,
            BinaryOp::LessEq => ExpressionType::LessThanOrEqual,
            BinaryOp::GreaterEq => ExpressionType::GreaterThanOrEqual,
            BinaryOp::In => ExpressionType::In,
            BinaryOp::InstanceOf => return None,
        };
        Some(NodeKind::Binary(op, ty))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Binding
// ══════════════════════════════════════════════════════════════════════════════

/// Decides whether the value under a leaf slot gets deep observation.
pub type ShouldWatch = Rc<dyn Fn(&Key, &Value) -> bool>;

/// Collaborators shared by every node bound through one engine.
pub(crate) struct Services {
    pub(crate) coordinator: Rc<TransactionCoordinator>,
    pub(crate) state: Rc<StateManager>,
    pub(crate) deep_observation: bool,
}

#[derive(Clone)]
pub(crate) struct Binding {
    pub(crate) context: Obj,
    pub(crate) services: Rc<Services>,
    pub(crate) root: Weak<ExprNode>,
    pub(crate) root_id: NodeId,
    pub(crate) should_watch: Option<ShouldWatch>,
}

pub(crate) enum Runtime {
    None,
    Identifier(IdentifierState),
    Member(MemberState),
}

/// Outcome of evaluating one node.
#[derive(Debug, Clone)]
pub(crate) enum Evaluated {
    Value(Value),
    /// Some input is not available yet.
    Pending,
}

impl Evaluated {
    fn from_slot(value: Option<Value>) -> Self {
        value.map_or(Evaluated::Pending, Evaluated::Value)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Node
// ══════════════════════════════════════════════════════════════════════════════

pub struct ExprNode {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) source: Rc<str>,
    pub(crate) children: Vec<Rc<ExprNode>>,
    parent: RefCell<Weak<ExprNode>>,
    pub(crate) value: RefCell<Option<Value>>,
    committed: RefCell<Option<Value>>,
    pub(crate) touched: Cell<bool>,
    changed: EventStream<Rc<ExprNode>>,
    disposed: Cell<bool>,
    pub(crate) binding: RefCell<Option<Binding>>,
    pub(crate) runtime: RefCell<Runtime>,
    /// Identifier transitions since the root last published (roots only).
    pub(crate) journal: RefCell<Vec<ChangeRecord>>,
    /// Transitions carried by the root's latest publication.
    pub(crate) last_batch: RefCell<Vec<ChangeRecord>>,
    pub(crate) root_hook: RefCell<Option<Subscription>>,
}

impl ExprNode {
    pub(crate) fn new(kind: NodeKind, source: impl Into<Rc<str>>, children: Vec<Rc<ExprNode>>) -> Rc<Self> {
        let node = Rc::new(Self {
            id: NodeId::fresh(),
            kind,
            source: source.into(),
            children,
            parent: RefCell::new(Weak::new()),
            value: RefCell::new(None),
            committed: RefCell::new(None),
            touched: Cell::new(false),
            changed: EventStream::new(),
            disposed: Cell::new(false),
            binding: RefCell::new(None),
            runtime: RefCell::new(Runtime::None),
            journal: RefCell::new(Vec::new()),
            last_batch: RefCell::new(Vec::new()),
            root_hook: RefCell::new(None),
        });
        for child in &node.children {
            child.set_parent(&node);
        }
        node
    }

    pub(crate) fn set_parent(&self, parent: &Rc<ExprNode>) {
        *self.parent.borrow_mut() = Rc::downgrade(parent);
    }

    pub(crate) fn parent(&self) -> Option<Rc<ExprNode>> {
        self.parent.borrow().upgrade()
    }

    pub(crate) fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Current evaluated value; `None` while unset.
    pub fn value(&self) -> Option<Value> {
        self.value.borrow().clone()
    }

    /// Value last published on the `changed` stream.
    pub fn committed_value(&self) -> Option<Value> {
        self.committed.borrow().clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub fn subscribe_changed(&self, listener: impl Fn(&Rc<ExprNode>) + 'static) -> Subscription {
        self.changed.subscribe(listener)
    }

    fn is_member_base(&self) -> bool {
        self.parent().is_some_and(|parent| {
            matches!(parent.kind, NodeKind::Member { .. })
                && parent
                    .children
                    .first()
                    .is_some_and(|base| std::ptr::eq(&**base, self))
        })
    }

    pub fn expression_type(&self) -> ExpressionType {
        match &self.kind {
            NodeKind::Literal(value) => match value {
                Value::Number(_) => ExpressionType::NumberLiteral,
                Value::String(_) => ExpressionType::StringLiteral,
                Value::Bool(_) => ExpressionType::BooleanLiteral,
                Value::Null => ExpressionType::NullLiteral,
                _ => ExpressionType::UndefinedLiteral,
            },
            NodeKind::Template { .. } => ExpressionType::Template,
            NodeKind::Array => ExpressionType::Array,
            NodeKind::Object => ExpressionType::Object,
            NodeKind::Property(_) => ExpressionType::Property,
            NodeKind::Spread => ExpressionType::Spread,
            NodeKind::Identifier { .. } => ExpressionType::Identifier,
            NodeKind::Index => ExpressionType::Index,
            NodeKind::Member { .. } => ExpressionType::Member,
            NodeKind::Call { .. } => ExpressionType::Call,
            NodeKind::New => ExpressionType::New,
            NodeKind::Unary(_, ty) | NodeKind::Binary(_, ty) => *ty,
            NodeKind::Logical(LogicalOp::And) => ExpressionType::And,
            NodeKind::Logical(LogicalOp::Or) => ExpressionType::Or,
            NodeKind::Logical(LogicalOp::Nullish) => ExpressionType::NullishCoalescing,
            NodeKind::Conditional => ExpressionType::Conditional,
            NodeKind::Sequence => ExpressionType::Sequence,
        }
    }

    // ── Evaluation ────────────────────────────────────────────────────────────

    /// Evaluate this node from its children's current values.
    ///
    /// `trigger` is the child whose change caused the evaluation, if any.
    pub(crate) fn evaluate(self: &Rc<Self>, trigger: Option<&Rc<ExprNode>>) -> EvalResult<Evaluated> {
        match &self.kind {
            NodeKind::Identifier { .. } => Ok(Evaluated::from_slot(self.value())),
            NodeKind::Member { segments } => Ok(self.evaluate_member(segments, trigger)),
            NodeKind::Conditional => {
                let Some(test) = self.child_value(0) else {
                    return Ok(Evaluated::Pending);
                };
                let branch = if ops::truthy(&test) { 1 } else { 2 };
                Ok(Evaluated::from_slot(self.child_value(branch)))
            }
            NodeKind::Logical(op) => {
                let Some(left) = self.child_value(0) else {
                    return Ok(Evaluated::Pending);
                };
                if selects_right(*op, &left) {
                    Ok(Evaluated::from_slot(self.child_value(1)))
                } else {
                    Ok(Evaluated::Value(left))
                }
            }
            kind => {
                let values: Option<Vec<Value>> = self.children.iter().map(|c| c.value()).collect();
                match values {
                    Some(values) => self.compute(kind, &values).map(Evaluated::Value),
                    None => Ok(Evaluated::Pending),
                }
            }
        }
    }

    fn child_value(&self, index: usize) -> Option<Value> {
        self.children.get(index).and_then(|child| child.value())
    }

    /// Value of a parameterized node whose children are all set.
    fn compute(&self, kind: &NodeKind, values: &[Value]) -> EvalResult<Value> {
        let value = match kind {
            NodeKind::Literal(value) => value.clone(),
            NodeKind::Template { quasis } => {
                let mut out = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(value) = values.get(i) {
                        out.push_str(&ops::to_display_string(value));
                    }
                }
                Value::string(out)
            }
            NodeKind::Array => {
                let list = Obj::list([]);
                for (child, value) in self.children.iter().zip(values) {
                    if matches!(child.kind, NodeKind::Spread) {
                        for item in spread_items(value, child)? {
                            list.push(item);
                        }
                    } else {
                        list.push(value.clone());
                    }
                }
                Value::Object(list)
            }
            NodeKind::Object => Value::Object(self.build_record(values)),
            NodeKind::Unary(op, _) => match values {
                [operand] => ops::unary(*op, operand)?,
                _ => Value::Undefined,
            },
            NodeKind::Binary(op, _) => match values {
                [left, right] => ops::binary(*op, left, right)?,
                _ => Value::Undefined,
            },
            NodeKind::Call { optional } => self.call(values, *optional)?,
            NodeKind::New => self.construct(values)?,
            NodeKind::Property(_)
            | NodeKind::Spread
            | NodeKind::Index
            | NodeKind::Sequence
            | NodeKind::Identifier { .. }
            | NodeKind::Member { .. }
            | NodeKind::Conditional
            | NodeKind::Logical(_) => values.last().cloned().unwrap_or_default(),
        };
        Ok(value)
    }

    fn build_record(&self, values: &[Value]) -> Obj {
        let record = Obj::record();
        for (child, value) in self.children.iter().zip(values) {
            match &child.kind {
                NodeKind::Property(PropertyKey::Static(name)) => {
                    record.set(&Key::name(name), value.clone());
                }
                NodeKind::Property(PropertyKey::Computed) => {
                    let key = Key::from_value(&child.child_value(0).unwrap_or_default());
                    record.set(&key, value.clone());
                }
                NodeKind::Spread => match value {
                    Value::Object(source) => {
                        for (key, item) in source.entries() {
                            record.set(&key, item);
                        }
                    }
                    Value::String(s) => {
                        for (i, ch) in s.chars().enumerate() {
                            record.set(&Key::Index(i), Value::string(ch.to_string()));
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }
        record
    }

    fn arguments(&self, values: &[Value]) -> EvalResult<Vec<Value>> {
        let mut args = Vec::with_capacity(values.len().saturating_sub(1));
        for (child, value) in self.children.iter().zip(values).skip(1) {
            if matches!(child.kind, NodeKind::Spread) {
                args.extend(spread_items(value, child)?);
            } else {
                args.push(value.clone());
            }
        }
        Ok(args)
    }

    fn call(&self, values: &[Value], optional: bool) -> EvalResult<Value> {
        let (Some(callee_node), Some(callee)) = (self.children.first(), values.first()) else {
            return Ok(Value::Undefined);
        };
        if optional && callee.is_nullish() {
            return Ok(Value::Undefined);
        }
        let Value::Function(function) = callee else {
            return Err(EvalError::NotCallable(callee_node.source.to_string()));
        };
        let this = callee_node.receiver();
        function.call(&this, &self.arguments(values)?)
    }

    fn construct(&self, values: &[Value]) -> EvalResult<Value> {
        let (Some(callee_node), Some(callee)) = (self.children.first(), values.first()) else {
            return Ok(Value::Undefined);
        };
        match callee {
            Value::Function(function) => function.construct(&self.arguments(values)?),
            _ => Err(EvalError::NotConstructible(callee_node.source.to_string())),
        }
    }

    /// Whether a change in `child` can affect this node's value right now.
    pub(crate) fn is_commit_relevant(&self, child: &ExprNode) -> bool {
        let is_child = |index: usize| {
            self.children
                .get(index)
                .is_some_and(|c| std::ptr::eq(&**c, child))
        };
        match &self.kind {
            NodeKind::Conditional => {
                if is_child(0) {
                    return true;
                }
                match self.child_value(0) {
                    Some(test) => is_child(if ops::truthy(&test) { 1 } else { 2 }),
                    None => false,
                }
            }
            NodeKind::Logical(op) => {
                is_child(0) || self.child_value(0).is_some_and(|left| selects_right(*op, &left))
            }
            _ => true,
        }
    }

    /// Re-evaluate ancestors after this node's value changed.
    ///
    /// Returns `true` when the walk reached the root. With `forced`, an
    /// ancestor that evaluates to the same container still counts as
    /// changed, so nested mutations reach subscribers.
    pub(crate) fn propagate(self: &Rc<Self>, forced: bool) -> EngineResult<bool> {
        let mut child = Rc::clone(self);
        loop {
            let Some(parent) = child.parent() else {
                return Ok(!child.is_disposed());
            };
            if parent.is_disposed() || !parent.is_commit_relevant(&child) {
                return Ok(false);
            }
            let Evaluated::Value(value) = parent.evaluate(Some(&child))? else {
                return Ok(false);
            };
            let changed = parent
                .value
                .borrow()
                .as_ref()
                .map_or(true, |old| !old.same_value(&value));
            if !changed {
                if !(forced && matches!(value, Value::Object(_))) {
                    return Ok(false);
                }
                parent.touched.set(true);
            }
            *parent.value.borrow_mut() = Some(value);
            child = parent;
        }
    }

    /// Evaluate the whole tree bottom-up. Identifiers keep the value they
    /// resolved at bind time.
    pub(crate) fn evaluate_tree(self: &Rc<Self>) -> EngineResult<()> {
        for child in &self.children {
            child.evaluate_tree()?;
        }
        if matches!(self.kind, NodeKind::Identifier { .. }) {
            return Ok(());
        }
        if let Evaluated::Value(value) = self.evaluate(None)? {
            *self.value.borrow_mut() = Some(value);
        }
        Ok(())
    }

    /// Emit `changed` on every node whose value differs from its last
    /// published value, children first.
    pub(crate) fn publish(self: &Rc<Self>) {
        for child in &self.children {
            child.publish();
        }
        for hop in self.hops() {
            hop.publish();
        }
        let Some(value) = self.value() else {
            return;
        };
        let touched = self.touched.replace(false);
        let differs = self
            .committed
            .borrow()
            .as_ref()
            .map_or(true, |committed| !committed.same_value(&value));
        if !(touched || differs) {
            return;
        }
        if self.is_root() {
            let batch = std::mem::take(&mut *self.journal.borrow_mut());
            *self.last_batch.borrow_mut() = batch;
        }
        *self.committed.borrow_mut() = Some(value);
        self.changed.emit(self);
    }

    /// Record an identifier transition on this node's root.
    pub(crate) fn journal_change(&self, record: ChangeRecord) {
        let root = self.binding.borrow().as_ref().and_then(|b| b.root.upgrade());
        if let Some(root) = root {
            root.journal.borrow_mut().push(record);
        }
    }

    // ── Structure ─────────────────────────────────────────────────────────────

    /// Structurally identical copy with fresh ids and no binding.
    pub(crate) fn clone_unbound(&self) -> Rc<ExprNode> {
        let children = self.children.iter().map(|c| c.clone_unbound()).collect();
        ExprNode::new(self.kind.clone(), Rc::clone(&self.source), children)
    }

    /// Attach this unbound tree to `binding`. Identifiers start watching
    /// their slots immediately.
    pub(crate) fn bind(self: &Rc<Self>, binding: &Binding) {
        *self.binding.borrow_mut() = Some(binding.clone());
        for child in &self.children {
            child.bind(binding);
        }
        match &self.kind {
            NodeKind::Identifier { name } => {
                let state = IdentifierState::new(
                    binding.context.clone(),
                    Key::name(name),
                    !self.is_member_base(),
                );
                *self.runtime.borrow_mut() = Runtime::Identifier(state);
                self.resolve_identifier();
            }
            NodeKind::Member { .. } => {
                *self.runtime.borrow_mut() = Runtime::Member(MemberState::default());
            }
            _ => {}
        }
    }

    /// Tear down the subtree: drop watches and subscriptions, forget any
    /// queued commits. Idempotent.
    pub(crate) fn dispose(self: &Rc<Self>) {
        if self.disposed.replace(true) {
            return;
        }
        for child in &self.children {
            child.dispose();
        }
        let runtime = std::mem::replace(&mut *self.runtime.borrow_mut(), Runtime::None);
        if let Runtime::Member(member) = &runtime {
            for hop in &member.hops {
                hop.dispose();
            }
        }
        drop(runtime);

        let binding = self.binding.borrow_mut().take();
        if let Some(binding) = binding {
            if self.is_root() {
                binding.services.coordinator.forget(self.id);
            }
        }
        let hook = self.root_hook.borrow_mut().take();
        drop(hook);
        self.journal.borrow_mut().clear();
        self.last_batch.borrow_mut().clear();
    }
}

impl fmt::Debug for ExprNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExprNode")
            .field("id", &self.id)
            .field("type", &self.expression_type())
            .field("source", &self.source)
            .field("value", &self.value.borrow())
            .finish()
    }
}

fn selects_right(op: LogicalOp, left: &Value) -> bool {
    match op {
        LogicalOp::And => ops::truthy(left),
        LogicalOp::Or => !ops::truthy(left),
        LogicalOp::Nullish => left.is_nullish(),
    }
}

fn spread_items(value: &Value, node: &ExprNode) -> EvalResult<Vec<Value>> {
    match value {
        Value::Object(obj) if obj.is_list() => Ok(obj.values()),
        Value::String(s) => Ok(s.chars().map(|ch| Value::string(ch.to_string())).collect()),
        _ => Err(EvalError::Type(format!("{} is not iterable", node.source))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(value: impl Into<Value>, source: &str) -> Rc<ExprNode> {
        ExprNode::new(NodeKind::Literal(value.into()), source, vec![])
    }

    fn evaluated(node: &Rc<ExprNode>) -> Option<Value> {
        node.evaluate_tree().unwrap();
        node.value()
    }

    #[test]
    fn test_children_point_back_to_parent() {
        let a = literal(1, "1");
        let b = literal(2, "2");
        let sum = ExprNode::new(NodeKind::binary(BinaryOp::Add).unwrap(), "1 + 2", vec![a.clone(), b]);
        assert!(Rc::ptr_eq(&a.parent().unwrap(), &sum));
        assert!(sum.is_root());
        assert_eq!(sum.expression_type(), ExpressionType::Add);
    }

    #[test]
    fn test_parameterized_node_is_pending_until_children_set() {
        let unset = ExprNode::new(NodeKind::Index, "x", vec![]);
        let sum = ExprNode::new(
            NodeKind::binary(BinaryOp::Add).unwrap(),
            "x + 1",
            vec![unset, literal(1, "1")],
        );
        assert!(matches!(sum.evaluate(None).unwrap(), Evaluated::Pending));
    }

    #[test]
    fn test_conditional_only_needs_taken_branch() {
        let unset = ExprNode::new(NodeKind::Index, "x", vec![]);
        let cond = ExprNode::new(
            NodeKind::Conditional,
            "true ? 1 : x",
            vec![literal(true, "true"), literal(1, "1"), unset.clone()],
        );
        assert_eq!(evaluated(&cond), Some(Value::from(1)));
        assert!(cond.is_commit_relevant(&cond.children[1]));
        assert!(!cond.is_commit_relevant(&unset));
    }

    #[test]
    fn test_nullish_coalescing_selects_right_on_nullish() {
        let node = ExprNode::new(
            NodeKind::Logical(LogicalOp::Nullish),
            "null ?? 2",
            vec![literal(Value::Null, "null"), literal(2, "2")],
        );
        assert_eq!(evaluated(&node), Some(Value::from(2)));
        assert_eq!(node.expression_type(), ExpressionType::NullishCoalescing);
    }

    #[test]
    fn test_template_interleaves_quasis() {
        let node = ExprNode::new(
            NodeKind::Template {
                quasis: vec!["a".into(), "c".into()],
            },
            "`a${1}c`",
            vec![literal(1, "1")],
        );
        assert_eq!(evaluated(&node), Some(Value::from("a1c")));
    }

    #[test]
    fn test_array_spread_of_non_iterable_is_type_error() {
        let spread = ExprNode::new(NodeKind::Spread, "...1", vec![literal(1, "1")]);
        let array = ExprNode::new(NodeKind::Array, "[...1]", vec![spread]);
        assert!(matches!(array.evaluate_tree(), Err(crate::error::EngineError::Eval(EvalError::Type(_)))));
    }

    #[test]
    fn test_calling_non_function_names_callee() {
        let call = ExprNode::new(
            NodeKind::Call { optional: false },
            "f()",
            vec![literal(1, "f")],
        );
        let err = call.evaluate_tree().unwrap_err();
        assert!(matches!(
            err,
            crate::error::EngineError::Eval(EvalError::NotCallable(name)) if name == "f"
        ));
    }

    #[test]
    fn test_propagate_stops_when_value_unchanged() {
        let leaf = ExprNode::new(NodeKind::Index, "x", vec![]);
        let not = ExprNode::new(NodeKind::unary(UnaryOp::Not).unwrap(), "!x", vec![leaf.clone()]);
        let root = ExprNode::new(NodeKind::unary(UnaryOp::Not).unwrap(), "!!x", vec![not.clone()]);
        *leaf.value.borrow_mut() = Some(Value::from(1));
        assert!(leaf.propagate(false).unwrap());
        assert_eq!(root.value(), Some(Value::Bool(true)));
        *leaf.value.borrow_mut() = Some(Value::from(2));
        // `!2` is still false, so the walk stops below the root.
        assert!(!leaf.propagate(false).unwrap());
    }

    #[test]
    fn test_publish_emits_only_on_difference() {
        let root = literal(1, "1");
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = root.subscribe_changed(move |_| h.set(h.get() + 1));
        root.evaluate_tree().unwrap();
        root.publish();
        root.publish();
        assert_eq!(hits.get(), 1);
        assert_eq!(root.committed_value(), Some(Value::from(1)));
    }

    #[test]
    fn test_clone_unbound_gets_fresh_ids() {
        let root = ExprNode::new(NodeKind::Sequence, "1, 2", vec![literal(1, "1"), literal(2, "2")]);
        let copy = root.clone_unbound();
        assert_ne!(root.id(), copy.id());
        assert_eq!(copy.children.len(), 2);
        assert_eq!(evaluated(&copy), Some(Value::from(2)));
        assert_eq!(root.value(), None);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let root = ExprNode::new(NodeKind::Sequence, "1", vec![literal(1, "1")]);
        root.dispose();
        root.dispose();
        assert!(root.is_disposed());
        assert!(root.children[0].is_disposed());
    }

    #[test]
    fn test_operator_kinds_carry_their_own_type() {
        assert!(NodeKind::unary(UnaryOp::Void).is_none());
        assert!(NodeKind::unary(UnaryOp::Delete).is_none());
        assert!(NodeKind::binary(BinaryOp::InstanceOf).is_none());

        let typeof_node = ExprNode::new(
            NodeKind::unary(UnaryOp::Typeof).unwrap(),
            "typeof 1",
            vec![literal(1, "1")],
        );
        assert_eq!(typeof_node.expression_type(), ExpressionType::Typeof);
        let in_node = ExprNode::new(
            NodeKind::binary(BinaryOp::In).unwrap(),
            "'a' in b",
            vec![literal("a", "'a'"), literal(1, "b")],
        );
        assert_eq!(in_node.expression_type(), ExpressionType::In);
    }
}
