//! Runtime values of the data graph.
//!
//! [`Value`] is a closed tagged variant. Containers ([`Obj`]) and async
//! sources are shared by reference and compared by identity; scalars are
//! compared by value. The resolver only ever inspects a value through
//! [`Value::shape`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::async_value::{AsyncSingle, AsyncStream};
use crate::error::{EvalError, EvalResult};
use crate::node::ExprNode;

// ══════════════════════════════════════════════════════════════════════════════
// Value
// ══════════════════════════════════════════════════════════════════════════════

/// Largest length a list may grow to through a slot write.
pub const MAX_LIST_LEN: usize = 1 << 24;

fn check_list_len(requested: usize) -> EvalResult<()> {
    if requested > MAX_LIST_LEN {
        Err(EvalError::ListTooLong {
            requested: requested as f64,
            max: MAX_LIST_LEN,
        })
    } else {
        Ok(())
    }
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(Obj),
    Future(AsyncSingle),
    Stream(AsyncStream),
    Function(NativeFunction),
    /// A bound expression used as data. Readers see its committed value.
    Expression(ExpressionRef),
}

/// What the resolver needs to know about a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Scalar,
    Record,
    List,
    Map,
    AsyncSingle,
    AsyncStream,
    Opaque,
}

impl Value {
    pub fn shape(&self) -> Shape {
        match self {
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                Shape::Scalar
            }
            Value::Object(obj) => match obj.kind() {
                ObjKind::Record => Shape::Record,
                ObjKind::List => Shape::List,
                ObjKind::Map => Shape::Map,
            },
            Value::Future(_) => Shape::AsyncSingle,
            Value::Stream(_) => Shape::AsyncStream,
            Value::Function(_) | Value::Expression(_) => Shape::Opaque,
        }
    }

    /// Change-detection equality: scalars by value (`NaN` equals itself),
    /// everything else by identity.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Future(a), Value::Future(b)) => a.ptr_eq(b),
            (Value::Stream(a), Value::Stream(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Expression(a), Value::Expression(b)) => Rc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Obj> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(obj) => match obj.kind() {
                ObjKind::Record => "record",
                ObjKind::List => "list",
                ObjKind::Map => "map",
            },
            Value::Future(_) => "future",
            Value::Stream(_) => "stream",
            Value::Function(_) => "function",
            Value::Expression(_) => "expression",
        }
    }

    // ── Construction ──────────────────────────────────────────────────────────

    pub fn string(s: impl Into<Rc<str>>) -> Value {
        Value::String(s.into())
    }

    /// A new record holding `fields` in order.
    pub fn record<K: AsRef<str>>(fields: impl IntoIterator<Item = (K, Value)>) -> Value {
        let obj = Obj::new(ObjKind::Record);
        for (key, value) in fields {
            obj.set(&Key::name(key.as_ref()), value);
        }
        Value::Object(obj)
    }

    /// A new map holding `entries` in order.
    pub fn map<K: AsRef<str>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        let obj = Obj::new(ObjKind::Map);
        for (key, value) in entries {
            obj.set(&Key::name(key.as_ref()), value);
        }
        Value::Object(obj)
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Object(Obj::list(items))
    }

    /// Convert JSON into fresh containers. Objects become records.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::string(s.as_str()),
            serde_json::Value::Array(items) => Value::list(items.iter().map(Value::from_json)),
            serde_json::Value::Object(fields) => {
                Value::record(fields.iter().map(|(k, v)| (k.as_str(), Value::from_json(v))))
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.same_value(other)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Obj> for Value {
    fn from(obj: Obj) -> Self {
        Value::Object(obj)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", crate::ops::number_to_string(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(obj) => write!(f, "{obj:?}"),
            Value::Future(fut) => write!(f, "{fut:?}"),
            Value::Stream(stream) => write!(f, "{stream:?}"),
            Value::Function(func) => write!(f, "{func:?}"),
            Value::Expression(expr) => write!(f, "{expr:?}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::ops::to_display_string(self))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Keys
// ══════════════════════════════════════════════════════════════════════════════

/// A slot name inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Name(Rc<str>),
    Index(usize),
}

impl Key {
    /// Key for a property name. Canonical integer names become indices, so
    /// `Key::name("0")` and `Key::Index(0)` address the same slot.
    pub fn name(name: &str) -> Key {
        Key::parse(name)
    }

    /// The virtual `length` key of lists.
    pub fn length() -> Key {
        Key::name("length")
    }

    pub fn is_length(&self) -> bool {
        matches!(self, Key::Name(name) if &**name == "length")
    }

    /// Normalize a computed key: canonical non-negative integers become
    /// indices, everything else is converted to its string form.
    pub fn from_value(value: &Value) -> Key {
        match value {
            Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n < 9_007_199_254_740_992.0 => {
                Key::Index(*n as usize)
            }
            Value::String(s) => Key::parse(s),
            other => Key::parse(&crate::ops::to_display_string(other)),
        }
    }

    fn parse(s: &str) -> Key {
        let canonical = !s.is_empty() && (s == "0" || !s.starts_with('0'));
        match s.parse::<usize>() {
            Ok(i) if canonical && s.bytes().all(|b| b.is_ascii_digit()) => Key::Index(i),
            _ => Key::Name(s.into()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::parse(s)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Containers
// ══════════════════════════════════════════════════════════════════════════════

static NEXT_OBJ_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a container, used as a cache and watch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(u64);

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjKind {
    Record,
    List,
    Map,
}

enum ObjData {
    /// Insertion-ordered named fields.
    Fields(Vec<(Rc<str>, Value)>),
    Items(Vec<Value>),
}

struct ObjInner {
    id: ObjId,
    kind: ObjKind,
    data: RefCell<ObjData>,
}

/// A shared, interior-mutable container.
///
/// Writes through `Obj` are raw: they notify nobody. Observable writes go
/// through [`StateManager::set_value`](crate::StateManager::set_value).
#[derive(Clone)]
pub struct Obj(Rc<ObjInner>);

impl Obj {
    pub fn new(kind: ObjKind) -> Obj {
        let data = match kind {
            ObjKind::List => ObjData::Items(Vec::new()),
            ObjKind::Record | ObjKind::Map => ObjData::Fields(Vec::new()),
        };
        Obj(Rc::new(ObjInner {
            id: ObjId(NEXT_OBJ_ID.fetch_add(1, Ordering::Relaxed)),
            kind,
            data: RefCell::new(data),
        }))
    }

    pub fn record() -> Obj {
        Obj::new(ObjKind::Record)
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Obj {
        let obj = Obj::new(ObjKind::List);
        if let ObjData::Items(vec) = &mut *obj.0.data.borrow_mut() {
            vec.extend(items);
        }
        obj
    }

    pub fn id(&self) -> ObjId {
        self.0.id
    }

    pub fn kind(&self) -> ObjKind {
        self.0.kind
    }

    pub fn is_list(&self) -> bool {
        self.0.kind == ObjKind::List
    }

    pub fn ptr_eq(&self, other: &Obj) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of items (lists) or fields (records, maps).
    pub fn len(&self) -> usize {
        match &*self.0.data.borrow() {
            ObjData::Fields(fields) => fields.len(),
            ObjData::Items(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a slot. Missing slots read as `undefined`.
    pub fn get(&self, key: &Key) -> Value {
        match (&*self.0.data.borrow(), key) {
            (ObjData::Fields(fields), Key::Name(name)) => field(fields, name),
            (ObjData::Fields(fields), Key::Index(i)) => field(fields, &i.to_string()),
            (ObjData::Items(items), Key::Index(i)) => items.get(*i).cloned().unwrap_or_default(),
            (ObjData::Items(items), Key::Name(name)) if &**name == "length" => {
                Value::Number(items.len() as f64)
            }
            (ObjData::Items(_), Key::Name(_)) => Value::Undefined,
        }
    }

    /// Write a slot and return the previous value.
    ///
    /// Writing past the end of a list pads it with `undefined`; writing a
    /// list's `length` truncates or pads. A write that would grow a list past
    /// [`MAX_LIST_LEN`] leaves it untouched and returns its current value;
    /// use [`Obj::try_set`] to see the rejection.
    pub fn set(&self, key: &Key, value: Value) -> Value {
        self.try_set(key, value).unwrap_or_else(|_| self.get(key))
    }

    /// Like [`Obj::set`], but a list write past [`MAX_LIST_LEN`] is an error.
    pub fn try_set(&self, key: &Key, value: Value) -> EvalResult<Value> {
        let mut data = self.0.data.borrow_mut();
        let old = match (&mut *data, key) {
            (ObjData::Fields(fields), Key::Name(name)) => set_field(fields, name, value),
            (ObjData::Fields(fields), Key::Index(i)) => set_field(fields, &i.to_string(), value),
            (ObjData::Items(items), Key::Index(i)) => {
                if *i >= items.len() {
                    let requested = i.saturating_add(1);
                    check_list_len(requested)?;
                    items.resize(requested, Value::Undefined);
                }
                std::mem::replace(&mut items[*i], value)
            }
            (ObjData::Items(items), Key::Name(name)) if &**name == "length" => {
                let old = items.len();
                let new = crate::ops::to_number(&value);
                if new >= 0.0 && new.fract() == 0.0 {
                    if new > MAX_LIST_LEN as f64 {
                        return Err(EvalError::ListTooLong {
                            requested: new,
                            max: MAX_LIST_LEN,
                        });
                    }
                    items.resize(new as usize, Value::Undefined);
                }
                Value::Number(old as f64)
            }
            (ObjData::Items(_), Key::Name(_)) => Value::Undefined,
        };
        Ok(old)
    }

    pub fn push(&self, value: Value) {
        if let ObjData::Items(items) = &mut *self.0.data.borrow_mut() {
            items.push(value);
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        match (&*self.0.data.borrow(), key) {
            (ObjData::Fields(fields), Key::Name(name)) => fields.iter().any(|(k, _)| k == name),
            (ObjData::Fields(fields), Key::Index(i)) => {
                let name = i.to_string();
                fields.iter().any(|(k, _)| **k == *name)
            }
            (ObjData::Items(items), Key::Index(i)) => *i < items.len(),
            (ObjData::Items(_), Key::Name(name)) => &**name == "length",
        }
    }

    /// Own keys in order. The virtual `length` of a list is not included.
    pub fn keys(&self) -> Vec<Key> {
        match &*self.0.data.borrow() {
            ObjData::Fields(fields) => fields.iter().map(|(k, _)| Key::parse(k)).collect(),
            ObjData::Items(items) => (0..items.len()).map(Key::Index).collect(),
        }
    }

    pub fn entries(&self) -> Vec<(Key, Value)> {
        match &*self.0.data.borrow() {
            ObjData::Fields(fields) => fields
                .iter()
                .map(|(k, v)| (Key::parse(k), v.clone()))
                .collect(),
            ObjData::Items(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (Key::Index(i), v.clone()))
                .collect(),
        }
    }

    /// List items, or field values in order.
    pub fn values(&self) -> Vec<Value> {
        match &*self.0.data.borrow() {
            ObjData::Fields(fields) => fields.iter().map(|(_, v)| v.clone()).collect(),
            ObjData::Items(items) => items.clone(),
        }
    }
}

fn field(fields: &[(Rc<str>, Value)], name: &str) -> Value {
    fields
        .iter()
        .find(|(k, _)| &**k == name)
        .map(|(_, v)| v.clone())
        .unwrap_or_default()
}

fn set_field(fields: &mut Vec<(Rc<str>, Value)>, name: &str, value: Value) -> Value {
    match fields.iter_mut().find(|(k, _)| &**k == name) {
        Some((_, slot)) => std::mem::replace(slot, value),
        None => {
            fields.push((name.into(), value));
            Value::Undefined
        }
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind() {
            ObjKind::Record => "Record",
            ObjKind::List => "List",
            ObjKind::Map => "Map",
        };
        write!(f, "{kind}#{}(len {})", self.0.id.0, self.len())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Functions
// ══════════════════════════════════════════════════════════════════════════════

type NativeFn = dyn Fn(&Value, &[Value]) -> EvalResult<Value>;

struct NativeInner {
    name: String,
    call: Box<NativeFn>,
    constructible: bool,
}

/// A host function callable from expressions.
///
/// The callback receives the receiver (`this`) and the evaluated arguments.
#[derive(Clone)]
pub struct NativeFunction(Rc<NativeInner>);

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        call: impl Fn(&Value, &[Value]) -> EvalResult<Value> + 'static,
    ) -> Self {
        Self(Rc::new(NativeInner {
            name: name.into(),
            call: Box::new(call),
            constructible: false,
        }))
    }

    /// A function that may also be invoked with `new`.
    pub fn constructor(
        name: impl Into<String>,
        call: impl Fn(&Value, &[Value]) -> EvalResult<Value> + 'static,
    ) -> Self {
        Self(Rc::new(NativeInner {
            name: name.into(),
            call: Box::new(call),
            constructible: true,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn is_constructible(&self) -> bool {
        self.0.constructible
    }

    pub fn call(&self, this: &Value, args: &[Value]) -> EvalResult<Value> {
        (self.0.call)(this, args)
    }

    pub fn construct(&self, args: &[Value]) -> EvalResult<Value> {
        if !self.0.constructible {
            return Err(EvalError::NotConstructible(self.0.name.clone()));
        }
        (self.0.call)(&Value::Undefined, args)
    }

    pub fn ptr_eq(&self, other: &NativeFunction) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl From<NativeFunction> for Value {
    fn from(func: NativeFunction) -> Self {
        Value::Function(func)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function {}()", self.0.name)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Nested expressions
// ══════════════════════════════════════════════════════════════════════════════

/// A non-owning view of a bound expression stored inside the data graph.
///
/// Holding an `ExpressionRef` does not keep the expression's cache entry
/// alive; once every handle is disposed the view reads its last committed
/// value and never changes again.
#[derive(Clone)]
pub struct ExpressionRef(pub(crate) Rc<ExprNode>);

impl ExpressionRef {
    /// The nested expression's last committed value.
    pub fn value(&self) -> Option<Value> {
        self.0.committed_value()
    }

    pub fn source(&self) -> &str {
        self.0.source()
    }
}

impl fmt::Debug for ExpressionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expression `{}`", self.0.source())
    }
}
