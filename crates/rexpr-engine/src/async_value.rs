//! Asynchronous value sources embedded in the data graph.
//!
//! An [`AsyncSingle`] settles at most once; an [`AsyncStream`] holds a
//! current value that `next` replaces. Identifiers unwrap both to their
//! current payload and re-evaluate when a new payload arrives.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::event::{EventStream, Subscription};
use crate::value::Value;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

struct SourceInner {
    id: u64,
    current: RefCell<Option<Value>>,
    updates: EventStream<Value>,
}

impl SourceInner {
    fn new(current: Option<Value>) -> Rc<Self> {
        Rc::new(Self {
            id: NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
            current: RefCell::new(current),
            updates: EventStream::new(),
        })
    }

    fn publish(&self, value: Value) {
        *self.current.borrow_mut() = Some(value.clone());
        self.updates.emit(&value);
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// AsyncSingle
// ══════════════════════════════════════════════════════════════════════════════

/// A single-shot future.
#[derive(Clone)]
pub struct AsyncSingle {
    inner: Rc<SourceInner>,
    settled: Rc<Cell<bool>>,
}

impl AsyncSingle {
    /// An unresolved future.
    pub fn pending() -> Self {
        Self {
            inner: SourceInner::new(None),
            settled: Rc::new(Cell::new(false)),
        }
    }

    /// A future that already holds `value`.
    pub fn resolved(value: Value) -> Self {
        Self {
            inner: SourceInner::new(Some(value)),
            settled: Rc::new(Cell::new(true)),
        }
    }

    /// Settle with `value`. Returns `false` if the future had already settled.
    pub fn resolve(&self, value: Value) -> bool {
        if self.settled.replace(true) {
            return false;
        }
        self.inner.publish(value);
        true
    }

    pub fn is_settled(&self) -> bool {
        self.settled.get()
    }

    pub fn current(&self) -> Option<Value> {
        self.inner.current.borrow().clone()
    }

    pub fn subscribe(&self, listener: impl Fn(&Value) + 'static) -> Subscription {
        self.inner.updates.subscribe(listener)
    }

    pub fn ptr_eq(&self, other: &AsyncSingle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for AsyncSingle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.current() {
            Some(value) => write!(f, "Future#{}({value:?})", self.inner.id),
            None => write!(f, "Future#{}(<pending>)", self.inner.id),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// AsyncStream
// ══════════════════════════════════════════════════════════════════════════════

/// A multi-value stream with a current value.
#[derive(Clone)]
pub struct AsyncStream {
    inner: Rc<SourceInner>,
}

impl Default for AsyncStream {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncStream {
    /// A stream that has not produced a value yet.
    pub fn new() -> Self {
        Self {
            inner: SourceInner::new(None),
        }
    }

    pub fn with_value(value: Value) -> Self {
        Self {
            inner: SourceInner::new(Some(value)),
        }
    }

    /// Replace the current value and notify subscribers.
    pub fn next(&self, value: Value) {
        self.inner.publish(value);
    }

    pub fn current(&self) -> Option<Value> {
        self.inner.current.borrow().clone()
    }

    pub fn subscribe(&self, listener: impl Fn(&Value) + 'static) -> Subscription {
        self.inner.updates.subscribe(listener)
    }

    pub fn ptr_eq(&self, other: &AsyncStream) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for AsyncStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.current() {
            Some(value) => write!(f, "Stream#{}({value:?})", self.inner.id),
            None => write!(f, "Stream#{}(<empty>)", self.inner.id),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Unwrapping
// ══════════════════════════════════════════════════════════════════════════════

/// Follow async sources and nested expressions down to a plain payload.
///
/// Every source passed on the way is subscribed with `on_update`; the
/// subscriptions are returned so the caller controls their lifetime.
/// `None` means some source on the chain has no value yet.
pub(crate) fn unwrap_value(
    value: &Value,
    on_update: &Rc<dyn Fn()>,
    subscriptions: &mut Vec<Subscription>,
) -> Option<Value> {
    let mut current = value.clone();
    // Bounded so a source that resolves to itself cannot spin.
    for _ in 0..64 {
        let notify = Rc::clone(on_update);
        let next = match &current {
            Value::Future(future) => {
                subscriptions.push(future.subscribe(move |_| notify()));
                future.current()
            }
            Value::Stream(stream) => {
                subscriptions.push(stream.subscribe(move |_| notify()));
                stream.current()
            }
            Value::Expression(expr) => {
                subscriptions.push(expr.0.subscribe_changed(move |_| notify()));
                expr.value()
            }
            _ => return Some(current),
        };
        current = next?;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Rc<dyn Fn()> {
        Rc::new(|| {})
    }

    #[test]
    fn test_future_resolves_once() {
        let future = AsyncSingle::pending();
        assert_eq!(future.current(), None);
        assert!(future.resolve(Value::from(1)));
        assert!(!future.resolve(Value::from(2)));
        assert_eq!(future.current(), Some(Value::from(1)));
    }

    #[test]
    fn test_stream_next_replaces_and_notifies() {
        let stream = AsyncStream::with_value(Value::from(1));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = stream.subscribe(move |v| s.borrow_mut().push(v.clone()));
        stream.next(Value::from(2));
        assert_eq!(stream.current(), Some(Value::from(2)));
        assert_eq!(*seen.borrow(), vec![Value::from(2)]);
    }

    #[test]
    fn test_unwrap_follows_chains() {
        let inner = AsyncStream::with_value(Value::from("payload"));
        let outer = AsyncSingle::resolved(Value::Stream(inner));
        let mut subs = Vec::new();
        let value = unwrap_value(&Value::Future(outer), &noop(), &mut subs);
        assert_eq!(value, Some(Value::from("payload")));
        assert_eq!(subs.len(), 2);
    }

    #[test]
    fn test_unwrap_pending_source() {
        let mut subs = Vec::new();
        let value = unwrap_value(&Value::Future(AsyncSingle::pending()), &noop(), &mut subs);
        assert_eq!(value, None);
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn test_unwrap_plain_value_subscribes_nothing() {
        let mut subs = Vec::new();
        assert_eq!(unwrap_value(&Value::from(3), &noop(), &mut subs), Some(Value::from(3)));
        assert!(subs.is_empty());
    }

    #[test]
    fn test_unwrap_notifies_on_update() {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let on_update: Rc<dyn Fn()> = Rc::new(move || h.set(h.get() + 1));
        let stream = AsyncStream::with_value(Value::from(1));
        let mut subs = Vec::new();
        unwrap_value(&Value::Stream(stream.clone()), &on_update, &mut subs);
        stream.next(Value::from(2));
        assert_eq!(hits.get(), 1);
        drop(subs);
        stream.next(Value::from(3));
        assert_eq!(hits.get(), 1);
    }
}
