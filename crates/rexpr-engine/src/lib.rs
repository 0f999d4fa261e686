//! rexpr engine: reactive evaluation of expressions bound to live data.
//!
//! An expression such as `a.b[i] + total` is parsed once, cloned and bound
//! to a context object. The bound tree watches exactly the slots it reads,
//! re-evaluates when one of them changes and publishes at most one new
//! value per logical change, however many slots that change touched.
//!
//! ```
//! use rexpr_engine::{Engine, Obj, Value};
//!
//! let engine = Engine::new();
//! let ctx = Obj::record();
//! engine.set_value(&ctx, "a", 2);
//! let expr = engine.create_expression(&ctx, "a * 10").unwrap();
//! assert_eq!(expr.value(), Some(Value::from(20)));
//!
//! engine.set_value(&ctx, "a", 3);
//! assert_eq!(expr.value(), Some(Value::from(30)));
//! ```

mod accessor;
mod async_value;
mod build;
mod cache;
mod engine;
mod error;
mod event;
mod expression;
mod identifier;
mod member;
mod node;
mod options;
mod playback;
mod scheduler;
mod state;
mod tracker;
mod transaction;
mod value;

pub mod ops;

pub use accessor::Accessor;
pub use async_value::{AsyncSingle, AsyncStream};
pub use cache::Lease;
pub use engine::Engine;
pub use error::{
    BuildError, EngineError, EngineResult, EvalError, EvalResult, LifecycleError, PlaybackError,
};
pub use event::{EventStream, Subscription};
pub use expression::{BoundExpression, ExpressionHandle, UnboundExpression};
pub use node::{ExpressionType, NodeId, ShouldWatch};
pub use options::EngineOptions;
pub use playback::PlaybackTarget;
pub use scheduler::Scheduler;
pub use state::{Change, CycleEvent, DeepWatch, SlotWatch, StateManager, WatchOptions};
pub use tracker::{ChangeBatch, ChangeRecord, ChangeTracker, History, IdentifierRef};
pub use transaction::TransactionCoordinator;
pub use value::{ExpressionRef, Key, NativeFunction, Obj, ObjId, ObjKind, Shape, Value, MAX_LIST_LEN};
