//! Engine error types.

use rexpr_types::ExpressionError;
use thiserror::Error;

use crate::node::NodeId;

/// Errors raised while evaluating a node.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// The callee of a call expression is not a function.
    #[error("{0} is not a function")]
    NotCallable(String),

    /// The callee of a `new` expression cannot construct.
    #[error("{0} is not a constructor")]
    NotConstructible(String),

    /// An operator was applied to a value it does not support.
    #[error("type error: {0}")]
    Type(String),

    /// A write would grow a list past the supported length.
    #[error("list length {requested} exceeds the limit of {max}")]
    ListTooLong { requested: f64, max: usize },

    /// A native function reported a failure.
    #[error("{name}: {message}")]
    Native { name: String, message: String },
}

/// Evaluation result type alias.
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors raised while turning source text into an unbound tree.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    #[error("parse error: {0}")]
    Parse(#[from] ExpressionError),

    /// Valid syntax the engine refuses to evaluate (assignment, `delete`, ...).
    #[error("unsupported {construct} in `{expression}`")]
    Unsupported {
        construct: &'static str,
        expression: String,
    },
}

/// Misuse of a handle after it was released, or tracking it twice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("{0} has been disposed")]
    Disposed(&'static str),

    #[error("expression {0} is already tracked by this handle")]
    AlreadyTracked(NodeId),
}

/// Errors raised while replaying recorded history.
#[derive(Debug, Clone, Error)]
pub enum PlaybackError {
    #[error("index {index} is out of range for a history of {len} batches")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("no recorded batch matches timestamp {0}")]
    TimestampOutOfRange(u64),

    #[error("data graph did not settle within {steps} steps after playback")]
    SettleTimeout { steps: usize },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Umbrella error for the public engine API.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// `set_value` on an expression with no writable slot.
    #[error("`{0}` is not assignable")]
    NotAssignable(String),

    /// A root kept registering new commit handlers past the pass limit.
    #[error("root {root} did not converge after {passes} passes")]
    NoConvergence { root: NodeId, passes: usize },

    /// The scheduler queue did not drain within the step limit.
    #[error("scheduler stalled after {steps} steps")]
    Stalled { steps: usize },
}

/// Engine result type alias.
pub type EngineResult<T> = Result<T, EngineError>;
