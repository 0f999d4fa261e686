//! Shared types for the rexpr expression front-end.
//!
//! This crate defines the expression AST, byte-offset source spans and the
//! structured error type reported by the lexer and parser.

mod error;
mod span;
pub mod ast;

pub use error::{Diagnostics, ErrorCategory, ErrorCode, ExpressionError, MAX_ERRORS};
pub use span::{SourceText, Span};

/// Result type used throughout the rexpr front-end.
pub type Result<T> = std::result::Result<T, ExpressionError>;
