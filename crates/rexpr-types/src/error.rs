use crate::{SourceText, Span};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum number of errors kept before the rest are only counted.
pub const MAX_ERRORS: usize = 20;

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Syntax,
    Limit,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Limit => write!(f, "limit"),
        }
    }
}

/// Numeric error code (E100–E299).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Syntax errors (E100–E199) ──
    pub const UNEXPECTED_TOKEN: Self = Self(100);
    pub const UNTERMINATED_LITERAL: Self = Self(101);
    pub const INVALID_NUMBER: Self = Self(102);
    pub const INVALID_ESCAPE: Self = Self(103);
    pub const RESERVED_WORD: Self = Self(104);
    pub const INVALID_ASSIGNMENT_TARGET: Self = Self(105);
    pub const ARROW_FUNCTION: Self = Self(110);

    // ── Limit errors (E200–E299) ──
    pub const NESTING_TOO_DEEP: Self = Self(200);

    pub fn category(self) -> ErrorCategory {
        match self.0 {
            200..=299 => ErrorCategory::Limit,
            _ => ErrorCategory::Syntax,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// A structured error for a single expression.
///
/// Carries everything an editor needs to underline the offending text
/// without parsing the message.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{line}:{column}: {code} [{category}] {message}")]
pub struct ExpressionError {
    /// The full expression source.
    pub expression: String,
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub message: String,
    #[serde(flatten)]
    pub span: Span,
    /// 1-based line of `span.start`.
    pub line: u32,
    /// 1-based column (in characters) of `span.start`.
    pub column: u32,
    pub source_line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ExpressionError {
    pub fn new(source: &SourceText, code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        let (line, column) = source.position(span.start);
        Self {
            expression: source.source.clone(),
            code,
            category: code.category(),
            message: message.into(),
            span,
            line,
            column,
            source_line: source.line(line).unwrap_or("").to_string(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Errors collected while lexing and parsing one expression.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub errors: Vec<ExpressionError>,
    pub total_errors: usize,
}

impl Diagnostics {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Returns `true` once the error cap is reached.
    pub fn is_full(&self) -> bool {
        self.total_errors >= MAX_ERRORS
    }

    /// Add an error, respecting the [`MAX_ERRORS`] limit.
    pub fn push(&mut self, error: ExpressionError) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(error);
        }
        self.total_errors += 1;
    }

    /// Append every error from `other`, keeping its count.
    pub fn extend(&mut self, other: Diagnostics) {
        let uncounted = other.total_errors.saturating_sub(other.errors.len());
        for error in other.errors {
            self.push(error);
        }
        self.total_errors += uncounted;
    }

    /// The earliest error by source position.
    pub fn first(&self) -> Option<&ExpressionError> {
        self.errors.iter().min_by_key(|e| e.span.start)
    }

    pub fn into_first(self) -> Option<ExpressionError> {
        self.errors.into_iter().min_by_key(|e| e.span.start)
    }
}
