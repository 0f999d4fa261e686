//! Core parser infrastructure: token cursor, error reporting, helpers.

use rexpr_lexer::token::{Token, TokenKind};
use rexpr_types::ast::Expr;
use rexpr_types::{Diagnostics, ErrorCode, ExpressionError, SourceText, Span};

/// Maximum nesting depth of sub-expressions.
pub const MAX_DEPTH: u32 = 64;

/// The rexpr parser.
///
/// Consumes a token stream produced by the lexer and builds a single
/// expression. Parsing stops at the first malformed construct; the lexer's
/// errors are reported alongside.
pub struct Parser<'src> {
    tokens: Vec<Token>,
    /// Current index into `tokens`.
    pos: usize,
    source: &'src SourceText,
    errors: Diagnostics,
    /// Current sub-expression nesting depth.
    pub(crate) depth: u32,
}

/// Result of parsing.
pub struct ParseResult {
    pub expr: Option<Expr>,
    pub errors: Diagnostics,
}

impl<'src> Parser<'src> {
    pub fn new(tokens: Vec<Token>, source: &'src SourceText) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
            errors: Diagnostics::empty(),
            depth: 0,
        }
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    /// Returns the current token without advancing.
    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).or_else(|| self.tokens.last())
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        self.peek().map(|t| &t.kind).unwrap_or(&TokenKind::Eof)
    }

    /// Advance the cursor by one and return the consumed token's span.
    pub(crate) fn advance(&mut self) -> Span {
        let span = self.current_span();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        span
    }

    /// Returns the previously consumed token's span.
    pub(crate) fn previous_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span)
            .unwrap_or_default()
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek()
            .map(|t| t.span)
            .unwrap_or_else(|| Span::point(self.source.source.len()))
    }

    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// If the current token matches, advance and return `true`.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Look ahead by `n` tokens from current position.
    pub(crate) fn look_ahead(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    // ── Expect Helpers ────────────────────────────────────────────────────────

    /// Expect a specific token kind. Returns its span if matched, or emits an error.
    pub(crate) fn expect(&mut self, expected: &TokenKind) -> Option<Span> {
        if self.check(expected) {
            Some(self.advance())
        } else {
            self.error_at_current(
                ErrorCode::UNEXPECTED_TOKEN,
                format!("expected '{}', got '{}'", expected, self.peek_kind()),
            );
            None
        }
    }

    /// Expect a property name after `.` or `?.`: any identifier or word.
    pub(crate) fn expect_property_name(&mut self) -> Option<(String, Span)> {
        match self.peek_kind().as_word() {
            Some(word) => {
                let word = word.to_string();
                let span = self.advance();
                Some((word, span))
            }
            None => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected property name, got '{}'", self.peek_kind()),
                );
                None
            }
        }
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    pub(crate) fn error_at_current(&mut self, code: ErrorCode, message: impl Into<String>) {
        let span = self.current_span();
        self.error_at(code, message, span);
    }

    pub(crate) fn error_at(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        self.errors
            .push(ExpressionError::new(self.source, code, message, span));
    }

    pub(crate) fn error_with_suggestion(
        &mut self,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
        suggestion: impl Into<String>,
    ) {
        self.errors.push(
            ExpressionError::new(self.source, code, message, span).with_suggestion(suggestion),
        );
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// Parse the token stream as one complete expression.
    pub fn parse(mut self) -> ParseResult {
        if self.at_end() {
            self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, "empty expression");
            return ParseResult {
                expr: None,
                errors: self.errors,
            };
        }
        let expr = self.parse_expression();
        if expr.is_some() && !self.at_end() {
            self.error_at_current(
                ErrorCode::UNEXPECTED_TOKEN,
                format!("unexpected '{}' after expression", self.peek_kind()),
            );
        }
        ParseResult {
            expr,
            errors: self.errors,
        }
    }
}
