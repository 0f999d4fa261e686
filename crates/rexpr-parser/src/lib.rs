//! rexpr parser: converts a token stream into an expression AST.
//!
//! [`parse`] runs the lexer and the parser over one source string and
//! reports the leftmost diagnostic when either stage fails.

mod parse_expr;
mod parser;

pub use parser::{ParseResult, Parser, MAX_DEPTH};

use rexpr_lexer::Lexer;
use rexpr_types::ast::Expr;
use rexpr_types::{ErrorCode, ExpressionError, SourceText, Span};

/// Parse `source` as a single expression.
pub fn parse(source: &str) -> Result<Expr, ExpressionError> {
    let text = SourceText::new(source);
    let lexed = Lexer::new(&text).lex();
    let mut errors = lexed.errors;
    let parsed = Parser::new(lexed.tokens, &text).parse();
    errors.extend(parsed.errors);

    match (errors.into_first(), parsed.expr) {
        (Some(error), _) => Err(error),
        (None, Some(expr)) => Ok(expr),
        (None, None) => Err(ExpressionError::new(
            &text,
            ErrorCode::UNEXPECTED_TOKEN,
            "could not parse expression",
            Span::point(0),
        )),
    }
}
