//! rexpr lexer: converts expression source into a token stream.

pub mod lexer;
pub mod token;

pub use lexer::{LexResult, Lexer};
pub use token::{Token, TokenKind, KEYWORDS, RESERVED_WORDS};
