//! Token types for the rexpr lexer.
//!
//! Defines [`TokenKind`] covering every lexeme of the expression subset and
//! [`Token`], which pairs a kind with a byte [`Span`].

use rexpr_types::Span;
use std::fmt;

/// Words with a dedicated token kind.
pub const KEYWORDS: &[&str] = &[
    "true",
    "false",
    "null",
    "undefined",
    "this",
    "typeof",
    "void",
    "delete",
    "new",
    "in",
    "instanceof",
];

/// Words reserved by the host language that the expression subset never
/// gives a meaning to. They lex as [`TokenKind::Reserved`] so the parser can
/// reject them as identifiers while still allowing `obj.class`.
pub const RESERVED_WORDS: &[&str] = &[
    "var", "let", "const", "function", "return", "if", "else", "for", "while", "do", "switch",
    "case", "default", "break", "continue", "class", "extends", "super", "import", "export",
    "try", "catch", "finally", "throw", "with", "yield", "await", "async", "debugger", "enum",
];

// ─────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

// ─────────────────────────────────────────────────────────────────────
// TokenKind
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Literals ──────────────────────────────────────────────
    Number(f64),
    String(String),
    True,
    False,
    Null,
    Undefined,

    // ── Template literals ────────────────────────────────────
    /// A template with no `${`: `` `plain` ``.
    TemplateString(String),
    /// Text between the opening backtick and the first `${`.
    TemplateStart(String),
    /// Text between a `}` and the next `${`.
    TemplatePart(String),
    /// Text between the last `}` and the closing backtick.
    TemplateEnd(String),
    /// The `${` that opens an interpolation.
    InterpolationStart,
    /// The `}` that closes an interpolation.
    InterpolationEnd,

    // ── Names ────────────────────────────────────────────────
    Identifier(String),
    Reserved(String),
    This,
    Typeof,
    Void,
    Delete,
    New,
    In,
    InstanceOf,

    // ── Punctuation ──────────────────────────────────────────
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,
    Dot,
    DotDotDot,
    Question,
    QuestionDot,
    /// `=>`
    Arrow,

    // ── Arithmetic ───────────────────────────────────────────
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,

    // ── Bitwise ──────────────────────────────────────────────
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,
    UShr,

    // ── Logical ──────────────────────────────────────────────
    Bang,
    AmpAmp,
    PipePipe,
    QuestionQuestion,

    // ── Comparison ───────────────────────────────────────────
    Less,
    Greater,
    LessEq,
    GreaterEq,
    EqEq,
    BangEq,
    EqEqEq,
    BangEqEq,

    // ── Assignment ───────────────────────────────────────────
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    StarStarEq,
    SlashEq,
    PercentEq,
    ShlEq,
    ShrEq,
    UShrEq,
    AmpEq,
    PipeEq,
    CaretEq,
    AmpAmpEq,
    PipePipeEq,
    QuestionQuestionEq,

    Eof,
}

impl TokenKind {
    /// Look up a word with its own token kind, including reserved words.
    pub fn from_keyword(s: &str) -> Option<TokenKind> {
        Some(match s {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "undefined" => TokenKind::Undefined,
            "this" => TokenKind::This,
            "typeof" => TokenKind::Typeof,
            "void" => TokenKind::Void,
            "delete" => TokenKind::Delete,
            "new" => TokenKind::New,
            "in" => TokenKind::In,
            "instanceof" => TokenKind::InstanceOf,
            _ if RESERVED_WORDS.contains(&s) => TokenKind::Reserved(s.to_string()),
            _ => return None,
        })
    }

    /// The word this token was spelled with, if it is a name of any kind.
    ///
    /// Property names after `.` accept every word, so `a.new` and
    /// `a.class` are valid member accesses.
    pub fn as_word(&self) -> Option<&str> {
        Some(match self {
            TokenKind::Identifier(name) | TokenKind::Reserved(name) => name,
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Null => "null",
            TokenKind::Undefined => "undefined",
            TokenKind::This => "this",
            TokenKind::Typeof => "typeof",
            TokenKind::Void => "void",
            TokenKind::Delete => "delete",
            TokenKind::New => "new",
            TokenKind::In => "in",
            TokenKind::InstanceOf => "instanceof",
            _ => return None,
        })
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(word) = self.as_word() {
            return f.write_str(word);
        }
        let s = match self {
            TokenKind::Number(n) => return write!(f, "{n}"),
            TokenKind::String(s) => return write!(f, "{s:?}"),
            TokenKind::TemplateString(_)
            | TokenKind::TemplateStart(_)
            | TokenKind::TemplatePart(_)
            | TokenKind::TemplateEnd(_) => "template literal",
            TokenKind::InterpolationStart => "${",
            TokenKind::InterpolationEnd => "}",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Semicolon => ";",
            TokenKind::Dot => ".",
            TokenKind::DotDotDot => "...",
            TokenKind::Question => "?",
            TokenKind::QuestionDot => "?.",
            TokenKind::Arrow => "=>",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::StarStar => "**",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::Amp => "&",
            TokenKind::Pipe => "|",
            TokenKind::Caret => "^",
            TokenKind::Tilde => "~",
            TokenKind::Shl => "<<",
            TokenKind::Shr => ">>",
            TokenKind::UShr => ">>>",
            TokenKind::Bang => "!",
            TokenKind::AmpAmp => "&&",
            TokenKind::PipePipe => "||",
            TokenKind::QuestionQuestion => "??",
            TokenKind::Less => "<",
            TokenKind::Greater => ">",
            TokenKind::LessEq => "<=",
            TokenKind::GreaterEq => ">=",
            TokenKind::EqEq => "==",
            TokenKind::BangEq => "!=",
            TokenKind::EqEqEq => "===",
            TokenKind::BangEqEq => "!==",
            TokenKind::Eq => "=",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::StarStarEq => "**=",
            TokenKind::SlashEq => "/=",
            TokenKind::PercentEq => "%=",
            TokenKind::ShlEq => "<<=",
            TokenKind::ShrEq => ">>=",
            TokenKind::UShrEq => ">>>=",
            TokenKind::AmpEq => "&=",
            TokenKind::PipeEq => "|=",
            TokenKind::CaretEq => "^=",
            TokenKind::AmpAmpEq => "&&=",
            TokenKind::PipePipeEq => "||=",
            TokenKind::QuestionQuestionEq => "??=",
            TokenKind::Eof => "end of expression",
            _ => "token",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_keyword_has_a_kind() {
        for word in KEYWORDS {
            let kind = TokenKind::from_keyword(word).expect("keyword");
            assert_eq!(kind.as_word(), Some(*word));
        }
    }

    #[test]
    fn test_reserved_words_round_trip_through_display() {
        for word in RESERVED_WORDS {
            let kind = TokenKind::from_keyword(word).expect("reserved word");
            assert_eq!(kind, TokenKind::Reserved(word.to_string()));
            assert_eq!(kind.to_string(), *word);
        }
    }

    #[test]
    fn test_plain_identifier_is_not_a_keyword() {
        assert_eq!(TokenKind::from_keyword("value"), None);
        assert_eq!(TokenKind::from_keyword("$scope"), None);
    }
}
