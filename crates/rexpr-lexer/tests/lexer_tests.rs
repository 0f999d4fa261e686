//! Lexer tests: keywords, operators, literals (number, string, template),
//! comments, error recovery, spans, and the 100-iteration determinism test.

use rexpr_lexer::{Lexer, TokenKind};
use rexpr_types::{ErrorCode, SourceText, Span};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// Lex source text and return just the token kinds (excluding final Eof).
fn kinds(source: &str) -> Vec<TokenKind> {
    let src = SourceText::new(source);
    Lexer::new(&src)
        .lex()
        .tokens
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.kind)
        .collect()
}

fn error_count(source: &str) -> usize {
    let src = SourceText::new(source);
    Lexer::new(&src).lex().errors.total_errors
}

fn first_error_code(source: &str) -> Option<ErrorCode> {
    let src = SourceText::new(source);
    Lexer::new(&src).lex().errors.first().map(|e| e.code)
}

fn ident(name: &str) -> TokenKind {
    TokenKind::Identifier(name.to_string())
}

// ─────────────────────────────────────────────────────────────────────
// Names
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_keywords() {
    let pairs = [
        ("true", TokenKind::True),
        ("false", TokenKind::False),
        ("null", TokenKind::Null),
        ("undefined", TokenKind::Undefined),
        ("typeof", TokenKind::Typeof),
        ("void", TokenKind::Void),
        ("delete", TokenKind::Delete),
        ("new", TokenKind::New),
        ("in", TokenKind::In),
        ("instanceof", TokenKind::InstanceOf),
        ("this", TokenKind::This),
    ];
    for (src, expected) in pairs {
        assert_eq!(kinds(src), vec![expected], "keyword '{src}'");
    }
}

#[test]
fn test_identifiers_with_dollar_and_underscore() {
    assert_eq!(
        kinds("$scope _private a1 café"),
        vec![ident("$scope"), ident("_private"), ident("a1"), ident("café")]
    );
}

#[test]
fn test_reserved_word() {
    assert_eq!(kinds("class"), vec![TokenKind::Reserved("class".into())]);
}

// ─────────────────────────────────────────────────────────────────────
// Operators
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_longest_match_operators() {
    assert_eq!(
        kinds("=== !== == != = => >>>= >>> >> >= > <<= << <= <"),
        vec![
            TokenKind::EqEqEq,
            TokenKind::BangEqEq,
            TokenKind::EqEq,
            TokenKind::BangEq,
            TokenKind::Eq,
            TokenKind::Arrow,
            TokenKind::UShrEq,
            TokenKind::UShr,
            TokenKind::Shr,
            TokenKind::GreaterEq,
            TokenKind::Greater,
            TokenKind::ShlEq,
            TokenKind::Shl,
            TokenKind::LessEq,
            TokenKind::Less,
        ]
    );
}

#[test]
fn test_arithmetic_and_logical_operators() {
    assert_eq!(
        kinds("** **= * + ++ - -- % / && &&= || ||= ?? ??= & | ^ ~ !"),
        vec![
            TokenKind::StarStar,
            TokenKind::StarStarEq,
            TokenKind::Star,
            TokenKind::Plus,
            TokenKind::PlusPlus,
            TokenKind::Minus,
            TokenKind::MinusMinus,
            TokenKind::Percent,
            TokenKind::Slash,
            TokenKind::AmpAmp,
            TokenKind::AmpAmpEq,
            TokenKind::PipePipe,
            TokenKind::PipePipeEq,
            TokenKind::QuestionQuestion,
            TokenKind::QuestionQuestionEq,
            TokenKind::Amp,
            TokenKind::Pipe,
            TokenKind::Caret,
            TokenKind::Tilde,
            TokenKind::Bang,
        ]
    );
}

#[test]
fn test_optional_chaining_vs_conditional_number() {
    assert_eq!(
        kinds("a?.b"),
        vec![ident("a"), TokenKind::QuestionDot, ident("b")]
    );
    assert_eq!(
        kinds("a?.5:1"),
        vec![
            ident("a"),
            TokenKind::Question,
            TokenKind::Number(0.5),
            TokenKind::Colon,
            TokenKind::Number(1.0),
        ]
    );
}

#[test]
fn test_spread_and_dot() {
    assert_eq!(
        kinds("[...a.b]"),
        vec![
            TokenKind::LBracket,
            TokenKind::DotDotDot,
            ident("a"),
            TokenKind::Dot,
            ident("b"),
            TokenKind::RBracket,
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Numbers
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_number_forms() {
    assert_eq!(
        kinds("42 3.25 .5 1e3 2.5E-2 0xff 0o17 0b101"),
        vec![
            TokenKind::Number(42.0),
            TokenKind::Number(3.25),
            TokenKind::Number(0.5),
            TokenKind::Number(1000.0),
            TokenKind::Number(0.025),
            TokenKind::Number(255.0),
            TokenKind::Number(15.0),
            TokenKind::Number(5.0),
        ]
    );
}

#[test]
fn test_invalid_hex_literal() {
    assert_eq!(first_error_code("0xzz"), Some(ErrorCode::INVALID_NUMBER));
}

#[test]
fn test_missing_exponent_digits() {
    assert_eq!(first_error_code("1e+"), Some(ErrorCode::INVALID_NUMBER));
}

// ─────────────────────────────────────────────────────────────────────
// Strings
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_string_quotes_and_escapes() {
    assert_eq!(
        kinds(r#"'it\'s' "a\tb" '\x41B\u{1F600}'"#),
        vec![
            TokenKind::String("it's".into()),
            TokenKind::String("a\tb".into()),
            TokenKind::String("AB\u{1F600}".into()),
        ]
    );
}

#[test]
fn test_unterminated_string() {
    assert_eq!(
        first_error_code("'abc"),
        Some(ErrorCode::UNTERMINATED_LITERAL)
    );
}

#[test]
fn test_invalid_unicode_escape() {
    assert_eq!(first_error_code(r"'\u12'"), Some(ErrorCode::INVALID_ESCAPE));
}

// ─────────────────────────────────────────────────────────────────────
// Templates
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_template_without_interpolation() {
    assert_eq!(
        kinds("`plain text`"),
        vec![TokenKind::TemplateString("plain text".into())]
    );
}

#[test]
fn test_template_with_interpolations() {
    assert_eq!(
        kinds("`a${x}b${y}c`"),
        vec![
            TokenKind::TemplateStart("a".into()),
            TokenKind::InterpolationStart,
            ident("x"),
            TokenKind::InterpolationEnd,
            TokenKind::TemplatePart("b".into()),
            TokenKind::InterpolationStart,
            ident("y"),
            TokenKind::InterpolationEnd,
            TokenKind::TemplateEnd("c".into()),
        ]
    );
}

#[test]
fn test_template_object_literal_inside_interpolation() {
    assert_eq!(
        kinds("`${ {a: 1}.a }`"),
        vec![
            TokenKind::TemplateStart(String::new()),
            TokenKind::InterpolationStart,
            TokenKind::LBrace,
            ident("a"),
            TokenKind::Colon,
            TokenKind::Number(1.0),
            TokenKind::RBrace,
            TokenKind::Dot,
            ident("a"),
            TokenKind::InterpolationEnd,
            TokenKind::TemplateEnd(String::new()),
        ]
    );
}

#[test]
fn test_nested_template() {
    let k = kinds("`x${`y${z}`}`");
    assert_eq!(k.first(), Some(&TokenKind::TemplateStart("x".into())));
    assert_eq!(k.last(), Some(&TokenKind::TemplateEnd(String::new())));
    assert!(k.contains(&TokenKind::TemplateStart("y".into())));
}

#[test]
fn test_unterminated_template() {
    assert!(error_count("`abc ${x}") > 0);
}

// ─────────────────────────────────────────────────────────────────────
// Comments & recovery
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_comments_are_skipped() {
    assert_eq!(
        kinds("a /* sum */ + // trailing\n b"),
        vec![ident("a"), TokenKind::Plus, ident("b")]
    );
}

#[test]
fn test_unterminated_block_comment() {
    assert_eq!(
        first_error_code("a /* open"),
        Some(ErrorCode::UNTERMINATED_LITERAL)
    );
}

#[test]
fn test_unexpected_character_recovers() {
    assert_eq!(kinds("a # b"), vec![ident("a"), ident("b")]);
    assert_eq!(error_count("a # b"), 1);
}

#[test]
fn test_error_cap() {
    let src = "#".repeat(40);
    assert_eq!(error_count(&src), rexpr_types::MAX_ERRORS);
}

// ─────────────────────────────────────────────────────────────────────
// Spans
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_token_spans_are_byte_ranges() {
    let src = SourceText::new("ab >>> 'é'");
    let tokens = Lexer::new(&src).lex().tokens;
    assert_eq!(tokens[0].span, Span::new(0, 2));
    assert_eq!(tokens[1].span, Span::new(3, 6));
    assert_eq!(tokens[2].span, Span::new(7, 11));
    assert_eq!(tokens[3].kind, TokenKind::Eof);
}

#[test]
fn test_empty_source_is_just_eof() {
    let src = SourceText::new("   ");
    let tokens = Lexer::new(&src).lex().tokens;
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::Eof);
}

#[test]
fn test_lexer_determinism_100_iterations() {
    let source = "a.b[c] ?? `t${x + 1}` ? f(...xs) : -y ** 2";
    let first = kinds(source);
    for i in 0..100 {
        assert_eq!(first, kinds(source), "Determinism failure at iteration {i}");
    }
}
