//! Core rexpr lexer: converts expression source to a token stream.
//!
//! Features:
//! - Every operator of the expression subset, longest match first
//! - Decimal, exponent, hexadecimal, octal and binary number literals
//! - Single- and double-quoted strings with escape sequences
//! - Template literals with `${expr}` interpolation via a mode stack
//! - Line (`//`) and block (`/* */`) comments are skipped
//! - Error recovery: collects up to 20 errors instead of stopping at the first

use rexpr_types::{Diagnostics, ErrorCode, ExpressionError, SourceText, Span};

use crate::token::{Token, TokenKind};

/// Lexer mode: top-level code, the text of a template literal, or an
/// interpolation inside a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    /// Inside a template literal after an interpolation closed.
    Template,
    /// Inside `${...}`. `brace_depth` counts nested `{` so the closing `}`
    /// of the interpolation can be told apart from an object literal's.
    Interpolation { brace_depth: u32 },
}

/// The rexpr lexer.
pub struct Lexer<'src> {
    src: &'src str,
    source: &'src SourceText,
    /// Current byte offset into `src`.
    pos: usize,
    errors: Diagnostics,
    mode_stack: Vec<Mode>,
    /// Tokens to emit before the next scan (used for interpolation).
    pending: Vec<Token>,
}

/// Result of lexing: tokens + any errors collected.
pub struct LexResult {
    /// The token stream (always ends with [`TokenKind::Eof`]).
    pub tokens: Vec<Token>,
    pub errors: Diagnostics,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src SourceText) -> Self {
        Self {
            src: &source.source,
            source,
            pos: 0,
            errors: Diagnostics::empty(),
            mode_stack: vec![Mode::Normal],
            pending: Vec::new(),
        }
    }

    /// Lex the entire source into a token stream.
    pub fn lex(mut self) -> LexResult {
        let mut tokens = Vec::new();

        loop {
            if self.errors.is_full() {
                break;
            }

            if let Some(pending) = self.pending.pop() {
                tokens.push(pending);
                continue;
            }

            let token = match self.current_mode() {
                Mode::Template => self.scan_template_continuation(),
                Mode::Normal | Mode::Interpolation { .. } => self.scan_normal(),
            };

            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            tokens.push(Token::new(TokenKind::Eof, Span::point(self.pos)));
        }

        LexResult {
            tokens,
            errors: self.errors,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Mode stack helpers
    // ─────────────────────────────────────────────────────────────

    fn current_mode(&self) -> Mode {
        *self.mode_stack.last().unwrap_or(&Mode::Normal)
    }

    fn push_mode(&mut self, mode: Mode) {
        self.mode_stack.push(mode);
    }

    fn pop_mode(&mut self) {
        if self.mode_stack.len() > 1 {
            self.mode_stack.pop();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    /// Consume `expected` if it is next.
    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.pos)
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token {
        Token::new(kind, self.span_from(start))
    }

    fn emit_error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        self.errors
            .push(ExpressionError::new(self.source, code, message, span));
    }

    // ─────────────────────────────────────────────────────────────
    // Whitespace & comments
    // ─────────────────────────────────────────────────────────────

    /// Skip whitespace and comments. An unterminated block comment is an error.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.pos;
                    self.advance();
                    self.advance();
                    loop {
                        match self.peek() {
                            None => {
                                self.emit_error(
                                    ErrorCode::UNTERMINATED_LITERAL,
                                    "unterminated block comment",
                                    self.span_from(start),
                                );
                                return;
                            }
                            Some('*') if self.peek_at(1) == Some('/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            _ => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => return,
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Normal-mode scanning
    // ─────────────────────────────────────────────────────────────

    fn scan_normal(&mut self) -> Token {
        self.skip_trivia();

        if self.errors.is_full() {
            return Token::new(TokenKind::Eof, Span::point(self.pos));
        }

        if self.at_end() {
            if self
                .mode_stack
                .iter()
                .any(|m| matches!(m, Mode::Template | Mode::Interpolation { .. }))
            {
                self.emit_error(
                    ErrorCode::UNTERMINATED_LITERAL,
                    "unterminated template literal",
                    Span::point(self.pos),
                );
            }
            return Token::new(TokenKind::Eof, Span::point(self.pos));
        }

        let start = self.pos;
        let Some(ch) = self.advance() else {
            return Token::new(TokenKind::Eof, Span::point(self.pos));
        };

        match ch {
            // ── Literals ──
            '"' | '\'' => self.scan_string(ch, start),
            '`' => self.scan_template(start),
            '0'..='9' => self.scan_number(ch, start),
            '.' if matches!(self.peek(), Some('0'..='9')) => self.scan_number(ch, start),

            // ── Identifiers & keywords ──
            c if is_ident_start(c) => self.scan_identifier(start),

            // ── Punctuation ──
            '(' => self.token(TokenKind::LParen, start),
            ')' => self.token(TokenKind::RParen, start),
            '[' => self.token(TokenKind::LBracket, start),
            ']' => self.token(TokenKind::RBracket, start),
            ',' => self.token(TokenKind::Comma, start),
            ':' => self.token(TokenKind::Colon, start),
            ';' => self.token(TokenKind::Semicolon, start),
            '~' => self.token(TokenKind::Tilde, start),

            '.' => {
                if self.peek() == Some('.') && self.peek_at(1) == Some('.') {
                    self.advance();
                    self.advance();
                    self.token(TokenKind::DotDotDot, start)
                } else {
                    self.token(TokenKind::Dot, start)
                }
            }

            '?' => {
                if self.eat('?') {
                    let kind = if self.eat('=') {
                        TokenKind::QuestionQuestionEq
                    } else {
                        TokenKind::QuestionQuestion
                    };
                    self.token(kind, start)
                } else if self.peek() == Some('.') && !matches!(self.peek_at(1), Some('0'..='9')) {
                    // `a?.5:b` is a conditional, not optional chaining.
                    self.advance();
                    self.token(TokenKind::QuestionDot, start)
                } else {
                    self.token(TokenKind::Question, start)
                }
            }

            '{' => {
                if let Some(Mode::Interpolation { brace_depth }) = self.mode_stack.last_mut() {
                    *brace_depth += 1;
                }
                self.token(TokenKind::LBrace, start)
            }

            '}' => {
                if let Some(Mode::Interpolation { brace_depth }) = self.mode_stack.last_mut() {
                    if *brace_depth == 0 {
                        self.pop_mode();
                        self.push_mode(Mode::Template);
                        return self.token(TokenKind::InterpolationEnd, start);
                    }
                    *brace_depth -= 1;
                }
                self.token(TokenKind::RBrace, start)
            }

            // ── Operators ──
            '+' => {
                let kind = if self.eat('+') {
                    TokenKind::PlusPlus
                } else if self.eat('=') {
                    TokenKind::PlusEq
                } else {
                    TokenKind::Plus
                };
                self.token(kind, start)
            }
            '-' => {
                let kind = if self.eat('-') {
                    TokenKind::MinusMinus
                } else if self.eat('=') {
                    TokenKind::MinusEq
                } else {
                    TokenKind::Minus
                };
                self.token(kind, start)
            }
            '*' => {
                let kind = if self.eat('*') {
                    if self.eat('=') {
                        TokenKind::StarStarEq
                    } else {
                        TokenKind::StarStar
                    }
                } else if self.eat('=') {
                    TokenKind::StarEq
                } else {
                    TokenKind::Star
                };
                self.token(kind, start)
            }
            '/' => {
                // Comments were consumed by `skip_trivia`.
                let kind = if self.eat('=') {
                    TokenKind::SlashEq
                } else {
                    TokenKind::Slash
                };
                self.token(kind, start)
            }
            '%' => {
                let kind = if self.eat('=') {
                    TokenKind::PercentEq
                } else {
                    TokenKind::Percent
                };
                self.token(kind, start)
            }
            '^' => {
                let kind = if self.eat('=') {
                    TokenKind::CaretEq
                } else {
                    TokenKind::Caret
                };
                self.token(kind, start)
            }
            '&' => {
                let kind = if self.eat('&') {
                    if self.eat('=') {
                        TokenKind::AmpAmpEq
                    } else {
                        TokenKind::AmpAmp
                    }
                } else if self.eat('=') {
                    TokenKind::AmpEq
                } else {
                    TokenKind::Amp
                };
                self.token(kind, start)
            }
            '|' => {
                let kind = if self.eat('|') {
                    if self.eat('=') {
                        TokenKind::PipePipeEq
                    } else {
                        TokenKind::PipePipe
                    }
                } else if self.eat('=') {
                    TokenKind::PipeEq
                } else {
                    TokenKind::Pipe
                };
                self.token(kind, start)
            }
            '=' => {
                let kind = if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::EqEqEq
                    } else {
                        TokenKind::EqEq
                    }
                } else if self.eat('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Eq
                };
                self.token(kind, start)
            }
            '!' => {
                let kind = if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::BangEqEq
                    } else {
                        TokenKind::BangEq
                    }
                } else {
                    TokenKind::Bang
                };
                self.token(kind, start)
            }
            '<' => {
                let kind = if self.eat('<') {
                    if self.eat('=') {
                        TokenKind::ShlEq
                    } else {
                        TokenKind::Shl
                    }
                } else if self.eat('=') {
                    TokenKind::LessEq
                } else {
                    TokenKind::Less
                };
                self.token(kind, start)
            }
            '>' => {
                let kind = if self.eat('>') {
                    if self.eat('>') {
                        if self.eat('=') {
                            TokenKind::UShrEq
                        } else {
                            TokenKind::UShr
                        }
                    } else if self.eat('=') {
                        TokenKind::ShrEq
                    } else {
                        TokenKind::Shr
                    }
                } else if self.eat('=') {
                    TokenKind::GreaterEq
                } else {
                    TokenKind::Greater
                };
                self.token(kind, start)
            }

            _ => {
                self.emit_error(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("unexpected character '{ch}'"),
                    self.span_from(start),
                );
                // Error recovery: skip the character and try again
                self.scan_normal()
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Number literals
    // ─────────────────────────────────────────────────────────────

    fn scan_number(&mut self, first: char, start: usize) -> Token {
        if first == '0' {
            let radix = match self.peek() {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.advance();
                let digits_start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_alphanumeric()) {
                    self.advance();
                }
                let digits = &self.src[digits_start..self.pos];
                return match u64::from_str_radix(digits, radix) {
                    Ok(value) => self.token(TokenKind::Number(value as f64), start),
                    Err(_) => {
                        self.emit_error(
                            ErrorCode::INVALID_NUMBER,
                            format!("invalid base-{radix} literal '{}'", &self.src[start..self.pos]),
                            self.span_from(start),
                        );
                        self.token(TokenKind::Number(f64::NAN), start)
                    }
                };
            }
        }

        if first != '.' {
            self.skip_digits();
            if self.peek() == Some('.') {
                self.advance();
            }
        }
        self.skip_digits();

        if matches!(self.peek(), Some('e' | 'E')) {
            let has_exponent = match self.peek_at(1) {
                Some('0'..='9') => true,
                Some('+' | '-') => matches!(self.peek_at(2), Some('0'..='9')),
                _ => false,
            };
            if has_exponent {
                self.advance();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.advance();
                }
                self.skip_digits();
            } else {
                self.advance();
                self.emit_error(
                    ErrorCode::INVALID_NUMBER,
                    "missing exponent digits",
                    self.span_from(start),
                );
            }
        }

        if self.peek().is_some_and(is_ident_start) {
            self.emit_error(
                ErrorCode::INVALID_NUMBER,
                "identifier starts immediately after numeric literal",
                Span::new(self.pos, self.pos + 1),
            );
        }

        let text = &self.src[start..self.pos];
        let value: f64 = text.parse().unwrap_or(f64::NAN);
        self.token(TokenKind::Number(value), start)
    }

    fn skip_digits(&mut self) {
        while let Some('0'..='9') = self.peek() {
            self.advance();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Identifiers & keywords
    // ─────────────────────────────────────────────────────────────

    fn scan_identifier(&mut self, start: usize) -> Token {
        while self.peek().is_some_and(is_ident_part) {
            self.advance();
        }
        let text = &self.src[start..self.pos];
        let kind = TokenKind::from_keyword(text)
            .unwrap_or_else(|| TokenKind::Identifier(text.to_string()));
        self.token(kind, start)
    }

    // ─────────────────────────────────────────────────────────────
    // String literals
    // ─────────────────────────────────────────────────────────────

    /// Scan a quoted string after its opening quote.
    fn scan_string(&mut self, quote: char, start: usize) -> Token {
        let mut buf = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.emit_error(
                        ErrorCode::UNTERMINATED_LITERAL,
                        "unterminated string literal",
                        self.span_from(start),
                    );
                    return self.token(TokenKind::String(buf), start);
                }
                Some(c) if c == quote => {
                    self.advance();
                    return self.token(TokenKind::String(buf), start);
                }
                Some('\\') => {
                    if let Some(escaped) = self.scan_escape_sequence() {
                        buf.push(escaped);
                    }
                }
                Some(c) => {
                    self.advance();
                    buf.push(c);
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Template literals & interpolation
    // ─────────────────────────────────────────────────────────────

    /// Scan a template literal after its opening backtick. Produces either a
    /// `TemplateString` or a `TemplateStart` followed by `InterpolationStart`.
    fn scan_template(&mut self, start: usize) -> Token {
        match self.scan_template_text(start) {
            TemplateText::Closed(text) => self.token(TokenKind::TemplateString(text), start),
            TemplateText::Interpolation(text, interp_start) => {
                self.push_mode(Mode::Interpolation { brace_depth: 0 });
                self.pending.push(Token::new(
                    TokenKind::InterpolationStart,
                    Span::new(interp_start, self.pos),
                ));
                Token::new(TokenKind::TemplateStart(text), Span::new(start, interp_start))
            }
            TemplateText::Unterminated(text) => {
                self.token(TokenKind::TemplateString(text), start)
            }
        }
    }

    /// Continue a template literal after an interpolation's closing `}`.
    fn scan_template_continuation(&mut self) -> Token {
        let start = self.pos;
        match self.scan_template_text(start) {
            TemplateText::Closed(text) => {
                self.pop_mode();
                self.token(TokenKind::TemplateEnd(text), start)
            }
            TemplateText::Interpolation(text, interp_start) => {
                self.pop_mode();
                self.push_mode(Mode::Interpolation { brace_depth: 0 });
                self.pending.push(Token::new(
                    TokenKind::InterpolationStart,
                    Span::new(interp_start, self.pos),
                ));
                Token::new(TokenKind::TemplatePart(text), Span::new(start, interp_start))
            }
            TemplateText::Unterminated(text) => {
                self.pop_mode();
                self.token(TokenKind::TemplateEnd(text), start)
            }
        }
    }

    fn scan_template_text(&mut self, start: usize) -> TemplateText {
        let mut buf = String::new();
        loop {
            match self.peek() {
                None => {
                    self.emit_error(
                        ErrorCode::UNTERMINATED_LITERAL,
                        "unterminated template literal",
                        self.span_from(start),
                    );
                    return TemplateText::Unterminated(buf);
                }
                Some('`') => {
                    self.advance();
                    return TemplateText::Closed(buf);
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    let interp_start = self.pos;
                    self.advance();
                    self.advance();
                    return TemplateText::Interpolation(buf, interp_start);
                }
                Some('\\') => {
                    if let Some(escaped) = self.scan_escape_sequence() {
                        buf.push(escaped);
                    }
                }
                Some(c) => {
                    self.advance();
                    buf.push(c);
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Escape sequences
    // ─────────────────────────────────────────────────────────────

    /// Scan an escape sequence starting at the `\`.
    /// Returns `None` for a line continuation or after an error.
    fn scan_escape_sequence(&mut self) -> Option<char> {
        let start = self.pos;
        self.advance();

        match self.advance() {
            Some('n') => Some('\n'),
            Some('t') => Some('\t'),
            Some('r') => Some('\r'),
            Some('b') => Some('\u{8}'),
            Some('f') => Some('\u{c}'),
            Some('v') => Some('\u{b}'),
            Some('0') if !matches!(self.peek(), Some('0'..='9')) => Some('\0'),
            Some('\n') => None,
            Some('x') => self.scan_hex_escape(start, 2),
            Some('u') => {
                if self.eat('{') {
                    let digits_start = self.pos;
                    while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                        self.advance();
                    }
                    let digits = &self.src[digits_start..self.pos];
                    let code = u32::from_str_radix(digits, 16).ok();
                    if !self.eat('}') || code.is_none() {
                        return self.invalid_escape(start);
                    }
                    code.and_then(char::from_u32)
                        .or_else(|| self.invalid_escape(start))
                } else {
                    self.scan_hex_escape(start, 4)
                }
            }
            Some(c @ ('1'..='9')) => {
                self.emit_error(
                    ErrorCode::INVALID_ESCAPE,
                    format!("octal escape sequence '\\{c}' is not allowed"),
                    self.span_from(start),
                );
                Some(c)
            }
            // Any other character escapes to itself: \' \" \\ \` \$
            Some(c) => Some(c),
            None => {
                self.emit_error(
                    ErrorCode::UNTERMINATED_LITERAL,
                    "unexpected end of expression in escape sequence",
                    self.span_from(start),
                );
                None
            }
        }
    }

    fn scan_hex_escape(&mut self, start: usize, len: usize) -> Option<char> {
        let digits_start = self.pos;
        for _ in 0..len {
            match self.peek() {
                Some(c) if c.is_ascii_hexdigit() => {
                    self.advance();
                }
                _ => return self.invalid_escape(start),
            }
        }
        u32::from_str_radix(&self.src[digits_start..self.pos], 16)
            .ok()
            .and_then(char::from_u32)
            .or_else(|| self.invalid_escape(start))
    }

    fn invalid_escape(&mut self, start: usize) -> Option<char> {
        let text = self.src[start..self.pos].to_string();
        self.emit_error(
            ErrorCode::INVALID_ESCAPE,
            format!("invalid escape sequence '{text}'"),
            self.span_from(start),
        );
        None
    }
}

enum TemplateText {
    Closed(String),
    /// Text before a `${`, plus the byte offset of the `$`.
    Interpolation(String, usize),
    Unterminated(String),
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphabetic()
}

fn is_ident_part(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit() || c.is_alphanumeric()
}
