//! Expression parsing with full operator precedence.
//!
//! Precedence (lowest → highest):
//! 16. `,` (sequence)
//! 15. `=`, `+=`, ... (assignment, right-associative)
//! 14. `? :`
//! 13. `??`
//! 12. `||`
//! 11. `&&`
//! 10. `|`
//! 9. `^`
//! 8. `&`
//! 7. `==`, `!=`, `===`, `!==`
//! 6. `<`, `>`, `<=`, `>=`, `in`, `instanceof`
//! 5. `<<`, `>>`, `>>>`
//! 4. `+`, `-`
//! 3. `*`, `/`, `%`
//! 2. `**` (right-associative)
//! 1. unary `! ~ + - typeof void delete`, prefix and postfix `++`/`--`
//! 0. `.`, `?.`, `[]`, `()`, `new`

use rexpr_lexer::token::TokenKind;
use rexpr_types::ast::*;
use rexpr_types::{ErrorCode, Span};

use crate::parser::{Parser, MAX_DEPTH};

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Entry Point
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse a full expression, including the comma operator.
    pub(crate) fn parse_expression(&mut self) -> Option<Expr> {
        self.nested(|p| p.parse_sequence())
    }

    /// Run `f` one nesting level deeper, failing past [`MAX_DEPTH`].
    fn nested(&mut self, f: impl FnOnce(&mut Self) -> Option<Expr>) -> Option<Expr> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            self.error_at_current(
                ErrorCode::NESTING_TOO_DEEP,
                format!("maximum expression nesting depth is {MAX_DEPTH}"),
            );
            self.depth -= 1;
            return None;
        }
        let result = f(self);
        self.depth -= 1;
        result
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Precedence Chain
    // ══════════════════════════════════════════════════════════════════════════

    /// `Sequence = Assignment { "," Assignment }`
    fn parse_sequence(&mut self) -> Option<Expr> {
        let first = self.parse_assignment()?;
        if !self.check(&TokenKind::Comma) {
            return Some(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            items.push(self.parse_assignment()?);
        }
        let span = items[0].span.merge(self.previous_span());
        Some(Expr::new(ExprKind::Sequence(items), span))
    }

    /// `Assignment = Conditional [ AssignOp Assignment ]`
    pub(crate) fn parse_assignment(&mut self) -> Option<Expr> {
        let target = self.parse_conditional()?;
        let Some(op) = self.match_assign_op() else {
            return Some(target);
        };
        let op_span = self.advance();
        if !target.is_assignment_target() {
            self.error_at(
                ErrorCode::INVALID_ASSIGNMENT_TARGET,
                format!("invalid left-hand side in assignment '{op}'"),
                target.span,
            );
            return None;
        }
        let value = self.nested(|p| p.parse_assignment())?;
        let span = target.span.merge(value.span).merge(op_span);
        Some(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        ))
    }

    fn match_assign_op(&self) -> Option<AssignOp> {
        Some(match self.peek_kind() {
            TokenKind::Eq => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::Compound(BinaryOp::Add),
            TokenKind::MinusEq => AssignOp::Compound(BinaryOp::Sub),
            TokenKind::StarEq => AssignOp::Compound(BinaryOp::Mul),
            TokenKind::StarStarEq => AssignOp::Compound(BinaryOp::Pow),
            TokenKind::SlashEq => AssignOp::Compound(BinaryOp::Div),
            TokenKind::PercentEq => AssignOp::Compound(BinaryOp::Rem),
            TokenKind::ShlEq => AssignOp::Compound(BinaryOp::Shl),
            TokenKind::ShrEq => AssignOp::Compound(BinaryOp::Shr),
            TokenKind::UShrEq => AssignOp::Compound(BinaryOp::UShr),
            TokenKind::AmpEq => AssignOp::Compound(BinaryOp::BitAnd),
            TokenKind::PipeEq => AssignOp::Compound(BinaryOp::BitOr),
            TokenKind::CaretEq => AssignOp::Compound(BinaryOp::BitXor),
            TokenKind::AmpAmpEq => AssignOp::Logical(LogicalOp::And),
            TokenKind::PipePipeEq => AssignOp::Logical(LogicalOp::Or),
            TokenKind::QuestionQuestionEq => AssignOp::Logical(LogicalOp::Nullish),
            _ => return None,
        })
    }

    /// `Conditional = Nullish [ "?" Assignment ":" Assignment ]`
    fn parse_conditional(&mut self) -> Option<Expr> {
        let test = self.parse_nullish()?;
        if !self.eat(&TokenKind::Question) {
            return Some(test);
        }
        let consequent = self.nested(|p| p.parse_assignment())?;
        self.expect(&TokenKind::Colon)?;
        let alternate = self.nested(|p| p.parse_assignment())?;
        let span = test.span.merge(alternate.span);
        Some(Expr::new(
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            span,
        ))
    }

    /// `Nullish = LogicalOr { "??" LogicalOr }`
    fn parse_nullish(&mut self) -> Option<Expr> {
        self.logical_level(LogicalOp::Nullish, &TokenKind::QuestionQuestion, |p| {
            p.parse_logical_or()
        })
    }

    /// `LogicalOr = LogicalAnd { "||" LogicalAnd }`
    fn parse_logical_or(&mut self) -> Option<Expr> {
        self.logical_level(LogicalOp::Or, &TokenKind::PipePipe, |p| p.parse_logical_and())
    }

    /// `LogicalAnd = BitOr { "&&" BitOr }`
    fn parse_logical_and(&mut self) -> Option<Expr> {
        self.logical_level(LogicalOp::And, &TokenKind::AmpAmp, |p| p.parse_bit_or())
    }

    fn logical_level(
        &mut self,
        op: LogicalOp,
        token: &TokenKind,
        next: fn(&mut Self) -> Option<Expr>,
    ) -> Option<Expr> {
        let mut left = next(self)?;
        while self.eat(token) {
            let right = next(self)?;
            let span = left.span.merge(right.span);
            left = Expr::new(
                ExprKind::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Some(left)
    }

    /// `BitOr = BitXor { "|" BitXor }`
    fn parse_bit_or(&mut self) -> Option<Expr> {
        self.binary_level(
            |k| matches!(k, TokenKind::Pipe).then_some(BinaryOp::BitOr),
            |p| p.parse_bit_xor(),
        )
    }

    /// `BitXor = BitAnd { "^" BitAnd }`
    fn parse_bit_xor(&mut self) -> Option<Expr> {
        self.binary_level(
            |k| matches!(k, TokenKind::Caret).then_some(BinaryOp::BitXor),
            |p| p.parse_bit_and(),
        )
    }

    /// `BitAnd = Equality { "&" Equality }`
    fn parse_bit_and(&mut self) -> Option<Expr> {
        self.binary_level(
            |k| matches!(k, TokenKind::Amp).then_some(BinaryOp::BitAnd),
            |p| p.parse_equality(),
        )
    }

    /// `Equality = Relational { ("==" | "!=" | "===" | "!==") Relational }`
    fn parse_equality(&mut self) -> Option<Expr> {
        self.binary_level(
            |k| match k {
                TokenKind::EqEq => Some(BinaryOp::Eq),
                TokenKind::BangEq => Some(BinaryOp::NotEq),
                TokenKind::EqEqEq => Some(BinaryOp::StrictEq),
                TokenKind::BangEqEq => Some(BinaryOp::StrictNotEq),
                _ => None,
            },
            |p| p.parse_relational(),
        )
    }

    /// `Relational = Shift { ("<" | ">" | "<=" | ">=" | "in" | "instanceof") Shift }`
    fn parse_relational(&mut self) -> Option<Expr> {
        self.binary_level(
            |k| match k {
                TokenKind::Less => Some(BinaryOp::Less),
                TokenKind::Greater => Some(BinaryOp::Greater),
                TokenKind::LessEq => Some(BinaryOp::LessEq),
                TokenKind::GreaterEq => Some(BinaryOp::GreaterEq),
                TokenKind::In => Some(BinaryOp::In),
                TokenKind::InstanceOf => Some(BinaryOp::InstanceOf),
                _ => None,
            },
            |p| p.parse_shift(),
        )
    }

    /// `Shift = Additive { ("<<" | ">>" | ">>>") Additive }`
    fn parse_shift(&mut self) -> Option<Expr> {
        self.binary_level(
            |k| match k {
                TokenKind::Shl => Some(BinaryOp::Shl),
                TokenKind::Shr => Some(BinaryOp::Shr),
                TokenKind::UShr => Some(BinaryOp::UShr),
                _ => None,
            },
            |p| p.parse_additive(),
        )
    }

    /// `Additive = Multiplicative { ("+" | "-") Multiplicative }`
    fn parse_additive(&mut self) -> Option<Expr> {
        self.binary_level(
            |k| match k {
                TokenKind::Plus => Some(BinaryOp::Add),
                TokenKind::Minus => Some(BinaryOp::Sub),
                _ => None,
            },
            |p| p.parse_multiplicative(),
        )
    }

    /// `Multiplicative = Exponent { ("*" | "/" | "%") Exponent }`
    fn parse_multiplicative(&mut self) -> Option<Expr> {
        self.binary_level(
            |k| match k {
                TokenKind::Star => Some(BinaryOp::Mul),
                TokenKind::Slash => Some(BinaryOp::Div),
                TokenKind::Percent => Some(BinaryOp::Rem),
                _ => None,
            },
            |p| p.parse_exponent(),
        )
    }

    /// One left-associative binary precedence level.
    fn binary_level(
        &mut self,
        op_for: fn(&TokenKind) -> Option<BinaryOp>,
        next: fn(&mut Self) -> Option<Expr>,
    ) -> Option<Expr> {
        let mut left = next(self)?;
        while let Some(op) = op_for(self.peek_kind()) {
            self.advance();
            let right = next(self)?;
            let span = left.span.merge(right.span);
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Some(left)
    }

    /// `Exponent = Unary [ "**" Exponent ]`
    fn parse_exponent(&mut self) -> Option<Expr> {
        let base = self.parse_unary()?;
        if !self.eat(&TokenKind::StarStar) {
            return Some(base);
        }
        let exponent = self.nested(|p| p.parse_exponent())?;
        let span = base.span.merge(exponent.span);
        Some(Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            },
            span,
        ))
    }

    /// `Unary = ( UnaryOp Unary | ("++" | "--") Unary ) | Postfix`
    fn parse_unary(&mut self) -> Option<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Typeof => Some(UnaryOp::Typeof),
            TokenKind::Void => Some(UnaryOp::Void),
            TokenKind::Delete => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.advance();
            let operand = self.nested(|p| p.parse_unary())?;
            let span = start.merge(operand.span);
            return Some(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ));
        }

        let update = match self.peek_kind() {
            TokenKind::PlusPlus => Some(UpdateOp::Increment),
            TokenKind::MinusMinus => Some(UpdateOp::Decrement),
            _ => None,
        };
        if let Some(op) = update {
            let start = self.advance();
            let target = self.nested(|p| p.parse_unary())?;
            return self.finish_update(op, true, target, start);
        }

        self.parse_postfix()
    }

    /// `Postfix = CallMember [ "++" | "--" ]`
    fn parse_postfix(&mut self) -> Option<Expr> {
        let expr = self.parse_call_member()?;
        let op = match self.peek_kind() {
            TokenKind::PlusPlus => UpdateOp::Increment,
            TokenKind::MinusMinus => UpdateOp::Decrement,
            _ => return Some(expr),
        };
        let end = self.advance();
        self.finish_update(op, false, expr, end)
    }

    fn finish_update(&mut self, op: UpdateOp, prefix: bool, target: Expr, op_span: Span) -> Option<Expr> {
        if !target.is_assignment_target() {
            self.error_at(
                ErrorCode::INVALID_ASSIGNMENT_TARGET,
                "invalid operand for increment or decrement",
                target.span,
            );
            return None;
        }
        let span = target.span.merge(op_span);
        Some(Expr::new(
            ExprKind::Update {
                op,
                prefix,
                target: Box::new(target),
            },
            span,
        ))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Calls & Member Access
    // ══════════════════════════════════════════════════════════════════════════

    /// `CallMember = (New | Primary) { "." Name | "?." (Name | "[" Expr "]" | Args) | "[" Expr "]" | Args }`
    fn parse_call_member(&mut self) -> Option<Expr> {
        let mut expr = if self.check(&TokenKind::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    expr = self.finish_named_member(expr, false)?;
                }
                TokenKind::LBracket => {
                    self.advance();
                    expr = self.finish_computed_member(expr, false)?;
                }
                TokenKind::LParen => {
                    expr = self.finish_call(expr, false)?;
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    expr = match self.peek_kind() {
                        TokenKind::LBracket => {
                            self.advance();
                            self.finish_computed_member(expr, true)?
                        }
                        TokenKind::LParen => self.finish_call(expr, true)?,
                        _ => self.finish_named_member(expr, true)?,
                    };
                }
                TokenKind::TemplateString(_) | TokenKind::TemplateStart(_) => {
                    self.error_at_current(
                        ErrorCode::UNEXPECTED_TOKEN,
                        "tagged templates are not supported",
                    );
                    return None;
                }
                _ => break,
            }
        }
        Some(expr)
    }

    /// `New = "new" (New | Primary) { "." Name | "[" Expr "]" } [ Args ]`
    fn parse_new(&mut self) -> Option<Expr> {
        let start = self.advance();
        let mut callee = if self.check(&TokenKind::New) {
            self.nested(|p| p.parse_new())?
        } else {
            self.parse_primary()?
        };
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    callee = self.finish_named_member(callee, false)?;
                }
                TokenKind::LBracket => {
                    self.advance();
                    callee = self.finish_computed_member(callee, false)?;
                }
                _ => break,
            }
        }
        let args = if self.check(&TokenKind::LParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        let span = start.merge(self.previous_span());
        Some(Expr::new(
            ExprKind::New {
                callee: Box::new(callee),
                args,
            },
            span,
        ))
    }

    fn finish_named_member(&mut self, object: Expr, optional: bool) -> Option<Expr> {
        let (name, name_span) = self.expect_property_name()?;
        let span = object.span.merge(name_span);
        Some(Expr::new(
            ExprKind::Member {
                object: Box::new(object),
                property: MemberProperty::Named(name),
                optional,
            },
            span,
        ))
    }

    /// Parse `expr ]` after an opening `[`.
    fn finish_computed_member(&mut self, object: Expr, optional: bool) -> Option<Expr> {
        let property = self.parse_expression()?;
        let end = self.expect(&TokenKind::RBracket)?;
        let span = object.span.merge(end);
        Some(Expr::new(
            ExprKind::Member {
                object: Box::new(object),
                property: MemberProperty::Computed(Box::new(property)),
                optional,
            },
            span,
        ))
    }

    fn finish_call(&mut self, callee: Expr, optional: bool) -> Option<Expr> {
        let args = self.parse_arguments()?;
        let span = callee.span.merge(self.previous_span());
        Some(Expr::new(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
                optional,
            },
            span,
        ))
    }

    /// `Args = "(" [ Arg { "," Arg } [ "," ] ] ")"` where `Arg = [ "..." ] Assignment`
    fn parse_arguments(&mut self) -> Option<Vec<Argument>> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let arg = if self.eat(&TokenKind::DotDotDot) {
                Argument::Spread(self.nested(|p| p.parse_assignment())?)
            } else {
                Argument::Item(self.nested(|p| p.parse_assignment())?)
            };
            args.push(arg);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Some(args)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Primary Expressions
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_primary(&mut self) -> Option<Expr> {
        let span = self.current_span();
        let kind = match self.peek_kind().clone() {
            TokenKind::Number(n) => ExprKind::Number(n),
            TokenKind::String(s) => ExprKind::String(s),
            TokenKind::True => ExprKind::Boolean(true),
            TokenKind::False => ExprKind::Boolean(false),
            TokenKind::Null => ExprKind::Null,
            TokenKind::Undefined => ExprKind::Undefined,
            TokenKind::This => ExprKind::This,
            TokenKind::Identifier(name) => {
                self.advance();
                if self.check(&TokenKind::Arrow) {
                    return self.arrow_function_error(span);
                }
                return Some(Expr::new(ExprKind::Identifier(name), span));
            }
            TokenKind::TemplateString(text) => ExprKind::Template {
                quasis: vec![text],
                expressions: Vec::new(),
            },
            TokenKind::TemplateStart(_) => return self.parse_template(),
            TokenKind::LParen => return self.parse_parenthesized(),
            TokenKind::LBracket => return self.nested(|p| p.parse_array()),
            TokenKind::LBrace => return self.nested(|p| p.parse_object()),
            TokenKind::Reserved(word) => {
                self.error_with_suggestion(
                    ErrorCode::RESERVED_WORD,
                    format!("'{word}' is a reserved word"),
                    span,
                    "only expressions are allowed; statements and declarations are not",
                );
                return None;
            }
            TokenKind::Eof => {
                self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, "unexpected end of expression");
                return None;
            }
            other => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("unexpected '{other}'"),
                );
                return None;
            }
        };
        self.advance();
        Some(Expr::new(kind, span))
    }

    /// `"(" Expression ")"`. Also recognizes `() =>` and `(a) =>` to report
    /// arrow functions with a dedicated error.
    fn parse_parenthesized(&mut self) -> Option<Expr> {
        let start = self.advance();
        if self.check(&TokenKind::RParen) {
            if matches!(self.look_ahead(1), TokenKind::Arrow) {
                return self.arrow_function_error(start);
            }
            self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, "empty parentheses");
            return None;
        }
        let inner = self.parse_expression()?;
        let end = self.expect(&TokenKind::RParen)?;
        if self.check(&TokenKind::Arrow) {
            return self.arrow_function_error(start);
        }
        // The parenthesized span covers the parentheses themselves.
        Some(Expr::new(inner.kind, start.merge(end)))
    }

    fn arrow_function_error(&mut self, span: Span) -> Option<Expr> {
        self.error_with_suggestion(
            ErrorCode::ARROW_FUNCTION,
            "arrow functions are not supported in expressions",
            span.merge(self.current_span()),
            "pass a function through the context instead",
        );
        None
    }

    /// `TemplateStart "${" Expr "}" { TemplatePart "${" Expr "}" } TemplateEnd`
    fn parse_template(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let mut quasis = Vec::new();
        let mut expressions = Vec::new();
        if let TokenKind::TemplateStart(text) = self.peek_kind().clone() {
            quasis.push(text);
            self.advance();
        }
        loop {
            self.expect(&TokenKind::InterpolationStart)?;
            expressions.push(self.parse_expression()?);
            self.expect(&TokenKind::InterpolationEnd)?;
            match self.peek_kind().clone() {
                TokenKind::TemplatePart(text) => {
                    quasis.push(text);
                    self.advance();
                }
                TokenKind::TemplateEnd(text) => {
                    quasis.push(text);
                    let end = self.advance();
                    return Some(Expr::new(
                        ExprKind::Template {
                            quasis,
                            expressions,
                        },
                        start.merge(end),
                    ));
                }
                other => {
                    self.error_at_current(
                        ErrorCode::UNEXPECTED_TOKEN,
                        format!("expected template continuation, got '{other}'"),
                    );
                    return None;
                }
            }
        }
    }

    /// `"[" [ Element { "," Element } ] "]"` where elements may be spread or elided.
    fn parse_array(&mut self) -> Option<Expr> {
        let start = self.advance();
        let mut elements = Vec::new();
        loop {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            if self.check(&TokenKind::Comma) {
                elements.push(ArrayElement::Hole(self.advance()));
                continue;
            }
            let element = if self.eat(&TokenKind::DotDotDot) {
                ArrayElement::Spread(self.parse_assignment()?)
            } else {
                ArrayElement::Item(self.parse_assignment()?)
            };
            elements.push(element);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBracket)?;
        Some(Expr::new(ExprKind::Array(elements), start.merge(end)))
    }

    /// `"{" [ Member { "," Member } [ "," ] ] "}"`
    fn parse_object(&mut self) -> Option<Expr> {
        let start = self.advance();
        let mut members = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            members.push(self.parse_object_member()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBrace)?;
        Some(Expr::new(ExprKind::Object(members), start.merge(end)))
    }

    /// `"..." Assignment | Key ":" Assignment | Identifier`
    fn parse_object_member(&mut self) -> Option<ObjectMember> {
        if self.eat(&TokenKind::DotDotDot) {
            return Some(ObjectMember::Spread(self.parse_assignment()?));
        }

        let key_span = self.current_span();
        let (key, shorthand_name) = match self.peek_kind().clone() {
            TokenKind::String(s) => {
                self.advance();
                (PropertyKey::Named(s), None)
            }
            TokenKind::Number(n) => {
                self.advance();
                (PropertyKey::Named(number_key(n)), None)
            }
            TokenKind::LBracket => {
                self.advance();
                let key = self.parse_assignment()?;
                self.expect(&TokenKind::RBracket)?;
                (PropertyKey::Computed(Box::new(key)), None)
            }
            TokenKind::Identifier(name) => {
                self.advance();
                (PropertyKey::Named(name.clone()), Some(name))
            }
            other => match other.as_word() {
                Some(word) => {
                    let word = word.to_string();
                    self.advance();
                    (PropertyKey::Named(word), None)
                }
                None => {
                    self.error_at_current(
                        ErrorCode::UNEXPECTED_TOKEN,
                        format!("expected property name, got '{other}'"),
                    );
                    return None;
                }
            },
        };

        if self.eat(&TokenKind::Colon) {
            let value = self.parse_assignment()?;
            let span = key_span.merge(value.span);
            return Some(ObjectMember::Property {
                key,
                value,
                shorthand: false,
                span,
            });
        }

        match shorthand_name {
            Some(name) if matches!(self.peek_kind(), TokenKind::Comma | TokenKind::RBrace) => {
                Some(ObjectMember::Property {
                    key,
                    value: Expr::new(ExprKind::Identifier(name), key_span),
                    shorthand: true,
                    span: key_span,
                })
            }
            _ => {
                if self.check(&TokenKind::LParen) {
                    self.error_at_current(
                        ErrorCode::UNEXPECTED_TOKEN,
                        "method definitions are not supported in object literals",
                    );
                } else {
                    self.expect(&TokenKind::Colon);
                }
                None
            }
        }
    }
}
