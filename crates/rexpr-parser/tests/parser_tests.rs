//! Parser tests: precedence, associativity, member chains, calls, literals,
//! templates, error codes, the nesting limit and determinism.

use rexpr_lexer::Lexer;
use rexpr_parser::{ParseResult, Parser};
use rexpr_types::ast::*;
use rexpr_types::{ErrorCode, SourceText};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// Parse source and return the raw result (expression + errors).
fn parse(source: &str) -> ParseResult {
    let src = SourceText::new(source);
    let lex = Lexer::new(&src).lex();
    Parser::new(lex.tokens, &src).parse()
}

/// Parse source and return the expression, panicking on any error.
fn parse_ok(source: &str) -> Expr {
    match rexpr_parser::parse(source) {
        Ok(expr) => expr,
        Err(e) => panic!("unexpected parse error in {source:?}: {e}"),
    }
}

fn error_code(source: &str) -> ErrorCode {
    match rexpr_parser::parse(source) {
        Ok(expr) => panic!("expected an error for {source:?}, got {expr:?}"),
        Err(e) => e.code,
    }
}

/// Render an expression as a fully parenthesized string.
fn show(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Number(n) => number_key(*n),
        ExprKind::String(s) => format!("{s:?}"),
        ExprKind::Boolean(b) => b.to_string(),
        ExprKind::Null => "null".into(),
        ExprKind::Undefined => "undefined".into(),
        ExprKind::Identifier(name) => name.clone(),
        ExprKind::This => "this".into(),
        ExprKind::Template { quasis, expressions } => {
            let mut out = String::from("`");
            for (i, quasi) in quasis.iter().enumerate() {
                out.push_str(quasi);
                if let Some(e) = expressions.get(i) {
                    out.push_str(&format!("${{{}}}", show(e)));
                }
            }
            out.push('`');
            out
        }
        ExprKind::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| match item {
                    ArrayElement::Item(e) => show(e),
                    ArrayElement::Spread(e) => format!("...{}", show(e)),
                    ArrayElement::Hole(_) => "<hole>".into(),
                })
                .collect();
            format!("[{}]", parts.join(", "))
        }
        ExprKind::Object(members) => {
            let parts: Vec<String> = members
                .iter()
                .map(|m| match m {
                    ObjectMember::Property { key, value, .. } => match key {
                        PropertyKey::Named(name) => format!("{name}: {}", show(value)),
                        PropertyKey::Computed(k) => format!("[{}]: {}", show(k), show(value)),
                    },
                    ObjectMember::Spread(e) => format!("...{}", show(e)),
                })
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        ExprKind::Member {
            object,
            property,
            optional,
        } => {
            let dot = if *optional { "?." } else { "." };
            match property {
                MemberProperty::Named(name) => format!("{}{dot}{name}", show(object)),
                MemberProperty::Computed(p) => {
                    let dot = if *optional { "?." } else { "" };
                    format!("{}{dot}[{}]", show(object), show(p))
                }
            }
        }
        ExprKind::Call {
            callee,
            args,
            optional,
        } => {
            let dot = if *optional { "?." } else { "" };
            format!("{}{dot}({})", show(callee), show_args(args))
        }
        ExprKind::New { callee, args } => format!("new {}({})", show(callee), show_args(args)),
        ExprKind::Unary { op, operand } => format!("({op} {})", show(operand)),
        ExprKind::Update { op, prefix, target } => {
            let sym = match op {
                UpdateOp::Increment => "++",
                UpdateOp::Decrement => "--",
            };
            if *prefix {
                format!("({sym}{})", show(target))
            } else {
                format!("({}{sym})", show(target))
            }
        }
        ExprKind::Binary { op, left, right } => {
            format!("({} {op} {})", show(left), show(right))
        }
        ExprKind::Logical { op, left, right } => {
            format!("({} {op} {})", show(left), show(right))
        }
        ExprKind::Conditional {
            test,
            consequent,
            alternate,
        } => format!(
            "({} ? {} : {})",
            show(test),
            show(consequent),
            show(alternate)
        ),
        ExprKind::Assign { op, target, value } => {
            format!("({} {op} {})", show(target), show(value))
        }
        ExprKind::Sequence(items) => {
            let parts: Vec<String> = items.iter().map(show).collect();
            format!("({})", parts.join(", "))
        }
    }
}

fn show_args(args: &[Argument]) -> String {
    args.iter()
        .map(|a| match a {
            Argument::Item(e) => show(e),
            Argument::Spread(e) => format!("...{}", show(e)),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn shown(source: &str) -> String {
    show(&parse_ok(source))
}

// ─────────────────────────────────────────────────────────────────────
// Precedence & associativity
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_multiplicative_binds_tighter_than_additive() {
    assert_eq!(shown("a + b * c - d"), "((a + (b * c)) - d)");
}

#[test]
fn test_exponent_is_right_associative() {
    assert_eq!(shown("a ** b ** c"), "(a ** (b ** c))");
}

#[test]
fn test_unary_binds_tighter_than_exponent_base() {
    assert_eq!(shown("-a * b"), "((- a) * b)");
    assert_eq!(shown("!a && b"), "((! a) && b)");
}

#[test]
fn test_logical_precedence() {
    assert_eq!(shown("a || b && c"), "(a || (b && c))");
    assert_eq!(shown("a ?? b || c"), "(a ?? (b || c))");
}

#[test]
fn test_comparison_and_equality() {
    assert_eq!(shown("a < b == c >= d"), "((a < b) == (c >= d))");
    assert_eq!(shown("'k' in o === true"), "((\"k\" in o) === true)");
}

#[test]
fn test_bitwise_and_shift_precedence() {
    assert_eq!(shown("a | b ^ c & d"), "(a | (b ^ (c & d)))");
    assert_eq!(shown("a << 1 + 2"), "(a << (1 + 2))");
    assert_eq!(shown("a >>> b >> c"), "((a >>> b) >> c)");
}

#[test]
fn test_conditional_is_right_associative() {
    assert_eq!(shown("a ? b : c ? d : e"), "(a ? b : (c ? d : e))");
    assert_eq!(shown("a > b ? c : d"), "((a > b) ? c : d)");
}

#[test]
fn test_sequence_is_lowest() {
    assert_eq!(shown("a, b ? c : d"), "(a, (b ? c : d))");
}

#[test]
fn test_parentheses_override_precedence() {
    assert_eq!(shown("(a + b) * c"), "((a + b) * c)");
}

#[test]
fn test_typeof_and_void() {
    assert_eq!(shown("typeof a === 'string'"), "((typeof a) === \"string\")");
    assert_eq!(shown("void 0"), "(void 0)");
}

// ─────────────────────────────────────────────────────────────────────
// Members, calls, new
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_member_chain() {
    assert_eq!(shown("a.b[c].d"), "a.b[c].d");
}

#[test]
fn test_keyword_property_names() {
    assert_eq!(shown("a.new.class.in"), "a.new.class.in");
}

#[test]
fn test_optional_chaining() {
    assert_eq!(shown("a?.b?.[c]?.(d)"), "a?.b?.[c]?.(d)");
    let expr = parse_ok("a?.b");
    match expr.kind {
        ExprKind::Member { optional, .. } => assert!(optional),
        other => panic!("expected member, got {other:?}"),
    }
}

#[test]
fn test_calls_with_spread_arguments() {
    assert_eq!(shown("f(a, ...b)(c)"), "f(a, ...b)(c)");
    assert_eq!(shown("obj.method(1,)"), "obj.method(1)");
}

#[test]
fn test_new_expression() {
    assert_eq!(shown("new Foo(1)"), "new Foo(1)");
    assert_eq!(shown("new a.B"), "new a.B()");
    assert_eq!(shown("new Foo(1).bar"), "new Foo(1).bar");
}

// ─────────────────────────────────────────────────────────────────────
// Literals
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_array_literal_with_holes_and_spread() {
    assert_eq!(shown("[1, , ...a, b]"), "[1, <hole>, ...a, b]");
    assert_eq!(shown("[]"), "[]");
}

#[test]
fn test_object_literal_forms() {
    assert_eq!(
        shown("{a: 1, 'b c': 2, 3: x, [k]: y, z, ...rest, if: 4}"),
        "{a: 1, b c: 2, 3: x, [k]: y, z: z, ...rest, if: 4}"
    );
}

#[test]
fn test_shorthand_property_is_flagged() {
    match parse_ok("{z}").kind {
        ExprKind::Object(members) => match &members[0] {
            ObjectMember::Property { shorthand, .. } => assert!(*shorthand),
            other => panic!("expected property, got {other:?}"),
        },
        other => panic!("expected object, got {other:?}"),
    }
}

#[test]
fn test_template_literal() {
    assert_eq!(shown("`a${x + 1}b${y}`"), "`a${(x + 1)}b${y}`");
    match parse_ok("`plain`").kind {
        ExprKind::Template { quasis, expressions } => {
            assert_eq!(quasis, vec!["plain".to_string()]);
            assert!(expressions.is_empty());
        }
        other => panic!("expected template, got {other:?}"),
    }
}

#[test]
fn test_literal_keywords() {
    assert_eq!(shown("[true, false, null, undefined, this]"), "[true, false, null, undefined, this]");
}

// ─────────────────────────────────────────────────────────────────────
// Assignment-shaped expressions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_assignment_parses_but_is_right_associative() {
    assert_eq!(shown("a = b = c"), "(a = (b = c))");
    assert_eq!(shown("a.b += 1"), "(a.b += 1)");
    assert_eq!(shown("a ??= b"), "(a ??= b)");
}

#[test]
fn test_update_expressions() {
    assert_eq!(shown("a++"), "(a++)");
    assert_eq!(shown("--a.b"), "(--a.b)");
}

// ─────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_invalid_assignment_target() {
    assert_eq!(error_code("1 = a"), ErrorCode::INVALID_ASSIGNMENT_TARGET);
    assert_eq!(error_code("(a + b)++"), ErrorCode::INVALID_ASSIGNMENT_TARGET);
}

#[test]
fn test_arrow_functions_rejected() {
    assert_eq!(error_code("x => x"), ErrorCode::ARROW_FUNCTION);
    assert_eq!(error_code("() => 1"), ErrorCode::ARROW_FUNCTION);
    assert_eq!(error_code("(a) => a"), ErrorCode::ARROW_FUNCTION);
}

#[test]
fn test_reserved_word_rejected() {
    let err = rexpr_parser::parse("let").expect_err("reserved");
    assert_eq!(err.code, ErrorCode::RESERVED_WORD);
    assert!(err.suggestion.is_some());
}

#[test]
fn test_trailing_tokens_rejected() {
    assert_eq!(error_code("a b"), ErrorCode::UNEXPECTED_TOKEN);
}

#[test]
fn test_empty_expression_rejected() {
    assert_eq!(error_code(""), ErrorCode::UNEXPECTED_TOKEN);
    assert_eq!(error_code("   "), ErrorCode::UNEXPECTED_TOKEN);
}

#[test]
fn test_unclosed_bracket() {
    assert_eq!(error_code("a[1"), ErrorCode::UNEXPECTED_TOKEN);
    assert_eq!(error_code("f(1, 2"), ErrorCode::UNEXPECTED_TOKEN);
}

#[test]
fn test_lexer_error_surfaces() {
    assert_eq!(error_code("'open"), ErrorCode::UNTERMINATED_LITERAL);
}

#[test]
fn test_error_position_is_reported() {
    let err = rexpr_parser::parse("a +\n  * b").expect_err("syntax error");
    assert_eq!(err.line, 2);
    assert_eq!(err.column, 3);
}

#[test]
fn test_nesting_limit() {
    let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
    let result = parse(&deep);
    assert!(result.expr.is_none());
    assert!(result
        .errors
        .errors
        .iter()
        .any(|e| e.code == ErrorCode::NESTING_TOO_DEEP));
}

#[test]
fn test_moderate_nesting_is_fine() {
    let nested = format!("{}1{}", "(".repeat(20), ")".repeat(20));
    assert_eq!(shown(&nested), "1");
}

// ─────────────────────────────────────────────────────────────────────
// Spans & determinism
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_spans_cover_whole_expression() {
    let expr = parse_ok("a.b + c");
    assert_eq!(expr.span.start, 0);
    assert_eq!(expr.span.end, 7);
}

#[test]
fn test_parser_determinism_100_iterations() {
    let source = "a.b[c] ?? `t${x + 1}` ? f(...xs, {k: [1, , 2]}) : -y ** 2";
    let first = parse_ok(source);
    for i in 0..100 {
        assert_eq!(first, parse_ok(source), "Determinism failure at iteration {i}");
    }
}
