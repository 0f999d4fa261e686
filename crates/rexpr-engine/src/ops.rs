//! Operator semantics of the expression language.
//!
//! Conversions follow the host scripting language: loose truthiness,
//! numeric coercion of strings, string concatenation for `+` when either
//! side is a string or container, and 32-bit integer bitwise operators.

use std::cmp::Ordering;

use rexpr_types::ast::{BinaryOp, UnaryOp};

use crate::error::{EvalError, EvalResult};
use crate::value::{Key, ObjKind, Shape, Value};

// ══════════════════════════════════════════════════════════════════════════════
// Conversions
// ══════════════════════════════════════════════════════════════════════════════

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => !(*n == 0.0 || n.is_nan()),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => *n,
        Value::String(s) => string_to_number(s),
        Value::Object(obj) if obj.kind() == ObjKind::List => {
            string_to_number(&to_display_string(value))
        }
        Value::Expression(expr) => expr.value().map_or(f64::NAN, |v| to_number(&v)),
        _ => f64::NAN,
    }
}

fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    let radix = |prefix: &[&str], radix: u32| -> Option<f64> {
        let digits = prefix.iter().find_map(|p| t.strip_prefix(p))?;
        Some(
            u64::from_str_radix(digits, radix)
                .map(|n| n as f64)
                .unwrap_or(f64::NAN),
        )
    };
    if let Some(n) = radix(&["0x", "0X"], 16)
        .or_else(|| radix(&["0o", "0O"], 8))
        .or_else(|| radix(&["0b", "0B"], 2))
    {
        return n;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let numeric = t
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !numeric {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// Render a number the way the host language prints it.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    if n == 0.0 {
        return "0".into();
    }
    let abs = n.abs();
    if n.fract() == 0.0 && abs < 1e21 {
        return format!("{}", n as i128);
    }
    if (1e-6..1e21).contains(&abs) {
        return format!("{n}");
    }
    let formatted = format!("{n:e}");
    match formatted.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
        _ => formatted,
    }
}

/// String conversion used by templates, `+` concatenation and keys.
pub fn to_display_string(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".into(),
        Value::Null => "null".into(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(*n),
        Value::String(s) => s.to_string(),
        Value::Object(obj) => match obj.kind() {
            ObjKind::List => obj
                .values()
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        to_display_string(item)
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            ObjKind::Record | ObjKind::Map => "[object Object]".into(),
        },
        Value::Future(_) => "[object Promise]".into(),
        Value::Stream(_) => "[object Observable]".into(),
        Value::Function(f) => format!("function {}() {{ [native code] }}", f.name()),
        Value::Expression(expr) => expr
            .value()
            .map_or_else(|| "undefined".into(), |v| to_display_string(&v)),
    }
}

pub fn typeof_name(value: &Value) -> &'static str {
    match value {
        Value::Undefined => "undefined",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Function(_) => "function",
        Value::Null
        | Value::Object(_)
        | Value::Future(_)
        | Value::Stream(_)
        | Value::Expression(_) => "object",
    }
}

fn to_int32(value: &Value) -> i32 {
    to_uint32(value) as i32
}

fn to_uint32(value: &Value) -> u32 {
    let n = to_number(value);
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

/// Containers convert to their string form when compared with scalars.
fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Object(_) | Value::Future(_) | Value::Stream(_) | Value::Function(_) => {
            Value::string(to_display_string(value))
        }
        Value::Expression(expr) => expr.value().unwrap_or_default(),
        other => other.clone(),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Equality & Comparison
// ══════════════════════════════════════════════════════════════════════════════

/// `===`: like [`Value::same_value`] except `NaN` is unequal to itself.
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        _ => a.same_value(b),
    }
}

/// `==` with the host language's coercions.
pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (x, y) if x.is_nullish() || y.is_nullish() => x.is_nullish() && y.is_nullish(),
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            to_number(a) == to_number(b)
        }
        (Value::Bool(_), _) => loose_equals(&Value::Number(to_number(a)), b),
        (_, Value::Bool(_)) => loose_equals(a, &Value::Number(to_number(b))),
        (x, y) if x.shape() == Shape::Scalar && y.shape() == Shape::Scalar => strict_equals(x, y),
        (x, y) if x.shape() == Shape::Scalar || y.shape() == Shape::Scalar => {
            let (pa, pb) = (to_primitive(x), to_primitive(y));
            loose_equals(&pa, &pb)
        }
        _ => strict_equals(a, b),
    }
}

/// Relational ordering; `None` when either side is `NaN`.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    let (pa, pb) = (to_primitive(a), to_primitive(b));
    match (&pa, &pb) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => to_number(&pa).partial_cmp(&to_number(&pb)),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

pub fn unary(op: UnaryOp, operand: &Value) -> EvalResult<Value> {
    Ok(match op {
        UnaryOp::Neg => Value::Number(-to_number(operand)),
        UnaryOp::Plus => Value::Number(to_number(operand)),
        UnaryOp::Not => Value::Bool(!truthy(operand)),
        UnaryOp::BitNot => Value::Number(f64::from(!to_int32(operand))),
        UnaryOp::Typeof => Value::string(typeof_name(operand)),
        UnaryOp::Void | UnaryOp::Delete => {
            return Err(EvalError::Type(format!("'{op}' is not supported")))
        }
    })
}

pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    let num = |f: fn(f64, f64) -> f64| Value::Number(f(to_number(left), to_number(right)));
    let int = |f: fn(i32, i32) -> i32| Value::Number(f64::from(f(to_int32(left), to_int32(right))));
    let ord = |f: fn(Ordering) -> bool| Value::Bool(compare(left, right).is_some_and(f));
    let shift = to_uint32(right) & 31;

    Ok(match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => num(|a, b| a - b),
        BinaryOp::Mul => num(|a, b| a * b),
        BinaryOp::Div => num(|a, b| a / b),
        BinaryOp::Rem => num(|a, b| a % b),
        BinaryOp::Pow => num(power),
        BinaryOp::Shl => Value::Number(f64::from(to_int32(left).wrapping_shl(shift))),
        BinaryOp::Shr => Value::Number(f64::from(to_int32(left).wrapping_shr(shift))),
        BinaryOp::UShr => Value::Number(f64::from(to_uint32(left).wrapping_shr(shift))),
        BinaryOp::BitAnd => int(|a, b| a & b),
        BinaryOp::BitOr => int(|a, b| a | b),
        BinaryOp::BitXor => int(|a, b| a ^ b),
        BinaryOp::Eq => Value::Bool(loose_equals(left, right)),
        BinaryOp::NotEq => Value::Bool(!loose_equals(left, right)),
        BinaryOp::StrictEq => Value::Bool(strict_equals(left, right)),
        BinaryOp::StrictNotEq => Value::Bool(!strict_equals(left, right)),
        BinaryOp::Less => ord(|o| o == Ordering::Less),
        BinaryOp::Greater => ord(|o| o == Ordering::Greater),
        BinaryOp::LessEq => ord(|o| o != Ordering::Greater),
        BinaryOp::GreaterEq => ord(|o| o != Ordering::Less),
        BinaryOp::In => Value::Bool(has_property(left, right)?),
        BinaryOp::InstanceOf => {
            return Err(EvalError::Type("'instanceof' is not supported".into()))
        }
    })
}

fn add(left: &Value, right: &Value) -> Value {
    let (l, r) = (to_primitive(left), to_primitive(right));
    if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
        let mut s = to_display_string(&l);
        s.push_str(&to_display_string(&r));
        Value::string(s)
    } else {
        Value::Number(to_number(&l) + to_number(&r))
    }
}

fn power(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

/// `key in container`.
fn has_property(key: &Value, container: &Value) -> EvalResult<bool> {
    match container {
        Value::Object(obj) => Ok(obj.contains(&Key::from_value(key))),
        other => Err(EvalError::Type(format!(
            "cannot use 'in' to search for '{}' in {}",
            to_display_string(key),
            to_display_string(other)
        ))),
    }
}

/// Property read on a string: `length` and character indices.
pub fn string_member(s: &str, key: &Key) -> Value {
    match key {
        Key::Index(i) => s
            .chars()
            .nth(*i)
            .map_or(Value::Undefined, |c| Value::string(c.to_string())),
        k if k.is_length() => Value::Number(s.chars().count() as f64),
        _ => Value::Undefined,
    }
}
