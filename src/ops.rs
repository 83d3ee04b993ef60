//! Operator tables: the two registries (binary, unary) mapping operator text
//! to precedence, evaluated-operand policy, and a native evaluation function.
//!
//! Tables are loaded once per runtime by [`Operators::load_standard`] and
//! shared by every nested scope; they are never copied per scope.  Lookup is
//! case-insensitive via normalized-uppercase keys, and token matching uses
//! maximal munch: among all registered operators that prefix the input, the
//! longest wins, so `<=` beats `<` and `||` beats `|`.
//!
//! Native functions are pure over [`Value`] and report failure through
//! [`OpFail`]; the evaluator's reduction step rewraps every failure into the
//! single uniform "operator cannot be applied to types X and Y" error.

use std::collections::HashMap;

use log::info;

use crate::value::Value;

/// Case-insensitive canonical key used by every name-keyed registry in the
/// crate.  Normalization happens once at registration and lookup, never in
/// hot-path comparisons.
pub(crate) fn canon(name: &str) -> String {
    name.to_ascii_uppercase()
}

/// Outcome of a native operator body.  The reduction step owns the rewrap
/// into user-facing errors; natives never construct those themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpFail {
    /// The operand types are outside the operator's domain.
    Types,
    /// Numeric division or modulo with a zero divisor.
    DivisionByZero,
}

/// Which operand side(s) must be forced to a concrete value before the
/// native runs.  `LeftOnly` enables short-circuit AND/OR; `Neither` is used
/// by member access, whose left side is a member context, not a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMask {
    Both,
    LeftOnly,
    Neither,
}

/// Side a unary operator's operand sits on.  All standard unaries are
/// prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandSide {
    Right,
    Left,
}

pub type BinaryNative = fn(&Value, &Value) -> std::result::Result<Value, OpFail>;
pub type UnaryNative = fn(&Value) -> std::result::Result<Value, OpFail>;

/// How the reduction step drives a binary operator.
#[derive(Debug, Clone, Copy)]
pub enum BinaryKind {
    /// Both masked sides are evaluated, then the native runs.
    Eager(BinaryNative),
    /// Logical AND: right side evaluated only when the left is truthy.
    And,
    /// Logical OR: right side evaluated only when the left is falsy.
    Or,
    /// Member access: left is an unevaluated member context.
    Member,
}

/// Immutable binary operator descriptor.  Lower precedence binds tighter.
#[derive(Debug, Clone)]
pub struct BinaryOp {
    pub text: String,
    pub precedence: u8,
    pub mask: EvalMask,
    pub kind: BinaryKind,
}

#[derive(Debug, Clone, Copy)]
pub enum UnaryKind {
    Eager(UnaryNative),
    /// `NEW Class()` — instantiates a class prototype.
    Instantiate,
}

/// Immutable unary operator descriptor.
#[derive(Debug, Clone)]
pub struct UnaryOp {
    pub text: String,
    pub side: OperandSide,
    pub kind: UnaryKind,
}

/// The two operator registries, owned by the runtime alongside the root
/// scope.
#[derive(Debug, Clone, Default)]
pub struct Operators {
    binary: HashMap<String, BinaryOp>,
    unary: HashMap<String, UnaryOp>,
}

impl Operators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate both tables with the standard dialect operators.
    pub fn load_standard() -> Self {
        let mut ops = Self::new();

        // Binary ladder, tightest first.
        ops.add_binary(".", 1, EvalMask::Neither, BinaryKind::Member);
        ops.add_binary("*", 2, EvalMask::Both, BinaryKind::Eager(native_mul));
        ops.add_binary("/", 2, EvalMask::Both, BinaryKind::Eager(native_div));
        ops.add_binary("MOD", 2, EvalMask::Both, BinaryKind::Eager(native_mod));
        ops.add_binary("+", 3, EvalMask::Both, BinaryKind::Eager(native_add));
        ops.add_binary("-", 3, EvalMask::Both, BinaryKind::Eager(native_sub));
        ops.add_binary("<<", 4, EvalMask::Both, BinaryKind::Eager(native_shl));
        ops.add_binary(">>", 4, EvalMask::Both, BinaryKind::Eager(native_shr));
        ops.add_binary("<", 5, EvalMask::Both, BinaryKind::Eager(native_lt));
        ops.add_binary("<=", 5, EvalMask::Both, BinaryKind::Eager(native_le));
        ops.add_binary("=<", 5, EvalMask::Both, BinaryKind::Eager(native_le));
        ops.add_binary(">", 5, EvalMask::Both, BinaryKind::Eager(native_gt));
        ops.add_binary(">=", 5, EvalMask::Both, BinaryKind::Eager(native_ge));
        ops.add_binary("=>", 5, EvalMask::Both, BinaryKind::Eager(native_ge));
        ops.add_binary("=", 6, EvalMask::Both, BinaryKind::Eager(native_eq));
        ops.add_binary("==", 6, EvalMask::Both, BinaryKind::Eager(native_eq));
        ops.add_binary("~=", 6, EvalMask::Both, BinaryKind::Eager(native_ne));
        ops.add_binary("<>", 6, EvalMask::Both, BinaryKind::Eager(native_ne));
        ops.add_binary("!=", 6, EvalMask::Both, BinaryKind::Eager(native_ne));
        ops.add_binary("&", 7, EvalMask::Both, BinaryKind::Eager(native_band));
        ops.add_binary("^", 8, EvalMask::Both, BinaryKind::Eager(native_bxor));
        ops.add_binary("|", 9, EvalMask::Both, BinaryKind::Eager(native_bor));
        ops.add_binary("AND", 10, EvalMask::LeftOnly, BinaryKind::And);
        ops.add_binary("&&", 10, EvalMask::LeftOnly, BinaryKind::And);
        ops.add_binary("OR", 11, EvalMask::LeftOnly, BinaryKind::Or);
        ops.add_binary("||", 11, EvalMask::LeftOnly, BinaryKind::Or);

        ops.add_unary("+", OperandSide::Right, UnaryKind::Eager(native_identity));
        ops.add_unary("-", OperandSide::Right, UnaryKind::Eager(native_neg));
        ops.add_unary("NOT", OperandSide::Right, UnaryKind::Eager(native_not));
        ops.add_unary("~", OperandSide::Right, UnaryKind::Eager(native_bnot));
        ops.add_unary("NEW", OperandSide::Right, UnaryKind::Instantiate);

        info!(
            "Loaded standard operators: {} binary, {} unary",
            ops.binary.len(),
            ops.unary.len()
        );

        ops
    }

    pub fn add_binary(&mut self, text: &str, precedence: u8, mask: EvalMask, kind: BinaryKind) {
        self.binary.insert(
            canon(text),
            BinaryOp {
                text: text.to_string(),
                precedence,
                mask,
                kind,
            },
        );
    }

    pub fn add_unary(&mut self, text: &str, side: OperandSide, kind: UnaryKind) {
        self.unary.insert(
            canon(text),
            UnaryOp {
                text: text.to_string(),
                side,
                kind,
            },
        );
    }

    pub fn remove_binary(&mut self, text: &str) -> Option<BinaryOp> {
        self.binary.remove(&canon(text))
    }

    pub fn remove_unary(&mut self, text: &str) -> Option<UnaryOp> {
        self.unary.remove(&canon(text))
    }

    pub fn get_binary(&self, text: &str) -> Option<&BinaryOp> {
        self.binary.get(&canon(text))
    }

    pub fn get_unary(&self, text: &str) -> Option<&UnaryOp> {
        self.unary.get(&canon(text))
    }

    pub fn binary_ops(&self) -> impl Iterator<Item = &BinaryOp> {
        self.binary.values()
    }

    pub fn unary_ops(&self) -> impl Iterator<Item = &UnaryOp> {
        self.unary.values()
    }

    /// Maximal-munch match of a binary operator against the head of `tail`.
    /// Returns the matched byte length and the descriptor.
    pub fn match_binary(&self, tail: &str) -> Option<(usize, BinaryOp)> {
        longest_prefix(self.binary.values().map(|op| (&op.text, op)), tail)
            .map(|(len, op)| (len, op.clone()))
    }

    /// Maximal-munch match of a unary operator against the head of `tail`.
    pub fn match_unary(&self, tail: &str) -> Option<(usize, UnaryOp)> {
        longest_prefix(self.unary.values().map(|op| (&op.text, op)), tail)
            .map(|(len, op)| (len, op.clone()))
    }
}

/// Longest case-insensitive prefix match.  Alphabetic operators (MOD, AND,
/// NOT, NEW, ...) additionally require a word boundary so `MODE$` never
/// matches `MOD`.
fn longest_prefix<'a, T>(
    candidates: impl Iterator<Item = (&'a String, &'a T)>,
    tail: &str,
) -> Option<(usize, &'a T)> {
    let mut best: Option<(usize, &'a T)> = None;

    for (text, item) in candidates {
        let len = text.len();
        if tail.len() < len || !tail.is_char_boundary(len) {
            continue;
        }
        if !tail[..len].eq_ignore_ascii_case(text) {
            continue;
        }
        if text.chars().next_back().is_some_and(|c| c.is_ascii_alphabetic()) {
            let boundary = tail[len..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_ascii_alphanumeric() && c != '_' && c != '$');
            if !boundary {
                continue;
            }
        }
        if best.map_or(true, |(blen, _)| len > blen) {
            best = Some((len, item));
        }
    }

    best
}

// ───────────────────────────── binary natives ───────────────────────────

fn both_numbers(lhs: &Value, rhs: &Value) -> std::result::Result<(f64, f64), OpFail> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
        _ => Err(OpFail::Types),
    }
}

/// `a + b`: numeric addition, or string concatenation when at least one
/// operand is a string.
fn native_add(lhs: &Value, rhs: &Value) -> std::result::Result<Value, OpFail> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Value::Str(_), _) | (_, Value::Str(_)) => Ok(Value::Str(format!("{}{}", lhs, rhs))),
        _ => Err(OpFail::Types),
    }
}

fn native_sub(lhs: &Value, rhs: &Value) -> std::result::Result<Value, OpFail> {
    let (a, b) = both_numbers(lhs, rhs)?;
    Ok(Value::Number(a - b))
}

fn native_mul(lhs: &Value, rhs: &Value) -> std::result::Result<Value, OpFail> {
    let (a, b) = both_numbers(lhs, rhs)?;
    Ok(Value::Number(a * b))
}

fn native_div(lhs: &Value, rhs: &Value) -> std::result::Result<Value, OpFail> {
    let (a, b) = both_numbers(lhs, rhs)?;
    if b == 0.0 {
        return Err(OpFail::DivisionByZero);
    }
    Ok(Value::Number(a / b))
}

fn native_mod(lhs: &Value, rhs: &Value) -> std::result::Result<Value, OpFail> {
    let (a, b) = both_numbers(lhs, rhs)?;
    if b == 0.0 {
        return Err(OpFail::DivisionByZero);
    }
    Ok(Value::Number(a % b))
}

fn as_integer(v: &Value) -> std::result::Result<i64, OpFail> {
    match v {
        Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Ok(*n as i64),
        _ => Err(OpFail::Types),
    }
}

fn native_shl(lhs: &Value, rhs: &Value) -> std::result::Result<Value, OpFail> {
    let (a, b) = (as_integer(lhs)?, as_integer(rhs)?);
    Ok(Value::Number(((a as u64) << (b as u32 & 63)) as i64 as f64))
}

fn native_shr(lhs: &Value, rhs: &Value) -> std::result::Result<Value, OpFail> {
    let (a, b) = (as_integer(lhs)?, as_integer(rhs)?);
    Ok(Value::Number((a >> (b as u32 & 63)) as f64))
}

fn native_band(lhs: &Value, rhs: &Value) -> std::result::Result<Value, OpFail> {
    Ok(Value::Number((as_integer(lhs)? & as_integer(rhs)?) as f64))
}

fn native_bxor(lhs: &Value, rhs: &Value) -> std::result::Result<Value, OpFail> {
    Ok(Value::Number((as_integer(lhs)? ^ as_integer(rhs)?) as f64))
}

fn native_bor(lhs: &Value, rhs: &Value) -> std::result::Result<Value, OpFail> {
    Ok(Value::Number((as_integer(lhs)? | as_integer(rhs)?) as f64))
}

/// Structural equality: same-variant comparison, `null = null` is true,
/// cross-type comparisons are false.
pub(crate) fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Instance(a), Value::Instance(b)) => a == b,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}

fn native_eq(lhs: &Value, rhs: &Value) -> std::result::Result<Value, OpFail> {
    Ok(Value::Bool(values_equal(lhs, rhs)))
}

fn native_ne(lhs: &Value, rhs: &Value) -> std::result::Result<Value, OpFail> {
    Ok(Value::Bool(!values_equal(lhs, rhs)))
}

fn compare(lhs: &Value, rhs: &Value) -> std::result::Result<std::cmp::Ordering, OpFail> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => {
            a.partial_cmp(b).ok_or(OpFail::Types)
        }
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        _ => Err(OpFail::Types),
    }
}

fn native_lt(lhs: &Value, rhs: &Value) -> std::result::Result<Value, OpFail> {
    Ok(Value::Bool(compare(lhs, rhs)?.is_lt()))
}

fn native_le(lhs: &Value, rhs: &Value) -> std::result::Result<Value, OpFail> {
    Ok(Value::Bool(compare(lhs, rhs)?.is_le()))
}

fn native_gt(lhs: &Value, rhs: &Value) -> std::result::Result<Value, OpFail> {
    Ok(Value::Bool(compare(lhs, rhs)?.is_gt()))
}

fn native_ge(lhs: &Value, rhs: &Value) -> std::result::Result<Value, OpFail> {
    Ok(Value::Bool(compare(lhs, rhs)?.is_ge()))
}

// ───────────────────────────── unary natives ────────────────────────────

fn native_identity(v: &Value) -> std::result::Result<Value, OpFail> {
    match v {
        Value::Number(n) => Ok(Value::Number(*n)),
        _ => Err(OpFail::Types),
    }
}

fn native_neg(v: &Value) -> std::result::Result<Value, OpFail> {
    match v {
        Value::Number(n) => Ok(Value::Number(-n)),
        _ => Err(OpFail::Types),
    }
}

fn native_not(v: &Value) -> std::result::Result<Value, OpFail> {
    Ok(Value::Bool(!v.is_truthy()))
}

fn native_bnot(v: &Value) -> std::result::Result<Value, OpFail> {
    Ok(Value::Number(!as_integer(v)? as f64))
}
