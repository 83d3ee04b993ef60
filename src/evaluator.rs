//! The expression evaluation engine.
//!
//! An [`Evaluator`] owns one expression's source text and lazily tokenizes
//! it into an operand/operator slot list (no AST is ever built).  Reduction
//! happens in two passes over that list: a sweep resolving unary operators
//! into their neighboring operand, then a precedence-ordered pass popping
//! binary operators from a priority queue — lowest precedence number first,
//! ties by original position so equal-precedence operators associate
//! left-to-right.
//!
//! Parenthesized sub-expressions, variable references, and function calls
//! are held as unevaluated *thunks* inside the list and only forced when a
//! reduction step touches their slot; this is what makes short-circuit
//! AND/OR possible and parenthesization correct without an AST.
//!
//! The slot list is a growable vector with tombstone removal (`Option`
//! slots): replacing a reduced operator's value and deleting its consumed
//! neighbors are both O(1).
//!
//! The parse is memoized; [`Evaluator::invalidate`] clears the memo so loop
//! conditions re-read their variables each iteration.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use log::debug;

use crate::error::{BasicError, Result};
use crate::exec::Runtime;
use crate::ops::{BinaryKind, BinaryOp, OpFail, OperandSide, UnaryKind, UnaryOp};
use crate::scanner::Scanner;
use crate::scope::ScopeId;
use crate::token::Token;
use crate::value::Value;

/// An operand in the slot list: either a concrete value or a deferred
/// computation forced during reduction.
#[derive(Debug, Clone)]
enum Term {
    Value(Value),
    Group(Box<Evaluator>),
    Variable { name: String, indices: Vec<Evaluator> },
    Call { name: String, args: Vec<Evaluator> },
    Macro(String),
}

impl Term {
    /// Short rendering for structural error messages.
    fn describe(&self) -> String {
        match self {
            Term::Value(v) => v.to_string(),
            Term::Group(e) => format!("({})", e.source),
            Term::Variable { name, .. } => format!("{}$", name),
            Term::Call { name, .. } => format!("{}(...)", name),
            Term::Macro(name) => format!("@{}", name),
        }
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Term(Term),
    Unary(UnaryOp),
    Binary(BinaryOp),
}

/// Re-entrant evaluator for one expression.
#[derive(Debug, Clone)]
pub struct Evaluator {
    source: String,
    line: usize,
    parsed: Option<Vec<Slot>>,
}

impl Evaluator {
    pub fn new(source: impl Into<String>, line: usize) -> Self {
        Self {
            source: source.into(),
            line,
            parsed: None,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// Replace the expression text, discarding the memoized parse.
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
        self.parsed = None;
    }

    /// Discard the memoized parse so the next evaluation re-reads the
    /// source.  Loop conditions call this every iteration.
    pub fn invalidate(&mut self) {
        self.parsed = None;
    }

    /// Evaluate the expression against the given scope, reducing to a
    /// single primitive value.
    pub fn evaluate(&mut self, rt: &mut Runtime, scope: ScopeId) -> Result<Value> {
        if self.parsed.is_none() {
            self.parsed = Some(self.parse(rt, scope)?);
        }

        let mut slots: Vec<Option<Slot>> = self
            .parsed
            .as_ref()
            .expect("parse populated above")
            .iter()
            .cloned()
            .map(Some)
            .collect();

        self.reduce_unary(rt, scope, &mut slots)?;
        self.check_alternation(&slots)?;
        self.reduce_binary(rt, scope, &mut slots)?;

        let term = match slots.into_iter().flatten().next() {
            Some(Slot::Term(term)) => term,
            _ => return Err(BasicError::parse(self.line, "Empty expression")),
        };

        let value = resolve_term(rt, scope, term, self.line)?;
        Ok(value.narrowed())
    }

    // ─────────────────────────── tokenization ───────────────────────────

    /// Lex the whole expression into the slot list.  Needs the scope only
    /// to improve the diagnostic for unrecognized text that names a known
    /// function.
    fn parse(&self, rt: &Runtime, scope: ScopeId) -> Result<Vec<Slot>> {
        debug!("Parsing expression: {}", self.source);

        let mut scanner = Scanner::new(&self.source, self.line);
        let mut slots: Vec<Slot> = Vec::new();

        loop {
            let unary_legal = matches!(
                slots.last(),
                None | Some(Slot::Binary(_)) | Some(Slot::Unary(_))
            );

            let token = match scanner.next_token(&rt.ops, unary_legal) {
                Ok(Some(token)) => token,
                Ok(None) => break,
                Err(err) => {
                    // A known function name in unmatchable text means the
                    // call itself is malformed, not the whole expression.
                    if let Some(name) = scanner.peek_identifier() {
                        if rt.scopes.is_callable(scope, &name) {
                            return Err(BasicError::parse(
                                self.line,
                                format!("Malformed call to function '{}'", name),
                            ));
                        }
                    }
                    return Err(err);
                }
            };

            slots.push(self.slot_from(token));
        }

        if slots.is_empty() {
            return Err(BasicError::parse(self.line, "Empty expression"));
        }

        Ok(slots)
    }

    fn slot_from(&self, token: Token) -> Slot {
        match token {
            Token::Number(n) => Slot::Term(Term::Value(Value::Number(n))),
            Token::Bool(b) => Slot::Term(Term::Value(Value::Bool(b))),
            Token::Str(s) => Slot::Term(Term::Value(Value::Str(s))),
            Token::Null => Slot::Term(Term::Value(Value::Null)),
            Token::Group(inner) => {
                Slot::Term(Term::Group(Box::new(Evaluator::new(inner, self.line))))
            }
            Token::Variable { name, indices } => Slot::Term(Term::Variable {
                name,
                indices: indices
                    .into_iter()
                    .map(|text| Evaluator::new(text, self.line))
                    .collect(),
            }),
            Token::Call { name, args } => Slot::Term(Term::Call {
                name,
                args: args
                    .into_iter()
                    .map(|text| Evaluator::new(text, self.line))
                    .collect(),
            }),
            Token::Macro(name) => Slot::Term(Term::Macro(name)),
            Token::Unary(op) => Slot::Unary(op),
            Token::Binary(op) => Slot::Binary(op),
        }
    }

    // ───────────────────────────── reduction ────────────────────────────

    /// Resolve every unary operator into its designated-side neighbor.
    /// Prefix operators are processed right-to-left so chains such as
    /// `NOT NOT x$` bind innermost-first; postfix-side operators run in
    /// source order.
    fn reduce_unary(
        &self,
        rt: &mut Runtime,
        scope: ScopeId,
        slots: &mut [Option<Slot>],
    ) -> Result<()> {
        let unary_at: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, Some(Slot::Unary(_))))
            .map(|(i, _)| i)
            .collect();

        for &index in unary_at.iter().rev() {
            let Some(Slot::Unary(op)) = slots[index].take() else {
                continue;
            };

            let neighbor = match op.side {
                OperandSide::Right => next_live(slots, index),
                OperandSide::Left => prev_live(slots, index),
            };
            let Some(n) = neighbor else {
                return Err(BasicError::DanglingOperator {
                    op: op.text,
                    line: self.line,
                });
            };

            let Some(Slot::Term(term)) = slots[n].take() else {
                return Err(BasicError::DanglingOperator {
                    op: op.text,
                    line: self.line,
                });
            };

            let result = match op.kind {
                UnaryKind::Eager(native) => {
                    let value = resolve_term(rt, scope, term, self.line)?;
                    native(&value).map_err(|fail| {
                        self.rewrap(fail, &op.text, value.type_name(), "nothing")
                    })?
                }
                UnaryKind::Instantiate => self.instantiate(rt, scope, term)?,
            };

            debug!("Unary {} reduced to {}", op.text, result);
            slots[index] = Some(Slot::Term(Term::Value(result)));
        }

        Ok(())
    }

    /// `NEW Class()` — the operand must be a call-shaped token naming the
    /// class; constructors are field initializers and take no arguments.
    fn instantiate(&self, rt: &mut Runtime, scope: ScopeId, term: Term) -> Result<Value> {
        match term {
            Term::Call { name, args } => {
                if !args.is_empty() {
                    return Err(BasicError::ArgumentCount {
                        name,
                        expected: 0,
                        got: args.len(),
                    });
                }
                rt.instantiate(scope, &name)
            }
            other => Err(BasicError::parse(
                self.line,
                format!("NEW expects a class constructor, found '{}'", other.describe()),
            )),
        }
    }

    /// After the unary pass the live slots must alternate operand,
    /// operator, operand, ... starting and ending on an operand.
    fn check_alternation(&self, slots: &[Option<Slot>]) -> Result<()> {
        let live: Vec<&Slot> = slots.iter().flatten().collect();

        let mut previous: Option<&Slot> = None;
        for &slot in &live {
            match (previous, slot) {
                (Some(Slot::Term(a)), Slot::Term(b)) => {
                    return Err(BasicError::MissingBinaryOperator {
                        left: a.describe(),
                        right: b.describe(),
                        line: self.line,
                    });
                }
                (None, Slot::Binary(op)) | (Some(Slot::Binary(_)), Slot::Binary(op)) => {
                    return Err(BasicError::parse(
                        self.line,
                        format!("Binary operator '{}' is missing its left operand", op.text),
                    ));
                }
                _ => {}
            }
            previous = Some(slot);
        }

        if let Some(Slot::Binary(op)) = live.last() {
            return Err(BasicError::DanglingOperator {
                op: op.text.clone(),
                line: self.line,
            });
        }

        Ok(())
    }

    /// Pop binary operators in strict precedence order, reducing in place.
    fn reduce_binary(
        &self,
        rt: &mut Runtime,
        scope: ScopeId,
        slots: &mut [Option<Slot>],
    ) -> Result<()> {
        let mut queue: BinaryHeap<Reverse<(u8, usize)>> = slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                Some(Slot::Binary(op)) => Some(Reverse((op.precedence, i))),
                _ => None,
            })
            .collect();

        while let Some(Reverse((_, index))) = queue.pop() {
            let Some(Slot::Binary(op)) = slots[index].take() else {
                continue;
            };

            let left_at = prev_live(slots, index).expect("alternation verified");
            let right_at = next_live(slots, index).expect("alternation verified");

            let Some(Slot::Term(left)) = slots[left_at].take() else {
                unreachable!("alternation verified");
            };
            let Some(Slot::Term(right)) = slots[right_at].take() else {
                unreachable!("alternation verified");
            };

            let result = self.apply_binary(rt, scope, &op, left, right)?;

            debug!("Binary {} reduced to {}", op.text, result);
            slots[index] = Some(Slot::Term(Term::Value(result)));
        }

        Ok(())
    }

    /// The single site where native operator failures are caught and
    /// rewritten; short-circuit logic also lives here, per the descriptor's
    /// evaluated-operand policy.
    fn apply_binary(
        &self,
        rt: &mut Runtime,
        scope: ScopeId,
        op: &BinaryOp,
        left: Term,
        right: Term,
    ) -> Result<Value> {
        match op.kind {
            BinaryKind::Eager(native) => {
                let lhs = resolve_term(rt, scope, left, self.line)?;
                let rhs = resolve_term(rt, scope, right, self.line)?;
                native(&lhs, &rhs)
                    .map_err(|fail| self.rewrap(fail, &op.text, lhs.type_name(), rhs.type_name()))
            }

            // Short-circuit: the right thunk stays unforced when the left
            // operand already decides the result.
            BinaryKind::And => {
                let lhs = resolve_term(rt, scope, left, self.line)?;
                if !lhs.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                let rhs = resolve_term(rt, scope, right, self.line)?;
                Ok(Value::Bool(rhs.is_truthy()))
            }

            BinaryKind::Or => {
                let lhs = resolve_term(rt, scope, left, self.line)?;
                if lhs.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                let rhs = resolve_term(rt, scope, right, self.line)?;
                Ok(Value::Bool(rhs.is_truthy()))
            }

            BinaryKind::Member => self.member_access(rt, scope, op, left, right),
        }
    }

    /// `object$.field$` / `object$.method(...)` — the left side is a member
    /// context, the right side is read or called inside the instance scope.
    fn member_access(
        &self,
        rt: &mut Runtime,
        scope: ScopeId,
        op: &BinaryOp,
        left: Term,
        right: Term,
    ) -> Result<Value> {
        let object = match left {
            Term::Value(value) => value,
            Term::Group(mut nested) => nested.evaluate(rt, scope)?,
            Term::Variable { name, mut indices } => {
                if indices.is_empty() {
                    rt.scopes.get_variable(scope, &name)?
                } else {
                    let resolved = eval_indices(rt, scope, &mut indices)?;
                    rt.scopes.get_array_at(scope, &name, &resolved)?
                }
            }
            other => {
                return Err(BasicError::parse(
                    self.line,
                    format!("'{}' cannot be used as a member context", other.describe()),
                ))
            }
        };

        let Value::Instance(instance) = object else {
            return Err(self.rewrap(OpFail::Types, &op.text, object.type_name(), "member"));
        };

        match right {
            Term::Variable { name, mut indices } => {
                if indices.is_empty() {
                    rt.scopes.get_variable(instance, &name)
                } else {
                    let resolved = eval_indices(rt, scope, &mut indices)?;
                    rt.scopes.get_array_at(instance, &name, &resolved)
                }
            }
            Term::Call { name, mut args } => {
                rt.call_method(instance, scope, &name, &mut args, self.line)
            }
            other => Err(BasicError::parse(
                self.line,
                format!("Invalid member access '{}'", other.describe()),
            )),
        }
    }

    fn rewrap(&self, fail: OpFail, op: &str, lhs: &str, rhs: &str) -> BasicError {
        match fail {
            OpFail::Types => BasicError::OperatorNotApplicable {
                op: op.to_string(),
                lhs: lhs.to_string(),
                rhs: rhs.to_string(),
                line: self.line,
            },
            OpFail::DivisionByZero => BasicError::DivisionByZero { line: self.line },
        }
    }
}

/// Nearest live slot before `index`.
fn prev_live(slots: &[Option<Slot>], index: usize) -> Option<usize> {
    (0..index).rev().find(|&i| slots[i].is_some())
}

/// Nearest live slot after `index`.
fn next_live(slots: &[Option<Slot>], index: usize) -> Option<usize> {
    (index + 1..slots.len()).find(|&i| slots[i].is_some())
}

/// Force a term to a concrete value.
fn resolve_term(rt: &mut Runtime, scope: ScopeId, term: Term, line: usize) -> Result<Value> {
    match term {
        Term::Value(value) => Ok(value),

        Term::Group(mut nested) => nested.evaluate(rt, scope),

        Term::Variable { name, mut indices } => {
            if indices.is_empty() {
                rt.scopes.get_variable(scope, &name)
            } else {
                let resolved = eval_indices(rt, scope, &mut indices)?;
                rt.scopes.get_array_at(scope, &name, &resolved)
            }
        }

        Term::Call { name, mut args } => rt.call_by_name(scope, &name, &mut args, line),

        Term::Macro(name) => {
            if name.eq_ignore_ascii_case("error") {
                Ok(Value::Number(rt.status as f64))
            } else {
                Err(BasicError::UndefinedObject(format!("@{}", name)))
            }
        }
    }
}

/// Evaluate index expressions down to non-negative integers.
pub(crate) fn eval_indices(
    rt: &mut Runtime,
    scope: ScopeId,
    indices: &mut [Evaluator],
) -> Result<Vec<usize>> {
    let mut resolved = Vec::with_capacity(indices.len());

    for index in indices {
        let value = index.evaluate(rt, scope)?;
        let number = match value {
            Value::Number(n) if n.fract() == 0.0 && n >= 0.0 => n as usize,
            other => {
                return Err(BasicError::InvalidIndex(format!(
                    "'{}' is not a non-negative integer",
                    other
                )))
            }
        };
        resolved.push(number);
    }

    Ok(resolved)
}
