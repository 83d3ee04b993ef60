//! Centralised error hierarchy for the **minibasic interpreter**.
//!
//! All subsystems (scanner, operator tables, scope arena, evaluator, block
//! executor, CLI) must convert their internal failure modes into one of the
//! variants defined here.  This enables a uniform `Result<T>` alias throughout
//! the crate and ergonomic inter-operation with `anyhow`, while still
//! preserving rich diagnostic detail.
//!
//! The taxonomy splits four ways: lexical/parse errors (fatal to the current
//! expression), structural block errors (fatal at script load), evaluation
//! errors (fatal to the current statement), and I/O wrappers for the host.
//! Status codes are *not* errors — they travel on the runtime as a secondary
//! channel and never appear here.
//!
//! The module **does not** print diagnostics itself.

use std::io;
use thiserror::Error;

use log::info;

/// Canonical error type used throughout the interpreter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BasicError {
    /// Lexical (scanner) error with source line information.
    #[error("[line {line}] Error: {message}")]
    Lex {
        /// Human-readable description.
        message: String,

        /// 1-based line where the error occurred.
        line: usize,
    },

    /// Syntactic error in an expression or statement.
    #[error("[line {line}] Error: {message}")]
    Parse { message: String, line: usize },

    /// A block opener (IF/WHILE/DO/SELECT/FUNCTION/CLASS) without a matching
    /// closer before the end of input.
    #[error("[line {line}] Unterminated {keyword} block")]
    UnterminatedBlock { keyword: String, line: usize },

    /// Two adjacent operands with no binary operator between them.
    #[error("[line {line}] Missing binary operator between '{left}' and '{right}'")]
    MissingBinaryOperator {
        left: String,
        right: String,
        line: usize,
    },

    /// A binary operator left without an operand on one side.
    #[error("[line {line}] Expression cannot end in a binary operation: '{op}'")]
    DanglingOperator { op: String, line: usize },

    /// Uniform rewrap of every native operator failure.  No raw cast or
    /// format error may leak past the reduction step.
    #[error("[line {line}] The operator '{op}' cannot be applied to types {lhs} and {rhs}")]
    OperatorNotApplicable {
        op: String,
        lhs: String,
        rhs: String,
        line: usize,
    },

    #[error("[line {line}] Division by zero")]
    DivisionByZero { line: usize },

    /// Name lookup reached the root scope without a definition.
    #[error("Undefined object '{0}'")]
    UndefinedObject(String),

    /// Any operation attempted on a scope after `collect()`.
    #[error("Context fell out of scope")]
    ContextCollected,

    /// Constants are write-once.
    #[error("Constant '{0}' cannot be redefined")]
    ConstantRedefined(String),

    /// Call arity mismatch; raised before any argument is evaluated.
    #[error("'{name}' expects {expected} argument(s), got {got}")]
    ArgumentCount {
        name: String,
        expected: usize,
        got: usize,
    },

    /// A native rejected an argument it could not coerce.
    #[error("Argument {index} of '{name}' must be {expected}")]
    ArgumentType {
        name: String,
        index: usize,
        expected: String,
    },

    /// An index exceeded the current length of an allocated array.
    #[error("Index {index} is out of range for '{name}'")]
    IndexOutOfRange { name: String, index: usize },

    /// An intermediate value in an index chain is not array-shaped.
    #[error("Index unavailable: '{0}' is not an array at the requested position")]
    IndexUnavailable(String),

    /// An index expression did not reduce to a non-negative integer.
    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    /// Two CASE labels of one SELECT resolved to the same value.
    #[error("[line {line}] Duplicate CASE label '{label}'")]
    DuplicateCase { label: String, line: usize },

    /// RETURN / RAISE reached outside any function call frame.
    #[error("[line {line}] '{keyword}' used outside of a function")]
    OutsideFunction { keyword: String, line: usize },

    /// Wrapper around `std::io::Error` (transparent).  Enables `?` on I/O ops.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BasicError {
    /// Helper constructor for the **scanner**.
    pub fn lex<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Lex error: line={}, msg={}", line, message);

        BasicError::Lex { message, line }
    }

    /// Helper constructor for expression and statement **parsing**.
    pub fn parse<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Parse error: line={}, msg={}", line, message);

        BasicError::Parse { message, line }
    }

    /// Whether the error arose while evaluating rather than while reading
    /// the source.  The CLI maps the two classes to different exit codes.
    pub fn is_runtime(&self) -> bool {
        !matches!(
            self,
            BasicError::Lex { .. }
                | BasicError::Parse { .. }
                | BasicError::UnterminatedBlock { .. }
                | BasicError::MissingBinaryOperator { .. }
                | BasicError::DanglingOperator { .. }
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, BasicError>;
