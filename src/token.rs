//! Classified tokens produced by the scanner's dispatcher.
//!
//! The token stream is never materialized eagerly: the evaluator pulls one
//! token at a time and immediately converts it into an operand/operator
//! slot.  Payload-carrying variants hold everything reduction needs, so no
//! token survives past expression parsing.

use std::fmt;

use crate::ops::{BinaryOp, UnaryOp};

/// One lexical token of an expression.
#[derive(Debug, Clone)]
pub enum Token {
    /// Numeric literal, including hexadecimal forms.
    Number(f64),

    /// `true` / `false` (case-insensitive).
    Bool(bool),

    /// Quoted string with escapes already decoded.
    Str(String),

    /// The `null` literal.
    Null,

    /// Variable reference: `name$`, optionally with bracketed index
    /// expressions (`name$[i][j]`), stored unevaluated.
    Variable { name: String, indices: Vec<String> },

    /// Introspection macro such as `@error`.
    Macro(String),

    /// Function call: identifier immediately followed by an argument group,
    /// arguments stored unevaluated.
    Call { name: String, args: Vec<String> },

    /// Parenthesized sub-expression, stored unevaluated.
    Group(String),

    /// Unary operator descriptor.
    Unary(UnaryOp),

    /// Binary operator descriptor.
    Binary(BinaryOp),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "NUMBER {}", n),
            Token::Bool(b) => write!(f, "BOOL {}", b),
            Token::Str(s) => write!(f, "STRING {:?}", s),
            Token::Null => write!(f, "NULL"),
            Token::Variable { name, indices } => {
                write!(f, "VARIABLE {}$", name)?;
                for index in indices {
                    write!(f, "[{}]", index)?;
                }
                Ok(())
            }
            Token::Macro(name) => write!(f, "MACRO @{}", name),
            Token::Call { name, args } => write!(f, "CALL {}({})", name, args.join(", ")),
            Token::Group(inner) => write!(f, "GROUP ({})", inner),
            Token::Unary(op) => write!(f, "UNARY {}", op.text),
            Token::Binary(op) => write!(f, "BINARY {}", op.text),
        }
    }
}
