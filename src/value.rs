//! The closed tagged-union value type flowing through the evaluator.
//!
//! Every native operator and builtin pattern-matches on this union and
//! returns a typed error instead of throwing; there is no dynamic typing
//! anywhere in the core.

use serde::Serialize;

use crate::scope::ScopeId;

/// A runtime value.  `Instance` carries the id of the scope that holds the
/// object's fields and methods inside the runtime's scope arena.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Str(String),
    Array(Vec<Value>),
    Instance(ScopeId),
    Null,
}

impl Value {
    /// Rendered type name used by the uniform operator error.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Instance(_) => "instance",
            Value::Null => "null",
        }
    }

    /// Truthiness used by IF/WHILE conditions and the logical operators.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Instance(_) => true,
            Value::Null => false,
        }
    }

    /// Numeric view, if one exists without loss.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Final coercion applied to a fully reduced expression result: booleans
    /// stay booleans, numeric-convertible strings become numbers, everything
    /// else passes through unchanged.
    pub fn narrowed(self) -> Value {
        match self {
            Value::Str(s) => match s.trim().parse::<f64>() {
                Ok(n) if !s.trim().is_empty() => Value::Number(n),
                _ => Value::Str(s),
            },
            other => other,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    // itoa avoids the float formatter for the common case
                    let mut buf: itoa::Buffer = itoa::Buffer::new();
                    write!(f, "{}", buf.format(*n as i64))
                } else {
                    write!(f, "{}", n)
                }
            }

            Value::Bool(b) => write!(f, "{}", b),

            Value::Str(s) => write!(f, "{}", s),

            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }

            Value::Instance(id) => write!(f, "<instance #{}>", id.index()),

            Value::Null => write!(f, "null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_numbers_render_without_fraction() {
        assert_eq!(Value::Number(42.0).to_string(), "42");
        assert_eq!(Value::Number(3.5).to_string(), "3.5");
        assert_eq!(Value::Number(-7.0).to_string(), "-7");
    }

    #[test]
    fn narrowing_converts_numeric_strings_only() {
        assert_eq!(Value::Str("123".into()).narrowed(), Value::Number(123.0));
        assert_eq!(
            Value::Str("foo123".into()).narrowed(),
            Value::Str("foo123".into())
        );
        assert_eq!(Value::Bool(true).narrowed(), Value::Bool(true));
    }

    #[test]
    fn truthiness() {
        assert!(Value::Number(1.0).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::Null.is_truthy());
    }
}
