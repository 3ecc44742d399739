//! Script error taxonomy
//!
//! Every failure raised while running a cell is a [`ScriptError`]. It never
//! escapes `Context::evaluate`; instead it is written to the error sink as a
//! single `<Kind>: <message>` line.

use serde::Serialize;
use thiserror::Error;

/// Kind of a script failure, reported as the prefix of the error line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    SyntaxError,
    NameError,
    TypeError,
    ValueError,
    IndexError,
    KeyError,
    AttributeError,
    ZeroDivisionError,
    OverflowError,
    RecursionError,
    SessionError,
    RuntimeError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::NameError => "NameError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ValueError => "ValueError",
            ErrorKind::IndexError => "IndexError",
            ErrorKind::KeyError => "KeyError",
            ErrorKind::AttributeError => "AttributeError",
            ErrorKind::ZeroDivisionError => "ZeroDivisionError",
            ErrorKind::OverflowError => "OverflowError",
            ErrorKind::RecursionError => "RecursionError",
            ErrorKind::SessionError => "SessionError",
            ErrorKind::RuntimeError => "RuntimeError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised by a running script
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValueError, message)
    }

    pub fn undefined(name: &str) -> Self {
        Self::new(ErrorKind::NameError, format!("name '{}' is not defined", name))
    }

    pub fn division_by_zero(message: &str) -> Self {
        Self::new(ErrorKind::ZeroDivisionError, message)
    }

    pub fn overflow() -> Self {
        Self::new(ErrorKind::OverflowError, "integer overflow")
    }

    /// The error as it is written to the error sink: one line, newline-terminated
    pub fn to_line(&self) -> String {
        let message = self.message.replace(['\r', '\n'], " ");
        format!("{}: {}\n", self.kind, message)
    }
}

impl From<crate::error::WorkcellError> for ScriptError {
    fn from(err: crate::error::WorkcellError) -> Self {
        match err {
            crate::error::WorkcellError::Syntax { .. } => {
                ScriptError::new(ErrorKind::SyntaxError, err.to_string())
            }
            other => ScriptError::new(ErrorKind::RuntimeError, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_line_format() {
        let err = ScriptError::division_by_zero("division by zero");
        assert_eq!(err.to_line(), "ZeroDivisionError: division by zero\n");
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");
    }

    #[test]
    fn test_error_line_is_single_line() {
        let err = ScriptError::new(ErrorKind::RuntimeError, "first\nsecond");
        assert_eq!(err.to_line(), "RuntimeError: first second\n");
        assert_eq!(err.to_line().lines().count(), 1);
    }
}
