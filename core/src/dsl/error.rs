//! Error types for rotation text parsing

use thiserror::Error;

/// Errors while tokenizing or parsing a rotation expression.
///
/// Positions are character offsets into the normalized expression
/// (line breaks already folded into `→`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DslError {
    #[error("rotation is empty")]
    Empty,

    #[error("expected {expected} at position {position}, found {found}")]
    UnexpectedToken {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("unexpected {found} at position {position} after the end of the expression")]
    TrailingInput { position: usize, found: String },

    #[error(
        "ambiguous nesting at position {position}: a '/' choice inside a chain of three or more '+' terms needs parentheses"
    )]
    AmbiguousNesting { position: usize },

    #[error("'{text}' at position {position} looks like several abilities missing an operator")]
    MissingOperator { position: usize, text: String },

    #[error("reserved character U+{code:04X} at position {position}")]
    ReservedCharacter { position: usize, code: u32 },
}

impl DslError {
    /// Character offset the error points at, if any.
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Empty => None,
            Self::UnexpectedToken { position, .. }
            | Self::TrailingInput { position, .. }
            | Self::AmbiguousNesting { position }
            | Self::MissingOperator { position, .. }
            | Self::ReservedCharacter { position, .. } => Some(*position),
        }
    }
}

/// A single `key=value` pair in an override annotation that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnnotationError {
    #[error("malformed pair '{text}' (expected key=value)")]
    MalformedPair { text: String },

    #[error("unknown override key '{key}'")]
    UnknownKey { key: String },

    #[error("invalid value '{value}' for '{key}'")]
    InvalidValue { key: String, value: String },
}
