//! Error records accumulated during parsing and rendering.
//!
//! The core never aborts on a recoverable error. Every failure contributes
//! a record to the owning result's error list; internal functions take a
//! mutable reference to that list and append, keeping control flow
//! straight-line. The caller decides severity.

use std::fmt;

use serde::Serialize;

use crate::expr::ast::Span;

/// The category of a recorded error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed header, unmatched bracket, name-less passage.
    Structural,
    /// Unparseable expression, unknown function, bad argument count.
    Expression,
    /// Operator applied to incompatible types.
    Type,
    /// Undefined variable read under strict mode.
    Reference,
    /// `display` revisited a passage already on the stack.
    Cycle,
    /// `display` named a passage that does not exist.
    MissingPassage,
    /// `<<if>>` without a terminator, stray `<<else>>`/`<<endif>>`.
    UnmatchedMacro,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Structural => "structural error",
            ErrorKind::Expression => "expression error",
            ErrorKind::Type => "type error",
            ErrorKind::Reference => "reference error",
            ErrorKind::Cycle => "cycle error",
            ErrorKind::MissingPassage => "missing passage",
            ErrorKind::UnmatchedMacro => "unmatched macro",
        };
        f.write_str(s)
    }
}

/// A single recorded error: kind, textual context, and (where known) the
/// byte span in the source it was observed at.
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("{kind}: {message}")]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span: Some(span),
        }
    }
}
