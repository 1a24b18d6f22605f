//! Error types for template compilation.
//!
//! # Error Handling Strategy
//!
//! This crate uses two complementary error handling patterns:
//!
//! - [`CompileError`]: Fatal errors for states the pipeline cannot recover
//!   from (an empty template, a source that contains no statement at all).
//!   Returned as `Result<T, CompileError>` by the stage entry points that can
//!   hit them; [`crate::compile`] converts them into diagnostics on an
//!   otherwise empty result.
//!
//! - [`crate::types::Diagnostic`]: everything else. Each stage accumulates
//!   diagnostics and continues with best-effort recovery, so the caller gets
//!   partial artifacts alongside the full problem list.

use thiserror::Error;

use crate::types::Position;

/// Category of fatal compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileErrorKind {
    /// The source contains no SQL statement
    #[default]
    EmptyTemplate,
    /// The statement kind is not one of SELECT/INSERT/UPDATE/DELETE
    UnsupportedStatement,
    /// The template header exists but cannot be read
    InvalidHeader,
}

/// A fatal error that stops the pipeline for the affected template.
#[derive(Debug, Clone, Error)]
#[error("{}{message}", position_prefix(.position))]
pub struct CompileError {
    pub message: String,
    pub position: Option<Position>,
    pub kind: CompileErrorKind,
}

fn position_prefix(position: &Option<Position>) -> String {
    position
        .map(|p| format!("line {}, column {}: ", p.line, p.column))
        .unwrap_or_default()
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
            kind,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_without_position() {
        let err = CompileError::new(CompileErrorKind::EmptyTemplate, "template is empty");
        assert_eq!(err.to_string(), "template is empty");
    }

    #[test]
    fn test_display_with_position() {
        let err = CompileError::new(CompileErrorKind::UnsupportedStatement, "CREATE not supported")
            .at(Position::new(0, 2, 3));
        assert_eq!(err.to_string(), "line 2, column 3: CREATE not supported");
    }

    #[test]
    fn test_error_trait() {
        let err = CompileError::new(CompileErrorKind::EmptyTemplate, "x");
        let _: &dyn std::error::Error = &err;
    }
}
