//! Common types shared between request and response.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A location in the template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Byte offset from the start of the source
    pub offset: usize,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed, counted in characters)
    pub column: usize,
}

impl Position {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

/// A byte range in the template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    /// Byte offset from start of source (inclusive)
    pub start: usize,
    /// Byte offset from start of source (exclusive)
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// The pipeline stage family a diagnostic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    /// Tokenizer-level problems (bad characters, unterminated literals)
    Lexical,
    /// Clause-level problems (missing or misordered clauses)
    Structural,
    /// Directive nesting and linking problems
    Directive,
    /// CEL expression problems
    Expression,
    /// Catalog resolution problems (unknown/ambiguous tables and columns)
    Schema,
    /// Type checking problems (signatures, set operations, comparisons)
    Type,
    /// System-field and compile-option problems
    Configuration,
}

/// A problem encountered while compiling a template.
///
/// Diagnostics accumulate; a stage never aborts on the first problem. Errors
/// mark the produced document invalid, warnings and infos never do.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// Severity level
    pub severity: Severity,

    /// Stage family the diagnostic belongs to
    pub kind: DiagnosticKind,

    /// Machine-readable diagnostic code
    pub code: String,

    /// Human-readable message
    pub message: String,

    /// Location in the template source, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Diagnostic {
    pub fn error(
        kind: DiagnosticKind,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            code: code.into(),
            message: message.into(),
            position: None,
        }
    }

    pub fn warning(
        kind: DiagnosticKind,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            code: code.into(),
            message: message.into(),
            position: None,
        }
    }

    pub fn info(kind: DiagnosticKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            kind,
            code: code.into(),
            message: message.into(),
            position: None,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }
}

/// Append-only diagnostic bag threaded through the pipeline stages.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Finishes accumulation, ordering diagnostics by source offset.
    ///
    /// Diagnostics without a position sort after positioned ones; ties keep
    /// insertion (stage) order.
    pub fn into_sorted(self) -> Vec<Diagnostic> {
        let mut diagnostics = self.diagnostics;
        diagnostics.sort_by_key(|d| d.position.map_or(usize::MAX, |p| p.offset));
        diagnostics
    }
}

/// Summary statistics for a compilation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Number of top-level parameters in the schema
    pub parameter_count: usize,

    /// Number of IR instructions emitted
    pub instruction_count: usize,

    /// Number of result-row columns (0 for no-rows statements)
    pub result_column_count: usize,

    /// Diagnostic counts by severity
    pub diagnostic_count: DiagnosticCount,

    /// Quick check: true if any errors were encountered
    pub has_errors: bool,
}

/// Counts of diagnostics by severity level.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticCount {
    /// Number of error-level diagnostics
    pub errors: usize,
    /// Number of warning-level diagnostics
    pub warnings: usize,
    /// Number of info-level diagnostics
    pub infos: usize,
}

/// Machine-readable diagnostic codes.
pub mod diagnostic_codes {
    // Lexical
    pub const UNEXPECTED_CHARACTER: &str = "UNEXPECTED_CHARACTER";
    pub const UNTERMINATED_STRING: &str = "UNTERMINATED_STRING";
    pub const UNTERMINATED_COMMENT: &str = "UNTERMINATED_COMMENT";
    pub const MALFORMED_NUMBER: &str = "MALFORMED_NUMBER";
    pub const LONE_COLON: &str = "LONE_COLON";

    // Structural
    pub const EMPTY_TEMPLATE: &str = "EMPTY_TEMPLATE";
    pub const MISSING_CLAUSE: &str = "MISSING_CLAUSE";
    pub const UNEXPECTED_CLAUSE: &str = "UNEXPECTED_CLAUSE";
    pub const UNSUPPORTED_STATEMENT: &str = "UNSUPPORTED_STATEMENT";
    pub const SYNTAX_ERROR: &str = "SYNTAX_ERROR";

    // Directive
    pub const UNCLOSED_BLOCK: &str = "UNCLOSED_BLOCK";
    pub const MISMATCHED_DIRECTIVE: &str = "MISMATCHED_DIRECTIVE";
    pub const DIRECTIVE_CROSSES_PAREN: &str = "DIRECTIVE_CROSSES_PAREN";
    pub const DIRECTIVE_CROSSES_CLAUSE: &str = "DIRECTIVE_CROSSES_CLAUSE";

    // Expression
    pub const INVALID_CEL: &str = "INVALID_CEL";
    pub const UNKNOWN_CONSTANT: &str = "UNKNOWN_CONSTANT";
    pub const PARAMETER_TYPE_CONFLICT: &str = "PARAMETER_TYPE_CONFLICT";
    pub const UNREFERENCED_PARAMETER: &str = "UNREFERENCED_PARAMETER";
    pub const MISSING_DUMMY_LITERAL: &str = "MISSING_DUMMY_LITERAL";

    // Schema
    pub const UNKNOWN_TABLE: &str = "UNKNOWN_TABLE";
    pub const UNKNOWN_COLUMN: &str = "UNKNOWN_COLUMN";
    pub const AMBIGUOUS_COLUMN: &str = "AMBIGUOUS_COLUMN";
    pub const UNRESOLVED_WILDCARD: &str = "UNRESOLVED_WILDCARD";

    // Type
    pub const FUNCTION_SIGNATURE_MISMATCH: &str = "FUNCTION_SIGNATURE_MISMATCH";
    pub const SET_OPERATION_TYPE_MISMATCH: &str = "SET_OPERATION_TYPE_MISMATCH";
    pub const INCOMPATIBLE_COMPARISON: &str = "INCOMPATIBLE_COMPARISON";
    pub const UNSTABLE_RECURSIVE_CTE: &str = "UNSTABLE_RECURSIVE_CTE";

    // Configuration
    pub const FORBIDDEN_SYSTEM_FIELD: &str = "FORBIDDEN_SYSTEM_FIELD";
    pub const MISSING_SYSTEM_FIELD: &str = "MISSING_SYSTEM_FIELD";
    pub const EMPTY_LIST_POLICY_UNSET: &str = "EMPTY_LIST_POLICY_UNSET";
    pub const INVALID_HEADER: &str = "INVALID_HEADER";
}
