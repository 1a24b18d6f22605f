//! Stage P0: the clause splitter.
//!
//! Partitions the token stream into top-level clauses at parenthesis depth
//! zero. CTEs and subqueries are opaque here; the per-clause parsers recurse
//! into them later. Clause ranges cover every token index, so walking the
//! ranges in order visits the whole source.

use crate::error::{CompileError, CompileErrorKind};
use crate::token::{Token, TokenKind};
use crate::types::{diagnostic_codes, Diagnostic, DiagnosticKind};

/// Statement kind, recognized from the first clause-leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// Top-level clause kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    With,
    Select,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    Offset,
    /// `INSERT INTO table (columns)`
    InsertInto,
    Values,
    /// `UPDATE table`
    Update,
    Set,
    /// `DELETE FROM table`
    DeleteFrom,
    OnConflict,
    Returning,
    /// `UNION [ALL]` / `INTERSECT` / `EXCEPT` between select bodies
    SetOperator,
}

impl ClauseKind {
    /// Clauses the runtime may trim away entirely when directives leave them
    /// empty.
    pub fn is_trimmable(&self) -> bool {
        matches!(
            self,
            ClauseKind::Where | ClauseKind::OrderBy | ClauseKind::Limit | ClauseKind::Offset
        )
    }
}

/// A clause and the half-open token range it spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClauseRange {
    pub kind: ClauseKind,
    /// First token index (inclusive); leading trivia belongs to the clause
    pub start: usize,
    /// One past the last token index
    pub end: usize,
}

/// A statement shell: kind plus ordered clause ranges.
#[derive(Debug, Clone)]
pub struct StatementShell {
    pub kind: StatementKind,
    pub clauses: Vec<ClauseRange>,
}

impl StatementShell {
    pub fn clause(&self, kind: ClauseKind) -> Option<&ClauseRange> {
        self.clauses.iter().find(|c| c.kind == kind)
    }

    pub fn has_clause(&self, kind: ClauseKind) -> bool {
        self.clause(kind).is_some()
    }
}

/// Split a token stream into a statement shell.
///
/// Missing required clauses are reported as diagnostics but do not stop the
/// pipeline; only a source with no statement at all is fatal.
pub fn split(tokens: &[Token]) -> Result<(StatementShell, Vec<Diagnostic>), CompileError> {
    let mut diagnostics = Vec::new();

    let first_significant = tokens.iter().position(|t| t.is_sql_significant());
    let Some(first) = first_significant else {
        return Err(CompileError::new(
            CompileErrorKind::EmptyTemplate,
            "template contains no SQL statement",
        ));
    };

    let lead = &tokens[first];
    if !(lead.is_keyword("WITH")
        || lead.is_keyword("SELECT")
        || lead.is_keyword("INSERT")
        || lead.is_keyword("UPDATE")
        || lead.is_keyword("DELETE"))
    {
        return Err(CompileError::new(
            CompileErrorKind::UnsupportedStatement,
            format!(
                "expected SELECT, INSERT, UPDATE, DELETE, or WITH, found {:?}",
                lead.value
            ),
        )
        .at(lead.position));
    }

    let mut splitter = Splitter {
        tokens,
        diagnostics: &mut diagnostics,
        clauses: Vec::new(),
        statement_kind: None,
        depth: 0,
        terminated_at: None,
    };
    splitter.run();

    let kind = splitter.statement_kind.unwrap_or(StatementKind::Select);
    let clauses = splitter.clauses;
    let shell = StatementShell { kind, clauses };

    check_required_clauses(&shell, tokens, &mut diagnostics);

    Ok((shell, diagnostics))
}

struct Splitter<'a> {
    tokens: &'a [Token],
    diagnostics: &'a mut Vec<Diagnostic>,
    clauses: Vec<ClauseRange>,
    statement_kind: Option<StatementKind>,
    depth: i32,
    terminated_at: Option<usize>,
}

impl<'a> Splitter<'a> {
    fn run(&mut self) {
        let mut index = 0;
        while index < self.tokens.len() {
            let token = &self.tokens[index];
            match token.kind {
                TokenKind::LParen => self.depth += 1,
                TokenKind::RParen => self.depth -= 1,
                TokenKind::Semicolon if self.depth == 0 => {
                    if self.terminated_at.is_none() {
                        self.terminated_at = Some(index);
                    }
                }
                TokenKind::Keyword if self.depth == 0 && self.terminated_at.is_none() => {
                    if let Some(kind) = self.clause_start(index) {
                        self.open_clause(kind, index);
                    }
                }
                _ => {}
            }
            index += 1;
        }

        // Close the final clause at end of stream
        if let Some(last) = self.clauses.last_mut() {
            last.end = self.tokens.len();
        }

        if let Some(terminator) = self.terminated_at {
            if let Some(extra) = self.tokens[terminator + 1..]
                .iter()
                .find(|t| t.is_sql_significant())
            {
                self.diagnostics.push(
                    Diagnostic::error(
                        DiagnosticKind::Structural,
                        diagnostic_codes::UNEXPECTED_CLAUSE,
                        "unexpected tokens after statement terminator ';'",
                    )
                    .at(extra.position),
                );
            }
        }
    }

    /// Does the keyword at `index` open a new top-level clause?
    fn clause_start(&mut self, index: usize) -> Option<ClauseKind> {
        let token = &self.tokens[index];
        let current = self.clauses.last().map(|c| c.kind);

        let upper = token.value.to_ascii_uppercase();
        match upper.as_str() {
            "WITH" if self.clauses.is_empty() => Some(ClauseKind::With),
            "SELECT" => {
                self.statement_kind.get_or_insert(StatementKind::Select);
                Some(ClauseKind::Select)
            }
            "INSERT" => {
                self.statement_kind.get_or_insert(StatementKind::Insert);
                Some(ClauseKind::InsertInto)
            }
            "UPDATE" if current.is_none() || current == Some(ClauseKind::With) => {
                self.statement_kind.get_or_insert(StatementKind::Update);
                Some(ClauseKind::Update)
            }
            "DELETE" => {
                self.statement_kind.get_or_insert(StatementKind::Delete);
                Some(ClauseKind::DeleteFrom)
            }
            // DELETE FROM keeps FROM inside its own clause
            "FROM" if current != Some(ClauseKind::DeleteFrom) => Some(ClauseKind::From),
            "WHERE" => Some(ClauseKind::Where),
            "GROUP" if self.next_is(index, "BY") => Some(ClauseKind::GroupBy),
            "HAVING" => Some(ClauseKind::Having),
            "ORDER" if self.next_is(index, "BY") => Some(ClauseKind::OrderBy),
            "LIMIT" => Some(ClauseKind::Limit),
            "OFFSET" => Some(ClauseKind::Offset),
            "VALUES" if self.statement_kind == Some(StatementKind::Insert) => {
                Some(ClauseKind::Values)
            }
            "SET" => Some(ClauseKind::Set),
            "ON" if self.next_is(index, "CONFLICT") => Some(ClauseKind::OnConflict),
            "RETURNING" => Some(ClauseKind::Returning),
            "UNION" | "INTERSECT" | "EXCEPT" => Some(ClauseKind::SetOperator),
            _ => None,
        }
    }

    fn next_is(&self, index: usize, word: &str) -> bool {
        self.tokens[index + 1..]
            .iter()
            .find(|t| t.is_sql_significant())
            .is_some_and(|t| t.is_keyword(word))
    }

    fn open_clause(&mut self, kind: ClauseKind, index: usize) {
        let start = if let Some(last) = self.clauses.last_mut() {
            last.end = index;
            index
        } else {
            // Leading trivia and the header comment belong to the first clause
            0
        };
        self.clauses.push(ClauseRange {
            kind,
            start,
            end: index,
        });
    }
}

fn check_required_clauses(
    shell: &StatementShell,
    tokens: &[Token],
    diagnostics: &mut Vec<Diagnostic>,
) {
    let position = tokens
        .iter()
        .find(|t| t.is_sql_significant())
        .map(|t| t.position)
        .unwrap_or_default();

    match shell.kind {
        StatementKind::Update => {
            if !shell.has_clause(ClauseKind::Set) {
                diagnostics.push(
                    Diagnostic::error(
                        DiagnosticKind::Structural,
                        diagnostic_codes::MISSING_CLAUSE,
                        "UPDATE statement has no SET clause",
                    )
                    .at(position),
                );
            }
        }
        StatementKind::Insert => {
            if !shell.has_clause(ClauseKind::Values) && !shell.has_clause(ClauseKind::Select) {
                diagnostics.push(
                    Diagnostic::error(
                        DiagnosticKind::Structural,
                        diagnostic_codes::MISSING_CLAUSE,
                        "INSERT statement has no VALUES or SELECT source",
                    )
                    .at(position),
                );
            }
        }
        StatementKind::Delete => {
            let has_from = shell.clause(ClauseKind::DeleteFrom).is_some_and(|range| {
                tokens[range.start..range.end]
                    .iter()
                    .any(|t| t.is_keyword("FROM"))
            });
            if !has_from {
                diagnostics.push(
                    Diagnostic::error(
                        DiagnosticKind::Structural,
                        diagnostic_codes::MISSING_CLAUSE,
                        "DELETE statement has no FROM clause",
                    )
                    .at(position),
                );
            }
        }
        StatementKind::Select => {}
    }
}
