//! Stage P3: directive analysis.
//!
//! Resolves every `/*= expr */` site, parses its CEL expression, classifies
//! its semantic role from the surrounding SQL, and records the dummy-literal
//! token range the runtime deletes at substitution time. Conditions and loop
//! headers are parsed here too; schema unification happens in
//! [`super::schema`].

use super::{parse_cel, CelExpr};
use crate::clause::{ClauseKind, ClauseRange};
use crate::token::{DirectiveType, Token, TokenKind};
use crate::types::{
    diagnostic_codes, Diagnostic, DiagnosticKind, Position, VariableRole,
};

/// A resolved `/*= expr */` site.
#[derive(Debug, Clone)]
pub struct VariableSite {
    pub token_index: usize,
    pub expression: String,
    /// Parsed CEL; `None` when parsing failed (already diagnosed)
    pub cel: Option<CelExpr>,
    pub role: VariableRole,
    pub clause: ClauseKind,
    /// Raw token range of the dummy literal, when present
    pub dummy_range: Option<(usize, usize)>,
    pub position: Position,
}

/// A `/*# for var : iterable */` site.
#[derive(Debug, Clone)]
pub struct LoopSite {
    pub token_index: usize,
    /// Index of the matching `end`, from the linker
    pub end_index: Option<usize>,
    pub variable: String,
    pub iterable: String,
    pub cel: Option<CelExpr>,
    pub position: Position,
}

/// An `if`/`elseif` condition site.
#[derive(Debug, Clone)]
pub struct ConditionSite {
    pub token_index: usize,
    pub expression: String,
    pub cel: Option<CelExpr>,
    pub position: Position,
}

/// Everything stage P3 extracts from the linked token stream.
#[derive(Debug, Clone, Default)]
pub struct AnalyzedDirectives {
    pub sites: Vec<VariableSite>,
    pub loops: Vec<LoopSite>,
    pub conditions: Vec<ConditionSite>,
}

impl AnalyzedDirectives {
    /// Loop sites whose body covers the given token index, outermost first.
    pub fn loops_enclosing(&self, index: usize) -> Vec<&LoopSite> {
        self.loops
            .iter()
            .filter(|l| {
                let end = l.end_index.unwrap_or(usize::MAX);
                l.token_index < index && index < end
            })
            .collect()
    }
}

/// Analyze all directives in a linked token stream.
pub fn analyze_directives(
    tokens: &[Token],
    clauses: &[ClauseRange],
) -> (AnalyzedDirectives, Vec<Diagnostic>) {
    let mut analyzed = AnalyzedDirectives::default();
    let mut diagnostics = Vec::new();

    for (index, token) in tokens.iter().enumerate() {
        let Some(directive) = token.directive.as_ref() else {
            continue;
        };

        match directive.directive_type {
            DirectiveType::Variable => {
                let cel = parse_directive_cel(
                    &directive.expression,
                    token.position,
                    &mut diagnostics,
                );
                let (role, dummy_range) = classify_site(tokens, clauses, index);
                analyzed.sites.push(VariableSite {
                    token_index: index,
                    expression: directive.expression.clone(),
                    cel,
                    role,
                    clause: clause_of(clauses, index),
                    dummy_range,
                    position: token.position,
                });
            }
            DirectiveType::If | DirectiveType::ElseIf => {
                let cel = parse_directive_cel(
                    &directive.expression,
                    token.position,
                    &mut diagnostics,
                );
                analyzed.conditions.push(ConditionSite {
                    token_index: index,
                    expression: directive.expression.clone(),
                    cel,
                    position: token.position,
                });
            }
            DirectiveType::For => {
                let Some((variable, iterable)) = directive.expression.split_once(':') else {
                    diagnostics.push(
                        Diagnostic::error(
                            DiagnosticKind::Expression,
                            diagnostic_codes::INVALID_CEL,
                            format!(
                                "for directive must be 'for <ident> : <expr>', found {:?}",
                                directive.expression
                            ),
                        )
                        .at(token.position),
                    );
                    continue;
                };
                let variable = variable.trim().to_string();
                let iterable = iterable.trim().to_string();
                let cel = parse_directive_cel(&iterable, token.position, &mut diagnostics);
                analyzed.loops.push(LoopSite {
                    token_index: index,
                    end_index: directive.next_index,
                    variable,
                    iterable,
                    cel,
                    position: token.position,
                });
            }
            DirectiveType::Else | DirectiveType::End | DirectiveType::Const => {}
        }
    }

    (analyzed, diagnostics)
}

fn parse_directive_cel(
    expression: &str,
    position: Position,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<CelExpr> {
    match parse_cel(expression) {
        Ok(cel) => Some(cel),
        Err(err) => {
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticKind::Expression,
                    diagnostic_codes::INVALID_CEL,
                    format!("cannot parse CEL expression {expression:?}: {err}"),
                )
                .at(position),
            );
            None
        }
    }
}

fn clause_of(clauses: &[ClauseRange], index: usize) -> ClauseKind {
    clauses
        .iter()
        .find(|c| c.start <= index && index < c.end)
        .map(|c| c.kind)
        .unwrap_or(ClauseKind::Select)
}

fn next_significant(tokens: &[Token], from: usize) -> Option<usize> {
    tokens[from..]
        .iter()
        .position(|t| t.is_sql_significant())
        .map(|offset| from + offset)
}

fn prev_significant(tokens: &[Token], before: usize) -> Option<usize> {
    tokens[..before].iter().rposition(|t| t.is_sql_significant())
}

fn is_identifier_like(token: &Token) -> bool {
    matches!(
        token.kind,
        TokenKind::Identifier
            | TokenKind::ContextualIdentifier
            | TokenKind::Keyword
            | TokenKind::Number
    )
}

fn is_literal(token: &Token) -> bool {
    matches!(
        token.kind,
        TokenKind::String | TokenKind::Number | TokenKind::Boolean | TokenKind::Null
    )
}

/// Classify a variable site's role and locate its dummy literal.
fn classify_site(
    tokens: &[Token],
    clauses: &[ClauseRange],
    index: usize,
) -> (VariableRole, Option<(usize, usize)>) {
    let site = &tokens[index];

    // Identifier splice: the comment is glued to identifier characters on
    // the left (`users_/*= env */test`)
    if index > 0 {
        let prev = &tokens[index - 1];
        if prev.end_offset() == site.position.offset && is_identifier_like(prev) {
            let dummy = tokens.get(index + 1).and_then(|next| {
                (next.position.offset == site.end_offset() && is_identifier_like(next))
                    .then_some((index + 1, index + 2))
            });
            return (VariableRole::IdentifierSuffix, dummy);
        }
    }

    // Bulk row: the site stands where a VALUES row is expected and the dummy
    // is a whole parenthesized row
    if clause_of(clauses, index) == ClauseKind::Values {
        if let Some(next) = next_significant(tokens, index + 1) {
            let after_values = prev_significant(tokens, index)
                .is_some_and(|p| tokens[p].is_keyword("VALUES") || tokens[p].kind == TokenKind::Comma);
            if tokens[next].kind == TokenKind::LParen && after_values {
                let close = matching_paren(tokens, next);
                return (VariableRole::BulkRow, close.map(|c| (next, c + 1)));
            }
        }
    }

    // List expansion: sole content of `IN ( ... )`
    if let (Some(prev), Some(next)) = (
        prev_significant(tokens, index),
        next_significant(tokens, index + 1),
    ) {
        let in_open = tokens[prev].kind == TokenKind::LParen
            && prev_significant(tokens, prev).is_some_and(|p| tokens[p].is_keyword("IN"));
        if in_open && is_literal(&tokens[next]) {
            let after_dummy = next_significant(tokens, next + 1);
            if after_dummy.is_some_and(|a| tokens[a].kind == TokenKind::RParen) {
                return (VariableRole::ListExpansion, Some((next, next + 1)));
            }
        }
    }

    // Scalar: the dummy is the literal (or signed number) that follows
    if let Some(next) = next_significant(tokens, index + 1) {
        if is_literal(&tokens[next]) {
            return (VariableRole::Scalar, Some((next, next + 1)));
        }
        if tokens[next].kind == TokenKind::Operator && tokens[next].value == "-" {
            if let Some(after) = next_significant(tokens, next + 1) {
                if tokens[after].kind == TokenKind::Number {
                    return (VariableRole::Scalar, Some((next, after + 1)));
                }
            }
        }
    }

    (VariableRole::Scalar, None)
}

fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (offset, token) in tokens[open..].iter().enumerate() {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::split;
    use crate::token::tokenize;
    use crate::Dialect;

    fn analyze_source(source: &str) -> (AnalyzedDirectives, Vec<Diagnostic>) {
        let (mut tokens, lex) = tokenize(source, Dialect::Postgres);
        assert!(lex.is_empty(), "lexing failed: {lex:?}");
        let (shell, _) = split(&tokens).expect("split failed");
        let link_diagnostics = crate::directive::link(&mut tokens, &shell.clauses);
        assert!(link_diagnostics.is_empty(), "linking failed: {link_diagnostics:?}");
        analyze_directives(&tokens, &shell.clauses)
    }

    #[test]
    fn test_scalar_site() {
        let (analyzed, diagnostics) =
            analyze_source("SELECT id FROM users LIMIT /*= max_rows */10");
        assert!(diagnostics.is_empty());
        let site = &analyzed.sites[0];
        assert_eq!(site.role, VariableRole::Scalar);
        assert_eq!(site.clause, ClauseKind::Limit);
        assert!(site.dummy_range.is_some());
        assert_eq!(site.expression, "max_rows");
    }

    #[test]
    fn test_list_expansion_site() {
        let (analyzed, diagnostics) =
            analyze_source("SELECT * FROM users WHERE dept IN (/*= depts */'x')");
        assert!(diagnostics.is_empty());
        let site = &analyzed.sites[0];
        assert_eq!(site.role, VariableRole::ListExpansion);
        assert_eq!(site.clause, ClauseKind::Where);
    }

    #[test]
    fn test_in_with_extra_items_is_scalar() {
        let (analyzed, _) =
            analyze_source("SELECT * FROM users WHERE dept IN (/*= dept */'x', 'y')");
        assert_eq!(analyzed.sites[0].role, VariableRole::Scalar);
    }

    #[test]
    fn test_identifier_suffix_site() {
        let (analyzed, diagnostics) =
            analyze_source("SELECT id FROM users_/*= env */test WHERE id = 1");
        assert!(diagnostics.is_empty());
        let site = &analyzed.sites[0];
        assert_eq!(site.role, VariableRole::IdentifierSuffix);
        let (start, end) = site.dummy_range.unwrap();
        assert_eq!(end - start, 1);
    }

    #[test]
    fn test_bulk_row_site() {
        let (analyzed, diagnostics) =
            analyze_source("INSERT INTO products (name, price) VALUES /*= rows */('x', 0)");
        assert!(diagnostics.is_empty());
        let site = &analyzed.sites[0];
        assert_eq!(site.role, VariableRole::BulkRow);
        assert_eq!(site.clause, ClauseKind::Values);
        assert!(site.dummy_range.is_some());
    }

    #[test]
    fn test_signed_number_dummy() {
        let (analyzed, _) = analyze_source("SELECT id FROM t WHERE delta = /*= delta */-1");
        let (start, end) = analyzed.sites[0].dummy_range.unwrap();
        assert_eq!(end - start, 2);
    }

    #[test]
    fn test_missing_dummy() {
        let (analyzed, _) = analyze_source("SELECT id FROM t WHERE a = /*= x */ AND b");
        assert!(analyzed.sites[0].dummy_range.is_none());
    }

    #[test]
    fn test_condition_sites() {
        let (analyzed, diagnostics) = analyze_source(
            "SELECT id /*# if a > 1 */, b /*# elseif c */, d /*# end */ FROM t",
        );
        assert!(diagnostics.is_empty());
        assert_eq!(analyzed.conditions.len(), 2);
        assert!(analyzed.conditions[0].cel.is_some());
    }

    #[test]
    fn test_loop_site() {
        let (analyzed, diagnostics) = analyze_source(
            "SELECT id FROM logs WHERE tag = 'x' /*# for t : tags */ OR tag = /*= t */'y' /*# end */",
        );
        assert!(diagnostics.is_empty());
        let l = &analyzed.loops[0];
        assert_eq!(l.variable, "t");
        assert_eq!(l.iterable, "tags");
        assert!(l.end_index.is_some());

        let site = &analyzed.sites[0];
        assert_eq!(analyzed.loops_enclosing(site.token_index).len(), 1);
    }

    #[test]
    fn test_invalid_cel_reported() {
        let (analyzed, diagnostics) =
            analyze_source("SELECT id FROM t WHERE a = /*= 1 ++ */1");
        assert_eq!(diagnostics[0].code, "INVALID_CEL");
        assert!(analyzed.sites[0].cel.is_none());
    }

    #[test]
    fn test_malformed_for_reported() {
        let (_, diagnostics) =
            analyze_source("SELECT id FROM t WHERE x /*# for tags */ OR y /*# end */");
        assert_eq!(diagnostics[0].code, "INVALID_CEL");
        assert!(diagnostics[0].message.contains("for directive"));
    }
}
