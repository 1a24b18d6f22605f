//! Stage P2: the directive linker.
//!
//! Validates that `if`/`elseif`/`else`/`for`/`end` directives are well nested
//! and links each control-flow token to its successor through `next_index`.
//! Two structural rules are enforced so runtime substitution can never
//! produce unbalanced SQL: control flow must not cross parenthesis
//! boundaries, and must not cross clause boundaries (each clause is linked
//! independently).
//!
//! This is the one stage that mutates its input: it fills the `next_index`
//! fields on the token vector it is handed.

use crate::clause::ClauseRange;
use crate::token::{DirectiveType, Token, TokenKind};
use crate::types::{diagnostic_codes, Diagnostic, DiagnosticKind};

#[derive(Debug, Clone, Copy)]
struct OpenBlock {
    /// Token index of the directive currently ending the chain
    index: usize,
    /// Parenthesis depth the block was opened at
    depth: i32,
    kind: DirectiveType,
}

/// Link control-flow directives within each clause.
pub fn link(tokens: &mut [Token], clauses: &[ClauseRange]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for clause in clauses {
        link_clause(tokens, clause.start, clause.end, &mut diagnostics);
    }
    diagnostics
}

fn link_clause(
    tokens: &mut [Token],
    start: usize,
    end: usize,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut stack: Vec<OpenBlock> = Vec::new();
    let mut depth = 0i32;

    for index in start..end {
        match tokens[index].kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth -= 1,
            TokenKind::DirectiveComment => {
                let directive_type = tokens[index]
                    .directive
                    .as_ref()
                    .map(|d| d.directive_type)
                    .expect("directive token without directive info");
                match directive_type {
                    DirectiveType::If | DirectiveType::For => {
                        stack.push(OpenBlock {
                            index,
                            depth,
                            kind: directive_type,
                        });
                    }
                    DirectiveType::ElseIf | DirectiveType::Else => {
                        handle_branch(tokens, &mut stack, index, depth, directive_type, diagnostics);
                    }
                    DirectiveType::End => {
                        handle_end(tokens, &mut stack, index, depth, diagnostics);
                    }
                    DirectiveType::Variable | DirectiveType::Const => {}
                }
            }
            _ => {}
        }
    }

    for open in stack {
        let token = &tokens[open.index];
        let what = match open.kind {
            DirectiveType::For => "for",
            _ => "if",
        };
        diagnostics.push(
            Diagnostic::error(
                DiagnosticKind::Directive,
                diagnostic_codes::UNCLOSED_BLOCK,
                format!(
                    "{what} block opened by {:?} is never closed in this clause",
                    token.value.trim()
                ),
            )
            .at(token.position),
        );
    }
}

fn handle_branch(
    tokens: &mut [Token],
    stack: &mut Vec<OpenBlock>,
    index: usize,
    depth: i32,
    directive_type: DirectiveType,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let name = if directive_type == DirectiveType::ElseIf {
        "elseif"
    } else {
        "else"
    };

    let Some(top) = stack.last_mut() else {
        diagnostics.push(
            Diagnostic::error(
                DiagnosticKind::Directive,
                diagnostic_codes::MISMATCHED_DIRECTIVE,
                format!("{name} without a matching if"),
            )
            .at(tokens[index].position),
        );
        return;
    };

    match top.kind {
        DirectiveType::If | DirectiveType::ElseIf => {}
        DirectiveType::Else => {
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticKind::Directive,
                    diagnostic_codes::MISMATCHED_DIRECTIVE,
                    format!("{name} cannot follow else"),
                )
                .at(tokens[index].position),
            );
            return;
        }
        _ => {
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticKind::Directive,
                    diagnostic_codes::MISMATCHED_DIRECTIVE,
                    format!("{name} cannot appear inside a for block"),
                )
                .at(tokens[index].position),
            );
            return;
        }
    }

    if top.depth != depth {
        diagnostics.push(
            Diagnostic::error(
                DiagnosticKind::Directive,
                diagnostic_codes::DIRECTIVE_CROSSES_PAREN,
                format!("{name} crosses a parenthesis boundary"),
            )
            .at(tokens[index].position),
        );
    }

    let previous = top.index;
    top.index = index;
    top.kind = directive_type;
    tokens[previous]
        .directive
        .as_mut()
        .expect("linked token lost its directive info")
        .next_index = Some(index);
}

fn handle_end(
    tokens: &mut [Token],
    stack: &mut Vec<OpenBlock>,
    index: usize,
    depth: i32,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Some(top) = stack.pop() else {
        diagnostics.push(
            Diagnostic::error(
                DiagnosticKind::Directive,
                diagnostic_codes::MISMATCHED_DIRECTIVE,
                "end without a matching if or for",
            )
            .at(tokens[index].position),
        );
        return;
    };

    if top.depth != depth {
        diagnostics.push(
            Diagnostic::error(
                DiagnosticKind::Directive,
                diagnostic_codes::DIRECTIVE_CROSSES_PAREN,
                "end crosses a parenthesis boundary",
            )
            .at(tokens[index].position),
        );
    }

    tokens[top.index]
        .directive
        .as_mut()
        .expect("linked token lost its directive info")
        .next_index = Some(index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::split;
    use crate::token::tokenize;
    use crate::Dialect;

    fn link_source(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
        let (mut tokens, lex) = tokenize(source, Dialect::Postgres);
        assert!(lex.is_empty(), "lexing failed: {lex:?}");
        let (shell, _) = split(&tokens).expect("split failed");
        let diagnostics = link(&mut tokens, &shell.clauses);
        (tokens, diagnostics)
    }

    fn directive_indexes(tokens: &[Token]) -> Vec<usize> {
        tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind == TokenKind::DirectiveComment)
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_if_end_linked() {
        let (tokens, diagnostics) =
            link_source("SELECT id /*# if include_email */, email /*# end */ FROM users");
        assert!(diagnostics.is_empty());

        let indexes = directive_indexes(&tokens);
        let if_info = tokens[indexes[0]].directive.as_ref().unwrap();
        assert_eq!(if_info.next_index, Some(indexes[1]));
        let end_info = tokens[indexes[1]].directive.as_ref().unwrap();
        assert_eq!(end_info.next_index, None);
    }

    #[test]
    fn test_elseif_chain() {
        let (tokens, diagnostics) = link_source(
            "SELECT /*# if a */ 1 /*# elseif b */ 2 /*# else */ 3 /*# end */ FROM t",
        );
        assert!(diagnostics.is_empty());

        let indexes = directive_indexes(&tokens);
        assert_eq!(indexes.len(), 4);
        for pair in indexes.windows(2) {
            let info = tokens[pair[0]].directive.as_ref().unwrap();
            assert_eq!(info.next_index, Some(pair[1]));
        }
    }

    #[test]
    fn test_nested_blocks() {
        let (tokens, diagnostics) = link_source(
            "SELECT /*# if a */ 1 /*# if b */ 2 /*# end */ /*# end */ FROM t",
        );
        assert!(diagnostics.is_empty());

        let indexes = directive_indexes(&tokens);
        let outer = tokens[indexes[0]].directive.as_ref().unwrap();
        let inner = tokens[indexes[1]].directive.as_ref().unwrap();
        // Inner if links to the first end, outer if to the last
        assert_eq!(inner.next_index, Some(indexes[2]));
        assert_eq!(outer.next_index, Some(indexes[3]));
    }

    #[test]
    fn test_for_end() {
        let (tokens, diagnostics) =
            link_source("SELECT id FROM logs WHERE tag = 'x' /*# for t : tags */ OR tag = /*= t */'y' /*# end */");
        assert!(diagnostics.is_empty());

        let indexes = directive_indexes(&tokens);
        let for_info = tokens[indexes[0]].directive.as_ref().unwrap();
        assert_eq!(for_info.directive_type, DirectiveType::For);
        assert_eq!(for_info.next_index, Some(*indexes.last().unwrap()));
    }

    #[test]
    fn test_unclosed_block() {
        let (tokens, diagnostics) = link_source("SELECT 1 /*# if x */ , 2");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, "UNCLOSED_BLOCK");
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Directive);
        assert!(diagnostics[0].message.contains("if"));

        let if_token = tokens
            .iter()
            .find(|t| t.kind == TokenKind::DirectiveComment)
            .unwrap();
        assert_eq!(diagnostics[0].position, Some(if_token.position));
        assert_eq!(if_token.directive.as_ref().unwrap().next_index, None);
    }

    #[test]
    fn test_else_without_if() {
        let (_, diagnostics) = link_source("SELECT 1 /*# else */ , 2 /*# end */");
        assert_eq!(diagnostics[0].code, "MISMATCHED_DIRECTIVE");
        // The dangling end is also reported
        assert_eq!(diagnostics[1].code, "MISMATCHED_DIRECTIVE");
    }

    #[test]
    fn test_elseif_after_else() {
        let (_, diagnostics) =
            link_source("SELECT /*# if a */ 1 /*# else */ 2 /*# elseif b */ 3 /*# end */");
        assert!(diagnostics
            .iter()
            .any(|d| d.code == "MISMATCHED_DIRECTIVE" && d.message.contains("follow else")));
    }

    #[test]
    fn test_block_crossing_parens() {
        let (_, diagnostics) =
            link_source("SELECT coalesce( /*# if x */ a) /*# end */ FROM t");
        assert!(diagnostics
            .iter()
            .any(|d| d.code == "DIRECTIVE_CROSSES_PAREN"));
    }

    #[test]
    fn test_block_crossing_clauses() {
        // The if opens in SELECT and the end sits in FROM: each clause is
        // linked on its own, so this reports both halves
        let (_, diagnostics) =
            link_source("SELECT id /*# if x */ FROM users /*# end */");
        assert!(diagnostics.iter().any(|d| d.code == "UNCLOSED_BLOCK"));
        assert!(diagnostics
            .iter()
            .any(|d| d.code == "MISMATCHED_DIRECTIVE"));
    }

    #[test]
    fn test_block_inside_subquery_parens() {
        let (_, diagnostics) = link_source(
            "SELECT id FROM users WHERE dept IN (SELECT id FROM depts /*# if x */ WHERE a /*# end */)",
        );
        assert!(diagnostics.is_empty());
    }
}
