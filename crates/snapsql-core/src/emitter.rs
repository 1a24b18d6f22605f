//! Stage E: IR lowering.
//!
//! Flattens the linked, analyzed token stream into the instruction sequence.
//! Static SQL between directive sites is emitted verbatim (directive comments
//! and dummy literals excluded), so replaying the IR with every condition
//! false and every loop empty reproduces the template's static prefix.
//! Emission is deterministic: identical input produces identical IR.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::cel::analyzer::{AnalyzedDirectives, LoopSite, VariableSite};
use crate::clause::{ClauseKind, ClauseRange};
use crate::token::{DirectiveType, Token, TokenKind};
use crate::types::{
    diagnostic_codes, BoundaryKind, CompileOptions, Diagnostic, DiagnosticKind, DiagnosticSink,
    Instruction, VariableRole,
};

/// Lower the token stream to the flat instruction IR.
pub fn emit(
    tokens: &[Token],
    clauses: &[ClauseRange],
    analyzed: &AnalyzedDirectives,
    options: Option<&CompileOptions>,
    sink: &mut DiagnosticSink,
) -> Vec<Instruction> {
    warn_on_unset_empty_list_policy(analyzed, options, sink);

    let sites: HashMap<usize, &VariableSite> = analyzed
        .sites
        .iter()
        .map(|site| (site.token_index, site))
        .collect();
    let loops: HashMap<usize, &LoopSite> = analyzed
        .loops
        .iter()
        .map(|site| (site.token_index, site))
        .collect();

    let mut dummy_tokens = HashSet::new();
    for site in &analyzed.sites {
        if let Some((start, end)) = site.dummy_range {
            dummy_tokens.extend(start..end);
        }
    }

    // The front-matter comment is metadata, not SQL
    let header_token = crate::header::header_token_index(tokens);

    let mut emitter = Emitter {
        tokens,
        sites,
        loops,
        constants: options.map(|o| &o.constants),
        instructions: Vec::new(),
        static_buf: String::new(),
        block_stack: Vec::new(),
        sink,
    };

    for clause in clauses {
        let boundary = boundary_for(clause.kind);
        if let Some(boundary) = boundary {
            emitter.flush();
            emitter
                .instructions
                .push(Instruction::EmitBoundary { boundary });
        }

        let mut depth = 0i32;
        for index in clause.start..clause.end {
            if Some(index) == header_token {
                continue;
            }
            let token = &tokens[index];
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth -= 1,
                // Separators inside a loop body need trim markers so the
                // runtime can drop the dangling one after the last iteration
                TokenKind::Comma if depth == 0 && emitter.in_loop() => {
                    emitter.flush();
                    emitter.instructions.push(Instruction::EmitBoundary {
                        boundary: BoundaryKind::ListItem,
                    });
                }
                TokenKind::DirectiveComment => {
                    emitter.directive(token, index);
                    continue;
                }
                _ => {}
            }
            if !dummy_tokens.contains(&index) {
                emitter.static_buf.push_str(&token.value);
            }
        }

        if let Some(boundary) = boundary {
            emitter.flush();
            emitter
                .instructions
                .push(Instruction::EmitBoundary { boundary });
        }
    }

    emitter.flush();
    emitter.instructions
}

struct Emitter<'a> {
    tokens: &'a [Token],
    sites: HashMap<usize, &'a VariableSite>,
    loops: HashMap<usize, &'a LoopSite>,
    constants: Option<&'a IndexMap<String, serde_json::Value>>,
    instructions: Vec<Instruction>,
    static_buf: String,
    /// Open control blocks, for End disambiguation (if vs for)
    block_stack: Vec<DirectiveType>,
    sink: &'a mut DiagnosticSink,
}

impl Emitter<'_> {
    fn in_loop(&self) -> bool {
        self.block_stack.contains(&DirectiveType::For)
    }

    fn flush(&mut self) {
        if !self.static_buf.is_empty() {
            self.instructions.push(Instruction::EmitStatic {
                text: std::mem::take(&mut self.static_buf),
            });
        }
    }

    fn dummy_text(&self, site: &VariableSite) -> Option<String> {
        let (start, end) = site.dummy_range?;
        Some(
            self.tokens[start..end]
                .iter()
                .map(|t| t.value.as_str())
                .collect(),
        )
    }

    fn directive(&mut self, token: &Token, index: usize) {
        let info = token.directive.as_ref().expect("directive token");
        match info.directive_type {
            DirectiveType::Variable => {
                let Some(site) = self.sites.get(&index).copied() else {
                    return;
                };
                self.flush();
                match site.role {
                    VariableRole::IdentifierSuffix => {
                        self.instructions.push(Instruction::EmitIdentifier {
                            expr: site.expression.clone(),
                        });
                    }
                    role => {
                        let dummy = self.dummy_text(site);
                        self.instructions.push(Instruction::EmitParam {
                            expr: site.expression.clone(),
                            role,
                            dummy,
                        });
                    }
                }
            }
            DirectiveType::If => {
                self.flush();
                self.block_stack.push(DirectiveType::If);
                self.instructions.push(Instruction::BeginIf {
                    condition: info.expression.clone(),
                });
            }
            DirectiveType::ElseIf => {
                self.flush();
                self.instructions.push(Instruction::ElseIf {
                    condition: info.expression.clone(),
                });
            }
            DirectiveType::Else => {
                self.flush();
                self.instructions.push(Instruction::Else);
            }
            DirectiveType::For => {
                self.block_stack.push(DirectiveType::For);
                let Some(site) = self.loops.get(&index).copied() else {
                    // Malformed loop header, already diagnosed; the stack
                    // entry keeps its end balanced
                    return;
                };
                self.flush();
                self.instructions.push(Instruction::BeginFor {
                    variable: site.variable.clone(),
                    iterable: site.iterable.clone(),
                });
            }
            DirectiveType::End => {
                self.flush();
                match self.block_stack.pop() {
                    Some(DirectiveType::For) => self.instructions.push(Instruction::EndFor),
                    Some(_) => self.instructions.push(Instruction::EndIf),
                    // Dangling end was already diagnosed by the linker
                    None => {}
                }
            }
            DirectiveType::Const => self.resolve_const(token, &info.expression),
        }
    }

    /// Inline a compile-time constant as static SQL text.
    fn resolve_const(&mut self, token: &Token, name: &str) {
        let value = self.constants.and_then(|c| c.get(name));
        match value {
            Some(value) => self.static_buf.push_str(&sql_literal(value)),
            None => {
                self.sink.push(
                    Diagnostic::error(
                        DiagnosticKind::Expression,
                        diagnostic_codes::UNKNOWN_CONSTANT,
                        format!("unknown constant {name:?}"),
                    )
                    .at(token.position),
                );
            }
        }
    }
}

/// Render a constant value as a SQL literal.
fn sql_literal(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::Bool(true) => "TRUE".to_string(),
        serde_json::Value::Bool(false) => "FALSE".to_string(),
        serde_json::Value::Number(number) => number.to_string(),
        serde_json::Value::String(text) => format!("'{}'", text.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

fn boundary_for(kind: ClauseKind) -> Option<BoundaryKind> {
    match kind {
        ClauseKind::Where => Some(BoundaryKind::Where),
        ClauseKind::OrderBy => Some(BoundaryKind::OrderBy),
        ClauseKind::Limit => Some(BoundaryKind::Limit),
        ClauseKind::Offset => Some(BoundaryKind::Offset),
        _ => None,
    }
}

fn warn_on_unset_empty_list_policy(
    analyzed: &AnalyzedDirectives,
    options: Option<&CompileOptions>,
    sink: &mut DiagnosticSink,
) {
    let policy_set = options.is_some_and(|o| o.empty_in_policy.is_some());
    if policy_set {
        return;
    }
    for site in &analyzed.sites {
        if site.role == VariableRole::ListExpansion {
            sink.push(
                Diagnostic::warning(
                    DiagnosticKind::Configuration,
                    diagnostic_codes::EMPTY_LIST_POLICY_UNSET,
                    format!(
                        "no empty-IN policy configured for list site {:?}; \
                         the runtime will substitute IN (NULL)",
                        site.expression
                    ),
                )
                .at(site.position),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::split;
    use crate::token::tokenize;
    use crate::types::Dialect;

    fn emit_source(source: &str) -> (Vec<Instruction>, Vec<Diagnostic>) {
        emit_with(source, None)
    }

    fn emit_with(
        source: &str,
        options: Option<CompileOptions>,
    ) -> (Vec<Instruction>, Vec<Diagnostic>) {
        let (mut tokens, lex) = tokenize(source, Dialect::Postgres);
        assert!(lex.is_empty(), "lexing failed: {lex:?}");
        let (shell, _) = split(&tokens).expect("split failed");
        crate::directive::link(&mut tokens, &shell.clauses);
        let (analyzed, diagnostics) =
            crate::cel::analyzer::analyze_directives(&tokens, &shell.clauses);
        assert!(diagnostics.is_empty(), "analysis failed: {diagnostics:?}");

        let mut sink = DiagnosticSink::new();
        let instructions = emit(
            &tokens,
            &shell.clauses,
            &analyzed,
            options.as_ref(),
            &mut sink,
        );
        (instructions, sink.into_sorted())
    }

    fn static_text(instructions: &[Instruction]) -> String {
        instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::EmitStatic { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_conditional_field() {
        let (instructions, diagnostics) =
            emit_source("SELECT id, name /*# if include_email */, email /*# end */ FROM users");
        assert!(diagnostics.is_empty());
        assert_eq!(
            instructions,
            vec![
                Instruction::EmitStatic {
                    text: "SELECT id, name ".to_string()
                },
                Instruction::BeginIf {
                    condition: "include_email".to_string()
                },
                Instruction::EmitStatic {
                    text: ", email ".to_string()
                },
                Instruction::EndIf,
                Instruction::EmitStatic {
                    text: " FROM users".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_param_site_with_dummy() {
        let (instructions, _) =
            emit_source("SELECT * FROM users WHERE dept IN (/*= depts */'x')");
        let param = instructions
            .iter()
            .find_map(|i| match i {
                Instruction::EmitParam { expr, role, dummy } => Some((expr, role, dummy)),
                _ => None,
            })
            .expect("missing EmitParam");
        assert_eq!(param.0, "depts");
        assert_eq!(*param.1, VariableRole::ListExpansion);
        assert_eq!(param.2.as_deref(), Some("'x'"));

        // The dummy literal never reaches the static stream
        assert!(!static_text(&instructions).contains("'x'"));
    }

    #[test]
    fn test_identifier_site() {
        let (instructions, _) = emit_source("SELECT id FROM users_/*= env */test");
        assert!(instructions.iter().any(|i| matches!(
            i,
            Instruction::EmitIdentifier { expr } if expr == "env"
        )));
        assert!(!static_text(&instructions).contains("test"));
    }

    #[test]
    fn test_for_loop_instructions() {
        let (instructions, _) = emit_source(
            "SELECT id FROM logs WHERE tag = 'a' /*# for t : tags */ OR tag = /*= t */'b' /*# end */",
        );
        assert!(instructions.iter().any(|i| matches!(
            i,
            Instruction::BeginFor { variable, iterable }
                if variable == "t" && iterable == "tags"
        )));
        assert!(instructions.contains(&Instruction::EndFor));
    }

    #[test]
    fn test_boundaries_around_where() {
        let (instructions, _) = emit_source("SELECT id FROM users WHERE active LIMIT 5");
        let boundaries: Vec<&BoundaryKind> = instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::EmitBoundary { boundary } => Some(boundary),
                _ => None,
            })
            .collect();
        assert_eq!(
            boundaries,
            vec![
                &BoundaryKind::Where,
                &BoundaryKind::Where,
                &BoundaryKind::Limit,
                &BoundaryKind::Limit,
            ]
        );
    }

    #[test]
    fn test_list_item_boundaries_inside_loops_only() {
        let (plain, _) = emit_source("SELECT id, name FROM users");
        assert!(!plain
            .iter()
            .any(|i| matches!(i, Instruction::EmitBoundary { .. })));

        let (looped, _) = emit_source(
            "SELECT id FROM logs ORDER BY /*# for f : fields */ /*= f */name, /*# end */ id",
        );
        assert!(looped.iter().any(|i| matches!(
            i,
            Instruction::EmitBoundary {
                boundary: BoundaryKind::ListItem
            }
        )));
    }

    #[test]
    fn test_const_inlined() {
        let mut constants = IndexMap::new();
        constants.insert(
            "tenant".to_string(),
            serde_json::Value::String("acme".to_string()),
        );
        let options = CompileOptions {
            empty_in_policy: None,
            constants,
        };
        let (instructions, diagnostics) = emit_with(
            "SELECT id FROM users WHERE tenant = /*# const tenant */",
            Some(options),
        );
        assert!(diagnostics.is_empty());
        assert!(static_text(&instructions).contains("'acme'"));
    }

    #[test]
    fn test_unknown_const() {
        let (_, diagnostics) =
            emit_source("SELECT id FROM users WHERE tenant = /*# const tenant */");
        assert_eq!(diagnostics[0].code, "UNKNOWN_CONSTANT");
    }

    #[test]
    fn test_empty_list_policy_warning() {
        let (_, diagnostics) =
            emit_source("SELECT * FROM users WHERE dept IN (/*= depts */'x')");
        assert!(diagnostics
            .iter()
            .any(|d| d.code == "EMPTY_LIST_POLICY_UNSET"));

        let options = CompileOptions {
            empty_in_policy: Some(crate::types::EmptyInPolicy::DropPredicate),
            constants: IndexMap::new(),
        };
        let (_, diagnostics) = emit_with(
            "SELECT * FROM users WHERE dept IN (/*= depts */'x')",
            Some(options),
        );
        assert!(!diagnostics
            .iter()
            .any(|d| d.code == "EMPTY_LIST_POLICY_UNSET"));
    }

    #[test]
    fn test_header_comment_not_emitted() {
        let (instructions, diagnostics) =
            emit_source("/*#\nfunction_name: f\ndescription: d\n*/\nSELECT id FROM users");
        assert!(diagnostics.is_empty());
        let text = static_text(&instructions);
        assert!(!text.contains("function_name"));
        assert_eq!(text.trim_start(), "SELECT id FROM users");
    }

    #[test]
    fn test_static_reconstruction_without_directives() {
        let source = "SELECT id, name FROM users WHERE id = 1";
        let (instructions, _) = emit_source(source);
        assert_eq!(static_text(&instructions), source);
    }

    #[test]
    fn test_deterministic_emission() {
        let source = "SELECT id /*# if a */, b /*# end */ FROM t WHERE x = /*= x */1";
        let (first, _) = emit_source(source);
        let (second, _) = emit_source(source);
        assert_eq!(first, second);
    }
}
