//! Parameter-schema unification.
//!
//! Every CEL reference that shares a root identifier is unified into one
//! schema node: `x.y.z` produces nested records, `x[i]` and loop bindings
//! produce lists, and the SQL position of each site supplies the initial
//! type guess. Header annotations are authoritative seeds; conflicts between
//! uses are errors, declared-but-unreferenced parameters are warnings.

use indexmap::IndexMap;

use super::analyzer::{AnalyzedDirectives, ConditionSite, LoopSite, VariableSite};
use super::{CelBinaryOp, CelExpr, CelUnaryOp};
use crate::clause::ClauseKind;
use crate::header::TemplateHeader;
use crate::parser::{InsertSource, Statement};
use crate::token::{Token, TokenKind};
use crate::types::{
    diagnostic_codes, Diagnostic, DiagnosticKind, DiagnosticSink, ParamType, Parameter,
    ParameterMode, Position, SchemaCatalog, SystemFieldConfig, VariableRole,
};

/// One segment of a reference path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seg {
    Field(String),
    Index,
}

type RefPath = Vec<Seg>;

#[derive(Debug, Clone)]
enum Node {
    Leaf(ParamType),
    List(Box<Node>),
    Record(IndexMap<String, Node>),
}

impl Node {
    fn from_param_type(param_type: &ParamType) -> Self {
        match param_type {
            ParamType::List { element } => Node::List(Box::new(Node::from_param_type(element))),
            ParamType::Record { fields } => Node::Record(
                fields
                    .iter()
                    .map(|f| (f.name.clone(), Node::from_param_type(&f.param_type)))
                    .collect(),
            ),
            other => Node::Leaf(other.clone()),
        }
    }

    fn into_param_type(self) -> ParamType {
        match self {
            Node::Leaf(param_type) => param_type,
            Node::List(element) => ParamType::List {
                element: Box::new(element.into_param_type()),
            },
            Node::Record(fields) => ParamType::Record {
                fields: fields
                    .into_iter()
                    .map(|(name, node)| Parameter::new(name, node.into_param_type()))
                    .collect(),
            },
        }
    }
}

struct RootEntry {
    node: Node,
    declared: bool,
    referenced: bool,
    implicit: bool,
}

/// Build the parameter schema for a template.
#[allow(clippy::too_many_arguments)]
pub fn build_parameter_schema(
    tokens: &[Token],
    analyzed: &AnalyzedDirectives,
    header: Option<&TemplateHeader>,
    statement: &Statement,
    catalog: Option<&SchemaCatalog>,
    system_fields: &[SystemFieldConfig],
    sink: &mut DiagnosticSink,
) -> Vec<Parameter> {
    let mut builder = SchemaBuilder {
        roots: IndexMap::new(),
        sink,
    };

    if let Some(header) = header {
        for (name, param_type) in &header.parameters {
            builder.roots.insert(
                name.clone(),
                RootEntry {
                    node: Node::from_param_type(param_type),
                    declared: true,
                    referenced: false,
                    implicit: false,
                },
            );
        }
    }

    // One pass over every directive in source order: output parameter order
    // is first-reference order, header declarations ahead of it
    enum DirectiveRef<'a> {
        Loop(&'a LoopSite),
        Site(&'a VariableSite),
        Condition(&'a ConditionSite),
    }

    let mut ordered: Vec<(usize, DirectiveRef)> = Vec::new();
    for site in &analyzed.loops {
        ordered.push((site.token_index, DirectiveRef::Loop(site)));
    }
    for site in &analyzed.sites {
        ordered.push((site.token_index, DirectiveRef::Site(site)));
    }
    for condition in &analyzed.conditions {
        ordered.push((condition.token_index, DirectiveRef::Condition(condition)));
    }
    ordered.sort_by_key(|(index, _)| *index);

    for (_, entry) in &ordered {
        match entry {
            DirectiveRef::Loop(site) => {
                if let Some(cel) = &site.cel {
                    let bindings = loop_bindings(analyzed, site.token_index);
                    if let Some(path) = reference_path(cel, &bindings) {
                        builder.apply(
                            &path,
                            ParamType::List {
                                element: Box::new(ParamType::Any),
                            },
                            site.position,
                        );
                    }
                }
            }
            DirectiveRef::Site(site) => {
                let expected = site_type_guess(tokens, site, statement, catalog);
                let bindings = loop_bindings(analyzed, site.token_index);
                if let Some(cel) = &site.cel {
                    match reference_path(cel, &bindings) {
                        Some(path) => builder.apply(&path, expected, site.position),
                        None => collect_refs(cel, &bindings, site.position, &mut builder),
                    }
                }
            }
            DirectiveRef::Condition(condition) => {
                if let Some(cel) = &condition.cel {
                    let bindings = loop_bindings(analyzed, condition.token_index);
                    collect_boolean_refs(cel, &bindings, condition.position, &mut builder);
                }
            }
        }
    }

    apply_system_fields(&mut builder, statement, system_fields);

    let mut parameters = Vec::new();
    for (name, entry) in builder.roots {
        if entry.declared && !entry.referenced {
            builder.sink.push(Diagnostic::warning(
                DiagnosticKind::Expression,
                diagnostic_codes::UNREFERENCED_PARAMETER,
                format!("parameter {name:?} is declared but never referenced"),
            ));
        }
        let mut parameter = Parameter::new(name, entry.node.into_param_type());
        parameter.implicit = entry.implicit;
        parameters.push(parameter);
    }
    parameters
}

struct SchemaBuilder<'a> {
    roots: IndexMap<String, RootEntry>,
    sink: &'a mut DiagnosticSink,
}

impl SchemaBuilder<'_> {
    /// Merge one `(path, type)` constraint into the schema.
    fn apply(&mut self, path: &[Seg], param_type: ParamType, position: Position) {
        let Some(Seg::Field(root)) = path.first() else {
            return;
        };
        let entry = self.roots.entry(root.clone()).or_insert_with(|| RootEntry {
            node: Node::Leaf(ParamType::Any),
            declared: false,
            referenced: false,
            implicit: false,
        });
        entry.referenced = true;

        let incoming = constraint_node(&path[1..], param_type);
        let mut node = std::mem::replace(&mut entry.node, Node::Leaf(ParamType::Any));
        merge_nodes(&mut node, incoming, root, position, self.sink);
        if let Some(entry) = self.roots.get_mut(root.as_str()) {
            entry.node = node;
        }
    }
}

/// Wrap a leaf type according to the remaining path segments.
fn constraint_node(path: &[Seg], param_type: ParamType) -> Node {
    match path.first() {
        None => Node::from_param_type(&param_type),
        Some(Seg::Field(name)) => {
            let mut fields = IndexMap::new();
            fields.insert(name.clone(), constraint_node(&path[1..], param_type));
            Node::Record(fields)
        }
        Some(Seg::Index) => Node::List(Box::new(constraint_node(&path[1..], param_type))),
    }
}

fn merge_nodes(
    existing: &mut Node,
    incoming: Node,
    root: &str,
    position: Position,
    sink: &mut DiagnosticSink,
) {
    match (&mut *existing, incoming) {
        (Node::Leaf(ParamType::Any), incoming) => *existing = incoming,
        (_, Node::Leaf(ParamType::Any)) => {}
        (Node::Leaf(a), Node::Leaf(b)) => match merge_scalar(a, &b) {
            Some(merged) => *existing = Node::Leaf(merged),
            None => sink.push(
                Diagnostic::error(
                    DiagnosticKind::Expression,
                    diagnostic_codes::PARAMETER_TYPE_CONFLICT,
                    format!(
                        "parameter {root:?} is used both as {} and as {}",
                        type_name(a),
                        type_name(&b)
                    ),
                )
                .at(position),
            ),
        },
        (Node::List(a), Node::List(b)) => merge_nodes(a, *b, root, position, sink),
        (Node::Record(a), Node::Record(b)) => {
            for (name, node) in b {
                match a.get_mut(&name) {
                    Some(existing_field) => {
                        merge_nodes(existing_field, node, root, position, sink)
                    }
                    None => {
                        a.insert(name, node);
                    }
                }
            }
        }
        (existing_node, incoming) => {
            sink.push(
                Diagnostic::error(
                    DiagnosticKind::Expression,
                    diagnostic_codes::PARAMETER_TYPE_CONFLICT,
                    format!(
                        "parameter {root:?} is used both as {} and as {}",
                        node_shape(existing_node),
                        node_shape(&incoming)
                    ),
                )
                .at(position),
            );
        }
    }
}

/// Scalar unification: equal types merge, numerics widen, anything else is a
/// conflict.
fn merge_scalar(a: &ParamType, b: &ParamType) -> Option<ParamType> {
    if a == b {
        return Some(a.clone());
    }
    use ParamType::*;
    match (a, b) {
        (Int, Float) | (Float, Int) => Some(Float),
        (Int, Decimal) | (Decimal, Int) | (Float, Decimal) | (Decimal, Float) => Some(Decimal),
        (Date, Timestamp) | (Timestamp, Date) => Some(Timestamp),
        _ => None,
    }
}

fn type_name(param_type: &ParamType) -> String {
    match param_type {
        ParamType::List { element } => format!("list of {}", type_name(element)),
        ParamType::Record { .. } => "record".to_string(),
        other => format!("{other:?}").to_lowercase(),
    }
}

fn node_shape(node: &Node) -> &'static str {
    match node {
        Node::Leaf(_) => "a scalar",
        Node::List(_) => "a list",
        Node::Record(_) => "a record",
    }
}

/// Active loop-variable bindings at a token index: variable name to the
/// path of one element of its iterable.
fn loop_bindings(analyzed: &AnalyzedDirectives, index: usize) -> IndexMap<String, RefPath> {
    let mut bindings: IndexMap<String, RefPath> = IndexMap::new();
    for site in analyzed.loops_enclosing(index) {
        if let Some(cel) = &site.cel {
            if let Some(mut path) = reference_path_with(cel, &bindings) {
                path.push(Seg::Index);
                bindings.insert(site.variable.clone(), path);
            }
        }
    }
    bindings
}

/// Extract a pure reference path (`a.b[i].c`) from a CEL expression.
fn reference_path(expr: &CelExpr, bindings: &IndexMap<String, RefPath>) -> Option<RefPath> {
    reference_path_with(expr, bindings)
}

fn reference_path_with(
    expr: &CelExpr,
    bindings: &IndexMap<String, RefPath>,
) -> Option<RefPath> {
    match expr {
        CelExpr::Ident(name) => Some(match bindings.get(name) {
            Some(bound) => bound.clone(),
            None => vec![Seg::Field(name.clone())],
        }),
        CelExpr::Member { base, field } => {
            let mut path = reference_path_with(base, bindings)?;
            path.push(Seg::Field(field.clone()));
            Some(path)
        }
        CelExpr::Index { base, .. } => {
            let mut path = reference_path_with(base, bindings)?;
            path.push(Seg::Index);
            Some(path)
        }
        _ => None,
    }
}

/// The initial type guess for a variable site, from its SQL position.
fn site_type_guess(
    tokens: &[Token],
    site: &VariableSite,
    statement: &Statement,
    catalog: Option<&SchemaCatalog>,
) -> ParamType {
    match site.role {
        VariableRole::IdentifierSuffix => ParamType::String,
        VariableRole::ListExpansion => ParamType::List {
            element: Box::new(dummy_type(tokens, site).unwrap_or(ParamType::Any)),
        },
        VariableRole::BulkRow => ParamType::List {
            element: Box::new(bulk_row_type(statement, catalog)),
        },
        VariableRole::Scalar => match site.clause {
            ClauseKind::Limit | ClauseKind::Offset => ParamType::Int,
            _ => dummy_type(tokens, site).unwrap_or(ParamType::Any),
        },
    }
}

/// Type of the dummy literal following a site.
fn dummy_type(tokens: &[Token], site: &VariableSite) -> Option<ParamType> {
    let (start, end) = site.dummy_range?;
    let literal = tokens[start..end]
        .iter()
        .find(|t| t.kind != TokenKind::Operator)?;
    Some(literal_param_type(literal))
}

fn literal_param_type(token: &Token) -> ParamType {
    match token.kind {
        TokenKind::String => ParamType::String,
        TokenKind::Boolean => ParamType::Bool,
        TokenKind::Null => ParamType::Any,
        TokenKind::Number => {
            if token.value.contains('.') || token.value.to_ascii_lowercase().contains('e') {
                ParamType::Float
            } else {
                ParamType::Int
            }
        }
        _ => ParamType::Any,
    }
}

/// Row record for a bulk-insert site: fields follow the INSERT column list,
/// typed from the catalog when it knows the table, otherwise from the dummy
/// row literals.
fn bulk_row_type(statement: &Statement, catalog: Option<&SchemaCatalog>) -> ParamType {
    let Statement::Insert(insert) = statement else {
        return ParamType::Any;
    };

    let table = catalog.and_then(|c| {
        c.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(insert.table.last()))
    });

    let dummy_row = match &insert.source {
        InsertSource::Values { rows } => rows.first(),
        InsertSource::Select(_) => None,
    };

    let mut fields = Vec::new();
    for (position, column) in insert.columns.iter().enumerate() {
        let from_catalog = table.and_then(|t| {
            t.columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(column))
                .map(|c| param_type_for_sql(&c.data_type))
        });
        let from_dummy = dummy_row
            .and_then(|row| row.get(position))
            .and_then(expression_literal_type);
        let param_type = from_catalog.or(from_dummy).unwrap_or(ParamType::Any);
        fields.push(Parameter::new(column.clone(), param_type));
    }

    if fields.is_empty() {
        ParamType::Any
    } else {
        ParamType::Record { fields }
    }
}

fn expression_literal_type(expr: &crate::parser::Expression) -> Option<ParamType> {
    use crate::parser::{ExpressionKind, Literal};
    match &expr.kind {
        ExpressionKind::Literal(Literal::String(_)) => Some(ParamType::String),
        ExpressionKind::Literal(Literal::Boolean(_)) => Some(ParamType::Bool),
        ExpressionKind::Literal(Literal::Null) => None,
        ExpressionKind::Literal(Literal::Number(value)) => {
            if value.contains('.') || value.to_ascii_lowercase().contains('e') {
                Some(ParamType::Float)
            } else {
                Some(ParamType::Int)
            }
        }
        _ => None,
    }
}

/// Map a catalog/dialect SQL type name to a parameter type.
pub fn param_type_for_sql(data_type: &str) -> ParamType {
    let base = data_type
        .split('(')
        .next()
        .unwrap_or(data_type)
        .trim()
        .to_ascii_lowercase();
    match base.as_str() {
        "smallint" | "int" | "integer" | "bigint" | "int2" | "int4" | "int8" | "serial"
        | "bigserial" => ParamType::Int,
        "real" | "float" | "float4" | "float8" | "double precision" | "double" => ParamType::Float,
        "numeric" | "decimal" | "money" => ParamType::Decimal,
        "text" | "varchar" | "character varying" | "char" | "character" | "uuid" | "citext" => {
            ParamType::String
        }
        "boolean" | "bool" => ParamType::Bool,
        "date" => ParamType::Date,
        "timestamp" | "timestamptz" | "timestamp with time zone"
        | "timestamp without time zone" | "datetime" => ParamType::Timestamp,
        "json" | "jsonb" => ParamType::Json,
        _ => ParamType::Any,
    }
}

/// Collect references from a non-path CEL expression (computed values).
fn collect_refs(
    expr: &CelExpr,
    bindings: &IndexMap<String, RefPath>,
    position: Position,
    builder: &mut SchemaBuilder,
) {
    if let Some(path) = reference_path(expr, bindings) {
        builder.apply(&path, ParamType::Any, position);
        return;
    }
    match expr {
        CelExpr::Unary { operand, .. } => collect_refs(operand, bindings, position, builder),
        CelExpr::Binary { left, right, .. } => {
            collect_refs(left, bindings, position, builder);
            collect_refs(right, bindings, position, builder);
        }
        CelExpr::Ternary {
            condition,
            then,
            otherwise,
        } => {
            collect_boolean_refs(condition, bindings, position, builder);
            collect_refs(then, bindings, position, builder);
            collect_refs(otherwise, bindings, position, builder);
        }
        CelExpr::Call { target, args, .. } => {
            if let Some(target) = target {
                collect_refs(target, bindings, position, builder);
            }
            for arg in args {
                collect_refs(arg, bindings, position, builder);
            }
        }
        CelExpr::List(items) => {
            for item in items {
                collect_refs(item, bindings, position, builder);
            }
        }
        CelExpr::Index { base, index } => {
            collect_refs(base, bindings, position, builder);
            collect_refs(index, bindings, position, builder);
        }
        CelExpr::Member { base, .. } => collect_refs(base, bindings, position, builder),
        _ => {}
    }
}

/// Collect references from a boolean-context expression, giving bare paths a
/// `bool` guess and comparison operands the type of their literal side.
fn collect_boolean_refs(
    expr: &CelExpr,
    bindings: &IndexMap<String, RefPath>,
    position: Position,
    builder: &mut SchemaBuilder,
) {
    match expr {
        CelExpr::Ident(_) | CelExpr::Member { .. } | CelExpr::Index { .. } => {
            if let Some(path) = reference_path(expr, bindings) {
                builder.apply(&path, ParamType::Bool, position);
            }
        }
        CelExpr::Unary {
            op: CelUnaryOp::Not,
            operand,
        } => collect_boolean_refs(operand, bindings, position, builder),
        CelExpr::Binary { op, left, right } => match op {
            CelBinaryOp::And | CelBinaryOp::Or => {
                collect_boolean_refs(left, bindings, position, builder);
                collect_boolean_refs(right, bindings, position, builder);
            }
            CelBinaryOp::Eq
            | CelBinaryOp::NotEq
            | CelBinaryOp::Lt
            | CelBinaryOp::LtEq
            | CelBinaryOp::Gt
            | CelBinaryOp::GtEq => {
                apply_comparison(left, right, bindings, position, builder);
                apply_comparison(right, left, bindings, position, builder);
            }
            CelBinaryOp::In => {
                collect_refs(left, bindings, position, builder);
                if let Some(path) = reference_path(right, bindings) {
                    builder.apply(
                        &path,
                        ParamType::List {
                            element: Box::new(ParamType::Any),
                        },
                        position,
                    );
                } else {
                    collect_refs(right, bindings, position, builder);
                }
            }
            _ => {
                collect_refs(left, bindings, position, builder);
                collect_refs(right, bindings, position, builder);
            }
        },
        other => collect_refs(other, bindings, position, builder),
    }
}

/// `path <op> literal` refines the path with the literal's type.
fn apply_comparison(
    side: &CelExpr,
    other: &CelExpr,
    bindings: &IndexMap<String, RefPath>,
    position: Position,
    builder: &mut SchemaBuilder,
) {
    let Some(path) = reference_path(side, bindings) else {
        collect_refs(side, bindings, position, builder);
        return;
    };
    let literal_type = match other {
        CelExpr::Int(_) => ParamType::Int,
        CelExpr::Float(_) => ParamType::Float,
        CelExpr::String(_) => ParamType::String,
        CelExpr::Bool(_) => ParamType::Bool,
        _ => ParamType::Any,
    };
    builder.apply(&path, literal_type, position);
}

/// Append configured system-field parameters and enforce their modes.
fn apply_system_fields(
    builder: &mut SchemaBuilder,
    statement: &Statement,
    system_fields: &[SystemFieldConfig],
) {
    for field in system_fields {
        let action = match statement {
            Statement::Insert(_) => field.on_insert.as_ref(),
            Statement::Update(_) => field.on_update.as_ref(),
            _ => None,
        };
        let Some(action) = action else { continue };

        match action.parameter {
            ParameterMode::Error => {
                if builder.roots.contains_key(&field.name) {
                    builder.sink.push(Diagnostic::error(
                        DiagnosticKind::Configuration,
                        diagnostic_codes::FORBIDDEN_SYSTEM_FIELD,
                        format!(
                            "system field {:?} must not be supplied as a parameter",
                            field.name
                        ),
                    ));
                }
            }
            ParameterMode::Explicit | ParameterMode::Implicit => {
                let implicit = action.parameter == ParameterMode::Implicit;
                let param_type = param_type_for_sql(&field.data_type);
                let entry =
                    builder
                        .roots
                        .entry(field.name.clone())
                        .or_insert_with(|| RootEntry {
                            node: Node::Leaf(ParamType::Any),
                            declared: false,
                            referenced: false,
                            implicit,
                        });
                entry.referenced = true;
                entry.implicit = implicit;
                if matches!(entry.node, Node::Leaf(ParamType::Any)) {
                    entry.node = Node::Leaf(param_type);
                }

                if action.parameter == ParameterMode::Explicit && action.default.is_none() {
                    if let Statement::Insert(insert) = statement {
                        let listed = insert
                            .columns
                            .iter()
                            .any(|c| c.eq_ignore_ascii_case(&field.name));
                        if !listed {
                            builder.sink.push(Diagnostic::error(
                                DiagnosticKind::Configuration,
                                diagnostic_codes::MISSING_SYSTEM_FIELD,
                                format!(
                                    "INSERT column list is missing required system field {:?}",
                                    field.name
                                ),
                            ));
                        }
                    }
                }
            }
            ParameterMode::None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::split;
    use crate::header::parse_header;
    use crate::token::tokenize;
    use crate::types::{ColumnSchema, SystemFieldAction, TableSchema};
    use crate::Dialect;

    fn schema_for(source: &str) -> (Vec<Parameter>, Vec<Diagnostic>) {
        schema_with(source, None, &[])
    }

    fn schema_with(
        source: &str,
        catalog: Option<&SchemaCatalog>,
        system_fields: &[SystemFieldConfig],
    ) -> (Vec<Parameter>, Vec<Diagnostic>) {
        let (mut tokens, lex) = tokenize(source, Dialect::Postgres);
        assert!(lex.is_empty(), "lexing failed: {lex:?}");
        let (shell, _) = split(&tokens).expect("split failed");
        crate::directive::link(&mut tokens, &shell.clauses);
        let (statement, _) = crate::parser::parse(&tokens, &shell);
        let (header, _) = parse_header(&tokens);
        let (analyzed, diagnostics) =
            super::super::analyzer::analyze_directives(&tokens, &shell.clauses);
        assert!(diagnostics.is_empty(), "analysis failed: {diagnostics:?}");

        let mut sink = DiagnosticSink::new();
        let parameters = build_parameter_schema(
            &tokens,
            &analyzed,
            header.as_ref(),
            &statement,
            catalog,
            system_fields,
            &mut sink,
        );
        (parameters, sink.into_sorted())
    }

    fn find<'a>(parameters: &'a [Parameter], name: &str) -> &'a Parameter {
        parameters
            .iter()
            .find(|p| p.name == name)
            .unwrap_or_else(|| panic!("missing parameter {name:?}"))
    }

    #[test]
    fn test_condition_parameter_is_bool() {
        let (parameters, _) =
            schema_for("SELECT id /*# if include_email */, email /*# end */ FROM users");
        assert_eq!(find(&parameters, "include_email").param_type, ParamType::Bool);
    }

    #[test]
    fn test_limit_parameter_is_int() {
        let (parameters, _) = schema_for("SELECT id FROM users LIMIT /*= max_rows */10");
        assert_eq!(find(&parameters, "max_rows").param_type, ParamType::Int);
    }

    #[test]
    fn test_scalar_type_from_dummy() {
        let (parameters, _) =
            schema_for("SELECT id FROM users WHERE name = /*= name */'x' AND rate = /*= rate */0.5");
        assert_eq!(find(&parameters, "name").param_type, ParamType::String);
        assert_eq!(find(&parameters, "rate").param_type, ParamType::Float);
    }

    #[test]
    fn test_in_list_parameter() {
        let (parameters, _) =
            schema_for("SELECT * FROM users WHERE dept IN (/*= depts */'x')");
        assert_eq!(
            find(&parameters, "depts").param_type,
            ParamType::List {
                element: Box::new(ParamType::String)
            }
        );
    }

    #[test]
    fn test_nested_record_from_member_refs() {
        let (parameters, _) = schema_for(
            "SELECT id FROM users WHERE name = /*= filter.name */'x' AND age > /*= filter.min_age */18",
        );
        match &find(&parameters, "filter").param_type {
            ParamType::Record { fields } => {
                assert_eq!(fields[0].name, "name");
                assert_eq!(fields[0].param_type, ParamType::String);
                assert_eq!(fields[1].name, "min_age");
                assert_eq!(fields[1].param_type, ParamType::Int);
            }
            other => panic!("unexpected type: {other:?}"),
        }
    }

    #[test]
    fn test_parameters_follow_source_order() {
        let (parameters, _) = schema_for(
            "SELECT id FROM logs WHERE a = /*= p1 */1 /*# for x : items */ OR b = /*= x */2 /*# end */",
        );
        let names: Vec<&str> = parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["p1", "items"]);
    }

    #[test]
    fn test_loop_variable_refines_iterable() {
        let (parameters, _) = schema_for(
            "SELECT id FROM logs WHERE tag = 'x' /*# for t : tags */ OR tag = /*= t */'y' /*# end */",
        );
        assert_eq!(
            find(&parameters, "tags").param_type,
            ParamType::List {
                element: Box::new(ParamType::String)
            }
        );
    }

    #[test]
    fn test_loop_variable_member_refines_record_element() {
        let (parameters, _) = schema_for(
            "SELECT id FROM logs WHERE x = 1 /*# for f : filters */ OR tag = /*= f.tag */'y' /*# end */",
        );
        match &find(&parameters, "filters").param_type {
            ParamType::List { element } => match element.as_ref() {
                ParamType::Record { fields } => {
                    assert_eq!(fields[0].name, "tag");
                    assert_eq!(fields[0].param_type, ParamType::String);
                }
                other => panic!("unexpected element: {other:?}"),
            },
            other => panic!("unexpected type: {other:?}"),
        }
    }

    #[test]
    fn test_bulk_row_from_catalog() {
        let catalog = SchemaCatalog {
            default_schema: None,
            tables: vec![TableSchema {
                schema: None,
                name: "products".to_string(),
                columns: vec![
                    column("name", "varchar", false),
                    column("price", "numeric", false),
                ],
                constraints: Vec::new(),
                indexes: Vec::new(),
            }],
        };
        let (parameters, _) = schema_with(
            "INSERT INTO products (name, price) VALUES /*= rows */('x', 0)",
            Some(&catalog),
            &[],
        );
        match &find(&parameters, "rows").param_type {
            ParamType::List { element } => match element.as_ref() {
                ParamType::Record { fields } => {
                    assert_eq!(fields[0].param_type, ParamType::String);
                    assert_eq!(fields[1].param_type, ParamType::Decimal);
                }
                other => panic!("unexpected element: {other:?}"),
            },
            other => panic!("unexpected type: {other:?}"),
        }
    }

    #[test]
    fn test_bulk_row_without_catalog_uses_dummy_row() {
        let (parameters, _) = schema_with(
            "INSERT INTO products (name, price) VALUES /*= rows */('x', 0)",
            None,
            &[],
        );
        match &find(&parameters, "rows").param_type {
            ParamType::List { element } => match element.as_ref() {
                ParamType::Record { fields } => {
                    assert_eq!(fields[0].param_type, ParamType::String);
                    assert_eq!(fields[1].param_type, ParamType::Int);
                }
                other => panic!("unexpected element: {other:?}"),
            },
            other => panic!("unexpected type: {other:?}"),
        }
    }

    #[test]
    fn test_header_annotation_wins() {
        let source = "/*#\nparameters:\n  max_rows: int\n*/\nSELECT id FROM users LIMIT /*= max_rows */10";
        let (parameters, diagnostics) = schema_for(source);
        assert!(diagnostics.is_empty());
        assert_eq!(parameters[0].name, "max_rows");
        assert_eq!(parameters[0].param_type, ParamType::Int);
    }

    #[test]
    fn test_header_conflict_reported() {
        let source =
            "/*#\nparameters:\n  name: bool\n*/\nSELECT id FROM users WHERE name = /*= name */'x'";
        let (_, diagnostics) = schema_for(source);
        assert!(diagnostics
            .iter()
            .any(|d| d.code == "PARAMETER_TYPE_CONFLICT"));
    }

    #[test]
    fn test_unreferenced_declared_parameter_warns() {
        let source = "/*#\nparameters:\n  unused: int\n*/\nSELECT id FROM users";
        let (_, diagnostics) = schema_for(source);
        assert!(diagnostics
            .iter()
            .any(|d| d.code == "UNREFERENCED_PARAMETER"
                && d.severity == crate::types::Severity::Warning));
    }

    #[test]
    fn test_identifier_suffix_is_string() {
        let (parameters, _) = schema_for("SELECT id FROM users_/*= env */test");
        assert_eq!(find(&parameters, "env").param_type, ParamType::String);
    }

    #[test]
    fn test_implicit_system_field() {
        let system_fields = vec![SystemFieldConfig {
            name: "updated_by".to_string(),
            data_type: "varchar".to_string(),
            exclude_from_select: false,
            on_insert: None,
            on_update: Some(SystemFieldAction {
                default: None,
                parameter: ParameterMode::Implicit,
            }),
        }];
        let (parameters, _) = schema_with(
            "UPDATE users SET name = /*= name */'x' WHERE id = /*= id */1",
            None,
            &system_fields,
        );
        let field = find(&parameters, "updated_by");
        assert!(field.implicit);
        assert_eq!(field.param_type, ParamType::String);
    }

    #[test]
    fn test_missing_explicit_system_field_in_insert() {
        let system_fields = vec![SystemFieldConfig {
            name: "created_at".to_string(),
            data_type: "timestamp".to_string(),
            exclude_from_select: false,
            on_insert: Some(SystemFieldAction {
                default: None,
                parameter: ParameterMode::Explicit,
            }),
            on_update: None,
        }];
        let (_, diagnostics) = schema_with(
            "INSERT INTO products (name) VALUES ('x')",
            None,
            &system_fields,
        );
        assert!(diagnostics.iter().any(|d| d.code == "MISSING_SYSTEM_FIELD"));
    }

    fn column(name: &str, data_type: &str, nullable: bool) -> ColumnSchema {
        ColumnSchema {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable,
            default: None,
            comment: None,
            is_primary_key: false,
            max_length: None,
            precision: None,
            scale: None,
        }
    }
}
