//! Stage P4: schema-driven type inference.
//!
//! Binds table and column references against the injected catalog, expands
//! wildcards, types every select-list expression, propagates nullability
//! through joins, `COALESCE`, `CASE`, and aggregates, and classifies the
//! statement's response affinity. Resolution failures become diagnostics and
//! typing continues with `unknown`.

pub mod affinity;
pub mod dialect;
pub mod functions;
pub mod scope;

use std::collections::HashMap;

use crate::parser::{
    Assignment, BinaryOp, CteDefinition, Expression, ExpressionKind, FromClause, FunctionCall,
    InsertSource, Literal, QualifiedName, SelectBody, SelectItem, SelectStatement, Statement,
    TableRef, UnaryOp, WithClause,
};
use crate::types::{
    diagnostic_codes, ColumnDescriptor, CompileRequest, Diagnostic, DiagnosticKind,
    DiagnosticSink, Position, ResponseAffinity, SchemaCatalog, SystemFieldConfig, TableSchema,
};

use dialect::{dialect_supports, DialectFeature};
use functions::{function_signature, is_aggregate_function, NullableRule, ReturnType};
use scope::{ColumnResolution, Relation, Scope};

/// The inference-stage artifact: the result-row schema plus affinity.
#[derive(Debug, Clone)]
pub struct InferenceResult {
    /// Ordered output columns; empty for statements that return no rows
    pub columns: Vec<ColumnDescriptor>,
    pub affinity: ResponseAffinity,
}

/// Infer the result schema and affinity of a parsed statement.
pub fn infer(
    statement: &Statement,
    request: &CompileRequest,
    sink: &mut DiagnosticSink,
) -> InferenceResult {
    let mut inferencer = Inferencer {
        source: &request.source,
        catalog: request.catalog.as_ref(),
        system_fields: &request.system_fields,
        dialect: request.dialect,
        sink,
        scopes: Vec::new(),
        ctes: Vec::new(),
    };

    let columns = match statement {
        Statement::Select(select) => inferencer.infer_select(select),
        Statement::Insert(insert) => inferencer.infer_insert(insert),
        Statement::Update(update) => inferencer.infer_update(update),
        Statement::Delete(delete) => inferencer.infer_delete(delete),
    };

    let affinity = affinity::classify(statement, request.catalog.as_ref());

    InferenceResult { columns, affinity }
}

/// A typed expression.
#[derive(Debug, Clone)]
struct Typed {
    data_type: String,
    nullable: bool,
    origin: Option<(String, String)>,
    derived: bool,
}

impl Typed {
    fn unknown() -> Self {
        Self {
            data_type: "unknown".to_string(),
            nullable: true,
            origin: None,
            derived: true,
        }
    }

    fn value(data_type: &str, nullable: bool) -> Self {
        Self {
            data_type: data_type.to_string(),
            nullable,
            origin: None,
            derived: true,
        }
    }
}

struct Inferencer<'a> {
    source: &'a str,
    catalog: Option<&'a SchemaCatalog>,
    system_fields: &'a [SystemFieldConfig],
    dialect: crate::types::Dialect,
    sink: &'a mut DiagnosticSink,
    scopes: Vec<Scope>,
    /// CTE visibility frames, innermost last
    ctes: Vec<HashMap<String, Vec<ColumnDescriptor>>>,
}

impl<'a> Inferencer<'a> {
    fn position_at(&self, offset: usize) -> Position {
        let mut line = 1;
        let mut column = 1;
        for (index, c) in self.source.char_indices() {
            if index >= offset {
                break;
            }
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Position::new(offset, line, column)
    }

    fn report(&mut self, kind: DiagnosticKind, code: &str, message: String, offset: usize) {
        let position = self.position_at(offset);
        self.sink.push(Diagnostic::error(kind, code, message).at(position));
    }

    /// Strip quoting, or lowercase an unquoted identifier.
    fn normalize(&self, name: &str) -> String {
        let bytes = name.as_bytes();
        if bytes.len() >= 2 {
            let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
            if (first == b'"' && last == b'"') || (first == b'`' && last == b'`') {
                let quote = name.chars().next().expect("non-empty identifier");
                let inner = &name[1..name.len() - 1];
                return inner.replace(&format!("{quote}{quote}"), &quote.to_string());
            }
        }
        name.to_ascii_lowercase()
    }

    fn lookup_table(&self, name: &QualifiedName) -> Option<&'a TableSchema> {
        let catalog = self.catalog?;
        let object = self.normalize(name.last());
        let qualifier = if name.parts.len() >= 2 {
            Some(self.normalize(&name.parts[name.parts.len() - 2]))
        } else {
            None
        };

        catalog.tables.iter().find(|table| {
            if !table.name.eq_ignore_ascii_case(&object) {
                return false;
            }
            match (&qualifier, &table.schema) {
                (Some(q), Some(s)) => s.eq_ignore_ascii_case(q),
                (Some(q), None) => catalog
                    .default_schema
                    .as_ref()
                    .is_some_and(|d| d.eq_ignore_ascii_case(q)),
                (None, _) => true,
            }
        })
    }

    fn table_descriptors(&self, table: &TableSchema) -> Vec<ColumnDescriptor> {
        table
            .columns
            .iter()
            .map(|column| ColumnDescriptor {
                name: column.name.clone(),
                origin_table: Some(table.name.clone()),
                origin_column: Some(column.name.clone()),
                data_type: column.data_type.clone(),
                nullable: column.nullable,
                is_derived: false,
            })
            .collect()
    }

    fn lookup_cte(&self, name: &str) -> Option<Vec<ColumnDescriptor>> {
        let normalized = self.normalize(name);
        self.ctes
            .iter()
            .rev()
            .find_map(|frame| frame.get(&normalized).cloned())
    }

    // ---- SELECT ----

    fn infer_select(&mut self, select: &SelectStatement) -> Vec<ColumnDescriptor> {
        let pushed_ctes = if let Some(with) = &select.with {
            self.register_ctes(with);
            true
        } else {
            false
        };

        let mut columns = self.infer_body(&select.body);

        for arm in &select.set_ops {
            let arm_columns = self.infer_body(&arm.body);
            self.unify_set_operation(&mut columns, arm_columns);
        }

        if pushed_ctes {
            self.ctes.pop();
        }
        columns
    }

    fn register_ctes(&mut self, with: &WithClause) {
        self.ctes.push(HashMap::new());
        for cte in &with.ctes {
            let columns = if with.recursive && !cte.query.set_ops.is_empty() {
                self.infer_recursive_cte(cte)
            } else {
                self.infer_select(&cte.query)
            };
            let columns = apply_cte_column_names(cte, columns);
            let key = self.normalize(&cte.name);
            self.ctes
                .last_mut()
                .expect("cte frame pushed above")
                .insert(key, columns);
        }
    }

    /// Fixed-point pass for a recursive CTE: seed from the non-recursive arm,
    /// let the recursive arm see the seed once, then require stability.
    fn infer_recursive_cte(&mut self, cte: &CteDefinition) -> Vec<ColumnDescriptor> {
        let mut seed_query = cte.query.clone();
        seed_query.set_ops.clear();
        let seed = self.infer_select(&seed_query);
        let seed = apply_cte_column_names(cte, seed);

        let key = self.normalize(&cte.name);
        self.ctes
            .last_mut()
            .expect("cte frame pushed by caller")
            .insert(key.clone(), seed.clone());

        let full = self.infer_select(&cte.query);

        if full.len() != seed.len()
            || full
                .iter()
                .zip(&seed)
                .any(|(a, b)| unify_types(&a.data_type, &b.data_type).is_none())
        {
            self.report(
                DiagnosticKind::Type,
                diagnostic_codes::UNSTABLE_RECURSIVE_CTE,
                format!(
                    "recursive CTE {:?} does not reach a stable column schema",
                    cte.name
                ),
                0,
            );
        }
        full
    }

    fn infer_body(&mut self, body: &SelectBody) -> Vec<ColumnDescriptor> {
        let mut scope = Scope::new();
        if let Some(from) = &body.from {
            self.build_scope(from, &mut scope);
        }
        self.scopes.push(scope);

        if let Some(where_clause) = &body.where_clause {
            self.type_expression(where_clause);
        }
        for group in &body.group_by {
            self.type_expression(group);
        }
        if let Some(having) = &body.having {
            self.type_expression(having);
        }

        let has_group_by = !body.group_by.is_empty();
        let mut columns = Vec::new();
        for (index, item) in body.items.iter().enumerate() {
            self.infer_select_item(item, index, has_group_by, &mut columns);
        }

        self.scopes.pop();
        columns
    }

    fn build_scope(&mut self, from: &FromClause, scope: &mut Scope) {
        let base = self.resolve_table_ref(&from.base);
        scope.relations.push(base);

        for join in &from.joins {
            let mut relation = self.resolve_table_ref(&join.table);
            if join.kind.right_side_nullable() {
                relation.forced_nullable = true;
            }
            if join.kind.left_side_nullable() {
                for existing in &mut scope.relations {
                    existing.forced_nullable = true;
                }
            }
            scope.relations.push(relation);

            if let crate::parser::JoinCondition::On(condition) = &join.condition {
                // Join conditions resolve against the partial scope built so far
                let partial = std::mem::take(scope);
                self.scopes.push(partial);
                self.type_expression(condition);
                *scope = self.scopes.pop().expect("scope pushed above");
            }
        }
    }

    fn resolve_table_ref(&mut self, table_ref: &TableRef) -> Relation {
        match table_ref {
            TableRef::Subquery { query, alias } => {
                let columns = self.infer_select(query);
                Relation {
                    name: alias
                        .as_deref()
                        .map(|a| self.normalize(a))
                        .unwrap_or_else(|| "?subquery".to_string()),
                    columns,
                    unknown: false,
                    forced_nullable: false,
                }
            }
            TableRef::Table { name, alias } => {
                let visible_name = alias
                    .as_deref()
                    .map(|a| self.normalize(a))
                    .unwrap_or_else(|| self.normalize(name.last()));

                if name.parts.len() == 1 {
                    if let Some(columns) = self.lookup_cte(name.last()) {
                        return Relation {
                            name: visible_name,
                            columns,
                            unknown: false,
                            forced_nullable: false,
                        };
                    }
                }

                match self.lookup_table(name) {
                    Some(table) => Relation {
                        name: visible_name,
                        columns: self.table_descriptors(table),
                        unknown: false,
                        forced_nullable: false,
                    },
                    None => {
                        if self.catalog.is_some() {
                            self.report(
                                DiagnosticKind::Schema,
                                diagnostic_codes::UNKNOWN_TABLE,
                                format!("unknown table {:?}", name.joined()),
                                name.span.start,
                            );
                        }
                        Relation {
                            name: visible_name,
                            columns: Vec::new(),
                            unknown: true,
                            forced_nullable: false,
                        }
                    }
                }
            }
        }
    }

    fn infer_select_item(
        &mut self,
        item: &SelectItem,
        index: usize,
        has_group_by: bool,
        columns: &mut Vec<ColumnDescriptor>,
    ) {
        match &item.expr.kind {
            ExpressionKind::Wildcard(qualifier) => {
                self.expand_wildcard(qualifier.as_deref(), item.expr.span.start, columns);
            }
            _ => {
                let typed = self.type_item_expression(&item.expr, has_group_by);
                let name = match item.alias.as_deref() {
                    Some(alias) => self.normalize(alias),
                    None => match &item.expr.kind {
                        ExpressionKind::Column(reference) => self.normalize(reference.last()),
                        _ => match &typed.origin {
                            Some((_, column)) => column.clone(),
                            None => derived_name(&item.expr, index, self),
                        },
                    },
                };
                columns.push(ColumnDescriptor {
                    name,
                    origin_table: typed.origin.as_ref().map(|(t, _)| t.clone()),
                    origin_column: typed.origin.as_ref().map(|(_, c)| c.clone()),
                    data_type: typed.data_type,
                    nullable: typed.nullable,
                    is_derived: typed.derived,
                });
            }
        }
    }

    fn expand_wildcard(
        &mut self,
        qualifier: Option<&str>,
        offset: usize,
        columns: &mut Vec<ColumnDescriptor>,
    ) {
        let Some(scope) = self.scopes.last().cloned() else {
            return;
        };

        let excluded: Vec<&str> = self
            .system_fields
            .iter()
            .filter(|f| f.exclude_from_select)
            .map(|f| f.name.as_str())
            .collect();

        let relations: Vec<Relation> = match qualifier {
            Some(qualifier) => {
                let normalized = self.normalize(qualifier);
                match scope.relation(&normalized) {
                    Some(relation) => vec![relation.clone()],
                    None => {
                        self.report(
                            DiagnosticKind::Schema,
                            diagnostic_codes::UNRESOLVED_WILDCARD,
                            format!("wildcard qualifier {qualifier:?} is not in scope"),
                            offset,
                        );
                        return;
                    }
                }
            }
            None => scope.relations.clone(),
        };

        for relation in relations {
            if relation.unknown {
                self.report(
                    DiagnosticKind::Schema,
                    diagnostic_codes::UNRESOLVED_WILDCARD,
                    format!(
                        "cannot expand wildcard: columns of {:?} are unknown",
                        relation.name
                    ),
                    offset,
                );
                continue;
            }
            for column in &relation.columns {
                if excluded.iter().any(|e| e.eq_ignore_ascii_case(&column.name)) {
                    continue;
                }
                let mut descriptor = column.clone();
                if relation.forced_nullable {
                    descriptor.nullable = true;
                }
                columns.push(descriptor);
            }
        }
    }

    fn type_item_expression(&mut self, expr: &Expression, has_group_by: bool) -> Typed {
        let mut typed = self.type_expression(expr);

        // A scalar aggregate over a possibly empty input produces NULL
        if !has_group_by {
            if let ExpressionKind::Function(call) = &expr.kind {
                if is_aggregate_function(&call.name)
                    && call.over.is_none()
                    && !call.name.eq_ignore_ascii_case("count")
                {
                    typed.nullable = true;
                }
            }
        }
        typed
    }

    // ---- expressions ----

    fn type_expression(&mut self, expr: &Expression) -> Typed {
        match &expr.kind {
            ExpressionKind::Literal(literal) => match literal {
                Literal::Number(value) => {
                    let data_type = if value.contains('.') || value.to_ascii_lowercase().contains('e')
                    {
                        "numeric"
                    } else {
                        "integer"
                    };
                    Typed::value(data_type, false)
                }
                Literal::String(_) => Typed::value("text", false),
                Literal::Boolean(_) => Typed::value("boolean", false),
                Literal::Null => Typed {
                    data_type: "unknown".to_string(),
                    nullable: true,
                    origin: None,
                    derived: true,
                },
            },
            ExpressionKind::Column(name) => self.type_column(name),
            ExpressionKind::Wildcard(_) => Typed::unknown(),
            ExpressionKind::Unary { op, operand } => {
                let operand_type = self.type_expression(operand);
                match op {
                    UnaryOp::Not => Typed::value("boolean", operand_type.nullable),
                    UnaryOp::Neg => Typed {
                        derived: true,
                        origin: None,
                        ..operand_type
                    },
                }
            }
            ExpressionKind::Binary { left, op, right } => self.type_binary(expr, left, op, right),
            ExpressionKind::IsNull { operand, .. } => {
                self.type_expression(operand);
                Typed::value("boolean", false)
            }
            ExpressionKind::InList { operand, items, .. } => {
                let operand_type = self.type_expression(operand);
                let mut nullable = operand_type.nullable;
                for item in items {
                    nullable |= self.type_expression(item).nullable;
                }
                Typed::value("boolean", nullable)
            }
            ExpressionKind::InSubquery {
                operand, subquery, ..
            } => {
                let operand_type = self.type_expression(operand);
                self.infer_select(subquery);
                Typed::value("boolean", operand_type.nullable)
            }
            ExpressionKind::Between {
                operand, low, high, ..
            } => {
                let nullable = self.type_expression(operand).nullable
                    | self.type_expression(low).nullable
                    | self.type_expression(high).nullable;
                Typed::value("boolean", nullable)
            }
            ExpressionKind::Like {
                operand,
                pattern,
                case_insensitive,
                ..
            } => {
                if *case_insensitive
                    && !dialect_supports(self.dialect, DialectFeature::CaseInsensitiveLike)
                {
                    self.report(
                        DiagnosticKind::Type,
                        diagnostic_codes::FUNCTION_SIGNATURE_MISMATCH,
                        "ILIKE is not available in this dialect".to_string(),
                        expr.span.start,
                    );
                }
                let nullable =
                    self.type_expression(operand).nullable | self.type_expression(pattern).nullable;
                Typed::value("boolean", nullable)
            }
            ExpressionKind::Case {
                operand,
                branches,
                else_branch,
            } => {
                if let Some(operand) = operand {
                    self.type_expression(operand);
                }
                let mut data_type = "unknown".to_string();
                let mut nullable = else_branch.is_none();
                for branch in branches {
                    self.type_expression(&branch.condition);
                    let result = self.type_expression(&branch.result);
                    nullable |= result.nullable;
                    data_type = unify_types(&data_type, &result.data_type)
                        .unwrap_or_else(|| data_type.clone());
                }
                if let Some(else_branch) = else_branch {
                    let result = self.type_expression(else_branch);
                    nullable |= result.nullable;
                    data_type = unify_types(&data_type, &result.data_type)
                        .unwrap_or_else(|| data_type.clone());
                }
                Typed {
                    data_type,
                    nullable,
                    origin: None,
                    derived: true,
                }
            }
            ExpressionKind::Function(call) => self.type_function(expr, call),
            ExpressionKind::Cast {
                operand,
                target_type,
            } => {
                let operand_type = self.type_expression(operand);
                Typed {
                    data_type: self.normalize(target_type),
                    nullable: operand_type.nullable,
                    origin: None,
                    derived: true,
                }
            }
            ExpressionKind::Subquery(subquery) => {
                let columns = self.infer_select(subquery);
                match columns.first() {
                    // A scalar subquery yields NULL when no row matches
                    Some(column) => Typed {
                        data_type: column.data_type.clone(),
                        nullable: true,
                        origin: None,
                        derived: true,
                    },
                    None => Typed::unknown(),
                }
            }
            ExpressionKind::Exists { subquery, .. } => {
                self.infer_select(subquery);
                Typed::value("boolean", false)
            }
            ExpressionKind::Invalid => Typed::unknown(),
        }
    }

    fn type_column(&mut self, name: &QualifiedName) -> Typed {
        let (qualifier, column) = match name.parts.len() {
            0 => return Typed::unknown(),
            1 => (None, self.normalize(&name.parts[0])),
            _ => (
                Some(self.normalize(&name.parts[name.parts.len() - 2])),
                self.normalize(name.last()),
            ),
        };

        // Innermost scope first; outer scopes serve correlated subqueries
        let mut any_scope = false;
        for scope_index in (0..self.scopes.len()).rev() {
            any_scope = true;
            let resolution = self.scopes[scope_index].resolve_column(qualifier.as_deref(), &column);
            match resolution {
                ColumnResolution::Unique(descriptor) => {
                    return Typed {
                        data_type: descriptor.data_type,
                        nullable: descriptor.nullable,
                        origin: descriptor.origin_table.zip(descriptor.origin_column),
                        derived: false,
                    };
                }
                ColumnResolution::Ambiguous(candidates) => {
                    let names: Vec<String> = candidates
                        .iter()
                        .map(|(relation, _)| format!("{relation}.{column}"))
                        .collect();
                    self.report(
                        DiagnosticKind::Schema,
                        diagnostic_codes::AMBIGUOUS_COLUMN,
                        format!(
                            "column {:?} is ambiguous; candidates: {}",
                            column,
                            names.join(", ")
                        ),
                        name.span.start,
                    );
                    return Typed {
                        data_type: "unknown".to_string(),
                        nullable: true,
                        origin: None,
                        derived: false,
                    };
                }
                ColumnResolution::PossiblyUnknown => {
                    return Typed {
                        data_type: "unknown".to_string(),
                        nullable: true,
                        origin: None,
                        derived: false,
                    };
                }
                ColumnResolution::NotFound => continue,
            }
        }

        if any_scope && self.catalog.is_some() {
            self.report(
                DiagnosticKind::Schema,
                diagnostic_codes::UNKNOWN_COLUMN,
                format!("unknown column {:?}", name.joined()),
                name.span.start,
            );
        }
        Typed {
            data_type: "unknown".to_string(),
            nullable: true,
            origin: None,
            derived: false,
        }
    }

    fn type_binary(
        &mut self,
        expr: &Expression,
        left: &Expression,
        op: &BinaryOp,
        right: &Expression,
    ) -> Typed {
        let left_type = self.type_expression(left);
        let right_type = self.type_expression(right);
        let nullable = left_type.nullable | right_type.nullable;

        match op {
            BinaryOp::And | BinaryOp::Or => Typed::value("boolean", nullable),
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Lt
            | BinaryOp::LtEq
            | BinaryOp::Gt
            | BinaryOp::GtEq => {
                if !comparable(&left_type.data_type, &right_type.data_type) {
                    self.report(
                        DiagnosticKind::Type,
                        diagnostic_codes::INCOMPATIBLE_COMPARISON,
                        format!(
                            "cannot compare {} with {}",
                            left_type.data_type, right_type.data_type
                        ),
                        expr.span.start,
                    );
                }
                Typed::value("boolean", nullable)
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let data_type = unify_types(&left_type.data_type, &right_type.data_type)
                    .unwrap_or_else(|| "numeric".to_string());
                Typed {
                    data_type,
                    nullable,
                    origin: None,
                    derived: true,
                }
            }
            BinaryOp::Concat => {
                if dialect_supports(self.dialect, DialectFeature::ConcatOperator) {
                    Typed::value("text", nullable)
                } else {
                    // MySQL: `||` is logical OR by default
                    Typed::value("boolean", nullable)
                }
            }
            BinaryOp::Other(operator) => match operator.as_str() {
                "->>" | "#>>" => Typed::value("text", true),
                "->" | "#>" => Typed::value("json", true),
                _ => Typed::unknown(),
            },
        }
    }

    fn type_function(&mut self, expr: &Expression, call: &FunctionCall) -> Typed {
        let arg_types: Vec<Typed> = call.args.iter().map(|a| self.type_expression(a)).collect();

        let Some(signature) = function_signature(self.dialect, &call.name) else {
            return Typed::unknown();
        };

        // count(*) carries a wildcard argument that doesn't count for arity
        let arity = call
            .args
            .iter()
            .filter(|a| !matches!(a.kind, ExpressionKind::Wildcard(_)))
            .count();
        let arity_ok = signature.min_args.is_none_or(|min| arity >= min)
            && signature.max_args.is_none_or(|max| arity <= max);
        if !arity_ok {
            self.report(
                DiagnosticKind::Type,
                diagnostic_codes::FUNCTION_SIGNATURE_MISMATCH,
                format!(
                    "{} does not accept {} argument(s) in this dialect",
                    call.name, arity
                ),
                expr.span.start,
            );
        }

        let data_type = match signature.return_type {
            ReturnType::Fixed(name) => name.to_string(),
            ReturnType::FromArg(index) => arg_types
                .get(index)
                .map(|t| t.data_type.clone())
                .unwrap_or_else(|| "unknown".to_string()),
        };

        let nullable = match signature.nullable {
            NullableRule::Never => false,
            NullableRule::Always => true,
            NullableRule::FromArg(index) => arg_types.get(index).is_none_or(|t| t.nullable),
            NullableRule::AnyArg => arg_types.iter().any(|t| t.nullable),
            NullableRule::AllArgs => !arg_types.is_empty() && arg_types.iter().all(|t| t.nullable),
        };

        Typed {
            data_type,
            nullable,
            origin: None,
            derived: true,
        }
    }

    // ---- set operations ----

    fn unify_set_operation(
        &mut self,
        columns: &mut [ColumnDescriptor],
        arm: Vec<ColumnDescriptor>,
    ) {
        if columns.len() != arm.len() {
            self.report(
                DiagnosticKind::Type,
                diagnostic_codes::SET_OPERATION_TYPE_MISMATCH,
                format!(
                    "set operation arms have {} and {} columns",
                    columns.len(),
                    arm.len()
                ),
                0,
            );
            return;
        }

        for (column, arm_column) in columns.iter_mut().zip(arm) {
            match unify_types(&column.data_type, &arm_column.data_type) {
                Some(unified) => column.data_type = unified,
                None => {
                    let message = format!(
                        "set operation column {:?} mixes {} and {}",
                        column.name, column.data_type, arm_column.data_type
                    );
                    self.report(
                        DiagnosticKind::Type,
                        diagnostic_codes::SET_OPERATION_TYPE_MISMATCH,
                        message,
                        0,
                    );
                }
            }
            column.nullable |= arm_column.nullable;
        }
    }

    // ---- DML ----

    fn dml_scope(&mut self, name: &QualifiedName, alias: Option<&str>) -> Scope {
        let table_ref = TableRef::Table {
            name: name.clone(),
            alias: alias.map(str::to_string),
        };
        let relation = self.resolve_table_ref(&table_ref);
        Scope {
            relations: vec![relation],
        }
    }

    fn check_target_columns(&mut self, name: &QualifiedName, columns: &[String], offset: usize) {
        let Some(table) = self.lookup_table(name) else {
            return;
        };
        let known: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();
        for column in columns {
            let normalized = self.normalize(column);
            if !known.iter().any(|k| k.eq_ignore_ascii_case(&normalized)) {
                let message = format!(
                    "table {:?} has no column {:?}",
                    name.joined(),
                    column
                );
                self.report(
                    DiagnosticKind::Schema,
                    diagnostic_codes::UNKNOWN_COLUMN,
                    message,
                    offset,
                );
            }
        }
    }

    fn infer_returning(&mut self, items: Option<&[SelectItem]>) -> Vec<ColumnDescriptor> {
        let Some(items) = items else {
            return Vec::new();
        };
        if !dialect_supports(self.dialect, DialectFeature::Returning) {
            self.report(
                DiagnosticKind::Structural,
                diagnostic_codes::UNEXPECTED_CLAUSE,
                "RETURNING is not available in this dialect".to_string(),
                items
                    .first()
                    .map(|i| i.expr.span.start)
                    .unwrap_or_default(),
            );
        }
        let mut columns = Vec::new();
        for (index, item) in items.iter().enumerate() {
            self.infer_select_item(item, index, false, &mut columns);
        }
        columns
    }

    fn infer_insert(&mut self, insert: &crate::parser::InsertStatement) -> Vec<ColumnDescriptor> {
        if let Some(with) = &insert.with {
            self.register_ctes(with);
        }

        self.check_target_columns(&insert.table, &insert.columns, insert.table.span.start);

        match &insert.source {
            InsertSource::Values { rows } => {
                for row in rows {
                    for value in row {
                        self.type_expression(value);
                    }
                }
            }
            InsertSource::Select(select) => {
                self.infer_select(select);
            }
        }

        let scope = self.dml_scope(&insert.table, None);
        self.scopes.push(scope);
        let columns = self.infer_returning(insert.returning.as_deref());
        self.scopes.pop();

        if insert.with.is_some() {
            self.ctes.pop();
        }
        columns
    }

    fn infer_update(&mut self, update: &crate::parser::UpdateStatement) -> Vec<ColumnDescriptor> {
        if let Some(with) = &update.with {
            self.register_ctes(with);
        }

        let assignment_columns: Vec<String> = update
            .assignments
            .iter()
            .map(|a: &Assignment| a.column.clone())
            .collect();
        self.check_target_columns(&update.table, &assignment_columns, update.table.span.start);

        let mut scope = self.dml_scope(&update.table, update.alias.as_deref());
        if let Some(from) = &update.from {
            self.build_scope(from, &mut scope);
        }
        self.scopes.push(scope);

        for assignment in &update.assignments {
            self.type_expression(&assignment.value);
        }
        if let Some(where_clause) = &update.where_clause {
            self.type_expression(where_clause);
        }
        let columns = self.infer_returning(update.returning.as_deref());
        self.scopes.pop();

        if update.with.is_some() {
            self.ctes.pop();
        }
        columns
    }

    fn infer_delete(&mut self, delete: &crate::parser::DeleteStatement) -> Vec<ColumnDescriptor> {
        if let Some(with) = &delete.with {
            self.register_ctes(with);
        }

        let scope = self.dml_scope(&delete.table, delete.alias.as_deref());
        self.scopes.push(scope);

        if let Some(where_clause) = &delete.where_clause {
            self.type_expression(where_clause);
        }
        let columns = self.infer_returning(delete.returning.as_deref());
        self.scopes.pop();

        if delete.with.is_some() {
            self.ctes.pop();
        }
        columns
    }
}

fn apply_cte_column_names(
    cte: &CteDefinition,
    mut columns: Vec<ColumnDescriptor>,
) -> Vec<ColumnDescriptor> {
    if let Some(names) = &cte.columns {
        for (column, name) in columns.iter_mut().zip(names) {
            column.name = name.to_ascii_lowercase();
        }
    }
    columns
}

/// Synthetic name for an expression without a natural one.
fn derived_name(expr: &Expression, index: usize, inferencer: &Inferencer) -> String {
    match &expr.kind {
        ExpressionKind::Function(call) => inferencer.normalize(&call.name),
        _ => format!("column_{}", index + 1),
    }
}

/// Type families for comparison and unification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeFamily {
    Numeric,
    Text,
    Boolean,
    Temporal,
    Json,
    Array,
    Interval,
    Unknown,
}

fn type_family(data_type: &str) -> TypeFamily {
    let base = data_type
        .split('(')
        .next()
        .unwrap_or(data_type)
        .trim()
        .to_ascii_lowercase();
    match base.as_str() {
        "smallint" | "int" | "int2" | "int4" | "int8" | "integer" | "bigint" | "serial"
        | "bigserial" | "numeric" | "decimal" | "real" | "float" | "float4" | "float8"
        | "double precision" | "double" | "money" => TypeFamily::Numeric,
        "text" | "varchar" | "char" | "character" | "character varying" | "citext" | "uuid"
        | "name" => TypeFamily::Text,
        "boolean" | "bool" => TypeFamily::Boolean,
        "date" | "time" | "timetz" | "timestamp" | "timestamptz"
        | "timestamp with time zone" | "timestamp without time zone" | "datetime" => {
            TypeFamily::Temporal
        }
        "json" | "jsonb" => TypeFamily::Json,
        "array" => TypeFamily::Array,
        "interval" => TypeFamily::Interval,
        _ => TypeFamily::Unknown,
    }
}

/// Rank within the numeric family; higher absorbs lower.
fn numeric_rank(data_type: &str) -> u8 {
    let base = data_type
        .split('(')
        .next()
        .unwrap_or(data_type)
        .trim()
        .to_ascii_lowercase();
    match base.as_str() {
        "smallint" | "int2" => 1,
        "int" | "int4" | "integer" | "serial" => 2,
        "bigint" | "int8" | "bigserial" => 3,
        "numeric" | "decimal" | "money" => 4,
        "real" | "float4" | "float" => 5,
        "double precision" | "double" | "float8" => 6,
        _ => 0,
    }
}

/// Unify two types: unknown yields to known, numerics widen, equal families
/// keep the left type. Returns `None` when the families are incompatible.
fn unify_types(a: &str, b: &str) -> Option<String> {
    let family_a = type_family(a);
    let family_b = type_family(b);
    if family_a == TypeFamily::Unknown {
        return Some(b.to_string());
    }
    if family_b == TypeFamily::Unknown {
        return Some(a.to_string());
    }
    if family_a != family_b {
        return None;
    }
    if family_a == TypeFamily::Numeric {
        return Some(if numeric_rank(a) >= numeric_rank(b) {
            a.to_string()
        } else {
            b.to_string()
        });
    }
    Some(a.to_string())
}

/// Whether a comparison between the two types is well formed.
fn comparable(a: &str, b: &str) -> bool {
    let family_a = type_family(a);
    let family_b = type_family(b);
    family_a == TypeFamily::Unknown || family_b == TypeFamily::Unknown || family_a == family_b
}
