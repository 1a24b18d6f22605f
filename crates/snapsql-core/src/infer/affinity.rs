//! Response affinity classification.
//!
//! A statement is `one` when it can return at most one row: `LIMIT 1`, an
//! equality predicate covering a unique key, or a scalar aggregate without
//! `GROUP BY`. DML without `RETURNING` is `none`; everything else is `many`.

use crate::parser::{
    BinaryOp, Expression, ExpressionKind, InsertSource, Literal, SelectStatement, Statement,
    TableRef,
};
use crate::types::{ResponseAffinity, SchemaCatalog};

use super::functions::is_aggregate_function;

/// Classify a statement's result shape.
pub fn classify(statement: &Statement, catalog: Option<&SchemaCatalog>) -> ResponseAffinity {
    match statement {
        Statement::Select(select) => select_affinity(select, catalog),
        Statement::Insert(insert) => {
            if insert.returning.is_none() {
                ResponseAffinity::None
            } else {
                // A single literal VALUES row returns exactly one row
                match &insert.source {
                    InsertSource::Values { rows } if rows.len() == 1 => ResponseAffinity::One,
                    _ => ResponseAffinity::Many,
                }
            }
        }
        Statement::Update(update) => {
            if update.returning.is_none() {
                ResponseAffinity::None
            } else {
                ResponseAffinity::Many
            }
        }
        Statement::Delete(delete) => {
            if delete.returning.is_none() {
                ResponseAffinity::None
            } else {
                ResponseAffinity::Many
            }
        }
    }
}

fn select_affinity(select: &SelectStatement, catalog: Option<&SchemaCatalog>) -> ResponseAffinity {
    if !select.set_ops.is_empty() {
        return ResponseAffinity::Many;
    }

    if let Some(limit) = &select.limit {
        if matches!(&limit.kind, ExpressionKind::Literal(Literal::Number(n)) if n == "1") {
            return ResponseAffinity::One;
        }
    }

    if is_scalar_aggregate(select) {
        return ResponseAffinity::One;
    }

    if covers_unique_key(select, catalog) {
        return ResponseAffinity::One;
    }

    ResponseAffinity::Many
}

/// All select items are aggregate calls and there is no `GROUP BY`.
fn is_scalar_aggregate(select: &SelectStatement) -> bool {
    if !select.body.group_by.is_empty() || select.body.items.is_empty() {
        return false;
    }
    select.body.items.iter().all(|item| {
        matches!(
            &item.expr.kind,
            ExpressionKind::Function(call)
                if is_aggregate_function(&call.name) && call.over.is_none()
        )
    })
}

/// Single-table SELECT whose WHERE conjunction pins every column of some
/// unique key with equality.
fn covers_unique_key(select: &SelectStatement, catalog: Option<&SchemaCatalog>) -> bool {
    let Some(catalog) = catalog else { return false };
    let Some(from) = &select.body.from else {
        return false;
    };
    if !from.joins.is_empty() {
        return false;
    }
    let TableRef::Table { name, alias } = &from.base else {
        return false;
    };
    let Some(where_clause) = &select.body.where_clause else {
        return false;
    };

    let object = name.last().to_ascii_lowercase();
    let Some(table) = catalog
        .tables
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(&object))
    else {
        return false;
    };

    let visible = alias
        .as_deref()
        .map(|a| a.to_ascii_lowercase())
        .unwrap_or_else(|| object.clone());

    let mut pinned = Vec::new();
    collect_equality_columns(where_clause, &visible, &mut pinned);

    table.unique_column_sets().iter().any(|set| {
        !set.is_empty()
            && set
                .iter()
                .all(|key| pinned.iter().any(|p| p.eq_ignore_ascii_case(key)))
    })
}

/// Collect column names pinned by `column = <expr>` conjuncts.
fn collect_equality_columns(expr: &Expression, table: &str, pinned: &mut Vec<String>) {
    match &expr.kind {
        ExpressionKind::Binary {
            left,
            op: BinaryOp::And,
            right,
        } => {
            collect_equality_columns(left, table, pinned);
            collect_equality_columns(right, table, pinned);
        }
        ExpressionKind::Binary {
            left,
            op: BinaryOp::Eq,
            right,
        } => {
            if let Some(column) = column_of(left, table) {
                if !matches!(right.kind, ExpressionKind::Column(_)) {
                    pinned.push(column);
                }
            } else if let Some(column) = column_of(right, table) {
                if !matches!(left.kind, ExpressionKind::Column(_)) {
                    pinned.push(column);
                }
            }
        }
        _ => {}
    }
}

fn column_of(expr: &Expression, table: &str) -> Option<String> {
    let ExpressionKind::Column(name) = &expr.kind else {
        return None;
    };
    match name.parts.len() {
        1 => Some(name.parts[0].to_ascii_lowercase()),
        2 if name.parts[0].eq_ignore_ascii_case(table) => {
            Some(name.parts[1].to_ascii_lowercase())
        }
        _ => None,
    }
}
