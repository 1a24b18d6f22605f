//! Stage M: document assembly.
//!
//! Wraps the IR with the function definition, parameter schema, result-row
//! shape, response affinity, and source. Aliases containing `__` fold into
//! nested records here, so downstream emitters can expose structured rows.

use crate::header::TemplateHeader;
use crate::infer::InferenceResult;
use crate::types::{
    ColumnDescriptor, CompileRequest, Instruction, IntermediateFormat, Parameter,
    ResponseAffinity, ResultField, SourceInfo, FORMAT_VERSION,
};

/// Assemble the intermediate document.
pub fn attach(
    request: &CompileRequest,
    header: Option<&TemplateHeader>,
    parameters: Vec<Parameter>,
    inference: &InferenceResult,
    instructions: Vec<Instruction>,
    valid: bool,
) -> IntermediateFormat {
    let function_name = header
        .and_then(|h| h.function_name.clone())
        .or_else(|| request.source_path.as_deref().map(function_name_from_path))
        .unwrap_or_else(|| "query".to_string());

    let result_row = if inference.affinity == ResponseAffinity::None {
        None
    } else {
        Some(nest_columns(&inference.columns))
    };

    IntermediateFormat {
        format_version: FORMAT_VERSION,
        function_name,
        function_description: header.and_then(|h| h.description.clone()),
        dialect: request.dialect,
        parameters,
        result_row,
        response_affinity: inference.affinity,
        instructions,
        source: SourceInfo {
            path: request.source_path.clone(),
            content: request.source.clone(),
        },
        valid,
    }
}

/// Derive a function name from the source path stem
/// (`queries/find_users.snap.sql` becomes `find_users`).
fn function_name_from_path(path: &str) -> String {
    let file = path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path);
    let stem = file.split('.').next().unwrap_or(file);
    stem.to_string()
}

/// Fold `a__b` column names into nested records, preserving first-occurrence
/// order at every level.
fn nest_columns(columns: &[ColumnDescriptor]) -> Vec<ResultField> {
    let mut fields: Vec<ResultField> = Vec::new();
    for column in columns {
        insert_nested(&mut fields, &column.name, column);
    }
    fields
}

fn insert_nested(fields: &mut Vec<ResultField>, name: &str, column: &ColumnDescriptor) {
    match name.split_once("__") {
        None => fields.push(ResultField::leaf(column, name)),
        Some((group, rest)) if !group.is_empty() && !rest.is_empty() => {
            let record = match fields
                .iter_mut()
                .find(|f| f.name == group && !f.fields.is_empty())
            {
                Some(existing) => existing,
                None => {
                    fields.push(ResultField::record(group));
                    fields.last_mut().expect("pushed above")
                }
            };
            insert_nested(&mut record.fields, rest, column);
        }
        // Degenerate names like `__x` stay flat
        Some(_) => fields.push(ResultField::leaf(column, name)),
    }
}
