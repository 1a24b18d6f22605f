//! Template header front matter.
//!
//! A template may begin with a `/*# ... */` comment carrying YAML metadata:
//!
//! ```sql
//! /*#
//! function_name: find_users
//! description: Find users filtered by department.
//! parameters:
//!   depts: string[]
//!   include_email: bool
//! */
//! SELECT ...
//! ```
//!
//! `parameters` entries are type annotations that refine the inferred
//! parameter schema. Scalars use the names below, `T[]` declares a list, and
//! a nested mapping declares a record.

use indexmap::IndexMap;

use crate::token::{Token, TokenKind};
use crate::types::{diagnostic_codes, Diagnostic, DiagnosticKind, ParamType, Parameter};

/// Parsed front matter of a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateHeader {
    pub function_name: Option<String>,
    pub description: Option<String>,
    /// Declared parameter annotations, in declaration order
    pub parameters: IndexMap<String, ParamType>,
}

/// Index of the front-matter comment token, when the template has one.
///
/// The front matter is consumed as metadata, never as SQL; the emitter uses
/// this to keep it out of the IR's static text.
pub fn header_token_index(tokens: &[Token]) -> Option<usize> {
    let (index, token) = tokens
        .iter()
        .enumerate()
        .find(|(_, t)| t.kind != TokenKind::Whitespace)?;
    (token.kind == TokenKind::BlockComment
        && token.value.starts_with("/*#")
        && token.value.ends_with("*/")
        && token.value.len() >= 5)
        .then_some(index)
}

/// Extract the header from the first comment of the token stream, if any.
pub fn parse_header(tokens: &[Token]) -> (Option<TemplateHeader>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();

    let Some(index) = header_token_index(tokens) else {
        return (None, diagnostics);
    };
    let token = &tokens[index];

    let body = token.value[3..token.value.len() - 2].trim();
    let value: serde_yaml::Value = match serde_yaml::from_str(body) {
        Ok(value) => value,
        Err(err) => {
            diagnostics.push(
                Diagnostic::error(
                    DiagnosticKind::Configuration,
                    diagnostic_codes::INVALID_HEADER,
                    format!("template header is not valid YAML: {err}"),
                )
                .at(token.position),
            );
            return (None, diagnostics);
        }
    };

    let serde_yaml::Value::Mapping(mapping) = value else {
        diagnostics.push(
            Diagnostic::error(
                DiagnosticKind::Configuration,
                diagnostic_codes::INVALID_HEADER,
                "template header must be a YAML mapping",
            )
            .at(token.position),
        );
        return (None, diagnostics);
    };

    let mut header = TemplateHeader::default();
    for (key, entry) in &mapping {
        let Some(key) = key.as_str() else { continue };
        match key {
            "function_name" => header.function_name = entry.as_str().map(str::to_string),
            "description" => header.description = entry.as_str().map(str::to_string),
            "parameters" => {
                if let serde_yaml::Value::Mapping(params) = entry {
                    for (name, annotation) in params {
                        let Some(name) = name.as_str() else { continue };
                        match parse_type_annotation(annotation) {
                            Some(param_type) => {
                                header.parameters.insert(name.to_string(), param_type);
                            }
                            None => diagnostics.push(
                                Diagnostic::error(
                                    DiagnosticKind::Configuration,
                                    diagnostic_codes::INVALID_HEADER,
                                    format!("unknown type annotation for parameter {name:?}"),
                                )
                                .at(token.position),
                            ),
                        }
                    }
                } else {
                    diagnostics.push(
                        Diagnostic::error(
                            DiagnosticKind::Configuration,
                            diagnostic_codes::INVALID_HEADER,
                            "parameters must be a mapping of name to type",
                        )
                        .at(token.position),
                    );
                }
            }
            _ => {}
        }
    }

    (Some(header), diagnostics)
}

/// Parse one type annotation: a scalar name, `T[]`, or a nested mapping.
fn parse_type_annotation(value: &serde_yaml::Value) -> Option<ParamType> {
    match value {
        serde_yaml::Value::String(name) => parse_type_name(name),
        serde_yaml::Value::Mapping(fields) => {
            let mut parameters = Vec::new();
            for (field_name, field_type) in fields {
                let name = field_name.as_str()?;
                let param_type = parse_type_annotation(field_type)?;
                parameters.push(Parameter::new(name, param_type));
            }
            Some(ParamType::Record { fields: parameters })
        }
        _ => None,
    }
}

fn parse_type_name(name: &str) -> Option<ParamType> {
    let trimmed = name.trim();
    if let Some(element) = trimmed.strip_suffix("[]") {
        return parse_type_name(element).map(|element| ParamType::List {
            element: Box::new(element),
        });
    }

    match trimmed.to_ascii_lowercase().as_str() {
        "int" | "integer" | "bigint" => Some(ParamType::Int),
        "float" | "double" | "number" => Some(ParamType::Float),
        "decimal" | "numeric" => Some(ParamType::Decimal),
        "string" | "text" | "varchar" => Some(ParamType::String),
        "bool" | "boolean" => Some(ParamType::Bool),
        "date" => Some(ParamType::Date),
        "timestamp" | "datetime" => Some(ParamType::Timestamp),
        "json" => Some(ParamType::Json),
        "any" => Some(ParamType::Any),
        _ => None,
    }
}
