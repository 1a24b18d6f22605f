//! Response types: the intermediate document contract.
//!
//! The shape of [`IntermediateFormat`] is what is standardized, not its JSON
//! encoding. Instruction order, parameter order, and result-column order are
//! part of the contract and stable under recompilation of identical inputs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{Diagnostic, Summary};
use super::request::Dialect;

/// Everything a compilation produces: the document (when the pipeline reached
/// the emitter), the ordered diagnostic list, and summary statistics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    /// The intermediate document; absent only when compilation could not get
    /// past tokenization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<IntermediateFormat>,

    /// Diagnostics ordered by source position
    pub diagnostics: Vec<Diagnostic>,

    /// Summary statistics
    pub summary: Summary,
}

/// Current intermediate format version.
pub const FORMAT_VERSION: u32 = 1;

/// The language-neutral intermediate document consumed by code generators
/// and the execution runtime.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntermediateFormat {
    /// Format version, currently 1
    pub format_version: u32,

    /// Function name from the template header, or derived from the path stem
    pub function_name: String,

    /// Human description from the template header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_description: Option<String>,

    /// Dialect the template was compiled for
    pub dialect: Dialect,

    /// Parameter schema in first-reference order (header declarations first)
    pub parameters: Vec<Parameter>,

    /// Result row shape for statements that return rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_row: Option<Vec<ResultField>>,

    /// Result shape classification
    pub response_affinity: ResponseAffinity,

    /// The flat instruction sequence
    pub instructions: Vec<Instruction>,

    /// The template source this document was compiled from
    pub source: SourceInfo,

    /// False when error-level diagnostics were produced
    pub valid: bool,
}

/// The template source embedded in the document.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub content: String,
}

/// One node of the parameter schema tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,

    #[serde(rename = "type")]
    pub param_type: ParamType,

    /// True for system fields the runtime sources from an ambient context
    /// rather than the call site
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub implicit: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            implicit: false,
        }
    }
}

/// A parameter type: a scalar, a uniform list, or a record with named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParamType {
    Bool,
    Int,
    Float,
    Decimal,
    String,
    Date,
    Timestamp,
    Json,
    /// Not yet constrained by any use site
    Any,
    List {
        element: Box<ParamType>,
    },
    Record {
        fields: Vec<Parameter>,
    },
}

impl ParamType {
    /// Whether this type carries no information (`any`, or a list of `any`).
    pub fn is_unconstrained(&self) -> bool {
        match self {
            ParamType::Any => true,
            ParamType::List { element } => element.is_unconstrained(),
            _ => false,
        }
    }
}

/// Semantic role of a variable site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum VariableRole {
    /// A single bound value
    Scalar,
    /// The sole argument of `IN (...)`, expanded to one placeholder per item
    ListExpansion,
    /// Spliced into an identifier; constrained to identifier characters
    IdentifierSuffix,
    /// A `VALUES` row source for bulk inserts
    BulkRow,
}

/// One instruction of the flat IR.
///
/// `EmitStatic` text chunks are verbatim template source with directive
/// comments and dummy literals removed; replaying the sequence with all
/// conditions false and all loops empty reproduces the template's static
/// prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Instruction {
    EmitStatic {
        text: String,
    },
    EmitParam {
        expr: String,
        role: VariableRole,
        /// The dummy literal the runtime deletes at substitution time
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dummy: Option<String>,
    },
    EmitIdentifier {
        expr: String,
    },
    BeginIf {
        condition: String,
    },
    ElseIf {
        condition: String,
    },
    Else,
    EndIf,
    BeginFor {
        variable: String,
        iterable: String,
    },
    EndFor,
    /// Trim hint so the runtime can drop empty clauses and dangling
    /// connectives without reparsing
    EmitBoundary {
        boundary: BoundaryKind,
    },
}

/// What an [`Instruction::EmitBoundary`] marker delimits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryKind {
    Where,
    OrderBy,
    Limit,
    Offset,
    /// Between comma-separated list items
    ListItem,
}

/// A fully resolved output column (the inference-stage artifact).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    /// Emitted name: explicit alias, source column name, or a positional
    /// synthetic name for unnamed expressions
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_column: Option<String>,

    /// Dialect type name, or `unknown` when resolution failed
    pub data_type: String,

    pub nullable: bool,

    /// True for computed expressions (anything that is not a bare column)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_derived: bool,
}

/// One field of the (possibly nested) result-row shape.
///
/// Aliases containing `__` fold into nested records: `departments__name`
/// contributes a `name` field under a `departments` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResultField {
    pub name: String,

    /// Absent on record fields that only group nested columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_column: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_derived: bool,

    /// Nested fields, present only on record entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<ResultField>,
}

impl ResultField {
    /// A leaf field carrying one column descriptor.
    pub fn leaf(descriptor: &ColumnDescriptor, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: Some(descriptor.data_type.clone()),
            nullable: Some(descriptor.nullable),
            origin_table: descriptor.origin_table.clone(),
            origin_column: descriptor.origin_column.clone(),
            is_derived: descriptor.is_derived,
            fields: Vec::new(),
        }
    }

    /// A record entry grouping nested fields.
    pub fn record(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
            nullable: None,
            origin_table: None,
            origin_column: None,
            is_derived: false,
            fields: Vec::new(),
        }
    }
}

/// Result shape classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseAffinity {
    /// At most one row (unique-key lookup, `LIMIT 1`, scalar aggregate)
    One,
    /// A row set
    Many,
    /// No result rows (DML without `RETURNING`)
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_serialization() {
        let instructions = vec![
            Instruction::EmitStatic {
                text: "SELECT id, name".to_string(),
            },
            Instruction::BeginIf {
                condition: "include_email".to_string(),
            },
            Instruction::EmitStatic {
                text: ", email".to_string(),
            },
            Instruction::EndIf,
        ];

        let json = serde_json::to_value(&instructions).unwrap();
        assert_eq!(json[0]["op"], "emitStatic");
        assert_eq!(json[1]["op"], "beginIf");
        assert_eq!(json[1]["condition"], "include_email");
        assert_eq!(json[3]["op"], "endIf");

        let back: Vec<Instruction> = serde_json::from_value(json).unwrap();
        assert_eq!(back, instructions);
    }

    #[test]
    fn test_param_type_serialization() {
        let param = Parameter::new(
            "rows",
            ParamType::List {
                element: Box::new(ParamType::Record {
                    fields: vec![
                        Parameter::new("name", ParamType::String),
                        Parameter::new("price", ParamType::Float),
                    ],
                }),
            },
        );

        let json = serde_json::to_value(&param).unwrap();
        assert_eq!(json["type"]["kind"], "list");
        assert_eq!(json["type"]["element"]["kind"], "record");
        assert_eq!(json["type"]["element"]["fields"][0]["name"], "name");
    }

    #[test]
    fn test_param_type_unconstrained() {
        assert!(ParamType::Any.is_unconstrained());
        assert!(ParamType::List {
            element: Box::new(ParamType::Any)
        }
        .is_unconstrained());
        assert!(!ParamType::Int.is_unconstrained());
    }

    #[test]
    fn test_affinity_wire_values() {
        assert_eq!(
            serde_json::to_string(&ResponseAffinity::One).unwrap(),
            "\"one\""
        );
        assert_eq!(
            serde_json::to_string(&ResponseAffinity::None).unwrap(),
            "\"none\""
        );
    }

    #[test]
    fn test_implicit_flag_omitted_when_false() {
        let param = Parameter::new("id", ParamType::Int);
        let json = serde_json::to_string(&param).unwrap();
        assert!(!json.contains("implicit"));
    }
}
