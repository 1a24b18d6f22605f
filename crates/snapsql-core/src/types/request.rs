//! Request types for the template compilation API.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A request to compile a two-way SQL template.
///
/// This is the main entry point of the compiler API. It carries the template
/// source along with the injected schema catalog, system-field configuration,
/// and dialect. The compiler performs no I/O: everything it consumes arrives
/// fully materialized on this struct.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    /// The template source text (UTF-8, one SQL statement with directives)
    pub source: String,

    /// Optional source path, used to derive the function name when the
    /// template has no header (`queries/find_users.snap.sql` -> `find_users`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,

    /// SQL dialect
    pub dialect: Dialect,

    /// Optional schema catalog for table/column resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<SchemaCatalog>,

    /// System fields sourced from configuration rather than the template
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system_fields: Vec<SystemFieldConfig>,

    /// Optional compile options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<CompileOptions>,
}

/// SQL dialect for tokenizing, parsing, and type inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    Mysql,
    Sqlite,
    Mariadb,
}

impl Dialect {
    /// Whether string literals may use dollar quoting (`$tag$ ... $tag$`).
    pub const fn supports_dollar_quoting(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

/// Options controlling compilation behavior.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompileOptions {
    /// Policy applied when a list-expansion site receives an empty list at
    /// runtime. When unset and the template contains a list-expansion site,
    /// the compiler attaches a configuration warning instead of guessing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_in_policy: Option<EmptyInPolicy>,

    /// Compile-time constants referenced by `/*# const name */` directives.
    /// Values are inlined into the IR as static SQL text.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub constants: IndexMap<String, serde_json::Value>,
}

/// What the runtime should do with `IN (...)` when the bound list is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyInPolicy {
    /// Remove the whole predicate (and a dangling AND/OR connective)
    DropPredicate,
    /// Substitute `IN (NULL)`, which matches no rows
    SubstituteNull,
}

/// An injected schema catalog.
///
/// The compiler never connects to a database; extraction from a live schema
/// is a separate concern that merely produces this structure.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct SchemaCatalog {
    /// Default schema applied to unqualified table references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_schema: Option<String>,

    /// Canonical table definitions
    #[serde(default)]
    pub tables: Vec<TableSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    /// Owning schema, when qualified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    pub name: String,

    /// Columns in declaration order (wildcard expansion preserves this order)
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,

    /// Table-level constraints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<TableConstraint>,

    /// Secondary indexes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexSchema>,
}

impl TableSchema {
    /// Columns forming the primary key, in declaration order.
    pub fn primary_key_columns(&self) -> Vec<&str> {
        let from_columns: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
            .collect();
        if !from_columns.is_empty() {
            return from_columns;
        }
        self.constraints
            .iter()
            .find(|c| c.constraint_type == ConstraintType::PrimaryKey)
            .map(|c| c.columns.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Column sets that uniquely identify a row (primary key plus unique
    /// constraints and unique indexes).
    pub fn unique_column_sets(&self) -> Vec<Vec<&str>> {
        let mut sets = Vec::new();
        let pk = self.primary_key_columns();
        if !pk.is_empty() {
            sets.push(pk);
        }
        for constraint in &self.constraints {
            if constraint.constraint_type == ConstraintType::Unique {
                sets.push(constraint.columns.iter().map(String::as_str).collect());
            }
        }
        for index in &self.indexes {
            if index.unique {
                sets.push(index.columns.iter().map(String::as_str).collect());
            }
        }
        sets
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub name: String,

    /// Dialect type name (`integer`, `varchar`, `timestamp`, ...)
    pub data_type: String,

    #[serde(default)]
    pub nullable: bool,

    /// Default expression, verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default)]
    pub is_primary_key: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub constraint_type: ConstraintType,

    /// Columns the constraint covers, in declaration order
    #[serde(default)]
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ConstraintType {
    PrimaryKey,
    Unique,
    ForeignKey,
    Check,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IndexSchema {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// A configured system field (`created_at`, `updated_by`, ...).
///
/// System fields are columns whose values at INSERT/UPDATE time come from
/// configuration or an implicit runtime context rather than the template
/// author.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SystemFieldConfig {
    pub name: String,

    /// Dialect type name of the field
    pub data_type: String,

    /// When true, wildcard expansion omits this column from SELECT results
    #[serde(default)]
    pub exclude_from_select: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_insert: Option<SystemFieldAction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<SystemFieldAction>,
}

/// How a system field is sourced for one kind of write.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct SystemFieldAction {
    /// Default SQL expression applied when no parameter is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Whether (and how) a parameter may supply the value
    #[serde(default)]
    pub parameter: ParameterMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParameterMode {
    /// Caller passes the value explicitly
    Explicit,
    /// Runtime sources the value from an ambient context
    Implicit,
    /// Mentioning the field in the template is a configuration error
    Error,
    /// The field takes no parameter at all
    #[default]
    None,
}
