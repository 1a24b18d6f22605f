pub mod common;
pub mod request;
pub mod response;

pub use common::{
    diagnostic_codes, Diagnostic, DiagnosticCount, DiagnosticKind, DiagnosticSink, Position,
    Severity, Span, Summary,
};
pub use request::{
    ColumnSchema, CompileOptions, CompileRequest, ConstraintType, Dialect, EmptyInPolicy,
    IndexSchema, ParameterMode, SchemaCatalog, SystemFieldAction, SystemFieldConfig,
    TableConstraint, TableSchema,
};
pub use response::{
    BoundaryKind, ColumnDescriptor, CompileResult, Instruction, IntermediateFormat, ParamType,
    Parameter, ResponseAffinity, ResultField, SourceInfo, VariableRole, FORMAT_VERSION,
};
