//! JSON Schema export for the contract types.

use anyhow::{Context, Result};
use schemars::schema_for;

use crate::cli::SchemaTarget;

/// Render the JSON Schema for one of the public contract types.
pub fn render_schema(target: SchemaTarget) -> Result<String> {
    let schema = match target {
        SchemaTarget::Request => schema_for!(snapsql_core::CompileRequest),
        SchemaTarget::Document => schema_for!(snapsql_core::IntermediateFormat),
    };
    serde_json::to_string_pretty(&schema).context("Failed to serialize schema")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_schema_renders() {
        let schema = render_schema(SchemaTarget::Request).unwrap();
        assert!(schema.contains("dialect"));
        assert!(schema.contains("catalog"));
    }

    #[test]
    fn test_document_schema_renders() {
        let schema = render_schema(SchemaTarget::Document).unwrap();
        assert!(schema.contains("instructions"));
        assert!(schema.contains("responseAffinity"));
    }
}
