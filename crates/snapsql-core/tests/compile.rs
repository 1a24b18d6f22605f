//! End-to-end compilation scenarios.

use snapsql_core::{
    compile, BoundaryKind, ColumnSchema, CompileRequest, Dialect, DiagnosticKind, Instruction,
    ParamType, ResponseAffinity, SchemaCatalog, Severity, TableSchema, VariableRole,
};

fn column(name: &str, data_type: &str, nullable: bool, pk: bool) -> ColumnSchema {
    ColumnSchema {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable,
        default: None,
        comment: None,
        is_primary_key: pk,
        max_length: None,
        precision: None,
        scale: None,
    }
}

fn table(name: &str, columns: Vec<ColumnSchema>) -> TableSchema {
    TableSchema {
        schema: None,
        name: name.to_string(),
        columns,
        constraints: Vec::new(),
        indexes: Vec::new(),
    }
}

fn catalog() -> SchemaCatalog {
    SchemaCatalog {
        default_schema: None,
        tables: vec![
            table(
                "users",
                vec![
                    column("id", "integer", false, true),
                    column("name", "varchar", false, false),
                    column("email", "varchar", true, false),
                    column("dept", "varchar", true, false),
                    column("dept_id", "integer", true, false),
                ],
            ),
            table(
                "departments",
                vec![
                    column("id", "integer", false, true),
                    column("name", "varchar", false, false),
                ],
            ),
            table(
                "products",
                vec![
                    column("id", "integer", false, true),
                    column("name", "varchar", false, false),
                    column("price", "numeric", false, false),
                ],
            ),
        ],
    }
}

fn request(source: &str) -> CompileRequest {
    CompileRequest {
        source: source.to_string(),
        source_path: Some("queries/test.snap.sql".to_string()),
        dialect: Dialect::Postgres,
        catalog: Some(catalog()),
        system_fields: Vec::new(),
        options: None,
    }
}

#[test]
fn conditional_field() {
    let result = compile(&request(
        "SELECT id, name /*# if include_email */, email /*# end */ FROM users",
    ));
    assert!(!result.summary.has_errors, "{:?}", result.diagnostics);
    let document = result.document.unwrap();
    assert!(document.valid);

    let include_email = document
        .parameters
        .iter()
        .find(|p| p.name == "include_email")
        .expect("missing parameter");
    assert_eq!(include_email.param_type, ParamType::Bool);

    let row = document.result_row.unwrap();
    let names: Vec<&str> = row.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "email"]);

    assert_eq!(
        document.instructions,
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
fn in_list_expansion() {
    let result = compile(&request("SELECT * FROM users WHERE dept IN (/*= depts */'x')"));
    assert!(!result.summary.has_errors, "{:?}", result.diagnostics);
    let document = result.document.unwrap();

    let depts = document
        .parameters
        .iter()
        .find(|p| p.name == "depts")
        .expect("missing parameter");
    assert_eq!(
        depts.param_type,
        ParamType::List {
            element: Box::new(ParamType::String)
        }
    );

    let param = document
        .instructions
        .iter()
        .find_map(|i| match i {
            Instruction::EmitParam { expr, role, dummy } => Some((expr, role, dummy)),
            _ => None,
        })
        .expect("missing EmitParam");
    assert_eq!(param.0, "depts");
    assert_eq!(*param.1, VariableRole::ListExpansion);
    assert_eq!(param.2.as_deref(), Some("'x'"));

    // No policy configured: the compiler flags the choice instead of guessing
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.code == "EMPTY_LIST_POLICY_UNSET" && d.severity == Severity::Warning));

    // Wildcard expansion resolved every column
    let row = document.result_row.unwrap();
    assert_eq!(row.len(), 5);
}

#[test]
fn bulk_insert() {
    let result = compile(&request(
        "INSERT INTO products (name, price) VALUES /*= rows */('x', 0)",
    ));
    assert!(!result.summary.has_errors, "{:?}", result.diagnostics);
    let document = result.document.unwrap();

    assert_eq!(document.response_affinity, ResponseAffinity::None);
    assert!(document.result_row.is_none());

    let rows = document
        .parameters
        .iter()
        .find(|p| p.name == "rows")
        .expect("missing parameter");
    match &rows.param_type {
        ParamType::List { element } => match element.as_ref() {
            ParamType::Record { fields } => {
                assert_eq!(fields[0].name, "name");
                assert_eq!(fields[0].param_type, ParamType::String);
                assert_eq!(fields[1].name, "price");
                assert_eq!(fields[1].param_type, ParamType::Decimal);
            }
            other => panic!("unexpected element type: {other:?}"),
        },
        other => panic!("unexpected parameter type: {other:?}"),
    }

    assert!(document.instructions.iter().any(|i| matches!(
        i,
        Instruction::EmitParam {
            role: VariableRole::BulkRow,
            ..
        }
    )));
}

#[test]
fn unclosed_block() {
    let source = "SELECT 1 /*# if x */ , 2";
    let result = compile(&request(source));
    assert!(result.summary.has_errors);

    let diagnostic = result
        .diagnostics
        .iter()
        .find(|d| d.code == "UNCLOSED_BLOCK")
        .expect("missing diagnostic");
    assert_eq!(diagnostic.kind, DiagnosticKind::Directive);
    assert!(diagnostic.message.contains("if"));
    assert_eq!(
        diagnostic.position.unwrap().offset,
        source.find("/*#").unwrap()
    );

    // Best-effort document is still produced, marked invalid
    let document = result.document.unwrap();
    assert!(!document.valid);
}

#[test]
fn ambiguous_column() {
    let ambiguous_catalog = SchemaCatalog {
        default_schema: None,
        tables: vec![
            table("a", vec![column("id", "integer", false, false)]),
            table("b", vec![column("id", "integer", false, false)]),
        ],
    };
    let result = compile(&CompileRequest {
        source: "SELECT id FROM a JOIN b ON a.id = b.id".to_string(),
        source_path: None,
        dialect: Dialect::Postgres,
        catalog: Some(ambiguous_catalog),
        system_fields: Vec::new(),
        options: None,
    });

    let diagnostic = result
        .diagnostics
        .iter()
        .find(|d| d.code == "AMBIGUOUS_COLUMN")
        .expect("missing diagnostic");
    assert_eq!(diagnostic.kind, DiagnosticKind::Schema);
    assert!(diagnostic.message.contains("a.id"));
    assert!(diagnostic.message.contains("b.id"));

    // IR is still produced; the column types as unknown
    let document = result.document.unwrap();
    assert!(!document.instructions.is_empty());
    let row = document.result_row.unwrap();
    assert_eq!(row[0].data_type.as_deref(), Some("unknown"));
}

#[test]
fn nested_result_columns() {
    let result = compile(&request(
        "SELECT u.id, d.id AS departments__id, d.name AS departments__name \
         FROM users u JOIN departments d ON d.id = u.dept_id",
    ));
    assert!(!result.summary.has_errors, "{:?}", result.diagnostics);
    let row = result.document.unwrap().result_row.unwrap();

    assert_eq!(row.len(), 2);
    assert_eq!(row[0].name, "id");
    assert_eq!(row[1].name, "departments");
    assert!(row[1].data_type.is_none());
    let nested: Vec<&str> = row[1].fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(nested, vec!["id", "name"]);
    assert_eq!(row[1].fields[1].data_type.as_deref(), Some("varchar"));
}

#[test]
fn empty_template() {
    let result = compile(&request("   -- nothing here\n"));
    assert!(result.document.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.code == "EMPTY_TEMPLATE"));
    assert!(result.summary.has_errors);
}

#[test]
fn limit_parameter() {
    let result = compile(&request("SELECT id FROM users LIMIT /*= n */10"));
    assert!(!result.summary.has_errors, "{:?}", result.diagnostics);
    let document = result.document.unwrap();

    let n = document.parameters.iter().find(|p| p.name == "n").unwrap();
    assert_eq!(n.param_type, ParamType::Int);

    // LIMIT is wrapped in trim boundaries so a null value can drop the clause
    let boundaries: Vec<&BoundaryKind> = document
        .instructions
        .iter()
        .filter_map(|i| match i {
            Instruction::EmitBoundary { boundary } => Some(boundary),
            _ => None,
        })
        .collect();
    assert!(boundaries.contains(&&BoundaryKind::Limit));
}

#[test]
fn header_metadata() {
    let source = "/*#\nfunction_name: find_users\ndescription: Find active users.\nparameters:\n  active: bool\n*/\nSELECT id FROM users WHERE email = /*= mail */'x' /*# if active */ AND dept = 'x' /*# end */";
    let result = compile(&request(source));
    assert!(!result.summary.has_errors, "{:?}", result.diagnostics);
    let document = result.document.unwrap();

    assert_eq!(document.function_name, "find_users");
    assert_eq!(
        document.function_description.as_deref(),
        Some("Find active users.")
    );
    // Header-declared parameters come first
    assert_eq!(document.parameters[0].name, "active");
    assert_eq!(document.parameters[1].name, "mail");

    // The front matter is metadata only; it never reaches the IR
    let statics: String = document
        .instructions
        .iter()
        .filter_map(|i| match i {
            Instruction::EmitStatic { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert!(!statics.contains("function_name"));
    assert!(statics.trim_start().starts_with("SELECT id FROM users"));
}

#[test]
fn function_name_from_path_when_no_header() {
    let result = compile(&request("SELECT id FROM users"));
    assert_eq!(result.document.unwrap().function_name, "test");
}

#[test]
fn deep_directive_nesting() {
    let result = compile(&request(
        "SELECT id /*# if a */, name /*# if b */, email /*# if c */, dept /*# end */ /*# end */ /*# end */ FROM users",
    ));
    assert!(!result.summary.has_errors, "{:?}", result.diagnostics);
    let document = result.document.unwrap();

    let begins = document
        .instructions
        .iter()
        .filter(|i| matches!(i, Instruction::BeginIf { .. }))
        .count();
    let ends = document
        .instructions
        .iter()
        .filter(|i| matches!(i, Instruction::EndIf))
        .count();
    assert_eq!(begins, 3);
    assert_eq!(ends, 3);
}

#[test]
fn directive_at_clause_edges() {
    let result = compile(&request(
        "SELECT id FROM users WHERE /*# if filtered */ dept = /*= dept */'x' /*# end */",
    ));
    assert!(!result.summary.has_errors, "{:?}", result.diagnostics);
}

#[test]
fn loop_template() {
    let result = compile(&request(
        "SELECT id FROM users WHERE name = 'x' /*# for d : depts */ OR dept = /*= d */'y' /*# end */",
    ));
    assert!(!result.summary.has_errors, "{:?}", result.diagnostics);
    let document = result.document.unwrap();

    let depts = document
        .parameters
        .iter()
        .find(|p| p.name == "depts")
        .unwrap();
    assert_eq!(
        depts.param_type,
        ParamType::List {
            element: Box::new(ParamType::String)
        }
    );
    assert!(document.instructions.contains(&Instruction::EndFor));
}

#[test]
fn affinity_classification() {
    let one = compile(&request("SELECT name FROM users WHERE id = 1"));
    assert_eq!(
        one.document.unwrap().response_affinity,
        ResponseAffinity::One
    );

    let many = compile(&request("SELECT name FROM users"));
    assert_eq!(
        many.document.unwrap().response_affinity,
        ResponseAffinity::Many
    );

    let none = compile(&request("DELETE FROM users WHERE id = 1"));
    assert_eq!(
        none.document.unwrap().response_affinity,
        ResponseAffinity::None
    );
}

#[test]
fn diagnostics_ordered_by_position() {
    let result = compile(&request(
        "SELECT nope1 FROM users WHERE nope2 = 1 AND nope3 = 2",
    ));
    let offsets: Vec<usize> = result
        .diagnostics
        .iter()
        .filter_map(|d| d.position.map(|p| p.offset))
        .collect();
    let mut sorted = offsets.clone();
    sorted.sort_unstable();
    assert_eq!(offsets, sorted);
    assert!(offsets.len() >= 3);
}

#[test]
fn deterministic_output() {
    let source = "/*#\nfunction_name: f\n*/\nSELECT id, name /*# if with_email */, email /*# end */ FROM users WHERE dept IN (/*= depts */'x') LIMIT /*= n */10";
    let first = serde_json::to_string(&compile(&request(source)).document).unwrap();
    let second = serde_json::to_string(&compile(&request(source)).document).unwrap();
    assert_eq!(first, second);
}

#[test]
fn source_embedded_in_document() {
    let source = "SELECT id FROM users";
    let document = compile(&request(source)).document.unwrap();
    assert_eq!(document.source.content, source);
    assert_eq!(document.source.path.as_deref(), Some("queries/test.snap.sql"));
    assert_eq!(document.format_version, 1);
    assert_eq!(document.dialect, Dialect::Postgres);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Concatenating token values reproduces any input byte-for-byte.
        #[test]
        fn token_fidelity(source in "\\PC{0,200}") {
            let (tokens, _) = snapsql_core::token::tokenize(&source, Dialect::Postgres);
            let rebuilt: String = tokens.iter().map(|t| t.value.as_str()).collect();
            prop_assert_eq!(rebuilt, source);
        }

        /// Token fidelity holds for the MySQL lexer variants too.
        #[test]
        fn token_fidelity_mysql(source in "[a-z'\"`#*/=,._ 0-9-]{0,120}") {
            let (tokens, _) = snapsql_core::token::tokenize(&source, Dialect::Mysql);
            let rebuilt: String = tokens.iter().map(|t| t.value.as_str()).collect();
            prop_assert_eq!(rebuilt, source);
        }

        /// Compilation is deterministic for arbitrary identifier choices.
        #[test]
        fn deterministic_compilation(name in "[a-z]{1,10}", flag in "[a-z]{1,10}") {
            let source = format!(
                "SELECT id /*# if {flag} */, {name} /*# end */ FROM users LIMIT /*= n */5"
            );
            let request = CompileRequest {
                source,
                source_path: None,
                dialect: Dialect::Postgres,
                catalog: None,
                system_fields: Vec::new(),
                options: None,
            };
            let first = serde_json::to_string(&compile(&request)).unwrap();
            let second = serde_json::to_string(&compile(&request)).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
