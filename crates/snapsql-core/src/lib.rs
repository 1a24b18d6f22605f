//! Core two-way SQL template compiler.
//!
//! Compiles SQL templates whose comment-embedded directives stay valid SQL
//! when stripped, producing a language-neutral intermediate document:
//! instruction IR plus parameter schema, result-row schema, and response
//! affinity. The compiler is a pure function over materialized inputs; it
//! performs no I/O and never connects to a database.
//!
//! The pipeline stages run strictly in order, each consuming the previous
//! stage's artifact: tokenizer, clause splitter, clause parsers, directive
//! linker, variable analyzer, type inferencer, emitter, metadata attacher.
//! Every stage accumulates diagnostics and recovers where it can; only a
//! source with no statement at all stops the pipeline.

pub mod cel;
pub mod clause;
pub mod directive;
pub mod emitter;
pub mod error;
pub mod header;
pub mod infer;
pub mod metadata;
pub mod parser;
pub mod token;
pub mod types;

pub use error::{CompileError, CompileErrorKind};
pub use types::{
    diagnostic_codes, BoundaryKind, ColumnDescriptor, ColumnSchema, CompileOptions,
    CompileRequest, CompileResult, ConstraintType, Diagnostic, DiagnosticCount, DiagnosticKind,
    Dialect, EmptyInPolicy, IndexSchema, Instruction, IntermediateFormat, ParamType, Parameter,
    ParameterMode, Position, ResponseAffinity, ResultField, SchemaCatalog, Severity, SourceInfo,
    Span, Summary, SystemFieldAction, SystemFieldConfig, TableConstraint, TableSchema,
    VariableRole, FORMAT_VERSION,
};

#[cfg(feature = "tracing")]
use tracing::trace;

use types::DiagnosticSink;

/// Compile a template into an intermediate document.
///
/// Always returns a [`CompileResult`]; errors accumulate in the diagnostic
/// list and mark the document invalid rather than aborting. The document is
/// absent only when the source contains no statement to compile.
pub fn compile(request: &CompileRequest) -> CompileResult {
    let mut sink = DiagnosticSink::new();

    // Stage L: tokenize
    let (mut tokens, lex_diagnostics) = token::tokenize(&request.source, request.dialect);
    sink.extend(lex_diagnostics);
    #[cfg(feature = "tracing")]
    trace!(tokens = tokens.len(), "tokenized template");

    // Stage P0: clause split
    let shell = match clause::split(&tokens) {
        Ok((shell, diagnostics)) => {
            sink.extend(diagnostics);
            shell
        }
        Err(fatal) => {
            sink.push(fatal_diagnostic(&fatal));
            return finish(None, sink);
        }
    };
    #[cfg(feature = "tracing")]
    trace!(clauses = shell.clauses.len(), "split clauses");

    // Stage P1: parse clause bodies
    let (statement, parse_diagnostics) = parser::parse(&tokens, &shell);
    sink.extend(parse_diagnostics);

    // Stage P2: link directives (mutates next_index in place)
    sink.extend(directive::link(&mut tokens, &shell.clauses));

    // Header front matter
    let (template_header, header_diagnostics) = header::parse_header(&tokens);
    sink.extend(header_diagnostics);

    // Stage P3: analyze directives, unify the parameter schema
    let (analyzed, analyze_diagnostics) = cel::analyzer::analyze_directives(&tokens, &shell.clauses);
    sink.extend(analyze_diagnostics);
    let parameters = cel::schema::build_parameter_schema(
        &tokens,
        &analyzed,
        template_header.as_ref(),
        &statement,
        request.catalog.as_ref(),
        &request.system_fields,
        &mut sink,
    );
    #[cfg(feature = "tracing")]
    trace!(parameters = parameters.len(), "built parameter schema");

    // Stage P4: type inference
    let inference = infer::infer(&statement, request, &mut sink);

    // Stage E: lower to IR
    let instructions = emitter::emit(
        &tokens,
        &shell.clauses,
        &analyzed,
        request.options.as_ref(),
        &mut sink,
    );
    #[cfg(feature = "tracing")]
    trace!(instructions = instructions.len(), "emitted instructions");

    // Stage M: attach metadata
    let valid = !sink.has_errors();
    let document = metadata::attach(
        request,
        template_header.as_ref(),
        parameters,
        &inference,
        instructions,
        valid,
    );

    finish(Some(document), sink)
}

fn fatal_diagnostic(error: &CompileError) -> Diagnostic {
    let code = match error.kind {
        CompileErrorKind::EmptyTemplate => diagnostic_codes::EMPTY_TEMPLATE,
        CompileErrorKind::UnsupportedStatement => diagnostic_codes::UNSUPPORTED_STATEMENT,
        CompileErrorKind::InvalidHeader => diagnostic_codes::INVALID_HEADER,
    };
    let mut diagnostic = Diagnostic::error(
        DiagnosticKind::Structural,
        code,
        error.message.clone(),
    );
    if let Some(position) = error.position {
        diagnostic = diagnostic.at(position);
    }
    diagnostic
}

fn finish(document: Option<IntermediateFormat>, sink: DiagnosticSink) -> CompileResult {
    let diagnostics = sink.into_sorted();

    let mut counts = DiagnosticCount::default();
    for diagnostic in &diagnostics {
        match diagnostic.severity {
            Severity::Error => counts.errors += 1,
            Severity::Warning => counts.warnings += 1,
            Severity::Info => counts.infos += 1,
        }
    }

    let summary = Summary {
        parameter_count: document.as_ref().map_or(0, |d| d.parameters.len()),
        instruction_count: document.as_ref().map_or(0, |d| d.instructions.len()),
        result_column_count: document
            .as_ref()
            .and_then(|d| d.result_row.as_ref())
            .map_or(0, Vec::len),
        has_errors: counts.errors > 0,
        diagnostic_count: counts,
    };

    CompileResult {
        document,
        diagnostics,
        summary,
    }
}
