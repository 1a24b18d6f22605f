//! SnapSQL CLI - two-way SQL template compiler

mod cli;
mod input;
mod schema;

use anyhow::{Context, Result};
use clap::Parser;
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use serde::Deserialize;
use snapsql_core::{
    compile, CompileOptions, CompileRequest, SchemaCatalog, Severity, SystemFieldConfig,
};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use cli::Args;

fn main() -> ExitCode {
    match run() {
        Ok(has_errors) => {
            if has_errors {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("snapsql: error: {e:#}");
            ExitCode::from(66)
        }
    }
}

/// Project-level compile configuration loaded from `--config`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CompileConfig {
    system_fields: Vec<SystemFieldConfig>,
    options: Option<CompileOptions>,
}

fn run() -> Result<bool> {
    let args = Args::parse();

    if let Some(target) = args.print_schema {
        let rendered = schema::render_schema(target)?;
        write_output(&args.output, &rendered)?;
        return Ok(false);
    }

    let template = input::read_template(args.template.as_ref())?;
    let catalog = load_catalog(args.catalog.as_ref())?;
    let config = load_config(args.config.as_ref())?;

    let request = CompileRequest {
        source: template.content,
        source_path: template.name,
        dialect: args.dialect.into(),
        catalog,
        system_fields: config.system_fields,
        options: config.options,
    };

    let result = compile(&request);

    let output_str = if args.compact {
        serde_json::to_string(&result).context("Failed to serialize result")?
    } else {
        serde_json::to_string_pretty(&result).context("Failed to serialize result")?
    };
    write_output(&args.output, &output_str)?;

    if !args.quiet {
        print_diagnostics_to_stderr(&result);
    }

    Ok(result.summary.has_errors)
}

fn load_catalog(path: Option<&PathBuf>) -> Result<Option<SchemaCatalog>> {
    path.map(|path| {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse catalog: {}", path.display()))
    })
    .transpose()
}

fn load_config(path: Option<&PathBuf>) -> Result<CompileConfig> {
    match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse config: {}", path.display()))
        }
        None => Ok(CompileConfig::default()),
    }
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    if let Some(path) = path {
        fs::write(path, content)
            .with_context(|| format!("Failed to write to {}", path.display()))?;
    } else {
        io::stdout()
            .write_all(content.as_bytes())
            .context("Failed to write to stdout")?;
        // Ensure newline at end for terminal output
        if !content.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

fn print_diagnostics_to_stderr(result: &snapsql_core::CompileResult) {
    let color = io::stderr().is_terminal();

    for diagnostic in &result.diagnostics {
        let level = match diagnostic.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        let level = if color {
            match diagnostic.severity {
                Severity::Error => level.red().to_string(),
                Severity::Warning => level.yellow().to_string(),
                Severity::Info => level.cyan().to_string(),
            }
        } else {
            level.to_string()
        };

        let location = diagnostic
            .position
            .as_ref()
            .map(|p| format!(" (line {}, column {})", p.line, p.column))
            .unwrap_or_default();

        eprintln!(
            "snapsql: {level}:{location} [{}] {}",
            diagnostic.code, diagnostic.message
        );
    }
}
