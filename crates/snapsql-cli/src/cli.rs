//! CLI argument parsing using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// SnapSQL - two-way SQL template compiler
#[derive(Parser, Debug)]
#[command(name = "snapsql")]
#[command(about = "Compile SQL templates to intermediate documents", long_about = None)]
#[command(version)]
pub struct Args {
    /// Template file to compile (reads from stdin if not provided)
    #[arg(value_name = "TEMPLATE")]
    pub template: Option<PathBuf>,

    /// SQL dialect
    #[arg(short, long, default_value = "postgres", value_enum)]
    pub dialect: DialectArg,

    /// Schema catalog JSON file for table/column resolution
    #[arg(short, long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Compile configuration JSON file (system fields, constants,
    /// empty-IN policy)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Suppress warnings on stderr
    #[arg(short, long)]
    pub quiet: bool,

    /// Compact JSON output (no pretty-printing)
    #[arg(long)]
    pub compact: bool,

    /// Print the JSON Schema of a contract type and exit
    #[arg(long, value_enum, value_name = "TYPE")]
    pub print_schema: Option<SchemaTarget>,
}

/// SQL dialect options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DialectArg {
    Postgres,
    Mysql,
    Sqlite,
    Mariadb,
}

impl From<DialectArg> for snapsql_core::Dialect {
    fn from(d: DialectArg) -> Self {
        match d {
            DialectArg::Postgres => snapsql_core::Dialect::Postgres,
            DialectArg::Mysql => snapsql_core::Dialect::Mysql,
            DialectArg::Sqlite => snapsql_core::Dialect::Sqlite,
            DialectArg::Mariadb => snapsql_core::Dialect::Mariadb,
        }
    }
}

/// Contract types exposed via --print-schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaTarget {
    /// The compile request (template + catalog + options)
    Request,
    /// The intermediate document
    Document,
}
