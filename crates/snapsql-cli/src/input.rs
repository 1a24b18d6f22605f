//! Input handling for template files and stdin.

use anyhow::{Context, Result};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// A template source ready for compilation.
pub struct TemplateSource {
    pub name: Option<String>,
    pub content: String,
}

/// Read the template from a file or stdin.
///
/// `.snap.md` files are literate templates: the first ```sql fenced block is
/// the template, everything else is documentation.
pub fn read_template(path: Option<&PathBuf>) -> Result<TemplateSource> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read template: {}", path.display()))?;
            let content = if is_markdown(path) {
                extract_sql_block(&raw).with_context(|| {
                    format!("No ```sql block found in {}", path.display())
                })?
            } else {
                raw
            };
            Ok(TemplateSource {
                name: Some(path.display().to_string()),
                content,
            })
        }
        None => {
            let mut content = String::new();
            io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read from stdin")?;
            Ok(TemplateSource {
                name: None,
                content,
            })
        }
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("md"))
}

/// Extract the first ```sql fenced block from a markdown document.
fn extract_sql_block(markdown: &str) -> Option<String> {
    let mut in_block = false;
    let mut lines = Vec::new();
    for line in markdown.lines() {
        let trimmed = line.trim();
        if !in_block {
            if trimmed == "```sql" {
                in_block = true;
            }
            continue;
        }
        if trimmed == "```" {
            let mut block = lines.join("\n");
            block.push('\n');
            return Some(block);
        }
        lines.push(line);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_sql_file() {
        let mut file = NamedTempFile::with_suffix(".snap.sql").unwrap();
        writeln!(file, "SELECT id FROM users").unwrap();

        let source = read_template(Some(&file.path().to_path_buf())).unwrap();
        assert!(source.content.contains("SELECT id FROM users"));
        assert!(source.name.is_some());
    }

    #[test]
    fn test_read_markdown_extracts_sql() {
        let mut file = NamedTempFile::with_suffix(".snap.md").unwrap();
        write!(
            file,
            "# Query\n\nSome prose.\n\n```sql\nSELECT id FROM users\n```\n\nMore prose.\n"
        )
        .unwrap();

        let source = read_template(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(source.content, "SELECT id FROM users\n");
    }

    #[test]
    fn test_markdown_without_sql_block_fails() {
        let mut file = NamedTempFile::with_suffix(".md").unwrap();
        writeln!(file, "no code here").unwrap();

        assert!(read_template(Some(&file.path().to_path_buf())).is_err());
    }

    #[test]
    fn test_missing_file() {
        let missing = PathBuf::from("/nonexistent/query.snap.sql");
        assert!(read_template(Some(&missing)).is_err());
    }

    #[test]
    fn test_extract_sql_block_first_only() {
        let markdown = "```sql\nSELECT 1\n```\n```sql\nSELECT 2\n```\n";
        assert_eq!(extract_sql_block(markdown).unwrap(), "SELECT 1\n");
    }
}
