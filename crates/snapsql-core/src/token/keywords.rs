//! SQL keyword classification tables.

use std::collections::HashSet;
use std::sync::LazyLock;

/// Reserved SQL keywords (72 total).
///
/// Words in this set always tokenize as [`super::TokenKind::Keyword`].
pub static KEYWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let mut set = HashSet::new();
    set.insert("ALL");
    set.insert("AND");
    set.insert("ANY");
    set.insert("AS");
    set.insert("ASC");
    set.insert("BETWEEN");
    set.insert("BY");
    set.insert("CASE");
    set.insert("CAST");
    set.insert("CHECK");
    set.insert("COLLATE");
    set.insert("COLUMN");
    set.insert("CONFLICT");
    set.insert("CONSTRAINT");
    set.insert("CREATE");
    set.insert("CROSS");
    set.insert("CURRENT");
    set.insert("DEFAULT");
    set.insert("DELETE");
    set.insert("DESC");
    set.insert("DISTINCT");
    set.insert("DO");
    set.insert("DROP");
    set.insert("ELSE");
    set.insert("END");
    set.insert("EXCEPT");
    set.insert("EXISTS");
    set.insert("FILTER");
    set.insert("FIRST");
    set.insert("FOLLOWING");
    set.insert("FOR");
    set.insert("FOREIGN");
    set.insert("FROM");
    set.insert("FULL");
    set.insert("GROUP");
    set.insert("HAVING");
    set.insert("ILIKE");
    set.insert("IN");
    set.insert("INNER");
    set.insert("INSERT");
    set.insert("INTERSECT");
    set.insert("INTO");
    set.insert("IS");
    set.insert("JOIN");
    set.insert("LAST");
    set.insert("LATERAL");
    set.insert("LEFT");
    set.insert("LIKE");
    set.insert("LIMIT");
    set.insert("NOT");
    set.insert("NOTHING");
    set.insert("NULLS");
    set.insert("OFFSET");
    set.insert("ON");
    set.insert("OR");
    set.insert("ORDER");
    set.insert("OUTER");
    set.insert("OVER");
    set.insert("PARTITION");
    set.insert("PRECEDING");
    set.insert("PRIMARY");
    set.insert("RANGE");
    set.insert("RECURSIVE");
    set.insert("RETURNING");
    set.insert("RIGHT");
    set.insert("ROW");
    set.insert("ROWS");
    set.insert("SELECT");
    set.insert("SET");
    set.insert("TABLE");
    set.insert("THEN");
    set.insert("UNBOUNDED");
    set.insert("UNION");
    set.insert("UNIQUE");
    set.insert("UPDATE");
    set.insert("USING");
    set.insert("VALUES");
    set.insert("WHEN");
    set.insert("WHERE");
    set.insert("WINDOW");
    set.insert("WITH");
    set
});

/// Words reserved only in some positions (19 total).
///
/// These tokenize as [`super::TokenKind::ContextualIdentifier`]; the parser
/// accepts them wherever a plain identifier is accepted.
pub static CONTEXTUAL_KEYWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let mut set = HashSet::new();
    set.insert("ACTION");
    set.insert("COMMENT");
    set.insert("DATA");
    set.insert("DATE");
    set.insert("DAY");
    set.insert("HOUR");
    set.insert("LANGUAGE");
    set.insert("LEVEL");
    set.insert("MINUTE");
    set.insert("MONTH");
    set.insert("NAME");
    set.insert("ROLE");
    set.insert("SECOND");
    set.insert("STATUS");
    set.insert("TEXT");
    set.insert("TIME");
    set.insert("TYPE");
    set.insert("VALUE");
    set.insert("YEAR");
    set
});

/// Check if a word is a reserved keyword (case-insensitive).
pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(word.to_ascii_uppercase().as_str())
}

/// Check if a word is a contextual keyword (case-insensitive).
pub fn is_contextual_keyword(word: &str) -> bool {
    CONTEXTUAL_KEYWORDS.contains(word.to_ascii_uppercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_case_insensitive() {
        assert!(is_keyword("select"));
        assert!(is_keyword("SELECT"));
        assert!(is_keyword("Select"));
        assert!(!is_keyword("users"));
    }

    #[test]
    fn test_contextual_not_reserved() {
        assert!(is_contextual_keyword("status"));
        assert!(!is_keyword("status"));
    }
}
