//! Lexical name scopes for column resolution.
//!
//! Each SELECT body pushes a scope holding its FROM relations; subqueries see
//! outer scopes through the stack (popped on exit). Resolution searches the
//! innermost scope first and only escalates outward when nothing matches.

use crate::types::ColumnDescriptor;

/// One relation visible in a scope: a table, CTE, or aliased subquery.
#[derive(Debug, Clone)]
pub struct Relation {
    /// Name the relation is addressable by (alias, or object name)
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    /// True when the catalog/CTE lookup failed; columns are unknown
    pub unknown: bool,
    /// True when an outer join makes every column of this relation nullable
    pub forced_nullable: bool,
}

/// Outcome of a column lookup.
#[derive(Debug, Clone)]
pub enum ColumnResolution {
    /// Single match
    Unique(ColumnDescriptor),
    /// Multiple matches; carries `(relation name, descriptor)` candidates
    Ambiguous(Vec<(String, ColumnDescriptor)>),
    /// No match, but some relation in scope has unknown columns, so the
    /// reference may still be valid
    PossiblyUnknown,
    NotFound,
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub relations: Vec<Relation>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// Resolve a column reference within this scope.
    pub fn resolve_column(&self, qualifier: Option<&str>, name: &str) -> ColumnResolution {
        if let Some(qualifier) = qualifier {
            let Some(relation) = self.relation(qualifier) else {
                return ColumnResolution::NotFound;
            };
            return match find_column(relation, name) {
                Some(descriptor) => ColumnResolution::Unique(descriptor),
                None if relation.unknown => ColumnResolution::PossiblyUnknown,
                None => ColumnResolution::NotFound,
            };
        }

        let mut matches = Vec::new();
        let mut any_unknown = false;
        for relation in &self.relations {
            if relation.unknown {
                any_unknown = true;
            }
            if let Some(descriptor) = find_column(relation, name) {
                matches.push((relation.name.clone(), descriptor));
            }
        }

        match matches.len() {
            0 if any_unknown => ColumnResolution::PossiblyUnknown,
            0 => ColumnResolution::NotFound,
            1 => ColumnResolution::Unique(matches.remove(0).1),
            _ => ColumnResolution::Ambiguous(matches),
        }
    }
}

fn find_column(relation: &Relation, name: &str) -> Option<ColumnDescriptor> {
    relation
        .columns
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name))
        .map(|c| {
            let mut descriptor = c.clone();
            if relation.forced_nullable {
                descriptor.nullable = true;
            }
            descriptor
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, data_type: &str, nullable: bool) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            origin_table: Some("t".to_string()),
            origin_column: Some(name.to_string()),
            data_type: data_type.to_string(),
            nullable,
            is_derived: false,
        }
    }

    fn scope_with_two_tables() -> Scope {
        Scope {
            relations: vec![
                Relation {
                    name: "a".to_string(),
                    columns: vec![descriptor("id", "integer", false)],
                    unknown: false,
                    forced_nullable: false,
                },
                Relation {
                    name: "b".to_string(),
                    columns: vec![
                        descriptor("id", "integer", false),
                        descriptor("name", "text", true),
                    ],
                    unknown: false,
                    forced_nullable: false,
                },
            ],
        }
    }

    #[test]
    fn test_unique_resolution() {
        let scope = scope_with_two_tables();
        match scope.resolve_column(None, "name") {
            ColumnResolution::Unique(descriptor) => assert_eq!(descriptor.data_type, "text"),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn test_ambiguous_resolution() {
        let scope = scope_with_two_tables();
        match scope.resolve_column(None, "id") {
            ColumnResolution::Ambiguous(candidates) => {
                assert_eq!(candidates.len(), 2);
                assert_eq!(candidates[0].0, "a");
                assert_eq!(candidates[1].0, "b");
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn test_qualified_resolution() {
        let scope = scope_with_two_tables();
        match scope.resolve_column(Some("b"), "id") {
            ColumnResolution::Unique(descriptor) => assert_eq!(descriptor.name, "id"),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn test_forced_nullable() {
        let mut scope = scope_with_two_tables();
        scope.relations[1].forced_nullable = true;
        match scope.resolve_column(None, "name") {
            ColumnResolution::Unique(descriptor) => assert!(descriptor.nullable),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_relation_soft_fails() {
        let scope = Scope {
            relations: vec![Relation {
                name: "mystery".to_string(),
                columns: Vec::new(),
                unknown: true,
                forced_nullable: false,
            }],
        };
        assert!(matches!(
            scope.resolve_column(None, "anything"),
            ColumnResolution::PossiblyUnknown
        ));
    }
}
