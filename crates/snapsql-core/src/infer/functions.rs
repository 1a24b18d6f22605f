//! Function signature tables.
//!
//! Dialect-specific function behavior (return type, nullability propagation,
//! cast specialization) is data keyed by `(dialect, function-name)`; adding a
//! function never adds a code path.

use std::collections::HashSet;
use std::sync::LazyLock;

use crate::types::Dialect;

/// How a function's return type is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    /// A fixed dialect type name
    Fixed(&'static str),
    /// The type of the argument at this index
    FromArg(usize),
}

/// How a function's nullability is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullableRule {
    Never,
    Always,
    /// Nullable iff the argument at this index is nullable
    FromArg(usize),
    /// Nullable iff any argument is nullable (null-preserving functions)
    AnyArg,
    /// Nullable iff every argument is nullable (`COALESCE`)
    AllArgs,
}

/// One `(dialect, function)` signature entry.
#[derive(Debug, Clone, Copy)]
pub struct FunctionSignature {
    pub return_type: ReturnType,
    pub nullable: NullableRule,
    /// True for cast-like functions whose type is the cast target
    pub cast_type: bool,
    /// Accepted argument count range, when fixed
    pub min_args: Option<usize>,
    pub max_args: Option<usize>,
}

const fn fixed(
    return_type: &'static str,
    nullable: NullableRule,
    min_args: usize,
    max_args: usize,
) -> FunctionSignature {
    FunctionSignature {
        return_type: ReturnType::Fixed(return_type),
        nullable,
        cast_type: false,
        min_args: Some(min_args),
        max_args: Some(max_args),
    }
}

const fn from_arg(index: usize, nullable: NullableRule) -> FunctionSignature {
    FunctionSignature {
        return_type: ReturnType::FromArg(index),
        nullable,
        cast_type: false,
        min_args: None,
        max_args: None,
    }
}

/// Look up the signature for a function in a dialect.
pub fn function_signature(dialect: Dialect, name: &str) -> Option<FunctionSignature> {
    let name_lower = name.to_ascii_lowercase();
    match name_lower.as_str() {
        // Aggregates
        "count" => Some(fixed("bigint", NullableRule::Never, 0, 1)),
        "sum" => Some(from_arg(0, NullableRule::Always)),
        "avg" => Some(fixed("numeric", NullableRule::Always, 1, 1)),
        "min" | "max" => Some(from_arg(0, NullableRule::Always)),
        "array_agg" => match dialect {
            Dialect::Postgres => Some(fixed("array", NullableRule::Always, 1, 1)),
            _ => None,
        },
        "string_agg" => match dialect {
            Dialect::Postgres => Some(fixed("text", NullableRule::Always, 2, 2)),
            _ => None,
        },
        "group_concat" => match dialect {
            Dialect::Mysql | Dialect::Mariadb | Dialect::Sqlite => {
                Some(fixed("text", NullableRule::Always, 1, 2))
            }
            _ => None,
        },

        // Conditionals
        "coalesce" => Some(FunctionSignature {
            return_type: ReturnType::FromArg(0),
            nullable: NullableRule::AllArgs,
            cast_type: false,
            min_args: Some(1),
            max_args: None,
        }),
        "nullif" => Some(FunctionSignature {
            return_type: ReturnType::FromArg(0),
            nullable: NullableRule::Always,
            cast_type: false,
            min_args: Some(2),
            max_args: Some(2),
        }),
        "greatest" | "least" => match dialect {
            Dialect::Sqlite => None,
            _ => Some(from_arg(0, NullableRule::AnyArg)),
        },
        "ifnull" => match dialect {
            Dialect::Mysql | Dialect::Mariadb | Dialect::Sqlite => {
                Some(from_arg(0, NullableRule::AllArgs))
            }
            _ => None,
        },

        // Strings
        "upper" | "lower" | "trim" | "ltrim" | "rtrim" | "reverse" => {
            Some(fixed("text", NullableRule::AnyArg, 1, 1))
        }
        "length" | "char_length" | "character_length" => {
            Some(fixed("integer", NullableRule::AnyArg, 1, 1))
        }
        "octet_length" => Some(fixed("integer", NullableRule::AnyArg, 1, 1)),
        "substr" | "substring" => Some(fixed("text", NullableRule::AnyArg, 2, 3)),
        "replace" => Some(fixed("text", NullableRule::AnyArg, 3, 3)),
        "left" | "right" => Some(fixed("text", NullableRule::AnyArg, 2, 2)),
        "lpad" | "rpad" => Some(fixed("text", NullableRule::AnyArg, 2, 3)),
        "concat" => match dialect {
            // CONCAT is NULL-tolerant on Postgres, NULL-propagating on MySQL
            Dialect::Postgres => Some(FunctionSignature {
                return_type: ReturnType::Fixed("text"),
                nullable: NullableRule::Never,
                cast_type: false,
                min_args: Some(1),
                max_args: None,
            }),
            Dialect::Mysql | Dialect::Mariadb => Some(FunctionSignature {
                return_type: ReturnType::Fixed("text"),
                nullable: NullableRule::AnyArg,
                cast_type: false,
                min_args: Some(1),
                max_args: None,
            }),
            Dialect::Sqlite => None,
        },
        "concat_ws" => match dialect {
            Dialect::Postgres | Dialect::Mysql | Dialect::Mariadb => Some(FunctionSignature {
                return_type: ReturnType::Fixed("text"),
                nullable: NullableRule::FromArg(0),
                cast_type: false,
                min_args: Some(2),
                max_args: None,
            }),
            Dialect::Sqlite => None,
        },

        // Numbers
        "abs" => Some(from_arg(0, NullableRule::AnyArg)),
        "round" => Some(from_arg(0, NullableRule::AnyArg)),
        "ceil" | "ceiling" | "floor" => Some(fixed("numeric", NullableRule::AnyArg, 1, 1)),
        "mod" => Some(from_arg(0, NullableRule::AnyArg)),
        "power" | "pow" => Some(fixed("double precision", NullableRule::AnyArg, 2, 2)),
        "sqrt" => Some(fixed("double precision", NullableRule::AnyArg, 1, 1)),
        "random" => match dialect {
            Dialect::Postgres | Dialect::Sqlite => {
                Some(fixed("double precision", NullableRule::Never, 0, 0))
            }
            _ => None,
        },
        "rand" => match dialect {
            Dialect::Mysql | Dialect::Mariadb => {
                Some(fixed("double precision", NullableRule::Never, 0, 1))
            }
            _ => None,
        },

        // Date/time
        "now" => match dialect {
            Dialect::Sqlite => None,
            _ => Some(fixed("timestamp", NullableRule::Never, 0, 0)),
        },
        "current_timestamp" => Some(fixed("timestamp", NullableRule::Never, 0, 0)),
        "current_date" => Some(fixed("date", NullableRule::Never, 0, 0)),
        "date_trunc" => match dialect {
            Dialect::Postgres => Some(fixed("timestamp", NullableRule::AnyArg, 2, 2)),
            _ => None,
        },
        "extract" | "date_part" => match dialect {
            Dialect::Postgres => Some(fixed("numeric", NullableRule::AnyArg, 2, 2)),
            Dialect::Mysql | Dialect::Mariadb => Some(fixed("integer", NullableRule::AnyArg, 2, 2)),
            Dialect::Sqlite => None,
        },
        "age" => match dialect {
            Dialect::Postgres => Some(fixed("interval", NullableRule::AnyArg, 1, 2)),
            _ => None,
        },
        "strftime" => match dialect {
            Dialect::Sqlite => Some(FunctionSignature {
                return_type: ReturnType::Fixed("text"),
                nullable: NullableRule::AnyArg,
                cast_type: false,
                min_args: Some(1),
                max_args: None,
            }),
            _ => None,
        },

        // JSON
        "json_build_object" | "jsonb_build_object" | "to_json" | "to_jsonb" => match dialect {
            Dialect::Postgres => Some(FunctionSignature {
                return_type: ReturnType::Fixed("json"),
                nullable: NullableRule::Never,
                cast_type: false,
                min_args: None,
                max_args: None,
            }),
            _ => None,
        },
        "json_extract" => match dialect {
            Dialect::Mysql | Dialect::Mariadb | Dialect::Sqlite => {
                Some(fixed("json", NullableRule::Always, 2, 2))
            }
            _ => None,
        },
        "json_object" => match dialect {
            Dialect::Mysql | Dialect::Mariadb | Dialect::Sqlite => Some(FunctionSignature {
                return_type: ReturnType::Fixed("json"),
                nullable: NullableRule::Never,
                cast_type: false,
                min_args: None,
                max_args: None,
            }),
            _ => None,
        },

        // Casts
        "cast" => Some(FunctionSignature {
            return_type: ReturnType::Fixed("unknown"),
            nullable: NullableRule::FromArg(0),
            cast_type: true,
            min_args: Some(1),
            max_args: Some(1),
        }),
        "convert" => match dialect {
            Dialect::Mysql | Dialect::Mariadb => Some(FunctionSignature {
                return_type: ReturnType::Fixed("unknown"),
                nullable: NullableRule::FromArg(0),
                cast_type: true,
                min_args: Some(2),
                max_args: Some(2),
            }),
            _ => None,
        },

        // Window functions
        "row_number" | "rank" | "dense_rank" | "ntile" => {
            Some(fixed("bigint", NullableRule::Never, 0, 1))
        }
        "lag" | "lead" | "first_value" | "last_value" | "nth_value" => {
            Some(from_arg(0, NullableRule::Always))
        }
        "percent_rank" | "cume_dist" => {
            Some(fixed("double precision", NullableRule::Never, 0, 0))
        }

        _ => None,
    }
}

/// Aggregate functions (14 total).
pub static AGGREGATE_FUNCTIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let mut set = HashSet::new();
    set.insert("array_agg");
    set.insert("avg");
    set.insert("bool_and");
    set.insert("bool_or");
    set.insert("count");
    set.insert("every");
    set.insert("group_concat");
    set.insert("json_agg");
    set.insert("jsonb_agg");
    set.insert("max");
    set.insert("min");
    set.insert("stddev");
    set.insert("string_agg");
    set.insert("sum");
    set
});

/// Window-only functions (10 total).
pub static WINDOW_FUNCTIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let mut set = HashSet::new();
    set.insert("cume_dist");
    set.insert("dense_rank");
    set.insert("first_value");
    set.insert("lag");
    set.insert("last_value");
    set.insert("lead");
    set.insert("nth_value");
    set.insert("ntile");
    set.insert("percent_rank");
    set.insert("row_number");
    set
});

/// Check if a function is an aggregate function.
pub fn is_aggregate_function(name: &str) -> bool {
    AGGREGATE_FUNCTIONS.contains(name.to_ascii_lowercase().as_str())
}

/// Check if a function is window-only.
pub fn is_window_function(name: &str) -> bool {
    WINDOW_FUNCTIONS.contains(name.to_ascii_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_count_signature() {
        let sig = function_signature(Dialect::Postgres, "COUNT").unwrap();
        assert_eq!(sig.return_type, ReturnType::Fixed("bigint"));
        assert_eq!(sig.nullable, NullableRule::Never);
    }

    #[test]
    fn test_coalesce_all_args_rule() {
        let sig = function_signature(Dialect::Postgres, "coalesce").unwrap();
        assert_eq!(sig.return_type, ReturnType::FromArg(0));
        assert_eq!(sig.nullable, NullableRule::AllArgs);
        assert_eq!(sig.max_args, None);
    }

    #[rstest]
    #[case(Dialect::Postgres, true)]
    #[case(Dialect::Mysql, false)]
    #[case(Dialect::Sqlite, false)]
    fn test_string_agg_is_postgres_only(#[case] dialect: Dialect, #[case] exists: bool) {
        assert_eq!(function_signature(dialect, "string_agg").is_some(), exists);
    }

    #[rstest]
    #[case(Dialect::Mysql, true)]
    #[case(Dialect::Sqlite, true)]
    #[case(Dialect::Postgres, false)]
    fn test_group_concat_dialects(#[case] dialect: Dialect, #[case] exists: bool) {
        assert_eq!(function_signature(dialect, "group_concat").is_some(), exists);
    }

    #[test]
    fn test_concat_nullability_differs_by_dialect() {
        let pg = function_signature(Dialect::Postgres, "concat").unwrap();
        assert_eq!(pg.nullable, NullableRule::Never);
        let my = function_signature(Dialect::Mysql, "concat").unwrap();
        assert_eq!(my.nullable, NullableRule::AnyArg);
    }

    #[test]
    fn test_aggregate_classification() {
        assert!(is_aggregate_function("SUM"));
        assert!(is_aggregate_function("count"));
        assert!(!is_aggregate_function("upper"));
    }

    #[test]
    fn test_window_classification() {
        assert!(is_window_function("row_number"));
        assert!(!is_window_function("sum"));
    }

    #[test]
    fn test_unknown_function() {
        assert!(function_signature(Dialect::Postgres, "made_up_fn").is_none());
    }
}
