//! The shared expression sub-grammar.
//!
//! A Pratt parser over the significant-token cursor. Binding powers follow
//! SQL precedence: `OR` < `AND` < `NOT` < comparisons (`=`, `IN`, `BETWEEN`,
//! `LIKE`, `IS`) < additive < multiplicative < unary minus < `::` casts.

use super::ast::*;
use super::Cursor;
use crate::token::TokenKind;
use crate::types::Span;

const BP_OR: u8 = 1;
const BP_AND: u8 = 3;
const BP_NOT: u8 = 5;
const BP_COMPARISON: u8 = 7;
const BP_ADDITIVE: u8 = 9;
const BP_MULTIPLICATIVE: u8 = 11;
const BP_UNARY_MINUS: u8 = 12;
const BP_CAST: u8 = 13;

/// Parse a full expression.
pub(super) fn parse_expression(cursor: &mut Cursor) -> Expression {
    parse_expr_bp(cursor, 0)
}

fn parse_expr_bp(cursor: &mut Cursor, min_bp: u8) -> Expression {
    let mut lhs = parse_prefix(cursor);

    loop {
        let Some(index) = cursor.peek_index() else {
            break;
        };
        let token = cursor.token(index).clone();

        match token.kind {
            TokenKind::Operator if token.value == "::" => {
                if BP_CAST < min_bp {
                    break;
                }
                cursor.advance();
                let target_type = parse_type_name(cursor);
                let span = Span::new(lhs.span.start, cursor.last_end());
                lhs = Expression {
                    kind: ExpressionKind::Cast {
                        operand: Box::new(lhs),
                        target_type,
                    },
                    span,
                };
            }
            TokenKind::Operator => {
                let (op, bp) = match token.value.as_str() {
                    "+" => (BinaryOp::Add, BP_ADDITIVE),
                    "-" => (BinaryOp::Sub, BP_ADDITIVE),
                    "||" => (BinaryOp::Concat, BP_ADDITIVE),
                    "*" => (BinaryOp::Mul, BP_MULTIPLICATIVE),
                    "/" => (BinaryOp::Div, BP_MULTIPLICATIVE),
                    "%" => (BinaryOp::Mod, BP_MULTIPLICATIVE),
                    "=" => (BinaryOp::Eq, BP_COMPARISON),
                    "<>" | "!=" => (BinaryOp::NotEq, BP_COMPARISON),
                    "<" => (BinaryOp::Lt, BP_COMPARISON),
                    "<=" => (BinaryOp::LtEq, BP_COMPARISON),
                    ">" => (BinaryOp::Gt, BP_COMPARISON),
                    ">=" => (BinaryOp::GtEq, BP_COMPARISON),
                    other => (BinaryOp::Other(other.to_string()), BP_MULTIPLICATIVE),
                };
                if bp < min_bp {
                    break;
                }
                cursor.advance();
                let rhs = parse_expr_bp(cursor, bp + 1);
                let span = Span::new(lhs.span.start, rhs.span.end);
                lhs = Expression {
                    kind: ExpressionKind::Binary {
                        left: Box::new(lhs),
                        op,
                        right: Box::new(rhs),
                    },
                    span,
                };
            }
            TokenKind::Keyword => {
                let upper = token.value.to_ascii_uppercase();
                match upper.as_str() {
                    "AND" => {
                        if BP_AND < min_bp {
                            break;
                        }
                        cursor.advance();
                        let rhs = parse_expr_bp(cursor, BP_AND + 1);
                        let span = Span::new(lhs.span.start, rhs.span.end);
                        lhs = Expression {
                            kind: ExpressionKind::Binary {
                                left: Box::new(lhs),
                                op: BinaryOp::And,
                                right: Box::new(rhs),
                            },
                            span,
                        };
                    }
                    "OR" => {
                        if BP_OR < min_bp {
                            break;
                        }
                        cursor.advance();
                        let rhs = parse_expr_bp(cursor, BP_OR + 1);
                        let span = Span::new(lhs.span.start, rhs.span.end);
                        lhs = Expression {
                            kind: ExpressionKind::Binary {
                                left: Box::new(lhs),
                                op: BinaryOp::Or,
                                right: Box::new(rhs),
                            },
                            span,
                        };
                    }
                    "IS" => {
                        if BP_COMPARISON < min_bp {
                            break;
                        }
                        cursor.advance();
                        lhs = parse_is(cursor, lhs);
                    }
                    "NOT" => {
                        if BP_COMPARISON < min_bp {
                            break;
                        }
                        cursor.advance();
                        lhs = parse_comparison_suffix(cursor, lhs, true);
                    }
                    "IN" | "BETWEEN" | "LIKE" | "ILIKE" => {
                        if BP_COMPARISON < min_bp {
                            break;
                        }
                        lhs = parse_comparison_suffix(cursor, lhs, false);
                    }
                    _ => break,
                }
            }
            _ => break,
        }
    }

    lhs
}

fn parse_is(cursor: &mut Cursor, operand: Expression) -> Expression {
    let negated = cursor.eat_keyword("NOT");
    let start = operand.span.start;

    if cursor.eat_kind(TokenKind::Null).is_some() {
        return Expression {
            kind: ExpressionKind::IsNull {
                operand: Box::new(operand),
                negated,
            },
            span: Span::new(start, cursor.last_end()),
        };
    }

    if let Some(index) = cursor.eat_kind(TokenKind::Boolean) {
        let value = cursor.token(index).value.eq_ignore_ascii_case("true");
        let span = Span::new(start, cursor.last_end());
        let op = if negated {
            BinaryOp::NotEq
        } else {
            BinaryOp::Eq
        };
        return Expression {
            kind: ExpressionKind::Binary {
                left: Box::new(operand),
                op,
                right: Box::new(Expression {
                    kind: ExpressionKind::Literal(Literal::Boolean(value)),
                    span,
                }),
            },
            span,
        };
    }

    cursor.syntax_error("expected NULL, TRUE, or FALSE after IS");
    Expression {
        kind: ExpressionKind::Invalid,
        span: Span::new(start, cursor.last_end()),
    }
}

/// `IN`, `BETWEEN`, `LIKE`, `ILIKE`, optionally preceded by `NOT`.
fn parse_comparison_suffix(cursor: &mut Cursor, operand: Expression, negated: bool) -> Expression {
    let start = operand.span.start;

    if cursor.eat_keyword("IN") {
        return parse_in(cursor, operand, negated);
    }
    if cursor.eat_keyword("BETWEEN") {
        let low = parse_expr_bp(cursor, BP_NOT - 1);
        cursor.expect_keyword("AND");
        let high = parse_expr_bp(cursor, BP_NOT - 1);
        return Expression {
            kind: ExpressionKind::Between {
                operand: Box::new(operand),
                low: Box::new(low),
                high: Box::new(high),
                negated,
            },
            span: Span::new(start, cursor.last_end()),
        };
    }
    let like = cursor.eat_keyword("LIKE");
    let ilike = !like && cursor.eat_keyword("ILIKE");
    if like || ilike {
        let pattern = parse_expr_bp(cursor, BP_COMPARISON + 1);
        return Expression {
            kind: ExpressionKind::Like {
                operand: Box::new(operand),
                pattern: Box::new(pattern),
                negated,
                case_insensitive: ilike,
            },
            span: Span::new(start, cursor.last_end()),
        };
    }

    cursor.syntax_error("expected IN, BETWEEN, LIKE, or ILIKE after NOT");
    Expression {
        kind: ExpressionKind::Invalid,
        span: Span::new(start, cursor.last_end()),
    }
}

fn parse_in(cursor: &mut Cursor, operand: Expression, negated: bool) -> Expression {
    let start = operand.span.start;
    cursor.expect_kind(TokenKind::LParen, "expected '(' after IN");

    if cursor.at_keyword("SELECT") || cursor.at_keyword("WITH") {
        let subquery = super::parse_select_statement(cursor);
        cursor.expect_kind(TokenKind::RParen, "expected ')' after subquery");
        return Expression {
            kind: ExpressionKind::InSubquery {
                operand: Box::new(operand),
                subquery: Box::new(subquery),
                negated,
            },
            span: Span::new(start, cursor.last_end()),
        };
    }

    let mut items = Vec::new();
    if !cursor.at_kind(TokenKind::RParen) {
        loop {
            items.push(parse_expression(cursor));
            if !cursor.eat_kind_bool(TokenKind::Comma) {
                break;
            }
        }
    }
    cursor.expect_kind(TokenKind::RParen, "expected ')' to close IN list");

    Expression {
        kind: ExpressionKind::InList {
            operand: Box::new(operand),
            items,
            negated,
        },
        span: Span::new(start, cursor.last_end()),
    }
}

fn parse_prefix(cursor: &mut Cursor) -> Expression {
    let Some(index) = cursor.peek_index() else {
        cursor.syntax_error("unexpected end of input in expression");
        return Expression {
            kind: ExpressionKind::Invalid,
            span: Span::new(cursor.last_end(), cursor.last_end()),
        };
    };
    let token = cursor.token(index).clone();
    let start = token.position.offset;

    match token.kind {
        TokenKind::Number => {
            cursor.advance();
            Expression {
                kind: ExpressionKind::Literal(Literal::Number(token.value)),
                span: Span::new(start, cursor.last_end()),
            }
        }
        TokenKind::String => {
            cursor.advance();
            Expression {
                kind: ExpressionKind::Literal(Literal::String(token.value)),
                span: Span::new(start, cursor.last_end()),
            }
        }
        TokenKind::Boolean => {
            cursor.advance();
            Expression {
                kind: ExpressionKind::Literal(Literal::Boolean(
                    token.value.eq_ignore_ascii_case("true"),
                )),
                span: Span::new(start, cursor.last_end()),
            }
        }
        TokenKind::Null => {
            cursor.advance();
            Expression {
                kind: ExpressionKind::Literal(Literal::Null),
                span: Span::new(start, cursor.last_end()),
            }
        }
        TokenKind::Operator if token.value == "-" => {
            cursor.advance();
            let operand = parse_expr_bp(cursor, BP_UNARY_MINUS);
            Expression {
                kind: ExpressionKind::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
                span: Span::new(start, cursor.last_end()),
            }
        }
        TokenKind::Operator if token.value == "+" => {
            cursor.advance();
            parse_expr_bp(cursor, BP_UNARY_MINUS)
        }
        TokenKind::Operator if token.value == "*" => {
            cursor.advance();
            Expression {
                kind: ExpressionKind::Wildcard(None),
                span: Span::new(start, cursor.last_end()),
            }
        }
        TokenKind::LParen => {
            cursor.advance();
            if cursor.at_keyword("SELECT") || cursor.at_keyword("WITH") {
                let subquery = super::parse_select_statement(cursor);
                cursor.expect_kind(TokenKind::RParen, "expected ')' after subquery");
                return Expression {
                    kind: ExpressionKind::Subquery(Box::new(subquery)),
                    span: Span::new(start, cursor.last_end()),
                };
            }
            let mut exprs = vec![parse_expression(cursor)];
            while cursor.eat_kind_bool(TokenKind::Comma) {
                exprs.push(parse_expression(cursor));
            }
            cursor.expect_kind(TokenKind::RParen, "expected ')'");
            if exprs.len() == 1 {
                let inner = exprs.pop().expect("one element");
                Expression {
                    kind: inner.kind,
                    span: Span::new(start, cursor.last_end()),
                }
            } else {
                // Row constructor, e.g. `(a, b) IN (...)`
                Expression {
                    kind: ExpressionKind::Function(FunctionCall {
                        name: "row".to_string(),
                        args: exprs,
                        distinct: false,
                        over: None,
                    }),
                    span: Span::new(start, cursor.last_end()),
                }
            }
        }
        TokenKind::Keyword => {
            let upper = token.value.to_ascii_uppercase();
            match upper.as_str() {
                "NOT" => {
                    cursor.advance();
                    let operand = parse_expr_bp(cursor, BP_NOT);
                    Expression {
                        kind: ExpressionKind::Unary {
                            op: UnaryOp::Not,
                            operand: Box::new(operand),
                        },
                        span: Span::new(start, cursor.last_end()),
                    }
                }
                "CASE" => parse_case(cursor),
                "CAST" => parse_cast(cursor),
                "EXISTS" => {
                    cursor.advance();
                    cursor.expect_kind(TokenKind::LParen, "expected '(' after EXISTS");
                    let subquery = super::parse_select_statement(cursor);
                    cursor.expect_kind(TokenKind::RParen, "expected ')' after subquery");
                    Expression {
                        kind: ExpressionKind::Exists {
                            subquery: Box::new(subquery),
                            negated: false,
                        },
                        span: Span::new(start, cursor.last_end()),
                    }
                }
                // LEFT(s, n) / RIGHT(s, n) are function calls despite being
                // reserved as join keywords
                "LEFT" | "RIGHT" if cursor.second_is_kind(TokenKind::LParen) => {
                    cursor.advance();
                    parse_function_call(cursor, token.value, start)
                }
                _ => {
                    // Clause keywords stay put so the caller can
                    // resynchronize on them
                    cursor.syntax_error_at(
                        token.position,
                        format!("unexpected keyword {:?} in expression", token.value),
                    );
                    Expression {
                        kind: ExpressionKind::Invalid,
                        span: Span::new(start, start),
                    }
                }
            }
        }
        TokenKind::Identifier | TokenKind::ContextualIdentifier => {
            cursor.advance();
            if cursor.at_kind(TokenKind::LParen) {
                return parse_function_call(cursor, token.value, start);
            }

            let mut parts = vec![token.value];
            while cursor.at_kind(TokenKind::Dot) {
                cursor.advance();
                if let Some(next) = cursor.peek_index() {
                    let next_token = cursor.token(next).clone();
                    match next_token.kind {
                        TokenKind::Identifier
                        | TokenKind::ContextualIdentifier
                        | TokenKind::Keyword => {
                            cursor.advance();
                            parts.push(next_token.value);
                        }
                        TokenKind::Operator if next_token.value == "*" => {
                            cursor.advance();
                            return Expression {
                                kind: ExpressionKind::Wildcard(Some(parts.join("."))),
                                span: Span::new(start, cursor.last_end()),
                            };
                        }
                        _ => {
                            cursor.syntax_error("expected identifier after '.'");
                            break;
                        }
                    }
                } else {
                    cursor.syntax_error("expected identifier after '.'");
                    break;
                }
            }

            let span = Span::new(start, cursor.last_end());
            if cursor.at_kind(TokenKind::LParen) {
                // Schema-qualified function call
                return parse_function_call(cursor, parts.join("."), start);
            }
            Expression {
                kind: ExpressionKind::Column(QualifiedName { parts, span }),
                span,
            }
        }
        _ => {
            // Structural punctuation stays put for the caller; anything else
            // is consumed so parsing always makes progress
            if !matches!(
                token.kind,
                TokenKind::RParen | TokenKind::Comma | TokenKind::Semicolon
            ) {
                cursor.advance();
            }
            cursor.syntax_error_at(
                token.position,
                format!("unexpected {:?} in expression", token.value),
            );
            Expression {
                kind: ExpressionKind::Invalid,
                span: Span::new(start, cursor.last_end().max(start)),
            }
        }
    }
}

fn parse_function_call(cursor: &mut Cursor, name: String, start: usize) -> Expression {
    cursor.expect_kind(TokenKind::LParen, "expected '('");
    let distinct = cursor.eat_keyword("DISTINCT");

    let mut args = Vec::new();
    if !cursor.at_kind(TokenKind::RParen) {
        loop {
            args.push(parse_expression(cursor));
            if !cursor.eat_kind_bool(TokenKind::Comma) {
                break;
            }
        }
    }
    cursor.expect_kind(TokenKind::RParen, "expected ')' to close argument list");

    let over = if cursor.eat_keyword("OVER") {
        Some(parse_window_spec(cursor))
    } else {
        None
    };

    Expression {
        kind: ExpressionKind::Function(FunctionCall {
            name,
            args,
            distinct,
            over,
        }),
        span: Span::new(start, cursor.last_end()),
    }
}

fn parse_window_spec(cursor: &mut Cursor) -> WindowSpec {
    let mut spec = WindowSpec::default();
    cursor.expect_kind(TokenKind::LParen, "expected '(' after OVER");

    if cursor.eat_keyword("PARTITION") {
        cursor.expect_keyword("BY");
        loop {
            spec.partition_by.push(parse_expression(cursor));
            if !cursor.eat_kind_bool(TokenKind::Comma) {
                break;
            }
        }
    }
    if cursor.eat_keyword("ORDER") {
        cursor.expect_keyword("BY");
        spec.order_by = super::parse_order_items(cursor);
    }
    // Frame clauses don't affect typing; skip to the closing paren
    while !cursor.at_kind(TokenKind::RParen) && cursor.peek_index().is_some() {
        cursor.advance();
    }
    cursor.expect_kind(TokenKind::RParen, "expected ')' to close window");
    spec
}

fn parse_case(cursor: &mut Cursor) -> Expression {
    let start = cursor.peek_offset();
    cursor.expect_keyword("CASE");

    let operand = if cursor.at_keyword("WHEN") {
        None
    } else {
        Some(Box::new(parse_expression(cursor)))
    };

    let mut branches = Vec::new();
    while cursor.eat_keyword("WHEN") {
        let condition = parse_expression(cursor);
        cursor.expect_keyword("THEN");
        let result = parse_expression(cursor);
        branches.push(CaseBranch { condition, result });
    }
    if branches.is_empty() {
        cursor.syntax_error("CASE expression has no WHEN branch");
    }

    let else_branch = if cursor.eat_keyword("ELSE") {
        Some(Box::new(parse_expression(cursor)))
    } else {
        None
    };
    cursor.expect_keyword("END");

    Expression {
        kind: ExpressionKind::Case {
            operand,
            branches,
            else_branch,
        },
        span: Span::new(start, cursor.last_end()),
    }
}

fn parse_cast(cursor: &mut Cursor) -> Expression {
    let start = cursor.peek_offset();
    cursor.expect_keyword("CAST");
    cursor.expect_kind(TokenKind::LParen, "expected '(' after CAST");
    let operand = parse_expression(cursor);
    cursor.expect_keyword("AS");
    let target_type = parse_type_name(cursor);
    cursor.expect_kind(TokenKind::RParen, "expected ')' to close CAST");

    Expression {
        kind: ExpressionKind::Cast {
            operand: Box::new(operand),
            target_type,
        },
        span: Span::new(start, cursor.last_end()),
    }
}

/// Parse a type name: one or more identifier words plus an optional
/// length/precision suffix (`varchar(20)`, `numeric(10, 2)`).
pub(super) fn parse_type_name(cursor: &mut Cursor) -> String {
    let mut words = Vec::new();
    while let Some(index) = cursor.peek_index() {
        let token = cursor.token(index);
        match token.kind {
            TokenKind::Identifier | TokenKind::ContextualIdentifier => {
                words.push(token.value.clone());
                cursor.advance();
            }
            _ => break,
        }
    }
    if words.is_empty() {
        cursor.syntax_error("expected type name");
        return "unknown".to_string();
    }

    let mut name = words.join(" ");
    if cursor.at_kind(TokenKind::LParen) {
        cursor.advance();
        let mut suffix = Vec::new();
        while let Some(index) = cursor.peek_index() {
            let token = cursor.token(index);
            if token.kind == TokenKind::RParen {
                break;
            }
            if token.kind == TokenKind::Number {
                suffix.push(token.value.clone());
            }
            cursor.advance();
        }
        cursor.expect_kind(TokenKind::RParen, "expected ')' in type name");
        name.push('(');
        name.push_str(&suffix.join(", "));
        name.push(')');
    }
    name
}
