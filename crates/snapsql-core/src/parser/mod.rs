//! Stage P1: the clause parsers.
//!
//! One sub-parser per clause kind, sharing the expression sub-grammar in
//! [`expression`]. The parser walks SQL-significant tokens only (trivia and
//! directive comments are skipped, never removed), recursing into CTE bodies
//! and subqueries. Errors are accumulated and the parser resynchronizes at
//! the next clause boundary, so a broken clause still yields a partial tree.

pub mod ast;
mod expression;

pub use ast::*;

use crate::clause::{StatementKind, StatementShell};
use crate::token::{Token, TokenKind};
use crate::types::{diagnostic_codes, Diagnostic, DiagnosticKind, Position};

use expression::parse_expression;

/// Parse a statement from the token stream.
///
/// The shell from the clause splitter selects the statement grammar; the
/// parser re-walks the tokens so subqueries and CTE bodies get the same
/// treatment as the top level.
pub fn parse(tokens: &[Token], shell: &StatementShell) -> (Statement, Vec<Diagnostic>) {
    let mut cursor = Cursor::new(tokens);

    let statement = match shell.kind {
        StatementKind::Select => Statement::Select(parse_select_statement(&mut cursor)),
        StatementKind::Insert => Statement::Insert(parse_insert(&mut cursor)),
        StatementKind::Update => Statement::Update(parse_update(&mut cursor)),
        StatementKind::Delete => Statement::Delete(parse_delete(&mut cursor)),
    };

    cursor.eat_kind_bool(TokenKind::Semicolon);
    if let Some(index) = cursor.peek_index() {
        let token = cursor.token(index).clone();
        cursor.syntax_error_at(
            token.position,
            format!("unexpected {:?} after end of statement", token.value),
        );
    }

    (statement, cursor.diagnostics)
}

/// Cursor over SQL-significant tokens.
///
/// `peek`/`advance` silently step over whitespace, comments, and directive
/// tokens; the emitter walks the raw stream separately, so nothing is lost.
pub(crate) struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    last_end: usize,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            last_end: 0,
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn token(&self, index: usize) -> &Token {
        &self.tokens[index]
    }

    /// Index of the next significant token, skipping trivia permanently.
    pub(crate) fn peek_index(&mut self) -> Option<usize> {
        while self.pos < self.tokens.len() && !self.tokens[self.pos].is_sql_significant() {
            self.pos += 1;
        }
        (self.pos < self.tokens.len()).then_some(self.pos)
    }

    /// Index of the significant token after the next one.
    pub(crate) fn second_is_kind(&mut self, kind: TokenKind) -> bool {
        let Some(first) = self.peek_index() else {
            return false;
        };
        self.tokens[first + 1..]
            .iter()
            .find(|t| t.is_sql_significant())
            .is_some_and(|t| t.kind == kind)
    }

    pub(crate) fn advance(&mut self) -> Option<usize> {
        let index = self.peek_index()?;
        self.last_end = self.tokens[index].end_offset();
        self.pos = index + 1;
        Some(index)
    }

    /// End offset of the last consumed token.
    pub(crate) fn last_end(&self) -> usize {
        self.last_end
    }

    /// Offset of the next significant token, or the end of what was consumed.
    pub(crate) fn peek_offset(&mut self) -> usize {
        self.peek_index()
            .map_or(self.last_end, |i| self.tokens[i].position.offset)
    }

    pub(crate) fn at_kind(&mut self, kind: TokenKind) -> bool {
        self.peek_index()
            .is_some_and(|i| self.tokens[i].kind == kind)
    }

    pub(crate) fn eat_kind(&mut self, kind: TokenKind) -> Option<usize> {
        if self.at_kind(kind) {
            self.advance()
        } else {
            None
        }
    }

    pub(crate) fn eat_kind_bool(&mut self, kind: TokenKind) -> bool {
        self.eat_kind(kind).is_some()
    }

    pub(crate) fn expect_kind(&mut self, kind: TokenKind, message: &str) {
        if !self.eat_kind_bool(kind) {
            self.syntax_error(message);
        }
    }

    pub(crate) fn at_keyword(&mut self, word: &str) -> bool {
        self.peek_index()
            .is_some_and(|i| self.tokens[i].is_keyword(word))
    }

    pub(crate) fn eat_keyword(&mut self, word: &str) -> bool {
        if self.at_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_keyword(&mut self, word: &str) {
        if !self.eat_keyword(word) {
            self.syntax_error(&format!("expected {word}"));
        }
    }

    pub(crate) fn syntax_error(&mut self, message: impl Into<String>) {
        let position = self
            .peek_index()
            .map(|i| self.tokens[i].position)
            .unwrap_or_else(|| {
                self.tokens
                    .last()
                    .map(|t| t.position)
                    .unwrap_or_default()
            });
        self.syntax_error_at(position, message);
    }

    pub(crate) fn syntax_error_at(&mut self, position: Position, message: impl Into<String>) {
        self.diagnostics.push(
            Diagnostic::error(
                DiagnosticKind::Structural,
                diagnostic_codes::SYNTAX_ERROR,
                message,
            )
            .at(position),
        );
    }

    /// Skip forward to the next top-level clause keyword or closing paren,
    /// tracking nesting so resynchronization does not escape the current
    /// parenthesized region.
    fn resync_to_clause_boundary(&mut self) {
        let mut depth = 0i32;
        while let Some(index) = self.peek_index() {
            let token = &self.tokens[index];
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                TokenKind::Keyword if depth == 0 => {
                    let upper = token.value.to_ascii_uppercase();
                    if matches!(
                        upper.as_str(),
                        "FROM"
                            | "WHERE"
                            | "GROUP"
                            | "HAVING"
                            | "ORDER"
                            | "LIMIT"
                            | "OFFSET"
                            | "UNION"
                            | "INTERSECT"
                            | "EXCEPT"
                            | "RETURNING"
                            | "VALUES"
                            | "SET"
                            | "ON"
                    ) {
                        return;
                    }
                }
                TokenKind::Semicolon if depth == 0 => return,
                _ => {}
            }
            self.advance();
        }
    }
}

/// Identifier-like tokens: plain, contextual, or quoted identifiers.
fn eat_identifier(cursor: &mut Cursor) -> Option<String> {
    let index = cursor.peek_index()?;
    let token = cursor.token(index);
    match token.kind {
        TokenKind::Identifier | TokenKind::ContextualIdentifier => {
            let value = token.value.clone();
            cursor.advance();
            Some(value)
        }
        _ => None,
    }
}

fn expect_identifier(cursor: &mut Cursor, what: &str) -> String {
    match eat_identifier(cursor) {
        Some(value) => value,
        None => {
            cursor.syntax_error(format!("expected {what}"));
            String::new()
        }
    }
}

fn parse_qualified_name(cursor: &mut Cursor) -> QualifiedName {
    let start = cursor.peek_offset();
    let mut parts = Vec::new();
    match eat_identifier(cursor) {
        Some(first) => parts.push(first),
        None => cursor.syntax_error("expected table name"),
    }
    while cursor.at_kind(TokenKind::Dot) {
        cursor.advance();
        parts.push(expect_identifier(cursor, "identifier after '.'"));
    }
    QualifiedName {
        parts,
        span: crate::types::Span::new(start, cursor.last_end()),
    }
}

/// Optional `[AS] alias`.
fn parse_alias(cursor: &mut Cursor) -> Option<String> {
    if cursor.eat_keyword("AS") {
        return Some(expect_identifier(cursor, "alias after AS"));
    }
    eat_identifier(cursor)
}

pub(crate) fn parse_select_statement(cursor: &mut Cursor) -> SelectStatement {
    let with = if cursor.at_keyword("WITH") {
        Some(parse_with(cursor))
    } else {
        None
    };

    let body = parse_select_body(cursor);

    let mut set_ops = Vec::new();
    loop {
        let op = if cursor.eat_keyword("UNION") {
            SetOperator::Union
        } else if cursor.eat_keyword("INTERSECT") {
            SetOperator::Intersect
        } else if cursor.eat_keyword("EXCEPT") {
            SetOperator::Except
        } else {
            break;
        };
        let all = cursor.eat_keyword("ALL");
        if !all {
            cursor.eat_keyword("DISTINCT");
        }
        set_ops.push(SetOperation {
            op,
            all,
            body: parse_select_body(cursor),
        });
    }

    let order_by = if cursor.eat_keyword("ORDER") {
        cursor.expect_keyword("BY");
        parse_order_items(cursor)
    } else {
        Vec::new()
    };

    let limit = if cursor.eat_keyword("LIMIT") {
        Some(parse_expression(cursor))
    } else {
        None
    };
    let offset = if cursor.eat_keyword("OFFSET") {
        let expr = parse_expression(cursor);
        cursor.eat_keyword("ROWS");
        cursor.eat_keyword("ROW");
        Some(expr)
    } else {
        None
    };

    SelectStatement {
        with,
        body,
        set_ops,
        order_by,
        limit,
        offset,
    }
}

fn parse_select_body(cursor: &mut Cursor) -> SelectBody {
    cursor.expect_keyword("SELECT");
    let distinct = cursor.eat_keyword("DISTINCT");
    if !distinct {
        cursor.eat_keyword("ALL");
    }

    let items = parse_select_items(cursor);

    let from = if cursor.eat_keyword("FROM") {
        Some(parse_from_clause(cursor))
    } else {
        None
    };

    let where_clause = if cursor.eat_keyword("WHERE") {
        Some(parse_expression(cursor))
    } else {
        None
    };

    let group_by = if cursor.eat_keyword("GROUP") {
        cursor.expect_keyword("BY");
        let mut exprs = vec![parse_expression(cursor)];
        while cursor.eat_kind_bool(TokenKind::Comma) {
            exprs.push(parse_expression(cursor));
        }
        exprs
    } else {
        Vec::new()
    };

    let having = if cursor.eat_keyword("HAVING") {
        Some(parse_expression(cursor))
    } else {
        None
    };

    SelectBody {
        distinct,
        items,
        from,
        where_clause,
        group_by,
        having,
    }
}

fn parse_select_items(cursor: &mut Cursor) -> Vec<SelectItem> {
    let mut items = Vec::new();
    loop {
        let before = cursor.diagnostics.len();
        let expr = parse_expression(cursor);
        if matches!(expr.kind, ExpressionKind::Invalid) && cursor.diagnostics.len() > before {
            cursor.resync_to_clause_boundary();
        }
        let alias = parse_alias(cursor);
        items.push(SelectItem { expr, alias });
        if !cursor.eat_kind_bool(TokenKind::Comma) {
            break;
        }
    }
    items
}

pub(crate) fn parse_order_items(cursor: &mut Cursor) -> Vec<OrderItem> {
    let mut items = Vec::new();
    loop {
        let expr = parse_expression(cursor);
        let descending = if cursor.eat_keyword("DESC") {
            true
        } else {
            cursor.eat_keyword("ASC");
            false
        };
        let nulls_first = if cursor.eat_keyword("NULLS") {
            if cursor.eat_keyword("FIRST") {
                Some(true)
            } else {
                cursor.expect_keyword("LAST");
                Some(false)
            }
        } else {
            None
        };
        items.push(OrderItem {
            expr,
            descending,
            nulls_first,
        });
        if !cursor.eat_kind_bool(TokenKind::Comma) {
            break;
        }
    }
    items
}

fn parse_from_clause(cursor: &mut Cursor) -> FromClause {
    let base = parse_table_ref(cursor);
    let mut joins = Vec::new();

    loop {
        if cursor.eat_kind_bool(TokenKind::Comma) {
            joins.push(Join {
                kind: JoinKind::Cross,
                table: parse_table_ref(cursor),
                condition: JoinCondition::None,
            });
            continue;
        }

        let kind = if cursor.eat_keyword("CROSS") {
            cursor.expect_keyword("JOIN");
            JoinKind::Cross
        } else if cursor.eat_keyword("INNER") {
            cursor.expect_keyword("JOIN");
            JoinKind::Inner
        } else if cursor.eat_keyword("LEFT") {
            cursor.eat_keyword("OUTER");
            cursor.expect_keyword("JOIN");
            JoinKind::Left
        } else if cursor.eat_keyword("RIGHT") {
            cursor.eat_keyword("OUTER");
            cursor.expect_keyword("JOIN");
            JoinKind::Right
        } else if cursor.eat_keyword("FULL") {
            cursor.eat_keyword("OUTER");
            cursor.expect_keyword("JOIN");
            JoinKind::Full
        } else if cursor.eat_keyword("JOIN") {
            JoinKind::Inner
        } else {
            break;
        };

        let table = parse_table_ref(cursor);

        let condition = if cursor.eat_keyword("ON") {
            JoinCondition::On(parse_expression(cursor))
        } else if cursor.eat_keyword("USING") {
            cursor.expect_kind(TokenKind::LParen, "expected '(' after USING");
            let mut columns = Vec::new();
            loop {
                columns.push(expect_identifier(cursor, "column name in USING"));
                if !cursor.eat_kind_bool(TokenKind::Comma) {
                    break;
                }
            }
            cursor.expect_kind(TokenKind::RParen, "expected ')' to close USING");
            JoinCondition::Using(columns)
        } else {
            if kind != JoinKind::Cross {
                cursor.syntax_error("expected ON or USING after JOIN");
            }
            JoinCondition::None
        };

        joins.push(Join {
            kind,
            table,
            condition,
        });
    }

    FromClause { base, joins }
}

fn parse_table_ref(cursor: &mut Cursor) -> TableRef {
    cursor.eat_keyword("LATERAL");
    if cursor.eat_kind_bool(TokenKind::LParen) {
        let query = parse_select_statement(cursor);
        cursor.expect_kind(TokenKind::RParen, "expected ')' to close subquery");
        let alias = parse_alias(cursor);
        return TableRef::Subquery {
            query: Box::new(query),
            alias,
        };
    }

    let name = parse_qualified_name(cursor);
    let alias = parse_alias(cursor);
    TableRef::Table { name, alias }
}

fn parse_with(cursor: &mut Cursor) -> WithClause {
    cursor.expect_keyword("WITH");
    let recursive = cursor.eat_keyword("RECURSIVE");

    let mut ctes = Vec::new();
    loop {
        let name = expect_identifier(cursor, "CTE name");

        let columns = if cursor.at_kind(TokenKind::LParen) {
            cursor.advance();
            let mut columns = Vec::new();
            loop {
                columns.push(expect_identifier(cursor, "CTE column name"));
                if !cursor.eat_kind_bool(TokenKind::Comma) {
                    break;
                }
            }
            cursor.expect_kind(TokenKind::RParen, "expected ')' to close CTE columns");
            Some(columns)
        } else {
            None
        };

        cursor.expect_keyword("AS");
        cursor.expect_kind(TokenKind::LParen, "expected '(' before CTE body");
        let query = parse_select_statement(cursor);
        cursor.expect_kind(TokenKind::RParen, "expected ')' to close CTE body");

        ctes.push(CteDefinition {
            name,
            columns,
            query,
        });

        if !cursor.eat_kind_bool(TokenKind::Comma) {
            break;
        }
    }

    WithClause { recursive, ctes }
}

fn parse_insert(cursor: &mut Cursor) -> InsertStatement {
    let with = if cursor.at_keyword("WITH") {
        Some(parse_with(cursor))
    } else {
        None
    };

    cursor.expect_keyword("INSERT");
    cursor.expect_keyword("INTO");
    let table = parse_qualified_name(cursor);

    let columns = if cursor.at_kind(TokenKind::LParen) {
        cursor.advance();
        let mut columns = Vec::new();
        loop {
            columns.push(expect_identifier(cursor, "column name"));
            if !cursor.eat_kind_bool(TokenKind::Comma) {
                break;
            }
        }
        cursor.expect_kind(TokenKind::RParen, "expected ')' to close column list");
        columns
    } else {
        Vec::new()
    };

    let source = if cursor.eat_keyword("VALUES") {
        let mut rows = Vec::new();
        loop {
            cursor.expect_kind(TokenKind::LParen, "expected '(' to open VALUES row");
            let mut row = Vec::new();
            if !cursor.at_kind(TokenKind::RParen) {
                loop {
                    row.push(parse_expression(cursor));
                    if !cursor.eat_kind_bool(TokenKind::Comma) {
                        break;
                    }
                }
            }
            cursor.expect_kind(TokenKind::RParen, "expected ')' to close VALUES row");
            rows.push(row);
            if !cursor.eat_kind_bool(TokenKind::Comma) {
                break;
            }
        }
        InsertSource::Values { rows }
    } else {
        InsertSource::Select(Box::new(parse_select_statement(cursor)))
    };

    let on_conflict = if cursor.eat_keyword("ON") {
        cursor.expect_keyword("CONFLICT");
        Some(parse_on_conflict(cursor))
    } else {
        None
    };

    let returning = parse_returning(cursor);

    InsertStatement {
        with,
        table,
        columns,
        source,
        on_conflict,
        returning,
    }
}

fn parse_on_conflict(cursor: &mut Cursor) -> OnConflict {
    let target_columns = if cursor.at_kind(TokenKind::LParen) {
        cursor.advance();
        let mut columns = Vec::new();
        loop {
            columns.push(expect_identifier(cursor, "conflict target column"));
            if !cursor.eat_kind_bool(TokenKind::Comma) {
                break;
            }
        }
        cursor.expect_kind(TokenKind::RParen, "expected ')' to close conflict target");
        columns
    } else {
        Vec::new()
    };

    cursor.expect_keyword("DO");
    let action = if cursor.eat_keyword("NOTHING") {
        ConflictAction::DoNothing
    } else {
        cursor.expect_keyword("UPDATE");
        cursor.expect_keyword("SET");
        let assignments = parse_assignments(cursor);
        let where_clause = if cursor.eat_keyword("WHERE") {
            Some(parse_expression(cursor))
        } else {
            None
        };
        ConflictAction::DoUpdate {
            assignments,
            where_clause,
        }
    };

    OnConflict {
        target_columns,
        action,
    }
}

fn parse_update(cursor: &mut Cursor) -> UpdateStatement {
    let with = if cursor.at_keyword("WITH") {
        Some(parse_with(cursor))
    } else {
        None
    };

    cursor.expect_keyword("UPDATE");
    let table = parse_qualified_name(cursor);
    let alias = parse_alias(cursor);

    cursor.expect_keyword("SET");
    let assignments = parse_assignments(cursor);

    let from = if cursor.eat_keyword("FROM") {
        Some(parse_from_clause(cursor))
    } else {
        None
    };

    let where_clause = if cursor.eat_keyword("WHERE") {
        Some(parse_expression(cursor))
    } else {
        None
    };

    let returning = parse_returning(cursor);

    UpdateStatement {
        with,
        table,
        alias,
        assignments,
        from,
        where_clause,
        returning,
    }
}

fn parse_assignments(cursor: &mut Cursor) -> Vec<Assignment> {
    let mut assignments = Vec::new();
    loop {
        let column = expect_identifier(cursor, "column name in SET");
        if column.is_empty() {
            cursor.resync_to_clause_boundary();
            break;
        }
        if cursor
            .peek_index()
            .is_some_and(|i| cursor.token(i).value == "=")
        {
            cursor.advance();
        } else {
            cursor.syntax_error("expected '=' in SET assignment");
        }
        let value = parse_expression(cursor);
        assignments.push(Assignment { column, value });
        if !cursor.eat_kind_bool(TokenKind::Comma) {
            break;
        }
    }
    assignments
}

fn parse_delete(cursor: &mut Cursor) -> DeleteStatement {
    let with = if cursor.at_keyword("WITH") {
        Some(parse_with(cursor))
    } else {
        None
    };

    cursor.expect_keyword("DELETE");
    cursor.expect_keyword("FROM");
    let table = parse_qualified_name(cursor);
    let alias = parse_alias(cursor);

    let where_clause = if cursor.eat_keyword("WHERE") {
        Some(parse_expression(cursor))
    } else {
        None
    };

    let returning = parse_returning(cursor);

    DeleteStatement {
        with,
        table,
        alias,
        where_clause,
        returning,
    }
}

fn parse_returning(cursor: &mut Cursor) -> Option<Vec<SelectItem>> {
    if cursor.eat_keyword("RETURNING") {
        Some(parse_select_items(cursor))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::split;
    use crate::token::tokenize;
    use crate::Dialect;

    fn parse_source(source: &str) -> (Statement, Vec<Diagnostic>) {
        let (tokens, lex) = tokenize(source, Dialect::Postgres);
        assert!(lex.is_empty(), "lexing failed: {lex:?}");
        let (shell, _) = split(&tokens).expect("split failed");
        parse(&tokens, &shell)
    }

    fn parse_clean(source: &str) -> Statement {
        let (statement, diagnostics) = parse_source(source);
        assert!(diagnostics.is_empty(), "parse failed: {diagnostics:?}");
        statement
    }

    fn select(statement: Statement) -> SelectStatement {
        match statement {
            Statement::Select(s) => s,
            other => panic!("expected SELECT, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_select() {
        let stmt = select(parse_clean("SELECT id, name FROM users"));
        assert_eq!(stmt.body.items.len(), 2);
        let from = stmt.body.from.unwrap();
        match from.base {
            TableRef::Table { name, alias } => {
                assert_eq!(name.joined(), "users");
                assert!(alias.is_none());
            }
            other => panic!("unexpected base: {other:?}"),
        }
    }

    #[test]
    fn test_select_with_alias() {
        let stmt = select(parse_clean("SELECT u.id AS user_id FROM users u"));
        assert_eq!(stmt.body.items[0].alias.as_deref(), Some("user_id"));
        assert_eq!(stmt.body.from.unwrap().base.alias(), Some("u"));
    }

    #[test]
    fn test_wildcard_items() {
        let stmt = select(parse_clean("SELECT *, u.* FROM users u"));
        assert!(matches!(
            stmt.body.items[0].expr.kind,
            ExpressionKind::Wildcard(None)
        ));
        assert!(matches!(
            &stmt.body.items[1].expr.kind,
            ExpressionKind::Wildcard(Some(prefix)) if prefix == "u"
        ));
    }

    #[test]
    fn test_join_tree() {
        let stmt = select(parse_clean(
            "SELECT u.id FROM users u \
             LEFT JOIN departments d ON d.id = u.dept_id \
             CROSS JOIN regions",
        ));
        let from = stmt.body.from.unwrap();
        assert_eq!(from.joins.len(), 2);
        assert_eq!(from.joins[0].kind, JoinKind::Left);
        assert!(matches!(from.joins[0].condition, JoinCondition::On(_)));
        assert_eq!(from.joins[1].kind, JoinKind::Cross);
    }

    #[test]
    fn test_join_using() {
        let stmt = select(parse_clean("SELECT id FROM a JOIN b USING (id, tenant)"));
        let from = stmt.body.from.unwrap();
        match &from.joins[0].condition {
            JoinCondition::Using(columns) => assert_eq!(columns, &["id", "tenant"]),
            other => panic!("unexpected condition: {other:?}"),
        }
    }

    #[test]
    fn test_comma_join_is_cross() {
        let stmt = select(parse_clean("SELECT 1 FROM a, b"));
        assert_eq!(stmt.body.from.unwrap().joins[0].kind, JoinKind::Cross);
    }

    #[test]
    fn test_cte() {
        let stmt = select(parse_clean(
            "WITH recent (id) AS (SELECT id FROM logins) SELECT id FROM recent",
        ));
        let with = stmt.with.unwrap();
        assert!(!with.recursive);
        assert_eq!(with.ctes[0].name, "recent");
        assert_eq!(with.ctes[0].columns.as_deref(), Some(&["id".to_string()][..]));
    }

    #[test]
    fn test_recursive_cte() {
        let stmt = select(parse_clean(
            "WITH RECURSIVE tree AS (SELECT id FROM nodes UNION ALL SELECT id FROM tree) \
             SELECT id FROM tree",
        ));
        let with = stmt.with.unwrap();
        assert!(with.recursive);
        assert_eq!(with.ctes[0].query.set_ops.len(), 1);
    }

    #[test]
    fn test_subquery_in_from() {
        let stmt = select(parse_clean(
            "SELECT a.id FROM (SELECT id FROM accounts) a",
        ));
        match stmt.body.from.unwrap().base {
            TableRef::Subquery { alias, .. } => assert_eq!(alias.as_deref(), Some("a")),
            other => panic!("unexpected base: {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let stmt = select(parse_clean("SELECT 1 WHERE a = 1 OR b = 2 AND c = 3"));
        // OR binds loosest: (a = 1) OR ((b = 2) AND (c = 3))
        match stmt.body.where_clause.unwrap().kind {
            ExpressionKind::Binary { op, right, .. } => {
                assert_eq!(op, BinaryOp::Or);
                assert!(matches!(
                    right.kind,
                    ExpressionKind::Binary {
                        op: BinaryOp::And,
                        ..
                    }
                ));
            }
            other => panic!("unexpected where: {other:?}"),
        }
    }

    #[test]
    fn test_arithmetic_precedence() {
        let stmt = select(parse_clean("SELECT 1 + 2 * 3"));
        match &stmt.body.items[0].expr.kind {
            ExpressionKind::Binary { op, right, .. } => {
                assert_eq!(*op, BinaryOp::Add);
                assert!(matches!(
                    right.kind,
                    ExpressionKind::Binary {
                        op: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("unexpected expression: {other:?}"),
        }
    }

    #[test]
    fn test_not_in() {
        let stmt = select(parse_clean("SELECT 1 WHERE dept NOT IN ('a', 'b')"));
        match stmt.body.where_clause.unwrap().kind {
            ExpressionKind::InList { negated, items, .. } => {
                assert!(negated);
                assert_eq!(items.len(), 2);
            }
            other => panic!("unexpected where: {other:?}"),
        }
    }

    #[test]
    fn test_between() {
        let stmt = select(parse_clean("SELECT 1 WHERE age BETWEEN 18 AND 65 AND active"));
        // The outer AND survives; BETWEEN consumed its own AND
        match stmt.body.where_clause.unwrap().kind {
            ExpressionKind::Binary { op, left, .. } => {
                assert_eq!(op, BinaryOp::And);
                assert!(matches!(left.kind, ExpressionKind::Between { .. }));
            }
            other => panic!("unexpected where: {other:?}"),
        }
    }

    #[test]
    fn test_case_expression() {
        let stmt = select(parse_clean(
            "SELECT CASE WHEN a THEN 1 WHEN b THEN 2 ELSE 3 END",
        ));
        match &stmt.body.items[0].expr.kind {
            ExpressionKind::Case {
                operand,
                branches,
                else_branch,
            } => {
                assert!(operand.is_none());
                assert_eq!(branches.len(), 2);
                assert!(else_branch.is_some());
            }
            other => panic!("unexpected expression: {other:?}"),
        }
    }

    #[test]
    fn test_function_and_window() {
        let stmt = select(parse_clean(
            "SELECT count(*), row_number() OVER (PARTITION BY dept ORDER BY id DESC) FROM users",
        ));
        match &stmt.body.items[0].expr.kind {
            ExpressionKind::Function(call) => {
                assert_eq!(call.name, "count");
                assert!(matches!(call.args[0].kind, ExpressionKind::Wildcard(None)));
            }
            other => panic!("unexpected expression: {other:?}"),
        }
        match &stmt.body.items[1].expr.kind {
            ExpressionKind::Function(call) => {
                let over = call.over.as_ref().unwrap();
                assert_eq!(over.partition_by.len(), 1);
                assert!(over.order_by[0].descending);
            }
            other => panic!("unexpected expression: {other:?}"),
        }
    }

    #[test]
    fn test_cast_both_forms() {
        let stmt = select(parse_clean("SELECT CAST(id AS text), id::varchar(20)"));
        assert!(matches!(
            &stmt.body.items[0].expr.kind,
            ExpressionKind::Cast { target_type, .. } if target_type == "text"
        ));
        assert!(matches!(
            &stmt.body.items[1].expr.kind,
            ExpressionKind::Cast { target_type, .. } if target_type == "varchar(20)"
        ));
    }

    #[test]
    fn test_order_limit_offset() {
        let stmt = select(parse_clean(
            "SELECT id FROM users ORDER BY id DESC NULLS LAST LIMIT 10 OFFSET 20",
        ));
        assert!(stmt.order_by[0].descending);
        assert_eq!(stmt.order_by[0].nulls_first, Some(false));
        assert!(stmt.limit.is_some());
        assert!(stmt.offset.is_some());
    }

    #[test]
    fn test_union() {
        let stmt = select(parse_clean("SELECT id FROM a UNION ALL SELECT id FROM b"));
        assert_eq!(stmt.set_ops.len(), 1);
        assert_eq!(stmt.set_ops[0].op, SetOperator::Union);
        assert!(stmt.set_ops[0].all);
    }

    #[test]
    fn test_insert_values() {
        let (statement, diagnostics) =
            parse_source("INSERT INTO products (name, price) VALUES ('x', 0), ('y', 1)");
        assert!(diagnostics.is_empty());
        match statement {
            Statement::Insert(insert) => {
                assert_eq!(insert.table.joined(), "products");
                assert_eq!(insert.columns, vec!["name", "price"]);
                match insert.source {
                    InsertSource::Values { rows } => assert_eq!(rows.len(), 2),
                    other => panic!("unexpected source: {other:?}"),
                }
            }
            other => panic!("expected INSERT, got {other:?}"),
        }
    }

    #[test]
    fn test_insert_on_conflict() {
        let (statement, diagnostics) = parse_source(
            "INSERT INTO t (id) VALUES (1) ON CONFLICT (id) DO UPDATE SET id = 2 RETURNING id",
        );
        assert!(diagnostics.is_empty());
        match statement {
            Statement::Insert(insert) => {
                let conflict = insert.on_conflict.unwrap();
                assert_eq!(conflict.target_columns, vec!["id"]);
                assert!(matches!(conflict.action, ConflictAction::DoUpdate { .. }));
                assert_eq!(insert.returning.unwrap().len(), 1);
            }
            other => panic!("expected INSERT, got {other:?}"),
        }
    }

    #[test]
    fn test_update() {
        let (statement, diagnostics) =
            parse_source("UPDATE users SET name = 'x', age = age + 1 WHERE id = 1");
        assert!(diagnostics.is_empty());
        match statement {
            Statement::Update(update) => {
                assert_eq!(update.assignments.len(), 2);
                assert_eq!(update.assignments[0].column, "name");
                assert!(update.where_clause.is_some());
            }
            other => panic!("expected UPDATE, got {other:?}"),
        }
    }

    #[test]
    fn test_delete_returning() {
        let (statement, diagnostics) =
            parse_source("DELETE FROM sessions WHERE expired RETURNING id");
        assert!(diagnostics.is_empty());
        match statement {
            Statement::Delete(delete) => {
                assert_eq!(delete.table.joined(), "sessions");
                assert_eq!(delete.returning.unwrap().len(), 1);
            }
            other => panic!("expected DELETE, got {other:?}"),
        }
    }

    #[test]
    fn test_directives_are_invisible_to_grammar() {
        let stmt = select(parse_clean(
            "SELECT id /*# if include_email */, email /*# end */ FROM users",
        ));
        assert_eq!(stmt.body.items.len(), 2);
    }

    #[test]
    fn test_dummy_literal_parses_in_place() {
        let stmt = select(parse_clean(
            "SELECT * FROM users WHERE dept IN (/*= depts */'x')",
        ));
        match stmt.body.where_clause.unwrap().kind {
            ExpressionKind::InList { items, .. } => assert_eq!(items.len(), 1),
            other => panic!("unexpected where: {other:?}"),
        }
    }

    #[test]
    fn test_error_recovery_reports_and_continues() {
        let (statement, diagnostics) = parse_source("SELECT FROM users");
        assert!(!diagnostics.is_empty());
        let stmt = select(statement);
        assert!(stmt.body.from.is_some());
    }
}
