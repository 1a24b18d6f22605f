//! Statement, clause, and expression trees produced by the clause parsers.
//!
//! Identifiers are stored as written (quotes included); normalization against
//! the catalog happens during type inference, where the dialect's case rules
//! are known.

use crate::types::Span;

/// A possibly-qualified name: `a`, `a.b`, or `a.b.c`.
#[derive(Debug, Clone, PartialEq)]
pub struct QualifiedName {
    pub parts: Vec<String>,
    pub span: Span,
}

impl QualifiedName {
    /// The final (object) part of the name, as written.
    pub fn last(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }

    /// Dotted rendering, as written.
    pub fn joined(&self) -> String {
        self.parts.join(".")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Numeric literal, verbatim
    Number(String),
    /// String literal, verbatim including quotes
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Column(QualifiedName),
    Literal(Literal),
    /// `*` or `t.*`; only meaningful in select lists and `count(*)`
    Wildcard(Option<String>),
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Binary {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
    },
    IsNull {
        operand: Box<Expression>,
        negated: bool,
    },
    InList {
        operand: Box<Expression>,
        items: Vec<Expression>,
        negated: bool,
    },
    InSubquery {
        operand: Box<Expression>,
        subquery: Box<SelectStatement>,
        negated: bool,
    },
    Between {
        operand: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
        negated: bool,
    },
    Like {
        operand: Box<Expression>,
        pattern: Box<Expression>,
        negated: bool,
        case_insensitive: bool,
    },
    Case {
        operand: Option<Box<Expression>>,
        branches: Vec<CaseBranch>,
        else_branch: Option<Box<Expression>>,
    },
    Function(FunctionCall),
    Cast {
        operand: Box<Expression>,
        target_type: String,
    },
    /// Scalar subquery
    Subquery(Box<SelectStatement>),
    Exists {
        subquery: Box<SelectStatement>,
        negated: bool,
    },
    /// Placeholder left behind by error recovery
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseBranch {
    pub condition: Expression,
    pub result: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Function name as written
    pub name: String,
    pub args: Vec<Expression>,
    pub distinct: bool,
    pub over: Option<WindowSpec>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowSpec {
    pub partition_by: Vec<Expression>,
    pub order_by: Vec<OrderItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// `||`
    Concat,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    /// Dialect operators without dedicated typing rules (`->`, `@>`, ...)
    Other(String),
}

/// One entry of a select list (or a RETURNING list).
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expression,
    /// Explicit `AS name` (or bare alias), unquoted handling deferred
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: Expression,
    pub descending: bool,
    pub nulls_first: Option<bool>,
}

/// A full SELECT: first body plus any set-operation arms, then the
/// statement-level ordering clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub with: Option<WithClause>,
    pub body: SelectBody,
    pub set_ops: Vec<SetOperation>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<Expression>,
    pub offset: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectBody {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: Option<FromClause>,
    pub where_clause: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetOperation {
    pub op: SetOperator,
    pub all: bool,
    pub body: SelectBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

/// A left-deep join tree: base relation plus ordered joins.
#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    pub base: TableRef,
    pub joins: Vec<Join>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    Table {
        name: QualifiedName,
        alias: Option<String>,
    },
    Subquery {
        query: Box<SelectStatement>,
        alias: Option<String>,
    },
}

impl TableRef {
    pub fn alias(&self) -> Option<&str> {
        match self {
            TableRef::Table { alias, .. } | TableRef::Subquery { alias, .. } => alias.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableRef,
    pub condition: JoinCondition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    /// Whether columns of the joined (right) relation become nullable.
    pub fn right_side_nullable(&self) -> bool {
        matches!(self, JoinKind::Left | JoinKind::Full)
    }

    /// Whether columns of the relations to the left become nullable.
    pub fn left_side_nullable(&self) -> bool {
        matches!(self, JoinKind::Right | JoinKind::Full)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    On(Expression),
    Using(Vec<String>),
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithClause {
    pub recursive: bool,
    pub ctes: Vec<CteDefinition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CteDefinition {
    pub name: String,
    pub columns: Option<Vec<String>>,
    pub query: SelectStatement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub with: Option<WithClause>,
    pub table: QualifiedName,
    pub columns: Vec<String>,
    pub source: InsertSource,
    pub on_conflict: Option<OnConflict>,
    pub returning: Option<Vec<SelectItem>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    Values { rows: Vec<Vec<Expression>> },
    Select(Box<SelectStatement>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnConflict {
    pub target_columns: Vec<String>,
    pub action: ConflictAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictAction {
    DoNothing,
    DoUpdate {
        assignments: Vec<Assignment>,
        where_clause: Option<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub with: Option<WithClause>,
    pub table: QualifiedName,
    pub alias: Option<String>,
    pub assignments: Vec<Assignment>,
    pub from: Option<FromClause>,
    pub where_clause: Option<Expression>,
    pub returning: Option<Vec<SelectItem>>,
}

/// `SET column = expression`
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub with: Option<WithClause>,
    pub table: QualifiedName,
    pub alias: Option<String>,
    pub where_clause: Option<Expression>,
    pub returning: Option<Vec<SelectItem>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

impl Statement {
    pub fn returning(&self) -> Option<&[SelectItem]> {
        match self {
            Statement::Select(_) => None,
            Statement::Insert(s) => s.returning.as_deref(),
            Statement::Update(s) => s.returning.as_deref(),
            Statement::Delete(s) => s.returning.as_deref(),
        }
    }
}
