//! Stage L: the tokenizer.
//!
//! Classifies the template source into a stream of tagged tokens. Comments
//! and whitespace stay in the stream so later stages can reproduce the
//! author's SQL verbatim; block comments carrying directives are promoted to
//! [`TokenKind::DirectiveComment`] tokens. Lexing never aborts: problems go
//! into the diagnostic bag and scanning continues.

pub mod keywords;

pub use keywords::{is_contextual_keyword, is_keyword};

use crate::types::{diagnostic_codes, Diagnostic, DiagnosticKind, Position};
use crate::Dialect;

/// Token classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    LineComment,
    BlockComment,
    /// A block comment recognized as a template directive
    DirectiveComment,
    Identifier,
    /// Reserved word usable as an identifier in most positions
    ContextualIdentifier,
    Keyword,
    Number,
    String,
    Boolean,
    Null,
    Operator,
    Comma,
    Dot,
    Semicolon,
    LParen,
    RParen,
    /// A character the lexer could not classify; kept in the stream so token
    /// concatenation still reproduces the source
    Unknown,
}

/// Directive carried by a [`TokenKind::DirectiveComment`] token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveType {
    If,
    ElseIf,
    Else,
    For,
    End,
    /// `/*= expr */` variable site
    Variable,
    /// `/*# const name */` compile-time constant
    Const,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveInfo {
    pub directive_type: DirectiveType,

    /// The condition or expression text after the directive word
    pub expression: String,

    /// Index of the successor control-flow token, filled by the linker
    pub next_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,

    /// The raw source text of the token
    pub value: String,

    pub position: Position,

    pub directive: Option<DirectiveInfo>,
}

impl Token {
    /// Whitespace and plain comments: invisible to the SQL grammar and to
    /// directive processing.
    pub fn is_trivia(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment
        )
    }

    /// Everything the SQL grammar sees. Trivia and directives are skipped;
    /// so are unknown tokens, which the lexer already diagnosed.
    pub fn is_sql_significant(&self) -> bool {
        !self.is_trivia()
            && self.kind != TokenKind::DirectiveComment
            && self.kind != TokenKind::Unknown
    }

    /// Case-insensitive keyword test.
    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.value.eq_ignore_ascii_case(word)
    }

    /// End offset of this token in the source.
    pub fn end_offset(&self) -> usize {
        self.position.offset + self.value.len()
    }
}

/// Tokenize a template source.
///
/// Concatenating the `value` fields of the returned tokens reproduces the
/// source byte-for-byte, including unrecognized characters.
pub fn tokenize(source: &str, dialect: Dialect) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut lexer = Lexer {
        source,
        dialect,
        pos: 0,
        line: 1,
        column: 1,
        tokens: Vec::new(),
        diagnostics: Vec::new(),
    };
    lexer.run();
    (lexer.tokens, lexer.diagnostics)
}

struct Lexer<'a> {
    source: &'a str,
    dialect: Dialect,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    diagnostics: Vec<Diagnostic>,
}

const THREE_CHAR_OPERATORS: &[&str] = &["->>", "#>>", "!~*"];
const TWO_CHAR_OPERATORS: &[&str] = &[
    "<=", ">=", "<>", "!=", "||", "::", "->", "#>", "@>", "<@", "?|", "?&", "~*", "!~",
];
const ONE_CHAR_OPERATORS: &[char] = &['+', '-', '*', '/', '%', '=', '<', '>', '~', '^', '&', '|',
    '?', '#', '@', '!'];

impl<'a> Lexer<'a> {
    fn run(&mut self) {
        while let Some(c) = self.peek() {
            let start = self.pos;
            let position = self.position();

            match c {
                c if c.is_whitespace() => {
                    self.consume_while(|c| c.is_whitespace());
                    self.push(TokenKind::Whitespace, start, position);
                }
                '-' if self.peek_at(1) == Some('-') => {
                    self.consume_while(|c| c != '\n');
                    self.push(TokenKind::LineComment, start, position);
                }
                '#' if self.mysql_family() => {
                    self.consume_while(|c| c != '\n');
                    self.push(TokenKind::LineComment, start, position);
                }
                '/' if self.peek_at(1) == Some('*') => {
                    self.lex_block_comment(start, position);
                }
                '\'' => self.lex_string(start, position),
                '"' => {
                    if self.mysql_family() {
                        self.lex_quoted(start, position, '"', TokenKind::String);
                    } else {
                        self.lex_quoted(start, position, '"', TokenKind::Identifier);
                    }
                }
                '`' if self.mysql_family() => {
                    self.lex_quoted(start, position, '`', TokenKind::Identifier);
                }
                '$' if self.dialect.supports_dollar_quoting() => {
                    self.lex_dollar_string(start, position);
                }
                c if c.is_ascii_digit() => self.lex_number(start, position),
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.lex_number(start, position)
                }
                c if c.is_alphabetic() || c == '_' => self.lex_word(start, position),
                ',' => self.lex_single(TokenKind::Comma, start, position),
                '.' => self.lex_single(TokenKind::Dot, start, position),
                ';' => self.lex_single(TokenKind::Semicolon, start, position),
                '(' => self.lex_single(TokenKind::LParen, start, position),
                ')' => self.lex_single(TokenKind::RParen, start, position),
                ':' => {
                    if self.peek_at(1) == Some(':') {
                        self.bump();
                        self.bump();
                        self.push(TokenKind::Operator, start, position);
                    } else {
                        self.bump();
                        self.push(TokenKind::Unknown, start, position);
                        self.diagnostics.push(
                            Diagnostic::error(
                                DiagnosticKind::Lexical,
                                diagnostic_codes::LONE_COLON,
                                "lone ':' is not valid SQL; use '::' for casts",
                            )
                            .at(position),
                        );
                    }
                }
                _ => {
                    if !self.lex_operator(start, position) {
                        self.bump();
                        self.push(TokenKind::Unknown, start, position);
                        self.diagnostics.push(
                            Diagnostic::error(
                                DiagnosticKind::Lexical,
                                diagnostic_codes::UNEXPECTED_CHARACTER,
                                format!("unexpected character {c:?}"),
                            )
                            .at(position),
                        );
                    }
                }
            }
        }
    }

    fn mysql_family(&self) -> bool {
        matches!(self.dialect, Dialect::Mysql | Dialect::Mariadb)
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn position(&self) -> Position {
        Position::new(self.pos, self.line, self.column)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn consume_while(&mut self, predicate: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            self.bump();
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, position: Position) {
        self.tokens.push(Token {
            kind,
            value: self.source[start..self.pos].to_string(),
            position,
            directive: None,
        });
    }

    fn lex_single(&mut self, kind: TokenKind, start: usize, position: Position) {
        self.bump();
        self.push(kind, start, position);
    }

    fn lex_operator(&mut self, start: usize, position: Position) -> bool {
        for op in THREE_CHAR_OPERATORS {
            if self.rest().starts_with(op) {
                for _ in 0..op.len() {
                    self.bump();
                }
                self.push(TokenKind::Operator, start, position);
                return true;
            }
        }
        for op in TWO_CHAR_OPERATORS {
            if self.rest().starts_with(op) {
                for _ in 0..op.len() {
                    self.bump();
                }
                self.push(TokenKind::Operator, start, position);
                return true;
            }
        }
        if let Some(c) = self.peek() {
            if ONE_CHAR_OPERATORS.contains(&c) {
                self.bump();
                self.push(TokenKind::Operator, start, position);
                return true;
            }
        }
        false
    }

    fn lex_block_comment(&mut self, start: usize, position: Position) {
        self.bump();
        self.bump();
        let mut depth = 1usize;
        let mut terminated = false;
        while self.peek().is_some() {
            if self.rest().starts_with("/*") {
                depth += 1;
                self.bump();
                self.bump();
            } else if self.rest().starts_with("*/") {
                self.bump();
                self.bump();
                depth -= 1;
                if depth == 0 {
                    terminated = true;
                    break;
                }
            } else {
                self.bump();
            }
        }

        if !terminated {
            self.push(TokenKind::BlockComment, start, position);
            self.diagnostics.push(
                Diagnostic::error(
                    DiagnosticKind::Lexical,
                    diagnostic_codes::UNTERMINATED_COMMENT,
                    "block comment is never closed",
                )
                .at(position),
            );
            return;
        }

        let text = &self.source[start..self.pos];
        match classify_directive(text) {
            Some(directive) => {
                self.tokens.push(Token {
                    kind: TokenKind::DirectiveComment,
                    value: text.to_string(),
                    position,
                    directive: Some(directive),
                });
            }
            None => self.push(TokenKind::BlockComment, start, position),
        }
    }

    fn lex_string(&mut self, start: usize, position: Position) {
        self.bump();
        loop {
            match self.peek() {
                Some('\'') => {
                    self.bump();
                    // Doubled quote is an escaped quote, not a terminator
                    if self.peek() == Some('\'') {
                        self.bump();
                    } else {
                        break;
                    }
                }
                Some(_) => {
                    self.bump();
                }
                None => {
                    self.diagnostics.push(
                        Diagnostic::error(
                            DiagnosticKind::Lexical,
                            diagnostic_codes::UNTERMINATED_STRING,
                            "string literal is never closed",
                        )
                        .at(position),
                    );
                    break;
                }
            }
        }
        self.push(TokenKind::String, start, position);
    }

    fn lex_quoted(&mut self, start: usize, position: Position, quote: char, kind: TokenKind) {
        self.bump();
        loop {
            match self.peek() {
                Some(c) if c == quote => {
                    self.bump();
                    if self.peek() == Some(quote) {
                        self.bump();
                    } else {
                        break;
                    }
                }
                Some(_) => {
                    self.bump();
                }
                None => {
                    self.diagnostics.push(
                        Diagnostic::error(
                            DiagnosticKind::Lexical,
                            diagnostic_codes::UNTERMINATED_STRING,
                            format!("quoted identifier or string opened with {quote:?} is never closed"),
                        )
                        .at(position),
                    );
                    break;
                }
            }
        }
        self.push(kind, start, position);
    }

    fn lex_dollar_string(&mut self, start: usize, position: Position) {
        // $tag$ ... $tag$ with an optional tag of identifier characters
        let rest = self.rest();
        let mut tag_end = 1;
        for (i, c) in rest.char_indices().skip(1) {
            if c == '$' {
                tag_end = i + 1;
                break;
            }
            if !(c.is_alphanumeric() || c == '_') {
                tag_end = 0;
                break;
            }
        }
        if tag_end <= 1 && !rest[1..].starts_with('$') {
            // Not a dollar quote opener; treat the '$' as an unknown character
            self.bump();
            self.push(TokenKind::Unknown, start, position);
            self.diagnostics.push(
                Diagnostic::error(
                    DiagnosticKind::Lexical,
                    diagnostic_codes::UNEXPECTED_CHARACTER,
                    "unexpected character '$'",
                )
                .at(position),
            );
            return;
        }

        let delimiter = rest[..tag_end.max(2)].to_string();
        for _ in 0..delimiter.chars().count() {
            self.bump();
        }

        loop {
            if self.rest().is_empty() {
                self.diagnostics.push(
                    Diagnostic::error(
                        DiagnosticKind::Lexical,
                        diagnostic_codes::UNTERMINATED_STRING,
                        format!("dollar-quoted string opened with {delimiter} is never closed"),
                    )
                    .at(position),
                );
                break;
            }
            if self.rest().starts_with(&delimiter) {
                for _ in 0..delimiter.chars().count() {
                    self.bump();
                }
                break;
            }
            self.bump();
        }
        self.push(TokenKind::String, start, position);
    }

    fn lex_number(&mut self, start: usize, position: Position) {
        let mut malformed = false;

        self.consume_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') && self.peek_at(1) != Some('.') {
            self.bump();
            self.consume_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign_offset = if matches!(self.peek_at(1), Some('+') | Some('-')) {
                2
            } else {
                1
            };
            if self.peek_at(sign_offset).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..sign_offset {
                    self.bump();
                }
                self.consume_while(|c| c.is_ascii_digit());
            } else {
                // `1e` / `1e+` with no exponent digits
                for _ in 0..sign_offset {
                    self.bump();
                }
                malformed = true;
            }
        }

        // Identifier characters glued to a number make it unreadable as
        // either token; keep them in the number token and report it
        if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.consume_while(|c| c.is_alphanumeric() || c == '_');
            malformed = true;
        }

        if malformed {
            self.diagnostics.push(
                Diagnostic::error(
                    DiagnosticKind::Lexical,
                    diagnostic_codes::MALFORMED_NUMBER,
                    format!("malformed number {:?}", &self.source[start..self.pos]),
                )
                .at(position),
            );
        }
        self.push(TokenKind::Number, start, position);
    }

    fn lex_word(&mut self, start: usize, position: Position) {
        self.consume_while(|c| c.is_alphanumeric() || c == '_');
        let word = &self.source[start..self.pos];

        let kind = if word.eq_ignore_ascii_case("true") || word.eq_ignore_ascii_case("false") {
            TokenKind::Boolean
        } else if word.eq_ignore_ascii_case("null") {
            TokenKind::Null
        } else if is_keyword(word) {
            TokenKind::Keyword
        } else if is_contextual_keyword(word) {
            TokenKind::ContextualIdentifier
        } else {
            TokenKind::Identifier
        };
        self.push(kind, start, position);
    }
}

/// Classify a terminated block comment as a directive.
///
/// `/*= expr */` is a variable site; `/*# word ... */` is control flow or a
/// constant reference when `word` is one of the directive keywords. Anything
/// else stays a plain comment (including the `/*# key: value */` template
/// header, which is read separately).
fn classify_directive(text: &str) -> Option<DirectiveInfo> {
    let body = &text[2..text.len() - 2];
    let trimmed = body.trim_start();

    if let Some(expr) = trimmed.strip_prefix('=') {
        return Some(DirectiveInfo {
            directive_type: DirectiveType::Variable,
            expression: expr.trim().to_string(),
            next_index: None,
        });
    }

    let rest = trimmed.strip_prefix('#')?.trim_start();
    let word_end = rest
        .char_indices()
        .find(|(_, c)| !c.is_ascii_alphabetic())
        .map_or(rest.len(), |(i, _)| i);
    let (word, tail) = rest.split_at(word_end);

    let directive_type = match word {
        "if" => DirectiveType::If,
        "elseif" => DirectiveType::ElseIf,
        "else" => DirectiveType::Else,
        "for" => DirectiveType::For,
        "end" => DirectiveType::End,
        "const" => DirectiveType::Const,
        _ => return None,
    };

    Some(DirectiveInfo {
        directive_type,
        expression: tail.trim().to_string(),
        next_index: None,
    })
}
