//! CEL expression parsing.
//!
//! Directive conditions and variable references use a small side-effect-free
//! expression language. This module parses it into [`CelExpr`]; reference
//! extraction and parameter-schema unification live in [`analyzer`] and
//! [`schema`].

pub mod analyzer;
pub mod schema;

use std::fmt;

/// A parsed CEL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CelExpr {
    Ident(String),
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
    List(Vec<CelExpr>),
    Member {
        base: Box<CelExpr>,
        field: String,
    },
    Index {
        base: Box<CelExpr>,
        index: Box<CelExpr>,
    },
    Call {
        /// Receiver for method-style calls (`x.size()`)
        target: Option<Box<CelExpr>>,
        function: String,
        args: Vec<CelExpr>,
    },
    Unary {
        op: CelUnaryOp,
        operand: Box<CelExpr>,
    },
    Binary {
        op: CelBinaryOp,
        left: Box<CelExpr>,
        right: Box<CelExpr>,
    },
    Ternary {
        condition: Box<CelExpr>,
        then: Box<CelExpr>,
        otherwise: Box<CelExpr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CelUnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CelBinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Error from CEL parsing, with a byte offset into the expression text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CelParseError {
    pub message: String,
    pub offset: usize,
}

impl fmt::Display for CelParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

/// Parse a CEL expression.
pub fn parse_cel(input: &str) -> Result<CelExpr, CelParseError> {
    let tokens = lex(input)?;
    let mut parser = CelParser { tokens, pos: 0 };
    let expr = parser.parse_expr(0)?;
    if parser.pos < parser.tokens.len() {
        let token = &parser.tokens[parser.pos];
        return Err(CelParseError {
            message: format!("unexpected {:?}", token.text),
            offset: token.offset,
        });
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CelTokenKind {
    Ident,
    Int,
    Float,
    String,
    Operator,
    Punct,
}

#[derive(Debug, Clone)]
struct CelToken {
    kind: CelTokenKind,
    text: String,
    offset: usize,
}

fn lex(input: &str) -> Result<Vec<CelToken>, CelParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let mut end = offset;
            while let Some(&(i, c)) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    end = i + c.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(CelToken {
                kind: CelTokenKind::Ident,
                text: input[offset..end].to_string(),
                offset,
            });
            continue;
        }

        if c.is_ascii_digit() {
            let mut end = offset;
            let mut is_float = false;
            while let Some(&(i, c)) = chars.peek() {
                if c.is_ascii_digit() {
                    end = i + 1;
                    chars.next();
                } else if c == '.' && !is_float {
                    // Member access after an index (`xs[0].y`) never follows
                    // a bare integer, so a dot here is a decimal point
                    is_float = true;
                    end = i + 1;
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(CelToken {
                kind: if is_float {
                    CelTokenKind::Float
                } else {
                    CelTokenKind::Int
                },
                text: input[offset..end].to_string(),
                offset,
            });
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                if c == quote {
                    closed = true;
                    break;
                }
                if c == '\\' {
                    if let Some((_, escaped)) = chars.next() {
                        value.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                    }
                } else {
                    value.push(c);
                }
            }
            if !closed {
                return Err(CelParseError {
                    message: "unterminated string".to_string(),
                    offset,
                });
            }
            tokens.push(CelToken {
                kind: CelTokenKind::String,
                text: value,
                offset,
            });
            continue;
        }

        let two: String = input[offset..].chars().take(2).collect();
        if matches!(two.as_str(), "==" | "!=" | "<=" | ">=" | "&&" | "||") {
            chars.next();
            chars.next();
            tokens.push(CelToken {
                kind: CelTokenKind::Operator,
                text: two,
                offset,
            });
            continue;
        }

        if "+-*/%<>!".contains(c) {
            chars.next();
            tokens.push(CelToken {
                kind: CelTokenKind::Operator,
                text: c.to_string(),
                offset,
            });
            continue;
        }

        if "()[].,?:".contains(c) {
            chars.next();
            tokens.push(CelToken {
                kind: CelTokenKind::Punct,
                text: c.to_string(),
                offset,
            });
            continue;
        }

        return Err(CelParseError {
            message: format!("unexpected character {c:?}"),
            offset,
        });
    }

    Ok(tokens)
}

struct CelParser {
    tokens: Vec<CelToken>,
    pos: usize,
}

const CEL_BP_TERNARY: u8 = 1;
const CEL_BP_OR: u8 = 2;
const CEL_BP_AND: u8 = 3;
const CEL_BP_EQUALITY: u8 = 4;
const CEL_BP_RELATIONAL: u8 = 5;
const CEL_BP_ADDITIVE: u8 = 6;
const CEL_BP_MULTIPLICATIVE: u8 = 7;

impl CelParser {
    fn peek(&self) -> Option<&CelToken> {
        self.tokens.get(self.pos)
    }

    fn at(&self, text: &str) -> bool {
        self.peek().is_some_and(|t| t.text == text)
    }

    fn eat(&mut self, text: &str) -> bool {
        if self.at(text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, text: &str) -> Result<(), CelParseError> {
        if self.eat(text) {
            Ok(())
        } else {
            let (message, offset) = match self.peek() {
                Some(token) => (
                    format!("expected {:?}, found {:?}", text, token.text),
                    token.offset,
                ),
                None => (format!("expected {text:?}"), 0),
            };
            Err(CelParseError { message, offset })
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<CelExpr, CelParseError> {
        let mut lhs = self.parse_unary()?;

        loop {
            let Some(token) = self.peek() else { break };
            let (op, bp) = match token.text.as_str() {
                "?" if token.kind == CelTokenKind::Punct => {
                    if CEL_BP_TERNARY < min_bp {
                        break;
                    }
                    self.pos += 1;
                    let then = self.parse_expr(0)?;
                    self.expect(":")?;
                    let otherwise = self.parse_expr(CEL_BP_TERNARY)?;
                    lhs = CelExpr::Ternary {
                        condition: Box::new(lhs),
                        then: Box::new(then),
                        otherwise: Box::new(otherwise),
                    };
                    continue;
                }
                "||" => (CelBinaryOp::Or, CEL_BP_OR),
                "&&" => (CelBinaryOp::And, CEL_BP_AND),
                "==" => (CelBinaryOp::Eq, CEL_BP_EQUALITY),
                "!=" => (CelBinaryOp::NotEq, CEL_BP_EQUALITY),
                "<" => (CelBinaryOp::Lt, CEL_BP_RELATIONAL),
                "<=" => (CelBinaryOp::LtEq, CEL_BP_RELATIONAL),
                ">" => (CelBinaryOp::Gt, CEL_BP_RELATIONAL),
                ">=" => (CelBinaryOp::GtEq, CEL_BP_RELATIONAL),
                "in" if token.kind == CelTokenKind::Ident => {
                    (CelBinaryOp::In, CEL_BP_RELATIONAL)
                }
                "+" => (CelBinaryOp::Add, CEL_BP_ADDITIVE),
                "-" => (CelBinaryOp::Sub, CEL_BP_ADDITIVE),
                "*" => (CelBinaryOp::Mul, CEL_BP_MULTIPLICATIVE),
                "/" => (CelBinaryOp::Div, CEL_BP_MULTIPLICATIVE),
                "%" => (CelBinaryOp::Mod, CEL_BP_MULTIPLICATIVE),
                _ => break,
            };
            if bp < min_bp {
                break;
            }
            self.pos += 1;
            let rhs = self.parse_expr(bp + 1)?;
            lhs = CelExpr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<CelExpr, CelParseError> {
        if self.eat("!") {
            let operand = self.parse_unary()?;
            return Ok(CelExpr::Unary {
                op: CelUnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        if self.eat("-") {
            let operand = self.parse_unary()?;
            return Ok(CelExpr::Unary {
                op: CelUnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<CelExpr, CelParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.eat(".") {
                let Some(token) = self.peek().cloned() else {
                    return Err(CelParseError {
                        message: "expected field name after '.'".to_string(),
                        offset: 0,
                    });
                };
                if token.kind != CelTokenKind::Ident {
                    return Err(CelParseError {
                        message: format!("expected field name, found {:?}", token.text),
                        offset: token.offset,
                    });
                }
                self.pos += 1;

                if self.eat("(") {
                    let args = self.parse_args()?;
                    expr = CelExpr::Call {
                        target: Some(Box::new(expr)),
                        function: token.text,
                        args,
                    };
                } else {
                    expr = CelExpr::Member {
                        base: Box::new(expr),
                        field: token.text,
                    };
                }
            } else if self.eat("[") {
                let index = self.parse_expr(0)?;
                self.expect("]")?;
                expr = CelExpr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<CelExpr>, CelParseError> {
        let mut args = Vec::new();
        if !self.at(")") {
            loop {
                args.push(self.parse_expr(0)?);
                if !self.eat(",") {
                    break;
                }
            }
        }
        self.expect(")")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<CelExpr, CelParseError> {
        let Some(token) = self.peek().cloned() else {
            return Err(CelParseError {
                message: "unexpected end of expression".to_string(),
                offset: 0,
            });
        };

        match token.kind {
            CelTokenKind::Int => {
                self.pos += 1;
                token.text.parse().map(CelExpr::Int).map_err(|_| {
                    CelParseError {
                        message: format!("integer {:?} out of range", token.text),
                        offset: token.offset,
                    }
                })
            }
            CelTokenKind::Float => {
                self.pos += 1;
                token.text.parse().map(CelExpr::Float).map_err(|_| {
                    CelParseError {
                        message: format!("invalid number {:?}", token.text),
                        offset: token.offset,
                    }
                })
            }
            CelTokenKind::String => {
                self.pos += 1;
                Ok(CelExpr::String(token.text))
            }
            CelTokenKind::Ident => {
                self.pos += 1;
                match token.text.as_str() {
                    "true" => Ok(CelExpr::Bool(true)),
                    "false" => Ok(CelExpr::Bool(false)),
                    "null" => Ok(CelExpr::Null),
                    _ => {
                        if self.eat("(") {
                            let args = self.parse_args()?;
                            Ok(CelExpr::Call {
                                target: None,
                                function: token.text,
                                args,
                            })
                        } else {
                            Ok(CelExpr::Ident(token.text))
                        }
                    }
                }
            }
            CelTokenKind::Punct if token.text == "(" => {
                self.pos += 1;
                let expr = self.parse_expr(0)?;
                self.expect(")")?;
                Ok(expr)
            }
            CelTokenKind::Punct if token.text == "[" => {
                self.pos += 1;
                let mut items = Vec::new();
                if !self.at("]") {
                    loop {
                        items.push(self.parse_expr(0)?);
                        if !self.eat(",") {
                            break;
                        }
                    }
                }
                self.expect("]")?;
                Ok(CelExpr::List(items))
            }
            _ => Err(CelParseError {
                message: format!("unexpected {:?}", token.text),
                offset: token.offset,
            }),
        }
    }
}
