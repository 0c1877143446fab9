//! Arithmetic feature expressions over named raw columns.
//!
//! Grammar:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | primary
//! primary := number | name | '(' expr ')'
//! name    := ident ('.' ident)*
//! ```
//!
//! Expressions are parsed once into an [`Expr`] tree and compiled into a
//! closure that indexes straight into a raw row.

use std::fmt;

use crate::error::{PredictError, Result};

/// Evaluates one feature from a raw row.
pub type Compiled = Box<dyn Fn(&[f64]) -> f64 + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn symbol(&self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
        }
    }
}

/// Parsed feature expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Column(String),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
        };
        let expr = parser.expr()?;
        match parser.peek() {
            None => Ok(expr),
            Some((offset, token)) => Err(parse_error(
                source,
                *offset,
                format!("unexpected {}", token),
            )),
        }
    }

    /// Column names referenced, in order of appearance.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Number(_) => {}
            Self::Column(name) => out.push(name),
            Self::Neg(inner) => inner.collect_columns(out),
            Self::Binary(_, lhs, rhs) => {
                lhs.collect_columns(out);
                rhs.collect_columns(out);
            }
        }
    }

    /// Compile against a row layout.
    ///
    /// Fails with the first referenced column missing from `columns`.
    pub fn compile(&self, columns: &[&str]) -> std::result::Result<Compiled, String> {
        let compiled: Compiled = match self {
            Self::Number(value) => {
                let value = *value;
                Box::new(move |_: &[f64]| value)
            }
            Self::Column(name) => {
                let idx = columns
                    .iter()
                    .position(|c| *c == name.as_str())
                    .ok_or_else(|| name.clone())?;
                Box::new(move |row: &[f64]| row[idx])
            }
            Self::Neg(inner) => {
                let inner = inner.compile(columns)?;
                Box::new(move |row: &[f64]| -inner(row))
            }
            Self::Binary(op, lhs, rhs) => {
                let lhs = lhs.compile(columns)?;
                let rhs = rhs.compile(columns)?;
                match op {
                    BinOp::Add => Box::new(move |row: &[f64]| lhs(row) + rhs(row)),
                    BinOp::Sub => Box::new(move |row: &[f64]| lhs(row) - rhs(row)),
                    BinOp::Mul => Box::new(move |row: &[f64]| lhs(row) * rhs(row)),
                    BinOp::Div => Box::new(move |row: &[f64]| lhs(row) / rhs(row)),
                }
            }
        };
        Ok(compiled)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{}", value),
            Self::Column(name) => f.write_str(name),
            Self::Neg(inner) => write!(f, "(-{})", inner),
            Self::Binary(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Op(char),
    Open,
    Close,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "number {}", value),
            Self::Name(name) => write!(f, "name '{}'", name),
            Self::Op(op) => write!(f, "'{}'", op),
            Self::Open => f.write_str("'('"),
            Self::Close => f.write_str("')'"),
        }
    }
}

fn parse_error(source: &str, offset: usize, message: String) -> PredictError {
    PredictError::FeatureParse {
        expr: source.to_string(),
        offset,
        message,
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' | '*' | '/' => {
                chars.next();
                tokens.push((start, Token::Op(c)));
            }
            '(' => {
                chars.next();
                tokens.push((start, Token::Open));
            }
            ')' => {
                chars.next();
                tokens.push((start, Token::Close));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = start;
                let mut prev = c;
                while let Some(&(i, d)) = chars.peek() {
                    let exponent_sign = (d == '+' || d == '-') && (prev == 'e' || prev == 'E');
                    if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exponent_sign {
                        end = i + d.len_utf8();
                        prev = d;
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &source[start..end];
                let value = text.parse::<f64>().map_err(|_| {
                    parse_error(source, start, format!("invalid number '{}'", text))
                })?;
                tokens.push((start, Token::Number(value)));
            }
            c if is_ident_start(c) => {
                let mut end = start;
                let mut expect_ident = true;
                while let Some(&(i, d)) = chars.peek() {
                    if expect_ident && is_ident_start(d) || !expect_ident && is_ident_char(d) {
                        expect_ident = false;
                    } else if d == '.' && !expect_ident {
                        expect_ident = true;
                    } else {
                        break;
                    }
                    end = i + d.len_utf8();
                    chars.next();
                }
                if expect_ident {
                    return Err(parse_error(
                        source,
                        end,
                        "name cannot end with '.'".to_string(),
                    ));
                }
                tokens.push((start, Token::Name(source[start..end].to_string())));
            }
            other => {
                return Err(parse_error(
                    source,
                    start,
                    format!("unexpected character '{}'", other),
                ));
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&(usize, Token)> {
        self.tokens.get(self.pos)
    }

    fn next_op(&mut self, ops: &[char]) -> Option<char> {
        match self.peek() {
            Some((_, Token::Op(op))) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        while let Some(op) = self.next_op(&['+', '-']) {
            let rhs = self.term()?;
            let op = if op == '+' { BinOp::Add } else { BinOp::Sub };
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.next_op(&['*', '/']) {
            let rhs = self.unary()?;
            let op = if op == '*' { BinOp::Mul } else { BinOp::Div };
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.next_op(&['-', '+']) {
            Some('-') => Ok(Expr::Neg(Box::new(self.unary()?))),
            Some(_) => self.unary(),
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        let Some((offset, token)) = self.tokens.get(self.pos).cloned() else {
            return Err(parse_error(
                self.source,
                self.source.len(),
                "unexpected end of expression".to_string(),
            ));
        };
        self.pos += 1;
        match token {
            Token::Number(value) => Ok(Expr::Number(value)),
            Token::Name(name) => Ok(Expr::Column(name)),
            Token::Open => {
                let inner = self.expr()?;
                match self.peek() {
                    Some((_, Token::Close)) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(parse_error(
                        self.source,
                        offset,
                        "unclosed '('".to_string(),
                    )),
                }
            }
            other => Err(parse_error(
                self.source,
                offset,
                format!("unexpected {}", other),
            )),
        }
    }
}
