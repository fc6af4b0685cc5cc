//! Boolean filter expressions over scalar fields
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! expr       := and_expr (("or" | "||") and_expr)*
//! and_expr   := unary (("and" | "&&") unary)*
//! unary      := ("not" | "!") unary | primary
//! primary    := "(" expr ")" | "true" | "false" | comparison
//! comparison := field op literal | literal op field
//!             | field ["not"] "in" "[" literal ("," literal)* "]"
//!             | field "like" string
//! op         := "==" | "!=" | "<" | "<=" | ">" | ">="
//! ```
//!
//! Keywords are case-insensitive. `like` patterns use `%` for any run of
//! characters and `_` for exactly one; `\%` and `\_` match literally.
//! Parentheses and `not` may nest at most [`MAX_NESTING`] deep, and an
//! expression holds at most [`MAX_TERMS`] `and`/`or` operators.

use std::cmp::Ordering;

use regex::Regex;

use super::backend::{Entity, FieldValue};
use super::error::FilterError;
use super::schema::{CollectionSchema, DataType};

/// Deepest allowed nesting of parentheses and `not`
pub const MAX_NESTING: usize = 128;

/// Most `and`/`or` operators in one expression
pub const MAX_TERMS: usize = 1024;

/// A literal value in an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Literal {
    fn type_name(&self) -> &'static str {
        match self {
            Literal::Str(_) => "string",
            Literal::Int(_) => "integer",
            Literal::Float(_) => "float",
            Literal::Bool(_) => "bool",
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Operator with its operands swapped (`3 < id` is `id > 3`)
    fn flip(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

/// Expression tree
#[derive(Debug, Clone)]
pub enum Expr {
    Const(bool),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        field: String,
        op: CompareOp,
        value: Literal,
    },
    In {
        field: String,
        values: Vec<Literal>,
        negated: bool,
    },
    Like {
        field: String,
        pattern: String,
        regex: Regex,
    },
}

impl Expr {
    fn bind(&self, schema: &CollectionSchema) -> Result<(), FilterError> {
        match self {
            Expr::Const(_) => Ok(()),
            Expr::Not(inner) => inner.bind(schema),
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.bind(schema)?;
                b.bind(schema)
            }
            Expr::Compare { field, value, .. } => {
                let dtype = scalar_type(schema, field)?;
                check_literal(field, dtype, value)
            }
            Expr::In { field, values, .. } => {
                let dtype = scalar_type(schema, field)?;
                values
                    .iter()
                    .try_for_each(|value| check_literal(field, dtype, value))
            }
            Expr::Like { field, .. } => match scalar_type(schema, field)? {
                DataType::VarChar => Ok(()),
                other => Err(FilterError::TypeMismatch {
                    field: field.clone(),
                    expected: other.to_string(),
                    found: "like pattern".to_string(),
                }),
            },
        }
    }

    fn eval(&self, entity: &Entity) -> bool {
        match self {
            Expr::Const(b) => *b,
            Expr::Not(inner) => !inner.eval(entity),
            Expr::And(a, b) => a.eval(entity) && b.eval(entity),
            Expr::Or(a, b) => a.eval(entity) || b.eval(entity),
            Expr::Compare { field, op, value } => entity
                .get(field)
                .and_then(|stored| compare(stored, value))
                .map(|ord| op.holds(ord))
                .unwrap_or(false),
            Expr::In {
                field,
                values,
                negated,
            } => {
                let found = match entity.get(field) {
                    Some(stored) => values
                        .iter()
                        .any(|v| compare(stored, v) == Some(Ordering::Equal)),
                    None => false,
                };
                found != *negated
            }
            Expr::Like { field, regex, .. } => entity
                .get(field)
                .and_then(FieldValue::as_str)
                .map(|s| regex.is_match(s))
                .unwrap_or(false),
        }
    }
}

fn scalar_type(schema: &CollectionSchema, field: &str) -> Result<DataType, FilterError> {
    let schema_field = schema.field(field).ok_or_else(|| FilterError::UnknownField {
        name: field.to_string(),
    })?;
    if schema_field.is_vector() {
        return Err(FilterError::VectorField {
            name: field.to_string(),
        });
    }
    Ok(schema_field.dtype)
}

fn check_literal(field: &str, dtype: DataType, value: &Literal) -> Result<(), FilterError> {
    let ok = matches!(
        (dtype, value),
        (DataType::VarChar, Literal::Str(_))
            | (DataType::Int64, Literal::Int(_))
            | (DataType::Int64, Literal::Float(_))
    );
    if ok {
        Ok(())
    } else {
        Err(FilterError::TypeMismatch {
            field: field.to_string(),
            expected: dtype.to_string(),
            found: value.type_name().to_string(),
        })
    }
}

fn compare(stored: &FieldValue, value: &Literal) -> Option<Ordering> {
    match (stored, value) {
        (FieldValue::VarChar(s), Literal::Str(v)) => Some(s.as_str().cmp(v.as_str())),
        (FieldValue::Int64(i), Literal::Int(v)) => Some(i.cmp(v)),
        (FieldValue::Int64(i), Literal::Float(v)) => (*i as f64).partial_cmp(v),
        _ => None,
    }
}

/// A parsed filter; empty source means "match everything"
#[derive(Debug, Clone)]
pub struct FilterExpr {
    source: String,
    root: Option<Expr>,
}

impl FilterExpr {
    /// Parse without checking field names or types
    pub fn parse(source: &str) -> Result<Self, FilterError> {
        let root = if source.trim().is_empty() {
            None
        } else {
            let tokens = tokenize(source)?;
            let mut parser = Parser {
                tokens,
                pos: 0,
                end: source.len(),
                depth: 0,
                terms: 0,
            };
            let expr = parser.parse_or()?;
            if let Some((offset, token)) = parser.tokens.get(parser.pos) {
                return Err(FilterError::Parse {
                    offset: *offset,
                    reason: format!("unexpected {:?} after expression", token),
                });
            }
            Some(expr)
        };

        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// Parse and check every field and literal against a schema
    pub fn compile(source: &str, schema: &CollectionSchema) -> Result<Self, FilterError> {
        let filter = Self::parse(source)?;
        if let Some(ref root) = filter.root {
            root.bind(schema)?;
        }
        Ok(filter)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn root(&self) -> Option<&Expr> {
        self.root.as_ref()
    }

    /// Evaluate against a stored row
    pub fn matches(&self, entity: &Entity) -> bool {
        self.root.as_ref().map_or(true, |root| root.eval(entity))
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Op(CompareOp),
    And,
    Or,
    Not,
    In,
    Like,
    True,
    False,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, FilterError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    let err = |offset: usize, reason: &str| FilterError::Parse {
        offset,
        reason: reason.to_string(),
    };

    while let Some(&(start, ch)) = chars.peek() {
        let next_is = |c: u8| bytes.get(start + 1) == Some(&c);

        let token = match ch {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            '=' if next_is(b'=') => {
                chars.next();
                Token::Op(CompareOp::Eq)
            }
            '=' => return Err(err(start, "expected '=='")),
            '!' if next_is(b'=') => {
                chars.next();
                Token::Op(CompareOp::Ne)
            }
            '!' => Token::Not,
            '<' if next_is(b'=') => {
                chars.next();
                Token::Op(CompareOp::Le)
            }
            '<' => Token::Op(CompareOp::Lt),
            '>' if next_is(b'=') => {
                chars.next();
                Token::Op(CompareOp::Ge)
            }
            '>' => Token::Op(CompareOp::Gt),
            '&' if next_is(b'&') => {
                chars.next();
                Token::And
            }
            '|' if next_is(b'|') => {
                chars.next();
                Token::Or
            }
            '\'' | '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, 't')) => value.push('\t'),
                            // escapes stay escaped until the literal's use is known
                            Some((_, c @ ('%' | '_' | '\\'))) => {
                                value.push('\\');
                                value.push(c);
                            }
                            Some((_, c)) => value.push(c),
                            None => break,
                        },
                        c if c == ch => {
                            closed = true;
                            break;
                        }
                        c => value.push(c),
                    }
                }
                if !closed {
                    return Err(err(start, "unterminated string literal"));
                }
                tokens.push((start, Token::Str(value)));
                continue;
            }
            c if c.is_ascii_digit() || (c == '-' && bytes.get(start + 1).map_or(false, u8::is_ascii_digit)) => {
                let mut end = start + c.len_utf8();
                chars.next();
                let mut is_float = false;
                while let Some(&(i, c)) = chars.peek() {
                    let exponent_sign = (c == '-' || c == '+')
                        && matches!(src[..i].chars().last(), Some('e') | Some('E'));
                    if c.is_ascii_digit() || exponent_sign {
                        // part of the number
                    } else if c == '.' || c == 'e' || c == 'E' {
                        is_float = true;
                    } else {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                let text = &src[start..end];
                let token = if is_float {
                    text.parse::<f64>()
                        .map(Token::Float)
                        .map_err(|_| err(start, &format!("invalid number '{}'", text)))?
                } else {
                    text.parse::<i64>()
                        .map(Token::Int)
                        .map_err(|_| err(start, &format!("integer out of range '{}'", text)))?
                };
                tokens.push((start, token));
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let word = &src[start..end];
                let token = match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "like" => Token::Like,
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(word.to_string()),
                };
                tokens.push((start, token));
                continue;
            }
            other => return Err(err(start, &format!("unexpected character '{}'", other))),
        };

        chars.next();
        tokens.push((start, token));
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    /// Offset reported for errors at end of input
    end: usize,
    /// Current parenthesis / `not` nesting
    depth: usize,
    /// `and`/`or` operators seen so far
    terms: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(o, _)| *o)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, reason: impl Into<String>) -> FilterError {
        FilterError::Parse {
            offset: self.offset(),
            reason: reason.into(),
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), FilterError> {
        if self.peek() == Some(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn enter(&mut self) -> Result<(), FilterError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    fn add_term(&mut self) -> Result<(), FilterError> {
        if self.terms >= MAX_TERMS {
            return Err(self.error("expression has too many terms"));
        }
        self.terms += 1;
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.add_term()?;
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.add_term()?;
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, FilterError> {
        if self.peek() == Some(&Token::Not) {
            self.enter()?;
            self.pos += 1;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, FilterError> {
        match self.peek() {
            Some(Token::LParen) => {
                self.enter()?;
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect(Token::RParen, "')'")?;
                self.depth -= 1;
                Ok(inner)
            }
            Some(Token::True) | Some(Token::False) => {
                // a bare boolean, unless it is the left side of a comparison
                if matches!(self.tokens.get(self.pos + 1), Some((_, Token::Op(_)))) {
                    return self.parse_reversed_comparison();
                }
                let value = self.peek() == Some(&Token::True);
                self.pos += 1;
                Ok(Expr::Const(value))
            }
            Some(Token::Ident(_)) => self.parse_comparison(),
            Some(Token::Str(_)) | Some(Token::Int(_)) | Some(Token::Float(_)) => {
                self.parse_reversed_comparison()
            }
            Some(other) => Err(self.error(format!("unexpected {:?}", other))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, FilterError> {
        let field = match self.advance() {
            Some(Token::Ident(name)) => name,
            _ => return Err(self.error("expected field name")),
        };

        match self.peek().cloned() {
            Some(Token::Op(op)) => {
                self.pos += 1;
                let value = self.parse_literal()?;
                Ok(Expr::Compare { field, op, value })
            }
            Some(Token::In) => {
                self.pos += 1;
                let values = self.parse_list()?;
                Ok(Expr::In {
                    field,
                    values,
                    negated: false,
                })
            }
            Some(Token::Not) if matches!(self.tokens.get(self.pos + 1), Some((_, Token::In))) => {
                self.pos += 2;
                let values = self.parse_list()?;
                Ok(Expr::In {
                    field,
                    values,
                    negated: true,
                })
            }
            Some(Token::Like) => {
                self.pos += 1;
                let pattern = match self.advance() {
                    Some(Token::Str(p)) => p,
                    _ => return Err(self.error("expected string pattern after 'like'")),
                };
                let regex = like_to_regex(&pattern).map_err(|e| self.error(e))?;
                Ok(Expr::Like {
                    field,
                    pattern,
                    regex,
                })
            }
            _ => Err(self.error(format!("expected operator after '{}'", field))),
        }
    }

    fn parse_reversed_comparison(&mut self) -> Result<Expr, FilterError> {
        let value = self.parse_literal()?;
        let op = match self.advance() {
            Some(Token::Op(op)) => op,
            _ => return Err(self.error("expected comparison operator")),
        };
        let field = match self.advance() {
            Some(Token::Ident(name)) => name,
            _ => return Err(self.error("expected field name")),
        };
        Ok(Expr::Compare {
            field,
            op: op.flip(),
            value,
        })
    }

    fn parse_literal(&mut self) -> Result<Literal, FilterError> {
        let literal = match self.peek() {
            Some(Token::Str(s)) => Literal::Str(unescape_plain(s)),
            Some(Token::Int(i)) => Literal::Int(*i),
            Some(Token::Float(f)) => Literal::Float(*f),
            Some(Token::True) => Literal::Bool(true),
            Some(Token::False) => Literal::Bool(false),
            _ => return Err(self.error("expected literal")),
        };
        self.pos += 1;
        Ok(literal)
    }

    fn parse_list(&mut self) -> Result<Vec<Literal>, FilterError> {
        self.expect(Token::LBracket, "'['")?;
        let mut values = Vec::new();
        loop {
            if self.peek() == Some(&Token::RBracket) {
                self.pos += 1;
                break;
            }
            values.push(self.parse_literal()?);
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(Token::RBracket) => {}
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
        if values.is_empty() {
            return Err(self.error("empty list"));
        }
        Ok(values)
    }
}

/// Outside of `like`, an escaped character is just the character itself
fn unescape_plain(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            other => out.push(other),
        }
    }
    out
}

fn like_to_regex(pattern: &str) -> Result<Regex, String> {
    let mut re = String::from("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    re.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| format!("invalid like pattern: {}", e))
}
