// Keyweave Conditions
// Compiled predicates over the focused window, source device and lock LEDs
//
// Grammar:
//   expr      := or
//   or        := and ("or" and)*
//   and       := not ("and" not)*
//   not       := "not" not | primary
//   primary   := "(" expr ")" | predicate
//   predicate := field (("==" | "=~") value)?
//
// Fields: wm_class, wm_name, device_name (alias devn), capslock, numlock.

use std::fmt;

use regex::{Regex, RegexBuilder};
use thiserror::Error;

use super::KeyContext;

/// Errors produced while compiling a condition string
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("condition is empty")]
    Empty,

    #[error("unterminated string literal in condition")]
    UnterminatedString,

    #[error("unexpected character '{0}' in condition")]
    UnexpectedChar(char),

    #[error("unexpected token {found} in condition, expected {expected}")]
    UnexpectedToken { found: String, expected: &'static str },

    #[error("unknown condition field '{0}'")]
    UnknownField(String),

    #[error("field '{0}' only supports == and =~")]
    NotAFlag(String),

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Eq,
    Match,
    Ident(String),
    Str(String),
    Bool(bool),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::And => f.write_str("'and'"),
            Token::Or => f.write_str("'or'"),
            Token::Not => f.write_str("'not'"),
            Token::Eq => f.write_str("'=='"),
            Token::Match => f.write_str("'=~'"),
            Token::Ident(s) => write!(f, "'{}'", s),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::Bool(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextField {
    WmClass,
    WmName,
    DeviceName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagField {
    CapsLock,
    NumLock,
}

#[derive(Debug, Clone)]
enum TextTest {
    Equals(String),
    Matches(Regex),
}

#[derive(Debug, Clone)]
enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Text(TextField, TextTest),
    Flag(FlagField, bool),
}

/// A compiled condition.
///
/// Parsed once when the configuration is loaded; evaluation never fails.
/// `==` compares case-insensitively, `=~` is a case-insensitive regex search
/// anywhere in the value.
#[derive(Debug, Clone)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ConditionError::Empty);
        }
        let expr = Parser { tokens, pos: 0 }.parse()?;
        Ok(Self {
            source: source.trim().to_string(),
            expr,
        })
    }

    /// Shorthand for `wm_class =~ '<pattern>'`
    pub fn wm_class_match(pattern: &str) -> Result<Self, ConditionError> {
        Ok(Self {
            source: format!("wm_class =~ '{}'", pattern),
            expr: Expr::Text(TextField::WmClass, TextTest::Matches(compile(pattern)?)),
        })
    }

    /// Shorthand for `not wm_class =~ '<pattern>'`
    pub fn not_wm_class_match(pattern: &str) -> Result<Self, ConditionError> {
        let inner = Self::wm_class_match(pattern)?;
        Ok(Self {
            source: format!("not {}", inner.source),
            expr: Expr::Not(Box::new(inner.expr)),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, ctx: &KeyContext) -> bool {
        eval(&self.expr, ctx)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn eval(expr: &Expr, ctx: &KeyContext) -> bool {
    match expr {
        Expr::And(left, right) => eval(left, ctx) && eval(right, ctx),
        Expr::Or(left, right) => eval(left, ctx) || eval(right, ctx),
        Expr::Not(inner) => !eval(inner, ctx),
        Expr::Text(field, test) => {
            let value = match field {
                TextField::WmClass => ctx.wm_class.as_str(),
                TextField::WmName => ctx.wm_name.as_str(),
                TextField::DeviceName => ctx.device_name.as_str(),
            };
            match test {
                TextTest::Equals(expected) => value.eq_ignore_ascii_case(expected),
                TextTest::Matches(re) => re.is_match(value),
            }
        }
        Expr::Flag(FlagField::CapsLock, expected) => ctx.capslock_on == *expected,
        Expr::Flag(FlagField::NumLock, expected) => ctx.numlock_on == *expected,
    }
}

fn compile(pattern: &str) -> Result<Regex, ConditionError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ConditionError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn parse(mut self) -> Result<Expr, ConditionError> {
        let expr = self.parse_or()?;
        match self.next() {
            None => Ok(expr),
            Some(token) => Err(ConditionError::UnexpectedToken {
                found: token.to_string(),
                expected: "end of condition",
            }),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        match self.next() {
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(expr),
                    other => Err(unexpected(other, "')'")),
                }
            }
            Some(Token::Ident(field)) => self.parse_predicate(field),
            other => Err(unexpected(other, "a field or '('")),
        }
    }

    fn parse_predicate(&mut self, field: String) -> Result<Expr, ConditionError> {
        let op = match self.peek() {
            Some(Token::Eq) | Some(Token::Match) => self.next(),
            _ => None,
        };

        match field.to_ascii_lowercase().as_str() {
            "wm_class" | "wm_name" | "device_name" | "devn" => {
                let text_field = match field.to_ascii_lowercase().as_str() {
                    "wm_class" => TextField::WmClass,
                    "wm_name" => TextField::WmName,
                    _ => TextField::DeviceName,
                };
                let test = match op {
                    Some(Token::Eq) => TextTest::Equals(self.parse_value()?),
                    Some(Token::Match) => TextTest::Matches(compile(&self.parse_value()?)?),
                    _ => return Err(ConditionError::NotAFlag(field)),
                };
                Ok(Expr::Text(text_field, test))
            }
            "capslock" | "capslk" | "numlock" | "numlk" => {
                let flag = if field.to_ascii_lowercase().starts_with("caps") {
                    FlagField::CapsLock
                } else {
                    FlagField::NumLock
                };
                let expected = match op {
                    None => true,
                    Some(_) => match self.next() {
                        Some(Token::Bool(b)) => b,
                        Some(Token::Str(s)) | Some(Token::Ident(s)) => {
                            matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
                        }
                        other => return Err(unexpected(other, "a boolean")),
                    },
                };
                Ok(Expr::Flag(flag, expected))
            }
            _ => Err(ConditionError::UnknownField(field)),
        }
    }

    fn parse_value(&mut self) -> Result<String, ConditionError> {
        match self.next() {
            Some(Token::Str(s)) | Some(Token::Ident(s)) => Ok(s),
            other => Err(unexpected(other, "a quoted value")),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }
}

fn unexpected(found: Option<Token>, expected: &'static str) -> ConditionError {
    ConditionError::UnexpectedToken {
        found: found.map_or_else(|| "end of condition".to_string(), |t| t.to_string()),
        expected,
    }
}

fn tokenize(condition: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<char> = condition.chars().collect();
    let mut i = 0usize;
    let mut out = Vec::new();

    while i < chars.len() {
        let ch = chars[i];
        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        match ch {
            '(' => {
                out.push(Token::LParen);
                i += 1;
            }
            ')' => {
                out.push(Token::RParen);
                i += 1;
            }
            '=' => match chars.get(i + 1) {
                Some('=') => {
                    out.push(Token::Eq);
                    i += 2;
                }
                Some('~') => {
                    out.push(Token::Match);
                    i += 2;
                }
                _ => return Err(ConditionError::UnexpectedChar('=')),
            },
            '!' => return Err(ConditionError::UnexpectedChar('!')),
            '\'' | '"' => {
                let quote = ch;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != quote {
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(ConditionError::UnterminatedString);
                }
                out.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            _ => {
                let start = i;
                while i < chars.len() {
                    let c = chars[i];
                    if c.is_whitespace() || matches!(c, '(' | ')' | '=' | '\'' | '"') {
                        break;
                    }
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.to_ascii_lowercase().as_str() {
                    "and" | "&&" => Token::And,
                    "or" | "||" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    _ => Token::Ident(word),
                };
                out.push(token);
            }
        }
    }

    Ok(out)
}
