//! Inline expressions.
//!
//! Text with embedded `${...}` (or `$->{...}`) segments, used for
//! data node lists and for sharding expressions:
//!
//! ```text
//! ds_${0..1}.t_user_${[0, 2]}
//! t_user_${user_id % 4}
//! ds_${hash(name) % 2}
//! ```
//!
//! An expression supports integers, quoted strings, column variables,
//! `+ - * / %`, parentheses, `abs()`, `hash()`, lists `[a, b]` and ranges
//! `a..b`. Lists and ranges expand: the result of a template is the
//! cartesian product of its segments, left to right.

use std::collections::HashMap;
use std::hash::Hasher;

use fnv::FnvHasher;

use super::Error;
use crate::router::statement::Value;

/// Expansions larger than this are rejected.
const MAX_EXPANSION: usize = 100_000;

/// Stable 63-bit hash used by `hash()` and the `hash_mod` algorithm.
pub fn hash(value: &str) -> i64 {
    let mut hasher = FnvHasher::default();
    hasher.write(value.as_bytes());
    (hasher.finish() & i64::MAX as u64) as i64
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Integer(i64),
    Text(String),
    Variable(String),
    Call(String, Box<Expr>),
    List(Vec<Expr>),
    Range(Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Evaluated {
    Integer(i64),
    Text(String),
    List(Vec<Evaluated>),
}

impl Evaluated {
    fn flatten(self, out: &mut Vec<String>) {
        match self {
            Self::Integer(value) => out.push(value.to_string()),
            Self::Text(value) => out.push(value),
            Self::List(values) => {
                for value in values {
                    value.flatten(out);
                }
            }
        }
    }
}

/// Parsed inline expression.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineExpression {
    source: String,
    segments: Vec<Segment>,
}

impl InlineExpression {
    pub fn parse(source: &str) -> Result<Self, Error> {
        let syntax = |reason: &str| Error::InlineSyntax {
            expression: source.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = vec![];
        let mut text = String::new();
        let mut rest = source;

        while !rest.is_empty() {
            let open = if rest.starts_with("${") {
                Some(2)
            } else if rest.starts_with("$->{") {
                Some(4)
            } else {
                None
            };

            let Some(open) = open else {
                let mut chars = rest.chars();
                if let Some(c) = chars.next() {
                    text.push(c);
                }
                rest = chars.as_str();
                continue;
            };

            if !text.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut text)));
            }

            let body = &rest[open..];
            let close = closing_brace(body).ok_or_else(|| syntax("unterminated ${"))?;
            let tokens = tokenize(&body[..close]).map_err(|reason| syntax(&reason))?;
            let mut parser = Parser { tokens, pos: 0 };
            let expr = parser.expression().map_err(|reason| syntax(&reason))?;
            if parser.pos != parser.tokens.len() {
                return Err(syntax("unexpected trailing input"));
            }
            segments.push(Segment::Expr(expr));
            rest = &body[close + 1..];
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Expand without variables, e.g. a data node list.
    pub fn expand(&self) -> Result<Vec<String>, Error> {
        self.evaluate(&HashMap::new())
    }

    /// Evaluate with column values. Variable names are matched
    /// case-insensitively.
    pub fn evaluate(&self, variables: &HashMap<String, Value>) -> Result<Vec<String>, Error> {
        let mut results = vec![String::new()];

        for segment in &self.segments {
            let alternatives = match segment {
                Segment::Text(text) => vec![text.clone()],
                Segment::Expr(expr) => {
                    let mut out = vec![];
                    self.eval(expr, variables)?.flatten(&mut out);
                    out
                }
            };

            if results.len() * alternatives.len() > MAX_EXPANSION {
                return Err(self.error("expands to too many values"));
            }

            results = results
                .iter()
                .flat_map(|prefix| {
                    alternatives
                        .iter()
                        .map(move |alternative| format!("{}{}", prefix, alternative))
                })
                .collect();
        }

        Ok(results)
    }

    /// Variables referenced by the expression, lowercase.
    pub fn variables(&self) -> Vec<String> {
        fn walk(expr: &Expr, out: &mut Vec<String>) {
            match expr {
                Expr::Variable(name) => {
                    if !out.contains(name) {
                        out.push(name.clone());
                    }
                }
                Expr::Call(_, arg) | Expr::Negate(arg) => walk(arg, out),
                Expr::List(items) => items.iter().for_each(|item| walk(item, out)),
                Expr::Range(left, right) | Expr::Binary(_, left, right) => {
                    walk(left, out);
                    walk(right, out);
                }
                Expr::Integer(_) | Expr::Text(_) => (),
            }
        }

        let mut out = vec![];
        for segment in &self.segments {
            if let Segment::Expr(expr) = segment {
                walk(expr, &mut out);
            }
        }
        out
    }

    fn error(&self, reason: &str) -> Error {
        Error::InlineEvaluation {
            expression: self.source.clone(),
            reason: reason.to_string(),
        }
    }

    fn eval(&self, expr: &Expr, variables: &HashMap<String, Value>) -> Result<Evaluated, Error> {
        Ok(match expr {
            Expr::Integer(value) => Evaluated::Integer(*value),
            Expr::Text(value) => Evaluated::Text(value.clone()),

            Expr::Variable(name) => {
                let value = variables
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
                    .ok_or_else(|| self.error(&format!("no value for \"{}\"", name)))?;
                match value {
                    Value::Integer(value) => Evaluated::Integer(*value),
                    Value::Text(value) => Evaluated::Text(value.clone()),
                }
            }

            Expr::Call(function, arg) => {
                let arg = self.eval(arg, variables)?;
                match (function.as_str(), arg) {
                    ("abs", Evaluated::Integer(value)) => Evaluated::Integer(
                        value
                            .checked_abs()
                            .ok_or_else(|| self.error("integer overflow"))?,
                    ),
                    ("hash", Evaluated::Integer(value)) => {
                        Evaluated::Integer(hash(&value.to_string()))
                    }
                    ("hash", Evaluated::Text(value)) => Evaluated::Integer(hash(&value)),
                    (function, _) => {
                        return Err(self.error(&format!("can't apply {}() here", function)))
                    }
                }
            }

            Expr::List(items) => Evaluated::List(
                items
                    .iter()
                    .map(|item| self.eval(item, variables))
                    .collect::<Result<_, _>>()?,
            ),

            Expr::Range(low, high) => {
                match (self.eval(low, variables)?, self.eval(high, variables)?) {
                    (Evaluated::Integer(low), Evaluated::Integer(high)) if low <= high => {
                        if high.abs_diff(low) >= MAX_EXPANSION as u64 {
                            return Err(self.error("range too large"));
                        }
                        Evaluated::List((low..=high).map(Evaluated::Integer).collect())
                    }
                    _ => return Err(self.error("range bounds must be ascending integers")),
                }
            }

            Expr::Negate(inner) => match self.eval(inner, variables)? {
                Evaluated::Integer(value) => Evaluated::Integer(
                    value
                        .checked_neg()
                        .ok_or_else(|| self.error("integer overflow"))?,
                ),
                _ => return Err(self.error("can only negate integers")),
            },

            Expr::Binary(op, left, right) => {
                let left = self.eval(left, variables)?;
                let right = self.eval(right, variables)?;
                self.binary(*op, left, right)?
            }
        })
    }

    fn binary(&self, op: char, left: Evaluated, right: Evaluated) -> Result<Evaluated, Error> {
        let overflow = || self.error("integer overflow");

        match (op, left, right) {
            (_, Evaluated::Integer(left), Evaluated::Integer(right)) => {
                let value = match op {
                    '+' => left.checked_add(right).ok_or_else(overflow)?,
                    '-' => left.checked_sub(right).ok_or_else(overflow)?,
                    '*' => left.checked_mul(right).ok_or_else(overflow)?,
                    '/' | '%' if right == 0 => return Err(self.error("division by zero")),
                    '/' => left.checked_div(right).ok_or_else(overflow)?,
                    '%' => left.checked_rem_euclid(right).ok_or_else(overflow)?,
                    _ => return Err(self.error(&format!("unknown operator {}", op))),
                };
                Ok(Evaluated::Integer(value))
            }

            (
                '+',
                left @ (Evaluated::Integer(_) | Evaluated::Text(_)),
                right @ (Evaluated::Integer(_) | Evaluated::Text(_)),
            ) => {
                let mut out = vec![];
                left.flatten(&mut out);
                right.flatten(&mut out);
                Ok(Evaluated::Text(out.concat()))
            }

            (op, _, _) => Err(self.error(&format!("can't apply {} to these operands", op))),
        }
    }
}

/// Position of the `}` closing a `${`, skipping nested braces and strings.
fn closing_brace(body: &str) -> Option<usize> {
    let mut depth = 0;
    let mut quote = None;

    for (pos, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => (),
            (None, '\'' | '"') => quote = Some(c),
            (None, '{') => depth += 1,
            (None, '}') if depth == 0 => return Some(pos),
            (None, '}') => depth -= 1,
            _ => (),
        }
    }

    None
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Integer(i64),
    Text(String),
    Ident(String),
    Op(char),
    DotDot,
    Open(char),
    Close(char),
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = vec![];
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }

            '0'..='9' => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = digits
                    .parse()
                    .map_err(|_| format!("integer \"{}\" out of range", digits))?;
                tokens.push(Token::Integer(value));
            }

            '\'' | '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some(q) if q == c => break,
                        Some(other) => text.push(other),
                        None => return Err("unterminated string".into()),
                    }
                }
                tokens.push(Token::Text(text));
            }

            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident.to_lowercase()));
            }

            '.' => {
                chars.next();
                if chars.next() != Some('.') {
                    return Err("expected \"..\"".into());
                }
                tokens.push(Token::DotDot);
            }

            '+' | '-' | '*' | '/' | '%' => {
                chars.next();
                tokens.push(Token::Op(c));
            }

            '(' | '[' => {
                chars.next();
                tokens.push(Token::Open(c));
            }

            ')' | ']' => {
                chars.next();
                tokens.push(Token::Close(c));
            }

            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }

            c => return Err(format!("unexpected character '{}'", c)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(format!("expected {:?}, got {:?}", expected, other)),
        }
    }

    /// Lowest precedence: ranges.
    fn expression(&mut self) -> Result<Expr, String> {
        let left = self.additive()?;
        if self.peek() == Some(&Token::DotDot) {
            self.pos += 1;
            let right = self.additive()?;
            return Ok(Expr::Range(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, String> {
        let mut left = self.multiplicative()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, String> {
        let mut left = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek().cloned() {
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Op('-')) {
            self.pos += 1;
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Integer(value)) => Ok(Expr::Integer(value)),
            Some(Token::Text(value)) => Ok(Expr::Text(value)),

            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::Open('(')) {
                    self.pos += 1;
                    let arg = self.expression()?;
                    self.expect(Token::Close(')'))?;
                    if !matches!(name.as_str(), "abs" | "hash") {
                        return Err(format!("unknown function {}()", name));
                    }
                    Ok(Expr::Call(name, Box::new(arg)))
                } else {
                    Ok(Expr::Variable(name))
                }
            }

            Some(Token::Open('(')) => {
                let expr = self.expression()?;
                self.expect(Token::Close(')'))?;
                Ok(expr)
            }

            Some(Token::Open('[')) => {
                let mut items = vec![];
                if self.peek() == Some(&Token::Close(']')) {
                    self.pos += 1;
                    return Ok(Expr::List(items));
                }
                loop {
                    items.push(self.expression()?);
                    match self.next() {
                        Some(Token::Comma) => continue,
                        Some(Token::Close(']')) => break,
                        other => return Err(format!("expected , or ], got {:?}", other)),
                    }
                }
                Ok(Expr::List(items))
            }

            other => Err(format!("unexpected {:?}", other)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_expand_nodes() {
        let nodes = InlineExpression::parse("ds_${0..1}.t_user_${0..3}")
            .unwrap()
            .expand()
            .unwrap();
        assert_eq!(nodes.len(), 8);
        assert_eq!(nodes[0], "ds_0.t_user_0");
        assert_eq!(nodes[3], "ds_0.t_user_3");
        assert_eq!(nodes[4], "ds_1.t_user_0");

        let nodes = InlineExpression::parse("ds_$->{['a', 'b']}.t_${[0, 2]}")
            .unwrap()
            .expand()
            .unwrap();
        assert_eq!(nodes, vec!["ds_a.t_0", "ds_a.t_2", "ds_b.t_0", "ds_b.t_2"]);
    }

    #[test]
    fn test_evaluate() {
        let expr = InlineExpression::parse("t_user_${user_id % 4}").unwrap();
        assert_eq!(
            expr.evaluate(&vars(&[("USER_ID", Value::Integer(5))])).unwrap(),
            vec!["t_user_1"]
        );
        assert_eq!(
            expr.evaluate(&vars(&[("user_id", Value::Integer(-3))])).unwrap(),
            vec!["t_user_1"]
        );
        assert_eq!(expr.variables(), vec!["user_id"]);

        let expr = InlineExpression::parse("ds_${(a + b) * 2 - abs(-1)}").unwrap();
        assert_eq!(
            expr.evaluate(&vars(&[("a", Value::Integer(1)), ("b", Value::Integer(2))]))
                .unwrap(),
            vec!["ds_5"]
        );

        let expr = InlineExpression::parse("${'ds_' + region}").unwrap();
        assert_eq!(
            expr.evaluate(&vars(&[("region", Value::from("eu"))])).unwrap(),
            vec!["ds_eu"]
        );
    }

    #[test]
    fn test_hash_stable() {
        let expr = InlineExpression::parse("${hash(name) % 16}").unwrap();
        let first = expr.evaluate(&vars(&[("name", Value::from("alice"))])).unwrap();
        let again = expr.evaluate(&vars(&[("name", Value::from("alice"))])).unwrap();
        assert_eq!(first, again);
        assert_eq!(first, vec![(hash("alice") % 16).to_string()]);
        assert!(hash("alice") >= 0);
    }

    #[test]
    fn test_errors() {
        for bad in ["ds_${0..", "ds_${1 +}", "ds_${foo(1)}", "ds_${1 # 2}"] {
            assert!(
                matches!(
                    InlineExpression::parse(bad),
                    Err(Error::InlineSyntax { .. })
                ),
                "{}",
                bad
            );
        }

        let expr = InlineExpression::parse("t_${user_id / 0}").unwrap();
        assert!(matches!(
            expr.evaluate(&vars(&[("user_id", Value::Integer(1))])),
            Err(Error::InlineEvaluation { .. })
        ));
        assert!(matches!(
            expr.expand(),
            Err(Error::InlineEvaluation { .. })
        ));
        assert!(InlineExpression::parse("t_${3..1}").unwrap().expand().is_err());
    }

    #[test]
    fn test_plain_text() {
        let expr = InlineExpression::parse("ds_0.t_config").unwrap();
        assert_eq!(expr.expand().unwrap(), vec!["ds_0.t_config"]);
        assert_eq!(expr.source(), "ds_0.t_config");
    }
}
