//! Formula parsing and evaluation
//!
//! A formula is plain arithmetic (`+ - * /`, parentheses, numbers) over
//! aggregate references:
//!
//! ```text
//! SUM(deals.amount) / COUNT(deals["Deal Name"]) * 100
//! ```
//!
//! References are either `FUNC(alias.column)` with a bare identifier or
//! `FUNC(alias["Column Name"])` with a JSON string literal. Each distinct
//! `(func, alias, column)` gets a placeholder identifier; the expression is
//! rewritten with placeholders, tokenized, converted to RPN with the
//! shunting-yard algorithm, and evaluated once per bucket.
//!
//! Evaluation never fails. Malformed references become `0`, unknown
//! identifiers read as `0`, a missing operand reads as `0`, and division by
//! zero yields `0`.

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::aggregate::AggregateFn;

static AGGREGATE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\b(SUM|AVG|COUNT|MIN|MAX)\s*\(\s*([A-Za-z_][A-Za-z0-9_]*)(?:\.([A-Za-z_][A-Za-z0-9_]*)|\[\s*("(?:[^"\\]|\\.)*")\s*\])\s*\)"#,
    )
    .expect("aggregate reference pattern is valid")
});

/// Any call shape left after reference substitution
static LEFTOVER_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_]*\s*\(").expect("call pattern is valid")
});

/// Prefix of substituted reference placeholders
const PLACEHOLDER_PREFIX: &str = "__ref_";

/// An aggregate reference extracted from a formula
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaRef {
    /// Aggregate function
    pub func: AggregateFn,
    /// Source alias
    pub alias: String,
    /// Column reference within the source
    pub column: String,
    /// Placeholder identifier substituted into the expression
    pub token: String,
}

/// A parsed formula, ready to evaluate against per-bucket values
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    refs: Vec<FormulaRef>,
    expression: String,
    rpn: Vec<Token>,
    malformed: usize,
}

impl Formula {
    /// Parse a formula string
    pub fn parse(source: &str) -> Self {
        let mut refs: Vec<FormulaRef> = Vec::new();
        let mut malformed = 0;

        let expression = AGGREGATE_REF
            .replace_all(source, |caps: &Captures<'_>| match decode_ref(caps) {
                Some((func, alias, column)) => {
                    let existing = refs
                        .iter()
                        .find(|r| r.func == func && r.alias == alias && r.column == column);
                    match existing {
                        Some(r) => r.token.clone(),
                        None => {
                            let token = format!("{}{}", PLACEHOLDER_PREFIX, refs.len());
                            refs.push(FormulaRef {
                                func,
                                alias,
                                column,
                                token: token.clone(),
                            });
                            token
                        }
                    }
                }
                None => {
                    malformed += 1;
                    "0".to_string()
                }
            })
            .into_owned();
        let (expression, unmatched) = zero_unmatched_calls(&expression);
        malformed += unmatched;

        let rpn = to_rpn(tokenize(&expression));

        Self {
            source: source.to_string(),
            refs,
            expression,
            rpn,
            malformed,
        }
    }

    /// Original formula text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct references, in order of first appearance
    pub fn refs(&self) -> &[FormulaRef] {
        &self.refs
    }

    /// Expression text with references replaced by placeholders
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Number of references that could not be decoded and were replaced by `0`
    pub fn malformed_refs(&self) -> usize {
        self.malformed
    }

    /// Evaluate with placeholder values; missing placeholders read as `0`
    pub fn evaluate(&self, values: &HashMap<String, f64>) -> f64 {
        eval_rpn(&self.rpn, values)
    }
}

fn decode_ref(caps: &Captures<'_>) -> Option<(AggregateFn, String, String)> {
    let func = AggregateFn::parse(caps.get(1)?.as_str()).ok()?;
    let alias = caps.get(2)?.as_str().to_string();
    let column = match (caps.get(3), caps.get(4)) {
        (Some(bare), _) => bare.as_str().to_string(),
        (None, Some(quoted)) => serde_json::from_str::<String>(quoted.as_str()).ok()?,
        (None, None) => return None,
    };
    Some((func, alias, column))
}

/// Replace call shapes the reference pattern did not accept with `0`
///
/// Covers lowercase functions, a missing column (`SUM(deals)`), and
/// unquoted brackets (`AVG(deals[amount])`). The call runs to its matching
/// `)` or to the end of the text. Returns the rewritten text and the number
/// of calls replaced.
fn zero_unmatched_calls(expression: &str) -> (String, usize) {
    let mut out = String::with_capacity(expression.len());
    let mut replaced = 0;
    let mut rest = expression;

    while let Some(m) = LEFTOVER_CALL.find(rest) {
        if m.as_str().starts_with(PLACEHOLDER_PREFIX) {
            out.push_str(&rest[..m.end()]);
            rest = &rest[m.end()..];
            continue;
        }

        out.push_str(&rest[..m.start()]);
        out.push('0');
        replaced += 1;

        let mut depth = 1usize;
        let mut end = rest.len();
        for (i, c) in rest[m.end()..].char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        end = m.end() + i + 1;
                        break;
                    }
                }
                _ => {}
            }
        }
        rest = &rest[end..];
    }

    out.push_str(rest);
    (out, replaced)
}

/// Binary arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn precedence(&self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
        }
    }

    fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => {
                if b == 0.0 {
                    0.0
                } else {
                    a / b
                }
            }
        }
    }
}

/// Expression token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Ident(String),
    Op(BinaryOp),
    LParen,
    RParen,
}

/// Split an expression into tokens
///
/// Characters that do not start a number, identifier, parenthesis, or
/// operator are skipped.
pub fn tokenize(expression: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '0'..='9' => tokens.push(lex_number(&mut chars)),
            '.' => {
                chars.next();
                if chars.peek().is_some_and(|d| d.is_ascii_digit()) {
                    let digits = take_while(&mut chars, |d| d.is_ascii_digit());
                    tokens.push(Token::Number(
                        format!("0.{}", digits).parse().unwrap_or(0.0),
                    ));
                }
            }
            'A'..='Z' | 'a'..='z' | '_' => {
                let ident = take_while(&mut chars, |d| d.is_ascii_alphanumeric() || d == '_');
                tokens.push(Token::Ident(ident));
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '+' | '-' | '*' | '/' => {
                chars.next();
                tokens.push(Token::Op(match c {
                    '+' => BinaryOp::Add,
                    '-' => BinaryOp::Sub,
                    '*' => BinaryOp::Mul,
                    _ => BinaryOp::Div,
                }));
            }
            _ => {
                chars.next();
            }
        }
    }
    tokens
}

fn lex_number(chars: &mut Peekable<Chars<'_>>) -> Token {
    let mut text = take_while(chars, |d| d.is_ascii_digit());

    // A fraction needs at least one digit after the point.
    let mut lookahead = chars.clone();
    if lookahead.next() == Some('.') && lookahead.peek().is_some_and(|d| d.is_ascii_digit()) {
        chars.next();
        text.push('.');
        text.push_str(&take_while(chars, |d| d.is_ascii_digit()));
    }
    Token::Number(text.parse().unwrap_or(0.0))
}

fn take_while(chars: &mut Peekable<Chars<'_>>, pred: impl Fn(char) -> bool) -> String {
    let mut out = String::new();
    while let Some(&c) = chars.peek() {
        if !pred(c) {
            break;
        }
        out.push(c);
        chars.next();
    }
    out
}

/// Shunting-yard conversion to reverse Polish notation
///
/// `*` and `/` bind tighter than `+` and `-`; all operators are
/// left-associative. Unbalanced parentheses are tolerated.
pub fn to_rpn(tokens: Vec<Token>) -> Vec<Token> {
    let mut output = Vec::with_capacity(tokens.len());
    let mut ops: Vec<Token> = Vec::new();

    for token in tokens {
        match token {
            Token::Number(_) | Token::Ident(_) => output.push(token),
            Token::Op(op) => {
                while let Some(Token::Op(top)) = ops.last() {
                    if top.precedence() < op.precedence() {
                        break;
                    }
                    if let Some(popped) = ops.pop() {
                        output.push(popped);
                    }
                }
                ops.push(Token::Op(op));
            }
            Token::LParen => ops.push(Token::LParen),
            Token::RParen => {
                while let Some(top) = ops.pop() {
                    if top == Token::LParen {
                        break;
                    }
                    output.push(top);
                }
            }
        }
    }

    // Leftover '(' from unbalanced input carry no meaning.
    while let Some(top) = ops.pop() {
        if top != Token::LParen {
            output.push(top);
        }
    }
    output
}

/// Evaluate an RPN token stream
pub fn eval_rpn(rpn: &[Token], values: &HashMap<String, f64>) -> f64 {
    let mut stack: Vec<f64> = Vec::new();

    for token in rpn {
        match token {
            Token::Number(n) => stack.push(*n),
            Token::Ident(name) => stack.push(values.get(name).copied().unwrap_or(0.0)),
            Token::Op(op) => {
                let b = pop_operand(&mut stack);
                let a = pop_operand(&mut stack);
                stack.push(op.apply(a, b));
            }
            Token::LParen | Token::RParen => {}
        }
    }
    stack.pop().unwrap_or(0.0)
}

/// Missing or NaN operands read as `0`
fn pop_operand(stack: &mut Vec<f64>) -> f64 {
    stack.pop().filter(|v| !v.is_nan()).unwrap_or(0.0)
}
