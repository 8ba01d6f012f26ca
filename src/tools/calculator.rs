// ABOUTME: CalculatorTool - evaluates + - * / arithmetic with parentheses and unary signs.
// ABOUTME: A depth-bounded recursive-descent parser; bad input fails with a user-facing error code.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::tool::{Tool, ToolContext, ToolFailure};

/// Tool for safe arithmetic.
pub struct CalculatorTool;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, ToolFailure> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '0'..='9' | '.' => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, next)) = chars.peek() {
                    if next.is_ascii_digit() || next == '.' {
                        end = i + next.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let raw = &expr[start..end];
                let number = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite() && raw.matches('.').count() <= 1);
                match number {
                    Some(n) => Token::Number(n),
                    None => {
                        return Err(ToolFailure::user("INVALID_NUMBER", "Invalid number literal")
                            .with_details(json!({ "token": raw })));
                    }
                }
            }
            other => {
                return Err(ToolFailure::user(
                    "INVALID_CHAR",
                    "Expression contains invalid characters",
                )
                .with_details(json!({ "char": other.to_string() })));
            }
        };
        tokens.push(token);
    }

    Ok(tokens)
}

fn syntax_error() -> ToolFailure {
    ToolFailure::user("INVALID_SYNTAX", "Invalid expression")
}

fn mismatched_parens() -> ToolFailure {
    ToolFailure::user("MISMATCHED_PARENS", "Mismatched parentheses")
}

/// Deepest parenthesis nesting accepted.
const MAX_NESTING: usize = 64;

/// Longest expression accepted by the tool schema.
const MAX_EXPRESSION_CHARS: usize = 1_000;

/// expr   := term (('+' | '-') term)*
/// term   := unary (('*' | '/') unary)*
/// unary  := ('+' | '-')* atom
/// atom   := number | '(' expr ')'
///
/// Sign runs are folded in a loop and parentheses are depth-limited, so
/// recursion depth stays bounded for any input.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn parse(mut self) -> Result<f64, ToolFailure> {
        let value = self.expr()?;
        match self.peek() {
            None => Ok(value),
            Some(Token::RParen) => Err(mismatched_parens()),
            Some(_) => Err(syntax_error()),
        }
    }

    fn expr(&mut self) -> Result<f64, ToolFailure> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.bump();
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.bump();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, ToolFailure> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.bump();
                    value *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.bump();
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err(ToolFailure::user("DIVISION_BY_ZERO", "Division by zero"));
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> Result<f64, ToolFailure> {
        let mut negative = false;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.bump();
                }
                Some(Token::Minus) => {
                    self.bump();
                    negative = !negative;
                }
                _ => break,
            }
        }
        let value = self.atom()?;
        Ok(if negative { -value } else { value })
    }

    fn atom(&mut self) -> Result<f64, ToolFailure> {
        match self.bump() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                if self.depth >= MAX_NESTING {
                    return Err(ToolFailure::user(
                        "INVALID_SYNTAX",
                        "Expression is nested too deeply",
                    )
                    .with_details(json!({ "maxNesting": MAX_NESTING })));
                }
                self.depth += 1;
                let value = self.expr()?;
                self.depth -= 1;
                match self.bump() {
                    Some(Token::RParen) => Ok(value),
                    None => Err(mismatched_parens()),
                    Some(_) => Err(syntax_error()),
                }
            }
            Some(Token::RParen) => Err(mismatched_parens()),
            _ => Err(syntax_error()),
        }
    }
}

/// Evaluate an arithmetic expression.
pub(crate) fn evaluate(expression: &str) -> Result<f64, ToolFailure> {
    let tokens = tokenize(expression)?;
    let value = Parser {
        tokens,
        pos: 0,
        depth: 0,
    }
    .parse()?;
    if !value.is_finite() {
        return Err(ToolFailure::user(
            "NON_FINITE_RESULT",
            "Result is not a finite number",
        ));
    }
    Ok(value)
}

// Largest integer an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn to_json_number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        json!(value as i64)
    } else {
        json!(value)
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Safely evaluate a math expression (+ - * / parentheses)."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "minLength": 1,
                    "maxLength": MAX_EXPRESSION_CHARS,
                    "description": "Arithmetic expression, e.g. (2 + 3) * 4"
                }
            },
            "required": ["expression"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, ToolFailure> {
        #[derive(Deserialize)]
        struct Args {
            expression: String,
        }
        let args: Args = serde_json::from_value(args)?;

        evaluate(&args.expression).map(to_json_number)
    }
}
