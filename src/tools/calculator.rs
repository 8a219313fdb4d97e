use async_trait::async_trait;

use crate::error::ToolError;
use crate::models::ToolName;
use crate::tools::ToolCapability;

/// Pure arithmetic evaluator. Accepts numeric literals, `+ - * /`,
/// parentheses and unary sign; nothing else is ever evaluated.
pub struct CalculatorTool;

#[async_trait]
impl ToolCapability for CalculatorTool {
    fn name(&self) -> ToolName {
        ToolName::Calculator
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let value = evaluate(input)?;
        Ok(format_value(value))
    }
}

pub fn evaluate(expression: &str) -> Result<f64, ToolError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(ToolError::Execution(
            "calculator received an empty expression".to_string(),
        ));
    }

    let mut parser = Parser::new(trimmed);
    let value = parser.expression()?;
    parser.skip_whitespace();
    if parser.peek().is_some() {
        return Err(ToolError::Execution(format!(
            "invalid arithmetic expression: {trimmed}"
        )));
    }
    Ok(value)
}

/// Integral results print without a fractional part ("1565", not "1565.0").
fn format_value(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn expression(&mut self) -> Result<f64, ToolError> {
        let mut value = self.term()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('+') => {
                    self.advance();
                    value += self.term()?;
                }
                Some('-') => {
                    self.advance();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, ToolError> {
        let mut value = self.factor()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('*') => {
                    self.advance();
                    value *= self.factor()?;
                }
                Some('/') => {
                    self.advance();
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err(ToolError::Execution("division by zero".to_string()));
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> Result<f64, ToolError> {
        self.skip_whitespace();
        match self.peek() {
            Some('+') => {
                self.advance();
                self.factor()
            }
            Some('-') => {
                self.advance();
                Ok(-self.factor()?)
            }
            Some('(') => {
                self.advance();
                let value = self.expression()?;
                self.skip_whitespace();
                if self.peek() != Some(')') {
                    return Err(ToolError::Execution(
                        "missing closing parenthesis".to_string(),
                    ));
                }
                self.advance();
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) => Err(ToolError::Execution(format!(
                "unexpected character in expression: {c}"
            ))),
            None => Err(ToolError::Execution(
                "unexpected end of expression".to_string(),
            )),
        }
    }

    fn number(&mut self) -> Result<f64, ToolError> {
        let start = self.pos;
        let mut seen_dot = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && !seen_dot {
                seen_dot = true;
                self.advance();
            } else {
                break;
            }
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse()
            .map_err(|_| ToolError::Execution(format!("invalid numeric literal: {literal}")))
    }
}
