use async_trait::async_trait;
use serde_json::{json, Value};

use super::{arg_str, ToolHandler};
use crate::executor::context::ExecutionContext;
use crate::executor::{ExecError, ToolOutput};

/// Arithmetic evaluator over `+ - * / % ^` and parentheses. No names, no
/// calls; the wall's lint tier already refused anything that looks like
/// code.
pub struct CalculateTool;

#[async_trait]
impl ToolHandler for CalculateTool {
    async fn run(&self, args: &Value, _ctx: &ExecutionContext) -> Result<ToolOutput, ExecError> {
        let expression = arg_str(args, "expression")?;
        let result = eval_expression(expression).map_err(ExecError::ToolInternal)?;
        let rendered = render_number(result);
        let reply = format!("{} = {}", expression.trim(), rendered);
        Ok(ToolOutput {
            value: json!({ "expression": expression, "result": rendered }),
            reply,
            ..ToolOutput::default()
        })
    }
}

pub fn render_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{x}")
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| format!("bad number '{literal}'"))?;
                tokens.push(Token::Number(number));
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' | 'x' | 'X' | '×' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' | '÷' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '^' => {
                chars.next();
                tokens.push(Token::Caret);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    if tokens.is_empty() {
        return Err("empty expression".into());
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
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    // additive := multiplicative (("+"|"-") multiplicative)*
    fn additive(&mut self) -> Result<f64, String> {
        let mut left = self.multiplicative()?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Plus => {
                    self.next();
                    left += self.multiplicative()?;
                }
                Token::Minus => {
                    self.next();
                    left -= self.multiplicative()?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<f64, String> {
        let mut left = self.power()?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Star => {
                    self.next();
                    left *= self.power()?;
                }
                Token::Slash => {
                    self.next();
                    let rhs = self.power()?;
                    if rhs == 0.0 {
                        return Err("division by zero".into());
                    }
                    left /= rhs;
                }
                Token::Percent => {
                    self.next();
                    let rhs = self.power()?;
                    if rhs == 0.0 {
                        return Err("modulo by zero".into());
                    }
                    left %= rhs;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // Right-associative exponentiation.
    fn power(&mut self) -> Result<f64, String> {
        let base = self.unary()?;
        if matches!(self.peek(), Some(Token::Caret)) {
            self.next();
            let exponent = self.power()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.next();
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.next();
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let inner = self.additive()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("missing closing parenthesis".into()),
                }
            }
            other => Err(format!("expected a number, got {other:?}")),
        }
    }
}

pub fn eval_expression(input: &str) -> Result<f64, String> {
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
    };
    let value = parser.additive()?;
    if parser.pos != parser.tokens.len() {
        return Err("trailing input after expression".into());
    }
    if !value.is_finite() {
        return Err("result is not finite".into());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_and_parentheses() {
        assert_eq!(eval_expression("25 * 47 + 183").unwrap(), 1358.0);
        assert_eq!(eval_expression("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(eval_expression("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(eval_expression("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(eval_expression("-4 + 10").unwrap(), 6.0);
        assert_eq!(eval_expression("10 % 4").unwrap(), 2.0);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(eval_expression("1 / 0").is_err());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(eval_expression("2 +").is_err());
        assert!(eval_expression("(1 + 2").is_err());
        assert!(eval_expression("").is_err());
    }

    #[test]
    fn integers_render_without_fraction() {
        assert_eq!(render_number(1358.0), "1358");
        assert_eq!(render_number(2.5), "2.5");
    }
}
