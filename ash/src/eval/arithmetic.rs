use crate::error::{AshError, AshResult};
use crate::shell::Shell;
use std::iter::Peekable;
use std::str::Chars;

type Tokens<'a> = Peekable<Chars<'a>>;

impl Shell {
    /// Evaluate an already word-expanded `$((...))` body. Bare identifiers
    /// read shell variables; unset or non-numeric values count as 0.
    pub(crate) fn evaluate_arithmetic(&self, expr: &str) -> AshResult<i64> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Ok(0);
        }
        let mut chars = expr.chars().peekable();
        let value = self.parse_ternary(&mut chars)?;
        skip_whitespace(&mut chars);
        match chars.next() {
            None => Ok(value),
            Some(c) => Err(AshError::Runtime(format!(
                "arithmetic: unexpected '{c}' in \"{expr}\""
            ))),
        }
    }

    fn parse_ternary(&self, chars: &mut Tokens) -> AshResult<i64> {
        let cond = self.parse_logical_or(chars)?;
        skip_whitespace(chars);
        if chars.peek() != Some(&'?') {
            return Ok(cond);
        }
        chars.next();
        let then = self.parse_ternary(chars)?;
        skip_whitespace(chars);
        if chars.next() != Some(':') {
            return Err(AshError::Runtime("arithmetic: expected ':'".to_string()));
        }
        let otherwise = self.parse_ternary(chars)?;
        Ok(if cond != 0 { then } else { otherwise })
    }

    fn parse_logical_or(&self, chars: &mut Tokens) -> AshResult<i64> {
        let mut left = self.parse_logical_and(chars)?;
        while eat_pair(chars, '|', '|') {
            let right = self.parse_logical_and(chars)?;
            left = i64::from(left != 0 || right != 0);
        }
        Ok(left)
    }

    fn parse_logical_and(&self, chars: &mut Tokens) -> AshResult<i64> {
        let mut left = self.parse_equality(chars)?;
        while eat_pair(chars, '&', '&') {
            let right = self.parse_equality(chars)?;
            left = i64::from(left != 0 && right != 0);
        }
        Ok(left)
    }

    fn parse_equality(&self, chars: &mut Tokens) -> AshResult<i64> {
        let mut left = self.parse_relational(chars)?;
        loop {
            if eat_pair(chars, '=', '=') {
                let right = self.parse_relational(chars)?;
                left = i64::from(left == right);
            } else if eat_pair(chars, '!', '=') {
                let right = self.parse_relational(chars)?;
                left = i64::from(left != right);
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_relational(&self, chars: &mut Tokens) -> AshResult<i64> {
        let mut left = self.parse_additive(chars)?;
        loop {
            skip_whitespace(chars);
            let op = match chars.peek() {
                Some(&c @ ('<' | '>')) => c,
                _ => return Ok(left),
            };
            chars.next();
            let inclusive = chars.peek() == Some(&'=');
            if inclusive {
                chars.next();
            }
            let right = self.parse_additive(chars)?;
            left = i64::from(match (op, inclusive) {
                ('<', false) => left < right,
                ('<', true) => left <= right,
                (_, false) => left > right,
                (_, true) => left >= right,
            });
        }
    }

    fn parse_additive(&self, chars: &mut Tokens) -> AshResult<i64> {
        let mut left = self.parse_multiplicative(chars)?;
        loop {
            skip_whitespace(chars);
            match chars.peek() {
                Some('+') => {
                    chars.next();
                    let right = self.parse_multiplicative(chars)?;
                    left = left.wrapping_add(right);
                }
                Some('-') => {
                    chars.next();
                    let right = self.parse_multiplicative(chars)?;
                    left = left.wrapping_sub(right);
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_multiplicative(&self, chars: &mut Tokens) -> AshResult<i64> {
        let mut left = self.parse_unary(chars)?;
        loop {
            skip_whitespace(chars);
            match chars.peek() {
                Some('*') => {
                    chars.next();
                    let right = self.parse_unary(chars)?;
                    left = left.wrapping_mul(right);
                }
                Some('/') => {
                    chars.next();
                    let right = self.parse_unary(chars)?;
                    left = if right == 0 { 0 } else { left.wrapping_div(right) };
                }
                Some('%') => {
                    chars.next();
                    let right = self.parse_unary(chars)?;
                    left = if right == 0 { 0 } else { left.wrapping_rem(right) };
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_unary(&self, chars: &mut Tokens) -> AshResult<i64> {
        skip_whitespace(chars);
        match chars.peek() {
            Some('-') => {
                chars.next();
                Ok(self.parse_unary(chars)?.wrapping_neg())
            }
            Some('+') => {
                chars.next();
                self.parse_unary(chars)
            }
            Some('!') => {
                chars.next();
                Ok(i64::from(self.parse_unary(chars)? == 0))
            }
            _ => self.parse_primary(chars),
        }
    }

    fn parse_primary(&self, chars: &mut Tokens) -> AshResult<i64> {
        skip_whitespace(chars);
        match chars.peek().copied() {
            Some('(') => {
                chars.next();
                let value = self.parse_ternary(chars)?;
                skip_whitespace(chars);
                if chars.next() != Some(')') {
                    return Err(AshError::Runtime("arithmetic: missing ')'".to_string()));
                }
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() => parse_number(chars),
            Some(c) if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                Ok(self
                    .get_var(&name)
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0))
            }
            Some(c) => Err(AshError::Runtime(format!("arithmetic: unexpected '{c}'"))),
            None => Err(AshError::Runtime("arithmetic: missing operand".to_string())),
        }
    }
}

fn skip_whitespace(chars: &mut Tokens) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

/// Consume the two-character operator `ab` if it comes next.
fn eat_pair(chars: &mut Tokens, a: char, b: char) -> bool {
    skip_whitespace(chars);
    let mut lookahead = chars.clone();
    if lookahead.next() == Some(a) && lookahead.next() == Some(b) {
        chars.next();
        chars.next();
        true
    } else {
        false
    }
}

fn parse_number(chars: &mut Tokens) -> AshResult<i64> {
    let mut digits = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() {
            digits.push(c);
            chars.next();
        } else {
            break;
        }
    }
    let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse(),
    };
    parsed.map_err(|_| AshError::Runtime(format!("arithmetic: invalid number '{digits}'")))
}
