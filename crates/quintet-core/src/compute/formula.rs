//! Arithmetic expressions for `system::formular`.
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := '-' unary | primary
//! primary := number | identifier | '(' expr ')'
//! ```
//!
//! Identifiers name the computation's named inputs.

use super::builtins::{Arg, Failure, Number};
use crate::ErrorKind;
use crate::primitives::MAX_FORMULA_DEPTH;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Number),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(Number),
    Variable(String),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// A parsed formula, ready to evaluate against input bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    root: Expr,
}

fn syntax(message: impl Into<String>) -> Failure {
    Failure::new(ErrorKind::Format, message)
}

fn tokenize(source: &str) -> Result<Vec<Token>, Failure> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();
    while let Some(&(start, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' | '*' | '/' | '%' | '(' | ')' => {
                chars.next();
                tokens.push(match ch {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '(' => Token::Open,
                    _ => Token::Close,
                });
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = start;
                while let Some(&(index, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        end = index + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &source[start..end];
                let number = if literal.contains('.') {
                    literal.parse::<f64>().ok().map(Number::Float)
                } else {
                    literal.parse::<i64>().ok().map(Number::Int)
                };
                tokens.push(Token::Number(
                    number.ok_or_else(|| syntax(format!("invalid number `{literal}`")))?,
                ));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(index, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        end = index + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(source[start..end].to_string()));
            }
            other => return Err(syntax(format!("unexpected character `{other}`"))),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    /// Every nesting level and chained operator deepens the tree by one.
    fn enter(&mut self) -> Result<(), Failure> {
        self.depth += 1;
        if self.depth > MAX_FORMULA_DEPTH {
            return Err(syntax(format!("formula nested deeper than {MAX_FORMULA_DEPTH}")));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, Failure> {
        let base = self.depth;
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => {
                    self.depth = base;
                    return Ok(left);
                }
            };
            self.bump();
            self.enter()?;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr, Failure> {
        let base = self.depth;
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => {
                    self.depth = base;
                    return Ok(left);
                }
            };
            self.bump();
            self.enter()?;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, Failure> {
        if self.peek() == Some(&Token::Minus) {
            self.bump();
            self.enter()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, Failure> {
        match self.bump() {
            Some(Token::Number(number)) => Ok(Expr::Number(number)),
            Some(Token::Ident(name)) => Ok(Expr::Variable(name)),
            Some(Token::Open) => {
                self.enter()?;
                let inner = self.expr()?;
                self.depth -= 1;
                match self.bump() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(syntax("expected `)`")),
                }
            }
            Some(token) => Err(syntax(format!("unexpected token {token:?}"))),
            None => Err(syntax("unexpected end of formula")),
        }
    }
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, Failure> {
        let mut parser = Parser {
            tokens: tokenize(source)?,
            pos: 0,
            depth: 0,
        };
        let root = parser.expr()?;
        if let Some(token) = parser.peek() {
            return Err(syntax(format!("trailing token {token:?}")));
        }
        Ok(Self { root })
    }

    /// Evaluate with identifiers resolved through `lookup`.
    pub fn evaluate<'a>(&self, lookup: &dyn Fn(&str) -> Option<&'a Arg>) -> Result<Number, Failure> {
        eval(&self.root, lookup)
    }
}

fn eval<'a>(expr: &Expr, lookup: &dyn Fn(&str) -> Option<&'a Arg>) -> Result<Number, Failure> {
    match expr {
        Expr::Number(number) => Ok(*number),
        Expr::Variable(name) => {
            let arg = lookup(name).ok_or_else(|| {
                Failure::new(ErrorKind::MissingInput, format!("unbound identifier `{name}`"))
            })?;
            Number::of_arg(arg)
        }
        Expr::Neg(inner) => eval(inner, lookup)?.checked_neg(),
        Expr::Binary(op, left, right) => {
            let (left, right) = (eval(left, lookup)?, eval(right, lookup)?);
            match op {
                BinaryOp::Add => left.checked_add(right),
                BinaryOp::Sub => left.checked_sub(right),
                BinaryOp::Mul => left.checked_mul(right),
                BinaryOp::Div => left.checked_div(right),
                BinaryOp::Rem => left.checked_rem(right),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Subject;

    fn run(source: &str, inputs: &[(&str, Subject)]) -> Result<Number, Failure> {
        let args: Vec<Arg> = inputs
            .iter()
            .map(|(name, value)| Arg {
                name: Subject::symbol(name),
                value: value.clone(),
            })
            .collect();
        Formula::parse(source)?.evaluate(&|name| args.iter().find(|arg| arg.name.is_symbol(name)))
    }

    #[test]
    fn precedence_and_parentheses() {
        assert_eq!(run("1 + 2 * 3", &[]), Ok(Number::Int(7)));
        assert_eq!(run("(1 + 2) * 3", &[]), Ok(Number::Int(9)));
        assert_eq!(run("10 % 4 - -2", &[]), Ok(Number::Int(4)));
    }

    #[test]
    fn identifiers_read_named_inputs() {
        let inputs = [("width", Subject::int(4)), ("height", Subject::float(2.5))];
        assert_eq!(run("width * height", &inputs), Ok(Number::Float(10.0)));
    }

    #[test]
    fn syntax_errors_are_format_failures() {
        for source in ["1 +", "(1", "1 2", "2 $ 3"] {
            assert_eq!(
                run(source, &[]).map_err(|failure| failure.kind),
                Err(ErrorKind::Format),
                "{source}"
            );
        }
    }

    #[test]
    fn deep_nesting_is_a_format_failure() {
        let sources = [
            format!("{}1", "-".repeat(60_000)),
            format!("{}1{}", "(".repeat(30_000), ")".repeat(30_000)),
            format!("{}1", "1+".repeat(50_000)),
            format!("{}2", "2*".repeat(50_000)),
        ];
        for source in &sources {
            assert_eq!(
                run(source, &[]).map_err(|failure| failure.kind),
                Err(ErrorKind::Format),
                "{}",
                &source[..8]
            );
        }
    }

    #[test]
    fn moderate_nesting_still_evaluates() {
        let nested = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(run(&nested, &[]), Ok(Number::Int(1)));
        let chain = format!("{}1", "1 + ".repeat(MAX_FORMULA_DEPTH));
        assert_eq!(run(&chain, &[]), Ok(Number::Int(257)));
        assert_eq!(run("- - -(1 + 2) * (3 - 1)", &[]), Ok(Number::Int(-6)));
    }

    #[test]
    fn unknown_identifier_is_missing_input() {
        assert_eq!(
            run("x + 1", &[]).map_err(|failure| failure.kind),
            Err(ErrorKind::MissingInput)
        );
    }

    #[test]
    fn text_input_is_a_type_mismatch() {
        let inputs = [("x", Subject::text("a"))];
        assert_eq!(
            run("x + 1", &inputs).map_err(|failure| failure.kind),
            Err(ErrorKind::TypeMismatch)
        );
    }
}
