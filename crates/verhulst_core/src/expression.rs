//! Arithmetic fertility expressions over the axis value `y` and the
//! iteration index `i`, compiled once to stack bytecode.

use crate::traits::Scalar;
use std::fmt;
use thiserror::Error;

/// Names of the variables an expression may reference, in slot order.
pub const VARIABLES: [&str; 2] = ["y", "i"];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("unexpected character `{0}`")]
    UnexpectedChar(char),
    #[error("malformed number `{0}`")]
    BadNumber(String),
    #[error("unknown variable `{0}` (expected `y` or `i`)")]
    UnknownVariable(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("expected `)`")]
    UnclosedParen,
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token after end of expression")]
    TrailingInput,
}

/// OpCodes for the stack-based virtual machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant onto the stack.
    LoadConst(f64),
    /// Pushes a variable by slot (0 = y, 1 = i).
    LoadVar(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    Sin,
    Cos,
    Exp,
    Neg,
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stateless evaluator for [`Bytecode`].
pub struct VM;

impl VM {
    /// Executes the bytecode against `vars`, using `stack` as scratch space.
    /// Returns the value left on top of the stack.
    pub fn execute<T: Scalar>(bytecode: &Bytecode, vars: &[T], stack: &mut Vec<T>) -> T {
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(val) => stack.push(T::from_f64(val).unwrap_or_else(T::nan)),
                OpCode::LoadVar(idx) => stack.push(vars[idx]),
                OpCode::Sin | OpCode::Cos | OpCode::Exp | OpCode::Neg => {
                    let a = stack.pop().unwrap_or_else(T::nan);
                    stack.push(match *op {
                        OpCode::Sin => a.sin(),
                        OpCode::Cos => a.cos(),
                        OpCode::Exp => a.exp(),
                        _ => -a,
                    });
                }
                binary => {
                    let b = stack.pop().unwrap_or_else(T::nan);
                    let a = stack.pop().unwrap_or_else(T::nan);
                    stack.push(match binary {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        _ => a.powf(b),
                    });
                }
            }
        }

        stack.pop().unwrap_or_else(T::zero)
    }
}

// --- AST & Parser ---

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Variable(usize),
    Binary(Box<Expr>, OpCode, Box<Expr>),
    Neg(Box<Expr>),
    Call(OpCode, Box<Expr>),
}

fn compile(expr: &Expr, ops: &mut Vec<OpCode>) {
    match expr {
        Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
        Expr::Variable(idx) => ops.push(OpCode::LoadVar(*idx)),
        Expr::Binary(left, op, right) => {
            compile(left, ops);
            compile(right, ops);
            ops.push(*op);
        }
        Expr::Neg(operand) => {
            compile(operand, ops);
            ops.push(OpCode::Neg);
        }
        Expr::Call(func, arg) => {
            compile(arg, ops);
            ops.push(*func);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = num_str
                .parse()
                .map_err(|_| ExpressionError::BadNumber(num_str.clone()))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            tokens.push(match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                other => return Err(ExpressionError::UnexpectedChar(other)),
            });
            chars.next();
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

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_term(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_factor()?;

        loop {
            let op = match self.peek() {
                Some(Token::Plus) => OpCode::Add,
                Some(Token::Minus) => OpCode::Sub,
                _ => break,
            };
            self.consume();
            let right = self.parse_factor()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_power()?;

        loop {
            let op = match self.peek() {
                Some(Token::Star) => OpCode::Mul,
                Some(Token::Slash) => OpCode::Div,
                _ => break,
            };
            self.consume();
            let right = self.parse_power()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;

        while let Some(Token::Caret) = self.peek() {
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), OpCode::Pow, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let expr = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(expr)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume(); // eat '('
                    let func = match name.as_str() {
                        "sin" => OpCode::Sin,
                        "cos" => OpCode::Cos,
                        "exp" => OpCode::Exp,
                        _ => return Err(ExpressionError::UnknownFunction(name)),
                    };
                    let arg = self.parse_term()?;
                    match self.consume() {
                        Some(Token::RParen) => Ok(Expr::Call(func, Box::new(arg))),
                        _ => Err(ExpressionError::UnclosedParen),
                    }
                } else {
                    VARIABLES
                        .iter()
                        .position(|v| *v == name)
                        .map(Expr::Variable)
                        .ok_or(ExpressionError::UnknownVariable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_term()?;
                match self.consume() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(ExpressionError::UnclosedParen),
                }
            }
            Some(_) => Err(ExpressionError::UnexpectedToken),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }
}

/// A compiled fertility expression, e.g. `y`, `3.7`, or `y * (1 + 0.1 * sin(i))`.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    bytecode: Bytecode,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_term()?;
        if parser.pos != parser.tokens.len() {
            return Err(ExpressionError::TrailingInput);
        }

        let mut ops = Vec::new();
        compile(&expr, &mut ops);
        Ok(Self {
            source: source.trim().to_string(),
            bytecode: Bytecode { ops },
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    /// Evaluates the expression for axis value `y` at iteration `i`.
    pub fn eval(&self, y: f64, i: usize) -> f64 {
        let mut stack = Vec::with_capacity(self.bytecode.ops.len());
        VM::execute(&self.bytecode, &[y, i as f64], &mut stack)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
