//! Recursive-descent parser for rule expressions.
//!
//! Produces a [`Program`]: a list of statements. A rule test without an
//! explicit `return` is wrapped as `return <test>` before it reaches here.

use serde_json::Value;

use super::lexer::{tokenize, Spanned, Token};
use super::ExprError;

/// Maximum expression nesting accepted by the parser.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Ident(String),
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Return(Option<Expr>),
    If {
        test: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    Let {
        name: String,
        init: Option<Expr>,
    },
}

/// A compiled expression body.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

impl Program {
    /// Parse a function body.
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let mut body = Vec::new();
        while !parser.check(&Token::Eof) {
            body.push(parser.statement()?);
        }
        Ok(Program { body })
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].offset
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, context: &str) -> Result<(), ExprError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(context))
        }
    }

    fn unexpected(&self, context: &str) -> ExprError {
        ExprError::syntax(
            self.offset(),
            format!("unexpected {} {}", self.peek().describe(), context),
        )
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::syntax(self.offset(), "expression nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Run `parse` and restore the nesting depth afterwards. Each operator
    /// folded into a left-deep chain inside `parse` calls `enter` once.
    fn chain(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<Expr, ExprError>,
    ) -> Result<Expr, ExprError> {
        let depth = self.depth;
        let expr = parse(self);
        self.depth = depth;
        expr
    }

    fn statement(&mut self) -> Result<Stmt, ExprError> {
        self.enter()?;
        let stmt = self.statement_inner();
        self.leave();
        stmt
    }

    fn statement_inner(&mut self) -> Result<Stmt, ExprError> {
        match self.peek() {
            Token::Semi => {
                self.advance();
                Ok(Stmt::Block(Vec::new()))
            }
            Token::Return => {
                self.advance();
                let value = if matches!(self.peek(), Token::Semi | Token::RBrace | Token::Eof) {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.eat(&Token::Semi);
                Ok(Stmt::Return(value))
            }
            Token::If => {
                self.advance();
                self.expect(&Token::LParen, "after 'if'")?;
                let test = self.expression()?;
                self.expect(&Token::RParen, "after if condition")?;
                let then = Box::new(self.statement()?);
                let otherwise = if self.eat(&Token::Else) {
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    test,
                    then,
                    otherwise,
                })
            }
            Token::LBrace => {
                self.advance();
                let mut body = Vec::new();
                while !self.eat(&Token::RBrace) {
                    if self.check(&Token::Eof) {
                        return Err(self.unexpected("inside block"));
                    }
                    body.push(self.statement()?);
                }
                Ok(Stmt::Block(body))
            }
            Token::Let => {
                self.advance();
                let name = match self.advance() {
                    Token::Ident(name) => name,
                    _ => {
                        return Err(ExprError::syntax(
                            self.offset(),
                            "expected a variable name",
                        ))
                    }
                };
                let init = if self.eat(&Token::Assign) {
                    Some(self.expression()?)
                } else {
                    None
                };
                self.eat(&Token::Semi);
                Ok(Stmt::Let { name, init })
            }
            _ => {
                let expr = self.expression()?;
                if !self.eat(&Token::Semi)
                    && !matches!(self.peek(), Token::RBrace | Token::Eof)
                {
                    return Err(self.unexpected("after expression"));
                }
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn expression(&mut self) -> Result<Expr, ExprError> {
        self.enter()?;
        let expr = self.assignment();
        self.leave();
        expr
    }

    fn assignment(&mut self) -> Result<Expr, ExprError> {
        let offset = self.offset();
        let target = self.conditional()?;
        if self.eat(&Token::Assign) {
            if !matches!(
                target,
                Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }
            ) {
                return Err(ExprError::syntax(offset, "invalid assignment target"));
            }
            let value = self.expression()?;
            return Ok(Expr::Assign {
                target: Box::new(target),
                value: Box::new(value),
            });
        }
        Ok(target)
    }

    fn conditional(&mut self) -> Result<Expr, ExprError> {
        let test = self.logical_or()?;
        if self.eat(&Token::Question) {
            let consequent = self.expression()?;
            self.expect(&Token::Colon, "in conditional expression")?;
            let alternate = self.expression()?;
            return Ok(Expr::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            });
        }
        Ok(test)
    }

    fn logical_or(&mut self) -> Result<Expr, ExprError> {
        self.chain(|p| {
            let mut left = p.logical_and()?;
            while p.eat(&Token::Or) {
                p.enter()?;
                let right = p.logical_and()?;
                left = Expr::Logical {
                    op: LogicalOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                };
            }
            Ok(left)
        })
    }

    fn logical_and(&mut self) -> Result<Expr, ExprError> {
        self.chain(|p| {
            let mut left = p.equality()?;
            while p.eat(&Token::And) {
                p.enter()?;
                let right = p.equality()?;
                left = Expr::Logical {
                    op: LogicalOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                };
            }
            Ok(left)
        })
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        self.chain(|p| {
            let mut left = p.relational()?;
            loop {
                let op = match p.peek() {
                    Token::Eq => BinaryOp::Eq,
                    Token::NotEq => BinaryOp::NotEq,
                    Token::StrictEq => BinaryOp::StrictEq,
                    Token::StrictNotEq => BinaryOp::StrictNotEq,
                    _ => return Ok(left),
                };
                p.advance();
                p.enter()?;
                let right = p.relational()?;
                left = binary(op, left, right);
            }
        })
    }

    fn relational(&mut self) -> Result<Expr, ExprError> {
        self.chain(|p| {
            let mut left = p.additive()?;
            loop {
                let op = match p.peek() {
                    Token::Lt => BinaryOp::Lt,
                    Token::Le => BinaryOp::Le,
                    Token::Gt => BinaryOp::Gt,
                    Token::Ge => BinaryOp::Ge,
                    _ => return Ok(left),
                };
                p.advance();
                p.enter()?;
                let right = p.additive()?;
                left = binary(op, left, right);
            }
        })
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        self.chain(|p| {
            let mut left = p.multiplicative()?;
            loop {
                let op = match p.peek() {
                    Token::Plus => BinaryOp::Add,
                    Token::Minus => BinaryOp::Sub,
                    _ => return Ok(left),
                };
                p.advance();
                p.enter()?;
                let right = p.multiplicative()?;
                left = binary(op, left, right);
            }
        })
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        self.chain(|p| {
            let mut left = p.unary()?;
            loop {
                let op = match p.peek() {
                    Token::Star => BinaryOp::Mul,
                    Token::Slash => BinaryOp::Div,
                    Token::Percent => BinaryOp::Rem,
                    _ => return Ok(left),
                };
                p.advance();
                p.enter()?;
                let right = p.unary()?;
                left = binary(op, left, right);
            }
        })
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek() {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Plus,
            _ => return self.postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.unary();
        self.leave();
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        self.chain(|p| {
            let mut expr = p.primary()?;
            loop {
                match p.peek() {
                    Token::Dot => {
                        p.advance();
                        p.enter()?;
                        let property = match p.advance() {
                            Token::Ident(name) => name,
                            // Keywords are valid property names (`x.null` is legal JS).
                            Token::Return => "return".to_string(),
                            Token::If => "if".to_string(),
                            Token::Else => "else".to_string(),
                            Token::True => "true".to_string(),
                            Token::False => "false".to_string(),
                            Token::Null => "null".to_string(),
                            Token::Undefined => "undefined".to_string(),
                            _ => {
                                return Err(ExprError::syntax(
                                    p.offset(),
                                    "expected a property name after '.'",
                                ))
                            }
                        };
                        expr = Expr::Member {
                            object: Box::new(expr),
                            property,
                        };
                    }
                    Token::LBracket => {
                        p.advance();
                        p.enter()?;
                        let index = p.expression()?;
                        p.expect(&Token::RBracket, "after index")?;
                        expr = Expr::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        };
                    }
                    Token::LParen => {
                        p.advance();
                        p.enter()?;
                        let args = p.arguments(&Token::RParen)?;
                        expr = Expr::Call {
                            callee: Box::new(expr),
                            args,
                        };
                    }
                    _ => return Ok(expr),
                }
            }
        })
    }

    fn arguments(&mut self, close: &Token) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if self.eat(close) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(close) {
                return Ok(args);
            }
            self.expect(&Token::Comma, "in argument list")?;
            // Trailing comma
            if self.eat(close) {
                return Ok(args);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let offset = self.offset();
        match self.advance() {
            Token::Number(n) => Ok(Expr::Literal(super::value::number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null | Token::Undefined => Ok(Expr::Literal(Value::Null)),
            Token::Ident(name) => Ok(Expr::Ident(name)),
            Token::LParen => {
                let expr = self.expression()?;
                self.expect(&Token::RParen, "after parenthesised expression")?;
                Ok(expr)
            }
            Token::LBracket => Ok(Expr::Array(self.arguments(&Token::RBracket)?)),
            other => Err(ExprError::syntax(
                offset,
                format!("unexpected {}", other.describe()),
            )),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
