//! Recursive-descent parser for MiniAPL programs
//!
//! Parses statements like:
//! - `assign x = mkArray(2, 3, 4);`
//! - `assign y = reduce(x);`
//! - `print(add(y, y));`
//!
//! Statements are separated by `;`; the last one may omit it. A
//! malformed statement aborts the whole parse.

use crate::ast::{Expr, ExprKind, NodeId, Program, Statement};
use crate::error::{CompileError, CompileResult};
use crate::lexer::{Lexer, Token};

/// Keyword that introduces an assignment statement
const ASSIGN: &str = "assign";

/// Parser for MiniAPL programs
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    current: Option<Token>,
    /// 1-based index of the statement being parsed
    statement: usize,
    next_id: u32,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            lexer: Lexer::new(source),
            current: None,
            statement: 0,
            next_id: 0,
        }
    }

    fn next_token(&mut self) -> CompileResult<Option<Token>> {
        self.lexer.next().transpose()
    }

    /// Advance to the next token, returning the one just consumed
    fn advance(&mut self) -> CompileResult<Option<Token>> {
        let next = self.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    /// Check if current token matches expected
    fn check(&self, expected: &Token) -> bool {
        self.current.as_ref() == Some(expected)
    }

    /// Consume token if it matches, otherwise error
    fn expect(&mut self, expected: Token) -> CompileResult<()> {
        if self.check(&expected) {
            self.advance()?;
            Ok(())
        } else {
            Err(self.error(format!(
                "expected `{}`, got {}",
                expected,
                describe(self.current.as_ref())
            )))
        }
    }

    fn error(&self, msg: impl Into<String>) -> CompileError {
        CompileError::parse_error(self.statement, msg)
    }

    fn node(&mut self, kind: ExprKind) -> Expr {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        Expr::new(id, kind)
    }

    /// Parse a complete program (multiple statements)
    pub fn parse_program(&mut self) -> CompileResult<Program> {
        let mut statements = Vec::new();
        self.current = self.next_token()?;

        while self.current.is_some() {
            // Empty statement
            if self.check(&Token::Semicolon) {
                self.advance()?;
                continue;
            }

            self.statement += 1;
            statements.push(self.parse_statement()?);

            match &self.current {
                None => break,
                Some(Token::Semicolon) => {
                    self.advance()?;
                }
                Some(tok) => {
                    return Err(self.error(format!(
                        "unexpected token `{}` after end of statement",
                        tok
                    )));
                }
            }
        }

        Ok(Program { statements })
    }

    /// Parse a single statement
    fn parse_statement(&mut self) -> CompileResult<Statement> {
        let is_assign = self
            .current
            .as_ref()
            .is_some_and(|tok| tok.is_keyword(ASSIGN));
        if !is_assign {
            return Ok(Statement::Expr(self.parse_expr()?));
        }

        self.advance()?; // consume `assign`
        let name = match self.advance()? {
            Some(Token::Ident(name)) => name,
            other => {
                return Err(self.error(format!(
                    "expected variable name after `{}`, got {}",
                    ASSIGN,
                    describe(other.as_ref())
                )));
            }
        };
        self.expect(Token::Equals)?;
        let value = self.parse_expr()?;

        Ok(Statement::Assign { name, value })
    }

    /// Parse an expression: a literal, a variable, or a call
    pub fn parse_expr(&mut self) -> CompileResult<Expr> {
        match self.advance()? {
            Some(Token::Integer(n)) => Ok(self.node(ExprKind::Number(n))),

            Some(Token::Ident(name)) => {
                if !self.check(&Token::LParen) {
                    return Ok(self.node(ExprKind::Variable(name)));
                }
                let args = self.parse_args()?;
                Ok(self.node(ExprKind::Call { callee: name, args }))
            }

            other => Err(self.error(format!(
                "expected an expression, got {}",
                describe(other.as_ref())
            ))),
        }
    }

    /// Parse call arguments: (arg1, arg2, ...)
    fn parse_args(&mut self) -> CompileResult<Vec<Expr>> {
        self.expect(Token::LParen)?;

        let mut args = Vec::new();
        while !self.check(&Token::RParen) {
            args.push(self.parse_expr()?);
            if !self.check(&Token::RParen) {
                self.expect(Token::Comma)?;
            }
        }

        self.expect(Token::RParen)?;
        Ok(args)
    }
}

fn describe(token: Option<&Token>) -> String {
    match token {
        Some(tok) => format!("`{}`", tok),
        None => "end of input".to_string(),
    }
}
