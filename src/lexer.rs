//! Lexer for MiniAPL source text using logos
//!
//! Supports tokens like:
//! - Identifiers and keywords: x, mkArray, assign
//! - Integer literals: 0, 42, -7, +3
//! - Punctuation: (, ), ,, ;, =
//!
//! Every punctuation character is its own token. Whitespace separates
//! tokens and is otherwise dropped. Any other run of characters is a
//! single lexeme, which is an integer literal when it matches
//! `[+-]?[1-9][0-9]*|0` and an identifier otherwise.

use logos::Logos;

use crate::error::{CompileError, CompileResult};

/// Token types for the MiniAPL language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r\f\x0B]+")]
pub enum Token {
    // Literals
    #[regex(r"[+-]?[1-9][0-9]*|0", |lex| lex.slice().parse::<i32>().ok(), priority = 3)]
    Integer(i32),

    // Identifiers and keywords
    #[regex(r"[^ \t\n\r\f\x0B,();=]+", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("=")]
    Equals,

    // Punctuation
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,
}

impl Token {
    /// True for the identifier spelling `keyword`
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident(name) if name == keyword)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Integer(n) => write!(f, "{}", n),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Equals => write!(f, "="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
        }
    }
}

/// Lexer wrapper that provides a peekable stream of tokens
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
    peeked: Option<Option<CompileResult<Token>>>,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
            peeked: None,
        }
    }

    /// Peek at the next token without consuming it
    pub fn peek(&mut self) -> Option<&CompileResult<Token>> {
        let inner = &mut self.inner;
        self.peeked
            .get_or_insert_with(|| Self::lex_one(inner))
            .as_ref()
    }

    /// Check if the next token matches expected
    pub fn check(&mut self, expected: &Token) -> bool {
        match self.peek() {
            Some(Ok(tok)) => tok == expected,
            _ => false,
        }
    }

    fn lex_one(inner: &mut logos::Lexer<'source, Token>) -> Option<CompileResult<Token>> {
        let token = inner.next()?;
        Some(token.map_err(|()| CompileError::LexerError {
            position: inner.span().start,
            message: format!("integer literal `{}` does not fit in 32 bits", inner.slice()),
        }))
    }
}

impl<'source> Iterator for Lexer<'source> {
    type Item = CompileResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.peeked.take() {
            Some(peeked) => peeked,
            None => Self::lex_one(&mut self.inner),
        }
    }
}

/// Lex a whole source text into a token vector
pub fn tokenize(source: &str) -> CompileResult<Vec<Token>> {
    Lexer::new(source).collect()
}
