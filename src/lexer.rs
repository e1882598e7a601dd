//! Lexer for chip headers, chip bodies and simulation scripts using logos
//!
//! Supports tokens like:
//! - Identifiers: a, half_adder, X
//! - Numbers: 0, 1, 16
//! - Punctuation: =, ,, (, ), [, ], {, }, |
//!
//! `//` starts a comment that runs to the end of the line.

use logos::Logos;

use crate::error::{CompileError, CompileResult};

/// Token types shared by the HDL and the script language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u64>().ok())]
    Number(u64),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("=")]
    Equals,

    #[token(",")]
    Comma,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("|")]
    Pipe,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Equals => write!(f, "="),
            Token::Comma => write!(f, ","),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Pipe => write!(f, "|"),
        }
    }
}

/// Lexer over a single source line that reports failures with their position
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
    line: usize,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str, line: usize) -> Self {
        Self {
            inner: Token::lexer(source),
            line,
        }
    }

    /// Lex the whole line
    pub fn tokenize(source: &'source str, line: usize) -> CompileResult<Vec<Token>> {
        Lexer::new(source, line).collect()
    }
}

impl<'source> Iterator for Lexer<'source> {
    type Item = CompileResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.inner.next()?;
        Some(result.map_err(|()| CompileError::Lexer {
            line: self.line,
            column: self.inner.span().start + 1,
            message: format!("unexpected '{}'", self.inner.slice()),
        }))
    }
}
