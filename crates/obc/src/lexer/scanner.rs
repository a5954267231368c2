//! Lexer implementation using logos

use super::token::{LexError, Number, Token, TokenKind};
use crate::common::{CompileError, CompileResult, Span};
use logos::Logos;

/// Lexer for Oberon-07 source code
pub struct Lexer<'a> {
    inner: logos::Lexer<'a, TokenKind>,
    at_eof: bool,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source code
    pub fn new(source: &'a str) -> Self {
        Self {
            inner: TokenKind::lexer(source),
            at_eof: false,
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> CompileResult<Token> {
        if self.at_eof {
            let len = self.inner.source().len();
            return Ok(Token::new(TokenKind::Eof, Span::new(len, len)));
        }

        match self.inner.next() {
            Some(Ok(kind)) => {
                let span = self.inner.span();
                // widen the raw numeric payload into the literal variants
                let kind = match kind {
                    TokenKind::Number(Number::Int(v)) => TokenKind::Integer(v),
                    TokenKind::Number(Number::Real(v)) => TokenKind::Real(v),
                    TokenKind::Number(Number::LongReal(v)) => TokenKind::LongReal(v),
                    TokenKind::Number(Number::Char(v)) => TokenKind::CharCode(v),
                    TokenKind::Number(Number::Malformed) => TokenKind::Malformed,
                    other => other,
                };
                Ok(Token::new(kind, Span::new(span.start, span.end)))
            }
            Some(Err(e)) => {
                let span = self.inner.span();
                let message = match e {
                    LexError::UnclosedComment => "comment was not closed".to_string(),
                    LexError::UnterminatedString => "unexpected end of string".to_string(),
                    LexError::UnexpectedCharacter => {
                        format!("unexpected character '{}'", self.inner.slice())
                    }
                };
                Err(CompileError::lexer(message, Span::new(span.start, span.end)))
            }
            None => {
                self.at_eof = true;
                let len = self.inner.source().len();
                Ok(Token::new(TokenKind::Eof, Span::new(len, len)))
            }
        }
    }

    /// Tokenize the entire source and return all tokens, ending with Eof
    pub fn tokenize_all(mut self) -> CompileResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = matches!(token.kind, TokenKind::Eof);
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    /// Get the source being lexed
    pub fn source(&self) -> &'a str {
        self.inner.source()
    }
}
