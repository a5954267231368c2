//! Oberon-07 lexer
//!
//! Tokenization is split from the grammar: the parser consumes the token
//! stream through a cursor (peek, advance, save/restore) and never touches
//! the character level.

mod scanner;
mod token;

pub use scanner::Lexer;
pub use token::{Token, TokenKind};
