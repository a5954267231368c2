//! Fused parser / semantic analyzer
//!
//! One method per grammar production. Every production recognizes syntax
//! and performs its semantic actions immediately against the [`Context`];
//! there is no AST. A production either reports no-match (`Ok(None)`,
//! cursor restored, caller may try a sibling alternative), matches
//! (`Ok(Some(..))`), or, past a commit point, fails hard with a specific
//! diagnostic (`Err`).
//!
//! [`Context`]: crate::sema::Context

mod parser;

pub use parser::{Access, ExprInfo, Heading, ParseResult, Parser};
