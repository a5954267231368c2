//! Oberon-07 compiler front end
//!
//! A single-pass recursive descent parser whose productions double as
//! semantic actions: scoping, nominal/structural type checking, constant
//! folding and mutability rules all run while the source streams by, and
//! no AST is ever built.
//!
//! ## Architecture
//!
//! - **Common** (`common/`): spans, errors, diagnostic reporting
//! - **Lexer** (`lexer/`): logos-based tokenizer with Oberon literal rules
//! - **Types** (`types/`): type descriptor arena and compatibility rules
//! - **Sema** (`sema/`): scopes, symbols, constant values, the per-unit
//!   [`Context`](sema::Context)
//! - **Parser** (`parser/`): the fused grammar / analyzer
//! - **Driver** (`driver/`): wires the pieces for one compilation unit

pub mod common;
pub mod driver;
pub mod lexer;
pub mod parser;
pub mod sema;
pub mod types;

// Re-exports for convenience
pub use common::{CompileError, CompileResult, DiagnosticReporter, Span};
pub use driver::{check_module, ModuleInfo};
pub use parser::Parser;
pub use sema::Context;
