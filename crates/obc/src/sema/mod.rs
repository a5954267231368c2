//! Scopes, symbols, constant values and the analysis context

mod context;
mod scope;
mod value;

pub use context::{Context, ProcFrame};
pub use scope::{Scope, Symbol, SymbolKind};
pub use value::{fold_binary, fold_unary, Value};
