//! Compilation driver: wires lexer, context and grammar

use crate::common::{CompileError, CompileResult};
use crate::parser::Parser;
use crate::sema::Context;

/// Validated compilation unit
#[derive(Debug)]
pub struct ModuleInfo {
    pub name: String,
}

/// Parse and validate one compilation unit.
///
/// A fresh [`Context`] is built per call: independent compilations share no
/// state. The whole input must be consumed; a trailing remainder or an
/// unmatched module production reports `not parsed`.
pub fn check_module(source: &str) -> CompileResult<ModuleInfo> {
    let mut context = Context::new();
    let mut parser = Parser::new(source, &mut context)?;
    match parser.module()? {
        Some(name) if parser.at_end() => Ok(ModuleInfo { name }),
        _ => Err(CompileError::parser("not parsed", parser.current_span())),
    }
}
