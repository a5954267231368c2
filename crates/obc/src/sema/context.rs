//! Analysis context: one per compilation unit
//!
//! The context owns the type arena and the scope chain and is passed
//! explicitly through every grammar production. There is no process-wide
//! state, so independent compilations never interfere.

use super::scope::{Scope, Symbol, SymbolKind};
use super::value::Value;
use crate::types::{TypeDef, TypeId, TypeTable};

/// Pseudo-modules an IMPORT clause may name. Members of these modules are
/// accepted permissively; correctness is deferred to the target runtime.
const BUILTIN_MODULES: &[&str] = &["JS"];

/// Procedure currently being declared: its name (a formal parameter may
/// not shadow it) and declared result type (RETURN validation).
#[derive(Debug, Clone)]
pub struct ProcFrame {
    pub name: String,
    pub result: Option<TypeId>,
}

struct PendingPointer {
    ptr: TypeId,
    name: String,
}

/// Per-unit analysis state
pub struct Context {
    pub types: TypeTable,
    scope: Scope,
    pending_pointers: Vec<PendingPointer>,
    proc_stack: Vec<ProcFrame>,
}

impl Context {
    /// Fresh root context with the basic types and predefined procedures
    pub fn new() -> Self {
        let mut cx = Self {
            types: TypeTable::new(),
            scope: Scope::new(),
            pending_pointers: Vec::new(),
            proc_stack: Vec::new(),
        };
        for (name, ty) in [
            ("INTEGER", TypeTable::INTEGER),
            ("BOOLEAN", TypeTable::BOOLEAN),
            ("CHAR", TypeTable::CHAR),
            ("REAL", TypeTable::REAL),
            ("LONGREAL", TypeTable::LONGREAL),
            ("SET", TypeTable::SET),
        ] {
            cx.scope
                .define(Symbol {
                    name: name.to_string(),
                    kind: SymbolKind::Type,
                    ty,
                })
                .expect("fresh scope");
        }
        for name in ["NEW", "INCL", "EXCL"] {
            let ty = cx.types.intern(TypeDef::Predefined { name });
            cx.scope
                .define(Symbol {
                    name: name.to_string(),
                    kind: SymbolKind::Procedure,
                    ty,
                })
                .expect("fresh scope");
        }
        cx
    }

    // =========================================================================
    // Scopes and symbols
    // =========================================================================

    pub fn enter_scope(&mut self) {
        self.scope.push_child();
    }

    pub fn leave_scope(&mut self) {
        self.scope.pop_to_parent();
    }

    pub fn declare(&mut self, name: &str, kind: SymbolKind, ty: TypeId) -> Result<(), String> {
        self.scope.define(Symbol {
            name: name.to_string(),
            kind,
            ty,
        })
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scope.lookup(name)
    }

    pub fn declare_constant(&mut self, name: &str, value: Value, ty: TypeId) -> Result<(), String> {
        self.declare(name, SymbolKind::Constant(value), ty)
    }

    // =========================================================================
    // Procedure nesting
    // =========================================================================

    /// Begin declaring a procedure: records the frame used for the
    /// formal-parameter name check and RETURN validation, and opens the
    /// procedure's scope.
    pub fn enter_procedure(&mut self, name: &str, result: Option<TypeId>) {
        self.proc_stack.push(ProcFrame {
            name: name.to_string(),
            result,
        });
        self.enter_scope();
    }

    pub fn leave_procedure(&mut self) {
        self.leave_scope();
        self.proc_stack.pop();
    }

    pub fn current_procedure(&self) -> Option<&ProcFrame> {
        self.proc_stack.last()
    }

    // =========================================================================
    // Imports
    // =========================================================================

    /// Resolve an IMPORT against the builtin pseudo-module table
    pub fn import(&mut self, name: &str) -> Result<(), String> {
        if !BUILTIN_MODULES.contains(&name) {
            return Err(format!("module '{}' is not found", name));
        }
        let ty = self.types.intern(TypeDef::Module {
            name: name.to_string(),
        });
        self.declare(name, SymbolKind::Module, ty)
    }

    // =========================================================================
    // Forward pointer resolution
    // =========================================================================

    /// Record a `POINTER TO Name` whose base is not declared yet
    pub fn add_pending_pointer(&mut self, ptr: TypeId, name: &str) {
        self.pending_pointers.push(PendingPointer {
            ptr,
            name: name.to_string(),
        });
    }

    /// A pending pointer descriptor moved to another arena slot (its TYPE
    /// declaration completed); keep the pending entry aimed at the slot
    /// that will survive.
    pub fn repoint_pending_pointer(&mut self, from: TypeId, to: TypeId) {
        for pending in &mut self.pending_pointers {
            if pending.ptr == from {
                pending.ptr = to;
            }
        }
    }

    /// End of a TYPE section: every pending pointer must now resolve to a
    /// record type.
    pub fn resolve_pending_pointers(&mut self) -> Result<(), String> {
        let pending = std::mem::take(&mut self.pending_pointers);
        for p in pending {
            let Some(symbol) = self.scope.lookup(&p.name) else {
                return Err(format!("no declaration found for '{}'", p.name));
            };
            let target = symbol.ty;
            if !matches!(symbol.kind, SymbolKind::Type) {
                return Err("type name expected".to_string());
            }
            if !self.types.is_record(target) {
                return Err(format!(
                    "RECORD is expected as a POINTER base type, got '{}'",
                    self.types.describe(target)
                ));
            }
            self.types.bind_pointer(p.ptr, target);
        }
        Ok(())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
