//! Type arena and the pure compatibility rules over it

use super::ty::{PointerBase, TypeDef, TypeId};

/// Arena of type descriptors.
///
/// The primitive types are pre-seeded so their ids are constants; everything
/// else is interned on demand. Interning never deduplicates: distinct
/// declarations produce distinct ids, which is exactly the nominal identity
/// the language requires (two anonymous records are never the same type).
pub struct TypeTable {
    defs: Vec<TypeDef>,
}

impl TypeTable {
    pub const INTEGER: TypeId = TypeId(0);
    pub const BOOLEAN: TypeId = TypeId(1);
    pub const CHAR: TypeId = TypeId(2);
    pub const REAL: TypeId = TypeId(3);
    pub const LONGREAL: TypeId = TypeId(4);
    pub const SET: TypeId = TypeId(5);
    pub const NIL: TypeId = TypeId(6);
    pub const ANY: TypeId = TypeId(7);

    pub fn new() -> Self {
        Self {
            defs: vec![
                TypeDef::Integer,
                TypeDef::Boolean,
                TypeDef::Char,
                TypeDef::Real,
                TypeDef::LongReal,
                TypeDef::Set,
                TypeDef::Nil,
                TypeDef::Any,
            ],
        }
    }

    pub fn intern(&mut self, def: TypeDef) -> TypeId {
        let id = TypeId(self.defs.len() as u32);
        self.defs.push(def);
        id
    }

    /// Fill a reserved slot with its real descriptor
    pub fn replace(&mut self, id: TypeId, def: TypeDef) {
        self.defs[id.0 as usize] = def;
    }

    pub fn get(&self, id: TypeId) -> &TypeDef {
        &self.defs[id.0 as usize]
    }

    /// Attach a declared name to a still-anonymous record, pointer or
    /// procedure type. An alias of an already named type keeps the original
    /// name; both names denote the same arena entry.
    pub fn set_name(&mut self, id: TypeId, name: &str) {
        match &mut self.defs[id.0 as usize] {
            TypeDef::Record { name: n, .. }
            | TypeDef::Pointer { name: n, .. }
            | TypeDef::Procedure { name: n, .. } => {
                if n.is_none() {
                    *n = Some(name.to_string());
                }
            }
            _ => {}
        }
    }

    /// Bind a forward pointer base to its record
    pub fn bind_pointer(&mut self, ptr: TypeId, record: TypeId) {
        if let TypeDef::Pointer { base, .. } = &mut self.defs[ptr.0 as usize] {
            *base = PointerBase::Resolved(record);
        }
    }

    pub fn is_record(&self, id: TypeId) -> bool {
        matches!(self.get(id), TypeDef::Record { .. })
    }

    pub fn is_procedure(&self, id: TypeId) -> bool {
        matches!(self.get(id), TypeDef::Procedure { .. })
    }

    /// Resolved record base of a pointer type
    pub fn pointer_base(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            TypeDef::Pointer {
                base: PointerBase::Resolved(record),
                ..
            } => Some(*record),
            _ => None,
        }
    }

    pub fn record_base(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            TypeDef::Record { base, .. } => *base,
            _ => None,
        }
    }

    /// Look up a field by name, walking the base chain
    pub fn find_field(&self, record: TypeId, name: &str) -> Option<TypeId> {
        let mut current = Some(record);
        while let Some(id) = current {
            if let TypeDef::Record { fields, base, .. } = self.get(id) {
                if let Some((_, ty)) = fields.iter().find(|(n, _)| n == name) {
                    return Some(*ty);
                }
                current = *base;
            } else {
                return None;
            }
        }
        None
    }

    /// Does any record in the base chain (excluding `record` itself)
    /// already declare `name`?
    pub fn base_chain_has_field(&self, record: TypeId, name: &str) -> bool {
        match self.record_base(record) {
            Some(base) => self.find_field(base, name).is_some(),
            None => false,
        }
    }

    /// Proper extension test: walks the base chain starting at `derived`'s
    /// base, so a record is never an extension of itself.
    pub fn is_extension_of(&self, derived: TypeId, base: TypeId) -> bool {
        let mut current = self.record_base(derived);
        while let Some(id) = current {
            if id == base {
                return true;
            }
            current = self.record_base(id);
        }
        false
    }

    /// Type equality: identity for primitives, records and pointers;
    /// structural for strings, arrays and procedure signatures. Procedure
    /// comparison is coinductive so mutually recursive signatures
    /// (`P = PROCEDURE(): P`) compare by bisimulation.
    pub fn same_type(&self, a: TypeId, b: TypeId) -> bool {
        self.same_type_rec(a, b, &mut Vec::new())
    }

    fn same_type_rec(&self, a: TypeId, b: TypeId, assumed: &mut Vec<(TypeId, TypeId)>) -> bool {
        if a == b {
            return true;
        }
        match (self.get(a), self.get(b)) {
            (TypeDef::Str { len: l1 }, TypeDef::Str { len: l2 }) => l1 == l2,
            (
                TypeDef::Array { elem: e1, len: l1 },
                TypeDef::Array { elem: e2, len: l2 },
            ) => l1 == l2 && self.same_type_rec(*e1, *e2, assumed),
            (
                TypeDef::Procedure {
                    params: p1,
                    result: r1,
                    ..
                },
                TypeDef::Procedure {
                    params: p2,
                    result: r2,
                    ..
                },
            ) => {
                if assumed.contains(&(a, b)) {
                    return true;
                }
                assumed.push((a, b));
                let equal = p1.len() == p2.len()
                    && p1
                        .iter()
                        .zip(p2.iter())
                        .all(|(x, y)| x.is_var == y.is_var && self.same_type_rec(x.ty, y.ty, assumed))
                    && match (r1, r2) {
                        (None, None) => true,
                        (Some(x), Some(y)) => self.same_type_rec(*x, *y, assumed),
                        _ => false,
                    };
                assumed.pop();
                equal
            }
            _ => false,
        }
    }

    /// Assignment compatibility of a source expression type to a target.
    ///
    /// Pointer assignment is covariant on the base chain; everything else
    /// requires the same type, except NIL (any pointer or procedure) and a
    /// single-character string constant for CHAR. Predefined procedures are
    /// never assignable.
    pub fn assignable(&self, target: TypeId, source: TypeId) -> bool {
        if self.same_type(target, source) {
            return true;
        }
        match (self.get(target), self.get(source)) {
            (TypeDef::Pointer { .. } | TypeDef::Procedure { .. }, TypeDef::Nil) => true,
            (TypeDef::Char, TypeDef::Str { len: 1 }) => true,
            (TypeDef::Pointer { .. }, TypeDef::Pointer { .. }) => {
                match (self.pointer_base(target), self.pointer_base(source)) {
                    (Some(tb), Some(sb)) => sb == tb || self.is_extension_of(sb, tb),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Can an actual of type `actual` be bound to a formal of type
    /// `formal`? Open array formals accept any array with a matching
    /// element shape; all other formals use plain type equality.
    pub fn parameter_compatible(&self, formal: TypeId, actual: TypeId) -> bool {
        match (self.get(formal), self.get(actual)) {
            (
                TypeDef::Array {
                    elem: fe,
                    len: None,
                },
                TypeDef::Array { elem: ae, .. },
            ) => self.parameter_compatible(*fe, *ae),
            _ => self.same_type(formal, actual),
        }
    }

    pub fn is_char_array(&self, id: TypeId) -> bool {
        matches!(self.get(id), TypeDef::Array { elem, .. } if matches!(self.get(*elem), TypeDef::Char))
    }

    /// Canonical rendering used in diagnostics.
    ///
    /// Named types render as their name; anonymous records as
    /// `anonymous RECORD`; array lengths are never shown.
    pub fn describe(&self, id: TypeId) -> String {
        match self.get(id) {
            TypeDef::Integer => "INTEGER".to_string(),
            TypeDef::Boolean => "BOOLEAN".to_string(),
            TypeDef::Char => "CHAR".to_string(),
            TypeDef::Real => "REAL".to_string(),
            TypeDef::LongReal => "LONGREAL".to_string(),
            TypeDef::Set => "SET".to_string(),
            TypeDef::Nil => "NIL".to_string(),
            TypeDef::Any => "JS object".to_string(),
            TypeDef::Str { len } => if *len == 1 {
                "single-character string"
            } else {
                "multi-character string"
            }
            .to_string(),
            TypeDef::Array { elem, .. } => format!("ARRAY OF {}", self.describe(*elem)),
            TypeDef::Record { name, .. } => match name {
                Some(n) => n.clone(),
                None => "anonymous RECORD".to_string(),
            },
            TypeDef::Pointer { name, base } => match name {
                Some(n) => n.clone(),
                None => match base {
                    PointerBase::Resolved(record) => {
                        format!("POINTER TO {}", self.describe(*record))
                    }
                    PointerBase::Forward(forward) => format!("POINTER TO {}", forward),
                },
            },
            TypeDef::Procedure {
                name,
                params,
                result,
            } => {
                if let Some(n) = name {
                    return n.clone();
                }
                if params.is_empty() && result.is_none() {
                    return "PROCEDURE".to_string();
                }
                let args = params
                    .iter()
                    .map(|p| {
                        if p.is_var {
                            format!("VAR {}", self.describe(p.ty))
                        } else {
                            self.describe(p.ty)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                match result {
                    Some(r) => format!("PROCEDURE({}): {}", args, self.describe(*r)),
                    None => format!("PROCEDURE({})", args),
                }
            }
            TypeDef::Predefined { name } => format!("predefined procedure {}", name),
            TypeDef::Module { name } => format!("MODULE {}", name),
            TypeDef::Incomplete { name } => name.clone(),
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}
