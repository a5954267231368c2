//! Type descriptors

/// Handle into the [`TypeTable`](super::TypeTable) arena.
///
/// Identity of the handle is identity of the type: two record or pointer
/// types are the same type only if they are the same arena entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub(super) u32);

/// Formal parameter of a procedure type
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: TypeId,
    pub is_var: bool,
}

/// Base of a pointer type.
///
/// `POINTER TO Name` may reference a record declared later in the same TYPE
/// section; the base stays `Forward` until the section resolves it.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerBase {
    Resolved(TypeId),
    Forward(String),
}

/// Tagged type descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDef {
    Integer,
    Boolean,
    Char,
    Real,
    LongReal,
    Set,
    /// Type of the NIL literal, assignable to any pointer or procedure type
    Nil,
    /// Member of an imported pseudo-module: permissively designatable,
    /// callable with any arguments
    Any,
    /// String literal; a single-character string is CHAR-compatible
    Str { len: usize },
    /// `len` is None for open arrays (formal parameters only)
    Array { elem: TypeId, len: Option<i64> },
    Record {
        name: Option<String>,
        base: Option<TypeId>,
        /// Own fields only; inherited fields are found through `base`
        fields: Vec<(String, TypeId)>,
    },
    Pointer {
        name: Option<String>,
        base: PointerBase,
    },
    Procedure {
        name: Option<String>,
        params: Vec<Param>,
        result: Option<TypeId>,
    },
    /// NEW, INCL, EXCL: never assignable, dedicated call rules
    Predefined { name: &'static str },
    /// Imported pseudo-module
    Module { name: String },
    /// Slot reserved while its TYPE declaration parses, so the declared
    /// name may appear in its own procedure signatures; replaced with the
    /// real descriptor when the declaration completes
    Incomplete { name: String },
}
