//! Recursive descent parser with inline semantic actions

use crate::common::{CompileError, CompileResult, Span};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::sema::{self, Context, SymbolKind, Value};
use crate::types::{Param, PointerBase, TypeDef, TypeId, TypeTable};

/// Three-way production result: `Ok(None)` is a backtrackable no-match,
/// `Ok(Some(v))` a match, `Err` a committed failure.
pub type ParseResult<T> = CompileResult<Option<T>>;

/// How a parsed expression may be used: drives assignment-target and
/// VAR-argument checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Computed value with no storage location
    Expression,
    /// Designator rooted at a named constant
    Constant,
    /// Addressable storage; read-only propagates from the root through
    /// every suffix until a dereference
    Variable { read_only: bool },
    /// A declared procedure used as a value
    ProcedureConst,
    /// A type name
    TypeRef,
    /// An imported pseudo-module
    ModuleRef,
}

/// Semantic result of an expression or designator: computed on the fly,
/// consumed immediately, never retained as a tree.
#[derive(Debug, Clone)]
pub struct ExprInfo {
    pub ty: TypeId,
    pub value: Option<Value>,
    pub access: Access,
    /// Index of the first token, for diagnostic text
    start: usize,
}

impl ExprInfo {
    fn rvalue(ty: TypeId, value: Option<Value>, start: usize) -> Self {
        Self {
            ty,
            value,
            access: Access::Expression,
            start,
        }
    }
}

/// Name, type and result of a procedure heading
pub struct Heading {
    pub name: String,
    pub result: Option<TypeId>,
}

struct FormalDecl {
    name: String,
    ty: TypeId,
    is_var: bool,
}

/// Recursive descent parser over a pre-lexed token stream.
///
/// The cursor supports save/restore for backtracking among sibling
/// alternatives; the context is mutated as declarations stream by.
pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    context: &'a mut Context,
    /// Name and reserved type slot of the TYPE declaration being parsed:
    /// a declared name is visible inside its own procedure signatures
    declaring: Option<(String, TypeId)>,
}

impl<'a> Parser<'a> {
    /// Lex the source and position the cursor at the first token
    pub fn new(source: &'a str, context: &'a mut Context) -> CompileResult<Self> {
        let tokens = Lexer::new(source).tokenize_all()?;
        Ok(Self {
            source,
            tokens,
            pos: 0,
            context,
            declaring: None,
        })
    }

    // =========================================================================
    // Cursor
    // =========================================================================

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> &TokenKind {
        &self.current().kind
    }

    pub fn at_end(&self) -> bool {
        matches!(self.kind(), TokenKind::Eof)
    }

    pub fn current_span(&self) -> Span {
        self.current().span
    }

    fn advance(&mut self) {
        if !self.at_end() {
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.kind()) == std::mem::discriminant(kind)
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> CompileResult<()> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(CompileError::parser(
                format!("expected {}, found {}", kind, self.kind()),
                self.current_span(),
            ))
        }
    }

    fn restore(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Source text between two token positions, for diagnostics
    fn text_between(&self, start: usize, end: usize) -> &str {
        if start >= self.tokens.len() || end <= start {
            return "";
        }
        let from = self.tokens[start].span.start;
        let to = self.tokens[(end - 1).min(self.tokens.len() - 1)].span.end;
        self.source[from..to].trim()
    }

    fn semantic<T>(&self, message: impl Into<String>) -> CompileResult<T> {
        Err(CompileError::semantic(message, self.current_span()))
    }

    fn describe(&self, ty: TypeId) -> String {
        self.context.types.describe(ty)
    }

    // =========================================================================
    // Identifiers
    // =========================================================================

    /// `ident` entry point
    pub fn ident(&mut self) -> ParseResult<String> {
        if let TokenKind::Ident(name) = self.kind() {
            let name = name.clone();
            self.advance();
            Ok(Some(name))
        } else {
            Ok(None)
        }
    }

    fn ident_list(&mut self) -> ParseResult<Vec<String>> {
        let Some(first) = self.ident()? else {
            return Ok(None);
        };
        let mut names = vec![first];
        while self.match_token(&TokenKind::Comma) {
            match self.ident()? {
                Some(name) => names.push(name),
                None => {
                    return Err(CompileError::parser(
                        format!("expected identifier, found {}", self.kind()),
                        self.current_span(),
                    ));
                }
            }
        }
        Ok(Some(names))
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// `expression` entry point: a simple expression optionally followed by
    /// a single, non-chainable relation.
    pub fn expression(&mut self) -> ParseResult<ExprInfo> {
        let start = self.pos;
        let Some(left) = self.simple_expression()? else {
            return Ok(None);
        };
        let op = match self.kind() {
            TokenKind::Eq
            | TokenKind::Hash
            | TokenKind::Lt
            | TokenKind::Le
            | TokenKind::Gt
            | TokenKind::Ge => self.kind().clone(),
            TokenKind::In => return self.in_relation(left, start).map(Some),
            TokenKind::Is => return self.type_test(left, start).map(Some),
            _ => return Ok(Some(left)),
        };
        self.advance();
        let right = self.required(Self::simple_expression)?;
        self.check_relation(&op, &left, &right)?;
        let value = match (&left.value, &right.value) {
            (Some(l), Some(r)) => sema::fold_binary(&op, l, r),
            _ => None,
        };
        Ok(Some(ExprInfo::rvalue(TypeTable::BOOLEAN, value, start)))
    }

    fn in_relation(&mut self, left: ExprInfo, start: usize) -> CompileResult<ExprInfo> {
        self.advance();
        let right = self.required(Self::simple_expression)?;
        if left.ty != TypeTable::INTEGER {
            return self.semantic(format!(
                "'INTEGER' expected as an element of SET, got '{}'",
                self.describe(left.ty)
            ));
        }
        if right.ty != TypeTable::SET {
            return self.semantic(format!(
                "type mismatch: expected 'SET', got '{}'",
                self.describe(right.ty)
            ));
        }
        let value = match (&left.value, &right.value) {
            (Some(l), Some(r)) => sema::fold_binary(&TokenKind::In, l, r),
            _ => None,
        };
        Ok(ExprInfo::rvalue(TypeTable::BOOLEAN, value, start))
    }

    /// `designator IS TypeName`
    fn type_test(&mut self, left: ExprInfo, start: usize) -> CompileResult<ExprInfo> {
        self.advance();
        let host = if left.access == Access::TypeRef {
            None
        } else {
            self.context.types.pointer_base(left.ty)
        };
        let Some(host) = host else {
            return self.semantic("POINTER to type expected before 'IS'");
        };
        let right = match self.factor()? {
            Some(info) => info,
            None => return self.semantic("type name expected"),
        };
        if !self.context.types.is_record(right.ty) {
            return self.semantic("RECORD type expected after 'IS'");
        }
        if right.access != Access::TypeRef {
            return self.semantic("type name expected");
        }
        if !self.context.types.is_extension_of(right.ty, host) {
            return self.semantic(format!(
                "invalid type test: '{}' is not an extension of '{}'",
                self.describe(right.ty),
                self.describe(host)
            ));
        }
        Ok(ExprInfo::rvalue(TypeTable::BOOLEAN, None, start))
    }

    fn simple_expression(&mut self) -> ParseResult<ExprInfo> {
        let start = self.pos;
        let sign = match self.kind() {
            TokenKind::Plus | TokenKind::Minus => {
                let op = self.kind().clone();
                self.advance();
                Some(op)
            }
            _ => None,
        };
        let Some(mut left) = self.term()? else {
            self.restore(start);
            return Ok(None);
        };
        if let Some(op) = &sign {
            let numeric = self.is_numeric(left.ty);
            let set_negation = matches!(op, TokenKind::Minus) && left.ty == TypeTable::SET;
            if !numeric && !set_negation {
                return self.semantic(format!(
                    "type mismatch: expected 'INTEGER', got '{}'",
                    self.describe(left.ty)
                ));
            }
            let value = left.value.as_ref().and_then(|v| sema::fold_unary(op, v));
            left = ExprInfo::rvalue(left.ty, value, start);
        }
        loop {
            let op = match self.kind() {
                TokenKind::Plus | TokenKind::Minus | TokenKind::Or => self.kind().clone(),
                _ => break,
            };
            self.advance();
            if matches!(op, TokenKind::Or) {
                self.boolean_operand(&op, &left)?;
            } else {
                self.arithmetic_operand(&op, &left)?;
            }
            let right = self.required(Self::term)?;
            self.match_operand(left.ty, &right)?;
            let value = match (&left.value, &right.value) {
                (Some(l), Some(r)) => sema::fold_binary(&op, l, r),
                _ => None,
            };
            left = ExprInfo::rvalue(left.ty, value, start);
        }
        Ok(Some(left))
    }

    fn term(&mut self) -> ParseResult<ExprInfo> {
        let start = self.pos;
        let Some(mut left) = self.factor()? else {
            return Ok(None);
        };
        loop {
            let op = match self.kind() {
                TokenKind::Star
                | TokenKind::Slash
                | TokenKind::Div
                | TokenKind::Mod
                | TokenKind::Amp => self.kind().clone(),
                _ => break,
            };
            self.advance();
            if matches!(op, TokenKind::Amp) {
                self.boolean_operand(&op, &left)?;
            } else {
                self.arithmetic_operand(&op, &left)?;
            }
            let right = self.required(Self::factor)?;
            self.match_operand(left.ty, &right)?;
            let value = match (&left.value, &right.value) {
                (Some(l), Some(r)) => sema::fold_binary(&op, l, r),
                _ => None,
            };
            left = ExprInfo::rvalue(left.ty, value, start);
        }
        Ok(Some(left))
    }

    fn factor(&mut self) -> ParseResult<ExprInfo> {
        let start = self.pos;
        let info = match self.kind().clone() {
            TokenKind::Integer(v) => {
                self.advance();
                ExprInfo::rvalue(TypeTable::INTEGER, Some(Value::Int(v)), start)
            }
            TokenKind::Real(v) => {
                self.advance();
                ExprInfo::rvalue(TypeTable::REAL, Some(Value::Real(v)), start)
            }
            TokenKind::LongReal(v) => {
                self.advance();
                ExprInfo::rvalue(TypeTable::LONGREAL, Some(Value::Real(v)), start)
            }
            TokenKind::CharCode(c) => {
                self.advance();
                ExprInfo::rvalue(TypeTable::CHAR, Some(Value::Char(c)), start)
            }
            TokenKind::Str(s) => {
                self.advance();
                let ty = self.context.types.intern(TypeDef::Str {
                    len: s.chars().count(),
                });
                ExprInfo::rvalue(ty, Some(Value::Str(s)), start)
            }
            TokenKind::True => {
                self.advance();
                ExprInfo::rvalue(TypeTable::BOOLEAN, Some(Value::Bool(true)), start)
            }
            TokenKind::False => {
                self.advance();
                ExprInfo::rvalue(TypeTable::BOOLEAN, Some(Value::Bool(false)), start)
            }
            TokenKind::Nil => {
                self.advance();
                ExprInfo::rvalue(TypeTable::NIL, None, start)
            }
            TokenKind::Tilde => {
                self.advance();
                let operand = self.required(Self::factor)?;
                self.match_operand(TypeTable::BOOLEAN, &operand)?;
                let value = operand
                    .value
                    .as_ref()
                    .and_then(|v| sema::fold_unary(&TokenKind::Tilde, v));
                ExprInfo::rvalue(TypeTable::BOOLEAN, value, start)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.required(Self::expression)?;
                self.expect(TokenKind::RParen)?;
                ExprInfo::rvalue(inner.ty, inner.value, start)
            }
            TokenKind::LBrace => self.set_literal(start)?,
            TokenKind::Ident(_) => {
                let Some(designator) = self.designator()? else {
                    return Ok(None);
                };
                if self.check(&TokenKind::LParen) && self.callable(&designator) {
                    let result = self.call(&designator)?;
                    let Some(result) = result else {
                        return self
                            .semantic("procedure returning no result cannot be used in an expression");
                    };
                    ExprInfo::rvalue(result, None, start)
                } else {
                    designator
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(info))
    }

    /// `{` element { "," element } `}` where element is expr [".." expr]
    fn set_literal(&mut self, start: usize) -> CompileResult<ExprInfo> {
        self.advance();
        let mut bits: u32 = 0;
        let mut constant = true;
        if !self.match_token(&TokenKind::RBrace) {
            loop {
                let from = self.required(Self::expression)?;
                self.set_element(&from)?;
                let to = if self.match_token(&TokenKind::DotDot) {
                    let to = self.required(Self::expression)?;
                    self.set_element(&to)?;
                    Some(to)
                } else {
                    None
                };
                match (
                    from.value.as_ref().and_then(Value::as_int),
                    to.as_ref().map(|t| t.value.as_ref().and_then(Value::as_int)),
                ) {
                    (Some(lo), None) => {
                        if (0..32).contains(&lo) {
                            bits |= 1u32 << (lo as u32);
                        }
                    }
                    (Some(lo), Some(Some(hi))) => {
                        let mut bit = lo.max(0);
                        while bit <= hi && bit < 32 {
                            bits |= 1u32 << (bit as u32);
                            bit += 1;
                        }
                    }
                    _ => constant = false,
                }
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBrace)?;
        }
        let value = constant.then_some(Value::Set(bits));
        Ok(ExprInfo::rvalue(TypeTable::SET, value, start))
    }

    fn set_element(&mut self, element: &ExprInfo) -> CompileResult<()> {
        if element.ty != TypeTable::INTEGER {
            return self.semantic(format!(
                "'INTEGER' expected as an element of SET, got '{}'",
                self.describe(element.ty)
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Designators
    // =========================================================================

    /// identifier plus `.field` / `[index]` / `^` / `(TypeGuard)` suffixes
    fn designator(&mut self) -> ParseResult<ExprInfo> {
        let start = self.pos;
        let Some(name) = self.ident()? else {
            return Ok(None);
        };
        let Some(symbol) = self.context.lookup(&name) else {
            return self.semantic(format!("undeclared identifier: '{}'", name));
        };
        let ty = symbol.ty;
        let mut info = match &symbol.kind {
            SymbolKind::Constant(value) => ExprInfo {
                ty,
                value: Some(value.clone()),
                access: Access::Constant,
                start,
            },
            SymbolKind::Variable { read_only } => ExprInfo {
                ty,
                value: None,
                access: Access::Variable {
                    read_only: *read_only,
                },
                start,
            },
            SymbolKind::Type => ExprInfo {
                ty,
                value: None,
                access: Access::TypeRef,
                start,
            },
            SymbolKind::Procedure => ExprInfo {
                ty,
                value: None,
                access: Access::ProcedureConst,
                start,
            },
            SymbolKind::Module => ExprInfo {
                ty,
                value: None,
                access: Access::ModuleRef,
                start,
            },
        };
        loop {
            match self.kind() {
                TokenKind::Dot => {
                    self.advance();
                    let field = match self.ident()? {
                        Some(field) => field,
                        None => {
                            return Err(CompileError::parser(
                                format!("expected identifier, found {}", self.kind()),
                                self.current_span(),
                            ));
                        }
                    };
                    info = self.select_field(info, &field)?;
                }
                TokenKind::Caret => {
                    self.advance();
                    let Some(record) = self.context.types.pointer_base(info.ty) else {
                        return self.semantic(format!(
                            "POINTER TO type expected, got '{}'",
                            self.describe(info.ty)
                        ));
                    };
                    info.ty = record;
                    info.value = None;
                    info.access = Access::Variable { read_only: false };
                }
                TokenKind::LBracket => {
                    self.advance();
                    loop {
                        info = self.index_suffix(info)?;
                        if !self.match_token(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RBracket)?;
                }
                TokenKind::LParen if !self.callable(&info) => {
                    info = self.type_guard(info)?;
                }
                _ => break,
            }
        }
        Ok(Some(info))
    }

    fn select_field(&mut self, info: ExprInfo, field: &str) -> CompileResult<ExprInfo> {
        // members of imported modules are permissive
        if matches!(
            self.context.types.get(info.ty),
            TypeDef::Module { .. } | TypeDef::Any
        ) {
            return Ok(ExprInfo {
                ty: TypeTable::ANY,
                value: None,
                access: Access::Variable { read_only: false },
                start: info.start,
            });
        }
        // implicit dereference before field selection
        let (record, read_only) = match self.context.types.pointer_base(info.ty) {
            Some(record) => (record, false),
            None => (
                info.ty,
                matches!(info.access, Access::Variable { read_only: true }),
            ),
        };
        if !self.context.types.is_record(record) {
            return self.semantic(format!("cannot designate '{}'", self.describe(info.ty)));
        }
        let Some(field_ty) = self.context.types.find_field(record, field) else {
            return self.semantic(format!(
                "Type '{}' has no '{}' field",
                self.describe(record),
                field
            ));
        };
        Ok(ExprInfo {
            ty: field_ty,
            value: None,
            access: Access::Variable { read_only },
            start: info.start,
        })
    }

    fn index_suffix(&mut self, info: ExprInfo) -> CompileResult<ExprInfo> {
        let TypeDef::Array { elem, len } = self.context.types.get(info.ty) else {
            return self.semantic(format!("ARRAY expected, got '{}'", self.describe(info.ty)));
        };
        let (elem, len) = (*elem, *len);
        let index = self.required(Self::expression)?;
        if index.ty != TypeTable::INTEGER {
            return self.semantic(format!(
                "'INTEGER' expression expected, got '{}'",
                self.describe(index.ty)
            ));
        }
        // constant indices into known-length arrays are bounds-checked;
        // non-constant indices never are
        if let (Some(value), Some(len)) = (index.value.as_ref().and_then(Value::as_int), len) {
            if value < 0 || value >= len {
                return self.semantic(format!(
                    "index out of bounds: maximum possible index is {}, got {}",
                    len - 1,
                    value
                ));
            }
        }
        let read_only = matches!(info.access, Access::Variable { read_only: true });
        Ok(ExprInfo {
            ty: elem,
            value: None,
            access: Access::Variable { read_only },
            start: info.start,
        })
    }

    /// `designator(TypeName)`: compile-time checked narrowing cast
    fn type_guard(&mut self, info: ExprInfo) -> CompileResult<ExprInfo> {
        self.advance(); // '('
        let Some(name) = self.ident()? else {
            return self.semantic("type name expected");
        };
        let Some(symbol) = self.context.lookup(&name) else {
            return self.semantic(format!("undeclared identifier: '{}'", name));
        };
        if !matches!(symbol.kind, SymbolKind::Type) {
            return self.semantic("type name expected");
        }
        let guard = symbol.ty;
        if !self.context.types.is_record(guard) {
            return self.semantic(format!(
                "invalid type cast: RECORD type expected as an argument of type guard, got '{}'",
                self.describe(guard)
            ));
        }
        let pointer_host = self.context.types.pointer_base(info.ty);
        let host = pointer_host.unwrap_or(info.ty);
        if !self.context.types.is_extension_of(guard, host) {
            return self.semantic(format!(
                "invalid type cast: '{}' is not an extension of '{}'",
                self.describe(guard),
                self.describe(host)
            ));
        }
        self.expect(TokenKind::RParen)?;
        let ty = if pointer_host.is_some() {
            self.context.types.intern(TypeDef::Pointer {
                name: None,
                base: PointerBase::Resolved(guard),
            })
        } else {
            guard
        };
        Ok(ExprInfo {
            ty,
            value: None,
            access: info.access,
            start: info.start,
        })
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn callable(&self, info: &ExprInfo) -> bool {
        matches!(
            self.context.types.get(info.ty),
            TypeDef::Procedure { .. } | TypeDef::Predefined { .. } | TypeDef::Any
        )
    }

    /// Parse optional actual parameters and validate the call. Returns the
    /// result type, None for a proper procedure.
    fn call(&mut self, callee: &ExprInfo) -> CompileResult<Option<TypeId>> {
        let args = if self.check(&TokenKind::LParen) {
            self.actual_parameters()?
        } else {
            Vec::new()
        };
        match self.context.types.get(callee.ty) {
            TypeDef::Procedure { params, result, .. } => {
                let (params, result) = (params.clone(), *result);
                self.check_arguments(&params, &args)?;
                Ok(result)
            }
            TypeDef::Predefined { name } => {
                let name = *name;
                self.check_predefined(name, &args)?;
                Ok(None)
            }
            TypeDef::Any => Ok(Some(TypeTable::ANY)),
            _ => self.semantic(format!(
                "PROCEDURE expected, got '{}'",
                self.describe(callee.ty)
            )),
        }
    }

    fn actual_parameters(&mut self) -> CompileResult<Vec<ExprInfo>> {
        self.advance(); // '('
        let mut args = Vec::new();
        if !self.match_token(&TokenKind::RParen) {
            loop {
                args.push(self.required(Self::expression)?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
        }
        Ok(args)
    }

    fn check_arguments(&self, params: &[Param], args: &[ExprInfo]) -> CompileResult<()> {
        if params.len() != args.len() {
            return self.semantic(format!(
                "{} argument(s) expected, got {}",
                params.len(),
                args.len()
            ));
        }
        for (i, (param, arg)) in params.iter().zip(args.iter()).enumerate() {
            if param.is_var {
                self.var_argument(arg)?;
                if !self.context.types.parameter_compatible(param.ty, arg.ty) {
                    return self.argument_type_error(param.ty, i, arg.ty);
                }
            } else if !self.context.types.parameter_compatible(param.ty, arg.ty)
                && !self.context.types.assignable(param.ty, arg.ty)
            {
                return self.argument_type_error(param.ty, i, arg.ty);
            }
        }
        Ok(())
    }

    fn argument_type_error(&self, expected: TypeId, index: usize, got: TypeId) -> CompileResult<()> {
        self.semantic(format!(
            "expect '{}' type for argument {}, got '{}'",
            self.describe(expected),
            index,
            self.describe(got)
        ))
    }

    /// An actual bound to a VAR formal must be an addressable, writable
    /// variable; the three rejections carry distinct messages.
    fn var_argument(&self, arg: &ExprInfo) -> CompileResult<()> {
        match arg.access {
            Access::Variable { read_only: false } => Ok(()),
            Access::Constant => self.semantic("constant cannot be used as VAR parameter"),
            Access::Variable { read_only: true } => {
                self.semantic("read-only variable cannot be used as VAR parameter")
            }
            _ => self.semantic("expression cannot be used as VAR parameter"),
        }
    }

    fn check_predefined(&self, name: &str, args: &[ExprInfo]) -> CompileResult<()> {
        match name {
            "NEW" => {
                if args.len() != 1 {
                    return self.semantic(format!("1 argument(s) expected, got {}", args.len()));
                }
                self.var_argument(&args[0])?;
                if self.context.types.pointer_base(args[0].ty).is_none() {
                    return self.semantic(format!(
                        "POINTER variable expected, got '{}'",
                        self.describe(args[0].ty)
                    ));
                }
                Ok(())
            }
            _ => {
                // INCL, EXCL
                if args.len() != 2 {
                    return self.semantic(format!("2 argument(s) expected, got {}", args.len()));
                }
                self.var_argument(&args[0])?;
                if args[0].ty != TypeTable::SET {
                    return self.argument_type_error(TypeTable::SET, 0, args[0].ty);
                }
                if args[1].ty != TypeTable::INTEGER {
                    return self.argument_type_error(TypeTable::INTEGER, 1, args[1].ty);
                }
                Ok(())
            }
        }
    }

    // =========================================================================
    // Operator typing helpers
    // =========================================================================

    fn boolean_operand(&self, op: &TokenKind, operand: &ExprInfo) -> CompileResult<()> {
        if operand.ty != TypeTable::BOOLEAN {
            return self.semantic(format!(
                "BOOLEAN expected as operand of '{}', got '{}'",
                op_text(op),
                self.describe(operand.ty)
            ));
        }
        Ok(())
    }

    fn is_numeric(&self, ty: TypeId) -> bool {
        ty == TypeTable::INTEGER || ty == TypeTable::REAL || ty == TypeTable::LONGREAL
    }

    fn arithmetic_operand(&self, op: &TokenKind, operand: &ExprInfo) -> CompileResult<()> {
        let (ok, expected) = match op {
            TokenKind::Plus | TokenKind::Minus | TokenKind::Star => (
                self.is_numeric(operand.ty) || operand.ty == TypeTable::SET,
                "numeric type or SET",
            ),
            TokenKind::Slash => (
                operand.ty == TypeTable::REAL
                    || operand.ty == TypeTable::LONGREAL
                    || operand.ty == TypeTable::SET,
                "'REAL' or 'SET'",
            ),
            _ => (operand.ty == TypeTable::INTEGER, "'INTEGER'"),
        };
        if !ok {
            return self.semantic(format!(
                "operator '{}' type mismatch: {} expected, got '{}'",
                op_text(op),
                expected,
                self.describe(operand.ty)
            ));
        }
        Ok(())
    }

    fn match_operand(&self, expected: TypeId, actual: &ExprInfo) -> CompileResult<()> {
        if !self.context.types.same_type(expected, actual.ty) {
            return self.semantic(format!(
                "type mismatch: expected '{}', got '{}'",
                self.describe(expected),
                self.describe(actual.ty)
            ));
        }
        Ok(())
    }

    fn check_relation(&self, op: &TokenKind, left: &ExprInfo, right: &ExprInfo) -> CompileResult<()> {
        let types = &self.context.types;
        let ordered = self.is_numeric(left.ty)
            || left.ty == TypeTable::CHAR
            || matches!(types.get(left.ty), TypeDef::Str { .. })
            || types.is_char_array(left.ty);
        let applicable = match op {
            TokenKind::Eq | TokenKind::Hash => {
                ordered
                    || matches!(
                        types.get(left.ty),
                        TypeDef::Boolean
                            | TypeDef::Set
                            | TypeDef::Pointer { .. }
                            | TypeDef::Procedure { .. }
                            | TypeDef::Nil
                    )
            }
            TokenKind::Le | TokenKind::Ge => ordered || left.ty == TypeTable::SET,
            _ => ordered,
        };
        if !applicable {
            return self.semantic(format!(
                "operator '{}' is not applicable to '{}'",
                op_text(op),
                self.describe(left.ty)
            ));
        }
        if !self.relation_compatible(left.ty, right.ty) {
            return self.semantic(format!(
                "type mismatch: expected '{}', got '{}'",
                self.describe(left.ty),
                self.describe(right.ty)
            ));
        }
        Ok(())
    }

    fn relation_compatible(&self, left: TypeId, right: TypeId) -> bool {
        let types = &self.context.types;
        if types.same_type(left, right) {
            return true;
        }
        match (types.get(left), types.get(right)) {
            (TypeDef::Char, TypeDef::Str { len: 1 }) | (TypeDef::Str { len: 1 }, TypeDef::Char) => {
                true
            }
            (TypeDef::Str { .. }, TypeDef::Str { .. }) => true,
            (TypeDef::Array { .. }, TypeDef::Str { .. }) => types.is_char_array(left),
            (TypeDef::Str { .. }, TypeDef::Array { .. }) => types.is_char_array(right),
            (TypeDef::Array { .. }, TypeDef::Array { .. }) => {
                types.is_char_array(left) && types.is_char_array(right)
            }
            (TypeDef::Pointer { .. }, TypeDef::Pointer { .. }) => {
                types.assignable(left, right) || types.assignable(right, left)
            }
            (TypeDef::Pointer { .. } | TypeDef::Procedure { .. }, TypeDef::Nil)
            | (TypeDef::Nil, TypeDef::Pointer { .. } | TypeDef::Procedure { .. }) => true,
            _ => false,
        }
    }

    /// Commit point: a production that must match from here on
    fn required<T>(
        &mut self,
        production: fn(&mut Self) -> ParseResult<T>,
    ) -> CompileResult<T> {
        match production(self)? {
            Some(value) => Ok(value),
            None => self.semantic("expression expected"),
        }
    }
}

impl<'a> Parser<'a> {
    // =========================================================================
    // Statements
    // =========================================================================

    /// `statement` entry point. Empty statements are legal, so a no-match
    /// here is not an error.
    pub fn statement(&mut self) -> ParseResult<()> {
        match self.kind() {
            TokenKind::If => self.if_statement().map(Some),
            TokenKind::While => self.while_statement().map(Some),
            TokenKind::Repeat => self.repeat_statement().map(Some),
            TokenKind::For => self.for_statement().map(Some),
            TokenKind::Case => self.case_statement().map(Some),
            TokenKind::Ident(_) => self.assignment_or_call().map(Some),
            _ => Ok(None),
        }
    }

    fn assignment_or_call(&mut self) -> CompileResult<()> {
        let Some(target) = self.designator()? else {
            // designator() only reports no-match before consuming anything,
            // and an identifier is already at hand
            return self.semantic("expression expected");
        };
        let target_end = self.pos;
        if self.match_token(&TokenKind::Assign) {
            let source = self.required(Self::expression)?;
            match target.access {
                Access::Variable { read_only: false } => {}
                Access::Constant => return self.semantic("cannot assign to constant"),
                Access::ProcedureConst => return self.semantic("cannot assign to procedure"),
                Access::Variable { read_only: true } => {
                    return self.semantic("cannot assign to read-only variable");
                }
                _ => {
                    return self.semantic(format!(
                        "cannot assign to '{}'",
                        self.describe(target.ty)
                    ));
                }
            }
            if !self.context.types.assignable(target.ty, source.ty) {
                let text = self.text_between(target.start, target_end).to_string();
                return self.semantic(format!(
                    "type mismatch: '{}' is '{}' and cannot be assigned to '{}' expression",
                    text,
                    self.describe(target.ty),
                    self.describe(source.ty)
                ));
            }
            Ok(())
        } else {
            if !self.callable(&target) {
                return self.semantic(format!(
                    "PROCEDURE expected, got '{}'",
                    self.describe(target.ty)
                ));
            }
            self.call(&target)?;
            Ok(())
        }
    }

    /// Statements separated by `;`; empty statements allowed throughout
    fn statement_sequence(&mut self) -> CompileResult<()> {
        loop {
            self.statement()?;
            if !self.match_token(&TokenKind::Semi) {
                break;
            }
        }
        Ok(())
    }

    /// A condition: committed expression that must be BOOLEAN
    fn condition(&mut self) -> CompileResult<()> {
        let info = self.required(Self::expression)?;
        if info.ty != TypeTable::BOOLEAN {
            return self.semantic(format!(
                "'BOOLEAN' expression expected, got '{}'",
                self.describe(info.ty)
            ));
        }
        Ok(())
    }

    fn if_statement(&mut self) -> CompileResult<()> {
        self.advance(); // IF
        self.condition()?;
        self.expect(TokenKind::Then)?;
        self.statement_sequence()?;
        while self.match_token(&TokenKind::Elsif) {
            self.condition()?;
            self.expect(TokenKind::Then)?;
            self.statement_sequence()?;
        }
        if self.match_token(&TokenKind::Else) {
            self.statement_sequence()?;
        }
        self.expect(TokenKind::End)
    }

    fn while_statement(&mut self) -> CompileResult<()> {
        self.advance(); // WHILE
        self.condition()?;
        self.expect(TokenKind::Do)?;
        self.statement_sequence()?;
        while self.match_token(&TokenKind::Elsif) {
            self.condition()?;
            self.expect(TokenKind::Do)?;
            self.statement_sequence()?;
        }
        self.expect(TokenKind::End)
    }

    fn repeat_statement(&mut self) -> CompileResult<()> {
        self.advance(); // REPEAT
        self.statement_sequence()?;
        self.expect(TokenKind::Until)?;
        self.condition()
    }

    fn for_statement(&mut self) -> CompileResult<()> {
        self.advance(); // FOR
        let Some(name) = self.ident()? else {
            return Err(CompileError::parser(
                format!("expected identifier, found {}", self.kind()),
                self.current_span(),
            ));
        };
        let Some(symbol) = self.context.lookup(&name) else {
            return self.semantic(format!("undeclared identifier: '{}'", name));
        };
        let control_ty = symbol.ty;
        if !matches!(symbol.kind, SymbolKind::Variable { .. }) {
            return self.semantic(format!("'{}' is not a variable", name));
        }
        if control_ty != TypeTable::INTEGER {
            return self.semantic(format!(
                "'{}' is a '{}' variable, 'FOR' control variable must be 'INTEGER'",
                name,
                self.describe(control_ty)
            ));
        }
        self.expect(TokenKind::Assign)?;
        let from = self.required(Self::expression)?;
        if from.ty != TypeTable::INTEGER {
            return self.semantic(format!(
                "'INTEGER' expression expected to assign '{}', got '{}'",
                name,
                self.describe(from.ty)
            ));
        }
        self.expect(TokenKind::To)?;
        let to = self.required(Self::expression)?;
        if to.ty != TypeTable::INTEGER {
            return self.semantic(format!(
                "'INTEGER' expression expected as 'TO' parameter, got '{}'",
                self.describe(to.ty)
            ));
        }
        if self.match_token(&TokenKind::By) {
            let step = self.required(Self::expression)?;
            if step.ty != TypeTable::INTEGER {
                return self.semantic(format!(
                    "'INTEGER' expression expected as 'BY' parameter, got '{}'",
                    self.describe(step.ty)
                ));
            }
            if step.value.is_none() {
                return self.semantic("constant expression expected as 'BY' parameter");
            }
        }
        self.expect(TokenKind::Do)?;
        self.statement_sequence()?;
        self.expect(TokenKind::End)
    }

    fn case_statement(&mut self) -> CompileResult<()> {
        self.advance(); // CASE
        let switch = self.required(Self::expression)?;
        if switch.ty != TypeTable::INTEGER && switch.ty != TypeTable::CHAR {
            return self.semantic("'INTEGER' or 'CHAR' expected as CASE expression");
        }
        self.expect(TokenKind::Of)?;
        loop {
            self.one_case(switch.ty)?;
            if !self.match_token(&TokenKind::Bar) {
                break;
            }
        }
        self.expect(TokenKind::End)
    }

    /// One CASE arm: possibly empty, else labels ':' statements
    fn one_case(&mut self, switch_ty: TypeId) -> CompileResult<()> {
        if self.check(&TokenKind::End) || self.check(&TokenKind::Bar) {
            return Ok(());
        }
        loop {
            let from = self.case_label(switch_ty)?;
            if self.match_token(&TokenKind::DotDot) {
                let to = self.case_label(switch_ty)?;
                if from > to {
                    return self.semantic("invalid CASE range: left bound exceeds right bound");
                }
            }
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Colon)?;
        self.statement_sequence()
    }

    /// A label must be a constant of exactly the switch type; returns its
    /// ordinal for range ordering.
    fn case_label(&mut self, switch_ty: TypeId) -> CompileResult<i64> {
        let (label_ty, value) = match self.kind().clone() {
            TokenKind::Integer(v) => {
                self.advance();
                (TypeTable::INTEGER, Value::Int(v))
            }
            TokenKind::CharCode(c) => {
                self.advance();
                (TypeTable::CHAR, Value::Char(c))
            }
            TokenKind::Str(s) => {
                self.advance();
                if s.chars().count() == 1 {
                    (TypeTable::CHAR, Value::Str(s))
                } else {
                    let ty = self.context.types.intern(TypeDef::Str {
                        len: s.chars().count(),
                    });
                    (ty, Value::Str(s))
                }
            }
            TokenKind::Ident(name) => {
                self.advance();
                let Some(symbol) = self.context.lookup(&name) else {
                    return self.semantic(format!("undeclared identifier: '{}'", name));
                };
                let ty = symbol.ty;
                let SymbolKind::Constant(value) = &symbol.kind else {
                    return self.semantic(format!("'{}' is not a constant", name));
                };
                let value = value.clone();
                let ty = match self.context.types.get(ty) {
                    TypeDef::Str { len: 1 } => TypeTable::CHAR,
                    _ => ty,
                };
                (ty, value)
            }
            other => {
                return Err(CompileError::parser(
                    format!("expected label, found {}", other),
                    self.current_span(),
                ));
            }
        };
        if label_ty != switch_ty {
            return self.semantic(format!(
                "label must be '{}' (the same as case expression), got '{}'",
                self.describe(switch_ty),
                self.describe(label_ty)
            ));
        }
        value.as_ordinal().map_or_else(
            || self.semantic("constant expression expected"),
            Ok,
        )
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    /// `declarationSequence` entry point: CONST, TYPE, VAR sections in
    /// order, then procedure declarations. Forward pointers resolve when
    /// the TYPE section ends.
    pub fn declaration_sequence(&mut self) -> ParseResult<()> {
        if self.match_token(&TokenKind::Const) {
            while matches!(self.kind(), TokenKind::Ident(_)) {
                self.constant_declaration()?;
                self.expect(TokenKind::Semi)?;
            }
        }
        if self.match_token(&TokenKind::Type) {
            while matches!(self.kind(), TokenKind::Ident(_)) {
                match self.type_declaration()? {
                    Some(()) => self.expect(TokenKind::Semi)?,
                    None => return Ok(None),
                }
            }
            if let Err(message) = self.context.resolve_pending_pointers() {
                return self.semantic(message);
            }
        }
        if self.match_token(&TokenKind::Var) {
            while matches!(self.kind(), TokenKind::Ident(_)) {
                match self.variable_declaration()? {
                    Some(()) => self.expect(TokenKind::Semi)?,
                    None => return Ok(None),
                }
            }
        }
        while self.check(&TokenKind::Procedure) {
            match self.procedure_declaration()? {
                Some(()) => self.expect(TokenKind::Semi)?,
                None => return Ok(None),
            }
        }
        Ok(Some(()))
    }

    /// `name = constExpression`: the initializer must fold; each constant
    /// may reference only constants declared before it.
    fn constant_declaration(&mut self) -> CompileResult<()> {
        let name = self.ident()?.expect("caller checked for an identifier");
        self.expect(TokenKind::Eq)?;
        let init = self.required(Self::expression)?;
        let Some(value) = init.value else {
            return self.semantic("constant expression expected");
        };
        if let Err(message) = self.context.declare_constant(&name, value, init.ty) {
            return self.semantic(message);
        }
        Ok(())
    }

    /// `typeDeclaration` entry point: `name = type`
    pub fn type_declaration(&mut self) -> ParseResult<()> {
        let start = self.pos;
        let Some(name) = self.ident()? else {
            return Ok(None);
        };
        if !self.match_token(&TokenKind::Eq) {
            self.restore(start);
            return Ok(None);
        }
        // Reserve the slot for the name so the declaration may reference
        // itself (`P = PROCEDURE(): P`); a freshly built descriptor moves
        // into the slot, an alias keeps denoting the existing type.
        let reserved = self
            .context
            .types
            .intern(TypeDef::Incomplete { name: name.clone() });
        let previous = self.declaring.replace((name.clone(), reserved));
        let parsed = self.parse_type(false);
        self.declaring = previous;
        let Some(ty) = parsed? else {
            self.restore(start);
            return Ok(None);
        };
        let ty = if ty > reserved {
            let def = self.context.types.get(ty).clone();
            self.context.types.replace(reserved, def);
            self.context.repoint_pending_pointer(ty, reserved);
            reserved
        } else {
            ty
        };
        self.context.types.set_name(ty, &name);
        if let Err(message) = self.context.declare(&name, SymbolKind::Type, ty) {
            return self.semantic(message);
        }
        Ok(Some(()))
    }

    /// `variableDeclaration` entry point: `identList : type`
    pub fn variable_declaration(&mut self) -> ParseResult<()> {
        let start = self.pos;
        let Some(names) = self.ident_list()? else {
            return Ok(None);
        };
        if !self.match_token(&TokenKind::Colon) {
            self.restore(start);
            return Ok(None);
        }
        let Some(ty) = self.parse_type(true)? else {
            self.restore(start);
            return Ok(None);
        };
        for name in &names {
            if let Err(message) =
                self.context
                    .declare(name, SymbolKind::Variable { read_only: false }, ty)
            {
                return self.semantic(message);
            }
        }
        Ok(Some(()))
    }

    // =========================================================================
    // Types
    // =========================================================================

    /// The `type` production. `required` hardens only the plain-identifier
    /// alternative: a committed position (ARRAY element, declaration colon)
    /// turns an unknown type name into a diagnostic instead of a no-match.
    fn parse_type(&mut self, required: bool) -> ParseResult<TypeId> {
        match self.kind() {
            TokenKind::Ident(name) => {
                let name = name.clone();
                match self.context.lookup(&name) {
                    Some(symbol) if matches!(symbol.kind, SymbolKind::Type) => {
                        let ty = symbol.ty;
                        self.advance();
                        Ok(Some(ty))
                    }
                    Some(_) => {
                        if required {
                            self.semantic("type name expected")
                        } else {
                            Ok(None)
                        }
                    }
                    None => {
                        if let Some(id) = self.self_reference(&name) {
                            self.advance();
                            return Ok(Some(id));
                        }
                        if required {
                            self.semantic(format!("undeclared type: '{}'", name))
                        } else {
                            Ok(None)
                        }
                    }
                }
            }
            TokenKind::Array => self.array_type(),
            TokenKind::Record => self.record_type(),
            TokenKind::Pointer => self.pointer_type(),
            TokenKind::Procedure => self.procedure_type().map(Some),
            _ => Ok(None),
        }
    }

    /// `ARRAY size {, size} OF type`; sizes must fold to positive INTEGERs
    fn array_type(&mut self) -> ParseResult<TypeId> {
        let start = self.pos;
        self.advance(); // ARRAY
        let mut sizes = Vec::new();
        loop {
            let Some(size) = self.expression()? else {
                self.restore(start);
                return Ok(None);
            };
            if size.ty != TypeTable::INTEGER {
                return self.semantic(format!(
                    "'INTEGER' constant expression expected, got '{}'",
                    self.describe(size.ty)
                ));
            }
            let Some(length) = size.value.as_ref().and_then(Value::as_int) else {
                return self.semantic("constant expression expected as ARRAY size");
            };
            if length <= 0 {
                return self.semantic(format!(
                    "array size must be greater than 0, got {}",
                    length
                ));
            }
            sizes.push(length);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        if !self.match_token(&TokenKind::Of) {
            self.restore(start);
            return Ok(None);
        }
        let Some(mut ty) = self.parse_type(true)? else {
            self.restore(start);
            return Ok(None);
        };
        for length in sizes.into_iter().rev() {
            ty = self.context.types.intern(TypeDef::Array {
                elem: ty,
                len: Some(length),
            });
        }
        Ok(Some(ty))
    }

    /// `RECORD [(Base)] fields END`; field names must be unique across the
    /// entire base chain
    fn record_type(&mut self) -> ParseResult<TypeId> {
        let start = self.pos;
        self.advance(); // RECORD
        let base = if self.match_token(&TokenKind::LParen) {
            let Some(name) = self.ident()? else {
                return self.semantic("type name expected");
            };
            let base = match self.context.lookup(&name) {
                None => return self.semantic(format!("undeclared type: '{}'", name)),
                Some(symbol) if matches!(symbol.kind, SymbolKind::Type) => symbol.ty,
                Some(_) => return self.semantic("type name expected"),
            };
            if !self.context.types.is_record(base) {
                return self.semantic(format!(
                    "RECORD is expected as a base type, got '{}'",
                    self.describe(base)
                ));
            }
            self.expect(TokenKind::RParen)?;
            Some(base)
        } else {
            None
        };
        let mut fields: Vec<(String, TypeId)> = Vec::new();
        while matches!(self.kind(), TokenKind::Ident(_)) {
            let names = self.ident_list()?.expect("loop checked for an identifier");
            self.expect(TokenKind::Colon)?;
            let ty = match self.parse_type(true)? {
                Some(ty) => ty,
                None => {
                    return Err(CompileError::parser(
                        format!("expected type, found {}", self.kind()),
                        self.current_span(),
                    ));
                }
            };
            for name in names {
                if fields.iter().any(|(n, _)| *n == name) {
                    return self.semantic(format!("'{}' already declared", name));
                }
                if let Some(base) = base {
                    if self.context.types.find_field(base, &name).is_some() {
                        return self.semantic(format!(
                            "base record already has field: '{}'",
                            name
                        ));
                    }
                }
                fields.push((name, ty));
            }
            if !self.match_token(&TokenKind::Semi) {
                break;
            }
        }
        if !self.match_token(&TokenKind::End) {
            self.restore(start);
            return Ok(None);
        }
        Ok(Some(self.context.types.intern(TypeDef::Record {
            name: None,
            base,
            fields,
        })))
    }

    /// `POINTER TO base`: the base must be a record; an undeclared name is
    /// accepted provisionally and bound at the end of the TYPE section.
    fn pointer_type(&mut self) -> ParseResult<TypeId> {
        let start = self.pos;
        self.advance(); // POINTER
        if !self.match_token(&TokenKind::To) {
            self.restore(start);
            return Ok(None);
        }
        if let TokenKind::Ident(name) = self.kind() {
            let name = name.clone();
            return match self.context.lookup(&name) {
                None => {
                    self.advance();
                    let ptr = self.context.types.intern(TypeDef::Pointer {
                        name: None,
                        base: PointerBase::Forward(name.clone()),
                    });
                    self.context.add_pending_pointer(ptr, &name);
                    Ok(Some(ptr))
                }
                Some(symbol) if matches!(symbol.kind, SymbolKind::Type) => {
                    let base = symbol.ty;
                    self.advance();
                    if !self.context.types.is_record(base) {
                        return self.semantic(format!(
                            "RECORD is expected as a POINTER base type, got '{}'",
                            self.describe(base)
                        ));
                    }
                    Ok(Some(self.context.types.intern(TypeDef::Pointer {
                        name: None,
                        base: PointerBase::Resolved(base),
                    })))
                }
                Some(_) => self.semantic("type name expected"),
            };
        }
        let base = match self.parse_type(true)? {
            Some(base) => base,
            None => {
                return Err(CompileError::parser(
                    format!("expected type, found {}", self.kind()),
                    self.current_span(),
                ));
            }
        };
        if !self.context.types.is_record(base) {
            return self.semantic(format!(
                "RECORD is expected as a POINTER base type, got '{}'",
                self.describe(base)
            ));
        }
        Ok(Some(self.context.types.intern(TypeDef::Pointer {
            name: None,
            base: PointerBase::Resolved(base),
        })))
    }

    /// `PROCEDURE [formalParameters]` as a type
    fn procedure_type(&mut self) -> CompileResult<TypeId> {
        self.advance(); // PROCEDURE
        let (params, _, result) = if self.check(&TokenKind::LParen) {
            self.formal_parameters()?
        } else {
            (Vec::new(), Vec::new(), None)
        };
        Ok(self.context.types.intern(TypeDef::Procedure {
            name: None,
            params,
            result,
        }))
    }

    /// `(section {; section}) [: ResultType]`; pure, declares nothing.
    /// The result type resolves through plain lookup, so an unknown name
    /// reports an undeclared identifier, not an undeclared type.
    fn formal_parameters(
        &mut self,
    ) -> CompileResult<(Vec<Param>, Vec<FormalDecl>, Option<TypeId>)> {
        self.advance(); // '('
        let mut params = Vec::new();
        let mut decls = Vec::new();
        if !self.match_token(&TokenKind::RParen) {
            loop {
                let is_var = self.match_token(&TokenKind::Var);
                let Some(names) = self.ident_list()? else {
                    return Err(CompileError::parser(
                        format!("expected identifier, found {}", self.kind()),
                        self.current_span(),
                    ));
                };
                self.expect(TokenKind::Colon)?;
                let ty = self.formal_type()?;
                for name in names {
                    params.push(Param { ty, is_var });
                    decls.push(FormalDecl { name, ty, is_var });
                }
                if !self.match_token(&TokenKind::Semi) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
        }
        let result = if self.match_token(&TokenKind::Colon) {
            let Some(name) = self.ident()? else {
                return Err(CompileError::parser(
                    format!("expected identifier, found {}", self.kind()),
                    self.current_span(),
                ));
            };
            match self.context.lookup(&name) {
                None => match self.self_reference(&name) {
                    Some(id) => Some(id),
                    None => {
                        return self.semantic(format!("undeclared identifier: '{}'", name));
                    }
                },
                Some(symbol) if matches!(symbol.kind, SymbolKind::Type) => Some(symbol.ty),
                Some(_) => return self.semantic("type name expected"),
            }
        } else {
            None
        };
        Ok((params, decls, result))
    }

    /// The name of the TYPE declaration currently being parsed
    fn self_reference(&self, name: &str) -> Option<TypeId> {
        match &self.declaring {
            Some((declared, id)) if declared == name => Some(*id),
            _ => None,
        }
    }

    /// `{ARRAY OF} TypeName`: open arrays exist only here
    fn formal_type(&mut self) -> CompileResult<TypeId> {
        let mut opens = 0;
        while self.match_token(&TokenKind::Array) {
            self.expect(TokenKind::Of)?;
            opens += 1;
        }
        let mut ty = match self.parse_type(true)? {
            Some(ty) => ty,
            None => {
                return Err(CompileError::parser(
                    format!("expected type, found {}", self.kind()),
                    self.current_span(),
                ));
            }
        };
        for _ in 0..opens {
            ty = self.context.types.intern(TypeDef::Array {
                elem: ty,
                len: None,
            });
        }
        Ok(ty)
    }

    // =========================================================================
    // Procedures
    // =========================================================================

    /// `procedureHeading` entry point: declares the procedure in the
    /// current scope, then opens the formal scope with the parameters.
    pub fn procedure_heading(&mut self) -> ParseResult<Heading> {
        let start = self.pos;
        if !self.match_token(&TokenKind::Procedure) {
            return Ok(None);
        }
        let Some(name) = self.ident()? else {
            self.restore(start);
            return Ok(None);
        };
        let (params, decls, result) = if self.check(&TokenKind::LParen) {
            self.formal_parameters()?
        } else {
            (Vec::new(), Vec::new(), None)
        };
        for decl in &decls {
            if decl.name == name {
                return self.semantic(format!(
                    "argument '{}' has the same name as procedure",
                    decl.name
                ));
            }
        }
        let proc_ty = self.context.types.intern(TypeDef::Procedure {
            name: None,
            params,
            result,
        });
        if let Err(message) = self.context.declare(&name, SymbolKind::Procedure, proc_ty) {
            return self.semantic(message);
        }
        self.context.enter_procedure(&name, result);
        for decl in decls {
            let read_only = !decl.is_var
                && matches!(self.context.types.get(decl.ty), TypeDef::Array { .. });
            if let Err(message) =
                self.context
                    .declare(&decl.name, SymbolKind::Variable { read_only }, decl.ty)
            {
                return self.semantic(message);
            }
        }
        Ok(Some(Heading { name, result }))
    }

    /// `procedureBody` entry point: declarations, optional BEGIN block,
    /// RETURN present iff the enclosing heading declared a result.
    pub fn procedure_body(&mut self) -> ParseResult<()> {
        let start = self.pos;
        if self.declaration_sequence()?.is_none() {
            self.restore(start);
            return Ok(None);
        }
        if self.match_token(&TokenKind::Begin) {
            self.statement_sequence()?;
        }
        let result_expected = self.context.current_procedure().and_then(|f| f.result);
        if self.match_token(&TokenKind::Return) {
            let Some(result_ty) = result_expected else {
                return self.semantic("unexpected RETURN in PROCEDURE declared with no result type");
            };
            let returned = self.required(Self::expression)?;
            if !self.context.types.assignable(result_ty, returned.ty) {
                return self.semantic(format!(
                    "RETURN '{}' expected, got '{}'",
                    self.describe(result_ty),
                    self.describe(returned.ty)
                ));
            }
        } else if let Some(result_ty) = result_expected {
            return self.semantic(format!(
                "RETURN expected at the end of PROCEDURE declared with '{}' result type",
                self.describe(result_ty)
            ));
        }
        if !self.match_token(&TokenKind::End) {
            self.restore(start);
            return Ok(None);
        }
        Ok(Some(()))
    }

    /// `procedureDeclaration` entry point: heading, body, and the trailing
    /// name that must repeat the heading's.
    pub fn procedure_declaration(&mut self) -> ParseResult<()> {
        let Some(heading) = self.procedure_heading()? else {
            return Ok(None);
        };
        self.expect(TokenKind::Semi)?;
        if self.procedure_body()?.is_none() {
            self.context.leave_procedure();
            return Ok(None);
        }
        let Some(end_name) = self.ident()? else {
            self.context.leave_procedure();
            return Ok(None);
        };
        if end_name != heading.name {
            return self.semantic(format!(
                "mismatched procedure names: '{}' at the begining and '{}' at the end",
                heading.name, end_name
            ));
        }
        self.context.leave_procedure();
        Ok(Some(()))
    }

    // =========================================================================
    // Modules
    // =========================================================================

    /// `module` entry point:
    /// `MODULE name; [IMPORT list;] declarations [BEGIN statements] END name.`
    pub fn module(&mut self) -> ParseResult<String> {
        let start = self.pos;
        if !self.match_token(&TokenKind::Module) {
            return Ok(None);
        }
        let Some(name) = self.ident()? else {
            self.restore(start);
            return Ok(None);
        };
        self.expect(TokenKind::Semi)?;
        if self.match_token(&TokenKind::Import) {
            loop {
                let Some(import) = self.ident()? else {
                    return Err(CompileError::parser(
                        format!("expected identifier, found {}", self.kind()),
                        self.current_span(),
                    ));
                };
                if let Err(message) = self.context.import(&import) {
                    return self.semantic(message);
                }
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Semi)?;
        }
        if self.declaration_sequence()?.is_none() {
            self.restore(start);
            return Ok(None);
        }
        if self.match_token(&TokenKind::Begin) {
            self.statement_sequence()?;
        }
        self.expect(TokenKind::End)?;
        let Some(end_name) = self.ident()? else {
            self.restore(start);
            return Ok(None);
        };
        if end_name != name {
            return self.semantic(format!(
                "original module name '{}' expected, got '{}'",
                name, end_name
            ));
        }
        if !self.match_token(&TokenKind::Dot) {
            self.restore(start);
            return Ok(None);
        }
        Ok(Some(name))
    }
}

/// Operator spelling for diagnostics
fn op_text(op: &TokenKind) -> &'static str {
    match op {
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Star => "*",
        TokenKind::Slash => "/",
        TokenKind::Div => "DIV",
        TokenKind::Mod => "MOD",
        TokenKind::Amp => "&",
        TokenKind::Or => "OR",
        TokenKind::Tilde => "~",
        TokenKind::Eq => "=",
        TokenKind::Hash => "#",
        TokenKind::Lt => "<",
        TokenKind::Le => "<=",
        TokenKind::Gt => ">",
        TokenKind::Ge => ">=",
        TokenKind::In => "IN",
        TokenKind::Is => "IS",
        _ => "?",
    }
}
