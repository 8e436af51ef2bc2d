//! Microsoft Visual C++ (and Digital Mars) decorated names.
//!
//! Back-references are single digits into two ten-slot tables: one for name fragments, compared by text, and one
//! for parameter types, compared structurally. Once a table is full, later entries are spelled out in full.

use core::fmt::Write;

use crate::defs::{
    AggregateKind, AliasTarget, Definitions, FunctionKind, Protection, StorageClass, SymbolId,
    SymbolKind, TemplateArg, TemplateInstance, TypeInterner,
};
use crate::error::{MangleError, Result};
use crate::subst::{emit, Mangle, SubstitutionTable};
use crate::target::{MsvcDialect, TargetInfo};
use crate::ty::{BasicKind, Linkage, Param, ParamStorage, Type, TypeId, TypeKind, TypeLookup};

const SAVED_IDENTS: usize = 10;
const SAVED_TYPES: usize = 10;

/// A `0`-`9` back-reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct BackRef(usize);

impl Mangle for BackRef {
    fn write<W: Write>(&self, buf: &mut W) -> core::fmt::Result {
        debug_assert!(self.0 < 10);
        buf.write_char(char::from(b'0' + self.0 as u8))
    }
}

/// An encoded number: `A@` for zero, a digit for 1 through 10, otherwise hex nibbles spelled `A`-`P`
/// terminated by `@`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Number(pub u128);

impl Mangle for Number {
    fn write<W: Write>(&self, buf: &mut W) -> core::fmt::Result {
        match self.0 {
            0 => buf.write_str("A@"),
            n @ 1..=10 => buf.write_char(char::from(b'0' + (n - 1) as u8)),
            mut n => {
                let mut nibbles = [0u8; 32];
                let mut cursor = nibbles.len();
                while n != 0 {
                    cursor -= 1;
                    nibbles[cursor] = b'A' + (n % 16) as u8;
                    n /= 16;
                }
                for &c in &nibbles[cursor..] {
                    buf.write_char(char::from(c))?;
                }
                buf.write_char('@')
            }
        }
    }
}

/// Where the type being written sits.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct Mode {
    /// Below a pointer, reference or array: qualifiers are spelled and the type table is not consulted
    nested: bool,
    /// Inside a return type, which never takes part in back-referencing
    return_type: bool,
    /// The element of an array, whose qualifiers were already written with the array
    ignore_const: bool,
}

impl Mode {
    const TOP: Self = Self {
        nested: false,
        return_type: false,
        ignore_const: false,
    };

    const fn nested(self) -> Self {
        Self {
            nested: true,
            ..self
        }
    }
}

pub struct MsvcMangler<'a> {
    types: TypeInterner<'a>,
    target: &'a TargetInfo,
    dialect: MsvcDialect,
    idents: SubstitutionTable<String>,
    saved_types: SubstitutionTable<TypeId>,
    buf: String,
}

impl<'a> MsvcMangler<'a> {
    pub fn new(defs: &'a Definitions, target: &'a TargetInfo) -> Self {
        Self {
            types: TypeInterner::new(defs),
            target,
            dialect: target.msvc_dialect().unwrap_or(MsvcDialect::Modern),
            idents: SubstitutionTable::bounded("msvc idents", SAVED_IDENTS),
            saved_types: SubstitutionTable::bounded("msvc types", SAVED_TYPES),
            buf: String::new(),
        }
    }

    pub fn mangle_of(mut self, sym: SymbolId) -> Result<String> {
        match &self.defs().symbol(sym).kind {
            SymbolKind::Variable(_) => self.mangle_variable(sym)?,
            SymbolKind::Function(_) => self.mangle_function(sym)?,
            _ => return Err(MangleError::unsupported_symbol(self.defs(), sym)),
        }
        Ok(self.buf)
    }

    const fn defs(&self) -> &'a Definitions {
        self.types.defs()
    }

    fn legacy(&self) -> bool {
        self.dialect == MsvcDialect::Legacy
    }

    /// Renders into a scratch buffer. The back-reference tables stay shared, so whatever the fragment records is
    /// visible to everything written after it.
    fn detached(&mut self, render: impl FnOnce(&mut Self) -> Result<()>) -> Result<String> {
        let outer = core::mem::take(&mut self.buf);
        let res = render(self);
        let text = core::mem::replace(&mut self.buf, outer);
        res.map(|()| text)
    }

    fn check_type_saved(&mut self, id: TypeId, mode: Mode) -> bool {
        if mode.nested || mode.return_type {
            return false;
        }
        match self.saved_types.find_or_insert(id) {
            Some(index) => {
                emit(&mut self.buf, BackRef(index));
                true
            }
            None => false,
        }
    }

    fn mangle_modifier(&mut self, ty: &Type, mode: Mode) {
        if mode.ignore_const {
            return;
        }
        if ty.is_const() {
            if mode.nested {
                self.buf.push('B');
            } else if self.legacy() && !matches!(ty.kind, TypeKind::Pointer(_)) {
                self.buf.push_str("_O");
            }
        } else if mode.nested {
            self.buf.push('A');
        }
    }

    fn pointer_width(&mut self) {
        if self.target.is_64bit() {
            self.buf.push('E');
        }
    }

    fn basic_code(&self, kind: BasicKind) -> Option<&'static str> {
        Some(match kind {
            BasicKind::Void => "X",
            BasicKind::Int8 => "C",
            BasicKind::UInt8 => "E",
            BasicKind::Int16 => "F",
            BasicKind::UInt16 | BasicKind::WChar => "G",
            BasicKind::Int32 => "H",
            BasicKind::UInt32 => "I",
            BasicKind::Float32 => "M",
            BasicKind::Int64 => "_J",
            BasicKind::UInt64 => "_K",
            BasicKind::Float64 => "N",
            BasicKind::Bool => "_N",
            BasicKind::Char => "D",
            BasicKind::Float80 if self.legacy() => "_Z",
            BasicKind::Float80 => "_T",
            BasicKind::DChar if self.legacy() => "_Y",
            BasicKind::DChar => "_W",
            _ => return None,
        })
    }

    fn mangle_type(&mut self, id: TypeId, mode: Mode) -> Result<()> {
        let ty = self.types.get(id);
        if ty.has_foreign_qualifiers() {
            return Err(MangleError::unsupported_type(
                &self.types,
                id,
                "shared or immutable types can not be mapped to C++",
            ));
        }

        match &ty.kind {
            TypeKind::Basic(kind) => {
                let Some(code) = self.basic_code(*kind) else {
                    return Err(MangleError::unsupported_type(&self.types, id, "no C++ builtin"));
                };
                let saveable =
                    (ty.is_const() && (mode.nested || self.legacy())) || *kind == BasicKind::Bool;
                if saveable && self.check_type_saved(id, mode) {
                    return Ok(());
                }
                self.mangle_modifier(&ty, mode);
                self.buf.push_str(code);
            }
            TypeKind::Vector(_) => {
                if self.check_type_saved(id, mode) {
                    return Ok(());
                }
                self.buf.push_str("T__m128@@");
            }
            // Only reachable for variables: the first dimension is a const pointer
            TypeKind::StaticArray { elem, .. } => {
                if self.check_type_saved(id, mode) {
                    return Ok(());
                }
                self.buf.push(if self.legacy() { 'Q' } else { 'P' });
                self.mangle_element(*elem, mode.nested())?;
            }
            TypeKind::Pointer(next) => {
                let next = *next;
                match self.types.get(next).kind {
                    TypeKind::Function(_) => {
                        // The signature's own entries are recorded ahead of the pointer
                        let sig = self.detached(|m| m.mangle_function_type(next, false, false))?;
                        if self.check_type_saved(id, mode) {
                            return Ok(());
                        }
                        self.buf.push(if ty.is_const() { 'Q' } else { 'P' });
                        self.buf.push('6');
                        self.buf.push_str(&sig);
                    }
                    TypeKind::StaticArray { .. } => {
                        if self.check_type_saved(id, mode) {
                            return Ok(());
                        }
                        self.mangle_modifier(&ty, mode);
                        self.buf
                            .push(if ty.is_const() || !self.legacy() { 'Q' } else { 'P' });
                        self.pointer_width();
                        self.mangle_array(next, mode.nested())?;
                    }
                    _ => {
                        if self.check_type_saved(id, mode) {
                            return Ok(());
                        }
                        self.mangle_modifier(&ty, mode);
                        self.buf.push(if ty.is_const() { 'Q' } else { 'P' });
                        self.pointer_width();
                        self.mangle_type(next, mode.nested())?;
                    }
                }
            }
            TypeKind::Reference(next) => {
                if self.check_type_saved(id, mode) {
                    return Ok(());
                }
                self.buf.push('A');
                self.pointer_width();
                self.mangle_element(*next, mode.nested())?;
            }
            TypeKind::Struct(sym) => {
                if self.check_type_saved(id, mode) {
                    return Ok(());
                }
                self.mangle_modifier(&ty, mode);
                let union = matches!(
                    self.defs().symbol(*sym).kind,
                    SymbolKind::Aggregate(AggregateKind::Union)
                );
                self.buf.push(if union { 'T' } else { 'U' });
                self.mangle_ident(*sym, false)?;
            }
            TypeKind::Enum { sym, base } => {
                if self.check_type_saved(id, mode) {
                    return Ok(());
                }
                self.mangle_modifier(&ty, mode);
                let width = match base {
                    BasicKind::Char | BasicKind::Int8 => '0',
                    BasicKind::UInt8 => '1',
                    BasicKind::Int16 => '2',
                    BasicKind::UInt16 => '3',
                    BasicKind::Int32 => '4',
                    BasicKind::UInt32 => '5',
                    BasicKind::Int64 => '6',
                    BasicKind::UInt64 => '7',
                    _ => {
                        return Err(MangleError::unsupported_type(
                            &self.types,
                            id,
                            "the enum's base type has no C++ enum encoding",
                        ))
                    }
                };
                self.buf.push('W');
                self.buf.push(width);
                self.mangle_ident(*sym, false)?;
            }
            // const(Object) is `Object const * const`
            TypeKind::Class(sym) => {
                if self.check_type_saved(id, mode) {
                    return Ok(());
                }
                if mode.nested {
                    self.mangle_modifier(&ty, mode);
                }
                self.buf.push(if ty.is_const() { 'Q' } else { 'P' });
                self.pointer_width();
                self.mangle_modifier(&ty, mode.nested());
                self.buf.push('V');
                self.mangle_ident(*sym, false)?;
            }
            TypeKind::Function(_) => {
                return Err(MangleError::unsupported_type(
                    &self.types,
                    id,
                    "only pointers to functions can be mapped to C++",
                ))
            }
            TypeKind::DynamicArray(_)
            | TypeKind::AssocArray { .. }
            | TypeKind::Delegate(_)
            | TypeKind::Typedef(_) => {
                return Err(MangleError::unsupported_type(
                    &self.types,
                    id,
                    "no C++ counterpart",
                ))
            }
        }
        Ok(())
    }

    /// The target of a pointer, reference or array: nested arrays fold into one multi-dimensional encoding.
    fn mangle_element(&mut self, id: TypeId, mode: Mode) -> Result<()> {
        if let TypeKind::StaticArray { .. } = self.types.get(id).kind {
            self.mangle_array(id, mode)
        } else {
            self.mangle_type(id, mode)
        }
    }

    fn mangle_array(&mut self, id: TypeId, mode: Mode) -> Result<()> {
        let ty = self.types.get(id);
        self.mangle_modifier(&ty, mode);

        let mut dims = Vec::new();
        let mut cur = id;
        while let TypeKind::StaticArray { dim, elem } = self.types.get(cur).kind {
            dims.push(dim);
            cur = elem;
        }

        self.buf.push('Y');
        emit(&mut self.buf, Number(dims.len() as u128));
        for dim in dims {
            emit(&mut self.buf, Number(u128::from(dim)));
        }
        self.mangle_type(
            cur,
            Mode {
                ignore_const: true,
                ..mode
            },
        )
    }

    /// Calling convention, return type and parameter list of the function type `fn_ty`.
    fn mangle_function_type(&mut self, fn_ty: TypeId, needs_this: bool, no_return: bool) -> Result<()> {
        let TypeKind::Function(sig) = self.types.get(fn_ty).kind else {
            return Err(MangleError::unsupported_type(
                &self.types,
                fn_ty,
                "a function must have a function type",
            ));
        };

        // x64 has a single calling convention
        let convention = if self.target.is_64bit() {
            'A'
        } else {
            match sig.linkage {
                Linkage::C => 'A',
                Linkage::Cpp if needs_this && !sig.variadic => 'E',
                Linkage::Cpp => 'A',
                Linkage::Windows => 'G',
                Linkage::Pascal => 'C',
                Linkage::D => {
                    return Err(MangleError::unsupported_type(
                        &self.types,
                        fn_ty,
                        "extern(D) functions have no C++ calling convention",
                    ))
                }
            }
        };
        self.buf.push(convention);

        if no_return {
            self.buf.push('@');
        } else {
            let ret = if sig.ref_return {
                self.types.reference_to(sig.ret)
            } else {
                sig.ret
            };
            if let TypeKind::Struct(_) | TypeKind::Enum { .. } = self.types.get(ret).kind {
                self.buf.push_str("?A");
            }
            self.mangle_type(
                ret,
                Mode {
                    return_type: true,
                    ..Mode::TOP
                },
            )?;
        }

        if sig.params.is_empty() {
            self.buf.push(if sig.variadic { 'Z' } else { 'X' });
        } else {
            for param in &sig.params {
                self.mangle_parameter(param)?;
            }
            self.buf.push(if sig.variadic { 'Z' } else { '@' });
        }
        self.buf.push('Z');
        Ok(())
    }

    fn mangle_parameter(&mut self, param: &Param) -> Result<()> {
        let ty = match param.storage {
            ParamStorage::Value => param.ty,
            ParamStorage::Ref | ParamStorage::Out => self.types.reference_to(param.ty),
            ParamStorage::Lazy => self.types.lazy_thunk(param.ty),
        };
        if let TypeKind::StaticArray { .. } = self.types.get(ty).kind {
            return Err(MangleError::unsupported_type(
                &self.types,
                ty,
                "static arrays can not be passed by value to C++ functions, use a pointer instead",
            ));
        }
        self.mangle_type(ty, Mode::TOP)
    }

    fn mangle_function(&mut self, sym: SymbolId) -> Result<()> {
        let defs = self.defs();
        let symbol = defs.symbol(sym);
        let Some(func) = symbol.as_function() else {
            return Err(MangleError::unsupported_symbol(defs, sym));
        };

        self.buf.push('?');
        self.mangle_ident(sym, false)?;

        if func.needs_this {
            self.buf.push(match (func.is_virtual, symbol.protection) {
                (true, Protection::Private) => 'E',
                (true, Protection::Protected) => 'M',
                (true, Protection::Public) => 'U',
                (false, Protection::Private) => 'A',
                (false, Protection::Protected) => 'I',
                (false, Protection::Public) => 'Q',
            });
            self.pointer_width();
            self.buf.push(if func.is_const { 'B' } else { 'A' });
        } else if symbol
            .parent
            .is_some_and(|p| matches!(defs.symbol(p).kind, SymbolKind::Aggregate(_)))
        {
            self.buf.push(match symbol.protection {
                Protection::Private => 'C',
                Protection::Protected => 'K',
                Protection::Public => 'S',
            });
        } else {
            self.buf.push('Y');
        }

        let structor = matches!(func.kind, FunctionKind::Constructor | FunctionKind::Destructor);
        self.mangle_function_type(func.ty, func.needs_this, structor)
    }

    fn mangle_variable(&mut self, sym: SymbolId) -> Result<()> {
        let defs = self.defs();
        let symbol = defs.symbol(sym);
        let Some(var) = symbol.as_variable() else {
            return Err(MangleError::unsupported_symbol(defs, sym));
        };
        if !var
            .storage
            .intersects(StorageClass::EXTERN | StorageClass::GSHARED)
        {
            return Err(MangleError::unsupported_storage(defs, sym));
        }

        self.buf.push('?');
        self.mangle_ident(sym, false)?;

        let global = symbol.parent.map_or(true, |p| defs.symbol(p).is_module());
        self.buf.push(match symbol.protection {
            _ if global => '3',
            Protection::Private => '0',
            Protection::Protected => '1',
            Protection::Public => '2',
        });

        let ty = self.types.get(var.ty);
        if ty.has_foreign_qualifiers() {
            return Err(MangleError::unsupported_type(
                &self.types,
                var.ty,
                "shared or immutable types can not be mapped to C++",
            ));
        }
        // The outermost qualifier trails the type
        let cv = if ty.is_const() { 'B' } else { 'A' };
        let indirect = matches!(ty.kind, TypeKind::Pointer(_) | TypeKind::Reference(_));
        let written = if let TypeKind::Pointer(_) = ty.kind {
            var.ty
        } else {
            self.types.mutable_of(var.ty)
        };

        self.mangle_type(written, Mode::TOP)?;
        if indirect {
            self.pointer_width();
        }
        self.buf.push(cv);
        Ok(())
    }

    /// One level of a qualified name, compressed as a whole.
    fn mangle_name(&mut self, sym: SymbolId, no_backref: bool) -> Result<()> {
        let symbol = self.defs().symbol(sym);
        if symbol
            .as_function()
            .is_some_and(|func| func.kind == FunctionKind::Destructor)
        {
            self.buf.push_str("?1");
            return Ok(());
        }

        let (name, dmc_template) = match symbol.as_template_instance() {
            Some(inst) => (
                self.detached(|m| m.template_name(sym, inst))?,
                self.legacy(),
            ),
            None => (symbol.ident.clone(), false),
        };

        if !dmc_template {
            if no_backref {
                self.idents.insert_unique(name.clone());
            } else if let Some(index) = self.idents.find_or_insert(name.clone()) {
                emit(&mut self.buf, BackRef(index));
                return Ok(());
            }
        }
        self.buf.push_str(&name);
        self.buf.push('@');
        Ok(())
    }

    /// `?$<name>@<args>`, without the closing `@`.
    fn template_name(&mut self, sym: SymbolId, inst: &TemplateInstance) -> Result<()> {
        let symbol = self.defs().symbol(sym);
        self.buf.push_str("?$");
        self.buf.push_str(&symbol.ident);
        self.buf.push('@');
        if self.legacy() {
            if let Some(parent) = symbol.parent {
                self.mangle_ident(parent, true)?;
            }
        }

        for (i, arg) in inst.args.iter().enumerate() {
            match arg {
                TemplateArg::Variadic(pack) => {
                    if i + 1 != inst.args.len() {
                        return Err(MangleError::unsupported_arg(
                            self.defs(),
                            sym,
                            arg,
                            "a parameter pack must be the last template argument",
                        ));
                    }
                    for arg in pack {
                        self.template_arg(sym, arg)?;
                    }
                }
                arg => self.template_arg(sym, arg)?,
            }
        }
        Ok(())
    }

    fn template_arg(&mut self, owner: SymbolId, arg: &TemplateArg) -> Result<()> {
        let defs = self.defs();
        match arg {
            TemplateArg::Type(ty) => self.mangle_type(*ty, Mode::TOP),
            TemplateArg::Value { ty, value } => {
                let kind = match self.types.get(*ty).kind {
                    TypeKind::Basic(kind) | TypeKind::Enum { base: kind, .. }
                        if kind.is_integral() =>
                    {
                        kind
                    }
                    _ => {
                        return Err(MangleError::unsupported_arg(
                            defs,
                            owner,
                            arg,
                            "only integral value parameters are supported",
                        ))
                    }
                };
                self.buf.push_str("$0");
                let magnitude = if kind == BasicKind::UInt128 {
                    *value as u128
                } else if kind.is_unsigned() {
                    u128::from(*value as u64)
                } else {
                    if *value < 0 {
                        self.buf.push('?');
                    }
                    value.unsigned_abs()
                };
                emit(&mut self.buf, Number(magnitude));
                Ok(())
            }
            TemplateArg::Alias(AliasTarget::Symbol(target)) => match &defs.symbol(*target).kind {
                SymbolKind::Function(_) => {
                    self.buf.push_str("$1");
                    self.mangle_function(*target)
                }
                SymbolKind::Variable(_) => {
                    self.buf.push_str(if self.legacy() { "$1" } else { "$E" });
                    self.mangle_variable(*target)
                }
                SymbolKind::TemplateDecl(decl) if decl.one_member.is_some() => {
                    let letter = if self.legacy() {
                        'V'
                    } else {
                        match decl.one_member.map(|m| &defs.symbol(m).kind) {
                            Some(SymbolKind::Aggregate(AggregateKind::Union)) => 'T',
                            Some(SymbolKind::Aggregate(AggregateKind::Struct)) => 'U',
                            Some(SymbolKind::Aggregate(AggregateKind::Class)) => 'V',
                            _ => {
                                return Err(MangleError::unsupported_arg(
                                    defs,
                                    owner,
                                    arg,
                                    "an alias template must declare a struct, union or class",
                                ))
                            }
                        }
                    };
                    self.buf.push(letter);
                    self.mangle_ident(*target, false)
                }
                _ => Err(MangleError::unsupported_arg(
                    defs,
                    owner,
                    arg,
                    "an alias parameter must name a function, a variable or an eponymous template",
                )),
            },
            TemplateArg::Alias(AliasTarget::Type(_)) => Err(MangleError::unsupported_arg(
                defs,
                owner,
                arg,
                "an alias parameter must name a function, a variable or an eponymous template",
            )),
            TemplateArg::Variadic(_) => Err(MangleError::unsupported_arg(
                defs,
                owner,
                arg,
                "parameter packs do not nest",
            )),
        }
    }

    /// The qualified name of `sym`, innermost level first, up to the enclosing module.
    fn mangle_ident(&mut self, sym: SymbolId, no_backref: bool) -> Result<()> {
        let defs = self.defs();
        // A template's eponymous member is named by its instance
        let through_instance = |sym: SymbolId| match defs.symbol(sym).parent {
            Some(parent) if defs.symbol(parent).as_template_instance().is_some() => parent,
            _ => sym,
        };

        let mut cur = Some(through_instance(sym));
        while let Some(level) = cur.filter(|level| !defs.symbol(*level).is_module()) {
            self.mangle_name(level, no_backref)?;
            cur = defs.symbol(level).parent.map(through_instance);
        }
        if !no_backref {
            self.buf.push('@');
        }
        Ok(())
    }
}
