//! Itanium C++ ABI encoder (the ELF and Mach-O spelling).
//!
//! Follows the ABI's substitution rules: names become substitutable as soon as they are known, compound types
//! only once they have been fully written. Only the pieces of `<mangled-name>` that foreign-linkage declarations
//! can produce are implemented; there are no operator names, special names or local names.

use core::fmt::Write;

use crate::defs::{
    AliasTarget, Definitions, FunctionKind, StorageClass, SymbolId, SymbolKind, TemplateArg,
    TypeInterner,
};
use crate::error::{MangleError, Result};
use crate::subst::{emit, Mangle, SourceName, Substitution, SubstitutionTable};
use crate::target::TargetInfo;
use crate::ty::{BasicKind, FunctionSig, Linkage, Param, ParamStorage, TypeId, TypeKind, TypeLookup};

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum BuiltinType {
    Void,
    WCharT,
    Bool,
    Char,
    SChar,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Int128,
    UInt128,
    Float,
    Double,
    LongDouble,
    Float128,
}

impl Mangle for BuiltinType {
    fn write<W: Write>(&self, buf: &mut W) -> core::fmt::Result {
        buf.write_char(match self {
            Self::Void => 'v',
            Self::WCharT => 'w',
            Self::Bool => 'b',
            Self::Char => 'c',
            Self::SChar => 'a',
            Self::UChar => 'h',
            Self::Short => 's',
            Self::UShort => 't',
            Self::Int => 'i',
            Self::UInt => 'j',
            Self::Long => 'l',
            Self::ULong => 'm',
            Self::LongLong => 'x',
            Self::ULongLong => 'y',
            Self::Int128 => 'n',
            Self::UInt128 => 'o',
            Self::Float => 'f',
            Self::Double => 'd',
            Self::LongDouble => 'e',
            Self::Float128 => 'g',
        })
    }
}

/// A builtin, possibly under one of the GNU vendor prefixes for complex and imaginary types.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum Builtin {
    Plain(BuiltinType),
    Complex(BuiltinType),
    Imaginary(BuiltinType),
}

impl Builtin {
    /// Whether the ABI considers the type substitutable even without qualifiers.
    const fn is_vendor_extended(self) -> bool {
        !matches!(self, Self::Plain(_))
    }

    pub const fn of(kind: BasicKind, target: &TargetInfo) -> Self {
        let long64 = target.longbits == 64;
        let quad_real = target.realsize.saturating_sub(target.realpad) == 16;
        match kind {
            BasicKind::Void => Self::Plain(BuiltinType::Void),
            BasicKind::Bool => Self::Plain(BuiltinType::Bool),
            BasicKind::Char => Self::Plain(BuiltinType::Char),
            BasicKind::WChar => Self::Plain(BuiltinType::UShort),
            BasicKind::DChar => Self::Plain(BuiltinType::WCharT),
            BasicKind::Int8 => Self::Plain(BuiltinType::SChar),
            BasicKind::UInt8 => Self::Plain(BuiltinType::UChar),
            BasicKind::Int16 => Self::Plain(BuiltinType::Short),
            BasicKind::UInt16 => Self::Plain(BuiltinType::UShort),
            BasicKind::Int32 => Self::Plain(BuiltinType::Int),
            BasicKind::UInt32 => Self::Plain(BuiltinType::UInt),
            BasicKind::Int64 if long64 => Self::Plain(BuiltinType::Long),
            BasicKind::Int64 => Self::Plain(BuiltinType::LongLong),
            BasicKind::UInt64 if long64 => Self::Plain(BuiltinType::ULong),
            BasicKind::UInt64 => Self::Plain(BuiltinType::ULongLong),
            BasicKind::Int128 => Self::Plain(BuiltinType::Int128),
            BasicKind::UInt128 => Self::Plain(BuiltinType::UInt128),
            BasicKind::Float32 => Self::Plain(BuiltinType::Float),
            BasicKind::Float64 => Self::Plain(BuiltinType::Double),
            BasicKind::Float80 if quad_real => Self::Plain(BuiltinType::Float128),
            BasicKind::Float80 => Self::Plain(BuiltinType::LongDouble),
            BasicKind::Imaginary32 => Self::Imaginary(BuiltinType::Float),
            BasicKind::Imaginary64 => Self::Imaginary(BuiltinType::Double),
            BasicKind::Imaginary80 => Self::Imaginary(BuiltinType::LongDouble),
            BasicKind::Complex32 => Self::Complex(BuiltinType::Float),
            BasicKind::Complex64 => Self::Complex(BuiltinType::Double),
            BasicKind::Complex80 => Self::Complex(BuiltinType::LongDouble),
        }
    }
}

impl Mangle for Builtin {
    fn write<W: Write>(&self, buf: &mut W) -> core::fmt::Result {
        match self {
            Self::Plain(ty) => ty.write(buf),
            Self::Complex(ty) => {
                buf.write_char('C')?;
                ty.write(buf)
            }
            Self::Imaginary(ty) => {
                buf.write_char('G')?;
                ty.write(buf)
            }
        }
    }
}

/// An entry of the substitution table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Component {
    Symbol(SymbolId),
    Type(TypeId),
    /// Occupies a slot the ABI counts but nothing here refers back to
    Anonymous,
}

/// Where a type is being written. The outermost type of a parameter does not spell its own `const`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Position {
    TopLevel,
    Nested,
}

pub struct ItaniumMangler<'a> {
    types: TypeInterner<'a>,
    target: &'a TargetInfo,
    components: SubstitutionTable<Component>,
    buf: String,
}

impl<'a> ItaniumMangler<'a> {
    pub fn new(defs: &'a Definitions, target: &'a TargetInfo) -> Self {
        Self {
            types: TypeInterner::new(defs),
            target,
            components: SubstitutionTable::unbounded("itanium"),
            buf: String::new(),
        }
    }

    pub fn mangle_of(mut self, sym: SymbolId) -> Result<String> {
        match &self.defs().symbol(sym).kind {
            SymbolKind::Variable(_) => self.mangle_variable(sym, false)?,
            SymbolKind::Function(_) => self.mangle_function(sym)?,
            _ => return Err(MangleError::unsupported_symbol(self.defs(), sym)),
        }
        Ok(self.buf)
    }

    const fn defs(&self) -> &'a Definitions {
        self.types.defs()
    }

    fn substitute(&mut self, component: Component) -> bool {
        match self.components.find(&component) {
            Some(index) => {
                emit(&mut self.buf, Substitution::for_index(index));
                true
            }
            None => false,
        }
    }

    fn exist(&self, component: Component) -> bool {
        self.components.contains(&component)
    }

    fn store(&mut self, component: Component) {
        self.components.push(component);
    }

    fn signature(&self, ty: TypeId) -> Result<FunctionSig> {
        match self.types.get(ty).kind {
            TypeKind::Function(sig) => Ok(sig),
            _ => Err(MangleError::unsupported_type(
                &self.types,
                ty,
                "a function must have a function type",
            )),
        }
    }

    fn source_name(&mut self, sym: SymbolId) -> Result<()> {
        let symbol = self.defs().symbol(sym);
        let Some(inst) = symbol.as_template_instance() else {
            emit(&mut self.buf, SourceName(&symbol.ident));
            return Ok(());
        };

        if !self.substitute(Component::Symbol(inst.decl)) {
            self.store(Component::Symbol(inst.decl));
            emit(&mut self.buf, SourceName(&symbol.ident));
        }
        self.buf.push('I');
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
                    self.buf.push('I');
                    for arg in pack {
                        self.template_arg(sym, arg)?;
                    }
                    self.buf.push('E');
                }
                arg => self.template_arg(sym, arg)?,
            }
        }
        self.buf.push('E');
        Ok(())
    }

    fn template_arg(&mut self, owner: SymbolId, arg: &TemplateArg) -> Result<()> {
        let defs = self.defs();
        match arg {
            TemplateArg::Type(ty) => self.mangle_type(*ty, Position::Nested),
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
                // <expr-primary> ::= L <type> <value number> E
                self.buf.push('L');
                self.mangle_type(*ty, Position::Nested)?;
                if kind == BasicKind::UInt128 {
                    let _ = write!(self.buf, "{}", *value as u128);
                } else if kind.is_unsigned() {
                    let _ = write!(self.buf, "{}", *value as u64);
                } else {
                    if *value < 0 {
                        self.buf.push('n');
                    }
                    let _ = write!(self.buf, "{}", value.unsigned_abs());
                }
                self.buf.push('E');
                Ok(())
            }
            TemplateArg::Alias(AliasTarget::Symbol(target)) => match &defs.symbol(*target).kind {
                SymbolKind::Function(func) => {
                    let nested = self.types.scope_parent(*target).is_some()
                        && self.signature(func.ty)?.linkage == Linkage::Cpp;
                    if nested {
                        self.buf.push('X');
                    }
                    self.buf.push('L');
                    self.mangle_function(*target)?;
                    self.buf.push('E');
                    if nested {
                        self.buf.push('E');
                    }
                    Ok(())
                }
                SymbolKind::Variable(_) => {
                    self.buf.push('L');
                    self.mangle_variable(*target, true)?;
                    self.buf.push('E');
                    Ok(())
                }
                SymbolKind::TemplateDecl(decl) if decl.one_member.is_some() => {
                    if !self.substitute(Component::Symbol(*target)) {
                        self.cpp_mangle_name(*target)?;
                        self.store(Component::Symbol(*target));
                    }
                    Ok(())
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

    fn prefix_name(&mut self, sym: SymbolId) -> Result<()> {
        if self.substitute(Component::Symbol(sym)) {
            return Ok(());
        }
        self.store(Component::Symbol(sym));

        let defs = self.defs();
        let mut name = sym;
        let mut parent = defs.symbol(sym).parent;
        if let Some(p) = parent {
            if let Some(inst) = defs.symbol(p).as_template_instance() {
                name = p;
                // A known template already implies its scope
                parent = if self.exist(Component::Symbol(inst.decl)) {
                    None
                } else {
                    defs.symbol(p).parent
                };
            }
        }

        if let Some(p) = parent.filter(|p| !defs.symbol(*p).is_module()) {
            self.prefix_name(p)?;
        }
        self.source_name(name)
    }

    fn cpp_mangle_name(&mut self, sym: SymbolId) -> Result<()> {
        let defs = self.defs();
        let mut name = sym;
        let mut parent = defs.symbol(sym).parent;
        let mut write_prefix = true;
        if let Some(p) = parent {
            if let Some(inst) = defs.symbol(p).as_template_instance() {
                name = p;
                write_prefix = !self.exist(Component::Symbol(inst.decl));
                parent = defs.symbol(p).parent;
            }
        }

        match parent.filter(|p| !defs.symbol(*p).is_module()) {
            Some(p) => {
                self.buf.push('N');
                if write_prefix {
                    self.prefix_name(p)?;
                }
                self.source_name(name)?;
                self.buf.push('E');
                Ok(())
            }
            None => self.source_name(name),
        }
    }

    fn mangle_variable(&mut self, sym: SymbolId, template_arg: bool) -> Result<()> {
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

        match self.types.scope_parent(sym) {
            // char Namespace1::beta[6] is _ZN10Namespace14betaE
            Some(parent) => {
                self.buf.push_str(self.target.itanium_prefix());
                self.buf.push('N');
                self.prefix_name(parent)?;
                self.source_name(sym)?;
                self.buf.push('E');
            }
            None if template_arg => {
                self.buf.push_str(self.target.itanium_prefix());
                self.source_name(sym)?;
            }
            // char beta[6] is just beta
            None => {
                if self.target.mach_o {
                    self.buf.push('_');
                }
                self.buf.push_str(&symbol.ident);
            }
        }
        Ok(())
    }

    fn mangle_function(&mut self, sym: SymbolId) -> Result<()> {
        let defs = self.defs();
        let Some(func) = defs.symbol(sym).as_function() else {
            return Err(MangleError::unsupported_symbol(defs, sym));
        };
        let sig = self.signature(func.ty)?;
        let cpp = sig.linkage == Linkage::Cpp;

        self.buf.push_str(self.target.itanium_prefix());
        match self.types.scope_parent(sym).filter(|_| cpp) {
            Some(parent) => {
                self.buf.push('N');
                if func.is_const {
                    self.buf.push('K');
                }
                self.prefix_name(parent)?;
                if func.kind == FunctionKind::Destructor {
                    self.buf.push_str("D1");
                } else {
                    self.source_name(sym)?;
                }
                self.buf.push('E');
            }
            None => self.source_name(sym)?,
        }

        // extern(C) functions reached through template arguments get no parameter list
        if cpp {
            self.mangle_params(&sig.params, sig.variadic)?;
        }
        Ok(())
    }

    fn mangle_params(&mut self, params: &[Param], variadic: bool) -> Result<()> {
        for param in params {
            let ty = match param.storage {
                ParamStorage::Value => param.ty,
                ParamStorage::Ref | ParamStorage::Out => self.types.reference_to(param.ty),
                ParamStorage::Lazy => self.types.lazy_thunk(param.ty),
            };
            let node = self.types.get(ty);
            if let TypeKind::StaticArray { .. } = node.kind {
                return Err(MangleError::unsupported_type(
                    &self.types,
                    ty,
                    "static arrays can not be passed by value to C++ functions, use a pointer instead",
                ));
            }

            // A top-level const is not part of the signature
            let ty = if node.is_const()
                && matches!(
                    node.kind,
                    TypeKind::Basic(_)
                        | TypeKind::Enum { .. }
                        | TypeKind::Struct(_)
                        | TypeKind::Pointer(_)
                ) {
                self.types.mutable_of(ty)
            } else {
                ty
            };
            self.mangle_type(ty, Position::TopLevel)?;
        }

        if variadic {
            self.buf.push('z');
        } else if params.is_empty() {
            self.buf.push('v');
        }
        Ok(())
    }

    fn mangle_type(&mut self, id: TypeId, pos: Position) -> Result<()> {
        let ty = self.types.get(id);
        if ty.has_foreign_qualifiers() {
            return Err(MangleError::unsupported_type(
                &self.types,
                id,
                "shared or immutable types can not be mapped to C++",
            ));
        }
        let is_const = ty.is_const();

        match ty.kind {
            TypeKind::Basic(kind) => {
                let builtin = Builtin::of(kind, self.target);
                // Plain builtins are never substituted
                if builtin.is_vendor_extended() || is_const {
                    if self.substitute(Component::Type(id)) {
                        return Ok(());
                    }
                    self.store(Component::Type(id));
                }
                if is_const {
                    self.buf.push('K');
                }
                emit(&mut self.buf, builtin);
            }
            TypeKind::Vector(elem) => {
                if self.substitute(Component::Type(id)) {
                    return Ok(());
                }
                if is_const {
                    self.buf.push('K');
                }
                // GNU ABI v3 spelling; the element count is not encoded
                self.buf.push_str("U8__vector");
                self.mangle_type(elem, Position::Nested)?;
                self.store(Component::Type(id));
            }
            TypeKind::StaticArray { dim, elem } => {
                if self.substitute(Component::Type(id)) {
                    return Ok(());
                }
                if is_const {
                    self.buf.push('K');
                }
                let _ = write!(self.buf, "A{dim}_");
                self.mangle_type(elem, Position::Nested)?;
                self.store(Component::Type(id));
            }
            TypeKind::Pointer(next) => {
                if self.substitute(Component::Type(id)) {
                    return Ok(());
                }
                if is_const {
                    self.buf.push('K');
                }
                self.buf.push('P');
                self.mangle_type(next, Position::Nested)?;
                self.store(Component::Type(id));
            }
            TypeKind::Reference(next) => {
                if self.substitute(Component::Type(id)) {
                    return Ok(());
                }
                self.buf.push('R');
                self.mangle_type(next, Position::Nested)?;
                self.store(Component::Type(id));
            }
            TypeKind::Function(sig) => {
                // <function-type> ::= F [Y] <bare-function-type> E
                if self.substitute(Component::Type(id)) {
                    return Ok(());
                }
                self.buf.push('F');
                if sig.linkage == Linkage::C {
                    self.buf.push('Y');
                }
                let ret = if sig.ref_return {
                    self.types.reference_to(sig.ret)
                } else {
                    sig.ret
                };
                self.mangle_type(ret, Position::Nested)?;
                self.mangle_params(&sig.params, sig.variadic)?;
                self.buf.push('E');
                self.store(Component::Type(id));
            }
            TypeKind::Struct(sym) | TypeKind::Enum { sym, .. } => {
                if self.substitute(Component::Type(id)) {
                    return Ok(());
                }
                if is_const {
                    self.buf.push('K');
                }
                if !self.substitute(Component::Symbol(sym)) {
                    self.cpp_mangle_name(sym)?;
                    self.store(Component::Symbol(sym));
                }
                if is_const {
                    self.store(Component::Type(id));
                }
            }
            TypeKind::Class(sym) => {
                // A class reference is a pointer to the record, `P[K]<name>`, with no `V`
                if self.substitute(Component::Type(id)) {
                    return Ok(());
                }
                if is_const && pos == Position::Nested {
                    self.buf.push('K');
                }
                self.buf.push('P');
                if is_const {
                    self.buf.push('K');
                }
                if !self.substitute(Component::Symbol(sym)) {
                    self.cpp_mangle_name(sym)?;
                    self.store(Component::Symbol(sym));
                }
                // The const class itself, as distinct from the pointer to it
                if is_const {
                    self.store(Component::Anonymous);
                }
                self.store(Component::Type(id));
            }
            TypeKind::DynamicArray(_)
            | TypeKind::AssocArray { .. }
            | TypeKind::Delegate(_)
            | TypeKind::Typedef(_) => {
                return Err(MangleError::unsupported_type(
                    &self.types,
                    id,
                    "no C++ counterpart",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::defs::{AggregateKind, Function};
    use crate::ty::Qualifiers;

    struct Fixture {
        defs: Definitions,
        module: SymbolId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut defs = Definitions::new();
            let module = defs.module("app");
            Self { defs, module }
        }

        fn basic(&mut self, kind: BasicKind) -> TypeId {
            self.defs.basic(kind)
        }

        fn void(&mut self) -> TypeId {
            self.defs.basic(BasicKind::Void)
        }

        fn cpp_fn(&mut self, name: &str, parent: SymbolId, ret: TypeId, params: &[TypeId]) -> SymbolId {
            let params = params.iter().copied().map(Param::value).collect();
            let ty = self.defs.function_type(FunctionSig::cpp(ret, params));
            self.defs.function(name, parent, Function::new(ty))
        }

        fn struct_named(&mut self, name: &str, parent: SymbolId) -> TypeId {
            let sym = self.defs.aggregate(name, AggregateKind::Struct, parent);
            self.defs.struct_type(sym)
        }

        /// `template name(params...) { struct name {} }` instantiated with `args`; returns the struct type.
        fn template_struct(&mut self, name: &str, args: Vec<TemplateArg>) -> TypeId {
            let decl = self.defs.template_decl(name, self.module);
            self.instance_struct(decl, args)
        }

        fn instance_struct(&mut self, decl: SymbolId, args: Vec<TemplateArg>) -> TypeId {
            let name = self.defs.symbol(decl).ident.clone();
            let inst = self.defs.template_instance(decl, args);
            self.struct_named(&name, inst)
        }

        fn mangle(&self, sym: SymbolId) -> Result<String> {
            self.mangle_for(sym, &TargetInfo::itanium64())
        }

        fn mangle_for(&self, sym: SymbolId, target: &TargetInfo) -> Result<String> {
            ItaniumMangler::new(&self.defs, target).mangle_of(sym)
        }
    }

    #[test]
    fn free_function_without_parameters() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let foo = fx.cpp_fn("foo", fx.module, void, &[]);
        assert_eq!(fx.mangle(foo).unwrap(), "_Z3foov");
        assert_eq!(
            fx.mangle_for(foo, &TargetInfo::itanium64().with_mach_o(true)).unwrap(),
            "__Z3foov"
        );
    }

    #[test]
    fn builtin_parameters() {
        let mut fx = Fixture::new();
        let int = fx.basic(BasicKind::Int32);
        let add = fx.cpp_fn("add", fx.module, int, &[int, int]);
        assert_eq!(fx.mangle(add).unwrap(), "_Z3addii");

        let void = fx.void();
        let long = fx.basic(BasicKind::Int64);
        let ulong = fx.basic(BasicKind::UInt64);
        let real = fx.basic(BasicKind::Float80);
        let f = fx.cpp_fn("f", fx.module, void, &[long, ulong, real]);
        assert_eq!(fx.mangle(f).unwrap(), "_Z1flme");

        let ilp32 = TargetInfo::itanium64().with_longbits(32).with_real(16, 0);
        assert_eq!(fx.mangle_for(f, &ilp32).unwrap(), "_Z1fxyg");
    }

    #[test]
    fn character_types() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let params = [
            fx.basic(BasicKind::Char),
            fx.basic(BasicKind::WChar),
            fx.basic(BasicKind::DChar),
            fx.basic(BasicKind::Int8),
            fx.basic(BasicKind::UInt8),
            fx.basic(BasicKind::Bool),
        ];
        let f = fx.cpp_fn("f", fx.module, void, &params);
        assert_eq!(fx.mangle(f).unwrap(), "_Z1fctwahb");
    }

    #[test]
    fn complex_builtins_are_substitutable() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let cfloat = fx.basic(BasicKind::Complex32);
        let idouble = fx.basic(BasicKind::Imaginary64);
        let f = fx.cpp_fn("f", fx.module, void, &[cfloat, idouble, cfloat]);
        assert_eq!(fx.mangle(f).unwrap(), "_Z1fCfGdS_");
    }

    #[test]
    fn variadic_parameter_lists() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let ty = fx.defs.function_type(FunctionSig {
            variadic: true,
            ..FunctionSig::cpp(void, vec![])
        });
        let logf = fx.defs.function("logf", fx.module, Function::new(ty));
        assert_eq!(fx.mangle(logf).unwrap(), "_Z4logfz");

        let int = fx.basic(BasicKind::Int32);
        let c = fx.basic(BasicKind::Char);
        let cc = fx.defs.const_of(c);
        let fmt = fx.defs.pointer_to(cc);
        let ty = fx.defs.function_type(FunctionSig {
            variadic: true,
            ..FunctionSig::cpp(int, vec![Param::value(fmt)])
        });
        let printf = fx.defs.function("printf", fx.module, Function::new(ty));
        assert_eq!(fx.mangle(printf).unwrap(), "_Z6printfPKcz");
    }

    #[test]
    fn repeated_compound_parameter_is_back_referenced() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let foo = fx.struct_named("Foo", fx.module);
        let cfoo = fx.defs.const_of(foo);
        let ptr = fx.defs.pointer_to(cfoo);
        let f = fx.cpp_fn("foo", fx.module, void, &[ptr, ptr]);
        assert_eq!(fx.mangle(f).unwrap(), "_Z3fooPK3FooS1_");
    }

    #[test]
    fn top_level_const_is_dropped() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let int = fx.basic(BasicKind::Int32);
        let cint = fx.defs.const_of(int);
        let foo = fx.struct_named("Foo", fx.module);
        let cfoo = fx.defs.const_of(foo);
        let f = fx.cpp_fn("f", fx.module, void, &[cint, cfoo, cint]);
        assert_eq!(fx.mangle(f).unwrap(), "_Z1fi3Fooi");
    }

    #[test]
    fn ref_parameters() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let int = fx.basic(BasicKind::Int32);
        let ty = fx
            .defs
            .function_type(FunctionSig::cpp(void, vec![Param::by_ref(int), Param::by_ref(int)]));
        let f = fx.defs.function("f", fx.module, Function::new(ty));
        assert_eq!(fx.mangle(f).unwrap(), "_Z1fRiS_");
    }

    #[test]
    fn lazy_parameter_is_a_thunk_pointer() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let int = fx.basic(BasicKind::Int32);
        let ty = fx.defs.function_type(FunctionSig::cpp(
            void,
            vec![Param {
                ty: int,
                storage: ParamStorage::Lazy,
            }],
        ));
        let f = fx.defs.function("f", fx.module, Function::new(ty));
        assert_eq!(fx.mangle(f).unwrap(), "_Z1fPFivE");
    }

    #[test]
    fn namespaced_names_share_their_prefix() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let ns = fx.defs.namespace("ns", fx.module);
        let a = fx.struct_named("A", ns);
        let b = fx.struct_named("B", ns);
        let int = fx.basic(BasicKind::Int32);

        let foo = fx.cpp_fn("foo", ns, void, &[int]);
        assert_eq!(fx.mangle(foo).unwrap(), "_ZN2ns3fooEi");

        let f = fx.cpp_fn("f", ns, void, &[a, b]);
        assert_eq!(fx.mangle(f).unwrap(), "_ZN2ns1fENS_1AENS_1BE");
    }

    /// The innermost scope is recorded before the scopes enclosing it.
    #[test]
    fn nested_namespaces() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let outer = fx.defs.namespace("outer", fx.module);
        let inner = fx.defs.namespace("inner", outer);
        let s = fx.struct_named("S", inner);
        let f = fx.cpp_fn("f", inner, void, &[s]);
        assert_eq!(fx.mangle(f).unwrap(), "_ZN5outer5inner1fENS_1SE");
    }

    #[test]
    fn methods() {
        let mut fx = Fixture::new();
        let int = fx.basic(BasicKind::Int32);
        let void = fx.void();
        let s = fx.defs.aggregate("S", AggregateKind::Struct, fx.module);

        let ty = fx.defs.function_type(FunctionSig::cpp(int, vec![]));
        let get = fx.defs.function(
            "get",
            s,
            Function {
                is_const: true,
                ..Function::method(ty)
            },
        );
        assert_eq!(fx.mangle(get).unwrap(), "_ZNK1S3getEv");

        let ty = fx.defs.function_type(FunctionSig::cpp(void, vec![]));
        let dtor = fx.defs.function(
            "~this",
            s,
            Function {
                kind: FunctionKind::Destructor,
                ..Function::method(ty)
            },
        );
        assert_eq!(fx.mangle(dtor).unwrap(), "_ZN1SD1Ev");
    }

    #[test]
    fn extern_c_member_has_no_nested_name() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let ns = fx.defs.namespace("ns", fx.module);
        let ty = fx.defs.function_type(FunctionSig {
            linkage: Linkage::C,
            ..FunctionSig::cpp(void, vec![])
        });
        let f = fx.defs.function("cfunc", ns, Function::new(ty));
        assert_eq!(fx.mangle(f).unwrap(), "_Z5cfunc");
    }

    #[test]
    fn variables() {
        let mut fx = Fixture::new();
        let c = fx.basic(BasicKind::Char);
        let arr = fx.defs.static_array(c, 6);
        let ns = fx.defs.namespace("Namespace1", fx.module);

        let nested = fx.defs.variable("beta", ns, arr, StorageClass::EXTERN);
        assert_eq!(fx.mangle(nested).unwrap(), "_ZN10Namespace14betaE");

        let global = fx.defs.variable("beta", fx.module, arr, StorageClass::GSHARED);
        assert_eq!(fx.mangle(global).unwrap(), "beta");
        assert_eq!(
            fx.mangle_for(global, &TargetInfo::itanium64().with_mach_o(true)).unwrap(),
            "_beta"
        );

        let tls = fx.defs.variable("gamma", fx.module, arr, StorageClass::empty());
        assert_eq!(
            fx.mangle(tls),
            Err(MangleError::UnsupportedStorageClass {
                symbol: String::from("app.gamma")
            })
        );
    }

    #[test]
    fn pointer_to_function_parameter() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let int = fx.basic(BasicKind::Int32);
        let cb = fx.defs.function_type(FunctionSig::cpp(void, vec![Param::value(int)]));
        let cb_ptr = fx.defs.pointer_to(cb);
        let f = fx.cpp_fn("f", fx.module, void, &[cb_ptr, cb_ptr]);
        assert_eq!(fx.mangle(f).unwrap(), "_Z1fPFviES0_");

        let ccb = fx.defs.function_type(FunctionSig {
            linkage: Linkage::C,
            ..FunctionSig::cpp(void, vec![Param::value(int)])
        });
        let ccb_ptr = fx.defs.pointer_to(ccb);
        let g = fx.cpp_fn("g", fx.module, void, &[ccb_ptr]);
        assert_eq!(fx.mangle(g).unwrap(), "_Z1gPFYviE");
    }

    #[test]
    fn vectors_and_arrays() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let float = fx.basic(BasicKind::Float32);
        let vec = fx.defs.vector(float);
        let f = fx.cpp_fn("f", fx.module, void, &[vec, vec]);
        assert_eq!(fx.mangle(f).unwrap(), "_Z1fU8__vectorfS_");

        // The element is a candidate before the vector that wraps it
        let foo = fx.struct_named("Foo", fx.module);
        let foo_vec = fx.defs.vector(foo);
        let f = fx.cpp_fn("f", fx.module, void, &[foo_vec, foo, foo_vec]);
        assert_eq!(fx.mangle(f).unwrap(), "_Z1fU8__vector3FooS_S0_");

        let int = fx.basic(BasicKind::Int32);
        let arr = fx.defs.static_array(int, 4);
        let ty = fx
            .defs
            .function_type(FunctionSig::cpp(void, vec![Param::by_ref(arr)]));
        let g = fx.defs.function("g", fx.module, Function::new(ty));
        assert_eq!(fx.mangle(g).unwrap(), "_Z1gRA4_i");
    }

    #[test]
    fn classes_are_pointers() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let c = fx.defs.aggregate("C", AggregateKind::Class, fx.module);
        let c_ty = fx.defs.class_type(c);
        let f = fx.cpp_fn("f", fx.module, void, &[c_ty, c_ty]);
        assert_eq!(fx.mangle(f).unwrap(), "_Z1fP1CS0_");

        let const_c = fx.defs.const_of(c_ty);
        let g = fx.cpp_fn("g", fx.module, void, &[const_c]);
        assert_eq!(fx.mangle(g).unwrap(), "_Z1gPK1C");

        let ptr = fx.defs.pointer_to(const_c);
        let h = fx.cpp_fn("h", fx.module, void, &[ptr]);
        assert_eq!(fx.mangle(h).unwrap(), "_Z1hPKPK1C");
    }

    #[test]
    fn type_template_arguments() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let int = fx.basic(BasicKind::Int32);
        let c = fx.basic(BasicKind::Char);
        let decl = fx.defs.template_decl("Foo", fx.module);
        let foo_int = fx.instance_struct(decl, vec![TemplateArg::Type(int)]);
        let foo_char = fx.instance_struct(decl, vec![TemplateArg::Type(c)]);
        let p_int = fx.defs.pointer_to(foo_int);
        let p_char = fx.defs.pointer_to(foo_char);

        let bar = fx.cpp_fn("bar", fx.module, void, &[p_int]);
        assert_eq!(fx.mangle(bar).unwrap(), "_Z3barP3FooIiE");

        let f = fx.cpp_fn("f", fx.module, void, &[p_int, p_char]);
        assert_eq!(fx.mangle(f).unwrap(), "_Z1fP3FooIiEPS_IcE");
    }

    #[test]
    fn value_template_arguments() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let int = fx.basic(BasicKind::Int32);
        let uint = fx.basic(BasicKind::UInt32);
        let neg = fx.template_struct("Val", vec![TemplateArg::Value { ty: int, value: -5 }]);
        let pos = fx.template_struct("Uns", vec![TemplateArg::Value { ty: uint, value: 7 }]);
        let p_neg = fx.defs.pointer_to(neg);
        let p_pos = fx.defs.pointer_to(pos);

        let f = fx.cpp_fn("f", fx.module, void, &[p_neg]);
        assert_eq!(fx.mangle(f).unwrap(), "_Z1fP3ValILin5EE");
        let g = fx.cpp_fn("g", fx.module, void, &[p_pos]);
        assert_eq!(fx.mangle(g).unwrap(), "_Z1gP3UnsILj7EE");

        let float = fx.basic(BasicKind::Float32);
        let bad = fx.template_struct("Flt", vec![TemplateArg::Value { ty: float, value: 1 }]);
        let h = fx.cpp_fn("h", fx.module, void, &[bad]);
        assert!(matches!(
            fx.mangle(h),
            Err(MangleError::UnsupportedTemplateArgument { .. })
        ));
    }

    #[test]
    fn alias_template_arguments() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let int = fx.basic(BasicKind::Int32);
        let g = fx.cpp_fn("g", fx.module, void, &[]);
        let x = fx.defs.variable("x", fx.module, int, StorageClass::EXTERN);

        let holder = fx.defs.template_decl("Holder", fx.module);
        let by_fn = fx.instance_struct(holder, vec![TemplateArg::Alias(AliasTarget::Symbol(g))]);
        let by_var = fx.instance_struct(holder, vec![TemplateArg::Alias(AliasTarget::Symbol(x))]);

        let vec_decl = fx.defs.template_decl("Vec", fx.module);
        let member = fx.defs.aggregate("Vec", AggregateKind::Struct, vec_decl);
        fx.defs.set_one_member(vec_decl, member);
        let by_tmpl =
            fx.instance_struct(holder, vec![TemplateArg::Alias(AliasTarget::Symbol(vec_decl))]);

        let p = fx.defs.pointer_to(by_fn);
        let f = fx.cpp_fn("f", fx.module, void, &[p]);
        assert_eq!(fx.mangle(f).unwrap(), "_Z1fP6HolderIL_Z1gvEE");

        let p = fx.defs.pointer_to(by_var);
        let f = fx.cpp_fn("f", fx.module, void, &[p]);
        assert_eq!(fx.mangle(f).unwrap(), "_Z1fP6HolderIL_Z1xEE");

        let p = fx.defs.pointer_to(by_tmpl);
        let f = fx.cpp_fn("f", fx.module, void, &[p]);
        assert_eq!(fx.mangle(f).unwrap(), "_Z1fP6HolderI3VecE");
    }

    #[test]
    fn nested_function_alias_is_wrapped() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let ns = fx.defs.namespace("ns", fx.module);
        let g = fx.cpp_fn("g", ns, void, &[]);
        let holder = fx.template_struct("H", vec![TemplateArg::Alias(AliasTarget::Symbol(g))]);
        let f = fx.cpp_fn("f", fx.module, void, &[holder]);
        assert_eq!(fx.mangle(f).unwrap(), "_Z1f1HIXL_ZN2ns1gEvEEE");
    }

    #[test]
    fn unsupported_alias_arguments() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let int = fx.basic(BasicKind::Int32);
        let ns = fx.defs.namespace("ns", fx.module);
        let by_type = fx.template_struct("A", vec![TemplateArg::Alias(AliasTarget::Type(int))]);
        let by_ns = fx.template_struct("B", vec![TemplateArg::Alias(AliasTarget::Symbol(ns))]);

        for ty in [by_type, by_ns] {
            let f = fx.cpp_fn("f", fx.module, void, &[ty]);
            assert!(matches!(
                fx.mangle(f),
                Err(MangleError::UnsupportedTemplateArgument { .. })
            ));
        }
    }

    #[test]
    fn parameter_packs() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let int = fx.basic(BasicKind::Int32);
        let c = fx.basic(BasicKind::Char);
        let tuple = fx.template_struct(
            "Tuple",
            vec![TemplateArg::Variadic(vec![
                TemplateArg::Type(int),
                TemplateArg::Type(c),
            ])],
        );
        let p = fx.defs.pointer_to(tuple);
        let f = fx.cpp_fn("f", fx.module, void, &[p]);
        assert_eq!(fx.mangle(f).unwrap(), "_Z1fP5TupleIIicEE");

        let misplaced = fx.template_struct(
            "Bad",
            vec![TemplateArg::Variadic(vec![]), TemplateArg::Type(int)],
        );
        let g = fx.cpp_fn("g", fx.module, void, &[misplaced]);
        assert!(matches!(
            fx.mangle(g),
            Err(MangleError::UnsupportedTemplateArgument { .. })
        ));
    }

    #[test]
    fn back_references_count_in_base36() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let structs: Vec<TypeId> = (0..12)
            .map(|i| fx.struct_named(&format!("S{i}"), fx.module))
            .collect();
        let mut params = structs.clone();
        params.extend([structs[0], structs[1], structs[10], structs[11]]);
        let f = fx.cpp_fn("f", fx.module, void, &params);
        let mangled = fx.mangle(f).unwrap();
        assert!(mangled.ends_with("3S103S11S_S0_S9_SA_"), "{mangled}");
    }

    #[test]
    fn unsupported_types() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let int = fx.basic(BasicKind::Int32);
        let darr = fx.defs.dynamic_array(int);
        let aarr = fx.defs.assoc_array(int, int);
        let fn_ty = fx.defs.function_type(FunctionSig::cpp(void, vec![]));
        let dg = fx.defs.delegate(fn_ty);
        let shared = fx.defs.qualified(int, Qualifiers::SHARED);
        let immutable = fx.defs.qualified(int, Qualifiers::IMMUTABLE);
        let sarr = fx.defs.static_array(int, 3);
        let handle = fx.defs.aggregate("Handle", AggregateKind::Struct, fx.module);
        let alias = fx.defs.typedef(handle);

        for ty in [darr, aarr, dg, shared, immutable, sarr, alias] {
            let f = fx.cpp_fn("f", fx.module, void, &[ty]);
            assert!(
                matches!(fx.mangle(f), Err(MangleError::UnsupportedType { .. })),
                "{}",
                fx.defs.display_type(ty)
            );
        }
    }

    #[test]
    fn static_array_parameter_reports_the_type() {
        let mut fx = Fixture::new();
        let void = fx.void();
        let int = fx.basic(BasicKind::Int32);
        let sarr = fx.defs.static_array(int, 3);
        let f = fx.cpp_fn("f", fx.module, void, &[sarr]);
        let Err(MangleError::UnsupportedType { ty, reason }) = fx.mangle(f) else {
            panic!("expected an unsupported type");
        };
        assert_eq!(ty, "int[3]");
        assert!(reason.contains("pointer"));
    }

    #[test]
    fn only_functions_and_variables() {
        let fx = Fixture::new();
        assert_eq!(
            fx.mangle(fx.module),
            Err(MangleError::UnsupportedSymbolKind {
                symbol: String::from("app"),
                kind: "module"
            })
        );
    }
}
