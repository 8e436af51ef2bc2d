//! The type half of the consumed semantic model.
//!
//! Types are hash-consed by [`crate::defs::Definitions`], so two structurally identical nodes (same kind, same
//! children, same qualifier bits) always share one [`TypeId`].

use core::fmt;

use crate::defs::{AliasTarget, Symbol, SymbolId, SymbolKind, TemplateArg};

/// A stable handle to a type node.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("%{}", self.0))
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("%{}", self.0))
    }
}

bitflags::bitflags! {
    /// Type qualifiers. Only `CONST` has a C++ spelling.
    #[repr(transparent)]
    #[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
    pub struct Qualifiers: u8 {
        const CONST = 0x01;
        const SHARED = 0x02;
        const IMMUTABLE = 0x04;
    }
}

/// Builtin scalar kinds.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum BasicKind {
    Void,
    Bool,
    /// 8-bit UTF-8 code unit
    Char,
    /// 16-bit UTF-16 code unit
    WChar,
    /// 32-bit UTF-32 code unit
    DChar,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Int128,
    UInt128,
    Float32,
    Float64,
    Float80,
    Imaginary32,
    Imaginary64,
    Imaginary80,
    Complex32,
    Complex64,
    Complex80,
}

impl BasicKind {
    /// Whether a value of this kind can appear as an integral template argument.
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::Char
                | Self::WChar
                | Self::DChar
                | Self::Int8
                | Self::UInt8
                | Self::Int16
                | Self::UInt16
                | Self::Int32
                | Self::UInt32
                | Self::Int64
                | Self::UInt64
                | Self::Int128
                | Self::UInt128
        )
    }

    pub const fn is_unsigned(self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::Char
                | Self::WChar
                | Self::DChar
                | Self::UInt8
                | Self::UInt16
                | Self::UInt32
                | Self::UInt64
                | Self::UInt128
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::Char => "char",
            Self::WChar => "wchar",
            Self::DChar => "dchar",
            Self::Int8 => "byte",
            Self::UInt8 => "ubyte",
            Self::Int16 => "short",
            Self::UInt16 => "ushort",
            Self::Int32 => "int",
            Self::UInt32 => "uint",
            Self::Int64 => "long",
            Self::UInt64 => "ulong",
            Self::Int128 => "cent",
            Self::UInt128 => "ucent",
            Self::Float32 => "float",
            Self::Float64 => "double",
            Self::Float80 => "real",
            Self::Imaginary32 => "ifloat",
            Self::Imaginary64 => "idouble",
            Self::Imaginary80 => "ireal",
            Self::Complex32 => "cfloat",
            Self::Complex64 => "cdouble",
            Self::Complex80 => "creal",
        }
    }
}

impl fmt::Display for BasicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum Linkage {
    D,
    C,
    Cpp,
    Windows,
    Pascal,
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("extern(")?;
        match self {
            Self::D => f.write_str("D")?,
            Self::C => f.write_str("C")?,
            Self::Cpp => f.write_str("C++")?,
            Self::Windows => f.write_str("Windows")?,
            Self::Pascal => f.write_str("Pascal")?,
        }
        f.write_str(")")
    }
}

/// How a parameter is passed.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub enum ParamStorage {
    #[default]
    Value,
    Ref,
    Out,
    Lazy,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct Param {
    pub ty: TypeId,
    pub storage: ParamStorage,
}

impl Param {
    pub const fn value(ty: TypeId) -> Self {
        Self {
            ty,
            storage: ParamStorage::Value,
        }
    }

    pub const fn by_ref(ty: TypeId) -> Self {
        Self {
            ty,
            storage: ParamStorage::Ref,
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct FunctionSig {
    pub ret: TypeId,
    pub params: Vec<Param>,
    /// C-style `...` varargs
    pub variadic: bool,
    pub linkage: Linkage,
    /// The function returns by reference
    pub ref_return: bool,
}

impl FunctionSig {
    /// A non-variadic C++ signature.
    pub fn cpp(ret: TypeId, params: Vec<Param>) -> Self {
        Self {
            ret,
            params,
            variadic: false,
            linkage: Linkage::Cpp,
            ref_return: false,
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum TypeKind {
    Basic(BasicKind),
    Pointer(TypeId),
    Reference(TypeId),
    StaticArray { dim: u64, elem: TypeId },
    Vector(TypeId),
    Function(FunctionSig),
    Struct(SymbolId),
    Enum { sym: SymbolId, base: BasicKind },
    /// A reference-semantics class; C++ sees it as a pointer to the class.
    Class(SymbolId),
    DynamicArray(TypeId),
    AssocArray { key: TypeId, value: TypeId },
    /// Wraps a function type
    Delegate(TypeId),
    Typedef(SymbolId),
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Type {
    pub kind: TypeKind,
    pub quals: Qualifiers,
}

impl Type {
    pub const fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            quals: Qualifiers::empty(),
        }
    }

    pub const fn is_const(&self) -> bool {
        self.quals.contains(Qualifiers::CONST)
    }

    /// Shared and immutable have no C++ counterpart.
    pub const fn has_foreign_qualifiers(&self) -> bool {
        self.quals
            .intersects(Qualifiers::SHARED.union(Qualifiers::IMMUTABLE))
    }
}

/// Read access to symbols and types, implemented by the arena and by request-scoped overlays on top of it.
pub trait TypeLookup {
    fn ty(&self, id: TypeId) -> &Type;
    fn symbol(&self, id: SymbolId) -> &Symbol;

    fn display_type(&self, id: TypeId) -> DisplayType<'_, Self> {
        DisplayType { cx: self, id }
    }

    fn display_symbol(&self, id: SymbolId) -> DisplaySymbol<'_, Self> {
        DisplaySymbol { cx: self, id }
    }
}

/// Renders a type the way the source language spells it, for diagnostics.
pub struct DisplayType<'a, L: ?Sized> {
    cx: &'a L,
    id: TypeId,
}

/// Renders the dotted qualified name of a symbol, for diagnostics.
pub struct DisplaySymbol<'a, L: ?Sized> {
    cx: &'a L,
    id: SymbolId,
}

impl<L: TypeLookup + ?Sized> fmt::Display for DisplayType<'_, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = self.cx.ty(self.id);
        let quals = ty.quals;
        let wrappers = [
            (Qualifiers::IMMUTABLE, "immutable("),
            (Qualifiers::SHARED, "shared("),
            (Qualifiers::CONST, "const("),
        ];
        let mut depth = 0;
        for (qual, text) in wrappers {
            if quals.contains(qual) {
                f.write_str(text)?;
                depth += 1;
            }
        }
        write_kind(self.cx, &ty.kind, f)?;
        for _ in 0..depth {
            f.write_str(")")?;
        }
        Ok(())
    }
}

fn write_sig<L: TypeLookup + ?Sized>(
    cx: &L,
    sig: &FunctionSig,
    keyword: &str,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    if sig.ref_return {
        f.write_str("ref ")?;
    }
    write!(f, "{} {}(", cx.display_type(sig.ret), keyword)?;
    let mut sep = "";
    for param in &sig.params {
        f.write_str(sep)?;
        match param.storage {
            ParamStorage::Value => {}
            ParamStorage::Ref => f.write_str("ref ")?,
            ParamStorage::Out => f.write_str("out ")?,
            ParamStorage::Lazy => f.write_str("lazy ")?,
        }
        write!(f, "{}", cx.display_type(param.ty))?;
        sep = ", ";
    }
    if sig.variadic {
        f.write_str(sep)?;
        f.write_str("...")?;
    }
    f.write_str(")")
}

fn write_kind<L: TypeLookup + ?Sized>(
    cx: &L,
    kind: &TypeKind,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    match kind {
        TypeKind::Basic(kind) => fmt::Display::fmt(kind, f),
        TypeKind::Pointer(next) => write!(f, "{}*", cx.display_type(*next)),
        TypeKind::Reference(next) => write!(f, "ref {}", cx.display_type(*next)),
        TypeKind::StaticArray { dim, elem } => write!(f, "{}[{}]", cx.display_type(*elem), dim),
        TypeKind::Vector(elem) => write!(f, "__vector({})", cx.display_type(*elem)),
        TypeKind::Function(sig) => write_sig(cx, sig, "function", f),
        TypeKind::Struct(sym)
        | TypeKind::Enum { sym, .. }
        | TypeKind::Class(sym)
        | TypeKind::Typedef(sym) => fmt::Display::fmt(&cx.display_symbol(*sym), f),
        TypeKind::DynamicArray(elem) => write!(f, "{}[]", cx.display_type(*elem)),
        TypeKind::AssocArray { key, value } => {
            write!(f, "{}[{}]", cx.display_type(*value), cx.display_type(*key))
        }
        TypeKind::Delegate(func) => match &cx.ty(*func).kind {
            TypeKind::Function(sig) => write_sig(cx, sig, "delegate", f),
            _ => write!(f, "{} delegate", cx.display_type(*func)),
        },
    }
}

fn write_template_args<L: TypeLookup + ?Sized>(
    cx: &L,
    args: &[TemplateArg],
    sep: &mut &'static str,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    for arg in args {
        if let TemplateArg::Variadic(rest) = arg {
            write_template_args(cx, rest, sep, f)?;
            continue;
        }
        f.write_str(sep)?;
        match arg {
            TemplateArg::Type(ty) | TemplateArg::Alias(AliasTarget::Type(ty)) => {
                write!(f, "{}", cx.display_type(*ty))?;
            }
            TemplateArg::Value { value, .. } => write!(f, "{value}")?,
            TemplateArg::Alias(AliasTarget::Symbol(sym)) => write!(f, "{}", cx.display_symbol(*sym))?,
            TemplateArg::Variadic(_) => {}
        }
        *sep = ", ";
    }
    Ok(())
}

impl<L: TypeLookup + ?Sized> fmt::Display for DisplaySymbol<'_, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sym = self.cx.symbol(self.id);
        if let Some(parent) = sym.parent {
            // A template member is spelled through its instance
            let parent_sym = self.cx.symbol(parent);
            let through_instance = matches!(parent_sym.kind, SymbolKind::TemplateInstance(_))
                && parent_sym.ident == sym.ident;
            if through_instance {
                return fmt::Display::fmt(&self.cx.display_symbol(parent), f);
            }
            write!(f, "{}.", self.cx.display_symbol(parent))?;
        }
        f.write_str(&sym.ident)?;
        if let SymbolKind::TemplateInstance(inst) = &sym.kind {
            f.write_str("!(")?;
            write_template_args(self.cx, &inst.args, &mut "", f)?;
            f.write_str(")")?;
        }
        Ok(())
    }
}
