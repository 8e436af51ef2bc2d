//! The symbol graph handed to the mangler by the semantic front end.
//!
//! Everything here is fully resolved before a mangle request starts: protection, storage, linkage, qualifiers and
//! template arguments are plain data. The mangler only ever reads a [`Definitions`]; the types it has to derive on
//! the fly (references for `ref` parameters, mutable variants of parameter types) live in a request-scoped
//! [`TypeInterner`] layered on top.

use core::fmt;
use std::collections::HashMap;

use crate::ty::{BasicKind, FunctionSig, Linkage, Qualifiers, Type, TypeId, TypeKind, TypeLookup};

/// A stable handle to a symbol.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("#{}", self.0))
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("#{}", self.0))
    }
}

#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub enum Protection {
    Private,
    Protected,
    #[default]
    Public,
}

bitflags::bitflags! {
    #[repr(transparent)]
    #[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
    pub struct StorageClass: u8 {
        const EXTERN = 0x01;
        const GSHARED = 0x02;
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum AggregateKind {
    Struct,
    Union,
    Class,
}

#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub enum FunctionKind {
    #[default]
    Plain,
    Constructor,
    Destructor,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function {
    /// Always a [`TypeKind::Function`]
    pub ty: TypeId,
    pub kind: FunctionKind,
    /// Takes an implicit `this`
    pub needs_this: bool,
    /// Virtual and occupying a vtable slot
    pub is_virtual: bool,
    /// The implicit `this` is const
    pub is_const: bool,
}

impl Function {
    pub const fn new(ty: TypeId) -> Self {
        Self {
            ty,
            kind: FunctionKind::Plain,
            needs_this: false,
            is_virtual: false,
            is_const: false,
        }
    }

    pub const fn method(ty: TypeId) -> Self {
        Self {
            needs_this: true,
            ..Self::new(ty)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub ty: TypeId,
    pub storage: StorageClass,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TemplateDecl {
    /// The sole member of an eponymous template (`template Foo(T) { struct Foo {} }`)
    pub one_member: Option<SymbolId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AliasTarget {
    Symbol(SymbolId),
    Type(TypeId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemplateArg {
    Type(TypeId),
    /// `value` is interpreted through `ty`: unsigned types read it as its two's complement bit pattern.
    Value { ty: TypeId, value: i128 },
    Alias(AliasTarget),
    /// The arguments bound to a trailing parameter pack
    Variadic(Vec<TemplateArg>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateInstance {
    pub decl: SymbolId,
    pub args: Vec<TemplateArg>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Module,
    Namespace,
    Aggregate(AggregateKind),
    Enum,
    TemplateDecl(TemplateDecl),
    TemplateInstance(TemplateInstance),
    Function(Function),
    Variable(Variable),
}

impl SymbolKind {
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Namespace => "namespace",
            Self::Aggregate(AggregateKind::Struct) => "struct",
            Self::Aggregate(AggregateKind::Union) => "union",
            Self::Aggregate(AggregateKind::Class) => "class",
            Self::Enum => "enum",
            Self::TemplateDecl(_) => "template",
            Self::TemplateInstance(_) => "template instance",
            Self::Function(_) => "function",
            Self::Variable(_) => "variable",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub ident: String,
    /// `None` only for a module or a free-standing top-level symbol
    pub parent: Option<SymbolId>,
    pub protection: Protection,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn new(ident: impl Into<String>, parent: Option<SymbolId>, kind: SymbolKind) -> Self {
        Self {
            ident: ident.into(),
            parent,
            protection: Protection::Public,
            kind,
        }
    }

    pub const fn is_module(&self) -> bool {
        matches!(self.kind, SymbolKind::Module)
    }

    pub const fn as_template_instance(&self) -> Option<&TemplateInstance> {
        match &self.kind {
            SymbolKind::TemplateInstance(inst) => Some(inst),
            _ => None,
        }
    }

    pub const fn as_function(&self) -> Option<&Function> {
        match &self.kind {
            SymbolKind::Function(func) => Some(func),
            _ => None,
        }
    }

    pub const fn as_variable(&self) -> Option<&Variable> {
        match &self.kind {
            SymbolKind::Variable(var) => Some(var),
            _ => None,
        }
    }
}

/// The arena of symbols and hash-consed types.
#[derive(Clone, Debug, Default)]
pub struct Definitions {
    symbols: Vec<Symbol>,
    types: Vec<Type>,
    type_ids: HashMap<Type, TypeId>,
}

impl Definitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_symbol(&mut self, sym: Symbol) -> SymbolId {
        let id = SymbolId(
            u32::try_from(self.symbols.len()).expect("more than u32::MAX symbols in one arena"),
        );
        self.symbols.push(sym);
        id
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    /// Returns the handle of `ty`, creating it if no structurally equal node exists yet.
    pub fn intern_type(&mut self, ty: Type) -> TypeId {
        if let Some(id) = self.type_ids.get(&ty) {
            return *id;
        }
        let id =
            TypeId(u32::try_from(self.types.len()).expect("more than u32::MAX types in one arena"));
        self.types.push(ty.clone());
        self.type_ids.insert(ty, id);
        id
    }

    pub fn lookup_type(&self, ty: &Type) -> Option<TypeId> {
        self.type_ids.get(ty).copied()
    }

    pub(crate) fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn module(&mut self, name: &str) -> SymbolId {
        self.add_symbol(Symbol::new(name, None, SymbolKind::Module))
    }

    pub fn namespace(&mut self, name: &str, parent: SymbolId) -> SymbolId {
        self.add_symbol(Symbol::new(name, Some(parent), SymbolKind::Namespace))
    }

    pub fn aggregate(&mut self, name: &str, kind: AggregateKind, parent: SymbolId) -> SymbolId {
        self.add_symbol(Symbol::new(name, Some(parent), SymbolKind::Aggregate(kind)))
    }

    pub fn enum_decl(&mut self, name: &str, parent: SymbolId) -> SymbolId {
        self.add_symbol(Symbol::new(name, Some(parent), SymbolKind::Enum))
    }

    pub fn template_decl(&mut self, name: &str, parent: SymbolId) -> SymbolId {
        self.add_symbol(Symbol::new(
            name,
            Some(parent),
            SymbolKind::TemplateDecl(TemplateDecl::default()),
        ))
    }

    /// Records `member` as the sole member of the template `decl`.
    pub fn set_one_member(&mut self, decl: SymbolId, member: SymbolId) {
        if let SymbolKind::TemplateDecl(decl) = &mut self.symbol_mut(decl).kind {
            decl.one_member = Some(member);
        }
    }

    /// Instantiates `decl`. The instance takes the template's name and scope.
    pub fn template_instance(&mut self, decl: SymbolId, args: Vec<TemplateArg>) -> SymbolId {
        let template = &self.symbols[decl.index()];
        let sym = Symbol::new(
            template.ident.clone(),
            template.parent,
            SymbolKind::TemplateInstance(TemplateInstance { decl, args }),
        );
        self.add_symbol(sym)
    }

    pub fn function(&mut self, name: &str, parent: SymbolId, func: Function) -> SymbolId {
        self.add_symbol(Symbol::new(name, Some(parent), SymbolKind::Function(func)))
    }

    pub fn variable(
        &mut self,
        name: &str,
        parent: SymbolId,
        ty: TypeId,
        storage: StorageClass,
    ) -> SymbolId {
        self.add_symbol(Symbol::new(
            name,
            Some(parent),
            SymbolKind::Variable(Variable { ty, storage }),
        ))
    }

    pub fn set_protection(&mut self, sym: SymbolId, protection: Protection) {
        self.symbol_mut(sym).protection = protection;
    }

    pub fn basic(&mut self, kind: BasicKind) -> TypeId {
        self.intern_type(Type::new(TypeKind::Basic(kind)))
    }

    pub fn pointer_to(&mut self, ty: TypeId) -> TypeId {
        self.intern_type(Type::new(TypeKind::Pointer(ty)))
    }

    pub fn reference_to(&mut self, ty: TypeId) -> TypeId {
        self.intern_type(Type::new(TypeKind::Reference(ty)))
    }

    pub fn static_array(&mut self, elem: TypeId, dim: u64) -> TypeId {
        self.intern_type(Type::new(TypeKind::StaticArray { dim, elem }))
    }

    pub fn vector(&mut self, elem: TypeId) -> TypeId {
        self.intern_type(Type::new(TypeKind::Vector(elem)))
    }

    pub fn function_type(&mut self, sig: FunctionSig) -> TypeId {
        self.intern_type(Type::new(TypeKind::Function(sig)))
    }

    pub fn struct_type(&mut self, sym: SymbolId) -> TypeId {
        self.intern_type(Type::new(TypeKind::Struct(sym)))
    }

    pub fn enum_type(&mut self, sym: SymbolId, base: BasicKind) -> TypeId {
        self.intern_type(Type::new(TypeKind::Enum { sym, base }))
    }

    pub fn class_type(&mut self, sym: SymbolId) -> TypeId {
        self.intern_type(Type::new(TypeKind::Class(sym)))
    }

    pub fn dynamic_array(&mut self, elem: TypeId) -> TypeId {
        self.intern_type(Type::new(TypeKind::DynamicArray(elem)))
    }

    pub fn assoc_array(&mut self, key: TypeId, value: TypeId) -> TypeId {
        self.intern_type(Type::new(TypeKind::AssocArray { key, value }))
    }

    pub fn delegate(&mut self, func: TypeId) -> TypeId {
        self.intern_type(Type::new(TypeKind::Delegate(func)))
    }

    pub fn typedef(&mut self, sym: SymbolId) -> TypeId {
        self.intern_type(Type::new(TypeKind::Typedef(sym)))
    }

    /// `ty` with `quals` added.
    pub fn qualified(&mut self, ty: TypeId, quals: Qualifiers) -> TypeId {
        let mut ty = self.types[ty.index()].clone();
        ty.quals |= quals;
        self.intern_type(ty)
    }

    pub fn const_of(&mut self, ty: TypeId) -> TypeId {
        self.qualified(ty, Qualifiers::CONST)
    }

    pub fn shared_of(&mut self, ty: TypeId) -> TypeId {
        self.qualified(ty, Qualifiers::SHARED)
    }
}

impl TypeLookup for Definitions {
    fn ty(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }
}

/// Request-scoped view of a [`Definitions`] that can intern derived types without touching the arena.
///
/// A derived type that already exists in the arena resolves to the arena's handle, so identity is the same
/// whether the front end or the mangler produced the node.
pub(crate) struct TypeInterner<'a> {
    defs: &'a Definitions,
    local: Vec<Type>,
    local_ids: HashMap<Type, TypeId>,
}

impl<'a> TypeInterner<'a> {
    pub fn new(defs: &'a Definitions) -> Self {
        Self {
            defs,
            local: Vec::new(),
            local_ids: HashMap::new(),
        }
    }

    pub const fn defs(&self) -> &'a Definitions {
        self.defs
    }

    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(id) = self.defs.lookup_type(&ty) {
            return id;
        }
        if let Some(id) = self.local_ids.get(&ty) {
            return *id;
        }
        let index = self.defs.type_count() + self.local.len();
        let id = TypeId(u32::try_from(index).expect("more than u32::MAX types in one request"));
        self.local.push(ty.clone());
        self.local_ids.insert(ty, id);
        id
    }

    /// Owned copy of a node, so callers can keep encoding while they inspect it.
    pub fn get(&self, id: TypeId) -> Type {
        self.ty(id).clone()
    }

    pub fn reference_to(&mut self, ty: TypeId) -> TypeId {
        self.intern(Type::new(TypeKind::Reference(ty)))
    }

    pub fn pointer_to(&mut self, ty: TypeId) -> TypeId {
        self.intern(Type::new(TypeKind::Pointer(ty)))
    }

    pub fn mutable_of(&mut self, ty: TypeId) -> TypeId {
        let mut ty = self.get(ty);
        ty.quals.remove(Qualifiers::CONST);
        self.intern(ty)
    }

    /// A `lazy T` parameter is passed as a pointer to a C++ thunk `T()`.
    pub fn lazy_thunk(&mut self, ty: TypeId) -> TypeId {
        let thunk = self.intern(Type::new(TypeKind::Function(FunctionSig {
            ret: ty,
            params: Vec::new(),
            variadic: false,
            linkage: Linkage::Cpp,
            ref_return: false,
        })));
        self.pointer_to(thunk)
    }

    /// The parent of `sym`, unless it is missing or a module.
    pub fn scope_parent(&self, sym: SymbolId) -> Option<SymbolId> {
        self.defs
            .symbol(sym)
            .parent
            .filter(|parent| !self.defs.symbol(*parent).is_module())
    }
}

impl TypeLookup for TypeInterner<'_> {
    fn ty(&self, id: TypeId) -> &Type {
        let index = id.index();
        match index.checked_sub(self.defs.type_count()) {
            Some(local) => &self.local[local],
            None => self.defs.ty(id),
        }
    }

    fn symbol(&self, id: SymbolId) -> &Symbol {
        self.defs.symbol(id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interning_is_structural() {
        let mut defs = Definitions::new();
        let int = defs.basic(BasicKind::Int32);
        let p1 = defs.pointer_to(int);
        let p2 = defs.pointer_to(int);
        assert_eq!(p1, p2);
        let cp = defs.const_of(p1);
        assert_ne!(cp, p1);
        assert_eq!(defs.const_of(cp), cp);
    }

    #[test]
    fn overlay_reuses_arena_handles() {
        let mut defs = Definitions::new();
        let int = defs.basic(BasicKind::Int32);
        let r = defs.reference_to(int);
        let float = defs.basic(BasicKind::Float32);

        let mut types = TypeInterner::new(&defs);
        assert_eq!(types.reference_to(int), r);

        let rf = types.reference_to(float);
        assert_eq!(rf.index(), defs.type_count());
        assert_eq!(types.reference_to(float), rf);
        assert_eq!(types.get(rf).kind, TypeKind::Reference(float));
    }

    #[test]
    fn mutable_of_strips_only_const() {
        let mut defs = Definitions::new();
        let int = defs.basic(BasicKind::Int32);
        let cint = defs.const_of(int);
        let scint = defs.shared_of(cint);
        let sint = defs.shared_of(int);

        let mut types = TypeInterner::new(&defs);
        assert_eq!(types.mutable_of(cint), int);
        assert_eq!(types.mutable_of(scint), sint);
    }

    #[test]
    fn display_spells_source_types() {
        let mut defs = Definitions::new();
        let module = defs.module("app");
        let ns = defs.namespace("ns", module);
        let foo = defs.aggregate("Foo", AggregateKind::Struct, ns);
        let foo_ty = defs.struct_type(foo);
        let cfoo = defs.const_of(foo_ty);
        let ptr = defs.pointer_to(cfoo);
        assert_eq!(defs.display_type(ptr).to_string(), "const(app.ns.Foo)*");

        let int = defs.basic(BasicKind::Int32);
        let arr = defs.dynamic_array(int);
        let shared = defs.shared_of(arr);
        assert_eq!(defs.display_type(shared).to_string(), "shared(int[])");

        let decl = defs.template_decl("Vec", module);
        let inst = defs.template_instance(
            decl,
            vec![
                TemplateArg::Type(int),
                TemplateArg::Value { ty: int, value: -3 },
            ],
        );
        let member = defs.aggregate("Vec", AggregateKind::Struct, inst);
        assert_eq!(defs.display_symbol(member).to_string(), "app.Vec!(int, -3)");
    }
}
