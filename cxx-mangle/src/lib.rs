//! C++ symbol names for foreign-linkage declarations.
//!
//! Given a resolved variable or function from a [`Definitions`] arena, produce the exact linker-visible name a C++
//! compiler for the same target would emit: the Itanium ABI spelling for ELF and Mach-O targets, or the Microsoft
//! (Visual C++ or Digital Mars) decoration on Windows. Every call is independent and never modifies its input.
//!
//! ```
//! use cxx_mangle::defs::{Definitions, Function};
//! use cxx_mangle::ty::{BasicKind, FunctionSig, Param};
//! use cxx_mangle::{mangle, TargetInfo};
//!
//! let mut defs = Definitions::new();
//! let module = defs.module("app");
//! let int = defs.basic(BasicKind::Int32);
//! let sig = defs.function_type(FunctionSig::cpp(int, vec![Param::value(int), Param::value(int)]));
//! let add = defs.function("add", module, Function::new(sig));
//!
//! assert_eq!(mangle(&defs, add, &TargetInfo::itanium64()).unwrap(), "_Z3addii");
//! assert_eq!(mangle(&defs, add, &TargetInfo::msvc64()).unwrap(), "?add@@YAHHH@Z");
//! ```

use tracing::{debug, instrument};

pub mod defs;
pub mod error;
pub mod itanium;
pub mod msvc;
pub mod subst;
pub mod target;
pub mod ty;

pub use defs::{Definitions, SymbolId};
pub use error::{MangleError, Result};
pub use target::{CxxAbi, MsvcDialect, TargetInfo};

use itanium::ItaniumMangler;
use msvc::MsvcMangler;

/// Mangles `sym` for `target`.
///
/// Only variables and functions have C++ names. A symbol the encoder cannot express fails as a whole; no partial
/// name is ever returned.
#[instrument(level = "debug", skip(defs, target), fields(abi = ?target.abi))]
pub fn mangle(defs: &Definitions, sym: SymbolId, target: &TargetInfo) -> Result<String> {
    let mangled = match target.abi {
        CxxAbi::Itanium => ItaniumMangler::new(defs, target).mangle_of(sym),
        CxxAbi::Msvc(_) => MsvcMangler::new(defs, target).mangle_of(sym),
    };
    match &mangled {
        Ok(name) => debug!(%name, "mangled"),
        Err(err) => debug!(%err, "not mangleable"),
    }
    mangled
}

/// [`mangle`] for the target described by a target triple.
pub fn mangle_for_triple(defs: &Definitions, sym: SymbolId, triple: &str) -> Result<String> {
    mangle(defs, sym, &TargetInfo::from_triple(triple)?)
}
