use thiserror::Error;

use crate::defs::{AliasTarget, SymbolId, TemplateArg};
use crate::ty::{TypeId, TypeLookup};

/// Why a symbol could not be given a C++ name.
///
/// Apart from [`MangleError::UnknownTarget`], every variant means the caller asked for something its eligibility
/// check should have rejected, so none of them are recoverable for the declaration in question.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MangleError {
    #[error("ICE: `{symbol}` is a {kind}; only variables and functions have C++ names")]
    UnsupportedSymbolKind { symbol: String, kind: &'static str },
    #[error("ICE: C++ static non-__gshared non-extern variables not supported (`{symbol}`)")]
    UnsupportedStorageClass { symbol: String },
    #[error("ICE: type `{ty}` can not be mapped to C++: {reason}")]
    UnsupportedType { ty: String, reason: &'static str },
    #[error("ICE: unsupported argument `{arg}` for C++ template `{symbol}`: {reason}")]
    UnsupportedTemplateArgument {
        symbol: String,
        arg: String,
        reason: &'static str,
    },
    #[error("`{triple}` is not a recognised target triple")]
    UnknownTarget { triple: String },
}

pub type Result<T, E = MangleError> = core::result::Result<T, E>;

impl MangleError {
    pub(crate) fn unsupported_symbol<L: TypeLookup + ?Sized>(cx: &L, sym: SymbolId) -> Self {
        Self::UnsupportedSymbolKind {
            symbol: cx.display_symbol(sym).to_string(),
            kind: cx.symbol(sym).kind.describe(),
        }
    }

    pub(crate) fn unsupported_storage<L: TypeLookup + ?Sized>(cx: &L, sym: SymbolId) -> Self {
        Self::UnsupportedStorageClass {
            symbol: cx.display_symbol(sym).to_string(),
        }
    }

    pub(crate) fn unsupported_type<L: TypeLookup + ?Sized>(
        cx: &L,
        ty: TypeId,
        reason: &'static str,
    ) -> Self {
        Self::UnsupportedType {
            ty: cx.display_type(ty).to_string(),
            reason,
        }
    }

    pub(crate) fn unsupported_arg<L: TypeLookup + ?Sized>(
        cx: &L,
        owner: SymbolId,
        arg: &TemplateArg,
        reason: &'static str,
    ) -> Self {
        let arg = match arg {
            TemplateArg::Type(ty) | TemplateArg::Alias(AliasTarget::Type(ty)) => {
                cx.display_type(*ty).to_string()
            }
            TemplateArg::Value { value, .. } => value.to_string(),
            TemplateArg::Alias(AliasTarget::Symbol(sym)) => cx.display_symbol(*sym).to_string(),
            TemplateArg::Variadic(_) => String::from("..."),
        };
        Self::UnsupportedTemplateArgument {
            symbol: cx.display_symbol(owner).to_string(),
            arg,
            reason,
        }
    }
}
