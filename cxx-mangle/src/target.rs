//! The target facts the grammars depend on.

use target_tuples::{Architecture, Environment, ObjectFormat, Target, OS};

use crate::error::{MangleError, Result};

/// The Microsoft grammar comes in two flavours.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum MsvcDialect {
    /// Visual C++
    Modern,
    /// The older Digital Mars compatible spelling, used for 32-bit OMF/COFF toolchains
    Legacy,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum CxxAbi {
    Itanium,
    Msvc(MsvcDialect),
}

/// Immutable per-request target description.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct TargetInfo {
    pub abi: CxxAbi,
    pub ptrbits: u16,
    pub longbits: u16,
    /// Storage size of `long double` in bytes, including padding
    pub realsize: u16,
    /// Trailing padding bytes in `long double`
    pub realpad: u16,
    /// Mach-O symbols carry an extra leading underscore
    pub mach_o: bool,
}

impl TargetInfo {
    /// x86_64 ELF with the GNU toolchain.
    pub const fn itanium64() -> Self {
        Self {
            abi: CxxAbi::Itanium,
            ptrbits: 64,
            longbits: 64,
            realsize: 16,
            realpad: 6,
            mach_o: false,
        }
    }

    /// x86_64 COFF with Visual C++.
    pub const fn msvc64() -> Self {
        Self {
            abi: CxxAbi::Msvc(MsvcDialect::Modern),
            ptrbits: 64,
            longbits: 32,
            realsize: 8,
            realpad: 0,
            mach_o: false,
        }
    }

    pub fn from_triple(triple: &str) -> Result<Self> {
        let target = triple
            .parse::<Target>()
            .map_err(|_| MangleError::UnknownTarget {
                triple: triple.to_owned(),
            })?;
        Ok(Self::from_target(&target))
    }

    pub fn from_target(target: &Target) -> Self {
        let arch = target.arch();
        let os = target.operating_system();
        let windows = matches!(os, Some(OS::Win32));
        let apple = matches!(target.target_object_format(), ObjectFormat::MachO)
            || matches!(
                os,
                Some(OS::Darwin | OS::MacOSX | OS::IOS | OS::TvOS | OS::WatchOS)
            );
        let x32 = matches!(target.environment(), Some(Environment::GNUX32));

        let ptrbits = match arch {
            Architecture::X86_64 if x32 => 32,
            Architecture::X86_64
            | Architecture::Aarch64
            | Architecture::Aarch64Be
            | Architecture::Mips64
            | Architecture::Mips64LE
            | Architecture::PowerPC64
            | Architecture::PowerPC64le
            | Architecture::RiscV64
            | Architecture::SparcV9
            | Architecture::Wasm64 => 64,
            Architecture::I86
            | Architecture::I8086
            | Architecture::I086
            | Architecture::I186
            | Architecture::I286
            | Architecture::M6502
            | Architecture::M65C02
            | Architecture::SPC700 => 16,
            _ => 32,
        };

        let abi = if windows {
            if ptrbits == 64 {
                CxxAbi::Msvc(MsvcDialect::Modern)
            } else {
                CxxAbi::Msvc(MsvcDialect::Legacy)
            }
        } else {
            CxxAbi::Itanium
        };

        let longbits = if windows || ptrbits < 32 { 32 } else { ptrbits };

        let (realsize, realpad) = if windows || (apple && !arch.is_x86() && arch != Architecture::X86_64) {
            (8, 0)
        } else if arch == Architecture::X86_64 && !x32 {
            (16, 6)
        } else if arch.is_x86() || arch == Architecture::X86_64 {
            (12, 2)
        } else if ptrbits == 64 {
            (16, 0)
        } else {
            (8, 0)
        };

        Self {
            abi,
            ptrbits,
            longbits,
            realsize,
            realpad,
            mach_o: apple,
        }
    }

    pub const fn with_longbits(mut self, longbits: u16) -> Self {
        self.longbits = longbits;
        self
    }

    pub const fn with_real(mut self, realsize: u16, realpad: u16) -> Self {
        self.realsize = realsize;
        self.realpad = realpad;
        self
    }

    pub const fn with_mach_o(mut self, mach_o: bool) -> Self {
        self.mach_o = mach_o;
        self
    }

    pub const fn is_64bit(&self) -> bool {
        self.ptrbits == 64
    }

    pub const fn msvc_dialect(&self) -> Option<MsvcDialect> {
        match self.abi {
            CxxAbi::Msvc(dialect) => Some(dialect),
            CxxAbi::Itanium => None,
        }
    }

    /// `_Z`, or `__Z` where the object format prepends an underscore to every symbol.
    pub const fn itanium_prefix(&self) -> &'static str {
        if self.mach_o {
            "__Z"
        } else {
            "_Z"
        }
    }
}
