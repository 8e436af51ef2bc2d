//! Substitution (back-reference) tables and the small token writers shared by both grammars.

use core::fmt::Write;

use tracing::{debug, trace};

pub trait Mangle {
    fn write<W: Write>(&self, buf: &mut W) -> core::fmt::Result;
}

impl<M: Mangle + ?Sized> Mangle for &M {
    fn write<W: Write>(&self, buf: &mut W) -> core::fmt::Result {
        <M as Mangle>::write(self, buf)
    }
}

/// Appends `token` to `buf`.
pub fn emit<M: Mangle>(buf: &mut String, token: M) {
    // Writing into a String never fails
    let _ = token.write(buf);
}

/// A base-36 sequence number (`0`..`9`, `A`..`Z`, `10`, ...).
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct SeqId(pub u32);

const ALPHA: [u8; 36] = [
    b'0', b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'A', b'B', b'C', b'D', b'E', b'F',
    b'G', b'H', b'I', b'J', b'K', b'L', b'M', b'N', b'O', b'P', b'Q', b'R', b'S', b'T', b'U', b'V',
    b'W', b'X', b'Y', b'Z',
];

impl Mangle for SeqId {
    fn write<W: Write>(&self, buf: &mut W) -> core::fmt::Result {
        let mut nbuf = [0u8; 7];
        let mut cursor = nbuf.len();
        let mut val = self.0;

        loop {
            cursor -= 1;
            nbuf[cursor] = ALPHA[(val % 36) as usize];
            val /= 36;
            if val == 0 {
                break;
            }
        }

        for &c in &nbuf[cursor..] {
            buf.write_char(char::from(c))?;
        }
        Ok(())
    }
}

/// An Itanium `<substitution>`: `S_` for the first entry, `S<seq-id>_` after that.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct Substitution(Option<SeqId>);

impl Substitution {
    pub fn for_index(index: usize) -> Self {
        match index.checked_sub(1) {
            None => Self(None),
            Some(seq) => Self(Some(SeqId(
                u32::try_from(seq).expect("substitution index exceeds u32::MAX"),
            ))),
        }
    }
}

impl Mangle for Substitution {
    fn write<W: Write>(&self, buf: &mut W) -> core::fmt::Result {
        buf.write_str("S")?;
        if let Some(n) = &self.0 {
            n.write(buf)?;
        }
        buf.write_str("_")
    }
}

/// An Itanium `<source-name>`: the identifier prefixed by its decimal length.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct SourceName<'a>(pub &'a str);

impl Mangle for SourceName<'_> {
    fn write<W: Write>(&self, buf: &mut W) -> core::fmt::Result {
        buf.write_fmt(format_args!("{}{}", self.0.len(), self.0))
    }
}

/// An ordered, append-only list of already-emitted entities.
///
/// Lookups scan oldest-first. A bounded table silently stops growing once full; entities that miss the cut are
/// simply never compressed.
#[derive(Clone, Debug)]
pub struct SubstitutionTable<K> {
    entries: Vec<K>,
    limit: Option<usize>,
    name: &'static str,
    overflowed: bool,
}

impl<K: PartialEq + core::fmt::Debug> SubstitutionTable<K> {
    pub const fn unbounded(name: &'static str) -> Self {
        Self {
            entries: Vec::new(),
            limit: None,
            name,
            overflowed: false,
        }
    }

    pub const fn bounded(name: &'static str, limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit: Some(limit),
            name,
            overflowed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.limit.map_or(false, |limit| self.entries.len() >= limit)
    }

    pub fn find(&self, key: &K) -> Option<usize> {
        let found = self.entries.iter().position(|entry| entry == key);
        if let Some(index) = found {
            trace!(table = self.name, ?key, index, "substitution hit");
        }
        found
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.iter().any(|entry| entry == key)
    }

    /// Appends `key` unconditionally (subject to the bound). Returns whether it was stored.
    pub fn push(&mut self, key: K) -> bool {
        if self.is_full() {
            if !self.overflowed {
                debug!(table = self.name, ?key, "substitution table full, later entries are not recorded");
                self.overflowed = true;
            }
            return false;
        }
        trace!(table = self.name, ?key, index = self.entries.len(), "substitution stored");
        self.entries.push(key);
        true
    }

    /// Finds `key`, storing it first-fit if it is absent.
    pub fn find_or_insert(&mut self, key: K) -> Option<usize> {
        match self.find(&key) {
            Some(index) => Some(index),
            None => {
                self.push(key);
                None
            }
        }
    }

    /// Stores `key` unless an equal entry is already present.
    pub fn insert_unique(&mut self, key: K) {
        if !self.contains(&key) {
            self.push(key);
        }
    }
}
