//! Core identity and location types shared across the indexing pipeline.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// Stable 64-bit fingerprint of a declaration, produced by hashing the
/// Analyzer's mangled descriptor for it. Identical across translation
/// units and across process restarts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Usr(pub u64);

impl Usr {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Index into `Db.files`. `NonZeroU32` so `Option<FileId>` is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(NonZeroU32);

impl FileId {
    pub fn new(v: u32) -> Option<Self> {
        NonZeroU32::new(v).map(FileId)
    }

    /// Construct from a zero-based index (the common case when pushing
    /// onto a `Vec` of files): index `i` becomes `FileId(i + 1)`.
    pub fn from_index(i: usize) -> Self {
        FileId(NonZeroU32::new(i as u32 + 1).expect("index + 1 is never zero"))
    }

    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    pub fn to_u32(self) -> u32 {
        self.0.get()
    }
}

/// A file-local id used inside `Use.file_id` while an `IndexFile` is not
/// yet merged into the `Db`. `-1` (represented as `None`) means "the main
/// file of this translation unit".
pub type LocalFileId = Option<u32>;

/// Source location. Column `-1` (represented here as `None`) means
/// invalid/unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub line: u16,
    pub column: Option<u16>,
}

impl Pos {
    pub fn new(line: u16, column: u16) -> Self {
        Pos {
            line,
            column: Some(column),
        }
    }

    pub fn unset(line: u16) -> Self {
        Pos { line, column: None }
    }
}

/// Half-open range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Pos,
    pub end: Pos,
}

impl Range {
    pub fn new(start: Pos, end: Pos) -> Self {
        Range { start, end }
    }

    /// Widen the range by one column on each side; used for implicit
    /// call-site punctuation so hovering over `(` or `)` resolves to the
    /// callee. Saturates at zero rather than underflowing.
    pub fn widen_by_one_column(self) -> Range {
        let start = Pos {
            line: self.start.line,
            column: self.start.column.map(|c| c.saturating_sub(1)),
        };
        let end = Pos {
            line: self.end.line,
            column: self.end.column.map(|c| c.saturating_add(1)),
        };
        Range { start, end }
    }
}

bitflags! {
    /// Role bitmask on a use site.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Role: u16 {
        const DECLARATION = 1 << 0;
        const DEFINITION  = 1 << 1;
        const READ        = 1 << 2;
        const WRITE       = 1 << 3;
        const ADDRESS     = 1 << 4;
        const CALL        = 1 << 5;
        const IMPLICIT    = 1 << 6;
        const REFERENCE   = 1 << 7;
    }
}

/// A single occurrence of a symbol in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Use {
    pub range: Range,
    pub role: Role,
    pub file_id: LocalFileId,
}

/// A `Use` plus the full syntactic span of the declaration, used to
/// disambiguate hover/jump targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeclRef {
    pub use_: Use,
    pub extent: Range,
}

/// The `Db`'s per-file refcount key: a resolved (global) `file_id` plus
/// the extent range and kind/usr of the occurrence it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtentRef {
    pub file_id: FileId,
    pub usr: Usr,
    pub kind: Kind,
    pub extent: Range,
}

/// Top-level symbol category.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Func,
    Type,
    Var,
    #[default]
    Invalid,
}

/// Finer symbol category, used for presentation and for the
/// declaration-kind classification table (see `analyzer::classify`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Namespace,
    Interface,
    Method,
    Property,
    Class,
    Function,
    TypeAlias,
    TypeParameter,
    Enum,
    Struct,
    Variable,
    Field,
    StaticMethod,
    Constructor,
    Parameter,
    EnumMember,
    #[default]
    Invalid,
}
