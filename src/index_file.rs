//! Per-translation-unit index: the Analyzer's output after classification.

use crate::types::{DeclRef, Kind, LocalFileId, Range, SymbolKind, Use, Usr};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// A call edge from a function to a callee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEdge {
    pub range: Range,
    pub callee: Usr,
    pub role: crate::types::Role,
}

/// Definition payload shared by all three kinds. Fields that don't apply
/// to a given kind (e.g. `bases`/`callees` on a `Var`) are simply empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Def {
    pub detailed_name: String,
    pub hover: Option<String>,
    pub comment: Option<String>,
    pub spell: Option<Range>,
    pub extent: Option<Range>,
    pub bases: Vec<Usr>,
    pub nested: Vec<Usr>,
    pub callees: Vec<CallEdge>,
    pub storage_class: Option<String>,
    pub qual_name_offset: u32,
    pub short_name_offset: u32,
    pub short_name_size: u32,
    /// Assigned only once a `Def` is merged into the `Db`; absent on a
    /// freshly produced `IndexFile` entry.
    pub file_id: Option<crate::types::FileId>,
}

impl Def {
    /// Forward declarations carry an empty detailed name and are skipped
    /// by the delta builder.
    pub fn is_forward_declaration_only(&self) -> bool {
        self.detailed_name.is_empty()
    }
}

/// Per-`Usr` record inside an `IndexFile`: at most one `def` per
/// translation unit, plus the occurrences collected for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Entry {
    pub def: Option<Def>,
    pub declarations: Vec<DeclRef>,
    pub uses: Vec<Use>,
    pub derived: Vec<Usr>,
    /// Only meaningful for `Kind::Type`: variables/fields of this type.
    pub instances: Vec<Usr>,
    pub kind: Kind,
    pub symbol_kind: SymbolKind,
}

/// The per-translation-unit output of the Analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFile {
    pub path: PathBuf,
    pub mtime: i64,
    pub file_contents: String,
    pub language: String,
    pub no_linkage: bool,
    pub args: Vec<String>,
    pub includes: Vec<PathBuf>,
    pub skipped_ranges: Vec<Range>,
    pub dependencies: HashMap<PathBuf, i64>,
    /// File-local id (as seen in `Use.file_id`) to absolute path.
    pub lid2path: HashMap<u32, PathBuf>,
    pub usr2func: HashMap<Usr, Entry>,
    pub usr2type: HashMap<Usr, Entry>,
    pub usr2var: HashMap<Usr, Entry>,
}

impl IndexFile {
    pub fn new(path: PathBuf, mtime: i64, file_contents: String, language: String) -> Self {
        IndexFile {
            path,
            mtime,
            file_contents,
            language,
            no_linkage: false,
            args: Vec::new(),
            includes: Vec::new(),
            skipped_ranges: Vec::new(),
            dependencies: HashMap::new(),
            lid2path: HashMap::new(),
            usr2func: HashMap::new(),
            usr2type: HashMap::new(),
            usr2var: HashMap::new(),
        }
    }

    pub fn entries(&self, kind: Kind) -> &HashMap<Usr, Entry> {
        match kind {
            Kind::Func => &self.usr2func,
            Kind::Type => &self.usr2type,
            Kind::Var => &self.usr2var,
            Kind::Invalid => unreachable!("Invalid has no entry table"),
        }
    }

    pub fn entries_mut(&mut self, kind: Kind) -> &mut HashMap<Usr, Entry> {
        match kind {
            Kind::Func => &mut self.usr2func,
            Kind::Type => &mut self.usr2type,
            Kind::Var => &mut self.usr2var,
            Kind::Invalid => unreachable!("Invalid has no entry table"),
        }
    }

    /// Resolve a local file id to an absolute path. `None` (the "main
    /// file" sentinel) resolves to this index's own `path`.
    pub fn resolve_local(&self, lid: LocalFileId) -> Option<&PathBuf> {
        match lid {
            None => Some(&self.path),
            Some(id) => self.lid2path.get(&id),
        }
    }
}

/// The three top-level kinds, for iteration.
pub const ALL_KINDS: [Kind; 3] = [Kind::Func, Kind::Type, Kind::Var];
