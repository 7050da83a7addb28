//! The merged, queryable graph (`Db`) and its single-writer apply loop.
//!
//! `apply` runs in a fixed order: resolve file ids, clear a removed file's
//! def, update this file's own def, reserve capacity, then per-kind
//! removed/def_update/declarations/uses merge.

use crate::delta::{IndexUpdate, KindDelta, ListDelta};
use crate::index_file::{Def, ALL_KINDS};
use crate::types::{DeclRef, ExtentRef, FileId, Kind, Range, Role, Use, Usr};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct QueryFileDef {
    pub path: PathBuf,
    pub args: Vec<String>,
    pub includes: Vec<PathBuf>,
    pub dependencies: HashMap<PathBuf, i64>,
    pub skipped_ranges: Vec<Range>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryFile {
    pub def: Option<QueryFileDef>,
    /// Single source of truth for "which symbols appear in this file".
    pub symbol2refcnt: HashMap<ExtentRef, i32>,
}

/// One row of `Db.funcs`/`types`/`vars`: the entity's `Usr`, its
/// per-file defs, and the merged occurrence lists.
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub usr: Usr,
    /// Multiple definitions across translation units are allowed;
    /// queries pick one deterministically (first by file-id, then
    /// definition > declaration — see `Row::preferred_def`).
    pub defs: Vec<Def>,
    pub declarations: Vec<DeclRef>,
    pub uses: Vec<Use>,
    pub derived: Vec<Usr>,
    pub instances: Vec<Usr>,
}

impl Row {
    pub fn new(usr: Usr) -> Self {
        Row {
            usr,
            ..Default::default()
        }
    }

    /// Pick a single def deterministically: first by file-id ordering,
    /// with a definition (non-empty extent) preferred over a bare
    /// declaration.
    pub fn preferred_def(&self) -> Option<&Def> {
        self.defs
            .iter()
            .min_by_key(|d| (d.file_id.map(FileId::to_u32), d.extent.is_none()))
    }
}

/// The global merged project database. Owned by a single apply thread;
/// all other readers use `Db::snapshot()`.
#[derive(Debug, Clone, Default)]
pub struct Db {
    pub funcs: Vec<Row>,
    pub types: Vec<Row>,
    pub vars: Vec<Row>,
    pub files: Vec<QueryFile>,
    pub name2file_id: HashMap<PathBuf, FileId>,
    pub func_usr: HashMap<Usr, usize>,
    pub type_usr: HashMap<Usr, usize>,
    pub var_usr: HashMap<Usr, usize>,
}

/// A malformed update (unresolvable local id, refcount would go negative)
/// indicates upstream corruption. Treated as fatal: log diagnostic context
/// and terminate rather than continue with a corrupted `Db`.
pub fn invariant_violation(context: &str) -> ! {
    tracing::error!(%context, "apply invariant violation, terminating");
    panic!("apply invariant violation: {context}");
}

impl Db {
    pub fn new() -> Self {
        Db::default()
    }

    fn rows(&self, kind: Kind) -> &Vec<Row> {
        match kind {
            Kind::Func => &self.funcs,
            Kind::Type => &self.types,
            Kind::Var => &self.vars,
            Kind::Invalid => unreachable!(),
        }
    }

    fn rows_mut(&mut self, kind: Kind) -> &mut Vec<Row> {
        match kind {
            Kind::Func => &mut self.funcs,
            Kind::Type => &mut self.types,
            Kind::Var => &mut self.vars,
            Kind::Invalid => unreachable!(),
        }
    }

    fn usr_index(&self, kind: Kind) -> &HashMap<Usr, usize> {
        match kind {
            Kind::Func => &self.func_usr,
            Kind::Type => &self.type_usr,
            Kind::Var => &self.var_usr,
            Kind::Invalid => unreachable!(),
        }
    }

    fn usr_index_mut(&mut self, kind: Kind) -> &mut HashMap<Usr, usize> {
        match kind {
            Kind::Func => &mut self.func_usr,
            Kind::Type => &mut self.type_usr,
            Kind::Var => &mut self.var_usr,
            Kind::Invalid => unreachable!(),
        }
    }

    pub fn get_row(&self, kind: Kind, usr: Usr) -> Option<&Row> {
        self.usr_index(kind).get(&usr).map(|&i| &self.rows(kind)[i])
    }

    fn row_mut_or_insert(&mut self, kind: Kind, usr: Usr) -> usize {
        if let Some(&i) = self.usr_index(kind).get(&usr) {
            return i;
        }
        let i = self.rows(kind).len();
        self.rows_mut(kind).push(Row::new(usr));
        self.usr_index_mut(kind).insert(usr, i);
        i
    }

    /// Find or create the `QueryFile` for `path`, returning its `FileId`.
    pub fn get_file_id(&mut self, path: &std::path::Path) -> FileId {
        if let Some(&id) = self.name2file_id.get(path) {
            return id;
        }
        let id = FileId::from_index(self.files.len());
        self.files.push(QueryFile {
            def: Some(QueryFileDef {
                path: path.to_path_buf(),
                ..Default::default()
            }),
            symbol2refcnt: HashMap::new(),
        });
        self.name2file_id.insert(path.to_path_buf(), id);
        id
    }

    fn bump(&mut self, key: ExtentRef, delta: i32) {
        let file = &mut self.files[key.file_id.index()];
        let entry = file.symbol2refcnt.entry(key).or_insert(0);
        *entry += delta;
        if *entry < 0 {
            invariant_violation("symbol2refcnt underflow");
        }
        if *entry == 0 {
            file.symbol2refcnt.remove(&key);
        }
    }

    /// Read-only snapshot for queries from other threads. Implemented as
    /// a clone: the only writer is the apply thread, so a clone is always
    /// internally consistent at the moment it's taken.
    pub fn snapshot(&self) -> Db {
        self.clone()
    }

    /// Merge an `IndexUpdate` into this `Db`. The sole writer; must run on
    /// a single thread.
    pub fn apply(&mut self, update: &IndexUpdate) {
        // Step 1: resolve every path named in the update's local-id tables
        // to a QueryFile, building lid -> file_id maps.
        let mut prev_lid2file_id: HashMap<u32, FileId> = HashMap::new();
        for (&lid, path) in &update.prev_lid2path {
            prev_lid2file_id.insert(lid, self.get_file_id(path));
        }
        let mut lid2file_id: HashMap<u32, FileId> = HashMap::new();
        for (&lid, path) in &update.lid2path {
            lid2file_id.insert(lid, self.get_file_id(path));
        }

        // Step 2: clear removed file's def.
        if let Some(removed_path) = &update.files_removed {
            let id = self.get_file_id(removed_path);
            self.files[id.index()].def = None;
        }

        // Step 3: update this file's own def, yielding update.file_id.
        let file_id = if let Some(fdu) = &update.files_def_update {
            let id = self.get_file_id(&fdu.path);
            self.files[id.index()].def = Some(QueryFileDef {
                path: fdu.path.clone(),
                args: fdu.args.clone(),
                includes: fdu.includes.clone(),
                dependencies: fdu.dependencies.clone(),
                skipped_ranges: fdu.skipped_ranges.clone(),
            });
            id
        } else {
            invariant_violation("apply called without files_def_update");
        };

        let resolve = |lid: Option<u32>, map: &HashMap<u32, FileId>, fallback: FileId| match lid {
            None => fallback,
            Some(l) => *map.get(&l).unwrap_or_else(|| {
                invariant_violation("unresolvable local file id");
            }),
        };

        for &kind in &ALL_KINDS {
            self.apply_kind(
                kind,
                update.kind_delta(kind),
                file_id,
                &prev_lid2file_id,
                &lid2file_id,
                &resolve,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_kind(
        &mut self,
        kind: Kind,
        kd: &KindDelta,
        file_id: FileId,
        prev_lid2file_id: &HashMap<u32, FileId>,
        lid2file_id: &HashMap<u32, FileId>,
        resolve: &impl Fn(Option<u32>, &HashMap<u32, FileId>, FileId) -> FileId,
    ) {
        // Step 4a: reserve capacity (growth factor 1.3).
        {
            let rows = self.rows_mut(kind);
            let need = rows.len() + kd.hint;
            if need > rows.capacity() {
                rows.reserve((need as f64 * 1.3) as usize - rows.len());
            }
        }

        // Step 4b: removed — decrement spell refcount, drop matching def.
        // A removed def always belongs to the file being re-indexed (the
        // diff is per-path), so its refcount key uses `file_id`, not
        // `def.file_id` — the latter is unset on a def fresh off an
        // `IndexFile` and only gets assigned during def_update below.
        for (usr, def) in &kd.removed {
            if let Some(spell) = def.spell {
                self.bump(
                    ExtentRef {
                        file_id,
                        usr: *usr,
                        kind,
                        extent: spell,
                    },
                    -1,
                );
            }
            let idx = self.row_mut_or_insert(kind, *usr);
            self.rows_mut(kind)[idx]
                .defs
                .retain(|d| d.file_id != Some(file_id));
        }

        // Step 4c: def_update — assign file_id, translate spell, bump,
        // replace-or-append.
        for (usr, def) in &kd.def_update {
            let mut def = def.clone();
            def.file_id = Some(file_id);
            if let Some(spell) = def.spell {
                self.bump(
                    ExtentRef {
                        file_id,
                        usr: *usr,
                        kind,
                        extent: spell,
                    },
                    1,
                );
            }
            let idx = self.row_mut_or_insert(kind, *usr);
            let row = &mut self.rows_mut(kind)[idx];
            if let Some(existing) = row.defs.iter_mut().find(|d| d.file_id == Some(file_id)) {
                *existing = def;
            } else {
                row.defs.push(def);
            }
        }

        // Step 4d: declarations refcount pass, then set-difference/union
        // merge (4e).
        for (usr, ld) in &kd.declarations {
            for decl in &ld.old {
                let old_fid = resolve(decl.use_.file_id, prev_lid2file_id, file_id);
                self.bump(
                    ExtentRef {
                        file_id: old_fid,
                        usr: *usr,
                        kind,
                        extent: decl.extent,
                    },
                    -1,
                );
            }
            for decl in &ld.new {
                let new_fid = resolve(decl.use_.file_id, lid2file_id, file_id);
                self.bump(
                    ExtentRef {
                        file_id: new_fid,
                        usr: *usr,
                        kind,
                        extent: decl.extent,
                    },
                    1,
                );
            }
            let idx = self.row_mut_or_insert(kind, *usr);
            merge_list(&mut self.rows_mut(kind)[idx].declarations, ld);
        }

        for (usr, ld) in &kd.derived {
            let idx = self.row_mut_or_insert(kind, *usr);
            merge_list(&mut self.rows_mut(kind)[idx].derived, ld);
        }

        // instances only for Type.
        if kind == Kind::Type {
            for (usr, ld) in &kd.instances {
                let idx = self.row_mut_or_insert(kind, *usr);
                merge_list(&mut self.rows_mut(kind)[idx].instances, ld);
            }
        }

        // Step 4f: uses — implicit-widen-then-refcount. Funcs widen,
        // Types and Vars do not.
        for (usr, ld) in &kd.uses {
            for u in &ld.old {
                let old_fid = resolve(u.file_id, prev_lid2file_id, file_id);
                let extent = if kind == Kind::Func && u.role.contains(Role::IMPLICIT) {
                    u.range.widen_by_one_column()
                } else {
                    u.range
                };
                self.bump(
                    ExtentRef {
                        file_id: old_fid,
                        usr: *usr,
                        kind,
                        extent,
                    },
                    -1,
                );
            }
            for u in &ld.new {
                let new_fid = resolve(u.file_id, lid2file_id, file_id);
                let extent = if kind == Kind::Func && u.role.contains(Role::IMPLICIT) {
                    u.range.widen_by_one_column()
                } else {
                    u.range
                };
                self.bump(
                    ExtentRef {
                        file_id: new_fid,
                        usr: *usr,
                        kind,
                        extent,
                    },
                    1,
                );
            }
            let idx = self.row_mut_or_insert(kind, *usr);
            merge_list(&mut self.rows_mut(kind)[idx].uses, ld);
        }
    }
}

/// Remove-then-add merge for a list-valued field: drop every element
/// in `ld.old`, then append every element of `ld.new` not already present.
fn merge_list<T: PartialEq + Clone>(list: &mut Vec<T>, ld: &ListDelta<T>) {
    list.retain(|item| !ld.old.contains(item));
    for item in &ld.new {
        if !list.contains(item) {
            list.push(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::diff;
    use crate::index_file::{Entry, IndexFile};
    use crate::types::{Pos, SymbolKind};

    fn make_def(name: &str, spell: Range) -> Def {
        Def {
            detailed_name: name.to_string(),
            spell: Some(spell),
            extent: Some(spell),
            ..Default::default()
        }
    }

    #[test]
    fn apply_add_then_remove_round_trips() {
        let path = PathBuf::from("/t.cc");
        let mut a = IndexFile::new(path.clone(), 1, String::new(), "c".into());
        let usr = Usr(42);
        a.usr2func.insert(
            usr,
            Entry {
                def: Some(make_def("foo", Range::new(Pos::new(1, 0), Pos::new(1, 3)))),
                kind: Kind::Func,
                symbol_kind: SymbolKind::Function,
                ..Default::default()
            },
        );

        let mut db = Db::new();
        let update = diff(None, &a);
        db.apply(&update);

        assert_eq!(db.funcs.len(), 1);
        assert!(db.get_row(Kind::Func, usr).is_some());

        let b = IndexFile::new(path, 2, String::new(), "c".into());
        let remove_update = diff(Some(&a), &b);
        db.apply(&remove_update);

        let row = db.get_row(Kind::Func, usr).unwrap();
        assert!(row.defs.is_empty());
    }

    #[test]
    fn delta_inverse_law() {
        let path = PathBuf::from("/t.cc");
        let usr = Usr(7);
        let mut a = IndexFile::new(path.clone(), 1, String::new(), "c".into());
        a.usr2func.insert(
            usr,
            Entry {
                def: Some(make_def("foo", Range::new(Pos::new(1, 0), Pos::new(1, 3)))),
                kind: Kind::Func,
                symbol_kind: SymbolKind::Function,
                ..Default::default()
            },
        );
        let mut b = a.clone();
        b.mtime = 2;
        b.usr2func.get_mut(&usr).unwrap().def.as_mut().unwrap().hover = Some("x".into());

        let mut db = Db::new();
        db.apply(&diff(None, &a));
        let before = format!("{:?}", db.funcs);

        db.apply(&diff(Some(&a), &b));
        db.apply(&diff(Some(&b), &a));

        let after = format!("{:?}", db.funcs);
        assert_eq!(before, after);
    }

    #[test]
    fn idempotent_self_diff_is_noop() {
        let path = PathBuf::from("/t.cc");
        let usr = Usr(9);
        let mut a = IndexFile::new(path, 1, String::new(), "c".into());
        a.usr2func.insert(
            usr,
            Entry {
                def: Some(make_def("foo", Range::new(Pos::new(1, 0), Pos::new(1, 3)))),
                kind: Kind::Func,
                symbol_kind: SymbolKind::Function,
                ..Default::default()
            },
        );

        let mut db = Db::new();
        db.apply(&diff(None, &a));
        let before = format!("{:?}", db.funcs);
        let refcnt_before = format!("{:?}", db.files);

        db.apply(&diff(Some(&a), &a));

        assert_eq!(before, format!("{:?}", db.funcs));
        assert_eq!(refcnt_before, format!("{:?}", db.files));
    }

    #[test]
    fn no_dangling_file_ids() {
        let path = PathBuf::from("/t.cc");
        let usr = Usr(11);
        let mut a = IndexFile::new(path, 1, String::new(), "c".into());
        a.usr2func.insert(
            usr,
            Entry {
                def: Some(make_def("foo", Range::new(Pos::new(1, 0), Pos::new(1, 3)))),
                kind: Kind::Func,
                symbol_kind: SymbolKind::Function,
                ..Default::default()
            },
        );
        let mut db = Db::new();
        db.apply(&diff(None, &a));

        for row in &db.funcs {
            for def in &row.defs {
                if let Some(fid) = def.file_id {
                    assert!(fid.index() < db.files.len());
                }
            }
        }
    }

    #[test]
    fn refcounts_never_negative_and_zero_entries_absent() {
        let path = PathBuf::from("/t.cc");
        let usr = Usr(13);
        let mut a = IndexFile::new(path.clone(), 1, String::new(), "c".into());
        a.usr2func.insert(
            usr,
            Entry {
                def: Some(make_def("foo", Range::new(Pos::new(1, 0), Pos::new(1, 3)))),
                kind: Kind::Func,
                symbol_kind: SymbolKind::Function,
                ..Default::default()
            },
        );
        let b = IndexFile::new(path.clone(), 2, String::new(), "c".into());

        let mut db = Db::new();
        db.apply(&diff(None, &a));
        db.apply(&diff(Some(&a), &b));

        for file in &db.files {
            for (&_key, &count) in &file.symbol2refcnt {
                assert!(count >= 0);
            }
        }
        // The only contributor was removed, so the refcount table for
        // that file must be empty, not merely non-negative.
        let file_id = db.name2file_id[&path];
        assert!(db.files[file_id.index()].symbol2refcnt.is_empty());
    }

    #[test]
    fn derived_mirrors_bases() {
        let path = PathBuf::from("/t.cc");
        let base_usr = Usr(100);
        let derived_usr = Usr(200);
        let mut idx = IndexFile::new(path, 1, String::new(), "cpp".into());

        let mut base_def = make_def("Root::foo", Range::new(Pos::new(1, 0), Pos::new(1, 3)));
        base_def.bases = vec![];
        idx.usr2func.insert(
            base_usr,
            Entry {
                def: Some(base_def),
                derived: vec![derived_usr],
                kind: Kind::Func,
                symbol_kind: SymbolKind::Method,
                ..Default::default()
            },
        );

        let mut derived_def = make_def("Derived::foo", Range::new(Pos::new(2, 0), Pos::new(2, 3)));
        derived_def.bases = vec![base_usr];
        idx.usr2func.insert(
            derived_usr,
            Entry {
                def: Some(derived_def),
                kind: Kind::Func,
                symbol_kind: SymbolKind::Method,
                ..Default::default()
            },
        );

        let mut db = Db::new();
        db.apply(&diff(None, &idx));

        let base_row = db.get_row(Kind::Func, base_usr).unwrap();
        assert!(base_row.derived.contains(&derived_usr));
        let derived_row = db.get_row(Kind::Func, derived_usr).unwrap();
        assert!(derived_row.preferred_def().unwrap().bases.contains(&base_usr));
    }
}
