//! Property tests for the delta/apply invariants (see DESIGN.md's
//! universal-invariant list): random sequences of add/remove diffs must
//! never drive a refcount negative, must leave no dangling file ids, and
//! a self-diff must be a no-op.

use cxgraph::db::Db;
use cxgraph::delta::diff;
use cxgraph::index_file::{Def, Entry, IndexFile};
use cxgraph::types::{Kind, Pos, Range, SymbolKind, Usr};
use proptest::prelude::*;
use std::path::PathBuf;

/// A small, distinct set of one-line function defs, keyed by line number
/// so each generated def gets a non-overlapping spell range.
fn distinct_lines() -> impl Strategy<Value = Vec<u16>> {
    prop::collection::hash_set(1u16..200, 0..12).prop_map(|set| set.into_iter().collect())
}

fn index_from_lines(path: PathBuf, mtime: i64, lines: &[u16]) -> IndexFile {
    let mut idx = IndexFile::new(path, mtime, String::new(), "c".into());
    for &line in lines {
        let usr = Usr(line as u64 + 1);
        let spell = Range::new(Pos::new(line, 0), Pos::new(line, 3));
        idx.usr2func.insert(
            usr,
            Entry {
                def: Some(Def {
                    detailed_name: format!("f{line}"),
                    spell: Some(spell),
                    extent: Some(spell),
                    ..Default::default()
                }),
                kind: Kind::Func,
                symbol_kind: SymbolKind::Function,
                ..Default::default()
            },
        );
    }
    idx
}

proptest! {
    /// Applying a diff against itself as both prev and curr never changes
    /// the `Db`'s func rows or refcount tables.
    #[test]
    fn self_diff_is_always_a_noop(lines in distinct_lines()) {
        let idx = index_from_lines(PathBuf::from("/p.c"), 1, &lines);
        let mut db = Db::new();
        db.apply(&diff(None, &idx));
        let before_funcs = format!("{:?}", db.funcs);
        let before_files = format!("{:?}", db.files);

        db.apply(&diff(Some(&idx), &idx));

        prop_assert_eq!(before_funcs, format!("{:?}", db.funcs));
        prop_assert_eq!(before_files, format!("{:?}", db.files));
    }

    /// Refcounts never go negative and every stored def's file id refers
    /// to a real file, across an arbitrary add-then-replace sequence.
    #[test]
    fn refcounts_stay_non_negative_and_file_ids_stay_valid(
        first in distinct_lines(),
        second in distinct_lines(),
    ) {
        let path = PathBuf::from("/p.c");
        let a = index_from_lines(path.clone(), 1, &first);
        let b = index_from_lines(path, 2, &second);

        let mut db = Db::new();
        db.apply(&diff(None, &a));
        db.apply(&diff(Some(&a), &b));

        for file in &db.files {
            for &count in file.symbol2refcnt.values() {
                prop_assert!(count >= 0);
            }
        }
        for row in &db.funcs {
            for def in &row.defs {
                if let Some(fid) = def.file_id {
                    prop_assert!(fid.index() < db.files.len());
                }
            }
        }
    }

    /// Diffing down to empty and back up to the original is the inverse
    /// of the original add: the db ends with exactly the original set of
    /// live funcs (non-empty defs).
    #[test]
    fn remove_then_readd_restores_original_liveness(lines in distinct_lines()) {
        let path = PathBuf::from("/p.c");
        let a = index_from_lines(path.clone(), 1, &lines);
        let empty = IndexFile::new(path, 0, String::new(), "c".into());

        let mut db = Db::new();
        db.apply(&diff(None, &a));
        db.apply(&diff(Some(&a), &empty));
        db.apply(&diff(Some(&empty), &a));

        for &line in &lines {
            let usr = Usr(line as u64 + 1);
            let row = db.get_row(Kind::Func, usr).unwrap();
            prop_assert!(!row.defs.is_empty());
        }
    }
}
