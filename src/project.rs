//! Project model: compile-command lookup with ancestor-directory fallback.
//!
//! An exact path match is tried first, then the nearest ancestor directory
//! that has an entry, then a configured default-args list.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CompileEntry {
    pub args: Vec<String>,
}

pub struct ProjectModel {
    inner: Mutex<Inner>,
}

struct Inner {
    by_path: HashMap<PathBuf, CompileEntry>,
    by_directory: HashMap<PathBuf, CompileEntry>,
    default_args: Vec<String>,
}

impl ProjectModel {
    pub fn new(default_args: Vec<String>) -> Self {
        ProjectModel {
            inner: Mutex::new(Inner {
                by_path: HashMap::new(),
                by_directory: HashMap::new(),
                default_args,
            }),
        }
    }

    pub fn insert_entry(&self, path: PathBuf, entry: CompileEntry) {
        let mut inner = self.inner.lock();
        if let Some(dir) = path.parent() {
            inner.by_directory.insert(dir.to_path_buf(), entry.clone());
        }
        inner.by_path.insert(path, entry);
    }

    /// Exact match, then nearest ancestor directory, then the default
    /// args. Returns `None` only if there are no default args configured
    /// and no entry or ancestor matched.
    pub fn find_entry(&self, path: &Path) -> Option<CompileEntry> {
        let inner = self.inner.lock();
        if let Some(entry) = inner.by_path.get(path) {
            return Some(entry.clone());
        }
        let mut dir = path.parent();
        while let Some(d) = dir {
            if let Some(entry) = inner.by_directory.get(d) {
                return Some(entry.clone());
            }
            dir = d.parent();
        }
        if inner.default_args.is_empty() {
            None
        } else {
            Some(CompileEntry {
                args: inner.default_args.clone(),
            })
        }
    }
}
