//! Virtual-file-state tracker: per-path timestamp/step machine that gates
//! redundant reparse work.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const NUM_STRIPES: usize = 256;

/// Per-path processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct State {
    pub timestamp: i64,
    pub step: u8,
    pub loaded: u32,
}

impl State {
    pub const INITIAL: State = State {
        timestamp: 0,
        step: 0,
        loaded: 0,
    };
}

/// Step ladder, monotone within a given mtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Unseen = 0,
    HeaderOnlyScheduled = 1,
    FullLinkageInProgress = 2,
    DependencyLoadedFromCache = 3,
}

/// Tracks `State` per absolute path, plus a 256-bucket striped mutex used
/// by callers to serialize reparses of the same file.
pub struct VfsState {
    states: Mutex<HashMap<PathBuf, State>>,
    stripes: Vec<Arc<Mutex<()>>>,
}

impl Default for VfsState {
    fn default() -> Self {
        Self::new()
    }
}

impl VfsState {
    pub fn new() -> Self {
        VfsState {
            states: Mutex::new(HashMap::new()),
            stripes: (0..NUM_STRIPES).map(|_| Arc::new(Mutex::new(()))).collect(),
        }
    }

    /// Claim a parse: returns true and updates state iff
    /// `(timestamp, step) < (ts, step)` lexicographically.
    pub fn stamp(&self, path: &Path, ts: i64, step: u8) -> bool {
        let mut states = self.states.lock();
        let entry = states.entry(path.to_path_buf()).or_insert(State::INITIAL);
        if (entry.timestamp, entry.step) < (ts, step) {
            entry.timestamp = ts;
            entry.step = step;
            true
        } else {
            false
        }
    }

    pub fn loaded(&self, path: &Path) -> u32 {
        self.states
            .lock()
            .get(path)
            .map(|s| s.loaded)
            .unwrap_or(0)
    }

    /// Increment the `loaded` counter; only ever called by the indexer
    /// worker under `get_file_mutex(path)`.
    pub fn increment_loaded(&self, path: &Path) {
        let mut states = self.states.lock();
        let entry = states.entry(path.to_path_buf()).or_insert(State::INITIAL);
        entry.loaded += 1;
    }

    pub fn reset_step(&self, path: &Path) {
        let mut states = self.states.lock();
        if let Some(entry) = states.get_mut(path) {
            entry.step = Step::Unseen as u8;
        }
    }

    pub fn state(&self, path: &Path) -> State {
        self.states.lock().get(path).copied().unwrap_or(State::INITIAL)
    }

    /// Forget all tracked state (workspace reload).
    pub fn clear(&self) {
        self.states.lock().clear();
    }

    /// 256-bucket striped mutex: hashes `path` to a bucket and returns a
    /// guard on it, serializing reparses of the same file while letting
    /// unrelated files through.
    pub fn get_file_mutex(&self, path: &Path) -> Arc<Mutex<()>> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        let bucket = (hasher.finish() as usize) % NUM_STRIPES;
        self.stripes[bucket].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_only_advances_monotonically() {
        let vfs = VfsState::new();
        let p = Path::new("/a.cc");
        assert!(vfs.stamp(p, 1, 2));
        assert!(!vfs.stamp(p, 1, 1));
        assert!(!vfs.stamp(p, 0, 5));
        assert!(vfs.stamp(p, 2, 0));
    }

    #[test]
    fn concurrent_stamps_converge_to_lexicographic_max() {
        let vfs = Arc::new(VfsState::new());
        let p = PathBuf::from("/a.cc");
        let inputs = [(1, 0), (1, 2), (0, 3), (2, 0), (1, 1)];
        let mut handles = Vec::new();
        for (ts, step) in inputs {
            let vfs = vfs.clone();
            let p = p.clone();
            handles.push(std::thread::spawn(move || {
                vfs.stamp(&p, ts, step);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let expected_max = inputs.into_iter().max().unwrap();
        let final_state = vfs.state(&p);
        assert_eq!((final_state.timestamp, final_state.step), (expected_max.0, expected_max.1 as u8));
    }

    #[test]
    fn get_file_mutex_is_stable_for_same_path() {
        let vfs = VfsState::new();
        let a = vfs.get_file_mutex(Path::new("/x.cc"));
        let b = vfs.get_file_mutex(Path::new("/x.cc"));
        assert!(Arc::ptr_eq(&a, &b));
    }
}
