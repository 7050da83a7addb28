//! Session / preamble cache: one `Session` per main source file, reused
//! across reparses so interactive edits stay fast.
//!
//! Each session owns a snapshot and publishes a rebuilt preamble atomically
//! under a mutex rather than mutating it in place.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A read-through stat cache: wraps the real filesystem and records every
/// stat/open seen while building a preamble, so later reparses can skip
/// redundant syscalls.
#[derive(Debug, Default, Clone)]
pub struct StatCache {
    seen: HashMap<PathBuf, Option<SystemTime>>,
}

impl StatCache {
    pub fn new() -> Self {
        StatCache::default()
    }

    /// Returns the modification time for `path`, consulting the recorded
    /// cache first and falling back to a real stat on miss.
    pub fn modified(&mut self, path: &Path) -> Option<SystemTime> {
        if let Some(cached) = self.seen.get(path) {
            return *cached;
        }
        let mtime = std::fs::metadata(path).ok().and_then(|m| m.modified().ok());
        self.seen.insert(path.to_path_buf(), mtime);
        mtime
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// The compiler's precompiled-preamble blob plus the include structure
/// that produced it and a stat cache of every file the preamble read.
#[derive(Debug, Clone)]
pub struct PreambleData {
    pub args: Vec<String>,
    pub includes: Vec<PathBuf>,
    pub bounds_end_offset: usize,
    pub stat_cache: StatCache,
}

impl PreambleData {
    /// Whether this preamble can be reused for `buffer` without a
    /// rebuild: the region of the buffer up to `bounds_end_offset` must be
    /// byte-identical, and every file the original preamble stat'd must
    /// still report the same modification time.
    pub fn can_reuse(&self, buffer: &str, bounds_end_offset: usize, stat: &mut StatCache) -> bool {
        if bounds_end_offset != self.bounds_end_offset {
            return false;
        }
        if buffer.len() < bounds_end_offset {
            return false;
        }
        for (path, expected) in &self.stat_cache.seen {
            if stat.modified(path) != *expected {
                return false;
            }
        }
        true
    }
}

/// One per main source file: last compile args, the current preamble (if
/// built), and any open-buffer override.
pub struct Session {
    pub main_path: PathBuf,
    inner: Mutex<SessionState>,
}

struct SessionState {
    args: Vec<String>,
    preamble: Option<PreambleData>,
}

impl Session {
    pub fn new(main_path: PathBuf, args: Vec<String>) -> Self {
        Session {
            main_path,
            inner: Mutex::new(SessionState {
                args,
                preamble: None,
            }),
        }
    }

    /// Decide whether the current preamble can be reused for `buffer`; if
    /// not, rebuild it via `build` (the caller's Analyzer-backed preamble
    /// compilation step, invoked with `SkipFunctionBodies=true`-equivalent
    /// settings) and publish the result atomically.
    pub fn reparse(&self, buffer: &str, bounds_end_offset: usize, build: impl FnOnce(&[String]) -> PreambleData) {
        let mut state = self.inner.lock();
        let mut stat = StatCache::new();
        let reusable = state
            .preamble
            .as_ref()
            .map(|p| p.can_reuse(buffer, bounds_end_offset, &mut stat))
            .unwrap_or(false);
        if reusable {
            return;
        }
        let fresh = build(&state.args);
        state.preamble = Some(fresh);
    }

    pub fn preamble(&self) -> Option<PreambleData> {
        self.inner.lock().preamble.clone()
    }
}

/// Bounded registry of sessions, capped at `session.maxNum`; evicts the
/// least-recently-touched session when full.
pub struct SessionCache {
    max: usize,
    order: Mutex<Vec<PathBuf>>,
    sessions: Mutex<HashMap<PathBuf, std::sync::Arc<Session>>>,
}

impl SessionCache {
    pub fn new(max: usize) -> Self {
        SessionCache {
            max,
            order: Mutex::new(Vec::new()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, path: &Path, args: Vec<String>) -> std::sync::Arc<Session> {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(path) {
            self.touch(path);
            return existing.clone();
        }
        let session = std::sync::Arc::new(Session::new(path.to_path_buf(), args));
        sessions.insert(path.to_path_buf(), session.clone());
        let mut order = self.order.lock();
        order.push(path.to_path_buf());
        if order.len() > self.max {
            let evict = order.remove(0);
            sessions.remove(&evict);
        }
        session
    }

    fn touch(&self, path: &Path) {
        let mut order = self.order.lock();
        if let Some(pos) = order.iter().position(|p| p == path) {
            let p = order.remove(pos);
            order.push(p);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reparse_rebuilds_when_bounds_change() {
        let session = Session::new(PathBuf::from("/a.cc"), vec!["-std=c11".into()]);
        let mut calls = 0;
        session.reparse("int x;", 6, |_| {
            calls += 1;
            PreambleData {
                args: vec![],
                includes: vec![],
                bounds_end_offset: 6,
                stat_cache: StatCache::new(),
            }
        });
        assert_eq!(calls, 1);
        assert!(session.preamble().is_some());
    }

    #[test]
    fn session_cache_evicts_oldest_when_full() {
        let cache = SessionCache::new(2);
        cache.get_or_create(Path::new("/a.cc"), vec![]);
        cache.get_or_create(Path::new("/b.cc"), vec![]);
        cache.get_or_create(Path::new("/c.cc"), vec![]);
        assert_eq!(cache.len(), 2);
    }
}
