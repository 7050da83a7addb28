//! Indexer pool and apply loop: N parallel worker threads parse and diff,
//! a single apply thread is the sole `Db` writer.
//!
//! Each stage spawns N `std::thread::spawn` workers looping over a
//! bounded channel.

use crate::analyzer::Analyzer;
use crate::cache::CacheStore;
use crate::db::Db;
use crate::delta::{diff, IndexUpdate};
use crate::error::ErrorContext;
use crate::index_file::IndexFile;
use crate::project::ProjectModel;
use crate::queue::{MultiQueueWaiter, Queue};
use crate::vfs::VfsState;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Background,
    OnSave,
    OnChange,
    Delete,
}

#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub path: PathBuf,
    pub args: Vec<String>,
    pub mode: RequestMode,
    pub must_exist: bool,
    pub id: u64,
}

/// Shared state the worker pool and apply loop both need.
pub struct Pipeline {
    pub vfs: Arc<VfsState>,
    pub cache: Arc<CacheStore>,
    pub project: Arc<ProjectModel>,
    pub analyzer: Arc<dyn Analyzer>,
    pub db: Arc<Mutex<Db>>,
    /// Dropping this sender closes `quit_rx` for every clone, which is
    /// how `signal_quit` wakes every worker and the apply thread at once.
    quit_tx: Mutex<Option<Sender<()>>>,
    quit_rx: Receiver<()>,
    pub index_request: Queue<IndexRequest>,
    pub on_indexed: Queue<IndexUpdate>,
}

impl Pipeline {
    pub fn new(
        vfs: Arc<VfsState>,
        cache: Arc<CacheStore>,
        project: Arc<ProjectModel>,
        analyzer: Arc<dyn Analyzer>,
        queue_capacity: usize,
    ) -> Self {
        let (quit_tx, quit_rx) = crossbeam_channel::bounded(0);
        Pipeline {
            vfs,
            cache,
            project,
            analyzer,
            db: Arc::new(Mutex::new(Db::new())),
            quit_tx: Mutex::new(Some(quit_tx)),
            quit_rx,
            index_request: Queue::new(queue_capacity),
            on_indexed: Queue::new(queue_capacity),
        }
    }

    /// Close the quit channel, waking every worker and the apply thread
    /// out of their `MultiQueueWaiter::wait()` call.
    pub fn signal_quit(&self) {
        self.quit_tx.lock().take();
    }

    /// Spawn `n` indexer worker threads plus one apply thread. Returns
    /// their `JoinHandle`s; callers join them after signalling quit and
    /// draining the request queue.
    pub fn spawn(self: &Arc<Self>, n_workers: usize) -> Vec<std::thread::JoinHandle<()>> {
        let mut handles = Vec::with_capacity(n_workers + 1);
        for _ in 0..n_workers {
            let pipeline = self.clone();
            handles.push(std::thread::spawn(move || pipeline.worker_loop()));
        }
        let pipeline = self.clone();
        handles.push(std::thread::spawn(move || pipeline.apply_loop()));
        handles
    }

    /// One indexer worker's loop: pop a request, resolve compile args,
    /// decide a reparse level, attempt a cache-only path for low levels,
    /// otherwise invoke the Analyzer and publish deltas.
    fn worker_loop(&self) {
        loop {
            let mut waiter = MultiQueueWaiter::new();
            waiter.add(&self.index_request.receiver, "request");
            waiter.add(&self.quit_rx, "quit");
            if waiter.wait() == "quit" {
                break;
            }
            let request = match self.index_request.receiver.try_recv() {
                Ok(r) => r,
                Err(_) => continue,
            };

            if request.path.as_os_str().is_empty() {
                continue;
            }

            let entry = match self.project.find_entry(&request.path) {
                Some(e) => e,
                None => {
                    if request.must_exist {
                        tracing::warn!(path = %request.path.display(), "no compile entry, dropping request");
                    }
                    continue;
                }
            };

            self.handle_request(&request, entry.args);
        }
    }

    fn handle_request(&self, request: &IndexRequest, args: Vec<String>) {
        let file_mutex = self.vfs.get_file_mutex(&request.path);
        let _guard = file_mutex.lock();

        if request.mode == RequestMode::Delete {
            let prev = self
                .cache
                .load("", &request.path)
                .unwrap_or_else(|| IndexFile::new(request.path.clone(), 0, String::new(), String::new()));
            let empty = IndexFile::new(request.path.clone(), prev.mtime, String::new(), prev.language.clone());
            let mut update = diff(Some(&prev), &empty);
            update.files_removed = Some(request.path.clone());
            let _ = self.on_indexed.sender.send(update);
            return;
        }

        let ts = std::fs::metadata(&request.path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let prev = self.cache.load("", &request.path);

        // Cache-only fast path: if a previous index exists and the
        // on-disk contents haven't drifted from what it was built from,
        // republish it as a pure add instead of invoking the Analyzer.
        if let Some(cached) = &prev {
            if request.mode != RequestMode::OnChange {
                if let Ok(disk_contents) = std::fs::read_to_string(&request.path) {
                    if !crate::cache::has_changed(cached, &disk_contents) {
                        let claimed_cache_only = self.vfs.stamp(&request.path, ts, 1);
                        if claimed_cache_only {
                            let update = diff(None, cached);
                            self.vfs.increment_loaded(&request.path);
                            let _ = self.on_indexed.sender.send(update);
                        }
                        return;
                    }
                }
            }
        }

        let claimed = self.vfs.stamp(&request.path, ts, 2);
        if !claimed && request.mode != RequestMode::OnChange {
            return;
        }

        let overrides = Vec::new();
        let result = match self
            .analyzer
            .analyze(&args, &request.path, &overrides)
            .context("analyzing translation unit")
        {
            Ok(r) => r,
            Err(err) => {
                // Analyzer failure: do NOT advance the VFS step, so the
                // next stamp() call will retry.
                tracing::warn!(path = %request.path.display(), error = %err, "index request failed");
                self.vfs.reset_step(&request.path);
                return;
            }
        };

        if !result.ok {
            self.vfs.reset_step(&request.path);
            return;
        }

        for index in &result.indexes {
            let update = diff(prev.as_ref().filter(|p| p.path == index.path), index);
            if let Err(err) = self.cache.save("", &index.path, index, self.vfs.loaded(&index.path) + 1) {
                tracing::warn!(path = %index.path.display(), error = %err, "cache save failed");
            }
            self.vfs.increment_loaded(&index.path);
            let _ = self.on_indexed.sender.send(update);
        }
    }

    /// The single apply thread: sole writer of `Db`. On quit, drains
    /// whatever deltas are already queued before stopping, so a signalled
    /// quit never drops work a worker already published.
    fn apply_loop(&self) {
        loop {
            let mut waiter = MultiQueueWaiter::new();
            waiter.add(&self.on_indexed.receiver, "update");
            waiter.add(&self.quit_rx, "quit");
            if waiter.wait() == "quit" {
                while let Ok(update) = self.on_indexed.receiver.try_recv() {
                    self.db.lock().apply(&update);
                }
                break;
            }
            if let Ok(update) = self.on_indexed.receiver.try_recv() {
                self.db.lock().apply(&update);
            }
        }
    }

    pub fn snapshot(&self) -> Db {
        self.db.lock().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::MockAnalyzer;
    use crate::cache::{CacheStore, Format, PathLayout, Retention};
    use crate::index_file::Entry;
    use crate::types::{Kind, Pos, Range, SymbolKind, Usr};

    fn sample_index(path: PathBuf) -> IndexFile {
        let mut idx = IndexFile::new(path, 1, "int foo(){}".into(), "c".into());
        idx.usr2func.insert(
            Usr(1),
            Entry {
                def: Some(crate::index_file::Def {
                    detailed_name: "foo".into(),
                    spell: Some(Range::new(Pos::new(1, 4), Pos::new(1, 7))),
                    extent: Some(Range::new(Pos::new(1, 0), Pos::new(1, 11))),
                    ..Default::default()
                }),
                kind: Kind::Func,
                symbol_kind: SymbolKind::Function,
                ..Default::default()
            },
        );
        idx
    }

    #[test]
    fn single_worker_run_indexes_one_file() {
        let analyzer = Arc::new(MockAnalyzer::new());
        let path = PathBuf::from("/t.c");
        analyzer.register(path.clone(), vec![sample_index(path.clone())]);

        let pipeline = Arc::new(Pipeline::new(
            Arc::new(VfsState::new()),
            Arc::new(CacheStore::new(None, Format::Binary, PathLayout::Hierarchical, Retention::Never)),
            Arc::new(ProjectModel::new(vec!["-std=c11".into()])),
            analyzer,
            16,
        ));

        let handles = pipeline.spawn(1);
        pipeline
            .index_request
            .sender
            .send(IndexRequest {
                path: path.clone(),
                args: vec![],
                mode: RequestMode::Background,
                must_exist: false,
                id: 1,
            })
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(250));
        pipeline.signal_quit();
        for h in handles {
            let _ = h.join();
        }

        let db = pipeline.snapshot();
        assert_eq!(db.funcs.len(), 1);
    }
}
