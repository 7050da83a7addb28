//! Content-addressed on-disk cache plus bounded in-memory retention.
//!
//! Writes are atomic (write-temp-then-rename) and payloads carry a version
//! tag so an incompatible on-disk layout is rejected as a cache miss
//! rather than misinterpreted.

use crate::error::CacheError;
use crate::index_file::IndexFile;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Bumped whenever the on-disk layout changes incompatibly. A load whose
/// stored tag doesn't match this is rejected as a cache miss rather than
/// interpreted.
pub const MAJOR_VERSION: u32 = 1;

/// Content hash used to decide, cheaply, whether a cached entry's source
/// contents still match disk without deserializing the full payload.
pub fn content_hash(contents: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(contents.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Whether `new_contents` differs from the contents a cached `IndexFile`
/// was built from.
pub fn has_changed(cached: &IndexFile, new_contents: &str) -> bool {
    content_hash(&cached.file_contents) != content_hash(new_contents)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Binary,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathLayout {
    Flat,
    Hierarchical,
}

/// `retainInMemory` policy: when to keep an in-memory copy after a
/// successful parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Never = 0,
    AfterInitialLoad = 1,
    AfterFirstSave = 2,
}

#[derive(Debug, Serialize, Deserialize)]
struct OnDiskRecord {
    version: u32,
    file_contents: String,
    index: IndexFileWire,
}

/// A serde-friendly mirror of `IndexFile`. Kept distinct from `IndexFile`
/// itself so the wire format's version tag stays independent of any
/// future in-memory representation change.
#[derive(Debug, Serialize, Deserialize)]
struct IndexFileWire(IndexFile);

pub struct CacheStore {
    root: Option<PathBuf>,
    format: Format,
    layout: PathLayout,
    retention: Retention,
    memory: RwLock<HashMap<PathBuf, (IndexFile, String)>>,
}

impl CacheStore {
    pub fn new(root: Option<PathBuf>, format: Format, layout: PathLayout, retention: Retention) -> Self {
        CacheStore {
            root,
            format,
            layout,
            retention,
            memory: RwLock::new(HashMap::new()),
        }
    }

    fn escape(component: &str) -> String {
        component.replace('/', "@")
    }

    fn disk_paths(&self, workspace_prefix: &str, relative_path: &Path) -> Option<(PathBuf, PathBuf, PathBuf)> {
        let root = self.root.as_ref()?;
        let base = match self.layout {
            PathLayout::Flat => root
                .join(Self::escape(workspace_prefix))
                .join(Self::escape(&relative_path.to_string_lossy())),
            PathLayout::Hierarchical => root.join(relative_path),
        };
        let ext = match self.format {
            Format::Binary => "blob",
            Format::Json => "json",
        };
        Some((
            base.with_extension(ext),
            base.clone(),
            base.with_extension("contents"),
        ))
    }

    /// Persist `index` for `path`, retaining in memory per the configured
    /// policy and `loaded` counter. Writes are atomic: write-temp then
    /// rename, both for the payload and the adjacent raw-contents file.
    pub fn save(
        &self,
        workspace_prefix: &str,
        relative_path: &Path,
        index: &IndexFile,
        loaded: u32,
    ) -> Result<(), CacheError> {
        if let Some((payload_path, _base, contents_path)) = self.disk_paths(workspace_prefix, relative_path) {
            if let Some(parent) = payload_path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| CacheError::Write {
                    path: payload_path.clone(),
                    source,
                })?;
            }

            let record = OnDiskRecord {
                version: MAJOR_VERSION,
                file_contents: index.file_contents.clone(),
                index: IndexFileWire(index.clone()),
            };

            match self.format {
                Format::Binary => {
                    let bytes = bincode::serialize(&record).map_err(|e| CacheError::Corrupt {
                        path: payload_path.clone(),
                        message: e.to_string(),
                    })?;
                    atomic_write(&payload_path, &bytes)?;
                }
                Format::Json => {
                    let text = serde_json::to_vec_pretty(&record).map_err(|e| CacheError::Corrupt {
                        path: payload_path.clone(),
                        message: e.to_string(),
                    })?;
                    atomic_write(&payload_path, &text)?;
                }
            }
            atomic_write(&contents_path, index.file_contents.as_bytes())?;
        }

        let should_retain = match self.retention {
            Retention::Never => false,
            Retention::AfterInitialLoad => loaded >= 1,
            Retention::AfterFirstSave => loaded >= 2,
        };
        if should_retain {
            self.memory.write().insert(
                relative_path.to_path_buf(),
                (index.clone(), index.file_contents.clone()),
            );
        }

        Ok(())
    }

    /// Load path: try in-memory, then disk. `None` means "force reparse".
    /// Any `CacheError` along the way is recoverable, so it's logged and
    /// folded into `None` rather than propagated.
    pub fn load(&self, workspace_prefix: &str, relative_path: &Path) -> Option<IndexFile> {
        match self.try_load(workspace_prefix, relative_path) {
            Ok(index) => index,
            Err(err) => {
                debug_assert!(err.is_recoverable());
                tracing::debug!(path = %relative_path.display(), error = %err, "cache load failed, forcing reparse");
                None
            }
        }
    }

    /// Same as `load`, but surfaces the distinction between "no entry"
    /// (`Ok(None)`) and a read/version/corruption failure (`Err`).
    pub fn try_load(
        &self,
        workspace_prefix: &str,
        relative_path: &Path,
    ) -> Result<Option<IndexFile>, CacheError> {
        if let Some((index, _contents)) = self.memory.read().get(relative_path) {
            return Ok(Some(index.clone()));
        }

        let Some((payload_path, _base, contents_path)) = self.disk_paths(workspace_prefix, relative_path) else {
            return Ok(None);
        };
        if !payload_path.exists() || !contents_path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&payload_path).map_err(|source| CacheError::Read {
            path: payload_path.clone(),
            source,
        })?;
        let record: OnDiskRecord = match self.format {
            Format::Binary => bincode::deserialize(&bytes).map_err(|e| CacheError::Corrupt {
                path: payload_path.clone(),
                message: e.to_string(),
            })?,
            Format::Json => serde_json::from_slice(&bytes).map_err(|e| CacheError::Corrupt {
                path: payload_path.clone(),
                message: e.to_string(),
            })?,
        };
        if record.version != MAJOR_VERSION {
            return Err(CacheError::VersionMismatch {
                path: payload_path,
                found: record.version,
                expected: MAJOR_VERSION,
            });
        }
        Ok(Some(record.index.0))
    }

    pub fn clear(&self) {
        self.memory.write().clear();
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let tmp = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("")
    ));
    std::fs::write(&tmp, bytes).map_err(|source| CacheError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| CacheError::Write {
        path: path.to_path_buf(),
        source,
    })
}
