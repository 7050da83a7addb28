//! Structured error types for every fallible boundary in the pipeline.
//!
//! Analyzer failures and cache misses are recoverable and typed;
//! invariant violations inside the apply loop are not represented as
//! `Result` at all because continuing after one is unsafe (see
//! `db::invariant_violation`).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("analyzer crashed or the compile driver refused to run for {path}")]
    Failed { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache entry for {path} has incompatible version {found} (expected {expected})")]
    VersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
    #[error("cache entry for {path} is truncated or corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error("failed to read cache entry for {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write cache entry for {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    /// Whether this error should be treated as a cache miss (continue with
    /// a full parse) rather than surfaced to the caller. Every `CacheError`
    /// variant is recoverable this way.
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Adds context to a `Result`'s error without discarding the original.
/// Blanket impl over any error convertible to `CoreError`.
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> Result<T, CoreError>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: Into<CoreError>,
{
    fn context(self, msg: &str) -> Result<T, CoreError> {
        self.map_err(|e| {
            let inner = e.into();
            tracing::debug!(context = msg, error = %inner, "operation failed");
            inner
        })
    }
}
