//! Shared process options.

use kiln_core::fs::{FileSystem, OsFileSystem};
use std::path::PathBuf;
use std::sync::Arc;

/// Options shared by every request in a build.
///
/// Passed around behind an `Arc` as an opaque handle; the handle is
/// excluded from request identity so that two processes with differently
/// configured caches still agree on request ids.
#[derive(Debug, Clone)]
pub struct Options {
    /// Whether requests may be served from the request cache
    pub cache: bool,
    /// Root directory for cache entries and the blob store
    pub cache_dir: PathBuf,
    /// Lock file driving dev-dependency version invalidation, if any
    pub lock_file: Option<PathBuf>,
    /// Filesystem sources are read through
    pub input_fs: Arc<dyn FileSystem>,
    /// Project root directory
    pub project_root: PathBuf,
}

impl Options {
    /// Create options with the given cache directory and defaults
    /// everywhere else.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache: true,
            cache_dir: cache_dir.into(),
            lock_file: None,
            input_fs: Arc::new(OsFileSystem),
            project_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Opt out of request cache lookups.
    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.cache = false;
        self
    }

    /// Set the lock file for dev-dependency version invalidation.
    #[must_use]
    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(path.into());
        self
    }
}
