//! Filesystem seam.
//!
//! The pipeline reads sources through a [`FileSystem`] handle so that tests
//! and embedders can substitute their own backing store. The default
//! implementation is [`OsFileSystem`].

use crate::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;

/// A readable byte stream opened from a [`FileSystem`].
pub type FileStream = Box<dyn AsyncRead + Send + Unpin>;

/// Read-side filesystem operations consumed by the pipeline.
#[async_trait]
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Resolve a path to its canonical form, following symlinks.
    fn realpath(&self, path: &Path) -> Result<PathBuf>;

    /// Read a file's entire contents.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Open a file as a byte stream.
    async fn open(&self, path: &Path) -> Result<FileStream>;

    /// Size of a file in bytes.
    async fn len(&self, path: &Path) -> Result<u64>;
}

/// [`FileSystem`] backed by the host OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

#[async_trait]
impl FileSystem for OsFileSystem {
    fn realpath(&self, path: &Path) -> Result<PathBuf> {
        std::fs::canonicalize(path).map_err(|e| Error::io(e, path, "realpath"))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| Error::io(e, path, "read"))
    }

    async fn open(&self, path: &Path) -> Result<FileStream> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| Error::io(e, path, "open"))?;
        Ok(Box::new(file))
    }

    async fn len(&self, path: &Path) -> Result<u64> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::io(e, path, "stat"))?;
        Ok(meta.len())
    }
}
