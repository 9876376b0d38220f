//! Asset content representation.
//!
//! Content is either held in memory or left on disk as a lazily opened
//! stream. Reading a source file hashes it in a single pass while buffering
//! up to [`MAX_BUFFERED_LEN`] bytes; past that threshold the buffer is
//! discarded and the asset keeps a stream reference instead, so large files
//! never occupy unbounded memory while small files stay on the fast path.

use crate::fingerprint::hash_stream;
use crate::fs::FileSystem;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Largest file content kept fully in memory (5 MiB).
pub const MAX_BUFFERED_LEN: u64 = 5 * 1024 * 1024;

/// In-memory or streamed asset bytes.
#[derive(Debug, Clone)]
pub enum Content {
    /// Bytes held in memory
    Buffer(Vec<u8>),
    /// Bytes left on disk, re-opened on demand
    Stream {
        /// Path the stream is opened from
        path: PathBuf,
    },
}

impl Content {
    /// Content length, if known without touching the filesystem.
    #[must_use]
    pub fn buffered_len(&self) -> Option<u64> {
        match self {
            Self::Buffer(bytes) => Some(bytes.len() as u64),
            Self::Stream { .. } => None,
        }
    }

    /// Materialize the content as bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if a streamed file can no longer be read.
    pub async fn load(&self, fs: &dyn FileSystem) -> Result<Vec<u8>> {
        match self {
            Self::Buffer(bytes) => Ok(bytes.clone()),
            Self::Stream { path } => fs.read(path).await,
        }
    }

    /// Read a file into content, hashing it in the same pass.
    ///
    /// Returns the content together with its hash and size. Files up to
    /// [`MAX_BUFFERED_LEN`] bytes are buffered; larger files come back as
    /// [`Content::Stream`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub async fn from_file(fs: &dyn FileSystem, path: &Path) -> Result<(Self, String, u64)> {
        let mut stream = fs.open(path).await?;
        let mut buffer: Option<Vec<u8>> = Some(Vec::new());
        let (hash, size) = hash_stream(&mut stream, |chunk| {
            let overflows = buffer
                .as_ref()
                .is_some_and(|buf| (buf.len() + chunk.len()) as u64 > MAX_BUFFERED_LEN);
            if overflows {
                buffer = None;
            } else if let Some(buf) = buffer.as_mut() {
                buf.extend_from_slice(chunk);
            }
        })
        .await
        .map_err(|e| match e {
            Error::Io {
                source, operation, ..
            } => Error::Io {
                source,
                path: Some(path.into()),
                operation,
            },
            other => other,
        })?;

        let content = match buffer {
            Some(bytes) => Self::Buffer(bytes),
            None => {
                tracing::debug!(
                    path = %path.display(),
                    size,
                    "Content exceeds buffer threshold, keeping stream reference"
                );
                Self::Stream {
                    path: path.to_path_buf(),
                }
            }
        };
        Ok((content, hash, size))
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Buffer(bytes)
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Self::Buffer(s.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint_bytes;
    use crate::fs::OsFileSystem;
    use tempfile::TempDir;

    async fn read_file(len: u64) -> (Content, String, u64, TempDir) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob.bin");
        std::fs::write(&path, vec![42u8; len as usize]).unwrap();
        let (content, hash, size) = Content::from_file(&OsFileSystem, &path).await.unwrap();
        (content, hash, size, tmp)
    }

    #[tokio::test]
    async fn small_file_is_buffered() {
        let (content, hash, size, _tmp) = read_file(64).await;
        assert!(matches!(content, Content::Buffer(_)));
        assert_eq!(size, 64);
        assert_eq!(hash, fingerprint_bytes(&vec![42u8; 64]));
    }

    #[tokio::test]
    async fn file_at_threshold_is_buffered() {
        let (content, _, size, _tmp) = read_file(MAX_BUFFERED_LEN).await;
        assert!(matches!(content, Content::Buffer(_)));
        assert_eq!(size, MAX_BUFFERED_LEN);
    }

    #[tokio::test]
    async fn file_past_threshold_falls_back_to_stream() {
        let (content, hash, size, _tmp) = read_file(MAX_BUFFERED_LEN + 1).await;
        assert!(matches!(content, Content::Stream { .. }));
        assert_eq!(size, MAX_BUFFERED_LEN + 1);
        // The hash still covers the full content.
        assert_eq!(
            hash,
            fingerprint_bytes(&vec![42u8; (MAX_BUFFERED_LEN + 1) as usize])
        );
    }

    #[tokio::test]
    async fn stream_content_loads_from_disk() {
        let (content, _, _, _tmp) = read_file(MAX_BUFFERED_LEN + 1).await;
        let bytes = content.load(&OsFileSystem).await.unwrap();
        assert_eq!(bytes.len() as u64, MAX_BUFFERED_LEN + 1);
    }
}
