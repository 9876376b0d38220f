//! Content-addressed blob storage.

use crate::fingerprint::fingerprint_bytes;
use crate::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Blob store keyed by content hash.
///
/// Blobs live at `{root}/{key[0:2]}/{key[2:4]}/{key}` so that no single
/// directory accumulates an unbounded number of entries. Writes go through
/// a temp file followed by an atomic rename, which also makes concurrent
/// commits of the same key coalesce: whichever rename lands last installs
/// identical bytes.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Create a blob store rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        debug_assert!(key.len() >= 4, "blob keys are full hex digests");
        self.root.join(&key[0..2]).join(&key[2..4]).join(key)
    }

    /// Store bytes and return their content key.
    ///
    /// Idempotent: committing bytes that are already present is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be written.
    pub fn put(&self, bytes: &[u8]) -> Result<String> {
        let key = fingerprint_bytes(bytes);
        let path = self.blob_path(&key);
        if path.exists() {
            return Ok(key);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create_dir_all"))?;
        }

        let tmp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp_path).map_err(|e| Error::io(e, &tmp_path, "create"))?;
        file.write_all(bytes)
            .map_err(|e| Error::io(e, &tmp_path, "write"))?;
        file.sync_all()
            .map_err(|e| Error::io(e, &tmp_path, "sync"))?;
        drop(file);

        fs::rename(&tmp_path, &path).map_err(|e| Error::io(e, &path, "rename"))?;
        Ok(key)
    }

    /// Load a blob by key, verifying its integrity.
    ///
    /// Returns `None` when the blob is absent or fails verification; a
    /// corrupt blob is indistinguishable from a missing one to callers,
    /// which treat both as a cache miss.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.blob_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(key, error = %e, "Blob read failed, treating as miss");
                }
                return None;
            }
        };
        if fingerprint_bytes(&bytes) != key {
            tracing::warn!(key, path = %path.display(), "Blob failed integrity check");
            return None;
        }
        Some(bytes)
    }

    /// Whether a blob with the given key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.blob_path(key).exists()
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}
