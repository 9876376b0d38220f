//! Asset commitment and read-back.

use super::BlobStore;
use crate::asset::{Asset, AssetStats, CommittedAsset, ConnectedFile};
use crate::content::{Content, MAX_BUFFERED_LEN};
use crate::fingerprint::hash_stream;
use crate::fs::FileSystem;
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Owns intermediate assets: commits their artifacts to the blob store and
/// re-reads them on demand.
#[derive(Debug, Clone)]
pub struct AssetStore {
    blobs: BlobStore,
    fs: Arc<dyn FileSystem>,
}

impl AssetStore {
    /// Create an asset store over the given blob root and filesystem.
    #[must_use]
    pub fn new(blob_root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            blobs: BlobStore::new(blob_root),
            fs,
        }
    }

    /// The underlying blob store.
    #[must_use]
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Commit an asset's content, map and AST under content-derived keys.
    ///
    /// Idempotent on content hash; committing the same asset twice writes
    /// nothing new.
    ///
    /// # Errors
    ///
    /// Returns an error if streamed content cannot be read or a blob cannot
    /// be written.
    pub async fn commit(&self, asset: Asset) -> Result<CommittedAsset> {
        tracing::debug!(asset = %asset.id, "Committing asset");
        let bytes = asset.content.load(self.fs.as_ref()).await?;
        let hash = self.blobs.put(&bytes)?;
        debug_assert_eq!(hash, asset.hash, "asset hash must match its content");

        let map_key = match &asset.map {
            Some(map) => {
                let encoded = serde_json::to_vec(map)
                    .map_err(|e| Error::serialization(format!("Failed to encode map: {e}")))?;
                Some(self.blobs.put(&encoded)?)
            }
            None => None,
        };
        let ast_key = match &asset.ast {
            Some(ast) => {
                let encoded = serde_json::to_vec(ast)
                    .map_err(|e| Error::serialization(format!("Failed to encode AST: {e}")))?;
                Some(self.blobs.put(&encoded)?)
            }
            None => None,
        };

        Ok(CommittedAsset {
            id: asset.id,
            id_base: asset.id_base,
            file_path: asset.file_path,
            asset_type: asset.asset_type,
            env: asset.env,
            hash,
            map_key,
            ast_key,
            stats: asset.stats,
            side_effects: asset.side_effects,
            dependencies: asset.dependencies,
            connected_files: asset.connected_files,
            meta: asset.meta,
        })
    }

    /// Retrieve committed bytes by content key.
    ///
    /// Missing and corrupt blobs both come back as `None`; read-back
    /// failures are a cache miss, never fatal.
    #[must_use]
    pub fn read(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.get(key)
    }

    /// Rebuild a mutable [`Asset`] from its committed form.
    ///
    /// Content under the buffering threshold is hydrated from the blob
    /// store; anything larger keeps a stream reference to the original
    /// source path.
    ///
    /// # Errors
    ///
    /// Returns an error if the content blob is missing or an artifact fails
    /// to decode; callers treat that as a cache miss for the asset.
    pub fn hydrate(&self, committed: &CommittedAsset) -> Result<Asset> {
        let content = if committed.stats.size <= MAX_BUFFERED_LEN {
            let bytes = self.read(&committed.hash).ok_or_else(|| {
                Error::invalid_input(format!("Missing content blob for asset {}", committed.id))
            })?;
            Content::Buffer(bytes)
        } else {
            Content::Stream {
                path: committed.file_path.clone(),
            }
        };

        let map = match &committed.map_key {
            Some(key) => {
                let bytes = self.read(key).ok_or_else(|| {
                    Error::invalid_input(format!("Missing map blob for asset {}", committed.id))
                })?;
                Some(serde_json::from_slice(&bytes).map_err(|e| {
                    Error::serialization(format!("Failed to decode map: {e}"))
                })?)
            }
            None => None,
        };
        let ast = match &committed.ast_key {
            Some(key) => {
                let bytes = self.read(key).ok_or_else(|| {
                    Error::invalid_input(format!("Missing AST blob for asset {}", committed.id))
                })?;
                Some(serde_json::from_slice(&bytes).map_err(|e| {
                    Error::serialization(format!("Failed to decode AST: {e}"))
                })?)
            }
            None => None,
        };

        Ok(Asset {
            id: committed.id.clone(),
            id_base: committed.id_base.clone(),
            file_path: committed.file_path.clone(),
            asset_type: committed.asset_type.clone(),
            env: committed.env.clone(),
            content,
            hash: committed.hash.clone(),
            ast,
            map,
            stats: AssetStats {
                size: committed.stats.size,
                time_ms: committed.stats.time_ms,
            },
            side_effects: committed.side_effects,
            dependencies: committed.dependencies.clone(),
            connected_files: committed.connected_files.clone(),
            meta: committed.meta.clone(),
        })
    }

    /// Re-hash every declared connected file and compare against the
    /// recorded hashes.
    ///
    /// Returns `true` iff every file still hashes to its recorded value; a
    /// missing or unreadable file counts as changed.
    pub async fn check_connected_files(&self, files: &[ConnectedFile]) -> bool {
        for file in files {
            let mut stream = match self.fs.open(&file.file_path).await {
                Ok(stream) => stream,
                Err(_) => {
                    tracing::debug!(
                        path = %file.file_path.display(),
                        "Connected file unreadable, invalidating"
                    );
                    return false;
                }
            };
            let current = match hash_stream(stream.as_mut(), |_| {}).await {
                Ok((hash, _)) => hash,
                Err(_) => return false,
            };
            if current != file.hash {
                tracing::debug!(
                    path = %file.file_path.display(),
                    "Connected file changed, invalidating"
                );
                return false;
            }
        }
        true
    }
}
