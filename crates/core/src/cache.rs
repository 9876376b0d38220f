//! Request-level result cache.
//!
//! Maps a request fingerprint to the [`CacheEntry`] recorded by the last
//! successful run. Entries are persisted as JSON under the cache directory
//! and replaced atomically; a retrieved entry is only trusted after its
//! assets' connected files re-hash to their recorded values.

use crate::asset::CommittedAsset;
use crate::env::Env;
use crate::store::AssetStore;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The persisted result of a successful asset request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Source file the request transformed
    pub file_path: PathBuf,
    /// Target environment of the request
    pub env: Env,
    /// Content hash of the request's input
    pub hash: String,
    /// Final assets produced by the pipeline
    pub assets: Vec<CommittedAsset>,
    /// Pre-post-process assets, present only when a post-processing step
    /// rewrote the pipeline's outputs; lets cache re-hits match either
    /// representation and skip re-running earlier stages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_assets: Option<Vec<CommittedAsset>>,
    /// When the entry was recorded
    pub created_at: DateTime<Utc>,
}

/// Fingerprint-keyed cache of request results.
#[derive(Debug, Clone)]
pub struct RequestCache {
    dir: PathBuf,
}

impl RequestCache {
    /// Create a cache rooted at the given directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Look up an entry by request fingerprint.
    ///
    /// Unreadable or corrupt entries come back as `None`; cache corruption
    /// is a miss, never fatal.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(key, error = %e, "Cache entry unreadable, treating as miss");
                }
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache entry corrupt, treating as miss");
                None
            }
        }
    }

    /// Store an entry, replacing any previous one atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be serialized or written.
    pub fn set(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::io(e, &self.dir, "create_dir_all"))?;
        let path = self.entry_path(key);
        let json = serde_json::to_vec_pretty(entry)
            .map_err(|e| Error::serialization(format!("Failed to serialize cache entry: {e}")))?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|e| Error::io(e, &tmp_path, "write"))?;
        fs::rename(&tmp_path, &path).map_err(|e| Error::io(e, &path, "rename"))?;
        Ok(())
    }

    /// Validate a retrieved entry by re-hashing every asset's connected
    /// files.
    pub async fn check_cached_assets(&self, store: &AssetStore, entry: &CacheEntry) -> bool {
        for asset in &entry.assets {
            if !store.check_connected_files(&asset.connected_files).await {
                return false;
            }
        }
        true
    }

    /// Cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{Asset, ConnectedFile};
    use crate::content::Content;
    use crate::fingerprint::fingerprint_bytes;
    use crate::fs::OsFileSystem;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn committed(store: &AssetStore, content: &str) -> CommittedAsset {
        let asset = Asset::new(
            "/src/a.js",
            "/src/a.js",
            "js",
            Env::default(),
            Content::Buffer(content.as_bytes().to_vec()),
            fingerprint_bytes(content.as_bytes()),
            content.len() as u64,
            true,
        )
        .unwrap();
        store.commit(asset).await.unwrap()
    }

    fn entry(assets: Vec<CommittedAsset>) -> CacheEntry {
        CacheEntry {
            file_path: "/src/a.js".into(),
            env: Env::default(),
            hash: "input-hash".into(),
            assets,
            initial_assets: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = AssetStore::new(tmp.path().join("blobs"), Arc::new(OsFileSystem));
        let cache = RequestCache::new(tmp.path().join("entries"));

        let e = entry(vec![committed(&store, "x = 1").await]);
        cache.set("key-a", &e).unwrap();
        assert_eq!(cache.get("key-a").unwrap(), e);
    }

    #[test]
    fn missing_entry_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = RequestCache::new(tmp.path());
        assert!(cache.get("nope").is_none());
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = RequestCache::new(tmp.path());
        fs::write(tmp.path().join("bad.json"), b"{not json").unwrap();
        assert!(cache.get("bad").is_none());
    }

    #[tokio::test]
    async fn validation_fails_when_connected_file_changes() {
        let tmp = TempDir::new().unwrap();
        let store = AssetStore::new(tmp.path().join("blobs"), Arc::new(OsFileSystem));
        let cache = RequestCache::new(tmp.path().join("entries"));

        let dep = tmp.path().join("b.txt");
        fs::write(&dep, b"one").unwrap();
        let mut asset = committed(&store, "x = 1").await;
        asset.connected_files.push(ConnectedFile {
            file_path: dep.clone(),
            hash: fingerprint_bytes(b"one"),
        });
        let e = entry(vec![asset]);

        assert!(cache.check_cached_assets(&store, &e).await);
        fs::write(&dep, b"two").unwrap();
        assert!(!cache.check_cached_assets(&store, &e).await);
    }
}
