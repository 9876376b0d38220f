//! The asset model.
//!
//! An [`Asset`] is an intermediate, content-addressed artifact flowing
//! through the transform pipeline: bytes plus metadata plus an optional
//! AST. Assets are created by the pipeline, mutated only by the transformer
//! currently holding them, committed exactly once to the asset store, and
//! immutable afterwards ([`CommittedAsset`]).

use crate::content::Content;
use crate::env::Env;
use crate::fingerprint::{fingerprint, fingerprint_bytes};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An AST produced by a transformer.
///
/// The program is opaque to the core; only the transformer identified by
/// `producer_id` (or one that declares it can reuse the producer's output)
/// may interpret it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ast {
    /// Plugin id of the transformer that produced this AST
    pub producer_id: String,
    /// Opaque program representation
    pub program: serde_json::Value,
}

impl Ast {
    /// Create an AST owned by the given producer.
    #[must_use]
    pub fn new(producer_id: impl Into<String>, program: serde_json::Value) -> Self {
        Self {
            producer_id: producer_id.into(),
            program,
        }
    }
}

/// An opaque source map accompanying generated code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMap(pub serde_json::Value);

/// Size and timing accounting for an asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetStats {
    /// Content size in bytes
    pub size: u64,
    /// Wall time spent producing the asset, in milliseconds
    pub time_ms: u128,
}

/// A file whose content influences an asset.
///
/// Any change to a connected file must invalidate the asset; the recorded
/// hash is compared against a re-hash of the file during cache validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedFile {
    /// Path of the connected file
    pub file_path: PathBuf,
    /// Content hash recorded when the asset was produced
    pub hash: String,
}

/// A dependency discovered by a transformer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Module specifier as written in the source
    pub specifier: String,
    /// Opaque per-dependency metadata
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub meta: serde_json::Value,
}

impl Dependency {
    /// Create a dependency on the given specifier.
    #[must_use]
    pub fn new(specifier: impl Into<String>) -> Self {
        Self {
            specifier: specifier.into(),
            meta: serde_json::Value::Null,
        }
    }
}

/// The payload a transformer emits per produced asset.
#[derive(Debug, Clone)]
pub struct TransformerResult {
    /// File-extension-derived type of the produced asset (e.g. "js")
    pub asset_type: String,
    /// Produced content
    pub content: Content,
    /// AST handed to downstream transformers, if any
    pub ast: Option<Ast>,
    /// Source map for the produced content
    pub map: Option<SourceMap>,
    /// Dependencies discovered while transforming
    pub dependencies: Vec<Dependency>,
    /// Files whose change must invalidate the produced asset
    pub connected_files: Vec<ConnectedFile>,
    /// Target environment override; inherits the input asset's when `None`
    pub env: Option<Env>,
    /// Whether the asset must stay isolated from sibling outputs
    pub is_isolated: bool,
    /// Opaque metadata bag
    pub meta: serde_json::Value,
}

impl TransformerResult {
    /// Create a result of the given type with the given content.
    #[must_use]
    pub fn new(asset_type: impl Into<String>, content: impl Into<Content>) -> Self {
        Self {
            asset_type: asset_type.into(),
            content: content.into(),
            ast: None,
            map: None,
            dependencies: Vec::new(),
            connected_files: Vec::new(),
            env: None,
            is_isolated: false,
            meta: serde_json::Value::Null,
        }
    }

    /// Attach an AST to the result.
    #[must_use]
    pub fn with_ast(mut self, ast: Ast) -> Self {
        self.ast = Some(ast);
        self
    }

    /// Declare a connected file.
    #[must_use]
    pub fn with_connected_file(mut self, file: ConnectedFile) -> Self {
        self.connected_files.push(file);
        self
    }
}

/// An intermediate asset owned by the pipeline.
#[derive(Debug, Clone)]
pub struct Asset {
    /// Content-derived identity (see [`Asset::make_id`])
    pub id: String,
    /// File path for file inputs, content hash for inline inputs
    pub id_base: String,
    /// Source path the asset is associated with
    pub file_path: PathBuf,
    /// File-extension-derived type (e.g. "js", "css")
    pub asset_type: String,
    /// Target environment
    pub env: Env,
    /// Asset bytes
    pub content: Content,
    /// Content hash; always a pure function of `content`
    pub hash: String,
    /// AST carried between adjacent transformers that can share it
    pub ast: Option<Ast>,
    /// Source map accompanying the content
    pub map: Option<SourceMap>,
    /// Size and timing accounting
    pub stats: AssetStats,
    /// Side-effect hint from the input
    pub side_effects: bool,
    /// Dependencies discovered so far
    pub dependencies: Vec<Dependency>,
    /// Superset of every file whose change must invalidate this asset
    pub connected_files: Vec<ConnectedFile>,
    /// Opaque metadata bag
    pub meta: serde_json::Value,
}

impl Asset {
    /// Derive a stable asset id from its identity components.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment cannot be serialized.
    pub fn make_id(id_base: &str, asset_type: &str, env: &Env, salt: &str) -> Result<String> {
        fingerprint(&(id_base, asset_type, env, salt))
    }

    /// Create an asset from already-hashed content.
    ///
    /// # Errors
    ///
    /// Returns an error if the id cannot be derived.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id_base: impl Into<String>,
        file_path: impl Into<PathBuf>,
        asset_type: impl Into<String>,
        env: Env,
        content: Content,
        hash: String,
        size: u64,
        side_effects: bool,
    ) -> Result<Self> {
        let id_base = id_base.into();
        let asset_type = asset_type.into();
        let id = Self::make_id(&id_base, &asset_type, &env, "")?;
        Ok(Self {
            id,
            id_base,
            file_path: file_path.into(),
            asset_type,
            env,
            content,
            hash,
            ast: None,
            map: None,
            stats: AssetStats { size, time_ms: 0 },
            side_effects,
            dependencies: Vec::new(),
            connected_files: Vec::new(),
            meta: serde_json::Value::Null,
        })
    }

    /// Replace the asset's content with in-memory code.
    ///
    /// Recomputes the hash and size so that the hash stays a pure function
    /// of the content.
    pub fn set_code(&mut self, bytes: Vec<u8>) {
        self.hash = fingerprint_bytes(&bytes);
        self.stats.size = bytes.len() as u64;
        self.content = Content::Buffer(bytes);
    }

    /// Record a connected file, deduplicating by path.
    pub fn add_connected_file(&mut self, file: ConnectedFile) {
        if !self
            .connected_files
            .iter()
            .any(|existing| existing.file_path == file.file_path)
        {
            self.connected_files.push(file);
        }
    }

    /// Build a child asset from a transformer result.
    ///
    /// The child inherits the parent's `id_base` (salted per result), its
    /// environment unless the result overrides it, and the union of the
    /// parent's and the result's connected files. Dependencies are the
    /// result's own. The hash is computed over the result content.
    ///
    /// # Errors
    ///
    /// Returns an error if streamed result content cannot be read while
    /// hashing, or the child id cannot be derived.
    pub async fn child_from_result(
        &self,
        result: TransformerResult,
        salt: &str,
        fs: &dyn crate::fs::FileSystem,
    ) -> Result<Asset> {
        let env = result.env.unwrap_or_else(|| self.env.clone());
        let (hash, size) = match &result.content {
            Content::Buffer(bytes) => (fingerprint_bytes(bytes), bytes.len() as u64),
            Content::Stream { .. } => {
                let bytes = result.content.load(fs).await?;
                (fingerprint_bytes(&bytes), bytes.len() as u64)
            }
        };
        let id = Self::make_id(&self.id_base, &result.asset_type, &env, salt)?;

        let mut connected_files = self.connected_files.clone();
        for file in result.connected_files {
            if !connected_files
                .iter()
                .any(|existing| existing.file_path == file.file_path)
            {
                connected_files.push(file);
            }
        }

        Ok(Asset {
            id,
            id_base: self.id_base.clone(),
            file_path: self.file_path.clone(),
            asset_type: result.asset_type,
            env,
            content: result.content,
            hash,
            ast: result.ast,
            map: result.map,
            stats: AssetStats { size, time_ms: 0 },
            side_effects: self.side_effects && !result.is_isolated,
            dependencies: result.dependencies,
            connected_files,
            meta: result.meta,
        })
    }

    /// Snapshot the asset as its own child, salted per result position.
    ///
    /// Used when a transformer forwards its (possibly mutated) input instead
    /// of emitting an explicit result.
    ///
    /// # Errors
    ///
    /// Returns an error if the child id cannot be derived.
    pub fn forwarded(&self, salt: &str) -> Result<Asset> {
        let mut child = self.clone();
        child.id = Self::make_id(&self.id_base, &self.asset_type, &self.env, salt)?;
        Ok(child)
    }
}

/// The immutable, persisted form of an asset.
///
/// Content, map and AST live in the blob store under the recorded keys;
/// everything else is carried inline so cache entries can be validated
/// without touching the blobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedAsset {
    /// Stable asset id
    pub id: String,
    /// File path for file inputs, content hash for inline inputs
    pub id_base: String,
    /// Source path the asset is associated with
    pub file_path: PathBuf,
    /// File-extension-derived type
    pub asset_type: String,
    /// Target environment
    pub env: Env,
    /// Content hash; doubles as the blob-store key for the content
    pub hash: String,
    /// Blob-store key of the source map, if one was committed
    pub map_key: Option<String>,
    /// Blob-store key of the serialized AST, if one was committed
    pub ast_key: Option<String>,
    /// Size and timing accounting
    pub stats: AssetStats,
    /// Side-effect hint
    pub side_effects: bool,
    /// Dependencies discovered by transformers
    pub dependencies: Vec<Dependency>,
    /// Files whose change must invalidate this asset
    pub connected_files: Vec<ConnectedFile>,
    /// Opaque metadata bag
    pub meta: serde_json::Value,
}
