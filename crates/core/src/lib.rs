//! Core types for the kiln asset transformation pipeline.
//!
//! This crate holds the pieces every other kiln crate builds on:
//!
//! - [`fingerprint`]: deterministic content digests used as identity keys
//! - [`asset`]: the intermediate asset model and transformer result payloads
//! - [`content`]: the buffered-or-streamed content representation
//! - [`store`]: the content-addressed blob and asset stores
//! - [`cache`]: the fingerprint-keyed request result cache
//! - [`fs`]: the filesystem seam the pipeline reads sources through
//!
//! Everything persisted (blobs, cache entries, fingerprint envelopes) is
//! keyed by content, so identical inputs land on identical keys across
//! processes and runs.

mod error;

pub mod asset;
pub mod cache;
pub mod content;
pub mod env;
pub mod fingerprint;
pub mod fs;
pub mod store;

pub use error::{Error, Result};

pub use asset::{
    Asset, AssetStats, Ast, CommittedAsset, ConnectedFile, Dependency, SourceMap,
    TransformerResult,
};
pub use cache::{CacheEntry, RequestCache};
pub use content::{Content, MAX_BUFFERED_LEN};
pub use env::Env;
pub use fs::{FileSystem, OsFileSystem};
pub use store::{AssetStore, BlobStore};
