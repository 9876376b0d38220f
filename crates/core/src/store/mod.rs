//! Content-addressed storage for intermediate assets.
//!
//! Two layers: [`BlobStore`] holds raw bytes keyed by their own hash in a
//! two-level sharded directory tree, and [`AssetStore`] commits whole
//! assets (content, source map, AST) on top of it and validates the
//! connected files recorded against cached assets.

mod assets;
mod blob;

pub use assets::AssetStore;
pub use blob::BlobStore;
