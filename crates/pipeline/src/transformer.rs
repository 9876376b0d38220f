//! The transformer plugin seam.
//!
//! A transformer implements any subset of the hooks over a single source
//! type; the pipeline runner drives an ordered chain of them. Hooks with a
//! default implementation behave as if the transformer did not expose the
//! hook at all.

use crate::options::Options;
use async_trait::async_trait;
use kiln_core::{Asset, Ast, Content, Result, SourceMap, TransformerResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Module resolution backed by the resolver subsystem.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `specifier` as imported from `from` under `env`.
    ///
    /// # Errors
    ///
    /// Returns [`kiln_core::Error::Resolve`] when the specifier cannot be
    /// found; transformers decide whether to rethrow.
    async fn resolve(
        &self,
        env: &kiln_core::Env,
        specifier: &str,
        from: &Path,
    ) -> Result<PathBuf>;
}

/// Invalidation metadata describing a loaded configuration.
///
/// Returned to the asset request driver, which registers a config
/// sub-request installing the corresponding edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigRequestResult {
    /// Path of the config file that was resolved, if any
    pub resolved_path: Option<PathBuf>,
    /// Additional files the config's content depends on
    pub included_files: Vec<PathBuf>,
    /// Glob whose future matches should invalidate the config
    pub watch_glob: Option<String>,
    /// Whether the config must be re-validated on every startup
    pub should_invalidate_on_startup: bool,
    /// Dev dependencies the config loads, mapped to opaque version stamps
    pub dev_deps: BTreeMap<String, String>,
}

/// A loaded transformer configuration.
#[derive(Debug, Clone)]
pub struct TransformerConfig {
    /// The config object, passed unchanged to the transformer's other hooks
    pub value: serde_json::Value,
    /// Invalidation metadata for the request driver
    pub request: ConfigRequestResult,
}

/// Code and map produced by a `generate` hook.
#[derive(Debug, Clone)]
pub struct Generated {
    /// Materialized code
    pub content: Content,
    /// Source map for the materialized code
    pub map: Option<SourceMap>,
}

/// One output of a `transform` hook.
#[derive(Debug)]
pub enum TransformerOutput {
    /// An explicitly emitted result
    Result(TransformerResult),
    /// The (possibly mutated) input asset itself continues down the chain
    Forward,
}

/// A plugin in the transform pipeline.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Stable plugin id. Pipelines compare ids to decide whether a
    /// recomputed pipeline is the same chain.
    fn id(&self) -> &str;

    /// Load this transformer's configuration for the given asset.
    async fn get_config(
        &self,
        _asset: &mut Asset,
        _options: &Options,
        _resolver: &dyn Resolver,
    ) -> Result<Option<TransformerConfig>> {
        Ok(None)
    }

    /// Whether this transformer can consume an AST produced by another
    /// transformer instead of re-parsing code.
    fn can_reuse_ast(&self, _ast: &Ast) -> bool {
        false
    }

    /// Parse the asset's content into an AST.
    async fn parse(
        &self,
        _asset: &Asset,
        _config: Option<&TransformerConfig>,
        _options: &Options,
    ) -> Result<Option<Ast>> {
        Ok(None)
    }

    /// Transform the asset, yielding zero or more outputs.
    async fn transform(
        &self,
        asset: &mut Asset,
        config: Option<&TransformerConfig>,
        options: &Options,
        resolver: &dyn Resolver,
    ) -> Result<Vec<TransformerOutput>>;

    /// Materialize code and map from an AST this transformer produced.
    ///
    /// Returning `None` means the transformer has no generate hook; the
    /// runner turns a forced materialization into a typed error.
    async fn generate(
        &self,
        _asset: &Asset,
        _ast: &Ast,
        _options: &Options,
    ) -> Result<Option<Generated>> {
        Ok(None)
    }

    /// Rewrite the full set of assets produced by this transformer's
    /// pipeline invocation. Returning `Some` replaces the emitted set.
    async fn post_process(
        &self,
        _assets: Vec<Asset>,
        _config: Option<&TransformerConfig>,
        _options: &Options,
        _resolver: &dyn Resolver,
    ) -> Result<Option<Vec<Asset>>> {
        Ok(None)
    }
}

/// An ordered transformer chain for one source type.
#[derive(Clone)]
pub struct Pipeline {
    /// The transformers, in declaration order
    pub transformers: Vec<Arc<dyn Transformer>>,
}

impl Pipeline {
    /// Create a pipeline over the given transformers.
    #[must_use]
    pub fn new(transformers: Vec<Arc<dyn Transformer>>) -> Self {
        Self { transformers }
    }

    /// Shallow per-plugin equality.
    ///
    /// Plugin handles are interned by the config subsystem, so comparing
    /// stable plugin ids position by position is the correct identity test.
    #[must_use]
    pub fn shallow_eq(&self, other: &Pipeline) -> bool {
        self.transformers.len() == other.transformers.len()
            && self
                .transformers
                .iter()
                .zip(&other.transformers)
                .all(|(a, b)| a.id() == b.id())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.transformers.iter().map(|t| t.id()))
            .finish()
    }
}

/// The config service seam: maps file paths to transformer chains.
pub trait ConfigService: Send + Sync {
    /// The ordered transformer pipeline for a file path.
    ///
    /// # Errors
    ///
    /// Returns an error when no pipeline exists for the path's type.
    fn pipeline_for(&self, path: &Path) -> Result<Pipeline>;

    /// A serializable cache path usable by workers in place of live config
    /// objects.
    fn cache_path(&self) -> PathBuf;

    /// The user configuration file backing this service, if any.
    fn config_file(&self) -> Option<PathBuf> {
        None
    }
}
