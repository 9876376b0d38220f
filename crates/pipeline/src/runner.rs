//! The transform pipeline runner.
//!
//! Walks an ordered transformer chain over an input asset: loads per-step
//! config, reconciles ASTs between adjacent steps, normalizes transform
//! outputs into child assets, follows pipeline jumps when a result changes
//! type, reuses per-asset cache hits, and applies the head step's
//! post-processing phase.
//!
//! `generate` is lazy throughout: it only runs when the next transformer
//! cannot consume the carried AST, or when the chain ends with a residual
//! AST. Adjacent transformers that share an AST representation never pay
//! for code materialization in between.

use crate::options::Options;
use crate::transformer::{
    ConfigRequestResult, ConfigService, Generated, Pipeline, Resolver, Transformer,
    TransformerOutput,
};
use async_recursion::async_recursion;
use kiln_core::cache::CacheEntry;
use kiln_core::store::AssetStore;
use kiln_core::{Asset, CommittedAsset, Error, Result};
use std::sync::Arc;

/// Everything a pipeline invocation produced.
#[derive(Debug)]
pub struct TransformOutput {
    /// The final asset set
    pub assets: Vec<Asset>,
    /// Pre-post-process assets, when a post-processing step replaced the set
    pub initial_assets: Option<Vec<Asset>>,
    /// Config invalidation metadata collected from `get_config` calls
    pub config_requests: Vec<ConfigRequestResult>,
}

/// Applies transformer chains to input assets.
#[derive(Clone)]
pub struct PipelineRunner {
    options: Arc<Options>,
    config: Arc<dyn ConfigService>,
    resolver: Arc<dyn Resolver>,
    store: Arc<AssetStore>,
}

impl PipelineRunner {
    /// Create a runner over the given collaborators.
    #[must_use]
    pub fn new(
        options: Arc<Options>,
        config: Arc<dyn ConfigService>,
        resolver: Arc<dyn Resolver>,
        store: Arc<AssetStore>,
    ) -> Self {
        Self {
            options,
            config,
            resolver,
            store,
        }
    }

    /// Run the full pipeline for an input asset.
    ///
    /// `cache_entry` enables per-asset hit reuse: children whose content
    /// hash matches a cached asset with unchanged connected files skip the
    /// rest of their chain.
    ///
    /// # Errors
    ///
    /// Fails when the config service returns an empty pipeline, a forced
    /// code materialization finds no generate hook, or a transformer hook
    /// fails.
    pub async fn run(
        &self,
        input: Asset,
        cache_entry: Option<&CacheEntry>,
    ) -> Result<TransformOutput> {
        let pipeline = self.pipeline_for(&input)?;
        let input_type = input.asset_type.clone();
        let mut config_requests = Vec::new();

        tracing::info!(
            file = %input.file_path.display(),
            ty = %input_type,
            steps = pipeline.transformers.len(),
            "Running transform pipeline"
        );

        let (assets, initial_assets) = self
            .run_steps(
                input,
                &pipeline,
                0,
                &input_type,
                cache_entry,
                None,
                &mut config_requests,
            )
            .await?;

        Ok(TransformOutput {
            assets,
            initial_assets,
            config_requests,
        })
    }

    fn pipeline_for(&self, asset: &Asset) -> Result<Pipeline> {
        let pipeline = self.config.pipeline_for(&asset.file_path)?;
        if pipeline.transformers.is_empty() {
            return Err(Error::EmptyPipeline {
                file_path: asset.file_path.clone().into_boxed_path(),
            });
        }
        Ok(pipeline)
    }

    /// Run one step of a pipeline and recurse over its children.
    ///
    /// `input_type` is the type the pipeline was computed for; a child of a
    /// different type triggers pipeline recomputation. `previous_generator`
    /// is the transformer whose AST the current asset may still carry.
    #[async_recursion]
    #[allow(clippy::too_many_arguments)]
    async fn run_steps(
        &self,
        mut asset: Asset,
        pipeline: &Pipeline,
        idx: usize,
        input_type: &str,
        cache_entry: Option<&CacheEntry>,
        previous_generator: Option<Arc<dyn Transformer>>,
        config_requests: &mut Vec<ConfigRequestResult>,
    ) -> Result<(Vec<Asset>, Option<Vec<Asset>>)> {
        let transformer = Arc::clone(&pipeline.transformers[idx]);
        tracing::debug!(transformer = %transformer.id(), step = idx, "Pipeline step");

        // (a) Config load.
        let config = transformer
            .get_config(&mut asset, &self.options, self.resolver.as_ref())
            .await?;
        if let Some(cfg) = &config {
            config_requests.push(cfg.request.clone());
        }

        // (b) AST reconciliation. A carried AST the current transformer
        // cannot consume is materialized through the producer's generate
        // hook; the AST is dropped with it.
        let can_reuse = asset
            .ast
            .as_ref()
            .is_some_and(|ast| transformer.can_reuse_ast(ast));
        if asset.ast.is_some() && !can_reuse {
            if let Some(producer) = &previous_generator {
                let ast = asset.ast.take().expect("ast presence just checked");
                let generated = producer
                    .generate(&asset, &ast, &self.options)
                    .await?
                    .ok_or_else(|| Error::missing_generate(producer.id(), &asset.asset_type))?;
                self.apply_generated(&mut asset, generated).await?;
            }
        }
        if asset.ast.is_none() {
            if let Some(ast) = transformer
                .parse(&asset, config.as_ref(), &self.options)
                .await?
            {
                asset.ast = Some(ast);
            }
        }

        // (c) Transform, normalizing outputs into child assets.
        let outputs = transformer
            .transform(&mut asset, config.as_ref(), &self.options, self.resolver.as_ref())
            .await?;
        let mut children = Vec::with_capacity(outputs.len());
        for (index, output) in outputs.into_iter().enumerate() {
            let salt = index.to_string();
            let child = match output {
                TransformerOutput::Forward => asset.forwarded(&salt)?,
                TransformerOutput::Result(result) => {
                    asset
                        .child_from_result(result, &salt, self.options.input_fs.as_ref())
                        .await?
                }
            };
            children.push(child);
        }

        // (d) Recurse over each child independently.
        let is_last = idx + 1 == pipeline.transformers.len();
        let mut collected: Vec<Asset> = Vec::new();
        for child in children {
            if let Some(reused) = self.reuse_cached(cache_entry, &child).await? {
                tracing::debug!(hash = %child.hash, "Reusing cached assets for child");
                collected.extend(reused);
                continue;
            }

            // A type change recomputes the pipeline for a hypothetical file
            // of the new type; the jump is only taken when the recomputed
            // chain is actually different.
            let jump = if child.asset_type == input_type {
                None
            } else {
                let next_path = child.file_path.with_extension(&child.asset_type);
                let next_pipeline = self.config.pipeline_for(&next_path)?;
                if next_pipeline.transformers.is_empty() {
                    return Err(Error::EmptyPipeline {
                        file_path: next_path.into_boxed_path(),
                    });
                }
                if next_pipeline.shallow_eq(pipeline) {
                    None
                } else {
                    Some(next_pipeline)
                }
            };

            match jump {
                Some(next_pipeline) => {
                    tracing::debug!(
                        from = %input_type,
                        to = %child.asset_type,
                        next = ?next_pipeline,
                        "Pipeline jump"
                    );
                    let child_type = child.asset_type.clone();
                    let (assets, _) = self
                        .run_steps(
                            child,
                            &next_pipeline,
                            0,
                            &child_type,
                            cache_entry,
                            Some(Arc::clone(&transformer)),
                            config_requests,
                        )
                        .await?;
                    collected.extend(assets);
                }
                None if is_last => {
                    collected.push(self.finalize(child, &transformer).await?);
                }
                None => {
                    let (assets, _) = self
                        .run_steps(
                            child,
                            pipeline,
                            idx + 1,
                            input_type,
                            cache_entry,
                            Some(Arc::clone(&transformer)),
                            config_requests,
                        )
                        .await?;
                    collected.extend(assets);
                }
            }
        }

        // (e) Post-process: the head step of a pipeline invocation may
        // rewrite the collected set; the original set is preserved so cache
        // re-hits can match either representation.
        let mut initial_assets = None;
        if idx == 0 {
            if let Some(replaced) = transformer
                .post_process(
                    collected.clone(),
                    config.as_ref(),
                    &self.options,
                    self.resolver.as_ref(),
                )
                .await?
            {
                initial_assets = Some(std::mem::replace(&mut collected, replaced));
            }
        }

        Ok((collected, initial_assets))
    }

    /// Per-asset cache reuse: find cached assets with the child's content
    /// hash whose connected files are unchanged, and hydrate them.
    ///
    /// Any read-back failure is a miss for the child, never an error.
    async fn reuse_cached(
        &self,
        cache_entry: Option<&CacheEntry>,
        child: &Asset,
    ) -> Result<Option<Vec<Asset>>> {
        let Some(entry) = cache_entry else {
            return Ok(None);
        };
        let pool = entry.initial_assets.as_ref().unwrap_or(&entry.assets);
        let matches: Vec<&CommittedAsset> =
            pool.iter().filter(|a| a.hash == child.hash).collect();
        if matches.is_empty() {
            return Ok(None);
        }
        for candidate in &matches {
            if !self
                .store
                .check_connected_files(&candidate.connected_files)
                .await
            {
                return Ok(None);
            }
        }
        let mut reused = Vec::with_capacity(matches.len());
        for candidate in matches {
            match self.store.hydrate(candidate) {
                Ok(asset) => reused.push(asset),
                // Missing or corrupt blobs demote the whole child to a miss.
                Err(_) => return Ok(None),
            }
        }
        Ok(Some(reused))
    }

    /// Terminal step: a finished asset may not leave with an AST.
    async fn finalize(
        &self,
        mut asset: Asset,
        transformer: &Arc<dyn Transformer>,
    ) -> Result<Asset> {
        if let Some(ast) = asset.ast.take() {
            let generated = transformer
                .generate(&asset, &ast, &self.options)
                .await?
                .ok_or_else(|| Error::missing_generate(transformer.id(), &asset.asset_type))?;
            self.apply_generated(&mut asset, generated).await?;
        }
        Ok(asset)
    }

    async fn apply_generated(&self, asset: &mut Asset, generated: Generated) -> Result<()> {
        let bytes = generated
            .content
            .load(self.options.input_fs.as_ref())
            .await?;
        asset.set_code(bytes);
        asset.map = generated.map;
        Ok(())
    }

    /// Shared options handle.
    #[must_use]
    pub fn options(&self) -> &Arc<Options> {
        &self.options
    }

    /// The asset store this runner reuses cached assets from.
    #[must_use]
    pub fn store(&self) -> &Arc<AssetStore> {
        &self.store
    }
}
