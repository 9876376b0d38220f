//! The asset request driver.
//!
//! Public entry of the transformation core: resolves configuration, runs
//! the pipeline (in-process or through the worker farm), registers every
//! discovered invalidation edge, spawns config and dev-dependency version
//! sub-requests, and persists the cache entry.

use crate::requests::config::{ConfigRequest, PipelineConfigRequest};
use crate::requests::version::VersionRequest;
use crate::requests::{RequestResult, TransformHost};
use crate::worker::TransformJob;
use async_trait::async_trait;
use chrono::Utc;
use kiln_core::cache::CacheEntry;
use kiln_core::content::Content;
use kiln_core::fingerprint::{fingerprint, fingerprint_bytes};
use kiln_core::{Asset, CommittedAsset, Env, Error, Result};
use kiln_events::BuildPhase;
use kiln_request_graph::{Request, RequestApi, RequestGraph};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Input of an asset request.
///
/// This struct is the request's identity: the shared options handle is
/// deliberately not part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRequestInput {
    /// Source file to transform
    pub file_path: PathBuf,
    /// Target environment
    pub env: Env,
    /// Inline code overriding the file's content, if any
    pub code: Option<String>,
    /// Side-effect hint
    pub side_effects: Option<bool>,
}

impl AssetRequestInput {
    /// Create a file-backed request input.
    #[must_use]
    pub fn new(file_path: impl Into<PathBuf>, env: Env) -> Self {
        Self {
            file_path: file_path.into(),
            env,
            code: None,
            side_effects: None,
        }
    }

    /// Attach inline code; the request's identity then derives from the
    /// code's content hash rather than the file path.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Construct the initial pipeline asset for a request input.
pub(crate) async fn build_input_asset(
    options: &crate::options::Options,
    input: &AssetRequestInput,
) -> Result<Asset> {
    let asset_type = input
        .file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_string();
    let side_effects = input.side_effects.unwrap_or(true);

    match &input.code {
        Some(code) => {
            let bytes = code.clone().into_bytes();
            let hash = fingerprint_bytes(&bytes);
            let size = bytes.len() as u64;
            // Inline snippets at the same path must not alias each other,
            // so the content hash is the identity base, not the file path.
            Asset::new(
                hash.clone(),
                &input.file_path,
                asset_type,
                input.env.clone(),
                Content::Buffer(bytes),
                hash,
                size,
                side_effects,
            )
        }
        None => {
            let (content, hash, size) =
                Content::from_file(options.input_fs.as_ref(), &input.file_path).await?;
            Asset::new(
                input.file_path.to_string_lossy().into_owned(),
                &input.file_path,
                asset_type,
                input.env.clone(),
                content,
                hash,
                size,
                side_effects,
            )
        }
    }
}

/// The `asset_request` node driven by the request graph.
pub struct AssetRequest {
    id: String,
    input: AssetRequestInput,
    host: Arc<TransformHost>,
}

impl AssetRequest {
    /// Create an asset request; the id derives from the input alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be fingerprinted.
    pub fn new(input: AssetRequestInput, host: Arc<TransformHost>) -> Result<Self> {
        let id = format!("asset_request:{}", fingerprint(&input)?);
        Ok(Self { id, input, host })
    }
}

#[async_trait]
impl Request<RequestResult> for AssetRequest {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn run(&self, api: &RequestApi<RequestResult>) -> Result<RequestResult> {
        let host = &self.host;
        let options = &host.options;
        let fs = options.input_fs.as_ref();

        // Inline-code requests may name a file that does not exist yet;
        // fall back to the declared path in that case.
        let real_path = fs
            .realpath(&self.input.file_path)
            .unwrap_or_else(|_| self.input.file_path.clone());
        api.invalidate_on_file_update(real_path.clone());

        host.emit(BuildPhase::ResolvingConfig, &self.id);
        let pipeline_config = PipelineConfigRequest::new(Arc::clone(host))?;
        let cache_path = match api.run_request(&pipeline_config).await? {
            RequestResult::PipelineConfig(result) => result.cache_path,
            other => {
                return Err(Error::invalid_input(format!(
                    "Pipeline config request returned unexpected result: {other:?}"
                )));
            }
        };

        // Inline-code requests are never served from the cache: their
        // identity already covers the content, but serving them through
        // `file_path` would alias distinct snippets.
        let cache_key = fingerprint(&(&real_path, &self.input.env))?;
        let use_cache = options.cache && self.input.code.is_none();
        let prior_entry = if use_cache { host.cache.get(&cache_key) } else { None };

        if let Some(entry) = &prior_entry {
            if host.cache.check_cached_assets(&host.store, entry).await {
                tracing::info!(request = %self.id, key = %cache_key, "Asset request cache hit");
                register_asset_invalidations(api, &entry.assets);
                return Ok(RequestResult::Assets(entry.assets.clone()));
            }
            tracing::debug!(request = %self.id, "Cached entry stale, re-transforming");
        }

        host.emit(BuildPhase::Transforming, &self.id);
        let started = Instant::now();

        let (input_hash, mut assets, initial_assets, config_requests) = match &host.farm {
            Some(farm) => {
                let job = TransformJob {
                    config_cache_path: cache_path.clone(),
                    request: self.input.clone(),
                };
                let response = farm.run_transform(job).await?;
                (
                    response.input_hash,
                    response.assets,
                    response.initial_assets,
                    response.config_requests,
                )
            }
            None => {
                let input = build_input_asset(options, &self.input).await?;
                let input_hash = input.hash.clone();
                let runner = host.runner();
                let output = runner.run(input, prior_entry.as_ref()).await?;

                host.emit(BuildPhase::Committing, &self.id);
                let mut committed = Vec::with_capacity(output.assets.len());
                for asset in output.assets {
                    committed.push(host.store.commit(asset).await?);
                }
                let initial = match output.initial_assets {
                    Some(initial) => {
                        let mut list = Vec::with_capacity(initial.len());
                        for asset in initial {
                            list.push(host.store.commit(asset).await?);
                        }
                        Some(list)
                    }
                    None => None,
                };
                (input_hash, committed, initial, output.config_requests)
            }
        };

        let elapsed_ms = started.elapsed().as_millis();
        for asset in &mut assets {
            asset.stats.time_ms = elapsed_ms;
        }

        register_asset_invalidations(api, &assets);

        for request in &config_requests {
            let child = ConfigRequest::new(request.clone())?;
            api.run_request(&child).await?;

            for (specifier, stamp) in &request.dev_deps {
                // Resolution starts from the resolved config path; the
                // nearest package boundary would be more precise, but the
                // config path is the retained approximation.
                let resolve_from = request
                    .resolved_path
                    .clone()
                    .unwrap_or_else(|| cache_path.clone());
                let version = VersionRequest::new(
                    specifier.clone(),
                    stamp.clone(),
                    resolve_from,
                    Arc::clone(options),
                )?;
                api.run_request(&version).await?;
            }
        }

        if use_cache {
            let entry = CacheEntry {
                file_path: real_path,
                env: self.input.env.clone(),
                hash: input_hash,
                assets: assets.clone(),
                initial_assets,
                created_at: Utc::now(),
            };
            host.cache.set(&cache_key, &entry)?;
        }

        Ok(RequestResult::Assets(assets))
    }
}

fn register_asset_invalidations(api: &RequestApi<RequestResult>, assets: &[CommittedAsset]) {
    for asset in assets {
        for connected in &asset.connected_files {
            api.invalidate_on_file_update(connected.file_path.clone());
            api.invalidate_on_file_delete(connected.file_path.clone());
        }
    }
}

/// Run an asset request to completion through the request graph.
///
/// # Errors
///
/// Propagates the request's failure; the graph records no result for it and
/// later runs retry.
pub async fn run_asset_request(
    graph: &Arc<RequestGraph<RequestResult>>,
    host: Arc<TransformHost>,
    input: AssetRequestInput,
) -> Result<Vec<CommittedAsset>> {
    let request = AssetRequest::new(input, host)?;
    match graph.run_request(&request).await? {
        RequestResult::Assets(assets) => Ok(assets),
        other => Err(Error::invalid_input(format!(
            "Asset request returned unexpected result: {other:?}"
        ))),
    }
}
