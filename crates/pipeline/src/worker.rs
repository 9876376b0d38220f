//! The worker-farm seam.
//!
//! Transformation can be offloaded to a pool of workers; the handle only
//! accepts structurally serializable inputs, so jobs carry the config
//! service's cache path rather than live config objects. The default
//! [`InProcessFarm`] runs the pipeline on the calling process, which keeps
//! single-process embedders free of any RPC machinery.

use crate::requests::asset::{build_input_asset, AssetRequestInput};
use crate::runner::PipelineRunner;
use crate::transformer::ConfigRequestResult;
use async_trait::async_trait;
use kiln_core::{CommittedAsset, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A serializable transformation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformJob {
    /// Cache path the worker loads its config service from
    pub config_cache_path: PathBuf,
    /// The asset request input, minus the options handle
    pub request: AssetRequestInput,
}

/// A serializable transformation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformResponse {
    /// Content hash of the request's input
    pub input_hash: String,
    /// Committed assets produced by the pipeline
    pub assets: Vec<CommittedAsset>,
    /// Pre-post-process assets, when a post-processing step replaced the set
    pub initial_assets: Option<Vec<CommittedAsset>>,
    /// Config invalidation metadata collected during the run
    pub config_requests: Vec<ConfigRequestResult>,
}

/// The worker farm handle.
#[async_trait]
pub trait WorkerFarm: Send + Sync {
    /// Run a transformation job to completion.
    ///
    /// # Errors
    ///
    /// A failure inside the farm propagates as the request's result.
    async fn run_transform(&self, job: TransformJob) -> Result<TransformResponse>;
}

/// Farm implementation that runs jobs on the calling process.
pub struct InProcessFarm {
    runner: PipelineRunner,
}

impl InProcessFarm {
    /// Create a farm driving the given runner.
    #[must_use]
    pub fn new(runner: PipelineRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl WorkerFarm for InProcessFarm {
    async fn run_transform(&self, job: TransformJob) -> Result<TransformResponse> {
        let options = self.runner.options();
        let input = build_input_asset(options, &job.request).await?;
        let input_hash = input.hash.clone();

        let output = self.runner.run(input, None).await?;

        let store = self.runner.store();
        let mut assets = Vec::with_capacity(output.assets.len());
        for asset in output.assets {
            assets.push(store.commit(asset).await?);
        }
        let initial_assets = match output.initial_assets {
            Some(initial) => {
                let mut committed = Vec::with_capacity(initial.len());
                for asset in initial {
                    committed.push(store.commit(asset).await?);
                }
                Some(committed)
            }
            None => None,
        };

        Ok(TransformResponse {
            input_hash,
            assets,
            initial_assets,
            config_requests: output.config_requests,
        })
    }
}
