//! Configuration sub-requests.

use crate::requests::{PipelineConfigResult, RequestResult, TransformHost};
use crate::transformer::ConfigRequestResult;
use async_trait::async_trait;
use kiln_core::fingerprint::fingerprint;
use kiln_core::Result;
use kiln_request_graph::{Request, RequestApi};
use std::sync::Arc;

/// Resolves the pipeline configuration for a build and exposes the
/// serializable cache path workers load it from.
pub struct PipelineConfigRequest {
    id: String,
    host: Arc<TransformHost>,
}

impl PipelineConfigRequest {
    /// Create the pipeline-config request for a host.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity cannot be fingerprinted.
    pub fn new(host: Arc<TransformHost>) -> Result<Self> {
        let cache_path = host.config.cache_path();
        let config_file = host.config.config_file();
        let id = format!(
            "pipeline_config_request:{}",
            fingerprint(&(&cache_path, &config_file))?
        );
        Ok(Self { id, host })
    }
}

#[async_trait]
impl Request<RequestResult> for PipelineConfigRequest {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn run(&self, api: &RequestApi<RequestResult>) -> Result<RequestResult> {
        if let Some(config_file) = self.host.config.config_file() {
            api.invalidate_on_file_update(config_file);
        }
        Ok(RequestResult::PipelineConfig(PipelineConfigResult {
            cache_path: self.host.config.cache_path(),
        }))
    }
}

/// Installs the invalidation edges a loaded transformer config declared.
pub struct ConfigRequest {
    id: String,
    result: ConfigRequestResult,
}

impl ConfigRequest {
    /// Create a config request from the metadata a transformer returned.
    ///
    /// The identity covers only the tracked file set, so a config whose
    /// version stamps or startup flag change between builds still lands on
    /// its existing graph node.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be fingerprinted.
    pub fn new(result: ConfigRequestResult) -> Result<Self> {
        let id = format!(
            "config_request:{}",
            fingerprint(&(&result.resolved_path, &result.included_files))?
        );
        Ok(Self { id, result })
    }
}

#[async_trait]
impl Request<RequestResult> for ConfigRequest {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn run(&self, api: &RequestApi<RequestResult>) -> Result<RequestResult> {
        // Edges are a set, so re-registering the resolved path among the
        // included files is harmless.
        if let Some(resolved) = &self.result.resolved_path {
            api.invalidate_on_file_update(resolved.clone());
        }
        for file in &self.result.included_files {
            api.invalidate_on_file_update(file.clone());
        }
        if let Some(glob) = &self.result.watch_glob {
            api.invalidate_on_file_create(glob.clone());
        }
        if self.result.should_invalidate_on_startup {
            api.invalidate_on_startup();
        }
        Ok(RequestResult::Config(self.result.clone()))
    }
}
