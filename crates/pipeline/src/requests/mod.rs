//! Request drivers executed through the request graph.

pub mod asset;
pub mod config;
pub mod version;

use crate::options::Options;
use crate::runner::PipelineRunner;
use crate::transformer::{ConfigRequestResult, ConfigService, Resolver};
use crate::worker::WorkerFarm;
use kiln_core::cache::RequestCache;
use kiln_core::store::AssetStore;
use kiln_core::CommittedAsset;
use kiln_events::{BuildEvent, BuildPhase, EventSender};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Result of the pipeline-config sub-request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfigResult {
    /// Serializable cache path handed to workers
    pub cache_path: PathBuf,
}

/// The result representation shared by every request in the graph.
#[derive(Debug, Clone)]
pub enum RequestResult {
    /// An asset request's committed assets
    Assets(Vec<CommittedAsset>),
    /// A config request's invalidation metadata
    Config(ConfigRequestResult),
    /// A dev-dependency version stamp
    Version(String),
    /// The resolved pipeline configuration
    PipelineConfig(PipelineConfigResult),
}

/// Shared collaborators for every request in a build.
#[derive(Clone)]
pub struct TransformHost {
    /// Shared process options
    pub options: Arc<Options>,
    /// The config service mapping paths to transformer chains
    pub config: Arc<dyn ConfigService>,
    /// The resolver subsystem
    pub resolver: Arc<dyn Resolver>,
    /// The content-addressed asset store
    pub store: Arc<AssetStore>,
    /// The fingerprint-keyed request cache
    pub cache: Arc<RequestCache>,
    /// Worker farm for offloaded transformation, if configured
    pub farm: Option<Arc<dyn WorkerFarm>>,
    /// Reporter sink, if configured
    pub events: Option<EventSender>,
}

impl TransformHost {
    /// Create a host; the store and cache live under the options'
    /// cache directory.
    #[must_use]
    pub fn new(
        options: Arc<Options>,
        config: Arc<dyn ConfigService>,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        let store = Arc::new(AssetStore::new(
            options.cache_dir.join("blobs"),
            Arc::clone(&options.input_fs),
        ));
        let cache = Arc::new(RequestCache::new(options.cache_dir.join("entries")));
        Self {
            options,
            config,
            resolver,
            store,
            cache,
            farm: None,
            events: None,
        }
    }

    /// Offload transformation to the given worker farm.
    #[must_use]
    pub fn with_farm(mut self, farm: Arc<dyn WorkerFarm>) -> Self {
        self.farm = Some(farm);
        self
    }

    /// Report build progress through the given sender.
    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Build an in-process pipeline runner over this host's collaborators.
    #[must_use]
    pub fn runner(&self) -> PipelineRunner {
        PipelineRunner::new(
            Arc::clone(&self.options),
            Arc::clone(&self.config),
            Arc::clone(&self.resolver),
            Arc::clone(&self.store),
        )
    }

    pub(crate) fn emit(&self, phase: BuildPhase, request: &str) {
        if let Some(events) = &self.events {
            events.emit(BuildEvent::BuildProgress {
                phase,
                request: request.to_string(),
            });
        }
    }
}
