//! The kiln transform pipeline: a recursive pipeline runner driving
//! transformer chains over assets, and the asset request driver that wires
//! transformation into the request graph.
//!
//! The public entry is [`run_asset_request`]: given an
//! [`AssetRequestInput`] and a [`TransformHost`], it drives the input
//! through the transformer chain for its type, records every discovered
//! invalidation in the request graph, and memoizes the result in the
//! fingerprint-keyed cache.

pub mod options;
pub mod requests;
pub mod runner;
pub mod transformer;
pub mod worker;

pub use options::Options;
pub use requests::asset::{run_asset_request, AssetRequest, AssetRequestInput};
pub use requests::config::{ConfigRequest, PipelineConfigRequest};
pub use requests::version::VersionRequest;
pub use requests::{PipelineConfigResult, RequestResult, TransformHost};
pub use runner::{PipelineRunner, TransformOutput};
pub use transformer::{
    ConfigRequestResult, ConfigService, Generated, Pipeline, Resolver, Transformer,
    TransformerConfig, TransformerOutput,
};
pub use worker::{InProcessFarm, TransformJob, TransformResponse, WorkerFarm};
