//! Dev-dependency version sub-requests.

use crate::options::Options;
use crate::requests::RequestResult;
use async_trait::async_trait;
use kiln_core::fingerprint::fingerprint;
use kiln_core::Result;
use kiln_request_graph::{Request, RequestApi};
use std::path::PathBuf;
use std::sync::Arc;

/// Tracks the version stamp of a dev dependency a transformer config
/// loaded, invalidating on lock-file changes when one is configured.
pub struct VersionRequest {
    id: String,
    stamp: String,
    options: Arc<Options>,
}

impl VersionRequest {
    /// Create a version request for a dev dependency.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity cannot be fingerprinted.
    pub fn new(
        specifier: String,
        stamp: String,
        resolve_from: PathBuf,
        options: Arc<Options>,
    ) -> Result<Self> {
        let id = format!(
            "version_request:{}",
            fingerprint(&(&specifier, &resolve_from))?
        );
        Ok(Self { id, stamp, options })
    }
}

#[async_trait]
impl Request<RequestResult> for VersionRequest {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn run(&self, api: &RequestApi<RequestResult>) -> Result<RequestResult> {
        if let Some(lock_file) = &self.options.lock_file {
            api.invalidate_on_file_update(lock_file.clone());
        }
        Ok(RequestResult::Version(self.stamp.clone()))
    }
}
