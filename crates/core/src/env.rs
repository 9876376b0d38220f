//! Target environment descriptions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An opaque, hashable description of the build target.
///
/// Environments are pure equality keys: two requests with different
/// environments are unrelated, even for the same source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Env {
    /// Execution context (e.g. "browser", "node")
    pub context: String,
    /// Minimum engine versions, keyed by engine name
    pub engines: BTreeMap<String, String>,
}

impl Env {
    /// Create an environment for the given context with no engine bounds.
    #[must_use]
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            engines: BTreeMap::new(),
        }
    }

    /// Add an engine version bound.
    #[must_use]
    pub fn with_engine(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.engines.insert(name.into(), version.into());
        self
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new("browser")
    }
}
