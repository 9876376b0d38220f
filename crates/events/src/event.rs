//! Event type definitions for build reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A structured reporter event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReporterEvent {
    /// Unique event identifier
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The event payload
    pub event: BuildEvent,
}

impl ReporterEvent {
    /// Wrap a build event with identity and timestamp.
    #[must_use]
    pub fn new(event: BuildEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Build lifecycle events emitted by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BuildEvent {
    /// Progress through a request's build phases.
    BuildProgress {
        /// The phase the request just entered
        phase: BuildPhase,
        /// Id of the request making progress
        request: String,
    },
}

/// Phases an asset request moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    /// Resolving the transformer configuration
    ResolvingConfig,
    /// Running the transformer pipeline
    Transforming,
    /// Committing produced assets to the store
    Committing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tagged_payload() {
        let event = BuildEvent::BuildProgress {
            phase: BuildPhase::Transforming,
            request: "asset_request:abc".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BuildProgress");
        assert_eq!(json["data"]["phase"], "transforming");

        let back: BuildEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
