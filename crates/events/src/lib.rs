//! Structured build-progress events for kiln.
//!
//! The reporter seam of the pipeline: the driver emits fire-and-forget
//! [`BuildEvent`]s through an [`EventSender`], and any number of frontends
//! subscribe to the [`EventBus`] for fan-out delivery.

mod bus;
mod event;

pub use bus::{EventBus, EventSender};
pub use event::{BuildEvent, BuildPhase, ReporterEvent};
