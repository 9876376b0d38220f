//! Memoized request scheduling and fine-grained invalidation for kiln.
//!
//! The request graph assigns stable content-derived identifiers to work
//! units, deduplicates concurrent identical work, records invalidation
//! edges (file update, file delete, file-create glob, startup), and
//! orchestrates nested sub-requests. At the start of a build it consumes a
//! filesystem-change journal and re-executes only the dirtied nodes and
//! their ancestors; everything else is served from memory.

mod graph;
mod invalidation;

pub use graph::{Request, RequestApi, RequestGraph};
pub use invalidation::{FsEvent, Invalidation};
