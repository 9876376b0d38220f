//! Invalidation edges and filesystem change events.

use globset::Glob;
use std::path::PathBuf;

/// An invalidation edge recorded against a request node.
///
/// Edges form a set: registering the same edge twice is harmless.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Invalidation {
    /// Re-run when the file at this path changes
    FileUpdate(PathBuf),
    /// Re-run when the file at this path is deleted
    FileDelete(PathBuf),
    /// Re-run when a file matching this glob is created
    FileCreate(String),
    /// Re-run on every process startup
    Startup,
}

/// A filesystem change observed between builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    /// A file's content changed
    Updated(PathBuf),
    /// A file was removed
    Deleted(PathBuf),
    /// A file appeared
    Created(PathBuf),
}

impl Invalidation {
    /// Whether this edge fires for the given event.
    #[must_use]
    pub fn matches(&self, event: &FsEvent) -> bool {
        match (self, event) {
            (Self::FileUpdate(path), FsEvent::Updated(changed)) => path == changed,
            (Self::FileDelete(path), FsEvent::Deleted(deleted)) => path == deleted,
            (Self::FileCreate(pattern), FsEvent::Created(created)) => {
                match Glob::new(pattern) {
                    Ok(glob) => glob.compile_matcher().is_match(created),
                    Err(e) => {
                        tracing::warn!(pattern, error = %e, "Invalid create glob, edge never fires");
                        false
                    }
                }
            }
            // Startup edges are consumed by explicit startup invalidation,
            // never by the change journal.
            _ => false,
        }
    }
}
