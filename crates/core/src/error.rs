//! Error types shared across the kiln workspace.

use miette::Diagnostic;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Result type for kiln operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for kiln operations.
///
/// The type is `Clone` so that a memoized request failure can be handed to
/// every caller that deduplicated onto the same execution; the underlying
/// `std::io::Error` is held behind an `Arc` for that reason.
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum Error {
    /// I/O error with path context
    #[error("I/O {operation} failed{}: {source}", path.as_ref().map_or(String::new(), |p| format!(" at {}", p.display())))]
    #[diagnostic(
        code(kiln::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        source: Arc<std::io::Error>,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "rename")
        operation: String,
    },

    /// Configuration or validation error
    #[error("Invalid input: {message}")]
    #[diagnostic(code(kiln::invalid_input))]
    InvalidInput {
        /// Description of what was invalid
        message: String,
    },

    /// Serialization / deserialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(kiln::serialization))]
    Serialization {
        /// Description of the serialization failure
        message: String,
    },

    /// An asset carries an AST but no transformer can materialize code for it
    #[error("Transformer '{transformer}' must implement generate to emit a '{asset_type}' asset")]
    #[diagnostic(
        code(kiln::missing_generate),
        help("The transformer that produced the AST must expose a generate hook")
    )]
    MissingGenerate {
        /// Plugin id of the transformer expected to generate code
        transformer: String,
        /// Type of the asset that still carries an AST
        asset_type: String,
    },

    /// The resolver could not locate a module specifier
    #[error("Failed to resolve '{specifier}' from {}", from.display())]
    #[diagnostic(code(kiln::resolve))]
    Resolve {
        /// The specifier that failed to resolve
        specifier: String,
        /// File the resolution started from
        from: Box<Path>,
    },

    /// The config service returned no transformers for a file type
    #[error("No transformer pipeline for {}", file_path.display())]
    #[diagnostic(
        code(kiln::empty_pipeline),
        help("Every file type must map to at least one transformer")
    )]
    EmptyPipeline {
        /// The file that had no pipeline
        file_path: Box<Path>,
    },

    /// A request transitively invoked itself
    #[error("Request cycle detected: {}", chain.join(" -> "))]
    #[diagnostic(code(kiln::request_cycle))]
    RequestCycle {
        /// Request ids along the cycle, ending at the repeated id
        chain: Vec<String>,
    },

    /// Exception raised inside the worker farm
    #[error("Worker error: {message}")]
    #[diagnostic(code(kiln::worker))]
    Worker {
        /// Message propagated from the worker
        message: String,
    },
}

impl Error {
    /// Create an I/O error with path context
    #[must_use]
    pub fn io(source: std::io::Error, path: impl AsRef<Path>, operation: impl Into<String>) -> Self {
        Self::Io {
            source: Arc::new(source),
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source: Arc::new(source),
            path: None,
            operation: operation.into(),
        }
    }

    /// Create an invalid input error
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a missing-generate error
    #[must_use]
    pub fn missing_generate(transformer: impl Into<String>, asset_type: impl Into<String>) -> Self {
        Self::MissingGenerate {
            transformer: transformer.into(),
            asset_type: asset_type.into(),
        }
    }

    /// Create a resolve error
    #[must_use]
    pub fn resolve(specifier: impl Into<String>, from: impl AsRef<Path>) -> Self {
        Self::Resolve {
            specifier: specifier.into(),
            from: from.as_ref().into(),
        }
    }

    /// Create a worker error
    #[must_use]
    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker {
            message: msg.into(),
        }
    }
}
