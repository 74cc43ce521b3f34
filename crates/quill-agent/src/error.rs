//! Error types for quill-agent

use thiserror::Error;

/// Result type alias using quill-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during agent operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the provider layer
    #[error(transparent)]
    Ai(#[from] quill_ai::Error),

    /// Filesystem error from the memory manager
    #[error("Memory error: {0}")]
    Io(#[from] std::io::Error),

    /// The model kept presenting plans without executing them
    #[error("{0}")]
    PlanLoop(String),

    /// Summary compaction failed
    #[error("Compaction error: {0}")]
    Compaction(String),
}
