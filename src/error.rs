//! Error types for public_variable

use crate::model::{DocumentId, FragmentCoordinate};
use thiserror::Error;

/// Result type alias for public_variable operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading or mutating a variable
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid store file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// An internal fragment on the active path has no routing content
    #[error("Missing fragment at {coordinate}: failed to create fragment or the data was lost")]
    MissingFragment { coordinate: FragmentCoordinate },

    /// `set()` was called by an identity that does not control the root
    #[error("Current identity does not control variable: {0}")]
    Unauthorized(DocumentId),

    /// No ancestor had room for another branch
    #[error("No branch point with spare capacity under root {root}")]
    CapacityExhausted { root: DocumentId },

    #[error("Invalid root descriptor for {root}: {reason}")]
    InvalidDescriptor { root: DocumentId, reason: String },

    #[error("Invalid variable parameters: {0}")]
    InvalidParams(String),

    #[error("Config error: {0}")]
    Config(String),
}
