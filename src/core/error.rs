//! Error types for the Loam engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("atlas allocation failed: {0}")]
    Allocation(String),

    #[error("inconsistent layer state: {0}")]
    InconsistentLayerState(String),

    #[error("malformed import data: expected {expected}, got {actual}")]
    MalformedImport { expected: String, actual: String },

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("persistence error: {0}")]
    Persist(String),
}
