use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CohortError {
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("modulus mismatch")]
    ModulusMismatch,

    #[error("ring degree must be a power of 2 and at least 16, got {0}")]
    InvalidRingDegree(usize),

    #[error("decomposition error: {0}")]
    DecompositionError(String),

    #[error("key not available: {0}")]
    MissingKey(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("stale ciphertext state: {deletes} destructive deletes exceed the limit of {limit}; re-encrypt the affected columns")]
    StaleCiphertextState { deletes: usize, limit: usize },

    #[error("noise budget exceeded: {remaining:.1} bits remaining, floor is {floor:.1}")]
    NoiseBudgetExceeded { remaining: f64, floor: f64 },

    #[error("storage i/o failure at {path}: {source}")]
    StorageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("client not authorized: {0}")]
    Unauthorized(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for CohortError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for CohortError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CohortError>;
