//! Error types for the GPDM engine
//!
//! Every fallible operation in the crate returns [`Result`], whose error side
//! is the single [`GpdmError`] enumeration. Numerical ill-conditioning is
//! deliberately absent from this list: singular covariance matrices are
//! resolved through a pseudo-inverse and reported through the log facade.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use thiserror::Error;

use crate::graph::DataNodeId;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, GpdmError>;

/// Failure modes of the dynamics engine and the factor graph
#[derive(Debug, Error)]
pub enum GpdmError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Insufficient data: segment {segment} has {length} samples, at least {required} required")]
    InsufficientData {
        segment: usize,
        length: usize,
        required: usize,
    },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Derived matrices requested before the first parameter update")]
    NotComputed,

    #[error("Factor node is not initialized: {0}")]
    NotInitialized(String),

    #[error("Unknown data node: {0:?}")]
    UnknownDataNode(DataNodeId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GpdmError {
    /// Shorthand for dimension checks
    pub(crate) fn dimension(what: &str, expected: (usize, usize), actual: (usize, usize)) -> Self {
        GpdmError::InvalidArgument(format!(
            "{} has shape {}x{}, expected {}x{}",
            what, actual.0, actual.1, expected.0, expected.1
        ))
    }
}
