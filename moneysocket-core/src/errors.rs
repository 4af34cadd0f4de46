//! Error types for layer and nexus operations.
//!
//! Layer-local failures never cross a stack boundary as errors; they are
//! reported upward as [`LayerStatus::Errored`](crate::layer::LayerStatus)
//! events. The errors here are returned only from synchronous calls such as
//! sending on a nexus or allocating a request reference.

/// Error codes for FFI and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LayerErrorCode {
    /// Transport/network layer error
    Transport = 2000,
    /// Nexus already closed
    NexusClosed = 2001,
    /// Serialization error
    Serialization = 5002,
    /// Invalid location descriptor
    InvalidLocation = 5003,
    /// Invalid shared seed
    InvalidSeed = 5004,
    /// Too many outstanding requests
    TooManyPending = 8001,
}

/// Errors raised by layers, nexuses and descriptors.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    /// Transport/network layer error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The nexus has been closed and can no longer carry messages.
    #[error("nexus is closed")]
    NexusClosed,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The pending request table is full.
    #[error("too many pending requests (limit {limit})")]
    TooManyPending {
        /// Configured table capacity
        limit: usize,
    },

    /// A location string or descriptor could not be parsed.
    #[error("invalid location: {0}")]
    InvalidLocation(String),

    /// A shared seed could not be decoded.
    #[error("invalid shared seed: {0}")]
    InvalidSeed(String),
}

impl LayerError {
    /// Get the error code for FFI/diagnostics.
    pub fn code(&self) -> LayerErrorCode {
        match self {
            Self::Transport(_) => LayerErrorCode::Transport,
            Self::NexusClosed => LayerErrorCode::NexusClosed,
            Self::Serialization(_) => LayerErrorCode::Serialization,
            Self::TooManyPending { .. } => LayerErrorCode::TooManyPending,
            Self::InvalidLocation(_) => LayerErrorCode::InvalidLocation,
            Self::InvalidSeed(_) => LayerErrorCode::InvalidSeed,
        }
    }
}

impl From<serde_json::Error> for LayerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
