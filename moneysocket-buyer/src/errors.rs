//! Errors surfaced by the buyer stack's control operations.

use moneysocket_core::{LayerError, LocationKind};

/// Error codes for FFI and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum StackErrorCode {
    /// Beacon's first location cannot be dialled by this stack
    UnsupportedLocationKind = 1001,
    /// Beacon carries no location at all
    EmptyBeacon = 1002,
    /// Domain action issued with no live nexus
    NoLiveNexus = 3001,
    /// Failure reported by a layer
    Layer = 9000,
}

/// Errors returned synchronously by [`BuyerStack`](crate::BuyerStack).
///
/// Connection progress and failures after `connect` returns are never
/// reported here; they arrive as stack events.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    #[error("unsupported location kind: {0}")]
    UnsupportedLocationKind(LocationKind),

    #[error("beacon has no locations")]
    EmptyBeacon,

    /// A domain action was issued while no nexus is announced.
    #[error("no live nexus")]
    NoLiveNexus,

    #[error(transparent)]
    Layer(#[from] LayerError),
}

impl StackError {
    /// Get the error code for FFI/diagnostics.
    pub fn code(&self) -> StackErrorCode {
        match self {
            Self::UnsupportedLocationKind(_) => StackErrorCode::UnsupportedLocationKind,
            Self::EmptyBeacon => StackErrorCode::EmptyBeacon,
            Self::NoLiveNexus => StackErrorCode::NoLiveNexus,
            Self::Layer(_) => StackErrorCode::Layer,
        }
    }

    /// Configuration errors abort `connect` before anything reaches the transport.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::UnsupportedLocationKind(_) | Self::EmptyBeacon)
    }
}
