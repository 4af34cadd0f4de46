//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use moneysocket_core::prelude::*;
//! ```

// Connection descriptors
pub use crate::{Beacon, Location, LocationKind, SharedSeed, WebsocketLocation};

// Error handling
pub use crate::errors::{LayerError, LayerErrorCode};
pub use crate::Result;

// Layer contracts
pub use crate::layer::{
    AboveLayer, BelowLayer, Layer, LayerName, LayerStatus, TransportLayer,
};
pub use crate::nexus::Nexus;

// Generic layers
pub use crate::layer::{
    ConsumerLayer, ConsumerNexus, RendezvousLayer, RendezvousNexus, TransactLayer, TransactNexus,
};

// Messages and subscribers
pub use crate::callback::CallbackSlot;
pub use crate::message::{Message, ProviderInfo};
