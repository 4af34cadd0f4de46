//! Moneysocket core library.
//!
//! Building blocks shared by every Moneysocket protocol stack: the layer and
//! nexus contracts, the message vocabulary, and the generic wrapping layers a
//! role-specific stack is assembled from.
//!
//! # Features
//!
//! - **Layer composition**: layers register against the layer below and
//!   receive nexus announce/revoke and inbound traffic through [`AboveLayer`]
//! - **Generic layers**: outgoing rendezvous, consumer and consumer transact
//! - **Optional subscribers**: every event surface is a [`CallbackSlot`]
//! - **Request correlation**: [`PendingRequests`] ties responses to requests
//!
//! # Example
//!
//! ```
//! use moneysocket_core::{Beacon, LocationKind, SharedSeed, WebsocketLocation};
//!
//! let mut beacon = Beacon::new(SharedSeed::generate());
//! beacon.add_location(WebsocketLocation::default_relay());
//!
//! assert_eq!(beacon.locations()[0].kind(), LocationKind::WebSocket);
//! assert_eq!(beacon.locations()[0].to_target(), "wss://relay.socket.money:443");
//! ```

pub mod beacon;
pub mod callback;
pub mod errors;
pub mod layer;
pub mod location;
pub mod message;
pub mod nexus;
pub mod pending;
pub mod prelude;
pub mod seed;

/// Test utilities for driving stacks in memory.
///
/// This module is only available with the `test-utils` feature or in test builds.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use beacon::Beacon;
pub use callback::CallbackSlot;
pub use errors::{LayerError, LayerErrorCode};
pub use layer::{
    AboveLayer, BelowLayer, Layer, LayerEventFn, LayerName, LayerStatus, TransportLayer,
};
pub use location::{Location, LocationKind, WebsocketLocation};
pub use message::{Message, ProviderInfo};
pub use nexus::Nexus;
pub use pending::PendingRequests;
pub use seed::SharedSeed;

/// Common result alias for layer operations.
pub type Result<T> = std::result::Result<T, LayerError>;
