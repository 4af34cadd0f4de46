//! Layer contracts and the generic wrapping layers.
//!
//! A stack is built bottom-up. Each wrapping layer registers itself against
//! the layer directly below it with `register_above_layer`, which records the
//! below-layer as "the thing to command" and installs a weak upward reference
//! on the below-layer as "the thing to notify". Nexus announcements,
//! revocations and inbound messages then flow upward through [`AboveLayer`].

use crate::callback::CallbackSlot;
use crate::location::Location;
use crate::message::Message;
use crate::nexus::Nexus;
use crate::seed::SharedSeed;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

mod base;
pub mod consumer;
pub mod rendezvous;
pub mod transact;

pub use base::LayerCore;
pub use consumer::{ConsumerLayer, ConsumerNexus};
pub use rendezvous::{RendezvousLayer, RendezvousNexus};
pub use transact::{TransactLayer, TransactNexus, TransactRequest};

/// Default capacity of per-nexus pending request tables.
pub const DEFAULT_MAX_PENDING: usize = 64;

/// Default age after which an unanswered request is abandoned.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Status reason for an error reported by the remote end.
pub(crate) fn remote_error_reason(code: &str, message: &str) -> String {
    format!("remote error {}: {}", code, message)
}

/// Identifies a layer in diagnostics and stack events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LayerName {
    OutgoingWebsocket,
    OutgoingRendezvous,
    Consumer,
    ConsumerTransact,
    Buyer,
}

impl LayerName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutgoingWebsocket => "OUTGOING_WEBSOCKET",
            Self::OutgoingRendezvous => "OUTGOING_RENDEZVOUS",
            Self::Consumer => "CONSUMER",
            Self::ConsumerTransact => "CONSUMER_TRANSACT",
            Self::Buyer => "BUYER",
        }
    }
}

impl fmt::Display for LayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection status changes reported by a layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerStatus {
    /// Transport is dialling a location.
    Connecting,
    /// Transport-level connection is up.
    Connected,
    /// A nexus exists but its handshake has not finished.
    NexusWaiting,
    NexusAnnounced,
    NexusRevoked,
    /// Transport-level connection went away.
    Disconnected,
    Errored { reason: String },
}

impl LayerStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Errored { .. })
    }
}

/// Signature of a layer's status slot.
pub type LayerEventFn = dyn Fn(Option<&Arc<dyn Nexus>>, &LayerStatus) + Send + Sync;

/// Common surface of every layer.
pub trait Layer: Send + Sync {
    fn layer_name(&self) -> LayerName;

    /// Slot fired whenever this layer's connection status changes.
    fn on_layer_event(&self) -> &CallbackSlot<LayerEventFn>;
}

/// Receives nexus lifecycle and traffic from the layer below.
pub trait AboveLayer: Send + Sync {
    fn announce_nexus(&self, below_nexus: Arc<dyn Nexus>);

    fn revoke_nexus(&self, below_nexus: Arc<dyn Nexus>);

    /// An inbound message arrived on `below_nexus`.
    fn on_message(&self, below_nexus: Arc<dyn Nexus>, msg: Message);
}

/// A layer that another layer can stack on top of.
pub trait BelowLayer: Layer {
    /// Install the layer to notify. Replaces any previous registration.
    fn set_above_layer(&self, above: Weak<dyn AboveLayer>);
}

/// The bottom of a stack: owns raw connections to remote endpoints.
///
/// Both operations are fire-and-forget. Progress and failure are reported
/// through [`Layer::on_layer_event`] and nexus announce/revoke, never as
/// return values.
pub trait TransportLayer: BelowLayer {
    /// Start connecting to `location`. The resulting nexus carries `shared_seed`.
    fn connect(&self, location: &Location, shared_seed: &SharedSeed);

    /// Close every connection this transport holds.
    fn initiate_close_all(&self);
}
