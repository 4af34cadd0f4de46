//! Nexus: one live logical connection as seen from a particular layer.
//!
//! Every layer derives its own nexus from the nexus of the layer below once
//! its handshake succeeds. A higher nexus keeps the lower one alive for its own
//! lifetime but never closes it; teardown always starts at the transport and
//! cascades upward as revoke events.

use crate::layer::LayerName;
use crate::message::Message;
use crate::seed::SharedSeed;
use crate::Result;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A layer's handle to a live connection.
pub trait Nexus: Send + Sync + fmt::Debug {
    /// Identity of this nexus, unique per layer instance.
    fn uuid(&self) -> Uuid;

    /// Layer that produced this nexus.
    fn layer_name(&self) -> LayerName;

    /// Shared seed copied up from the beacon that opened the connection.
    fn shared_seed(&self) -> &SharedSeed;

    /// Send a message toward the remote end.
    fn send(&self, msg: Message) -> Result<()>;

    /// The nexus this one was derived from. `None` for transport nexuses.
    fn below_nexus(&self) -> Option<Arc<dyn Nexus>>;
}

/// State shared by every nexus that wraps a lower-layer nexus.
pub struct NexusBase {
    uuid: Uuid,
    layer: LayerName,
    below: Arc<dyn Nexus>,
    shared_seed: SharedSeed,
}

impl NexusBase {
    /// Derive a new nexus identity on top of `below`.
    pub fn wrap(layer: LayerName, below: Arc<dyn Nexus>) -> Self {
        let shared_seed = below.shared_seed().clone();
        Self {
            uuid: Uuid::new_v4(),
            layer,
            below,
            shared_seed,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn layer_name(&self) -> LayerName {
        self.layer
    }

    pub fn shared_seed(&self) -> &SharedSeed {
        &self.shared_seed
    }

    pub fn below(&self) -> &Arc<dyn Nexus> {
        &self.below
    }

    /// Send through the wrapped nexus.
    pub fn send(&self, msg: Message) -> Result<()> {
        self.below.send(msg)
    }
}

impl fmt::Debug for NexusBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NexusBase")
            .field("uuid", &self.uuid)
            .field("layer", &self.layer)
            .field("below", &self.below.uuid())
            .finish()
    }
}

/// Walk down the chain starting at `nexus`, yielding each nexus in turn.
///
/// The first item is `nexus` itself; the last is the transport nexus.
pub fn nexus_chain(nexus: Arc<dyn Nexus>) -> Vec<Arc<dyn Nexus>> {
    let mut chain = vec![nexus];
    while let Some(below) = chain.last().and_then(|n| n.below_nexus()) {
        chain.push(below);
    }
    chain
}
