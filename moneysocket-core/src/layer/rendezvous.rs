//! Outgoing rendezvous layer.
//!
//! Sits on the transport. For every transport nexus it asks the relay to pair
//! it with the peer holding the same shared seed, and only announces its own
//! nexus once the relay reports the rendezvous as complete.

use super::{
    remote_error_reason, AboveLayer, BelowLayer, Layer, LayerCore, LayerEventFn, LayerName,
    LayerStatus,
};
use crate::callback::CallbackSlot;
use crate::message::Message;
use crate::nexus::{Nexus, NexusBase};
use crate::seed::SharedSeed;
use crate::Result;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};
use uuid::Uuid;

/// Nexus produced once the relay has paired both ends.
pub struct RendezvousNexus {
    base: NexusBase,
    rid: String,
}

impl RendezvousNexus {
    fn new(below: Arc<dyn Nexus>) -> Self {
        let base = NexusBase::wrap(LayerName::OutgoingRendezvous, below);
        let rid = base.shared_seed().derive_rendezvous_id();
        Self { base, rid }
    }

    /// Rendezvous id presented to the relay.
    pub fn rendezvous_id(&self) -> &str {
        &self.rid
    }

    fn start_rendezvous(&self) -> Result<()> {
        self.base.send(Message::RendezvousRequest {
            rid: self.rid.clone(),
        })
    }
}

impl Nexus for RendezvousNexus {
    fn uuid(&self) -> Uuid {
        self.base.uuid()
    }

    fn layer_name(&self) -> LayerName {
        self.base.layer_name()
    }

    fn shared_seed(&self) -> &SharedSeed {
        self.base.shared_seed()
    }

    fn send(&self, msg: Message) -> Result<()> {
        self.base.send(msg)
    }

    fn below_nexus(&self) -> Option<Arc<dyn Nexus>> {
        Some(self.base.below().clone())
    }
}

impl fmt::Debug for RendezvousNexus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendezvousNexus")
            .field("base", &self.base)
            .finish()
    }
}

/// Layer that negotiates a relayed session over each transport nexus.
pub struct RendezvousLayer {
    core: LayerCore<RendezvousNexus>,
}

impl RendezvousLayer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            core: LayerCore::new(LayerName::OutgoingRendezvous),
        })
    }

    /// Stack this layer on top of `below`.
    pub fn register_above_layer(self: &Arc<Self>, below: Arc<dyn BelowLayer>) {
        let me: Weak<dyn AboveLayer> = Arc::downgrade(self) as Weak<dyn AboveLayer>;
        self.core.register_below(below, me);
    }

    pub fn below_layer(&self) -> Option<Arc<dyn BelowLayer>> {
        self.core.below_layer()
    }

    pub fn nexuses(&self) -> Vec<Arc<RendezvousNexus>> {
        self.core.nexuses()
    }

    fn on_handshake_message(&self, below_uuid: Uuid, nexus: &Arc<RendezvousNexus>, msg: Message) {
        match msg {
            Message::RendezvousNotReady { rid } if rid == nexus.rid => {
                debug!(nexus = %nexus.uuid(), "rendezvous not ready, waiting");
                self.core
                    .emit_nexus_status(nexus, LayerStatus::NexusWaiting);
            }
            Message::RendezvousEnd { rid } if rid == nexus.rid => {
                if let Some(nexus) = self.core.mark_announced(&below_uuid) {
                    self.core.announce_upward(&nexus);
                }
            }
            Message::Error { code, message } => {
                warn!(nexus = %nexus.uuid(), %code, %message, "relay refused rendezvous");
                self.core.emit_nexus_status(
                    nexus,
                    LayerStatus::Errored {
                        reason: remote_error_reason(&code, &message),
                    },
                );
            }
            Message::RendezvousNotReady { rid } | Message::RendezvousEnd { rid } => {
                warn!(nexus = %nexus.uuid(), %rid, "rendezvous reply for a different id");
            }
            other => {
                warn!(
                    nexus = %nexus.uuid(),
                    msg = other.name(),
                    "message before rendezvous completed, dropping"
                );
            }
        }
    }
}

impl Layer for RendezvousLayer {
    fn layer_name(&self) -> LayerName {
        self.core.name()
    }

    fn on_layer_event(&self) -> &CallbackSlot<LayerEventFn> {
        self.core.on_layer_event()
    }
}

impl BelowLayer for RendezvousLayer {
    fn set_above_layer(&self, above: Weak<dyn AboveLayer>) {
        self.core.set_above(above);
    }
}

impl AboveLayer for RendezvousLayer {
    fn announce_nexus(&self, below_nexus: Arc<dyn Nexus>) {
        let nexus = Arc::new(RendezvousNexus::new(below_nexus.clone()));
        self.core.track(below_nexus.uuid(), nexus.clone());

        match nexus.start_rendezvous() {
            Ok(()) => self
                .core
                .emit_nexus_status(&nexus, LayerStatus::NexusWaiting),
            Err(e) => self.core.emit_nexus_status(
                &nexus,
                LayerStatus::Errored {
                    reason: format!("rendezvous request failed: {}", e),
                },
            ),
        }
    }

    fn revoke_nexus(&self, below_nexus: Arc<dyn Nexus>) {
        self.core.handle_below_revoke(&below_nexus);
    }

    fn on_message(&self, below_nexus: Arc<dyn Nexus>, msg: Message) {
        let below_uuid = below_nexus.uuid();
        let Some(nexus) = self.core.get(&below_uuid) else {
            warn!(below = %below_uuid, msg = msg.name(), "message for unknown nexus");
            return;
        };

        if !self.core.is_announced(&below_uuid) {
            self.on_handshake_message(below_uuid, &nexus, msg);
            return;
        }

        match msg {
            Message::RendezvousRequest { .. }
            | Message::RendezvousNotReady { .. }
            | Message::RendezvousEnd { .. } => {
                debug!(nexus = %nexus.uuid(), msg = msg.name(), "late rendezvous message ignored");
            }
            other => self.core.forward_upward(&nexus, other),
        }
    }
}
