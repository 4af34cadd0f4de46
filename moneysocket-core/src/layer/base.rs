//! Bookkeeping shared by every wrapping layer.

use super::{AboveLayer, BelowLayer, LayerEventFn, LayerName, LayerStatus};
use crate::callback::CallbackSlot;
use crate::message::Message;
use crate::nexus::Nexus;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use tracing::{debug, warn};
use uuid::Uuid;

struct Tracked<N> {
    nexus: Arc<N>,
    announced: bool,
}

/// Links to the neighbouring layers plus the nexuses this layer manages.
///
/// Nexuses are keyed by the uuid of the below-nexus they wrap. No internal
/// lock is held while calling into another layer or a callback slot.
pub struct LayerCore<N> {
    name: LayerName,
    below: OnceLock<Arc<dyn BelowLayer>>,
    above: RwLock<Option<Weak<dyn AboveLayer>>>,
    nexuses: Mutex<HashMap<Uuid, Tracked<N>>>,
    on_layer_event: CallbackSlot<LayerEventFn>,
}

impl<N: Nexus + 'static> LayerCore<N> {
    pub fn new(name: LayerName) -> Self {
        Self {
            name,
            below: OnceLock::new(),
            above: RwLock::new(None),
            nexuses: Mutex::new(HashMap::new()),
            on_layer_event: CallbackSlot::new(),
        }
    }

    pub fn name(&self) -> LayerName {
        self.name
    }

    pub fn on_layer_event(&self) -> &CallbackSlot<LayerEventFn> {
        &self.on_layer_event
    }

    /// Record `below` as the layer to command and register `me` on it.
    ///
    /// The below-layer is set once; later registrations are ignored.
    pub fn register_below(&self, below: Arc<dyn BelowLayer>, me: Weak<dyn AboveLayer>) {
        let below_name = below.layer_name();
        if self.below.set(below.clone()).is_err() {
            warn!(
                layer = %self.name,
                below = %below_name,
                "below-layer already registered, ignoring"
            );
            return;
        }
        below.set_above_layer(me);
        debug!(layer = %self.name, below = %below_name, "registered above layer");
    }

    pub fn below_layer(&self) -> Option<Arc<dyn BelowLayer>> {
        self.below.get().cloned()
    }

    /// Last write wins.
    pub fn set_above(&self, above: Weak<dyn AboveLayer>) {
        let mut slot = self.above.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(above);
    }

    pub fn above(&self) -> Option<Arc<dyn AboveLayer>> {
        self.above
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Start managing `nexus`, derived from the below-nexus `below_uuid`.
    pub fn track(&self, below_uuid: Uuid, nexus: Arc<N>) {
        let mut nexuses = self.nexuses.lock().unwrap_or_else(|e| e.into_inner());
        if nexuses
            .insert(
                below_uuid,
                Tracked {
                    nexus,
                    announced: false,
                },
            )
            .is_some()
        {
            warn!(layer = %self.name, %below_uuid, "below nexus announced twice, replacing");
        }
    }

    pub fn get(&self, below_uuid: &Uuid) -> Option<Arc<N>> {
        self.nexuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(below_uuid)
            .map(|t| t.nexus.clone())
    }

    pub fn is_announced(&self, below_uuid: &Uuid) -> bool {
        self.nexuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(below_uuid)
            .map(|t| t.announced)
            .unwrap_or(false)
    }

    /// Flag the nexus as announced.
    ///
    /// Returns it only on the first call; a second announce is refused.
    pub fn mark_announced(&self, below_uuid: &Uuid) -> Option<Arc<N>> {
        let mut nexuses = self.nexuses.lock().unwrap_or_else(|e| e.into_inner());
        let tracked = nexuses.get_mut(below_uuid)?;
        if tracked.announced {
            warn!(layer = %self.name, nexus = %tracked.nexus.uuid(), "nexus already announced");
            return None;
        }
        tracked.announced = true;
        Some(tracked.nexus.clone())
    }

    /// Stop managing the nexus wrapping `below_uuid`.
    ///
    /// Returns the nexus and whether it had been announced.
    pub fn untrack(&self, below_uuid: &Uuid) -> Option<(Arc<N>, bool)> {
        self.nexuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(below_uuid)
            .map(|t| (t.nexus, t.announced))
    }

    pub fn nexuses(&self) -> Vec<Arc<N>> {
        self.nexuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|t| t.nexus.clone())
            .collect()
    }

    pub fn emit_status(&self, nexus: Option<Arc<dyn Nexus>>, status: LayerStatus) {
        crate::emit!(self.on_layer_event, nexus.as_ref(), &status);
    }

    pub fn emit_nexus_status(&self, nexus: &Arc<N>, status: LayerStatus) {
        let dyn_nexus: Arc<dyn Nexus> = nexus.clone();
        self.emit_status(Some(dyn_nexus), status);
    }

    /// Report the nexus as announced and hand it to the layer above.
    pub fn announce_upward(&self, nexus: &Arc<N>) {
        debug!(layer = %self.name, nexus = %nexus.uuid(), "announcing nexus");
        self.emit_nexus_status(nexus, LayerStatus::NexusAnnounced);
        if let Some(above) = self.above() {
            above.announce_nexus(nexus.clone());
        }
    }

    /// Report the nexus as revoked and revoke it on the layer above.
    pub fn revoke_upward(&self, nexus: &Arc<N>) {
        debug!(layer = %self.name, nexus = %nexus.uuid(), "revoking nexus");
        self.emit_nexus_status(nexus, LayerStatus::NexusRevoked);
        if let Some(above) = self.above() {
            above.revoke_nexus(nexus.clone());
        }
    }

    /// Pass an unconsumed message to the layer above.
    pub fn forward_upward(&self, nexus: &Arc<N>, msg: Message) {
        match self.above() {
            Some(above) => above.on_message(nexus.clone(), msg),
            None => debug!(layer = %self.name, msg = msg.name(), "no layer above, dropping"),
        }
    }

    /// Standard handling of a below-revoke: untrack, then cascade if announced.
    pub fn handle_below_revoke(&self, below_nexus: &Arc<dyn Nexus>) -> Option<Arc<N>> {
        let (nexus, announced) = match self.untrack(&below_nexus.uuid()) {
            Some(entry) => entry,
            None => {
                warn!(layer = %self.name, below = %below_nexus.uuid(), "revoke for unknown nexus");
                return None;
            }
        };
        if announced {
            self.revoke_upward(&nexus);
        }
        Some(nexus)
    }
}
