//! The buyer stack: transport, rendezvous, consumer, transact and buyer
//! layers composed into one connection with a narrow application surface.
//!
//! Layers are built bottom-up, each subscribed to before it registers against
//! the layer below. Every layer's status events are tagged with its
//! [`LayerName`] and forwarded to `on_stack_event`; layer-specific events are
//! forwarded 1:1 to the matching application slot. Unset slots drop events.

use crate::config::StackConfig;
use crate::errors::StackError;
use crate::layer::{BuyerLayer, BuyerNexus};
use crate::message::SellerInfo;
use moneysocket_core::emit;
use moneysocket_core::layer::{
    ConsumerLayer, ConsumerNexus, RendezvousLayer, TransactLayer, TransactNexus,
};
use moneysocket_core::{
    Beacon, CallbackSlot, Layer, LayerName, LayerStatus, Nexus, ProviderInfo, SharedSeed,
    TransportLayer,
};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// `(originating layer, nexus, status)`.
pub type StackEventFn = dyn Fn(LayerName, Option<&Arc<dyn Nexus>>, &LayerStatus) + Send + Sync;
pub type AnnounceFn = dyn Fn(&Arc<BuyerNexus>) + Send + Sync;
pub type PingFn = dyn Fn(u64) + Send + Sync;
pub type ProviderInfoFn = dyn Fn(&ProviderInfo) + Send + Sync;
/// `(bolt11 or preimage, request_reference)`.
pub type ReferencedFn = dyn Fn(&str, Uuid) + Send + Sync;
pub type SellerInfoFn = dyn Fn(&SellerInfo) + Send + Sync;
/// `(item_id, opinion)`.
pub type OpinionFn = dyn Fn(&str, &serde_json::Value) + Send + Sync;

/// Application-facing subscriber slots.
#[derive(Default)]
pub struct StackCallbacks {
    pub on_announce: CallbackSlot<AnnounceFn>,
    pub on_revoke: CallbackSlot<AnnounceFn>,
    pub on_stack_event: CallbackSlot<StackEventFn>,
    pub on_ping: CallbackSlot<PingFn>,
    pub on_provider_info: CallbackSlot<ProviderInfoFn>,
    pub on_invoice: CallbackSlot<ReferencedFn>,
    pub on_preimage: CallbackSlot<ReferencedFn>,
    pub on_seller_info: CallbackSlot<SellerInfoFn>,
    pub on_opinion_invoice: CallbackSlot<ReferencedFn>,
    pub on_opinion: CallbackSlot<OpinionFn>,
}

/// Whether the stack currently holds an announced buyer nexus.
#[derive(Clone, Debug, Default)]
pub enum NexusState {
    #[default]
    Absent,
    Live {
        nexus: Arc<BuyerNexus>,
        shared_seed: SharedSeed,
    },
}

impl NexusState {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live { .. })
    }
}

/// Buyer-side Moneysocket stack over the transport `T`.
pub struct BuyerStack<T: TransportLayer + 'static> {
    config: StackConfig,
    transport: Arc<T>,
    rendezvous: Arc<RendezvousLayer>,
    consumer: Arc<ConsumerLayer>,
    transact: Arc<TransactLayer>,
    buyer: Arc<BuyerLayer>,
    callbacks: Arc<StackCallbacks>,
    state: Arc<RwLock<NexusState>>,
}

impl<T: TransportLayer + 'static> BuyerStack<T> {
    /// Compose the stack on top of `transport`.
    pub fn new(transport: Arc<T>, config: StackConfig) -> Self {
        let callbacks = Arc::new(StackCallbacks::default());
        let state = Arc::new(RwLock::new(NexusState::Absent));

        tag_layer_events(&*transport, &callbacks);
        let rendezvous = setup_rendezvous_layer(transport.clone(), &callbacks);
        let consumer = setup_consumer_layer(rendezvous.clone(), &config, &callbacks);
        let transact = setup_transact_layer(consumer.clone(), &config, &callbacks);
        let buyer = setup_buyer_layer(transact.clone(), &config, &callbacks, &state);

        Self {
            config,
            transport,
            rendezvous,
            consumer,
            transact,
            buyer,
            callbacks,
            state,
        }
    }

    pub fn with_defaults(transport: Arc<T>) -> Self {
        Self::new(transport, StackConfig::default())
    }

    /// Start connecting to the first location of `beacon`.
    ///
    /// Returns once the transport has been asked to connect. Handshake
    /// progress and failures arrive through `on_stack_event` and
    /// `on_announce`, never as an error here.
    pub fn connect(&self, beacon: &Beacon) -> Result<(), StackError> {
        let location = beacon.locations().first().ok_or(StackError::EmptyBeacon)?;
        let kind = location.kind();
        if !self.config.supports(kind) {
            warn!(%kind, "refusing to connect to unsupported location");
            return Err(StackError::UnsupportedLocationKind(kind));
        }

        info!(location = %location.to_target(), "buyer stack connecting");
        self.transport.connect(location, beacon.shared_seed());
        Ok(())
    }

    /// Close every transport connection.
    ///
    /// Revokes cascade up through each layer and end in `on_revoke` if a
    /// nexus was live.
    pub fn disconnect(&self) {
        info!("buyer stack disconnecting");
        self.transport.initiate_close_all();
    }

    /// Request an invoice for `item_id` from the connected seller.
    ///
    /// The returned reference is echoed by the matching `on_opinion_invoice`.
    pub fn buy_item(&self, item_id: &str) -> Result<Uuid, StackError> {
        let nexus = self.current_nexus().ok_or(StackError::NoLiveNexus)?;
        let reference = nexus.request_opinion_invoice(item_id)?;
        info!(%item_id, %reference, "requested opinion invoice");
        Ok(reference)
    }

    pub fn is_connected(&self) -> bool {
        self.read_state().is_live()
    }

    pub fn current_nexus(&self) -> Option<Arc<BuyerNexus>> {
        match &*self.read_state() {
            NexusState::Live { nexus, .. } => Some(nexus.clone()),
            NexusState::Absent => None,
        }
    }

    /// Shared seed of the live nexus.
    pub fn shared_seed(&self) -> Option<SharedSeed> {
        match &*self.read_state() {
            NexusState::Live { shared_seed, .. } => Some(shared_seed.clone()),
            NexusState::Absent => None,
        }
    }

    pub fn nexus_state(&self) -> NexusState {
        self.read_state().clone()
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Subscriber slots, for clearing or inspecting them.
    pub fn callbacks(&self) -> &StackCallbacks {
        &self.callbacks
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn rendezvous_layer(&self) -> &Arc<RendezvousLayer> {
        &self.rendezvous
    }

    pub fn consumer_layer(&self) -> &Arc<ConsumerLayer> {
        &self.consumer
    }

    pub fn transact_layer(&self) -> &Arc<TransactLayer> {
        &self.transact
    }

    pub fn buyer_layer(&self) -> &Arc<BuyerLayer> {
        &self.buyer
    }

    pub fn on_announce(&self, f: impl Fn(&Arc<BuyerNexus>) + Send + Sync + 'static) {
        self.callbacks.on_announce.set(Arc::new(f));
    }

    pub fn on_revoke(&self, f: impl Fn(&Arc<BuyerNexus>) + Send + Sync + 'static) {
        self.callbacks.on_revoke.set(Arc::new(f));
    }

    pub fn on_stack_event(
        &self,
        f: impl Fn(LayerName, Option<&Arc<dyn Nexus>>, &LayerStatus) + Send + Sync + 'static,
    ) {
        self.callbacks.on_stack_event.set(Arc::new(f));
    }

    pub fn on_ping(&self, f: impl Fn(u64) + Send + Sync + 'static) {
        self.callbacks.on_ping.set(Arc::new(f));
    }

    pub fn on_provider_info(&self, f: impl Fn(&ProviderInfo) + Send + Sync + 'static) {
        self.callbacks.on_provider_info.set(Arc::new(f));
    }

    pub fn on_invoice(&self, f: impl Fn(&str, Uuid) + Send + Sync + 'static) {
        self.callbacks.on_invoice.set(Arc::new(f));
    }

    pub fn on_preimage(&self, f: impl Fn(&str, Uuid) + Send + Sync + 'static) {
        self.callbacks.on_preimage.set(Arc::new(f));
    }

    pub fn on_seller_info(&self, f: impl Fn(&SellerInfo) + Send + Sync + 'static) {
        self.callbacks.on_seller_info.set(Arc::new(f));
    }

    pub fn on_opinion_invoice(&self, f: impl Fn(&str, Uuid) + Send + Sync + 'static) {
        self.callbacks.on_opinion_invoice.set(Arc::new(f));
    }

    pub fn on_opinion(&self, f: impl Fn(&str, &serde_json::Value) + Send + Sync + 'static) {
        self.callbacks.on_opinion.set(Arc::new(f));
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, NexusState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Forward `layer`'s status events to `on_stack_event`, tagged with its name.
fn tag_layer_events<L: Layer + ?Sized>(layer: &L, callbacks: &Arc<StackCallbacks>) {
    let name = layer.layer_name();
    let callbacks = callbacks.clone();
    layer.on_layer_event().set(Arc::new(
        move |nexus: Option<&Arc<dyn Nexus>>, status: &LayerStatus| {
            emit!(callbacks.on_stack_event, name, nexus, status);
        },
    ));
}

fn setup_rendezvous_layer<T: TransportLayer + 'static>(
    below: Arc<T>,
    callbacks: &Arc<StackCallbacks>,
) -> Arc<RendezvousLayer> {
    let layer = RendezvousLayer::new();
    tag_layer_events(&*layer, callbacks);
    layer.register_above_layer(below);
    layer
}

fn setup_consumer_layer(
    below: Arc<RendezvousLayer>,
    config: &StackConfig,
    callbacks: &Arc<StackCallbacks>,
) -> Arc<ConsumerLayer> {
    let layer =
        ConsumerLayer::with_limits(config.max_pending_requests, config.request_timeout());
    tag_layer_events(&*layer, callbacks);

    let cb = callbacks.clone();
    layer.on_provider_info.set(Arc::new(
        move |_: &Arc<ConsumerNexus>, info: &ProviderInfo| {
            emit!(cb.on_provider_info, info);
        },
    ));
    let cb = callbacks.clone();
    layer
        .on_ping
        .set(Arc::new(move |_: &Arc<ConsumerNexus>, msecs: u64| {
            emit!(cb.on_ping, msecs);
        }));

    layer.register_above_layer(below);
    layer
}

fn setup_transact_layer(
    below: Arc<ConsumerLayer>,
    config: &StackConfig,
    callbacks: &Arc<StackCallbacks>,
) -> Arc<TransactLayer> {
    let layer =
        TransactLayer::with_limits(config.max_pending_requests, config.request_timeout());
    tag_layer_events(&*layer, callbacks);

    let cb = callbacks.clone();
    layer.on_invoice.set(Arc::new(
        move |_: &Arc<TransactNexus>, bolt11: &str, reference: Uuid| {
            emit!(cb.on_invoice, bolt11, reference);
        },
    ));
    let cb = callbacks.clone();
    layer.on_preimage.set(Arc::new(
        move |_: &Arc<TransactNexus>, preimage: &str, reference: Uuid| {
            emit!(cb.on_preimage, preimage, reference);
        },
    ));

    layer.register_above_layer(below);
    layer
}

fn setup_buyer_layer(
    below: Arc<TransactLayer>,
    config: &StackConfig,
    callbacks: &Arc<StackCallbacks>,
    state: &Arc<RwLock<NexusState>>,
) -> Arc<BuyerLayer> {
    let layer =
        BuyerLayer::with_limits(config.max_pending_requests, config.request_timeout());
    tag_layer_events(&*layer, callbacks);

    let cb = callbacks.clone();
    layer.on_seller_info.set(Arc::new(
        move |_: &Arc<BuyerNexus>, info: &SellerInfo| {
            emit!(cb.on_seller_info, info);
        },
    ));
    let cb = callbacks.clone();
    layer.on_opinion_invoice.set(Arc::new(
        move |_: &Arc<BuyerNexus>, bolt11: &str, reference: Uuid| {
            emit!(cb.on_opinion_invoice, bolt11, reference);
        },
    ));
    let cb = callbacks.clone();
    layer.on_opinion.set(Arc::new(
        move |_: &Arc<BuyerNexus>, item_id: &str, opinion: &serde_json::Value| {
            emit!(cb.on_opinion, item_id, opinion);
        },
    ));

    let (cb, st) = (callbacks.clone(), state.clone());
    layer
        .on_announce
        .set(Arc::new(move |nexus: &Arc<BuyerNexus>| {
            announce_nexus(&st, &cb, nexus);
        }));
    let (cb, st) = (callbacks.clone(), state.clone());
    layer
        .on_revoke
        .set(Arc::new(move |nexus: &Arc<BuyerNexus>| {
            revoke_nexus(&st, &cb, nexus);
        }));

    layer.register_above_layer(below);
    layer
}

/// Absent -> Live. A second announce replaces the live nexus.
fn announce_nexus(state: &RwLock<NexusState>, callbacks: &StackCallbacks, nexus: &Arc<BuyerNexus>) {
    let live = NexusState::Live {
        nexus: nexus.clone(),
        shared_seed: nexus.shared_seed().clone(),
    };
    let previous = std::mem::replace(
        &mut *state.write().unwrap_or_else(|e| e.into_inner()),
        live,
    );
    if let NexusState::Live { nexus: replaced, .. } = previous {
        warn!(
            replaced = %replaced.uuid(),
            nexus = %nexus.uuid(),
            "nexus announced while another was live, replacing"
        );
    }

    info!(nexus = %nexus.uuid(), "buyer nexus announced");
    emit!(callbacks.on_announce, nexus);
}

/// Live -> Absent. Revokes of anything but the live nexus are ignored.
fn revoke_nexus(state: &RwLock<NexusState>, callbacks: &StackCallbacks, nexus: &Arc<BuyerNexus>) {
    let current = {
        let mut state = state.write().unwrap_or_else(|e| e.into_inner());
        let current = match &*state {
            NexusState::Live { nexus: live, .. } => Some(live.uuid()),
            NexusState::Absent => None,
        };
        if current == Some(nexus.uuid()) {
            *state = NexusState::Absent;
        }
        current
    };

    match current {
        Some(uuid) if uuid == nexus.uuid() => {
            info!(nexus = %nexus.uuid(), "buyer nexus revoked");
            emit!(callbacks.on_revoke, nexus);
        }
        Some(live) => warn!(
            nexus = %nexus.uuid(),
            %live,
            "revoke for a nexus that is not live, ignoring"
        ),
        None => warn!(nexus = %nexus.uuid(), "revoke with no live nexus, ignoring"),
    }
}
