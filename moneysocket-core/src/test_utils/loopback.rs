//! In-memory transport for exercising stacks without a network.
//!
//! Outgoing messages are JSON round-tripped, recorded, and handed to an
//! optional responder playing the remote end. Replies are queued on the
//! nexus and only delivered upward by [`LoopbackTransport::pump`], so tests
//! control exactly when inbound traffic happens.

use super::fixtures::{random_preimage, test_invoice};
use crate::callback::CallbackSlot;
use crate::errors::LayerError;
use crate::layer::{
    AboveLayer, BelowLayer, Layer, LayerEventFn, LayerName, LayerStatus, TransportLayer,
};
use crate::location::Location;
use crate::message::{Message, ProviderInfo};
use crate::nexus::Nexus;
use crate::seed::SharedSeed;
use crate::Result;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tracing::debug;
use uuid::Uuid;

/// Plays the remote end: maps each outgoing message to zero or more replies.
pub type Responder = dyn Fn(&Message) -> Vec<Message> + Send + Sync;

/// Upper bound on messages delivered by one `pump` call.
const MAX_PUMPED: usize = 10_000;

/// Transport-level nexus backed by in-memory queues.
pub struct LoopbackNexus {
    uuid: Uuid,
    shared_seed: SharedSeed,
    location: Location,
    responder: Option<Arc<Responder>>,
    inbox: Mutex<VecDeque<Message>>,
    sent: Mutex<Vec<Message>>,
    send_failure: RwLock<Option<String>>,
    closed: AtomicBool,
}

impl LoopbackNexus {
    fn new(location: Location, shared_seed: SharedSeed, responder: Option<Arc<Responder>>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            shared_seed,
            location,
            responder,
            inbox: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            send_failure: RwLock::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Every message sent through this nexus, in order.
    pub fn sent_messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Queue an inbound message without delivering it.
    pub fn inject(&self, msg: Message) {
        self.inbox
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(msg);
    }

    /// Make every later send fail with a transport error, or succeed again
    /// with `None`.
    pub fn fail_sends(&self, reason: Option<String>) {
        *self
            .send_failure
            .write()
            .unwrap_or_else(|e| e.into_inner()) = reason;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn next_inbound(&self) -> Option<Message> {
        self.inbox
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}

impl Nexus for LoopbackNexus {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn layer_name(&self) -> LayerName {
        LayerName::OutgoingWebsocket
    }

    fn shared_seed(&self) -> &SharedSeed {
        &self.shared_seed
    }

    fn send(&self, msg: Message) -> Result<()> {
        if self.is_closed() {
            return Err(LayerError::NexusClosed);
        }
        if let Some(reason) = self
            .send_failure
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Err(LayerError::Transport(reason));
        }
        let msg = Message::decode(&msg.encode()?)?;
        let replies = match &self.responder {
            Some(responder) => responder(&msg),
            None => Vec::new(),
        };
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(msg);
        for reply in replies {
            self.inject(reply);
        }
        Ok(())
    }

    fn below_nexus(&self) -> Option<Arc<dyn Nexus>> {
        None
    }
}

impl fmt::Debug for LoopbackNexus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackNexus")
            .field("uuid", &self.uuid)
            .field("location", &self.location.to_target())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Transport layer that connects instantly to an in-memory peer.
pub struct LoopbackTransport {
    on_layer_event: CallbackSlot<LayerEventFn>,
    above: RwLock<Option<Weak<dyn AboveLayer>>>,
    responder: RwLock<Option<Arc<Responder>>>,
    refuse: RwLock<Option<String>>,
    nexuses: Mutex<Vec<Arc<LoopbackNexus>>>,
    connect_calls: Mutex<Vec<(Location, SharedSeed)>>,
    close_all_calls: AtomicUsize,
}

impl LoopbackTransport {
    /// Transport whose peer never answers.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            on_layer_event: CallbackSlot::new(),
            above: RwLock::new(None),
            responder: RwLock::new(None),
            refuse: RwLock::new(None),
            nexuses: Mutex::new(Vec::new()),
            connect_calls: Mutex::new(Vec::new()),
            close_all_calls: AtomicUsize::new(0),
        })
    }

    /// Transport whose peer answers through `responder`.
    pub fn with_responder(responder: Arc<Responder>) -> Arc<Self> {
        let transport = Self::new();
        transport.set_responder(responder);
        transport
    }

    /// Responder for nexuses created from now on.
    pub fn set_responder(&self, responder: Arc<Responder>) {
        *self.responder.write().unwrap_or_else(|e| e.into_inner()) = Some(responder);
    }

    /// Make every later `connect` fail with `reason` until cleared with `None`.
    pub fn refuse_connections(&self, reason: Option<String>) {
        *self.refuse.write().unwrap_or_else(|e| e.into_inner()) = reason;
    }

    pub fn connect_calls(&self) -> Vec<(Location, SharedSeed)> {
        self.connect_calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn close_all_calls(&self) -> usize {
        self.close_all_calls.load(Ordering::SeqCst)
    }

    /// Every nexus created so far, open or closed.
    pub fn nexuses(&self) -> Vec<Arc<LoopbackNexus>> {
        self.nexuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Most recently created nexus that is still open.
    pub fn latest_open(&self) -> Option<Arc<LoopbackNexus>> {
        self.nexuses()
            .into_iter()
            .rev()
            .find(|nexus| !nexus.is_closed())
    }

    /// Messages sent on every nexus, in creation then send order.
    pub fn sent_messages(&self) -> Vec<Message> {
        self.nexuses()
            .iter()
            .flat_map(|nexus| nexus.sent_messages())
            .collect()
    }

    /// Deliver queued inbound messages upward until every open nexus is idle.
    ///
    /// Returns the number of messages delivered.
    pub fn pump(&self) -> usize {
        let mut delivered = 0;
        loop {
            let mut progressed = false;
            for nexus in self.nexuses() {
                if nexus.is_closed() {
                    continue;
                }
                while let Some(msg) = nexus.next_inbound() {
                    self.deliver_upward(&nexus, msg);
                    delivered += 1;
                    progressed = true;
                    if delivered >= MAX_PUMPED {
                        return delivered;
                    }
                }
            }
            if !progressed {
                return delivered;
            }
        }
    }

    /// Queue `msg` on the latest open nexus and pump.
    ///
    /// Returns `false` if no nexus is open.
    pub fn deliver(&self, msg: Message) -> bool {
        match self.latest_open() {
            Some(nexus) => {
                nexus.inject(msg);
                self.pump();
                true
            }
            None => false,
        }
    }

    fn above(&self) -> Option<Arc<dyn AboveLayer>> {
        self.above
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(Weak::upgrade)
    }

    fn deliver_upward(&self, nexus: &Arc<LoopbackNexus>, msg: Message) {
        match self.above() {
            Some(above) => above.on_message(nexus.clone(), msg),
            None => debug!(msg = msg.name(), "no layer above loopback, dropping"),
        }
    }

    fn emit(&self, nexus: Option<&Arc<LoopbackNexus>>, status: LayerStatus) {
        if let Some(callback) = self.on_layer_event.get() {
            let nexus: Option<Arc<dyn Nexus>> = nexus.map(|n| n.clone() as Arc<dyn Nexus>);
            callback(nexus.as_ref(), &status);
        }
    }
}

impl Layer for LoopbackTransport {
    fn layer_name(&self) -> LayerName {
        LayerName::OutgoingWebsocket
    }

    fn on_layer_event(&self) -> &CallbackSlot<LayerEventFn> {
        &self.on_layer_event
    }
}

impl BelowLayer for LoopbackTransport {
    fn set_above_layer(&self, above: Weak<dyn AboveLayer>) {
        *self.above.write().unwrap_or_else(|e| e.into_inner()) = Some(above);
    }
}

impl TransportLayer for LoopbackTransport {
    fn connect(&self, location: &Location, shared_seed: &SharedSeed) {
        self.connect_calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((location.clone(), shared_seed.clone()));
        self.emit(None, LayerStatus::Connecting);

        let refused = self
            .refuse
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(reason) = refused {
            self.emit(None, LayerStatus::Errored { reason });
            return;
        }

        let responder = self
            .responder
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let nexus = Arc::new(LoopbackNexus::new(
            location.clone(),
            shared_seed.clone(),
            responder,
        ));
        self.nexuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(nexus.clone());
        debug!(nexus = %nexus.uuid(), target = %location, "loopback connected");

        self.emit(Some(&nexus), LayerStatus::Connected);
        self.emit(Some(&nexus), LayerStatus::NexusAnnounced);
        if let Some(above) = self.above() {
            above.announce_nexus(nexus.clone());
        }
    }

    fn initiate_close_all(&self) {
        self.close_all_calls.fetch_add(1, Ordering::SeqCst);
        for nexus in self.nexuses() {
            if !nexus.close() {
                continue;
            }
            self.emit(Some(&nexus), LayerStatus::Disconnected);
            if let Some(above) = self.above() {
                above.revoke_nexus(nexus.clone());
            }
        }
    }
}

impl fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("nexuses", &self.nexuses().len())
            .field("close_all_calls", &self.close_all_calls())
            .finish()
    }
}

/// Responder acting as a relay plus a ready provider described by `info`.
///
/// Completes rendezvous immediately, answers provider requests with `info`,
/// answers pings, issues test invoices and pays with a random preimage.
/// Anything else gets no reply.
pub fn provider_responder(info: ProviderInfo) -> Arc<Responder> {
    Arc::new(move |msg: &Message| match msg {
        Message::RendezvousRequest { rid } => vec![Message::RendezvousEnd { rid: rid.clone() }],
        Message::RequestProvider { request_uuid } => vec![Message::Provider {
            request_reference_uuid: Some(*request_uuid),
            info: info.clone(),
        }],
        Message::Ping { request_uuid } => vec![Message::Pong {
            request_reference_uuid: *request_uuid,
        }],
        Message::RequestInvoice {
            request_uuid,
            msats,
            description,
        } => vec![Message::Invoice {
            request_reference_uuid: *request_uuid,
            bolt11: test_invoice(*msats, description.as_deref().unwrap_or("")),
        }],
        Message::RequestPay { request_uuid, .. } => vec![Message::Preimage {
            request_reference_uuid: *request_uuid,
            preimage: random_preimage(),
        }],
        _ => Vec::new(),
    })
}
