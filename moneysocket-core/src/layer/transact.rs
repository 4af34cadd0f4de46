//! Consumer transact layer: invoice and payment requests.
//!
//! The transact nexus is announced as soon as the consumer nexus below it is.
//! Requests get a fresh reference in the nexus' pending table; responses are
//! delivered only when they reference a request still pending.

use super::{
    AboveLayer, BelowLayer, Layer, LayerCore, LayerEventFn, LayerName, DEFAULT_MAX_PENDING,
    DEFAULT_REQUEST_TIMEOUT,
};
use crate::callback::CallbackSlot;
use crate::message::Message;
use crate::nexus::{Nexus, NexusBase};
use crate::pending::PendingRequests;
use crate::seed::SharedSeed;
use crate::Result;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Invoice delivery callback: `(nexus, bolt11, request_reference)`.
pub type InvoiceFn = dyn Fn(&Arc<TransactNexus>, &str, Uuid) + Send + Sync;

/// Preimage delivery callback: `(nexus, preimage, request_reference)`.
pub type PreimageFn = dyn Fn(&Arc<TransactNexus>, &str, Uuid) + Send + Sync;

/// What an outstanding transact request asked for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactRequest {
    Invoice {
        msats: u64,
        description: Option<String>,
    },
    Pay {
        bolt11: String,
    },
}

/// Nexus able to request invoices and payments from the provider.
pub struct TransactNexus {
    base: NexusBase,
    pending: PendingRequests<TransactRequest>,
}

impl TransactNexus {
    fn new(below: Arc<dyn Nexus>, max_pending: usize, request_timeout: Duration) -> Self {
        Self {
            base: NexusBase::wrap(LayerName::ConsumerTransact, below),
            pending: PendingRequests::with_timeout(max_pending, request_timeout),
        }
    }

    /// Ask the provider for an invoice of `msats`.
    pub fn request_invoice(&self, msats: u64, description: Option<String>) -> Result<Uuid> {
        let request_uuid = self.pending.insert(TransactRequest::Invoice {
            msats,
            description: description.clone(),
        })?;
        self.send_request(
            request_uuid,
            Message::RequestInvoice {
                request_uuid,
                msats,
                description,
            },
        )
    }

    /// Ask the provider to pay `bolt11`.
    pub fn request_pay(&self, bolt11: impl Into<String>) -> Result<Uuid> {
        let bolt11 = bolt11.into();
        let request_uuid = self.pending.insert(TransactRequest::Pay {
            bolt11: bolt11.clone(),
        })?;
        self.send_request(
            request_uuid,
            Message::RequestPay {
                request_uuid,
                bolt11,
            },
        )
    }

    pub fn is_pending(&self, request_reference: &Uuid) -> bool {
        self.pending.contains(request_reference)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn send_request(&self, request_uuid: Uuid, msg: Message) -> Result<Uuid> {
        if let Err(e) = self.base.send(msg) {
            self.pending.cancel(&request_uuid);
            return Err(e);
        }
        Ok(request_uuid)
    }
}

impl Nexus for TransactNexus {
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

impl fmt::Debug for TransactNexus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactNexus")
            .field("base", &self.base)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Layer correlating invoice/preimage responses with their requests.
pub struct TransactLayer {
    core: LayerCore<TransactNexus>,
    max_pending: usize,
    request_timeout: Duration,
    pub on_invoice: CallbackSlot<InvoiceFn>,
    pub on_preimage: CallbackSlot<PreimageFn>,
}

impl TransactLayer {
    pub fn new() -> Arc<Self> {
        Self::with_max_pending(DEFAULT_MAX_PENDING)
    }

    pub fn with_max_pending(max_pending: usize) -> Arc<Self> {
        Self::with_limits(max_pending, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Cap outstanding requests per nexus and abandon those older than
    /// `request_timeout`.
    pub fn with_limits(max_pending: usize, request_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            core: LayerCore::new(LayerName::ConsumerTransact),
            max_pending,
            request_timeout,
            on_invoice: CallbackSlot::new(),
            on_preimage: CallbackSlot::new(),
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

    pub fn nexuses(&self) -> Vec<Arc<TransactNexus>> {
        self.core.nexuses()
    }

    fn on_invoice_msg(&self, nexus: &Arc<TransactNexus>, bolt11: String, reference: Uuid) {
        match nexus.pending.take(&reference) {
            Some(TransactRequest::Invoice { .. }) => {
                debug!(nexus = %nexus.uuid(), %reference, "invoice received");
                crate::emit!(self.on_invoice, nexus, &bolt11, reference);
            }
            Some(other) => {
                warn!(nexus = %nexus.uuid(), %reference, request = ?other, "invoice answers a non-invoice request");
            }
            None => warn!(nexus = %nexus.uuid(), %reference, "unmatched invoice, dropping"),
        }
    }

    fn on_preimage_msg(&self, nexus: &Arc<TransactNexus>, preimage: String, reference: Uuid) {
        match nexus.pending.take(&reference) {
            Some(TransactRequest::Pay { .. }) => {
                debug!(nexus = %nexus.uuid(), %reference, "preimage received");
                crate::emit!(self.on_preimage, nexus, &preimage, reference);
            }
            Some(other) => {
                warn!(nexus = %nexus.uuid(), %reference, request = ?other, "preimage answers a non-pay request");
            }
            None => warn!(nexus = %nexus.uuid(), %reference, "unmatched preimage, dropping"),
        }
    }
}

impl Layer for TransactLayer {
    fn layer_name(&self) -> LayerName {
        self.core.name()
    }

    fn on_layer_event(&self) -> &CallbackSlot<LayerEventFn> {
        self.core.on_layer_event()
    }
}

impl BelowLayer for TransactLayer {
    fn set_above_layer(&self, above: Weak<dyn AboveLayer>) {
        self.core.set_above(above);
    }
}

impl AboveLayer for TransactLayer {
    fn announce_nexus(&self, below_nexus: Arc<dyn Nexus>) {
        let below_uuid = below_nexus.uuid();
        let nexus = Arc::new(TransactNexus::new(
            below_nexus,
            self.max_pending,
            self.request_timeout,
        ));
        self.core.track(below_uuid, nexus);
        if let Some(nexus) = self.core.mark_announced(&below_uuid) {
            self.core.announce_upward(&nexus);
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

        match msg {
            Message::Invoice {
                request_reference_uuid,
                bolt11,
            } => self.on_invoice_msg(&nexus, bolt11, request_reference_uuid),
            Message::Preimage {
                request_reference_uuid,
                preimage,
            } => self.on_preimage_msg(&nexus, preimage, request_reference_uuid),
            other => self.core.forward_upward(&nexus, other),
        }
    }
}
