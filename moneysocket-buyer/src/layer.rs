//! Buyer role layer.
//!
//! Sits on the consumer transact layer. A fresh transact nexus is asked for
//! seller info; the first seller info announces the buyer nexus, which is the
//! handle the application buys items through.

use crate::message::{BuyerMessage, SellerInfo};
use moneysocket_core::layer::{LayerCore, DEFAULT_MAX_PENDING, DEFAULT_REQUEST_TIMEOUT};
use moneysocket_core::nexus::NexusBase;
use moneysocket_core::{
    AboveLayer, BelowLayer, CallbackSlot, Layer, LayerEventFn, LayerName, LayerStatus, Message,
    Nexus, PendingRequests, Result, SharedSeed,
};
use std::fmt;
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

pub type NexusFn = dyn Fn(&Arc<BuyerNexus>) + Send + Sync;
pub type SellerInfoFn = dyn Fn(&Arc<BuyerNexus>, &SellerInfo) + Send + Sync;
/// `(nexus, bolt11, request_reference)`.
pub type OpinionInvoiceFn = dyn Fn(&Arc<BuyerNexus>, &str, Uuid) + Send + Sync;
/// `(nexus, item_id, opinion)`.
pub type OpinionFn = dyn Fn(&Arc<BuyerNexus>, &str, &serde_json::Value) + Send + Sync;

/// Context kept for an outstanding opinion invoice request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpinionRequest {
    pub item_id: String,
}

/// Buyer-side handle to a seller.
pub struct BuyerNexus {
    base: NexusBase,
    seller_info: RwLock<Option<SellerInfo>>,
    pending: PendingRequests<OpinionRequest>,
}

impl BuyerNexus {
    fn new(below: Arc<dyn Nexus>, max_pending: usize, request_timeout: Duration) -> Self {
        Self {
            base: NexusBase::wrap(LayerName::Buyer, below),
            seller_info: RwLock::new(None),
            pending: PendingRequests::with_timeout(max_pending, request_timeout),
        }
    }

    /// Ask the seller for an invoice for `item_id`.
    ///
    /// The returned reference comes back on the matching opinion invoice.
    pub fn request_opinion_invoice(&self, item_id: &str) -> Result<Uuid> {
        let request_uuid = self.pending.insert(OpinionRequest {
            item_id: item_id.to_string(),
        })?;
        let sent = BuyerMessage::RequestOpinionInvoice {
            request_uuid,
            item_id: item_id.to_string(),
        }
        .to_message()
        .and_then(|msg| self.base.send(msg));
        if let Err(e) = sent {
            self.pending.cancel(&request_uuid);
            return Err(e);
        }
        Ok(request_uuid)
    }

    /// Latest seller info received, if any.
    pub fn seller_info(&self) -> Option<SellerInfo> {
        self.seller_info
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_pending(&self, request_reference: &Uuid) -> bool {
        self.pending.contains(request_reference)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn request_seller_info(&self) -> Result<()> {
        let msg = BuyerMessage::RequestSellerInfo {
            request_uuid: Uuid::new_v4(),
        }
        .to_message()?;
        self.base.send(msg)
    }

    fn set_seller_info(&self, info: SellerInfo) {
        *self.seller_info.write().unwrap_or_else(|e| e.into_inner()) = Some(info);
    }
}

impl Nexus for BuyerNexus {
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

impl fmt::Debug for BuyerNexus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuyerNexus")
            .field("base", &self.base)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Layer speaking the buyer side of the seller protocol.
pub struct BuyerLayer {
    core: LayerCore<BuyerNexus>,
    max_pending: usize,
    request_timeout: Duration,
    pub on_announce: CallbackSlot<NexusFn>,
    pub on_revoke: CallbackSlot<NexusFn>,
    pub on_seller_info: CallbackSlot<SellerInfoFn>,
    pub on_opinion_invoice: CallbackSlot<OpinionInvoiceFn>,
    pub on_opinion: CallbackSlot<OpinionFn>,
}

impl BuyerLayer {
    pub fn new() -> Arc<Self> {
        Self::with_max_pending(DEFAULT_MAX_PENDING)
    }

    pub fn with_max_pending(max_pending: usize) -> Arc<Self> {
        Self::with_limits(max_pending, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Cap outstanding opinion invoice requests per nexus and abandon those
    /// older than `request_timeout`.
    pub fn with_limits(max_pending: usize, request_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            core: LayerCore::new(LayerName::Buyer),
            max_pending,
            request_timeout,
            on_announce: CallbackSlot::new(),
            on_revoke: CallbackSlot::new(),
            on_seller_info: CallbackSlot::new(),
            on_opinion_invoice: CallbackSlot::new(),
            on_opinion: CallbackSlot::new(),
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

    pub fn nexuses(&self) -> Vec<Arc<BuyerNexus>> {
        self.core.nexuses()
    }

    fn handle(&self, below_uuid: Uuid, nexus: &Arc<BuyerNexus>, msg: BuyerMessage) {
        let is_seller_info = matches!(msg, BuyerMessage::SellerInfo { .. });
        if !is_seller_info && !self.core.is_announced(&below_uuid) {
            warn!(
                nexus = %nexus.uuid(),
                msg = msg.name(),
                "message before seller info, dropping"
            );
            return;
        }

        match msg {
            BuyerMessage::SellerInfo { info, .. } => {
                nexus.set_seller_info(info.clone());
                if !self.core.is_announced(&below_uuid) {
                    if let Some(nexus) = self.core.mark_announced(&below_uuid) {
                        self.core.announce_upward(&nexus);
                        moneysocket_core::emit!(self.on_announce, &nexus);
                    }
                }
                moneysocket_core::emit!(self.on_seller_info, nexus, &info);
            }
            BuyerMessage::OpinionInvoice {
                request_reference_uuid,
                bolt11,
            } => match nexus.pending.take(&request_reference_uuid) {
                Some(request) => {
                    debug!(
                        nexus = %nexus.uuid(),
                        item_id = %request.item_id,
                        reference = %request_reference_uuid,
                        "opinion invoice received"
                    );
                    moneysocket_core::emit!(
                        self.on_opinion_invoice,
                        nexus,
                        &bolt11,
                        request_reference_uuid
                    );
                }
                None => warn!(
                    nexus = %nexus.uuid(),
                    reference = %request_reference_uuid,
                    "unmatched opinion invoice, dropping"
                ),
            },
            BuyerMessage::Opinion { item_id, opinion } => {
                moneysocket_core::emit!(self.on_opinion, nexus, &item_id, &opinion);
            }
            other @ (BuyerMessage::RequestSellerInfo { .. }
            | BuyerMessage::RequestOpinionInvoice { .. }) => {
                warn!(nexus = %nexus.uuid(), msg = other.name(), "seller-side request at buyer, dropping");
            }
        }
    }
}

impl Layer for BuyerLayer {
    fn layer_name(&self) -> LayerName {
        self.core.name()
    }

    fn on_layer_event(&self) -> &CallbackSlot<LayerEventFn> {
        self.core.on_layer_event()
    }
}

impl BelowLayer for BuyerLayer {
    fn set_above_layer(&self, above: Weak<dyn AboveLayer>) {
        self.core.set_above(above);
    }
}

impl AboveLayer for BuyerLayer {
    fn announce_nexus(&self, below_nexus: Arc<dyn Nexus>) {
        let nexus = Arc::new(BuyerNexus::new(
            below_nexus.clone(),
            self.max_pending,
            self.request_timeout,
        ));
        self.core.track(below_nexus.uuid(), nexus.clone());

        match nexus.request_seller_info() {
            Ok(()) => self
                .core
                .emit_nexus_status(&nexus, LayerStatus::NexusWaiting),
            Err(e) => self.core.emit_nexus_status(
                &nexus,
                LayerStatus::Errored {
                    reason: format!("seller info request failed: {}", e),
                },
            ),
        }
    }

    fn revoke_nexus(&self, below_nexus: Arc<dyn Nexus>) {
        let Some((nexus, announced)) = self.core.untrack(&below_nexus.uuid()) else {
            warn!(below = %below_nexus.uuid(), "revoke for unknown nexus");
            return;
        };
        if announced {
            self.core.revoke_upward(&nexus);
            moneysocket_core::emit!(self.on_revoke, &nexus);
        }
    }

    fn on_message(&self, below_nexus: Arc<dyn Nexus>, msg: Message) {
        let below_uuid = below_nexus.uuid();
        let Some(nexus) = self.core.get(&below_uuid) else {
            warn!(below = %below_uuid, msg = msg.name(), "message for unknown nexus");
            return;
        };

        match BuyerMessage::from_message(&msg) {
            Ok(Some(buyer_msg)) => self.handle(below_uuid, &nexus, buyer_msg),
            Ok(None) => self.core.forward_upward(&nexus, msg),
            Err(e) => {
                debug!(nexus = %nexus.uuid(), error = %e, "not a buyer message, forwarding");
                self.core.forward_upward(&nexus, msg);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moneysocket_core::layer::{ConsumerLayer, RendezvousLayer, TransactLayer};
    use moneysocket_core::test_utils::{
        provider_responder, test_location, test_provider_info, test_seed, LoopbackTransport,
    };
    use moneysocket_core::TransportLayer;
    use std::sync::Mutex;

    fn buyer_on_loopback() -> (Arc<LoopbackTransport>, Arc<BuyerLayer>) {
        let transport =
            LoopbackTransport::with_responder(provider_responder(test_provider_info(1_000)));
        let rendezvous = RendezvousLayer::new();
        rendezvous.register_above_layer(transport.clone());
        let consumer = ConsumerLayer::new();
        consumer.register_above_layer(rendezvous);
        let transact = TransactLayer::new();
        transact.register_above_layer(consumer);
        let buyer = BuyerLayer::with_max_pending(1);
        buyer.register_above_layer(transact);

        transport.connect(&test_location(), &test_seed(4));
        transport.pump();
        (transport, buyer)
    }

    fn seller_info(items: usize) -> SellerInfo {
        SellerInfo {
            seller_uuid: Uuid::new_v4(),
            items: (0..items)
                .map(|i| crate::message::CatalogItem {
                    item_id: format!("item-{}", i),
                    label: format!("Item {}", i),
                    msats: 1_000 * (i as u64 + 1),
                })
                .collect(),
        }
    }

    fn deliver(transport: &LoopbackTransport, msg: BuyerMessage) {
        transport.deliver(msg.to_message().unwrap());
    }

    #[test]
    fn test_waits_for_seller_info() {
        let (transport, buyer) = buyer_on_loopback();
        assert_eq!(buyer.nexuses().len(), 1);
        assert_eq!(
            transport.sent_messages().last().map(|m| m.name()),
            Some("app")
        );

        let announced = Arc::new(Mutex::new(0usize));
        let counter = announced.clone();
        buyer.on_announce.set(Arc::new(move |_: &Arc<BuyerNexus>| {
            *counter.lock().unwrap() += 1;
        }));

        let info = seller_info(2);
        deliver(
            &transport,
            BuyerMessage::SellerInfo {
                request_reference_uuid: None,
                info: info.clone(),
            },
        );
        deliver(
            &transport,
            BuyerMessage::SellerInfo {
                request_reference_uuid: None,
                info: info.clone(),
            },
        );

        assert_eq!(*announced.lock().unwrap(), 1);
        assert_eq!(buyer.nexuses()[0].seller_info(), Some(info));
    }

    #[test]
    fn test_opinion_invoice_requires_pending_reference() {
        let (transport, buyer) = buyer_on_loopback();
        deliver(
            &transport,
            BuyerMessage::SellerInfo {
                request_reference_uuid: None,
                info: seller_info(1),
            },
        );
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        buyer.on_opinion_invoice.set(Arc::new(
            move |_: &Arc<BuyerNexus>, bolt11: &str, reference: Uuid| {
                sink.lock().unwrap().push((bolt11.to_string(), reference));
            },
        ));

        let nexus = buyer.nexuses()[0].clone();
        let reference = nexus.request_opinion_invoice("item-0").unwrap();
        assert!(nexus.request_opinion_invoice("item-0").is_err());

        deliver(
            &transport,
            BuyerMessage::OpinionInvoice {
                request_reference_uuid: Uuid::new_v4(),
                bolt11: "lnbc1stray".into(),
            },
        );
        deliver(
            &transport,
            BuyerMessage::OpinionInvoice {
                request_reference_uuid: reference,
                bolt11: "lnbc1opinion".into(),
            },
        );
        deliver(
            &transport,
            BuyerMessage::OpinionInvoice {
                request_reference_uuid: reference,
                bolt11: "lnbc1again".into(),
            },
        );

        assert_eq!(
            *received.lock().unwrap(),
            vec![("lnbc1opinion".to_string(), reference)]
        );
        assert_eq!(nexus.pending_count(), 0);
    }

    #[test]
    fn test_traffic_before_seller_info_is_dropped() {
        let (transport, buyer) = buyer_on_loopback();
        let opinions = Arc::new(Mutex::new(0usize));
        let counter = opinions.clone();
        buyer.on_opinion.set(Arc::new(
            move |_: &Arc<BuyerNexus>, _: &str, _: &serde_json::Value| {
                *counter.lock().unwrap() += 1;
            },
        ));
        let invoices = Arc::new(Mutex::new(Vec::new()));
        let sink = invoices.clone();
        buyer.on_opinion_invoice.set(Arc::new(
            move |_: &Arc<BuyerNexus>, bolt11: &str, _: Uuid| {
                sink.lock().unwrap().push(bolt11.to_string());
            },
        ));

        let nexus = buyer.nexuses()[0].clone();
        let reference = nexus.request_opinion_invoice("item-0").unwrap();
        let early_invoice = BuyerMessage::OpinionInvoice {
            request_reference_uuid: reference,
            bolt11: "lnbc1early".into(),
        };
        deliver(&transport, early_invoice.clone());
        deliver(
            &transport,
            BuyerMessage::Opinion {
                item_id: "item-0".into(),
                opinion: serde_json::json!("sunny"),
            },
        );
        assert_eq!(*opinions.lock().unwrap(), 0);
        assert!(invoices.lock().unwrap().is_empty());
        assert!(nexus.is_pending(&reference));

        deliver(
            &transport,
            BuyerMessage::SellerInfo {
                request_reference_uuid: None,
                info: seller_info(1),
            },
        );
        deliver(&transport, early_invoice);
        assert_eq!(*invoices.lock().unwrap(), vec!["lnbc1early".to_string()]);
    }

    #[test]
    fn test_revoke_fires_only_for_announced_nexus() {
        let (transport, buyer) = buyer_on_loopback();
        let revoked = Arc::new(Mutex::new(0usize));
        let counter = revoked.clone();
        buyer.on_revoke.set(Arc::new(move |_: &Arc<BuyerNexus>| {
            *counter.lock().unwrap() += 1;
        }));

        // never announced: no seller info arrived
        transport.initiate_close_all();
        assert_eq!(*revoked.lock().unwrap(), 0);
        assert!(buyer.nexuses().is_empty());
    }
}
