//! Consumer layer: the consumer side of the provider protocol.
//!
//! On a fresh rendezvous nexus the consumer asks for provider info. The first
//! provider reply announces the consumer nexus; later replies are balance or
//! capability updates and are only reported through `on_provider_info`. The
//! layer also measures round-trip latency with ping/pong.

use super::{
    remote_error_reason, AboveLayer, BelowLayer, Layer, LayerCore, LayerEventFn, LayerName,
    LayerStatus, DEFAULT_MAX_PENDING, DEFAULT_REQUEST_TIMEOUT,
};
use crate::callback::CallbackSlot;
use crate::message::{Message, ProviderInfo};
use crate::nexus::{Nexus, NexusBase};
use crate::pending::PendingRequests;
use crate::seed::SharedSeed;
use crate::Result;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Provider metadata callback.
pub type ProviderInfoFn = dyn Fn(&Arc<ConsumerNexus>, &ProviderInfo) + Send + Sync;

/// Ping latency callback, in milliseconds.
pub type PingFn = dyn Fn(&Arc<ConsumerNexus>, u64) + Send + Sync;

/// Consumer-side handle to a provider.
pub struct ConsumerNexus {
    base: NexusBase,
    provider_info: RwLock<Option<ProviderInfo>>,
    pings: PendingRequests<Instant>,
}

impl ConsumerNexus {
    fn new(below: Arc<dyn Nexus>, max_pending: usize, ping_timeout: Duration) -> Self {
        Self {
            base: NexusBase::wrap(LayerName::Consumer, below),
            provider_info: RwLock::new(None),
            pings: PendingRequests::with_timeout(max_pending, ping_timeout),
        }
    }

    /// Latest provider info received, if any.
    pub fn provider_info(&self) -> Option<ProviderInfo> {
        self.provider_info
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Send a ping. The matching pong fires the layer's `on_ping` slot.
    pub fn send_ping(&self) -> Result<Uuid> {
        let request_uuid = self.pings.insert(Instant::now())?;
        if let Err(e) = self.base.send(Message::Ping { request_uuid }) {
            self.pings.cancel(&request_uuid);
            return Err(e);
        }
        Ok(request_uuid)
    }

    pub fn pending_pings(&self) -> usize {
        self.pings.len()
    }

    fn request_provider(&self) -> Result<()> {
        self.base.send(Message::RequestProvider {
            request_uuid: Uuid::new_v4(),
        })
    }

    fn set_provider_info(&self, info: ProviderInfo) {
        let mut slot = self
            .provider_info
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *slot = Some(info);
    }
}

impl Nexus for ConsumerNexus {
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

impl fmt::Debug for ConsumerNexus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerNexus")
            .field("base", &self.base)
            .field("provider_info", &self.provider_info())
            .finish()
    }
}

/// Layer speaking the consumer side of the provider protocol.
pub struct ConsumerLayer {
    core: LayerCore<ConsumerNexus>,
    max_pending: usize,
    ping_timeout: Duration,
    pub on_provider_info: CallbackSlot<ProviderInfoFn>,
    pub on_ping: CallbackSlot<PingFn>,
}

impl ConsumerLayer {
    pub fn new() -> Arc<Self> {
        Self::with_max_pending(DEFAULT_MAX_PENDING)
    }

    /// Cap the number of outstanding pings per nexus.
    pub fn with_max_pending(max_pending: usize) -> Arc<Self> {
        Self::with_limits(max_pending, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Cap outstanding pings per nexus; pongs later than `ping_timeout` are
    /// treated as unknown.
    pub fn with_limits(max_pending: usize, ping_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            core: LayerCore::new(LayerName::Consumer),
            max_pending,
            ping_timeout,
            on_provider_info: CallbackSlot::new(),
            on_ping: CallbackSlot::new(),
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

    pub fn nexuses(&self) -> Vec<Arc<ConsumerNexus>> {
        self.core.nexuses()
    }

    fn on_provider(&self, below_uuid: Uuid, nexus: &Arc<ConsumerNexus>, info: ProviderInfo) {
        nexus.set_provider_info(info.clone());
        if !self.core.is_announced(&below_uuid) {
            if let Some(nexus) = self.core.mark_announced(&below_uuid) {
                self.core.announce_upward(&nexus);
            }
        }
        crate::emit!(self.on_provider_info, nexus, &info);
    }

    fn on_pong(&self, nexus: &Arc<ConsumerNexus>, reference: Uuid) {
        match nexus.pings.take(&reference) {
            Some(sent_at) => {
                let msecs = sent_at.elapsed().as_millis() as u64;
                debug!(nexus = %nexus.uuid(), msecs, "pong");
                crate::emit!(self.on_ping, nexus, msecs);
            }
            None => warn!(nexus = %nexus.uuid(), %reference, "pong for unknown ping"),
        }
    }
}

impl Layer for ConsumerLayer {
    fn layer_name(&self) -> LayerName {
        self.core.name()
    }

    fn on_layer_event(&self) -> &CallbackSlot<LayerEventFn> {
        self.core.on_layer_event()
    }
}

impl BelowLayer for ConsumerLayer {
    fn set_above_layer(&self, above: Weak<dyn AboveLayer>) {
        self.core.set_above(above);
    }
}

impl AboveLayer for ConsumerLayer {
    fn announce_nexus(&self, below_nexus: Arc<dyn Nexus>) {
        let nexus = Arc::new(ConsumerNexus::new(
            below_nexus.clone(),
            self.max_pending,
            self.ping_timeout,
        ));
        self.core.track(below_nexus.uuid(), nexus.clone());

        match nexus.request_provider() {
            Ok(()) => self
                .core
                .emit_nexus_status(&nexus, LayerStatus::NexusWaiting),
            Err(e) => self.core.emit_nexus_status(
                &nexus,
                LayerStatus::Errored {
                    reason: format!("provider request failed: {}", e),
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

        match msg {
            Message::Provider { info, .. } => self.on_provider(below_uuid, &nexus, info),
            Message::ProviderNotReady { .. } => {
                debug!(nexus = %nexus.uuid(), "provider not ready");
                self.core
                    .emit_nexus_status(&nexus, LayerStatus::NexusWaiting);
            }
            Message::Ping { request_uuid } => {
                let pong = Message::Pong {
                    request_reference_uuid: request_uuid,
                };
                if let Err(e) = nexus.send(pong) {
                    warn!(nexus = %nexus.uuid(), error = %e, "failed to answer ping");
                }
            }
            Message::Pong {
                request_reference_uuid,
            } => self.on_pong(&nexus, request_reference_uuid),
            Message::Error { code, message } => {
                warn!(nexus = %nexus.uuid(), %code, %message, "provider reported an error");
                self.core.emit_nexus_status(
                    &nexus,
                    LayerStatus::Errored {
                        reason: remote_error_reason(&code, &message),
                    },
                );
            }
            other if self.core.is_announced(&below_uuid) => {
                self.core.forward_upward(&nexus, other)
            }
            other => warn!(
                nexus = %nexus.uuid(),
                msg = other.name(),
                "message before provider info, dropping"
            ),
        }
    }
}
