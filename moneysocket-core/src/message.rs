//! Messages exchanged over a nexus.
//!
//! Every layer speaks a slice of this vocabulary. A layer consumes the
//! messages it understands and forwards the rest upward unchanged. Role
//! specific traffic (buyer, seller, ...) rides inside [`Message::App`] so the
//! generic layers never need to know about it.

use crate::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provider metadata announced to a consumer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider can pay invoices on our behalf.
    pub payer: bool,
    /// Provider can generate invoices for us.
    pub payee: bool,
    /// Spendable balance in millisatoshis, if disclosed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msats: Option<u64>,
    pub provider_uuid: Uuid,
}

/// Messages carried over every nexus of the stack.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Message {
    /// Ask the relay to pair us with the peer presenting the same id.
    RendezvousRequest { rid: String },
    /// The peer has not shown up yet.
    RendezvousNotReady { rid: String },
    /// Pairing done; traffic now flows end to end.
    RendezvousEnd { rid: String },

    RequestProvider { request_uuid: Uuid },
    Provider {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_reference_uuid: Option<Uuid>,
        info: ProviderInfo,
    },
    /// The provider is reachable but not ready to serve.
    ProviderNotReady { request_reference_uuid: Uuid },

    Ping { request_uuid: Uuid },
    Pong { request_reference_uuid: Uuid },

    RequestInvoice {
        request_uuid: Uuid,
        msats: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    RequestPay { request_uuid: Uuid, bolt11: String },
    Invoice {
        request_reference_uuid: Uuid,
        bolt11: String,
    },
    Preimage {
        request_reference_uuid: Uuid,
        preimage: String,
    },

    /// Error reported by the remote end.
    Error { code: String, message: String },

    /// Opaque role-layer payload.
    App { payload: serde_json::Value },
}

impl Message {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RendezvousRequest { .. } => "rendezvous_request",
            Self::RendezvousNotReady { .. } => "rendezvous_not_ready",
            Self::RendezvousEnd { .. } => "rendezvous_end",
            Self::RequestProvider { .. } => "request_provider",
            Self::Provider { .. } => "provider",
            Self::ProviderNotReady { .. } => "provider_not_ready",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::RequestInvoice { .. } => "request_invoice",
            Self::RequestPay { .. } => "request_pay",
            Self::Invoice { .. } => "invoice",
            Self::Preimage { .. } => "preimage",
            Self::Error { .. } => "error",
            Self::App { .. } => "app",
        }
    }

    /// Encode for the wire.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from the wire.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
