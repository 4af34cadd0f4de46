//! Buyer/seller application messages.
//!
//! These ride inside [`Message::App`] so the generic layers below the buyer
//! layer forward them untouched.

use moneysocket_core::{LayerError, Message};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One priced item in a seller's catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub item_id: String,
    /// Display name.
    pub label: String,
    /// Price in millisatoshis.
    pub msats: u64,
}

/// Seller metadata announced to a buyer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerInfo {
    pub seller_uuid: Uuid,
    #[serde(default)]
    pub items: Vec<CatalogItem>,
}

impl SellerInfo {
    pub fn item(&self, item_id: &str) -> Option<&CatalogItem> {
        self.items.iter().find(|item| item.item_id == item_id)
    }
}

/// Messages of the buyer role protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuyerMessage {
    RequestSellerInfo {
        request_uuid: Uuid,
    },
    SellerInfo {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_reference_uuid: Option<Uuid>,
        info: SellerInfo,
    },
    /// Ask the seller for an invoice buying the opinion on `item_id`.
    RequestOpinionInvoice {
        request_uuid: Uuid,
        item_id: String,
    },
    OpinionInvoice {
        request_reference_uuid: Uuid,
        bolt11: String,
    },
    /// The purchased opinion, sent once the invoice is paid.
    Opinion {
        item_id: String,
        opinion: serde_json::Value,
    },
}

impl BuyerMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestSellerInfo { .. } => "request_seller_info",
            Self::SellerInfo { .. } => "seller_info",
            Self::RequestOpinionInvoice { .. } => "request_opinion_invoice",
            Self::OpinionInvoice { .. } => "opinion_invoice",
            Self::Opinion { .. } => "opinion",
        }
    }

    /// Wrap into the generic message carried by the stack.
    pub fn to_message(&self) -> Result<Message, LayerError> {
        Ok(Message::App {
            payload: serde_json::to_value(self)?,
        })
    }

    /// Unwrap from a generic message.
    ///
    /// Returns `Ok(None)` for anything that is not an app message; an app
    /// payload that is not a buyer message is a serialization error.
    pub fn from_message(msg: &Message) -> Result<Option<Self>, LayerError> {
        match msg {
            Message::App { payload } => Ok(Some(serde_json::from_value(payload.clone())?)),
            _ => Ok(None),
        }
    }
}

impl TryFrom<BuyerMessage> for Message {
    type Error = LayerError;

    fn try_from(msg: BuyerMessage) -> Result<Self, LayerError> {
        msg.to_message()
    }
}
