//! Moneysocket Buyer
//!
//! The buyer role layer and the stack that composes it with the generic
//! Moneysocket layers:
//!
//! ```text
//! BuyerLayer           BUYER
//! TransactLayer        CONSUMER_TRANSACT
//! ConsumerLayer        CONSUMER
//! RendezvousLayer      OUTGOING_RENDEZVOUS
//! transport            OUTGOING_WEBSOCKET
//! ```
//!
//! Applications drive a [`BuyerStack`] with `connect`, `disconnect` and
//! `buy_item`, and observe it through optional callbacks.
//!
//! # Example
//!
//! ```rust,ignore
//! use moneysocket_buyer::BuyerStack;
//!
//! let stack = BuyerStack::with_defaults(transport);
//! stack.on_announce(|nexus| println!("connected: {}", nexus.uuid()));
//! stack.on_opinion_invoice(|bolt11, reference| println!("{} pays {}", bolt11, reference));
//! stack.connect(&beacon)?;
//! ```

pub mod config;
pub mod errors;
pub mod layer;
pub mod message;
pub mod stack;

pub use config::StackConfig;
pub use errors::{StackError, StackErrorCode};
pub use layer::{BuyerLayer, BuyerNexus, OpinionRequest};
pub use message::{BuyerMessage, CatalogItem, SellerInfo};
pub use stack::{BuyerStack, NexusState, StackCallbacks};

/// Result alias for stack control operations.
pub type Result<T> = std::result::Result<T, StackError>;
