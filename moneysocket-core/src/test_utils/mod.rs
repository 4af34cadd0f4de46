//! Test utilities for Moneysocket stacks.
//!
//! This module provides an in-memory transport and fixtures so whole stacks
//! can be driven deterministically from a test:
//! - [`LoopbackTransport`] connects instantly and queues remote replies
//! - [`provider_responder`] plays a relay plus a ready provider
//! - fixtures for seeds, locations, beacons and provider info
//!
//! ## Usage
//!
//! ```rust,ignore
//! use moneysocket_core::test_utils::*;
//! use moneysocket_core::layer::{RendezvousLayer, TransportLayer};
//!
//! let transport = LoopbackTransport::with_responder(provider_responder(test_provider_info(1_000)));
//! let rendezvous = RendezvousLayer::new();
//! rendezvous.register_above_layer(transport.clone());
//!
//! transport.connect(&test_location(), &test_seed(1));
//! transport.pump();
//! assert_eq!(rendezvous.nexuses().len(), 1);
//! ```

mod fixtures;
mod loopback;

pub use fixtures::{
    random_preimage, test_beacon, test_invoice, test_location, test_provider_info, test_seed,
    TestFixtures,
};

pub use loopback::{provider_responder, LoopbackNexus, LoopbackTransport, Responder};
