//! Test fixtures and data generators.

use crate::beacon::Beacon;
use crate::location::{Location, WebsocketLocation};
use crate::message::ProviderInfo;
use crate::seed::{SharedSeed, SHARED_SEED_LEN};
use rand::RngCore;
use uuid::Uuid;

/// Collection of commonly used test fixtures.
pub struct TestFixtures;

impl TestFixtures {
    /// Hosts used for loopback websocket locations.
    pub const RELAY_HOSTS: &'static [&'static str] =
        &["relay.test", "127.0.0.1", "relay.socket.money"];

    /// Sample balances in millisatoshis.
    pub const SAMPLE_MSATS: &'static [u64] = &[
        1_000,         // 1 sat
        250_000,       // Small
        10_000_000,    // Medium
        1_000_000_000, // Large (0.01 BTC)
    ];

    pub fn sample_msats(index: usize) -> u64 {
        Self::SAMPLE_MSATS[index % Self::SAMPLE_MSATS.len()]
    }
}

/// Deterministic shared seed built from a single byte value.
pub fn test_seed(fill: u8) -> SharedSeed {
    SharedSeed::from_bytes([fill; SHARED_SEED_LEN])
}

/// A `wss://relay.test:443` location.
pub fn test_location() -> Location {
    WebsocketLocation::new(TestFixtures::RELAY_HOSTS[0], 443, true).into()
}

/// Beacon carrying `seed` and a single loopback websocket location.
pub fn test_beacon(seed: SharedSeed) -> Beacon {
    Beacon::with_locations(seed, vec![test_location()])
}

/// Provider that can both pay and receive, holding `msats`.
pub fn test_provider_info(msats: u64) -> ProviderInfo {
    ProviderInfo {
        payer: true,
        payee: true,
        msats: Some(msats),
        provider_uuid: Uuid::new_v4(),
    }
}

/// Generate a test invoice string.
///
/// Note: This is not a valid BOLT11 invoice, only stable per input.
pub fn test_invoice(msats: u64, description: &str) -> String {
    format!(
        "lnbc{}n1test{}",
        msats / 1000,
        simple_hash(description) % 10000
    )
}

/// Random 32-byte preimage, hex encoded.
pub fn random_preimage() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn simple_hash(data: &str) -> u64 {
    let mut hash: u64 = 5381;
    for byte in data.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u64);
    }
    hash
}
