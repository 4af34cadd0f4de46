//! Shared secret seed carried by a beacon and copied up every nexus.

use crate::{LayerError, Result};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a shared seed in bytes.
pub const SHARED_SEED_LEN: usize = 16;

/// Secret shared between the two ends of a connection.
///
/// Both sides derive the rendezvous id from it, so a relay can pair them
/// without learning the seed itself.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedSeed([u8; SHARED_SEED_LEN]);

impl SharedSeed {
    /// Wrap raw seed bytes.
    pub fn from_bytes(bytes: [u8; SHARED_SEED_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random seed.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SHARED_SEED_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Decode a seed from its hex form.
    pub fn from_hex(s: &str) -> Result<Self> {
        let decoded = hex::decode(s.trim()).map_err(|e| LayerError::InvalidSeed(e.to_string()))?;
        let bytes: [u8; SHARED_SEED_LEN] = decoded.as_slice().try_into().map_err(|_| {
            LayerError::InvalidSeed(format!(
                "expected {} bytes, got {}",
                SHARED_SEED_LEN,
                decoded.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; SHARED_SEED_LEN] {
        &self.0
    }

    /// Rendezvous id both peers present to the relay: `sha256(sha256(seed))`.
    pub fn derive_rendezvous_id(&self) -> String {
        let first = Sha256::digest(self.0);
        hex::encode(Sha256::digest(first))
    }
}

// Never print seed material.
impl fmt::Debug for SharedSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSeed(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip_and_length_check() {
        let seed = SharedSeed::from_bytes([7u8; SHARED_SEED_LEN]);
        assert_eq!(SharedSeed::from_hex(&seed.to_hex()).unwrap(), seed);

        let err = SharedSeed::from_hex("abcd").unwrap_err();
        assert!(matches!(err, LayerError::InvalidSeed(_)));
        assert!(SharedSeed::from_hex("zz").is_err());
    }

    #[test]
    fn test_rendezvous_id_is_deterministic() {
        let a = SharedSeed::from_bytes([1u8; SHARED_SEED_LEN]);
        let b = SharedSeed::from_bytes([2u8; SHARED_SEED_LEN]);
        assert_eq!(a.derive_rendezvous_id(), a.clone().derive_rendezvous_id());
        assert_ne!(a.derive_rendezvous_id(), b.derive_rendezvous_id());
        assert_eq!(a.derive_rendezvous_id().len(), 64);
    }

    #[test]
    fn test_debug_is_redacted() {
        let seed = SharedSeed::generate();
        assert!(!format!("{:?}", seed).contains(&seed.to_hex()));
    }
}
