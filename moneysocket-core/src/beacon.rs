//! Beacons: candidate locations plus the shared seed for one connection.

use crate::location::Location;
use crate::seed::SharedSeed;

/// Everything a consumer needs to reach a provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Beacon {
    shared_seed: SharedSeed,
    locations: Vec<Location>,
}

impl Beacon {
    /// Create a beacon with no locations yet.
    pub fn new(shared_seed: SharedSeed) -> Self {
        Self {
            shared_seed,
            locations: Vec::new(),
        }
    }

    /// Create a beacon from a seed and an ordered list of locations.
    pub fn with_locations(shared_seed: SharedSeed, locations: Vec<Location>) -> Self {
        Self {
            shared_seed,
            locations,
        }
    }

    /// Append a candidate location. Order is preserved.
    pub fn add_location(&mut self, location: impl Into<Location>) {
        self.locations.push(location.into());
    }

    /// Candidate locations in preference order.
    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn shared_seed(&self) -> &SharedSeed {
        &self.shared_seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{LocationKind, WebsocketLocation};

    #[test]
    fn test_locations_keep_order() {
        let mut beacon = Beacon::new(SharedSeed::generate());
        assert!(beacon.locations().is_empty());

        beacon.add_location(Location::Nfc {
            payload: "tag".into(),
        });
        beacon.add_location(WebsocketLocation::default_relay());

        let kinds: Vec<_> = beacon.locations().iter().map(Location::kind).collect();
        assert_eq!(kinds, vec![LocationKind::Nfc, LocationKind::WebSocket]);
    }
}
