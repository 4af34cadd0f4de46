//! Configuration for a buyer stack.

use moneysocket_core::layer::{DEFAULT_MAX_PENDING, DEFAULT_REQUEST_TIMEOUT};
use moneysocket_core::LocationKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings fixed when a [`BuyerStack`](crate::BuyerStack) is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Location kinds `connect` accepts as the first beacon location.
    #[serde(default = "default_location_kinds")]
    pub supported_location_kinds: Vec<LocationKind>,

    /// Capacity of every pending request table in the stack.
    #[serde(default = "default_max_pending")]
    pub max_pending_requests: usize,

    /// Seconds after which an unanswered request or ping is abandoned and
    /// its slot freed.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_location_kinds() -> Vec<LocationKind> {
    vec![LocationKind::WebSocket]
}

fn default_max_pending() -> usize {
    DEFAULT_MAX_PENDING
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            supported_location_kinds: default_location_kinds(),
            max_pending_requests: default_max_pending(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl StackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the accepted location kinds.
    pub fn with_location_kinds(mut self, kinds: Vec<LocationKind>) -> Self {
        self.supported_location_kinds = kinds;
        self
    }

    pub fn with_max_pending_requests(mut self, max: usize) -> Self {
        self.max_pending_requests = max;
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn supports(&self, kind: LocationKind) -> bool {
        self.supported_location_kinds.contains(&kind)
    }
}
