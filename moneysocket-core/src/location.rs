//! Location descriptors: how to reach a remote endpoint.
//!
//! A beacon carries one or more candidate locations. Only socket-based
//! locations can be dialled by the outgoing websocket transport; the other
//! kinds are described so they can be recognized and rejected up front.
//!
//! # Examples
//!
//! ```rust
//! use moneysocket_core::location::{Location, LocationKind, WebsocketLocation};
//!
//! let ws: WebsocketLocation = "wss://relay.socket.money".parse().unwrap();
//! assert_eq!(ws.port, 443);
//!
//! let location = Location::WebSocket(ws);
//! assert_eq!(location.kind(), LocationKind::WebSocket);
//! assert_eq!(location.to_target(), "wss://relay.socket.money:443");
//! ```

use crate::{LayerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default public relay host.
pub const DEFAULT_RELAY_HOST: &str = "relay.socket.money";

/// The transport family a location belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    #[serde(rename = "websocket")]
    WebSocket,
    #[serde(rename = "webrtc")]
    WebRtc,
    Bluetooth,
    Nfc,
}

impl LocationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::WebRtc => "webrtc",
            Self::Bluetooth => "bluetooth",
            Self::Nfc => "nfc",
        }
    }
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A websocket endpoint (`ws://` or `wss://`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsocketLocation {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

impl WebsocketLocation {
    /// Create a new websocket location.
    pub fn new(host: impl Into<String>, port: u16, use_tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            use_tls,
        }
    }

    /// The default public relay over TLS.
    pub fn default_relay() -> Self {
        Self::new(DEFAULT_RELAY_HOST, 443, true)
    }

    /// Render as a websocket URL, always including the port.
    pub fn to_ws_url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

impl FromStr for WebsocketLocation {
    type Err = LayerError;

    /// Parse `ws://host[:port]` or `wss://host[:port]`.
    ///
    /// The port defaults to 80 for `ws` and 443 for `wss`. Any path is ignored.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (use_tls, rest) = if let Some(rest) = s.strip_prefix("wss://") {
            (true, rest)
        } else if let Some(rest) = s.strip_prefix("ws://") {
            (false, rest)
        } else {
            return Err(LayerError::InvalidLocation(format!(
                "not a websocket url: {}",
                s
            )));
        };

        let authority = rest.split('/').next().unwrap_or(rest);
        if authority.is_empty() {
            return Err(LayerError::InvalidLocation(format!("missing host: {}", s)));
        }

        let default_port = if use_tls { 443 } else { 80 };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|e| {
                    LayerError::InvalidLocation(format!("bad port in {}: {}", s, e))
                })?;
                (host, port)
            }
            None => (authority, default_port),
        };

        if host.is_empty() {
            return Err(LayerError::InvalidLocation(format!("missing host: {}", s)));
        }

        Ok(Self::new(host, port, use_tls))
    }
}

/// A candidate location for reaching the remote end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    #[serde(rename = "websocket")]
    WebSocket(WebsocketLocation),
    /// Reached through a WebRTC signalling endpoint.
    #[serde(rename = "webrtc")]
    WebRtc { signal: String },
    Bluetooth { address: String },
    Nfc { payload: String },
}

impl Location {
    /// Which transport family this location belongs to.
    pub fn kind(&self) -> LocationKind {
        match self {
            Self::WebSocket(_) => LocationKind::WebSocket,
            Self::WebRtc { .. } => LocationKind::WebRtc,
            Self::Bluetooth { .. } => LocationKind::Bluetooth,
            Self::Nfc { .. } => LocationKind::Nfc,
        }
    }

    /// Human-readable connection target.
    pub fn to_target(&self) -> String {
        match self {
            Self::WebSocket(ws) => ws.to_ws_url(),
            Self::WebRtc { signal } => format!("webrtc:{}", signal),
            Self::Bluetooth { address } => format!("bluetooth:{}", address),
            Self::Nfc { payload } => format!("nfc:{}", payload),
        }
    }

    pub fn as_websocket(&self) -> Option<&WebsocketLocation> {
        match self {
            Self::WebSocket(ws) => Some(ws),
            _ => None,
        }
    }
}

impl From<WebsocketLocation> for Location {
    fn from(ws: WebsocketLocation) -> Self {
        Self::WebSocket(ws)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_target())
    }
}
