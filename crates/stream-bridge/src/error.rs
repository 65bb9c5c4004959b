use std::fmt;

use serde::Serialize;
use tokio_tungstenite::tungstenite;

use crate::connector::StreamType;

/// Which of the two bridged connections an event or failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The telephony connection handed to the bridge by its caller.
    Call,
    /// The voice-agent connection dialed by the bridge.
    Remote,
}

impl Side {
    /// The connection on the other end of the bridge.
    pub fn peer(self) -> Side {
        match self {
            Side::Call => Side::Remote,
            Side::Remote => Side::Call,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Call => "call",
            Side::Remote => "remote",
        })
    }
}

/// Errors surfaced by [`StreamConnector`](crate::StreamConnector) and the
/// pieces it drives.
///
/// `BadParameter` and `NotImplemented` are configuration errors raised at
/// construction time. The remaining variants end a running session; by the
/// time the caller sees them both connections have already been closed.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A required constructor parameter was missing or empty.
    #[error("{param} is a required parameter")]
    BadParameter { param: &'static str },

    /// The requested stream topology is not available.
    #[error("{0} streams are not supported yet")]
    NotImplemented(StreamType),

    /// The single attempt to dial the remote stream failed.
    #[error("failed to connect to remote stream at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    /// A frame could not be decoded into the envelope its transformer expects.
    #[error("malformed frame on {side} stream: {source}")]
    Decode {
        side: Side,
        #[source]
        source: serde_json::Error,
    },

    /// Reading from or writing to a connection failed.
    #[error("{side} stream transport failed: {source}")]
    Transport {
        side: Side,
        #[source]
        source: tungstenite::Error,
    },
}

impl BridgeError {
    /// The connection a session-ending error came from, if any.
    pub fn side(&self) -> Option<Side> {
        match self {
            BridgeError::Decode { side, .. } | BridgeError::Transport { side, .. } => Some(*side),
            BridgeError::Connect { .. } => Some(Side::Remote),
            BridgeError::BadParameter { .. } | BridgeError::NotImplemented(_) => None,
        }
    }

    /// Whether this error was raised while validating constructor input.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BridgeError::BadParameter { .. } | BridgeError::NotImplemented(_)
        )
    }
}
