//! Real-time bridge between a telephony call stream and a conversational-AI
//! stream.
//!
//! A bridge session relays frames between two WebSocket connections: the
//! *call* connection, accepted from the telephony provider, and the *remote*
//! connection, dialed by the bridge to the voice agent. Every frame is decoded
//! and handed to a per-direction [`MessageTransformer`] which decides whether
//! to relay a re-encoded payload or drop it.
//!
//! # Architecture
//!
//! ```text
//! Call  <--WS-->  stream-bridge  <--WS-->  Remote agent
//!                      |
//!       inbound pump   |   outbound pump
//!   (CallStreamTransformer / RemoteStreamTransformer)
//! ```
//!
//! [`StreamConnector`] dials the remote side and runs a [`BridgeSession`],
//! which drives two [`RelayPump`]s concurrently. When either side closes or
//! fails, the sibling pump is cancelled and both connections are closed before
//! the bridge returns. [`MediaStreamListener`] accepts call connections and
//! bridges each one in its own task.

pub mod audio;
pub mod connection;
pub mod connector;
pub mod error;
pub mod listener;
pub mod op;
pub mod pump;
pub mod session;
pub mod transform;

pub use audio::{CallStreamTransformer, RemoteStreamTransformer};
pub use connection::Connection;
pub use connector::{StreamConnector, StreamType};
pub use error::{BridgeError, Side};
pub use listener::{ListenerConfig, MediaStreamListener};
pub use op::{StreamOp, TransformResult};
pub use pump::{PumpExit, PumpStats, RelayPump};
pub use session::{BridgeSession, SessionEnd, SessionSummary};
pub use transform::{from_fn, FnTransformer, MessageTransformer, PassThrough};
