use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::error::Side;

/// A duplex WebSocket connection as seen by the bridge: a lazy stream of
/// incoming frames plus a sink for outgoing ones.
///
/// Implemented for every `tokio_tungstenite::WebSocketStream`, whatever
/// transport it runs over.
pub trait Connection:
    Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin + Send
{
}

impl<T> Connection for T where
    T: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin + Send
{
}

/// Upper bound on sending a close frame during teardown.
pub(crate) const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Send a close frame and flush. A peer that already went away is not an
/// error at this point, so failures are only logged. If the frame cannot be
/// flushed within [`CLOSE_TIMEOUT`] the close is abandoned and the caller drops
/// the connection.
pub(crate) async fn close<W>(sink: &mut W, side: Side, session_id: uuid::Uuid)
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => tracing::debug!(%session_id, %side, "connection closed"),
        Ok(Err(WsError::ConnectionClosed)) | Ok(Err(WsError::AlreadyClosed)) => {
            tracing::debug!(%session_id, %side, "connection already closed")
        }
        Ok(Err(err)) => tracing::debug!(%session_id, %side, %err, "error while closing connection"),
        Err(_) => tracing::debug!(%session_id, %side, "close not flushed in time, dropping connection"),
    }
}
