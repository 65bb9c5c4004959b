use std::future::Future;
use std::sync::OnceLock;

use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::connection::{self, Connection};
use crate::error::{BridgeError, Side};
use crate::pump::{PumpExit, PumpStats, RelayPump};
use crate::transform::MessageTransformer;

/// How a session that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEnd {
    /// The call connection closed its frame stream.
    CallClosed,
    /// The remote connection closed its frame stream.
    RemoteClosed,
    /// The caller's shutdown token fired.
    Shutdown,
}

/// Outcome of a session that ended without error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: uuid::Uuid,
    pub end: SessionEnd,
    /// Call → remote.
    pub inbound: PumpStats,
    /// Remote → call.
    pub outbound: PumpStats,
}

impl SessionSummary {
    pub(crate) fn idle(session_id: uuid::Uuid, end: SessionEnd) -> Self {
        Self {
            session_id,
            end,
            inbound: PumpStats::default(),
            outbound: PumpStats::default(),
        }
    }
}

/// One call bridged to one remote peer.
///
/// The session owns both connections. Its pumps only borrow connection
/// halves, so opening and closing stay here: whatever way [`run`](Self::run)
/// ends, each connection has been closed at most once by the time it returns,
/// and a connection whose peer stopped reading is dropped without a close
/// handshake.
/// Dropping the `run` future drops both connections, which closes their
/// transports.
pub struct BridgeSession<C, R> {
    id: uuid::Uuid,
    call: C,
    remote: R,
}

impl<C: Connection, R: Connection> BridgeSession<C, R> {
    pub fn new(call: C, remote: R) -> Self {
        Self::with_id(uuid::Uuid::new_v4(), call, remote)
    }

    pub fn with_id(id: uuid::Uuid, call: C, remote: R) -> Self {
        Self { id, call, remote }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Relay frames in both directions until either side ends or fails, or
    /// `shutdown` fires.
    ///
    /// `inbound` transforms call → remote frames and `outbound` transforms
    /// remote → call frames. The first pump to stop cancels its sibling; a
    /// pump error is returned only after both connections are closed.
    pub async fn run<I, O>(
        self,
        inbound: I,
        outbound: O,
        shutdown: &CancellationToken,
    ) -> Result<SessionSummary, BridgeError>
    where
        I: MessageTransformer,
        O: MessageTransformer,
    {
        let session_id = self.id;
        let cancel = shutdown.child_token();
        let first_failure = OnceLock::new();

        let (mut call_tx, mut call_rx) = self.call.split();
        let (mut remote_tx, mut remote_rx) = self.remote.split();

        let mut inbound = RelayPump::new(Side::Call, inbound);
        let mut outbound = RelayPump::new(Side::Remote, outbound);

        tracing::debug!(%session_id, "pumps starting");

        let (inbound_exit, outbound_exit) = tokio::join!(
            supervise(
                Side::Call,
                session_id,
                inbound.run(&mut call_rx, &mut remote_tx, &cancel),
                &cancel,
                &first_failure,
            ),
            supervise(
                Side::Remote,
                session_id,
                outbound.run(&mut remote_rx, &mut call_tx, &cancel),
                &cancel,
                &first_failure,
            ),
        );

        // A sink with an abandoned write belongs to a peer that stopped
        // reading. Its half is dropped with the session instead of closed.
        if inbound.write_interrupted() {
            tracing::debug!(%session_id, side = %Side::Remote, "peer not reading, dropping connection");
        } else {
            connection::close(&mut remote_tx, Side::Remote, session_id).await;
        }
        if outbound.write_interrupted() {
            tracing::debug!(%session_id, side = %Side::Call, "peer not reading, dropping connection");
        } else {
            connection::close(&mut call_tx, Side::Call, session_id).await;
        }

        let (inbound_exit, outbound_exit) = match (inbound_exit, outbound_exit) {
            (Ok(i), Ok(o)) => (i, o),
            (Err(err), Ok(_)) | (Ok(_), Err(err)) => return Err(err),
            (Err(inbound_err), Err(outbound_err)) => {
                return Err(match first_failure.get() {
                    Some(Side::Remote) => outbound_err,
                    _ => inbound_err,
                });
            }
        };

        let end = match (inbound_exit, outbound_exit) {
            (PumpExit::SourceClosed, _) => SessionEnd::CallClosed,
            (_, PumpExit::SourceClosed) => SessionEnd::RemoteClosed,
            (PumpExit::Cancelled, PumpExit::Cancelled) => SessionEnd::Shutdown,
        };

        Ok(SessionSummary {
            session_id,
            end,
            inbound: inbound.stats(),
            outbound: outbound.stats(),
        })
    }
}

/// Await one pump and, however it ends, stop its sibling.
async fn supervise<F>(
    side: Side,
    session_id: uuid::Uuid,
    pump: F,
    cancel: &CancellationToken,
    first_failure: &OnceLock<Side>,
) -> Result<PumpExit, BridgeError>
where
    F: Future<Output = Result<PumpExit, BridgeError>>,
{
    let exit = pump.await;
    match &exit {
        Ok(PumpExit::SourceClosed) => tracing::info!(%session_id, %side, "stream ended"),
        Ok(PumpExit::Cancelled) => tracing::debug!(%session_id, %side, "pump cancelled"),
        Err(err) => {
            let _ = first_failure.set(side);
            tracing::warn!(%session_id, %side, %err, "pump failed");
        }
    }
    cancel.cancel();
    exit
}
