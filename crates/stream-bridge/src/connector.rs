use std::fmt;
use std::sync::Arc;

use session_journal::{JournalEntry, SessionEvent, SessionJournal};
use tokio_util::sync::CancellationToken;

use crate::connection::{self, Connection};
use crate::error::{BridgeError, Side};
use crate::session::{BridgeSession, SessionEnd, SessionSummary};
use crate::transform::{MessageTransformer, PassThrough};

/// Stream topology requested from the connector.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// Frames flow call → remote and remote → call.
    #[default]
    Bidirectional,
    /// Frames flow call → remote only. Not supported.
    Unidirectional,
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamType::Bidirectional => "Bidirectional",
            StreamType::Unidirectional => "Unidirectional",
        })
    }
}

type Factory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Bridges call connections to a remote stream.
///
/// A connector is built once and shared. Each [`bridge`](Self::bridge) call
/// dials the remote address, builds fresh transformers from the configured
/// factories, and runs one [`BridgeSession`] to completion.
pub struct StreamConnector<C = PassThrough, R = PassThrough> {
    stream_type: StreamType,
    remote_url: String,
    call_transformer: Factory<C>,
    remote_transformer: Factory<R>,
    journal: Option<SessionJournal>,
}

impl StreamConnector {
    /// Create a pass-through connector for `remote_url`.
    ///
    /// Fails with [`BridgeError::BadParameter`] when the URL is empty and
    /// with [`BridgeError::NotImplemented`] for a unidirectional topology.
    /// Nothing is dialed here.
    pub fn new(stream_type: StreamType, remote_url: impl Into<String>) -> Result<Self, BridgeError> {
        let remote_url = remote_url.into();
        if remote_url.trim().is_empty() {
            return Err(BridgeError::BadParameter { param: "remote_url" });
        }
        if stream_type == StreamType::Unidirectional {
            return Err(BridgeError::NotImplemented(stream_type));
        }

        Ok(Self {
            stream_type,
            remote_url,
            call_transformer: Arc::new(|| PassThrough),
            remote_transformer: Arc::new(|| PassThrough),
            journal: None,
        })
    }
}

impl<C, R> StreamConnector<C, R>
where
    C: MessageTransformer,
    R: MessageTransformer,
{
    /// Use `factory` to build the call → remote transformer of every session.
    pub fn with_call_transformer<C2, F>(self, factory: F) -> StreamConnector<C2, R>
    where
        F: Fn() -> C2 + Send + Sync + 'static,
    {
        StreamConnector {
            stream_type: self.stream_type,
            remote_url: self.remote_url,
            call_transformer: Arc::new(factory),
            remote_transformer: self.remote_transformer,
            journal: self.journal,
        }
    }

    /// Use `factory` to build the remote → call transformer of every session.
    pub fn with_remote_transformer<R2, F>(self, factory: F) -> StreamConnector<C, R2>
    where
        F: Fn() -> R2 + Send + Sync + 'static,
    {
        StreamConnector {
            stream_type: self.stream_type,
            remote_url: self.remote_url,
            call_transformer: self.call_transformer,
            remote_transformer: Arc::new(factory),
            journal: self.journal,
        }
    }

    /// Record session lifecycle events to `journal`.
    pub fn with_journal(mut self, journal: SessionJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    /// Bridge `call` to a freshly dialed remote connection until either side
    /// ends or fails.
    pub async fn bridge<S: Connection>(&self, call: S) -> Result<SessionSummary, BridgeError> {
        self.bridge_with_shutdown(call, &CancellationToken::new())
            .await
    }

    /// Like [`bridge`](Self::bridge), but also ends the session cleanly when
    /// `shutdown` is cancelled.
    ///
    /// The remote address is dialed once. If that fails the call connection
    /// is closed and [`BridgeError::Connect`] is returned; retrying is up to
    /// the caller.
    pub async fn bridge_with_shutdown<S: Connection>(
        &self,
        mut call: S,
        shutdown: &CancellationToken,
    ) -> Result<SessionSummary, BridgeError> {
        let session_id = uuid::Uuid::new_v4();
        self.record(session_id, SessionEvent::SessionStarted, serde_json::json!({
            "remote_url": self.remote_url,
        }))
        .await;

        let dialed = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            dialed = tokio_tungstenite::connect_async(self.remote_url.as_str()) => Some(dialed),
        };

        let remote = match dialed {
            None => {
                connection::close(&mut call, Side::Call, session_id).await;
                let summary = SessionSummary::idle(session_id, SessionEnd::Shutdown);
                self.record_session_result(session_id, &Ok(summary.clone()))
                    .await;
                return Ok(summary);
            }
            Some(Ok((remote, response))) => {
                tracing::info!(
                    %session_id,
                    remote = %self.remote_url,
                    status = %response.status(),
                    "remote stream connected"
                );
                self.record(session_id, SessionEvent::RemoteConnected, serde_json::json!({
                    "status": response.status().as_u16(),
                }))
                .await;
                remote
            }
            Some(Err(err)) => {
                tracing::error!(%session_id, remote = %self.remote_url, %err, "remote connect failed");
                self.record(session_id, SessionEvent::RemoteConnectFailed, serde_json::json!({
                    "error": err.to_string(),
                }))
                .await;
                connection::close(&mut call, Side::Call, session_id).await;
                return Err(BridgeError::Connect {
                    url: self.remote_url.clone(),
                    source: err,
                });
            }
        };

        let result = BridgeSession::with_id(session_id, call, remote)
            .run(
                (self.call_transformer)(),
                (self.remote_transformer)(),
                shutdown,
            )
            .await;

        match &result {
            Ok(summary) => tracing::info!(
                %session_id,
                end = ?summary.end,
                inbound_relayed = summary.inbound.relayed,
                outbound_relayed = summary.outbound.relayed,
                "bridge session ended"
            ),
            Err(err) => tracing::error!(%session_id, %err, "bridge session failed"),
        }
        self.record_session_result(session_id, &result).await;

        result
    }

    async fn record(&self, session_id: uuid::Uuid, event: SessionEvent, details: serde_json::Value) {
        if let Some(journal) = &self.journal {
            journal
                .record(JournalEntry::new(event, details).for_session(session_id))
                .await;
        }
    }

    async fn record_session_result(
        &self,
        session_id: uuid::Uuid,
        result: &Result<SessionSummary, BridgeError>,
    ) {
        let (event, details) = match result {
            Ok(summary) => (
                SessionEvent::SessionEnded,
                serde_json::to_value(summary).unwrap_or_default(),
            ),
            Err(err) => (
                SessionEvent::SessionFailed,
                serde_json::json!({
                    "error": err.to_string(),
                    "side": err.side(),
                }),
            ),
        };
        self.record(session_id, event, details).await;
    }
}

impl<C, R> Clone for StreamConnector<C, R> {
    fn clone(&self) -> Self {
        Self {
            stream_type: self.stream_type,
            remote_url: self.remote_url.clone(),
            call_transformer: Arc::clone(&self.call_transformer),
            remote_transformer: Arc::clone(&self.remote_transformer),
            journal: self.journal.clone(),
        }
    }
}

impl<C, R> fmt::Debug for StreamConnector<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnector")
            .field("stream_type", &self.stream_type)
            .field("remote_url", &self.remote_url)
            .field("journal", &self.journal.is_some())
            .finish()
    }
}
