use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use http::StatusCode;
use session_journal::{JournalEntry, SessionEvent, SessionJournal};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as HsRequest, Response as HsResponse,
};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::connector::StreamConnector;
use crate::transform::MessageTransformer;

pub const DEFAULT_MEDIA_PATH: &str = "/media-stream";

/// Where the listener accepts call connections.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub listen_addr: SocketAddr,
    /// Request path the telephony provider opens its media stream on. Upgrade
    /// requests for any other path get a 404.
    pub media_path: String,
}

/// Accepts telephony media-stream connections and bridges each one to the
/// remote stream in its own task.
pub struct MediaStreamListener<C, R> {
    config: ListenerConfig,
    connector: Arc<StreamConnector<C, R>>,
    journal: Option<SessionJournal>,
}

impl<C, R> MediaStreamListener<C, R>
where
    C: MessageTransformer + 'static,
    R: MessageTransformer + 'static,
{
    pub fn new(config: ListenerConfig, connector: StreamConnector<C, R>) -> Self {
        Self {
            config,
            connector: Arc::new(connector),
            journal: None,
        }
    }

    /// Record rejected handshakes to `journal`. Session events are recorded
    /// by the connector's own journal.
    pub fn with_journal(mut self, journal: SessionJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Bind the configured address and serve until `shutdown` fires.
    pub async fn serve(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.run(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` fires.
    ///
    /// On shutdown the listener stops accepting, cancels every in-flight
    /// session, and waits for them to finish closing their connections.
    pub async fn run(&self, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        tracing::info!(
            addr = %listener.local_addr()?,
            path = %self.config.media_path,
            remote = %self.connector.remote_url(),
            "media stream listener ready"
        );

        let sessions = TaskTracker::new();

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted?,
            };

            let connector = Arc::clone(&self.connector);
            let media_path = self.config.media_path.clone();
            let journal = self.journal.clone();
            let session_shutdown = shutdown.child_token();

            sessions.spawn(async move {
                handle_call(stream, peer_addr, media_path, connector, journal, session_shutdown).await;
            });
        }

        sessions.close();
        tracing::info!(in_flight = sessions.len(), "media stream listener draining sessions");
        sessions.wait().await;
        Ok(())
    }
}

/// Handshake one call connection and bridge it.
async fn handle_call<C, R>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    media_path: String,
    connector: Arc<StreamConnector<C, R>>,
    journal: Option<SessionJournal>,
    shutdown: CancellationToken,
) where
    C: MessageTransformer,
    R: MessageTransformer,
{
    let rejected_path: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let rejected_path_cb = Arc::clone(&rejected_path);

    let callback = move |req: &HsRequest, response: HsResponse| -> Result<HsResponse, ErrorResponse> {
        let path = req.uri().path();
        if path == media_path {
            return Ok(response);
        }

        tracing::warn!(%peer_addr, path, "upgrade for unknown path rejected");
        if let Ok(mut guard) = rejected_path_cb.lock() {
            *guard = Some(path.to_string());
        }
        let mut err_response = ErrorResponse::new(Some("Not Found".to_string()));
        *err_response.status_mut() = StatusCode::NOT_FOUND;
        Err(err_response)
    };

    let call = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(err) => {
            let path = rejected_path.lock().ok().and_then(|g| g.clone());
            tracing::debug!(%peer_addr, %err, "call handshake failed");
            if let Some(journal) = &journal {
                journal
                    .record(JournalEntry::new(
                        SessionEvent::HandshakeRejected,
                        serde_json::json!({
                            "peer_addr": peer_addr.to_string(),
                            "path": path,
                            "error": err.to_string(),
                        }),
                    ))
                    .await;
            }
            return;
        }
    };

    tracing::info!(%peer_addr, "call stream connected");

    if let Err(err) = connector.bridge_with_shutdown(call, &shutdown).await {
        tracing::error!(%peer_addr, %err, "call handler error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{CallStreamTransformer, RemoteStreamTransformer};
    use crate::connector::StreamType;
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::{Error as WsError, Message};

    fn config(media_path: &str) -> ListenerConfig {
        ListenerConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            media_path: media_path.to_string(),
        }
    }

    /// Agent that answers every `user_audio_chunk` with one audio event.
    async fn echo_agent() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                    while let Some(Ok(Message::Text(text))) = ws.next().await {
                        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                        let reply = serde_json::json!({
                            "type": "audio",
                            "audio_event": {"audio_base_64": value["user_audio_chunk"]},
                        });
                        if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        url
    }

    #[tokio::test]
    async fn bridges_calls_on_the_media_path() {
        let remote_url = echo_agent().await;
        let connector = StreamConnector::new(StreamType::Bidirectional, remote_url)
            .unwrap()
            .with_call_transformer(|| CallStreamTransformer)
            .with_remote_transformer(RemoteStreamTransformer::new);

        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                MediaStreamListener::new(config(DEFAULT_MEDIA_PATH), connector)
                    .run(tcp, shutdown)
                    .await
            }
        });

        let (mut call, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/media-stream"))
            .await
            .unwrap();
        for chunk in ["AAAA", "BBBB"] {
            let frame = serde_json::json!({"type": "audio", "data": {"audio_b64": chunk}});
            call.send(Message::Text(frame.to_string().into())).await.unwrap();
        }

        let mut replies = Vec::new();
        while replies.len() < 2 {
            if let Message::Text(text) = call.next().await.unwrap().unwrap() {
                replies.push(serde_json::from_str::<serde_json::Value>(text.as_str()).unwrap());
            }
        }
        assert_eq!(replies[0]["audio_b64"], "AAAA");
        assert_eq!(replies[0]["chunk_id"], 1);
        assert_eq!(replies[1]["audio_b64"], "BBBB");
        assert_eq!(replies[1]["chunk_id"], 2);

        // Shutdown closes the in-flight session from the bridge side.
        shutdown.cancel();
        let mut saw_close = false;
        while let Some(Ok(message)) = call.next().await {
            saw_close |= matches!(message, Message::Close(_));
        }
        assert!(saw_close);
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn failed_sessions_do_not_stop_the_listener() {
        let unreachable = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let remote_url = format!("ws://{}", unreachable.local_addr().unwrap());
        drop(unreachable);
        let connector = StreamConnector::new(StreamType::Bidirectional, remote_url).unwrap();

        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                MediaStreamListener::new(config(DEFAULT_MEDIA_PATH), connector)
                    .run(tcp, shutdown)
                    .await
            }
        });

        for _ in 0..2 {
            let (mut call, _) =
                tokio_tungstenite::connect_async(format!("ws://{addr}/media-stream"))
                    .await
                    .unwrap();
            let mut saw_close = false;
            while let Some(Ok(message)) = call.next().await {
                saw_close |= matches!(message, Message::Close(_));
            }
            assert!(saw_close);
        }

        assert!(!server.is_finished());
        shutdown.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn other_paths_are_rejected_with_404() {
        let connector = StreamConnector::new(StreamType::Bidirectional, "ws://127.0.0.1:9").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.jsonl");
        let (journal, writer) = SessionJournal::start(&path).await.unwrap();

        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                MediaStreamListener::new(config(DEFAULT_MEDIA_PATH), connector)
                    .with_journal(journal)
                    .run(tcp, shutdown)
                    .await
            }
        });

        let err = tokio_tungstenite::connect_async(format!("ws://{addr}/flow"))
            .await
            .unwrap_err();
        match err {
            WsError::Http(response) => assert_eq!(response.status(), StatusCode::NOT_FOUND),
            other => panic!("expected HTTP rejection, got {other:?}"),
        }

        shutdown.cancel();
        server.await.unwrap().unwrap();
        writer.await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let entry: JournalEntry = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(entry.event, SessionEvent::HandshakeRejected);
        assert_eq!(entry.details["path"], "/flow");
    }
}
