use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, Side};
use crate::op::TransformResult;
use crate::transform::MessageTransformer;

/// Frame counters for one direction of a session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PumpStats {
    /// Envelope frames read from the source (control frames excluded).
    pub received: u64,
    /// Frames written to the destination.
    pub relayed: u64,
    /// Frames the transformer chose to drop.
    pub passed: u64,
}

/// Why a pump stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The source sent a close frame or its stream ended.
    SourceClosed,
    /// The session's cancellation token fired.
    Cancelled,
}

/// The read → transform → write loop for one direction of a bridge.
///
/// A pump never opens or closes connections. It borrows the read half of its
/// source and the write half of its destination from the owning
/// [`BridgeSession`](crate::BridgeSession) for as long as it runs.
pub struct RelayPump<T> {
    source: Side,
    transformer: T,
    stats: PumpStats,
    write_interrupted: bool,
}

impl<T: MessageTransformer> RelayPump<T> {
    /// Create a pump that reads from the `source` side and writes to its peer.
    pub fn new(source: Side, transformer: T) -> Self {
        Self {
            source,
            transformer,
            stats: PumpStats::default(),
            write_interrupted: false,
        }
    }

    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    pub fn transformer(&self) -> &T {
        &self.transformer
    }

    /// Whether the pump was cancelled while a write to its destination was
    /// still pending. Such a destination is not draining and should be
    /// dropped rather than closed.
    pub fn write_interrupted(&self) -> bool {
        self.write_interrupted
    }

    /// Run until the source ends, `cancel` fires, or a frame fails.
    ///
    /// Cancellation is observed while waiting for the next frame and while a
    /// relayed frame is waiting on the destination. A write abandoned this way
    /// stays whole in the connection's write buffer and is never sent.
    pub async fn run<R, W>(
        &mut self,
        source: &mut R,
        destination: &mut W,
        cancel: &CancellationToken,
    ) -> Result<PumpExit, BridgeError>
    where
        R: Stream<Item = Result<Message, WsError>> + Unpin,
        W: Sink<Message, Error = WsError> + Unpin,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(PumpExit::Cancelled),
                next = source.next() => next,
            };

            let frame = match next {
                None => return Ok(PumpExit::SourceClosed),
                Some(Ok(frame)) => frame,
                Some(Err(err)) => {
                    return Err(BridgeError::Transport {
                        side: self.source,
                        source: err,
                    })
                }
            };

            let result = match frame {
                Message::Text(text) => self.process(text.as_bytes())?,
                Message::Binary(bytes) => self.process(&bytes)?,
                Message::Close(frame) => {
                    tracing::debug!(side = %self.source, ?frame, "close frame received");
                    return Ok(PumpExit::SourceClosed);
                }
                // Ping/pong are answered by tungstenite itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };

            let Some(payload) = result.into_relayed() else {
                self.stats.passed += 1;
                continue;
            };

            let sent = tokio::select! {
                biased;
                sent = destination.send(Message::Text(payload.into())) => sent,
                _ = cancel.cancelled() => {
                    self.write_interrupted = true;
                    tracing::debug!(side = %self.source.peer(), "pending write abandoned");
                    return Ok(PumpExit::Cancelled);
                }
            };
            sent.map_err(|err| BridgeError::Transport {
                side: self.source.peer(),
                source: err,
            })?;
            self.stats.relayed += 1;
        }
    }

    fn process(&mut self, frame: &[u8]) -> Result<TransformResult, BridgeError> {
        self.stats.received += 1;

        let message = serde_json::from_slice::<T::Message>(frame).map_err(|err| {
            BridgeError::Decode {
                side: self.source,
                source: err,
            }
        })?;
        let result = self.transformer.transform(message);

        tracing::trace!(side = %self.source, op = ?result.op(), "frame transformed");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{CallStreamTransformer, RemoteStreamTransformer};
    use crate::transform::PassThrough;
    use futures_util::stream;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    type Frames = stream::Iter<std::vec::IntoIter<Result<Message, WsError>>>;

    fn frames(items: Vec<Result<Message, WsError>>) -> Frames {
        stream::iter(items)
    }

    fn text(frame: &str) -> Result<Message, WsError> {
        Ok(Message::Text(frame.into()))
    }

    /// Collects everything written to it, like the write half of a connection.
    fn collector() -> impl Sink<Message, Error = WsError> + Unpin {
        futures_util::sink::drain::<Message>().sink_map_err(|never| match never {})
    }

    fn recording(written: &mut Vec<Message>) -> impl Sink<Message, Error = WsError> + '_ {
        futures_util::sink::unfold(written, |written, message| async move {
            written.push(message);
            Ok::<_, WsError>(written)
        })
    }

    fn texts(written: &[Message]) -> Vec<String> {
        written
            .iter()
            .map(|m| m.to_text().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn relays_in_receipt_order_and_skips_passed_frames() {
        let mut source = frames(vec![
            text(r#"{"type":"start"}"#),
            text(r#"{"type":"audio","data":{"audio_b64":"AAAA"}}"#),
            text(r#"{"type":"audio","data":{"audio_b64":"BBBB"}}"#),
        ]);
        let mut written = Vec::new();
        let mut sink = Box::pin(recording(&mut written));

        let mut pump = RelayPump::new(Side::Call, CallStreamTransformer);
        let exit = pump
            .run(&mut source, &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        drop(sink);

        assert_eq!(exit, PumpExit::SourceClosed);
        assert_eq!(
            texts(&written),
            vec![
                r#"{"user_audio_chunk":"AAAA"}"#.to_string(),
                r#"{"user_audio_chunk":"BBBB"}"#.to_string(),
            ]
        );
        assert_eq!(
            pump.stats(),
            PumpStats {
                received: 3,
                relayed: 2,
                passed: 1
            }
        );
    }

    #[tokio::test]
    async fn close_frame_ends_the_pump_normally() {
        let mut source = frames(vec![
            Ok(Message::Close(Some(CloseFrame {
                code: tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::Normal,
                reason: "bye".into(),
            }))),
            text(r#"{"type":"audio","data":{"audio_b64":"AAAA"}}"#),
        ]);
        let mut sink = collector();

        let mut pump = RelayPump::new(Side::Call, CallStreamTransformer);
        let exit = pump
            .run(&mut source, &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(exit, PumpExit::SourceClosed);
        assert_eq!(pump.stats().received, 0);
    }

    #[tokio::test]
    async fn malformed_frame_is_fatal() {
        let mut source = frames(vec![
            text(r#"{"type":"interruption"}"#),
            text("not json"),
            text(r#"{"type":"interruption"}"#),
        ]);
        let mut sink = collector();

        let mut pump = RelayPump::new(Side::Remote, RemoteStreamTransformer::new());
        let err = pump
            .run(&mut source, &mut sink, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Decode { side: Side::Remote, .. }));
        assert_eq!(pump.stats().relayed, 1);
    }

    #[tokio::test]
    async fn unknown_type_is_not_malformed() {
        let mut source = frames(vec![text(r#"{"type":"vad_score","vad_score_event":{}}"#)]);
        let mut sink = collector();

        let mut pump = RelayPump::new(Side::Remote, RemoteStreamTransformer::new());
        let exit = pump
            .run(&mut source, &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(exit, PumpExit::SourceClosed);
        assert_eq!(pump.stats().passed, 1);
    }

    #[tokio::test]
    async fn read_error_is_reported_against_the_source() {
        let mut source = frames(vec![Err(WsError::Io(std::io::ErrorKind::ConnectionReset.into()))]);
        let mut sink = collector();

        let mut pump = RelayPump::new(Side::Call, PassThrough);
        let err = pump
            .run(&mut source, &mut sink, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Transport { side: Side::Call, .. }));
    }

    #[tokio::test]
    async fn write_error_is_reported_against_the_destination() {
        let mut source = frames(vec![text(r#"{"type":"interruption"}"#)]);
        let sink = futures_util::sink::unfold((), |(), _: Message| async {
            Err::<(), _>(WsError::AlreadyClosed)
        });
        let mut sink = Box::pin(sink);

        let mut pump = RelayPump::new(Side::Remote, RemoteStreamTransformer::new());
        let err = pump
            .run(&mut source, &mut sink, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Transport { side: Side::Call, .. }));
    }

    #[tokio::test]
    async fn binary_frames_are_decoded_as_envelopes() {
        let mut source = frames(vec![Ok(Message::Binary(
            br#"{"type":"interruption"}"#.to_vec().into(),
        ))]);
        let mut written = Vec::new();
        let mut sink = Box::pin(recording(&mut written));

        let mut pump = RelayPump::new(Side::Remote, RemoteStreamTransformer::new());
        pump.run(&mut source, &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        drop(sink);

        assert_eq!(texts(&written), vec![r#"{"type":"clear"}"#.to_string()]);
    }

    #[tokio::test]
    async fn control_frames_bypass_the_transformer() {
        let mut source = frames(vec![
            Ok(Message::Ping(vec![1].into())),
            Ok(Message::Pong(vec![1].into())),
        ]);
        let mut sink = collector();

        let mut pump = RelayPump::new(Side::Call, PassThrough);
        pump.run(&mut source, &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(pump.stats(), PumpStats::default());
    }

    #[tokio::test]
    async fn cancelled_pump_stops_before_reading() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut source = frames(vec![text(r#"{"type":"interruption"}"#)]);
        let mut sink = collector();

        let mut pump = RelayPump::new(Side::Remote, RemoteStreamTransformer::new());
        let exit = pump.run(&mut source, &mut sink, &cancel).await.unwrap();

        assert_eq!(exit, PumpExit::Cancelled);
        assert_eq!(pump.stats().received, 0);
        assert_eq!(pump.transformer().next_chunk_id(), 1);
    }

    #[tokio::test]
    async fn cancel_interrupts_an_idle_read() {
        let cancel = CancellationToken::new();
        let mut source = stream::pending::<Result<Message, WsError>>();
        let mut sink = collector();

        let trigger = cancel.clone();
        tokio::spawn(async move { trigger.cancel() });

        let mut pump = RelayPump::new(Side::Call, PassThrough);
        let exit = pump.run(&mut source, &mut sink, &cancel).await.unwrap();

        assert_eq!(exit, PumpExit::Cancelled);
        assert!(!pump.write_interrupted());
    }

    #[tokio::test]
    async fn cancel_interrupts_a_write_that_never_completes() {
        let cancel = CancellationToken::new();
        let mut source = frames(vec![text(r#"{"type":"interruption"}"#)]);
        // A destination whose peer stopped reading: the write never finishes.
        let sink = futures_util::sink::unfold((), |(), _: Message| {
            futures_util::future::pending::<Result<(), WsError>>()
        });
        let mut sink = Box::pin(sink);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut pump = RelayPump::new(Side::Remote, RemoteStreamTransformer::new());
        let exit = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            pump.run(&mut source, &mut sink, &cancel),
        )
        .await
        .expect("cancel did not interrupt the pending write")
        .unwrap();

        assert_eq!(exit, PumpExit::Cancelled);
        assert!(pump.write_interrupted());
        assert_eq!(pump.stats().received, 1);
        assert_eq!(pump.stats().relayed, 0);
    }
}
