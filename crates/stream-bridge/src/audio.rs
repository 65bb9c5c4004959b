//! Audio-stream transformers between the telephony call and the voice agent.
//!
//! The call side sends `{"type":"audio","data":{"audio_b64":...}}` frames and
//! expects `{"type":"audio","audio_b64":...,"chunk_id":N}` and
//! `{"type":"clear"}` back. The agent side expects `{"user_audio_chunk":...}`
//! and emits `audio` and `interruption` events. Every other event type on
//! either side is well-formed but uninteresting and is dropped.

use serde::Deserialize;
use serde_json::json;

use crate::op::TransformResult;
use crate::transform::MessageTransformer;

/// Event received on the call connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    Audio { data: CallAudio },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallAudio {
    pub audio_b64: String,
}

/// Event received on the remote (agent) connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteEvent {
    Audio { audio_event: RemoteAudio },
    Interruption,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteAudio {
    pub audio_base_64: String,
}

/// Call → remote: re-keys caller audio for the agent.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallStreamTransformer;

impl MessageTransformer for CallStreamTransformer {
    type Message = CallEvent;

    fn transform(&mut self, message: CallEvent) -> TransformResult {
        match message {
            CallEvent::Audio { data } => {
                TransformResult::relay(json!({ "user_audio_chunk": data.audio_b64 }).to_string())
            }
            CallEvent::Unknown => TransformResult::pass(),
        }
    }
}

/// Remote → call: re-keys agent audio for the caller, numbering each chunk,
/// and turns interruptions into `clear` commands.
///
/// Chunk numbering starts at 1 and belongs to this instance alone. Build a new
/// transformer for every session.
#[derive(Debug, Clone)]
pub struct RemoteStreamTransformer {
    next_chunk_id: u64,
}

impl RemoteStreamTransformer {
    pub fn new() -> Self {
        Self { next_chunk_id: 1 }
    }

    /// The id the next relayed audio chunk will carry.
    pub fn next_chunk_id(&self) -> u64 {
        self.next_chunk_id
    }
}

impl Default for RemoteStreamTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageTransformer for RemoteStreamTransformer {
    type Message = RemoteEvent;

    fn transform(&mut self, message: RemoteEvent) -> TransformResult {
        match message {
            RemoteEvent::Audio { audio_event } => {
                let chunk_id = self.next_chunk_id;
                self.next_chunk_id += 1;
                TransformResult::relay(
                    json!({
                        "type": "audio",
                        "audio_b64": audio_event.audio_base_64,
                        "chunk_id": chunk_id,
                    })
                    .to_string(),
                )
            }
            RemoteEvent::Interruption => {
                TransformResult::relay(json!({ "type": "clear" }).to_string())
            }
            RemoteEvent::Unknown => TransformResult::pass(),
        }
    }
}
