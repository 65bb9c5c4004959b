use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::value::RawValue;

use crate::op::TransformResult;

/// Direction-specific logic applied to every frame a pump reads.
///
/// The pump decodes each frame into [`Message`](Self::Message) with
/// `serde_json` and then calls [`transform`](Self::transform) exactly once,
/// in receipt order. A frame that does not decode is fatal for the pump, so
/// message types should accept unknown-but-well-formed envelopes through a
/// catch-all variant and answer them with [`TransformResult::pass`].
///
/// Transformers may keep private state across calls, but must not perform
/// I/O. A fresh instance is built for every bridge session.
pub trait MessageTransformer: Send {
    type Message: DeserializeOwned + Send;

    fn transform(&mut self, message: Self::Message) -> TransformResult;
}

/// Relays every well-formed JSON frame unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl MessageTransformer for PassThrough {
    type Message = Box<RawValue>;

    fn transform(&mut self, message: Box<RawValue>) -> TransformResult {
        TransformResult::relay(message.get())
    }
}

/// A transformer backed by a closure. See [`from_fn`].
pub struct FnTransformer<M, F> {
    f: F,
    _message: PhantomData<fn() -> M>,
}

/// Build a transformer from a closure over an already-decoded message.
///
/// ```
/// use stream_bridge::{from_fn, TransformResult};
///
/// let upper = from_fn(|text: String| TransformResult::relay(text.to_uppercase()));
/// # let _ = upper;
/// ```
pub fn from_fn<M, F>(f: F) -> FnTransformer<M, F>
where
    M: DeserializeOwned + Send,
    F: FnMut(M) -> TransformResult + Send,
{
    FnTransformer {
        f,
        _message: PhantomData,
    }
}

impl<M, F> MessageTransformer for FnTransformer<M, F>
where
    M: DeserializeOwned + Send,
    F: FnMut(M) -> TransformResult + Send,
{
    type Message = M;

    fn transform(&mut self, message: M) -> TransformResult {
        (self.f)(message)
    }
}
