/// A transformer's verdict on one decoded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StreamOp {
    /// Write the produced payload to the destination connection.
    Relay,
    /// Drop the message silently.
    Pass,
}

/// What a [`MessageTransformer`](crate::MessageTransformer) produced for one
/// message.
///
/// The payload is only ever written when the op is [`StreamOp::Relay`]; a
/// passed result carries an empty payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResult {
    payload: String,
    op: StreamOp,
}

impl TransformResult {
    pub fn relay(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            op: StreamOp::Relay,
        }
    }

    pub fn pass() -> Self {
        Self {
            payload: String::new(),
            op: StreamOp::Pass,
        }
    }

    pub fn op(&self) -> StreamOp {
        self.op
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// The payload to write, or `None` when the message is dropped.
    pub fn into_relayed(self) -> Option<String> {
        match self.op {
            StreamOp::Relay => Some(self.payload),
            StreamOp::Pass => None,
        }
    }
}
