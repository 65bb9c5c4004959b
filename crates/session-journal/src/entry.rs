use serde::{Deserialize, Serialize};

/// One line of the session journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event: SessionEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<uuid::Uuid>,
    pub details: serde_json::Value,
}

impl JournalEntry {
    /// Create an entry stamped with a fresh UUID v4 and the current UTC time.
    /// The entry is not tied to a session until [`for_session`](Self::for_session)
    /// is called.
    pub fn new(event: SessionEvent, details: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            event,
            session_id: None,
            details,
        }
    }

    /// Attach the bridge session this event belongs to.
    pub fn for_session(mut self, session_id: uuid::Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// Lifecycle event kinds recorded by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    ServerStarted,
    ServerStopped,
    HandshakeRejected,
    SessionStarted,
    RemoteConnected,
    RemoteConnectFailed,
    SessionEnded,
    SessionFailed,
}
