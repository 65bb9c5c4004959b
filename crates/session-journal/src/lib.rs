//! Append-only JSON-lines journal of bridge session lifecycle events.
//!
//! Every call bridged by the server produces a handful of lifecycle events
//! (session started, remote connected, session ended or failed). Each event is
//! serialised as one newline-terminated JSON object and appended to a file,
//! giving operators a [JSON Lines](https://jsonlines.org/) record of who was
//! bridged, for how long, and why each session stopped.
//!
//! Frame contents are never journaled. Only lifecycle metadata is recorded.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use session_journal::{JournalEntry, SessionEvent, SessionJournal};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (journal, _handle) = SessionJournal::start("/var/log/call-bridge/sessions.jsonl").await?;
//!
//! journal
//!     .record(JournalEntry::new(
//!         SessionEvent::ServerStarted,
//!         serde_json::json!({"version": "0.1.0"}),
//!     ))
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod journal;

pub use entry::{JournalEntry, SessionEvent};
pub use journal::{JournalError, SessionJournal};
