use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::entry::JournalEntry;

/// Entries queued beyond this make `record` wait for the writer.
const CHANNEL_CAPACITY: usize = 256;

/// Errors raised while opening the journal file.
///
/// Once the journal is running, write failures are logged by the writer task
/// and never reach a session.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("failed to create journal directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to open journal {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Cloneable handle that feeds entries to the background journal writer.
///
/// Every bridge session holds a clone. When the last clone is dropped the
/// writer task writes whatever is still queued and exits.
#[derive(Clone)]
pub struct SessionJournal {
    tx: mpsc::Sender<JournalEntry>,
}

impl SessionJournal {
    /// Open the journal at `path` for appending and spawn its writer task.
    ///
    /// Missing parent directories are created. The returned handle resolves
    /// once every `SessionJournal` clone is gone and the last batch is on
    /// disk.
    pub async fn start(
        path: impl AsRef<Path>,
    ) -> Result<(Self, JoinHandle<()>), JournalError> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path).await?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = tokio::spawn(write_batches(path, BufWriter::new(file), rx));
        Ok((Self { tx }, handle))
    }

    /// Queue an entry for the writer. Entries recorded after the writer has
    /// died are dropped with a warning.
    pub async fn record(&self, entry: JournalEntry) {
        if let Err(err) = self.tx.send(entry).await {
            tracing::warn!(event = ?err.0.event, "session journal closed, entry dropped");
        }
    }
}

async fn open_append(path: &Path) -> Result<File, JournalError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| JournalError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|source| JournalError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Write entries in the batches they arrive in, flushing after each batch.
///
/// Lifecycle events are sparse, so a batch is usually one entry and a line
/// reaches the file as soon as the channel is empty again.
async fn write_batches(
    path: PathBuf,
    mut out: BufWriter<File>,
    mut rx: mpsc::Receiver<JournalEntry>,
) {
    let mut batch = Vec::with_capacity(CHANNEL_CAPACITY);

    while rx.recv_many(&mut batch, CHANNEL_CAPACITY).await > 0 {
        for entry in batch.drain(..) {
            if let Err(err) = append_line(&mut out, &entry).await {
                tracing::error!(path = %path.display(), event = ?entry.event, %err, "failed to write journal entry");
            }
        }
        if let Err(err) = out.flush().await {
            tracing::error!(path = %path.display(), %err, "failed to flush session journal");
        }
    }

    tracing::debug!(path = %path.display(), "session journal writer stopped");
}

async fn append_line(out: &mut BufWriter<File>, entry: &JournalEntry) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');
    out.write_all(&line).await
}
