//! Filesystem spool implementation of the bus traits.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::bus::*;

const MESSAGE_EXTENSION: &str = "json";
const REJECTED_EXTENSION: &str = "rejected";

/// Directory-spool bus shared with workers through the filesystem.
///
/// Layout:
/// - `<root>/topics/<topic>/<message id>.json`: published triggers
/// - `<root>/inbox/<message id>.json`: results written by workers
///
/// Files are written atomically (temp file + rename) so a reader never sees
/// a partial message. Unparseable inbox files are renamed to `*.rejected`.
///
/// Successive `receive` calls resume after the last file handed out and wrap
/// around, so messages left in place for other runs cannot starve newer ones.
pub struct FsBus {
    topics_dir: PathBuf,
    inbox_dir: PathBuf,
    cursor: Mutex<Option<PathBuf>>,
}

impl FsBus {
    /// Create a bus rooted at `root`, creating its directories if needed.
    pub fn new(root: impl AsRef<Path>) -> BusResult<Self> {
        let topics_dir = root.as_ref().join("topics");
        let inbox_dir = root.as_ref().join("inbox");
        fs::create_dir_all(&topics_dir)?;
        fs::create_dir_all(&inbox_dir)?;
        Ok(Self {
            topics_dir,
            inbox_dir,
            cursor: Mutex::new(None),
        })
    }

    pub fn inbox_dir(&self) -> &Path {
        &self.inbox_dir
    }

    pub fn topic_dir(&self, topic: &str) -> PathBuf {
        self.topics_dir.join(topic)
    }

    /// Write a result into the inbox, as a worker would.
    pub fn deliver(&self, message: &ResultMessage) -> BusResult<String> {
        let id = next_message_id();
        write_atomic(&self.inbox_dir, &id, &serde_json::to_vec(message)?)?;
        Ok(id)
    }

    fn reject(&self, path: &Path, error: &serde_json::Error) {
        warn!(path = %path.display(), error = %error, "Rejecting unparseable inbox message");
        if let Err(e) = fs::rename(path, path.with_extension(REJECTED_EXTENSION)) {
            warn!(path = %path.display(), error = %e, "Could not set aside rejected message");
        }
    }
}

/// Sortable id: arrival time first, random suffix for uniqueness.
fn next_message_id() -> String {
    format!(
        "{:020}-{}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        uuid::Uuid::new_v4().simple()
    )
}

fn write_atomic(dir: &Path, id: &str, data: &[u8]) -> BusResult<()> {
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(dir.join(format!("{id}.{MESSAGE_EXTENSION}")))
        .map_err(|e| e.error)?;
    Ok(())
}

fn classify_io(error: std::io::Error) -> BusError {
    match error.kind() {
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
            BusError::Transient(error.to_string())
        }
        _ => BusError::Io(error),
    }
}

#[async_trait]
impl TriggerBus for FsBus {
    async fn publish(&self, topic: &str, message: &TriggerMessage) -> BusResult<String> {
        let id = next_message_id();
        let data = serde_json::to_vec_pretty(message)?;
        write_atomic(&self.topic_dir(topic), &id, &data).map_err(|e| match e {
            BusError::Io(io) => classify_io(io),
            other => other,
        })?;
        debug!(topic = %topic, message_id = %id, "Trigger written");
        Ok(id)
    }
}

#[async_trait]
impl ResultInbox for FsBus {
    async fn receive(&self, max_messages: usize) -> BusResult<Vec<InboxMessage>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.inbox_dir).map_err(classify_io)? {
            let path = entry.map_err(classify_io)?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(MESSAGE_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut cursor = self
            .cursor
            .lock()
            .map_err(|_| BusError::Fatal("inbox cursor poisoned".to_string()))?;
        if let Some(last) = cursor.as_ref() {
            let split = paths.partition_point(|p| p <= last);
            paths.rotate_left(split);
        }

        let mut messages = Vec::new();
        for path in paths {
            if messages.len() >= max_messages {
                break;
            }
            let data = match fs::read(&path) {
                Ok(data) => data,
                // Acknowledged by a concurrent run between listing and reading.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(classify_io(e)),
            };
            let body = match serde_json::from_slice::<ResultMessage>(&data) {
                Ok(body) => body,
                Err(e) => {
                    self.reject(&path, &e);
                    continue;
                }
            };
            let receipt = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            *cursor = Some(path);
            messages.push(InboxMessage { receipt, body });
        }
        Ok(messages)
    }

    async fn acknowledge(&self, receipts: &[String]) -> BusResult<()> {
        for receipt in receipts {
            // Receipts are bare file names; never follow a path out of the inbox.
            if receipt.contains('/') || receipt.contains('\\') || receipt.starts_with('.') {
                warn!(receipt = %receipt, "Ignoring malformed receipt");
                continue;
            }
            match fs::remove_file(self.inbox_dir.join(receipt)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(classify_io(e)),
            }
        }
        Ok(())
    }
}
