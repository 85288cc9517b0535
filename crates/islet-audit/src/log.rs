//! The append-only audit writer.
//!
//! One JSON line per event, appended to a day-stamped file. Writes are
//! serialized through a dedicated writer task so concurrent submissions
//! never interleave partial lines. A per-file size cap triggers rollover
//! to an index-suffixed file.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::config::AuditConfig;
use crate::error::{AuditError, AuditResult};
use crate::event::AuditEvent;

const FILE_PREFIX: &str = "audit-";
const FILE_SUFFIX: &str = ".jsonl";

enum WriterMsg {
    Event(Box<AuditEvent>),
    Flush(oneshot::Sender<()>),
}

/// Handle to the audit log. Cheap to clone; all clones feed one writer.
#[derive(Clone)]
pub struct AuditLog {
    dir: PathBuf,
    config: AuditConfig,
    tx: mpsc::UnboundedSender<WriterMsg>,
}

impl AuditLog {
    /// Open (creating if needed) the audit directory and start the writer.
    ///
    /// Must be called from within an async runtime; the writer runs as a
    /// background task.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>, config: AuditConfig) -> AuditResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let writer = Writer {
            dir: dir.clone(),
            max_file_bytes: config.max_file_bytes,
            active: None,
        };
        tokio::spawn(writer.run(rx));

        Ok(Self { dir, config, tx })
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// The directory events are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record one event.
    ///
    /// Redaction (sensitive keys, URL query strings) is applied before the
    /// event is queued, so nothing sensitive is ever in flight to disk.
    /// When auditing is disabled this is a no-op.
    pub fn log(&self, mut event: AuditEvent) {
        if !self.config.enabled {
            return;
        }
        if !self.config.include_code_snippets {
            event.details.remove("code");
        }
        if self.config.redact_sensitive_data {
            let mut details = Value::Object(std::mem::take(&mut event.details));
            islet_core::redact_value(&mut details);
            if let Value::Object(map) = details {
                event.details = map;
            }
        }
        if self.tx.send(WriterMsg::Event(Box::new(event))).is_err() {
            warn!("audit writer task is gone; event dropped");
        }
    }

    /// Wait until every queued event has reached the file.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::WriterClosed`] if the writer task is gone.
    pub async fn flush(&self) -> AuditResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(WriterMsg::Flush(done_tx))
            .map_err(|_| AuditError::WriterClosed)?;
        done_rx.await.map_err(|_| AuditError::WriterClosed)
    }

    /// Read the last `n` events, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if a log file cannot be read or parsed.
    pub async fn read_last(&self, n: usize) -> AuditResult<Vec<AuditEvent>> {
        let mut files = enumerate_log_files(&self.dir)?;
        files.sort_by_key(|(date, index, _)| (date.clone(), *index));

        let mut events: Vec<AuditEvent> = Vec::new();
        for (_, _, path) in files {
            let content = tokio::fs::read_to_string(&path).await?;
            for line in content.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str(line) {
                    Ok(event) => events.push(event),
                    // A crash window can leave one partial trailing line.
                    Err(err) => warn!(%err, "skipping unparseable audit line"),
                }
            }
        }
        let skip = events.len().saturating_sub(n);
        Ok(events.split_off(skip))
    }
}

/// Enumerate `(date, rotation_index, path)` for every log file in `dir`.
///
/// The active file for a day has no index and sorts after its rotated
/// predecessors.
fn enumerate_log_files(dir: &Path) -> AuditResult<Vec<(String, u32, PathBuf)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(stem) = name
            .strip_prefix(FILE_PREFIX)
            .and_then(|s| s.strip_suffix(FILE_SUFFIX))
        else {
            continue;
        };
        // `YYYY-MM-DD` or `YYYY-MM-DD.N`
        let (date, index) = match stem.split_once('.') {
            Some((date, idx)) => match idx.parse::<u32>() {
                Ok(n) => (date.to_string(), n),
                Err(_) => continue,
            },
            None => (stem.to_string(), u32::MAX),
        };
        files.push((date, index, entry.path()));
    }
    Ok(files)
}

struct ActiveFile {
    date: String,
    path: PathBuf,
    file: File,
    bytes: u64,
}

struct Writer {
    dir: PathBuf,
    max_file_bytes: u64,
    active: Option<ActiveFile>,
}

impl Writer {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<WriterMsg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                WriterMsg::Event(event) => {
                    if let Err(err) = self.append(&event).await {
                        warn!(%err, "failed to append audit event");
                    }
                },
                WriterMsg::Flush(done) => {
                    if let Some(active) = self.active.as_mut() {
                        let _ = active.file.flush().await;
                        let _ = active.file.sync_data().await;
                    }
                    let _ = done.send(());
                },
            }
        }
    }

    async fn append(&mut self, event: &AuditEvent) -> AuditResult<()> {
        let date = event.timestamp.0.format("%Y-%m-%d").to_string();
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        self.ensure_active(&date, line.len() as u64).await?;
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| AuditError::Io(std::io::Error::other("no active audit file")))?;
        active.file.write_all(line.as_bytes()).await?;
        active.file.flush().await?;
        active.bytes = active.bytes.saturating_add(line.len() as u64);
        Ok(())
    }

    /// Make sure the active file matches `date` and has room for `incoming`
    /// bytes, rotating day or size as needed.
    async fn ensure_active(&mut self, date: &str, incoming: u64) -> AuditResult<()> {
        let needs_day_roll = self.active.as_ref().is_some_and(|a| a.date != date);
        let needs_size_roll = self
            .active
            .as_ref()
            .is_some_and(|a| a.bytes.saturating_add(incoming) > self.max_file_bytes);

        if needs_day_roll {
            self.active = None;
        } else if needs_size_roll {
            // Move the full file aside under the next rotation index.
            if let Some(active) = self.active.take() {
                drop(active.file);
                let rotated = self.next_rotation_path(&active.date)?;
                tokio::fs::rename(&active.path, &rotated).await?;
            }
        }

        if self.active.is_none() {
            let path = self.dir.join(format!("{FILE_PREFIX}{date}{FILE_SUFFIX}"));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            let bytes = file.metadata().await.map(|m| m.len()).unwrap_or(0);
            self.active = Some(ActiveFile {
                date: date.to_string(),
                path,
                file,
                bytes,
            });
        }
        Ok(())
    }

    fn next_rotation_path(&self, date: &str) -> AuditResult<PathBuf> {
        let taken = enumerate_log_files(&self.dir)?;
        let next = taken
            .iter()
            .filter(|(d, idx, _)| d == date && *idx != u32::MAX)
            .map(|(_, idx, _)| idx.saturating_add(1))
            .max()
            .unwrap_or(1);
        Ok(self
            .dir
            .join(format!("{FILE_PREFIX}{date}.{next}{FILE_SUFFIX}")))
    }
}
