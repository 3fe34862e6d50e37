use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{RecorderError, Result};
use crate::event::{format_entry, parse_pairs, NotificationEvent, Param, ENTRY_TERMINATOR};

/// Append-only text file shared by every [`Recorder`] in the process.
///
/// The mutex around the writer handle is the only thing that orders appends:
/// an entry is written, flushed and (optionally) synced while the lock is held.
/// The handle is opened lazily, so a bad path surfaces on the first append
/// rather than at construction.
#[derive(Debug)]
pub struct LogStore {
    path: PathBuf,
    sync: bool,
    writer: Mutex<Option<File>>,
}

impl LogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sync: true,
            writer: Mutex::new(None),
        }
    }

    /// Controls whether each append is followed by `fsync`.
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `block` as a single unit. On failure the file is truncated back
    /// to its previous length and the cached handle is dropped.
    pub fn append(&self, block: &[u8]) -> Result<()> {
        self.append_with(block, write_block)
    }

    fn append_with<F>(&self, block: &[u8], write: F) -> Result<()>
    where
        F: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    {
        let mut guard = self.lock()?;
        let mut file = match guard.take() {
            Some(file) => file,
            None => self.open()?,
        };

        let start = file
            .metadata()
            .map_err(|err| RecorderError::store(&self.path, err))?
            .len();

        let written = write(&mut file, block).and_then(|()| {
            if self.sync {
                file.sync_data()
            } else {
                Ok(())
            }
        });

        if let Err(err) = written {
            if let Err(rollback) = file.set_len(start) {
                warn!(
                    path = %self.path.display(),
                    error = %rollback,
                    "failed to roll back partial entry"
                );
            }
            warn!(path = %self.path.display(), error = %err, "log store append failed");
            return Err(RecorderError::store(&self.path, err));
        }

        *guard = Some(file);
        Ok(())
    }

    /// Reads back every complete entry in append order.
    ///
    /// A torn tail left by another process is skipped.
    pub fn replay(&self) -> Result<Vec<RecordedEntry>> {
        let _guard = self.lock()?;
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(RecorderError::store(&self.path, err)),
        };

        let entries = split_entries(&String::from_utf8_lossy(&bytes));
        let skipped = bytes.len() - complete_prefix_len(&bytes, entries.len() * 3);
        if skipped > 0 {
            warn!(
                path = %self.path.display(),
                skipped_bytes = skipped,
                "ignoring incomplete entry at end of log"
            );
        }
        Ok(entries)
    }

    pub fn len_bytes(&self) -> Result<u64> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(RecorderError::store(&self.path, err)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<File>>> {
        self.writer.lock().map_err(|_| {
            RecorderError::store(&self.path, io::Error::other("log store lock poisoned"))
        })
    }

    fn open(&self) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| RecorderError::store(&self.path, err))
    }
}

fn write_block<W: Write>(writer: &mut W, block: &[u8]) -> io::Result<()> {
    writer.write_all(block)?;
    writer.flush()
}

/// Returns the complete entries in `text`, ignoring any torn tail.
fn split_entries(text: &str) -> Vec<RecordedEntry> {
    let mut lines: Vec<&str> = text.split(ENTRY_TERMINATOR).collect();
    // Empty after a complete entry, otherwise an unterminated line.
    lines.pop();

    lines
        .chunks_exact(3)
        .map(|chunk| RecordedEntry {
            header: chunk[0].to_string(),
            query: chunk[1].to_string(),
            form: chunk[2].to_string(),
        })
        .collect()
}

/// Byte length of the file prefix that ends with the `lines`-th terminator.
fn complete_prefix_len(bytes: &[u8], lines: usize) -> usize {
    if lines == 0 {
        return 0;
    }
    let terminator = ENTRY_TERMINATOR.as_bytes();
    bytes
        .windows(terminator.len())
        .enumerate()
        .filter(|(_, window)| *window == terminator)
        .nth(lines - 1)
        .map_or(0, |(offset, _)| offset + terminator.len())
}

/// One block read back from the log, as raw lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedEntry {
    pub header: String,
    pub query: String,
    pub form: String,
}

impl RecordedEntry {
    /// Header is `<timestamp> <origin>`; the origin may be empty.
    pub fn timestamp(&self) -> &str {
        self.header
            .split_once(' ')
            .map_or(self.header.as_str(), |(timestamp, _)| timestamp)
    }

    pub fn origin(&self) -> &str {
        self.header
            .split_once(' ')
            .map_or("", |(_, origin)| origin)
    }

    pub fn query_pairs(&self) -> Vec<Param> {
        parse_pairs(&self.query)
    }

    pub fn form_pairs(&self) -> Vec<Param> {
        parse_pairs(&self.form)
    }
}

/// Persists notification events to a shared [`LogStore`].
#[derive(Debug, Clone)]
pub struct Recorder {
    store: Arc<LogStore>,
}

impl Recorder {
    pub fn new(store: Arc<LogStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<LogStore> {
        &self.store
    }

    /// Appends `event` to the store. Errors are returned as is, never retried.
    pub fn record(&self, event: NotificationEvent) -> Result<()> {
        let block = format_entry(&event);
        self.store.append(block.as_bytes())?;
        debug!(
            origin = %event.origin_address,
            bytes = block.len(),
            "notification recorded"
        );
        Ok(())
    }
}
