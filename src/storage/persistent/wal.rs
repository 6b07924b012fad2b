//! Write-ahead log for alias mutations.
//!
//! Each logical mutation (one save, one delete) is a single entry holding all
//! of its row changes, so replay never applies half a mutation.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [ENTRY 1: codec-encoded WalEntry]
//! [ENTRY 2: codec-encoded WalEntry]
//! ...
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Error as IoError, ErrorKind, Result as IoResult, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::codec;
use crate::storage::tables::TableChange;

/// A single entry in the write-ahead log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct WalEntry {
    /// Monotonically increasing sequence number.
    pub sequence: u64,
    /// When this entry was written.
    pub timestamp: DateTime<Utc>,
    /// The logged operation.
    pub kind: WalEntryKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum WalEntryKind {
    /// Row changes of one mutation, applied together.
    Batch(Vec<TableChange>),
    /// Everything up to this sequence is in the snapshot.
    Checkpoint { up_to_sequence: u64 },
}

struct WalWriter {
    writer: BufWriter<File>,
    sequence: u64,
}

/// Append-only log. Thread-safe via an internal mutex.
pub(crate) struct WriteAheadLog {
    path: PathBuf,
    inner: Mutex<WalWriter>,
    sync_on_write: bool,
}

impl WriteAheadLog {
    /// Open or create a log file.
    ///
    /// An existing file is scanned for its last readable sequence; a new one
    /// gets the header.
    pub fn open(path: &Path, sync_on_write: bool) -> IoResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        let sequence = if file.metadata()?.len() >= codec::HEADER_LEN {
            Self::find_last_sequence(path)?
        } else {
            file.set_len(0)?;
            codec::write_header(&mut file)?;
            if sync_on_write {
                file.sync_all()?;
            }
            0
        };

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(WalWriter {
                writer: BufWriter::new(file),
                sequence,
            }),
            sync_on_write,
        })
    }

    /// Append an entry, returning its sequence number.
    pub fn append(&self, kind: WalEntryKind) -> IoResult<u64> {
        let mut inner = self.lock()?;
        let candidate = inner.sequence + 1;
        let entry = WalEntry {
            sequence: candidate,
            timestamp: Utc::now(),
            kind,
        };
        let encoded = codec::encode(&entry)?;

        inner.writer.write_all(&encoded)?;
        inner.writer.flush()?;
        if self.sync_on_write {
            inner.writer.get_ref().sync_all()?;
        }
        inner.sequence = candidate;
        Ok(candidate)
    }

    /// Iterate over entries from the start of the file.
    pub fn entries(&self) -> IoResult<WalIterator> {
        WalIterator::new(&self.path)
    }

    pub fn current_sequence(&self) -> IoResult<u64> {
        Ok(self.lock()?.sequence)
    }

    pub fn size_bytes(&self) -> IoResult<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Drop every entry and reset the sequence.
    ///
    /// Call only after the state the entries describe is in a snapshot.
    pub fn truncate(&self) -> IoResult<()> {
        let mut inner = self.lock()?;
        inner.writer.flush()?;
        let file = inner.writer.get_mut();
        file.set_len(0)?;
        codec::write_header(file)?;
        if self.sync_on_write {
            file.sync_all()?;
        }
        inner.sequence = 0;
        Ok(())
    }

    fn lock(&self) -> IoResult<MutexGuard<'_, WalWriter>> {
        self.inner
            .lock()
            .map_err(|_| IoError::other("poisoned lock: wal"))
    }

    fn find_last_sequence(path: &Path) -> IoResult<u64> {
        let mut last = 0;
        for entry in WalIterator::new(path)? {
            match entry {
                Ok(entry) => last = entry.sequence,
                Err(e) => {
                    tracing::warn!(after = last, error = %e, "wal corruption detected");
                    break;
                }
            }
        }
        Ok(last)
    }
}

/// Iterator over log entries. A frame cut short ends iteration.
pub(crate) struct WalIterator {
    reader: BufReader<File>,
    file_size: u64,
}

impl WalIterator {
    fn new(path: &Path) -> IoResult<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        codec::read_header(&mut reader)?;
        Ok(Self { reader, file_size })
    }

    fn at_eof(&mut self) -> IoResult<bool> {
        Ok(self.reader.stream_position()? >= self.file_size)
    }
}

impl Iterator for WalIterator {
    type Item = IoResult<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.at_eof() {
            Ok(true) => return None,
            Ok(false) => {}
            Err(e) => return Some(Err(e)),
        }

        match codec::decode(&mut self.reader) {
            Ok(entry) => Some(Ok(entry)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => None,
            Err(e) => Some(Err(e)),
        }
    }
}
