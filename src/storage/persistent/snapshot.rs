//! Compacted table snapshots.
//!
//! A snapshot is written to a temporary file, fsynced, then renamed over the
//! previous one, so readers only ever see a complete snapshot.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte][codec-encoded AliasTables]
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Result as IoResult, Write};
use std::path::Path;

use super::codec;
use crate::storage::tables::AliasTables;

/// Read the snapshot at `path`. A missing file yields empty tables.
pub(crate) fn read(path: &Path) -> IoResult<AliasTables> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(AliasTables::default()),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    codec::read_header(&mut reader)?;
    codec::decode(&mut reader)
}

/// Atomically replace the snapshot at `path` with `tables`.
pub(crate) fn write(path: &Path, tables: &AliasTables) -> IoResult<()> {
    let temp_path = path.with_extension("snap.tmp");
    let result = write_temp(&temp_path, tables).and_then(|()| fs::rename(&temp_path, path));
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_temp(temp_path: &Path, tables: &AliasTables) -> IoResult<()> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp_path)?;
    let mut writer = BufWriter::new(file);
    codec::write_header(&mut writer)?;
    writer.write_all(&codec::encode(tables)?)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}
