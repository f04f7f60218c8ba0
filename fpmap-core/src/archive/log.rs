//! Append-only archive log with replay

use super::{ArchiveEntry, SyncPolicy};
use crate::{Result, StorageError};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Appends archive entries to a single log file
pub struct ArchiveLog {
    sync_policy: SyncPolicy,
    inner: Mutex<ArchiveLogInner>,
}

struct ArchiveLogInner {
    file: BufWriter<File>,
    writes_since_sync: usize,
}

impl ArchiveLog {
    /// Replay the log at `path`, then open it for appending.
    ///
    /// Only the last frame may be cut off: a torn write or a failing final
    /// frame is truncated so that new entries follow the last valid one.
    /// Damaged frames earlier in the file are skipped and left in place.
    pub fn open(
        path: impl Into<PathBuf>,
        sync_policy: SyncPolicy,
    ) -> Result<(Self, Vec<ArchiveEntry>)> {
        let path = path.into();
        let (entries, valid_len) = Self::replay(&path)?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            warn!(
                "Truncating archive log {:?} from {} to {} bytes",
                path, file_len, valid_len
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        drop(file);

        let file = OpenOptions::new().append(true).open(&path)?;

        let log = Self {
            sync_policy,
            inner: Mutex::new(ArchiveLogInner {
                file: BufWriter::new(file),
                writes_since_sync: 0,
            }),
        };

        Ok((log, entries))
    }

    /// Append an entry to the log
    pub fn append(&self, entry: &ArchiveEntry) -> Result<()> {
        let serialized = entry.serialize_with_checksum()?;
        let mut inner = self.inner.lock();

        inner.file.write_all(&serialized)?;
        inner.writes_since_sync += 1;

        if self.should_sync(&inner) {
            Self::sync_inner(&mut inner)?;
        } else {
            inner.file.flush()?;
        }

        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::sync_inner(&mut inner)
    }

    fn sync_inner(inner: &mut ArchiveLogInner) -> Result<()> {
        inner.file.flush()?;
        inner.file.get_ref().sync_all()?;
        inner.writes_since_sync = 0;
        Ok(())
    }

    fn should_sync(&self, inner: &ArchiveLogInner) -> bool {
        match self.sync_policy {
            SyncPolicy::Immediate => true,
            SyncPolicy::EveryN(n) => inner.writes_since_sync >= n,
            SyncPolicy::None => false,
        }
    }

    /// Read every valid entry in the log, returning them together with the
    /// length the file should keep.
    fn replay(path: &Path) -> Result<(Vec<ArchiveEntry>, u64)> {
        let mut data = Vec::new();
        match File::open(path) {
            Ok(mut file) => {
                file.read_to_end(&mut data)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e.into()),
        }

        let mut entries = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            match ArchiveEntry::deserialize_with_checksum(&data[offset..]) {
                Ok(Some((entry, bytes_read))) => {
                    entries.push(entry);
                    offset += bytes_read;
                }
                Ok(None) => {
                    // Incomplete entry at end (crash during write)
                    break;
                }
                Err(e @ StorageError::ChecksumMismatch { .. })
                | Err(e @ StorageError::InvalidFormat(_)) => {
                    let frame_end = match ArchiveEntry::frame_len(&data[offset..]) {
                        Some(len) => offset + len,
                        None => {
                            return Err(StorageError::Corruption(format!(
                                "{} at offset {} in {:?}: frame length unusable",
                                e, offset, path
                            )))
                        }
                    };

                    if frame_end >= data.len() {
                        warn!("{} in last frame at offset {} in {:?}, truncating", e, offset, path);
                        break;
                    }

                    warn!("{} at offset {} in {:?}, skipping frame", e, offset, path);
                    offset = frame_end;
                }
                Err(e) => return Err(e),
            }
        }

        Ok((entries, offset as u64))
    }
}
