//! Archive of evicted series
//!
//! Series evicted from memory keep their metric on disk so that a later
//! sample for the same fingerprint can be matched against it. The archive is
//! also where the mapper persists its collision table.

mod disk;
mod entry;
mod log;
mod mappings;

pub use disk::DiskArchive;
pub use entry::{ArchiveEntry, ArchiveEntryType, ArchivedSeries};
pub use log::ArchiveLog;
pub use mappings::{decode_mappings, encode_mappings};

use crate::{CollisionTable, Fingerprint, Metric, Result, StorageError};
use std::path::PathBuf;
use std::sync::Arc;

/// Durable storage consulted by the mapper
pub trait ArchiveStore: Send + Sync {
    /// Metric of the archived series at `fp`, if any
    fn archived_metric(&self, fp: Fingerprint) -> Result<Option<Metric>>;

    /// Read every persisted collision record
    fn load_collision_table(&self) -> Result<CollisionTable>;

    /// Durably replace the persisted collision table
    fn save_collision_table(&self, table: &CollisionTable) -> Result<()>;
}

impl<T: ArchiveStore + ?Sized> ArchiveStore for Arc<T> {
    fn archived_metric(&self, fp: Fingerprint) -> Result<Option<Metric>> {
        (**self).archived_metric(fp)
    }

    fn load_collision_table(&self) -> Result<CollisionTable> {
        (**self).load_collision_table()
    }

    fn save_collision_table(&self, table: &CollisionTable) -> Result<()> {
        (**self).save_collision_table(table)
    }
}

/// Convert a length into an on-disk `u32` length field
pub(crate) fn checked_len(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        StorageError::InvalidFormat(format!("{} length {} exceeds u32 field", what, len))
    })
}

/// Archive log sync policy.
///
/// Only governs the archived metric log. Collision table rewrites are
/// always synced.
#[derive(Debug, Clone, Copy, Default)]
pub enum SyncPolicy {
    /// Sync after every write (safest, slowest)
    #[default]
    Immediate,
    /// Sync after N writes
    EveryN(usize),
    /// Never sync (OS decides)
    None,
}

/// Archive configuration
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Directory holding the archive log and collision table
    pub dir: PathBuf,
    /// Sync policy for the archive log
    pub sync_policy: SyncPolicy,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/archive"),
            sync_policy: SyncPolicy::default(),
        }
    }
}

impl ArchiveConfig {
    /// Configuration rooted at `dir` with default settings
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_len() {
        assert_eq!(checked_len(17, "frame").unwrap(), 17);
        assert_eq!(checked_len(u32::MAX as usize, "frame").unwrap(), u32::MAX);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_checked_len_overflow() {
        let err = checked_len(u32::MAX as usize + 1, "payload").unwrap_err();
        assert!(matches!(err, StorageError::InvalidFormat(_)));
    }
}
