//! Disk-backed archive

use super::mappings::{read_mappings, write_mappings};
use super::{ArchiveConfig, ArchiveEntry, ArchiveEntryType, ArchiveLog, ArchiveStore, ArchivedSeries};
use crate::config::ARCHIVE_LOG_FILE;
use crate::{CollisionTable, Fingerprint, Metric, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Archive of evicted series backed by an append-only log, plus the
/// persisted collision table.
pub struct DiskArchive {
    config: ArchiveConfig,
    log: ArchiveLog,
    index: RwLock<HashMap<Fingerprint, ArchivedSeries>>,
    mappings_lock: Mutex<()>,
}

impl DiskArchive {
    /// Open the archive in `config.dir`, creating it if needed
    pub fn open(config: ArchiveConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.dir)?;

        let (log, entries) =
            ArchiveLog::open(config.dir.join(ARCHIVE_LOG_FILE), config.sync_policy)?;

        let mut index = HashMap::new();
        for entry in &entries {
            match entry.entry_type {
                ArchiveEntryType::Archive => {
                    index.insert(entry.fingerprint, entry.get_series()?);
                }
                ArchiveEntryType::Unarchive => {
                    index.remove(&entry.fingerprint);
                }
            }
        }

        info!(
            "Opened archive {:?}: {} log entries, {} archived series",
            config.dir,
            entries.len(),
            index.len()
        );

        Ok(Self {
            config,
            log,
            index: RwLock::new(index),
            mappings_lock: Mutex::new(()),
        })
    }

    /// Archive directory
    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Record a series evicted from memory
    pub fn archive_metric(
        &self,
        fp: Fingerprint,
        metric: Metric,
        first_time: i64,
        last_time: i64,
    ) -> Result<()> {
        let series = ArchivedSeries {
            metric,
            first_time,
            last_time,
        };
        let entry = ArchiveEntry::archive(fp, &series)?;

        let mut index = self.index.write();
        self.log.append(&entry)?;
        index.insert(fp, series);
        Ok(())
    }

    /// Remove a series from the archive. Returns false if it was not archived.
    pub fn unarchive_metric(&self, fp: Fingerprint) -> Result<bool> {
        let mut index = self.index.write();
        if !index.contains_key(&fp) {
            return Ok(false);
        }
        self.log.append(&ArchiveEntry::unarchive(fp))?;
        index.remove(&fp);
        Ok(true)
    }

    /// Full metadata of an archived series
    pub fn archived_series(&self, fp: Fingerprint) -> Option<ArchivedSeries> {
        self.index.read().get(&fp).cloned()
    }

    /// All archived fingerprints, sorted
    pub fn archived_fingerprints(&self) -> Vec<Fingerprint> {
        let mut fps: Vec<_> = self.index.read().keys().copied().collect();
        fps.sort();
        fps
    }

    /// Number of archived series
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Force the archive log to disk
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }
}

impl ArchiveStore for DiskArchive {
    fn archived_metric(&self, fp: Fingerprint) -> Result<Option<Metric>> {
        Ok(self.index.read().get(&fp).map(|s| s.metric.clone()))
    }

    fn load_collision_table(&self) -> Result<CollisionTable> {
        let _guard = self.mappings_lock.lock();
        let table = read_mappings(&self.config.dir)?;
        debug!("Loaded {} collision records from {:?}", table.len(), self.config.dir);
        Ok(table)
    }

    fn save_collision_table(&self, table: &CollisionTable) -> Result<()> {
        let _guard = self.mappings_lock.lock();
        write_mappings(&self.config.dir, table)
    }
}
