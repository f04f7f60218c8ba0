//! Fingerprint collision mapper
//!
//! Two different metrics can hash to the same fingerprint. The mapper sits
//! between fingerprint computation and every use of the fingerprint: when the
//! candidate is already occupied by another metric, the newcomer gets a
//! mapped fingerprint from the reserved low band instead. Mappings are
//! permanent and persisted through the archive before they are handed out.

use crate::archive::ArchiveStore;
use crate::config::MAX_MAPPED_FP;
use crate::directory::SeriesDirectory;
use crate::{CollisionTable, Fingerprint, Metric, Result};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Resolves candidate fingerprints to the fingerprint a metric is stored under
pub struct FingerprintMapper<D, A> {
    directory: D,
    archive: A,
    state: Mutex<MapperState>,
}

struct MapperState {
    /// Last mapped fingerprint handed out
    highest_mapped: u64,
    cache: CollisionTable,
}

/// Who currently holds a fingerprint
enum Occupancy {
    Vacant,
    Same,
    Other,
}

impl<D: SeriesDirectory, A: ArchiveStore> FingerprintMapper<D, A> {
    /// Create a mapper, loading every persisted mapping from the archive
    pub fn new(directory: D, archive: A) -> Result<Self> {
        let cache = archive.load_collision_table()?;
        cache.validate()?;
        let highest_mapped = cache.highest_mapped().0;

        debug!(
            "Loaded {} fingerprint mappings, highest mapped fingerprint {}",
            cache.len(),
            Fingerprint(highest_mapped)
        );

        Ok(Self {
            directory,
            archive,
            state: Mutex::new(MapperState {
                highest_mapped,
                cache,
            }),
        })
    }

    /// Return the fingerprint `metric` must be stored under, given that it
    /// hashed to `fp`.
    ///
    /// Returns `fp` itself unless a different metric already occupies it (live
    /// or archived), in which case the existing mapping for `(fp, metric)` is
    /// returned or a new one is allocated and persisted.
    pub fn resolve(&self, fp: Fingerprint, metric: &Metric) -> Result<Fingerprint> {
        let mut state = self.state.lock();

        match self.occupancy(fp, metric)? {
            Occupancy::Same => Ok(fp),
            Occupancy::Other => {
                if let Some(mapped) = state.cache.get(fp, metric) {
                    return Ok(mapped);
                }
                self.add_mapping(&mut state, fp, metric)
            }
            // Nobody holds fp right now, but the metric may have been mapped
            // away from it while its first claimant was around.
            Occupancy::Vacant => Ok(state.cache.get(fp, metric).unwrap_or(fp)),
        }
    }

    /// Highest mapped fingerprint allocated so far, 0 if none
    pub fn highest_mapped(&self) -> Fingerprint {
        Fingerprint(self.state.lock().highest_mapped)
    }

    /// Number of mappings
    pub fn mapping_count(&self) -> usize {
        self.state.lock().cache.len()
    }

    /// Snapshot of all mappings
    pub fn mappings(&self) -> CollisionTable {
        self.state.lock().cache.clone()
    }

    /// Archive store
    pub fn archive(&self) -> &A {
        &self.archive
    }

    fn occupancy(&self, fp: Fingerprint, metric: &Metric) -> Result<Occupancy> {
        let live = self.directory.get(fp);
        if live.as_ref() == Some(metric) {
            return Ok(Occupancy::Same);
        }

        match self.archive.archived_metric(fp)? {
            Some(archived) if archived == *metric => Ok(Occupancy::Same),
            Some(_) => Ok(Occupancy::Other),
            None if live.is_some() => Ok(Occupancy::Other),
            None => Ok(Occupancy::Vacant),
        }
    }

    fn add_mapping(
        &self,
        state: &mut MapperState,
        fp: Fingerprint,
        metric: &Metric,
    ) -> Result<Fingerprint> {
        let mapped = Fingerprint(state.highest_mapped + 1);
        if mapped.0 > MAX_MAPPED_FP {
            warn!(
                "Mapped fingerprint {} is beyond the reserved band (max {})",
                mapped,
                Fingerprint(MAX_MAPPED_FP)
            );
        }

        let mut next = state.cache.clone();
        next.insert(fp, metric.clone(), mapped);
        self.archive.save_collision_table(&next)?;

        state.cache = next;
        state.highest_mapped = mapped.0;

        info!(
            "Collision detected for fingerprint {}, metric {}; mapping to new fingerprint {}",
            fp, metric, mapped
        );

        Ok(mapped)
    }
}
