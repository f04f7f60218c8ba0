//! fpmap Core - Fingerprint Collision Mapping for Time-Series Storage
//!
//! Every series is addressed by a 64-bit fingerprint hashed from its label
//! set. Hashes collide, so before a fingerprint is used to address a series
//! it is routed through the [`FingerprintMapper`], which hands out a
//! permanent, disambiguating fingerprint whenever the candidate is already
//! claimed by a different metric.
//!
//! # Architecture
//!
//! - **Series map**: in-memory index of live series by fingerprint
//! - **Archive**: on-disk record of evicted series plus the persisted
//!   collision table
//! - **Mapper**: resolves candidate fingerprints against both, allocating
//!   mapped fingerprints from the reserved low band

pub mod archive;
pub mod directory;
pub mod mapper;

mod collision;
mod error;
mod types;

pub use collision::{CollisionRecord, CollisionTable};
pub use directory::{MemorySeries, SeriesDirectory, SeriesMap};
pub use error::{Result, StorageError};
pub use mapper::FingerprintMapper;
pub use types::*;

/// fpmap version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// Upper bound of the reserved band for mapped fingerprints (about 1M)
    pub const MAX_MAPPED_FP: u64 = 1 << 20;

    /// Archived metric log file name
    pub const ARCHIVE_LOG_FILE: &str = "archived_metrics.log";

    /// Collision table file name
    pub const MAPPINGS_FILE: &str = "mappings.db";

    /// Temporary file used while rewriting the collision table
    pub const MAPPINGS_TEMP_FILE: &str = "mappings.db.tmp";

    /// Collision table file format version
    pub const MAPPINGS_FORMAT_VERSION: u32 = 1;
}
