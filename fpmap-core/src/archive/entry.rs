//! Archive log entry types and serialization

use super::checked_len;
use crate::{Fingerprint, Metric, Result, StorageError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Bytes of a frame after the length prefix, excluding the payload:
/// type (1) + fingerprint (8) + payload length (4) + checksum (4)
const FRAME_OVERHEAD: usize = 17;

/// Archive log entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ArchiveEntryType {
    /// Series evicted to the archive
    Archive = 1,
    /// Series removed from the archive
    Unarchive = 2,
}

impl TryFrom<u8> for ArchiveEntryType {
    type Error = StorageError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(ArchiveEntryType::Archive),
            2 => Ok(ArchiveEntryType::Unarchive),
            _ => Err(StorageError::InvalidFormat(format!(
                "Invalid archive entry type: {}",
                value
            ))),
        }
    }
}

/// Metadata kept for an archived series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedSeries {
    pub metric: Metric,
    /// Timestamp of the first sample, nanoseconds
    pub first_time: i64,
    /// Timestamp of the last sample, nanoseconds
    pub last_time: i64,
}

/// A single archive log entry
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub entry_type: ArchiveEntryType,
    pub fingerprint: Fingerprint,
    /// Serialized [`ArchivedSeries`] for archive entries, empty for tombstones
    pub payload: Vec<u8>,
}

impl ArchiveEntry {
    /// Create an entry recording an archived series
    pub fn archive(fingerprint: Fingerprint, series: &ArchivedSeries) -> Result<Self> {
        Ok(Self {
            entry_type: ArchiveEntryType::Archive,
            fingerprint,
            payload: bincode::serialize(series)?,
        })
    }

    /// Create a tombstone for a previously archived series
    pub fn unarchive(fingerprint: Fingerprint) -> Self {
        Self {
            entry_type: ArchiveEntryType::Unarchive,
            fingerprint,
            payload: vec![],
        }
    }

    /// Serialize the entry with length prefix and CRC checksum
    ///
    /// Format:
    /// - 4 bytes: entry length (excluding this field)
    /// - 1 byte: entry type
    /// - 8 bytes: fingerprint
    /// - 4 bytes: payload length
    /// - N bytes: payload
    /// - 4 bytes: CRC32 checksum
    pub fn serialize_with_checksum(&self) -> Result<Bytes> {
        let payload_len = checked_len(self.payload.len(), "Archive payload")?;
        let frame_len = checked_len(
            self.payload.len().saturating_add(FRAME_OVERHEAD),
            "Archive entry",
        )?;

        let mut buf = BytesMut::with_capacity(4 + FRAME_OVERHEAD + self.payload.len());

        buf.put_u32_le(frame_len);
        buf.put_u8(self.entry_type as u8);
        buf.put_u64_le(self.fingerprint.0);
        buf.put_u32_le(payload_len);
        buf.put_slice(&self.payload);

        let checksum = crc32fast::hash(&buf[4..]);
        buf.put_u32_le(checksum);

        Ok(buf.freeze())
    }

    /// Total size of the frame at the front of `data`, read from its length
    /// prefix. `None` if the prefix is missing or too small to be a frame.
    pub(crate) fn frame_len(data: &[u8]) -> Option<usize> {
        if data.len() < 4 {
            return None;
        }
        let len = (&data[..4]).get_u32_le() as usize;
        (len >= FRAME_OVERHEAD).then_some(4 + len)
    }

    /// Deserialize an entry from the front of `data`, validating its checksum.
    ///
    /// Returns `Ok(None)` when `data` ends before the frame does, which is
    /// what a write interrupted by a crash leaves behind.
    pub fn deserialize_with_checksum(data: &[u8]) -> Result<Option<(Self, usize)>> {
        if data.len() < 4 {
            return Ok(None);
        }

        let len = (&data[..4]).get_u32_le() as usize;
        if len < FRAME_OVERHEAD {
            return Err(StorageError::InvalidFormat(format!(
                "Archive entry length {} below minimum",
                len
            )));
        }
        if data.len() < 4 + len {
            return Ok(None);
        }

        let entry_data = &data[4..4 + len];
        let (body, mut trailer) = entry_data.split_at(len - 4);

        let expected = trailer.get_u32_le();
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(StorageError::ChecksumMismatch { expected, actual });
        }

        let mut cursor = body;
        let entry_type = ArchiveEntryType::try_from(cursor.get_u8())?;
        let fingerprint = Fingerprint(cursor.get_u64_le());
        let payload_len = cursor.get_u32_le() as usize;
        if payload_len != cursor.remaining() {
            return Err(StorageError::InvalidFormat(format!(
                "Archive payload length {} does not match frame ({} bytes left)",
                payload_len,
                cursor.remaining()
            )));
        }

        let entry = ArchiveEntry {
            entry_type,
            fingerprint,
            payload: cursor.to_vec(),
        };

        Ok(Some((entry, 4 + len)))
    }

    /// Get the series from an archive entry
    pub fn get_series(&self) -> Result<ArchivedSeries> {
        if self.entry_type != ArchiveEntryType::Archive {
            return Err(StorageError::InvalidFormat("Not an archive entry".into()));
        }
        Ok(bincode::deserialize(&self.payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> ArchivedSeries {
        ArchivedSeries {
            metric: Metric::new().with_label("job", "api"),
            first_time: 1_000,
            last_time: 9_000,
        }
    }

    #[test]
    fn test_entry_serialization() {
        let entry = ArchiveEntry::archive(Fingerprint(42), &series()).unwrap();
        let serialized = entry.serialize_with_checksum().unwrap();

        let (decoded, len) = ArchiveEntry::deserialize_with_checksum(&serialized)
            .unwrap()
            .unwrap();
        assert_eq!(len, serialized.len());
        assert_eq!(decoded, entry);
        assert_eq!(decoded.get_series().unwrap(), series());

        let tombstone = ArchiveEntry::unarchive(Fingerprint(42));
        assert!(tombstone.get_series().is_err());
    }

    #[test]
    fn test_checksum_validation() {
        let entry = ArchiveEntry::archive(Fingerprint(7), &series()).unwrap();
        let mut serialized = entry.serialize_with_checksum().unwrap().to_vec();

        // Corrupt the fingerprint
        serialized[6] ^= 0xFF;

        let result = ArchiveEntry::deserialize_with_checksum(&serialized);
        assert!(matches!(result, Err(StorageError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_torn_entry() {
        let entry = ArchiveEntry::unarchive(Fingerprint(7));
        let serialized = entry.serialize_with_checksum().unwrap();

        for cut in [0, 3, 10, serialized.len() - 1] {
            let result = ArchiveEntry::deserialize_with_checksum(&serialized[..cut]).unwrap();
            assert!(result.is_none(), "cut at {} should be incomplete", cut);
        }
    }

    #[test]
    fn test_frame_len() {
        let serialized = ArchiveEntry::unarchive(Fingerprint(7))
            .serialize_with_checksum()
            .unwrap();
        assert_eq!(ArchiveEntry::frame_len(&serialized), Some(serialized.len()));
        assert_eq!(serialized.len(), 4 + FRAME_OVERHEAD);
        assert_eq!(ArchiveEntry::frame_len(&serialized[..3]), None);
        assert_eq!(ArchiveEntry::frame_len(&[5, 0, 0, 0, 1]), None);
    }
}
