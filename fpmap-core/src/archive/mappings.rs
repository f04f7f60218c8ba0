//! Persisted collision table file
//!
//! Format:
//! - 4 bytes: magic `FPMP`
//! - 4 bytes: format version
//! - 4 bytes: payload length
//! - N bytes: payload (bincode list of records, in allocation order)
//! - 4 bytes: CRC32 of everything before it
//!
//! The file is only ever replaced whole: the new table is written to a temp
//! file, synced, and renamed over the old one.

use super::checked_len;
use crate::config::{MAPPINGS_FILE, MAPPINGS_FORMAT_VERSION, MAPPINGS_TEMP_FILE};
use crate::{CollisionRecord, CollisionTable, Result, StorageError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

const MAGIC: &[u8; 4] = b"FPMP";
const HEADER_SIZE: usize = 12;

/// Encode a collision table into its file representation
pub fn encode_mappings(table: &CollisionTable) -> Result<Bytes> {
    let payload = bincode::serialize(&table.records_by_mapped())?;
    let payload_len = checked_len(payload.len(), "Mappings payload")?;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len() + 4);
    buf.put_slice(MAGIC);
    buf.put_u32_le(MAPPINGS_FORMAT_VERSION);
    buf.put_u32_le(payload_len);
    buf.put_slice(&payload);

    let checksum = crc32fast::hash(&buf);
    buf.put_u32_le(checksum);

    Ok(buf.freeze())
}

/// Decode and validate a collision table file
pub fn decode_mappings(data: &[u8]) -> Result<CollisionTable> {
    if data.len() < HEADER_SIZE + 4 {
        return Err(StorageError::InvalidFormat(format!(
            "Mappings file too short: {} bytes",
            data.len()
        )));
    }

    let (body, mut trailer) = data.split_at(data.len() - 4);
    let expected = trailer.get_u32_le();
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(StorageError::ChecksumMismatch { expected, actual });
    }

    let mut cursor = body;
    if &cursor[..4] != MAGIC {
        return Err(StorageError::InvalidFormat("Bad mappings file magic".into()));
    }
    cursor.advance(4);

    let version = cursor.get_u32_le();
    if version != MAPPINGS_FORMAT_VERSION {
        return Err(StorageError::InvalidFormat(format!(
            "Unsupported mappings format version: {}",
            version
        )));
    }

    let payload_len = cursor.get_u32_le() as usize;
    if payload_len != cursor.remaining() {
        return Err(StorageError::Corruption(format!(
            "Mappings payload length {} does not match file ({} bytes left)",
            payload_len,
            cursor.remaining()
        )));
    }

    let records: Vec<CollisionRecord> = bincode::deserialize(cursor)?;
    CollisionTable::from_records(records)
}

/// Read the collision table from `dir`. A missing file is an empty table.
pub(crate) fn read_mappings(dir: &Path) -> Result<CollisionTable> {
    match fs::read(dir.join(MAPPINGS_FILE)) {
        Ok(data) => decode_mappings(&data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CollisionTable::new()),
        Err(e) => Err(e.into()),
    }
}

/// Atomically replace the collision table in `dir`
pub(crate) fn write_mappings(dir: &Path, table: &CollisionTable) -> Result<()> {
    let encoded = encode_mappings(table)?;
    let temp_path = dir.join(MAPPINGS_TEMP_FILE);

    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(&encoded)?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, dir.join(MAPPINGS_FILE))?;
    sync_dir(dir)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
