//! Boot snapshot binary format (§4.2): a length-prefixed dump of the
//! memory backend's entries, used to warm the in-memory tier across
//! process restarts.

use std::io;

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use ddc_core::CacheKey;
use thiserror::Error;
use tracing::warn;

/// Entries are given this many runs of grace after their last observed
/// use before a boot-snapshot load drops them (§4.2).
pub const MAX_AGE: i32 = 3;

const MAGIC_LEGACY_32BIT: u32 = 0x0cac_0ddc;
const MAGIC_64BIT: u32 = 0x0cac_1ddc;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot has wrong magic number {0:#010x}")]
    BadMagic(u32),
    #[error("snapshot trailer declares size {declared} but entries total {actual}")]
    SizeMismatch { declared: u64, actual: u64 },
    #[error("snapshot total size {actual} exceeds twice the configured cap {cap}")]
    TooLarge { actual: u64, cap: u64 },
    #[error("snapshot is truncated")]
    Truncated,
    #[error("snapshot contains an invalid cache key")]
    InvalidKey,
}

fn write_length_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    let mut len_buf = [0u8; 4];
    LittleEndian::write_u32(&mut len_buf, bytes.len() as u32);
    out.extend_from_slice(&len_buf);
    out.extend_from_slice(bytes);
}

fn read_length_prefixed<'a>(data: &'a [u8], cursor: &mut usize) -> Result<&'a [u8], SnapshotError> {
    if data.len() < *cursor + 4 {
        return Err(SnapshotError::Truncated);
    }
    let len = LittleEndian::read_u32(&data[*cursor..*cursor + 4]) as usize;
    *cursor += 4;
    if data.len() < *cursor + len {
        return Err(SnapshotError::Truncated);
    }
    let slice = &data[*cursor..*cursor + len];
    *cursor += len;
    Ok(slice)
}

/// Serialize `entries` into the §4.2 snapshot byte layout, using the
/// modern 64-bit-size magic and trailer.
pub fn encode(entries: &[(CacheKey, i32, Bytes)]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut magic_buf = [0u8; 4];
    LittleEndian::write_u32(&mut magic_buf, MAGIC_64BIT);
    out.extend_from_slice(&magic_buf);

    let mut total_payload_size: u64 = 0;
    for (key, age, payload) in entries {
        write_length_prefixed(&mut out, key.as_str().as_bytes());
        let mut age_buf = [0u8; 4];
        LittleEndian::write_i32(&mut age_buf, *age);
        out.extend_from_slice(&age_buf);
        write_length_prefixed(&mut out, payload);
        total_payload_size += payload.len() as u64;
    }

    let mut total_buf = [0u8; 8];
    LittleEndian::write_i64(&mut total_buf, total_payload_size as i64);
    out.extend_from_slice(&total_buf);
    let mut crc_buf = [0u8; 4];
    LittleEndian::write_u32(&mut crc_buf, MAGIC_64BIT);
    out.extend_from_slice(&crc_buf);

    out
}

/// Parse a snapshot byte buffer, aging every entry by one and dropping
/// any whose age reaches [`MAX_AGE`]. `max_cache_size` (bytes), if
/// given, bounds the total payload size the snapshot may declare.
pub fn decode(
    data: &[u8],
    max_cache_size: Option<u64>,
) -> Result<Vec<(CacheKey, i32, Bytes)>, SnapshotError> {
    if data.len() < 4 {
        return Err(SnapshotError::Truncated);
    }
    let magic = LittleEndian::read_u32(&data[0..4]);
    let (is_64bit, trailer_len) = match magic {
        MAGIC_64BIT => (true, 12),
        MAGIC_LEGACY_32BIT => (false, 8),
        other => return Err(SnapshotError::BadMagic(other)),
    };

    if data.len() < 4 + trailer_len {
        return Err(SnapshotError::Truncated);
    }
    let entries_end = data.len() - trailer_len;
    let trailer = &data[entries_end..];

    let (declared_total, trailer_crc) = if is_64bit {
        (
            LittleEndian::read_i64(&trailer[0..8]) as u64,
            LittleEndian::read_u32(&trailer[8..12]),
        )
    } else {
        (
            LittleEndian::read_u32(&trailer[0..4]) as u64,
            LittleEndian::read_u32(&trailer[4..8]),
        )
    };
    if trailer_crc != magic {
        return Err(SnapshotError::BadMagic(trailer_crc));
    }

    let mut cursor = 4usize;
    let mut actual_total: u64 = 0;
    let mut raw_entries = Vec::new();
    while cursor < entries_end {
        let key_bytes = read_length_prefixed(data, &mut cursor)?;
        let key_str =
            std::str::from_utf8(key_bytes).map_err(|_| SnapshotError::InvalidKey)?;
        let key = CacheKey::new(key_str).map_err(|_| SnapshotError::InvalidKey)?;

        if data.len() < cursor + 4 {
            return Err(SnapshotError::Truncated);
        }
        let age = LittleEndian::read_i32(&data[cursor..cursor + 4]);
        cursor += 4;

        let payload_bytes = read_length_prefixed(data, &mut cursor)?;
        actual_total += payload_bytes.len() as u64;
        raw_entries.push((key, age, Bytes::copy_from_slice(payload_bytes)));
    }

    if actual_total != declared_total {
        return Err(SnapshotError::SizeMismatch {
            declared: declared_total,
            actual: actual_total,
        });
    }
    if let Some(cap) = max_cache_size {
        if actual_total > cap.saturating_mul(2) {
            return Err(SnapshotError::TooLarge { actual: actual_total, cap });
        }
    }

    let mut aged = Vec::with_capacity(raw_entries.len());
    for (key, age, payload) in raw_entries {
        let new_age = age + 1;
        if new_age >= MAX_AGE {
            continue;
        }
        aged.push((key, new_age, payload));
    }
    Ok(aged)
}

/// Load a snapshot from disk, logging and returning an empty set on any
/// parse failure rather than preventing the cache from starting cold.
pub async fn load_from_path(
    path: &std::path::Path,
    max_cache_size: Option<u64>,
) -> Vec<(CacheKey, i32, Bytes)> {
    match tokio::fs::read(path).await {
        Ok(data) => match decode(&data, max_cache_size) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(?path, error = %err, "boot snapshot rejected, starting cold");
                Vec::new()
            }
        },
        Err(err) => {
            warn!(?path, error = %err, "boot snapshot could not be read, starting cold");
            Vec::new()
        }
    }
}
