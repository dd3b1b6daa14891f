//! Pak file byte layout (§4.4): entries are appended raw, with a
//! trailing index and a fixed trailer pointing back at it.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ddc_core::CacheKey;
use thiserror::Error;

/// Marks the start of the index table, and is reused as the trailer's
/// sanity check when seeking backward to find `index_offset`.
pub const INDEX_MAGIC: u32 = 0x0c7c_0ddc;

#[derive(Debug, Error)]
pub enum PakFormatError {
    #[error("pak I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("pak index has wrong magic {0:#010x}")]
    BadIndexMagic(u32),
    #[error("pak trailer has wrong magic {0:#010x}")]
    BadTrailerMagic(u32),
    #[error("pak index CRC mismatch")]
    IndexCrcMismatch,
    #[error("pak file is too short to contain a trailer")]
    Truncated,
    #[error("pak index contains an invalid cache key")]
    InvalidKey,
}

/// One entry in a pak's index table: where an entry's bytes live, how
/// large they are, and their CRC32 for corruption detection on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: CacheKey,
    pub offset: i64,
    pub size: i64,
    pub crc: u32,
}

fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    w.write_u32::<LittleEndian>(s.len() as u32)?;
    w.write_all(s.as_bytes())
}

fn read_string<R: Read>(r: &mut R) -> Result<String, PakFormatError> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| PakFormatError::InvalidKey)
}

/// Serialize the index table (without the trailer) for `entries`,
/// returning the bytes to append right after the last entry's payload.
pub fn encode_index(entries: &[IndexEntry]) -> Vec<u8> {
    let mut table = Vec::new();
    for entry in entries {
        write_string(&mut table, entry.key.as_str()).expect("writing to Vec cannot fail");
        table.write_i64::<LittleEndian>(entry.offset).unwrap();
        table.write_i64::<LittleEndian>(entry.size).unwrap();
        table.write_u32::<LittleEndian>(entry.crc).unwrap();
    }

    let mut out = Vec::with_capacity(16 + table.len());
    out.write_u32::<LittleEndian>(INDEX_MAGIC).unwrap();
    out.write_u32::<LittleEndian>(crc32fast::hash(&table)).unwrap();
    out.write_u32::<LittleEndian>(entries.len() as u32).unwrap();
    out.write_u32::<LittleEndian>(table.len() as u32).unwrap();
    out.extend_from_slice(&table);
    out
}

/// Encode the 12-byte trailer pointing back at `index_offset`.
pub fn encode_trailer(index_offset: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    out.write_u32::<LittleEndian>(INDEX_MAGIC).unwrap();
    out.write_i64::<LittleEndian>(index_offset).unwrap();
    out
}

pub const TRAILER_LEN: usize = 12;

/// Parse the trailer at the end of `file_bytes`, returning the offset
/// of the index table.
pub fn decode_trailer(file_bytes: &[u8]) -> Result<i64, PakFormatError> {
    if file_bytes.len() < TRAILER_LEN {
        return Err(PakFormatError::Truncated);
    }
    let trailer = &file_bytes[file_bytes.len() - TRAILER_LEN..];
    let mut cursor = trailer;
    let magic = cursor.read_u32::<LittleEndian>()?;
    if magic != INDEX_MAGIC {
        return Err(PakFormatError::BadTrailerMagic(magic));
    }
    Ok(cursor.read_i64::<LittleEndian>()?)
}

/// Parse the index table starting at `index_bytes` (the file slice
/// beginning at `index_offset`, not including the trailer).
pub fn decode_index(index_bytes: &[u8]) -> Result<Vec<IndexEntry>, PakFormatError> {
    let mut cursor = index_bytes;
    let magic = cursor.read_u32::<LittleEndian>()?;
    if magic != INDEX_MAGIC {
        return Err(PakFormatError::BadIndexMagic(magic));
    }
    let index_crc = cursor.read_u32::<LittleEndian>()?;
    let num_entries = cursor.read_u32::<LittleEndian>()?;
    let table_size = cursor.read_u32::<LittleEndian>()? as usize;

    if cursor.len() < table_size {
        return Err(PakFormatError::Truncated);
    }
    let table = &cursor[..table_size];
    if crc32fast::hash(table) != index_crc {
        return Err(PakFormatError::IndexCrcMismatch);
    }

    let mut table_cursor = table;
    let mut entries = Vec::with_capacity(num_entries as usize);
    for _ in 0..num_entries {
        let key_str = read_string(&mut table_cursor)?;
        let key = CacheKey::new(key_str).map_err(|_| PakFormatError::InvalidKey)?;
        let offset = table_cursor.read_i64::<LittleEndian>()?;
        let size = table_cursor.read_i64::<LittleEndian>()?;
        let crc = table_cursor.read_u32::<LittleEndian>()?;
        entries.push(IndexEntry { key, offset, size, crc });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s).unwrap()
    }

    #[test]
    fn round_trips_index_table() {
        let entries = vec![
            IndexEntry { key: key("A"), offset: 0, size: 1, crc: 111 },
            IndexEntry { key: key("B"), offset: 1, size: 2, crc: 222 },
        ];
        let encoded = encode_index(&entries);
        let decoded = decode_index(&encoded).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn rejects_corrupted_index_crc() {
        let entries = vec![IndexEntry { key: key("A"), offset: 0, size: 1, crc: 111 }];
        let mut encoded = encode_index(&entries);
        let last = encoded.len() - 1;
        encoded[last] ^= 0xff;
        assert!(matches!(decode_index(&encoded), Err(PakFormatError::IndexCrcMismatch)));
    }

    #[test]
    fn trailer_round_trips_index_offset() {
        let trailer = encode_trailer(4096);
        assert_eq!(decode_trailer(&trailer).unwrap(), 4096);
    }
}
