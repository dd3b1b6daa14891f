//! Wire format for a rollup's synthetic payload (§4.6): one blob holding
//! every member's key and payload, so a single get can satisfy a whole
//! batch. Byte-swap detected on read, mirroring the boot snapshot's
//! magic-check idiom, in case a bundle was produced by a writer using
//! the opposite endianness.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use ddc_core::CacheKey;

const MAGIC: u32 = 0x0b01_0ddc;

/// Serialize `members` (key, payload pairs, in rollup order) into a
/// bundle blob.
pub fn encode(members: &[(CacheKey, bytes::Bytes)]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf4 = [0u8; 4];

    LittleEndian::write_u32(&mut buf4, MAGIC);
    out.extend_from_slice(&buf4);
    LittleEndian::write_u32(&mut buf4, members.len() as u32);
    out.extend_from_slice(&buf4);

    for (key, payload) in members {
        LittleEndian::write_u32(&mut buf4, key.len() as u32);
        out.extend_from_slice(&buf4);
        out.extend_from_slice(key.as_str().as_bytes());
        LittleEndian::write_u32(&mut buf4, payload.len() as u32);
        out.extend_from_slice(&buf4);
        out.extend_from_slice(payload);
    }
    out
}

/// Parse a bundle blob, validating it against `expected_keys` in order.
/// Returns `None` on any mismatch: bad magic, wrong count, a key out of
/// order, or an empty embedded payload.
pub fn decode(bytes: &[u8], expected_keys: &[CacheKey]) -> Option<Vec<bytes::Bytes>> {
    if bytes.len() < 8 {
        return None;
    }
    let raw_magic = LittleEndian::read_u32(&bytes[0..4]);
    let swapped = raw_magic != MAGIC && raw_magic.swap_bytes() == MAGIC;
    if raw_magic != MAGIC && !swapped {
        return None;
    }

    let read_u32 = |b: &[u8]| -> u32 {
        if swapped { BigEndian::read_u32(b) } else { LittleEndian::read_u32(b) }
    };

    let count = read_u32(&bytes[4..8]) as usize;
    if count != expected_keys.len() {
        return None;
    }

    let mut offset = 8;
    let mut payloads = Vec::with_capacity(count);
    for expected_key in expected_keys {
        if offset + 4 > bytes.len() {
            return None;
        }
        let key_len = read_u32(&bytes[offset..offset + 4]) as usize;
        offset += 4;
        if offset + key_len > bytes.len() {
            return None;
        }
        let key_str = std::str::from_utf8(&bytes[offset..offset + key_len]).ok()?;
        if key_str != expected_key.as_str() {
            return None;
        }
        offset += key_len;

        if offset + 4 > bytes.len() {
            return None;
        }
        let payload_len = read_u32(&bytes[offset..offset + 4]) as usize;
        offset += 4;
        if payload_len == 0 || offset + payload_len > bytes.len() {
            return None;
        }
        payloads.push(bytes::Bytes::copy_from_slice(&bytes[offset..offset + payload_len]));
        offset += payload_len;
    }

    Some(payloads)
}
