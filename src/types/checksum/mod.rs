#![forbid(unsafe_code)]

use crc32fast::Hasher;

/// CRC32 of a block payload, salted with the block number so misplaced blocks fail.
pub fn block_crc32(block_no: u64, payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&block_no.to_be_bytes());
    hasher.update(payload);
    hasher.finalize()
}

/// CRC32 of a document record.
///
/// Covers the three field lengths as big-endian u32s, in record order, followed by
/// the key, meta and body bytes. Callers reject fields longer than `u32::MAX`.
pub fn record_crc32(key: &[u8], meta: &[u8], body: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    for part in [key, meta, body] {
        hasher.update(&(part.len() as u32).to_be_bytes());
    }
    for part in [key, meta, body] {
        hasher.update(part);
    }
    hasher.finalize()
}
