use std::cmp::Ordering;

use crate::types::{Result, TrieError};

/// Marker byte appended to a chunk whose key continues into deeper levels.
pub const CONTINUES: u8 = 0xFF;

/// Largest chunk size whose fill count still fits below [`CONTINUES`].
pub const MAX_CHUNK_SIZE: usize = 254;

/// How a key relates to the chunk stored under one level key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    /// The key ends in this chunk after `n` real bytes.
    Ends(usize),
    /// The key has more chunks below this one.
    Continues,
}

/// A key padded to whole chunks, with its true length kept alongside.
///
/// Ordering compares the padded chunk sequence lexicographically and breaks ties on
/// the true length, which matches plain byte order of the original keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReformedKey {
    padded: Vec<u8>,
    len: usize,
    chunksize: usize,
}

impl ReformedKey {
    /// Splits `key` into `chunksize`-byte chunks, zero-padding the tail.
    ///
    /// A zero-length key still occupies one all-padding chunk so it has a level slot.
    pub fn reform(key: &[u8], chunksize: usize) -> Self {
        debug_assert!((1..=MAX_CHUNK_SIZE).contains(&chunksize));
        let chunks = key.len().div_ceil(chunksize).max(1);
        let mut padded = Vec::with_capacity(chunks * chunksize);
        padded.extend_from_slice(key);
        padded.resize(chunks * chunksize, 0);
        Self {
            padded,
            len: key.len(),
            chunksize,
        }
    }

    /// True length of the original key.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true for the zero-length key.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The original key bytes.
    pub fn key(&self) -> &[u8] {
        &self.padded[..self.len]
    }

    /// The chunk-aligned, zero-padded bytes.
    pub fn padded(&self) -> &[u8] {
        &self.padded
    }

    /// Chunk width this key was reformed with.
    pub fn chunksize(&self) -> usize {
        self.chunksize
    }

    /// Number of chunks covering the key.
    pub fn chunk_count(&self) -> usize {
        self.padded.len() / self.chunksize
    }

    /// Chunks from the shallowest depth down.
    pub fn chunks(&self) -> std::slice::ChunksExact<'_, u8> {
        self.padded.chunks_exact(self.chunksize)
    }

    /// Chunk at `depth`.
    pub fn chunk(&self, depth: usize) -> &[u8] {
        let start = depth * self.chunksize;
        &self.padded[start..start + self.chunksize]
    }

    /// Returns true when `depth` holds the key's final chunk.
    pub fn is_last(&self, depth: usize) -> bool {
        depth + 1 == self.chunk_count()
    }

    /// Marker describing the key at `depth`.
    pub fn marker(&self, depth: usize) -> Marker {
        if self.is_last(depth) {
            Marker::Ends(self.len - depth * self.chunksize)
        } else {
            Marker::Continues
        }
    }

    /// Level-local comparison key at `depth`: the chunk followed by one marker byte.
    pub fn level_key(&self, depth: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.chunksize + 1);
        out.extend_from_slice(self.chunk(depth));
        out.push(encode_marker(self.marker(depth)));
        out
    }
}

impl Ord for ReformedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.chunks()
            .cmp(other.chunks())
            .then(self.len.cmp(&other.len))
    }
}

impl PartialOrd for ReformedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn encode_marker(marker: Marker) -> u8 {
    match marker {
        Marker::Ends(used) => used as u8,
        Marker::Continues => CONTINUES,
    }
}

/// Splits a stored level key back into its chunk and marker.
pub fn split_level_key(level_key: &[u8], chunksize: usize) -> Result<(&[u8], Marker)> {
    if level_key.len() != chunksize + 1 {
        return Err(TrieError::Invariant("level key has wrong width"));
    }
    let (chunk, marker) = level_key.split_at(chunksize);
    let marker = match marker[0] {
        CONTINUES => Marker::Continues,
        used if (used as usize) <= chunksize => Marker::Ends(used as usize),
        _ => return Err(TrieError::Invariant("level key marker out of range")),
    };
    Ok((chunk, marker))
}
