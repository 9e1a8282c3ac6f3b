use crate::types::{LevelRef, Result, TrieError};

use super::key::Marker;

/// Tag byte for an entry carrying the caller's value.
pub const TAG_TERMINAL: u8 = 0x01;
/// Tag byte for an entry pointing at a nested level.
pub const TAG_SUBLEVEL: u8 = 0x02;

const LEVEL_REF_LEN: usize = 8;

/// Decoded level entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entry {
    /// The caller's fixed-size value.
    Terminal(Vec<u8>),
    /// Reference to the level one chunk deeper.
    SubLevel(LevelRef),
}

impl Entry {
    /// Encodes the entry as tag byte plus payload.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Entry::Terminal(value) => {
                let mut out = Vec::with_capacity(1 + value.len());
                out.push(TAG_TERMINAL);
                out.extend_from_slice(value);
                out
            }
            Entry::SubLevel(level) => {
                let mut out = Vec::with_capacity(1 + LEVEL_REF_LEN);
                out.push(TAG_SUBLEVEL);
                out.extend_from_slice(&level.to_be_bytes());
                out
            }
        }
    }

    /// Decodes an entry, checking its shape against `valuelen` and the marker it is stored under.
    pub fn decode(bytes: &[u8], valuelen: usize, marker: Marker) -> Result<Self> {
        let (&tag, payload) = bytes
            .split_first()
            .ok_or(TrieError::Invariant("empty level entry"))?;
        match tag {
            TAG_TERMINAL => {
                if payload.len() != valuelen {
                    return Err(TrieError::Invariant("terminal entry has wrong value width"));
                }
                Ok(Entry::Terminal(payload.to_vec()))
            }
            TAG_SUBLEVEL => {
                if matches!(marker, Marker::Ends(_)) {
                    return Err(TrieError::Invariant(
                        "sub-level pointer stored under a key-ending chunk",
                    ));
                }
                let raw: [u8; LEVEL_REF_LEN] = payload
                    .try_into()
                    .map_err(|_| TrieError::Invariant("sub-level pointer has wrong width"))?;
                Ok(Entry::SubLevel(LevelRef::from_be_bytes(raw)))
            }
            _ => Err(TrieError::Invariant("unknown level entry tag")),
        }
    }

    /// Encoded width of the widest entry for `valuelen`-byte values.
    pub fn max_encoded_len(valuelen: usize) -> usize {
        1 + valuelen.max(LEVEL_REF_LEN)
    }
}
