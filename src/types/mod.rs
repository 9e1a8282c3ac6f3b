#![forbid(unsafe_code)]
//! Shared identifiers, error type and checksum helpers.

use std::fmt;

/// CRC32 helpers for blocks and document records.
pub mod checksum;

pub use checksum::{block_crc32, record_crc32};

/// Reference to one level instance handed out by a level store.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct LevelRef(pub u64);

impl LevelRef {
    /// Sentinel used by default for "no level": the trie is empty.
    pub const NONE: LevelRef = LevelRef(u64::MAX);

    /// Encodes the reference as 8 big-endian bytes.
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Decodes a reference from 8 big-endian bytes.
    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        LevelRef(u64::from_be_bytes(bytes))
    }
}

/// Identifier of a fixed-size block inside a block file.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct BlockId(pub u64);

/// Byte offset of a record inside the document log.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct DocOffset(pub u64);

impl DocOffset {
    /// Width of an encoded offset when stored as a trie value.
    pub const LEN: usize = 8;

    /// Encodes the offset the way it is stored in the trie.
    pub fn to_value(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Decodes an offset previously stored with [`DocOffset::to_value`].
    pub fn from_value(value: &[u8]) -> Result<Self> {
        let bytes: [u8; 8] = value
            .try_into()
            .map_err(|_| TrieError::Invariant("document offset value must be 8 bytes"))?;
        Ok(DocOffset(u64::from_be_bytes(bytes)))
    }
}

/// Errors surfaced by the trie and its storage collaborators.
#[derive(thiserror::Error, Debug)]
pub enum TrieError {
    /// Underlying I/O failure.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// A block or record failed to decode or verify.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// A decoded trie entry violates the structural invariants.
    #[error("invariant violation: {0}")]
    Invariant(&'static str),
    /// The caller supplied an unusable argument.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// A configuration document could not be parsed.
    #[error("config: {0}")]
    Config(String),
}

impl TrieError {
    /// Returns true for failures that originate in storage collaborators.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, TrieError::Io(_) | TrieError::Corruption(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TrieError>;

impl fmt::Display for LevelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == LevelRef::NONE {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DocOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
