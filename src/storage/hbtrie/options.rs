use crate::types::{LevelRef, Result, TrieError};

use super::entry::Entry;
use super::key::MAX_CHUNK_SIZE;

/// Configuration knobs for an [`super::HbTrie`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrieOptions {
    /// Bytes compared per level.
    pub chunksize: usize,
    /// Width of every stored value.
    pub valuelen: usize,
    /// Block size of the level store; one entry must fit in a block.
    pub blocksize: usize,
    /// Root reference meaning "no keys".
    pub empty_sentinel: LevelRef,
}

impl Default for TrieOptions {
    fn default() -> Self {
        Self {
            chunksize: 8,
            valuelen: 8,
            blocksize: 4096,
            empty_sentinel: LevelRef::NONE,
        }
    }
}

impl TrieOptions {
    /// Sets the chunk size.
    pub fn chunksize(mut self, bytes: usize) -> Self {
        self.chunksize = bytes;
        self
    }

    /// Sets the value width.
    pub fn valuelen(mut self, bytes: usize) -> Self {
        self.valuelen = bytes;
        self
    }

    /// Sets the block size.
    pub fn blocksize(mut self, bytes: usize) -> Self {
        self.blocksize = bytes;
        self
    }

    /// Sets the empty-root sentinel.
    pub fn empty_sentinel(mut self, sentinel: LevelRef) -> Self {
        self.empty_sentinel = sentinel;
        self
    }

    /// Bytes one level entry needs: level key, entry, and two length prefixes.
    pub fn entry_footprint(&self) -> usize {
        self.chunksize + 1 + Entry::max_encoded_len(self.valuelen) + 2
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(1..=MAX_CHUNK_SIZE).contains(&self.chunksize) {
            return Err(TrieError::Invalid("chunksize must be between 1 and 254"));
        }
        if self.valuelen == 0 {
            return Err(TrieError::Invalid("valuelen must be non-zero"));
        }
        if self.blocksize < self.entry_footprint() {
            return Err(TrieError::Invalid("blocksize cannot hold a single entry"));
        }
        Ok(())
    }
}
