use std::path::Path;

use serde::Deserialize;

use crate::primitives::block::BlockFileOptions;
use crate::storage::hbtrie::TrieOptions;
use crate::types::{DocOffset, Result, TrieError};

/// Settings for a [`super::Db`] session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DbConfig {
    /// Key bytes compared per trie level.
    pub chunksize: usize,
    /// Size of each index block.
    pub block_size: u32,
    /// Decoded levels kept in memory; zero disables the cache.
    pub cache_levels: usize,
    /// Whether `commit` fsyncs the index and document files.
    pub sync_on_commit: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            chunksize: 8,
            block_size: 4096,
            cache_levels: 1024,
            sync_on_commit: true,
        }
    }
}

impl DbConfig {
    /// Loading large data sets without fsync on every commit.
    pub fn bulk_load() -> Self {
        Self {
            cache_levels: 16384,
            sync_on_commit: false,
            ..Self::default()
        }
    }

    /// Sets the chunk size.
    pub fn chunksize(mut self, bytes: usize) -> Self {
        self.chunksize = bytes;
        self
    }

    /// Sets the block size.
    pub fn block_size(mut self, bytes: u32) -> Self {
        self.block_size = bytes;
        self
    }

    /// Sets the decoded-level cache capacity.
    pub fn cache_levels(mut self, levels: usize) -> Self {
        self.cache_levels = levels;
        self
    }

    /// Enables or disables fsync on commit.
    pub fn sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    /// Parses a TOML document; missing fields keep their defaults.
    pub fn from_toml_str(src: &str) -> Result<Self> {
        toml::from_str(src).map_err(|err| TrieError::Config(err.to_string()))
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|err| TrieError::Config(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    pub(crate) fn trie_options(&self) -> TrieOptions {
        TrieOptions::default()
            .chunksize(self.chunksize)
            .valuelen(DocOffset::LEN)
            .blocksize(self.block_size as usize)
    }

    pub(crate) fn block_options(&self) -> BlockFileOptions {
        BlockFileOptions {
            block_size: self.block_size,
            sync_on_commit: self.sync_on_commit,
        }
    }
}
