//! Document store session: a block-backed trie indexing an append-only document log.
//!
//! `path` holds the index blocks and `path.docs` the documents. Changes are visible
//! immediately and durable after [`Db::commit`]; reopening discards anything newer
//! than the last commit.

mod config;

pub use config::DbConfig;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::primitives::block::{BlockFile, Meta};
use crate::primitives::io::{FileIo, StdFileIo};
use crate::storage::blocklevel::BlockLevelStore;
use crate::storage::docio::{DocKeyResolver, DocLog, DocLogMetricsSnapshot, Document};
use crate::storage::hbtrie::{HbTrie, TrieIter, TrieStatsSnapshot};
use crate::types::{DocOffset, LevelRef, Result, TrieError};

type IndexTrie = HbTrie<BlockLevelStore, DocKeyResolver>;

/// An open document store.
pub struct Db {
    config: DbConfig,
    blocks: Arc<BlockFile>,
    docs: Arc<DocLog>,
    trie: IndexTrie,
}

impl Db {
    /// Opens or creates the store rooted at `path`.
    pub fn open(path: impl AsRef<Path>, config: DbConfig) -> Result<Self> {
        let path = path.as_ref();
        let index: Arc<dyn FileIo> = Arc::new(StdFileIo::open(path)?);
        let docs: Arc<dyn FileIo> = Arc::new(StdFileIo::open(docs_path(path))?);
        Self::open_with_io(index, docs, config)
    }

    /// Opens the store over caller-supplied files.
    pub fn open_with_io(
        index_io: Arc<dyn FileIo>,
        doc_io: Arc<dyn FileIo>,
        config: DbConfig,
    ) -> Result<Self> {
        let opts = config.trie_options();
        let blocks = Arc::new(BlockFile::open(index_io, config.block_options())?);
        let meta = blocks.meta();
        let docs = Arc::new(DocLog::open(doc_io, meta.doc_len)?);
        let store = BlockLevelStore::open(Arc::clone(&blocks), config.cache_levels)?;
        let resolver = DocKeyResolver::new(Arc::clone(&docs));
        let trie = HbTrie::open(opts, store, resolver, meta.root)?;
        info!(
            root = %meta.root,
            commit_seq = meta.commit_seq,
            doc_len = meta.doc_len,
            "db.open"
        );
        Ok(Self {
            config,
            blocks,
            docs,
            trie,
        })
    }

    /// Stores a document under `key`, returning the offset of the one it replaced.
    pub fn set(&mut self, key: &[u8], meta: &[u8], body: &[u8]) -> Result<Option<DocOffset>> {
        let offset = self.docs.append(&Document::new(key, meta, body))?;
        let previous = self.trie.insert(key, &offset.to_value())?;
        previous.map(|value| DocOffset::from_value(&value)).transpose()
    }

    /// Fetches the document stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Document>> {
        self.offset_of(key)?
            .map(|offset| self.docs.read(offset))
            .transpose()
    }

    /// Offset of the document stored under `key`.
    pub fn offset_of(&self, key: &[u8]) -> Result<Option<DocOffset>> {
        self.trie
            .find(key)?
            .map(|value| DocOffset::from_value(&value))
            .transpose()
    }

    /// Removes `key` from the index.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        self.trie.remove(key)
    }

    /// Documents in key order, starting at the first key `>= start`.
    pub fn iter(&self, start: Option<&[u8]>) -> Result<DbIter<'_>> {
        Ok(DbIter {
            inner: self.trie.iter(start)?,
            docs: &self.docs,
        })
    }

    /// Makes every change since the last commit durable.
    pub fn commit(&mut self) -> Result<Meta> {
        if self.config.sync_on_commit {
            self.docs.sync()?;
        }
        let flushed = self.trie.store_mut().flush()?;
        let meta = self.blocks.commit(
            self.trie.root(),
            flushed.table_head,
            flushed.next_level,
            self.docs.len(),
        )?;
        debug!(
            levels_written = flushed.levels_written,
            commit_seq = meta.commit_seq,
            "db.commit"
        );
        Ok(meta)
    }

    /// Current trie root.
    pub fn root(&self) -> LevelRef {
        self.trie.root()
    }

    /// Trie counters since open.
    pub fn stats(&self) -> TrieStatsSnapshot {
        self.trie.stats().snapshot()
    }

    /// Document log counters since open.
    pub fn doc_metrics(&self) -> DocLogMetricsSnapshot {
        self.docs.metrics()
    }

    /// The configuration the session was opened with.
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// The underlying trie.
    pub fn trie(&self) -> &IndexTrie {
        &self.trie
    }
}

/// Cursor over documents in key order.
pub struct DbIter<'a> {
    inner: TrieIter<'a, BlockLevelStore, DocKeyResolver>,
    docs: &'a DocLog,
}

impl DbIter<'_> {
    /// Returns the next document, or `None` at the end.
    pub fn next(&mut self) -> Result<Option<Document>> {
        let Some((key, value)) = self.inner.next()? else {
            return Ok(None);
        };
        let doc = self.docs.read(DocOffset::from_value(&value)?)?;
        if doc.key != key {
            return Err(TrieError::Corruption("document key does not match index"));
        }
        Ok(Some(doc))
    }

    /// Releases the cursor.
    pub fn close(self) {
        self.inner.close();
    }
}

/// Path of the document log that accompanies the index at `path`.
pub fn docs_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".docs");
    PathBuf::from(name)
}
