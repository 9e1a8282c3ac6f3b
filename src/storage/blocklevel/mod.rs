#![forbid(unsafe_code)]
//! Level store persisted as block chains inside a [`BlockFile`].
//!
//! Level references are logical ids. A level table, itself written as a block chain,
//! maps each id to the head block of its current chain. Mutated levels stay decoded
//! in memory until [`BlockLevelStore::flush`], which writes them to fresh blocks and
//! writes a new table, so the last committed image is never overwritten.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::ops::Bound;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::primitives::block::BlockFile;
use crate::primitives::bytes::{buf::Reader, var};
use crate::storage::hbtrie::{seek_map, LevelMap, LevelRemove, LevelStore};
use crate::types::{BlockId, LevelRef, Result, TrieError};

/// Where the level table landed after a flush.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Head block of the level table chain.
    pub table_head: BlockId,
    /// Next logical level id to hand out.
    pub next_level: u64,
    /// Levels written by this flush.
    pub levels_written: usize,
}

/// Level store backed by a [`BlockFile`].
pub struct BlockLevelStore {
    file: Arc<BlockFile>,
    table: HashMap<LevelRef, BlockId>,
    dirty: HashMap<LevelRef, LevelMap>,
    cache: Option<Mutex<LruCache<LevelRef, Arc<LevelMap>>>>,
    next_level: u64,
    table_head: BlockId,
    table_dirty: bool,
}

impl BlockLevelStore {
    /// Opens the level table recorded in the file's committed header.
    ///
    /// `cache_levels` bounds the decoded-level cache; zero disables it.
    pub fn open(file: Arc<BlockFile>, cache_levels: usize) -> Result<Self> {
        let meta = file.meta();
        let table = if meta.level_table.0 == 0 {
            HashMap::new()
        } else {
            decode_table(&file.read_chain(meta.level_table)?)?
        };
        if let Some(max) = table.keys().map(|level| level.0).max() {
            if max >= meta.next_level {
                return Err(TrieError::Corruption("level table id beyond next level"));
            }
        }
        debug!(
            levels = table.len(),
            table = meta.level_table.0,
            next_level = meta.next_level,
            "block_level_store.open"
        );
        Ok(Self {
            file,
            table,
            dirty: HashMap::new(),
            cache: NonZeroUsize::new(cache_levels).map(|cap| Mutex::new(LruCache::new(cap))),
            next_level: meta.next_level,
            table_head: meta.level_table,
            table_dirty: false,
        })
    }

    /// The block file levels are written to.
    pub fn file(&self) -> &Arc<BlockFile> {
        &self.file
    }

    /// Number of live levels, flushed or not.
    pub fn level_count(&self) -> usize {
        self.table.len() + self.dirty.keys().filter(|l| !self.table.contains_key(l)).count()
    }

    /// Number of levels changed since the last flush.
    pub fn dirty_levels(&self) -> usize {
        self.dirty.len()
    }

    /// Writes every changed level and a new level table to fresh blocks.
    ///
    /// Nothing is marked clean until every chain reached the file, so a failed
    /// flush leaves all pending changes in place for the next attempt.
    pub fn flush(&mut self) -> Result<FlushOutcome> {
        let mut levels: Vec<LevelRef> = self.dirty.keys().copied().collect();
        levels.sort_unstable();
        let mut table = self.table.clone();
        let mut payload = Vec::new();
        for level in &levels {
            let Some(map) = self.dirty.get(level) else {
                continue;
            };
            payload.clear();
            encode_level(map, &mut payload);
            let head = self.file.write_chain(&payload)?;
            trace!(level = %level, head = head.0, entries = map.len(), "block_level_store.write_level");
            table.insert(*level, head);
        }
        let table_head = if !levels.is_empty() || self.table_dirty {
            self.file.write_chain(&encode_table(&table))?
        } else {
            self.table_head
        };

        self.table = table;
        self.table_head = table_head;
        self.table_dirty = false;
        for level in &levels {
            if let Some(map) = self.dirty.remove(level) {
                self.cache_put(*level, Arc::new(map));
            }
        }
        debug!(
            levels = levels.len(),
            table = self.table_head.0,
            next_level = self.next_level,
            "block_level_store.flush"
        );
        Ok(FlushOutcome {
            table_head: self.table_head,
            next_level: self.next_level,
            levels_written: levels.len(),
        })
    }

    fn cache_get(&self, level: LevelRef) -> Option<Arc<LevelMap>> {
        self.cache.as_ref()?.lock().get(&level).cloned()
    }

    fn cache_put(&self, level: LevelRef, map: Arc<LevelMap>) {
        if let Some(cache) = &self.cache {
            cache.lock().put(level, map);
        }
    }

    fn cache_evict(&self, level: LevelRef) {
        if let Some(cache) = &self.cache {
            cache.lock().pop(&level);
        }
    }

    fn load_clean(&self, level: LevelRef) -> Result<Arc<LevelMap>> {
        if let Some(map) = self.cache_get(level) {
            return Ok(map);
        }
        let head = self
            .table
            .get(&level)
            .copied()
            .ok_or(TrieError::Corruption("unknown level reference"))?;
        let map = Arc::new(decode_level(&self.file.read_chain(head)?)?);
        self.cache_put(level, Arc::clone(&map));
        Ok(map)
    }

    fn with_level<T>(&self, level: LevelRef, f: impl FnOnce(&LevelMap) -> T) -> Result<T> {
        match self.dirty.get(&level) {
            Some(map) => Ok(f(map)),
            None => {
                let map = self.load_clean(level)?;
                Ok(f(&map))
            }
        }
    }

    fn level_mut(&mut self, level: LevelRef) -> Result<&mut LevelMap> {
        if !self.dirty.contains_key(&level) {
            let clean = self.load_clean(level)?;
            self.cache_evict(level);
            let map = Arc::try_unwrap(clean).unwrap_or_else(|shared| (*shared).clone());
            self.dirty.insert(level, map);
        }
        self.dirty
            .get_mut(&level)
            .ok_or(TrieError::Corruption("unknown level reference"))
    }
}

impl LevelStore for BlockLevelStore {
    fn create_level(&mut self) -> Result<LevelRef> {
        let level = LevelRef(self.next_level);
        if level == LevelRef::NONE {
            return Err(TrieError::Invalid("level id space exhausted"));
        }
        self.next_level += 1;
        self.dirty.insert(level, LevelMap::new());
        Ok(level)
    }

    fn get(&self, level: LevelRef, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.with_level(level, |map| map.get(key).cloned())
    }

    fn insert(&mut self, level: LevelRef, key: &[u8], value: &[u8]) -> Result<LevelRef> {
        self.level_mut(level)?.insert(key.to_vec(), value.to_vec());
        Ok(level)
    }

    fn remove(&mut self, level: LevelRef, key: &[u8]) -> Result<LevelRemove> {
        let map = self.level_mut(level)?;
        let removed = map.remove(key).is_some();
        Ok(LevelRemove {
            level,
            removed,
            remaining: map.len(),
        })
    }

    fn len(&self, level: LevelRef) -> Result<usize> {
        self.with_level(level, |map| map.len())
    }

    fn seek(&self, level: LevelRef, lower: Bound<&[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.with_level(level, |map| seek_map(map, lower))
    }

    fn destroy_level(&mut self, level: LevelRef) -> Result<()> {
        let was_dirty = self.dirty.remove(&level).is_some();
        let was_flushed = self.table.remove(&level).is_some();
        if !was_dirty && !was_flushed {
            return Err(TrieError::Corruption("unknown level reference"));
        }
        self.cache_evict(level);
        self.table_dirty |= was_flushed;
        Ok(())
    }
}

fn encode_level(map: &LevelMap, out: &mut Vec<u8>) {
    var::encode_u64(map.len() as u64, out);
    for (key, value) in map {
        var::encode_u64(key.len() as u64, out);
        out.extend_from_slice(key);
        var::encode_u64(value.len() as u64, out);
        out.extend_from_slice(value);
    }
}

fn decode_level(bytes: &[u8]) -> Result<LevelMap> {
    let mut reader = Reader::new(bytes);
    let count = reader.var_u64()?;
    let mut map = LevelMap::new();
    let mut prev: Option<&[u8]> = None;
    for _ in 0..count {
        let key = reader.len_prefixed()?;
        let value = reader.len_prefixed()?;
        if prev.is_some_and(|prev| prev >= key) {
            return Err(TrieError::Corruption("level keys out of order"));
        }
        prev = Some(key);
        map.insert(key.to_vec(), value.to_vec());
    }
    if reader.remaining() != 0 {
        return Err(TrieError::Corruption("trailing bytes after level"));
    }
    Ok(map)
}

fn encode_table(table: &HashMap<LevelRef, BlockId>) -> Vec<u8> {
    let mut rows: Vec<(LevelRef, BlockId)> = table.iter().map(|(l, b)| (*l, *b)).collect();
    rows.sort_unstable();
    let mut out = Vec::new();
    var::encode_u64(rows.len() as u64, &mut out);
    for (level, head) in rows {
        var::encode_u64(level.0, &mut out);
        var::encode_u64(head.0, &mut out);
    }
    out
}

fn decode_table(bytes: &[u8]) -> Result<HashMap<LevelRef, BlockId>> {
    let mut reader = Reader::new(bytes);
    let count = reader.var_u64()?;
    let mut table = HashMap::new();
    for _ in 0..count {
        let level = LevelRef(reader.var_u64()?);
        let head = BlockId(reader.var_u64()?);
        if head.0 == 0 || table.insert(level, head).is_some() {
            return Err(TrieError::Corruption("malformed level table row"));
        }
    }
    if reader.remaining() != 0 {
        return Err(TrieError::Corruption("trailing bytes after level table"));
    }
    Ok(table)
}
