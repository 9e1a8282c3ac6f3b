use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use crate::types::{LevelRef, Result, TrieError};

/// Outcome of [`LevelStore::remove`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelRemove {
    /// Reference of the level after the mutation.
    pub level: LevelRef,
    /// Whether an entry was deleted.
    pub removed: bool,
    /// Entries left in the level.
    pub remaining: usize,
}

/// Ordered byte-keyed map instances backing each trie level.
///
/// Mutations hand back the level's reference afterwards. A store that relocates
/// levels on write returns the new reference and the trie rewrites the parent
/// pointer.
pub trait LevelStore {
    /// Allocates a new, empty level.
    fn create_level(&mut self) -> Result<LevelRef>;

    /// Looks up one entry.
    fn get(&self, level: LevelRef, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Inserts or replaces one entry.
    fn insert(&mut self, level: LevelRef, key: &[u8], value: &[u8]) -> Result<LevelRef>;

    /// Deletes one entry if present.
    fn remove(&mut self, level: LevelRef, key: &[u8]) -> Result<LevelRemove>;

    /// Number of entries in the level.
    fn len(&self, level: LevelRef) -> Result<usize>;

    /// First entry, in ascending key order, satisfying `lower`.
    fn seek(&self, level: LevelRef, lower: Bound<&[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>>;

    /// Releases a level. Its reference must not be used again.
    fn destroy_level(&mut self, level: LevelRef) -> Result<()>;
}

pub(crate) type LevelMap = BTreeMap<Vec<u8>, Vec<u8>>;

pub(crate) fn seek_map(map: &LevelMap, lower: Bound<&[u8]>) -> Option<(Vec<u8>, Vec<u8>)> {
    map.range::<[u8], _>((lower, Bound::Unbounded))
        .next()
        .map(|(k, v)| (k.clone(), v.clone()))
}

/// Heap-resident level store.
pub struct MemLevelStore {
    levels: HashMap<LevelRef, LevelMap>,
    next_level: u64,
    block_size: usize,
}

impl MemLevelStore {
    /// Creates an empty store that accounts level sizes in `block_size`-byte blocks.
    pub fn new(block_size: usize) -> Self {
        Self {
            levels: HashMap::new(),
            next_level: 0,
            block_size: block_size.max(1),
        }
    }

    /// Number of live levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Blocks the level would occupy if each entry were packed back to back.
    pub fn blocks_used(&self, level: LevelRef) -> Result<usize> {
        let bytes: usize = self
            .level(level)?
            .iter()
            .map(|(k, v)| k.len() + v.len() + 2)
            .sum();
        Ok(bytes.div_ceil(self.block_size).max(1))
    }

    fn level(&self, level: LevelRef) -> Result<&LevelMap> {
        self.levels
            .get(&level)
            .ok_or(TrieError::Corruption("unknown level reference"))
    }

    fn level_mut(&mut self, level: LevelRef) -> Result<&mut LevelMap> {
        self.levels
            .get_mut(&level)
            .ok_or(TrieError::Corruption("unknown level reference"))
    }
}

impl Default for MemLevelStore {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl LevelStore for MemLevelStore {
    fn create_level(&mut self) -> Result<LevelRef> {
        let level = LevelRef(self.next_level);
        self.next_level += 1;
        self.levels.insert(level, LevelMap::new());
        Ok(level)
    }

    fn get(&self, level: LevelRef, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.level(level)?.get(key).cloned())
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
        Ok(self.level(level)?.len())
    }

    fn seek(&self, level: LevelRef, lower: Bound<&[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(seek_map(self.level(level)?, lower))
    }

    fn destroy_level(&mut self, level: LevelRef) -> Result<()> {
        self.levels
            .remove(&level)
            .map(|_| ())
            .ok_or(TrieError::Corruption("unknown level reference"))
    }
}
