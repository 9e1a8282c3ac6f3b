//! Hierarchical B+-trie keyed by fixed-size key chunks.
//!
//! The trie splits every key into `chunksize`-byte chunks. Level `d` is an ordered map
//! from the key's chunk at depth `d` (followed by a one-byte marker) to either the
//! caller's value or a pointer to a nested level. Levels live in a [`LevelStore`], and
//! prefix-compacted terminals are verified through a [`KeyResolver`].

mod cursor;
mod entry;
mod key;
mod level;
mod options;
mod resolver;
mod stats;
mod tree;


pub use cursor::TrieIter;
pub use entry::{Entry, TAG_SUBLEVEL, TAG_TERMINAL};
pub use key::{split_level_key, Marker, ReformedKey, CONTINUES, MAX_CHUNK_SIZE};
pub use level::{LevelRemove, LevelStore, MemLevelStore};
pub use options::TrieOptions;
pub use resolver::KeyResolver;
pub use stats::{TrieStats, TrieStatsSnapshot};
pub use tree::HbTrie;

pub(crate) use level::{seek_map, LevelMap};
