//! Hierarchical B+-trie index over chunked byte keys, with a block-backed level
//! store, an append-only document log, and a committing storage session.

#![warn(missing_docs)]

pub mod db;
pub mod primitives;
pub mod storage;
pub mod types;

pub use db::{Db, DbConfig, DbIter};
pub use storage::docio::Document;
pub use storage::hbtrie::{HbTrie, KeyResolver, LevelStore, MemLevelStore, TrieIter, TrieOptions};
pub use types::{DocOffset, LevelRef, Result, TrieError};
