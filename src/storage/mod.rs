//! Trie engine and the level and document stores it runs on.

/// Hierarchical B+-trie over chunked keys.
pub mod hbtrie;

/// Level store persisted in a block file.
pub mod blocklevel;

/// Append-only document log and its key resolver.
pub mod docio;
