use std::ops::Bound;

use smallvec::SmallVec;

use crate::types::{LevelRef, Result, TrieError};

use super::entry::Entry;
use super::key::{split_level_key, Marker, ReformedKey};
use super::level::LevelStore;
use super::resolver::KeyResolver;
use super::tree::HbTrie;

#[derive(Debug)]
struct Frame {
    level: LevelRef,
    depth: usize,
    /// Key bytes contributed by the levels above.
    prefix: Vec<u8>,
    last: Option<Vec<u8>>,
    /// Still following the start key's path; the first seek is bounded by it.
    bounded: bool,
}

/// Ascending cursor over every key in an [`HbTrie`].
pub struct TrieIter<'a, S, R> {
    trie: &'a HbTrie<S, R>,
    start: Option<ReformedKey>,
    stack: SmallVec<[Frame; 8]>,
}

impl<'a, S, R> TrieIter<'a, S, R>
where
    S: LevelStore,
    R: KeyResolver,
{
    pub(super) fn new(trie: &'a HbTrie<S, R>, start: Option<&[u8]>) -> Self {
        let start = start.map(|key| ReformedKey::reform(key, trie.options().chunksize));
        let mut stack = SmallVec::new();
        if !trie.is_empty() {
            stack.push(Frame {
                level: trie.root(),
                depth: 0,
                prefix: Vec::new(),
                last: None,
                bounded: start.is_some(),
            });
        }
        Self { trie, start, stack }
    }

    /// Returns the next key and value, or `None` once every key was produced.
    pub fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let chunksize = self.trie.options().chunksize;
        let valuelen = self.trie.options().valuelen;
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };
            let start_lk = match (&self.start, frame.bounded && frame.last.is_none()) {
                (Some(start), true) => Some(start.level_key(frame.depth)),
                _ => None,
            };
            let lower = match (&frame.last, &start_lk) {
                (Some(last), _) => Bound::Excluded(last.as_slice()),
                (None, Some(lk)) => Bound::Included(lk.as_slice()),
                (None, None) => Bound::Unbounded,
            };
            let Some((lk, raw)) = self.trie.store().seek(frame.level, lower)? else {
                self.stack.pop();
                continue;
            };
            let on_start_path = start_lk.as_deref() == Some(lk.as_slice());
            let (chunk, marker) = split_level_key(&lk, chunksize)?;
            let entry = Entry::decode(&raw, valuelen, marker)?;
            match (entry, marker) {
                (Entry::Terminal(value), Marker::Ends(used)) => {
                    let mut key = frame.prefix.clone();
                    key.extend_from_slice(&chunk[..used]);
                    frame.last = Some(lk);
                    return Ok(Some((key, value)));
                }
                (Entry::Terminal(value), Marker::Continues) => {
                    let key = self.trie.resolve_key(&value)?;
                    let rk = ReformedKey::reform(&key, chunksize);
                    if !key.starts_with(&frame.prefix)
                        || rk.chunk_count() <= frame.depth
                        || rk.level_key(frame.depth) != lk
                    {
                        return Err(TrieError::Invariant(
                            "resolved key does not match its level key",
                        ));
                    }
                    frame.last = Some(lk);
                    if on_start_path {
                        if let Some(start) = &self.start {
                            if key.as_slice() < start.key() {
                                continue;
                            }
                        }
                    }
                    return Ok(Some((key, value)));
                }
                (Entry::SubLevel(child), _) => {
                    let mut prefix = frame.prefix.clone();
                    prefix.extend_from_slice(chunk);
                    let depth = frame.depth + 1;
                    frame.last = Some(lk.clone());
                    self.stack.push(Frame {
                        level: child,
                        depth,
                        prefix,
                        last: None,
                        bounded: on_start_path,
                    });
                }
            }
        }
    }

    /// Releases the cursor.
    pub fn close(self) {}
}
