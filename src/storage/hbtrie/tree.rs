use std::ops::Bound;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::types::{LevelRef, Result, TrieError};

use super::cursor::TrieIter;
use super::entry::Entry;
use super::key::{split_level_key, Marker, ReformedKey};
use super::level::LevelStore;
use super::options::TrieOptions;
use super::resolver::KeyResolver;
use super::stats::TrieStats;

/// Level visited on the way down, with the level key that led one depth deeper.
#[derive(Clone, Debug)]
struct PathFrame {
    level: LevelRef,
    key: Vec<u8>,
}

type Path = SmallVec<[PathFrame; 8]>;

/// Levels built by one split, divergence level first and topmost last.
type SplitLevels = SmallVec<[LevelRef; 4]>;

/// Hierarchical trie of chunk-keyed levels.
///
/// Each level maps one chunk of the key (plus a marker byte) to either the caller's
/// value or a pointer to the level one chunk deeper. A key whose path has no
/// competitor is stored as soon as its chunk is unique, and its remaining chunks are
/// recovered through the [`KeyResolver`] when needed.
pub struct HbTrie<S, R> {
    opts: TrieOptions,
    root: LevelRef,
    store: S,
    resolver: R,
    stats: Arc<TrieStats>,
}

impl<S, R> HbTrie<S, R>
where
    S: LevelStore,
    R: KeyResolver,
{
    /// Creates an empty trie.
    pub fn new(opts: TrieOptions, store: S, resolver: R) -> Result<Self> {
        let root = opts.empty_sentinel;
        Self::open(opts, store, resolver, root)
    }

    /// Resumes a trie whose top-level level is `root`.
    pub fn open(opts: TrieOptions, store: S, resolver: R, root: LevelRef) -> Result<Self> {
        opts.validate()?;
        Ok(Self {
            opts,
            root,
            store,
            resolver,
            stats: Arc::new(TrieStats::default()),
        })
    }

    /// Reference to the top-level level, or the empty sentinel.
    pub fn root(&self) -> LevelRef {
        self.root
    }

    /// Returns true when the trie holds no keys.
    pub fn is_empty(&self) -> bool {
        self.root == self.opts.empty_sentinel
    }

    /// Options the trie was built with.
    pub fn options(&self) -> &TrieOptions {
        &self.opts
    }

    /// Shared statistics handle.
    pub fn stats(&self) -> Arc<TrieStats> {
        Arc::clone(&self.stats)
    }

    /// Underlying level store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable access to the underlying level store.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// The injected key resolver.
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Returns the value stored for `key`.
    pub fn find(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.stats.inc_finds();
        if self.is_empty() {
            return Ok(None);
        }
        let rk = ReformedKey::reform(key, self.opts.chunksize);
        let mut level = self.root;
        for depth in 0..rk.chunk_count() {
            let marker = rk.marker(depth);
            let Some(entry) = self.load_entry(level, &rk.level_key(depth), marker)? else {
                return Ok(None);
            };
            match entry {
                Entry::Terminal(value) => {
                    if marker == Marker::Continues && self.resolve_key(&value)? != key {
                        return Ok(None);
                    }
                    return Ok(Some(value));
                }
                Entry::SubLevel(child) => {
                    tracing::trace!(
                        target: "hbtrie::search",
                        level = %level,
                        child = %child,
                        depth,
                        "descending into sub-level"
                    );
                    level = child;
                }
            }
        }
        Err(TrieError::Invariant("descended past the key's last chunk"))
    }

    /// Inserts or replaces `key`, returning the value it replaced.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>> {
        if value.len() != self.opts.valuelen {
            return Err(TrieError::Invalid("value width does not match valuelen"));
        }
        let rk = ReformedKey::reform(key, self.opts.chunksize);
        let terminal = Entry::Terminal(value.to_vec()).encode();
        if self.is_empty() {
            let created = self.create_level()?;
            let root = match self.store.insert(created, &rk.level_key(0), &terminal) {
                Ok(root) => root,
                Err(err) => {
                    self.discard_levels(&[created]);
                    return Err(err);
                }
            };
            self.set_root(root);
            self.stats.inc_inserts();
            return Ok(None);
        }

        let mut path = Path::new();
        let mut level = self.root;
        let mut depth = 0;
        loop {
            let lk = rk.level_key(depth);
            let marker = rk.marker(depth);
            let (replacement, previous, split) = match self.load_entry(level, &lk, marker)? {
                None => (terminal, None, SplitLevels::new()),
                Some(Entry::SubLevel(child)) => {
                    path.push(PathFrame { level, key: lk });
                    level = child;
                    depth += 1;
                    continue;
                }
                Some(Entry::Terminal(prev)) if marker != Marker::Continues => {
                    (terminal, Some(prev), SplitLevels::new())
                }
                Some(Entry::Terminal(prev)) => {
                    let stored = self.resolve_key(&prev)?;
                    if stored == key {
                        (terminal, Some(prev), SplitLevels::new())
                    } else {
                        let existing = ReformedKey::reform(&stored, self.opts.chunksize);
                        if existing.chunk_count() <= depth || existing.level_key(depth) != lk {
                            return Err(TrieError::Invariant(
                                "resolved key does not match its level key",
                            ));
                        }
                        let split = self.build_split(depth + 1, &existing, &prev, &rk, value)?;
                        let top = *split
                            .last()
                            .ok_or(TrieError::Invariant("split built no levels"))?;
                        (Entry::SubLevel(top).encode(), None, split)
                    }
                }
            };
            let updated = match self.store.insert(level, &lk, &replacement) {
                Ok(updated) => updated,
                Err(err) => {
                    self.discard_levels(&split);
                    return Err(err);
                }
            };
            self.propagate(path, level, updated)?;
            if previous.is_some() {
                self.stats.inc_updates();
            } else {
                self.stats.inc_inserts();
            }
            return Ok(previous);
        }
    }

    /// Removes `key`, returning whether it was present.
    pub fn remove(&mut self, key: &[u8]) -> Result<bool> {
        if self.is_empty() {
            return Ok(false);
        }
        let rk = ReformedKey::reform(key, self.opts.chunksize);
        let mut path = Path::new();
        let mut level = self.root;
        let mut depth = 0;
        let lk = loop {
            let lk = rk.level_key(depth);
            let marker = rk.marker(depth);
            match self.load_entry(level, &lk, marker)? {
                None => return Ok(false),
                Some(Entry::SubLevel(child)) => {
                    path.push(PathFrame { level, key: lk });
                    level = child;
                    depth += 1;
                }
                Some(Entry::Terminal(value)) => {
                    if marker == Marker::Continues && self.resolve_key(&value)? != key {
                        return Ok(false);
                    }
                    break lk;
                }
            }
        };
        let outcome = self.store.remove(level, &lk)?;
        if !outcome.removed {
            return Err(TrieError::Invariant("level lost an entry during removal"));
        }
        self.settle(path, level, outcome.level, outcome.remaining)?;
        self.stats.inc_removes();
        Ok(true)
    }

    /// Iterates keys in ascending order starting at the first key `>= start`.
    pub fn iter(&self, start: Option<&[u8]>) -> Result<TrieIter<'_, S, R>> {
        Ok(TrieIter::new(self, start))
    }

    fn load_entry(&self, level: LevelRef, lk: &[u8], marker: Marker) -> Result<Option<Entry>> {
        match self.store.get(level, lk)? {
            Some(raw) => Entry::decode(&raw, self.opts.valuelen, marker).map(Some),
            None => Ok(None),
        }
    }

    pub(super) fn resolve_key(&self, value: &[u8]) -> Result<Vec<u8>> {
        self.stats.inc_resolver_calls();
        self.resolver.resolve(value)
    }

    fn create_level(&mut self) -> Result<LevelRef> {
        let level = self.store.create_level()?;
        if level == self.opts.empty_sentinel {
            return Err(TrieError::Invariant("level store handed out the empty sentinel"));
        }
        self.stats.inc_levels_created();
        Ok(level)
    }

    fn destroy_level(&mut self, level: LevelRef) -> Result<()> {
        self.store.destroy_level(level)?;
        self.stats.inc_levels_destroyed();
        Ok(())
    }

    fn set_root(&mut self, root: LevelRef) {
        if root != self.root {
            tracing::debug!(
                target: "hbtrie::root",
                from = %self.root,
                to = %root,
                "hbtrie.root_moved"
            );
            self.root = root;
        }
    }

    /// Builds the levels separating two keys that share every chunk above `depth`.
    ///
    /// Shared chunks below `depth` each get a single-entry level; both terminals
    /// land in the level where the keys diverge. On failure every level built so
    /// far is destroyed again.
    fn build_split(
        &mut self,
        depth: usize,
        existing: &ReformedKey,
        existing_value: &[u8],
        incoming: &ReformedKey,
        value: &[u8],
    ) -> Result<SplitLevels> {
        let mut diverge = depth;
        loop {
            if diverge >= existing.chunk_count() || diverge >= incoming.chunk_count() {
                return Err(TrieError::Invariant("distinct keys share every level key"));
            }
            if existing.level_key(diverge) != incoming.level_key(diverge) {
                break;
            }
            diverge += 1;
        }

        let mut built = SplitLevels::new();
        let terminals = [
            (existing.level_key(diverge), existing_value),
            (incoming.level_key(diverge), value),
        ];
        let linked = self.link_split(&mut built, &terminals, (depth..diverge).rev(), incoming);
        let top = match linked {
            Ok(top) => top,
            Err(err) => {
                self.discard_levels(&built);
                return Err(err);
            }
        };
        self.stats.inc_splits();
        tracing::debug!(
            target: "hbtrie::split",
            depth,
            diverge,
            chunk = %hex::encode(incoming.chunk(diverge)),
            top = %top,
            "hbtrie.split"
        );
        Ok(built)
    }

    /// Fills the divergence level, then stacks one pointer level per shared depth.
    ///
    /// `built` always holds the current reference of every level created so far.
    fn link_split(
        &mut self,
        built: &mut SplitLevels,
        terminals: &[(Vec<u8>, &[u8]); 2],
        shared: impl Iterator<Item = usize>,
        incoming: &ReformedKey,
    ) -> Result<LevelRef> {
        let mut level = self.create_level()?;
        built.push(level);
        for (lk, value) in terminals {
            level = self
                .store
                .insert(level, lk, &Entry::Terminal(value.to_vec()).encode())?;
            if let Some(current) = built.last_mut() {
                *current = level;
            }
        }
        for depth in shared {
            let parent = self.create_level()?;
            built.push(parent);
            level = self.store.insert(
                parent,
                &incoming.level_key(depth),
                &Entry::SubLevel(level).encode(),
            )?;
            if let Some(current) = built.last_mut() {
                *current = level;
            }
        }
        Ok(level)
    }

    /// Destroys levels a failed mutation created but never linked.
    fn discard_levels(&mut self, levels: &[LevelRef]) {
        for &level in levels.iter().rev() {
            if let Err(err) = self.destroy_level(level) {
                tracing::warn!(
                    target: "hbtrie::split",
                    level = %level,
                    error = %err,
                    "hbtrie.discard_failed"
                );
            }
        }
    }

    /// Rewrites parent pointers while a mutation keeps relocating levels.
    fn propagate(&mut self, mut path: Path, mut old: LevelRef, mut new: LevelRef) -> Result<()> {
        while old != new {
            match path.pop() {
                Some(frame) => {
                    let updated = self.store.insert(
                        frame.level,
                        &frame.key,
                        &Entry::SubLevel(new).encode(),
                    )?;
                    old = frame.level;
                    new = updated;
                }
                None => {
                    self.set_root(new);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Restores structural invariants after an entry was removed from `level`.
    ///
    /// Empty levels are destroyed and unlinked from their parent. A non-root level
    /// left with one terminal entry is folded into the parent's slot.
    fn settle(
        &mut self,
        mut path: Path,
        mut old: LevelRef,
        mut level: LevelRef,
        mut remaining: usize,
    ) -> Result<()> {
        loop {
            if remaining == 0 {
                self.destroy_level(level)?;
                let Some(frame) = path.pop() else {
                    self.set_root(self.opts.empty_sentinel);
                    return Ok(());
                };
                let outcome = self.store.remove(frame.level, &frame.key)?;
                if !outcome.removed {
                    return Err(TrieError::Invariant("parent lost its sub-level pointer"));
                }
                tracing::trace!(
                    target: "hbtrie::remove",
                    parent = %frame.level,
                    depth = path.len(),
                    "unlinked empty level"
                );
                old = frame.level;
                level = outcome.level;
                remaining = outcome.remaining;
                continue;
            }

            let sole = if remaining == 1 && !path.is_empty() {
                self.sole_terminal(level)?
            } else {
                None
            };
            let Some(value) = sole else {
                return self.propagate(path, old, level);
            };
            let frame = path
                .pop()
                .ok_or(TrieError::Invariant("collapse without a parent level"))?;
            self.destroy_level(level)?;
            let updated = self
                .store
                .insert(frame.level, &frame.key, &Entry::Terminal(value).encode())?;
            self.stats.inc_collapses();
            tracing::debug!(
                target: "hbtrie::collapse",
                level = %level,
                parent = %frame.level,
                depth = path.len(),
                "hbtrie.collapse"
            );
            old = frame.level;
            level = updated;
            remaining = self.store.len(updated)?;
        }
    }

    fn sole_terminal(&self, level: LevelRef) -> Result<Option<Vec<u8>>> {
        let Some((lk, raw)) = self.store.seek(level, Bound::Unbounded)? else {
            return Ok(None);
        };
        let (_, marker) = split_level_key(&lk, self.opts.chunksize)?;
        match Entry::decode(&raw, self.opts.valuelen, marker)? {
            Entry::Terminal(value) => Ok(Some(value)),
            Entry::SubLevel(_) => Ok(None),
        }
    }
}
