#![allow(missing_docs)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use hbtrie::storage::hbtrie::HbTrie;
use hbtrie::{Db, DbConfig, DocOffset, MemLevelStore, Result, TrieError, TrieOptions};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::tempdir;
use tracing_subscriber::EnvFilter;

const KEY_COUNT: usize = 100_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn hundred_thousand_random_keys_overwrite_and_iterate() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let path = dir.path().join("large.hbt");
    let cfg = DbConfig::bulk_load().block_size(4096).chunksize(8);
    let mut rng = ChaCha8Rng::seed_from_u64(0x00C0_FFEE);
    let mut keys = BTreeSet::new();
    while keys.len() < KEY_COUNT {
        keys.insert(rng.gen::<u64>().to_be_bytes());
    }

    let mut db = Db::open(&path, cfg.clone())?;
    for key in &keys {
        assert_eq!(db.set(key, b"", b"v1")?, None);
    }
    for key in &keys {
        assert!(db.set(key, b"", b"v2")?.is_some());
    }
    for key in &keys {
        let doc = db.get(key)?.expect("key present");
        assert_eq!(doc.body, b"v2".to_vec());
    }
    db.commit()?;
    db.trie().stats().emit_tracing();
    drop(db);

    let db = Db::open(&path, cfg)?;
    let mut iter = db.iter(None)?;
    let mut count = 0usize;
    let mut last: Option<Vec<u8>> = None;
    let mut expected = keys.iter();
    while let Some(doc) = iter.next()? {
        assert_eq!(Some(doc.key.as_slice()), expected.next().map(|k| k.as_slice()));
        if let Some(prev) = &last {
            assert!(prev < &doc.key, "iteration must be strictly ascending");
        }
        assert_eq!(doc.body, b"v2".to_vec());
        last = Some(doc.key);
        count += 1;
    }
    assert_eq!(count, KEY_COUNT);
    Ok(())
}

#[test]
fn variable_length_keys_with_heavy_sharing() -> Result<()> {
    init_tracing();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let registry: Rc<RefCell<Vec<Vec<u8>>>> = Rc::default();
    let lookup = Rc::clone(&registry);
    let resolve = move |value: &[u8]| -> Result<Vec<u8>> {
        let id = DocOffset::from_value(value)?.0 as usize;
        lookup
            .borrow()
            .get(id)
            .cloned()
            .ok_or(TrieError::Corruption("unknown id"))
    };
    let opts = TrieOptions::default().chunksize(4).valuelen(8);
    let mut trie = HbTrie::new(opts, MemLevelStore::default(), resolve)?;
    let mut model = BTreeMap::new();

    for _ in 0..20_000 {
        let len = rng.gen_range(0..24);
        let key: Vec<u8> = (0..len).map(|_| b"ab\0"[rng.gen_range(0..3)]).collect();
        if rng.gen_bool(0.25) {
            assert_eq!(trie.remove(&key)?, model.remove(&key).is_some());
            continue;
        }
        let id = registry.borrow().len() as u64;
        registry.borrow_mut().push(key.clone());
        let value = DocOffset(id).to_value();
        assert_eq!(trie.insert(&key, &value)?, model.insert(key, value.to_vec()));
    }
    for (key, value) in &model {
        assert_eq!(trie.find(key)?.as_ref(), Some(value));
    }
    let mut iter = trie.iter(None)?;
    let mut listed = Vec::with_capacity(model.len());
    while let Some(item) = iter.next()? {
        listed.push(item);
    }
    assert_eq!(listed, model.into_iter().collect::<Vec<_>>());
    let stats = trie.stats().snapshot();
    assert!(stats.splits > 0);
    assert!(stats.collapses > 0);
    Ok(())
}
