#![allow(missing_docs)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use hbtrie::storage::hbtrie::ReformedKey;
use hbtrie::{Db, DbConfig, HbTrie, MemLevelStore, Result, TrieError, TrieOptions};
use tempfile::tempdir;

fn repeat_each(word: &str) -> Vec<u8> {
    word.bytes()
        .flat_map(|b| std::iter::repeat(b).take(8))
        .collect()
}

#[test]
fn reformed_keys_cover_exactly_their_length() {
    let cases: [(&[u8], usize); 5] = [
        (b"", 1),
        (b"abc", 1),
        (b"abcdefgh", 1),
        (b"abcdefghi", 2),
        (&[0u8; 16], 2),
    ];
    for (key, chunks) in cases {
        let rk = ReformedKey::reform(key, 8);
        assert_eq!(rk.chunk_count(), chunks, "key {key:?}");
        assert_eq!(rk.key(), key);
    }
    let a = ReformedKey::reform(b"abc", 8);
    let b = ReformedKey::reform(b"abcd", 8);
    let c = ReformedKey::reform(b"abcde", 8);
    assert!(a < b && b < c);
}

#[test]
fn seven_keys_through_a_file_backed_db() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("basic.hbt");
    let cfg = DbConfig::default().block_size(256).chunksize(8);
    let words = ["aaaa", "aaab", "aaac", "aba", "aaba", "bbbb", "aaac"];
    let mut db = Db::open(&path, cfg.clone())?;
    for (i, word) in words.iter().enumerate() {
        let key = repeat_each(word);
        let body = format!("body{i}");
        let replaced = db.set(&key, b"meta", body.as_bytes())?;
        assert_eq!(replaced.is_some(), i == 6, "insert {i}");
    }

    let first = repeat_each(words[0]);
    assert!(db.delete(&first)?);
    assert_eq!(db.get(&first)?, None);
    for (i, word) in words.iter().enumerate().skip(1) {
        let doc = db.get(&repeat_each(word))?.expect("document present");
        let expected = if *word == "aaac" { 6 } else { i };
        assert_eq!(doc.body, format!("body{expected}").into_bytes());
        assert_eq!(doc.meta, b"meta".to_vec());
    }
    db.commit()?;
    drop(db);

    let db = Db::open(&path, cfg)?;
    let mut iter = db.iter(None)?;
    let mut keys = Vec::new();
    while let Some(doc) = iter.next()? {
        keys.push(doc.key);
    }
    let mut expected: Vec<Vec<u8>> = ["aaab", "aaac", "aaba", "aba", "bbbb"]
        .iter()
        .map(|w| repeat_each(w))
        .collect();
    expected.sort();
    assert_eq!(keys, expected);
    Ok(())
}

#[test]
fn long_common_prefix_keys_split_and_collapse() -> Result<()> {
    let dir = tempdir()?;
    let mut db = Db::open(dir.path().join("prefix.hbt"), DbConfig::default())?;
    let keys: Vec<Vec<u8>> = ["aaaa", "aaab", "aaac"].iter().map(|w| repeat_each(w)).collect();
    for key in &keys {
        db.set(key, b"", key)?;
    }
    assert_eq!(db.stats().splits, 1);
    for key in &keys {
        assert_eq!(db.get(key)?.map(|d| d.body), Some(key.clone()));
    }
    assert!(db.delete(&keys[2])?);
    assert!(db.delete(&keys[1])?);
    assert!(db.stats().collapses >= 1);
    assert_eq!(db.get(&keys[0])?.map(|d| d.body), Some(keys[0].clone()));
    assert!(db.delete(&keys[0])?);
    assert!(db.trie().is_empty());
    assert_eq!(db.trie().store().level_count(), 0);
    Ok(())
}

#[test]
fn closure_resolver_over_a_hashmap() -> Result<()> {
    let keys: Rc<RefCell<HashMap<[u8; 8], Vec<u8>>>> = Rc::default();
    let lookup = Rc::clone(&keys);
    let resolver = move |value: &[u8]| -> Result<Vec<u8>> {
        let id: [u8; 8] = value
            .try_into()
            .map_err(|_| TrieError::Invariant("bad value width"))?;
        lookup
            .borrow()
            .get(&id)
            .cloned()
            .ok_or(TrieError::Corruption("unknown value"))
    };
    let opts = TrieOptions::default().chunksize(4).valuelen(8);
    let mut trie = HbTrie::new(opts, MemLevelStore::default(), resolver)?;

    let words: [&[u8]; 5] = [b"user:1001", b"user:1002", b"user:", b"users", b"u"];
    for (i, word) in words.iter().enumerate() {
        let value = (i as u64).to_be_bytes();
        keys.borrow_mut().insert(value, word.to_vec());
        assert_eq!(trie.insert(word, &value)?, None);
    }
    for (i, word) in words.iter().enumerate() {
        assert_eq!(trie.find(word)?, Some((i as u64).to_be_bytes().to_vec()));
    }
    assert_eq!(trie.find(b"user:1003")?, None);
    assert!(trie.stats().resolver_calls() > 0);

    let mut iter = trie.iter(Some(b"user:".as_slice()))?;
    let mut seen = Vec::new();
    while let Some((key, _)) = iter.next()? {
        seen.push(key);
    }
    assert_eq!(
        seen,
        vec![
            b"user:".to_vec(),
            b"user:1001".to_vec(),
            b"user:1002".to_vec(),
            b"users".to_vec()
        ]
    );
    Ok(())
}
