#![allow(missing_docs)]

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;

use hbtrie::db::docs_path;
use hbtrie::primitives::io::{FileIo, MemFileIo};
use hbtrie::{Db, DbConfig, LevelRef, Result, TrieError};
use tempfile::tempdir;

fn fill(db: &mut Db, range: std::ops::Range<u32>) -> Result<()> {
    for i in range {
        let key = format!("doc/{i:05}");
        db.set(key.as_bytes(), b"m", &i.to_be_bytes())?;
    }
    Ok(())
}

#[test]
fn committed_state_survives_reopen() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("reopen.hbt");
    let cfg = DbConfig::default().block_size(1024).chunksize(4);
    {
        let mut db = Db::open(&path, cfg.clone())?;
        assert_eq!(db.root(), LevelRef::NONE);
        fill(&mut db, 0..500)?;
        let meta = db.commit()?;
        assert_eq!(meta.commit_seq, 1);
        assert!(db.delete(b"doc/00007")?);
        db.commit()?;
    }
    let db = Db::open(&path, cfg)?;
    assert_eq!(db.get(b"doc/00007")?, None);
    let doc = db.get(b"doc/00420")?.expect("committed document");
    assert_eq!(doc.body, 420u32.to_be_bytes().to_vec());
    let mut iter = db.iter(Some(b"doc/00490".as_slice()))?;
    let mut n = 0;
    while iter.next()?.is_some() {
        n += 1;
    }
    assert_eq!(n, 10);
    Ok(())
}

#[test]
fn uncommitted_changes_are_discarded() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("discard.hbt");
    let cfg = DbConfig::default();
    let committed_docs = {
        let mut db = Db::open(&path, cfg.clone())?;
        fill(&mut db, 0..100)?;
        let meta = db.commit()?;
        fill(&mut db, 100..200)?;
        assert!(db.delete(b"doc/00001")?);
        db.trie().stats().emit_tracing();
        meta.doc_len
    };
    assert!(std::fs::metadata(docs_path(&path))?.len() > committed_docs);
    let db = Db::open(&path, cfg)?;
    assert!(db.get(b"doc/00001")?.is_some());
    assert_eq!(db.get(b"doc/00150")?, None);
    assert_eq!(std::fs::metadata(docs_path(&path))?.len(), committed_docs);
    Ok(())
}

#[test]
fn corrupted_header_is_reported() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("corrupt.hbt");
    {
        let mut db = Db::open(&path, DbConfig::default())?;
        fill(&mut db, 0..10)?;
        db.commit()?;
    }
    let mut file = OpenOptions::new().write(true).open(&path)?;
    file.seek(SeekFrom::Start(24))?;
    file.write_all(&[0xAB; 4])?;
    file.sync_all()?;
    drop(file);

    match Db::open(&path, DbConfig::default()) {
        Err(TrieError::Corruption(_)) => Ok(()),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("corrupted header accepted"),
    }
}

#[test]
fn block_size_mismatch_is_rejected() -> Result<()> {
    let index = MemFileIo::new();
    let docs = MemFileIo::new();
    let open = |cfg: DbConfig| {
        let index: Arc<dyn FileIo> = Arc::new(index.clone());
        let docs: Arc<dyn FileIo> = Arc::new(docs.clone());
        Db::open_with_io(index, docs, cfg)
    };
    let mut db = open(DbConfig::default().block_size(512))?;
    fill(&mut db, 0..3)?;
    db.commit()?;
    drop(db);
    assert!(matches!(
        open(DbConfig::default().block_size(1024)),
        Err(TrieError::Invalid(_))
    ));
    let db = open(DbConfig::default().block_size(512))?;
    assert!(db.get(b"doc/00002")?.is_some());
    Ok(())
}

#[test]
fn config_file_drives_the_session() -> Result<()> {
    let dir = tempdir()?;
    let cfg_path = dir.path().join("hbtrie.toml");
    std::fs::write(&cfg_path, "chunksize = 2\nblock_size = 512\ncache_levels = 0\n")?;
    let cfg = DbConfig::load(&cfg_path)?;
    let mut db = Db::open(dir.path().join("cfg.hbt"), cfg)?;
    assert_eq!(db.config().chunksize, 2);
    fill(&mut db, 0..50)?;
    db.commit()?;
    assert_eq!(db.get(b"doc/00049")?.map(|d| d.meta), Some(b"m".to_vec()));
    Ok(())
}
