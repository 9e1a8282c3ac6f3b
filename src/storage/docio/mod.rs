#![forbid(unsafe_code)]
//! Append-only document log.
//!
//! Each record is `keylen | metalen | bodylen | crc32` (big-endian u32s) followed by
//! the key, meta and body bytes. The record's offset is what the trie stores as its
//! value, and [`DocKeyResolver`] reads the key back from that offset.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::primitives::bytes::buf::Reader;
use crate::primitives::io::FileIo;
use crate::storage::hbtrie::KeyResolver;
use crate::types::{record_crc32, DocOffset, Result, TrieError};

/// Length of the fixed record header.
pub const DOC_HEADER_LEN: usize = 16;

/// One stored document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Document {
    /// Index key.
    pub key: Vec<u8>,
    /// Caller metadata.
    pub meta: Vec<u8>,
    /// Document body.
    pub body: Vec<u8>,
}

impl Document {
    /// Builds a document from borrowed parts.
    pub fn new(key: &[u8], meta: &[u8], body: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            meta: meta.to_vec(),
            body: body.to_vec(),
        }
    }

    fn encoded_len(&self) -> usize {
        DOC_HEADER_LEN + self.key.len() + self.meta.len() + self.body.len()
    }
}

#[derive(Default)]
struct DocLogMetrics {
    appends: AtomicU64,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
}

/// Snapshot of document log counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DocLogMetricsSnapshot {
    /// Records appended since open.
    pub appends: u64,
    /// Bytes appended since open.
    pub bytes_written: u64,
    /// Bytes read back since open.
    pub bytes_read: u64,
}

/// Append-only record store over a [`FileIo`].
pub struct DocLog {
    io: Arc<dyn FileIo>,
    end: Mutex<u64>,
    metrics: DocLogMetrics,
}

impl DocLog {
    /// Opens the log, discarding anything past `committed_len`.
    pub fn open(io: Arc<dyn FileIo>, committed_len: u64) -> Result<Self> {
        let actual = io.len()?;
        if actual < committed_len {
            return Err(TrieError::Corruption("document log shorter than committed length"));
        }
        if actual > committed_len {
            io.truncate(committed_len)?;
            trace!(from = actual, to = committed_len, "doc_log.truncate");
        }
        Ok(Self {
            io,
            end: Mutex::new(committed_len),
            metrics: DocLogMetrics::default(),
        })
    }

    /// Current end of the log.
    pub fn len(&self) -> u64 {
        *self.end.lock()
    }

    /// Returns true when nothing was ever appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `doc` and returns the offset of its record.
    pub fn append(&self, doc: &Document) -> Result<DocOffset> {
        let mut record = Vec::with_capacity(doc.encoded_len());
        for part in [&doc.key, &doc.meta, &doc.body] {
            let len = u32::try_from(part.len())
                .map_err(|_| TrieError::Invalid("document field exceeds u32::MAX bytes"))?;
            record.extend_from_slice(&len.to_be_bytes());
        }
        let crc = record_crc32(&doc.key, &doc.meta, &doc.body);
        record.extend_from_slice(&crc.to_be_bytes());
        record.extend_from_slice(&doc.key);
        record.extend_from_slice(&doc.meta);
        record.extend_from_slice(&doc.body);

        let mut end = self.end.lock();
        let offset = *end;
        self.io.write_at(offset, &record)?;
        *end += record.len() as u64;
        self.metrics.appends.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .bytes_written
            .fetch_add(record.len() as u64, Ordering::Relaxed);
        trace!(offset, len = record.len(), "doc_log.append");
        Ok(DocOffset(offset))
    }

    /// Reads and verifies the record at `offset`.
    pub fn read(&self, offset: DocOffset) -> Result<Document> {
        let (lens, crc) = self.read_header(offset)?;
        let total: u64 = lens.iter().map(|&l| l as u64).sum();
        let mut buf = vec![0u8; total as usize];
        self.read_span(offset.0 + DOC_HEADER_LEN as u64, &mut buf)?;
        let mut reader = Reader::new(&buf);
        let doc = Document {
            key: reader.take(lens[0] as usize)?.to_vec(),
            meta: reader.take(lens[1] as usize)?.to_vec(),
            body: reader.take(lens[2] as usize)?.to_vec(),
        };
        if record_crc32(&doc.key, &doc.meta, &doc.body) != crc {
            return Err(TrieError::Corruption("document record crc mismatch"));
        }
        self.metrics
            .bytes_read
            .fetch_add(DOC_HEADER_LEN as u64 + total, Ordering::Relaxed);
        Ok(doc)
    }

    /// Reads only the key of the record at `offset`.
    pub fn read_key(&self, offset: DocOffset) -> Result<Vec<u8>> {
        let (lens, _) = self.read_header(offset)?;
        let mut key = vec![0u8; lens[0] as usize];
        self.read_span(offset.0 + DOC_HEADER_LEN as u64, &mut key)?;
        self.metrics
            .bytes_read
            .fetch_add((DOC_HEADER_LEN + key.len()) as u64, Ordering::Relaxed);
        Ok(key)
    }

    /// Flushes appended records to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.io.sync_all()
    }

    /// Returns the current counters.
    pub fn metrics(&self) -> DocLogMetricsSnapshot {
        DocLogMetricsSnapshot {
            appends: self.metrics.appends.load(Ordering::Relaxed),
            bytes_written: self.metrics.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.metrics.bytes_read.load(Ordering::Relaxed),
        }
    }

    fn read_header(&self, offset: DocOffset) -> Result<([u32; 3], u32)> {
        let mut raw = [0u8; DOC_HEADER_LEN];
        self.read_span(offset.0, &mut raw)?;
        let mut reader = Reader::new(&raw);
        let lens = [reader.u32_be()?, reader.u32_be()?, reader.u32_be()?];
        let crc = reader.u32_be()?;
        let total: u64 = lens.iter().map(|&l| l as u64).sum();
        if offset.0 + DOC_HEADER_LEN as u64 + total > self.len() {
            return Err(TrieError::Corruption("document record runs past end of log"));
        }
        Ok((lens, crc))
    }

    fn read_span(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        let end = off
            .checked_add(dst.len() as u64)
            .ok_or(TrieError::Corruption("document offset overflow"))?;
        if end > self.len() {
            return Err(TrieError::Corruption("document offset past end of log"));
        }
        self.io.read_at(off, dst)
    }
}

/// Resolves trie values, which are document offsets, back to document keys.
#[derive(Clone)]
pub struct DocKeyResolver {
    log: Arc<DocLog>,
}

impl DocKeyResolver {
    /// Wraps a shared log.
    pub fn new(log: Arc<DocLog>) -> Self {
        Self { log }
    }
}

impl KeyResolver for DocKeyResolver {
    fn resolve(&self, value: &[u8]) -> Result<Vec<u8>> {
        self.log.read_key(DocOffset::from_value(value)?)
    }
}
