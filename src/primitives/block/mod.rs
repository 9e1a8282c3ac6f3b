#![forbid(unsafe_code)]
//! Fixed-size block allocation over a positioned-I/O file.
//!
//! Block 0 holds the [`Meta`] header. Every other block belongs to a chain
//! written by a store above this layer. Blocks below the committed watermark
//! are immutable; a commit writes new blocks first and the header last, so a
//! crash before the header lands leaves the previous commit readable.

use std::io::ErrorKind;
use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::primitives::io::FileIo;
use crate::types::{block_crc32, BlockId, LevelRef, Result, TrieError};

/// Magic bytes at the start of the header block.
pub const BLOCK_MAGIC: [u8; 4] = *b"HBTR";
/// On-disk format version written into the header.
pub const BLOCK_FORMAT_VERSION: u16 = 1;
/// Smallest block size accepted.
pub const MIN_BLOCK_SIZE: u32 = 64;
/// Largest block size accepted; the chained-block fill counter is 16 bits.
pub const MAX_BLOCK_SIZE: u32 = 65536;
/// Bytes reserved at the start of each chained block.
pub const CHAIN_HDR_LEN: usize = 14;

const META_MAGIC: Range<usize> = 0..4;
const META_FORMAT_VERSION: Range<usize> = 4..6;
const META_RESERVED: Range<usize> = 6..8;
const META_BLOCK_SIZE: Range<usize> = 8..12;
const META_NEXT_BLOCK: Range<usize> = 12..20;
const META_ROOT: Range<usize> = 20..28;
const META_LEVEL_TABLE: Range<usize> = 28..36;
const META_NEXT_LEVEL: Range<usize> = 36..44;
const META_DOC_LEN: Range<usize> = 44..52;
const META_COMMIT_SEQ: Range<usize> = 52..60;
const META_CRC32: Range<usize> = 60..64;
const META_LEN: usize = 64;

const CHAIN_CRC32: Range<usize> = 0..4;
const CHAIN_NEXT: Range<usize> = 4..12;
const CHAIN_USED: Range<usize> = 12..14;

/// Header block contents describing the last commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Meta {
    /// Size of every block in bytes.
    pub block_size: u32,
    /// Next block id to hand out.
    pub next_block: u64,
    /// Committed trie root reference.
    pub root: LevelRef,
    /// Head of the persisted level table, block 0 when none was written.
    pub level_table: BlockId,
    /// Next logical level id.
    pub next_level: u64,
    /// Committed length of the document log.
    pub doc_len: u64,
    /// Monotonic commit counter.
    pub commit_seq: u64,
}

impl Meta {
    fn fresh(block_size: u32) -> Self {
        Self {
            block_size,
            next_block: 1,
            root: LevelRef::NONE,
            level_table: BlockId(0),
            next_level: 0,
            doc_len: 0,
            commit_seq: 0,
        }
    }

    fn encode(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < META_LEN {
            return Err(TrieError::Invalid("meta buffer too small"));
        }
        buf.fill(0);
        buf[META_MAGIC].copy_from_slice(&BLOCK_MAGIC);
        buf[META_FORMAT_VERSION].copy_from_slice(&BLOCK_FORMAT_VERSION.to_be_bytes());
        buf[META_BLOCK_SIZE].copy_from_slice(&self.block_size.to_be_bytes());
        buf[META_NEXT_BLOCK].copy_from_slice(&self.next_block.to_be_bytes());
        buf[META_ROOT].copy_from_slice(&self.root.to_be_bytes());
        buf[META_LEVEL_TABLE].copy_from_slice(&self.level_table.0.to_be_bytes());
        buf[META_NEXT_LEVEL].copy_from_slice(&self.next_level.to_be_bytes());
        buf[META_DOC_LEN].copy_from_slice(&self.doc_len.to_be_bytes());
        buf[META_COMMIT_SEQ].copy_from_slice(&self.commit_seq.to_be_bytes());
        let crc = block_crc32(0, &buf[..META_CRC32.start]);
        buf[META_CRC32].copy_from_slice(&crc.to_be_bytes());
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < META_LEN {
            return Err(TrieError::Corruption("meta block truncated"));
        }
        if buf[META_MAGIC] != BLOCK_MAGIC {
            return Err(TrieError::Corruption("meta block magic mismatch"));
        }
        let crc = be_u32(&buf[META_CRC32]);
        if crc != block_crc32(0, &buf[..META_CRC32.start]) {
            return Err(TrieError::Corruption("meta block crc mismatch"));
        }
        let version = be_u16(&buf[META_FORMAT_VERSION]);
        if version != BLOCK_FORMAT_VERSION {
            return Err(TrieError::Corruption("unsupported block format version"));
        }
        if buf[META_RESERVED] != [0, 0] {
            return Err(TrieError::Corruption("meta reserved field non-zero"));
        }
        let read_u64 = |range: Range<usize>| be_u64(&buf[range]);
        Ok(Self {
            block_size: be_u32(&buf[META_BLOCK_SIZE]),
            next_block: read_u64(META_NEXT_BLOCK),
            root: LevelRef(read_u64(META_ROOT)),
            level_table: BlockId(read_u64(META_LEVEL_TABLE)),
            next_level: read_u64(META_NEXT_LEVEL),
            doc_len: read_u64(META_DOC_LEN),
            commit_seq: read_u64(META_COMMIT_SEQ),
        })
    }
}

/// Configuration for [`BlockFile`].
#[derive(Clone, Debug)]
pub struct BlockFileOptions {
    /// Block size in bytes. Must match the size recorded in an existing file.
    pub block_size: u32,
    /// Whether `commit` issues fsync barriers.
    pub sync_on_commit: bool,
}

impl Default for BlockFileOptions {
    fn default() -> Self {
        Self {
            block_size: 4096,
            sync_on_commit: true,
        }
    }
}

struct BlockState {
    committed: Meta,
    next_block: u64,
}

/// Block allocator and commit header over a [`FileIo`].
pub struct BlockFile {
    io: Arc<dyn FileIo>,
    block_size: usize,
    sync_on_commit: bool,
    state: Mutex<BlockState>,
}

impl BlockFile {
    /// Opens an existing block file, or initialises an empty one.
    pub fn open(io: Arc<dyn FileIo>, opts: BlockFileOptions) -> Result<Self> {
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&opts.block_size) {
            return Err(TrieError::Invalid("block size out of range"));
        }
        let block_size = opts.block_size as usize;
        let meta = if io.is_empty()? {
            let meta = Meta::fresh(opts.block_size);
            write_meta(io.as_ref(), &meta, block_size)?;
            if opts.sync_on_commit {
                io.sync_all()?;
            }
            debug!(block_size, "block_file.create");
            meta
        } else {
            let meta = read_meta(io.as_ref())?;
            if meta.block_size != opts.block_size {
                return Err(TrieError::Invalid("block size does not match file"));
            }
            debug!(
                block_size,
                next_block = meta.next_block,
                commit_seq = meta.commit_seq,
                "block_file.open"
            );
            meta
        };
        Ok(Self {
            io,
            block_size,
            sync_on_commit: opts.sync_on_commit,
            state: Mutex::new(BlockState {
                next_block: meta.next_block,
                committed: meta,
            }),
        })
    }

    /// Size of each block in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Payload bytes available in one chained block.
    pub fn chain_capacity(&self) -> usize {
        self.block_size - CHAIN_HDR_LEN
    }

    /// Header contents as of the last commit.
    pub fn meta(&self) -> Meta {
        self.state.lock().committed.clone()
    }

    /// Hands out a fresh block id past the committed region.
    pub fn allocate(&self) -> BlockId {
        let mut state = self.state.lock();
        let id = BlockId(state.next_block);
        state.next_block += 1;
        id
    }

    /// Returns true when `id` belongs to the last committed image.
    pub fn is_committed(&self, id: BlockId) -> bool {
        id.0 != 0 && id.0 < self.state.lock().committed.next_block
    }

    /// Writes one full block. Committed blocks are immutable.
    pub fn write(&self, id: BlockId, data: &[u8]) -> Result<()> {
        if id.0 == 0 {
            return Err(TrieError::Invalid("block 0 is reserved for the header"));
        }
        if self.is_committed(id) {
            return Err(TrieError::Invalid("committed block is immutable"));
        }
        if data.len() != self.block_size {
            return Err(TrieError::Invalid("block write must cover one block"));
        }
        self.io.write_at(self.offset(id), data)
    }

    /// Reads one full block.
    pub fn read(&self, id: BlockId) -> Result<Vec<u8>> {
        if id.0 == 0 {
            return Err(TrieError::Invalid("block 0 is reserved for the header"));
        }
        let mut buf = vec![0u8; self.block_size];
        match self.io.read_at(self.offset(id), &mut buf) {
            Ok(()) => Ok(buf),
            Err(TrieError::Io(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                Err(TrieError::Corruption("block beyond end of file"))
            }
            Err(err) => Err(err),
        }
    }

    /// Writes `payload` across freshly allocated chained blocks, returning the head.
    pub fn write_chain(&self, payload: &[u8]) -> Result<BlockId> {
        let capacity = self.chain_capacity();
        let count = payload.len().div_ceil(capacity).max(1);
        let ids: Vec<BlockId> = (0..count).map(|_| self.allocate()).collect();
        let mut block = vec![0u8; self.block_size];
        for (idx, id) in ids.iter().enumerate() {
            let start = idx * capacity;
            let end = (start + capacity).min(payload.len());
            let chunk = &payload[start.min(end)..end];
            let next = ids.get(idx + 1).map_or(0, |next| next.0);
            block.fill(0);
            block[CHAIN_NEXT].copy_from_slice(&next.to_be_bytes());
            block[CHAIN_USED].copy_from_slice(&(chunk.len() as u16).to_be_bytes());
            block[CHAIN_HDR_LEN..CHAIN_HDR_LEN + chunk.len()].copy_from_slice(chunk);
            let crc = block_crc32(id.0, &block[CHAIN_CRC32.end..]);
            block[CHAIN_CRC32].copy_from_slice(&crc.to_be_bytes());
            self.write(*id, &block)?;
        }
        trace!(
            head = ids[0].0,
            blocks = count,
            bytes = payload.len(),
            "block_file.write_chain"
        );
        Ok(ids[0])
    }

    /// Reads back a chain written by [`BlockFile::write_chain`].
    pub fn read_chain(&self, head: BlockId) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut current = head;
        let mut hops = 0u64;
        loop {
            let block = self.read(current)?;
            let crc = be_u32(&block[CHAIN_CRC32]);
            if crc != block_crc32(current.0, &block[CHAIN_CRC32.end..]) {
                return Err(TrieError::Corruption("chained block crc mismatch"));
            }
            let next = be_u64(&block[CHAIN_NEXT]);
            let used = be_u16(&block[CHAIN_USED]) as usize;
            if used > self.chain_capacity() {
                return Err(TrieError::Corruption("chained block overfull"));
            }
            out.extend_from_slice(&block[CHAIN_HDR_LEN..CHAIN_HDR_LEN + used]);
            if next == 0 {
                return Ok(out);
            }
            hops += 1;
            if hops >= self.state.lock().next_block {
                return Err(TrieError::Corruption("chained block cycle"));
            }
            current = BlockId(next);
        }
    }

    /// Makes every block written so far durable, then writes the new header.
    pub fn commit(
        &self,
        root: LevelRef,
        level_table: BlockId,
        next_level: u64,
        doc_len: u64,
    ) -> Result<Meta> {
        let mut state = self.state.lock();
        if self.sync_on_commit {
            self.io.sync_all()?;
        }
        let mut meta = state.committed.clone();
        meta.next_block = state.next_block;
        meta.root = root;
        meta.level_table = level_table;
        meta.next_level = next_level;
        meta.doc_len = doc_len;
        meta.commit_seq += 1;
        write_meta(self.io.as_ref(), &meta, self.block_size)?;
        if self.sync_on_commit {
            self.io.sync_all()?;
        }
        state.committed = meta.clone();
        debug!(
            root = %meta.root,
            next_block = meta.next_block,
            commit_seq = meta.commit_seq,
            "block_file.commit"
        );
        Ok(meta)
    }

    fn offset(&self, id: BlockId) -> u64 {
        id.0 * self.block_size as u64
    }
}

fn write_meta(io: &dyn FileIo, meta: &Meta, block_size: usize) -> Result<()> {
    let mut buf = vec![0u8; block_size];
    meta.encode(&mut buf)?;
    io.write_at(0, &buf)
}

fn read_meta(io: &dyn FileIo) -> Result<Meta> {
    let mut buf = vec![0u8; META_LEN];
    match io.read_at(0, &mut buf) {
        Ok(()) => {}
        Err(TrieError::Io(err)) if err.kind() == ErrorKind::UnexpectedEof => {
            return Err(TrieError::Corruption("meta block truncated"));
        }
        Err(err) => return Err(err),
    }
    Meta::decode(&buf)
}

fn be_u16(bytes: &[u8]) -> u16 {
    let mut raw = [0u8; 2];
    raw.copy_from_slice(bytes);
    u16::from_be_bytes(raw)
}

fn be_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    u32::from_be_bytes(raw)
}

fn be_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    u64::from_be_bytes(raw)
}
