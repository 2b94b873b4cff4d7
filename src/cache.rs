//! Block-addressed access to the index file.
//!
//! The index file is a sequence of fixed-size blocks; every policy exposes
//! the same call surface and is the single source of I/O counters. Returned
//! blocks are reference counted, so `free_block` is a recycling hint rather
//! than an invalidation: a traversal holding an `Arc` keeps its data alive
//! even after the cache evicts the entry.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use memmap2::Mmap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

/// The fixed size of each on-disk block, in bytes.
pub const BLOCK_SIZE: usize = 65_536;
/// Block size in u32 words.
pub const BLOCK_WORDS: usize = BLOCK_SIZE / 4;

pub type BlockBuf = Arc<Vec<u32>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub cached_bytes_read: u64,
    pub disk_bytes_read: u64,
}

pub trait BlockCache: Send + Sync {
    /// Schedules `count` blocks starting at `start` for read-ahead.
    fn queue_blocks(&self, start: u64, count: u64);

    /// Returns the resident contents of block `block`, fetching if needed.
    fn get_block(&self, block: u64) -> Result<BlockBuf>;

    /// Releases block `block` back to the cache.
    fn free_block(&self, block: u64);

    fn total_blocks(&self) -> u64;

    fn stats(&self) -> CacheStats;
}

fn bytes_to_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn file_block_count(len: u64, path: &Path) -> Result<u64> {
    if len % BLOCK_SIZE as u64 != 0 {
        return Err(Error::Corruption(format!(
            "index file '{}' is {} bytes, not a multiple of the block size",
            path.display(),
            len
        )));
    }
    Ok(len / BLOCK_SIZE as u64)
}

struct LruState {
    file: File,
    resident: FxHashMap<u64, BlockBuf>,
    recency: VecDeque<u64>,
}

impl LruState {
    fn read_block(&mut self, block: u64) -> Result<BlockBuf> {
        let mut bytes = vec![0u8; BLOCK_SIZE];
        self.file
            .seek(SeekFrom::Start(block * BLOCK_SIZE as u64))?;
        self.file.read_exact(&mut bytes)?;
        Ok(Arc::new(bytes_to_words(&bytes)))
    }

    fn touch(&mut self, block: u64) {
        if let Some(pos) = self.recency.iter().position(|&b| b == block) {
            self.recency.remove(pos);
        }
        self.recency.push_back(block);
    }

    fn admit(&mut self, block: u64, buf: BlockBuf, capacity: usize) {
        while self.resident.len() >= capacity {
            match self.recency.pop_front() {
                Some(victim) => {
                    self.resident.remove(&victim);
                }
                None => break,
            }
        }
        self.resident.insert(block, buf);
        self.touch(block);
    }
}

/// Fixed-capacity resident set with least-recently-returned eviction.
pub struct LruCache {
    state: Mutex<LruState>,
    capacity: usize,
    total_blocks: u64,
    cached_bytes_read: AtomicU64,
    disk_bytes_read: AtomicU64,
}

impl LruCache {
    pub fn open(path: impl AsRef<Path>, capacity_blocks: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let total_blocks = file_block_count(file.metadata()?.len(), path)?;
        Ok(Self {
            state: Mutex::new(LruState {
                file,
                resident: FxHashMap::default(),
                recency: VecDeque::new(),
            }),
            capacity: capacity_blocks.max(1),
            total_blocks,
            cached_bytes_read: AtomicU64::new(0),
            disk_bytes_read: AtomicU64::new(0),
        })
    }
}

impl BlockCache for LruCache {
    fn queue_blocks(&self, start: u64, count: u64) {
        // Read-ahead: pull the requested range into the resident set so the
        // traversal finds the blocks warm.
        let mut state = self.state.lock();
        let end = (start + count).min(self.total_blocks);
        for block in start..end {
            if state.resident.contains_key(&block) {
                continue;
            }
            if state.resident.len() >= self.capacity {
                break;
            }
            if let Ok(buf) = state.read_block(block) {
                self.disk_bytes_read
                    .fetch_add(BLOCK_SIZE as u64, Ordering::Relaxed);
                state.admit(block, buf, self.capacity);
            }
        }
    }

    fn get_block(&self, block: u64) -> Result<BlockBuf> {
        if block >= self.total_blocks {
            return Err(Error::Corruption(format!(
                "block {} out of range ({} total)",
                block, self.total_blocks
            )));
        }
        let mut state = self.state.lock();
        if let Some(buf) = state.resident.get(&block).cloned() {
            self.cached_bytes_read
                .fetch_add(BLOCK_SIZE as u64, Ordering::Relaxed);
            state.touch(block);
            return Ok(buf);
        }
        let buf = state.read_block(block)?;
        self.disk_bytes_read
            .fetch_add(BLOCK_SIZE as u64, Ordering::Relaxed);
        state.admit(block, buf.clone(), self.capacity);
        Ok(buf)
    }

    fn free_block(&self, _block: u64) {}

    fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            cached_bytes_read: self.cached_bytes_read.load(Ordering::Relaxed),
            disk_bytes_read: self.disk_bytes_read.load(Ordering::Relaxed),
        }
    }
}

/// Entire file memory-mapped; the kernel handles read-ahead and paging.
pub struct MmapCache {
    mmap: Mmap,
    total_blocks: u64,
    cached_bytes_read: AtomicU64,
}

impl MmapCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let total_blocks = file_block_count(file.metadata()?.len(), path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            total_blocks,
            cached_bytes_read: AtomicU64::new(0),
        })
    }
}

impl BlockCache for MmapCache {
    fn queue_blocks(&self, _start: u64, _count: u64) {}

    fn get_block(&self, block: u64) -> Result<BlockBuf> {
        if block >= self.total_blocks {
            return Err(Error::Corruption(format!(
                "block {} out of range ({} total)",
                block, self.total_blocks
            )));
        }
        let start = block as usize * BLOCK_SIZE;
        self.cached_bytes_read
            .fetch_add(BLOCK_SIZE as u64, Ordering::Relaxed);
        Ok(Arc::new(bytes_to_words(
            &self.mmap[start..start + BLOCK_SIZE],
        )))
    }

    fn free_block(&self, _block: u64) {}

    fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            cached_bytes_read: self.cached_bytes_read.load(Ordering::Relaxed),
            disk_bytes_read: 0,
        }
    }
}

/// File read once at startup into a contiguous resident set.
pub struct ResidentCache {
    blocks: Vec<BlockBuf>,
    cached_bytes_read: AtomicU64,
    disk_bytes_read: AtomicU64,
}

impl ResidentCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let total_blocks = file_block_count(file.metadata()?.len(), path)?;
        let mut blocks = Vec::with_capacity(total_blocks as usize);
        let mut bytes = vec![0u8; BLOCK_SIZE];
        for _ in 0..total_blocks {
            file.read_exact(&mut bytes)?;
            blocks.push(Arc::new(bytes_to_words(&bytes)));
        }
        Ok(Self {
            blocks,
            cached_bytes_read: AtomicU64::new(0),
            disk_bytes_read: AtomicU64::new(total_blocks * BLOCK_SIZE as u64),
        })
    }
}

impl BlockCache for ResidentCache {
    fn queue_blocks(&self, _start: u64, _count: u64) {}

    fn get_block(&self, block: u64) -> Result<BlockBuf> {
        self.cached_bytes_read
            .fetch_add(BLOCK_SIZE as u64, Ordering::Relaxed);
        self.blocks
            .get(block as usize)
            .cloned()
            .ok_or_else(|| {
                Error::Corruption(format!(
                    "block {} out of range ({} total)",
                    block,
                    self.blocks.len()
                ))
            })
    }

    fn free_block(&self, _block: u64) {}

    fn total_blocks(&self) -> u64 {
        self.blocks.len() as u64
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            cached_bytes_read: self.cached_bytes_read.load(Ordering::Relaxed),
            disk_bytes_read: self.disk_bytes_read.load(Ordering::Relaxed),
        }
    }
}

/// Optimized for single-pass linear scans (merging, layering, diffing):
/// sequential read-ahead over a small sliding window, with `free_block`
/// dropping everything behind the scan position.
pub struct MergingCache {
    state: Mutex<LruState>,
    window: usize,
    total_blocks: u64,
    cached_bytes_read: AtomicU64,
    disk_bytes_read: AtomicU64,
}

impl MergingCache {
    const DEFAULT_WINDOW: usize = 64;

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let total_blocks = file_block_count(file.metadata()?.len(), path)?;
        Ok(Self {
            state: Mutex::new(LruState {
                file,
                resident: FxHashMap::default(),
                recency: VecDeque::new(),
            }),
            window: Self::DEFAULT_WINDOW,
            total_blocks,
            cached_bytes_read: AtomicU64::new(0),
            disk_bytes_read: AtomicU64::new(0),
        })
    }
}

impl BlockCache for MergingCache {
    fn queue_blocks(&self, start: u64, count: u64) {
        let mut state = self.state.lock();
        let end = (start + count.min(self.window as u64)).min(self.total_blocks);
        for block in start..end {
            if state.resident.contains_key(&block) {
                continue;
            }
            if let Ok(buf) = state.read_block(block) {
                self.disk_bytes_read
                    .fetch_add(BLOCK_SIZE as u64, Ordering::Relaxed);
                state.admit(block, buf, self.window);
            }
        }
    }

    fn get_block(&self, block: u64) -> Result<BlockBuf> {
        if block >= self.total_blocks {
            return Err(Error::Corruption(format!(
                "block {} out of range ({} total)",
                block, self.total_blocks
            )));
        }
        let mut state = self.state.lock();
        if let Some(buf) = state.resident.get(&block).cloned() {
            self.cached_bytes_read
                .fetch_add(BLOCK_SIZE as u64, Ordering::Relaxed);
            return Ok(buf);
        }
        let buf = state.read_block(block)?;
        self.disk_bytes_read
            .fetch_add(BLOCK_SIZE as u64, Ordering::Relaxed);
        state.admit(block, buf.clone(), self.window);
        Ok(buf)
    }

    fn free_block(&self, block: u64) {
        // Fire and forget: a linear scan never revisits earlier blocks.
        let mut state = self.state.lock();
        state.resident.retain(|&b, _| b > block);
        state.recency.retain(|&b| b > block);
    }

    fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            cached_bytes_read: self.cached_bytes_read.load(Ordering::Relaxed),
            disk_bytes_read: self.disk_bytes_read.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_file(num_blocks: usize) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.idx");
        let mut file = File::create(&path).unwrap();
        for b in 0..num_blocks {
            let mut block = vec![0u8; BLOCK_SIZE];
            block[..4].copy_from_slice(&(b as u32).to_le_bytes());
            file.write_all(&block).unwrap();
        }
        (dir, path)
    }

    #[test]
    fn test_lru_eviction_and_counters() {
        let (_dir, path) = write_test_file(8);
        let cache = LruCache::open(&path, 2).unwrap();
        assert_eq!(cache.total_blocks(), 8);

        for b in 0..8u64 {
            let buf = cache.get_block(b).unwrap();
            assert_eq!(buf[0], b as u32);
        }
        let stats = cache.stats();
        assert_eq!(stats.disk_bytes_read, 8 * BLOCK_SIZE as u64);
        assert_eq!(stats.cached_bytes_read, 0);

        // Most recent block is still resident.
        cache.get_block(7).unwrap();
        assert_eq!(cache.stats().cached_bytes_read, BLOCK_SIZE as u64);
    }

    #[test]
    fn test_lru_read_ahead() {
        let (_dir, path) = write_test_file(8);
        let cache = LruCache::open(&path, 8).unwrap();
        cache.queue_blocks(0, 4);
        assert_eq!(cache.stats().disk_bytes_read, 4 * BLOCK_SIZE as u64);
        cache.get_block(2).unwrap();
        assert_eq!(cache.stats().cached_bytes_read, BLOCK_SIZE as u64);
    }

    #[test]
    fn test_mmap_cache() {
        let (_dir, path) = write_test_file(3);
        let cache = MmapCache::open(&path).unwrap();
        assert_eq!(cache.total_blocks(), 3);
        assert_eq!(cache.get_block(2).unwrap()[0], 2);
        assert!(cache.get_block(3).is_err());
    }

    #[test]
    fn test_resident_cache() {
        let (_dir, path) = write_test_file(3);
        let cache = ResidentCache::open(&path).unwrap();
        assert_eq!(cache.get_block(0).unwrap()[0], 0);
        assert_eq!(cache.get_block(2).unwrap()[0], 2);
        assert_eq!(cache.stats().disk_bytes_read, 3 * BLOCK_SIZE as u64);
    }

    #[test]
    fn test_merging_cache_drops_behind() {
        let (_dir, path) = write_test_file(6);
        let cache = MergingCache::open(&path).unwrap();
        cache.queue_blocks(0, 6);
        cache.get_block(0).unwrap();
        cache.free_block(2);
        // Blocks at or before the freed position were dropped; later ones stay warm.
        let before = cache.stats().disk_bytes_read;
        cache.get_block(5).unwrap();
        assert_eq!(cache.stats().disk_bytes_read, before);
        cache.get_block(1).unwrap();
        assert_eq!(cache.stats().disk_bytes_read, before + BLOCK_SIZE as u64);
    }

    #[test]
    fn test_partial_block_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.idx");
        std::fs::write(&path, vec![0u8; 100]).unwrap();
        assert!(LruCache::open(&path, 4).is_err());
    }
}
