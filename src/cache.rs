//! Collaborator traits the engine calls into but never implements.
//!
//! The block-buffer cache, the discard/TRIM path, and the FSINFO inode all
//! live in the host filesystem (mount machinery, inode layer) per the
//! scope cut in the spec's §1. This module only defines the seams,
//! grounded in the shape of the teacher's `JournalDevice` trait
//! (`families/ext/ext4_native/journal/jbd2.rs`) and its
//! `InodeJournalDevice` implementation, which reads/writes/syncs blocks
//! through a `Mutex<File>` the same way a real block cache would guard a
//! shared backing store.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::error::FatResult;

/// A pinned block buffer. Cloning increments the reference count (it's a
/// cheap `Arc` clone); dropping the last clone releases the block back to
/// the cache. This is the idiomatic Rust rendering of the spec's
/// "pin-then-enqueue; flush drops references" discipline — ownership
/// tracks the pin instead of a manually incremented counter.
#[derive(Clone)]
pub struct BlockHandle {
    block_no: u64,
    data: Arc<RwLock<Vec<u8>>>,
}

impl BlockHandle {
    pub fn new(block_no: u64, bytes: Vec<u8>) -> Self {
        BlockHandle {
            block_no,
            data: Arc::new(RwLock::new(bytes)),
        }
    }

    pub fn block_no(&self) -> u64 {
        self.block_no
    }

    pub fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<u8>> {
        self.data.read().expect("block buffer lock poisoned")
    }

    pub fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<u8>> {
        self.data.write().expect("block buffer lock poisoned")
    }

    /// Two handles are the same pinned block iff they share the backing
    /// allocation, not merely the same block number (a stale handle to a
    /// reused block number must not be confused with a fresh one).
    pub fn same_buffer(&self, other: &BlockHandle) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// The block-buffer cache collaborator (§6). Owned by the host filesystem;
/// the engine only ever borrows it.
pub trait BlockCache: Send + Sync {
    /// Pin and return the block, reading it from the backing store if it
    /// is not already cached.
    fn load(&self, block_no: u64) -> FatResult<BlockHandle>;

    /// Pin and return a fresh, zeroed block buffer without reading the
    /// backing store. Used by the mirror writer, which overwrites the
    /// buffer in full before marking it dirty.
    fn get(&self, block_no: u64) -> FatResult<BlockHandle>;

    /// Mark the block modified against the FAT-owning inode so a future
    /// writeback persists it.
    fn mark_dirty(&self, handle: &BlockHandle);

    /// Force the given blocks to durable storage synchronously.
    fn sync(&self, handles: &[BlockHandle]) -> FatResult<()>;

    /// Best-effort hint: the next `count` blocks starting at `block_no`
    /// will likely be read soon.
    fn readahead(&self, block_no: u64, count: u64);

    /// Mark a freshly written buffer as containing valid data (used after
    /// `get` + memcpy, before `mark_dirty`).
    fn set_uptodate(&self, handle: &BlockHandle);
}

/// The discard/TRIM collaborator (§6). Best-effort: errors are swallowed
/// by the implementation, never surfaced to the engine.
pub trait Discard: Send + Sync {
    fn issue_discard(&self, first_block: u64, block_count: u64);
}

/// The FSINFO persistence collaborator (§6, C6). A no-op implementation
/// is correct for FAT12/16 volumes and for read-only mounts.
pub trait FsInfoSink: Send + Sync {
    fn mark_fsinfo_dirty(&self);
}

/// An [`FsInfoSink`] that does nothing, for FAT12/16 volumes and
/// read-only mounts where §4.6 says this is a no-op.
pub struct NoFsInfo;

impl FsInfoSink for NoFsInfo {
    fn mark_fsinfo_dirty(&self) {}
}

/// Rate-limited message sink keyed by a coarse severity tag, standing in
/// for the host's `fat_msg_ratelimit`. Not a generic logging framework —
/// just enough throttling to keep a runaway corruption loop from flooding
/// `log`'s backend, which has no rate limiting of its own.
pub struct ErrorReporter {
    min_interval: Duration,
    last_emitted: std::sync::Mutex<Option<Instant>>,
}

impl ErrorReporter {
    pub fn new(min_interval: Duration) -> Self {
        ErrorReporter {
            min_interval,
            last_emitted: std::sync::Mutex::new(None),
        }
    }

    /// Report a volume-corruption condition. Only actually logs if the
    /// minimum interval has elapsed since the last report.
    pub fn report(&self, message: &str) {
        let mut last = self.last_emitted.lock().expect("reporter lock poisoned");
        let now = Instant::now();
        let should_emit = match *last {
            Some(prev) => now.duration_since(prev) >= self.min_interval,
            None => true,
        };
        if should_emit {
            *last = Some(now);
            log::error!("FAT: {message}");
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        ErrorReporter::new(Duration::from_secs(5))
    }
}
