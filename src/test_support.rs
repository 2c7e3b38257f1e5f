//! In-memory test doubles for the cache/discard/FS-info collaborators,
//! grounded in the teacher's `MockFat` (`cluster_chain.rs`'s
//! `#[cfg(test)] mod tests`) and the fake backing stores built in its
//! FAT16/32 reader tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};

use crate::cache::{BlockCache, BlockHandle, Discard, FsInfoSink};
use crate::error::FatResult;

static LOG_INIT: Once = Once::new();

/// Initialize `env_logger` once for the whole test binary, so a failing
/// test's `log::debug!`/`log::error!` calls show up under `cargo test --
/// --nocapture` without every test paying for its own init.
pub(crate) fn init_test_logging() {
    LOG_INIT.call_once(|| {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

pub(crate) struct MockCache {
    block_size: usize,
    blocks: Mutex<HashMap<u64, BlockHandle>>,
    pub(crate) load_calls: Mutex<usize>,
    pub(crate) readahead_calls: Mutex<Vec<(u64, u64)>>,
    pub(crate) sync_calls: Mutex<usize>,
}

impl MockCache {
    pub(crate) fn new(block_size: usize) -> Arc<Self> {
        Arc::new(MockCache {
            block_size,
            blocks: Mutex::new(HashMap::new()),
            load_calls: Mutex::new(0),
            readahead_calls: Mutex::new(Vec::new()),
            sync_calls: Mutex::new(0),
        })
    }

    fn block(&self, block_no: u64) -> BlockHandle {
        self.blocks
            .lock()
            .expect("mock cache lock poisoned")
            .entry(block_no)
            .or_insert_with(|| BlockHandle::new(block_no, vec![0u8; self.block_size]))
            .clone()
    }

    pub(crate) fn bytes(&self, block_no: u64) -> Vec<u8> {
        self.block(block_no).read().clone()
    }

    pub(crate) fn set_bytes(&self, block_no: u64, bytes: Vec<u8>) {
        assert_eq!(bytes.len(), self.block_size, "seeded block has wrong size");
        *self.block(block_no).write() = bytes;
    }
}

impl BlockCache for MockCache {
    fn load(&self, block_no: u64) -> FatResult<BlockHandle> {
        *self.load_calls.lock().expect("mock cache lock poisoned") += 1;
        Ok(self.block(block_no))
    }

    fn get(&self, block_no: u64) -> FatResult<BlockHandle> {
        Ok(self.block(block_no))
    }

    fn mark_dirty(&self, _handle: &BlockHandle) {}

    fn sync(&self, _handles: &[BlockHandle]) -> FatResult<()> {
        *self.sync_calls.lock().expect("mock cache lock poisoned") += 1;
        Ok(())
    }

    fn readahead(&self, block_no: u64, count: u64) {
        self.readahead_calls
            .lock()
            .expect("mock cache lock poisoned")
            .push((block_no, count));
    }

    fn set_uptodate(&self, _handle: &BlockHandle) {}
}

pub(crate) struct MockDiscard {
    pub(crate) calls: Mutex<Vec<(u64, u64)>>,
}

impl MockDiscard {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(MockDiscard {
            calls: Mutex::new(Vec::new()),
        })
    }
}

impl Discard for MockDiscard {
    fn issue_discard(&self, first_block: u64, block_count: u64) {
        self.calls
            .lock()
            .expect("mock discard lock poisoned")
            .push((first_block, block_count));
    }
}

pub(crate) struct MockFsInfo {
    pub(crate) dirty_count: Mutex<usize>,
}

impl MockFsInfo {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(MockFsInfo {
            dirty_count: Mutex::new(0),
        })
    }
}

impl FsInfoSink for MockFsInfo {
    fn mark_fsinfo_dirty(&self) {
        *self.dirty_count.lock().expect("mock fsinfo lock poisoned") += 1;
    }
}
