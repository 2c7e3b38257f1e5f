//! Table I/O (C3): maps an entry index to (block number, byte offset)
//! via the codec, and issues readahead hints for the windowed scans used
//! by the allocator and the free-cluster counter.
//!
//! Grounded in `fat_ent_blocknr` and the readahead call preceding the
//! scan loops in `fat_count_free_clusters`/`fat_alloc_clusters` in the
//! original source.

use crate::cache::BlockCache;
use crate::constants::READAHEAD_WINDOW_BYTES;
use crate::params::VolumeParams;

fn window_blocks(params: &VolumeParams) -> u64 {
    (READAHEAD_WINDOW_BYTES / params.block_size as u64).max(1)
}

/// `true` once per window: callers issue a new readahead hint only at
/// block numbers that begin a 128 KiB window relative to the start of
/// the FAT, instead of on every block visited.
pub(crate) fn starts_window(params: &VolumeParams, block_no: u64) -> bool {
    let offset = block_no.saturating_sub(params.fat_start_block);
    offset % window_blocks(params) == 0
}

/// Hint that the 128 KiB window starting at `block_no` will likely be
/// read soon, clamped so it never reaches past the end of one FAT copy.
pub(crate) fn readahead_window(cache: &dyn BlockCache, params: &VolumeParams, block_no: u64) {
    let fat_end = params.fat_start_block + params.blocks_per_fat;
    if block_no >= fat_end {
        return;
    }
    let count = window_blocks(params).min(fat_end - block_no);
    cache.readahead(block_no, count);
}
