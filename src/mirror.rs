//! Mirror writer (C5): duplicate dirtied FAT blocks across every
//! secondary FAT copy.
//!
//! Grounded in `fat_mirror_bhs` in the original source: for each
//! secondary copy, each dirtied block gets a fresh buffer, the source
//! bytes are copied in verbatim, and the copy is marked uptodate and
//! dirty before an optional synchronous flush.

use crate::cache::{BlockCache, BlockHandle};
use crate::error::FatResult;
use crate::params::VolumeParams;

/// Copy every block in `dirty` to each of the `fat_copies - 1` secondary
/// FAT copies. A failure partway through short-circuits and is returned;
/// blocks already mirrored to earlier copies are left as-is — the
/// primary write is already durable, so replay on next mount/fsck is the
/// accepted recovery path (§4.5).
pub(crate) fn mirror_blocks(
    cache: &dyn BlockCache,
    params: &VolumeParams,
    dirty: &[BlockHandle],
    sync: bool,
) -> FatResult<()> {
    for copy in 1..params.fat_copies as u64 {
        let offset = copy * params.blocks_per_fat;
        let mut mirrored = Vec::with_capacity(dirty.len());
        for source in dirty {
            let target = cache.get(source.block_no() + offset)?;
            target.write().copy_from_slice(&source.read());
            cache.set_uptodate(&target);
            cache.mark_dirty(&target);
            mirrored.push(target);
        }
        if sync && !mirrored.is_empty() {
            cache.sync(&mirrored)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::params::{FatVariant, VolumeParams};
    use crate::test_support::MockCache;

    use super::*;

    #[test]
    fn every_secondary_copy_gets_byte_identical_blocks() {
        let cache = MockCache::new(512);
        let params = VolumeParams::new(FatVariant::Fat16, 512, 0, 10, 3, 1, 4096).unwrap();

        let source = cache.load(5).unwrap();
        source.write().fill(0xAB);
        let dirty = vec![source];

        mirror_blocks(cache.as_ref(), &params, &dirty, true).unwrap();

        assert_eq!(cache.bytes(15), vec![0xAB; 512]);
        assert_eq!(cache.bytes(25), vec![0xAB; 512]);
        assert_eq!(*cache.sync_calls.lock().unwrap(), 2);
    }

    #[test]
    fn no_secondary_copies_is_a_no_op() {
        let cache = MockCache::new(512);
        let params = VolumeParams::new(FatVariant::Fat16, 512, 0, 10, 1, 1, 4096).unwrap();
        mirror_blocks(cache.as_ref(), &params, &[], true).unwrap();
        assert_eq!(*cache.sync_calls.lock().unwrap(), 0);
    }
}
