//! Allocator / Freer (C4): scans for free entries, builds and releases
//! cluster chains, optionally issues discards, and maintains the
//! free-cluster counter.
//!
//! Grounded in `fat_alloc_clusters`/`fat_free_clusters`/
//! `fat_count_free_clusters`/`fat_ent_update_badclusters_after` in the
//! original source. The per-call dirty set is a `Vec<BlockHandle>`
//! deduplicated by block identity rather than the source's manual
//! buffer-head reference counting, since `Arc` already tracks how long a
//! pinned block needs to live.

use crate::cache::BlockHandle;
use crate::constants::{FAT_START_ENT, FREE, MAX_DIRTY_SET};
use crate::cursor::EntryCursor;
use crate::error::{FatEngineError, FatResult};
use crate::mirror::mirror_blocks;
use crate::table_io;
use crate::volume::{AllocState, FatVolume};

/// Half the dirty-set cap, per the precondition in §4.4: allocations of
/// more than `K/2` clusters in one call are rejected so the dirty set
/// this call can accumulate never itself exceeds `K`.
const MAX_ALLOC_BATCH: usize = MAX_DIRTY_SET / 2;

fn push_dirty(dirty: &mut Vec<BlockHandle>, touched: Vec<BlockHandle>) {
    for handle in touched {
        if !dirty.iter().any(|d| d.same_buffer(&handle)) {
            dirty.push(handle);
        }
    }
}

impl FatVolume {
    fn flush_dirty(&self, dirty: &mut Vec<BlockHandle>, wait: bool) -> FatResult<()> {
        if dirty.is_empty() {
            return Ok(());
        }
        if wait {
            self.cache.sync(dirty)?;
        }
        mirror_blocks(self.cache.as_ref(), &self.params, dirty, wait)?;
        dirty.clear();
        Ok(())
    }

    fn discard_range(&self, first_cluster: u32, last_cluster: u32) {
        let Some(discard) = &self.discard else {
            return;
        };
        let sectors_per_cluster = self.params.sectors_per_cluster as u64;
        let count = (last_cluster - first_cluster + 1) as u64 * sectors_per_cluster;
        discard.issue_discard(first_cluster as u64 * sectors_per_cluster, count);
    }

    /// `allocate_clusters(n, wait)`: find `n` free entries starting from
    /// `prev_free + 1` (wrapping once at `max_cluster`), chain them
    /// together terminated by `EOF`, and return their indices in chain
    /// order (§4.4). On exhaustion the partial chain already built is
    /// freed before `NoSpace` is returned.
    pub fn allocate_clusters(&self, n: usize, wait: bool) -> FatResult<Vec<u32>> {
        if n == 0 || n > MAX_ALLOC_BATCH {
            return Err(FatEngineError::Invalid(format!(
                "allocate_clusters: n={n} out of range [1, {MAX_ALLOC_BATCH}]"
            )));
        }

        let mut state = self.lock.lock().expect("FAT lock poisoned");

        if let Some(free) = state.free_counter {
            if (free as usize) < n {
                return Err(FatEngineError::NoSpace);
            }
        }

        let eof = self.params.variant.eof();
        let span = self.params.max_cluster - FAT_START_ENT;
        let mut result: Vec<u32> = Vec::with_capacity(n);
        let mut dirty: Vec<BlockHandle> = Vec::new();
        let mut prev_cursor: Option<EntryCursor<'_>> = None;
        let mut entry = state.prev_free.wrapping_add(1);

        for _ in 0..span {
            if entry >= self.params.max_cluster {
                entry = FAT_START_ENT;
            }

            let mut cursor = self.cursor();
            cursor.set_entry(entry)?;
            if cursor.get() == FREE {
                push_dirty(&mut dirty, cursor.put(eof));
                if let Some(mut prev) = prev_cursor.take() {
                    push_dirty(&mut dirty, prev.put(entry));
                }

                result.push(entry);
                state.prev_free = entry;
                if let Some(free) = &mut state.free_counter {
                    *free -= 1;
                }

                if result.len() == n {
                    break;
                }
                prev_cursor = Some(cursor);
            }
            entry += 1;
        }

        if result.len() < n {
            // A full revolution without finding n entries means the table
            // is exhausted: the counter is exactly 0, not merely unknown.
            // Zero it before the rollback free so the rollback's
            // increments land on a valid counter (§7, §8 scenario 5).
            state.free_counter = Some(0);
            if let Some(&head) = result.first() {
                self.free_locked(&mut state, head, false)?;
            }
            return Err(FatEngineError::NoSpace);
        }

        self.flush_dirty(&mut dirty, wait)?;
        self.fsinfo.mark_fsinfo_dirty();
        Ok(result)
    }

    /// `free_chain(head, wait)`: walk the chain starting at `head`,
    /// marking every entry `FREE`. An unexpected `FREE` entry mid-chain
    /// is structural corruption, not silently tolerated (§4.4).
    pub fn free_chain(&self, head: u32, wait: bool) -> FatResult<()> {
        let mut state = self.lock.lock().expect("FAT lock poisoned");
        self.free_locked(&mut state, head, wait)
    }

    pub(crate) fn free_locked(&self, state: &mut AllocState, head: u32, wait: bool) -> FatResult<()> {
        self.check_entry(head)?;
        let eof = self.params.variant.eof();

        let mut dirty: Vec<BlockHandle> = Vec::new();
        let mut run_first = head;
        let mut current = head;

        loop {
            let mut cursor = self.cursor();
            cursor.set_entry(current)?;
            let next = cursor.get();
            if next == FREE {
                self.reporter
                    .report(&format!("FAT corruption: entry {current} was FREE mid-chain"));
                return Err(FatEngineError::Corrupt(format!(
                    "entry {current} was FREE mid-chain"
                )));
            }
            push_dirty(&mut dirty, cursor.put(FREE));
            drop(cursor);

            if let Some(free) = &mut state.free_counter {
                *free += 1;
            }

            let reached_eof = next == eof;
            let contiguous = !reached_eof && next == current + 1;
            if !contiguous {
                self.discard_range(run_first, current);
                run_first = next;
            }

            if dirty.len() >= MAX_DIRTY_SET {
                self.flush_dirty(&mut dirty, wait)?;
            }

            if reached_eof {
                break;
            }
            current = next;
        }

        self.flush_dirty(&mut dirty, wait)?;
        self.fsinfo.mark_fsinfo_dirty();
        Ok(())
    }

    /// `count_free_clusters()`: return the cached counter if valid,
    /// otherwise scan `[2, max_cluster)` once, issuing a readahead hint
    /// once per 128 KiB window (§4.4, §4.3).
    pub fn count_free_clusters(&self) -> FatResult<u32> {
        let mut state = self.lock.lock().expect("FAT lock poisoned");
        if let Some(free) = state.free_counter {
            return Ok(free);
        }

        let mut count: u32 = 0;
        let mut cursor = self.cursor();
        let mut entry = FAT_START_ENT;
        cursor.set_entry(entry)?;

        loop {
            if let Some(block) = cursor.buf0.as_ref().map(|b| b.block_no()) {
                if table_io::starts_window(&self.params, block) {
                    table_io::readahead_window(self.cache.as_ref(), &self.params, block);
                }
            }
            if cursor.get() == FREE {
                count += 1;
            }

            entry += 1;
            if entry >= self.params.max_cluster {
                break;
            }
            if !cursor.advance() {
                std::thread::yield_now();
                cursor.set_entry(entry)?;
            }
        }

        state.free_counter = Some(count);
        self.fsinfo.mark_fsinfo_dirty();
        Ok(count)
    }

    /// `mark_range_bad(from, wait)`: write `BAD` to every `FREE` entry in
    /// `[from, max_cluster)`, returning the number marked. Preserves the
    /// vendor mirror/sync asymmetry documented as a decided Open Question
    /// in `DESIGN.md`: the mirror copy always runs, but the synchronous
    /// flush of those mirrored blocks is skipped when nothing was marked.
    pub fn mark_range_bad(&self, from: u32, wait: bool) -> FatResult<u32> {
        self.check_entry(from)?;
        let bad = self.params.variant.bad();
        let mut state = self.lock.lock().expect("FAT lock poisoned");

        let mut dirty: Vec<BlockHandle> = Vec::new();
        let mut marked: u32 = 0;
        let mut cursor = self.cursor();
        let mut entry = from;
        cursor.set_entry(entry)?;

        loop {
            if cursor.get() == FREE {
                push_dirty(&mut dirty, cursor.put(bad));
                marked += 1;
                if let Some(free) = &mut state.free_counter {
                    *free = free.saturating_sub(1);
                }
            }

            if dirty.len() >= MAX_DIRTY_SET {
                self.flush_dirty(&mut dirty, wait && marked > 0)?;
            }

            entry += 1;
            if entry >= self.params.max_cluster {
                break;
            }
            if !cursor.advance() {
                cursor.set_entry(entry)?;
            }
        }
        drop(cursor);

        mirror_blocks(self.cache.as_ref(), &self.params, &dirty, wait && marked > 0)?;
        if marked > 0 {
            self.fsinfo.mark_fsinfo_dirty();
        }
        Ok(marked)
    }
}

#[cfg(test)]
mod tests {
    use crate::constants::{EOF_FAT16, FREE};
    use crate::params::{FatVariant, VolumeParams};
    use crate::test_support::MockCache;

    use super::*;

    fn fresh_volume(max_cluster: u32) -> FatVolume {
        crate::test_support::init_test_logging();
        let params = VolumeParams::new(FatVariant::Fat16, 512, 0, 10, 2, 1, max_cluster).unwrap();
        let cache = MockCache::new(512);
        FatVolume::mount(params, cache, None, None)
    }

    #[test]
    fn allocate_then_free_restores_every_entry_to_free() {
        let volume = fresh_volume(4096);

        let chain = volume.allocate_clusters(3, true).unwrap();
        assert_eq!(chain, vec![2, 3, 4]);
        assert_eq!(volume.read_entry(2).unwrap(), 3);
        assert_eq!(volume.read_entry(3).unwrap(), 4);
        assert_eq!(volume.read_entry(4).unwrap(), EOF_FAT16);

        let before = volume.count_free_clusters().unwrap();
        volume.free_chain(2, true).unwrap();
        assert_eq!(volume.read_entry(2).unwrap(), FREE);
        assert_eq!(volume.read_entry(3).unwrap(), FREE);
        assert_eq!(volume.read_entry(4).unwrap(), FREE);
        assert_eq!(volume.count_free_clusters().unwrap(), before + 3);
    }

    #[test]
    fn allocator_wraps_past_max_cluster() {
        let volume = fresh_volume(4096);
        {
            let mut state = volume.lock.lock().unwrap();
            state.prev_free = volume.params.max_cluster - 2;
        }
        // Occupy everything except 2 and 3 so the wrap has exactly enough room.
        for e in 4..volume.params.max_cluster {
            volume.write_entry(e, EOF_FAT16, false).unwrap();
        }

        let chain = volume.allocate_clusters(2, false).unwrap();
        assert_eq!(chain, vec![2, 3]);
    }

    #[test]
    fn exhaustion_returns_no_space_and_settles_the_counter_at_zero() {
        let volume = fresh_volume(8);
        for e in 2..volume.params.max_cluster {
            volume.write_entry(e, EOF_FAT16, false).unwrap();
        }

        let err = volume.allocate_clusters(1, false).unwrap_err();
        assert!(matches!(err, FatEngineError::NoSpace));

        // The counter must be valid at exactly 0 immediately after
        // exhaustion, not merely absent pending a future rescan.
        assert_eq!(volume.lock.lock().unwrap().free_counter, Some(0));
        assert_eq!(volume.count_free_clusters().unwrap(), 0);
    }

    #[test]
    fn count_free_clusters_matches_a_hand_seeded_volume() {
        let volume = fresh_volume(16);
        for e in 2..16 {
            volume.write_entry(e, FREE, false).unwrap();
        }
        volume.write_entry(5, EOF_FAT16, false).unwrap();
        assert_eq!(volume.count_free_clusters().unwrap(), 13);
    }

    #[test]
    fn free_chain_issues_one_discard_per_contiguous_run() {
        crate::test_support::init_test_logging();
        let params = VolumeParams::new(FatVariant::Fat16, 512, 0, 10, 1, 2, 4096).unwrap();
        let cache = MockCache::new(512);
        let discard = crate::test_support::MockDiscard::new();
        let volume = FatVolume::mount(params, cache, Some(discard.clone()), None);

        let chain = volume.allocate_clusters(4, false).unwrap();
        assert_eq!(chain, vec![2, 3, 4, 5]);
        volume.free_chain(2, false).unwrap();

        let calls = discard.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[(4, 8)]);
    }

    #[test]
    fn mark_range_bad_only_touches_free_entries() {
        let volume = fresh_volume(16);
        volume.write_entry(2, EOF_FAT16, false).unwrap();
        let marked = volume.mark_range_bad(2, true).unwrap();
        assert_eq!(marked, 13);
        assert_eq!(volume.read_entry(2).unwrap(), EOF_FAT16);
        assert_eq!(volume.read_entry(3).unwrap(), volume.params.variant.bad());
    }

    #[test]
    fn mark_range_bad_flushes_mid_scan_instead_of_pinning_the_whole_fat() {
        crate::test_support::init_test_logging();
        // 66 blocks' worth of entries at 256 entries/block: crossing
        // MAX_DIRTY_SET (64) unique blocks forces at least one mid-scan
        // flush before the scan completes.
        let max_cluster = 2 + 66 * 256;
        let params = VolumeParams::new(FatVariant::Fat16, 512, 0, 1024, 2, 1, max_cluster).unwrap();
        let cache = MockCache::new(512);
        let volume = FatVolume::mount(params, cache.clone(), None, None);

        let marked = volume.mark_range_bad(2, true).unwrap();
        assert_eq!(marked, max_cluster - 2);

        // A single end-of-scan flush would issue exactly one sync; seeing
        // more than one proves the dirty set was flushed mid-loop.
        assert!(*cache.sync_calls.lock().unwrap() > 1);
    }
}
