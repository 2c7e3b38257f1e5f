//! Entry cursor (C2): a stateful handle pairing a logical entry index
//! with the block(s) currently pinned for it.
//!
//! Grounded in `struct fat_entry` from `original_source/fs/fat/fatent.c`
//! (`bhs[2]`, `nr_bhs`, `entry`, and the decoded pointer union) and in
//! `fat_ent_update_ptr`, whose "is this fatent's blocks still covering
//! this entry" fast path is reproduced here as [`EntryCursor::set_entry`].

use std::sync::Arc;

use crate::cache::{BlockCache, BlockHandle};
use crate::codec::{EntryCodec, EntryLocation};
use crate::error::FatResult;
use crate::params::VolumeParams;

/// Pairs a logical entry index with up to two pinned block buffers and
/// the decoded byte offset into them. Cursors are ephemeral: callers must
/// `release` (or drop) them before returning to their own caller, per the
/// data model's lifecycle rule.
pub(crate) struct EntryCursor<'a> {
    codec: &'a dyn EntryCodec,
    cache: Arc<dyn BlockCache>,
    params: VolumeParams,

    pub(crate) entry: u32,
    pub(crate) buf0: Option<BlockHandle>,
    pub(crate) buf1: Option<BlockHandle>,
    pub(crate) offset: usize,
    pub(crate) straddles: bool,
    bound: bool,
}

impl<'a> EntryCursor<'a> {
    pub(crate) fn new(codec: &'a dyn EntryCodec, cache: Arc<dyn BlockCache>, params: VolumeParams) -> Self {
        EntryCursor {
            codec,
            cache,
            params,
            entry: 0,
            buf0: None,
            buf1: None,
            offset: 0,
            straddles: false,
            bound: false,
        }
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.bound
    }

    pub(crate) fn params(&self) -> &VolumeParams {
        &self.params
    }

    /// Position the cursor at `entry`, loading blocks only if the
    /// currently pinned buffer(s) don't already cover it (the
    /// `update_ptr` fast path from §4.2).
    pub(crate) fn set_entry(&mut self, entry: u32) -> FatResult<()> {
        let location = self.codec.locate(&self.params, entry);

        if self.covers(&location) {
            self.entry = entry;
            self.codec.bind(self, location);
            return Ok(());
        }

        self.release();
        let buf0 = self.cache.load(location.block0)?;
        let buf1 = if location.straddles {
            Some(self.cache.load(location.block0 + 1)?)
        } else {
            None
        };
        self.buf0 = Some(buf0);
        self.buf1 = buf1;
        self.entry = entry;
        self.codec.bind(self, location);
        Ok(())
    }

    /// `true` iff the already-pinned buffer(s) cover `location` without a
    /// reload: block 0 matches, and for a straddling FAT12 entry either
    /// block 1 is already pinned and contiguous, or the entry being
    /// sought does not straddle.
    fn covers(&self, location: &EntryLocation) -> bool {
        let Some(buf0) = &self.buf0 else {
            return false;
        };
        if buf0.block_no() != location.block0 {
            return false;
        }
        if location.straddles {
            matches!(&self.buf1, Some(b) if b.block_no() == location.block0 + 1)
        } else {
            true
        }
    }

    pub(crate) fn get(&self) -> u32 {
        debug_assert!(self.bound, "get() called on an unbound cursor");
        self.codec.get(self)
    }

    /// Write `value` and return the buffers that were modified, for the
    /// caller to fold into its per-call dirty set and mark dirty against
    /// the cache.
    pub(crate) fn put(&mut self, value: u32) -> Vec<BlockHandle> {
        debug_assert!(self.bound, "put() called on an unbound cursor");
        let touched = self.codec.put(self, value);
        for handle in &touched {
            self.cache.mark_dirty(handle);
        }
        touched
    }

    /// In-place move to `entry + 1`. Returns `false` if the next entry
    /// falls outside the currently pinned coverage; the cursor is then
    /// unbound (decoded offset cleared) but its buffers stay pinned until
    /// `release`.
    pub(crate) fn advance(&mut self) -> bool {
        self.codec.advance(self)
    }

    pub(crate) fn mark_bound(&mut self, offset: usize, straddles: bool) {
        self.offset = offset;
        self.straddles = straddles;
        self.bound = true;
    }

    pub(crate) fn mark_unbound(&mut self) {
        self.bound = false;
    }

    /// Drop all pinned buffers. Safe to call on an already-released
    /// cursor.
    pub(crate) fn release(&mut self) {
        self.buf0 = None;
        self.buf1 = None;
        self.bound = false;
    }

    /// Move this cursor's pinned buffers into a fresh cursor, leaving
    /// `self` released. Used by the allocator's "promote current to
    /// prev_ent" step (§4.4): an explicit move, not a shared pointer, per
    /// the Design Notes on cursor ownership.
    pub(crate) fn take(&mut self) -> EntryCursor<'a> {
        let moved = EntryCursor {
            codec: self.codec,
            cache: self.cache.clone(),
            params: self.params,
            entry: self.entry,
            buf0: self.buf0.take(),
            buf1: self.buf1.take(),
            offset: self.offset,
            straddles: self.straddles,
            bound: self.bound,
        };
        self.bound = false;
        moved
    }
}

impl<'a> Drop for EntryCursor<'a> {
    fn drop(&mut self) {
        self.release();
    }
}
