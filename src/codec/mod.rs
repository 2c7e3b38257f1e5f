//! Entry codec (C1): bit-exact encode/decode of one FAT entry.
//!
//! Three variants implement the same contract, chosen once at mount time
//! and carried on [`crate::volume::FatVolume`] as a trait object — a
//! dispatch table, not an inheritance hierarchy, per the spec's Design
//! Notes. Grounded in `original_source/fs/fat/fatent.c`'s
//! `fatent_operations` vtable (`ent_blocknr`, `ent_set_ptr`, `ent_get`,
//! `ent_put`, `ent_next`), translated from raw pointer pairs into
//! (buffer index, byte offset) pairs so the encode/decode logic never
//! needs `unsafe`.

mod fat12;
mod fat16;
mod fat32;

use crate::cursor::EntryCursor;
use crate::params::{FatVariant, VolumeParams};

pub(crate) use fat12::Fat12Codec;
pub(crate) use fat16::Fat16Codec;
pub(crate) use fat32::Fat32Codec;

/// Where one logical entry lives on disk: a starting block and byte
/// offset within it, plus whether decoding it requires a second,
/// consecutive block (true only for a FAT12 entry at the last byte of a
/// block).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryLocation {
    pub block0: u64,
    pub offset: usize,
    pub straddles: bool,
}

/// The per-variant half of the entry codec contract. `bind`/`get`/`put`/
/// `advance` operate on an already-positioned [`EntryCursor`]; `locate`
/// is a pure function of the volume geometry and is also used by the
/// cursor's `update_ptr` fast path to decide whether a reload is needed
/// at all.
pub(crate) trait EntryCodec: Send + Sync {
    /// `locate(e)`: `(block_number, byte_offset)`, plus whether a second
    /// block is needed.
    fn locate(&self, params: &VolumeParams, entry: u32) -> EntryLocation;

    /// `bind(u, offset)`: validate alignment for `offset` and record it
    /// (plus the straddle flag) on the cursor. Buffers must already be
    /// pinned by the caller in the 1- or 2-buffer form `locate` asked for.
    fn bind(&self, cursor: &mut EntryCursor, location: EntryLocation);

    /// `get(u)`: decode the entry value, normalizing any on-disk value
    /// `>= BAD` to the canonical `EOF` sentinel.
    fn get(&self, cursor: &EntryCursor) -> u32;

    /// `put(u, v)`: encode `v` into the pinned buffer(s). `EOF` is
    /// rewritten to the variant's canonical EOF constant; FAT32 preserves
    /// the high 4 reserved bits of the stored word. Returns the distinct
    /// buffers touched, for the caller to mark dirty.
    fn put(&self, cursor: &EntryCursor, value: u32) -> Vec<crate::cache::BlockHandle>;

    /// `advance(u)`: move to entry `e+1` in place if the pinned buffers
    /// already cover it; otherwise unbind (clear decoded offsets, keep
    /// buffers pinned) and return `false`.
    fn advance(&self, cursor: &mut EntryCursor) -> bool;
}

/// Build the codec for a volume's variant. Chosen once at mount and
/// carried on the volume handle — see `fat_ent_access_init` in the
/// original source, which does the equivalent vtable selection.
pub(crate) fn codec_for(variant: FatVariant) -> Box<dyn EntryCodec> {
    match variant {
        FatVariant::Fat12 => Box::new(Fat12Codec),
        FatVariant::Fat16 => Box::new(Fat16Codec),
        FatVariant::Fat32 => Box::new(Fat32Codec),
    }
}
